use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::domain::{
    AccountId, AppointmentId, AppointmentStatus, CategoryId, DepartmentId, EmployeeId, ExamId,
    Gender, MedicineId, PatientId, PrescriptionId, Role, ShiftId,
};
use shared::protocol::SortOrder;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub account_id: AccountId,
    pub username: String,
    pub role: Role,
    pub employee_id: Option<EmployeeId>,
    pub patient_id: Option<PatientId>,
}

#[derive(Debug, Clone)]
pub struct StoredPatient {
    pub patient_id: PatientId,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredDepartment {
    pub department_id: DepartmentId,
    pub name: String,
    pub description: Option<String>,
    pub employee_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredEmployee {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub role: Role,
    pub department_id: DepartmentId,
    pub department_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub hired_at: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct StoredShift {
    pub shift_id: ShiftId,
    pub employee_id: EmployeeId,
    pub weekday: Weekday,
    pub starts_at: String,
    pub ends_at: String,
}

#[derive(Debug, Clone)]
pub struct StoredCategory {
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub medicine_count: i64,
}

#[derive(Debug, Clone)]
pub struct StoredMedicine {
    pub medicine_id: MedicineId,
    pub name: String,
    pub category_id: CategoryId,
    pub category_name: String,
    pub stock_quantity: i64,
    pub unit_price_cents: i64,
    pub expires_at: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct StoredAppointment {
    pub appointment_id: AppointmentId,
    pub booking_reference: Uuid,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub doctor_id: EmployeeId,
    pub doctor_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone)]
pub struct StoredExam {
    pub exam_id: ExamId,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub doctor_id: EmployeeId,
    pub doctor_name: String,
    pub appointment_id: Option<AppointmentId>,
    pub name: String,
    pub result_summary: Option<String>,
    pub performed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredPrescription {
    pub prescription_id: PrescriptionId,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub doctor_id: EmployeeId,
    pub doctor_name: String,
    pub appointment_id: Option<AppointmentId>,
    pub notes: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub dispensed_at: Option<DateTime<Utc>>,
    pub item_count: i64,
}

#[derive(Debug, Clone)]
pub struct StoredPrescriptionItem {
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub dosage: String,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct PrescriptionItemInput {
    pub medicine_id: MedicineId,
    pub dosage: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispenseOutcome {
    Dispensed(DateTime<Utc>),
    AlreadyDispensed,
    OutOfStock(MedicineId),
}

enum SqlArg {
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

fn like_pattern(search: &str) -> String {
    format!("%{}%", search.to_lowercase())
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

fn order_sql(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

fn page_offset(page: u32, limit: u32) -> i64 {
    i64::from(page.saturating_sub(1)) * i64::from(limit)
}

fn weekday_from_index(index: i64) -> Weekday {
    match index {
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        6 => Weekday::Sun,
        _ => Weekday::Mon,
    }
}

fn account_from_row(row: &SqliteRow) -> StoredAccount {
    StoredAccount {
        account_id: AccountId(row.get::<i64, _>(0)),
        username: row.get::<String, _>(1),
        role: Role::parse(row.get::<String, _>(2).as_str()).unwrap_or(Role::Patient),
        employee_id: row.get::<Option<i64>, _>(3).map(EmployeeId),
        patient_id: row.get::<Option<i64>, _>(4).map(PatientId),
    }
}

fn patient_from_row(row: &SqliteRow) -> StoredPatient {
    StoredPatient {
        patient_id: PatientId(row.get::<i64, _>(0)),
        full_name: row.get::<String, _>(1),
        date_of_birth: row.get::<NaiveDate, _>(2),
        gender: Gender::parse(row.get::<String, _>(3).as_str()).unwrap_or(Gender::Other),
        phone: row.get::<Option<String>, _>(4),
        email: row.get::<Option<String>, _>(5),
        created_at: row.get::<DateTime<Utc>, _>(6),
    }
}

fn department_from_row(row: &SqliteRow) -> StoredDepartment {
    StoredDepartment {
        department_id: DepartmentId(row.get::<i64, _>(0)),
        name: row.get::<String, _>(1),
        description: row.get::<Option<String>, _>(2),
        created_at: row.get::<DateTime<Utc>, _>(3),
        employee_count: row.get::<i64, _>(4),
    }
}

fn employee_from_row(row: &SqliteRow) -> StoredEmployee {
    StoredEmployee {
        employee_id: EmployeeId(row.get::<i64, _>(0)),
        full_name: row.get::<String, _>(1),
        role: Role::parse(row.get::<String, _>(2).as_str()).unwrap_or(Role::Patient),
        department_id: DepartmentId(row.get::<i64, _>(3)),
        department_name: row.get::<String, _>(4),
        email: row.get::<Option<String>, _>(5),
        phone: row.get::<Option<String>, _>(6),
        hired_at: row.get::<NaiveDate, _>(7),
    }
}

fn shift_from_row(row: &SqliteRow) -> StoredShift {
    StoredShift {
        shift_id: ShiftId(row.get::<i64, _>(0)),
        employee_id: EmployeeId(row.get::<i64, _>(1)),
        weekday: weekday_from_index(row.get::<i64, _>(2)),
        starts_at: row.get::<String, _>(3),
        ends_at: row.get::<String, _>(4),
    }
}

fn category_from_row(row: &SqliteRow) -> StoredCategory {
    StoredCategory {
        category_id: CategoryId(row.get::<i64, _>(0)),
        name: row.get::<String, _>(1),
        description: row.get::<Option<String>, _>(2),
        medicine_count: row.get::<i64, _>(3),
    }
}

fn medicine_from_row(row: &SqliteRow) -> StoredMedicine {
    StoredMedicine {
        medicine_id: MedicineId(row.get::<i64, _>(0)),
        name: row.get::<String, _>(1),
        category_id: CategoryId(row.get::<i64, _>(2)),
        category_name: row.get::<String, _>(3),
        stock_quantity: row.get::<i64, _>(4),
        unit_price_cents: row.get::<i64, _>(5),
        expires_at: row.get::<Option<NaiveDate>, _>(6),
    }
}

fn appointment_from_row(row: &SqliteRow) -> StoredAppointment {
    StoredAppointment {
        appointment_id: AppointmentId(row.get::<i64, _>(0)),
        booking_reference: Uuid::parse_str(row.get::<String, _>(1).as_str())
            .unwrap_or_else(|_| Uuid::nil()),
        patient_id: PatientId(row.get::<i64, _>(2)),
        patient_name: row.get::<String, _>(3),
        doctor_id: EmployeeId(row.get::<i64, _>(4)),
        doctor_name: row.get::<String, _>(5),
        scheduled_at: row.get::<DateTime<Utc>, _>(6),
        reason: row.get::<Option<String>, _>(7),
        status: AppointmentStatus::parse(row.get::<String, _>(8).as_str())
            .unwrap_or(AppointmentStatus::Scheduled),
    }
}

fn exam_from_row(row: &SqliteRow) -> StoredExam {
    StoredExam {
        exam_id: ExamId(row.get::<i64, _>(0)),
        patient_id: PatientId(row.get::<i64, _>(1)),
        patient_name: row.get::<String, _>(2),
        doctor_id: EmployeeId(row.get::<i64, _>(3)),
        doctor_name: row.get::<String, _>(4),
        appointment_id: row.get::<Option<i64>, _>(5).map(AppointmentId),
        name: row.get::<String, _>(6),
        result_summary: row.get::<Option<String>, _>(7),
        performed_at: row.get::<DateTime<Utc>, _>(8),
    }
}

fn prescription_from_row(row: &SqliteRow) -> StoredPrescription {
    StoredPrescription {
        prescription_id: PrescriptionId(row.get::<i64, _>(0)),
        patient_id: PatientId(row.get::<i64, _>(1)),
        patient_name: row.get::<String, _>(2),
        doctor_id: EmployeeId(row.get::<i64, _>(3)),
        doctor_name: row.get::<String, _>(4),
        appointment_id: row.get::<Option<i64>, _>(5).map(AppointmentId),
        notes: row.get::<Option<String>, _>(6),
        issued_at: row.get::<DateTime<Utc>, _>(7),
        dispensed_at: row.get::<Option<DateTime<Utc>>, _>(8),
        item_count: row.get::<i64, _>(9),
    }
}

const APPOINTMENT_SELECT: &str = "SELECT a.id, a.booking_reference, a.patient_id, p.full_name, \
     a.doctor_id, e.full_name, a.scheduled_at, a.reason, a.status \
     FROM appointments a \
     INNER JOIN patients p ON p.id = a.patient_id \
     INNER JOIN employees e ON e.id = a.doctor_id";

const EXAM_SELECT: &str = "SELECT x.id, x.patient_id, p.full_name, x.doctor_id, e.full_name, \
     x.appointment_id, x.name, x.result_summary, x.performed_at \
     FROM medical_exams x \
     INNER JOIN patients p ON p.id = x.patient_id \
     INNER JOIN employees e ON e.id = x.doctor_id";

const PRESCRIPTION_SELECT: &str = "SELECT pr.id, pr.patient_id, p.full_name, pr.doctor_id, \
     e.full_name, pr.appointment_id, pr.notes, pr.issued_at, pr.dispensed_at, \
     (SELECT COUNT(*) FROM prescription_items pi WHERE pi.prescription_id = pr.id) \
     FROM prescriptions pr \
     INNER JOIN patients p ON p.id = pr.patient_id \
     INNER JOIN employees e ON e.id = pr.doctor_id";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn fetch_paged(
        &self,
        count_sql: &str,
        select_sql: &str,
        args: &[SqlArg],
        limit: u32,
        offset: i64,
    ) -> Result<(Vec<SqliteRow>, u64)> {
        let mut count_query = sqlx::query(count_sql);
        for arg in args {
            count_query = match arg {
                SqlArg::Int(value) => count_query.bind(*value),
                SqlArg::Text(value) => count_query.bind(value.as_str()),
                SqlArg::Timestamp(value) => count_query.bind(*value),
            };
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>(0);

        let mut select_query = sqlx::query(select_sql);
        for arg in args {
            select_query = match arg {
                SqlArg::Int(value) => select_query.bind(*value),
                SqlArg::Text(value) => select_query.bind(value.as_str()),
                SqlArg::Timestamp(value) => select_query.bind(*value),
            };
        }
        let rows = select_query
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total.max(0) as u64))
    }

    async fn count_scalar(&self, sql: &str, args: &[SqlArg]) -> Result<u64> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                SqlArg::Int(value) => query.bind(*value),
                SqlArg::Text(value) => query.bind(value.as_str()),
                SqlArg::Timestamp(value) => query.bind(*value),
            };
        }
        let total = query.fetch_one(&self.pool).await?.get::<i64, _>(0);
        Ok(total.max(0) as u64)
    }

    pub async fn create_account(
        &self,
        username: &str,
        role: Role,
        employee_id: Option<EmployeeId>,
        patient_id: Option<PatientId>,
    ) -> Result<AccountId> {
        let row = sqlx::query(
            "INSERT INTO accounts (username, role, employee_id, patient_id)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(username)
        .bind(role.as_str())
        .bind(employee_id.map(|id| id.0))
        .bind(patient_id.map(|id| id.0))
        .fetch_one(&self.pool)
        .await
        .context("failed to create account; username may already be taken")?;
        Ok(AccountId(row.get::<i64, _>(0)))
    }

    pub async fn find_account(&self, username: &str) -> Result<Option<StoredAccount>> {
        let row = sqlx::query(
            "SELECT id, username, role, employee_id, patient_id FROM accounts WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(account_from_row))
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<Option<StoredAccount>> {
        let row = sqlx::query(
            "SELECT id, username, role, employee_id, patient_id FROM accounts WHERE id = ?",
        )
        .bind(account_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(account_from_row))
    }

    pub async fn create_department(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<DepartmentId> {
        let row = sqlx::query("INSERT INTO departments (name, description) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(description)
            .fetch_one(&self.pool)
            .await
            .context("failed to create department; name may already exist")?;
        Ok(DepartmentId(row.get::<i64, _>(0)))
    }

    pub async fn get_department(
        &self,
        department_id: DepartmentId,
    ) -> Result<Option<StoredDepartment>> {
        let row = sqlx::query(
            "SELECT d.id, d.name, d.description, d.created_at,
                    (SELECT COUNT(*) FROM employees e WHERE e.department_id = d.id)
             FROM departments d
             WHERE d.id = ?",
        )
        .bind(department_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(department_from_row))
    }

    pub async fn list_departments(
        &self,
        search: Option<&str>,
        sort_by: Option<&str>,
        sort_order: SortOrder,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<StoredDepartment>, u64)> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        if let Some(search) = search {
            conditions.push(
                "(lower(d.name) LIKE ? OR lower(coalesce(d.description, '')) LIKE ?)".to_string(),
            );
            let pattern = like_pattern(search);
            args.push(SqlArg::Text(pattern.clone()));
            args.push(SqlArg::Text(pattern));
        }
        let where_sql = where_clause(&conditions);
        let column = match sort_by {
            Some("name") => "d.name",
            Some("created_at") => "d.created_at",
            Some("employee_count") => "5",
            _ => "d.id",
        };
        let count_sql = format!("SELECT COUNT(*) FROM departments d{where_sql}");
        let select_sql = format!(
            "SELECT d.id, d.name, d.description, d.created_at,
                    (SELECT COUNT(*) FROM employees e WHERE e.department_id = d.id)
             FROM departments d{where_sql}
             ORDER BY {column} {order}, d.id ASC
             LIMIT ? OFFSET ?",
            order = order_sql(sort_order),
        );
        let (rows, total) = self
            .fetch_paged(&count_sql, &select_sql, &args, limit, page_offset(page, limit))
            .await?;
        Ok((rows.iter().map(department_from_row).collect(), total))
    }

    pub async fn create_employee(
        &self,
        full_name: &str,
        role: Role,
        department_id: DepartmentId,
        email: Option<&str>,
        phone: Option<&str>,
        hired_at: NaiveDate,
    ) -> Result<EmployeeId> {
        let row = sqlx::query(
            "INSERT INTO employees (full_name, role, department_id, email, phone, hired_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(full_name)
        .bind(role.as_str())
        .bind(department_id.0)
        .bind(email)
        .bind(phone)
        .bind(hired_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(EmployeeId(row.get::<i64, _>(0)))
    }

    pub async fn update_employee(
        &self,
        employee_id: EmployeeId,
        full_name: &str,
        department_id: DepartmentId,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE employees SET full_name = ?, department_id = ?, email = ?, phone = ? WHERE id = ?",
        )
        .bind(full_name)
        .bind(department_id.0)
        .bind(email)
        .bind(phone)
        .bind(employee_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    pub async fn get_employee(&self, employee_id: EmployeeId) -> Result<Option<StoredEmployee>> {
        let row = sqlx::query(
            "SELECT e.id, e.full_name, e.role, e.department_id, d.name, e.email, e.phone, e.hired_at
             FROM employees e
             INNER JOIN departments d ON d.id = e.department_id
             WHERE e.id = ?",
        )
        .bind(employee_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(employee_from_row))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn list_employees(
        &self,
        search: Option<&str>,
        department_id: Option<DepartmentId>,
        role: Option<Role>,
        sort_by: Option<&str>,
        sort_order: SortOrder,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<StoredEmployee>, u64)> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        if let Some(search) = search {
            conditions.push(
                "(lower(e.full_name) LIKE ? OR lower(coalesce(e.email, '')) LIKE ?)".to_string(),
            );
            let pattern = like_pattern(search);
            args.push(SqlArg::Text(pattern.clone()));
            args.push(SqlArg::Text(pattern));
        }
        if let Some(department_id) = department_id {
            conditions.push("e.department_id = ?".to_string());
            args.push(SqlArg::Int(department_id.0));
        }
        if let Some(role) = role {
            conditions.push("e.role = ?".to_string());
            args.push(SqlArg::Text(role.as_str().to_string()));
        }
        let where_sql = where_clause(&conditions);
        let column = match sort_by {
            Some("name") | Some("full_name") => "e.full_name",
            Some("hired_at") => "e.hired_at",
            Some("role") => "e.role",
            Some("department") => "d.name",
            _ => "e.id",
        };
        let from_sql = "FROM employees e INNER JOIN departments d ON d.id = e.department_id";
        let count_sql = format!("SELECT COUNT(*) {from_sql}{where_sql}");
        let select_sql = format!(
            "SELECT e.id, e.full_name, e.role, e.department_id, d.name, e.email, e.phone, e.hired_at
             {from_sql}{where_sql}
             ORDER BY {column} {order}, e.id ASC
             LIMIT ? OFFSET ?",
            order = order_sql(sort_order),
        );
        let (rows, total) = self
            .fetch_paged(&count_sql, &select_sql, &args, limit, page_offset(page, limit))
            .await?;
        Ok((rows.iter().map(employee_from_row).collect(), total))
    }

    pub async fn upsert_shift(
        &self,
        employee_id: EmployeeId,
        weekday: Weekday,
        starts_at: &str,
        ends_at: &str,
    ) -> Result<ShiftId> {
        let row = sqlx::query(
            "INSERT INTO work_shifts (employee_id, weekday, starts_at, ends_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(employee_id, weekday) DO UPDATE SET
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at
             RETURNING id",
        )
        .bind(employee_id.0)
        .bind(weekday.num_days_from_monday() as i64)
        .bind(starts_at)
        .bind(ends_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(ShiftId(row.get::<i64, _>(0)))
    }

    pub async fn list_shifts_for_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<StoredShift>> {
        let rows = sqlx::query(
            "SELECT id, employee_id, weekday, starts_at, ends_at
             FROM work_shifts
             WHERE employee_id = ?
             ORDER BY weekday ASC",
        )
        .bind(employee_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(shift_from_row).collect())
    }

    pub async fn create_patient(
        &self,
        full_name: &str,
        date_of_birth: NaiveDate,
        gender: Gender,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<PatientId> {
        let row = sqlx::query(
            "INSERT INTO patients (full_name, date_of_birth, gender, phone, email)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(full_name)
        .bind(date_of_birth)
        .bind(gender.as_str())
        .bind(phone)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(PatientId(row.get::<i64, _>(0)))
    }

    pub async fn get_patient(&self, patient_id: PatientId) -> Result<Option<StoredPatient>> {
        let row = sqlx::query(
            "SELECT id, full_name, date_of_birth, gender, phone, email, created_at
             FROM patients
             WHERE id = ?",
        )
        .bind(patient_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(patient_from_row))
    }

    pub async fn update_patient(
        &self,
        patient_id: PatientId,
        full_name: &str,
        date_of_birth: NaiveDate,
        gender: Gender,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE patients
             SET full_name = ?, date_of_birth = ?, gender = ?, phone = ?, email = ?
             WHERE id = ?",
        )
        .bind(full_name)
        .bind(date_of_birth)
        .bind(gender.as_str())
        .bind(phone)
        .bind(email)
        .bind(patient_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    pub async fn delete_patient(&self, patient_id: PatientId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM patients WHERE id = ?")
            .bind(patient_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn count_appointments_for_patient(&self, patient_id: PatientId) -> Result<u64> {
        self.count_scalar(
            "SELECT COUNT(*) FROM appointments WHERE patient_id = ?",
            &[SqlArg::Int(patient_id.0)],
        )
        .await
    }

    pub async fn list_patients(
        &self,
        search: Option<&str>,
        gender: Option<Gender>,
        sort_by: Option<&str>,
        sort_order: SortOrder,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<StoredPatient>, u64)> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        if let Some(search) = search {
            conditions.push(
                "(lower(full_name) LIKE ? OR lower(coalesce(phone, '')) LIKE ? OR lower(coalesce(email, '')) LIKE ?)"
                    .to_string(),
            );
            let pattern = like_pattern(search);
            args.push(SqlArg::Text(pattern.clone()));
            args.push(SqlArg::Text(pattern.clone()));
            args.push(SqlArg::Text(pattern));
        }
        if let Some(gender) = gender {
            conditions.push("gender = ?".to_string());
            args.push(SqlArg::Text(gender.as_str().to_string()));
        }
        let where_sql = where_clause(&conditions);
        let column = match sort_by {
            Some("name") | Some("full_name") => "full_name",
            Some("date_of_birth") => "date_of_birth",
            Some("created_at") => "created_at",
            _ => "id",
        };
        let count_sql = format!("SELECT COUNT(*) FROM patients{where_sql}");
        let select_sql = format!(
            "SELECT id, full_name, date_of_birth, gender, phone, email, created_at
             FROM patients{where_sql}
             ORDER BY {column} {order}, id ASC
             LIMIT ? OFFSET ?",
            order = order_sql(sort_order),
        );
        let (rows, total) = self
            .fetch_paged(&count_sql, &select_sql, &args, limit, page_offset(page, limit))
            .await?;
        Ok((rows.iter().map(patient_from_row).collect(), total))
    }

    pub async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<CategoryId> {
        let row = sqlx::query(
            "INSERT INTO medicine_categories (name, description) VALUES (?, ?) RETURNING id",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .context("failed to create category; name may already exist")?;
        Ok(CategoryId(row.get::<i64, _>(0)))
    }

    pub async fn get_category(&self, category_id: CategoryId) -> Result<Option<StoredCategory>> {
        let row = sqlx::query(
            "SELECT c.id, c.name, c.description,
                    (SELECT COUNT(*) FROM medicines m WHERE m.category_id = c.id)
             FROM medicine_categories c
             WHERE c.id = ?",
        )
        .bind(category_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(category_from_row))
    }

    pub async fn list_categories(
        &self,
        search: Option<&str>,
        sort_by: Option<&str>,
        sort_order: SortOrder,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<StoredCategory>, u64)> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        if let Some(search) = search {
            conditions.push("lower(c.name) LIKE ?".to_string());
            args.push(SqlArg::Text(like_pattern(search)));
        }
        let where_sql = where_clause(&conditions);
        let column = match sort_by {
            Some("name") => "c.name",
            Some("medicine_count") => "4",
            _ => "c.id",
        };
        let count_sql = format!("SELECT COUNT(*) FROM medicine_categories c{where_sql}");
        let select_sql = format!(
            "SELECT c.id, c.name, c.description,
                    (SELECT COUNT(*) FROM medicines m WHERE m.category_id = c.id)
             FROM medicine_categories c{where_sql}
             ORDER BY {column} {order}, c.id ASC
             LIMIT ? OFFSET ?",
            order = order_sql(sort_order),
        );
        let (rows, total) = self
            .fetch_paged(&count_sql, &select_sql, &args, limit, page_offset(page, limit))
            .await?;
        Ok((rows.iter().map(category_from_row).collect(), total))
    }

    pub async fn create_medicine(
        &self,
        name: &str,
        category_id: CategoryId,
        stock_quantity: i64,
        unit_price_cents: i64,
        expires_at: Option<NaiveDate>,
    ) -> Result<MedicineId> {
        let row = sqlx::query(
            "INSERT INTO medicines (name, category_id, stock_quantity, unit_price_cents, expires_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(name)
        .bind(category_id.0)
        .bind(stock_quantity)
        .bind(unit_price_cents)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(MedicineId(row.get::<i64, _>(0)))
    }

    pub async fn get_medicine(&self, medicine_id: MedicineId) -> Result<Option<StoredMedicine>> {
        let row = sqlx::query(
            "SELECT m.id, m.name, m.category_id, c.name, m.stock_quantity, m.unit_price_cents, m.expires_at
             FROM medicines m
             INNER JOIN medicine_categories c ON c.id = m.category_id
             WHERE m.id = ?",
        )
        .bind(medicine_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(medicine_from_row))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn list_medicines(
        &self,
        search: Option<&str>,
        category_id: Option<CategoryId>,
        low_stock_below: Option<i64>,
        sort_by: Option<&str>,
        sort_order: SortOrder,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<StoredMedicine>, u64)> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        if let Some(search) = search {
            conditions.push("lower(m.name) LIKE ?".to_string());
            args.push(SqlArg::Text(like_pattern(search)));
        }
        if let Some(category_id) = category_id {
            conditions.push("m.category_id = ?".to_string());
            args.push(SqlArg::Int(category_id.0));
        }
        if let Some(threshold) = low_stock_below {
            conditions.push("m.stock_quantity < ?".to_string());
            args.push(SqlArg::Int(threshold));
        }
        let where_sql = where_clause(&conditions);
        let column = match sort_by {
            Some("name") => "m.name",
            Some("stock") | Some("stock_quantity") => "m.stock_quantity",
            Some("price") | Some("unit_price_cents") => "m.unit_price_cents",
            Some("expires_at") => "m.expires_at",
            Some("category") => "c.name",
            _ => "m.id",
        };
        let from_sql = "FROM medicines m INNER JOIN medicine_categories c ON c.id = m.category_id";
        let count_sql = format!("SELECT COUNT(*) {from_sql}{where_sql}");
        let select_sql = format!(
            "SELECT m.id, m.name, m.category_id, c.name, m.stock_quantity, m.unit_price_cents, m.expires_at
             {from_sql}{where_sql}
             ORDER BY {column} {order}, m.id ASC
             LIMIT ? OFFSET ?",
            order = order_sql(sort_order),
        );
        let (rows, total) = self
            .fetch_paged(&count_sql, &select_sql, &args, limit, page_offset(page, limit))
            .await?;
        Ok((rows.iter().map(medicine_from_row).collect(), total))
    }

    /// Applies a stock delta only when the result stays non-negative.
    /// Returns the new quantity, or `None` when the medicine is missing or
    /// the adjustment would underflow.
    pub async fn adjust_stock(&self, medicine_id: MedicineId, delta: i64) -> Result<Option<i64>> {
        let row = sqlx::query(
            "UPDATE medicines SET stock_quantity = stock_quantity + ?1
             WHERE id = ?2 AND stock_quantity + ?1 >= 0
             RETURNING stock_quantity",
        )
        .bind(delta)
        .bind(medicine_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<i64, _>(0)))
    }

    pub async fn create_appointment(
        &self,
        patient_id: PatientId,
        doctor_id: EmployeeId,
        scheduled_at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<AppointmentId> {
        let booking_reference = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO appointments (booking_reference, patient_id, doctor_id, scheduled_at, reason, status)
             VALUES (?, ?, ?, ?, ?, 'scheduled')
             RETURNING id",
        )
        .bind(booking_reference.to_string())
        .bind(patient_id.0)
        .bind(doctor_id.0)
        .bind(scheduled_at)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;
        Ok(AppointmentId(row.get::<i64, _>(0)))
    }

    pub async fn get_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Option<StoredAppointment>> {
        let sql = format!("{APPOINTMENT_SELECT} WHERE a.id = ?");
        let row = sqlx::query(&sql)
            .bind(appointment_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(appointment_from_row))
    }

    pub async fn set_appointment_status(
        &self,
        appointment_id: AppointmentId,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query("UPDATE appointments SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(appointment_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn list_appointments(
        &self,
        search: Option<&str>,
        status: Option<AppointmentStatus>,
        doctor_id: Option<EmployeeId>,
        patient_id: Option<PatientId>,
        scheduled_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
        sort_by: Option<&str>,
        sort_order: SortOrder,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<StoredAppointment>, u64)> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        if let Some(search) = search {
            conditions.push(
                "(lower(p.full_name) LIKE ? OR lower(coalesce(a.reason, '')) LIKE ? OR a.booking_reference LIKE ?)"
                    .to_string(),
            );
            let pattern = like_pattern(search);
            args.push(SqlArg::Text(pattern.clone()));
            args.push(SqlArg::Text(pattern.clone()));
            args.push(SqlArg::Text(pattern));
        }
        if let Some(status) = status {
            conditions.push("a.status = ?".to_string());
            args.push(SqlArg::Text(status.as_str().to_string()));
        }
        if let Some(doctor_id) = doctor_id {
            conditions.push("a.doctor_id = ?".to_string());
            args.push(SqlArg::Int(doctor_id.0));
        }
        if let Some(patient_id) = patient_id {
            conditions.push("a.patient_id = ?".to_string());
            args.push(SqlArg::Int(patient_id.0));
        }
        if let Some((from, to)) = scheduled_between {
            conditions.push("a.scheduled_at >= ?".to_string());
            args.push(SqlArg::Timestamp(from));
            conditions.push("a.scheduled_at < ?".to_string());
            args.push(SqlArg::Timestamp(to));
        }
        let where_sql = where_clause(&conditions);
        let column = match sort_by {
            Some("scheduled_at") => "a.scheduled_at",
            Some("created_at") => "a.created_at",
            Some("status") => "a.status",
            Some("patient") | Some("patient_name") => "p.full_name",
            Some("doctor") | Some("doctor_name") => "e.full_name",
            _ => "a.id",
        };
        let count_sql = format!(
            "SELECT COUNT(*) FROM appointments a \
             INNER JOIN patients p ON p.id = a.patient_id \
             INNER JOIN employees e ON e.id = a.doctor_id{where_sql}"
        );
        let select_sql = format!(
            "{APPOINTMENT_SELECT}{where_sql} ORDER BY {column} {order}, a.id ASC LIMIT ? OFFSET ?",
            order = order_sql(sort_order),
        );
        let (rows, total) = self
            .fetch_paged(&count_sql, &select_sql, &args, limit, page_offset(page, limit))
            .await?;
        Ok((rows.iter().map(appointment_from_row).collect(), total))
    }

    pub async fn upcoming_appointments_for_doctor(
        &self,
        doctor_id: EmployeeId,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StoredAppointment>> {
        let sql = format!(
            "{APPOINTMENT_SELECT} \
             WHERE a.doctor_id = ? AND a.scheduled_at >= ? AND a.status IN ('scheduled', 'checked_in') \
             ORDER BY a.scheduled_at ASC \
             LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(doctor_id.0)
            .bind(after)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(appointment_from_row).collect())
    }

    pub async fn upcoming_appointments_for_patient(
        &self,
        patient_id: PatientId,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StoredAppointment>> {
        let sql = format!(
            "{APPOINTMENT_SELECT} \
             WHERE a.patient_id = ? AND a.scheduled_at >= ? AND a.status IN ('scheduled', 'checked_in') \
             ORDER BY a.scheduled_at ASC \
             LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(patient_id.0)
            .bind(after)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(appointment_from_row).collect())
    }

    pub async fn count_appointments_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        self.count_scalar(
            "SELECT COUNT(*) FROM appointments WHERE scheduled_at >= ? AND scheduled_at < ?",
            &[SqlArg::Timestamp(from), SqlArg::Timestamp(to)],
        )
        .await
    }

    pub async fn count_appointments_between_for_doctor(
        &self,
        doctor_id: EmployeeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        self.count_scalar(
            "SELECT COUNT(*) FROM appointments
             WHERE doctor_id = ? AND scheduled_at >= ? AND scheduled_at < ?",
            &[
                SqlArg::Int(doctor_id.0),
                SqlArg::Timestamp(from),
                SqlArg::Timestamp(to),
            ],
        )
        .await
    }

    pub async fn count_appointments_with_status_between(
        &self,
        status: AppointmentStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        self.count_scalar(
            "SELECT COUNT(*) FROM appointments
             WHERE status = ? AND scheduled_at >= ? AND scheduled_at < ?",
            &[
                SqlArg::Text(status.as_str().to_string()),
                SqlArg::Timestamp(from),
                SqlArg::Timestamp(to),
            ],
        )
        .await
    }

    pub async fn record_exam(
        &self,
        patient_id: PatientId,
        doctor_id: EmployeeId,
        appointment_id: Option<AppointmentId>,
        name: &str,
        result_summary: Option<&str>,
        performed_at: DateTime<Utc>,
    ) -> Result<ExamId> {
        let row = sqlx::query(
            "INSERT INTO medical_exams (patient_id, doctor_id, appointment_id, name, result_summary, performed_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(patient_id.0)
        .bind(doctor_id.0)
        .bind(appointment_id.map(|id| id.0))
        .bind(name)
        .bind(result_summary)
        .bind(performed_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(ExamId(row.get::<i64, _>(0)))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn list_exams(
        &self,
        search: Option<&str>,
        patient_id: Option<PatientId>,
        doctor_id: Option<EmployeeId>,
        sort_by: Option<&str>,
        sort_order: SortOrder,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<StoredExam>, u64)> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        if let Some(search) = search {
            conditions.push(
                "(lower(x.name) LIKE ? OR lower(p.full_name) LIKE ?)".to_string(),
            );
            let pattern = like_pattern(search);
            args.push(SqlArg::Text(pattern.clone()));
            args.push(SqlArg::Text(pattern));
        }
        if let Some(patient_id) = patient_id {
            conditions.push("x.patient_id = ?".to_string());
            args.push(SqlArg::Int(patient_id.0));
        }
        if let Some(doctor_id) = doctor_id {
            conditions.push("x.doctor_id = ?".to_string());
            args.push(SqlArg::Int(doctor_id.0));
        }
        let where_sql = where_clause(&conditions);
        let column = match sort_by {
            Some("performed_at") => "x.performed_at",
            Some("name") => "x.name",
            Some("patient") | Some("patient_name") => "p.full_name",
            _ => "x.id",
        };
        let count_sql = format!(
            "SELECT COUNT(*) FROM medical_exams x \
             INNER JOIN patients p ON p.id = x.patient_id \
             INNER JOIN employees e ON e.id = x.doctor_id{where_sql}"
        );
        let select_sql = format!(
            "{EXAM_SELECT}{where_sql} ORDER BY {column} {order}, x.id ASC LIMIT ? OFFSET ?",
            order = order_sql(sort_order),
        );
        let (rows, total) = self
            .fetch_paged(&count_sql, &select_sql, &args, limit, page_offset(page, limit))
            .await?;
        Ok((rows.iter().map(exam_from_row).collect(), total))
    }

    pub async fn latest_exam_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Option<StoredExam>> {
        let sql = format!(
            "{EXAM_SELECT} WHERE x.patient_id = ? ORDER BY x.performed_at DESC, x.id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(patient_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(exam_from_row))
    }

    pub async fn create_prescription(
        &self,
        patient_id: PatientId,
        doctor_id: EmployeeId,
        appointment_id: Option<AppointmentId>,
        notes: Option<&str>,
        issued_at: DateTime<Utc>,
        items: &[PrescriptionItemInput],
    ) -> Result<PrescriptionId> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "INSERT INTO prescriptions (patient_id, doctor_id, appointment_id, notes, issued_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(patient_id.0)
        .bind(doctor_id.0)
        .bind(appointment_id.map(|id| id.0))
        .bind(notes)
        .bind(issued_at)
        .fetch_one(&mut *tx)
        .await?;
        let prescription_id = PrescriptionId(row.get::<i64, _>(0));

        for item in items {
            sqlx::query(
                "INSERT INTO prescription_items (prescription_id, medicine_id, dosage, quantity)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(prescription_id.0)
            .bind(item.medicine_id.0)
            .bind(item.dosage.as_str())
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(prescription_id)
    }

    pub async fn get_prescription(
        &self,
        prescription_id: PrescriptionId,
    ) -> Result<Option<StoredPrescription>> {
        let sql = format!("{PRESCRIPTION_SELECT} WHERE pr.id = ?");
        let row = sqlx::query(&sql)
            .bind(prescription_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(prescription_from_row))
    }

    pub async fn prescription_items(
        &self,
        prescription_id: PrescriptionId,
    ) -> Result<Vec<StoredPrescriptionItem>> {
        let rows = sqlx::query(
            "SELECT pi.medicine_id, m.name, pi.dosage, pi.quantity
             FROM prescription_items pi
             INNER JOIN medicines m ON m.id = pi.medicine_id
             WHERE pi.prescription_id = ?
             ORDER BY pi.id ASC",
        )
        .bind(prescription_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| StoredPrescriptionItem {
                medicine_id: MedicineId(row.get::<i64, _>(0)),
                medicine_name: row.get::<String, _>(1),
                dosage: row.get::<String, _>(2),
                quantity: row.get::<i64, _>(3),
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn list_prescriptions(
        &self,
        search: Option<&str>,
        patient_id: Option<PatientId>,
        doctor_id: Option<EmployeeId>,
        dispensed: Option<bool>,
        sort_by: Option<&str>,
        sort_order: SortOrder,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<StoredPrescription>, u64)> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        if let Some(search) = search {
            conditions.push(
                "(lower(p.full_name) LIKE ? OR lower(coalesce(pr.notes, '')) LIKE ?)".to_string(),
            );
            let pattern = like_pattern(search);
            args.push(SqlArg::Text(pattern.clone()));
            args.push(SqlArg::Text(pattern));
        }
        if let Some(patient_id) = patient_id {
            conditions.push("pr.patient_id = ?".to_string());
            args.push(SqlArg::Int(patient_id.0));
        }
        if let Some(doctor_id) = doctor_id {
            conditions.push("pr.doctor_id = ?".to_string());
            args.push(SqlArg::Int(doctor_id.0));
        }
        if let Some(dispensed) = dispensed {
            if dispensed {
                conditions.push("pr.dispensed_at IS NOT NULL".to_string());
            } else {
                conditions.push("pr.dispensed_at IS NULL".to_string());
            }
        }
        let where_sql = where_clause(&conditions);
        let column = match sort_by {
            Some("issued_at") => "pr.issued_at",
            Some("dispensed_at") => "pr.dispensed_at",
            Some("patient") | Some("patient_name") => "p.full_name",
            _ => "pr.id",
        };
        let count_sql = format!(
            "SELECT COUNT(*) FROM prescriptions pr \
             INNER JOIN patients p ON p.id = pr.patient_id \
             INNER JOIN employees e ON e.id = pr.doctor_id{where_sql}"
        );
        let select_sql = format!(
            "{PRESCRIPTION_SELECT}{where_sql} ORDER BY {column} {order}, pr.id ASC LIMIT ? OFFSET ?",
            order = order_sql(sort_order),
        );
        let (rows, total) = self
            .fetch_paged(&count_sql, &select_sql, &args, limit, page_offset(page, limit))
            .await?;
        Ok((rows.iter().map(prescription_from_row).collect(), total))
    }

    /// Dispenses a prescription atomically: every item's stock is
    /// decremented or nothing is. Returns `None` when the prescription
    /// does not exist.
    pub async fn dispense_prescription(
        &self,
        prescription_id: PrescriptionId,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenseOutcome>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT dispensed_at FROM prescriptions WHERE id = ?")
            .bind(prescription_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        if row.get::<Option<DateTime<Utc>>, _>(0).is_some() {
            return Ok(Some(DispenseOutcome::AlreadyDispensed));
        }

        let items = sqlx::query(
            "SELECT medicine_id, quantity FROM prescription_items
             WHERE prescription_id = ?
             ORDER BY id ASC",
        )
        .bind(prescription_id.0)
        .fetch_all(&mut *tx)
        .await?;

        for item in &items {
            let medicine_id: i64 = item.get(0);
            let quantity: i64 = item.get(1);
            let updated = sqlx::query(
                "UPDATE medicines SET stock_quantity = stock_quantity - ?1
                 WHERE id = ?2 AND stock_quantity >= ?1",
            )
            .bind(quantity)
            .bind(medicine_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if updated == 0 {
                tx.rollback().await?;
                return Ok(Some(DispenseOutcome::OutOfStock(MedicineId(medicine_id))));
            }
        }

        sqlx::query("UPDATE prescriptions SET dispensed_at = ? WHERE id = ?")
            .bind(now)
            .bind(prescription_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(DispenseOutcome::Dispensed(now)))
    }

    pub async fn count_patients(&self) -> Result<u64> {
        self.count_scalar("SELECT COUNT(*) FROM patients", &[]).await
    }

    pub async fn count_employees(&self) -> Result<u64> {
        self.count_scalar("SELECT COUNT(*) FROM employees", &[]).await
    }

    pub async fn count_departments(&self) -> Result<u64> {
        self.count_scalar("SELECT COUNT(*) FROM departments", &[])
            .await
    }

    pub async fn count_low_stock_medicines(&self, threshold: i64) -> Result<u64> {
        self.count_scalar(
            "SELECT COUNT(*) FROM medicines WHERE stock_quantity < ?",
            &[SqlArg::Int(threshold)],
        )
        .await
    }

    pub async fn count_undispensed_prescriptions_for_doctor(
        &self,
        doctor_id: EmployeeId,
    ) -> Result<u64> {
        self.count_scalar(
            "SELECT COUNT(*) FROM prescriptions WHERE doctor_id = ? AND dispensed_at IS NULL",
            &[SqlArg::Int(doctor_id.0)],
        )
        .await
    }

    pub async fn count_undispensed_prescriptions_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<u64> {
        self.count_scalar(
            "SELECT COUNT(*) FROM prescriptions WHERE patient_id = ? AND dispensed_at IS NULL",
            &[SqlArg::Int(patient_id.0)],
        )
        .await
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
