use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    AccountId, AppointmentId, AppointmentStatus, CategoryId, DepartmentId, EmployeeId, ExamId,
    Gender, MedicineId, PatientId, PrescriptionId, Role, ShiftId,
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Reserved filter value meaning "no filter selected". Stored client-side
/// so a dropdown can keep showing it, but never forwarded to a data source.
pub const FILTER_ALL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// The slice of a collection a caller wants: 1-indexed page, page size,
/// free-text search, sort column and direction, plus entity-specific
/// filters. Filter values here are already normalized; empty strings and
/// the [`FILTER_ALL`] sentinel are dropped at the boundaries that build
/// this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            search: None,
            sort_by: None,
            sort_order: SortOrder::Asc,
            filters: BTreeMap::new(),
        }
    }
}

impl PageRequest {
    /// SQL offset for the requested page. The 1-indexed page convention is
    /// converted to a row offset here and nowhere else.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }

    pub fn filter(&self, key: &str) -> Option<&str> {
        self.filters.get(key).map(String::as_str)
    }

    /// Decodes query-string pairs. Unknown keys become filters; empty and
    /// [`FILTER_ALL`] values are discarded so a sentinel never reaches a
    /// data source. Unparseable page/limit values fall back to defaults
    /// rather than erroring, and `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "page" => {
                    if let Ok(page) = value.parse::<u32>() {
                        request.page = page.max(1);
                    }
                }
                "limit" => {
                    if let Ok(limit) = value.parse::<u32>() {
                        request.limit = limit.clamp(1, MAX_PAGE_SIZE);
                    }
                }
                "search" => {
                    if !value.is_empty() {
                        request.search = Some(value.to_string());
                    }
                }
                "sort_by" => {
                    if !value.is_empty() {
                        request.sort_by = Some(value.to_string());
                    }
                }
                "sort_order" => {
                    if let Some(order) = SortOrder::parse(value) {
                        request.sort_order = order;
                    }
                }
                // Actor identification travels alongside paging params and
                // is consumed separately by the handler.
                "account_id" => {}
                key => {
                    if !value.is_empty() && value != FILTER_ALL {
                        request.filters.insert(key.to_string(), value.to_string());
                    }
                }
            }
        }
        request
    }

    /// Encodes the request for a query string, dropping absent search and
    /// sort fields and any filter value that means "no filter".
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search".to_string(), search.to_string()));
        }
        if let Some(sort_by) = self.sort_by.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("sort_by".to_string(), sort_by.to_string()));
            pairs.push((
                "sort_order".to_string(),
                self.sort_order.as_str().to_string(),
            ));
        }
        for (key, value) in &self.filters {
            if !value.is_empty() && value != FILTER_ALL {
                pairs.push((key.clone(), value.clone()));
            }
        }
        pairs
    }
}

pub fn page_count(total_items: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    u32::try_from(total_items.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total_items: u64) -> Self {
        Self {
            total_pages: page_count(total_items, page_size),
            items,
            page,
            page_size,
            total_items,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub account_id: AccountId,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<EmployeeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSummary {
    pub patient_id: PatientId,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentSummary {
    pub department_id: DepartmentId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub employee_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub role: Role,
    pub department_id: DepartmentId,
    pub department_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub hired_at: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftSummary {
    pub shift_id: ShiftId,
    pub employee_id: EmployeeId,
    pub weekday: Weekday,
    pub starts_at: String,
    pub ends_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category_id: CategoryId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub medicine_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicineSummary {
    pub medicine_id: MedicineId,
    pub name: String,
    pub category_id: CategoryId,
    pub category_name: String,
    pub stock_quantity: i64,
    pub unit_price_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSummary {
    pub appointment_id: AppointmentId,
    pub booking_reference: Uuid,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub doctor_id: EmployeeId,
    pub doctor_name: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSummary {
    pub exam_id: ExamId,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub doctor_id: EmployeeId,
    pub doctor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<AppointmentId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    pub performed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionSummary {
    pub prescription_id: PrescriptionId,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub doctor_id: EmployeeId,
    pub doctor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<AppointmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispensed_at: Option<DateTime<Utc>>,
    pub item_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionItemSummary {
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub dosage: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionDetail {
    #[serde(flatten)]
    pub summary: PrescriptionSummary,
    pub items: Vec<PrescriptionItemSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub account_id: AccountId,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    pub account_id: AccountId,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDepartmentRequest {
    pub account_id: AccountId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEmployeeRequest {
    pub account_id: AccountId,
    pub full_name: String,
    pub role: Role,
    pub department_id: DepartmentId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub hired_at: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEmployeeRequest {
    pub account_id: AccountId,
    pub full_name: String,
    pub department_id: DepartmentId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetShiftRequest {
    pub account_id: AccountId,
    pub weekday: Weekday,
    pub starts_at: String,
    pub ends_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub account_id: AccountId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMedicineRequest {
    pub account_id: AccountId,
    pub name: String,
    pub category_id: CategoryId,
    pub stock_quantity: i64,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub expires_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStockRequest {
    pub account_id: AccountId,
    pub delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub account_id: AccountId,
    pub patient_id: PatientId,
    pub doctor_id: EmployeeId,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub account_id: AccountId,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordExamRequest {
    pub account_id: AccountId,
    pub patient_id: PatientId,
    #[serde(default)]
    pub appointment_id: Option<AppointmentId>,
    pub name: String,
    #[serde(default)]
    pub result_summary: Option<String>,
    pub performed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionItemRequest {
    pub medicine_id: MedicineId,
    pub dosage: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritePrescriptionRequest {
    pub account_id: AccountId,
    pub patient_id: PatientId,
    #[serde(default)]
    pub appointment_id: Option<AppointmentId>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<PrescriptionItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispenseRequest {
    pub account_id: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminDashboard {
    pub patient_count: u64,
    pub employee_count: u64,
    pub department_count: u64,
    pub appointments_today: u64,
    pub low_stock_medicines: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorDashboard {
    pub appointments_today: u64,
    pub upcoming: Vec<AppointmentSummary>,
    pub undispensed_prescriptions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurseDashboard {
    pub appointments_today: u64,
    pub checked_in_today: u64,
    pub low_stock_medicines: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientDashboard {
    pub upcoming: Vec<AppointmentSummary>,
    pub undispensed_prescriptions: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_exam: Option<ExamSummary>,
}
