use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc, Weekday};
use clap::{Parser, Subcommand};
use shared::domain::{CategoryId, DepartmentId, EmployeeId, Gender, PatientId, Role};
use storage::{PrescriptionItemInput, Storage};

#[derive(Parser, Debug)]
#[command(about = "Admin and seeding utilities operating directly on the database")]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/hospital.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::parse(raw).ok_or_else(|| "expected admin, doctor, nurse, or patient".to_string())
}

fn parse_gender(raw: &str) -> Result<Gender, String> {
    Gender::parse(raw).ok_or_else(|| "expected female, male, or other".to_string())
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateDepartment {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    CreateEmployee {
        full_name: String,
        #[arg(value_parser = parse_role)]
        role: Role,
        department_id: i64,
        hired_at: NaiveDate,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    CreatePatient {
        full_name: String,
        date_of_birth: NaiveDate,
        #[arg(value_parser = parse_gender)]
        gender: Gender,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    CreateCategory {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    CreateMedicine {
        name: String,
        category_id: i64,
        stock_quantity: i64,
        unit_price_cents: i64,
        #[arg(long)]
        expires_at: Option<NaiveDate>,
    },
    CreateAccount {
        username: String,
        #[arg(value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        employee_id: Option<i64>,
        #[arg(long)]
        patient_id: Option<i64>,
    },
    /// Populate a small working data set for local development
    SeedDemo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateDepartment { name, description } => {
            let department_id = storage
                .create_department(&name, description.as_deref())
                .await?;
            println!("created department_id={}", department_id.0);
        }
        Command::CreateEmployee {
            full_name,
            role,
            department_id,
            hired_at,
            email,
            phone,
        } => {
            let employee_id = storage
                .create_employee(
                    &full_name,
                    role,
                    DepartmentId(department_id),
                    email.as_deref(),
                    phone.as_deref(),
                    hired_at,
                )
                .await?;
            println!("created employee_id={}", employee_id.0);
        }
        Command::CreatePatient {
            full_name,
            date_of_birth,
            gender,
            phone,
            email,
        } => {
            let patient_id = storage
                .create_patient(
                    &full_name,
                    date_of_birth,
                    gender,
                    phone.as_deref(),
                    email.as_deref(),
                )
                .await?;
            println!("created patient_id={}", patient_id.0);
        }
        Command::CreateCategory { name, description } => {
            let category_id = storage
                .create_category(&name, description.as_deref())
                .await?;
            println!("created category_id={}", category_id.0);
        }
        Command::CreateMedicine {
            name,
            category_id,
            stock_quantity,
            unit_price_cents,
            expires_at,
        } => {
            let medicine_id = storage
                .create_medicine(
                    &name,
                    CategoryId(category_id),
                    stock_quantity,
                    unit_price_cents,
                    expires_at,
                )
                .await?;
            println!("created medicine_id={}", medicine_id.0);
        }
        Command::CreateAccount {
            username,
            role,
            employee_id,
            patient_id,
        } => {
            let account_id = storage
                .create_account(
                    &username,
                    role,
                    employee_id.map(EmployeeId),
                    patient_id.map(PatientId),
                )
                .await?;
            println!("created account_id={}", account_id.0);
        }
        Command::SeedDemo => seed_demo(&storage).await?,
    }

    Ok(())
}

async fn seed_demo(storage: &Storage) -> Result<()> {
    let cardiology = storage
        .create_department("Cardiology", Some("heart clinic"))
        .await?;
    let radiology = storage
        .create_department("Radiology", Some("imaging"))
        .await?;

    let doctor = storage
        .create_employee(
            "Grete Lind",
            Role::Doctor,
            cardiology,
            Some("grete.lind@clinic.test"),
            Some("555-0199"),
            NaiveDate::from_ymd_opt(2019, 4, 1).unwrap_or_default(),
        )
        .await?;
    let nurse = storage
        .create_employee(
            "Maarja Tamm",
            Role::Nurse,
            radiology,
            Some("maarja.tamm@clinic.test"),
            None,
            NaiveDate::from_ymd_opt(2021, 9, 1).unwrap_or_default(),
        )
        .await?;
    storage.upsert_shift(doctor, Weekday::Mon, "08:00", "14:00").await?;
    storage.upsert_shift(doctor, Weekday::Wed, "12:00", "18:00").await?;
    storage.upsert_shift(nurse, Weekday::Tue, "07:00", "15:00").await?;

    let names = [
        ("Ada Osei", Gender::Female),
        ("Bruno Keller", Gender::Male),
        ("Chiara Ricci", Gender::Female),
        ("Derya Aksoy", Gender::Female),
        ("Emil Novak", Gender::Male),
        ("Farah Haddad", Gender::Female),
        ("Goran Ilic", Gender::Male),
        ("Hana Sato", Gender::Female),
        ("Ivo Petrov", Gender::Male),
        ("Jana Dvorak", Gender::Female),
        ("Kofi Mensah", Gender::Male),
        ("Lena Vogel", Gender::Female),
    ];
    let mut patients = Vec::new();
    for (index, (name, gender)) in names.iter().enumerate() {
        let birth_year = 1960 + (index as i32 * 3) % 40;
        let patient = storage
            .create_patient(
                name,
                NaiveDate::from_ymd_opt(birth_year, 6, 15).unwrap_or_default(),
                *gender,
                Some(&format!("555-01{index:02}")),
                None,
            )
            .await?;
        patients.push(patient);
    }

    let analgesics = storage.create_category("Analgesics", None).await?;
    let antibiotics = storage.create_category("Antibiotics", None).await?;
    storage
        .create_medicine("Ibuprofen 200mg", analgesics, 120, 499, None)
        .await?;
    let amoxicillin = storage
        .create_medicine("Amoxicillin 500mg", antibiotics, 8, 1250, None)
        .await?;
    storage
        .create_medicine("Paracetamol 500mg", analgesics, 200, 349, None)
        .await?;

    let today = Utc::now();
    for (index, patient) in patients.iter().take(4).enumerate() {
        let scheduled_at = slot(today, 9 + index as i64);
        storage
            .create_appointment(*patient, doctor, scheduled_at, Some("checkup"))
            .await?;
    }
    let first_patient = patients.first().copied();
    if let Some(patient) = first_patient {
        storage
            .record_exam(patient, doctor, None, "ECG", Some("sinus rhythm"), today)
            .await?;
        storage
            .create_prescription(
                patient,
                doctor,
                None,
                Some("with food"),
                today,
                &[PrescriptionItemInput {
                    medicine_id: amoxicillin,
                    dosage: "1 capsule three times daily".to_string(),
                    quantity: 21,
                }],
            )
            .await?;
    }

    let admin = storage.create_account("admin", Role::Admin, None, None).await?;
    storage
        .create_account("grete", Role::Doctor, Some(doctor), None)
        .await?;
    storage
        .create_account("maarja", Role::Nurse, Some(nurse), None)
        .await?;
    if let Some(patient) = first_patient {
        storage
            .create_account("ada", Role::Patient, None, Some(patient))
            .await?;
    }

    println!(
        "seeded demo data: {} patients, accounts admin/grete/maarja/ada (admin account_id={})",
        patients.len(),
        admin.0
    );
    Ok(())
}

fn slot(day: DateTime<Utc>, hour: i64) -> DateTime<Utc> {
    day.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc() + Duration::hours(hour))
        .unwrap_or(day)
}
