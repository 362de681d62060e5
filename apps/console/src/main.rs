use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{page_markers, render_table, Column, ListQuery, PageMarker, PortalClient};
use shared::domain::{Capability, Role};
use shared::protocol::{
    AppointmentSummary, CategorySummary, DepartmentSummary, EmployeeSummary, ExamSummary,
    MedicineSummary, PageResult, PatientSummary, PrescriptionSummary,
};

#[derive(Parser, Debug)]
#[command(about = "Terminal front-end for the hospital server")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[arg(long)]
    username: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Patient directory
    Patients(ListArgs),
    /// Department roster
    Departments(ListArgs),
    /// Staff directory
    Employees(ListArgs),
    /// Medicine categories
    Categories(ListArgs),
    /// Medicine inventory
    Medicines(ListArgs),
    /// Appointment book
    Appointments(ListArgs),
    /// Recorded exams
    Exams(ListArgs),
    /// Issued prescriptions
    Prescriptions(ListArgs),
    /// The dashboard for the logged-in role
    Dashboard,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 10)]
    limit: u32,
    /// Column key to sort by (repeatable behavior: --desc flips direction)
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    desc: bool,
    /// Filter as key=value; pass value "all" to clear a selection
    #[arg(long, value_parser = parse_filter)]
    filter: Vec<(String, String)>,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err("filters take the form key=value".to_string()),
    }
}

fn build_query(args: &ListArgs) -> ListQuery {
    let mut query = ListQuery::new();
    if let Some(search) = &args.search {
        query.set_search(search.clone());
    }
    if let Some(sort) = &args.sort {
        query.toggle_sort(sort);
        if args.desc {
            query.toggle_sort(sort);
        }
    }
    for (key, value) in &args.filter {
        query.set_filter(key.clone(), value.clone());
    }
    query.set_limit(args.limit);
    query.set_page(args.page);
    query
}

fn footer(current_page: u32, total_pages: u32, total_items: u64) -> String {
    let markers: Vec<String> = page_markers(current_page, total_pages)
        .into_iter()
        .map(|marker| match marker {
            PageMarker::Page(page) if page == current_page => format!("[{page}]"),
            other => other.to_string(),
        })
        .collect();
    if markers.is_empty() {
        format!("{total_items} row(s)")
    } else {
        format!("{total_items} row(s)   pages: {}", markers.join(" "))
    }
}

fn print_page<T>(columns: &[Column<T>], page: &PageResult<T>) {
    print!("{}", render_table(columns, &page.items));
    println!("{}", footer(page.page, page.total_pages, page.total_items));
}

fn require_view(client: &PortalClient, capability: Capability) -> Result<()> {
    if client.can_view(capability) {
        Ok(())
    } else {
        bail!("your role cannot open this view");
    }
}

fn money(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

fn patient_columns() -> Vec<Column<PatientSummary>> {
    vec![
        Column::new("id", "ID", |row: &PatientSummary| row.patient_id.0.to_string()),
        Column::new("name", "Name", |row: &PatientSummary| row.full_name.clone()),
        Column::new("date_of_birth", "Born", |row: &PatientSummary| {
            row.date_of_birth.to_string()
        }),
        Column::new("gender", "Gender", |row: &PatientSummary| {
            row.gender.as_str().to_string()
        }),
        Column::new("phone", "Phone", |row: &PatientSummary| {
            row.phone.clone().unwrap_or_default()
        }),
        Column::new("email", "Email", |row: &PatientSummary| {
            row.email.clone().unwrap_or_default()
        }),
    ]
}

fn department_columns() -> Vec<Column<DepartmentSummary>> {
    vec![
        Column::new("id", "ID", |row: &DepartmentSummary| {
            row.department_id.0.to_string()
        }),
        Column::new("name", "Name", |row: &DepartmentSummary| row.name.clone()),
        Column::new("employee_count", "Staff", |row: &DepartmentSummary| {
            row.employee_count.to_string()
        }),
        Column::new("description", "Description", |row: &DepartmentSummary| {
            row.description.clone().unwrap_or_default()
        }),
    ]
}

fn employee_columns() -> Vec<Column<EmployeeSummary>> {
    vec![
        Column::new("id", "ID", |row: &EmployeeSummary| {
            row.employee_id.0.to_string()
        }),
        Column::new("name", "Name", |row: &EmployeeSummary| row.full_name.clone()),
        Column::new("role", "Role", |row: &EmployeeSummary| {
            row.role.as_str().to_string()
        }),
        Column::new("department", "Department", |row: &EmployeeSummary| {
            row.department_name.clone()
        }),
        Column::new("hired_at", "Hired", |row: &EmployeeSummary| {
            row.hired_at.to_string()
        }),
    ]
}

fn category_columns() -> Vec<Column<CategorySummary>> {
    vec![
        Column::new("id", "ID", |row: &CategorySummary| {
            row.category_id.0.to_string()
        }),
        Column::new("name", "Name", |row: &CategorySummary| row.name.clone()),
        Column::new("medicine_count", "Medicines", |row: &CategorySummary| {
            row.medicine_count.to_string()
        }),
    ]
}

fn medicine_columns() -> Vec<Column<MedicineSummary>> {
    vec![
        Column::new("id", "ID", |row: &MedicineSummary| {
            row.medicine_id.0.to_string()
        }),
        Column::new("name", "Name", |row: &MedicineSummary| row.name.clone()),
        Column::new("category", "Category", |row: &MedicineSummary| {
            row.category_name.clone()
        }),
        Column::new("stock", "Stock", |row: &MedicineSummary| {
            row.stock_quantity.to_string()
        }),
        Column::new("price", "Price", |row: &MedicineSummary| {
            money(row.unit_price_cents)
        }),
        Column::new("expires_at", "Expires", |row: &MedicineSummary| {
            row.expires_at
                .map(|date| date.to_string())
                .unwrap_or_default()
        }),
    ]
}

fn appointment_columns() -> Vec<Column<AppointmentSummary>> {
    vec![
        Column::new("id", "ID", |row: &AppointmentSummary| {
            row.appointment_id.0.to_string()
        }),
        Column::new("scheduled_at", "When", |row: &AppointmentSummary| {
            row.scheduled_at.format("%Y-%m-%d %H:%M").to_string()
        }),
        Column::new("patient", "Patient", |row: &AppointmentSummary| {
            row.patient_name.clone()
        }),
        Column::new("doctor", "Doctor", |row: &AppointmentSummary| {
            row.doctor_name.clone()
        }),
        Column::new("status", "Status", |row: &AppointmentSummary| {
            row.status.as_str().to_string()
        }),
        Column::new("reason", "Reason", |row: &AppointmentSummary| {
            row.reason.clone().unwrap_or_default()
        }),
    ]
}

fn exam_columns() -> Vec<Column<ExamSummary>> {
    vec![
        Column::new("id", "ID", |row: &ExamSummary| row.exam_id.0.to_string()),
        Column::new("performed_at", "Performed", |row: &ExamSummary| {
            row.performed_at.format("%Y-%m-%d %H:%M").to_string()
        }),
        Column::new("name", "Exam", |row: &ExamSummary| row.name.clone()),
        Column::new("patient", "Patient", |row: &ExamSummary| {
            row.patient_name.clone()
        }),
        Column::new("doctor", "Doctor", |row: &ExamSummary| {
            row.doctor_name.clone()
        }),
        Column::new("result", "Result", |row: &ExamSummary| {
            row.result_summary.clone().unwrap_or_default()
        }),
    ]
}

fn prescription_columns() -> Vec<Column<PrescriptionSummary>> {
    vec![
        Column::new("id", "ID", |row: &PrescriptionSummary| {
            row.prescription_id.0.to_string()
        }),
        Column::new("issued_at", "Issued", |row: &PrescriptionSummary| {
            row.issued_at.format("%Y-%m-%d").to_string()
        }),
        Column::new("patient", "Patient", |row: &PrescriptionSummary| {
            row.patient_name.clone()
        }),
        Column::new("doctor", "Doctor", |row: &PrescriptionSummary| {
            row.doctor_name.clone()
        }),
        Column::new("items", "Items", |row: &PrescriptionSummary| {
            row.item_count.to_string()
        }),
        Column::new("dispensed", "Dispensed", |row: &PrescriptionSummary| {
            row.dispensed_at
                .map(|at| at.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string())
        }),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let mut client = PortalClient::new(cli.server_url);
    let session = client.login(&cli.username).await?;

    match cli.command {
        Command::Patients(args) => {
            require_view(&client, Capability::ViewPatients)?;
            let page = client.list_patients(&build_query(&args)).await?;
            print_page(&patient_columns(), &page);
        }
        Command::Departments(args) => {
            require_view(&client, Capability::ViewStaff)?;
            let page = client.list_departments(&build_query(&args)).await?;
            print_page(&department_columns(), &page);
        }
        Command::Employees(args) => {
            require_view(&client, Capability::ViewStaff)?;
            let page = client.list_employees(&build_query(&args)).await?;
            print_page(&employee_columns(), &page);
        }
        Command::Categories(args) => {
            require_view(&client, Capability::ViewInventory)?;
            let page = client.list_categories(&build_query(&args)).await?;
            print_page(&category_columns(), &page);
        }
        Command::Medicines(args) => {
            require_view(&client, Capability::ViewInventory)?;
            let page = client.list_medicines(&build_query(&args)).await?;
            print_page(&medicine_columns(), &page);
        }
        Command::Appointments(args) => {
            // Patients land here too; the server scopes them to their own rows.
            if session.role != Role::Patient {
                require_view(&client, Capability::ViewAppointments)?;
            }
            let page = client.list_appointments(&build_query(&args)).await?;
            print_page(&appointment_columns(), &page);
        }
        Command::Exams(args) => {
            if session.role != Role::Patient {
                require_view(&client, Capability::ViewClinical)?;
            }
            let page = client.list_exams(&build_query(&args)).await?;
            print_page(&exam_columns(), &page);
        }
        Command::Prescriptions(args) => {
            if session.role != Role::Patient {
                require_view(&client, Capability::ViewClinical)?;
            }
            let page = client.list_prescriptions(&build_query(&args)).await?;
            print_page(&prescription_columns(), &page);
        }
        Command::Dashboard => match session.role {
            Role::Admin => {
                let dashboard = client.admin_dashboard().await?;
                println!("patients:            {}", dashboard.patient_count);
                println!("employees:           {}", dashboard.employee_count);
                println!("departments:         {}", dashboard.department_count);
                println!("appointments today:  {}", dashboard.appointments_today);
                println!("low-stock medicines: {}", dashboard.low_stock_medicines);
            }
            Role::Doctor => {
                let dashboard = client.doctor_dashboard().await?;
                println!("appointments today:        {}", dashboard.appointments_today);
                println!(
                    "undispensed prescriptions: {}",
                    dashboard.undispensed_prescriptions
                );
                if !dashboard.upcoming.is_empty() {
                    println!("next appointments:");
                    print!("{}", render_table(&appointment_columns(), &dashboard.upcoming));
                }
            }
            Role::Nurse => {
                let dashboard = client.nurse_dashboard().await?;
                println!("appointments today:  {}", dashboard.appointments_today);
                println!("checked in today:    {}", dashboard.checked_in_today);
                println!("low-stock medicines: {}", dashboard.low_stock_medicines);
            }
            Role::Patient => {
                let dashboard = client.patient_dashboard().await?;
                println!(
                    "undispensed prescriptions: {}",
                    dashboard.undispensed_prescriptions
                );
                if let Some(exam) = &dashboard.latest_exam {
                    println!(
                        "latest exam: {} on {}",
                        exam.name,
                        exam.performed_at.format("%Y-%m-%d")
                    );
                }
                if !dashboard.upcoming.is_empty() {
                    println!("upcoming appointments:");
                    print!("{}", render_table(&appointment_columns(), &dashboard.upcoming));
                }
            }
        },
    }

    Ok(())
}
