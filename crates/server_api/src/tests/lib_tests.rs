use super::*;
use shared::protocol::PrescriptionItemRequest;

struct Fixture {
    ctx: ApiContext,
    admin: AccountId,
    doctor_account: AccountId,
    nurse_account: AccountId,
    patient_account: AccountId,
    doctor: EmployeeId,
    nurse: EmployeeId,
    patient: PatientId,
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("date")
}

fn at(hour: u32) -> DateTime<Utc> {
    date(2030, 5, 20)
        .and_hms_opt(hour, 0, 0)
        .expect("time")
        .and_utc()
}

async fn setup() -> Fixture {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let department = storage
        .create_department("Cardiology", None)
        .await
        .expect("department");
    let doctor = storage
        .create_employee(
            "Grete Lind",
            Role::Doctor,
            department,
            None,
            None,
            date(2019, 4, 1),
        )
        .await
        .expect("doctor");
    let nurse = storage
        .create_employee(
            "Maarja Tamm",
            Role::Nurse,
            department,
            None,
            None,
            date(2021, 9, 1),
        )
        .await
        .expect("nurse");
    let patient = storage
        .create_patient("Ada Osei", date(1992, 11, 3), Gender::Female, None, None)
        .await
        .expect("patient");
    let admin = storage
        .create_account("admin", Role::Admin, None, None)
        .await
        .expect("account");
    let doctor_account = storage
        .create_account("grete", Role::Doctor, Some(doctor), None)
        .await
        .expect("account");
    let nurse_account = storage
        .create_account("maarja", Role::Nurse, Some(nurse), None)
        .await
        .expect("account");
    let patient_account = storage
        .create_account("ada", Role::Patient, None, Some(patient))
        .await
        .expect("account");
    Fixture {
        ctx: ApiContext { storage },
        admin,
        doctor_account,
        nurse_account,
        patient_account,
        doctor,
        nurse,
        patient,
    }
}

#[tokio::test]
async fn unknown_account_is_unauthorized() {
    let fixture = setup().await;
    let err = list_patients(&fixture.ctx, AccountId(9999), &PageRequest::default())
        .await
        .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Unauthorized));
}

#[tokio::test]
async fn login_resolves_known_usernames_only() {
    let fixture = setup().await;
    let session = login(&fixture.ctx, "grete").await.expect("login");
    assert_eq!(session.role, Role::Doctor);
    assert_eq!(session.employee_id, Some(fixture.doctor));

    let err = login(&fixture.ctx, "nobody").await.expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::NotFound));
}

#[tokio::test]
async fn patient_accounts_cannot_browse_patient_lists() {
    let fixture = setup().await;
    let err = list_patients(&fixture.ctx, fixture.patient_account, &PageRequest::default())
        .await
        .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Forbidden));

    let own = get_patient(&fixture.ctx, fixture.patient_account, fixture.patient)
        .await
        .expect("own record");
    assert_eq!(own.full_name, "Ada Osei");

    let other = fixture
        .ctx
        .storage
        .create_patient("Bruno Keller", date(1985, 1, 2), Gender::Male, None, None)
        .await
        .expect("patient");
    let err = get_patient(&fixture.ctx, fixture.patient_account, other)
        .await
        .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Forbidden));
}

#[tokio::test]
async fn nurse_cannot_manage_staff_or_inventory() {
    let fixture = setup().await;
    let err = create_department(
        &fixture.ctx,
        &CreateDepartmentRequest {
            account_id: fixture.nurse_account,
            name: "Oncology".to_string(),
            description: None,
        },
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Forbidden));

    // Nurses read inventory but cannot change it.
    list_medicines(&fixture.ctx, fixture.nurse_account, &PageRequest::default())
        .await
        .expect("view inventory");
}

#[tokio::test]
async fn malformed_filters_are_rejected_before_storage() {
    let fixture = setup().await;
    let mut request = PageRequest::default();
    request
        .filters
        .insert("category_id".to_string(), "abc".to_string());
    let err = list_medicines(&fixture.ctx, fixture.admin, &request)
        .await
        .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));
}

#[tokio::test]
async fn paging_metadata_follows_the_request() {
    let fixture = setup().await;
    for index in 0..11 {
        fixture
            .ctx
            .storage
            .create_patient(
                &format!("Patient {index:02}"),
                date(1990, 1, 1),
                Gender::Other,
                None,
                None,
            )
            .await
            .expect("patient");
    }

    let request = PageRequest {
        page: 3,
        limit: 5,
        ..PageRequest::default()
    };
    let result = list_patients(&fixture.ctx, fixture.admin, &request)
        .await
        .expect("page");
    // 11 seeded plus the fixture patient.
    assert_eq!(result.total_items, 12);
    assert_eq!(result.total_pages, 3);
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.page, 3);
    assert_eq!(result.page_size, 5);
}

#[tokio::test]
async fn appointments_require_a_real_doctor() {
    let fixture = setup().await;
    let err = create_appointment(
        &fixture.ctx,
        &CreateAppointmentRequest {
            account_id: fixture.admin,
            patient_id: fixture.patient,
            doctor_id: fixture.nurse,
            scheduled_at: at(9),
            reason: None,
        },
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));

    let err = create_appointment(
        &fixture.ctx,
        &CreateAppointmentRequest {
            account_id: fixture.admin,
            patient_id: PatientId(404),
            doctor_id: fixture.doctor,
            scheduled_at: at(9),
            reason: None,
        },
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));
}

#[tokio::test]
async fn appointment_status_walks_the_transition_graph() {
    let fixture = setup().await;
    let appointment = create_appointment(
        &fixture.ctx,
        &CreateAppointmentRequest {
            account_id: fixture.admin,
            patient_id: fixture.patient,
            doctor_id: fixture.doctor,
            scheduled_at: at(9),
            reason: Some("checkup".to_string()),
        },
    )
    .await
    .expect("appointment");
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);

    let err = update_appointment_status(
        &fixture.ctx,
        appointment.appointment_id,
        &UpdateAppointmentStatusRequest {
            account_id: fixture.nurse_account,
            status: AppointmentStatus::Completed,
        },
        at(9),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));

    let checked_in = update_appointment_status(
        &fixture.ctx,
        appointment.appointment_id,
        &UpdateAppointmentStatusRequest {
            account_id: fixture.nurse_account,
            status: AppointmentStatus::CheckedIn,
        },
        at(9),
    )
    .await
    .expect("check in");
    assert_eq!(checked_in.status, AppointmentStatus::CheckedIn);

    let completed = update_appointment_status(
        &fixture.ctx,
        appointment.appointment_id,
        &UpdateAppointmentStatusRequest {
            account_id: fixture.doctor_account,
            status: AppointmentStatus::Completed,
        },
        at(10),
    )
    .await
    .expect("complete");
    assert_eq!(completed.status, AppointmentStatus::Completed);

    let err = update_appointment_status(
        &fixture.ctx,
        appointment.appointment_id,
        &UpdateAppointmentStatusRequest {
            account_id: fixture.admin,
            status: AppointmentStatus::Cancelled,
        },
        at(11),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));
}

#[tokio::test]
async fn patients_see_only_their_own_appointments() {
    let fixture = setup().await;
    let other_patient = fixture
        .ctx
        .storage
        .create_patient("Bruno Keller", date(1985, 1, 2), Gender::Male, None, None)
        .await
        .expect("patient");
    fixture
        .ctx
        .storage
        .create_appointment(fixture.patient, fixture.doctor, at(9), None)
        .await
        .expect("appointment");
    fixture
        .ctx
        .storage
        .create_appointment(other_patient, fixture.doctor, at(10), None)
        .await
        .expect("appointment");

    // Even an explicit filter for the other patient is overridden.
    let mut request = PageRequest::default();
    request
        .filters
        .insert("patient_id".to_string(), other_patient.0.to_string());
    let result = list_appointments(&fixture.ctx, fixture.patient_account, &request)
        .await
        .expect("list");
    assert_eq!(result.total_items, 1);
    assert_eq!(result.items[0].patient_id, fixture.patient);

    let staff_view = list_appointments(&fixture.ctx, fixture.nurse_account, &PageRequest::default())
        .await
        .expect("list");
    assert_eq!(staff_view.total_items, 2);
}

#[tokio::test]
async fn prescription_lifecycle_enforces_roles_and_stock() {
    let fixture = setup().await;
    let category = fixture
        .ctx
        .storage
        .create_category("Beta blockers", None)
        .await
        .expect("category");
    let medicine = fixture
        .ctx
        .storage
        .create_medicine("Metoprolol 50mg", category, 10, 899, None)
        .await
        .expect("medicine");

    let err = write_prescription(
        &fixture.ctx,
        &WritePrescriptionRequest {
            account_id: fixture.doctor_account,
            patient_id: fixture.patient,
            appointment_id: None,
            notes: None,
            items: Vec::new(),
        },
        at(9),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));

    let detail = write_prescription(
        &fixture.ctx,
        &WritePrescriptionRequest {
            account_id: fixture.doctor_account,
            patient_id: fixture.patient,
            appointment_id: None,
            notes: Some("morning dose".to_string()),
            items: vec![PrescriptionItemRequest {
                medicine_id: medicine,
                dosage: "1 tablet daily".to_string(),
                quantity: 4,
            }],
        },
        at(9),
    )
    .await
    .expect("prescription");
    assert_eq!(detail.items.len(), 1);
    assert!(detail.summary.dispensed_at.is_none());

    let err = dispense_prescription(
        &fixture.ctx,
        fixture.nurse_account,
        detail.summary.prescription_id,
        at(10),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Forbidden));

    let dispensed = dispense_prescription(
        &fixture.ctx,
        fixture.admin,
        detail.summary.prescription_id,
        at(10),
    )
    .await
    .expect("dispense");
    assert!(dispensed.dispensed_at.is_some());

    let err = dispense_prescription(
        &fixture.ctx,
        fixture.admin,
        detail.summary.prescription_id,
        at(11),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));

    let stocked = fixture
        .ctx
        .storage
        .get_medicine(medicine)
        .await
        .expect("medicine")
        .expect("row");
    assert_eq!(stocked.stock_quantity, 6);
}

#[tokio::test]
async fn stock_adjustments_refuse_underflow() {
    let fixture = setup().await;
    let category = fixture
        .ctx
        .storage
        .create_category("Analgesics", None)
        .await
        .expect("category");
    let medicine = fixture
        .ctx
        .storage
        .create_medicine("Ibuprofen 200mg", category, 2, 499, None)
        .await
        .expect("medicine");

    let err = adjust_medicine_stock(
        &fixture.ctx,
        medicine,
        &AdjustStockRequest {
            account_id: fixture.admin,
            delta: -5,
        },
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));

    let err = adjust_medicine_stock(
        &fixture.ctx,
        MedicineId(404),
        &AdjustStockRequest {
            account_id: fixture.admin,
            delta: 1,
        },
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::NotFound));

    let topped_up = adjust_medicine_stock(
        &fixture.ctx,
        medicine,
        &AdjustStockRequest {
            account_id: fixture.admin,
            delta: 8,
        },
    )
    .await
    .expect("adjust");
    assert_eq!(topped_up.stock_quantity, 10);
}

#[tokio::test]
async fn shifts_validate_their_window() {
    let fixture = setup().await;
    let err = set_shift(
        &fixture.ctx,
        fixture.nurse,
        &SetShiftRequest {
            account_id: fixture.admin,
            weekday: chrono::Weekday::Mon,
            starts_at: "9:00".to_string(),
            ends_at: "15:00".to_string(),
        },
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));

    let err = set_shift(
        &fixture.ctx,
        fixture.nurse,
        &SetShiftRequest {
            account_id: fixture.admin,
            weekday: chrono::Weekday::Mon,
            starts_at: "15:00".to_string(),
            ends_at: "09:00".to_string(),
        },
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));

    set_shift(
        &fixture.ctx,
        fixture.nurse,
        &SetShiftRequest {
            account_id: fixture.admin,
            weekday: chrono::Weekday::Mon,
            starts_at: "09:00".to_string(),
            ends_at: "15:00".to_string(),
        },
    )
    .await
    .expect("shift");

    let shifts = employee_shifts(&fixture.ctx, fixture.admin, fixture.nurse)
        .await
        .expect("shifts");
    assert_eq!(shifts.len(), 1);
    assert_eq!(shifts[0].starts_at, "09:00");
}

#[tokio::test]
async fn exams_must_match_the_appointment_patient() {
    let fixture = setup().await;
    let other_patient = fixture
        .ctx
        .storage
        .create_patient("Bruno Keller", date(1985, 1, 2), Gender::Male, None, None)
        .await
        .expect("patient");
    let appointment = fixture
        .ctx
        .storage
        .create_appointment(other_patient, fixture.doctor, at(9), None)
        .await
        .expect("appointment");

    let err = record_exam(
        &fixture.ctx,
        &RecordExamRequest {
            account_id: fixture.doctor_account,
            patient_id: fixture.patient,
            appointment_id: Some(appointment),
            name: "ECG".to_string(),
            result_summary: None,
            performed_at: at(9),
        },
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));

    let exam = record_exam(
        &fixture.ctx,
        &RecordExamRequest {
            account_id: fixture.doctor_account,
            patient_id: fixture.patient,
            appointment_id: None,
            name: "ECG".to_string(),
            result_summary: Some("normal".to_string()),
            performed_at: at(9),
        },
    )
    .await
    .expect("exam");
    assert_eq!(exam.doctor_name, "Grete Lind");
}

#[tokio::test]
async fn dashboards_are_scoped_per_role() {
    let fixture = setup().await;
    fixture
        .ctx
        .storage
        .create_appointment(fixture.patient, fixture.doctor, at(9), None)
        .await
        .expect("appointment");
    record_exam(
        &fixture.ctx,
        &RecordExamRequest {
            account_id: fixture.doctor_account,
            patient_id: fixture.patient,
            appointment_id: None,
            name: "ECG".to_string(),
            result_summary: None,
            performed_at: at(8),
        },
    )
    .await
    .expect("exam");

    let admin_view = admin_dashboard(&fixture.ctx, fixture.admin, at(12))
        .await
        .expect("dashboard");
    assert_eq!(admin_view.patient_count, 1);
    assert_eq!(admin_view.employee_count, 2);
    assert_eq!(admin_view.department_count, 1);
    assert_eq!(admin_view.appointments_today, 1);

    let doctor_view = doctor_dashboard(&fixture.ctx, fixture.doctor_account, at(7))
        .await
        .expect("dashboard");
    assert_eq!(doctor_view.appointments_today, 1);
    assert_eq!(doctor_view.upcoming.len(), 1);

    let patient_view = patient_dashboard(&fixture.ctx, fixture.patient_account, at(7))
        .await
        .expect("dashboard");
    assert_eq!(patient_view.upcoming.len(), 1);
    assert_eq!(
        patient_view.latest_exam.as_ref().map(|exam| exam.name.as_str()),
        Some("ECG")
    );

    let err = admin_dashboard(&fixture.ctx, fixture.nurse_account, at(12))
        .await
        .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Forbidden));

    let nurse_view = nurse_dashboard(&fixture.ctx, fixture.nurse_account, at(12))
        .await
        .expect("dashboard");
    assert_eq!(nurse_view.appointments_today, 1);
}

#[tokio::test]
async fn sentinel_filter_values_behave_like_no_filter() {
    let fixture = setup().await;
    let appointment = fixture
        .ctx
        .storage
        .create_appointment(fixture.patient, fixture.doctor, at(9), None)
        .await
        .expect("appointment");
    fixture
        .ctx
        .storage
        .set_appointment_status(appointment, AppointmentStatus::Cancelled, at(9))
        .await
        .expect("status");
    fixture
        .ctx
        .storage
        .create_appointment(fixture.patient, fixture.doctor, at(10), None)
        .await
        .expect("appointment");

    // A dropdown that still shows "all" encodes to no filter at all.
    let request = PageRequest::from_query_pairs([("status", "all"), ("doctor_id", "")]);
    assert!(request.filters.is_empty());
    let result = list_appointments(&fixture.ctx, fixture.admin, &request)
        .await
        .expect("list");
    assert_eq!(result.total_items, 2);
}

#[tokio::test]
async fn department_create_lists_with_counts() {
    let fixture = setup().await;
    let created = create_department(
        &fixture.ctx,
        &CreateDepartmentRequest {
            account_id: fixture.admin,
            name: "Radiology".to_string(),
            description: Some("imaging".to_string()),
        },
    )
    .await
    .expect("department");
    assert_eq!(created.employee_count, 0);

    let employee = create_employee(
        &fixture.ctx,
        &CreateEmployeeRequest {
            account_id: fixture.admin,
            full_name: "Ines Duarte".to_string(),
            role: Role::Doctor,
            department_id: created.department_id,
            email: None,
            phone: None,
            hired_at: date(2022, 2, 1),
        },
    )
    .await
    .expect("employee");
    assert_eq!(employee.department_name, "Radiology");

    let request = PageRequest {
        sort_by: Some("name".to_string()),
        ..PageRequest::default()
    };
    let departments = list_departments(&fixture.ctx, fixture.admin, &request)
        .await
        .expect("list");
    assert_eq!(departments.total_items, 2);
    let radiology = departments
        .items
        .iter()
        .find(|dept| dept.name == "Radiology")
        .expect("radiology");
    assert_eq!(radiology.employee_count, 1);

    let err = create_employee(
        &fixture.ctx,
        &CreateEmployeeRequest {
            account_id: fixture.admin,
            full_name: "Ghost".to_string(),
            role: Role::Nurse,
            department_id: DepartmentId(404),
            email: None,
            phone: None,
            hired_at: date(2022, 2, 1),
        },
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));
}
