use super::*;

async fn setup() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

async fn seed_department(storage: &Storage, name: &str) -> DepartmentId {
    storage
        .create_department(name, Some("ward"))
        .await
        .expect("department")
}

async fn seed_doctor(storage: &Storage, department: DepartmentId, name: &str) -> EmployeeId {
    storage
        .create_employee(
            name,
            Role::Doctor,
            department,
            Some(&format!(
                "{}@clinic.test",
                name.to_lowercase().replace(' ', ".")
            )),
            None,
            NaiveDate::from_ymd_opt(2020, 3, 1).expect("date"),
        )
        .await
        .expect("doctor")
}

async fn seed_patient(storage: &Storage, name: &str) -> PatientId {
    storage
        .create_patient(
            name,
            NaiveDate::from_ymd_opt(1990, 6, 15).expect("date"),
            Gender::Female,
            Some("555-0100"),
            None,
        )
        .await
        .expect("patient")
}

fn at(hour: u32) -> DateTime<Utc> {
    chrono::NaiveDate::from_ymd_opt(2030, 5, 20)
        .expect("date")
        .and_hms_opt(hour, 0, 0)
        .expect("time")
        .and_utc()
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = setup().await;
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("temp dir");
    let db_path = temp_root.path().join("nested").join("hospital.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn paginates_patients_and_reports_totals() {
    let storage = setup().await;
    for index in 0..25 {
        seed_patient(&storage, &format!("Patient {index:02}")).await;
    }

    let (page_one, total) = storage
        .list_patients(None, None, None, SortOrder::Asc, 1, 10)
        .await
        .expect("page 1");
    assert_eq!(page_one.len(), 10);
    assert_eq!(total, 25);

    let (page_three, total) = storage
        .list_patients(None, None, None, SortOrder::Asc, 3, 10)
        .await
        .expect("page 3");
    assert_eq!(page_three.len(), 5);
    assert_eq!(total, 25);

    let (past_the_end, _) = storage
        .list_patients(None, None, None, SortOrder::Asc, 9, 10)
        .await
        .expect("page 9");
    assert!(past_the_end.is_empty());
}

#[tokio::test]
async fn searches_and_sorts_patients() {
    let storage = setup().await;
    seed_patient(&storage, "Ada Osei").await;
    seed_patient(&storage, "Bruno Keller").await;
    seed_patient(&storage, "Adaeze Obi").await;

    let (matches, total) = storage
        .list_patients(Some("ada"), None, Some("name"), SortOrder::Desc, 1, 10)
        .await
        .expect("search");
    assert_eq!(total, 2);
    assert_eq!(matches[0].full_name, "Adaeze Obi");
    assert_eq!(matches[1].full_name, "Ada Osei");
}

#[tokio::test]
async fn filters_patients_by_gender() {
    let storage = setup().await;
    seed_patient(&storage, "Ada Osei").await;
    storage
        .create_patient(
            "Bruno Keller",
            NaiveDate::from_ymd_opt(1985, 1, 2).expect("date"),
            Gender::Male,
            None,
            None,
        )
        .await
        .expect("patient");

    let (rows, total) = storage
        .list_patients(None, Some(Gender::Male), None, SortOrder::Asc, 1, 10)
        .await
        .expect("filter");
    assert_eq!(total, 1);
    assert_eq!(rows[0].full_name, "Bruno Keller");
}

#[tokio::test]
async fn department_listing_carries_employee_counts() {
    let storage = setup().await;
    let cardiology = seed_department(&storage, "Cardiology").await;
    let radiology = seed_department(&storage, "Radiology").await;
    seed_doctor(&storage, cardiology, "Grete Lind").await;
    seed_doctor(&storage, cardiology, "Ines Duarte").await;

    let (rows, total) = storage
        .list_departments(None, Some("name"), SortOrder::Asc, 1, 10)
        .await
        .expect("departments");
    assert_eq!(total, 2);
    assert_eq!(rows[0].department_id, cardiology);
    assert_eq!(rows[0].employee_count, 2);
    let radiology_row = rows
        .iter()
        .find(|row| row.department_id == radiology)
        .expect("radiology");
    assert_eq!(radiology_row.employee_count, 0);
}

#[tokio::test]
async fn filters_employees_by_department_and_role() {
    let storage = setup().await;
    let cardiology = seed_department(&storage, "Cardiology").await;
    let radiology = seed_department(&storage, "Radiology").await;
    seed_doctor(&storage, cardiology, "Grete Lind").await;
    storage
        .create_employee(
            "Maarja Tamm",
            Role::Nurse,
            radiology,
            None,
            None,
            NaiveDate::from_ymd_opt(2021, 9, 1).expect("date"),
        )
        .await
        .expect("nurse");

    let (rows, total) = storage
        .list_employees(None, Some(radiology), None, None, SortOrder::Asc, 1, 10)
        .await
        .expect("by department");
    assert_eq!(total, 1);
    assert_eq!(rows[0].full_name, "Maarja Tamm");
    assert_eq!(rows[0].department_name, "Radiology");

    let (rows, total) = storage
        .list_employees(None, None, Some(Role::Doctor), None, SortOrder::Asc, 1, 10)
        .await
        .expect("by role");
    assert_eq!(total, 1);
    assert_eq!(rows[0].role, Role::Doctor);
}

#[tokio::test]
async fn upserting_a_shift_replaces_the_same_weekday() {
    let storage = setup().await;
    let department = seed_department(&storage, "Cardiology").await;
    let doctor = seed_doctor(&storage, department, "Grete Lind").await;

    storage
        .upsert_shift(doctor, Weekday::Mon, "08:00", "14:00")
        .await
        .expect("first shift");
    storage
        .upsert_shift(doctor, Weekday::Mon, "09:00", "15:00")
        .await
        .expect("replacement");
    storage
        .upsert_shift(doctor, Weekday::Wed, "10:00", "16:00")
        .await
        .expect("second weekday");

    let shifts = storage
        .list_shifts_for_employee(doctor)
        .await
        .expect("shifts");
    assert_eq!(shifts.len(), 2);
    assert_eq!(shifts[0].weekday, Weekday::Mon);
    assert_eq!(shifts[0].starts_at, "09:00");
    assert_eq!(shifts[1].weekday, Weekday::Wed);
}

#[tokio::test]
async fn medicine_filters_cover_category_and_low_stock() {
    let storage = setup().await;
    let analgesics = storage
        .create_category("Analgesics", None)
        .await
        .expect("category");
    let antibiotics = storage
        .create_category("Antibiotics", None)
        .await
        .expect("category");
    storage
        .create_medicine("Ibuprofen 200mg", analgesics, 120, 499, None)
        .await
        .expect("medicine");
    storage
        .create_medicine("Amoxicillin 500mg", antibiotics, 3, 1250, None)
        .await
        .expect("medicine");

    let (rows, total) = storage
        .list_medicines(None, Some(antibiotics), None, None, SortOrder::Asc, 1, 10)
        .await
        .expect("by category");
    assert_eq!(total, 1);
    assert_eq!(rows[0].category_name, "Antibiotics");

    let (rows, total) = storage
        .list_medicines(None, None, Some(10), None, SortOrder::Asc, 1, 10)
        .await
        .expect("low stock");
    assert_eq!(total, 1);
    assert_eq!(rows[0].name, "Amoxicillin 500mg");
}

#[tokio::test]
async fn stock_adjustments_never_go_negative() {
    let storage = setup().await;
    let category = storage
        .create_category("Analgesics", None)
        .await
        .expect("category");
    let medicine = storage
        .create_medicine("Ibuprofen 200mg", category, 5, 499, None)
        .await
        .expect("medicine");

    let quantity = storage
        .adjust_stock(medicine, -3)
        .await
        .expect("adjust")
        .expect("applied");
    assert_eq!(quantity, 2);

    let refused = storage.adjust_stock(medicine, -10).await.expect("adjust");
    assert!(refused.is_none());

    let unchanged = storage
        .get_medicine(medicine)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(unchanged.stock_quantity, 2);
}

#[tokio::test]
async fn lists_appointments_by_status_and_day_window() {
    let storage = setup().await;
    let department = seed_department(&storage, "Cardiology").await;
    let doctor = seed_doctor(&storage, department, "Grete Lind").await;
    let patient = seed_patient(&storage, "Ada Osei").await;

    let first = storage
        .create_appointment(patient, doctor, at(9), Some("checkup"))
        .await
        .expect("appointment");
    storage
        .create_appointment(patient, doctor, at(11), None)
        .await
        .expect("appointment");

    storage
        .set_appointment_status(first, AppointmentStatus::CheckedIn, at(9))
        .await
        .expect("status");

    let (rows, total) = storage
        .list_appointments(
            None,
            Some(AppointmentStatus::CheckedIn),
            None,
            None,
            None,
            None,
            SortOrder::Asc,
            1,
            10,
        )
        .await
        .expect("by status");
    assert_eq!(total, 1);
    assert_eq!(rows[0].appointment_id, first);
    assert_eq!(rows[0].patient_name, "Ada Osei");
    assert_eq!(rows[0].doctor_name, "Grete Lind");
    assert!(!rows[0].booking_reference.is_nil());

    let day = storage
        .count_appointments_between(at(0), at(23))
        .await
        .expect("count");
    assert_eq!(day, 2);
    let morning = storage
        .count_appointments_between(at(8), at(10))
        .await
        .expect("count");
    assert_eq!(morning, 1);
}

#[tokio::test]
async fn upcoming_appointments_skip_closed_ones() {
    let storage = setup().await;
    let department = seed_department(&storage, "Cardiology").await;
    let doctor = seed_doctor(&storage, department, "Grete Lind").await;
    let patient = seed_patient(&storage, "Ada Osei").await;

    let cancelled = storage
        .create_appointment(patient, doctor, at(9), None)
        .await
        .expect("appointment");
    storage
        .set_appointment_status(cancelled, AppointmentStatus::Cancelled, at(8))
        .await
        .expect("status");
    let kept = storage
        .create_appointment(patient, doctor, at(10), None)
        .await
        .expect("appointment");

    let upcoming = storage
        .upcoming_appointments_for_patient(patient, at(0), 5)
        .await
        .expect("upcoming");
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].appointment_id, kept);

    let for_doctor = storage
        .upcoming_appointments_for_doctor(doctor, at(0), 5)
        .await
        .expect("upcoming");
    assert_eq!(for_doctor.len(), 1);
}

#[tokio::test]
async fn latest_exam_wins_by_performed_time() {
    let storage = setup().await;
    let department = seed_department(&storage, "Cardiology").await;
    let doctor = seed_doctor(&storage, department, "Grete Lind").await;
    let patient = seed_patient(&storage, "Ada Osei").await;

    storage
        .record_exam(patient, doctor, None, "ECG", Some("normal"), at(9))
        .await
        .expect("exam");
    storage
        .record_exam(patient, doctor, None, "Echocardiogram", None, at(14))
        .await
        .expect("exam");

    let latest = storage
        .latest_exam_for_patient(patient)
        .await
        .expect("latest")
        .expect("some exam");
    assert_eq!(latest.name, "Echocardiogram");

    let (rows, total) = storage
        .list_exams(Some("ecg"), None, None, None, SortOrder::Asc, 1, 10)
        .await
        .expect("search");
    assert_eq!(total, 1);
    assert_eq!(rows[0].name, "ECG");
}

#[tokio::test]
async fn dispensing_decrements_stock_once() {
    let storage = setup().await;
    let department = seed_department(&storage, "Cardiology").await;
    let doctor = seed_doctor(&storage, department, "Grete Lind").await;
    let patient = seed_patient(&storage, "Ada Osei").await;
    let category = storage
        .create_category("Analgesics", None)
        .await
        .expect("category");
    let medicine = storage
        .create_medicine("Ibuprofen 200mg", category, 10, 499, None)
        .await
        .expect("medicine");

    let prescription = storage
        .create_prescription(
            patient,
            doctor,
            None,
            Some("after meals"),
            at(9),
            &[PrescriptionItemInput {
                medicine_id: medicine,
                dosage: "1 tablet twice daily".to_string(),
                quantity: 4,
            }],
        )
        .await
        .expect("prescription");

    let outcome = storage
        .dispense_prescription(prescription, at(10))
        .await
        .expect("dispense")
        .expect("known prescription");
    assert_eq!(outcome, DispenseOutcome::Dispensed(at(10)));

    let again = storage
        .dispense_prescription(prescription, at(11))
        .await
        .expect("dispense")
        .expect("known prescription");
    assert_eq!(again, DispenseOutcome::AlreadyDispensed);

    let stock = storage
        .get_medicine(medicine)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(stock.stock_quantity, 6);
}

#[tokio::test]
async fn failed_dispense_rolls_back_every_item() {
    let storage = setup().await;
    let department = seed_department(&storage, "Cardiology").await;
    let doctor = seed_doctor(&storage, department, "Grete Lind").await;
    let patient = seed_patient(&storage, "Ada Osei").await;
    let category = storage
        .create_category("Analgesics", None)
        .await
        .expect("category");
    let plentiful = storage
        .create_medicine("Ibuprofen 200mg", category, 50, 499, None)
        .await
        .expect("medicine");
    let scarce = storage
        .create_medicine("Amoxicillin 500mg", category, 1, 1250, None)
        .await
        .expect("medicine");

    let prescription = storage
        .create_prescription(
            patient,
            doctor,
            None,
            None,
            at(9),
            &[
                PrescriptionItemInput {
                    medicine_id: plentiful,
                    dosage: "1 tablet".to_string(),
                    quantity: 2,
                },
                PrescriptionItemInput {
                    medicine_id: scarce,
                    dosage: "1 capsule".to_string(),
                    quantity: 3,
                },
            ],
        )
        .await
        .expect("prescription");

    let outcome = storage
        .dispense_prescription(prescription, at(10))
        .await
        .expect("dispense")
        .expect("known prescription");
    assert_eq!(outcome, DispenseOutcome::OutOfStock(scarce));

    let untouched = storage
        .get_medicine(plentiful)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(untouched.stock_quantity, 50);

    let (rows, _) = storage
        .list_prescriptions(None, None, None, Some(false), None, SortOrder::Asc, 1, 10)
        .await
        .expect("undispensed");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].item_count, 2);
}

#[tokio::test]
async fn account_usernames_are_unique() {
    let storage = setup().await;
    let created = storage
        .create_account("front-desk", Role::Admin, None, None)
        .await
        .expect("account");
    let duplicate = storage
        .create_account("front-desk", Role::Nurse, None, None)
        .await;
    assert!(duplicate.is_err());

    let found = storage
        .find_account("front-desk")
        .await
        .expect("lookup")
        .expect("account");
    assert_eq!(found.account_id, created);
    assert_eq!(found.role, Role::Admin);
    assert!(storage
        .get_account(AccountId(created.0 + 99))
        .await
        .expect("lookup")
        .is_none());
}
