use chrono::{DateTime, NaiveDate, Utc};
use shared::domain::{AppointmentStatus, Gender, Role};
use shared::protocol::SortOrder;
use storage::{PrescriptionItemInput, Storage};

fn on_day(hour: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2030, 9, 2)
        .expect("date")
        .and_hms_opt(hour, 0, 0)
        .expect("time")
        .and_utc()
}

#[tokio::test]
async fn full_clinic_day_flows_through_storage() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let cardiology = storage
        .create_department("Cardiology", Some("heart clinic"))
        .await
        .expect("department");
    let doctor = storage
        .create_employee(
            "Grete Lind",
            Role::Doctor,
            cardiology,
            Some("grete.lind@clinic.test"),
            None,
            NaiveDate::from_ymd_opt(2019, 4, 1).expect("date"),
        )
        .await
        .expect("doctor");
    let patient = storage
        .create_patient(
            "Ada Osei",
            NaiveDate::from_ymd_opt(1992, 11, 3).expect("date"),
            Gender::Female,
            Some("555-0100"),
            Some("ada@example.test"),
        )
        .await
        .expect("patient");

    let appointment = storage
        .create_appointment(patient, doctor, on_day(9), Some("chest pain follow-up"))
        .await
        .expect("appointment");

    // Reception checks the patient in, the doctor completes the visit.
    storage
        .set_appointment_status(appointment, AppointmentStatus::CheckedIn, on_day(9))
        .await
        .expect("check in");
    storage
        .record_exam(
            patient,
            doctor,
            Some(appointment),
            "ECG",
            Some("sinus rhythm"),
            on_day(9),
        )
        .await
        .expect("exam");

    let category = storage
        .create_category("Beta blockers", None)
        .await
        .expect("category");
    let medicine = storage
        .create_medicine("Metoprolol 50mg", category, 30, 899, None)
        .await
        .expect("medicine");
    let prescription = storage
        .create_prescription(
            patient,
            doctor,
            Some(appointment),
            Some("morning dose"),
            on_day(10),
            &[PrescriptionItemInput {
                medicine_id: medicine,
                dosage: "1 tablet daily".to_string(),
                quantity: 28,
            }],
        )
        .await
        .expect("prescription");

    storage
        .set_appointment_status(appointment, AppointmentStatus::Completed, on_day(10))
        .await
        .expect("complete");
    storage
        .dispense_prescription(prescription, on_day(11))
        .await
        .expect("dispense")
        .expect("known prescription");

    let stocked = storage
        .get_medicine(medicine)
        .await
        .expect("medicine")
        .expect("row");
    assert_eq!(stocked.stock_quantity, 2);

    let (completed, total) = storage
        .list_appointments(
            Some("chest"),
            Some(AppointmentStatus::Completed),
            Some(doctor),
            Some(patient),
            Some((on_day(0), on_day(23))),
            Some("scheduled_at"),
            SortOrder::Asc,
            1,
            10,
        )
        .await
        .expect("list");
    assert_eq!(total, 1);
    assert_eq!(completed[0].appointment_id, appointment);

    let latest = storage
        .latest_exam_for_patient(patient)
        .await
        .expect("latest exam")
        .expect("exam recorded");
    assert_eq!(latest.appointment_id, Some(appointment));

    assert_eq!(storage.count_patients().await.expect("count"), 1);
    assert_eq!(
        storage
            .count_appointments_between(on_day(0), on_day(23))
            .await
            .expect("count"),
        1
    );
    assert_eq!(
        storage
            .count_undispensed_prescriptions_for_patient(patient)
            .await
            .expect("count"),
        0
    );
    assert_eq!(
        storage
            .count_low_stock_medicines(10)
            .await
            .expect("count"),
        1
    );
}
