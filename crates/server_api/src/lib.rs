use chrono::{DateTime, Days, NaiveDate, Utc};
use shared::{
    domain::{
        AccountId, AppointmentId, AppointmentStatus, Capability, CategoryId, DepartmentId,
        EmployeeId, Gender, MedicineId, PatientId, PrescriptionId, Role,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        AdjustStockRequest, AdminDashboard, AppointmentSummary, CategorySummary,
        CreateAppointmentRequest, CreateCategoryRequest, CreateDepartmentRequest,
        CreateEmployeeRequest, CreateMedicineRequest, CreatePatientRequest, DepartmentSummary,
        DoctorDashboard, EmployeeSummary, ExamSummary, LoginResponse, MedicineSummary,
        NurseDashboard, PageRequest, PageResult, PatientDashboard, PatientSummary,
        PrescriptionDetail, PrescriptionItemSummary, PrescriptionSummary, RecordExamRequest,
        SetShiftRequest, ShiftSummary, UpdateAppointmentStatusRequest, UpdateEmployeeRequest,
        UpdatePatientRequest, WritePrescriptionRequest,
    },
};
use storage::{
    DispenseOutcome, PrescriptionItemInput, Storage, StoredAccount, StoredAppointment,
    StoredCategory, StoredDepartment, StoredEmployee, StoredExam, StoredMedicine, StoredPatient,
    StoredPrescription, StoredShift,
};
use tracing::warn;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// Medicines with stock below this count surface on dashboards and behind
/// the `low_stock` filter.
pub const LOW_STOCK_THRESHOLD: i64 = 10;

const DASHBOARD_UPCOMING_LIMIT: u32 = 5;

pub async fn login(ctx: &ApiContext, username: &str) -> Result<LoginResponse, ApiError> {
    let account = ctx
        .storage
        .find_account(username)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "unknown username"))?;
    Ok(LoginResponse {
        account_id: account.account_id,
        role: account.role,
        employee_id: account.employee_id,
        patient_id: account.patient_id,
    })
}

pub async fn list_patients(
    ctx: &ApiContext,
    account_id: AccountId,
    request: &PageRequest,
) -> Result<PageResult<PatientSummary>, ApiError> {
    let account = require_account(ctx, account_id).await?;
    ensure_capability(&account, Capability::ViewPatients)?;
    let gender = parse_gender_filter(request)?;
    let (rows, total) = ctx
        .storage
        .list_patients(
            request.search.as_deref(),
            gender,
            request.sort_by.as_deref(),
            request.sort_order,
            request.page,
            request.limit,
        )
        .await
        .map_err(internal)?;
    Ok(page_result(rows, request, total).map(patient_summary))
}

pub async fn get_patient(
    ctx: &ApiContext,
    account_id: AccountId,
    patient_id: PatientId,
) -> Result<PatientSummary, ApiError> {
    let account = require_account(ctx, account_id).await?;
    if account.role == Role::Patient {
        if own_patient_id(&account)? != patient_id {
            return Err(ApiError::new(
                ErrorCode::Forbidden,
                "patients may only read their own record",
            ));
        }
    } else {
        ensure_capability(&account, Capability::ViewPatients)?;
    }
    let patient = ctx
        .storage
        .get_patient(patient_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "patient not found"))?;
    Ok(patient_summary(patient))
}

pub async fn create_patient(
    ctx: &ApiContext,
    request: &CreatePatientRequest,
) -> Result<PatientSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManagePatients)?;
    let full_name = require_name(&request.full_name, "full_name")?;
    let patient_id = ctx
        .storage
        .create_patient(
            full_name,
            request.date_of_birth,
            request.gender,
            request.phone.as_deref(),
            request.email.as_deref(),
        )
        .await
        .map_err(internal)?;
    let patient = ctx
        .storage
        .get_patient(patient_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "patient missing after insert"))?;
    Ok(patient_summary(patient))
}

pub async fn update_patient(
    ctx: &ApiContext,
    patient_id: PatientId,
    request: &UpdatePatientRequest,
) -> Result<PatientSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManagePatients)?;
    let full_name = require_name(&request.full_name, "full_name")?;
    let updated = ctx
        .storage
        .update_patient(
            patient_id,
            full_name,
            request.date_of_birth,
            request.gender,
            request.phone.as_deref(),
            request.email.as_deref(),
        )
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::new(ErrorCode::NotFound, "patient not found"));
    }
    get_patient(ctx, request.account_id, patient_id).await
}

pub async fn delete_patient(
    ctx: &ApiContext,
    account_id: AccountId,
    patient_id: PatientId,
) -> Result<(), ApiError> {
    let account = require_account(ctx, account_id).await?;
    ensure_capability(&account, Capability::ManagePatients)?;
    let referenced = ctx
        .storage
        .count_appointments_for_patient(patient_id)
        .await
        .map_err(internal)?;
    if referenced > 0 {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "patient still has appointments on file",
        ));
    }
    let deleted = ctx
        .storage
        .delete_patient(patient_id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::new(ErrorCode::NotFound, "patient not found"));
    }
    Ok(())
}

pub async fn list_departments(
    ctx: &ApiContext,
    account_id: AccountId,
    request: &PageRequest,
) -> Result<PageResult<DepartmentSummary>, ApiError> {
    let account = require_account(ctx, account_id).await?;
    ensure_capability(&account, Capability::ViewStaff)?;
    let (rows, total) = ctx
        .storage
        .list_departments(
            request.search.as_deref(),
            request.sort_by.as_deref(),
            request.sort_order,
            request.page,
            request.limit,
        )
        .await
        .map_err(internal)?;
    Ok(page_result(rows, request, total).map(department_summary))
}

pub async fn create_department(
    ctx: &ApiContext,
    request: &CreateDepartmentRequest,
) -> Result<DepartmentSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManageStaff)?;
    let name = require_name(&request.name, "name")?;
    let department_id = ctx
        .storage
        .create_department(name, request.description.as_deref())
        .await
        .map_err(|error| ApiError::new(ErrorCode::Validation, error.to_string()))?;
    let department = ctx
        .storage
        .get_department(department_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "department missing after insert"))?;
    Ok(department_summary(department))
}

pub async fn list_employees(
    ctx: &ApiContext,
    account_id: AccountId,
    request: &PageRequest,
) -> Result<PageResult<EmployeeSummary>, ApiError> {
    let account = require_account(ctx, account_id).await?;
    ensure_capability(&account, Capability::ViewStaff)?;
    let department_id = parse_id_filter(request, "department_id")?.map(DepartmentId);
    let role = parse_role_filter(request)?;
    let (rows, total) = ctx
        .storage
        .list_employees(
            request.search.as_deref(),
            department_id,
            role,
            request.sort_by.as_deref(),
            request.sort_order,
            request.page,
            request.limit,
        )
        .await
        .map_err(internal)?;
    Ok(page_result(rows, request, total).map(employee_summary))
}

pub async fn create_employee(
    ctx: &ApiContext,
    request: &CreateEmployeeRequest,
) -> Result<EmployeeSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManageStaff)?;
    let full_name = require_name(&request.full_name, "full_name")?;
    if request.role == Role::Patient {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "employees cannot hold the patient role",
        ));
    }
    require_department(ctx, request.department_id).await?;
    let employee_id = ctx
        .storage
        .create_employee(
            full_name,
            request.role,
            request.department_id,
            request.email.as_deref(),
            request.phone.as_deref(),
            request.hired_at,
        )
        .await
        .map_err(internal)?;
    require_employee(ctx, employee_id).await.map(employee_summary)
}

pub async fn update_employee(
    ctx: &ApiContext,
    employee_id: EmployeeId,
    request: &UpdateEmployeeRequest,
) -> Result<EmployeeSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManageStaff)?;
    let full_name = require_name(&request.full_name, "full_name")?;
    require_department(ctx, request.department_id).await?;
    let updated = ctx
        .storage
        .update_employee(
            employee_id,
            full_name,
            request.department_id,
            request.email.as_deref(),
            request.phone.as_deref(),
        )
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::new(ErrorCode::NotFound, "employee not found"));
    }
    require_employee(ctx, employee_id).await.map(employee_summary)
}

pub async fn employee_shifts(
    ctx: &ApiContext,
    account_id: AccountId,
    employee_id: EmployeeId,
) -> Result<Vec<ShiftSummary>, ApiError> {
    let account = require_account(ctx, account_id).await?;
    ensure_capability(&account, Capability::ViewStaff)?;
    require_employee(ctx, employee_id).await?;
    let shifts = ctx
        .storage
        .list_shifts_for_employee(employee_id)
        .await
        .map_err(internal)?;
    Ok(shifts.into_iter().map(shift_summary).collect())
}

pub async fn set_shift(
    ctx: &ApiContext,
    employee_id: EmployeeId,
    request: &SetShiftRequest,
) -> Result<ShiftSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManageStaff)?;
    require_employee(ctx, employee_id).await?;
    validate_shift_window(&request.starts_at, &request.ends_at)?;
    let shift_id = ctx
        .storage
        .upsert_shift(
            employee_id,
            request.weekday,
            &request.starts_at,
            &request.ends_at,
        )
        .await
        .map_err(internal)?;
    Ok(ShiftSummary {
        shift_id,
        employee_id,
        weekday: request.weekday,
        starts_at: request.starts_at.clone(),
        ends_at: request.ends_at.clone(),
    })
}

pub async fn list_categories(
    ctx: &ApiContext,
    account_id: AccountId,
    request: &PageRequest,
) -> Result<PageResult<CategorySummary>, ApiError> {
    let account = require_account(ctx, account_id).await?;
    ensure_capability(&account, Capability::ViewInventory)?;
    let (rows, total) = ctx
        .storage
        .list_categories(
            request.search.as_deref(),
            request.sort_by.as_deref(),
            request.sort_order,
            request.page,
            request.limit,
        )
        .await
        .map_err(internal)?;
    Ok(page_result(rows, request, total).map(category_summary))
}

pub async fn create_category(
    ctx: &ApiContext,
    request: &CreateCategoryRequest,
) -> Result<CategorySummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManageInventory)?;
    let name = require_name(&request.name, "name")?;
    let category_id = ctx
        .storage
        .create_category(name, request.description.as_deref())
        .await
        .map_err(|error| ApiError::new(ErrorCode::Validation, error.to_string()))?;
    let category = ctx
        .storage
        .get_category(category_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "category missing after insert"))?;
    Ok(category_summary(category))
}

pub async fn list_medicines(
    ctx: &ApiContext,
    account_id: AccountId,
    request: &PageRequest,
) -> Result<PageResult<MedicineSummary>, ApiError> {
    let account = require_account(ctx, account_id).await?;
    ensure_capability(&account, Capability::ViewInventory)?;
    let category_id = parse_id_filter(request, "category_id")?.map(CategoryId);
    let low_stock = parse_bool_filter(request, "low_stock")?
        .filter(|flagged| *flagged)
        .map(|_| LOW_STOCK_THRESHOLD);
    let (rows, total) = ctx
        .storage
        .list_medicines(
            request.search.as_deref(),
            category_id,
            low_stock,
            request.sort_by.as_deref(),
            request.sort_order,
            request.page,
            request.limit,
        )
        .await
        .map_err(internal)?;
    Ok(page_result(rows, request, total).map(medicine_summary))
}

pub async fn create_medicine(
    ctx: &ApiContext,
    request: &CreateMedicineRequest,
) -> Result<MedicineSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManageInventory)?;
    let name = require_name(&request.name, "name")?;
    if request.stock_quantity < 0 || request.unit_price_cents < 0 {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "stock and price must be non-negative",
        ));
    }
    if ctx
        .storage
        .get_category(request.category_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(ApiError::new(ErrorCode::Validation, "unknown category"));
    }
    let medicine_id = ctx
        .storage
        .create_medicine(
            name,
            request.category_id,
            request.stock_quantity,
            request.unit_price_cents,
            request.expires_at,
        )
        .await
        .map_err(internal)?;
    require_medicine(ctx, medicine_id).await.map(medicine_summary)
}

pub async fn adjust_medicine_stock(
    ctx: &ApiContext,
    medicine_id: MedicineId,
    request: &AdjustStockRequest,
) -> Result<MedicineSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManageInventory)?;
    match ctx
        .storage
        .adjust_stock(medicine_id, request.delta)
        .await
        .map_err(internal)?
    {
        Some(_) => require_medicine(ctx, medicine_id).await.map(medicine_summary),
        None => {
            if ctx
                .storage
                .get_medicine(medicine_id)
                .await
                .map_err(internal)?
                .is_none()
            {
                Err(ApiError::new(ErrorCode::NotFound, "medicine not found"))
            } else {
                Err(ApiError::new(
                    ErrorCode::Validation,
                    "stock cannot go below zero",
                ))
            }
        }
    }
}

pub async fn list_appointments(
    ctx: &ApiContext,
    account_id: AccountId,
    request: &PageRequest,
) -> Result<PageResult<AppointmentSummary>, ApiError> {
    let account = require_account(ctx, account_id).await?;
    let mut patient_id = parse_id_filter(request, "patient_id")?.map(PatientId);
    if account.role == Role::Patient {
        patient_id = Some(own_patient_id(&account)?);
    } else {
        ensure_capability(&account, Capability::ViewAppointments)?;
    }
    let status = parse_status_filter(request)?;
    let doctor_id = parse_id_filter(request, "doctor_id")?.map(EmployeeId);
    let window = parse_date_filter(request, "date")?.map(day_bounds);
    let (rows, total) = ctx
        .storage
        .list_appointments(
            request.search.as_deref(),
            status,
            doctor_id,
            patient_id,
            window,
            request.sort_by.as_deref(),
            request.sort_order,
            request.page,
            request.limit,
        )
        .await
        .map_err(internal)?;
    Ok(page_result(rows, request, total).map(appointment_summary))
}

pub async fn get_appointment(
    ctx: &ApiContext,
    account_id: AccountId,
    appointment_id: AppointmentId,
) -> Result<AppointmentSummary, ApiError> {
    let account = require_account(ctx, account_id).await?;
    let appointment = ctx
        .storage
        .get_appointment(appointment_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "appointment not found"))?;
    if account.role == Role::Patient {
        if own_patient_id(&account)? != appointment.patient_id {
            return Err(ApiError::new(
                ErrorCode::Forbidden,
                "patients may only read their own appointments",
            ));
        }
    } else {
        ensure_capability(&account, Capability::ViewAppointments)?;
    }
    Ok(appointment_summary(appointment))
}

pub async fn create_appointment(
    ctx: &ApiContext,
    request: &CreateAppointmentRequest,
) -> Result<AppointmentSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManageAppointments)?;
    if ctx
        .storage
        .get_patient(request.patient_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(ApiError::new(ErrorCode::Validation, "unknown patient"));
    }
    let doctor = ctx
        .storage
        .get_employee(request.doctor_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Validation, "unknown doctor"))?;
    if doctor.role != Role::Doctor {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "doctor_id must reference a doctor",
        ));
    }
    let appointment_id = ctx
        .storage
        .create_appointment(
            request.patient_id,
            request.doctor_id,
            request.scheduled_at,
            request.reason.as_deref(),
        )
        .await
        .map_err(internal)?;
    let appointment = ctx
        .storage
        .get_appointment(appointment_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "appointment missing after insert"))?;
    Ok(appointment_summary(appointment))
}

pub async fn update_appointment_status(
    ctx: &ApiContext,
    appointment_id: AppointmentId,
    request: &UpdateAppointmentStatusRequest,
    now: DateTime<Utc>,
) -> Result<AppointmentSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::ManageAppointments)?;
    let current = ctx
        .storage
        .get_appointment(appointment_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "appointment not found"))?;
    if !current.status.can_transition_to(request.status) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!(
                "appointment cannot move from {} to {}",
                current.status.as_str(),
                request.status.as_str()
            ),
        ));
    }
    ctx.storage
        .set_appointment_status(appointment_id, request.status, now)
        .await
        .map_err(internal)?;
    let updated = ctx
        .storage
        .get_appointment(appointment_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "appointment missing after update"))?;
    Ok(appointment_summary(updated))
}

pub async fn list_exams(
    ctx: &ApiContext,
    account_id: AccountId,
    request: &PageRequest,
) -> Result<PageResult<ExamSummary>, ApiError> {
    let account = require_account(ctx, account_id).await?;
    let mut patient_id = parse_id_filter(request, "patient_id")?.map(PatientId);
    if account.role == Role::Patient {
        patient_id = Some(own_patient_id(&account)?);
    } else {
        ensure_capability(&account, Capability::ViewClinical)?;
    }
    let doctor_id = parse_id_filter(request, "doctor_id")?.map(EmployeeId);
    let (rows, total) = ctx
        .storage
        .list_exams(
            request.search.as_deref(),
            patient_id,
            doctor_id,
            request.sort_by.as_deref(),
            request.sort_order,
            request.page,
            request.limit,
        )
        .await
        .map_err(internal)?;
    Ok(page_result(rows, request, total).map(exam_summary))
}

pub async fn record_exam(
    ctx: &ApiContext,
    request: &RecordExamRequest,
) -> Result<ExamSummary, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::RecordClinical)?;
    let doctor_id = own_employee_id(&account)?;
    let doctor = require_employee(ctx, doctor_id).await?;
    let name = require_name(&request.name, "name")?;
    let patient = ctx
        .storage
        .get_patient(request.patient_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Validation, "unknown patient"))?;
    if let Some(appointment_id) = request.appointment_id {
        let appointment = ctx
            .storage
            .get_appointment(appointment_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ApiError::new(ErrorCode::Validation, "unknown appointment"))?;
        if appointment.patient_id != request.patient_id {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "appointment belongs to another patient",
            ));
        }
    }
    let exam_id = ctx
        .storage
        .record_exam(
            request.patient_id,
            doctor_id,
            request.appointment_id,
            name,
            request.result_summary.as_deref(),
            request.performed_at,
        )
        .await
        .map_err(internal)?;
    Ok(ExamSummary {
        exam_id,
        patient_id: request.patient_id,
        patient_name: patient.full_name,
        doctor_id,
        doctor_name: doctor.full_name,
        appointment_id: request.appointment_id,
        name: name.to_string(),
        result_summary: request.result_summary.clone(),
        performed_at: request.performed_at,
    })
}

pub async fn list_prescriptions(
    ctx: &ApiContext,
    account_id: AccountId,
    request: &PageRequest,
) -> Result<PageResult<PrescriptionSummary>, ApiError> {
    let account = require_account(ctx, account_id).await?;
    let mut patient_id = parse_id_filter(request, "patient_id")?.map(PatientId);
    if account.role == Role::Patient {
        patient_id = Some(own_patient_id(&account)?);
    } else {
        ensure_capability(&account, Capability::ViewClinical)?;
    }
    let doctor_id = parse_id_filter(request, "doctor_id")?.map(EmployeeId);
    let dispensed = parse_bool_filter(request, "dispensed")?;
    let (rows, total) = ctx
        .storage
        .list_prescriptions(
            request.search.as_deref(),
            patient_id,
            doctor_id,
            dispensed,
            request.sort_by.as_deref(),
            request.sort_order,
            request.page,
            request.limit,
        )
        .await
        .map_err(internal)?;
    Ok(page_result(rows, request, total).map(prescription_summary))
}

pub async fn get_prescription(
    ctx: &ApiContext,
    account_id: AccountId,
    prescription_id: PrescriptionId,
) -> Result<PrescriptionDetail, ApiError> {
    let account = require_account(ctx, account_id).await?;
    let prescription = ctx
        .storage
        .get_prescription(prescription_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "prescription not found"))?;
    if account.role == Role::Patient {
        if own_patient_id(&account)? != prescription.patient_id {
            return Err(ApiError::new(
                ErrorCode::Forbidden,
                "patients may only read their own prescriptions",
            ));
        }
    } else {
        ensure_capability(&account, Capability::ViewClinical)?;
    }
    let items = ctx
        .storage
        .prescription_items(prescription_id)
        .await
        .map_err(internal)?;
    Ok(PrescriptionDetail {
        summary: prescription_summary(prescription),
        items: items
            .into_iter()
            .map(|item| PrescriptionItemSummary {
                medicine_id: item.medicine_id,
                medicine_name: item.medicine_name,
                dosage: item.dosage,
                quantity: item.quantity,
            })
            .collect(),
    })
}

pub async fn write_prescription(
    ctx: &ApiContext,
    request: &WritePrescriptionRequest,
    now: DateTime<Utc>,
) -> Result<PrescriptionDetail, ApiError> {
    let account = require_account(ctx, request.account_id).await?;
    ensure_capability(&account, Capability::RecordClinical)?;
    let doctor_id = own_employee_id(&account)?;
    if request.items.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "a prescription needs at least one item",
        ));
    }
    if ctx
        .storage
        .get_patient(request.patient_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(ApiError::new(ErrorCode::Validation, "unknown patient"));
    }
    let mut items = Vec::with_capacity(request.items.len());
    for item in &request.items {
        if item.quantity <= 0 {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "item quantity must be positive",
            ));
        }
        let dosage = require_name(&item.dosage, "dosage")?;
        if ctx
            .storage
            .get_medicine(item.medicine_id)
            .await
            .map_err(internal)?
            .is_none()
        {
            return Err(ApiError::new(ErrorCode::Validation, "unknown medicine"));
        }
        items.push(PrescriptionItemInput {
            medicine_id: item.medicine_id,
            dosage: dosage.to_string(),
            quantity: item.quantity,
        });
    }
    let prescription_id = ctx
        .storage
        .create_prescription(
            request.patient_id,
            doctor_id,
            request.appointment_id,
            request.notes.as_deref(),
            now,
            &items,
        )
        .await
        .map_err(internal)?;
    get_prescription(ctx, request.account_id, prescription_id).await
}

pub async fn dispense_prescription(
    ctx: &ApiContext,
    account_id: AccountId,
    prescription_id: PrescriptionId,
    now: DateTime<Utc>,
) -> Result<PrescriptionSummary, ApiError> {
    let account = require_account(ctx, account_id).await?;
    ensure_capability(&account, Capability::ManageInventory)?;
    let outcome = ctx
        .storage
        .dispense_prescription(prescription_id, now)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "prescription not found"))?;
    match outcome {
        DispenseOutcome::Dispensed(_) => {}
        DispenseOutcome::AlreadyDispensed => {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "prescription was already dispensed",
            ));
        }
        DispenseOutcome::OutOfStock(medicine_id) => {
            warn!(
                prescription_id = prescription_id.0,
                medicine_id = medicine_id.0,
                "dispense refused, stock exhausted"
            );
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("insufficient stock for medicine {}", medicine_id.0),
            ));
        }
    }
    let prescription = ctx
        .storage
        .get_prescription(prescription_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "prescription missing after dispense"))?;
    Ok(prescription_summary(prescription))
}

pub async fn admin_dashboard(
    ctx: &ApiContext,
    account_id: AccountId,
    now: DateTime<Utc>,
) -> Result<AdminDashboard, ApiError> {
    let account = require_account(ctx, account_id).await?;
    require_role(&account, Role::Admin)?;
    let (from, to) = day_bounds(now.date_naive());
    Ok(AdminDashboard {
        patient_count: ctx.storage.count_patients().await.map_err(internal)?,
        employee_count: ctx.storage.count_employees().await.map_err(internal)?,
        department_count: ctx.storage.count_departments().await.map_err(internal)?,
        appointments_today: ctx
            .storage
            .count_appointments_between(from, to)
            .await
            .map_err(internal)?,
        low_stock_medicines: ctx
            .storage
            .count_low_stock_medicines(LOW_STOCK_THRESHOLD)
            .await
            .map_err(internal)?,
    })
}

pub async fn doctor_dashboard(
    ctx: &ApiContext,
    account_id: AccountId,
    now: DateTime<Utc>,
) -> Result<DoctorDashboard, ApiError> {
    let account = require_account(ctx, account_id).await?;
    require_role(&account, Role::Doctor)?;
    let doctor_id = own_employee_id(&account)?;
    let (from, to) = day_bounds(now.date_naive());
    let upcoming = ctx
        .storage
        .upcoming_appointments_for_doctor(doctor_id, now, DASHBOARD_UPCOMING_LIMIT)
        .await
        .map_err(internal)?;
    Ok(DoctorDashboard {
        appointments_today: ctx
            .storage
            .count_appointments_between_for_doctor(doctor_id, from, to)
            .await
            .map_err(internal)?,
        upcoming: upcoming.into_iter().map(appointment_summary).collect(),
        undispensed_prescriptions: ctx
            .storage
            .count_undispensed_prescriptions_for_doctor(doctor_id)
            .await
            .map_err(internal)?,
    })
}

pub async fn nurse_dashboard(
    ctx: &ApiContext,
    account_id: AccountId,
    now: DateTime<Utc>,
) -> Result<NurseDashboard, ApiError> {
    let account = require_account(ctx, account_id).await?;
    require_role(&account, Role::Nurse)?;
    let (from, to) = day_bounds(now.date_naive());
    Ok(NurseDashboard {
        appointments_today: ctx
            .storage
            .count_appointments_between(from, to)
            .await
            .map_err(internal)?,
        checked_in_today: ctx
            .storage
            .count_appointments_with_status_between(AppointmentStatus::CheckedIn, from, to)
            .await
            .map_err(internal)?,
        low_stock_medicines: ctx
            .storage
            .count_low_stock_medicines(LOW_STOCK_THRESHOLD)
            .await
            .map_err(internal)?,
    })
}

pub async fn patient_dashboard(
    ctx: &ApiContext,
    account_id: AccountId,
    now: DateTime<Utc>,
) -> Result<PatientDashboard, ApiError> {
    let account = require_account(ctx, account_id).await?;
    require_role(&account, Role::Patient)?;
    let patient_id = own_patient_id(&account)?;
    let upcoming = ctx
        .storage
        .upcoming_appointments_for_patient(patient_id, now, DASHBOARD_UPCOMING_LIMIT)
        .await
        .map_err(internal)?;
    Ok(PatientDashboard {
        upcoming: upcoming.into_iter().map(appointment_summary).collect(),
        undispensed_prescriptions: ctx
            .storage
            .count_undispensed_prescriptions_for_patient(patient_id)
            .await
            .map_err(internal)?,
        latest_exam: ctx
            .storage
            .latest_exam_for_patient(patient_id)
            .await
            .map_err(internal)?
            .map(exam_summary),
    })
}

async fn require_account(
    ctx: &ApiContext,
    account_id: AccountId,
) -> Result<StoredAccount, ApiError> {
    ctx.storage
        .get_account(account_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "unknown account"))
}

fn ensure_capability(account: &StoredAccount, capability: Capability) -> Result<(), ApiError> {
    if account.role.allows(capability) {
        Ok(())
    } else {
        Err(ApiError::new(
            ErrorCode::Forbidden,
            "role does not allow this operation",
        ))
    }
}

fn require_role(account: &StoredAccount, role: Role) -> Result<(), ApiError> {
    if account.role == role {
        Ok(())
    } else {
        Err(ApiError::new(
            ErrorCode::Forbidden,
            format!("this view is for the {} role", role.as_str()),
        ))
    }
}

fn own_patient_id(account: &StoredAccount) -> Result<PatientId, ApiError> {
    account.patient_id.ok_or_else(|| {
        ApiError::new(
            ErrorCode::Forbidden,
            "account is not linked to a patient record",
        )
    })
}

fn own_employee_id(account: &StoredAccount) -> Result<EmployeeId, ApiError> {
    account.employee_id.ok_or_else(|| {
        ApiError::new(
            ErrorCode::Forbidden,
            "account is not linked to an employee record",
        )
    })
}

async fn require_department(
    ctx: &ApiContext,
    department_id: DepartmentId,
) -> Result<StoredDepartment, ApiError> {
    ctx.storage
        .get_department(department_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Validation, "unknown department"))
}

async fn require_employee(
    ctx: &ApiContext,
    employee_id: EmployeeId,
) -> Result<StoredEmployee, ApiError> {
    ctx.storage
        .get_employee(employee_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "employee not found"))
}

async fn require_medicine(
    ctx: &ApiContext,
    medicine_id: MedicineId,
) -> Result<StoredMedicine, ApiError> {
    ctx.storage
        .get_medicine(medicine_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "medicine not found"))
}

fn require_name<'a>(value: &'a str, field: &str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApiError::new(
            ErrorCode::Validation,
            format!("{field} cannot be empty"),
        ))
    } else {
        Ok(trimmed)
    }
}

fn validate_shift_window(starts_at: &str, ends_at: &str) -> Result<(), ApiError> {
    let valid = |value: &str| {
        let bytes = value.as_bytes();
        value.len() == 5
            && bytes[2] == b':'
            && value[0..2].parse::<u8>().is_ok_and(|hour| hour < 24)
            && value[3..5].parse::<u8>().is_ok_and(|minute| minute < 60)
    };
    if !valid(starts_at) || !valid(ends_at) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "shift times must use HH:MM",
        ));
    }
    if starts_at >= ends_at {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "shift must start before it ends",
        ));
    }
    Ok(())
}

fn parse_id_filter(request: &PageRequest, key: &str) -> Result<Option<i64>, ApiError> {
    match request.filter(key) {
        Some(value) => value.parse::<i64>().map(Some).map_err(|_| {
            ApiError::new(
                ErrorCode::Validation,
                format!("filter '{key}' must be an integer"),
            )
        }),
        None => Ok(None),
    }
}

fn parse_bool_filter(request: &PageRequest, key: &str) -> Result<Option<bool>, ApiError> {
    match request.filter(key) {
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(_) => Err(ApiError::new(
            ErrorCode::Validation,
            format!("filter '{key}' must be true or false"),
        )),
        None => Ok(None),
    }
}

fn parse_date_filter(request: &PageRequest, key: &str) -> Result<Option<NaiveDate>, ApiError> {
    match request.filter(key) {
        Some(value) => value.parse::<NaiveDate>().map(Some).map_err(|_| {
            ApiError::new(
                ErrorCode::Validation,
                format!("filter '{key}' must be a YYYY-MM-DD date"),
            )
        }),
        None => Ok(None),
    }
}

fn parse_gender_filter(request: &PageRequest) -> Result<Option<Gender>, ApiError> {
    match request.filter("gender") {
        Some(value) => Gender::parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::new(ErrorCode::Validation, "unknown gender filter")),
        None => Ok(None),
    }
}

fn parse_role_filter(request: &PageRequest) -> Result<Option<Role>, ApiError> {
    match request.filter("role") {
        Some(value) => Role::parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::new(ErrorCode::Validation, "unknown role filter")),
        None => Ok(None),
    }
}

fn parse_status_filter(request: &PageRequest) -> Result<Option<AppointmentStatus>, ApiError> {
    match request.filter("status") {
        Some(value) => AppointmentStatus::parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::new(ErrorCode::Validation, "unknown status filter")),
        None => Ok(None),
    }
}

fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let end = date
        .checked_add_days(Days::new(1))
        .unwrap_or(date)
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc();
    (start, end)
}

fn page_result<T>(rows: Vec<T>, request: &PageRequest, total: u64) -> PageResult<T> {
    PageResult::new(rows, request.page, request.limit, total)
}

fn patient_summary(row: StoredPatient) -> PatientSummary {
    PatientSummary {
        patient_id: row.patient_id,
        full_name: row.full_name,
        date_of_birth: row.date_of_birth,
        gender: row.gender,
        phone: row.phone,
        email: row.email,
        created_at: row.created_at,
    }
}

fn department_summary(row: StoredDepartment) -> DepartmentSummary {
    DepartmentSummary {
        department_id: row.department_id,
        name: row.name,
        description: row.description,
        employee_count: row.employee_count.max(0) as u64,
        created_at: row.created_at,
    }
}

fn employee_summary(row: StoredEmployee) -> EmployeeSummary {
    EmployeeSummary {
        employee_id: row.employee_id,
        full_name: row.full_name,
        role: row.role,
        department_id: row.department_id,
        department_name: row.department_name,
        email: row.email,
        phone: row.phone,
        hired_at: row.hired_at,
    }
}

fn shift_summary(row: StoredShift) -> ShiftSummary {
    ShiftSummary {
        shift_id: row.shift_id,
        employee_id: row.employee_id,
        weekday: row.weekday,
        starts_at: row.starts_at,
        ends_at: row.ends_at,
    }
}

fn category_summary(row: StoredCategory) -> CategorySummary {
    CategorySummary {
        category_id: row.category_id,
        name: row.name,
        description: row.description,
        medicine_count: row.medicine_count.max(0) as u64,
    }
}

fn medicine_summary(row: StoredMedicine) -> MedicineSummary {
    MedicineSummary {
        medicine_id: row.medicine_id,
        name: row.name,
        category_id: row.category_id,
        category_name: row.category_name,
        stock_quantity: row.stock_quantity,
        unit_price_cents: row.unit_price_cents,
        expires_at: row.expires_at,
    }
}

fn appointment_summary(row: StoredAppointment) -> AppointmentSummary {
    AppointmentSummary {
        appointment_id: row.appointment_id,
        booking_reference: row.booking_reference,
        patient_id: row.patient_id,
        patient_name: row.patient_name,
        doctor_id: row.doctor_id,
        doctor_name: row.doctor_name,
        scheduled_at: row.scheduled_at,
        reason: row.reason,
        status: row.status,
    }
}

fn exam_summary(row: StoredExam) -> ExamSummary {
    ExamSummary {
        exam_id: row.exam_id,
        patient_id: row.patient_id,
        patient_name: row.patient_name,
        doctor_id: row.doctor_id,
        doctor_name: row.doctor_name,
        appointment_id: row.appointment_id,
        name: row.name,
        result_summary: row.result_summary,
        performed_at: row.performed_at,
    }
}

fn prescription_summary(row: StoredPrescription) -> PrescriptionSummary {
    PrescriptionSummary {
        prescription_id: row.prescription_id,
        patient_id: row.patient_id,
        patient_name: row.patient_name,
        doctor_id: row.doctor_id,
        doctor_name: row.doctor_name,
        appointment_id: row.appointment_id,
        notes: row.notes,
        issued_at: row.issued_at,
        dispensed_at: row.dispensed_at,
        item_count: row.item_count.max(0) as u64,
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
