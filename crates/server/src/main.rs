use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use server_api::ApiContext;
use shared::{
    domain::{AccountId, AppointmentId, EmployeeId, MedicineId, PatientId, PrescriptionId},
    error::{ApiError, ErrorCode},
    protocol::{
        AdjustStockRequest, AdminDashboard, AppointmentSummary, CategorySummary,
        CreateAppointmentRequest, CreateCategoryRequest, CreateDepartmentRequest,
        CreateEmployeeRequest, CreateMedicineRequest, CreatePatientRequest, DepartmentSummary,
        DoctorDashboard, EmployeeSummary, ExamSummary, LoginRequest, LoginResponse,
        MedicineSummary, NurseDashboard, PageRequest, PageResult, PatientDashboard,
        PatientSummary, PrescriptionDetail, PrescriptionSummary, RecordExamRequest,
        SetShiftRequest, ShiftSummary, UpdateAppointmentStatusRequest, UpdateEmployeeRequest,
        UpdatePatientRequest, WritePrescriptionRequest,
    },
};
use storage::Storage;
use tracing::{error, info};

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type Rejection = (StatusCode, Json<ApiError>);

fn reject(error: ApiError) -> Rejection {
    let status = match error.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

fn require_actor(params: &BTreeMap<String, String>) -> Result<AccountId, Rejection> {
    params
        .get("account_id")
        .and_then(|value| value.parse::<i64>().ok())
        .map(AccountId)
        .ok_or_else(|| {
            reject(ApiError::new(
                ErrorCode::Unauthorized,
                "account_id query parameter is required",
            ))
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(http_login))
        .route("/patients", get(http_list_patients).post(http_create_patient))
        .route(
            "/patients/:patient_id",
            get(http_get_patient)
                .put(http_update_patient)
                .delete(http_delete_patient),
        )
        .route(
            "/departments",
            get(http_list_departments).post(http_create_department),
        )
        .route(
            "/employees",
            get(http_list_employees).post(http_create_employee),
        )
        .route("/employees/:employee_id", put(http_update_employee))
        .route(
            "/employees/:employee_id/shifts",
            get(http_employee_shifts).post(http_set_shift),
        )
        .route(
            "/medicine_categories",
            get(http_list_categories).post(http_create_category),
        )
        .route(
            "/medicines",
            get(http_list_medicines).post(http_create_medicine),
        )
        .route("/medicines/:medicine_id/stock", post(http_adjust_stock))
        .route(
            "/appointments",
            get(http_list_appointments).post(http_create_appointment),
        )
        .route("/appointments/:appointment_id", get(http_get_appointment))
        .route(
            "/appointments/:appointment_id/status",
            post(http_update_appointment_status),
        )
        .route("/exams", get(http_list_exams).post(http_record_exam))
        .route(
            "/prescriptions",
            get(http_list_prescriptions).post(http_write_prescription),
        )
        .route(
            "/prescriptions/:prescription_id",
            get(http_get_prescription),
        )
        .route(
            "/prescriptions/:prescription_id/dispense",
            post(http_dispense_prescription),
        )
        .route("/dashboard/admin", get(http_admin_dashboard))
        .route("/dashboard/doctor", get(http_doctor_dashboard))
        .route("/dashboard/nurse", get(http_nurse_dashboard))
        .route("/dashboard/patient", get(http_patient_dashboard))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Rejection> {
    server_api::login(&state.api, &request.username)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_patients(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PageResult<PatientSummary>>, Rejection> {
    let account_id = require_actor(&params)?;
    let request = PageRequest::from_query_pairs(params);
    server_api::list_patients(&state.api, account_id, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_patient(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<i64>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PatientSummary>, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::get_patient(&state.api, account_id, PatientId(patient_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_patient(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<Json<PatientSummary>, Rejection> {
    server_api::create_patient(&state.api, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_patient(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<i64>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<PatientSummary>, Rejection> {
    server_api::update_patient(&state.api, PatientId(patient_id), &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_patient(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<i64>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<StatusCode, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::delete_patient(&state.api, account_id, PatientId(patient_id))
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(reject)
}

async fn http_list_departments(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PageResult<DepartmentSummary>>, Rejection> {
    let account_id = require_actor(&params)?;
    let request = PageRequest::from_query_pairs(params);
    server_api::list_departments(&state.api, account_id, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_department(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateDepartmentRequest>,
) -> Result<Json<DepartmentSummary>, Rejection> {
    server_api::create_department(&state.api, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_employees(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PageResult<EmployeeSummary>>, Rejection> {
    let account_id = require_actor(&params)?;
    let request = PageRequest::from_query_pairs(params);
    server_api::list_employees(&state.api, account_id, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_employee(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateEmployeeRequest>,
) -> Result<Json<EmployeeSummary>, Rejection> {
    server_api::create_employee(&state.api, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_employee(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<i64>,
    Json(request): Json<UpdateEmployeeRequest>,
) -> Result<Json<EmployeeSummary>, Rejection> {
    server_api::update_employee(&state.api, EmployeeId(employee_id), &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_employee_shifts(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<i64>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<Vec<ShiftSummary>>, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::employee_shifts(&state.api, account_id, EmployeeId(employee_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_set_shift(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<i64>,
    Json(request): Json<SetShiftRequest>,
) -> Result<Json<ShiftSummary>, Rejection> {
    server_api::set_shift(&state.api, EmployeeId(employee_id), &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_categories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PageResult<CategorySummary>>, Rejection> {
    let account_id = require_actor(&params)?;
    let request = PageRequest::from_query_pairs(params);
    server_api::list_categories(&state.api, account_id, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_category(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<Json<CategorySummary>, Rejection> {
    server_api::create_category(&state.api, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_medicines(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PageResult<MedicineSummary>>, Rejection> {
    let account_id = require_actor(&params)?;
    let request = PageRequest::from_query_pairs(params);
    server_api::list_medicines(&state.api, account_id, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_medicine(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateMedicineRequest>,
) -> Result<Json<MedicineSummary>, Rejection> {
    server_api::create_medicine(&state.api, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_adjust_stock(
    State(state): State<Arc<AppState>>,
    Path(medicine_id): Path<i64>,
    Json(request): Json<AdjustStockRequest>,
) -> Result<Json<MedicineSummary>, Rejection> {
    server_api::adjust_medicine_stock(&state.api, MedicineId(medicine_id), &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_appointments(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PageResult<AppointmentSummary>>, Rejection> {
    let account_id = require_actor(&params)?;
    let request = PageRequest::from_query_pairs(params);
    server_api::list_appointments(&state.api, account_id, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<AppointmentSummary>, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::get_appointment(&state.api, account_id, AppointmentId(appointment_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_appointment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<AppointmentSummary>, Rejection> {
    server_api::create_appointment(&state.api, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_appointment_status(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<UpdateAppointmentStatusRequest>,
) -> Result<Json<AppointmentSummary>, Rejection> {
    server_api::update_appointment_status(
        &state.api,
        AppointmentId(appointment_id),
        &request,
        Utc::now(),
    )
    .await
    .map(Json)
    .map_err(reject)
}

async fn http_list_exams(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PageResult<ExamSummary>>, Rejection> {
    let account_id = require_actor(&params)?;
    let request = PageRequest::from_query_pairs(params);
    server_api::list_exams(&state.api, account_id, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_record_exam(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecordExamRequest>,
) -> Result<Json<ExamSummary>, Rejection> {
    server_api::record_exam(&state.api, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_prescriptions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PageResult<PrescriptionSummary>>, Rejection> {
    let account_id = require_actor(&params)?;
    let request = PageRequest::from_query_pairs(params);
    server_api::list_prescriptions(&state.api, account_id, &request)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_prescription(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PrescriptionDetail>, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::get_prescription(&state.api, account_id, PrescriptionId(prescription_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_write_prescription(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WritePrescriptionRequest>,
) -> Result<Json<PrescriptionDetail>, Rejection> {
    server_api::write_prescription(&state.api, &request, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_dispense_prescription(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PrescriptionSummary>, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::dispense_prescription(
        &state.api,
        account_id,
        PrescriptionId(prescription_id),
        Utc::now(),
    )
    .await
    .map(Json)
    .map_err(reject)
}

async fn http_admin_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<AdminDashboard>, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::admin_dashboard(&state.api, account_id, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_doctor_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<DoctorDashboard>, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::doctor_dashboard(&state.api, account_id, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_nurse_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<NurseDashboard>, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::nurse_dashboard(&state.api, account_id, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_patient_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<PatientDashboard>, Rejection> {
    let account_id = require_actor(&params)?;
    server_api::patient_dashboard(&state.api, account_id, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
