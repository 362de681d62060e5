use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{
    domain::{AccountId, AppointmentId, Capability, EmployeeId, PatientId, PrescriptionId, Role},
    error::ApiError,
    protocol::{
        AdminDashboard, AppointmentSummary, CategorySummary, CreateAppointmentRequest,
        CreatePatientRequest, DepartmentSummary, DoctorDashboard, EmployeeSummary, ExamSummary,
        LoginRequest, LoginResponse, MedicineSummary, NurseDashboard, PageRequest, PageResult,
        PatientDashboard, PatientSummary, PrescriptionDetail, PrescriptionSummary, ShiftSummary,
        UpdateAppointmentStatusRequest, WritePrescriptionRequest,
    },
};
use tracing::debug;
use url::Url;

pub mod columns;
pub mod debounce;
pub mod list_query;
pub mod pager;
pub mod source;

pub use columns::{render_table, Column};
pub use debounce::{SearchDebouncer, SEARCH_DEBOUNCE_DELAY};
pub use list_query::ListQuery;
pub use pager::{page_markers, PageMarker};
pub use source::{MemorySource, PageSource, Record, RemoteSource};

#[derive(Default, Debug, Clone)]
pub struct SessionState {
    pub account_id: Option<AccountId>,
    pub role: Option<Role>,
    pub employee_id: Option<EmployeeId>,
    pub patient_id: Option<PatientId>,
}

/// HTTP front door to the hospital server. Holds the logged-in account so
/// list views can run their capability check before fetching anything.
pub struct PortalClient {
    http: Client,
    server_url: String,
    pub state: SessionState,
}

impl PortalClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            state: SessionState::default(),
        }
    }

    pub async fn login(&mut self, username: &str) -> Result<LoginResponse> {
        let url = self.endpoint("/login")?;
        let response = self
            .http
            .post(url)
            .json(&LoginRequest {
                username: username.to_string(),
            })
            .send()
            .await?;
        let session: LoginResponse = check(response).await?;
        self.state = SessionState {
            account_id: Some(session.account_id),
            role: Some(session.role),
            employee_id: session.employee_id,
            patient_id: session.patient_id,
        };
        Ok(session)
    }

    /// The capability gate a view runs before it mounts.
    pub fn can_view(&self, capability: Capability) -> bool {
        self.state.role.is_some_and(|role| role.allows(capability))
    }

    pub fn account_id(&self) -> Result<AccountId> {
        self.state
            .account_id
            .ok_or_else(|| anyhow!("not logged in"))
    }

    pub async fn list_patients(&self, query: &ListQuery) -> Result<PageResult<PatientSummary>> {
        self.fetch_page("/patients", query).await
    }

    pub async fn list_departments(
        &self,
        query: &ListQuery,
    ) -> Result<PageResult<DepartmentSummary>> {
        self.fetch_page("/departments", query).await
    }

    pub async fn list_employees(&self, query: &ListQuery) -> Result<PageResult<EmployeeSummary>> {
        self.fetch_page("/employees", query).await
    }

    pub async fn list_categories(&self, query: &ListQuery) -> Result<PageResult<CategorySummary>> {
        self.fetch_page("/medicine_categories", query).await
    }

    pub async fn list_medicines(&self, query: &ListQuery) -> Result<PageResult<MedicineSummary>> {
        self.fetch_page("/medicines", query).await
    }

    pub async fn list_appointments(
        &self,
        query: &ListQuery,
    ) -> Result<PageResult<AppointmentSummary>> {
        self.fetch_page("/appointments", query).await
    }

    pub async fn list_exams(&self, query: &ListQuery) -> Result<PageResult<ExamSummary>> {
        self.fetch_page("/exams", query).await
    }

    pub async fn list_prescriptions(
        &self,
        query: &ListQuery,
    ) -> Result<PageResult<PrescriptionSummary>> {
        self.fetch_page("/prescriptions", query).await
    }

    pub async fn get_patient(&self, patient_id: PatientId) -> Result<PatientSummary> {
        self.get_json(&format!("/patients/{}", patient_id.0)).await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentSummary> {
        self.get_json(&format!("/appointments/{}", appointment_id.0))
            .await
    }

    pub async fn get_prescription(
        &self,
        prescription_id: PrescriptionId,
    ) -> Result<PrescriptionDetail> {
        self.get_json(&format!("/prescriptions/{}", prescription_id.0))
            .await
    }

    pub async fn employee_shifts(&self, employee_id: EmployeeId) -> Result<Vec<ShiftSummary>> {
        self.get_json(&format!("/employees/{}/shifts", employee_id.0))
            .await
    }

    pub async fn create_patient(&self, request: &CreatePatientRequest) -> Result<PatientSummary> {
        self.post_json("/patients", request).await
    }

    pub async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<AppointmentSummary> {
        self.post_json("/appointments", request).await
    }

    pub async fn update_appointment_status(
        &self,
        appointment_id: AppointmentId,
        request: &UpdateAppointmentStatusRequest,
    ) -> Result<AppointmentSummary> {
        self.post_json(&format!("/appointments/{}/status", appointment_id.0), request)
            .await
    }

    pub async fn write_prescription(
        &self,
        request: &WritePrescriptionRequest,
    ) -> Result<PrescriptionDetail> {
        self.post_json("/prescriptions", request).await
    }

    pub async fn dispense_prescription(
        &self,
        prescription_id: PrescriptionId,
    ) -> Result<PrescriptionSummary> {
        let url = self.actor_url(&format!("/prescriptions/{}/dispense", prescription_id.0), &[])?;
        let response = self.http.post(url).send().await?;
        check(response).await
    }

    pub async fn admin_dashboard(&self) -> Result<AdminDashboard> {
        self.get_json("/dashboard/admin").await
    }

    pub async fn doctor_dashboard(&self) -> Result<DoctorDashboard> {
        self.get_json("/dashboard/doctor").await
    }

    pub async fn nurse_dashboard(&self) -> Result<NurseDashboard> {
        self.get_json("/dashboard/nurse").await
    }

    pub async fn patient_dashboard(&self) -> Result<PatientDashboard> {
        self.get_json("/dashboard/patient").await
    }

    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &ListQuery,
    ) -> Result<PageResult<T>> {
        self.fetch_page_request(path, &query.request()).await
    }

    /// Issues the GET for one page. The request is already normalized, so
    /// sentinel filter values never appear in the query string.
    pub async fn fetch_page_request<T: DeserializeOwned>(
        &self,
        path: &str,
        request: &PageRequest,
    ) -> Result<PageResult<T>> {
        let url = self.actor_url(path, &request.to_query_pairs())?;
        debug!(%url, "fetching page");
        let response = self.http.get(url).send().await?;
        check(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.actor_url(path, &[])?;
        let response = self.http.get(url).send().await?;
        check(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        let response = self.http.post(url).json(body).send().await?;
        check(response).await
    }

    fn actor_url(&self, path: &str, pairs: &[(String, String)]) -> Result<Url> {
        let account_id = self.account_id()?;
        let mut url = self.endpoint(path)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("account_id", &account_id.0.to_string());
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = Url::parse(&self.server_url)?;
        Ok(base.join(path)?)
    }
}

async fn check<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json().await?)
    } else {
        match response.json::<ApiError>().await {
            Ok(api_error) => Err(anyhow!(api_error)),
            Err(_) => Err(anyhow!("request failed with status {status}")),
        }
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
