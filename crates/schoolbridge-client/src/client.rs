//! HTTP client for the portal API.

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use schoolbridge_shared::api::{
    AssignmentSaved, AuthResponse, BehaviourNoteRequest, CreateAssignmentRequest, CreateMeetingRequest,
    CreateStudentRequest, DashboardSummary, DeleteResponse, GradeEntry, GradeRequest, LoginRequest,
    MeetingStatusRequest, MeetingView, RegisterRequest, SendMessageRequest, StudentCreated, ThreadView,
};
use schoolbridge_shared::{Assignment, MeetingStatus, Student, UserSummary};

use crate::error::ClientError;
use crate::session::ClientSession;

/// Narrows `GET /students`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behaviour_tag: Option<String>,
}

/// Narrows `GET /assignments`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<Uuid>,
}

#[derive(Debug, serde::Deserialize)]
pub struct Health {
    pub ok: bool,
    pub status: String,
    pub version: String,
}

/// Typed wrapper over every API endpoint.
///
/// The client owns its session: [`login`](Self::login) and
/// [`register`](Self::register) store it, [`logout`](Self::logout) drops it,
/// and every authenticated call fails with [`ClientError::NotLoggedIn`]
/// while there is none.
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    session: Option<ClientSession>,
}

impl PortalClient {
    /// `base_url` is the API root, e.g. `http://localhost:4000/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            session: None,
        }
    }

    /// Resume a session persisted by the front end.
    pub fn with_session(mut self, session: ClientSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&ClientSession> {
        self.session.as_ref()
    }

    pub fn logout(&mut self) -> Option<ClientSession> {
        self.session.take()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn public(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NotLoggedIn)?;
        Ok(self
            .public(method, path)
            .header(reqwest::header::AUTHORIZATION, session.bearer()))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "API response");

        if !status.is_success() {
            return Err(ClientError::from_response(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    pub async fn health(&self) -> Result<Health, ClientError> {
        self.send(self.public(Method::GET, "/health")).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<&ClientSession, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let resp: AuthResponse = self
            .send(self.public(Method::POST, "/auth/login").json(&body))
            .await?;
        debug!(user = %resp.user.id, role = %resp.user.role, "Signed in");
        Ok(self.session.insert(resp.into()))
    }

    pub async fn register(&mut self, request: &RegisterRequest) -> Result<&ClientSession, ClientError> {
        let resp: AuthResponse = self
            .send(self.public(Method::POST, "/auth/register").json(request))
            .await?;
        Ok(self.session.insert(resp.into()))
    }

    /// Re-fetch the signed-in account, e.g. to validate a resumed session.
    pub async fn me(&self) -> Result<UserSummary, ClientError> {
        self.send(self.authed(Method::GET, "/auth/me")?).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<UserSummary, ClientError> {
        let path = format!("/users/by-email/{}", email.trim());
        self.send(self.authed(Method::GET, &path)?).await
    }

    pub async fn dashboard(&self) -> Result<DashboardSummary, ClientError> {
        self.send(self.authed(Method::GET, "/dashboard")?).await
    }

    // -----------------------------------------------------------------------
    // Students
    // -----------------------------------------------------------------------

    pub async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, ClientError> {
        self.send(self.authed(Method::GET, "/students")?.query(filter)).await
    }

    pub async fn get_student(&self, id: Uuid) -> Result<Student, ClientError> {
        self.send(self.authed(Method::GET, &format!("/students/{id}"))?)
            .await
    }

    /// The returned `parent_password` is only ever revealed here.
    pub async fn create_student(&self, request: &CreateStudentRequest) -> Result<StudentCreated, ClientError> {
        self.send(self.authed(Method::POST, "/students")?.json(request))
            .await
    }

    pub async fn delete_student(&self, id: Uuid) -> Result<DeleteResponse, ClientError> {
        self.send(self.authed(Method::DELETE, &format!("/students/{id}"))?)
            .await
    }

    pub async fn add_behaviour_note(
        &self,
        id: Uuid,
        note: &str,
        tag: Option<&str>,
    ) -> Result<Student, ClientError> {
        let body = BehaviourNoteRequest {
            note: note.to_string(),
            tag: tag.map(str::to_string),
        };
        self.send(self.authed(Method::POST, &format!("/students/{id}/notes"))?.json(&body))
            .await
    }

    // -----------------------------------------------------------------------
    // Assignments
    // -----------------------------------------------------------------------

    pub async fn list_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<Assignment>, ClientError> {
        self.send(self.authed(Method::GET, "/assignments")?.query(filter))
            .await
    }

    pub async fn create_assignment(
        &self,
        request: &CreateAssignmentRequest,
    ) -> Result<AssignmentSaved, ClientError> {
        self.send(self.authed(Method::POST, "/assignments")?.json(request))
            .await
    }

    pub async fn grade_assignment(&self, id: Uuid, grades: Vec<GradeEntry>) -> Result<AssignmentSaved, ClientError> {
        let body = GradeRequest::Batch { grades };
        self.send(self.authed(Method::POST, &format!("/assignments/{id}/grade"))?.json(&body))
            .await
    }

    pub async fn delete_assignment(&self, id: Uuid) -> Result<DeleteResponse, ClientError> {
        self.send(self.authed(Method::DELETE, &format!("/assignments/{id}"))?)
            .await
    }

    // -----------------------------------------------------------------------
    // Meetings
    // -----------------------------------------------------------------------

    pub async fn list_meetings(&self) -> Result<Vec<MeetingView>, ClientError> {
        self.send(self.authed(Method::GET, "/meetings")?).await
    }

    pub async fn create_meeting(&self, request: &CreateMeetingRequest) -> Result<MeetingView, ClientError> {
        self.send(self.authed(Method::POST, "/meetings")?.json(request))
            .await
    }

    pub async fn set_meeting_status(&self, id: Uuid, status: MeetingStatus) -> Result<MeetingView, ClientError> {
        let body = MeetingStatusRequest {
            status: status.as_str().to_string(),
        };
        self.send(self.authed(Method::PATCH, &format!("/meetings/{id}/status"))?.json(&body))
            .await
    }

    pub async fn delete_meeting(&self, id: Uuid) -> Result<DeleteResponse, ClientError> {
        self.send(self.authed(Method::DELETE, &format!("/meetings/{id}"))?)
            .await
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub async fn list_threads(&self) -> Result<Vec<ThreadView>, ClientError> {
        self.send(self.authed(Method::GET, "/messages")?).await
    }

    pub async fn send_message(&self, student_id: Uuid, text: &str) -> Result<ThreadView, ClientError> {
        let body = SendMessageRequest {
            student_id,
            text: text.to_string(),
        };
        self.send(self.authed(Method::POST, "/messages/send")?.json(&body))
            .await
    }

    pub async fn clear_thread(&self, thread_id: Uuid) -> Result<ThreadView, ClientError> {
        self.send(self.authed(Method::DELETE, &format!("/messages/{thread_id}/clear"))?)
            .await
    }
}
