//! Typed REST client for the dashboard API
//!
//! Every response is wrapped in the `{success, data?, message?}` envelope.
//! Non-2xx or `success:false` is an error. HTTP 401 maps to
//! `SyncError::Unauthorized` so the session layer can force a sign-out.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::SyncConfig;
use crate::types::{
    ApiEnvelope, AuthPayload, LoginCredentials, MePayload, NewTask, RegisterCredentials, Result,
    SyncError, Task, TaskPatch, User,
};

// Endpoint paths
const LOGIN: &str = "/api/auth/login";
const REGISTER: &str = "/api/auth/register";
const ME: &str = "/api/auth/me";
const LOGOUT: &str = "/api/auth/logout";
const TASKS: &str = "/api/tasks";

/// REST client for auth and task operations
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client with the configured base URL and request timeout
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Send a request and unwrap the response envelope
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let response = req.send().await?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let envelope: ApiEnvelope<T> = response.json().await?;

        if !envelope.success {
            return Err(SyncError::Api(envelope.failure_message()));
        }

        envelope
            .data
            .ok_or_else(|| SyncError::Api("Response envelope has no data".to_string()))
    }

    /// Same as [`send`], for endpoints whose envelope carries no data
    async fn send_ok(&self, req: RequestBuilder) -> Result<()> {
        let response = req.send().await?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let envelope: ApiEnvelope<serde_json::Value> = response.json().await?;

        if !envelope.success {
            return Err(SyncError::Api(envelope.failure_message()));
        }

        Ok(())
    }

    /// Map a non-2xx response to an error. 401 always means the credential
    /// is no longer valid. Other failures carry the server's envelope
    /// message when the body is one; a proxy can hand back plain HTML, and
    /// the HTTP status must stay visible in that case.
    async fn failure(response: reqwest::Response) -> SyncError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return SyncError::Unauthorized("HTTP 401".to_string());
        }
        match response.json::<ApiEnvelope<serde_json::Value>>().await {
            Ok(envelope) => SyncError::Api(envelope.failure_message()),
            Err(_) => SyncError::Api(format!("HTTP {}", status)),
        }
    }

    // ========================================================================
    // Auth
    // ========================================================================

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthPayload> {
        if credentials.email.is_empty() || credentials.password.is_empty() {
            return Err(SyncError::Invalid("email and password are required".into()));
        }
        debug!(email = %credentials.email, "POST {}", LOGIN);
        self.send(self.request(Method::POST, LOGIN, None).json(credentials))
            .await
    }

    pub async fn register(&self, credentials: &RegisterCredentials) -> Result<AuthPayload> {
        if credentials.name.is_empty()
            || credentials.email.is_empty()
            || credentials.password.is_empty()
        {
            return Err(SyncError::Invalid(
                "name, email and password are required".into(),
            ));
        }
        debug!(email = %credentials.email, "POST {}", REGISTER);
        self.send(self.request(Method::POST, REGISTER, None).json(credentials))
            .await
    }

    /// Resolve the identity behind a persisted token (`who am I`)
    pub async fn me(&self, token: &str) -> Result<User> {
        let payload: MePayload = self.send(self.request(Method::GET, ME, Some(token))).await?;
        Ok(payload.user)
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.send_ok(self.request(Method::POST, LOGOUT, Some(token)))
            .await
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Fetch tasks, optionally filtered to one assignee
    pub async fn fetch_tasks(&self, token: &str, assigned_to: Option<&str>) -> Result<Vec<Task>> {
        let mut req = self.request(Method::GET, TASKS, Some(token));
        if let Some(assignee) = assigned_to {
            req = req.query(&[("assignedTo", assignee)]);
        }
        self.send(req).await
    }

    pub async fn create_task(&self, token: &str, task: &NewTask) -> Result<Task> {
        if task.title.is_empty() || task.block_id.is_empty() {
            return Err(SyncError::Invalid("title and blockId are required".into()));
        }
        self.send(self.request(Method::POST, TASKS, Some(token)).json(task))
            .await
    }

    pub async fn update_task(&self, token: &str, id: &str, patch: &TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(SyncError::Invalid("empty task patch".into()));
        }
        let path = format!("{}/{}", TASKS, id);
        self.send(self.request(Method::PATCH, &path, Some(token)).json(patch))
            .await
    }

    pub async fn delete_task(&self, token: &str, id: &str) -> Result<()> {
        let path = format!("{}/{}", TASKS, id);
        self.send_ok(self.request(Method::DELETE, &path, Some(token)))
            .await
    }
}
