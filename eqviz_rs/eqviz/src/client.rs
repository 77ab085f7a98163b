//! HTTP client for the analytics backend.

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::credential::{CredentialStore, Session};
use crate::{
    DatasetId, EqvizError, HistoryEntry, LoginResponse, Result, SignupResponse, UploadResponse,
};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/";

const LOGIN_FAILED: &str = "Invalid username or password";
const SIGNUP_FAILED: &str = "Signup failed. Username may already exist.";
const UPLOAD_REJECTED: &str = "Upload failed";
const SESSION_REJECTED: &str = "Session expired or invalid. Please log in again.";

#[derive(Serialize)]
struct SignupRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: Box<dyn CredentialStore>) -> Self {
        Self::with_http_client(base_url, store, reqwest::Client::new())
    }

    pub fn with_http_client(
        base_url: impl Into<String>,
        store: Box<dyn CredentialStore>,
        http: reqwest::Client,
    ) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            http,
            session: Session::new(store),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn has_credential(&self) -> bool {
        self.session.has_credential()
    }

    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<SignupResponse> {
        let body = SignupRequest {
            username,
            email,
            password,
        };
        let response = self.request(Method::POST, "signup/").json(&body).send().await?;
        let status = response.status();
        if status.is_client_error() {
            let message = error_message(response).await;
            return Err(EqvizError::Auth(message.unwrap_or_else(|| SIGNUP_FAILED.into())));
        }
        let response = ensure_success(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(SignupResponse::default());
        }
        let payload = serde_json::from_str(&text)
            .map_err(|err| EqvizError::Network(format!("unexpected signup response: {err}")))?;
        info!("Account created for {username}");
        Ok(payload)
    }

    /// Exchanges credentials for a token and stores it in memory and durably.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginRequest { username, password };
        let response = self.request(Method::POST, "token/").json(&body).send().await?;
        if response.status().is_client_error() {
            let message = error_message(response).await;
            debug!("login rejected: {:?}", message);
            return Err(EqvizError::Auth(LOGIN_FAILED.into()));
        }
        let response = ensure_success(response).await?;
        let payload: LoginResponse = response.json().await?;
        if payload.token.is_empty() {
            return Err(EqvizError::Network("login response carried an empty token".into()));
        }
        self.session.set(&payload.token)?;
        info!("Logged in as {username}");
        Ok(payload)
    }

    pub async fn upload_dataset(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadResponse> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);
        let response = self.request(Method::POST, "upload/").multipart(form).send().await?;
        let status = response.status();
        if is_auth_rejection(status) {
            return Err(EqvizError::Auth(SESSION_REJECTED.into()));
        }
        if status.is_client_error() || status.is_server_error() {
            let message = error_message(response).await;
            return Err(EqvizError::Validation(
                message.unwrap_or_else(|| UPLOAD_REJECTED.into()),
            ));
        }
        let payload: UploadResponse = response.json().await?;
        info!(
            "Uploaded {} as dataset {} ({} rows)",
            file_name,
            payload.dataset_id,
            payload.summary.total_count.unwrap_or(0)
        );
        Ok(payload)
    }

    pub async fn fetch_history(&self) -> Result<Vec<HistoryEntry>> {
        let response = self.request(Method::GET, "history/").send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    pub async fn fetch_report(&self, dataset_id: DatasetId) -> Result<Vec<u8>> {
        let path = format!("report/{dataset_id}/");
        let response = self.request(Method::GET, &path).send().await?;
        let response = ensure_success(response).await?;
        let bytes = response.bytes().await?;
        debug!(dataset = %dataset_id, size = bytes.len(), "report received");
        Ok(bytes.to_vec())
    }

    /// Forgets the credential locally. The backend is not contacted.
    pub fn clear_credential(&self) -> Result<()> {
        self.session.clear()?;
        info!("Credential cleared");
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        debug!(%method, %url, "outbound request");
        let builder = self.http.request(method, url);
        match self.session.get() {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, format!("Token {token}")),
            None => builder,
        }
    }
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if is_auth_rejection(status) {
        return Err(EqvizError::Auth(SESSION_REJECTED.into()));
    }
    let detail = error_message(response).await;
    Err(EqvizError::Network(match detail {
        Some(message) => format!("{status}: {message}"),
        None => format!("request failed with status {status}"),
    }))
}

async fn error_message(response: Response) -> Option<String> {
    let text = response.text().await.ok()?;
    backend_message(&text)
}

/// Pulls the human-readable message out of a backend error body.
pub(crate) fn backend_message(body: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(body).ok()?;
    for key in ["error", "detail"] {
        if let Some(text) = value.get(key).and_then(JsonValue::as_str) {
            return Some(text.to_string());
        }
    }
    value
        .get("non_field_errors")
        .and_then(JsonValue::as_array)
        .and_then(|errors| errors.first())
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}
