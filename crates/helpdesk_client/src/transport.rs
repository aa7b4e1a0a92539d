//! Form-encoded POST transport against the agent interface endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use shared::protocol::{BackendRequest, CHALLENGE_TOKEN_FIELD};
use tracing::debug;

use crate::{BackendError, TicketBackend};

pub const DEFAULT_SESSION_NAME: &str = "OTRSAgentInterface";

/// Session identity attached to every request, plus the anti-forgery token
/// for state-mutating ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_name: String,
    pub session_id: Option<String>,
    pub challenge_token: Option<String>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            session_name: DEFAULT_SESSION_NAME.to_string(),
            session_id: None,
            challenge_token: None,
        }
    }
}

impl SessionContext {
    /// Full field list for a request, session and token included.
    pub fn decorate(&self, request: &BackendRequest) -> Vec<(String, String)> {
        let mut fields = request.form_fields();
        if let Some(session_id) = self.session_id.as_deref().filter(|s| !s.is_empty()) {
            fields.push((self.session_name.clone(), session_id.to_string()));
        }
        if request.is_mutating() {
            if let Some(token) = self.challenge_token.as_deref().filter(|t| !t.is_empty()) {
                fields.push((CHALLENGE_TOKEN_FIELD.to_string(), token.to_string()));
            }
        }
        fields
    }
}

pub struct HttpBackend {
    http: Client,
    base_url: String,
    session: SessionContext,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, session: SessionContext) -> Self {
        Self::with_client(Client::new(), base_url, session)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, session: SessionContext) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TicketBackend for HttpBackend {
    async fn dispatch(&self, request: BackendRequest) -> Result<Value, BackendError> {
        let fields = self.session.decorate(&request);
        debug!(
            action = request.action(),
            subaction = request.subaction().unwrap_or_default(),
            "dispatching backend request"
        );

        let res = self
            .http
            .post(&self.base_url)
            .form(&fields)
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        let status = res.status();
        let body = res
            .bytes()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|value| value.get("Message").and_then(Value::as_str).map(str::to_string));
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|err| BackendError::Decode(err.to_string()))
    }
}
