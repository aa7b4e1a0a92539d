//! Controllers for the help-desk agent screens: bulk ticket updates from the
//! escalation view and the incident form's state, assignee and category logic.
//!
//! Every controller is constructed with its collaborators injected: a
//! [`TicketBackend`] that speaks the server's Action/Subaction dispatch, and a
//! [`PageHost`] standing in for the page that embeds it.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::BackendRequest,
};
use thiserror::Error;

pub mod api_logs;
pub mod bulk_update;
pub mod categories;
pub mod connection;
pub mod formatting;
mod incident_actions;
pub mod incident_form;
pub mod page;
pub mod tabs;
pub mod transport;

pub use bulk_update::{BatchItem, BatchResult, BulkUpdateOrchestrator, SelectionSet};
pub use categories::CategoryTierChain;
pub use incident_form::IncidentStateController;
pub use page::{ConsolePage, NotificationLevel, PageHost, PageLocation};
pub use transport::{HttpBackend, SessionContext};

/// Generic text shown when a request never produced a usable answer.
pub const NETWORK_FAILURE_MESSAGE: &str = "Network error or server unavailable";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned status {status}")]
    Status { status: u16, message: Option<String> },
    #[error("unreadable response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Short description suitable for "Network error: ..." style messages.
    pub fn detail(&self) -> String {
        match self {
            BackendError::Transport(reason) => reason.clone(),
            BackendError::Status { status, .. } => format!("HTTP {status}"),
            BackendError::Decode(_) => "invalid response".to_string(),
        }
    }

    /// `Message` field from an error body, when the server sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            BackendError::Status {
                message: Some(message),
                ..
            } if !message.is_empty() => Some(message),
            _ => None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BackendError::Transport(_) | BackendError::Status { .. } => ErrorCode::Transport,
            BackendError::Decode(_) => ErrorCode::Decode,
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(value: BackendError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}

/// The server-side controller dispatcher.
#[async_trait]
pub trait TicketBackend: Send + Sync {
    /// Sends one request and returns its decoded JSON body, `Value::Null`
    /// when the body was empty.
    async fn dispatch(&self, request: BackendRequest) -> Result<Value, BackendError>;
}

pub struct MissingTicketBackend;

#[async_trait]
impl TicketBackend for MissingTicketBackend {
    async fn dispatch(&self, request: BackendRequest) -> Result<Value, BackendError> {
        Err(BackendError::Transport(format!(
            "ticket backend unavailable for {}",
            request.action()
        )))
    }
}

/// Dispatches and decodes into a typed response. An empty body decodes to the
/// response's default, which always reads as an application failure.
pub(crate) async fn call<T>(
    backend: &dyn TicketBackend,
    request: BackendRequest,
) -> Result<T, BackendError>
where
    T: DeserializeOwned + Default,
{
    let body = backend.dispatch(request).await?;
    if body.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(body).map_err(|err| BackendError::Decode(err.to_string()))
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
