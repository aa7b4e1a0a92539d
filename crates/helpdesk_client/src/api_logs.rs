//! eBonding API call history from the bonding configuration screen.

use serde::Serialize;
use shared::{
    domain::LogId,
    protocol::{ApiLogEntry, ApiLogsResponse, BackendRequest, LogDetailsResponse},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{call, TicketBackend};

pub const DEFAULT_LOG_FILTER: &str = "7d";
pub const NO_API_LOGS_MESSAGE: &str = "No API logs found for the selected time period.";
pub const LOAD_API_LOGS_FAILED: &str = "Failed to load API logs";

const ERROR_PREVIEW_CHARS: usize = 50;
const MISSING_CELL: &str = "-";

/// One log entry as the history table shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiLogRow {
    pub id: LogId,
    pub created: String,
    pub incident: String,
    pub success: bool,
    pub msi_ticket: String,
    pub error: String,
}

impl From<ApiLogEntry> for ApiLogRow {
    fn from(entry: ApiLogEntry) -> Self {
        ApiLogRow {
            id: entry.id,
            created: entry.create_time.unwrap_or_default(),
            incident: entry.incident_number.unwrap_or_default(),
            success: entry.success,
            msi_ticket: cell(entry.msi_ticket_number),
            error: cell(entry.error_message.map(|message| error_preview(&message))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ApiLogListing {
    Rows(Vec<ApiLogRow>),
    Empty,
    Failed(String),
}

impl ApiLogListing {
    /// Text shown in place of the table, if any.
    pub fn notice(&self) -> Option<&str> {
        match self {
            ApiLogListing::Rows(_) => None,
            ApiLogListing::Empty => Some(NO_API_LOGS_MESSAGE),
            ApiLogListing::Failed(message) => Some(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogDetails {
    pub id: LogId,
    pub request: String,
    pub response: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LogDetailsError {
    #[error("Failed to load details")]
    Rejected,
    #[error("Error loading details")]
    Unreachable,
}

/// Loads the history for `filter` (a period such as `24h` or `7d`). A blank
/// filter means [`DEFAULT_LOG_FILTER`].
pub async fn load_api_logs(backend: &dyn TicketBackend, filter: &str) -> ApiLogListing {
    let filter = match filter.trim() {
        "" => DEFAULT_LOG_FILTER,
        trimmed => trimmed,
    };
    let request = BackendRequest::LoadApiLogs {
        filter: filter.to_string(),
    };
    match call::<ApiLogsResponse>(backend, request).await {
        Ok(response) if response.success => {
            info!(filter, count = response.logs.len(), "api logs loaded");
            if response.logs.is_empty() {
                ApiLogListing::Empty
            } else {
                ApiLogListing::Rows(response.logs.into_iter().map(ApiLogRow::from).collect())
            }
        }
        Ok(response) => {
            warn!(filter, message = ?response.message, "api logs rejected");
            ApiLogListing::Failed(
                response
                    .message
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| LOAD_API_LOGS_FAILED.to_string()),
            )
        }
        Err(err) => {
            warn!(filter, error = %err, "api logs request failed");
            ApiLogListing::Failed(LOAD_API_LOGS_FAILED.to_string())
        }
    }
}

pub async fn log_details(
    backend: &dyn TicketBackend,
    log_id: LogId,
) -> Result<LogDetails, LogDetailsError> {
    let response = call::<LogDetailsResponse>(backend, BackendRequest::GetLogDetails { log_id })
        .await
        .map_err(|err| {
            warn!(%log_id, error = %err, "log details request failed");
            LogDetailsError::Unreachable
        })?;
    if !response.success {
        warn!(%log_id, "log details rejected");
        return Err(LogDetailsError::Rejected);
    }
    Ok(LogDetails {
        id: log_id,
        request: payload_text(response.request_payload, "No request data"),
        response: payload_text(response.response_payload, "No response data"),
    })
}

/// Pretty-prints JSON payloads; anything else is shown as sent.
pub fn payload_text(payload: Option<String>, missing: &str) -> String {
    match payload.filter(|raw| !raw.is_empty()) {
        None => missing.to_string(),
        Some(raw) => serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or(raw),
    }
}

fn error_preview(message: &str) -> String {
    if message.chars().count() > ERROR_PREVIEW_CHARS {
        let head: String = message.chars().take(ERROR_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}

fn cell(value: Option<String>) -> String {
    value
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| MISSING_CELL.to_string())
}

#[cfg(test)]
#[path = "tests/api_logs_tests.rs"]
mod tests;
