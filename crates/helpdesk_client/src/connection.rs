//! Connection checks for the monitoring and bonding integrations.

use serde::Serialize;
use shared::protocol::{BackendRequest, ConnectionTarget, StatusResponse};
use tracing::{info, warn};

use crate::{call, TicketBackend};

pub const CONNECTION_TEST_FAILED: &str = "Connection test failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub target: ConnectionTarget,
    pub success: bool,
    pub message: String,
}

pub async fn check_connection(
    backend: &dyn TicketBackend,
    target: ConnectionTarget,
) -> ConnectionReport {
    match call::<StatusResponse>(backend, BackendRequest::TestConnection(target)).await {
        Ok(response) => {
            let success = response.success;
            let message = response
                .best_message()
                .map(str::to_string)
                .unwrap_or_else(|| {
                    if success {
                        target.default_success_message().to_string()
                    } else {
                        target.default_failure_message().to_string()
                    }
                });
            info!(?target, success, "connection test finished");
            ConnectionReport {
                target,
                success,
                message,
            }
        }
        Err(err) => {
            warn!(?target, error = %err, "connection test request failed");
            ConnectionReport {
                target,
                success: false,
                message: err
                    .server_message()
                    .unwrap_or(CONNECTION_TEST_FAILED)
                    .to_string(),
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
