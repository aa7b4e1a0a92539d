use shared::{
    error::ApiError,
    protocol::{BackendRequest, ResolutionNote, ServiceNowResponse, StatusResponse},
};
use tracing::{info, warn};

use crate::{
    call, formatting::strip_markup, incident_form::FormMode, IncidentStateController,
    NotificationLevel, NETWORK_FAILURE_MESSAGE,
};

pub const MISSING_INCIDENT_MESSAGE: &str = "No incident ID found";
pub const SERVICE_NOW_SUCCESS_PREFIX: &str = "Successfully submitted to MSI CMSO ServiceNow";
pub const SERVICE_NOW_UNKNOWN_FAILURE: &str = "Submission failed: Unknown error";
pub const NOTE_REQUIRED_MESSAGE: &str = "Please enter resolution notes.";
pub const NOTE_ADDED_MESSAGE: &str = "Resolution note added successfully";
pub const NOTE_FAILED_MESSAGE: &str = "Failed to add resolution note";

impl IncidentStateController {
    /// Forwards the incident to the external ServiceNow instance and returns
    /// the ticket number it was filed under.
    pub async fn submit_to_service_now(&mut self) -> Result<String, ApiError> {
        let incident_id = match self.mode {
            FormMode::Update {
                incident_id: Some(incident_id),
                ..
            } => incident_id,
            _ => {
                self.page
                    .notify(NotificationLevel::Error, MISSING_INCIDENT_MESSAGE);
                return Err(ApiError::validation(MISSING_INCIDENT_MESSAGE));
            }
        };

        self.service_now.enabled = false;
        self.service_now_status = None;

        let outcome = call::<ServiceNowResponse>(
            self.backend.as_ref(),
            BackendRequest::SubmitToServiceNow { incident_id },
        )
        .await;

        match outcome {
            Ok(response) if response.success => {
                let number = response.msi_ticket_number.unwrap_or_default();
                let message = format!("{SERVICE_NOW_SUCCESS_PREFIX}: {number}");
                info!(incident_id = incident_id.0, ticket_number = %number, "submitted to ServiceNow");
                self.service_now.visible = false;
                self.service_now_status = Some(message.clone());
                self.page.notify(NotificationLevel::Success, &message);
                tokio::time::sleep(self.reload_delay).await;
                self.page.reload();
                Ok(number)
            }
            Ok(response) => {
                let message = response
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| SERVICE_NOW_UNKNOWN_FAILURE.to_string());
                warn!(incident_id = incident_id.0, %message, "ServiceNow submission rejected");
                self.service_now.enabled = true;
                self.service_now_status = Some(message.clone());
                self.page.notify(NotificationLevel::Error, &message);
                Err(ApiError::application(message))
            }
            Err(err) => {
                warn!(incident_id = incident_id.0, error = %err, "ServiceNow submission failed");
                let message = format!("Submission failed: {NETWORK_FAILURE_MESSAGE}");
                self.service_now.enabled = true;
                self.service_now_status = Some(message.clone());
                self.page.notify(NotificationLevel::Error, &message);
                Err(ApiError::transport(message))
            }
        }
    }

    /// Posts a resolution note tagged with the resolution category tiers.
    pub async fn add_resolution_note(&mut self, body: &str) -> Result<(), ApiError> {
        let FormMode::Update {
            incident_id,
            ticket_id,
        } = self.mode
        else {
            return Err(ApiError::validation(
                "resolution notes require an existing incident",
            ));
        };

        if strip_markup(body).trim().is_empty() {
            self.page.alert(NOTE_REQUIRED_MESSAGE);
            return Err(ApiError::validation(NOTE_REQUIRED_MESSAGE));
        }

        self.note_button.enabled = false;
        let note = ResolutionNote {
            ticket_id,
            incident_id,
            categories: [1, 2, 3].map(|tier| self.resolution.selected(tier).map(str::to_string)),
            body: body.to_string(),
        };

        match call::<StatusResponse>(self.backend.as_ref(), BackendRequest::AddResolutionNote(note))
            .await
        {
            Ok(response) if response.success => {
                self.page.notify(NotificationLevel::Success, NOTE_ADDED_MESSAGE);
                self.page.reload();
                Ok(())
            }
            Ok(response) => {
                let message = response
                    .best_message()
                    .unwrap_or(NOTE_FAILED_MESSAGE)
                    .to_string();
                self.note_button.enabled = true;
                self.page.alert(&message);
                Err(ApiError::application(message))
            }
            Err(err) => {
                warn!(error = %err, "resolution note request failed");
                self.note_button.enabled = true;
                self.page.alert(NOTE_FAILED_MESSAGE);
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/incident_actions_tests.rs"]
mod tests;
