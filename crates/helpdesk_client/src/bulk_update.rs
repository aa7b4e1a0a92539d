//! Bulk update of eBonded tickets from the escalation view.
//!
//! Tickets are updated strictly one at a time with a fixed pause between a
//! response and the next request; the backend update path is slow and the
//! progress label counts completed items.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Serialize;
use shared::{
    domain::TicketId,
    error::{ApiError, ErrorCode},
    protocol::{BackendRequest, BulkUpdateResponse, UnlinkResponse, ESCALATION_VIEW_ACTION},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{call, PageHost, PageLocation, TicketBackend};

pub const MAX_TICKETS: usize = 10;
pub const REQUEST_PACING: Duration = Duration::from_millis(200);
pub const IDLE_LABEL: &str = "Bulk Update";
pub const UNLINKING_LABEL: &str = "Unlinking tickets...";
pub const COOLDOWN_TOOLTIP: &str =
    "Next update could only be triggered after 10 mins for recently updated tickets";

const UNKNOWN_TICKET_NUMBER: &str = "Unknown";
const DEFAULT_SUCCESS_MESSAGE: &str = "Updated successfully";
const DEFAULT_FAILURE_MESSAGE: &str = "Update failed";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Maximum {max} tickets can be selected")]
    LimitExceeded { max: usize },
    #[error("ticket {0} was updated recently and cannot be selected")]
    CoolingDown(TicketId),
}

/// Tickets checked for bulk update, in the order they were checked.
#[derive(Debug, Clone)]
pub struct SelectionSet {
    max: usize,
    order: Vec<TicketId>,
    cooldown: HashMap<TicketId, String>,
}

impl SelectionSet {
    pub fn new(max: usize, cooldown: HashMap<TicketId, String>) -> Self {
        Self {
            max,
            order: Vec::new(),
            cooldown,
        }
    }

    /// Adds a ticket. Returns `Ok(false)` when it was already selected.
    pub fn select(&mut self, ticket_id: TicketId) -> Result<bool, SelectionError> {
        if self.cooldown.contains_key(&ticket_id) {
            return Err(SelectionError::CoolingDown(ticket_id));
        }
        if self.order.contains(&ticket_id) {
            return Ok(false);
        }
        if self.order.len() >= self.max {
            return Err(SelectionError::LimitExceeded { max: self.max });
        }
        self.order.push(ticket_id);
        Ok(true)
    }

    pub fn deselect(&mut self, ticket_id: TicketId) -> bool {
        let before = self.order.len();
        self.order.retain(|id| *id != ticket_id);
        self.order.len() != before
    }

    pub fn is_selectable(&self, ticket_id: TicketId) -> bool {
        !self.cooldown.contains_key(&ticket_id)
    }

    /// Last update timestamp for a ticket that is cooling down.
    pub fn cooldown_since(&self, ticket_id: TicketId) -> Option<&str> {
        self.cooldown.get(&ticket_id).map(String::as_str)
    }

    pub fn ids(&self) -> &[TicketId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    pub ticket_id: TicketId,
    pub ticket_number: String,
    pub ticket_title: String,
    pub message: String,
    /// `None` for successes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

impl BatchItem {
    fn from_response(submitted: TicketId, response: BulkUpdateResponse) -> Self {
        let default_message = if response.success {
            DEFAULT_SUCCESS_MESSAGE
        } else {
            DEFAULT_FAILURE_MESSAGE
        };
        Self {
            ticket_id: response.ticket_id.unwrap_or(submitted),
            ticket_number: response
                .ticket_number
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_TICKET_NUMBER.to_string()),
            ticket_title: response.ticket_title.unwrap_or_default(),
            message: response
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| default_message.to_string()),
            error: (!response.success).then_some(ErrorCode::Application),
        }
    }

    fn network_failure(submitted: TicketId, err: &crate::BackendError) -> Self {
        Self {
            ticket_id: submitted,
            ticket_number: UNKNOWN_TICKET_NUMBER.to_string(),
            ticket_title: String::new(),
            message: format!("Network error: {}", err.detail()),
            error: Some(err.code()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn title_suffix(&self) -> String {
        if self.ticket_title.is_empty() {
            String::new()
        } else {
            format!(" - {}", self.ticket_title)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub successes: Vec<BatchItem>,
    pub failures: Vec<BatchItem>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    fn record(&mut self, item: BatchItem) {
        if item.is_success() {
            self.successes.push(item);
        } else {
            self.failures.push(item);
        }
    }

    /// Text shown to the user once a run finishes: successes first, then
    /// failures with their messages.
    pub fn summary_text(&self) -> String {
        let succeeded = self.successes.len();
        let failed = self.failures.len();
        let mut text = String::new();

        if failed == 0 {
            text.push_str(&format!("All {succeeded} tickets updated successfully!\n\n"));
        } else if succeeded == 0 {
            text.push_str(&format!("All {failed} ticket updates failed.\n\n"));
        } else {
            text.push_str(&format!(
                "{succeeded} of {} tickets updated successfully. {failed} failed.\n\n",
                self.total()
            ));
        }

        if succeeded > 0 {
            text.push_str("✓ Successfully Updated:\n");
            for item in &self.successes {
                text.push_str(&format!("  • {}{}\n", item.ticket_number, item.title_suffix()));
            }
            text.push('\n');
        }

        if failed > 0 {
            text.push_str("✗ Failed Updates:\n");
            for item in &self.failures {
                let error_text = if item.message.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", item.message)
                };
                text.push_str(&format!(
                    "  • {}{}{}\n",
                    item.ticket_number,
                    item.title_suffix(),
                    error_text
                ));
            }
        }

        text
    }
}

/// Label and enabled flag of the bulk update button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkControl {
    pub label: String,
    pub enabled: bool,
}

impl BulkControl {
    fn idle(has_selection: bool) -> Self {
        Self {
            label: IDLE_LABEL.to_string(),
            enabled: has_selection,
        }
    }

    fn busy(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            enabled: false,
        }
    }
}

fn progress_label(completed: usize, total: usize) -> String {
    format!("Updating {completed}/{total}...")
}

#[derive(Debug, Clone)]
pub enum BulkUpdateEvent {
    ControlChanged(BulkControl),
    ItemFinished {
        completed: usize,
        total: usize,
        item: BatchItem,
    },
    Completed(BatchResult),
    Reloaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkUpdateError {
    #[error("no tickets selected")]
    EmptySelection,
    #[error("a bulk operation is already running")]
    AlreadyRunning,
    #[error("no tickets to unlink")]
    NothingToUnlink,
    #[error(transparent)]
    Backend(#[from] ApiError),
}

#[derive(Debug, Clone)]
pub struct BulkUpdateOptions {
    pub(crate) max_tickets: usize,
    pub pacing: Duration,
}

impl BulkUpdateOptions {
    pub fn with_pacing(pacing: Duration) -> Self {
        Self {
            pacing,
            ..Self::default()
        }
    }
}

impl Default for BulkUpdateOptions {
    fn default() -> Self {
        Self {
            max_tickets: MAX_TICKETS,
            pacing: REQUEST_PACING,
        }
    }
}

struct OrchestratorState {
    selection: SelectionSet,
    running: bool,
    control: BulkControl,
    location: Option<PageLocation>,
}

pub struct BulkUpdateOrchestrator {
    backend: Arc<dyn TicketBackend>,
    page: Arc<dyn PageHost>,
    pacing: Duration,
    inner: Mutex<OrchestratorState>,
    events: broadcast::Sender<BulkUpdateEvent>,
}

impl BulkUpdateOrchestrator {
    pub fn new(
        backend: Arc<dyn TicketBackend>,
        page: Arc<dyn PageHost>,
        cooldown: HashMap<TicketId, String>,
        options: BulkUpdateOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            backend,
            page,
            pacing: options.pacing,
            inner: Mutex::new(OrchestratorState {
                selection: SelectionSet::new(options.max_tickets, cooldown),
                running: false,
                control: BulkControl::idle(false),
                location: None,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BulkUpdateEvent> {
        self.events.subscribe()
    }

    /// Called by the routing layer when the list view is shown.
    pub async fn on_mount(&self, location: PageLocation) {
        let mut guard = self.inner.lock().await;
        debug!(%location, "bulk update mounted");
        guard.location = Some(location);
    }

    /// Called by the routing layer whenever the user navigates.
    pub async fn on_navigate(&self, location: PageLocation) {
        let mut guard = self.inner.lock().await;
        debug!(%location, "bulk update observed navigation");
        guard.location = Some(location);
    }

    /// Checks a ticket. Exceeding the cap warns the user and leaves the
    /// selection untouched.
    pub async fn select(&self, ticket_id: TicketId) -> Result<(), SelectionError> {
        let mut guard = self.inner.lock().await;
        match guard.selection.select(ticket_id) {
            Ok(_) => {
                self.refresh_idle_control(&mut guard);
                Ok(())
            }
            Err(err @ SelectionError::LimitExceeded { .. }) => {
                warn!(ticket_id = ticket_id.0, "bulk update selection cap reached");
                self.page.alert(&err.to_string());
                Err(err)
            }
            Err(err) => {
                debug!(ticket_id = ticket_id.0, "ignored selection of cooling-down ticket");
                Err(err)
            }
        }
    }

    pub async fn deselect(&self, ticket_id: TicketId) -> bool {
        let mut guard = self.inner.lock().await;
        let removed = guard.selection.deselect(ticket_id);
        self.refresh_idle_control(&mut guard);
        removed
    }

    pub async fn selection(&self) -> Vec<TicketId> {
        self.inner.lock().await.selection.ids().to_vec()
    }

    pub async fn is_selectable(&self, ticket_id: TicketId) -> bool {
        self.inner.lock().await.selection.is_selectable(ticket_id)
    }

    pub async fn control(&self) -> BulkControl {
        self.inner.lock().await.control.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.running
    }

    /// Updates every selected ticket in selection order, one request at a
    /// time, then presents the summary.
    pub async fn run(&self) -> Result<BatchResult, BulkUpdateError> {
        let (tickets, original_location) = {
            let mut guard = self.inner.lock().await;
            if guard.running {
                return Err(BulkUpdateError::AlreadyRunning);
            }
            if guard.selection.is_empty() {
                return Err(BulkUpdateError::EmptySelection);
            }
            guard.running = true;
            let tickets = guard.selection.ids().to_vec();
            self.set_control(&mut guard, BulkControl::busy(progress_label(0, tickets.len())));
            (tickets, guard.location.clone())
        };

        let total = tickets.len();
        info!(total, "starting bulk update");
        let mut result = BatchResult::default();

        for (index, ticket_id) in tickets.iter().copied().enumerate() {
            {
                let mut guard = self.inner.lock().await;
                self.set_control(&mut guard, BulkControl::busy(progress_label(index, total)));
            }

            let item = match call::<BulkUpdateResponse>(
                self.backend.as_ref(),
                BackendRequest::BulkUpdateTicket { ticket_id },
            )
            .await
            {
                Ok(response) => BatchItem::from_response(ticket_id, response),
                Err(err) => {
                    warn!(ticket_id = ticket_id.0, error = %err, "bulk update request failed");
                    BatchItem::network_failure(ticket_id, &err)
                }
            };

            debug!(
                ticket_id = ticket_id.0,
                success = item.is_success(),
                "bulk update item finished"
            );
            result.record(item.clone());
            let _ = self.events.send(BulkUpdateEvent::ItemFinished {
                completed: index + 1,
                total,
                item,
            });

            if index + 1 < total {
                tokio::time::sleep(self.pacing).await;
            }
        }

        info!(
            succeeded = result.successes.len(),
            failed = result.failures.len(),
            "bulk update finished"
        );
        let _ = self.events.send(BulkUpdateEvent::Completed(result.clone()));
        self.page.alert(&result.summary_text());
        self.finish(original_location).await;

        Ok(result)
    }

    /// Clears the cross-system link for tickets whose update failed.
    pub async fn unlink_failed_tickets(
        &self,
        failures: &[BatchItem],
    ) -> Result<u64, BulkUpdateError> {
        let ticket_ids: Vec<TicketId> = failures.iter().map(|item| item.ticket_id).collect();
        self.unlink_tickets(&ticket_ids).await
    }

    /// Clears the ServiceNow link of the given tickets and reloads on success.
    pub async fn unlink_tickets(&self, ticket_ids: &[TicketId]) -> Result<u64, BulkUpdateError> {
        if ticket_ids.is_empty() {
            return Err(BulkUpdateError::NothingToUnlink);
        }
        {
            let mut guard = self.inner.lock().await;
            if guard.running {
                return Err(BulkUpdateError::AlreadyRunning);
            }
            guard.running = true;
            self.set_control(&mut guard, BulkControl::busy(UNLINKING_LABEL));
        }

        info!(count = ticket_ids.len(), "unlinking tickets");

        let outcome = call::<UnlinkResponse>(
            self.backend.as_ref(),
            BackendRequest::UnlinkTickets {
                ticket_ids: ticket_ids.to_vec(),
            },
        )
        .await;

        let error = match outcome {
            Ok(response) if response.success => {
                self.page.alert(&format!(
                    "Successfully unlinked {} tickets from ServiceNow.\n\nThe page will now reload.",
                    response.unlinked_count
                ));
                self.page.reload();
                let _ = self.events.send(BulkUpdateEvent::Reloaded);
                let mut guard = self.inner.lock().await;
                guard.running = false;
                return Ok(response.unlinked_count);
            }
            Ok(response) => {
                let message = response
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string());
                self.page
                    .alert(&format!("Error unlinking tickets: {message}"));
                ApiError::application(message)
            }
            Err(err) => {
                warn!(error = %err, "unlink request failed");
                self.page.alert(&format!(
                    "Network error while unlinking tickets: {}",
                    err.detail()
                ));
                ApiError::from(err)
            }
        };

        let mut guard = self.inner.lock().await;
        guard.running = false;
        self.refresh_idle_control(&mut guard);
        Err(BulkUpdateError::Backend(error))
    }

    /// Reloads only if the user is still on the list view the run started
    /// from; otherwise just resets the control.
    async fn finish(&self, original_location: Option<PageLocation>) {
        let mut guard = self.inner.lock().await;
        guard.running = false;

        let still_on_list = match (&original_location, &guard.location) {
            (Some(original), Some(current)) => {
                original == current
                    && current.action().as_deref() == Some(ESCALATION_VIEW_ACTION)
            }
            _ => false,
        };

        if still_on_list {
            info!("reloading escalation view after bulk update");
            self.page.reload();
            let _ = self.events.send(BulkUpdateEvent::Reloaded);
        }
        self.refresh_idle_control(&mut guard);
    }

    fn refresh_idle_control(&self, state: &mut OrchestratorState) {
        if state.running {
            return;
        }
        let control = BulkControl::idle(!state.selection.is_empty());
        self.set_control(state, control);
    }

    fn set_control(&self, state: &mut OrchestratorState, control: BulkControl) {
        if state.control != control {
            state.control = control.clone();
            let _ = self.events.send(BulkUpdateEvent::ControlChanged(control));
        }
    }
}

#[cfg(test)]
#[path = "tests/bulk_update_tests.rs"]
mod tests;
