//! Incident form controller: which states may be picked next, when an
//! assignee is mandatory, the close/cancel confirmation gate, autosave and
//! the three category cascades.
//!
//! The selectable states are always derived from the last *saved* state so a
//! tentative pick such as "cancelled" never narrows the list the user can
//! still choose from.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::{CategoryKind, GroupId, IncidentId, IncidentState, SelectOption, TicketId},
    error::ApiError,
    protocol::{AutoSaveResponse, BackendRequest, CategoryQuery, UsersResponse},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    call,
    categories::{self, CategoryTierChain},
    BackendError, NotificationLevel, PageHost, TicketBackend,
};

use IncidentState::{Assigned, Cancelled, Closed, ClosedSuccessful, InProgress, New, Pending, Resolved};

/// States whose label marks the assignee field as required (substring match).
pub const ASSIGNEE_REQUIRED_STATES: [&str; 4] = ["assigned", "in progress", "pending", "resolved"];
pub const CLOSE_CONFIRMATION: &str =
    "Reminder! Ticket is not editable after Closed or Cancelled.\n\nDo you want to proceed?";
pub const AUTOSAVE_DELAY: Duration = Duration::from_secs(30);
pub const RELOAD_DELAY: Duration = Duration::from_secs(2);
pub const ASSIGNEE_LABEL: &str = "Assigned To:";

const FROM_NEW: &[IncidentState] = &[New, Assigned, InProgress, Cancelled];
const FROM_ASSIGNED: &[IncidentState] = &[Assigned, InProgress, Cancelled];
const FROM_IN_PROGRESS: &[IncidentState] = &[Assigned, InProgress, Pending, Resolved, Cancelled];
const FROM_PENDING: &[IncidentState] = &[InProgress, Pending, Resolved, Cancelled];
const FROM_RESOLVED: &[IncidentState] =
    &[Assigned, InProgress, Pending, Resolved, Closed, Cancelled];
const FROM_CLOSED: &[IncidentState] = &[Closed];
const FROM_CANCELLED: &[IncidentState] = &[Cancelled];
const UNRESTRICTED: &[IncidentState] = &[New, Assigned, InProgress, Pending, Resolved, Cancelled];

/// States offered in the dropdown given the last saved state.
pub fn selectable_states(saved: Option<IncidentState>) -> &'static [IncidentState] {
    match saved {
        Some(New) => FROM_NEW,
        Some(Assigned) => FROM_ASSIGNED,
        Some(InProgress) => FROM_IN_PROGRESS,
        Some(Pending) => FROM_PENDING,
        Some(Resolved) => FROM_RESOLVED,
        Some(Closed) | Some(ClosedSuccessful) => FROM_CLOSED,
        Some(Cancelled) => FROM_CANCELLED,
        None => UNRESTRICTED,
    }
}

pub fn label_requires_assignee(label: &str) -> bool {
    let label = label.to_lowercase();
    ASSIGNEE_REQUIRED_STATES
        .iter()
        .any(|state| label.contains(state))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Update {
        incident_id: Option<IncidentId>,
        ticket_id: Option<TicketId>,
    },
}

/// Server-rendered state the form starts from.
#[derive(Debug, Clone)]
pub struct IncidentFormInit {
    pub mode: FormMode,
    /// State selected when the page was rendered; the saved state in update mode.
    pub state: Option<IncidentState>,
    pub assignees: Vec<SelectOption>,
    pub assignee: Option<String>,
    pub product: CategoryTierChain,
    pub operational: CategoryTierChain,
    pub resolution: CategoryTierChain,
}

impl IncidentFormInit {
    pub fn new(mode: FormMode, state: Option<IncidentState>) -> Self {
        Self {
            mode,
            state,
            assignees: Vec::new(),
            assignee: None,
            product: CategoryTierChain::new(CategoryKind::Product),
            operational: CategoryTierChain::new(CategoryKind::Operational),
            resolution: CategoryTierChain::new(CategoryKind::Resolution),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssigneeField {
    pub options: Vec<SelectOption>,
    pub selected: Option<String>,
    pub enabled: bool,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionButton {
    pub enabled: bool,
    pub visible: bool,
}

impl ActionButton {
    fn ready() -> Self {
        Self {
            enabled: true,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitBlocked {
    #[error("an assignee is required for the selected state")]
    MissingAssignee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitDecision {
    /// The form may be submitted; submit controls are now disabled.
    Proceed,
    /// The user declined the close/cancel confirmation.
    Declined,
    Blocked(SubmitBlocked),
}

pub struct IncidentStateController {
    pub(crate) backend: Arc<dyn TicketBackend>,
    pub(crate) page: Arc<dyn PageHost>,
    pub(crate) mode: FormMode,
    saved_state: Option<IncidentState>,
    pending_state: Option<IncidentState>,
    options: Vec<IncidentState>,
    assignee: AssigneeField,
    submit_enabled: bool,
    close_confirmed: bool,
    dirty: bool,
    last_modified: Option<String>,
    product: CategoryTierChain,
    operational: CategoryTierChain,
    pub(crate) resolution: CategoryTierChain,
    pub(crate) service_now: ActionButton,
    pub(crate) service_now_status: Option<String>,
    pub(crate) note_button: ActionButton,
    pub(crate) reload_delay: Duration,
}

impl IncidentStateController {
    pub fn new(
        backend: Arc<dyn TicketBackend>,
        page: Arc<dyn PageHost>,
        init: IncidentFormInit,
    ) -> Self {
        let saved_state = match init.mode {
            FormMode::Create => None,
            FormMode::Update { .. } => init.state,
        };
        let mut controller = Self {
            backend,
            page,
            mode: init.mode,
            saved_state,
            pending_state: init.state,
            options: Vec::new(),
            assignee: AssigneeField {
                options: init.assignees,
                selected: init.assignee.filter(|a| !a.is_empty()),
                enabled: true,
                required: false,
            },
            submit_enabled: true,
            close_confirmed: false,
            dirty: false,
            last_modified: None,
            product: init.product,
            operational: init.operational,
            resolution: init.resolution,
            service_now: ActionButton::ready(),
            service_now_status: None,
            note_button: ActionButton::ready(),
            reload_delay: RELOAD_DELAY,
        };
        controller.rebuild_options();
        controller
    }

    pub fn with_reload_delay(mut self, delay: Duration) -> Self {
        self.reload_delay = delay;
        self
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn saved_state(&self) -> Option<IncidentState> {
        self.saved_state
    }

    pub fn selected_state(&self) -> Option<IncidentState> {
        self.pending_state
    }

    pub fn options(&self) -> &[IncidentState] {
        &self.options
    }

    pub fn assignee(&self) -> &AssigneeField {
        &self.assignee
    }

    pub fn assignee_required(&self) -> bool {
        self.assignee.required
    }

    /// Field label, prefixed with a marker while the field is required.
    pub fn assignee_label(&self) -> String {
        if self.assignee.required {
            format!("* {ASSIGNEE_LABEL}")
        } else {
            ASSIGNEE_LABEL.to_string()
        }
    }

    pub fn submit_enabled(&self) -> bool {
        self.submit_enabled
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    pub fn service_now_button(&self) -> ActionButton {
        self.service_now
    }

    pub fn service_now_status(&self) -> Option<&str> {
        self.service_now_status.as_deref()
    }

    pub fn note_button(&self) -> ActionButton {
        self.note_button
    }

    pub fn chain(&self, kind: CategoryKind) -> &CategoryTierChain {
        match kind {
            CategoryKind::Product => &self.product,
            CategoryKind::Operational => &self.operational,
            CategoryKind::Resolution => &self.resolution,
        }
    }

    fn chain_mut(&mut self, kind: CategoryKind) -> &mut CategoryTierChain {
        match kind {
            CategoryKind::Product => &mut self.product,
            CategoryKind::Operational => &mut self.operational,
            CategoryKind::Resolution => &mut self.resolution,
        }
    }

    /// Handles a dropdown change and returns the state left selected.
    pub fn select_state(&mut self, state: IncidentState) -> Option<IncidentState> {
        debug!(state = state.value(), "incident state selected");
        self.pending_state = Some(state);
        self.rebuild_options();
        self.mark_changed();
        self.pending_state
    }

    /// Same as [`select_state`](Self::select_state) for a raw option label.
    pub fn select_state_label(&mut self, label: &str) -> Option<IncidentState> {
        match IncidentState::from_label(label) {
            Some(state) => self.select_state(state),
            None => {
                warn!(label, "unknown incident state label");
                self.rebuild_options();
                self.pending_state
            }
        }
    }

    pub fn set_assignee(&mut self, assignee: Option<String>) {
        self.assignee.selected = assignee.filter(|a| !a.is_empty());
        self.mark_changed();
    }

    /// Any field edit re-enables submit controls and marks the form dirty.
    pub fn mark_changed(&mut self) {
        self.dirty = true;
        self.submit_enabled = true;
    }

    /// True when the selection moves a saved, non-terminal incident into a
    /// terminal state.
    pub fn needs_close_confirmation(&self) -> bool {
        match (self.saved_state, self.pending_state) {
            (Some(saved), Some(pending)) => pending.is_terminal() && !saved.is_terminal(),
            _ => false,
        }
    }

    /// Gatekeeper for form submission.
    pub fn request_submit(&mut self) -> SubmitDecision {
        if self.needs_close_confirmation() && !self.close_confirmed {
            if self.page.confirm(CLOSE_CONFIRMATION) {
                self.close_confirmed = true;
                return self.request_submit();
            }
            info!("close confirmation declined");
            self.submit_enabled = true;
            self.close_confirmed = false;
            return SubmitDecision::Declined;
        }
        self.close_confirmed = false;

        if self.assignee.required && self.assignee.selected.is_none() {
            self.submit_enabled = true;
            return SubmitDecision::Blocked(SubmitBlocked::MissingAssignee);
        }

        self.page.notify(NotificationLevel::Info, "Processing...");
        self.submit_enabled = false;
        SubmitDecision::Proceed
    }

    /// Persists the current form fields without leaving the page. On
    /// success the selected state becomes the saved state.
    pub async fn auto_save(&mut self, fields: Vec<(String, String)>) -> Result<(), ApiError> {
        if self.mode == FormMode::Create {
            return Err(ApiError::validation(
                "autosave requires an existing incident",
            ));
        }

        let mut fields: Vec<(String, String)> =
            fields.into_iter().filter(|(key, _)| key != "State").collect();
        if let Some(state) = self.pending_state {
            fields.push(("State".to_string(), state.value().to_string()));
        }

        self.page.notify(NotificationLevel::Info, "Saving...");
        match call::<AutoSaveResponse>(self.backend.as_ref(), BackendRequest::AutoSave { fields })
            .await
        {
            Ok(response) if response.success => {
                self.page.notify(NotificationLevel::Success, "Auto-saved");
                self.dirty = false;
                self.saved_state = self.pending_state;
                self.rebuild_options();
                if let Some(last_modified) = response.last_modified {
                    self.last_modified = Some(last_modified);
                }
                info!(
                    saved_state = self.saved_state.map(IncidentState::value),
                    "incident autosaved"
                );
                Ok(())
            }
            Ok(response) => {
                let message = response
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string());
                self.page.notify(
                    NotificationLevel::Error,
                    &format!("Auto-save failed: {message}"),
                );
                Err(ApiError::application(message))
            }
            Err(err) => {
                warn!(error = %err, "autosave request failed");
                self.page.notify(NotificationLevel::Error, "Auto-save failed");
                Err(err.into())
            }
        }
    }

    /// Autosaves only when something changed since the last save.
    pub async fn save_if_dirty(
        &mut self,
        fields: Vec<(String, String)>,
    ) -> Option<Result<(), ApiError>> {
        if !self.dirty {
            return None;
        }
        Some(self.auto_save(fields).await)
    }

    /// Reloads the assignee list for a newly chosen group.
    pub async fn load_assignees(&mut self, group_id: Option<GroupId>) {
        self.assignee.options.clear();
        self.assignee.selected = None;
        self.mark_changed();

        let Some(group_id) = group_id else {
            return;
        };

        self.assignee.enabled = false;
        let outcome = call::<UsersResponse>(
            self.backend.as_ref(),
            BackendRequest::LoadAssignedUsers { group_id },
        )
        .await;
        self.assignee.enabled = true;

        match outcome {
            Ok(response) => {
                debug!(group_id = group_id.0, users = response.users.len(), "assignees loaded");
                self.assignee.options = response.users;
            }
            Err(err) => {
                warn!(group_id = group_id.0, error = %err, "failed to load assignees");
                self.page.notify(
                    NotificationLevel::Error,
                    &format!("Failed to load users for group: {group_id}"),
                );
            }
        }
    }

    /// First half of a category change: updates the chain and returns the
    /// load request to issue, if any.
    pub fn begin_category_change(
        &mut self,
        kind: CategoryKind,
        tier: usize,
        value: Option<String>,
    ) -> Option<CategoryQuery> {
        self.mark_changed();
        self.chain_mut(kind).change(tier, value)
    }

    /// Second half of a category change: installs the options or recovers
    /// from the failure.
    pub fn finish_category_load(
        &mut self,
        query: &CategoryQuery,
        outcome: Result<Vec<SelectOption>, BackendError>,
    ) {
        match outcome {
            Ok(options) => {
                self.chain_mut(query.kind).apply_options(query, options);
            }
            Err(err) => {
                warn!(kind = ?query.kind, tier = query.tier, error = %err, "failed to load categories");
                if self.chain_mut(query.kind).fail_load(query) {
                    self.page.notify(
                        NotificationLevel::Error,
                        &format!(
                            "Failed to load {} categories for Tier: {}",
                            query.kind.display_name(),
                            query.tier
                        ),
                    );
                }
            }
        }
    }

    pub async fn change_category(&mut self, kind: CategoryKind, tier: usize, value: Option<String>) {
        let Some(query) = self.begin_category_change(kind, tier, value) else {
            return;
        };
        let outcome = categories::load_options(self.backend.as_ref(), query.clone()).await;
        self.finish_category_load(&query, outcome);
    }

    fn rebuild_options(&mut self) {
        let options = selectable_states(self.saved_state).to_vec();
        let keep = self
            .pending_state
            .filter(|state| options.contains(state))
            .or_else(|| self.saved_state.filter(|state| options.contains(state)))
            .or_else(|| options.first().copied());
        self.options = options;
        self.pending_state = keep;
        self.assignee.required = keep.is_some_and(|state| label_requires_assignee(state.label()));
    }
}

/// Debounces autosave: of several changes within the delay only the last
/// one goes on to save.
#[derive(Debug, Clone)]
pub struct AutosaveDebounce {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl AutosaveDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a change and waits out the delay. Returns `true` when no
    /// later change superseded this one.
    pub async fn settle(&self) -> bool {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        self.generation.load(Ordering::SeqCst) == ticket
    }
}

impl Default for AutosaveDebounce {
    fn default() -> Self {
        Self::new(AUTOSAVE_DELAY)
    }
}

#[cfg(test)]
#[path = "tests/incident_form_tests.rs"]
mod tests;
