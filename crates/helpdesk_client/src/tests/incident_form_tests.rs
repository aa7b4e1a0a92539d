use super::*;
use crate::test_support::{RecordingPage, ScriptedBackend};
use serde_json::{json, Value};

fn update_form(saved: IncidentState) -> IncidentFormInit {
    IncidentFormInit::new(
        FormMode::Update {
            incident_id: Some(IncidentId(77)),
            ticket_id: Some(TicketId(501)),
        },
        Some(saved),
    )
}

fn controller_with(
    init: IncidentFormInit,
    replies: Vec<Result<Value, BackendError>>,
    page: Arc<RecordingPage>,
) -> (IncidentStateController, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::new(replies));
    let controller = IncidentStateController::new(backend.clone(), page, init);
    (controller, backend)
}

fn controller(init: IncidentFormInit) -> (IncidentStateController, Arc<RecordingPage>) {
    let page = Arc::new(RecordingPage::new());
    let (controller, _) = controller_with(init, vec![], page.clone());
    (controller, page)
}

fn field<'a>(fields: &'a [(String, String)], key: &str) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

#[test]
fn transition_table_by_saved_state() {
    assert_eq!(selectable_states(Some(New)), &[New, Assigned, InProgress, Cancelled]);
    assert_eq!(selectable_states(Some(Assigned)), &[Assigned, InProgress, Cancelled]);
    assert_eq!(
        selectable_states(Some(InProgress)),
        &[Assigned, InProgress, Pending, Resolved, Cancelled]
    );
    assert_eq!(
        selectable_states(Some(Pending)),
        &[InProgress, Pending, Resolved, Cancelled]
    );
    assert_eq!(
        selectable_states(Some(Resolved)),
        &[Assigned, InProgress, Pending, Resolved, Closed, Cancelled]
    );
    assert_eq!(selectable_states(Some(Closed)), &[Closed]);
    assert_eq!(selectable_states(Some(ClosedSuccessful)), &[Closed]);
    assert_eq!(selectable_states(Some(Cancelled)), &[Cancelled]);
    assert!(!selectable_states(None).contains(&Closed));
}

#[test]
fn tentative_pick_does_not_narrow_options() {
    let (mut form, _page) = controller(update_form(Pending));
    assert_eq!(form.options(), &[InProgress, Pending, Resolved, Cancelled]);

    assert_eq!(form.select_state(Cancelled), Some(Cancelled));

    assert_eq!(form.options(), &[InProgress, Pending, Resolved, Cancelled]);
    assert_eq!(form.saved_state(), Some(Pending));
    assert_eq!(form.select_state(InProgress), Some(InProgress));
}

#[test]
fn unavailable_pick_falls_back_to_saved_state() {
    let (mut form, _page) = controller(update_form(New));

    assert_eq!(form.select_state(Resolved), Some(New));
    assert_eq!(form.select_state_label("  In Progress "), Some(InProgress));
    assert_eq!(form.select_state_label("on hold"), Some(InProgress));
}

#[test]
fn create_mode_offers_everything_but_closed() {
    let (form, _page) = controller(IncidentFormInit::new(FormMode::Create, Some(New)));

    assert_eq!(form.saved_state(), None);
    assert_eq!(form.options(), &[New, Assigned, InProgress, Pending, Resolved, Cancelled]);
    assert_eq!(form.selected_state(), Some(New));
}

#[test]
fn assignee_requirement_follows_selected_state() {
    let (mut form, _page) = controller(update_form(InProgress));
    assert!(form.assignee_required());
    assert_eq!(form.assignee_label(), "* Assigned To:");

    form.select_state(Cancelled);
    assert!(!form.assignee_required());
    assert_eq!(form.assignee_label(), "Assigned To:");

    form.select_state(Pending);
    assert!(form.assignee_required());
}

#[test]
fn assignee_rule_matches_label_substrings() {
    assert!(label_requires_assignee("Pending Reminder"));
    assert!(label_requires_assignee("ASSIGNED"));
    assert!(!label_requires_assignee("New"));
    assert!(!label_requires_assignee("Closed Successful"));
}

#[test]
fn declined_close_confirmation_cancels_submit() {
    let page = Arc::new(RecordingPage::answering(false));
    let (mut form, _) = controller_with(update_form(InProgress), vec![], page.clone());
    form.set_assignee(Some("12".to_string()));
    form.select_state(Cancelled);

    assert_eq!(form.request_submit(), SubmitDecision::Declined);

    assert_eq!(page.confirms(), vec![CLOSE_CONFIRMATION.to_string()]);
    assert!(form.submit_enabled());
    assert!(page.notifications().is_empty());
}

#[test]
fn accepted_confirmation_submits_and_prompts_again_next_time() {
    let page = Arc::new(RecordingPage::new());
    let (mut form, _) = controller_with(update_form(Resolved), vec![], page.clone());
    form.select_state(Closed);

    assert_eq!(form.request_submit(), SubmitDecision::Proceed);
    assert!(!form.submit_enabled());
    assert!(page.notified(NotificationLevel::Info, "Processing..."));

    form.mark_changed();
    assert_eq!(form.request_submit(), SubmitDecision::Proceed);
    assert_eq!(page.confirms().len(), 2);
}

#[test]
fn no_confirmation_outside_a_closing_transition() {
    let page = Arc::new(RecordingPage::answering(false));
    let (mut closed, _) = controller_with(update_form(Closed), vec![], page.clone());
    assert!(!closed.needs_close_confirmation());
    assert_eq!(closed.request_submit(), SubmitDecision::Proceed);

    let (mut created, _) = controller_with(
        IncidentFormInit::new(FormMode::Create, Some(New)),
        vec![],
        page.clone(),
    );
    created.select_state(Cancelled);
    assert_eq!(created.request_submit(), SubmitDecision::Proceed);

    assert!(page.confirms().is_empty());
}

#[test]
fn missing_assignee_blocks_submit() {
    let (mut form, page) = controller(update_form(New));
    form.select_state(Assigned);

    assert_eq!(
        form.request_submit(),
        SubmitDecision::Blocked(SubmitBlocked::MissingAssignee)
    );
    assert!(form.submit_enabled());

    form.set_assignee(Some("44".to_string()));
    assert_eq!(form.request_submit(), SubmitDecision::Proceed);
    assert!(page.confirms().is_empty());
}

#[tokio::test]
async fn autosave_promotes_selected_state() {
    let page = Arc::new(RecordingPage::new());
    let (mut form, backend) = controller_with(
        update_form(Pending),
        vec![Ok(json!({"Success": 1, "LastModified": "2024-05-01 10:00:00"}))],
        page.clone(),
    );
    form.select_state(Resolved);
    assert!(form.is_dirty());

    form.auto_save(vec![
        ("State".to_string(), "pending".to_string()),
        ("Priority".to_string(), "P2".to_string()),
    ])
    .await
    .expect("autosave");

    let requests = backend.requests();
    let BackendRequest::AutoSave { fields } = &requests[0] else {
        panic!("expected autosave request, got {:?}", requests[0]);
    };
    assert_eq!(field(fields, "State"), vec!["resolved"]);
    assert_eq!(field(fields, "Priority"), vec!["P2"]);

    assert_eq!(form.saved_state(), Some(Resolved));
    assert_eq!(
        form.options(),
        &[Assigned, InProgress, Pending, Resolved, Closed, Cancelled]
    );
    assert!(!form.is_dirty());
    assert_eq!(form.last_modified(), Some("2024-05-01 10:00:00"));
    assert_eq!(
        page.notifications(),
        vec![
            (NotificationLevel::Info, "Saving...".to_string()),
            (NotificationLevel::Success, "Auto-saved".to_string()),
        ]
    );
}

#[tokio::test]
async fn autosave_failures_keep_saved_state() {
    let page = Arc::new(RecordingPage::new());
    let (mut form, _) = controller_with(
        update_form(New),
        vec![
            Ok(json!({"Success": 0, "Message": "Ticket locked"})),
            Err(BackendError::Transport("reset".to_string())),
        ],
        page.clone(),
    );
    form.select_state(Assigned);

    let rejected = form.auto_save(vec![]).await.expect_err("rejected");
    assert_eq!(rejected, ApiError::application("Ticket locked"));
    let network = form.auto_save(vec![]).await.expect_err("network");
    assert_eq!(network.code, shared::error::ErrorCode::Transport);

    assert_eq!(form.saved_state(), Some(New));
    assert!(form.is_dirty());
    assert!(page.notified(NotificationLevel::Error, "Auto-save failed: Ticket locked"));
    assert!(page.notified(NotificationLevel::Error, "Auto-save failed"));
}

#[tokio::test]
async fn autosave_needs_an_existing_incident() {
    let page = Arc::new(RecordingPage::new());
    let (mut form, backend) = controller_with(
        IncidentFormInit::new(FormMode::Create, None),
        vec![],
        page,
    );
    form.mark_changed();

    let err = form.auto_save(vec![]).await.expect_err("create mode");
    assert_eq!(err.code, shared::error::ErrorCode::Validation);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn clean_form_skips_autosave() {
    let (mut form, backend) = controller_with(
        update_form(New),
        vec![],
        Arc::new(RecordingPage::new()),
    );
    assert!(form.save_if_dirty(vec![]).await.is_none());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn assignees_reload_for_new_group() {
    let page = Arc::new(RecordingPage::new());
    let mut init = update_form(Assigned);
    init.assignees = vec![SelectOption::new("1", "Old Agent")];
    init.assignee = Some("1".to_string());
    let (mut form, backend) = controller_with(
        init,
        vec![
            Ok(json!({"Users": [{"ID": 5, "Name": "Kim Lee"}, {"ID": "6", "Name": "Ari Novak"}]})),
            Err(BackendError::Transport("timeout".to_string())),
        ],
        page.clone(),
    );

    form.load_assignees(Some(GroupId(3))).await;
    assert_eq!(
        form.assignee().options,
        vec![SelectOption::new("5", "Kim Lee"), SelectOption::new("6", "Ari Novak")]
    );
    assert_eq!(form.assignee().selected, None);
    assert!(form.assignee().enabled);

    form.load_assignees(Some(GroupId(4))).await;
    assert!(form.assignee().options.is_empty());
    assert!(page.notified(NotificationLevel::Error, "Failed to load users for group: 4"));

    form.load_assignees(None).await;
    assert_eq!(backend.calls().len(), 2);
}

#[tokio::test]
async fn category_change_loads_next_tier() {
    let page = Arc::new(RecordingPage::new());
    let (mut form, backend) = controller_with(
        update_form(New),
        vec![
            Ok(json!({"Categories": [{"ID": 21, "Name": "Network"}]})),
            Err(BackendError::Status {
                status: 502,
                message: None,
            }),
        ],
        page.clone(),
    );

    form.change_category(CategoryKind::Product, 1, Some("2".to_string()))
        .await;
    assert_eq!(
        backend.requests()[0],
        BackendRequest::LoadCategories(CategoryQuery {
            kind: CategoryKind::Product,
            tier: 2,
            parents: vec!["2".to_string()],
        })
    );
    let tier2 = form.chain(CategoryKind::Product).tier(2).expect("tier 2");
    assert_eq!(tier2.options, vec![SelectOption::new("21", "Network")]);
    assert!(tier2.enabled);

    form.change_category(CategoryKind::Operational, 1, Some("9".to_string()))
        .await;
    assert!(page.notified(
        NotificationLevel::Error,
        "Failed to load operational categories for Tier: 2"
    ));
    assert!(form.chain(CategoryKind::Operational).tier(2).expect("tier 2").enabled);
}

#[test]
fn split_category_change_exposes_loading_state() {
    let (mut form, _page) = controller(update_form(New));

    let query = form
        .begin_category_change(CategoryKind::Product, 1, Some("2".to_string()))
        .expect("query");
    assert!(form.chain(CategoryKind::Product).tier(2).expect("tier 2").loading);

    form.finish_category_load(&query, Ok(vec![SelectOption::new("30", "Storage")]));
    assert!(!form.chain(CategoryKind::Product).tier(2).expect("tier 2").loading);
}

#[tokio::test(start_paused = true)]
async fn debounce_lets_only_the_last_change_through() {
    let debounce = AutosaveDebounce::new(Duration::from_secs(30));

    let first = tokio::spawn({
        let debounce = debounce.clone();
        async move { debounce.settle().await }
    });
    tokio::time::sleep(Duration::from_secs(10)).await;
    let second = tokio::spawn({
        let debounce = debounce.clone();
        async move { debounce.settle().await }
    });

    assert!(!first.await.expect("join first"));
    assert!(second.await.expect("join second"));
}
