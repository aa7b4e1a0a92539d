use std::sync::Arc;

use super::*;
use crate::transport::{HttpBackend, SessionContext};
use axum::{extract::State, http::StatusCode, routing::post, Form, Router};
use shared::{
    domain::{GroupId, IncidentId, TicketId},
    protocol::{AutoSaveResponse, ConnectionTarget},
};
use tokio::{net::TcpListener, sync::Mutex};

type Fields = Vec<(String, String)>;

#[derive(Clone, Default)]
struct ServerState {
    seen: Arc<Mutex<Vec<Fields>>>,
}

fn field<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

async fn handle_dispatch(
    State(state): State<ServerState>,
    Form(fields): Form<Fields>,
) -> (StatusCode, String) {
    let subaction = field(&fields, "Subaction").map(str::to_string);
    state.seen.lock().await.push(fields);
    match subaction.as_deref() {
        Some("LoadAssignedUsers") => (
            StatusCode::OK,
            r#"{"Users":[{"ID":3,"Name":"Dana Reyes"}]}"#.to_string(),
        ),
        Some("AutoSave") => (StatusCode::OK, "  \n".to_string()),
        Some("SubmitToServiceNow") => (
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"Message":"ServiceNow is down"}"#.to_string(),
        ),
        Some("TestConnection") => (StatusCode::OK, "<html>login</html>".to_string()),
        _ => (
            StatusCode::OK,
            r#"{"success":true,"ticketID":"42","ticketNumber":"2024010110000042"}"#.to_string(),
        ),
    }
}

async fn spawn_dispatch_server() -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/otrs/index.pl", post(handle_dispatch))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/otrs/index.pl"), state)
}

fn session() -> SessionContext {
    SessionContext {
        session_id: Some("sess-1".to_string()),
        challenge_token: Some("tok-9".to_string()),
        ..SessionContext::default()
    }
}

#[tokio::test]
async fn mutating_request_carries_session_and_challenge_token() {
    let (url, state) = spawn_dispatch_server().await;
    let backend = HttpBackend::new(url, session());

    let body = backend
        .dispatch(BackendRequest::BulkUpdateTicket {
            ticket_id: TicketId(42),
        })
        .await
        .expect("dispatch");
    assert_eq!(body["ticketNumber"], "2024010110000042");

    let seen = state.seen.lock().await;
    let fields = &seen[0];
    assert_eq!(fields[0], ("Action".to_string(), "AgentEscalationViewBulkUpdate".to_string()));
    assert_eq!(field(fields, "TicketID"), Some("42"));
    assert_eq!(field(fields, "OTRSAgentInterface"), Some("sess-1"));
    assert_eq!(field(fields, "ChallengeToken"), Some("tok-9"));
}

#[tokio::test]
async fn lookups_skip_the_challenge_token() {
    let (url, state) = spawn_dispatch_server().await;
    let backend = HttpBackend::new(url, session());

    let users: shared::protocol::UsersResponse = call(
        &backend,
        BackendRequest::LoadAssignedUsers {
            group_id: GroupId(7),
        },
    )
    .await
    .expect("users");
    assert_eq!(users.users.len(), 1);
    assert_eq!(users.users[0].id, "3");

    let seen = state.seen.lock().await;
    assert_eq!(field(&seen[0], "GroupID"), Some("7"));
    assert_eq!(field(&seen[0], "OTRSAgentInterface"), Some("sess-1"));
    assert_eq!(field(&seen[0], "ChallengeToken"), None);
}

#[tokio::test]
async fn blank_body_decodes_to_failed_default() {
    let (url, _state) = spawn_dispatch_server().await;
    let backend = HttpBackend::new(url, session());

    let raw = backend
        .dispatch(BackendRequest::AutoSave { fields: Vec::new() })
        .await
        .expect("dispatch");
    assert!(raw.is_null());

    let typed: AutoSaveResponse = call(&backend, BackendRequest::AutoSave { fields: Vec::new() })
        .await
        .expect("typed");
    assert!(!typed.success);
}

#[tokio::test]
async fn error_status_keeps_server_message() {
    let (url, _state) = spawn_dispatch_server().await;
    let backend = HttpBackend::new(url, session());

    let err = backend
        .dispatch(BackendRequest::SubmitToServiceNow {
            incident_id: IncidentId(5),
        })
        .await
        .expect_err("500");
    assert_eq!(
        err,
        BackendError::Status {
            status: 500,
            message: Some("ServiceNow is down".to_string()),
        }
    );
    assert_eq!(err.server_message(), Some("ServiceNow is down"));
    assert_eq!(err.detail(), "HTTP 500");
    assert_eq!(err.code(), ErrorCode::Transport);
}

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    let (url, _state) = spawn_dispatch_server().await;
    let backend = HttpBackend::new(url, session());

    let err = backend
        .dispatch(BackendRequest::TestConnection(ConnectionTarget::Zabbix))
        .await
        .expect_err("html body");
    assert!(matches!(err, BackendError::Decode(_)));
    assert_eq!(ApiError::from(err).code, ErrorCode::Decode);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let backend = HttpBackend::new(format!("http://{addr}/index.pl"), SessionContext::default());
    let err = backend
        .dispatch(BackendRequest::BulkUpdateTicket {
            ticket_id: TicketId(1),
        })
        .await
        .expect_err("connection refused");
    assert!(matches!(err, BackendError::Transport(_)));
}

#[tokio::test]
async fn missing_backend_names_the_action() {
    let err = MissingTicketBackend
        .dispatch(BackendRequest::UnlinkTickets {
            ticket_ids: vec![TicketId(1)],
        })
        .await
        .expect_err("missing");
    assert_eq!(
        err,
        BackendError::Transport(
            "ticket backend unavailable for AgentEscalationViewUnlinkTickets".to_string()
        )
    );
}

#[test]
fn session_context_omits_blank_values() {
    let context = SessionContext {
        session_id: Some(String::new()),
        challenge_token: None,
        ..SessionContext::default()
    };
    let fields = context.decorate(&BackendRequest::BulkUpdateTicket {
        ticket_id: TicketId(3),
    });
    assert_eq!(
        fields,
        vec![
            ("Action".to_string(), "AgentEscalationViewBulkUpdate".to_string()),
            ("TicketID".to_string(), "3".to_string()),
        ]
    );
}
