//! Fakes shared by the controller tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use shared::protocol::BackendRequest;
use tokio::time::Instant;

use crate::{BackendError, NotificationLevel, PageHost, TicketBackend};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: BackendRequest,
    pub started: Instant,
    pub finished: Instant,
}

/// Answers requests from a queue of canned replies and records when each
/// call started and finished.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<Value, BackendError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<Value, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.calls().into_iter().map(|call| call.request).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketBackend for ScriptedBackend {
    async fn dispatch(&self, request: BackendRequest) -> Result<Value, BackendError> {
        let started = Instant::now();
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Ok(Value::Null));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().expect("calls lock").push(RecordedCall {
            request,
            started,
            finished: Instant::now(),
        });
        reply
    }
}

/// Page that records every dialog, toast and reload.
pub struct RecordingPage {
    alerts: Mutex<Vec<String>>,
    confirms: Mutex<Vec<String>>,
    notifications: Mutex<Vec<(NotificationLevel, String)>>,
    storage: Mutex<HashMap<String, String>>,
    reloads: AtomicUsize,
    confirm_answer: AtomicBool,
}

impl RecordingPage {
    pub fn new() -> Self {
        Self::answering(true)
    }

    pub fn answering(confirm_answer: bool) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            confirms: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            storage: Mutex::new(HashMap::new()),
            reloads: AtomicUsize::new(0),
            confirm_answer: AtomicBool::new(confirm_answer),
        }
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().expect("alerts lock").clone()
    }

    pub fn confirms(&self) -> Vec<String> {
        self.confirms.lock().expect("confirms lock").clone()
    }

    pub fn notifications(&self) -> Vec<(NotificationLevel, String)> {
        self.notifications.lock().expect("notifications lock").clone()
    }

    pub fn notified(&self, level: NotificationLevel, message: &str) -> bool {
        self.notifications()
            .iter()
            .any(|(l, m)| *l == level && m == message)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl PageHost for RecordingPage {
    fn alert(&self, message: &str) {
        self.alerts.lock().expect("alerts lock").push(message.to_string());
    }

    fn confirm(&self, message: &str) -> bool {
        self.confirms
            .lock()
            .expect("confirms lock")
            .push(message.to_string());
        self.confirm_answer.load(Ordering::SeqCst)
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        self.notifications
            .lock()
            .expect("notifications lock")
            .push((level, message.to_string()));
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }

    fn local_get(&self, key: &str) -> Option<String> {
        self.storage.lock().expect("storage lock").get(key).cloned()
    }

    fn local_set(&self, key: &str, value: &str) {
        self.storage
            .lock()
            .expect("storage lock")
            .insert(key.to_string(), value.to_string());
    }
}
