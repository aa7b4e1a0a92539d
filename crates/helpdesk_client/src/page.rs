//! The page embedding a controller: dialogs, notifications, reloads and
//! page-local storage.

use std::{collections::HashMap, fmt, sync::Mutex};

use tracing::{error, info, warn};
use url::{form_urlencoded, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

pub trait PageHost: Send + Sync {
    /// Blocking message the user must acknowledge.
    fn alert(&self, message: &str);
    /// Blocking yes/no question.
    fn confirm(&self, message: &str) -> bool;
    /// Non-blocking toast.
    fn notify(&self, level: NotificationLevel, message: &str);
    fn reload(&self);
    fn local_get(&self, key: &str) -> Option<String>;
    fn local_set(&self, key: &str, value: &str);
}

/// Identity of the page a controller is mounted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation(Url);

impl PageLocation {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        Url::parse(raw.trim()).map(Self)
    }

    /// Value of the `Action` query parameter. The agent interface separates
    /// parameters with `;` as well as `&`.
    pub fn action(&self) -> Option<String> {
        self.query_param("Action")
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.0
            .query()?
            .split(['&', ';'])
            .flat_map(|pair| form_urlencoded::parse(pair.as_bytes()))
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for PageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Terminal stand-in for a browser page.
pub struct ConsolePage {
    assume_yes: bool,
    storage: Mutex<HashMap<String, String>>,
}

impl ConsolePage {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            storage: Mutex::new(HashMap::new()),
        }
    }
}

impl PageHost for ConsolePage {
    fn alert(&self, message: &str) {
        println!("{message}");
    }

    fn confirm(&self, message: &str) -> bool {
        println!("{message}");
        if !self.assume_yes {
            warn!("confirmation declined; pass --yes to accept prompts");
        }
        self.assume_yes
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Info | NotificationLevel::Success => info!(%message, "notification"),
            NotificationLevel::Error => error!(%message, "notification"),
        }
    }

    fn reload(&self) {
        info!("page reload requested");
    }

    fn local_get(&self, key: &str) -> Option<String> {
        self.storage
            .lock()
            .ok()
            .and_then(|storage| storage.get(key).cloned())
    }

    fn local_set(&self, key: &str, value: &str) {
        if let Ok(mut storage) = self.storage.lock() {
            storage.insert(key.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
#[path = "tests/page_tests.rs"]
mod tests;
