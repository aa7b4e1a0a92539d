use std::sync::Arc;

use tracing::debug;

use crate::PageHost;

pub const STORAGE_KEY: &str = "IncidentFormActiveTab";

/// Remembers the incident form's active tab across page loads.
pub struct TabMemory {
    page: Arc<dyn PageHost>,
}

impl TabMemory {
    pub fn new(page: Arc<dyn PageHost>) -> Self {
        Self { page }
    }

    pub fn activate(&self, tab_id: &str) {
        debug!(tab_id, "incident form tab activated");
        self.page.local_set(STORAGE_KEY, tab_id);
    }

    /// Last active tab, provided it is still one of `available`.
    pub fn restore(&self, available: &[&str]) -> Option<String> {
        self.page
            .local_get(STORAGE_KEY)
            .filter(|tab| available.contains(&tab.as_str()))
    }
}

#[cfg(test)]
#[path = "tests/tabs_tests.rs"]
mod tests;
