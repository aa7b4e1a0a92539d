use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use helpdesk_client::{
    bulk_update::{BulkUpdateOptions, REQUEST_PACING},
    transport::DEFAULT_SESSION_NAME,
    SessionContext,
};
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const SETTINGS_FILE: &str = "deskctl.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub session_name: String,
    pub session_id: Option<String>,
    pub challenge_token: Option<String>,
    pub pacing_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1/otrs/index.pl".into(),
            session_name: DEFAULT_SESSION_NAME.into(),
            session_id: None,
            challenge_token: None,
            pacing_ms: REQUEST_PACING.as_millis() as u64,
        }
    }
}

/// Keys accepted in `deskctl.toml`; all optional.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    base_url: Option<String>,
    session_name: Option<String>,
    session_id: Option<String>,
    challenge_token: Option<String>,
    pacing_ms: Option<u64>,
}

impl Settings {
    pub fn session(&self) -> SessionContext {
        SessionContext {
            session_name: self.session_name.clone(),
            session_id: self.session_id.clone(),
            challenge_token: self.challenge_token.clone(),
        }
    }

    pub fn bulk_options(&self) -> BulkUpdateOptions {
        BulkUpdateOptions::with_pacing(Duration::from_millis(self.pacing_ms))
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(Path::new(SETTINGS_FILE)) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

/// Applies the keys present in a settings file. A file that does not parse
/// is reported and leaves `settings` untouched.
pub(crate) fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(file = SETTINGS_FILE, error = %err, "ignoring malformed settings file");
            return;
        }
    };
    if let Some(v) = file_cfg.base_url {
        settings.base_url = v;
    }
    if let Some(v) = file_cfg.session_name {
        settings.session_name = v;
    }
    if let Some(v) = file_cfg.session_id {
        settings.session_id = Some(v);
    }
    if let Some(v) = file_cfg.challenge_token {
        settings.challenge_token = Some(v);
    }
    if let Some(v) = file_cfg.pacing_ms {
        settings.pacing_ms = v;
    }
}

pub(crate) fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("HELPDESK_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = var("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = var("HELPDESK_SESSION_NAME") {
        settings.session_name = v;
    }
    if let Some(v) = var("HELPDESK_SESSION_ID") {
        settings.session_id = Some(v);
    }
    if let Some(v) = var("HELPDESK_CHALLENGE_TOKEN") {
        settings.challenge_token = Some(v);
    }

    if let Some(parsed) = var("APP__PACING_MS").and_then(|v| v.parse().ok()) {
        settings.pacing_ms = parsed;
    }
}

/// Validates the controller endpoint; only http(s) URLs with a host are
/// accepted.
pub fn normalize_base_url(raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("base url is empty");
    }

    let url = Url::parse(raw).with_context(|| format!("invalid base url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("base url '{raw}' must use http or https");
    }
    if url.host_str().is_none() {
        bail!("base url '{raw}' has no host");
    }

    Ok(url.to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
