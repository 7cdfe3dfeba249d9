use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Top-level configuration for one portal deployment. Every section has
/// working defaults targeting the portal's current markup, so a config file
/// is only needed to override selector chains or budgets after UI drift.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PortalConfig {
    pub portal: PortalSection,
    pub chromium: ChromiumSection,
    pub timeouts: TimeoutsSection,
    pub retry: RetrySection,
    pub consent: ConsentSection,
    pub selectors: SelectorsSection,
    pub observability: ObservabilitySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalSection {
    pub base_url: String,
    pub login_url: String,
    pub search_url: String,
    /// URL fragments that mark a page as still part of the login flow.
    pub login_path_markers: Vec<String>,
    /// Body-text fragments only present once a session is authenticated.
    pub logged_in_markers: Vec<String>,
    pub cookie_domain: String,
}

impl Default for PortalSection {
    fn default() -> Self {
        Self {
            base_url: "https://access.redhat.com".into(),
            login_url: "https://access.redhat.com/login".into(),
            search_url: "https://access.redhat.com/search/".into(),
            login_path_markers: vec!["/login".into(), "sso.".into()],
            logged_in_markers: vec![
                "My account".into(),
                "Log out".into(),
                "Logout".into(),
            ],
            cookie_domain: ".redhat.com".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    /// Explicit binary path; `None` lets chromiumoxide detect an install.
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub window: [u32; 2],
    pub user_agent: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: false,
            disable_gpu: true,
            window: [1920, 1080],
            user_agent: None,
            request_timeout_seconds: 30,
        }
    }
}

/// Distinct budgets per suspension point: speculative probes stay short so
/// an absent element costs little, required steps get room for real latency.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    /// Per-candidate budget while walking a selector chain.
    pub probe_ms: u64,
    /// Poll interval for DOM probes.
    pub poll_ms: u64,
    /// Optional elements: consent banner, "next" control.
    pub speculative_ms: u64,
    /// Required signals: page ready, login success, content ready.
    pub required_ms: u64,
    /// Settle delay after a dismissal click.
    pub settle_ms: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            probe_ms: 1_500,
            poll_ms: 200,
            speculative_ms: 2_000,
            required_ms: 20_000,
            settle_ms: 250,
        }
    }
}

impl TimeoutsSection {
    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn speculative(&self) -> Duration {
        Duration::from_millis(self.speculative_ms)
    }

    pub fn required(&self) -> Duration {
        Duration::from_millis(self.required_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: usize,
    pub backoff_seconds: u64,
    pub jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: 3,
            jitter_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsentSection {
    /// Banner container candidates, most site-specific first.
    pub containers: Vec<String>,
    /// Accept/close button candidates, scoped to a matched container.
    pub buttons: Vec<String>,
    /// Affirmative button labels across the locales the portal serves.
    pub vocabulary: Vec<String>,
    /// Cookies pre-seeded before first navigation to skip the banner.
    pub cookies: Vec<ConsentCookieSpec>,
}

impl Default for ConsentSection {
    fn default() -> Self {
        Self {
            containers: vec![
                "#onetrust-banner-sdk".into(),
                ".pf-c-modal-box".into(),
                "[role='dialog'][aria-modal='true']".into(),
            ],
            buttons: vec![
                "#onetrust-accept-btn-handler".into(),
                "button.pf-c-button[aria-label='Close']".into(),
                "button.pf-c-button.pf-m-primary".into(),
                ".close-button".into(),
                "button[aria-label='Close']".into(),
            ],
            vocabulary: vec![
                "Accept".into(),
                "I agree".into(),
                "Agree".into(),
                "Accept all".into(),
                "Close".into(),
                "OK".into(),
                "Alle akzeptieren".into(),
                "Aceptar".into(),
                "接受".into(),
                "同意".into(),
                "关闭".into(),
            ],
            cookies: vec![ConsentCookieSpec {
                name: "OptanonAlertBoxClosed".into(),
                value: "2024-01-01T00:00:00.000Z".into(),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsentCookieSpec {
    pub name: String,
    pub value: String,
}

/// Selector chain entries accept an optional `text:` or `xpath:` prefix;
/// anything unprefixed is CSS.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SelectorsSection {
    pub login: LoginSelectors,
    pub search: SearchSelectors,
    pub document: DocumentSelectors,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    pub username: Vec<String>,
    pub next: Vec<String>,
    pub password: Vec<String>,
    pub submit: Vec<String>,
    pub account_marker: Vec<String>,
    pub error_banner: Vec<String>,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            username: vec![
                "input#username".into(),
                "input[name='username']".into(),
                "input[type='text']".into(),
            ],
            next: vec!["text:Next".into(), "text:Continue".into()],
            password: vec![
                "input#password".into(),
                "input[name='password']".into(),
                "input[type='password']".into(),
            ],
            submit: vec![
                "#kc-login".into(),
                "button[type='submit']".into(),
                "text:Log in".into(),
                "xpath://input[@type='submit']".into(),
            ],
            account_marker: vec![
                ".pf-c-dropdown__toggle-text".into(),
                ".user-name".into(),
                ".rh-user-menu".into(),
                ".pf-c-nav__link".into(),
            ],
            error_banner: vec![
                ".kc-feedback-text".into(),
                ".alert-error".into(),
                ".pf-c-alert__title".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSelectors {
    pub content_ready: Vec<String>,
    pub containers: Vec<String>,
    pub no_results: Vec<String>,
    pub title_link: Vec<String>,
    pub summary: Vec<String>,
    pub doc_type: Vec<String>,
    pub last_updated: Vec<String>,
}

impl Default for SearchSelectors {
    fn default() -> Self {
        Self {
            content_ready: vec![".search-result".into(), ".pf-c-card".into()],
            containers: vec![".search-result".into(), ".pf-c-card".into()],
            no_results: vec![".no-results".into(), ".pf-c-empty-state".into()],
            title_link: vec!["h2 a".into(), ".pf-c-title a".into()],
            summary: vec![
                ".search-result-content".into(),
                ".pf-c-card__body".into(),
            ],
            doc_type: vec![".search-result-info span".into(), ".pf-c-label".into()],
            last_updated: vec![
                ".search-result-info time".into(),
                ".pf-c-label[data-testid='date']".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentSelectors {
    pub content_ready: Vec<String>,
    pub title: Vec<String>,
    pub content: Vec<String>,
    pub metadata_group: Vec<String>,
    pub metadata_label: Vec<String>,
    pub metadata_value: Vec<String>,
}

impl Default for DocumentSelectors {
    fn default() -> Self {
        Self {
            content_ready: vec![
                ".field-item".into(),
                ".pf-c-content".into(),
                "article".into(),
            ],
            title: vec!["h1".into(), ".pf-c-title".into()],
            content: vec![
                ".field-item".into(),
                ".pf-c-content".into(),
                "article".into(),
            ],
            metadata_group: vec![
                ".field".into(),
                ".pf-c-description-list__group".into(),
            ],
            metadata_label: vec![
                ".field-label".into(),
                ".pf-c-description-list__term".into(),
            ],
            metadata_value: vec![
                ".field-item".into(),
                ".pf-c-description-list__description".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilitySection {
    pub screenshot_dir: String,
    pub capture_screenshots: bool,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self {
            screenshot_dir: "artifacts/login-failures".into(),
            capture_screenshots: true,
        }
    }
}

pub fn load_portal_config<P: AsRef<Path>>(path: P) -> Result<PortalConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
