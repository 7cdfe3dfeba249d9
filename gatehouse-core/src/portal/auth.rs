use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::browser::{ConsentBannerHandler, PortalPage, SelectorChain};
use crate::config::{PortalConfig, TimeoutsSection};

/// Portal credentials for exactly one authentication attempt. Never cached,
/// never logged beyond the username at debug level.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    /// Worth another attempt: timeouts, missing elements, half-rendered
    /// pages. Consumes one unit of the retry budget.
    Retryable(String),
    /// Not worth another attempt: bad parameters or an explicit
    /// invalid-credentials message. Short-circuits the retry loop.
    Fatal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NotStarted,
    UsernameEntered,
    PasswordEntered,
    Submitted,
    Authenticated,
    Failed,
}

/// Drives the portal's multi-screen login flow. Both single-step forms and
/// two-step flows (username, then a "next" interstitial, then password) are
/// supported; the interstitial is probed with a short budget and its
/// absence is not an error.
pub struct AuthenticationStateMachine {
    login_url: String,
    username: SelectorChain,
    next_control: SelectorChain,
    password: SelectorChain,
    submit: SelectorChain,
    account_marker: SelectorChain,
    error_banner: SelectorChain,
    login_path_markers: Vec<String>,
    logged_in_markers: Vec<String>,
    timeouts: TimeoutsSection,
    backoff: Duration,
    jitter_ms: u64,
    screenshot_dir: PathBuf,
    capture_screenshots: bool,
    fatal_text: Regex,
    consent: ConsentBannerHandler,
    state: AuthState,
}

impl AuthenticationStateMachine {
    pub fn from_config(config: &PortalConfig) -> Self {
        let selectors = &config.selectors.login;
        Self {
            login_url: config.portal.login_url.clone(),
            username: SelectorChain::from_specs(&selectors.username),
            next_control: SelectorChain::from_specs(&selectors.next),
            password: SelectorChain::from_specs(&selectors.password),
            submit: SelectorChain::from_specs(&selectors.submit),
            account_marker: SelectorChain::from_specs(&selectors.account_marker),
            error_banner: SelectorChain::from_specs(&selectors.error_banner),
            login_path_markers: config.portal.login_path_markers.clone(),
            logged_in_markers: config.portal.logged_in_markers.clone(),
            timeouts: config.timeouts.clone(),
            backoff: Duration::from_secs(config.retry.backoff_seconds),
            jitter_ms: config.retry.jitter_ms,
            screenshot_dir: PathBuf::from(&config.observability.screenshot_dir),
            capture_screenshots: config.observability.capture_screenshots,
            // Credential rejections are worded differently across the IdP's
            // page variants, but all of them contain one of these.
            fatal_text: Regex::new(r"(?i)invalid|incorrect").expect("valid regex"),
            consent: ConsentBannerHandler::from_config(config),
            state: AuthState::NotStarted,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub async fn login<P: PortalPage + ?Sized>(
        &mut self,
        page: &mut P,
        credentials: &Credentials,
        max_retries: usize,
    ) -> LoginOutcome {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            self.state = AuthState::Failed;
            return LoginOutcome::Fatal("username and password must be non-empty".into());
        }
        if max_retries == 0 {
            self.state = AuthState::Failed;
            return LoginOutcome::Fatal("max_retries must be at least 1".into());
        }
        debug!(username = %credentials.username, "starting portal login");

        for attempt in 1..=max_retries {
            self.state = AuthState::NotStarted;
            info!(attempt, max_retries, "login attempt");
            match self.run_attempt(page, credentials).await {
                LoginOutcome::Success => {
                    self.state = AuthState::Authenticated;
                    info!(attempt, "login succeeded");
                    return LoginOutcome::Success;
                }
                LoginOutcome::Fatal(reason) => {
                    self.state = AuthState::Failed;
                    warn!(attempt, reason = %reason, "login failed fatally");
                    return LoginOutcome::Fatal(reason);
                }
                LoginOutcome::Retryable(reason) => {
                    warn!(attempt, reason = %reason, "login attempt failed");
                    self.capture_diagnostic(page, attempt).await;
                    if attempt == max_retries {
                        self.state = AuthState::Failed;
                        return LoginOutcome::Retryable(reason);
                    }
                    self.backoff_delay().await;
                    // A half-finished IdP redirect can strand the page on an
                    // interstitial; reload before renavigating.
                    if let Err(err) = page.reload().await {
                        debug!(error = %err, "reload between login attempts failed");
                    }
                }
            }
        }
        self.state = AuthState::Failed;
        LoginOutcome::Retryable("retry budget exhausted".into())
    }

    async fn run_attempt<P: PortalPage + ?Sized>(
        &mut self,
        page: &mut P,
        credentials: &Credentials,
    ) -> LoginOutcome {
        if let Err(err) = page.goto(&self.login_url).await {
            return LoginOutcome::Retryable(format!("failed to open login page: {err}"));
        }
        if let Err(err) = page.wait_for_body(self.timeouts.required()).await {
            return LoginOutcome::Retryable(format!("login page never became ready: {err}"));
        }
        // The banner can overlay the form and swallow every click.
        self.consent.dismiss(page).await;

        if !self.wait_for_chain(page, &self.username).await {
            return LoginOutcome::Retryable("no recognizable login form".into());
        }
        match page
            .fill(&self.username, &credentials.username, self.timeouts.probe())
            .await
        {
            Ok(true) => self.state = AuthState::UsernameEntered,
            Ok(false) => return LoginOutcome::Retryable("username field not found".into()),
            Err(err) => return LoginOutcome::Retryable(format!("username entry failed: {err}")),
        }

        match page
            .click(&self.next_control, self.timeouts.speculative())
            .await
        {
            Ok(true) => debug!("intermediate continue control clicked"),
            Ok(false) => debug!("single-step login form"),
            Err(err) => debug!(error = %err, "continue control probe failed"),
        }

        if !self.wait_for_chain(page, &self.password).await {
            return LoginOutcome::Retryable("password field never appeared".into());
        }
        match page
            .fill(&self.password, &credentials.password, self.timeouts.probe())
            .await
        {
            Ok(true) => self.state = AuthState::PasswordEntered,
            Ok(false) => return LoginOutcome::Retryable("password field not found".into()),
            Err(err) => return LoginOutcome::Retryable(format!("password entry failed: {err}")),
        }

        match page.click(&self.submit, self.timeouts.probe()).await {
            Ok(true) => self.state = AuthState::Submitted,
            Ok(false) => return LoginOutcome::Retryable("submit control not found".into()),
            Err(err) => return LoginOutcome::Retryable(format!("submit click failed: {err}")),
        }

        self.detect_outcome(page).await
    }

    /// Multi-signal success detection, first signal to fire wins:
    /// 1. a post-login DOM marker becomes visible,
    /// 2. the URL has left the login flow,
    /// 3. the page text carries a logged-in indicator.
    /// An explicit invalid/incorrect banner is fatal; silence until the
    /// deadline is retryable.
    async fn detect_outcome<P: PortalPage + ?Sized>(&mut self, page: &mut P) -> LoginOutcome {
        let deadline = tokio::time::Instant::now() + self.timeouts.required();
        loop {
            match page.first_match(&self.account_marker, Duration::ZERO).await {
                Ok(Some(marker)) => {
                    debug!(marker = %marker, "post-login marker visible");
                    return LoginOutcome::Success;
                }
                Ok(None) => {}
                Err(err) => debug!(error = %err, "account marker probe failed"),
            }

            if let Ok(url) = page.current_url().await {
                if !url.is_empty()
                    && !self
                        .login_path_markers
                        .iter()
                        .any(|marker| url.contains(marker.as_str()))
                {
                    debug!(url = %url, "url left the login flow");
                    return LoginOutcome::Success;
                }
            }

            if let Ok(text) = page.body_text().await {
                if self
                    .logged_in_markers
                    .iter()
                    .any(|marker| text.contains(marker.as_str()))
                {
                    debug!("logged-in indicator present in page text");
                    return LoginOutcome::Success;
                }
                if let Ok(Some(banner)) = page.first_match(&self.error_banner, Duration::ZERO).await
                {
                    if self.fatal_text.is_match(&text) {
                        debug!(banner = %banner, "credential rejection banner present");
                        return LoginOutcome::Fatal("invalid credentials reported".into());
                    }
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return LoginOutcome::Retryable("no login success signal before timeout".into());
            }
            tokio::time::sleep(self.timeouts.poll()).await;
        }
    }

    /// Polls for any candidate of the chain until the required budget runs
    /// out. Each pass walks the chain with the short per-candidate probe.
    async fn wait_for_chain<P: PortalPage + ?Sized>(
        &self,
        page: &mut P,
        chain: &SelectorChain,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + self.timeouts.required();
        loop {
            match page.first_match(chain, self.timeouts.probe()).await {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(err) => debug!(error = %err, "chain probe failed"),
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.timeouts.poll()).await;
        }
    }

    async fn capture_diagnostic<P: PortalPage + ?Sized>(&self, page: &mut P, attempt: usize) {
        if !self.capture_screenshots {
            return;
        }
        let bytes = match page.screenshot().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "diagnostic screenshot capture failed");
                return;
            }
        };
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let path = self
            .screenshot_dir
            .join(format!("login-failure-{stamp}-attempt{attempt}.png"));
        if let Err(err) = tokio::fs::create_dir_all(&self.screenshot_dir).await {
            warn!(error = %err, "could not create screenshot dir");
            return;
        }
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => debug!(path = %path.display(), "diagnostic screenshot saved"),
            Err(err) => warn!(error = %err, "could not write diagnostic screenshot"),
        }
    }

    async fn backoff_delay(&self) {
        let mut delay = self.backoff;
        if self.jitter_ms > 0 {
            delay += Duration::from_millis(rand::thread_rng().gen_range(0..=self.jitter_ms));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserResult, ConsentCookie, Selector};
    use async_trait::async_trait;
    use serde_json::Value;

    /// Scripted login page. Chains are recognized by their first candidate,
    /// mirroring the default selector config.
    #[derive(Default)]
    struct LoginPage {
        form_present: bool,
        error_banner: bool,
        success_after_submit: bool,
        body: String,
        url: String,
        goto_count: usize,
        reload_count: usize,
        next_clicks: usize,
        submit_clicks: usize,
        marker_visible: bool,
        screenshot_bytes: Vec<u8>,
    }

    impl LoginPage {
        fn chain_kind(chain: &SelectorChain) -> &'static str {
            match chain.candidates().first().map(|c| c.value.as_str()) {
                Some("input#username") => "username",
                Some("input#password") => "password",
                Some("#kc-login") => "submit",
                Some("Next") => "next",
                Some(".pf-c-dropdown__toggle-text") => "marker",
                Some(".kc-feedback-text") => "banner",
                _ => "other",
            }
        }
    }

    #[async_trait(?Send)]
    impl PortalPage for LoginPage {
        async fn goto(&mut self, _url: &str) -> BrowserResult<()> {
            self.goto_count += 1;
            Ok(())
        }
        async fn reload(&mut self) -> BrowserResult<()> {
            self.reload_count += 1;
            Ok(())
        }
        async fn current_url(&mut self) -> BrowserResult<String> {
            Ok(self.url.clone())
        }
        async fn wait_for_body(&mut self, _timeout: Duration) -> BrowserResult<()> {
            Ok(())
        }
        async fn first_match(
            &mut self,
            chain: &SelectorChain,
            _timeout: Duration,
        ) -> BrowserResult<Option<Selector>> {
            let hit = match Self::chain_kind(chain) {
                "username" | "password" | "submit" => self.form_present,
                "marker" => self.marker_visible,
                "banner" => self.error_banner,
                _ => false,
            };
            Ok(hit.then(|| chain.candidates()[0].clone()))
        }
        async fn fill(
            &mut self,
            chain: &SelectorChain,
            _value: &str,
            _timeout: Duration,
        ) -> BrowserResult<bool> {
            Ok(matches!(Self::chain_kind(chain), "username" | "password") && self.form_present)
        }
        async fn click(
            &mut self,
            chain: &SelectorChain,
            _timeout: Duration,
        ) -> BrowserResult<bool> {
            match Self::chain_kind(chain) {
                "next" => {
                    self.next_clicks += 1;
                    Ok(false)
                }
                "submit" if self.form_present => {
                    self.submit_clicks += 1;
                    if self.success_after_submit {
                        self.marker_visible = true;
                    }
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
        async fn click_within(
            &mut self,
            _containers: &SelectorChain,
            _buttons: &SelectorChain,
        ) -> BrowserResult<bool> {
            Ok(false)
        }
        async fn click_text(&mut self, _labels: &[String]) -> BrowserResult<bool> {
            Ok(false)
        }
        async fn body_text(&mut self) -> BrowserResult<String> {
            Ok(self.body.clone())
        }
        async fn evaluate_json(&mut self, _script: &str) -> BrowserResult<Value> {
            Ok(Value::Null)
        }
        async fn screenshot(&mut self) -> BrowserResult<Vec<u8>> {
            Ok(self.screenshot_bytes.clone())
        }
        async fn seed_cookies(&mut self, _cookies: &[ConsentCookie]) -> BrowserResult<()> {
            Ok(())
        }
    }

    fn fast_config() -> PortalConfig {
        let mut config = PortalConfig::default();
        config.timeouts.probe_ms = 1;
        config.timeouts.poll_ms = 1;
        config.timeouts.speculative_ms = 1;
        config.timeouts.required_ms = 20;
        config.retry.backoff_seconds = 0;
        config.retry.jitter_ms = 0;
        config.observability.capture_screenshots = false;
        config
    }

    #[tokio::test]
    async fn empty_password_is_fatal_before_any_navigation() {
        let mut machine = AuthenticationStateMachine::from_config(&fast_config());
        let mut page = LoginPage::default();
        let outcome = machine
            .login(&mut page, &Credentials::new("user@example.com", ""), 3)
            .await;
        assert!(matches!(outcome, LoginOutcome::Fatal(_)));
        assert_eq!(machine.state(), AuthState::Failed);
        assert_eq!(page.goto_count, 0);
    }

    #[tokio::test]
    async fn zero_retry_budget_is_rejected() {
        let mut machine = AuthenticationStateMachine::from_config(&fast_config());
        let mut page = LoginPage::default();
        let outcome = machine
            .login(&mut page, &Credentials::new("user@example.com", "hunter2"), 0)
            .await;
        assert!(matches!(outcome, LoginOutcome::Fatal(_)));
        assert_eq!(page.goto_count, 0);
    }

    #[tokio::test]
    async fn successful_login_reaches_authenticated_state() {
        let mut machine = AuthenticationStateMachine::from_config(&fast_config());
        let mut page = LoginPage {
            form_present: true,
            success_after_submit: true,
            url: "https://sso.redhat.com/auth".into(),
            ..LoginPage::default()
        };
        let outcome = machine
            .login(&mut page, &Credentials::new("user@example.com", "hunter2"), 3)
            .await;
        assert_eq!(outcome, LoginOutcome::Success);
        assert_eq!(machine.state(), AuthState::Authenticated);
        assert_eq!(page.goto_count, 1);
        assert_eq!(page.submit_clicks, 1);
        // The optional continue control was probed but never required.
        assert_eq!(page.next_clicks, 1);
    }

    #[tokio::test]
    async fn invalid_credentials_are_fatal_on_the_first_attempt() {
        let mut machine = AuthenticationStateMachine::from_config(&fast_config());
        let mut page = LoginPage {
            form_present: true,
            error_banner: true,
            body: "Invalid login or password.".into(),
            url: "https://sso.redhat.com/auth/login".into(),
            ..LoginPage::default()
        };
        let outcome = machine
            .login(&mut page, &Credentials::new("user@example.com", "wrong"), 3)
            .await;
        assert!(matches!(outcome, LoginOutcome::Fatal(_)));
        assert_eq!(page.goto_count, 1);
        assert_eq!(page.reload_count, 0);
    }

    #[tokio::test]
    async fn permanently_retryable_page_consumes_the_whole_budget() {
        let mut machine = AuthenticationStateMachine::from_config(&fast_config());
        let mut page = LoginPage {
            form_present: false,
            url: "https://sso.redhat.com/auth/login".into(),
            ..LoginPage::default()
        };
        let outcome = machine
            .login(&mut page, &Credentials::new("user@example.com", "hunter2"), 3)
            .await;
        assert!(matches!(outcome, LoginOutcome::Retryable(_)));
        assert_eq!(machine.state(), AuthState::Failed);
        assert_eq!(page.goto_count, 3);
        assert_eq!(page.reload_count, 2);
    }

    #[tokio::test]
    async fn diagnostic_screenshot_lands_in_the_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.observability.capture_screenshots = true;
        config.observability.screenshot_dir = dir.path().display().to_string();
        let mut machine = AuthenticationStateMachine::from_config(&config);
        let mut page = LoginPage {
            form_present: false,
            url: "https://sso.redhat.com/auth/login".into(),
            screenshot_bytes: vec![0x89, 0x50, 0x4e, 0x47],
            ..LoginPage::default()
        };
        let outcome = machine
            .login(&mut page, &Credentials::new("user@example.com", "hunter2"), 1)
            .await;
        assert!(matches!(outcome, LoginOutcome::Retryable(_)));
        let shots: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(shots.len(), 1);
    }
}
