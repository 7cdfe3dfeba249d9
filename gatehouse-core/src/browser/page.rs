use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::TimeoutsSection;

use super::error::{BrowserError, BrowserResult};
use super::selectors::{Selector, SelectorChain, SelectorKind};
use super::session::{BrowserLauncher, BrowserSession};

/// Cookie seeded into the browser before first navigation, typically a
/// consent-manager opt-out that prevents the banner from rendering at all.
#[derive(Debug, Clone)]
pub struct ConsentCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Every page capability the login and extraction machinery needs, behind
/// one seam so a single retry policy can be exercised against scripted
/// doubles. The live implementation drives a chromiumoxide [`Page`].
#[async_trait(?Send)]
pub trait PortalPage {
    async fn goto(&mut self, url: &str) -> BrowserResult<()>;
    async fn reload(&mut self) -> BrowserResult<()>;
    async fn current_url(&mut self) -> BrowserResult<String>;
    /// Waits until the DOM is interactive and a body element exists.
    async fn wait_for_body(&mut self, timeout: Duration) -> BrowserResult<()>;
    /// Walks the chain in priority order; `timeout` is the per-candidate
    /// budget. `None` means no candidate matched, which is not an error.
    async fn first_match(
        &mut self,
        chain: &SelectorChain,
        timeout: Duration,
    ) -> BrowserResult<Option<Selector>>;
    /// Clears and fills the first matching form field. `false` when the
    /// chain resolves nothing.
    async fn fill(
        &mut self,
        chain: &SelectorChain,
        value: &str,
        timeout: Duration,
    ) -> BrowserResult<bool>;
    /// Clicks the first matching element, `false` when nothing matched.
    async fn click(&mut self, chain: &SelectorChain, timeout: Duration) -> BrowserResult<bool>;
    /// Resolves a container, then clicks the first button candidate found
    /// inside it. One DOM round-trip; candidate order is preserved.
    async fn click_within(
        &mut self,
        containers: &SelectorChain,
        buttons: &SelectorChain,
    ) -> BrowserResult<bool>;
    /// Clicks the first control whose visible label contains one of the
    /// given words, in word order.
    async fn click_text(&mut self, labels: &[String]) -> BrowserResult<bool>;
    async fn body_text(&mut self) -> BrowserResult<String>;
    /// Runs a script expected to produce a JSON-serializable value.
    async fn evaluate_json(&mut self, script: &str) -> BrowserResult<Value>;
    async fn screenshot(&mut self) -> BrowserResult<Vec<u8>>;
    async fn seed_cookies(&mut self, cookies: &[ConsentCookie]) -> BrowserResult<()>;
}

/// A [`PortalPage`] that owns its browser resources and can release them.
#[async_trait(?Send)]
pub trait PortalSession: PortalPage {
    async fn close(self: Box<Self>) -> BrowserResult<()>;
}

#[async_trait(?Send)]
pub trait PortalSessionFactory {
    async fn create(&self) -> BrowserResult<Box<dyn PortalSession>>;
}

/// Live session over one launched Chromium.
pub struct LiveSession {
    session: BrowserSession,
    timeouts: TimeoutsSection,
}

impl LiveSession {
    pub fn new(session: BrowserSession, timeouts: TimeoutsSection) -> Self {
        Self { session, timeouts }
    }

    fn page(&self) -> &Page {
        self.session.page()
    }
}

#[async_trait(?Send)]
impl PortalPage for LiveSession {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page().goto(params).await?;
        self.page().wait_for_navigation().await?;
        Ok(())
    }

    async fn reload(&mut self) -> BrowserResult<()> {
        self.page().evaluate("window.location.reload()").await?;
        self.page().wait_for_navigation().await?;
        Ok(())
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        Ok(self.page().url().await?.unwrap_or_default())
    }

    async fn wait_for_body(&mut self, timeout: Duration) -> BrowserResult<()> {
        let script = "(() => !!document.body && document.readyState !== 'loading')()";
        if wait_probe(self.page(), script, timeout, self.timeouts.poll()).await {
            Ok(())
        } else {
            Err(BrowserError::Timeout("page readiness".into()))
        }
    }

    async fn first_match(
        &mut self,
        chain: &SelectorChain,
        timeout: Duration,
    ) -> BrowserResult<Option<Selector>> {
        let page = self.page().clone();
        let poll = self.timeouts.poll();
        let matched = chain
            .resolve_with(|candidate| {
                let page = page.clone();
                let script = presence_script(candidate);
                async move { wait_probe(&page, &script, timeout, poll).await }
            })
            .await;
        if let Some(candidate) = matched {
            trace!(candidate = %candidate, "selector chain resolved");
        }
        Ok(matched.cloned())
    }

    async fn fill(
        &mut self,
        chain: &SelectorChain,
        value: &str,
        timeout: Duration,
    ) -> BrowserResult<bool> {
        let Some(candidate) = self.first_match(chain, timeout).await? else {
            return Ok(false);
        };
        match candidate.kind {
            SelectorKind::Css => {
                let element = self.page().find_element(candidate.value.clone()).await?;
                element.click().await?;
                // Clear any prefilled value before typing real keystrokes.
                let clear = format!(
                    "(() => {{ const el = document.querySelector({}); if (el) el.value = ''; }})()",
                    js_string(&candidate.value)
                );
                self.page().evaluate(clear.as_str()).await?;
                element.type_str(value).await?;
            }
            SelectorKind::Text | SelectorKind::XPath => {
                let xpath = candidate.as_xpath().unwrap_or_default();
                let script = format!(
                    r#"(() => {{
    const node = document.evaluate({xpath}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    if (!node) return false;
    node.value = {value};
    node.dispatchEvent(new Event('input', {{ bubbles: true }}));
    node.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#,
                    xpath = js_string(&xpath),
                    value = js_string(value),
                );
                return eval_bool(self.page(), &script).await;
            }
        }
        Ok(true)
    }

    async fn click(&mut self, chain: &SelectorChain, timeout: Duration) -> BrowserResult<bool> {
        let Some(candidate) = self.first_match(chain, timeout).await? else {
            return Ok(false);
        };
        // Scripted click on purpose: overlays routinely intercept trusted
        // clicks on this portal.
        eval_bool(self.page(), &click_script(&candidate)).await
    }

    async fn click_within(
        &mut self,
        containers: &SelectorChain,
        buttons: &SelectorChain,
    ) -> BrowserResult<bool> {
        let script = scoped_click_script(containers, buttons);
        eval_bool(self.page(), &script).await
    }

    async fn click_text(&mut self, labels: &[String]) -> BrowserResult<bool> {
        for label in labels {
            let candidate = Selector::text(label.clone());
            if eval_bool(self.page(), &click_script(&candidate)).await? {
                debug!(label = %label, "clicked control by visible text");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn body_text(&mut self) -> BrowserResult<String> {
        let value = self
            .page()
            .evaluate("(() => document.body ? document.body.innerText : '')()")
            .await?
            .into_value::<String>()
            .map_err(|err| BrowserError::Unexpected(format!("failed to read body text: {err}")))?;
        Ok(value)
    }

    async fn evaluate_json(&mut self, script: &str) -> BrowserResult<Value> {
        self.page()
            .evaluate(script)
            .await?
            .into_value::<Value>()
            .map_err(|err| BrowserError::Extraction(format!("failed to decode payload: {err}")))
    }

    async fn screenshot(&mut self) -> BrowserResult<Vec<u8>> {
        let params = ScreenshotParams::builder().build();
        Ok(self.page().screenshot(params).await?)
    }

    async fn seed_cookies(&mut self, cookies: &[ConsentCookie]) -> BrowserResult<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let param = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone())
                .path("/")
                .build()
                .map_err(BrowserError::Configuration)?;
            params.push(param);
        }
        self.page().set_cookies(params).await?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl PortalSession for LiveSession {
    async fn close(self: Box<Self>) -> BrowserResult<()> {
        self.session.shutdown().await
    }
}

/// Factory used by the orchestrator in production; tests substitute their
/// own factory producing scripted sessions.
pub struct LiveSessionFactory {
    launcher: BrowserLauncher,
    timeouts: TimeoutsSection,
}

impl LiveSessionFactory {
    pub fn new(launcher: BrowserLauncher, timeouts: TimeoutsSection) -> Self {
        Self { launcher, timeouts }
    }
}

#[async_trait(?Send)]
impl PortalSessionFactory for LiveSessionFactory {
    async fn create(&self) -> BrowserResult<Box<dyn PortalSession>> {
        let session = self.launcher.launch().await?;
        Ok(Box::new(LiveSession::new(session, self.timeouts.clone())))
    }
}

/// Escapes a string into a double-quoted JS literal.
pub(crate) fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn presence_script(candidate: &Selector) -> String {
    match candidate.kind {
        SelectorKind::Css => format!(
            r#"(() => {{
    const el = document.querySelector({sel});
    if (!el) return false;
    const rect = el.getBoundingClientRect();
    return !!(rect.width || rect.height);
}})()"#,
            sel = js_string(&candidate.value)
        ),
        SelectorKind::Text | SelectorKind::XPath => {
            let xpath = candidate.as_xpath().unwrap_or_default();
            format!(
                r#"(() => {{
    const node = document.evaluate({xpath}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    if (!node) return false;
    const rect = node.getBoundingClientRect ? node.getBoundingClientRect() : null;
    return rect ? !!(rect.width || rect.height) : true;
}})()"#,
                xpath = js_string(&xpath)
            )
        }
    }
}

fn click_script(candidate: &Selector) -> String {
    match candidate.kind {
        SelectorKind::Css => format!(
            r#"(() => {{
    const el = document.querySelector({sel});
    if (!el) return false;
    el.click();
    return true;
}})()"#,
            sel = js_string(&candidate.value)
        ),
        SelectorKind::Text | SelectorKind::XPath => {
            let xpath = candidate.as_xpath().unwrap_or_default();
            format!(
                r#"(() => {{
    const node = document.evaluate({xpath}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    if (!node) return false;
    node.click();
    return true;
}})()"#,
                xpath = js_string(&xpath)
            )
        }
    }
}

fn scoped_click_script(containers: &SelectorChain, buttons: &SelectorChain) -> String {
    let encode = |chain: &SelectorChain, scoped: bool| -> String {
        let entries = chain
            .candidates()
            .iter()
            .map(|candidate| match candidate.kind {
                SelectorKind::Css => {
                    format!("{{k:'css',v:{}}}", js_string(&candidate.value))
                }
                SelectorKind::Text | SelectorKind::XPath => {
                    let mut xpath = candidate.as_xpath().unwrap_or_default();
                    if scoped && xpath.starts_with("//") {
                        xpath.insert(0, '.');
                    }
                    format!("{{k:'xpath',v:{}}}", js_string(&xpath))
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        format!("[{entries}]")
    };
    format!(
        r#"(() => {{
    const containers = {containers};
    const buttons = {buttons};
    const find = (scope, c) => {{
        try {{
            if (c.k === 'css') return scope.querySelector(c.v);
            return document.evaluate(c.v, scope, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
        }} catch (_) {{
            return null;
        }}
    }};
    for (const c of containers) {{
        const box = find(document, c);
        if (!box) continue;
        for (const b of buttons) {{
            const btn = find(box, b);
            if (btn) {{
                btn.click();
                return true;
            }}
        }}
    }}
    return false;
}})()"#,
        containers = encode(containers, false),
        buttons = encode(buttons, true),
    )
}

async fn eval_bool(page: &Page, script: &str) -> BrowserResult<bool> {
    match page.evaluate(script).await {
        Ok(result) => Ok(result.into_value::<bool>().unwrap_or(false)),
        Err(err) => {
            // Probes race page transitions; a failed evaluation means the
            // element was not reachable, not that the operation is dead.
            debug!(error = %err, "probe evaluation failed");
            Ok(false)
        }
    }
}

async fn wait_probe(page: &Page, script: &str, budget: Duration, poll: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if matches!(eval_bool(page, script).await, Ok(true)) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}
