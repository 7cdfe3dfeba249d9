use std::time::Duration;

use tracing::{debug, info};

use crate::config::PortalConfig;

use super::page::{ConsentCookie, PortalPage};
use super::selectors::SelectorChain;

/// Detects and dismisses cookie/privacy overlays. Absence of a banner is
/// the common case, so detection budgets stay short, and nothing in here is
/// allowed to fail the caller's flow: every error collapses to "no banner
/// handled".
pub struct ConsentBannerHandler {
    containers: SelectorChain,
    buttons: SelectorChain,
    vocabulary: Vec<String>,
    cookies: Vec<ConsentCookie>,
    probe: Duration,
    settle: Duration,
}

impl ConsentBannerHandler {
    pub fn from_config(config: &PortalConfig) -> Self {
        let cookies = config
            .consent
            .cookies
            .iter()
            .map(|spec| ConsentCookie {
                name: spec.name.clone(),
                value: spec.value.clone(),
                domain: config.portal.cookie_domain.clone(),
            })
            .collect();
        Self {
            containers: SelectorChain::from_specs(&config.consent.containers),
            buttons: SelectorChain::from_specs(&config.consent.buttons),
            vocabulary: config.consent.vocabulary.clone(),
            cookies,
            probe: config.timeouts.speculative(),
            settle: config.timeouts.settle(),
        }
    }

    /// Seeds consent cookies before first navigation so the banner never
    /// renders. Best-effort; a failure here only means the banner will be
    /// handled the slow way.
    pub async fn preseed<P: PortalPage + ?Sized>(&self, page: &mut P) {
        if self.cookies.is_empty() {
            return;
        }
        if let Err(err) = page.seed_cookies(&self.cookies).await {
            debug!(error = %err, "consent cookie pre-seed failed");
        }
    }

    /// Returns `true` when a banner was found and a dismissal click was
    /// issued. Idempotent on bannerless pages.
    pub async fn dismiss<P: PortalPage + ?Sized>(&self, page: &mut P) -> bool {
        let container = match page.first_match(&self.containers, self.probe).await {
            Ok(found) => found,
            Err(err) => {
                debug!(error = %err, "banner detection failed");
                return false;
            }
        };
        let Some(container) = container else {
            debug!("no consent banner present");
            return false;
        };
        info!(container = %container, "consent banner detected");

        if self.swallow(page.click_within(&self.containers, &self.buttons).await) {
            self.settle_down().await;
            return true;
        }
        if self.swallow(page.click_text(&self.vocabulary).await) {
            self.settle_down().await;
            return true;
        }
        // Last resort: scripted click on the button chain without the
        // container scope. A single probe, no waiting.
        if self.swallow(page.click(&self.buttons, Duration::ZERO).await) {
            self.settle_down().await;
            return true;
        }
        debug!("banner present but no dismissal control matched");
        false
    }

    fn swallow(&self, outcome: super::error::BrowserResult<bool>) -> bool {
        match outcome {
            Ok(clicked) => clicked,
            Err(err) => {
                debug!(error = %err, "banner dismissal step failed");
                false
            }
        }
    }

    async fn settle_down(&self) {
        tokio::time::sleep(self.settle).await;
    }
}
