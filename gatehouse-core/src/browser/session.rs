use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PortalConfig;

use super::error::{BrowserError, BrowserResult};

/// Launches one Chromium per operation. Every session gets a throwaway
/// user-data directory, so nothing leaks between operations and nothing
/// survives the process.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<PortalConfig>,
}

impl BrowserLauncher {
    pub fn new(config: Arc<PortalConfig>) -> Self {
        Self { config }
    }

    pub async fn launch(&self) -> BrowserResult<BrowserSession> {
        let profile = tempfile::Builder::new()
            .prefix("gatehouse-profile-")
            .tempdir()?;
        let chromium_config = self.build_chromium_config(profile.path())?;
        info!(
            headless = self.config.chromium.headless,
            profile = %profile.path().display(),
            "launching chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        let params = CreateTargetParams::new("about:blank");
        let page = match browser.new_page(params).await {
            Ok(page) => page,
            Err(err) => {
                // The browser is up but the page never came: release the
                // pieces we do hold before surfacing the original error.
                abort_partial(browser, handler_task, profile).await;
                return Err(BrowserError::Cdp(err));
            }
        };

        Ok(BrowserSession {
            browser,
            page,
            handler_task: Some(handler_task),
            profile: Some(profile),
        })
    }

    fn build_chromium_config(&self, profile_dir: &Path) -> BrowserResult<ChromiumConfig> {
        let chromium = &self.config.chromium;
        let [width, height] = chromium.window;
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(profile_dir)
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            })
            .request_timeout(Duration::from_secs(chromium.request_timeout_seconds));

        if let Some(executable) = &chromium.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !chromium.headless {
            builder = builder.with_head();
        }
        if !chromium.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            format!("--window-size={width},{height}"),
            "--disable-dev-shm-usage".to_string(),
            "--disable-extensions".to_string(),
            "--disable-notifications".to_string(),
            "--no-first-run".to_string(),
        ];
        if chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(user_agent) = &chromium.user_agent {
            args.push(format!("--user-agent={user_agent}"));
        }
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

/// The owned resource bundle for one operation: browser process, its event
/// handler task, one page, and the session profile directory. Either all of
/// them are live or all of them have been released; `shutdown` runs exactly
/// once and tolerates individual teardown failures.
#[derive(Debug)]
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    profile: Option<TempDir>,
}

impl BrowserSession {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!("shutting down browser session");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        if let Some(profile) = self.profile.take() {
            if let Err(err) = profile.close() {
                warn!(error = %err, "failed to remove session profile dir");
            }
        }
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.handler_task.is_some() {
            warn!("browser session dropped without explicit shutdown");
        }
    }
}

async fn abort_partial(mut browser: Browser, handler_task: JoinHandle<()>, profile: TempDir) {
    if let Err(err) = browser.close().await {
        warn!(error = %err, "failed to close browser during partial teardown");
    }
    handler_task.abort();
    if let Err(err) = profile.close() {
        warn!(error = %err, "failed to remove profile dir during partial teardown");
    }
}
