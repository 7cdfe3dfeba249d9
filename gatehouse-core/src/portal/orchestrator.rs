use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::{
    BrowserError, BrowserLauncher, ConsentBannerHandler, LiveSessionFactory, PortalSession,
    PortalSessionFactory,
};
use crate::config::PortalConfig;

use super::auth::{AuthenticationStateMachine, Credentials, LoginOutcome};
use super::extract::ExtractionPipeline;
use super::query::SearchQuery;
use super::records::OperationOutput;

/// An empty sweep is retried with a reload at most once before the
/// pipeline concludes "no results".
const EMPTY_SWEEP_RETRIES: usize = 1;

#[derive(Debug, Clone)]
pub enum Operation {
    Search(SearchQuery),
    GetDocument { url: String },
    /// Deprecated: kept for callers that still issue it; always yields an
    /// empty list.
    GetAlerts { product: String },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Search(_) => "search",
            Operation::GetDocument { .. } => "get_document",
            Operation::GetAlerts { .. } => "get_alerts",
        }
    }
}

/// Composes the whole flow for one operation: acquire a browser session,
/// pre-seed consent, dismiss any banner, authenticate, run the requested
/// extraction, and release the session no matter what happened along the
/// way. Nothing thrown below this point reaches the caller; every path
/// collapses into an [`OperationOutput`].
pub struct SessionOrchestrator {
    config: Arc<PortalConfig>,
    factory: Box<dyn PortalSessionFactory>,
    consent: ConsentBannerHandler,
    pipeline: ExtractionPipeline,
}

impl SessionOrchestrator {
    pub fn new(config: PortalConfig) -> Self {
        let config = Arc::new(config);
        let launcher = BrowserLauncher::new(Arc::clone(&config));
        let factory = Box::new(LiveSessionFactory::new(launcher, config.timeouts.clone()));
        Self::with_factory(config, factory)
    }

    /// Orchestrator over a custom session source. Production uses the live
    /// Chromium factory; tests substitute scripted sessions.
    pub fn with_factory(
        config: Arc<PortalConfig>,
        factory: Box<dyn PortalSessionFactory>,
    ) -> Self {
        let consent = ConsentBannerHandler::from_config(&config);
        let pipeline = ExtractionPipeline::from_config(&config);
        Self {
            config,
            factory,
            consent,
            pipeline,
        }
    }

    pub async fn run(&self, credentials: &Credentials, operation: Operation) -> OperationOutput {
        let operation_id = Uuid::new_v4();
        info!(id = %operation_id, kind = operation.kind(), "starting portal operation");

        let mut session = match self.factory.create().await {
            Ok(session) => session,
            Err(err) => {
                warn!(id = %operation_id, error = %err, "browser session acquisition failed");
                return OperationOutput::failure(format!(
                    "browser session acquisition failed: {err}"
                ));
            }
        };

        let output = self
            .execute(session.as_mut(), credentials, &operation)
            .await;

        // The caller already has its real result; a teardown failure is
        // logged and swallowed.
        if let Err(err) = session.close().await {
            warn!(id = %operation_id, error = %err, "session teardown failed");
        }

        info!(
            id = %operation_id,
            kind = operation.kind(),
            failed = output.is_failure(),
            "portal operation finished"
        );
        output
    }

    async fn execute(
        &self,
        page: &mut dyn PortalSession,
        credentials: &Credentials,
        operation: &Operation,
    ) -> OperationOutput {
        self.consent.preseed(page).await;
        self.consent.dismiss(page).await;

        let mut auth = AuthenticationStateMachine::from_config(&self.config);
        match auth
            .login(page, credentials, self.config.retry.max_attempts)
            .await
        {
            LoginOutcome::Success => {}
            LoginOutcome::Fatal(reason) | LoginOutcome::Retryable(reason) => {
                return OperationOutput::failure(format!("login failed: {reason}"));
            }
        }

        match operation {
            Operation::Search(query) => {
                let url = match query.to_url(&self.config.portal.search_url) {
                    Ok(url) => url,
                    Err(err) => {
                        return OperationOutput::failure(format!(
                            "could not build search url: {err}"
                        ))
                    }
                };
                match self.pipeline.search(page, &url, EMPTY_SWEEP_RETRIES).await {
                    Ok(records) => OperationOutput::Search(records),
                    Err(err) => OperationOutput::failure(format!("search failed: {err}")),
                }
            }
            Operation::GetDocument { url } => match self.pipeline.document(page, url).await {
                Ok(record) => OperationOutput::Document(record),
                // Extraction errors carry caller-facing messages already.
                Err(BrowserError::Extraction(message)) => OperationOutput::failure(message),
                Err(err) => {
                    OperationOutput::failure(format!("document retrieval failed: {err}"))
                }
            },
            Operation::GetAlerts { product } => {
                // Deprecated upstream; the empty contract is preserved
                // as-is pending product clarification.
                warn!(product = %product, "alerts operation is deprecated and returns no records");
                OperationOutput::Alerts(Vec::new())
            }
        }
    }
}
