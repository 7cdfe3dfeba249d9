use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::browser::{
    js_string, BrowserError, BrowserResult, ConsentBannerHandler, PortalPage, Selector,
    SelectorChain, SelectorKind,
};
use crate::config::{PortalConfig, TimeoutsSection};

use super::records::{DocumentPayload, DocumentRecord, SearchHitPayload, SearchResultRecord};

/// Error text surfaced when a document page never renders its content.
pub const DOCUMENT_LOAD_ERROR: &str = "could not load document content";

/// Maps rendered result pages to structured records. Field values are read
/// through one generated script per page so a sweep is a single DOM
/// round-trip; each field walks its selector chain in priority order inside
/// the page.
pub struct ExtractionPipeline {
    search_content_ready: SelectorChain,
    search_containers: Vec<String>,
    search_no_results: SelectorChain,
    title_link: Vec<String>,
    summary: Vec<String>,
    doc_type: Vec<String>,
    last_updated: Vec<String>,
    document_content_ready: SelectorChain,
    document_title: Vec<String>,
    document_content: Vec<String>,
    metadata_group: Vec<String>,
    metadata_label: Vec<String>,
    metadata_value: Vec<String>,
    timeouts: TimeoutsSection,
    consent: ConsentBannerHandler,
}

#[derive(Debug, Deserialize)]
struct SearchSweep {
    containers: usize,
    hits: Vec<Value>,
}

impl ExtractionPipeline {
    pub fn from_config(config: &PortalConfig) -> Self {
        let search = &config.selectors.search;
        let document = &config.selectors.document;
        Self {
            search_content_ready: SelectorChain::from_specs(&search.content_ready),
            search_containers: css_candidates(&SelectorChain::from_specs(&search.containers)),
            search_no_results: SelectorChain::from_specs(&search.no_results),
            title_link: css_candidates(&SelectorChain::from_specs(&search.title_link)),
            summary: css_candidates(&SelectorChain::from_specs(&search.summary)),
            doc_type: css_candidates(&SelectorChain::from_specs(&search.doc_type)),
            last_updated: css_candidates(&SelectorChain::from_specs(&search.last_updated)),
            document_content_ready: SelectorChain::from_specs(&document.content_ready),
            document_title: css_candidates(&SelectorChain::from_specs(&document.title)),
            document_content: css_candidates(&SelectorChain::from_specs(&document.content)),
            metadata_group: css_candidates(&SelectorChain::from_specs(&document.metadata_group)),
            metadata_label: css_candidates(&SelectorChain::from_specs(&document.metadata_label)),
            metadata_value: css_candidates(&SelectorChain::from_specs(&document.metadata_value)),
            timeouts: config.timeouts.clone(),
            consent: ConsentBannerHandler::from_config(config),
        }
    }

    /// Navigates to a results page and sweeps it into records. An empty
    /// sweep with no explicit no-results marker gets up to `max_retries`
    /// reload attempts before the pipeline concludes "no results".
    pub async fn search<P: PortalPage + ?Sized>(
        &self,
        page: &mut P,
        url: &str,
        max_retries: usize,
    ) -> BrowserResult<Vec<SearchResultRecord>> {
        page.goto(url).await?;
        self.consent.dismiss(page).await;

        if !self
            .wait_for_chain(page, &self.search_content_ready, self.timeouts.required())
            .await
        {
            // Not fatal: some layouts render results without any of the
            // known ready markers. The sweep below still gets one shot.
            debug!("no content-ready signal before timeout");
        }

        let script = self.search_script();
        let mut attempt = 0usize;
        loop {
            let sweep = self.sweep(page, &script).await?;
            if sweep.containers > 0 {
                let records = map_hits(sweep.hits);
                info!(count = records.len(), "search extraction finished");
                return Ok(records);
            }

            if let Some(marker) = page
                .first_match(&self.search_no_results, self.timeouts.speculative())
                .await?
            {
                debug!(marker = %marker, "portal reports no results");
                return Ok(Vec::new());
            }

            if attempt >= max_retries {
                debug!("no containers after retries, returning empty result");
                return Ok(Vec::new());
            }
            attempt += 1;
            // Lazy-rendered layouts sometimes need a second load.
            warn!(attempt, "empty sweep without no-results marker, reloading");
            page.reload().await?;
            self.consent.dismiss(page).await;
            self.wait_for_chain(page, &self.search_content_ready, self.timeouts.required())
                .await;
        }
    }

    /// Fetches one document page into a record. A page that never reaches
    /// its content signal yields [`DOCUMENT_LOAD_ERROR`].
    pub async fn document<P: PortalPage + ?Sized>(
        &self,
        page: &mut P,
        url: &str,
    ) -> BrowserResult<DocumentRecord> {
        page.goto(url).await?;
        self.consent.dismiss(page).await;

        if !self
            .wait_for_chain(page, &self.document_content_ready, self.timeouts.required())
            .await
        {
            return Err(BrowserError::Extraction(DOCUMENT_LOAD_ERROR.into()));
        }

        let value = page.evaluate_json(&self.document_script()).await?;
        let payload: DocumentPayload = serde_json::from_value(value).map_err(|err| {
            BrowserError::Extraction(format!("failed to decode document payload: {err}"))
        })?;
        Ok(payload.into_record(url))
    }

    async fn sweep<P: PortalPage + ?Sized>(
        &self,
        page: &mut P,
        script: &str,
    ) -> BrowserResult<SearchSweep> {
        let value = page.evaluate_json(script).await?;
        serde_json::from_value(value).map_err(|err| {
            BrowserError::Extraction(format!("failed to decode search payload: {err}"))
        })
    }

    async fn wait_for_chain<P: PortalPage + ?Sized>(
        &self,
        page: &mut P,
        chain: &SelectorChain,
        budget: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            match page.first_match(chain, self.timeouts.probe()).await {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(err) => debug!(error = %err, "content probe failed"),
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.timeouts.poll()).await;
        }
    }

    fn search_script(&self) -> String {
        format!(
            r#"(() => {{
    const pick = (scope, sels) => {{
        for (const s of sels) {{
            const el = scope.querySelector(s);
            if (el) return el;
        }}
        return null;
    }};
    const txt = (el) => el ? (el.textContent || '').trim() : null;
    let containers = [];
    for (const s of {containers}) {{
        const found = Array.from(document.querySelectorAll(s));
        if (found.length) {{ containers = found; break; }}
    }}
    const hits = containers.map(item => {{
        const link = pick(item, {title_link});
        return {{
            title: txt(link),
            url: link && link.href ? link.href : null,
            summary: txt(pick(item, {summary})),
            doc_type: txt(pick(item, {doc_type})),
            last_updated: txt(pick(item, {last_updated})),
        }};
    }});
    return {{ containers: containers.length, hits }};
}})()"#,
            containers = js_array(&self.search_containers),
            title_link = js_array(&self.title_link),
            summary = js_array(&self.summary),
            doc_type = js_array(&self.doc_type),
            last_updated = js_array(&self.last_updated),
        )
    }

    fn document_script(&self) -> String {
        // Metadata groups across all supported layouts are collected at
        // once; later duplicate labels overwrite earlier ones downstream.
        let groups_joined = self.metadata_group.join(", ");
        format!(
            r#"(() => {{
    const pick = (scope, sels) => {{
        for (const s of sels) {{
            const el = scope.querySelector(s);
            if (el) return el;
        }}
        return null;
    }};
    const txt = (el) => el ? (el.textContent || '').trim() : null;
    const groups = Array.from(document.querySelectorAll({groups}));
    const metadata = groups.map(group => ({{
        label: txt(pick(group, {labels})),
        value: txt(pick(group, {values})),
    }}));
    return {{
        title: txt(pick(document, {title})),
        content: txt(pick(document, {content})),
        metadata,
    }};
}})()"#,
            groups = js_string(&groups_joined),
            labels = js_array(&self.metadata_label),
            values = js_array(&self.metadata_value),
            title = js_array(&self.document_title),
            content = js_array(&self.document_content),
        )
    }
}

/// Extraction scripts run querySelector, so only CSS candidates can
/// participate; other kinds in a field chain are skipped.
fn css_candidates(chain: &SelectorChain) -> Vec<String> {
    chain
        .candidates()
        .iter()
        .filter(|candidate| candidate.kind == SelectorKind::Css)
        .map(|candidate: &Selector| candidate.value.clone())
        .collect()
}

fn js_array(values: &[String]) -> String {
    let entries = values
        .iter()
        .map(|value| js_string(value))
        .collect::<Vec<_>>()
        .join(",");
    format!("[{entries}]")
}

/// One malformed hit never aborts the batch: it is logged and skipped, and
/// records missing their identifying pair are dropped the same way.
fn map_hits(hits: Vec<Value>) -> Vec<SearchResultRecord> {
    let mut records = Vec::with_capacity(hits.len());
    for (index, hit) in hits.into_iter().enumerate() {
        let payload: SearchHitPayload = match serde_json::from_value(hit) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(index, error = %err, "skipping malformed search hit");
                continue;
            }
        };
        match payload.into_record() {
            Some(record) => records.push(record),
            None => warn!(index, "skipping hit without title and url"),
        }
    }
    records
}
