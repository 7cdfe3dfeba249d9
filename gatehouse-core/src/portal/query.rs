use serde::Deserialize;
use url::Url;

use crate::browser::{BrowserError, BrowserResult};

/// The portal caps result pages at 100 rows; anything above is clamped.
pub const MAX_ROWS: u32 = 100;
pub const DEFAULT_ROWS: u32 = 20;
pub const DEFAULT_SORT: &str = "relevant";

/// Sort orders the portal's results endpoint understands.
pub const SORT_KEYS: &[&str] = &[
    "relevant",
    "lastModifiedDate desc",
    "lastModifiedDate asc",
    "portal_publication_date desc",
    "portal_publication_date asc",
];

/// One search request against the portal's results page. The URL contract
/// is stable even though the rendered markup is not: `q` plus repeated `p`
/// (product) and `documentKind` filters, pagination and a sort key.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub doc_types: Vec<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_rows")]
    pub rows: u32,
    #[serde(default = "default_sort")]
    pub sort: String,
}

fn default_page() -> u32 {
    1
}

fn default_rows() -> u32 {
    DEFAULT_ROWS
}

fn default_sort() -> String {
    DEFAULT_SORT.to_string()
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            products: Vec::new(),
            doc_types: Vec::new(),
            page: default_page(),
            rows: default_rows(),
            sort: default_sort(),
        }
    }

    /// Builds the fully-encoded results URL for this query.
    pub fn to_url(&self, search_base: &str) -> BrowserResult<String> {
        let mut url = Url::parse(search_base).map_err(|err| {
            BrowserError::Configuration(format!("invalid search base url {search_base}: {err}"))
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &self.query);
            for product in &self.products {
                pairs.append_pair("p", product);
            }
            for doc_type in &self.doc_types {
                pairs.append_pair("documentKind", doc_type);
            }
            pairs.append_pair("page", &self.page.max(1).to_string());
            pairs.append_pair("rows", &self.rows.clamp(1, MAX_ROWS).to_string());
            if !self.sort.is_empty() {
                pairs.append_pair("sort", &self.sort);
            }
        }
        Ok(url.into())
    }
}
