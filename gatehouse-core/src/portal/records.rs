use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder values substituted when an optional field's selector chain
/// resolves to nothing. Only a missing title or url drops a record.
pub const UNKNOWN_TITLE: &str = "unknown title";
pub const NO_SUMMARY: &str = "no summary";
pub const UNKNOWN_TYPE: &str = "unknown type";
pub const UNKNOWN_DATE: &str = "unknown date";
pub const NO_CONTENT: &str = "no content extracted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultRecord {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub doc_type: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub title: String,
    pub content: String,
    pub url: String,
    pub metadata: BTreeMap<String, String>,
}

/// Shape of the deprecated advisory feed, kept so callers keep decoding the
/// same structure they always did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub title: String,
    pub url: String,
    pub severity: String,
    pub published_date: String,
    pub summary: String,
}

/// What every orchestrated operation hands back: a structured success or a
/// structured failure, never a propagated panic or error.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OperationOutput {
    Search(Vec<SearchResultRecord>),
    Document(DocumentRecord),
    Alerts(Vec<AlertRecord>),
    Failure { error: String },
}

impl OperationOutput {
    pub fn failure(error: impl Into<String>) -> Self {
        OperationOutput::Failure {
            error: error.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, OperationOutput::Failure { .. })
    }
}

/// Raw per-container values as the in-page script found them. `None` means
/// the field's whole chain came up empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHitPayload {
    pub title: Option<String>,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub doc_type: Option<String>,
    pub last_updated: Option<String>,
}

impl SearchHitPayload {
    /// Builds a record, sentinel-defaulting the optional fields. Returns
    /// `None` when the identifying pair (title + url) did not resolve.
    pub fn into_record(self) -> Option<SearchResultRecord> {
        let title = non_empty(self.title)?;
        let url = non_empty(self.url)?;
        Some(SearchResultRecord {
            title,
            url,
            summary: non_empty(self.summary).unwrap_or_else(|| NO_SUMMARY.into()),
            doc_type: non_empty(self.doc_type).unwrap_or_else(|| UNKNOWN_TYPE.into()),
            last_updated: non_empty(self.last_updated).unwrap_or_else(|| UNKNOWN_DATE.into()),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataPairPayload {
    pub label: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPayload {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataPairPayload>,
}

impl DocumentPayload {
    pub fn into_record(self, url: &str) -> DocumentRecord {
        let mut metadata = BTreeMap::new();
        for pair in self.metadata {
            let label = non_empty(pair.label)
                .map(|label| label.trim_end_matches(':').trim().to_string())
                .filter(|label| !label.is_empty());
            let value = non_empty(pair.value);
            if let (Some(label), Some(value)) = (label, value) {
                // Later pairs win on duplicate labels.
                metadata.insert(label, value);
            }
        }
        DocumentRecord {
            title: non_empty(self.title).unwrap_or_else(|| UNKNOWN_TITLE.into()),
            content: non_empty(self.content).unwrap_or_else(|| NO_CONTENT.into()),
            url: url.to_string(),
            metadata,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_populated_payload_round_trips_verbatim() {
        let payload = SearchHitPayload {
            title: Some("Fixing memory leaks in slab allocation".into()),
            url: Some("https://portal.example/solutions/4242".into()),
            summary: Some("A kworker thread leaks slab pages under load.".into()),
            doc_type: Some("Solution".into()),
            last_updated: Some("2024-11-02".into()),
        };
        let record = payload.clone().into_record().unwrap();
        assert_eq!(record.title, "Fixing memory leaks in slab allocation");
        assert_eq!(record.url, "https://portal.example/solutions/4242");
        assert_eq!(
            record.summary,
            "A kworker thread leaks slab pages under load."
        );
        assert_eq!(record.doc_type, "Solution");
        assert_eq!(record.last_updated, "2024-11-02");
    }

    #[test]
    fn optional_fields_fall_back_to_sentinels() {
        let record = SearchHitPayload {
            title: Some("A title".into()),
            url: Some("https://portal.example/x".into()),
            ..SearchHitPayload::default()
        }
        .into_record()
        .unwrap();
        assert_eq!(record.summary, NO_SUMMARY);
        assert_eq!(record.doc_type, UNKNOWN_TYPE);
        assert_eq!(record.last_updated, UNKNOWN_DATE);
    }

    #[test]
    fn missing_title_or_url_drops_the_record() {
        let no_title = SearchHitPayload {
            url: Some("https://portal.example/x".into()),
            summary: Some("text".into()),
            ..SearchHitPayload::default()
        };
        assert!(no_title.into_record().is_none());

        let blank_url = SearchHitPayload {
            title: Some("A title".into()),
            url: Some("   ".into()),
            ..SearchHitPayload::default()
        };
        assert!(blank_url.into_record().is_none());
    }

    #[test]
    fn duplicate_metadata_labels_keep_the_later_value() {
        let payload = DocumentPayload {
            title: Some("KCS-1001".into()),
            content: Some("body".into()),
            metadata: vec![
                MetadataPairPayload {
                    label: Some("Environment:".into()),
                    value: Some("RHEL 8".into()),
                },
                MetadataPairPayload {
                    label: Some("Environment".into()),
                    value: Some("RHEL 9".into()),
                },
                MetadataPairPayload {
                    label: Some("".into()),
                    value: Some("orphan".into()),
                },
            ],
        };
        let record = payload.into_record("https://portal.example/solutions/1001");
        assert_eq!(record.metadata.len(), 1);
        assert_eq!(record.metadata["Environment"], "RHEL 9");
    }

    #[test]
    fn document_sentinels_apply_when_fields_are_missing() {
        let record = DocumentPayload::default().into_record("https://portal.example/d");
        assert_eq!(record.title, UNKNOWN_TITLE);
        assert_eq!(record.content, NO_CONTENT);
        assert_eq!(record.url, "https://portal.example/d");
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn failure_output_serializes_as_an_error_object() {
        let output = OperationOutput::failure("login failed");
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["error"], "login failed");
    }
}
