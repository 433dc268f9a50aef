//! Jira issues as returned by the search endpoint.

use serde::{Deserialize, Serialize};

/// The matched issue, reduced to the fields the reply needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub summary: String,
    pub status: String,
}

impl Issue {
    pub fn new(
        key: impl Into<String>,
        summary: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            summary: summary.into(),
            status: status.into(),
        }
    }

    /// The key is percent-encoded so the result stays a single path segment.
    pub fn browse_url(&self, browse_base: &str) -> String {
        format!(
            "{}/{}",
            browse_base.trim_end_matches('/'),
            urlencoding::encode(&self.key)
        )
    }
}

/// Top-level search response: `{ "issues": [ { "key", "fields": { "summary", "status": { "name" } } } ] }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<RawIssue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawIssue {
    pub key: String,
    #[serde(default)]
    pub fields: RawFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub status: Option<RawStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStatus {
    #[serde(default)]
    pub name: String,
}

impl SearchResponse {
    /// First candidate wins; the tracker's own ordering is not second-guessed.
    pub fn first_match(self) -> Option<Issue> {
        self.issues.into_iter().next().map(|raw| Issue {
            key: raw.key,
            summary: raw.fields.summary.unwrap_or_default(),
            status: raw.fields.status.map(|s| s.name).unwrap_or_default(),
        })
    }
}
