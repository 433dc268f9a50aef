//! JQL construction for the Mantis → Jira lookup.

use serde::Serialize;

/// Fields requested from the search endpoint.
pub const SEARCH_FIELDS: [&str; 3] = ["key", "status", "summary"];

pub const DEFAULT_PROJECT: &str = "AVX";
pub const DEFAULT_LINK_FIELD: &str = "Mantis[URL]";
pub const DEFAULT_LINK_BASE: &str = "https://mantis.aviatrix.com/mantisbt/view.php?id=";

/// Fixed query shape: issues in one project whose external-link field points at the Mantis
/// ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    project: String,
    link_field: String,
    link_base: String,
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT, DEFAULT_LINK_FIELD, DEFAULT_LINK_BASE)
    }
}

impl QueryTemplate {
    pub fn new(
        project: impl Into<String>,
        link_field: impl Into<String>,
        link_base: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            link_field: link_field.into(),
            link_base: link_base.into(),
        }
    }

    /// URL of the Mantis ticket, as stored in the Jira link field.
    pub fn link_for(&self, identifier: &str) -> String {
        format!("{}{}", self.link_base, identifier)
    }

    /// Builds the search for `identifier`. The identifier is escaped for a single-quoted JQL
    /// string, so quotes or backslashes in user input cannot end the literal early.
    ///
    /// ```
    /// use mantis_core::QueryTemplate;
    ///
    /// let query = QueryTemplate::default().build("12477");
    /// assert_eq!(
    ///     query.jql(),
    ///     "project = AVX AND Mantis[URL] = 'https://mantis.aviatrix.com/mantisbt/view.php?id=12477'"
    /// );
    /// ```
    pub fn build(&self, identifier: &str) -> SearchQuery {
        let jql = format!(
            "project = {} AND {} = '{}'",
            self.project,
            self.link_field,
            escape_jql(&self.link_for(identifier))
        );
        SearchQuery {
            identifier: identifier.to_string(),
            jql,
            fields: SEARCH_FIELDS,
        }
    }
}

/// Request body for `POST /rest/api/2/search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    #[serde(skip)]
    identifier: String,
    jql: String,
    fields: [&'static str; 3],
}

impl SearchQuery {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn jql(&self) -> &str {
        &self.jql
    }
}

/// Escapes a value for use inside a quoted JQL string literal.
pub fn escape_jql(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}
