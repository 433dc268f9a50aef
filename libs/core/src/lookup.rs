//! Jira search client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::StatusCode;
use metrics::{counter, histogram};
use reqwest::{Client, Url};
use thiserror::Error;

use crate::issue::{Issue, SearchResponse};
use crate::query::SearchQuery;

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_PATH: &str = "rest/api/2/search";

/// Looks up the issue matching a query. At most one issue is returned.
#[async_trait]
pub trait IssueSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Option<Issue>, LookupError>;
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("jira search configuration error: {0}")]
    Config(String),
    #[error("jira search transport error")]
    Transport(#[source] reqwest::Error),
    #[error("jira search returned status {status}")]
    Status { status: StatusCode, message: String },
    #[error("jira search response decode error")]
    Decode(#[source] serde_json::Error),
}

impl LookupError {
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::Config(_) => "config",
            LookupError::Transport(_) => "transport",
            LookupError::Status { .. } => "status",
            LookupError::Decode(_) => "decode",
        }
    }
}

/// Service-account credentials for basic auth.
#[derive(Clone)]
pub struct JiraCredentials {
    pub user: String,
    pub api_token: String,
}

impl std::fmt::Debug for JiraCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraCredentials")
            .field("user", &self.user)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

pub struct JiraSearchClient {
    client: Client,
    search_url: Url,
    credentials: JiraCredentials,
}

impl JiraSearchClient {
    /// `base_url` is the site root, e.g. `https://example.atlassian.net`.
    pub fn new(
        base_url: &str,
        credentials: JiraCredentials,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LookupError::Config(err.to_string()))?;
        Self::with_client(client, base_url, credentials)
    }

    /// Uses a caller-supplied client; its timeout settings apply unchanged.
    pub fn with_client(
        client: Client,
        base_url: &str,
        credentials: JiraCredentials,
    ) -> Result<Self, LookupError> {
        let mut base = Url::parse(base_url).map_err(|err| LookupError::Config(err.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let search_url = base
            .join(SEARCH_PATH)
            .map_err(|err| LookupError::Config(err.to_string()))?;
        Ok(Self {
            client,
            search_url,
            credentials,
        })
    }

    pub fn search_url(&self) -> &Url {
        &self.search_url
    }
}

#[async_trait]
impl IssueSearch for JiraSearchClient {
    async fn search(&self, query: &SearchQuery) -> Result<Option<Issue>, LookupError> {
        let started = Instant::now();
        let response = self
            .client
            .post(self.search_url.clone())
            .basic_auth(&self.credentials.user, Some(&self.credentials.api_token))
            .header(http::header::ACCEPT, "application/json")
            .json(query)
            .send()
            .await
            .map_err(|err| {
                counter!("issue_lookup_errors_total", "kind" => "transport").increment(1);
                LookupError::Transport(err)
            })?;

        let status = response.status();
        histogram!("issue_lookup_seconds", "status" => status.as_str().to_string())
            .record(started.elapsed().as_secs_f64());

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".into());
            counter!("issue_lookup_errors_total", "kind" => "status").increment(1);
            return Err(LookupError::Status {
                status,
                message: truncate(body, 512),
            });
        }

        let bytes = response.bytes().await.map_err(|err| {
            counter!("issue_lookup_errors_total", "kind" => "transport").increment(1);
            LookupError::Transport(err)
        })?;
        let parsed: SearchResponse = serde_json::from_slice(&bytes).map_err(|err| {
            counter!("issue_lookup_errors_total", "kind" => "decode").increment(1);
            LookupError::Decode(err)
        })?;
        Ok(parsed.first_match())
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryTemplate;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::post,
    };
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

    async fn spawn_tracker(reply: (AxumStatus, String)) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let app = Router::new().route(
            "/rest/api/2/search",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let recorder = recorder.clone();
                let reply = reply.clone();
                async move {
                    recorder.lock().unwrap().push((headers, body));
                    (reply.0, [("content-type", "application/json")], reply.1).into_response()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn credentials() -> JiraCredentials {
        JiraCredentials {
            user: "bot@example.com".into(),
            api_token: "token-123".into(),
        }
    }

    #[test]
    fn search_url_is_joined_under_base_path() {
        let client = JiraSearchClient::new(
            "https://example.atlassian.net/jira",
            credentials(),
            DEFAULT_LOOKUP_TIMEOUT,
        )
        .unwrap();
        assert_eq!(
            client.search_url().as_str(),
            "https://example.atlassian.net/jira/rest/api/2/search"
        );
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let err = JiraSearchClient::new("not a url", credentials(), DEFAULT_LOOKUP_TIMEOUT)
            .err()
            .unwrap();
        assert_eq!(err.kind(), "config");
    }

    #[tokio::test]
    async fn posts_query_with_basic_auth_and_takes_first_issue() {
        let body = json!({
            "issues": [
                {"key": "AVX-500", "fields": {"summary": "Crash on boot", "status": {"name": "Open"}}},
                {"key": "AVX-501", "fields": {"summary": "Second", "status": {"name": "Done"}}}
            ]
        });
        let (base, seen) = spawn_tracker((AxumStatus::OK, body.to_string())).await;
        let client = JiraSearchClient::new(&base, credentials(), DEFAULT_LOOKUP_TIMEOUT).unwrap();

        let query = QueryTemplate::default().build("12477");
        let issue = client.search(&query).await.unwrap();
        assert_eq!(issue, Some(Issue::new("AVX-500", "Crash on boot", "Open")));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (headers, sent) = &seen[0];
        // base64("bot@example.com:token-123")
        assert_eq!(
            headers.get("authorization").unwrap(),
            "Basic Ym90QGV4YW1wbGUuY29tOnRva2VuLTEyMw=="
        );
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(sent, &serde_json::to_value(&query).unwrap());
    }

    #[tokio::test]
    async fn zero_issues_is_not_an_error() {
        let (base, _) = spawn_tracker((AxumStatus::OK, r#"{"issues":[]}"#.into())).await;
        let client = JiraSearchClient::new(&base, credentials(), DEFAULT_LOOKUP_TIMEOUT).unwrap();
        let issue = client
            .search(&QueryTemplate::default().build("99999"))
            .await
            .unwrap();
        assert_eq!(issue, None);
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let (base, _) = spawn_tracker((AxumStatus::OK, "<html>oops</html>".into())).await;
        let client = JiraSearchClient::new(&base, credentials(), DEFAULT_LOOKUP_TIMEOUT).unwrap();
        let err = client
            .search(&QueryTemplate::default().build("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let (base, _) = spawn_tracker((
            AxumStatus::BAD_REQUEST,
            r#"{"errorMessages":["bad jql"]}"#.into(),
        ))
        .await;
        let client = JiraSearchClient::new(&base, credentials(), DEFAULT_LOOKUP_TIMEOUT).unwrap();
        match client.search(&QueryTemplate::default().build("1")).await {
            Err(LookupError::Status { status, message }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(message.contains("bad jql"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_tracker_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = JiraSearchClient::new(
            &format!("http://{addr}"),
            credentials(),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client
            .search(&QueryTemplate::default().build("1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn slow_tracker_times_out_as_transport_error() {
        let app = Router::new().route(
            "/rest/api/2/search",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Json(json!({ "issues": [] }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = JiraSearchClient::new(
            &format!("http://{addr}"),
            credentials(),
            Duration::from_millis(300),
        )
        .unwrap();

        let started = Instant::now();
        let err = client
            .search(&QueryTemplate::default().build("1"))
            .await
            .unwrap_err();

        assert!(matches!(err, LookupError::Transport(ref source) if source.is_timeout()), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo".into(), 2), "h");
        assert_eq!(truncate("short".into(), 512), "short");
    }
}
