//! Service configuration, read once from the environment at startup.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use url::Url;

pub const DEFAULT_JIRA_BASE_URL: &str = "https://aviatrix.atlassian.net";
pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://slack.com/oauth/v2/authorize";
pub const DEFAULT_SCOPES: &str = "channels:read,chat:write,chat:write.customize,im:read,im:write,incoming-webhook,chat:write.public,reactions:write,app_mentions:read";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PORT: u16 = 8080;

#[derive(Clone)]
pub struct JiraConfig {
    pub base_url: Url,
    pub user: String,
    pub api_token: String,
    pub project: String,
    pub link_field: String,
    pub mantis_view_url: String,
}

impl JiraConfig {
    /// Prefix for human-facing issue links.
    pub fn browse_base(&self) -> String {
        format!("{}/browse", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[derive(Clone)]
pub struct OauthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub authorize_url: String,
    pub redirect_uri: Option<String>,
    pub scopes: String,
    pub timeout: Duration,
}

impl OauthConfig {
    pub fn token_url(&self) -> String {
        format!("{}/oauth.v2.access", self.api_base.trim_end_matches('/'))
    }
}

#[derive(Clone)]
pub struct ServiceConfig {
    pub addr: SocketAddr,
    pub signing_secret: String,
    /// Replay window; `None` disables the freshness check.
    pub signature_max_age: Option<Duration>,
    pub jira: JiraConfig,
    pub rich_replies: bool,
    pub lookup_timeout: Duration,
    pub callback_timeout: Duration,
    /// Absent when no OAuth client credentials are configured.
    pub oauth: Option<OauthConfig>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("addr", &self.addr)
            .field("signature_max_age", &self.signature_max_age)
            .field("jira_base_url", &self.jira.base_url.as_str())
            .field("jira_user", &self.jira.user)
            .field("jira_project", &self.jira.project)
            .field("rich_replies", &self.rich_replies)
            .field("lookup_timeout", &self.lookup_timeout)
            .field("callback_timeout", &self.callback_timeout)
            .field("oauth_enabled", &self.oauth.is_some())
            .finish_non_exhaustive()
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let addr = match get("BIND") {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .with_context(|| format!("invalid BIND address {raw:?}"))?,
            None => {
                let port = match get("PORT") {
                    Some(raw) => raw
                        .parse::<u16>()
                        .with_context(|| format!("invalid PORT {raw:?}"))?,
                    None => DEFAULT_PORT,
                };
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        let base_raw = get("JIRA_BASE_URL").unwrap_or_else(|| DEFAULT_JIRA_BASE_URL.into());
        let base_url =
            Url::parse(&base_raw).with_context(|| format!("invalid JIRA_BASE_URL {base_raw:?}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!("JIRA_BASE_URL must be an http(s) URL");
        }

        let jira = JiraConfig {
            base_url,
            user: get("JIRA_USER").context("JIRA_USER must be set")?,
            api_token: get("JIRA_API_TOKEN").context("JIRA_API_TOKEN must be set")?,
            project: get("JIRA_PROJECT")
                .unwrap_or_else(|| mantis_core::query::DEFAULT_PROJECT.into()),
            link_field: get("JIRA_LINK_FIELD")
                .unwrap_or_else(|| mantis_core::query::DEFAULT_LINK_FIELD.into()),
            mantis_view_url: get("MANTIS_VIEW_URL")
                .unwrap_or_else(|| mantis_core::query::DEFAULT_LINK_BASE.into()),
        };

        let oauth = match (get("CLIENT_ID"), get("CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(OauthConfig {
                client_id,
                client_secret,
                api_base: get("SLACK_API_BASE").unwrap_or_else(|| DEFAULT_SLACK_API_BASE.into()),
                authorize_url: get("SLACK_AUTHORIZE_URL")
                    .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.into()),
                redirect_uri: get("SLACK_REDIRECT_URI"),
                scopes: get("SLACK_SCOPES").unwrap_or_else(|| DEFAULT_SCOPES.into()),
                timeout: seconds(&get, "OAUTH_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            }),
            (None, None) => None,
            _ => bail!("CLIENT_ID and CLIENT_SECRET must be set together"),
        };

        let signature_max_age = match get("SIGNATURE_MAX_AGE_SECS") {
            Some(_) => Some(seconds(&get, "SIGNATURE_MAX_AGE_SECS", 0)?),
            None => None,
        };

        Ok(Self {
            addr,
            signing_secret: get("SIGNING_SECRET").context("SIGNING_SECRET must be set")?,
            signature_max_age,
            jira,
            rich_replies: flag(&get, "RICH_REPLIES")?,
            lookup_timeout: seconds(&get, "LOOKUP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            callback_timeout: seconds(&get, "CALLBACK_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            oauth,
        })
    }
}

fn seconds<F>(get: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds"))?,
        None => default,
    };
    if secs == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

fn flag<F>(get: &F, key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => bail!("{key} must be a boolean, got {v:?}"),
    }
}
