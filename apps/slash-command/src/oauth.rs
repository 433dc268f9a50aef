//! App install flow: redirect to the authorize page, then trade the returned code for a token.
//!
//! Tokens are not stored; a successful exchange only proves the install went through.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use handlebars::Handlebars;
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::OauthConfig;

const SUCCESS_PAGE: &str = "oauth_success";
const SUCCESS_MESSAGE: &str = "Welcome! You can now run the slash command.";
const EXCHANGE_FAILED: &str = "Unexpected error authorizing against Slack.";

#[derive(Debug, Error)]
pub enum OauthError {
    #[error("oauth client configuration error: {0}")]
    Config(String),
    #[error("oauth transport error")]
    Transport(#[source] reqwest::Error),
    #[error("oauth endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("oauth exchange rejected: {0}")]
    Rejected(String),
    #[error("oauth response carried no access token")]
    MissingToken,
    #[error("confirmation page error: {0}")]
    Template(String),
}

/// Workspace that completed the install.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Installation {
    pub team_id: Option<String>,
    pub team_name: Option<String>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<Installation, OauthError>;
}

/// `oauth.v2.access` client.
pub struct SlackTokenExchange {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
}

impl std::fmt::Debug for SlackTokenExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackTokenExchange")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct AccessResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    team: Option<TeamRef>,
}

#[derive(Deserialize)]
struct TeamRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl SlackTokenExchange {
    pub fn new(config: &OauthConfig) -> Result<Self, OauthError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| OauthError::Config(err.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &OauthConfig) -> Self {
        Self {
            client,
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }
}

#[async_trait]
impl TokenExchange for SlackTokenExchange {
    async fn exchange(&self, code: &str) -> Result<Installation, OauthError> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
        ];
        if let Some(redirect_uri) = &self.redirect_uri {
            params.push(("redirect_uri", redirect_uri.as_str()));
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(OauthError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(OauthError::Status(status));
        }
        let body: AccessResponse = response.json().await.map_err(OauthError::Transport)?;
        if !body.ok {
            return Err(OauthError::Rejected(
                body.error.unwrap_or_else(|| "unknown_error".into()),
            ));
        }
        if body.access_token.as_deref().is_none_or(str::is_empty) {
            return Err(OauthError::MissingToken);
        }
        let (team_id, team_name) = body
            .team
            .map(|team| (team.id, team.name))
            .unwrap_or_default();
        Ok(Installation {
            team_id,
            team_name,
            scope: body.scope,
        })
    }
}

#[derive(Clone)]
pub struct OauthState {
    exchange: Arc<dyn TokenExchange>,
    client_id: String,
    authorize_url: String,
    scopes: String,
    redirect_uri: Option<String>,
    pages: Arc<Handlebars<'static>>,
}

impl OauthState {
    pub fn from_config(config: &OauthConfig) -> Result<Self, OauthError> {
        let exchange = SlackTokenExchange::new(config)?;
        Self::new(config, Arc::new(exchange))
    }

    pub fn new(config: &OauthConfig, exchange: Arc<dyn TokenExchange>) -> Result<Self, OauthError> {
        Ok(Self {
            exchange,
            client_id: config.client_id.clone(),
            authorize_url: config.authorize_url.clone(),
            scopes: config.scopes.clone(),
            redirect_uri: config.redirect_uri.clone(),
            pages: Arc::new(confirmation_pages()?),
        })
    }

    /// Authorize URL the install endpoint redirects to.
    pub fn authorize_location(&self) -> String {
        let mut location = format!(
            "{}?client_id={}&scope={}",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.scopes)
        );
        if let Some(redirect_uri) = &self.redirect_uri {
            location.push_str("&redirect_uri=");
            location.push_str(&urlencoding::encode(redirect_uri));
        }
        location
    }
}

pub fn confirmation_pages() -> Result<Handlebars<'static>, OauthError> {
    let mut pages = Handlebars::new();
    pages.set_strict_mode(true);
    pages
        .register_template_string(SUCCESS_PAGE, include_str!("../templates/oauth_success.html"))
        .map_err(|err| OauthError::Template(err.to_string()))?;
    Ok(pages)
}

/// Install routes. Without OAuth credentials both paths answer 503.
pub fn router(state: Option<OauthState>) -> Router {
    match state {
        Some(state) => Router::new()
            .route("/slack/install", get(install))
            .route("/slack/oauth", get(callback))
            .with_state(state),
        None => Router::new()
            .route("/slack/install", get(not_configured))
            .route("/slack/oauth", get(not_configured)),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn install(State(state): State<OauthState>) -> Redirect {
    Redirect::to(&state.authorize_location())
}

async fn callback(State(state): State<OauthState>, Query(query): Query<CallbackQuery>) -> Response {
    if let Some(error) = query.error.filter(|value| !value.is_empty()) {
        tracing::warn!(%error, "install denied");
        counter!("oauth_callbacks_total", "result" => "denied").increment(1);
        return (StatusCode::UNAUTHORIZED, error).into_response();
    }
    let Some(code) = query.code.filter(|value| !value.is_empty()) else {
        counter!("oauth_callbacks_total", "result" => "missing_code").increment(1);
        return (StatusCode::BAD_REQUEST, "Code is empty").into_response();
    };

    let installation = match state.exchange.exchange(&code).await {
        Ok(installation) => installation,
        Err(err) => {
            tracing::error!(error = %err, "token exchange failed");
            counter!("oauth_callbacks_total", "result" => "error").increment(1);
            return (StatusCode::INTERNAL_SERVER_ERROR, EXCHANGE_FAILED).into_response();
        }
    };
    tracing::info!(
        team_id = installation.team_id.as_deref().unwrap_or_default(),
        team_name = installation.team_name.as_deref().unwrap_or_default(),
        "app installed"
    );
    counter!("oauth_callbacks_total", "result" => "ok").increment(1);

    match state
        .pages
        .render(SUCCESS_PAGE, &json!({ "message": SUCCESS_MESSAGE }))
    {
        Ok(page) => Html(page).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "confirmation page render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn not_configured() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "OAuth is not configured")
}
