use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use mantis_core::{
    CallbackSender, HttpCallbackSender, IssueSearch, JiraCredentials, JiraSearchClient,
    QueryTemplate, ReplyFormatter, SignatureVerifier,
};

use crate::config::ServiceConfig;
use crate::handler::slash_command;
use crate::oauth::{self, OauthState};
use crate::reqid::with_request_id;

/// Read-only dependencies of the slash-command handler, built once at startup.
#[derive(Clone)]
pub struct SlashState {
    pub verifier: Arc<SignatureVerifier>,
    pub queries: Arc<QueryTemplate>,
    pub search: Arc<dyn IssueSearch>,
    pub formatter: Arc<ReplyFormatter>,
    pub callbacks: Arc<dyn CallbackSender>,
    /// Render inline replies as blocks; deferred replies are always blocks.
    pub rich_replies: bool,
}

impl SlashState {
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let credentials = JiraCredentials {
            user: config.jira.user.clone(),
            api_token: config.jira.api_token.clone(),
        };
        let search = JiraSearchClient::new(
            config.jira.base_url.as_str(),
            credentials,
            config.lookup_timeout,
        )
        .context("building jira search client")?;
        let callbacks = HttpCallbackSender::new(config.callback_timeout)
            .context("building callback client")?;

        Ok(Self::new(
            SignatureVerifier::new(config.signing_secret.clone())
                .with_max_age(config.signature_max_age),
            QueryTemplate::new(
                config.jira.project.clone(),
                config.jira.link_field.clone(),
                config.jira.mantis_view_url.clone(),
            ),
            Arc::new(search),
            ReplyFormatter::new(config.jira.browse_base()),
            Arc::new(callbacks),
        )
        .with_rich_replies(config.rich_replies))
    }

    pub fn new(
        verifier: SignatureVerifier,
        queries: QueryTemplate,
        search: Arc<dyn IssueSearch>,
        formatter: ReplyFormatter,
        callbacks: Arc<dyn CallbackSender>,
    ) -> Self {
        Self {
            verifier: Arc::new(verifier),
            queries: Arc::new(queries),
            search,
            formatter: Arc::new(formatter),
            callbacks,
            rich_replies: false,
        }
    }

    pub fn with_rich_replies(mut self, rich: bool) -> Self {
        self.rich_replies = rich;
        self
    }
}

/// Routes of the service. OAuth endpoints answer 503 when `oauth` is `None`.
pub fn build_router(slash: SlashState, oauth: Option<OauthState>) -> Router {
    let commands = Router::new()
        .route("/slack/command", post(slash_command))
        .with_state(slash);

    Router::new()
        .route("/healthz", get(healthz))
        .merge(commands)
        .merge(oauth::router(oauth))
        .layer(middleware::from_fn(with_request_id))
}

async fn healthz() -> &'static str {
    "ok"
}
