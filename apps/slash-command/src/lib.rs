//! HTTP service answering the `/mantis` slash command with the linked Jira issue.
//!
//! `build_app` wires the production clients from a [`ServiceConfig`]; tests assemble a
//! [`SlashState`] from in-memory doubles and call [`build_router`] directly.

pub mod config;
pub mod handler;
pub mod http;
pub mod oauth;
pub mod reqid;

use anyhow::{Context, Result};
use axum::Router;

pub use config::{JiraConfig, OauthConfig, ServiceConfig};
pub use handler::{LookupOutcome, resolve_reply, slash_command};
pub use http::{SlashState, build_router};
pub use oauth::{Installation, OauthError, OauthState, SlackTokenExchange, TokenExchange};
pub use reqid::{RequestId, with_request_id};

/// Builds the full router with real Jira, callback and OAuth clients.
pub fn build_app(config: &ServiceConfig) -> Result<Router> {
    let slash = SlashState::from_config(config)?;
    let oauth = match &config.oauth {
        Some(oauth) => Some(OauthState::from_config(oauth).context("building oauth state")?),
        None => {
            tracing::warn!("CLIENT_ID/CLIENT_SECRET unset; install endpoints disabled");
            None
        }
    };
    Ok(build_router(slash, oauth))
}
