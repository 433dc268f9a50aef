//! Reply delivery: inline in the HTTP response, or deferred to the callback URL.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use metrics::counter;
use reqwest::{Client, Url};
use thiserror::Error;

use crate::command::InboundCommand;
use crate::reply::{FormattedReply, RichMessage};

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// How the reply for one command reaches the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The reply is the body of the webhook response.
    Immediate,
    /// The webhook is acknowledged with an empty 200 and the reply is posted to `response_url`.
    Deferred { response_url: Url },
}

impl Delivery {
    /// Deferred when the command carries a usable callback URL, immediate otherwise.
    pub fn for_command(command: &InboundCommand) -> Self {
        let Some(raw) = command.response_url() else {
            return Delivery::Immediate;
        };
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                Delivery::Deferred { response_url: url }
            }
            Ok(url) => {
                tracing::warn!(scheme = url.scheme(), "response_url scheme unsupported; replying inline");
                Delivery::Immediate
            }
            Err(err) => {
                tracing::warn!(error = %err, "response_url unparsable; replying inline");
                Delivery::Immediate
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Immediate => "immediate",
            Delivery::Deferred { .. } => "deferred",
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("callback client configuration error: {0}")]
    Config(String),
    #[error("callback transport error")]
    Transport(#[source] reqwest::Error),
    #[error("callback returned status {status}")]
    Status { status: StatusCode, message: String },
}

/// Posts a rich reply to a callback URL. One attempt, no retry.
#[async_trait]
pub trait CallbackSender: Send + Sync {
    async fn send(&self, response_url: &Url, message: &RichMessage) -> Result<(), DeliveryError>;
}

pub struct HttpCallbackSender {
    client: Client,
}

impl HttpCallbackSender {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DeliveryError::Config(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackSender for HttpCallbackSender {
    async fn send(&self, response_url: &Url, message: &RichMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(response_url.clone())
            .json(message)
            .send()
            .await
            .map_err(DeliveryError::Transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".into());
        Err(DeliveryError::Status { status, message })
    }
}

/// Posts `reply` in block form. The webhook connection is already closed at this point, so
/// failures are logged and counted here; the result is returned for callers that care.
pub async fn deliver_deferred(
    sender: &dyn CallbackSender,
    response_url: &Url,
    reply: FormattedReply,
) -> Result<(), DeliveryError> {
    let message = reply.into_rich_message();
    match sender.send(response_url, &message).await {
        Ok(()) => {
            counter!("callback_delivery_total", "result" => "ok").increment(1);
            tracing::info!(blocks = message.blocks.len(), "deferred reply delivered");
            Ok(())
        }
        Err(err) => {
            counter!("callback_delivery_total", "result" => "error").increment(1);
            tracing::error!(error = %err, "deferred reply delivery failed");
            Err(err)
        }
    }
}
