//! The slash-command endpoint.
//!
//! Order of work per request: parse the form body, verify the signature over the raw bytes,
//! pick the delivery mode, then look the issue up and answer exactly once, either in the
//! response body or with a single POST to the callback URL.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use mantis_core::delivery::deliver_deferred;
use mantis_core::{Delivery, FormattedReply, InboundCommand};
use mantis_telemetry::{CommandLabels, record_counter, record_histogram, start_command_span};
use metrics::counter;
use tokio::sync::oneshot;
use tracing::{Instrument, Span};

use crate::http::SlashState;
use crate::reqid::RequestId;

const DEFAULT_COMMAND: &str = "/mantis";

/// How a command ended, as reported on the span and in `slash_commands_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Found,
    NotFound,
    Failed,
    Usage,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Found => "found",
            LookupOutcome::NotFound => "not_found",
            LookupOutcome::Failed => "failed",
            LookupOutcome::Usage => "usage",
        }
    }
}

/// Held in the extensions of a deferred acknowledgement. The server drops the response head
/// once it has been written, which releases the background lookup.
#[derive(Clone)]
struct AckSent {
    _release: Arc<oneshot::Sender<()>>,
}

pub async fn slash_command(
    State(state): State<SlashState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let command = match InboundCommand::from_request(&headers, body) {
        Ok(command) => command,
        Err(err) => {
            tracing::warn!(request_id = %request_id.as_str(), error = %err, "malformed slash command");
            counter!("slash_commands_total", "outcome" => "malformed").increment(1);
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };

    let span = start_command_span(
        request_id.as_str(),
        command.command(),
        command.user_id(),
        command.channel_id(),
        command.team_id(),
    );

    if let Err(err) = state.verifier.verify_command(&command) {
        counter!("signature_rejections_total", "reason" => err.reason()).increment(1);
        span.in_scope(|| tracing::warn!(reason = err.reason(), "signature verification failed"));
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let delivery = Delivery::for_command(&command);
    span.record("mode", delivery.as_str());

    match delivery {
        Delivery::Immediate => {
            let rich = state.rich_replies;
            let (reply, _) = resolve_reply(&state, &command, rich, "immediate")
                .instrument(span)
                .await;
            inline_response(reply)
        }
        Delivery::Deferred { response_url } => {
            let (ack_tx, ack_rx) = oneshot::channel::<()>();
            tokio::spawn(
                async move {
                    // Resolves with an error once the acknowledgement has gone out.
                    let _ = ack_rx.await;
                    let (reply, _) = resolve_reply(&state, &command, true, "deferred").await;
                    let _ = deliver_deferred(state.callbacks.as_ref(), &response_url, reply).await;
                }
                .instrument(span),
            );
            let mut response = StatusCode::OK.into_response();
            response.extensions_mut().insert(AckSent {
                _release: Arc::new(ack_tx),
            });
            response
        }
    }
}

/// Produces the single reply for `command`. Lookup failures become a user-facing reply;
/// nothing here returns an error.
pub async fn resolve_reply(
    state: &SlashState,
    command: &InboundCommand,
    rich: bool,
    mode: &str,
) -> (FormattedReply, LookupOutcome) {
    let started = Instant::now();
    let identifier = command.identifier();
    let (reply, outcome) = if identifier.is_empty() {
        let name = command.command().unwrap_or(DEFAULT_COMMAND);
        (state.formatter.usage(name, rich), LookupOutcome::Usage)
    } else {
        let query = state.queries.build(identifier);
        match state.search.search(&query).await {
            Ok(Some(issue)) => {
                tracing::info!(issue = %issue.key, "jira issue found");
                (
                    state.formatter.format(identifier, Some(&issue), rich),
                    LookupOutcome::Found,
                )
            }
            Ok(None) => (
                state.formatter.format(identifier, None, rich),
                LookupOutcome::NotFound,
            ),
            Err(err) => {
                tracing::error!(error = %err, kind = err.kind(), "jira lookup failed");
                (
                    state.formatter.lookup_failed(identifier, rich),
                    LookupOutcome::Failed,
                )
            }
        }
    };

    Span::current().record("outcome", outcome.as_str());
    let labels = CommandLabels::new(command.command(), mode).with("outcome", outcome.as_str());
    record_counter("slash_commands_total", 1, &labels);
    record_histogram("slash_command_seconds", started.elapsed().as_secs_f64(), &labels);
    (reply, outcome)
}

fn inline_response(reply: FormattedReply) -> Response {
    match reply {
        FormattedReply::PlainText { body } => (StatusCode::OK, body).into_response(),
        rich @ FormattedReply::RichBlocks { .. } => {
            (StatusCode::OK, Json(rich.into_rich_message())).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use mantis_core::testkit::{RecordingCallbackSender, StaticIssueSearch};
    use mantis_core::{Issue, QueryTemplate, ReplyFormatter, SignatureVerifier, compute_signature};

    #[tokio::test]
    async fn plain_reply_is_text_body() {
        let reply = ReplyFormatter::new("https://jira.example.com/browse").usage("/mantis", false);
        let response = inline_response(reply);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"Usage: /mantis [mantis id]");
    }

    #[tokio::test]
    async fn rich_reply_is_block_json() {
        let reply = ReplyFormatter::new("https://jira.example.com/browse").usage("/mantis", true);
        let response = inline_response(reply);
        assert_eq!(response.headers()["content-type"], "application/json");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload["blocks"][0]["type"], "section");
        assert_eq!(payload["blocks"][0]["text"]["type"], "mrkdwn");
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(LookupOutcome::NotFound.as_str(), "not_found");
        assert_eq!(LookupOutcome::Usage.as_str(), "usage");
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn lookup_logs_carry_channel_and_team() {
        let state = SlashState::new(
            SignatureVerifier::new("secret"),
            QueryTemplate::default(),
            Arc::new(StaticIssueSearch::found(Issue::new("AVX-500", "Crash on boot", "Open"))),
            ReplyFormatter::new("https://jira.example.com/browse"),
            Arc::new(RecordingCallbackSender::new()),
        );
        let body = "command=%2Fmantis&text=12477&user_id=U1&channel_id=C1&team_id=T1";
        let mut headers = HeaderMap::new();
        headers.insert("X-Slack-Request-Timestamp", "1531420618".parse().unwrap());
        headers.insert(
            "X-Slack-Signature",
            compute_signature("secret", "1531420618", body.as_bytes())
                .parse()
                .unwrap(),
        );

        let response = slash_command(
            State(state),
            Extension(RequestId("rid-7".into())),
            headers,
            Bytes::from_static(body.as_bytes()),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(logs_contain("jira issue found"));
        assert!(logs_contain("request_id=rid-7"));
        assert!(logs_contain("channel_id=C1"));
        assert!(logs_contain("team_id=T1"));
    }
}
