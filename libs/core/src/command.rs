//! Inbound slash-command requests.

use bytes::Bytes;
use http::HeaderMap;
use thiserror::Error;
use url::form_urlencoded;

use crate::signature::{SIGNATURE_HEADERS, TIMESTAMP_HEADERS, header_value};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("slash command body has no `text` field")]
    MissingText,
}

/// One slash-command invocation as received: the raw body plus the fields the handler uses.
///
/// The raw body is kept byte-for-byte so the signature can be checked against it.
#[derive(Debug, Clone)]
pub struct InboundCommand {
    raw_body: Bytes,
    timestamp: String,
    signature: String,
    text: String,
    response_url: Option<String>,
    command: Option<String>,
    user_id: Option<String>,
    channel_id: Option<String>,
    team_id: Option<String>,
}

impl InboundCommand {
    /// Parses a form-encoded slash-command body. Missing signing headers are kept as empty
    /// strings so that verification, not parsing, rejects them.
    pub fn from_request(headers: &HeaderMap, body: Bytes) -> Result<Self, CommandError> {
        let timestamp = header_value(headers, &TIMESTAMP_HEADERS)
            .unwrap_or_default()
            .to_string();
        let signature = header_value(headers, &SIGNATURE_HEADERS)
            .unwrap_or_default()
            .to_string();

        let mut text = None;
        let mut response_url = None;
        let mut command = None;
        let mut user_id = None;
        let mut channel_id = None;
        let mut team_id = None;
        for (key, value) in form_urlencoded::parse(&body) {
            let value = value.into_owned();
            match key.as_ref() {
                "text" => text = Some(value),
                "response_url" => response_url = non_empty(value),
                "command" => command = non_empty(value),
                "user_id" => user_id = non_empty(value),
                "channel_id" => channel_id = non_empty(value),
                "team_id" => team_id = non_empty(value),
                _ => {}
            }
        }

        Ok(Self {
            raw_body: body,
            timestamp,
            signature,
            text: text.ok_or(CommandError::MissingText)?,
            response_url,
            command,
            user_id,
            channel_id,
            team_id,
        })
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Free-form argument as typed by the user.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The argument with surrounding whitespace removed; this is the Mantis id.
    pub fn identifier(&self) -> &str {
        self.text.trim()
    }

    pub fn response_url(&self) -> Option<&str> {
        self.response_url.as_deref()
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Slack-Request-Timestamp", "1700000000".parse().unwrap());
        headers.insert("X-Slack-Signature", "v0=abc".parse().unwrap());
        headers
    }

    #[test]
    fn parses_form_fields_and_keeps_raw_body() {
        let body = Bytes::from_static(
            b"command=%2Fmantis&text=+12477+&user_id=U1&channel_id=C1&team_id=T1&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1%2F1%2Fabc",
        );
        let cmd = InboundCommand::from_request(&signed_headers(), body.clone()).unwrap();
        assert_eq!(cmd.raw_body(), body.as_ref());
        assert_eq!(cmd.timestamp(), "1700000000");
        assert_eq!(cmd.signature(), "v0=abc");
        assert_eq!(cmd.text(), " 12477 ");
        assert_eq!(cmd.identifier(), "12477");
        assert_eq!(cmd.command(), Some("/mantis"));
        assert_eq!(cmd.user_id(), Some("U1"));
        assert_eq!(cmd.channel_id(), Some("C1"));
        assert_eq!(cmd.team_id(), Some("T1"));
        assert_eq!(
            cmd.response_url(),
            Some("https://hooks.slack.com/commands/T1/1/abc")
        );
    }

    #[test]
    fn missing_text_is_malformed() {
        let err = InboundCommand::from_request(&signed_headers(), Bytes::from_static(b"user_id=U1"))
            .unwrap_err();
        assert_eq!(err, CommandError::MissingText);
    }

    #[test]
    fn blank_text_and_response_url_are_accepted() {
        let cmd = InboundCommand::from_request(
            &signed_headers(),
            Bytes::from_static(b"text=&response_url="),
        )
        .unwrap();
        assert_eq!(cmd.identifier(), "");
        assert_eq!(cmd.response_url(), None);
    }

    #[test]
    fn missing_headers_become_empty_strings() {
        let cmd =
            InboundCommand::from_request(&HeaderMap::new(), Bytes::from_static(b"text=1")).unwrap();
        assert_eq!(cmd.timestamp(), "");
        assert_eq!(cmd.signature(), "");
    }
}
