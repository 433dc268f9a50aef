//! Reply rendering: plain text or Block Kit blocks.

use serde::{Deserialize, Serialize};

use crate::issue::Issue;

pub const FOUND_MARKER: &str = ":raised_hands:";
pub const NOT_FOUND_MARKER: &str = ":x:";
pub const FAILURE_MARKER: &str = ":warning:";

const MAX_HEADER_CHARS: usize = 150;
const MAX_SECTION_CHARS: usize = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Header,
    Section,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextKind {
    #[serde(rename = "plain_text")]
    PlainText,
    #[serde(rename = "mrkdwn")]
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockText {
    #[serde(rename = "type")]
    pub kind: TextKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub text: BlockText,
}

impl Block {
    pub fn header(text: &str) -> Self {
        Self {
            kind: BlockKind::Header,
            text: BlockText {
                kind: TextKind::PlainText,
                text: truncate_chars(text, MAX_HEADER_CHARS),
            },
        }
    }

    pub fn section(text: &str) -> Self {
        Self {
            kind: BlockKind::Section,
            text: BlockText {
                kind: TextKind::Markdown,
                text: truncate_chars(text, MAX_SECTION_CHARS),
            },
        }
    }
}

/// Wire document for rich replies: `{ "blocks": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichMessage {
    pub blocks: Vec<Block>,
}

/// Exactly one of these is produced per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedReply {
    PlainText { body: String },
    RichBlocks { blocks: Vec<Block> },
}

impl FormattedReply {
    pub fn is_rich(&self) -> bool {
        matches!(self, FormattedReply::RichBlocks { .. })
    }

    /// Block form of the reply; plain text becomes a single markdown section.
    pub fn into_rich_message(self) -> RichMessage {
        match self {
            FormattedReply::RichBlocks { blocks } => RichMessage { blocks },
            FormattedReply::PlainText { body } => RichMessage {
                blocks: vec![Block::section(&body)],
            },
        }
    }

    /// Text of every block joined by newlines, or the plain body.
    pub fn text(&self) -> String {
        match self {
            FormattedReply::PlainText { body } => body.clone(),
            FormattedReply::RichBlocks { blocks } => blocks
                .iter()
                .map(|block| block.text.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Renders replies. Output depends only on the arguments and the configured browse base.
#[derive(Debug, Clone)]
pub struct ReplyFormatter {
    browse_base: String,
}

impl ReplyFormatter {
    /// `browse_base` is the issue browse prefix, e.g. `https://example.atlassian.net/browse`.
    pub fn new(browse_base: impl Into<String>) -> Self {
        Self {
            browse_base: browse_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn browse_base(&self) -> &str {
        &self.browse_base
    }

    /// ```
    /// use mantis_core::{FormattedReply, Issue, ReplyFormatter};
    ///
    /// let formatter = ReplyFormatter::new("https://jira.example.com/browse");
    /// let issue = Issue::new("AVX-500", "Crash on boot", "Open");
    /// assert_eq!(
    ///     formatter.format("12477", Some(&issue), false),
    ///     FormattedReply::PlainText {
    ///         body: "Found AVX-500. Link: https://jira.example.com/browse/AVX-500\nSummary: Crash on boot".into()
    ///     }
    /// );
    /// ```
    pub fn format(&self, identifier: &str, issue: Option<&Issue>, rich: bool) -> FormattedReply {
        match issue {
            Some(issue) => self.found(identifier, issue, rich),
            None => single(
                format!(
                    "{NOT_FOUND_MARKER} Sorry! Couldn't find any match for Mantis {} in Jira.",
                    escape_mrkdwn(identifier)
                ),
                rich,
            ),
        }
    }

    /// Reply used when the tracker could not be reached or answered garbage.
    pub fn lookup_failed(&self, identifier: &str, rich: bool) -> FormattedReply {
        single(
            format!(
                "{FAILURE_MARKER} Jira lookup for Mantis {} failed. Please try again later.",
                escape_mrkdwn(identifier)
            ),
            rich,
        )
    }

    pub fn usage(&self, command: &str, rich: bool) -> FormattedReply {
        single(
            format!("Usage: {} [mantis id]", escape_mrkdwn(command)),
            rich,
        )
    }

    fn found(&self, identifier: &str, issue: &Issue, rich: bool) -> FormattedReply {
        let link = issue.browse_url(&self.browse_base);
        let key = escape_mrkdwn(&issue.key);
        let summary = escape_mrkdwn(&issue.summary);
        if !rich {
            return FormattedReply::PlainText {
                body: truncate_chars(
                    &format!("Found {key}. Link: {link}\nSummary: {summary}"),
                    MAX_SECTION_CHARS,
                ),
            };
        }
        FormattedReply::RichBlocks {
            blocks: vec![
                Block::header(&format!("Mantis {identifier}")),
                Block::section(&format!(
                    "{FOUND_MARKER} Found *{key}*. Link: <{link}|{key}>"
                )),
                Block::section(&format!("*Summary:* {summary}")),
                Block::section(&format!("*Status:* {}", escape_mrkdwn(&issue.status))),
            ],
        }
    }
}

fn single(text: String, rich: bool) -> FormattedReply {
    if rich {
        FormattedReply::RichBlocks {
            blocks: vec![Block::section(&text)],
        }
    } else {
        FormattedReply::PlainText {
            body: truncate_chars(&text, MAX_SECTION_CHARS),
        }
    }
}

/// Escapes the three control characters of Slack mrkdwn.
pub fn escape_mrkdwn(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://aviatrix.atlassian.net/browse";

    fn issue() -> Issue {
        Issue::new("AVX-500", "Crash on boot", "Open")
    }

    #[test]
    fn plain_found_reply_is_exact() {
        let reply = ReplyFormatter::new(BASE).format("12477", Some(&issue()), false);
        assert_eq!(
            reply,
            FormattedReply::PlainText {
                body: "Found AVX-500. Link: https://aviatrix.atlassian.net/browse/AVX-500\nSummary: Crash on boot".into()
            }
        );
    }

    #[test]
    fn link_stays_well_formed_for_unusual_keys() {
        let odd = Issue::new("AVX|5>0", "Crash", "Open");
        let reply = ReplyFormatter::new(BASE).format("12477", Some(&odd), true);
        let FormattedReply::RichBlocks { blocks } = reply else {
            panic!("expected rich reply");
        };
        assert!(blocks[1].text.text.ends_with(
            "Link: <https://aviatrix.atlassian.net/browse/AVX%7C5%3E0|AVX|5&gt;0>"
        ));
    }

    #[test]
    fn rich_found_reply_has_ordered_blocks() {
        let reply = ReplyFormatter::new(format!("{BASE}/")).format("12477", Some(&issue()), true);
        let FormattedReply::RichBlocks { blocks } = reply else {
            panic!("expected rich reply");
        };
        let kinds: Vec<_> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Header,
                BlockKind::Section,
                BlockKind::Section,
                BlockKind::Section
            ]
        );
        assert_eq!(blocks[0].text.kind, TextKind::PlainText);
        assert!(blocks[0].text.text.contains("12477"));
        assert!(blocks[1].text.text.starts_with(FOUND_MARKER));
        assert!(
            blocks[1]
                .text
                .text
                .contains("<https://aviatrix.atlassian.net/browse/AVX-500|AVX-500>")
        );
        assert_eq!(blocks[2].text.text, "*Summary:* Crash on boot");
        assert_eq!(blocks[3].text.text, "*Status:* Open");
        assert!(blocks[1..].iter().all(|b| b.text.kind == TextKind::Markdown));
    }

    #[test]
    fn not_found_reply_names_identifier_without_fabricated_link() {
        let formatter = ReplyFormatter::new(BASE);
        for rich in [false, true] {
            let reply = formatter.format("99999", None, rich);
            assert_eq!(reply.is_rich(), rich);
            let text = reply.text();
            assert!(text.contains("99999"));
            assert!(text.starts_with(NOT_FOUND_MARKER));
            assert!(!text.contains(BASE));
            assert!(!text.contains("AVX-"));
        }
        let FormattedReply::RichBlocks { blocks } = formatter.format("99999", None, true) else {
            panic!("expected rich reply");
        };
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn lookup_failure_is_distinguishable_from_no_match() {
        let formatter = ReplyFormatter::new(BASE);
        let missing = formatter.format("1", None, false).text();
        let failed = formatter.lookup_failed("1", false).text();
        assert_ne!(missing, failed);
        assert!(failed.starts_with(FAILURE_MARKER));
        assert!(!failed.contains(NOT_FOUND_MARKER));
    }

    #[test]
    fn formatting_is_deterministic() {
        let formatter = ReplyFormatter::new(BASE);
        for rich in [false, true] {
            assert_eq!(
                formatter.format("12477", Some(&issue()), rich),
                formatter.format("12477", Some(&issue()), rich)
            );
        }
    }

    #[test]
    fn rich_message_round_trips_through_wire_shape() {
        let message = ReplyFormatter::new(BASE)
            .format("12477", Some(&issue()), true)
            .into_rich_message();
        let wire = serde_json::to_value(&message).unwrap();
        assert_eq!(
            wire["blocks"][0],
            json!({"type": "header", "text": {"type": "plain_text", "text": "Mantis 12477"}})
        );
        assert_eq!(wire["blocks"][2]["text"]["type"], "mrkdwn");
        let back: RichMessage = serde_json::from_value(wire).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn plain_reply_becomes_single_section() {
        let message = ReplyFormatter::new(BASE)
            .format("12477", Some(&issue()), false)
            .into_rich_message();
        assert_eq!(message.blocks.len(), 1);
        assert_eq!(message.blocks[0].kind, BlockKind::Section);
        assert!(message.blocks[0].text.text.starts_with("Found AVX-500."));
    }

    #[test]
    fn user_text_is_escaped() {
        let reply = ReplyFormatter::new(BASE).format("<!channel> & co", None, false);
        let text = reply.text();
        assert!(text.contains("&lt;!channel&gt; &amp; co"));
        assert!(!text.contains("<!channel>"));
    }

    #[test]
    fn long_header_is_truncated_on_char_boundary() {
        let long = "é".repeat(400);
        let block = Block::header(&long);
        assert_eq!(block.text.text.chars().count(), MAX_HEADER_CHARS);
    }

    #[test]
    fn usage_reply_mentions_command() {
        let reply = ReplyFormatter::new(BASE).usage("/mantis", false);
        assert_eq!(reply.text(), "Usage: /mantis [mantis id]");
    }
}
