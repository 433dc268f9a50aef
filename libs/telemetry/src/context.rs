use tracing::Span;

const COMMAND_SPAN_NAME: &str = "command.handle";

/// Labels attached to per-command metrics and spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLabels {
    pub command: Option<String>,
    pub mode: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl CommandLabels {
    pub fn new(command: Option<&str>, mode: &str) -> Self {
        Self {
            command: command.map(str::to_string),
            mode: Some(mode.to_string()),
            extra: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        let mut tags = Vec::with_capacity(2 + self.extra.len());
        if let Some(command) = &self.command {
            tags.push(("command".into(), command.clone()));
        }
        if let Some(mode) = &self.mode {
            tags.push(("mode".into(), mode.clone()));
        }
        tags.extend(self.extra.iter().cloned());
        tags
    }
}

/// Span wrapping the handling of one slash command; `mode` and `outcome` are recorded later.
pub fn start_command_span(
    request_id: &str,
    command: Option<&str>,
    user_id: Option<&str>,
    channel_id: Option<&str>,
    team_id: Option<&str>,
) -> Span {
    tracing::info_span!(
        COMMAND_SPAN_NAME,
        request_id = %request_id,
        command = %command.unwrap_or_default(),
        user_id = %user_id.unwrap_or_default(),
        channel_id = %channel_id.unwrap_or_default(),
        team_id = %team_id.unwrap_or_default(),
        mode = tracing::field::Empty,
        outcome = tracing::field::Empty,
    )
}
