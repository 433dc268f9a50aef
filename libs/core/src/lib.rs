//! Core building blocks for the Mantis → Jira slash command.
//!
//! The crate owns everything that does not depend on the HTTP server: parsing and
//! authenticating inbound slash-command requests, turning a Mantis id into a Jira search,
//! running that search, rendering the reply, and posting deferred replies back to the
//! chat platform's callback URL.
pub mod command;
pub mod delivery;
pub mod issue;
pub mod lookup;
pub mod query;
pub mod reply;
pub mod signature;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use command::{CommandError, InboundCommand};
pub use delivery::{CallbackSender, Delivery, DeliveryError, HttpCallbackSender};
pub use issue::{Issue, SearchResponse};
pub use lookup::{IssueSearch, JiraCredentials, JiraSearchClient, LookupError};
pub use query::{QueryTemplate, SearchQuery, escape_jql};
pub use reply::{Block, BlockKind, BlockText, FormattedReply, ReplyFormatter, RichMessage, TextKind};
pub use signature::{SignatureError, SignatureVerifier, compute_signature, verify};
