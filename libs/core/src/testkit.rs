//! In-memory doubles for the lookup and callback seams.
//!
//! Both doubles can share a [`CallLog`] so tests can assert the order in which the handler
//! touched them.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::Notify;

use crate::delivery::{CallbackSender, DeliveryError};
use crate::issue::Issue;
use crate::lookup::{IssueSearch, LookupError};
use crate::query::SearchQuery;
use crate::reply::RichMessage;

#[derive(Clone, Default)]
pub struct CallLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[derive(Clone)]
enum Canned {
    Found(Issue),
    Missing,
    DecodeFailure,
}

/// Answers every search with the same canned outcome and records the queries it saw.
pub struct StaticIssueSearch {
    canned: Canned,
    queries: Mutex<Vec<SearchQuery>>,
    log: CallLog,
}

impl StaticIssueSearch {
    fn with(canned: Canned) -> Self {
        Self {
            canned,
            queries: Mutex::new(Vec::new()),
            log: CallLog::new(),
        }
    }

    pub fn found(issue: Issue) -> Self {
        Self::with(Canned::Found(issue))
    }

    pub fn missing() -> Self {
        Self::with(Canned::Missing)
    }

    /// Fails every search as if the tracker returned a malformed body.
    pub fn failing() -> Self {
        Self::with(Canned::DecodeFailure)
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueSearch for StaticIssueSearch {
    async fn search(&self, query: &SearchQuery) -> Result<Option<Issue>, LookupError> {
        self.log.record("lookup");
        self.queries.lock().unwrap().push(query.clone());
        match &self.canned {
            Canned::Found(issue) => Ok(Some(issue.clone())),
            Canned::Missing => Ok(None),
            Canned::DecodeFailure => Err(LookupError::Decode(
                serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            )),
        }
    }
}

/// Records posted replies instead of sending them.
#[derive(Default)]
pub struct RecordingCallbackSender {
    sent: Mutex<Vec<(Url, RichMessage)>>,
    notify: Notify,
    log: CallLog,
}

impl RecordingCallbackSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn sent(&self) -> Vec<(Url, RichMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Resolves once at least `count` replies have been posted.
    pub async fn wait_for(&self, count: usize) -> Vec<(Url, RichMessage)> {
        loop {
            let notified = self.notify.notified();
            {
                let sent = self.sent.lock().unwrap();
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl CallbackSender for RecordingCallbackSender {
    async fn send(&self, response_url: &Url, message: &RichMessage) -> Result<(), DeliveryError> {
        self.log.record("callback");
        self.sent
            .lock()
            .unwrap()
            .push((response_url.clone(), message.clone()));
        self.notify.notify_waiters();
        Ok(())
    }
}
