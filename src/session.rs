//! Query session state machine.
//!
//! A session runs `Idle → Loading → {Complete, Errored}`. Every update is
//! tagged with the [`SessionId`] of the request that produced it, and updates
//! from any session other than the current one are dropped, so a stream that
//! is still draining after the user resubmitted can never touch visible state.

use tracing::{debug, info, warn};

use crate::record::{Analysis, Evidence, ProcessingStep, StreamRecord};
use crate::stream::StreamItem;

const STREAM_ENDED_EARLY: &str = "stream ended before the analysis completed";
const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Complete,
    Errored,
}

/// Fields accumulated from independent records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResults {
    pub evidence: Option<Vec<Evidence>>,
    pub analysis: Option<Analysis>,
}

/// Input to [`QuerySession::apply`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Record(StreamRecord),
    Malformed(String),
    Transport(String),
    /// The response body ended
    Finished,
}

impl From<StreamItem> for SessionUpdate {
    fn from(item: StreamItem) -> Self {
        match item {
            StreamItem::Record(record) => SessionUpdate::Record(record),
            StreamItem::Malformed(message) => SessionUpdate::Malformed(message),
            StreamItem::Transport(message) => SessionUpdate::Transport(message),
        }
    }
}

#[derive(Debug)]
pub struct QuerySession {
    id: SessionId,
    next_id: u64,
    phase: Phase,
    query: String,
    step: Option<ProcessingStep>,
    results: QueryResults,
    error: Option<String>,
}

impl Default for QuerySession {
    fn default() -> Self {
        Self::new()
    }
}

impl QuerySession {
    pub fn new() -> Self {
        Self {
            id: SessionId::default(),
            next_id: 1,
            phase: Phase::Idle,
            query: String::new(),
            step: None,
            results: QueryResults::default(),
            error: None,
        }
    }

    /// Start a fresh session for `query`, discarding the previous one.
    ///
    /// Returns `None` (and changes nothing) for a blank query; otherwise the
    /// caller must issue the request under the returned id.
    pub fn submit(&mut self, query: &str) -> Option<SessionId> {
        if query.trim().is_empty() {
            return None;
        }

        if self.phase == Phase::Loading {
            info!(abandoned = %self.id, "abandoning in-flight query");
        }

        self.id = SessionId(self.next_id);
        self.next_id += 1;
        self.phase = Phase::Loading;
        self.query = query.to_string();
        self.step = None;
        self.results = QueryResults::default();
        self.error = None;

        info!(session = %self.id, query = %self.query, "query submitted");
        Some(self.id)
    }

    /// Apply one update. Returns whether visible state changed.
    pub fn apply(&mut self, id: SessionId, update: SessionUpdate) -> bool {
        if id != self.id {
            debug!(stale = %id, current = %self.id, "dropping update from replaced session");
            return false;
        }
        if self.phase == Phase::Errored {
            // The read loop keeps going after a bad line; the latest one is reported
            if let SessionUpdate::Malformed(message) = update {
                self.error = Some(message);
                return true;
            }
            return false;
        }
        if self.phase != Phase::Loading {
            return false;
        }

        match update {
            SessionUpdate::Record(record) => self.apply_record(record),
            SessionUpdate::Malformed(message) | SessionUpdate::Transport(message) => {
                self.fail(message);
                true
            }
            SessionUpdate::Finished => {
                self.fail(STREAM_ENDED_EARLY.to_string());
                true
            }
        }
    }

    fn apply_record(&mut self, record: StreamRecord) -> bool {
        match record {
            StreamRecord::Processing { step: Some(step) } => {
                debug!(session = %self.id, step = step.as_str(), "processing");
                self.step = Some(step);
                true
            }
            StreamRecord::Partial {
                step: Some(ProcessingStep::DocumentsReady),
                similar_documents: Some(documents),
            } => {
                debug!(session = %self.id, count = documents.len(), "evidence received");
                self.results.evidence = Some(documents);
                true
            }
            StreamRecord::Complete {
                analysis: Some(analysis),
            } => {
                info!(session = %self.id, "query complete");
                self.results.analysis = Some(analysis);
                self.step = None;
                self.phase = Phase::Complete;
                true
            }
            StreamRecord::Error { message } => {
                self.fail(message.unwrap_or_else(|| UNKNOWN_ERROR.to_string()));
                true
            }
            StreamRecord::Unknown { status } => {
                debug!(%status, "ignoring record with unrecognized status");
                false
            }
            // Records missing the fields they exist to deliver
            _ => false,
        }
    }

    fn fail(&mut self, message: String) {
        warn!(session = %self.id, error = %message, "query failed");
        self.error = Some(message);
        self.step = None;
        self.phase = Phase::Errored;
    }

    /// Drop everything and return to idle
    pub fn clear(&mut self) {
        self.phase = Phase::Idle;
        self.query.clear();
        self.step = None;
        self.results = QueryResults::default();
        self.error = None;
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn step(&self) -> Option<&ProcessingStep> {
        self.step.as_ref()
    }

    pub fn evidence(&self) -> &[Evidence] {
        self.results.evidence.as_deref().unwrap_or(&[])
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.results.analysis.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format;

    fn record(line: &str) -> SessionUpdate {
        SessionUpdate::Record(StreamRecord::parse(line).unwrap())
    }

    fn happy_path() -> Vec<SessionUpdate> {
        vec![
            record(r#"{"status":"processing","step":"retrieval"}"#),
            record(r#"{"status":"partial","step":"documents_ready","similar_documents":[{"text":"a","score":0.95,"page":3}]}"#),
            record(r#"{"status":"complete","analysis":{"response":"**Bold**"}}"#),
        ]
    }

    #[test]
    fn test_blank_submit_is_ignored() {
        let mut session = QuerySession::new();
        assert_eq!(session.submit("   \t\n"), None);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.id(), SessionId::default());

        let id = session.submit("housing").unwrap();
        session.apply(id, record(r#"{"status":"processing","step":"analysis"}"#));
        assert_eq!(session.submit(""), None);
        assert_eq!(session.id(), id);
        assert_eq!(session.query(), "housing");
        assert_eq!(session.step(), Some(&ProcessingStep::Analysis));
    }

    #[test]
    fn test_happy_path_final_state() {
        let mut session = QuerySession::new();
        let id = session.submit("What is the plan?").unwrap();
        assert!(session.is_loading());

        for update in happy_path() {
            assert!(session.apply(id, update));
        }

        assert_eq!(session.phase(), Phase::Complete);
        assert!(!session.is_loading());
        assert!(session.step().is_none());
        assert!(session.error().is_none());
        assert_eq!(session.evidence().len(), 1);
        assert_eq!(session.evidence()[0].page, 3);
        let analysis = session.analysis().unwrap();
        assert_eq!(
            format::to_html(&analysis.response),
            "<p><strong>Bold</strong></p>"
        );
    }

    #[test]
    fn test_step_updates_while_loading() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        session.apply(id, record(r#"{"status":"processing","step":"retrieval"}"#));
        assert_eq!(session.step(), Some(&ProcessingStep::Retrieval));
        session.apply(id, record(r#"{"status":"processing","step":"analysis"}"#));
        assert_eq!(session.step(), Some(&ProcessingStep::Analysis));
        assert!(session.is_loading());
    }

    #[test]
    fn test_error_record_is_terminal() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        session.apply(id, record(r#"{"status":"processing","step":"retrieval"}"#));
        assert!(session.apply(id, record(r#"{"status":"error","message":"boom"}"#)));

        assert_eq!(session.error(), Some("boom"));
        assert!(!session.is_loading());
        assert_eq!(session.phase(), Phase::Errored);

        for update in happy_path() {
            assert!(!session.apply(id, update));
        }
        assert_eq!(session.error(), Some("boom"));
        assert!(session.evidence().is_empty());
        assert!(session.analysis().is_none());
    }

    #[test]
    fn test_error_record_without_message() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        session.apply(id, record(r#"{"status":"error"}"#));
        assert_eq!(session.error(), Some("Unknown error"));
    }

    #[test]
    fn test_malformed_and_transport_failures() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        session.apply(id, SessionUpdate::Malformed("Malformed stream record: x".to_string()));
        assert_eq!(session.error(), Some("Malformed stream record: x"));
        assert!(!session.is_loading());

        assert!(session.apply(id, SessionUpdate::Malformed("Malformed stream record: y".to_string())));
        assert_eq!(session.error(), Some("Malformed stream record: y"));
        assert!(!session.apply(id, record(r#"{"status":"complete","analysis":{"response":"late"}}"#)));
        assert!(session.analysis().is_none());

        let id = session.submit("q again").unwrap();
        assert!(session.error().is_none());
        session.apply(id, SessionUpdate::Transport("connection reset".to_string()));
        assert_eq!(session.error(), Some("connection reset"));
        assert_eq!(session.phase(), Phase::Errored);
    }

    #[test]
    fn test_missing_fields_are_no_ops() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        session.apply(id, record(r#"{"status":"partial","step":"documents_ready","similar_documents":[{"text":"a","score":0.5,"page":1}]}"#));

        assert!(!session.apply(id, record(r#"{"status":"partial","step":"documents_ready"}"#)));
        assert!(!session.apply(id, record(r#"{"status":"complete"}"#)));
        assert!(!session.apply(id, record(r#"{"status":"processing"}"#)));

        assert!(session.is_loading());
        assert_eq!(session.evidence().len(), 1);
        assert!(session.analysis().is_none());
    }

    #[test]
    fn test_unknown_status_is_ignored() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        assert!(!session.apply(id, record(r#"{"status":"heartbeat","step":"analysis"}"#)));
        assert!(session.is_loading());
        assert!(session.step().is_none());
    }

    #[test]
    fn test_later_evidence_replaces_earlier() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        session.apply(id, record(r#"{"status":"partial","step":"documents_ready","similar_documents":[{"text":"a","score":0.5,"page":1},{"text":"b","score":0.4,"page":2}]}"#));
        session.apply(id, record(r#"{"status":"partial","step":"documents_ready","similar_documents":[{"text":"c","score":0.9,"page":8}]}"#));
        assert_eq!(session.evidence().len(), 1);
        assert_eq!(session.evidence()[0].text, "c");
    }

    #[test]
    fn test_stream_end_without_completion_is_an_error() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        session.apply(id, record(r#"{"status":"processing","step":"retrieval"}"#));
        session.apply(id, SessionUpdate::Finished);
        assert_eq!(session.error(), Some(STREAM_ENDED_EARLY));

        let id = session.submit("q").unwrap();
        for update in happy_path() {
            session.apply(id, update);
        }
        assert!(!session.apply(id, SessionUpdate::Finished));
        assert!(session.error().is_none());
        assert_eq!(session.phase(), Phase::Complete);
    }

    #[test]
    fn test_stale_session_updates_are_dropped() {
        let mut session = QuerySession::new();
        let first = session.submit("first").unwrap();
        session.apply(first, record(r#"{"status":"partial","step":"documents_ready","similar_documents":[{"text":"old","score":0.9,"page":9}]}"#));

        let second = session.submit("second").unwrap();
        assert!(second > first);
        assert!(session.evidence().is_empty());

        assert!(!session.apply(first, record(r#"{"status":"complete","analysis":{"response":"old"}}"#)));
        assert!(!session.apply(first, record(r#"{"status":"error","message":"old failure"}"#)));
        assert!(session.is_loading());
        assert!(session.error().is_none());
        assert_eq!(session.query(), "second");

        for update in happy_path() {
            session.apply(second, update);
        }
        assert_eq!(session.analysis().unwrap().response, "**Bold**");
    }

    #[test]
    fn test_resubmit_after_error_starts_clean() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        session.apply(id, record(r#"{"status":"error","message":"boom"}"#));

        session.submit("again").unwrap();
        assert!(session.is_loading());
        assert!(session.error().is_none());
        assert!(session.evidence().is_empty());
        assert!(session.analysis().is_none());
    }

    #[test]
    fn test_clear_returns_to_idle() {
        let mut session = QuerySession::new();
        let id = session.submit("q").unwrap();
        for update in happy_path() {
            session.apply(id, update);
        }
        session.clear();
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.query().is_empty());
        assert!(session.evidence().is_empty());
    }

    #[test]
    fn test_stream_items_convert_to_updates() {
        assert_eq!(
            SessionUpdate::from(StreamItem::Transport("x".to_string())),
            SessionUpdate::Transport("x".to_string())
        );
    }
}
