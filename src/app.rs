use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::QueryClient;
use crate::config::{Config, Topic};
use crate::evidence::page_url;
use crate::record::Evidence;
use crate::session::{Phase, QuerySession, SessionId, SessionUpdate};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Topics,
    Search,
    Results,
    Evidence,
}

impl FocusPane {
    pub fn next(self) -> Self {
        match self {
            FocusPane::Topics => FocusPane::Search,
            FocusPane::Search => FocusPane::Results,
            FocusPane::Results => FocusPane::Evidence,
            FocusPane::Evidence => FocusPane::Topics,
        }
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Sidebar
    pub topics: Vec<Topic>,
    pub topic_state: ListState,
    pub active_topic: Option<usize>,

    // Search box
    pub search_input: String,
    pub search_cursor: usize, // cursor position in chars

    // Query session and its stream task
    pub session: QuerySession,
    pub stream_task: Option<JoinHandle<()>>,

    // Results view
    pub results_scroll: u16,
    pub evidence_state: ListState,
    pub show_all_evidence: bool,
    pub evidence_preview_count: usize,

    // Page shown by the document viewer; driven by the selected evidence item
    pub viewer_page: Option<u32>,

    // Animation state
    pub animation_frame: u8,

    // Panel areas for mouse hit-testing (updated during render)
    pub topics_area: Option<Rect>,
    pub results_area: Option<Rect>,
    pub evidence_area: Option<Rect>,

    // Collaborators
    pub client: QueryClient,
    pub document_url: String,
    pub events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(config: &Config, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        let mut topic_state = ListState::default();
        topic_state.select(Some(0));

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Search,

            topics: config.topics(),
            topic_state,
            active_topic: None,

            search_input: String::new(),
            search_cursor: 0,

            session: QuerySession::new(),
            stream_task: None,

            results_scroll: 0,
            evidence_state: ListState::default(),
            show_all_evidence: false,
            evidence_preview_count: config.evidence_preview_count.max(1),

            viewer_page: None,

            animation_frame: 0,

            topics_area: None,
            results_area: None,
            evidence_area: None,

            client: QueryClient::from_config(config),
            document_url: config.document_url(),
            events,
        }
    }

    // Topics
    pub fn topic_down(&mut self) {
        let len = self.topics.len();
        if len > 0 {
            let i = self.topic_state.selected().unwrap_or(0);
            self.topic_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn topic_up(&mut self) {
        let i = self.topic_state.selected().unwrap_or(0);
        self.topic_state.select(Some(i.saturating_sub(1)));
    }

    /// Reset the results view for a freshly started session
    pub fn begin_results(&mut self) {
        self.results_scroll = 0;
        self.evidence_state.select(None);
        self.show_all_evidence = false;
        self.viewer_page = None;
    }

    /// Apply a stream update; stale sessions are filtered by the session itself
    pub fn apply_session_update(&mut self, id: SessionId, update: SessionUpdate) {
        if !self.session.apply(id, update) {
            return;
        }

        // The error banner replaces the results, viewer included
        if self.session.phase() == Phase::Errored {
            self.begin_results();
            self.stream_task = None;
            return;
        }

        // First evidence batch: point the viewer at the top passage
        if let Some(first) = self.session.evidence().first() {
            if self.viewer_page.is_none() {
                self.viewer_page = Some(first.page);
                self.evidence_state.select(Some(0));
            }
        }

        if !self.session.is_loading() {
            self.stream_task = None;
        }
    }

    // Evidence
    /// Evidence the results view may show; none once the session errored
    pub fn shown_evidence(&self) -> &[Evidence] {
        match self.session.phase() {
            Phase::Errored => &[][..],
            _ => self.session.evidence(),
        }
    }

    pub fn visible_evidence(&self) -> &[Evidence] {
        let evidence = self.shown_evidence();
        if self.show_all_evidence {
            evidence
        } else {
            &evidence[..evidence.len().min(self.evidence_preview_count)]
        }
    }

    pub fn hidden_evidence_count(&self) -> usize {
        self.shown_evidence()
            .len()
            .saturating_sub(self.evidence_preview_count)
    }

    pub fn toggle_show_more(&mut self) {
        if self.hidden_evidence_count() == 0 {
            return;
        }
        self.show_all_evidence = !self.show_all_evidence;

        // Keep the selection inside the visible slice
        let visible = self.visible_evidence().len();
        if let Some(i) = self.evidence_state.selected() {
            if i >= visible {
                self.evidence_state.select(Some(visible.saturating_sub(1)));
            }
        }
    }

    pub fn evidence_down(&mut self) {
        let len = self.visible_evidence().len();
        if len > 0 {
            let i = self.evidence_state.selected().unwrap_or(0);
            self.evidence_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn evidence_up(&mut self) {
        let i = self.evidence_state.selected().unwrap_or(0);
        self.evidence_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_evidence(&self) -> Option<&Evidence> {
        self.evidence_state
            .selected()
            .and_then(|i| self.visible_evidence().get(i))
    }

    /// Point the document viewer at the selected evidence item's page
    pub fn view_selected_page(&mut self) {
        if let Some(page) = self.selected_evidence().map(|e| e.page) {
            self.viewer_page = Some(page);
        }
    }

    pub fn viewer_url(&self) -> Option<String> {
        self.viewer_page.map(|page| page_url(&self.document_url, page))
    }

    // Results scrolling
    pub fn scroll_down(&mut self) {
        self.results_scroll = self.results_scroll.saturating_add(1);
    }

    pub fn scroll_up(&mut self) {
        self.results_scroll = self.results_scroll.saturating_sub(1);
    }

    /// Clear query, results and search box
    pub fn clear_results(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        self.session.clear();
        self.search_input.clear();
        self.search_cursor = 0;
        self.active_topic = None;
        self.begin_results();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 4;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StreamRecord;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(&Config::new(), tx)
    }

    fn evidence_record(pages: &[u32]) -> SessionUpdate {
        let docs: Vec<String> = pages
            .iter()
            .map(|p| format!(r#"{{"text":"passage {p}","score":0.8,"page":{p}}}"#))
            .collect();
        let line = format!(
            r#"{{"status":"partial","step":"documents_ready","similar_documents":[{}]}}"#,
            docs.join(",")
        );
        SessionUpdate::Record(StreamRecord::parse(&line).unwrap())
    }

    #[test]
    fn test_topics_navigation() {
        let mut app = test_app();
        assert_eq!(app.topics[app.topic_state.selected().unwrap()].title, "Climate Change");
        app.topic_up();
        assert_eq!(app.topic_state.selected(), Some(0));
        for _ in 0..20 {
            app.topic_down();
        }
        assert_eq!(app.topics[app.topic_state.selected().unwrap()].title, "Taxes");
    }

    #[test]
    fn test_first_evidence_drives_viewer() {
        let mut app = test_app();
        let id = app.session.submit("housing").unwrap();
        app.begin_results();

        app.apply_session_update(id, evidence_record(&[12, 3]));
        assert_eq!(app.viewer_page, Some(12));
        assert_eq!(
            app.viewer_url().unwrap(),
            "http://localhost:8000/data/Liberal.pdf#page=12"
        );

        app.evidence_down();
        app.view_selected_page();
        assert_eq!(app.viewer_page, Some(3));
    }

    #[test]
    fn test_stale_updates_do_not_move_viewer() {
        let mut app = test_app();
        let old = app.session.submit("old").unwrap();
        let _new = app.session.submit("new").unwrap();
        app.begin_results();

        app.apply_session_update(old, evidence_record(&[7]));
        assert_eq!(app.viewer_page, None);
        assert!(app.session.evidence().is_empty());
    }

    #[test]
    fn test_show_more_toggle() {
        let mut app = test_app();
        let id = app.session.submit("q").unwrap();
        app.apply_session_update(id, evidence_record(&[1, 2, 3, 4, 5, 6, 7]));

        assert_eq!(app.visible_evidence().len(), 5);
        assert_eq!(app.hidden_evidence_count(), 2);

        app.toggle_show_more();
        assert_eq!(app.visible_evidence().len(), 7);
        for _ in 0..10 {
            app.evidence_down();
        }
        assert_eq!(app.selected_evidence().unwrap().page, 7);

        app.toggle_show_more();
        assert_eq!(app.visible_evidence().len(), 5);
        assert_eq!(app.evidence_state.selected(), Some(4));
    }

    #[test]
    fn test_error_hides_evidence_and_viewer() {
        let mut app = test_app();
        let id = app.session.submit("housing").unwrap();
        app.apply_session_update(id, evidence_record(&[3, 4, 5, 6, 7, 8]));
        assert_eq!(app.viewer_page, Some(3));

        let error = StreamRecord::parse(r#"{"status":"error","message":"boom"}"#).unwrap();
        app.apply_session_update(id, SessionUpdate::Record(error));

        assert_eq!(app.session.error(), Some("boom"));
        assert!(app.shown_evidence().is_empty());
        assert!(app.visible_evidence().is_empty());
        assert_eq!(app.hidden_evidence_count(), 0);
        assert!(app.selected_evidence().is_none());
        assert_eq!(app.viewer_page, None);
        assert!(app.viewer_url().is_none());
    }

    #[test]
    fn test_show_more_is_noop_for_short_lists() {
        let mut app = test_app();
        let id = app.session.submit("q").unwrap();
        app.apply_session_update(id, evidence_record(&[1, 2]));
        app.toggle_show_more();
        assert!(!app.show_all_evidence);
    }

    #[test]
    fn test_clear_results() {
        let mut app = test_app();
        app.search_input = "taxes".to_string();
        app.search_cursor = 5;
        let id = app.session.submit("taxes").unwrap();
        app.apply_session_update(id, evidence_record(&[2]));

        app.clear_results();
        assert!(app.search_input.is_empty());
        assert!(app.session.query().is_empty());
        assert_eq!(app.viewer_page, None);
    }

    #[test]
    fn test_animation_only_runs_while_loading() {
        let mut app = test_app();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
        app.session.submit("q").unwrap();
        app.tick_animation();
        assert_eq!(app.animation_frame, 1);
    }
}
