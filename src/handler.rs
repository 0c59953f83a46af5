use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use futures_util::StreamExt;
use ratatui::layout::Rect;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::{App, FocusPane, InputMode};
use crate::client::QueryClient;
use crate::session::{SessionId, SessionUpdate};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Session(id, update) => app.apply_session_update(id, update),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Tab => {
            app.focus = app.focus.next();
            if app.focus == FocusPane::Search {
                app.input_mode = InputMode::Editing;
                app.search_cursor = app.search_input.chars().count();
            }
        }

        KeyCode::Char('/') | KeyCode::Char('i') => {
            app.focus = FocusPane::Search;
            app.input_mode = InputMode::Editing;
            app.search_cursor = app.search_input.chars().count();
        }

        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Topics => app.topic_down(),
            FocusPane::Evidence => app.evidence_down(),
            FocusPane::Results | FocusPane::Search => app.scroll_down(),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Topics => app.topic_up(),
            FocusPane::Evidence => app.evidence_up(),
            FocusPane::Results | FocusPane::Search => app.scroll_up(),
        },

        KeyCode::Enter => match app.focus {
            FocusPane::Topics => {
                if let Some(i) = app.topic_state.selected() {
                    if let Some(query) = app.topics.get(i).map(|t| t.query.clone()) {
                        app.search_input = query.clone();
                        app.search_cursor = app.search_input.chars().count();
                        if submit_query(app, &query) {
                            app.active_topic = Some(i);
                        }
                    }
                }
            }
            FocusPane::Evidence => app.view_selected_page(),
            FocusPane::Results | FocusPane::Search => {}
        },

        // Show more / show less
        KeyCode::Char('m') => app.toggle_show_more(),

        // Open the viewer's page locator in the system viewer
        KeyCode::Char('o') => {
            if let Some(url) = app.viewer_url() {
                open_external(&url);
            }
        }

        KeyCode::Char('x') => app.clear_results(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.focus = app.focus.next();
        }
        KeyCode::Enter => {
            let query = app.search_input.clone();
            if submit_query(app, &query) {
                app.active_topic = None;
                app.input_mode = InputMode::Normal;
                app.focus = FocusPane::Results;
            }
        }
        KeyCode::Backspace => {
            if app.search_cursor > 0 {
                app.search_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.search_input, app.search_cursor);
                app.search_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.search_input.chars().count();
            if app.search_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.search_input, app.search_cursor);
                app.search_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.search_cursor = app.search_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.search_input.chars().count();
            app.search_cursor = (app.search_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.search_cursor = 0;
        }
        KeyCode::End => {
            app.search_cursor = app.search_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.search_input, app.search_cursor);
            app.search_input.insert(byte_pos, c);
            app.search_cursor += 1;
        }
        _ => {}
    }
}

/// Start a new session for `query` and spawn its stream task.
///
/// Returns false for a blank query. Any in-flight stream is aborted; if it
/// still manages to deliver an update, the session drops it as stale.
pub fn submit_query(app: &mut App, query: &str) -> bool {
    let Some(id) = app.session.submit(query) else {
        return false;
    };

    if let Some(task) = app.stream_task.take() {
        task.abort();
    }
    app.begin_results();

    let client = app.client.clone();
    let events = app.events.clone();
    let query = query.to_string();
    app.stream_task = Some(tokio::spawn(async move {
        run_stream(client, id, query, events).await;
    }));
    true
}

async fn run_stream(
    client: QueryClient,
    id: SessionId,
    query: String,
    events: mpsc::UnboundedSender<AppEvent>,
) {
    let stream = match client.stream_query(&query).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = events.send(AppEvent::Session(id, SessionUpdate::Transport(e.to_string())));
            return;
        }
    };
    futures_util::pin_mut!(stream);

    while let Some(item) = stream.next().await {
        if events.send(AppEvent::Session(id, item.into())).is_err() {
            debug!(session = %id, "event loop gone, stopping stream");
            return;
        }
    }
    let _ = events.send(AppEvent::Session(id, SessionUpdate::Finished));
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    // Scroll the pane under the cursor
    let in_topics = app.topics_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_results = app.results_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_evidence = app.evidence_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_topics {
                app.topic_down();
            } else if in_results {
                for _ in 0..3 {
                    app.scroll_down();
                }
            } else if in_evidence {
                app.evidence_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_topics {
                app.topic_up();
            } else if in_results {
                for _ in 0..3 {
                    app.scroll_up();
                }
            } else if in_evidence {
                app.evidence_up();
            }
        }
        _ => {}
    }
}

fn open_external(url: &str) {
    use std::process::{Command, Stdio};

    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    if let Err(e) = Command::new(opener)
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        warn!(%url, error = %e, "failed to open document viewer");
    }
}
