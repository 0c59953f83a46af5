use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, FocusPane, InputMode};
use crate::evidence::{strong_match, ConfidenceBand};
use crate::format::{self, Document, Inline};
use crate::session::Phase;

/// Convert inline runs to styled spans on top of `base`
fn inline_spans(runs: &[Inline], base: Style) -> Vec<Span<'static>> {
    runs.iter()
        .map(|run| match run {
            Inline::Text(s) => Span::styled(s.clone(), base),
            Inline::Strong(s) => Span::styled(s.clone(), base.add_modifier(Modifier::BOLD)),
            Inline::Emphasis(s) => Span::styled(s.clone(), base.add_modifier(Modifier::ITALIC)),
        })
        .collect()
}

/// Lay out a formatted document as terminal lines, one blank line between blocks
pub fn document_lines(doc: &Document) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for (i, block) in doc.blocks.iter().enumerate() {
        if i > 0 {
            lines.push(Line::default());
        }
        match block {
            format::Block::Heading { level, content } => {
                let color = match level {
                    1 => Color::Cyan,
                    2 => Color::LightBlue,
                    _ => Color::Blue,
                };
                let style = Style::default().fg(color).add_modifier(Modifier::BOLD);
                lines.push(Line::from(inline_spans(content, style)));
            }
            format::Block::List { ordered, items } => {
                for (n, item) in items.iter().enumerate() {
                    let marker = if *ordered {
                        format!("{}. ", n + 1)
                    } else {
                        "• ".to_string()
                    };
                    let mut spans = vec![Span::styled(marker, Style::default().fg(Color::DarkGray))];
                    spans.extend(inline_spans(item, Style::default()));
                    lines.push(Line::from(spans));
                }
            }
            format::Block::Paragraph(rows) => {
                for row in rows {
                    lines.push(Line::from(inline_spans(row, Style::default())));
                }
            }
        }
    }

    lines
}

fn band_color(band: ConfidenceBand) -> Color {
    match band {
        ConfidenceBand::High => Color::Green,
        ConfidenceBand::Medium => Color::Yellow,
        ConfidenceBand::Low => Color::Red,
    }
}

fn border_color(focused: bool) -> Color {
    if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [sidebar_area, main_area] =
        Layout::horizontal([Constraint::Length(30), Constraint::Min(0)]).areas(body_area);
    render_sidebar(app, frame, sidebar_area);

    let [search_area, content_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(main_area);
    render_search(app, frame, search_area);

    let [left_area, viewer_area] =
        Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
            .areas(content_area);
    let [results_area, evidence_area] =
        Layout::vertical([Constraint::Percentage(55), Constraint::Percentage(45)])
            .areas(left_area);

    render_results(app, frame, results_area);
    render_evidence(app, frame, evidence_area);
    render_viewer(app, frame, viewer_area);

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let status = match app.session.phase() {
        Phase::Idle | Phase::Complete => String::new(),
        Phase::Loading => format!(" [query {} running]", app.session.id()),
        Phase::Errored => " [error]".to_string(),
    };

    let title = Line::from(vec![
        Span::styled(" SmartVote ", Style::default().fg(Color::Cyan).bold()),
        Span::styled("Liberal platform explorer", Style::default().fg(Color::White)),
        Span::styled(status, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect) {
    let [topics_area, info_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(7)]).areas(area);
    app.topics_area = Some(topics_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Topics)))
        .title(" Popular Topics ");

    let items: Vec<ListItem> = app
        .topics
        .iter()
        .enumerate()
        .map(|(i, topic)| {
            let style = if app.active_topic == Some(i) {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(topic.title.clone(), style))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, topics_area, &mut app.topic_state);

    let info = Paragraph::new(Text::from(vec![
        Line::from(Span::styled("About", Style::default().bold())),
        Line::from("Answers are drawn from the"),
        Line::from("party platform document."),
        Line::from(Span::styled(
            "Evidence links to its page.",
            Style::default().fg(Color::DarkGray),
        )),
    ]))
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    frame.render_widget(info, info_area);
}

fn render_search(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing {
            Color::Yellow
        } else {
            border_color(app.focus == FocusPane::Search)
        }))
        .title(" Ask about the platform ");

    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.search_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let content = if app.search_input.is_empty() && !editing {
        Line::from(Span::styled(
            "Press / to ask a question",
            Style::default().fg(Color::DarkGray).italic(),
        ))
    } else {
        let visible: String = app
            .search_input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Line::from(visible)
    };

    frame.render_widget(Paragraph::new(content).block(block), area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_results(app: &mut App, frame: &mut Frame, area: Rect) {
    app.results_area = Some(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Results)))
        .title(" Analysis ");

    let session = &app.session;
    let mut lines: Vec<Line<'static>> = Vec::new();

    if session.phase() == Phase::Idle {
        lines.push(Line::from(Span::styled(
            "Pick a topic or ask a question to see where the platform stands.",
            Style::default().fg(Color::DarkGray).italic(),
        )));
    } else {
        lines.push(Line::from(vec![
            Span::styled("Q: ", Style::default().fg(Color::DarkGray)),
            Span::styled(format!("\"{}\"", session.query()), Style::default().bold()),
        ]));
        lines.push(Line::default());
    }

    if let Some(error) = session.error() {
        lines.push(Line::from(Span::styled(
            format!(" Error: {} ", error),
            Style::default().fg(Color::White).bg(Color::Red),
        )));
    } else if session.is_loading() {
        let dots = ".".repeat(app.animation_frame as usize);
        let label = session
            .step()
            .map(|step| step.label())
            .unwrap_or_else(|| "Submitting query".to_string());
        lines.push(Line::from(Span::styled(
            format!("{}{}", label, dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    } else if let Some(analysis) = session.analysis() {
        let doc = Document::parse(&analysis.response);
        if doc.is_empty() {
            lines.push(Line::from(Span::styled(
                "The analysis was empty.",
                Style::default().fg(Color::DarkGray),
            )));
        } else {
            lines.extend(document_lines(&doc));
        }
    }

    let results = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.results_scroll, 0));
    frame.render_widget(results, area);
}

fn render_evidence(app: &mut App, frame: &mut Frame, area: Rect) {
    app.evidence_area = Some(area);

    let total = app.shown_evidence().len();
    let hidden = app.hidden_evidence_count();
    let toggle_hint = if hidden == 0 {
        String::new()
    } else if app.show_all_evidence {
        " m: Show Less ".to_string()
    } else {
        format!(" m: View {} More Results ", hidden)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Evidence)))
        .title(format!(" Supporting Evidence ({}) ", total))
        .title_bottom(Line::from(toggle_hint).right_aligned());

    let text_width = area.width.saturating_sub(6) as usize;
    let items: Vec<ListItem> = app
        .visible_evidence()
        .iter()
        .enumerate()
        .map(|(rank, evidence)| {
            let mut score_style = Style::default().fg(band_color(evidence.band()));
            if strong_match(evidence.score) {
                score_style = score_style.add_modifier(Modifier::BOLD);
            }

            let header = Line::from(vec![
                Span::styled(format!("{:>2}. ", rank + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(evidence.score_label(), score_style),
                Span::raw("  "),
                Span::styled(
                    format!(" p. {} ", evidence.page),
                    Style::default().fg(Color::Black).bg(Color::Gray),
                ),
            ]);

            let mut preview: String = evidence.text.chars().take(text_width).collect();
            if evidence.text.chars().count() > text_width {
                preview.pop();
                preview.push('…');
            }
            let body = Line::from(Span::styled(
                format!("    {}", preview),
                Style::default().fg(Color::Gray),
            ));

            ListItem::new(Text::from(vec![header, body]))
        })
        .collect();

    if items.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No evidence yet.",
            Style::default().fg(Color::DarkGray).italic(),
        ))
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut app.evidence_state);
}

fn render_viewer(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" Document Viewer ");

    let mut lines: Vec<Line<'static>> = Vec::new();

    match (app.viewer_page, app.viewer_url()) {
        (Some(page), Some(url)) => {
            lines.push(Line::from(Span::styled(
                format!("Page {}", page),
                Style::default().fg(Color::Magenta).bold(),
            )));
            lines.push(Line::from(Span::styled(url, Style::default().fg(Color::DarkGray))));
            lines.push(Line::default());

            // Passage of the selected item, when it sits on the page being shown
            if let Some(evidence) = app.selected_evidence().filter(|e| e.page == page) {
                lines.push(Line::from(Span::styled(
                    format!("{}, {} confidence", evidence.score_label(), evidence.band().as_str()),
                    Style::default().fg(band_color(evidence.band())),
                )));
                lines.push(Line::from(Span::styled(
                    evidence.text.clone(),
                    Style::default().italic(),
                )));
                lines.push(Line::default());
            }

            lines.push(Line::from(vec![
                Span::styled(" o ", Style::default().bg(Color::DarkGray).fg(Color::White)),
                Span::styled(" open page externally ", Style::default().fg(Color::DarkGray)),
            ]));
        }
        _ => {
            lines.push(Line::from(Span::styled(
                "Select an evidence item to view its page.",
                Style::default().fg(Color::DarkGray).italic(),
            )));
        }
    }

    let viewer = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(viewer, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " EDIT ",
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];

    let hints: Vec<(&str, &str)> = match app.input_mode {
        InputMode::Editing => vec![(" Enter ", " ask "), (" Esc ", " done "), (" Tab ", " focus ")],
        InputMode::Normal => {
            let mut hints = vec![(" Tab ", " focus "), (" j/k ", " nav ")];
            match app.focus {
                FocusPane::Topics => hints.push((" Enter ", " ask topic ")),
                FocusPane::Evidence => {
                    hints.push((" Enter ", " view page "));
                    if app.hidden_evidence_count() > 0 {
                        hints.push((" m ", " more/less "));
                    }
                }
                FocusPane::Results | FocusPane::Search => {}
            }
            if app.viewer_page.is_some() {
                hints.push((" o ", " open "));
            }
            hints.extend([(" / ", " ask "), (" x ", " clear "), (" q ", " quit ")]);
            hints
        }
    };

    for (key, label) in hints {
        spans.push(Span::styled(key, key_style));
        spans.push(Span::styled(label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
