use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use futures_util::StreamExt;

mod app;
mod client;
mod config;
mod error;
mod evidence;
mod format;
mod handler;
mod logging;
mod record;
mod session;
mod stream;
mod tui;
mod ui;

use app::App;
use client::QueryClient;
use config::Config;
use error::QueryError;
use logging::LogTarget;
use session::{Phase, QuerySession, SessionUpdate};

#[derive(Parser)]
#[command(name = "smartvote")]
#[command(about = "Ask questions about the Liberal platform and see the evidence behind each answer")]
#[command(version)]
struct Cli {
    /// Query service base URL (overrides config and SMARTVOTE_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive terminal UI (default)
    Tui,
    /// Stream one question and print the analysis
    Ask {
        /// Your question
        question: String,
        /// Print the analysis as the HTML fragments the web client renders
        #[arg(long)]
        html: bool,
        /// Escape markup found in the analysis text (with --html)
        #[arg(long, requires = "html")]
        escape: bool,
    },
    /// Check the query service
    Health,
    /// Ask the query service to drop its response cache
    ClearCache,
    /// Write the current settings to the config file and print its path
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalysisOutput {
    Text,
    Html,
    EscapedHtml,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => run_tui(config).await?,
        Commands::Ask {
            question,
            html,
            escape,
        } => {
            let output = match (html, escape) {
                (false, _) => AnalysisOutput::Text,
                (true, false) => AnalysisOutput::Html,
                (true, true) => AnalysisOutput::EscapedHtml,
            };
            ask(&config, &question, output).await?
        }
        Commands::Health => health(&config).await?,
        Commands::ClearCache => clear_cache(&config).await?,
        Commands::Config => {
            config.save()?;
            println!("{}", Config::get_config_path()?.display());
        }
    }

    Ok(())
}

async fn run_tui(config: Config) -> Result<()> {
    let _guard = logging::init(LogTarget::File)?;
    tracing::info!(server = %config.server_url, "starting terminal UI");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = tui::EventHandler::new();
    let mut app = App::new(&config, events.sender());

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event)?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Some(task) = app.stream_task.take() {
        task.abort();
    }
    tui::restore()?;
    result
}

async fn ask(config: &Config, question: &str, output: AnalysisOutput) -> Result<()> {
    let _guard = logging::init(LogTarget::Stderr)?;
    let client = QueryClient::from_config(config);
    let mut session = QuerySession::new();

    let Some(id) = session.submit(question) else {
        anyhow::bail!("question is empty");
    };

    println!("{} {}", "Q:".bold().blue(), question.bold());

    let stream = match client.stream_query(question).await {
        Ok(stream) => stream,
        Err(e) => {
            session.apply(id, SessionUpdate::Transport(e.to_string()));
            return report(&session, config, output);
        }
    };
    futures_util::pin_mut!(stream);

    let mut last_step = None;
    while session.is_loading() {
        let update = match stream.next().await {
            Some(item) => SessionUpdate::from(item),
            None => SessionUpdate::Finished,
        };
        session.apply(id, update);

        if let Some(step) = session.step() {
            if last_step.as_ref() != Some(step) {
                println!("{}", format!("{}...", step.label()).dimmed());
                last_step = Some(step.clone());
            }
        }
    }

    report(&session, config, output)
}

fn report(session: &QuerySession, config: &Config, output: AnalysisOutput) -> Result<()> {
    // An errored session reports only its error
    if session.phase() != Phase::Complete {
        let message = session.error().unwrap_or("query did not complete").to_string();
        return Err(QueryError::Backend(message).into());
    }

    let items = session.evidence();
    if !items.is_empty() {
        println!("\n{}", "Supporting evidence".bold().cyan());
        for (rank, item) in items.iter().enumerate() {
            let label = match item.band() {
                evidence::ConfidenceBand::High => item.score_label().green(),
                evidence::ConfidenceBand::Medium => item.score_label().yellow(),
                evidence::ConfidenceBand::Low => item.score_label().red(),
            };
            println!(
                "{:>3}. {} {} {}",
                rank + 1,
                label,
                format!("[p. {}]", item.page).dimmed(),
                item.text
            );
            println!(
                "     {}",
                evidence::page_url(&config.document_url(), item.page).dimmed()
            );
        }
    }

    if let Some(analysis) = session.analysis() {
        println!("\n{}", "Analysis".bold().cyan());
        let rendered = match output {
            AnalysisOutput::Text => plain_text(&format::Document::parse(&analysis.response)),
            AnalysisOutput::Html => format::to_html(&analysis.response),
            AnalysisOutput::EscapedHtml => format::Document::parse(&analysis.response).to_html(),
        };
        println!("{}", rendered);
    }
    Ok(())
}

fn runs(inlines: &[format::Inline]) -> String {
    inlines.iter().map(|run| run.text()).collect()
}

/// Render a formatted document as plain terminal text
fn plain_text(doc: &format::Document) -> String {
    doc.blocks
        .iter()
        .map(|block| match block {
            format::Block::Heading { content, .. } => runs(content).bold().to_string(),
            format::Block::List { ordered, items } => items
                .iter()
                .enumerate()
                .map(|(n, item)| {
                    if *ordered {
                        format!("{}. {}", n + 1, runs(item))
                    } else {
                        format!("• {}", runs(item))
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
            format::Block::Paragraph(lines) => lines
                .iter()
                .map(|line| runs(line.as_slice()))
                .collect::<Vec<_>>()
                .join("\n"),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn health(config: &Config) -> Result<()> {
    let client = QueryClient::from_config(config);
    let status = client.health().await?;
    println!(
        "{} {} {}",
        client.base_url().bold(),
        status.status.green(),
        status.message.dimmed()
    );
    Ok(())
}

async fn clear_cache(config: &Config) -> Result<()> {
    let client = QueryClient::from_config(config);
    let status = client.clear_cache().await?;
    println!("{} {}", status.status.green(), status.message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StreamRecord;

    fn record(line: &str) -> SessionUpdate {
        SessionUpdate::Record(StreamRecord::parse(line).unwrap())
    }

    #[test]
    fn test_report_on_error_returns_only_the_error() {
        let mut session = QuerySession::new();
        let id = session.submit("housing").unwrap();
        session.apply(id, record(r#"{"status":"partial","step":"documents_ready","similar_documents":[{"text":"a","score":0.9,"page":3}]}"#));
        session.apply(id, record(r#"{"status":"error","message":"boom"}"#));

        let err = report(&session, &Config::new(), AnalysisOutput::Text).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_plain_text_drops_markup() {
        let doc = format::Document::parse("- **a**\n- b\n\ntext *here*");
        assert_eq!(plain_text(&doc), "• a\n• b\n\ntext here");
    }
}
