use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use funnair_core::{
    exchange, BookingClient, ChatId, ChatMessage, ChatMode, ChatRole, ChatSession, Config, Step, Transcript,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use logging::LogLevel;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "funnair")]
#[command(version, about = "Manage Funnair flight bookings and chat with the travel assistant")]
struct Cli {
    /// Booking service URL (overrides FUNNAIR_API_URL and the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log file path
    #[arg(long, global = true, env = "FUNNAIR_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log level (FUNNAIR_LOG takes a full filter instead)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all bookings
    Bookings,
    /// Ask the assistant one question and print the streamed reply
    Ask {
        /// Your question
        question: String,
        /// Ask the fare and policy assistant instead
        #[arg(short, long)]
        policy: bool,
    },
    /// Check that the booking service is up
    Health,
    /// Write the config file from the current settings
    Init {
        /// Replace an existing config file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let level = cli
        .log_level
        .or_else(|| config.log_level.as_deref().and_then(LogLevel::parse))
        .unwrap_or_default();
    let log_path = match cli.log_file {
        Some(path) => path,
        None => logging::default_log_path()?,
    };
    let _log_guard = logging::init(level, &log_path)?;

    let base_url = config.resolve_api_url(cli.api_url.as_deref());
    let client = BookingClient::with_timeout(&base_url, config.request_timeout());
    info!(%base_url, "funnair starting");

    match cli.command {
        None => run_tui(client).await,
        Some(Commands::Bookings) => list_bookings(&client).await,
        Some(Commands::Ask { question, policy }) => {
            let mode = if policy { ChatMode::Policy } else { ChatMode::Assistant };
            ask(&client, mode, &question).await
        }
        Some(Commands::Health) => {
            let health = client.health().await?;
            println!("{}: {}", health.service, health.status);
            Ok(())
        }
        Some(Commands::Init { force }) => {
            let path = Config::get_config_path()?;
            let saved = Config {
                api_base_url: Some(base_url),
                request_timeout_secs: Some(config.request_timeout().as_secs()),
                log_level: Some(level.as_str().to_string()),
            };
            write_config(&saved, &path, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

async fn run_tui(client: BookingClient) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let mut app = App::new(client, ChatId::new(), events.sender());
    app.load_bookings();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;

    app.shutdown();
    tui::restore()?;
    if let Err(err) = &result {
        error!(error = %err, "tui exited with an error");
    }
    result
}

async fn list_bookings(client: &BookingClient) -> Result<()> {
    let bookings = client.get_bookings().await?;
    if bookings.is_empty() {
        println!("No bookings found.");
        return Ok(());
    }
    for b in &bookings {
        println!(
            "{:<6} {:<22} {:<11} {:<13} {:<4} {:<9} {}",
            b.booking_number,
            b.passenger_name(),
            b.route(),
            b.short_date(),
            b.seat_number,
            b.booking_status.as_str(),
            b.class_label(),
        );
    }
    Ok(())
}

async fn ask(client: &BookingClient, mode: ChatMode, question: &str) -> Result<()> {
    let mut session = ChatSession::new(ChatId::new());
    let cancel = CancellationToken::new();

    // Ctrl-C stops the reply and keeps what already printed
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    let chat_id = *session.chat_id();
    let mut printer = ReplyPrinter::default();
    let mut stdout = std::io::stdout();
    let step = exchange(
        &mut session,
        question,
        |message| async move { client.chat_stream(mode, &message, &chat_id, cancel).await },
        |transcript| {
            let _ = printer.update(transcript, &mut stdout);
        },
        || {},
    )
    .await?;
    println!();

    match step {
        Step::Failed => bail!("the assistant could not answer"),
        _ => Ok(()),
    }
}

fn write_config(config: &Config, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    config.save_to(path)
}

/// Echoes the assistant reply to a terminal as it grows
#[derive(Default)]
struct ReplyPrinter {
    shown: Option<ChatMessage>,
}

impl ReplyPrinter {
    fn update(&mut self, transcript: &Transcript, out: &mut impl Write) -> std::io::Result<()> {
        let Some(last) = transcript.last() else { return Ok(()) };
        if last.role != ChatRole::Assistant {
            return Ok(());
        }

        match &self.shown {
            // same message, grown in place
            Some(shown) if shown.id == last.id && last.content.starts_with(shown.content.as_str()) => {
                write!(out, "{}", &last.content[shown.content.len()..])?;
            }
            // a different message took its place (the error reply)
            Some(shown) if !shown.content.is_empty() => write!(out, "\n{}", last.content)?,
            _ => write!(out, "{}", last.content)?,
        }
        out.flush()?;
        self.shown = Some(last.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnair_core::{ApiError, StreamItem, ERROR_REPLY};

    fn printed(out: &[u8]) -> String {
        String::from_utf8(out.to_vec()).unwrap()
    }

    #[test]
    fn test_reply_printer_streams_growth() {
        let mut session = ChatSession::new(ChatId::new());
        let mut printer = ReplyPrinter::default();
        let mut out = Vec::new();

        session.submit("Show my bookings").unwrap();
        printer.update(session.transcript(), &mut out).unwrap();
        session.begin_response();
        printer.update(session.transcript(), &mut out).unwrap();
        for part in ["Your ", "booking is ", "CONFIRMED."] {
            session.apply_item(StreamItem::Fragment(part.to_string()));
            printer.update(session.transcript(), &mut out).unwrap();
        }

        assert_eq!(printed(&out), "Your booking is CONFIRMED.");
    }

    #[test]
    fn test_reply_printer_error_replaces_partial() {
        let mut session = ChatSession::new(ChatId::new());
        let mut printer = ReplyPrinter::default();
        let mut out = Vec::new();

        session.submit("hi").unwrap();
        session.begin_response();
        session.apply_item(StreamItem::Fragment("Hello".to_string()));
        printer.update(session.transcript(), &mut out).unwrap();

        let err = ApiError::Stream(Box::new(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")));
        session.apply_error(&err);
        printer.update(session.transcript(), &mut out).unwrap();

        assert_eq!(printed(&out), format!("Hello\n{}", ERROR_REPLY));
    }

    #[test]
    fn test_reply_printer_error_before_any_text() {
        let mut session = ChatSession::new(ChatId::new());
        let mut printer = ReplyPrinter::default();
        let mut out = Vec::new();

        session.submit("hi").unwrap();
        session.begin_response();
        printer.update(session.transcript(), &mut out).unwrap();

        let err = ApiError::Stream(Box::new(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")));
        session.apply_error(&err);
        printer.update(session.transcript(), &mut out).unwrap();

        assert_eq!(printed(&out), ERROR_REPLY);
    }

    #[test]
    fn test_write_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funnair").join("config.json");
        let config = Config {
            api_base_url: Some("http://bookings.internal:9000".to_string()),
            request_timeout_secs: Some(10),
            log_level: Some("info".to_string()),
        };

        write_config(&config, &path, false).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        let changed = Config { request_timeout_secs: Some(60), ..config.clone() };
        assert!(write_config(&changed, &path, false).is_err());
        assert_eq!(Config::load_from(&path).unwrap(), config);

        write_config(&changed, &path, true).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), changed);
    }
}
