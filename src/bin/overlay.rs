//! Terminal front-end for the overlay client.
//!
//! Stands in for the desktop UI: subtitles, assistant state and history go
//! to stdout, user input comes from stdin. All tracing/diagnostic output goes
//! to stderr (and optionally a daily log file) so stdout stays readable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use neuro::config::NeuroConfig;
use neuro::playback::output_for;
use neuro::runtime::RuntimeEvent;
use neuro::sinks::{
    AvatarSink, ConversationHistory, Expression, HistoryEntry, HistorySink, Role, SubtitleSink,
};
use neuro::{AssistantState, FileUpload, Session, SessionSinks, UserAction};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Action channel capacity between the stdin reader and the session.
const ACTION_CAPACITY: usize = 32;

/// Runtime event broadcast capacity.
const EVENT_CAPACITY: usize = 64;

/// Neuro overlay: chat with the assistant backend from a terminal.
#[derive(Parser)]
#[command(name = "neuro-overlay", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend WebSocket URL (overrides the config file).
    #[arg(short, long)]
    url: Option<String>,

    /// Never play speech audio; every reply uses the reading delay.
    #[arg(long)]
    text_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => NeuroConfig::from_file(path)?,
        None => {
            let path = NeuroConfig::default_config_path();
            if path.exists() {
                NeuroConfig::from_file(&path)?
            } else {
                NeuroConfig::default()
            }
        }
    };
    if let Some(url) = cli.url {
        config.socket.url = url;
    }
    if cli.text_only {
        config.audio.enabled = false;
    }

    let log_guard = init_tracing(&config);
    info!(url = %config.socket.url, "neuro-overlay starting");

    let history = Arc::new(ConversationHistory::new());
    let terminal = Arc::new(Terminal {
        history: Arc::clone(&history),
    });
    let sinks = SessionSinks {
        avatar: terminal.clone(),
        subtitles: terminal.clone(),
        history: terminal,
        audio: output_for(&config.audio),
    };

    let (events_tx, events_rx) = broadcast::channel(EVENT_CAPACITY);
    let mut session = Session::open(&config, sinks, Some(events_tx)).await?;
    tokio::spawn(print_runtime_events(events_rx));

    let (actions_tx, actions_rx) = mpsc::channel(ACTION_CAPACITY);

    let ctrlc_tx = actions_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            let _ = ctrlc_tx.send(UserAction::Shutdown).await;
        }
    });
    tokio::spawn(read_commands(actions_tx, history));

    println!("Neuro overlay v{}", env!("CARGO_PKG_VERSION"));
    println!("Type a message and press Enter. /interrupt, /file, /voice, /history, /quit.\n");

    let code = match session.run(actions_rx).await.into_result() {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "neuro-overlay exited with error");
            eprintln!("{e}. Restart the overlay to reconnect.");
            1
        }
    };

    info!("neuro-overlay shut down");
    drop(log_guard);
    // The stdin reader may be parked in a blocking read that would stall
    // runtime shutdown.
    std::process::exit(code);
}

/// Install the stderr subscriber, plus a daily rolling file when enabled.
fn init_tracing(config: &NeuroConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if config.logging.file {
        let appender =
            tracing_appender::rolling::daily(neuro::neuro_dirs::logs_dir(), "neuro-overlay.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

/// Stdout rendition of the avatar, subtitle line and history panel.
struct Terminal {
    history: Arc<ConversationHistory>,
}

impl AvatarSink for Terminal {
    fn show_expression(&self, expression: &Expression, active: bool) {
        if active {
            println!("  (avatar: {})", expression.name);
        }
    }

    fn reset_expression(&self) {}
}

impl SubtitleSink for Terminal {
    fn set_subtitle(&self, text: &str) {
        if !text.is_empty() {
            println!("» {text}");
        }
    }
}

impl HistorySink for Terminal {
    fn append(&self, entry: HistoryEntry) {
        if entry.role == Role::System {
            println!("[system] {}", entry.content);
        }
        self.history.append(entry);
    }
}

async fn print_runtime_events(mut events: broadcast::Receiver<RuntimeEvent>) {
    loop {
        match events.recv().await {
            Ok(RuntimeEvent::AssistantState(AssistantState::Thinking)) => {
                println!("  (thinking...)");
            }
            Ok(RuntimeEvent::AssistantState(_)) => {}
            Ok(RuntimeEvent::Connection(status)) => println!("  [{status}]"),
            Ok(RuntimeEvent::Interrupted) => println!("  (interrupted)"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(lagged = n, "runtime event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// One parsed stdin line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Text(String),
    Interrupt,
    File {
        path: PathBuf,
        media_type: Option<String>,
    },
    Voice(PathBuf),
    History,
    Quit,
    Invalid(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Text(line.to_owned()));
    };

    let mut parts = rest.split_whitespace();
    let command = match parts.next().unwrap_or_default() {
        "interrupt" | "stop" => Command::Interrupt,
        "history" => Command::History,
        "quit" | "exit" => Command::Quit,
        "file" => match parts.next() {
            Some(path) => Command::File {
                path: PathBuf::from(path),
                media_type: parts.next().map(str::to_owned),
            },
            None => Command::Invalid("usage: /file <path> [media-type]".into()),
        },
        "voice" => match parts.next() {
            Some(path) => Command::Voice(PathBuf::from(path)),
            None => Command::Invalid("usage: /voice <path>".into()),
        },
        other => Command::Invalid(format!("unknown command: /{other}")),
    };
    Some(command)
}

/// Media type from a file extension, for uploads that do not declare one.
fn guess_media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Read stdin line-by-line and forward user actions to the session.
async fn read_commands(actions: mpsc::Sender<UserAction>, history: Arc<ConversationHistory>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("stdin closed (EOF); shutting down");
                break;
            }
            Err(e) => {
                warn!("failed to read from stdin: {e}");
                break;
            }
        };

        let action = match parse_command(&line) {
            None => continue,
            Some(Command::Text(text)) => UserAction::SubmitText(text),
            Some(Command::Interrupt) => UserAction::Interrupt,
            Some(Command::Quit) => break,
            Some(Command::History) => {
                for entry in history.snapshot() {
                    println!(
                        "{} {:>9}: {}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.role.as_str(),
                        entry.content
                    );
                }
                continue;
            }
            Some(Command::Invalid(message)) => {
                eprintln!("{message}");
                continue;
            }
            Some(Command::File { path, media_type }) => match load_upload(&path, media_type).await {
                Ok(file) => UserAction::SubmitFile(file),
                Err(e) => {
                    eprintln!("cannot read {}: {e}", path.display());
                    continue;
                }
            },
            Some(Command::Voice(path)) => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    if actions.send(UserAction::BeginRecording).await.is_err() {
                        break;
                    }
                    UserAction::SubmitRecording(Bytes::from(bytes))
                }
                Err(e) => {
                    eprintln!("cannot read {}: {e}", path.display());
                    continue;
                }
            },
        };

        if actions.send(action).await.is_err() {
            break;
        }
    }

    let _ = actions.send(UserAction::Shutdown).await;
}

async fn load_upload(path: &Path, media_type: Option<String>) -> std::io::Result<FileUpload> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let media_type = media_type.unwrap_or_else(|| guess_media_type(path).to_owned());
    Ok(FileUpload::new(name, media_type, Bytes::from(bytes)))
}
