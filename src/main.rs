use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loqa_assistant::chat::{
    new_session_id, ChatEvent, ChatServices, IgnoreReason, ListenOutcome, Role, SubmitOutcome,
};
use loqa_assistant::{
    create_router, AppState, ChatController, CommandSynthesizer, Config, FileHistoryStore,
    GeminiBackend, HistoryStore, MemoryHistoryStore, NatsSpeechInput, SpeechInputCapability,
    SpeechOutput,
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "loqa-assistant", version, about = "Conversational assistant with speech in and out")]
struct Cli {
    /// Config file (without extension)
    #[arg(long, default_value = "config/loqa-assistant")]
    config: String,

    /// Keep the transcript in memory only
    #[arg(long)]
    no_persist: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP control API (default)
    Serve,
    /// Chat in the terminal
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loqa Assistant v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    // Missing credentials stop us here.
    let backend = GeminiBackend::from_config(&cfg.gemini)?;

    let session_id = new_session_id();
    let services = build_services(&cfg, &cli, &session_id).await?;
    let chat = Arc::new(
        ChatController::start(&backend, &cfg.gemini.system_instruction, session_id, services)
            .await?,
    );

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cfg, Arc::clone(&chat)).await,
        Command::Chat => repl(Arc::clone(&chat)).await,
    };

    chat.shutdown().await;
    result
}

async fn build_services(cfg: &Config, cli: &Cli, session_id: &str) -> Result<ChatServices> {
    let history: Arc<dyn HistoryStore> = if cli.no_persist {
        Arc::new(MemoryHistoryStore::new())
    } else {
        info!("Chat history: {}", cfg.history.path.display());
        Arc::new(FileHistoryStore::at_path(&cfg.history.path))
    };

    let speech_input = match &cfg.speech.nats_url {
        Some(url) => match NatsSpeechInput::connect(url, session_id.to_string()).await {
            Ok(input) => SpeechInputCapability::Available(Box::new(input)),
            Err(e) => {
                warn!("Speech input disabled: {:#}", e);
                SpeechInputCapability::Unavailable
            }
        },
        None => SpeechInputCapability::Unavailable,
    };

    let speech_output = match &cfg.speech.synthesizer {
        Some(command) => SpeechOutput::new(Box::new(CommandSynthesizer::from_command_line(
            command,
        )?)),
        None => SpeechOutput::unavailable(),
    };

    Ok(ChatServices {
        history,
        speech_input,
        speech_output,
    })
}

async fn serve(cfg: &Config, chat: Arc<ChatController>) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(AppState::new(chat)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
        .context("HTTP server failed")
}

async fn repl(chat: Arc<ChatController>) -> Result<()> {
    for turn in chat.transcript().await {
        print_turn(turn.role, &turn.text);
    }
    println!("(commands: /listen, /mute, /quit)");

    tokio::spawn(print_events(chat.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/mute" => {
                let muted = chat.toggle_mute().await;
                println!("(muted: {})", muted);
            }
            "/listen" => match chat.toggle_listen().await {
                ListenOutcome::Started => println!("(listening, /listen again to stop)"),
                ListenOutcome::Stopped => println!("(stopped listening)"),
                _ => {}
            },
            // Enter on an empty line sends whatever speech filled in.
            "" => spawn_submit(&chat, None),
            _ => spawn_submit(&chat, Some(line)),
        }
    }

    Ok(())
}

/// Run an exchange off the input loop so commands stay live while it streams
fn spawn_submit(chat: &Arc<ChatController>, text: Option<String>) {
    let chat = Arc::clone(chat);
    tokio::spawn(async move {
        let outcome = match text {
            Some(text) => chat.submit_text(text).await,
            None => chat.submit().await,
        };
        if outcome == SubmitOutcome::Ignored(IgnoreReason::Busy) {
            eprintln!("[still replying, message not sent]");
        }
    });
}

fn print_turn(role: Role, text: &str) {
    match role {
        Role::User => println!("you> {}", text),
        Role::Model => println!("ai> {}", text),
    }
}

async fn print_events(mut rx: tokio::sync::broadcast::Receiver<ChatEvent>) {
    let mut current: Option<usize> = None;
    let mut shown = String::new();

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                warn!("Renderer skipped {} events", n);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            ChatEvent::TurnUpdated { index, turn } if turn.role == Role::Model => {
                if current != Some(index) {
                    current = Some(index);
                    shown.clear();
                    print!("ai> ");
                }
                match turn.text.strip_prefix(shown.as_str()) {
                    Some(delta) => print!("{}", delta),
                    None => print!("\nai> {}", turn.text),
                }
                shown = turn.text;
                std::io::stdout().flush().ok();
            }
            ChatEvent::StateChanged(loqa_assistant::InteractionState::Idle) if current.is_some() => {
                println!();
                current = None;
            }
            ChatEvent::InputChanged(text) if !text.is_empty() => {
                print!("\r(heard) {}", text);
                std::io::stdout().flush().ok();
            }
            ChatEvent::Notice(notice) => eprintln!("[{}]", notice),
            _ => {}
        }
    }
}
