//! Interactive terminal client for rehearsing a sales script
//!
//! Usage: `script-chat-tester <manager|client|auto> <script-file> [objections.json]`
//!
//! Talks to the composer at `SCRIPT_CHAT_URL`. Lines starting with `/` are
//! commands; anything else is sent as your next line in the conversation.

use script_chat::api::ConversationMode;
use script_chat::runtime::{ChatEvent, HttpScriptChat, HttpTransport, StaticScript, TransportConfig};
use script_chat::state_machine::Role;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str =
    "usage: script-chat-tester <manager|client|auto> <script-file> [objections.json]";

const HELP: &str = "commands: /start  /continue  /reset  /mode <manager|client|auto>  /help  /quit";

#[derive(Debug, PartialEq)]
enum Command {
    Start,
    Continue,
    Reset,
    Mode(String),
    Help,
    Quit,
    Send(String),
    Nothing,
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            return if line.is_empty() {
                Command::Nothing
            } else {
                Command::Send(line.to_string())
            };
        };

        let mut parts = command.splitn(2, char::is_whitespace);
        match parts.next().unwrap_or_default() {
            "start" => Command::Start,
            "continue" => Command::Continue,
            "reset" => Command::Reset,
            "mode" => Command::Mode(parts.next().unwrap_or_default().trim().to_string()),
            "quit" | "exit" => Command::Quit,
            _ => Command::Help,
        }
    }
}

/// What the model is called in the transcript
fn speaker(mode: ConversationMode) -> Option<&'static str> {
    match mode {
        ConversationMode::Client => Some("Клиент"),
        ConversationMode::Manager => Some("Менеджер"),
        // The dialogue carries its own speaker labels
        ConversationMode::Auto => None,
    }
}

async fn print_events(mut mode: ConversationMode, rx: broadcast::Receiver<ChatEvent>) {
    let mut events = BroadcastStream::new(rx);
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        let Ok(event) = event else {
            tracing::warn!("Transcript lagged behind");
            continue;
        };
        match event {
            ChatEvent::MessageAppended(message) if message.role == Role::Assistant => {
                match speaker(mode) {
                    Some(name) => print!("{name}: {}", message.content),
                    None => print!("{}", message.content),
                }
            }
            ChatEvent::MessageAppended(_) => {}
            ChatEvent::FragmentAppended { text, .. } => print!("{text}"),
            ChatEvent::LoadingChanged(false) => println!("\n"),
            ChatEvent::LoadingChanged(true) => {}
            ChatEvent::Cleared => println!("--- new conversation ---"),
            ChatEvent::ModeChanged(new_mode) => {
                mode = new_mode;
                println!("--- mode: {mode} ---");
            }
        }
        let _ = stdout.flush();
    }
}

enum Turn {
    Start,
    Continue,
    Send(String),
}

/// Run a turn in the background so `/reset` stays responsive while it streams
fn spawn_turn(chat: &Arc<HttpScriptChat>, turn: Turn) {
    let chat = Arc::clone(chat);
    tokio::spawn(async move {
        let outcome = match turn {
            Turn::Start => chat.start().await,
            Turn::Continue => chat.continue_auto().await,
            Turn::Send(text) => chat.send(&text).await,
        };
        tracing::debug!(?outcome, "Turn finished");
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they stay out of the transcript
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "script_chat=warn".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (mode, script_path, objections_path) = match args.as_slice() {
        [mode, script] => (mode, script, None),
        [mode, script, objections] => (mode, script, Some(objections)),
        _ => return Err(USAGE.into()),
    };
    let mode: ConversationMode = mode.parse()?;
    let script = StaticScript::from_files(
        Path::new(script_path),
        objections_path.map(|p| Path::new(p.as_str())),
    )?;

    let transport = HttpTransport::new(TransportConfig::from_env())?;
    let chat = Arc::new(HttpScriptChat::new(mode, transport, Arc::new(script)));
    let printer = tokio::spawn(print_events(mode, chat.subscribe()));

    println!("mode: {mode}");
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Start => spawn_turn(&chat, Turn::Start),
            Command::Continue => spawn_turn(&chat, Turn::Continue),
            Command::Send(text) => spawn_turn(&chat, Turn::Send(text)),
            Command::Reset => chat.reset(),
            Command::Mode(name) => match name.parse() {
                Ok(mode) => chat.set_mode(mode),
                Err(e) => eprintln!("{e}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Nothing => {}
        }
    }

    chat.reset();
    printer.abort();
    Ok(())
}
