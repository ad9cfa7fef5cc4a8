use chatline::clock::Freshness;
use chatline::{ChatController, ChatObserver, ConnectionState, Message, StoreChange, TransportError};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

mod history_file;
mod protocol;
mod transport;

use transport::WsTransport;

/// How often the idle timeout is re-checked while the prompt sits unused.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "chatline")]
#[command(about = "Chatline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Chat with the gateway over a streaming WebSocket connection (interactive).
    Chat {
        /// Config file path (default: CHATLINE_CONFIG_PATH or ~/.chatline/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Resume a past conversation from a history JSON file ({topicId, sessionId, messages}).
        #[arg(long, value_name = "FILE")]
        history: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("chatline {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Chat { config, history }) => {
            if let Err(e) = run_chat(config, history).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Prints the conversation to stdout, streaming answer text as it arrives.
#[derive(Default)]
struct ConsoleObserver {
    /// Bytes of the last message already written to stdout.
    printed: usize,
}

impl ChatObserver for ConsoleObserver {
    fn messages_changed(&mut self, change: &StoreChange, messages: &[Message]) {
        match change {
            StoreChange::Appended { index } => {
                if let Some(m) = messages.get(*index) {
                    if !m.is_user {
                        print!("< ");
                    }
                }
                self.printed = 0;
            }
            StoreChange::ReplacedLast => {
                if let Some(m) = messages.last() {
                    if let Some(delta) = m.text.get(self.printed..) {
                        print!("{}", delta);
                    }
                    self.printed = m.text.len();
                }
            }
            StoreChange::ReplacedById { id } => {
                if let Some(m) = messages.iter().find(|m| &m.id == id) {
                    println!("[rated {} -> {}]", m.id, m.feedback_rating.unwrap_or_default());
                }
            }
            StoreChange::Reset => {
                println!("-- conversation ({} messages) --", messages.len());
                for m in messages {
                    print_message(m);
                }
                self.printed = messages.last().map(|m| m.text.len()).unwrap_or(0);
            }
        }
    }

    fn scroll_to_bottom(&mut self) {
        let _ = std::io::stdout().flush();
    }

    fn show_chat_surface(&mut self) {
        println!("-- incoming message --");
    }

    fn hide_chat_surface(&mut self) {
        println!("-- chat closed --");
    }

    fn connection_state_changed(&mut self, state: ConnectionState) {
        log::info!("connection {:?}", state);
        if state == ConnectionState::Connected {
            println!("-- connected --");
        }
    }

    fn transport_error(&mut self, error: &TransportError) {
        eprintln!("connection error: {}", error);
    }
}

fn print_message(m: &Message) {
    let who = if m.is_user { ">" } else { "<" };
    match m.feedback_rating {
        Some(r) => println!("{} {} [{}] (rated {})", who, m.text, m.id, r),
        None => println!("{} {} [{}]", who, m.text, m.id),
    }
}

enum Input {
    Line(Option<String>),
    Event(Option<chatline::TransportEvent>),
    Tick,
}

async fn run_chat(config_path: Option<PathBuf>, history: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = chatline::config::load_config(config_path)?;
    let url = chatline::config::resolve_gateway_url(&config);
    log::info!("using gateway {}", url);

    let mut controller = ChatController::new(WsTransport::new(url))
        .with_observer(ConsoleObserver::default())
        .with_idle_timeout(config.session.idle_timeout());

    match history {
        Some(path) => {
            let exchange = history_file::load(&path)?;
            controller.load_exchange(&exchange);
        }
        None => controller.ensure_connected(),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(SESSION_CHECK_INTERVAL);
    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            event = controller.next_event() => Input::Event(event),
            _ = ticker.tick() => Input::Tick,
        };
        match input {
            Input::Line(None) | Input::Event(None) => break,
            Input::Line(Some(line)) => {
                if !handle_line(&mut controller, line.trim()) {
                    break;
                }
            }
            Input::Event(Some(event)) => {
                let ends_answer = matches!(event, chatline::TransportEvent::End { .. });
                controller.handle_event(event);
                if ends_answer {
                    println!();
                }
            }
            Input::Tick => {
                if controller.freshness() == Freshness::Expired {
                    controller.ensure_connected();
                }
            }
        }
    }

    controller.close();
    Ok(())
}

/// Handle one input line. Returns false when the user asked to quit.
fn handle_line(controller: &mut ChatController<WsTransport>, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match command {
        "/quit" | "/exit" => return false,
        "/close" => controller.close(),
        "/new" => {
            controller.rotate_session();
            controller.ensure_connected();
        }
        "/history" => {
            println!("topic {} session {}", controller.topic_id(), controller.session_id().unwrap_or("-"));
            for m in controller.messages() {
                print_message(m);
            }
        }
        "/incoming" => {
            controller.ensure_connected();
            controller.handle_external_incoming(rest);
        }
        "/feedback" => match parse_feedback(rest) {
            Some((id, rating)) => controller.submit_feedback(id, rating),
            None => eprintln!("usage: /feedback <message-id> <rating>"),
        },
        "/rate" => match rest.split_once(' ') {
            Some((rating, text)) => match rating.parse::<i32>() {
                Ok(rating) => {
                    if ensure_ready(controller) {
                        controller.send_user_message_by_feedback(text, rating);
                    }
                }
                Err(_) => eprintln!("usage: /rate <rating> <text>"),
            },
            None => eprintln!("usage: /rate <rating> <text>"),
        },
        _ => {
            if ensure_ready(controller) {
                controller.send_user_message(line);
            }
        }
    }
    true
}

fn parse_feedback(rest: &str) -> Option<(&str, i32)> {
    let (id, rating) = rest.split_once(' ')?;
    Some((id, rating.trim().parse().ok()?))
}

/// Connect (rotating an idle conversation) and report whether a send can go out now.
fn ensure_ready(controller: &mut ChatController<WsTransport>) -> bool {
    controller.ensure_connected();
    if controller.connection_state() != ConnectionState::Connected {
        eprintln!("not connected yet; message not sent");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_feedback_needs_id_and_number() {
        assert_eq!(parse_feedback("a1 5"), Some(("a1", 5)));
        assert_eq!(parse_feedback("a1"), None);
        assert_eq!(parse_feedback("a1 x"), None);
    }
}
