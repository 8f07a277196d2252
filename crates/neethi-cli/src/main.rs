//! neethi - terminal chat client for a locally hosted LLM backend

mod commands;
mod config;
mod utils;

use clap::Parser;
use neethi_api::{ChatClient, Role};
use neethi_chat::{ChatSession, LocalStorage, NoticeLevel, SessionEvent};
use std::future::Future;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use commands::{CommandResult, ModelCommand};

/// neethi - chat with a local LLM backend
#[derive(Parser, Debug)]
#[command(name = "neethi")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL (default: http://localhost:8000)
    #[arg(long)]
    api_url: Option<String>,

    /// Model to use (default: qwen/qwen3-4b)
    #[arg(short, long)]
    model: Option<String>,

    /// Provider tag passed to the backend (default: llamacpp)
    #[arg(short, long)]
    provider: Option<String>,

    /// Sampling temperature
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Maximum tokens per reply
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Directory holding conversations and preferences
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Send a single message and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Wait for complete replies instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

impl Args {
    /// Flags take precedence over the config file and environment
    fn merge_into(&self, cfg: &mut config::Config) {
        if let Some(ref url) = self.api_url {
            cfg.api_url = Some(url.clone());
        }
        if let Some(ref model) = self.model {
            cfg.model = Some(model.clone());
        }
        if let Some(ref provider) = self.provider {
            cfg.provider = Some(provider.clone());
        }
        if self.temperature.is_some() {
            cfg.temperature = self.temperature;
        }
        if self.max_tokens.is_some() {
            cfg.max_tokens = self.max_tokens;
        }
        if let Some(ref dir) = self.data_dir {
            cfg.data_dir = Some(dir.clone());
        }
        if self.no_stream {
            cfg.stream = Some(false);
        }
    }
}

/// How long an aborted reply may take to wind down before Ctrl-C exits
const ABORT_GRACE: Duration = Duration::from_secs(2);

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("neethi=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let mut cfg = config::Config::load();
    args.merge_into(&mut cfg);

    let client = ChatClient::new(cfg.api_url());
    let data_dir = cfg.data_dir();
    tracing::debug!("Using backend {} and data dir {}", client.base_url(), data_dir.display());

    let session = ChatSession::new(
        Arc::new(client.clone()),
        LocalStorage::in_dir(data_dir),
        cfg.generation_options(),
    );
    let stream = cfg.stream.unwrap_or(true);

    // Ctrl-C aborts a running reply, or exits when idle
    let handle = session.handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !handle.is_busy() {
                std::process::exit(130);
            }
            handle.abort();
            if !handle.wait_for_idle_timeout(ABORT_GRACE).await {
                eprintln!("Reply did not stop, exiting.");
                std::process::exit(130);
            }
        }
    });

    if let Some(command) = args.command {
        return run_command(&session, &command, stream).await;
    }

    run_interactive(&session, &client, stream).await
}

async fn run_command(session: &ChatSession, command: &str, stream: bool) -> anyhow::Result<()> {
    let mut events = session.subscribe();
    if send(session, &mut events, command, stream).await.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_interactive(
    session: &ChatSession,
    client: &ChatClient,
    stream: bool,
) -> anyhow::Result<()> {
    let mut events = session.subscribe();

    // Show minimal startup info (only if TTY)
    if std::io::stderr().is_terminal() {
        let options = session.options();
        eprintln!("neethi ({}) @ {}", options.model, client.base_url());
        if let Some(conversation) = session.active_conversation() {
            eprintln!(
                "Resuming: {} ({} messages)",
                conversation.title,
                conversation.messages.len()
            );
        }
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            // EOF
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let Some(result) = commands::execute_command(input, session) else {
            let _ = send(session, &mut events, input, stream).await;
            continue;
        };

        match result {
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Exit => break,
            CommandResult::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
            CommandResult::Regenerate => {
                let regenerable = session
                    .active_conversation()
                    .is_some_and(|c| c.last_exchange().is_some());
                if regenerable {
                    let _ = drive(session.regenerate_last_message(), &mut events).await;
                } else {
                    println!("Nothing to regenerate.");
                }
            }
            CommandResult::ListModels => match client.list_models().await {
                Ok(models) => println!(
                    "{}",
                    ModelCommand::list_models_text(&session.options(), &models)
                ),
                Err(e) => report_backend_error("listing models", &e, client),
            },
            CommandResult::ProviderStatus => match client.provider_status().await {
                Ok(statuses) => println!("{}", ModelCommand::provider_status_text(&statuses)),
                Err(e) => report_backend_error("fetching provider status", &e, client),
            },
            CommandResult::ListPrompts => match client.list_prompts().await {
                Ok(prompts) => println!(
                    "{}",
                    ModelCommand::list_prompts_text(
                        session.options().system_prompt_id.as_deref(),
                        &prompts
                    )
                ),
                Err(e) => report_backend_error("listing prompts", &e, client),
            },
        }
    }

    Ok(())
}

fn report_backend_error(action: &str, e: &neethi_api::Error, client: &ChatClient) {
    eprintln!("Error {}: {}", action, e);
    if let Some(hint) = backend_hint(e, client.base_url()) {
        eprintln!("{}", hint);
    }
}

/// A next step for errors that usually mean a misconfigured backend
fn backend_hint(e: &neethi_api::Error, base_url: &str) -> Option<String> {
    if e.is_connection() {
        return Some(format!("Is the backend running at {}?", base_url));
    }
    match e.status() {
        Some(404) => Some(format!(
            "{} does not serve this endpoint; check --api-url.",
            base_url
        )),
        _ => None,
    }
}

async fn send(
    session: &ChatSession,
    events: &mut broadcast::Receiver<SessionEvent>,
    text: &str,
    stream: bool,
) -> neethi_chat::Result<()> {
    if stream {
        drive(session.send_message(text), events).await
    } else {
        drive(session.complete_once(text), events).await
    }
}

/// Run a session request while rendering its events as they arrive.
///
/// Every event of a request is broadcast before the request resolves, so
/// draining the receiver afterwards renders the rest.
async fn drive<F>(
    request: F,
    events: &mut broadcast::Receiver<SessionEvent>,
) -> neethi_chat::Result<()>
where
    F: Future<Output = neethi_chat::Result<()>>,
{
    tokio::pin!(request);
    let result = loop {
        tokio::select! {
            result = &mut request => break result,
            event = events.recv() => {
                if let Ok(event) = event {
                    render(&event);
                }
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        render(&event);
    }

    if let Err(neethi_chat::Error::Busy) = result {
        eprintln!("A reply is still being generated.");
    }
    result
}

fn render(event: &SessionEvent) {
    match event {
        SessionEvent::MessageUpdated { delta, .. } => {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }
        SessionEvent::StreamEnded { .. } => println!(),
        SessionEvent::MessageAppended { message, .. }
            if message.role == Role::Assistant && !message.is_streaming =>
        {
            println!("{}", message.content);
        }
        SessionEvent::Error { message } => eprintln!("Error: {}", message),
        SessionEvent::Notice {
            level: NoticeLevel::Error,
            message,
        } => eprintln!("[{}]", message),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_hint_for_missing_endpoint() {
        let e = neethi_api::Error::Status {
            status: 404,
            body: "Not Found".into(),
        };
        let hint = backend_hint(&e, "http://localhost:8000").unwrap();
        assert!(hint.contains("http://localhost:8000"));
        assert!(hint.contains("--api-url"));
    }

    #[test]
    fn test_backend_hint_skips_other_errors() {
        let e = neethi_api::Error::Status {
            status: 500,
            body: "boom".into(),
        };
        assert!(backend_hint(&e, "http://localhost:8000").is_none());
        let e = neethi_api::Error::Sse("bad frame".into());
        assert!(backend_hint(&e, "http://localhost:8000").is_none());
    }

    #[tokio::test]
    async fn test_backend_hint_for_refused_connection() {
        // Bind then drop a listener so the port refuses connections
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = ChatClient::new(&base_url);
        let e = client.list_models().await.unwrap_err();
        assert!(e.is_connection());
        let hint = backend_hint(&e, client.base_url()).unwrap();
        assert!(hint.contains("Is the backend running"));
    }
}
