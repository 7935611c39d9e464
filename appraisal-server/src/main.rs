use anyhow::{Context, Result};
use appraisal_core::{render_card, ImageRef, Turn, TurnStatus};
use appraisal_server::client::build_http_client;
use appraisal_server::prompt::find_template;
use appraisal_server::{
    generate_content_url, load_image, provider_from_env, start_server, AppState, AppraisalRequest,
    Conversation, ModelAdapter, ServerConfig, VertexAdapter, VertexClient, VertexConfig,
};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "appraiser", about = "Auction-style appraisals of a photographed item via Vertex AI Gemini")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP backend
    Serve {
        /// Address to listen on (overrides APPRAISER_BIND)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Appraise one item and print the result
    Appraise {
        /// Photo of the item
        #[arg(long)]
        image: Option<PathBuf>,
        /// Optional note or question
        #[arg(long)]
        text: Option<String>,
        /// Use a category template as the note (e.g. furniture, ceramics)
        #[arg(long, conflicts_with = "text")]
        template: Option<String>,
        /// Print the model's reply without formatting
        #[arg(long)]
        raw: bool,
    },
    /// Interactive chat on stdin
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env()?;

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            let adapter = build_adapter(&config).await?;
            start_server(config, AppState { adapter }).await?;
        }
        Command::Appraise {
            image,
            text,
            template,
            raw,
        } => {
            let note = match template {
                Some(name) => template_note(&name)?,
                None => text.unwrap_or_default(),
            };
            let conversation = Conversation::new(build_adapter(&config).await?);
            let turn = send_with_interrupt(&conversation, &note, image.as_deref()).await?;
            print_reply(&turn, raw);
        }
        Command::Chat => {
            let conversation = Conversation::new(build_adapter(&config).await?);
            run_chat(&conversation).await?;
        }
    }

    Ok(())
}

async fn build_adapter(config: &ServerConfig) -> Result<Arc<dyn ModelAdapter>> {
    let url = generate_content_url(&VertexConfig::from_env())?;
    let http = build_http_client(config)?;
    let tokens = provider_from_env(http.clone()).await?;

    info!("Model endpoint: {}", url);
    let client = VertexClient::with_client(http, url, tokens);
    Ok(Arc::new(VertexAdapter::new(client)))
}

fn template_note(name: &str) -> Result<String> {
    find_template(name)
        .map(|t| t.note.to_string())
        .with_context(|| format!("Unknown template: {}", name))
}

/// Send one message; Ctrl-C while waiting cancels it.
async fn send_with_interrupt(conversation: &Conversation, note: &str, image: Option<&Path>) -> Result<Turn> {
    let (payload, image_ref) = match image {
        Some(path) => {
            let payload = load_image(path).await?;
            let image_ref = ImageRef::new(path.display().to_string(), payload.mime_type.clone());
            (Some(payload), Some(image_ref))
        }
        None => (None, None),
    };
    let request = AppraisalRequest::new(note, payload)?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let turn = conversation.send(request, image_ref, cancel).await;
    watcher.abort();
    Ok(turn?)
}

fn print_reply(turn: &Turn, raw: bool) {
    let text = turn.text.as_deref().unwrap_or("");
    if raw || turn.status == TurnStatus::Cancelled {
        println!("{}", text);
    } else {
        println!("{}", render_card(text));
    }
}

const CHAT_HELP: &str = "\
Type a message and press Enter. Commands:
  /image PATH      attach a photo to the next message
  /template NAME   send a category template (furniture, ceramics, jewelry, art, general)
  /last            show the last reply again
  /clear           clear the chat
  /quit            exit
Press Ctrl-C while waiting to stop a request.";

async fn run_chat(conversation: &Conversation) -> Result<()> {
    println!("{}", CHAT_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut attached: Option<PathBuf> = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        let note = match command {
            "/quit" | "/exit" => break,
            "/help" => {
                println!("{}", CHAT_HELP);
                continue;
            }
            "/clear" => {
                match conversation.clear().await {
                    Ok(()) => println!("Chat cleared."),
                    Err(e) => println!("{}", e),
                }
                continue;
            }
            "/last" => {
                match conversation.last_assistant_text().await {
                    Some(text) => println!("{}", text),
                    None => println!("No response yet."),
                }
                continue;
            }
            "/image" => {
                if arg.is_empty() {
                    println!("Usage: /image PATH");
                } else {
                    attached = Some(PathBuf::from(arg));
                    println!("Attached {}", arg);
                }
                continue;
            }
            "/template" => match template_note(arg) {
                Ok(note) => note,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            },
            _ => line.to_string(),
        };

        println!("Analyzing…");
        match send_with_interrupt(conversation, &note, attached.take().as_deref()).await {
            Ok(turn) => print_reply(&turn, false),
            Err(e) => {
                error!("Request failed: {:#}", e);
                println!("{}", e);
            }
        }
    }

    Ok(())
}
