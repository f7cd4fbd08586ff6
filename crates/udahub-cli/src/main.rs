//! udahub - customer support chat on the UDA-Hub orchestrator

mod config;
mod store;
mod tools;

use anyhow::Context as _;
use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use udahub_agent::{LlmSubAgent, ProviderTransport, ToolFilter, Transport};
use udahub_ai::{CompletionOptions, Model, Provider};
use udahub_graph::{
    ChatInterface, ConsoleChat, ExecutionContext, FileCheckpointer, GraphEvent, ListChat, LlmChat,
    UdaHub,
};

use crate::config::Config;
use crate::store::FileStore;

/// Token the simulated user answers with to end the chat
const SIMULATION_END: &str = "END_OF_CHAT";

/// udahub - multi-agent customer support
#[derive(Parser, Debug)]
#[command(name = "udahub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Customer account the user belongs to
    #[arg(short, long, default_value = "cultpass")]
    account: String,

    /// The user's id in the customer's system
    #[arg(short, long, default_value = "f556c0")]
    user: String,

    /// Continue an existing ticket
    #[arg(short, long)]
    ticket: Option<String>,

    /// Resume or reopen a conversation thread
    #[arg(long)]
    thread: Option<String>,

    /// Replay user messages from a file, one per line
    #[arg(long, conflicts_with = "simulate")]
    script: Option<PathBuf>,

    /// Let a model play the user, following these instructions
    #[arg(long)]
    simulate: Option<String>,

    /// Turns the simulated user may take
    #[arg(long, default_value_t = 6)]
    max_turns: usize,

    /// Directory for accounts, tickets and threads
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Model to use (default: gpt-4o-mini)
    #[arg(short, long)]
    model: Option<String>,

    /// Provider (openai, groq, openrouter, ollama, custom)
    #[arg(short, long)]
    provider: Option<String>,

    /// Chat Completions endpoint override
    #[arg(long)]
    base_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("udahub=debug,udahub_graph=debug,udahub_agent=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_transport(args: &Args, config: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    let provider = Provider::parse(
        args.provider
            .as_deref()
            .or(config.provider.as_deref())
            .unwrap_or("openai"),
    );
    let model_id = args
        .model
        .clone()
        .or_else(|| config.model.clone())
        .unwrap_or_else(|| config::DEFAULT_MODEL.to_string());

    let mut model = Model::new(provider, model_id);
    if let Some(base_url) = args.base_url.as_ref().or(config.base_url.as_ref()) {
        model = model.with_base_url(base_url);
    }
    if model.base_url.is_empty() {
        anyhow::bail!("Provider '{}' needs a base_url", provider.name());
    }

    let api_key = match config.get_api_key(provider.api_key_env_var()) {
        Some(key) => key,
        None if provider.api_key_env_var().is_none() => String::new(),
        None => anyhow::bail!(
            "No API key for {}. Set {} or add api_key to {}",
            provider.name(),
            provider.api_key_env_var().unwrap_or("an API key"),
            Config::config_path().display()
        ),
    };

    tracing::debug!(model = %model.id, provider = provider.name(), "using model");
    Ok(Arc::new(ProviderTransport::openai(model, api_key)))
}

fn build_chat(args: &Args, transport: Arc<dyn Transport>) -> anyhow::Result<Arc<dyn ChatInterface>> {
    if let Some(path) = &args.script {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        let lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        return Ok(Arc::new(ListChat::new(lines).echoing()));
    }
    if let Some(instructions) = &args.simulate {
        let chat = LlmChat::new(transport, instructions, args.max_turns, SIMULATION_END)
            .on_generated(|text| println!("\x1b[36muser>\x1b[0m {}", text));
        return Ok(Arc::new(chat));
    }
    Ok(Arc::new(ConsoleChat::new()))
}

/// Log graph progress until the channel closes
fn spawn_event_logger(ctx: &ExecutionContext) -> tokio::task::JoinHandle<()> {
    let mut events = BroadcastStream::new(ctx.subscribe());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(GraphEvent::Routed { thread_id, route }) => {
                    tracing::info!(thread_id = %thread_id, ?route, "routed");
                }
                Ok(GraphEvent::TicketStored { thread_id, ticket_id }) => {
                    tracing::info!(thread_id = %thread_id, ticket_id = %ticket_id, "ticket stored");
                }
                Ok(event) => tracing::debug!(?event, "graph event"),
                Err(e) => tracing::warn!("Event stream lagged: {}", e),
            }
        }
    })
}

/// The thread to run, fixed up front so an interrupted chat can name it
fn resolve_thread_id(args: &Args) -> String {
    args.thread
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.init_config {
        let path = Config::init().context("Error creating config")?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let config = Config::load();
    let data_dir = args.data_dir.clone().unwrap_or_else(|| config.data_dir());
    let store = Arc::new(
        FileStore::open(&data_dir)
            .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?,
    );
    let checkpointer = Arc::new(FileCheckpointer::new(store.threads_dir()));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let transport = build_transport(&args, &config)?;
    let sub_agent = LlmSubAgent::new(transport.clone())
        .with_options(CompletionOptions {
            temperature: Some(0.0),
            ..Default::default()
        })
        .with_cancel(cancel.clone());
    let chat = build_chat(&args, transport)?;

    let ctx = ExecutionContext::builder()
        .accounts(store.clone())
        .tickets(store.clone())
        .knowledge(store.clone())
        .tools(ToolFilter::new(tools::catalog(store.clone())))
        .sub_agent(Arc::new(sub_agent))
        .chat(chat)
        .config(config.graph_config())
        .build()?;
    let logger = spawn_event_logger(&ctx);

    let thread_id = resolve_thread_id(&args);
    let hub = UdaHub::new(ctx, checkpointer);
    let outcome = tokio::select! {
        outcome = hub.start_chat(&args.account, &args.user, args.ticket.as_deref(), Some(thread_id.as_str())) => outcome?,
        _ = cancel.cancelled() => {
            eprintln!("\nInterrupted. Resume with --thread {}", thread_id);
            return Ok(());
        }
    };
    drop(hub);
    logger.abort();

    println!();
    println!("thread: {}", outcome.thread_id);
    if let Some(ticket_id) = &outcome.ticket_id {
        println!("ticket: {}", ticket_id);
    }
    if outcome.state.escalated {
        println!("status: handed over to a human agent");
    } else if let Some(error) = &outcome.state.task.error {
        println!("status: {}", error);
    }

    Ok(())
}
