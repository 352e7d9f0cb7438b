//! Command-line harness for the OpenRouter API.
//!
//! Reads the API key from `OPENROUTER_API_KEY` (or `OPENROUTER_KEY`).
//!
//! # Examples
//!
//! ```sh
//! # Basic request
//! openrouter chat --user "Summarize this tweet thread"
//!
//! # Streamed, with a system prompt and fallback models
//! openrouter chat --stream --system "Be terse." --user "Explain SSE." \
//!   --model anthropic/claude-sonnet-4 --fallback-model openai/gpt-4o
//!
//! # Pipe content from stdin
//! cat draft.md | openrouter chat --system "Review this draft." --stdin
//!
//! # Account and catalog
//! openrouter credits
//! openrouter models --category programming
//! openrouter endpoints openai/gpt-4o
//! openrouter keys create --name ci --limit 10
//! ```

use clap::{ArgAction, Args, Parser, Subcommand};
use futures::StreamExt;
use openrouter_client::chat::{ReasoningEffort, ResponseFormat};
use openrouter_client::endpoints::keys::{CreateKeyRequest, UpdateKeyRequest};
use openrouter_client::response::format_citations;
use openrouter_client::{
    ChatRequest, ChatStream, ClientConfig, CompletionRequest, DEFAULT_BASE_URL, DEFAULT_MODEL,
    Error, Message, OpenRouterClient, Plugin, ProviderPreferences, ReasoningConfig, Result,
    RetryPolicy, ToolDef,
};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::process;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Talk to OpenRouter from the command line.
#[derive(Parser)]
#[command(name = "openrouter", version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// More log output on stderr (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    /// API key (falls back to OPENROUTER_KEY)
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// API root
    #[arg(long, env = "OPENROUTER_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120, global = true)]
    timeout: u64,

    /// Total attempts for retryable failures (1 disables retries)
    #[arg(long, default_value_t = 3, global = true)]
    max_attempts: u32,

    /// HTTP-Referer attribution header
    #[arg(long, global = true)]
    referer: Option<String>,

    /// X-Title attribution header
    #[arg(long, global = true)]
    title: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Send a chat completion request
    Chat(ChatArgs),
    /// Complete a raw prompt (legacy completions endpoint)
    Complete(CompleteArgs),
    /// List available models
    Models {
        /// Only models in this category
        #[arg(long)]
        category: Option<String>,
    },
    /// List the provider endpoints serving a model
    Endpoints {
        /// Model id, e.g. openai/gpt-4o
        model: String,
    },
    /// List providers
    Providers,
    /// Show credit balance
    Credits,
    /// Show usage by day and model
    Activity {
        /// A single UTC day, YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Show the key in use
    Key,
    /// Manage API keys (requires a provisioning key)
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },
    /// Show cost and timing stats for a generation id
    Generation {
        id: String,
    },
}

#[derive(Subcommand)]
enum KeysCommand {
    List {
        #[arg(long)]
        offset: Option<u32>,
        #[arg(long)]
        include_disabled: bool,
    },
    Create {
        #[arg(long)]
        name: String,
        /// Credit limit in USD
        #[arg(long)]
        limit: Option<f64>,
    },
    Get {
        hash: String,
    },
    Update {
        hash: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        limit: Option<f64>,
        /// Disable (true) or re-enable (false) the key
        #[arg(long)]
        disabled: Option<bool>,
    },
    Delete {
        hash: String,
    },
}

#[derive(Args)]
struct ChatArgs {
    // ── Message content ────────────────────────────────────────
    /// System prompt to set the assistant's behavior
    #[arg(long)]
    system: Option<String>,

    /// User message to send
    #[arg(long)]
    user: Option<String>,

    /// Read user content from stdin
    #[arg(long)]
    stdin: bool,

    /// Assistant prefill: partial text the model must continue from
    #[arg(long)]
    prefill: Option<String>,

    // ── Model selection ────────────────────────────────────────
    #[command(flatten)]
    model: ModelArgs,

    // ── Sampling parameters ────────────────────────────────────
    #[command(flatten)]
    sampling: SamplingArgs,

    /// Top-k sampling
    #[arg(long)]
    top_k: Option<u32>,

    /// Frequency penalty (-2.0 to 2.0)
    #[arg(long)]
    frequency_penalty: Option<f32>,

    /// Presence penalty (-2.0 to 2.0)
    #[arg(long)]
    presence_penalty: Option<f32>,

    /// Repetition penalty multiplier (1.0 = no penalty)
    #[arg(long)]
    repetition_penalty: Option<f32>,

    /// Minimum probability relative to the most likely token
    #[arg(long)]
    min_p: Option<f32>,

    /// Top-a sampling
    #[arg(long)]
    top_a: Option<f32>,

    /// Reasoning effort: xhigh, high, medium, low, minimal, none
    #[arg(long)]
    reasoning_effort: Option<String>,

    // ── Output control ─────────────────────────────────────────
    /// Request JSON-formatted output
    #[arg(long)]
    json: bool,

    // ── Provider / routing ─────────────────────────────────────
    /// Preferred provider(s) in priority order
    #[arg(long)]
    provider: Vec<String>,

    /// Allow fallback to other providers
    #[arg(long)]
    allow_fallbacks: Option<bool>,

    /// Prompt transforms to apply (e.g. middle-out)
    #[arg(long)]
    transform: Vec<String>,

    // ── Tools and plugins ──────────────────────────────────────
    /// Path to a JSON file with an array of tool definitions
    #[arg(long)]
    tools: Option<String>,

    /// Enable the web-search plugin
    #[arg(long)]
    web_search: bool,

    /// Enable the response-healing plugin
    #[arg(long)]
    response_healing: bool,

    /// PDF file-parser engine
    #[arg(long)]
    pdf_engine: Option<String>,

    // ── Output mode ────────────────────────────────────────────
    /// Print deltas as they arrive
    #[arg(long)]
    stream: bool,

    /// Print the full JSON response
    #[arg(long)]
    raw: bool,
}

#[derive(Args)]
struct CompleteArgs {
    /// Prompt to complete (reads stdin when omitted)
    #[arg(long)]
    prompt: Option<String>,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    sampling: SamplingArgs,

    /// Print text as it arrives
    #[arg(long)]
    stream: bool,

    /// Print the full JSON response
    #[arg(long)]
    raw: bool,
}

#[derive(Args)]
struct ModelArgs {
    /// Primary model to use
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Fallback models tried in order if the primary is unavailable
    #[arg(long = "fallback-model")]
    fallback_models: Vec<String>,
}

#[derive(Args)]
struct SamplingArgs {
    /// Sampling temperature (0.0 = deterministic, 2.0 = very creative)
    #[arg(long)]
    temperature: Option<f32>,

    /// Nucleus sampling threshold (0.0 to 1.0)
    #[arg(long)]
    top_p: Option<f32>,

    /// Maximum tokens in the response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Stop sequence(s)
    #[arg(long)]
    stop: Vec<String>,

    /// Seed for deterministic sampling
    #[arg(long)]
    seed: Option<u64>,
}

// ── Setup ──────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default = match verbose {
        0 => "warn",
        1 => "openrouter_client=debug,openrouter=debug",
        _ => "openrouter_client=trace,openrouter=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(verbose > 1))
        .init();
}

fn build_client(args: &ConnectionArgs, cancel: CancellationToken) -> Result<OpenRouterClient> {
    let api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENROUTER_KEY").ok())
        .ok_or_else(|| {
            Error::validation("api_key", "set OPENROUTER_API_KEY or pass --api-key")
        })?;

    let mut config = ClientConfig::new(api_key)
        .with_base_url(args.base_url.as_str())
        .with_timeout(Duration::from_secs(args.timeout))
        .with_retry(RetryPolicy::with_attempts(args.max_attempts));
    config.referer = args.referer.clone();
    config.title = args.title.clone();

    Ok(OpenRouterClient::with_config(config)?.with_cancellation(cancel))
}

// ── Request building ───────────────────────────────────────────────

fn read_stdin_content() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| Error::validation("stdin", e.to_string()))?;
    Ok(buf)
}

fn build_user_content(args: &ChatArgs) -> Result<String> {
    let stdin_text = if args.stdin {
        Some(read_stdin_content()?)
    } else {
        None
    };

    match (&args.user, stdin_text) {
        (Some(msg), Some(piped)) => Ok(format!("{msg}\n\n{piped}")),
        (Some(msg), None) => Ok(msg.clone()),
        (None, Some(piped)) => Ok(piped),
        (None, None) => Err(Error::validation("user", "provide --user, --stdin, or both")),
    }
}

fn load_tools(path: &str) -> Result<Vec<ToolDef>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::validation("tools", format!("failed to read '{path}': {e}")))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::validation("tools", format!("failed to parse '{path}': {e}")))
}

fn parse_effort(effort: &str) -> Result<ReasoningEffort> {
    serde_json::from_value(serde_json::Value::String(effort.to_lowercase()))
        .map_err(|_| Error::validation("reasoning_effort", format!("unknown effort {effort:?}")))
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

fn build_chat_request(args: &ChatArgs) -> Result<ChatRequest> {
    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(Message::system(system.as_str()));
    }
    messages.push(Message::user(build_user_content(args)?));
    if let Some(prefill) = &args.prefill {
        messages.push(Message::assistant_text(prefill.as_str()));
    }

    let mut request = ChatRequest::new(args.model.model.as_str(), messages);
    if !args.model.fallback_models.is_empty() {
        request = request.with_fallbacks(args.model.fallback_models.iter().cloned());
    }

    request.temperature = args.sampling.temperature;
    request.top_p = args.sampling.top_p;
    request.max_tokens = args.sampling.max_tokens;
    request.stop = non_empty(&args.sampling.stop);
    request.seed = args.sampling.seed;
    request.top_k = args.top_k;
    request.frequency_penalty = args.frequency_penalty;
    request.presence_penalty = args.presence_penalty;
    request.repetition_penalty = args.repetition_penalty;
    request.min_p = args.min_p;
    request.top_a = args.top_a;
    request.transforms = non_empty(&args.transform);

    if args.json {
        request.response_format = Some(ResponseFormat::json_object());
    }
    if !args.provider.is_empty() || args.allow_fallbacks.is_some() {
        request.provider = Some(ProviderPreferences {
            order: non_empty(&args.provider),
            allow_fallbacks: args.allow_fallbacks,
            ..Default::default()
        });
    }
    if let Some(effort) = &args.reasoning_effort {
        request.reasoning = Some(ReasoningConfig {
            effort: Some(parse_effort(effort)?),
            ..Default::default()
        });
    }
    if let Some(path) = &args.tools {
        let tools = load_tools(path)?;
        eprintln!("  Loaded {} tool(s) from {path}", tools.len());
        request.tools = Some(tools);
    }
    if args.web_search {
        request = request.with_plugin(Plugin::web());
    }
    if args.response_healing {
        request = request.with_plugin(Plugin::ResponseHealing);
    }
    if let Some(engine) = &args.pdf_engine {
        request = request.with_plugin(Plugin::file_parser(engine.as_str()));
    }
    Ok(request)
}

fn build_completion_request(args: &CompleteArgs) -> Result<CompletionRequest> {
    let prompt = match &args.prompt {
        Some(prompt) => prompt.clone(),
        None => read_stdin_content()?,
    };
    let mut request = CompletionRequest::new(args.model.model.as_str(), prompt);
    if !args.model.fallback_models.is_empty() {
        let mut models = vec![args.model.model.clone()];
        models.extend(args.model.fallback_models.iter().cloned());
        request.model = None;
        request.models = Some(models);
        request.route = Some("fallback".to_string());
    }
    request.temperature = args.sampling.temperature;
    request.top_p = args.sampling.top_p;
    request.max_tokens = args.sampling.max_tokens;
    request.stop = non_empty(&args.sampling.stop);
    request.seed = args.sampling.seed;
    Ok(request)
}

// ── Output ─────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::validation("output", e.to_string()))?;
    println!("{text}");
    Ok(())
}

/// Print content deltas as they arrive; returns the stream's terminal error.
async fn print_stream(mut stream: ChatStream) -> Result<()> {
    let mut stdout = io::stdout();
    let mut in_reasoning = false;
    while let Some(event) = stream.next().await {
        if let Some(reasoning) = event.reasoning() {
            if !in_reasoning {
                eprintln!("  [reasoning]");
                in_reasoning = true;
            }
            eprint!("{reasoning}");
        }
        if let Some(content) = event.content() {
            print!("{content}");
            let _ = stdout.flush();
        }
        if let Some(usage) = &event.usage {
            tracing::debug!(
                "Usage: prompt={}, completion={}, cost={:?}",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.cost
            );
        }
    }
    println!();
    match stream.take_err() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// ── Commands ───────────────────────────────────────────────────────

async fn run_chat(client: &OpenRouterClient, args: &ChatArgs) -> Result<()> {
    let request = build_chat_request(args)?;

    if args.stream {
        if let Some(prefill) = &args.prefill {
            print!("{prefill}");
        }
        let stream = client.chat_stream(&request).await?;
        return print_stream(stream).await;
    }

    let response = client.chat(&request).await?;
    if args.raw {
        return print_json(&response);
    }
    if !response.tool_calls().is_empty() {
        println!("[tool_calls]");
        return print_json(&response.tool_calls());
    }

    let continuation = response.content().unwrap_or_default();
    let citations = response
        .first_choice()
        .and_then(|c| c.message.annotations.as_deref())
        .map(format_citations)
        .unwrap_or_default();
    match &args.prefill {
        Some(prefill) => println!("{prefill}{continuation}{citations}"),
        None => println!("{continuation}{citations}"),
    }
    Ok(())
}

async fn run_complete(client: &OpenRouterClient, args: &CompleteArgs) -> Result<()> {
    let request = build_completion_request(args)?;
    if args.stream {
        let stream = client.complete_stream(&request).await?;
        return print_stream(stream).await;
    }
    let response = client.complete(&request).await?;
    if args.raw {
        return print_json(&response);
    }
    println!("{}", response.text().unwrap_or_default());
    Ok(())
}

async fn run_keys(client: &OpenRouterClient, command: &KeysCommand) -> Result<()> {
    match command {
        KeysCommand::List {
            offset,
            include_disabled,
        } => print_json(&client.list_keys(*offset, *include_disabled).await?),
        KeysCommand::Create { name, limit } => {
            let mut request = CreateKeyRequest::new(name.as_str());
            request.limit = *limit;
            print_json(&client.create_key(&request).await?)
        }
        KeysCommand::Get { hash } => print_json(&client.get_key(hash).await?),
        KeysCommand::Update {
            hash,
            name,
            limit,
            disabled,
        } => {
            let request = UpdateKeyRequest {
                name: name.clone(),
                disabled: *disabled,
                limit: *limit,
                include_byok_in_limit: None,
            };
            print_json(&client.update_key(hash, &request).await?)
        }
        KeysCommand::Delete { hash } => print_json(&client.delete_key(hash).await?),
    }
}

async fn run(cli: &Cli, cancel: CancellationToken) -> Result<()> {
    let client = build_client(&cli.connection, cancel)?;
    match &cli.command {
        Command::Chat(args) => run_chat(&client, args).await,
        Command::Complete(args) => run_complete(&client, args).await,
        Command::Models { category } => {
            print_json(&client.list_models(category.as_deref()).await?)
        }
        Command::Endpoints { model } => {
            let (author, slug) = model.split_once('/').ok_or_else(|| {
                Error::validation("model", format!("expected author/slug, got {model:?}"))
            })?;
            print_json(&client.model_endpoints(author, slug).await?)
        }
        Command::Providers => print_json(&client.list_providers().await?),
        Command::Credits => print_json(&client.credits().await?),
        Command::Activity { date } => print_json(&client.activity(date.as_deref()).await?),
        Command::Key => print_json(&client.current_key().await?),
        Command::Keys { command } => run_keys(&client, command).await,
        Command::Generation { id } => print_json(&client.generation(id).await?),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    if let Err(err) = run(&cli, cancel).await {
        eprintln!("Error: {err}");
        process::exit(if err.is_validation() { 2 } else { 1 });
    }
}
