use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use glue_llm::config::{self, ModelType};
use glue_llm::llm::credential::AzureCliCredential;
use glue_llm::llm::messages::{to_payload, ChatMessage};
use glue_llm::pool::{build_pool, get_all_model_ids_of_type, get_tokens_used, ModelRegistry};
use glue_llm::Dispatcher;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "glue-llm",
    about = "Send chat messages to the LLM provider selected by the environment",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt or a message file to the active provider
    Chat {
        /// The prompt to send
        prompt: Option<String>,

        /// JSON file holding {"messages": [...]}; "-" reads stdin
        #[arg(short, long, conflicts_with = "prompt")]
        messages: Option<PathBuf>,

        /// System prompt prepended to the user prompt
        #[arg(long, conflicts_with = "messages")]
        system: Option<String>,
    },
    /// Provider inspection
    Providers {
        #[command(subcommand)]
        action: ProvidersAction,
    },
    /// Model pool management
    Pool {
        #[command(subcommand)]
        action: PoolAction,
    },
}

#[derive(Subcommand)]
enum ProvidersAction {
    /// Show the selected provider and its resolved settings
    List,
}

#[derive(Subcommand)]
enum PoolAction {
    /// List model ids in the pool config
    List {
        /// Pool config file (defaults to ~/.glue-llm/pool.yaml)
        #[arg(short, long, env = "GLUE_LLM_POOL_CONFIG")]
        config: Option<PathBuf>,

        /// Only ids of this model type (chat, completion, embeddings, multimodal)
        #[arg(short = 't', long = "type")]
        model_type: Option<ModelType>,
    },
    /// Send a prompt to one pooled model
    Chat {
        /// unique_model_id of the model
        #[arg(short, long)]
        model: String,

        /// The prompt to send
        prompt: String,

        /// Pool config file (defaults to ~/.glue-llm/pool.yaml)
        #[arg(short, long, env = "GLUE_LLM_POOL_CONFIG")]
        config: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let debug = std::env::var("LLM_DEBUG")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let rust_log = std::env::var("RUST_LOG").ok();
    init_tracing(log_filter(debug, rust_log.as_deref()));

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            prompt,
            messages,
            system,
        } => cmd_chat(prompt, messages, system).await,
        Commands::Providers { action } => match action {
            ProvidersAction::List => cmd_providers_list(),
        },
        Commands::Pool { action } => match action {
            PoolAction::List { config, model_type } => cmd_pool_list(config, model_type),
            PoolAction::Chat {
                model,
                prompt,
                config,
            } => cmd_pool_chat(config, &model, &prompt).await,
        },
    }
}

/// `LLM_DEBUG` always turns on debug output for this crate. Otherwise a
/// non-empty `RUST_LOG` is used as given and `glue_llm=info` applies only
/// when it is absent.
fn log_filter(debug: bool, rust_log: Option<&str>) -> EnvFilter {
    let directive = if debug { "glue_llm=debug" } else { "glue_llm=info" };
    match rust_log.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) if debug => EnvFilter::builder()
            .parse_lossy(directives)
            .add_directive(directive.parse().unwrap()),
        Some(directives) => EnvFilter::builder().parse_lossy(directives),
        None => EnvFilter::new(directive),
    }
}

fn init_tracing(filter: EnvFilter) {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn read_payload(path: &PathBuf) -> Result<Value> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("reading messages from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading messages from {}", path.display()))?
    };
    serde_json::from_str(&raw).context("parsing messages JSON")
}

async fn cmd_chat(
    prompt: Option<String>,
    messages: Option<PathBuf>,
    system: Option<String>,
) -> Result<()> {
    let payload = match messages {
        Some(path) => read_payload(&path).await?,
        None => {
            let prompt = prompt.context("a prompt or --messages is required")?;
            let mut turns = Vec::new();
            if let Some(s) = system {
                turns.push(ChatMessage::system(s));
            }
            turns.push(ChatMessage::user(prompt));
            to_payload(&turns)
        }
    };

    let dispatcher = Dispatcher::from_env().context("creating HTTP clients")?;
    println!("{}", dispatcher.chat_completion(&payload).await);
    Ok(())
}

fn cmd_providers_list() -> Result<()> {
    let dispatcher = Dispatcher::from_env().context("creating HTTP clients")?;
    println!("Model type: {}", config::get_model_type());
    println!("Selected provider: {}", dispatcher.selected());

    let openai = config::get_openai_config();
    println!("OpenAI:");
    println!("  model: {}", openai.model_name);
    println!("  base URL: {}", openai.base_url);
    println!(
        "  API key: {}",
        if openai.api_key.is_empty() { "not set" } else { "set" }
    );

    let azure = config::get_azure_config();
    println!("Azure:");
    println!("  endpoint: {}", azure.azure_endpoint);
    println!("  deployment: {}", azure.deployment_name);
    println!("  API version: {}", azure.api_version);

    println!("Ollama:");
    match config::get_ollama_config() {
        Ok(ollama) => {
            println!("  base URL: {}", ollama.base_url);
            println!("  model: {}", ollama.model_name);
            println!("  temperature: {}", ollama.temperature);
        }
        Err(e) => println!("  invalid: {e}"),
    }
    Ok(())
}

fn cmd_pool_list(path: Option<PathBuf>, model_type: Option<ModelType>) -> Result<()> {
    let cfg = config::load_pool_config(path.as_deref())?;

    let ids = match model_type {
        Some(t) => get_all_model_ids_of_type(&cfg, t),
        None => [
            ModelType::Chat,
            ModelType::Completion,
            ModelType::Embeddings,
            ModelType::MultiModal,
        ]
        .into_iter()
        .flat_map(|t| get_all_model_ids_of_type(&cfg, t))
        .collect(),
    };

    if ids.is_empty() {
        println!("No models configured.");
    } else {
        for id in ids {
            println!("{id}");
        }
    }
    Ok(())
}

async fn cmd_pool_chat(path: Option<PathBuf>, model_id: &str, prompt: &str) -> Result<()> {
    let cfg = config::load_pool_config(path.as_deref())?;
    let pool = build_pool(
        &cfg,
        &ModelRegistry::with_builtins(),
        Arc::new(AzureCliCredential::new()),
    )
    .context("building model pool")?;

    let model = pool
        .get(model_id)
        .with_context(|| format!("no model '{model_id}' in pool (have: {})", pool.ids().join(", ")))?;

    match model.model_type() {
        ModelType::Embeddings => {
            let vectors = model.embed(&[prompt.to_string()]).await?;
            let dims = vectors.first().map(Vec::len).unwrap_or(0);
            println!("{}", json!({ "dimensions": dims, "embedding": vectors.first() }));
        }
        _ => println!("{}", model.complete(prompt).await?),
    }

    if let Some(usage) = get_tokens_used(model.as_ref()) {
        eprintln!(
            "\x1b[2m({} prompt / {} completion / {} embedding tokens)\x1b[0m",
            usage.prompt_tokens, usage.completion_tokens, usage.embedding_tokens
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter(false, None).to_string(), "glue_llm=info");
        assert_eq!(log_filter(false, Some("  ")).to_string(), "glue_llm=info");
    }

    #[test]
    fn test_log_filter_keeps_rust_log() {
        let filter = log_filter(false, Some("glue_llm=debug")).to_string();
        assert!(filter.contains("glue_llm=debug"), "{filter}");
        assert!(!filter.contains("glue_llm=info"), "{filter}");
    }

    #[test]
    fn test_log_filter_llm_debug_wins() {
        let filter = log_filter(true, Some("warn")).to_string();
        assert!(filter.contains("glue_llm=debug"), "{filter}");
        assert_eq!(log_filter(true, None).to_string(), "glue_llm=debug");
    }

    #[test]
    fn test_pool_list_config_flag() {
        let cli = Cli::try_parse_from(["glue-llm", "pool", "list", "--config", "/tmp/p.yaml"]).unwrap();
        match cli.command {
            Commands::Pool {
                action: PoolAction::List { config, .. },
            } => assert_eq!(config, Some(PathBuf::from("/tmp/p.yaml"))),
            _ => panic!("expected pool list"),
        }
    }
}
