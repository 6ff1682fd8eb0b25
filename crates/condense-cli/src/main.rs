//! condense - context compaction for chat-completion proxies

mod config;
mod pipe;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use clap::{Args as ClapArgs, Parser, Subcommand};
use condense_ai::{Message, ProviderCatalog};
use condense_core::{
    CompactionConfig, CompactionEngine, ConfigPatch, ConfigStore, EngineOptions, StoreLimits,
    SummaryTarget,
};
use tracing_subscriber::EnvFilter;

/// condense - keep long conversations inside the context window
#[derive(Parser, Debug)]
#[command(name = "condense")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Compaction config file (default: ~/.config/condense/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Provider catalog file (default: ~/.config/condense/providers.json)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show or change the compaction config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the context window of a model
    Limit {
        model: String,

        /// Provider to ask first
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Compact a JSON message list read from a file (or stdin) and print the result
    Compact {
        /// File holding a JSON array of messages; stdin when omitted
        file: Option<PathBuf>,

        /// Summarizer provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Summarizer model
        #[arg(short, long)]
        model: Option<String>,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Run the request/response filters over JSON lines on stdin/stdout
    Pipe {
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Write an example provider catalog
    InitCatalog {
        /// Overwrite an existing catalog
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current config as JSON
    Show,

    /// Update config fields and save
    Set(SetArgs),
}

#[derive(ClapArgs, Debug, Default)]
struct SetArgs {
    #[arg(long)]
    enabled: Option<bool>,

    /// Fraction of the context window that triggers compaction, in (0, 1]
    #[arg(long)]
    threshold: Option<f64>,

    /// Summarizer provider
    #[arg(long, conflicts_with = "clear_provider")]
    provider: Option<String>,

    /// Use the request's own provider for summaries
    #[arg(long)]
    clear_provider: bool,

    /// Summarizer model
    #[arg(long, conflicts_with = "clear_model")]
    model: Option<String>,

    /// Use the request's own model for summaries
    #[arg(long)]
    clear_model: bool,

    #[arg(long)]
    notify_user: Option<bool>,

    #[arg(long)]
    use_simple_prompt: Option<bool>,

    #[arg(long)]
    summary_prompt: Option<String>,

    #[arg(long)]
    simple_prompt: Option<String>,
}

impl SetArgs {
    fn to_patch(&self) -> ConfigPatch {
        fn override_of(value: &Option<String>, clear: bool) -> Option<Option<String>> {
            if clear {
                Some(None)
            } else {
                value.clone().map(Some)
            }
        }

        ConfigPatch {
            enabled: self.enabled,
            threshold: self.threshold,
            provider: override_of(&self.provider, self.clear_provider),
            model: override_of(&self.model, self.clear_model),
            notify_user: self.notify_user,
            use_simple_prompt: self.use_simple_prompt,
            summary_prompt: self.summary_prompt.clone(),
            simple_prompt: self.simple_prompt.clone(),
        }
    }
}

/// Runtime options for commands that summarize
#[derive(ClapArgs, Debug)]
struct EngineArgs {
    /// Summarization timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Conversations tracked before the least recently seen is dropped
    #[arg(long, default_value_t = 1024)]
    max_conversations: usize,

    /// Drop conversations idle for this many minutes
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    idle_ttl: Option<u32>,

    /// Summarizer provider for /compact
    #[arg(long)]
    command_provider: Option<String>,

    /// Summarizer model for /compact
    #[arg(long)]
    command_model: Option<String>,
}

impl EngineArgs {
    fn to_options(&self) -> EngineOptions {
        EngineOptions {
            summary_timeout: Duration::from_secs(self.timeout),
            limits: StoreLimits {
                max_conversations: self.max_conversations,
                idle_ttl: self.idle_ttl.map(|m| TimeDelta::minutes(i64::from(m))),
            },
            command_target: SummaryTarget::new(
                self.command_provider.clone(),
                self.command_model.clone(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(CompactionConfig::config_path);
    let catalog_path = config::catalog_path(args.catalog.as_deref());

    match args.command {
        Command::Config { action } => run_config(action, config_path),
        Command::Limit { model, provider } => {
            let catalog = config::load_catalog(&catalog_path)?;
            let engine = build_engine(config_path, catalog, EngineOptions::default());
            println!("{}", engine.context_limit(provider.as_deref(), &model));
            Ok(())
        }
        Command::Compact {
            file,
            provider,
            model,
            engine,
        } => {
            let catalog = config::load_catalog(&catalog_path)?;
            let engine = build_engine(config_path, catalog, engine.to_options());
            run_compact(&engine, file.as_deref(), provider, model).await
        }
        Command::Pipe { engine } => {
            let catalog = config::load_catalog(&catalog_path)?;
            let engine = Arc::new(build_engine(config_path, catalog, engine.to_options()));
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            let mut writer = tokio::io::stdout();
            pipe::run(engine, reader, &mut writer).await
        }
        Command::InitCatalog { force } => {
            if config::init_catalog(&catalog_path, force)? {
                println!("Catalog file created at: {}", catalog_path.display());
                println!("\nExample catalog:\n{}", config::example_catalog());
            } else {
                println!(
                    "Catalog already exists at: {} (use --force to overwrite)",
                    catalog_path.display()
                );
            }
            Ok(())
        }
    }
}

/// Log to stderr so stdout stays free for data
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("condense=debug,condense_core=debug,condense_ai=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_engine(
    config_path: PathBuf,
    catalog: ProviderCatalog,
    options: EngineOptions,
) -> CompactionEngine {
    let catalog = Arc::new(catalog);
    CompactionEngine::new(
        ConfigStore::open(config_path),
        catalog.clone(),
        catalog,
        options,
    )
}

fn run_config(action: ConfigAction, path: PathBuf) -> anyhow::Result<()> {
    let store = ConfigStore::open(path);

    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        }
        ConfigAction::Set(set) => {
            let patch = set.to_patch();
            if patch.is_empty() {
                anyhow::bail!("Nothing to update; pass at least one field");
            }
            let config = store.update(&patch)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            if let Some(path) = store.path() {
                eprintln!("Saved to {}", path.display());
            }
        }
    }
    Ok(())
}

async fn run_compact(
    engine: &CompactionEngine,
    file: Option<&Path>,
    provider: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let content = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let messages: Vec<Message> = serde_json::from_str(&content)?;

    let compacted = engine.compact_now(messages, provider, model).await?;
    println!("{}", serde_json::to_string_pretty(&compacted)?);
    Ok(())
}
