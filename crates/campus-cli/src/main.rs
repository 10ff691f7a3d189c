use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use campus_core::types::Turn;
use campus_core::{
    Dispatcher, KnowledgeBase, LlmGenerator, LlmProvider, LlmRouter, OpenAiProvider,
    ResponderRegistry, Router, ToolRegistry,
};
use campus_gateway::{GatewayServer, GatewayState};
use campus_store::SessionStore;
use config::{CampusConfig, shellexpand, shellexpand_str};

#[derive(Parser)]
#[command(name = "campus")]
#[command(version)]
#[command(about = "Campus helpdesk: routes student questions to specialist responders")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Override the bind address from config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show which responder a message would be routed to
    Route {
        /// The message to classify
        query: String,

        /// JSON file with prior turns: [{"sender": "...", "text": "..."}]
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Search the course catalog
    Courses {
        #[arg(short, long, default_value = "data science")]
        topic: String,

        #[arg(short, long, default_value = "undergrad")]
        level: String,

        #[arg(short = 'n', long, default_value_t = 4)]
        limit: usize,
    },

    /// Look up academic calendar facts
    Calendar {
        /// e.g. "CS320", "exam dates", "when do classes start"
        #[arg(default_value = "")]
        query: String,
    },

    /// Send a one-shot message through routing and generation
    Ask {
        /// The message to send
        message: String,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Initialize config directory and default config
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Serve { bind } => cmd_serve(&cli.config, bind).await,
        Commands::Route { query, history } => cmd_route(&cli.config, &query, history.as_deref()),
        Commands::Courses {
            topic,
            level,
            limit,
        } => cmd_courses(&cli.config, &topic, &level, limit),
        Commands::Calendar { query } => cmd_calendar(&cli.config, &query),
        Commands::Ask { message } => cmd_ask(&cli.config, &message).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Campus helpdesk initialized at {}", config_dir.display());
    println!(
        "Set OPENAI_API_KEY or edit {} to configure the provider.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = CampusConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

fn cmd_route(config_path: &Option<PathBuf>, query: &str, history: Option<&Path>) -> Result<()> {
    let cfg = CampusConfig::load(config_path)?;
    let router = Router::new(cfg.routing.tables.clone());

    let turns: Vec<Turn> = match history {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read history file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse history file {}", path.display()))?
        }
        None => Vec::new(),
    };

    let decision = router.decide(&turns, query);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn cmd_courses(config_path: &Option<PathBuf>, topic: &str, level: &str, limit: usize) -> Result<()> {
    let cfg = CampusConfig::load(config_path)?;
    let knowledge = load_knowledge(&cfg)?;
    let lookup = knowledge.lookup_courses(topic, level, limit);
    println!("{}", serde_json::to_string_pretty(&lookup)?);
    Ok(())
}

fn cmd_calendar(config_path: &Option<PathBuf>, query: &str) -> Result<()> {
    let cfg = CampusConfig::load(config_path)?;
    let knowledge = load_knowledge(&cfg)?;
    let facts = knowledge.lookup_calendar(query);
    println!("{}", serde_json::to_string_pretty(&facts)?);
    Ok(())
}

async fn cmd_serve(config_path: &Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let cfg = CampusConfig::load(config_path)?;
    info!("Starting campus helpdesk...");

    let bind = shellexpand_str(bind.as_deref().unwrap_or(&cfg.server.bind));
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind))?;

    let db_path = shellexpand(&cfg.knowledge.db_path);
    let store = SessionStore::new(&db_path)
        .with_context(|| format!("Failed to open session store at {}", db_path.display()))?;
    info!("Session store ready at {}", db_path.display());

    let dispatcher = Arc::new(build_dispatcher(&cfg)?);
    let server = GatewayServer::new(addr, GatewayState::new(store, dispatcher));

    let cancel = CancellationToken::new();
    let server_task = tokio::spawn(server.run(cancel.clone()));

    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");
    cancel.cancel();

    server_task.await.context("Server task panicked")??;
    println!("Campus helpdesk stopped.");
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str) -> Result<()> {
    let cfg = CampusConfig::load(config_path)?;
    let dispatcher = build_dispatcher(&cfg)?;
    let reply = dispatcher.handle(&[], message).await;

    for call in &reply.tool_calls {
        info!("Tool {} called with {}", call.name, call.input);
    }
    println!("[{}]\n{}", reply.responder, reply.text);
    Ok(())
}

fn load_knowledge(cfg: &CampusConfig) -> Result<KnowledgeBase> {
    match cfg.knowledge.file.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(file) => KnowledgeBase::from_toml_file(&shellexpand(file)),
        None => Ok(KnowledgeBase::default()),
    }
}

/// Wire knowledge, tools, provider, registry and routers from config
fn build_dispatcher(cfg: &CampusConfig) -> Result<Dispatcher> {
    let api_key = shellexpand_str(&cfg.provider.api_key);
    if api_key.trim().is_empty() {
        bail!("No provider API key configured. Set OPENAI_API_KEY or [provider].api_key.");
    }

    let knowledge = Arc::new(load_knowledge(cfg)?);
    let tools = Arc::new(ToolRegistry::with_knowledge(knowledge));

    let timeout = Duration::from_secs(cfg.provider.timeout_secs);
    let provider = OpenAiProvider::new(
        api_key,
        shellexpand_str(&cfg.provider.model),
        shellexpand_str(&cfg.provider.base_url),
        cfg.provider.max_tokens,
        timeout,
    )?;
    info!("Provider: {:?}", provider);

    let registry = ResponderRegistry::builtin().with_overrides(cfg.responder_overrides());

    let mut generator =
        LlmGenerator::new(Arc::new(provider.clone()), tools).with_timeout(timeout);
    for profile in registry.iter() {
        if profile.model.is_some() || profile.max_tokens.is_some() {
            let tuned = provider.with_overrides(profile.model.as_deref(), profile.max_tokens);
            info!("{} uses model {}", profile.id, tuned.model());
            generator = generator.with_responder_provider(profile.id, Arc::new(tuned));
        }
    }

    let router = Router::new(cfg.routing.tables.clone());
    let mut dispatcher = Dispatcher::new(router.clone(), registry, Arc::new(generator));

    if cfg.routing.llm_router {
        info!("Model-based routing enabled, keyword router as fallback");
        dispatcher = dispatcher.with_llm_router(LlmRouter::new(Arc::new(provider), router));
    }

    Ok(dispatcher)
}
