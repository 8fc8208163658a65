mod jobs;
mod migrate;
mod update;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use thought_config::{AppConfig, ConfigLoader};
use thought_db::{StorageGateway, ThoughtStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "thought-system",
    version,
    about = "Thought System - capture thoughts over HTTP and send digests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding config.yml / config.toml
    #[arg(long, global = true, env = "THOUGHT_SYSTEM_HOME")]
    config_dir: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Directory of *.sql migration files
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply migrations and start the HTTP server
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Apply pending migrations
    Migrate {
        /// Only list applied and pending migrations
        #[arg(long)]
        status: bool,
    },

    /// Run a digest job (hourly, daily, or a window such as 90m)
    Digest {
        window: String,

        /// Send the digest even if delivery is disabled for this window
        #[arg(long)]
        deliver: bool,
    },

    /// Check whether the git checkout is behind its remote
    CheckUpdates,

    /// Pull, rebuild, and migrate
    Update,

    /// Register the periodic jobs with the OpenClaw scheduler
    RegisterCron {
        /// Path of this binary as the scheduler should invoke it
        #[arg(long, default_value = "thought-system")]
        binary: String,
    },

    /// Show server health and local database status
    Status,
}

fn init_logging(cli_level: Option<&str>, config: &AppConfig) {
    let level = cli_level
        .or(config.log_level.as_deref())
        .unwrap_or("info")
        .to_string();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn open_gateway(loader: &ConfigLoader, config: &AppConfig) -> Result<StorageGateway> {
    let db_path = loader.db_path(config);
    let mut gateway = StorageGateway::new(&db_path)
        .with_context(|| format!("failed to prepare database at {}", db_path.display()))?;
    if let Some(ms) = config.database.busy_timeout_ms {
        gateway = gateway.with_busy_timeout(Duration::from_millis(ms));
    }
    Ok(gateway)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let loader = match &cli.config_dir {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::new()?,
    };
    let mut config = loader.load()?;
    if let Some(path) = cli.db_path {
        config.database.path = Some(path);
    }
    if let Some(dir) = cli.migrations_dir {
        config.database.migrations_dir = Some(dir);
    }

    init_logging(cli.log_level.as_deref(), &config);
    info!("using config directory {}", loader.config_dir().display());
    loader.ensure_dirs(&config)?;

    match cli.command {
        Commands::Start { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }

            let gateway = open_gateway(&loader, &config)?;
            let server = thought_gateway::GatewayServer::new(config, gateway);
            server.run().await.context("thought system failed to start")?;
        }
        Commands::Migrate { status } => {
            let gateway = open_gateway(&loader, &config)?;
            migrate::run(gateway, config.resolved_migrations_dir(), status).await?;
        }
        Commands::Digest { window, deliver } => {
            let gateway = open_gateway(&loader, &config)?;
            jobs::run_digest(&config, ThoughtStore::new(gateway), &window, deliver).await?;
        }
        Commands::CheckUpdates => {
            let gateway = open_gateway(&loader, &config)?;
            update::check(&config, gateway).await?;
        }
        Commands::Update => {
            let gateway = open_gateway(&loader, &config)?;
            update::apply(&config, gateway).await?;
        }
        Commands::RegisterCron { binary } => {
            jobs::register_cron(&config, &binary).await?;
        }
        Commands::Status => {
            let gateway = open_gateway(&loader, &config)?;
            status(&config, gateway).await?;
        }
    }

    Ok(())
}

async fn status(config: &AppConfig, gateway: StorageGateway) -> Result<()> {
    let url = format!(
        "http://{}:{}/health",
        config.gateway.host, config.gateway.port
    );
    match reqwest::get(&url).await {
        Ok(resp) => {
            let body = resp.json::<serde_json::Value>().await?;
            println!("Server: {}", serde_json::to_string_pretty(&body)?);
        }
        Err(_) => println!("Server: not running at {url}"),
    }

    println!("Database: {}", gateway.db_path().display());
    let store = ThoughtStore::new(gateway);
    match tokio::task::spawn_blocking(move || store.count()).await? {
        Ok(count) => println!("Thoughts stored: {count}"),
        Err(e) => println!("Thoughts stored: unavailable ({e})"),
    }

    Ok(())
}
