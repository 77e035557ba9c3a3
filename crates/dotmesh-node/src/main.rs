//! Dotmesh - node configuration synthesis for the storage mesh

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotmesh_node::config::{expand_path, Config};
use dotmesh_node::daemon::{DaemonClient, RestartCommand};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dotmesh")]
#[command(about = "Synthesize and apply the storage daemon's mesh configuration", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "~/.dotmesh/config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Daemon API base URL (overrides config)
    #[arg(long)]
    api: Option<String>,

    /// Registry snapshot path or URL (overrides config)
    #[arg(long)]
    registry: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the configuration from the registry and apply it
    Update,

    /// Generate the configuration and print it without applying
    Plan,

    /// Print the daemon's current configuration
    Show,

    /// Ask the daemon to shut down
    Shutdown,

    /// Restart the daemon through its process supervisor
    Restart,

    /// Initialize configuration
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = expand_path(&cli.config);
    if let Commands::Init = cli.command {
        return init_config(&config_path);
    }

    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    if let Some(api) = cli.api {
        config.daemon.api_base = api;
    }
    if let Some(registry) = cli.registry {
        config.registry.source = registry;
    }

    match cli.command {
        Commands::Update => update(&config).await,
        Commands::Plan => plan(&config).await,
        Commands::Show => show(&config).await,
        Commands::Shutdown => shutdown(&config).await,
        Commands::Restart => restart(&config).await,
        Commands::Init => Ok(()),
    }
}

async fn update(config: &Config) -> Result<()> {
    let synthesizer = dotmesh_node::build_synthesizer(config).context("setting up synthesis")?;
    let report = synthesizer
        .synthesize_and_apply()
        .await
        .context("updating daemon configuration")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn plan(config: &Config) -> Result<()> {
    let synthesizer = dotmesh_node::build_synthesizer(config).context("setting up synthesis")?;
    let plan = synthesizer.plan().await.context("computing configuration")?;
    tracing::info!(
        "Planned {} config: {} announce, {} bootstrap, {} peering",
        plan.report.role,
        plan.report.announce_count,
        plan.report.bootstrap_count,
        plan.report.peering_count
    );
    println!("{}", serde_json::to_string_pretty(&plan.config)?);
    Ok(())
}

async fn show(config: &Config) -> Result<()> {
    let synthesizer = dotmesh_node::build_synthesizer(config).context("setting up synthesis")?;
    let current = synthesizer
        .show_current_config()
        .await
        .context("reading daemon configuration")?;
    println!("{}", serde_json::to_string_pretty(&current)?);
    Ok(())
}

async fn shutdown(config: &Config) -> Result<()> {
    let daemon = DaemonClient::new(&config.daemon)?;
    daemon.shutdown().await.context("sending shutdown")?;
    println!("Shutdown sent to {}", daemon.api_base());
    Ok(())
}

async fn restart(config: &Config) -> Result<()> {
    let restart = RestartCommand::from_config(&config.daemon);
    restart.run().await.context("restarting daemon")?;
    println!("Ran `{}`", restart.command());
    Ok(())
}

fn init_config(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        return Ok(());
    }
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let config = Config::default();
    let toml = toml::to_string_pretty(&config)?;
    std::fs::write(config_path, toml)?;

    println!("Initialized dotmesh at: {}", config_path.display());
    Ok(())
}
