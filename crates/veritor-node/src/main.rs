use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use veritor_node::api::start_api_server;
use veritor_node::logging::{display_boot_banner, display_emoji_legend, init_logging};
use veritor_node::{NodeConfig, VeritorNode};

#[derive(Parser)]
#[command(name = "veritor-node")]
#[command(about = "Optimistic AI inference oracle node", version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the API listen port
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file and exit
    Init {
        /// Directory the veritor.toml is written into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Init { output }) = cli.command {
        return init_config(&output);
    }

    // Precedence: CLI args > env vars > config file > defaults
    let mut config = load_config(cli.config.as_deref())?;
    config.apply_env_overrides();
    if let Some(port) = cli.api_port {
        config.api.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.node.data_dir = dir;
    }

    // Banner and legend go to stdout before the subscriber takes over,
    // and stay out of the way when the operator asked for raw logs.
    let plain_logs = cli.verbose > 0 || std::env::var("RUST_LOG").is_ok();
    if config.logging.show_boot_banner && !plain_logs {
        display_boot_banner(env!("CARGO_PKG_VERSION"));
    }
    if config.logging.show_emoji_legend && !plain_logs {
        display_emoji_legend();
    }

    if let Err(e) = init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(name = %config.node.name, "⚙️ Starting Veritor node");

    let node = VeritorNode::new(config.clone()).await?;

    let event_logger = node.start_event_logger();

    let api_handle = if config.api.enabled {
        Some(start_api_server(
            node.clone(),
            config.api.host.clone(),
            config.api.port,
        ))
    } else {
        info!("API server disabled by configuration");
        None
    };

    info!("✅ NODE READY");

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutting down");

    if let Some(handle) = api_handle {
        handle.abort();
    }
    event_logger.abort();

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    match path {
        Some(explicit) => NodeConfig::from_file(explicit),
        None => {
            let local = Path::new("veritor.toml");
            if local.exists() {
                NodeConfig::from_file(local)
            } else {
                Ok(NodeConfig::default())
            }
        }
    }
}

fn init_config(output: &Path) -> Result<()> {
    std::fs::create_dir_all(output)?;
    let path = output.join("veritor.toml");
    NodeConfig::default().save_to_file(&path)?;
    println!("✅ Wrote default configuration to {}", path.display());
    Ok(())
}
