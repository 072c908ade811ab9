//! listping - Server list ping responder
//!
//! Answers the status and ping queries a game client sends before joining,
//! using metadata from a configuration file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use listping::config::{self, Config};
use listping::network::Server;
use listping::status::StatusResponder;

/// listping - Server list ping responder
#[derive(Parser)]
#[command(name = "listping")]
#[command(author = "Listping Contributors")]
#[command(version)]
#[command(about = "Answer server list status and ping queries", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Serve {
        /// Interface to bind to (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the status document the server would send
    Status,

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose || config.general.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { bind, port } => {
            run_server(config, bind, port).await?;
        }
        Commands::Status => {
            let responder = StatusResponder::new(config.status);
            for warning in responder.warnings() {
                tracing::warn!("{}", warning);
            }
            let document = serde_json::to_string_pretty(&responder.response())?;
            println!("{}", document);
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Run the server until Ctrl+C
async fn run_server(config: Config, bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut net_config = config.network();
    if let Some(bind) = bind {
        net_config = net_config.with_bind_address(bind);
    }
    if let Some(port) = port {
        net_config.port = port;
    }

    let responder = StatusResponder::new(config.status);
    for warning in responder.warnings() {
        tracing::warn!("{}", warning);
    }

    tracing::info!(
        "Starting listping '{}' on {}",
        config.general.name,
        net_config.bind_addr()
    );

    let server = Server::bind(net_config, responder.clone()).await?;
    let local_addr = server.local_addr()?;
    let status = responder.config();

    println!("\n========================================");
    println!("  listping Server Running");
    println!("========================================");
    println!("  Name: {}", config.general.name);
    println!("  Address: {}", local_addr);
    println!(
        "  Version: {} (protocol {})",
        status.version.name, status.version.protocol
    );
    println!("  Players: {}/{}", status.players.online, status.players.max);
    println!("========================================");
    println!("\nPress Ctrl+C to stop.\n");

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Server stopped");

    Ok(())
}
