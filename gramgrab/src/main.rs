mod download;
mod server;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use url::Url;

use gramgrab_core::{bootstrap::load_config, logging};

#[derive(Parser)]
#[command(name = "gramgrab", version, about = "Instagram video downloader and streaming download proxy")]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, short, env = "GRAMGRAB_CONFIG_PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP download proxy (default)
    Serve {
        /// Bind host, overrides `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Bind port, overrides `server.http_port`
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Download the videos of one or more post URLs
    Download {
        #[arg(required = true)]
        urls: Vec<String>,

        #[arg(long, short, default_value = ".")]
        output_dir: PathBuf,

        /// Route the transfer through a running proxy, e.g.
        /// `https://host/download-proxy`
        #[arg(long)]
        via: Option<Url>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    logging::init_logging(&config.logging)?;

    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.http_port = port;
            }
            info!("GramGrab proxy starting...");
            info!("HTTP address: {}", config.http_address());
            server::run(&config).await
        }
        Command::Download { urls, output_dir, via } => {
            download::run(&config, &urls, &output_dir, via).await
        }
    }
}
