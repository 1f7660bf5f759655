mod app;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hudbridge")]
#[command(about = "HudBridge — renders web dashboards as PNG frame streams for LED matrices")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge server
    Serve {
        /// Port to bind the HTTP listener to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to the config file (defaults to the config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log to stdout only, skipping the rolling file log
        #[arg(long)]
        console_log: bool,
    },
    /// Probe a running instance and print its status
    Status {
        /// Port the instance listens on
        #[arg(short, long)]
        port: Option<u16>,

        /// Auth token, if the instance requires one
        #[arg(short, long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            config,
            console_log,
        } => app::run_server(port, config, console_log).await,
        Commands::Status { port, token } => app::print_status(port, token).await,
    }
}
