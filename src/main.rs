mod api;
mod app;
mod config;
mod engine;
mod reconcile;
mod server;
mod session;
mod ui;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Debug, Parser)]
#[command(name = "evoscope", version, about = "Terminal dashboard for a GA optimization server")]
struct Cli {
    /// Override EVOSCOPE_SERVER_URL
    #[arg(long)]
    url: Option<String>,

    /// Override the poll cadence in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Override EVOSCOPE_FUNCTION (the objective sent with /start)
    #[arg(long)]
    function: Option<String>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Generation dashboard with start/stop/reset controls (default)
    Watch,
    /// Bare step/value chart for the simpler backend
    Steps,
    /// Run the built-in demo optimization server
    Serve {
        /// Override EVOSCOPE_SERVE_PORT
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(url) = cli.url {
        settings.server_url = url;
    }
    if let Some(ms) = cli.poll_ms {
        settings.poll_ms = ms;
        settings.steps_poll_ms = ms;
    }
    if let Some(f) = cli.function {
        settings.function = f;
    }
    settings.validate()?;

    match cli.command.unwrap_or(Cmd::Watch) {
        Cmd::Serve { port } => {
            env_logger::init();
            if let Some(p) = port {
                settings.serve_port = p;
            }
            log::info!(
                "app.start mode=serve addr={}:{}",
                settings.serve_host,
                settings.serve_port
            );
            server::serve(settings).await
        }
        Cmd::Watch => {
            init_file_logger(&settings.log_path)?;
            log::info!("app.start mode=watch url={}", settings.server_url);
            app::run_watch(settings).await
        }
        Cmd::Steps => {
            init_file_logger(&settings.log_path)?;
            log::info!("app.start mode=steps url={}", settings.server_url);
            app::run_steps(settings).await
        }
    }
}

/// The TUI owns the terminal, so log output goes to a file instead of stderr.
fn init_file_logger(path: &str) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}
