use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use restock_watch::{Config, Error, Monitor, monitor_stores, stores, worker};

/// Watches in-store pickup availability and calls, texts or mails you when it changes.
#[derive(Parser, Debug)]
#[command(name = "restock-watch", version)]
struct Cli {
    /// Store code to check (e.g. WACR); all registered stores when omitted
    #[arg(short, long)]
    location: Option<String>,

    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Send one test notification through every configured channel and exit
    #[arg(long)]
    test_channels: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(level));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    dotenvy::dotenv().ok();

    let path = cli
        .config
        .or_else(Config::default_path)
        .ok_or_else(|| Error::Config("no config path given and no config directory".to_string()))?;
    info!("Loading configuration from {}", path.display());
    let config = Config::load(&path)?;

    if cli.test_channels {
        let monitor = Monitor::from_config(&config)?;
        let channels = monitor.notifiers().channel_names().len();
        let delivered = worker::test_channels(monitor.notifiers()).await;
        info!("Test notification delivered on {delivered}/{channels} channel(s)");
        return Ok(());
    }

    let stores = stores::select(&config.monitor.product_code, cli.location.as_deref())?;

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current iteration");
            shutdown.cancel();
        }
    });

    monitor_stores(&config, &stores, token).await
}
