// src/main.rs — Parley entry point

use clap::Parser;
use tokio_util::sync::CancellationToken;

use parley::cli::{Cli, Commands};
use parley::infra::config::Config;
use parley::infra::logger;

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG)
    logger::init_logging("warn");

    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    // A pending stdin read cannot be cancelled; exit without waiting on it
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    match &cli.command {
        Some(Commands::Status) => {
            parley::cli::status::show_status(&config, cli.config.as_deref().map(std::path::Path::new))
        }
        Some(Commands::Ask { prompt }) => {
            parley::cli::chat::run_ask(
                &prompt.join(" "),
                cli.model.as_deref(),
                &config,
                cli.quiet,
                shutdown,
            )
            .await
        }
        Some(Commands::Chat) | None => {
            parley::cli::chat::run_chat(cli.model.as_deref(), &config, cli.quiet, shutdown).await
        }
    }
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM. In-flight requests are abandoned,
/// not awaited.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        eprintln!("\nShutting down...");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
