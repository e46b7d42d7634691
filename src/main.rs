//! beadbridge CLI entry point.

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "beadbridge", version)]
#[command(about = "Bridges a beads daemon's lifecycle stream to a chat workspace")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge in the foreground (default when no subcommand is given)
    Run,
    /// Load configuration and report whether it is valid, without starting anything
    ConfigCheck,
}

fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    match command {
        Command::Run => cmd_run(cli.debug),
        Command::ConfigCheck => cmd_config_check(),
    }
}

fn cmd_run(debug_flag: bool) -> anyhow::Result<()> {
    let mut config = beadbridge::config::BridgeConfig::load().context("failed to load configuration")?;
    config.debug = config.debug || debug_flag;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build Tokio runtime")?;

    runtime.block_on(async move {
        // Held for the process lifetime so buffered log lines are flushed on exit.
        let _guard = beadbridge::logging::init(config.log_dir.as_deref(), config.debug);

        let cancellation = tokio_util::sync::CancellationToken::new();
        spawn_signal_handler(cancellation.clone());

        tracing::info!(bind_addr = %config.bind_addr, "starting beadbridge");
        if let Err(e) = beadbridge::bridge::run(config, cancellation).await {
            tracing::error!(error = %e, "beadbridge exited with an error");
            return Err(anyhow::anyhow!(e));
        }
        tracing::info!("beadbridge shut down cleanly");
        Ok(())
    })
}

fn cmd_config_check() -> anyhow::Result<()> {
    match beadbridge::config::BridgeConfig::load() {
        Ok(config) => {
            println!("config OK");
            println!("  daemon_http_addr: {}", config.daemon_http_addr);
            println!("  default_channel:  {}", config.default_channel);
            println!("  bind_addr:        {}", config.bind_addr);
            println!("  state_path:       {}", config.state_path().display());
            println!("  dashboard:        {}", config.dashboard_enabled);
            Ok(())
        }
        Err(e) => {
            eprintln!("config invalid: {e}");
            std::process::exit(1);
        }
    }
}

/// Spawns a task that cancels `token` on SIGINT or, on unix, SIGTERM.
fn spawn_signal_handler(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    token.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("shutdown signal received");
        token.cancel();
    });
}
