//! fns CLI and HTTP entry point.
//!
//! Binary name: `fns`
//!
//! Loads configuration, registers the bundled functions, then either serves
//! the orchestrator-facing HTTP endpoint or runs a single event locally.

mod cli;
mod functions;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use fns_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need config or tracing
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "fns", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(TracingOptions {
        otel: cli.otel,
        json: cli.json_logs,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli::load(&cli).await;

    match cli.command {
        Commands::Serve { host, port, .. } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            if !config.dev && config.signing_key.is_none() {
                tracing::warn!("no signing key configured outside dev mode; every event will be rejected");
            }

            let shutdown = CancellationToken::new();
            let state = AppState::init(&config, shutdown.clone())?;
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(
                %addr,
                dev = config.dev,
                functions = state.engine.registry().len(),
                checksum = %state.engine.registry().checksum(),
                "fns listening"
            );

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal(shutdown))
                .await?;

            tracing::info!("server stopped");
        }

        Commands::Functions => {
            let state = AppState::init(&config, CancellationToken::new())?;
            println!("{}", serde_json::to_string_pretty(&state.engine.config())?);
        }

        Commands::Invoke { event } => {
            cli::invoke::invoke(&config, &event).await?;
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel in-flight invocations.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
