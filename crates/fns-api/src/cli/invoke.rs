//! `fns invoke`: run a single event locally.
//!
//! Signature verification is skipped, so captured orchestrator payloads can be
//! replayed while developing a function.

use std::path::Path;

use fns_types::config::FnsConfig;
use fns_types::event::Response;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

pub async fn invoke(config: &FnsConfig, path: &Path) -> anyhow::Result<()> {
    let raw = read_event(path).await?;
    let config = FnsConfig {
        dev: true,
        ..config.clone()
    };
    let state = AppState::init(&config, CancellationToken::new())?;
    let response = run_event(&state, &raw).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn read_event(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        tokio::io::stdin().read_to_string(&mut raw).await?;
        return Ok(raw);
    }
    Ok(tokio::fs::read_to_string(path).await?)
}

async fn run_event(state: &AppState, raw: &str) -> anyhow::Result<Response> {
    let event = state.engine.construct_event(raw, None)?;
    let response = state.engine.handle(event, &state.shutdown).await?;
    Ok(response)
}
