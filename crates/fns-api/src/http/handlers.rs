//! Request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::{Value, json};
use tracing::Instrument;
use uuid::Uuid;

use fns_infra::crypto::signature::SIGNATURE_HEADER;
use fns_types::definition::ExternalConfig;
use fns_types::event::Response;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET / - Function config document for the orchestrator.
pub async fn get_config(State(state): State<AppState>) -> Json<ExternalConfig> {
    Json(state.engine.config())
}

/// POST / - Verify the event and run one invocation.
pub async fn post_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Response>, AppError> {
    let request_id = Uuid::now_v7();
    let raw = std::str::from_utf8(&body)
        .map_err(|e| AppError::BadRequest(format!("request body is not UTF-8: {e}")))?;
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let event = state.engine.construct_event(raw, signature)?;
    let span = tracing::info_span!(
        "invocation",
        %request_id,
        function = %event.name,
        execution_id = %event.id,
        run_id = %event.run_id,
    );

    let abort = state.shutdown.child_token();
    let response = state.engine.handle(event, &abort).instrument(span).await?;
    Ok(Json(response))
}

/// GET /health - Liveness plus the registry fingerprint.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let registry = state.engine.registry();
    Json(json!({
        "status": "ok",
        "functions": registry.len(),
        "checksum": registry.checksum(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;
    use fns_infra::crypto::signature::sign;
    use fns_types::config::FnsConfig;
    use fns_types::event::ResponseStatus;
    use secrecy::SecretString;
    use tokio_util::sync::CancellationToken;

    use super::*;

    const KEY: &str = "whsec_test";

    fn state(dev: bool) -> AppState {
        let config = FnsConfig {
            dev,
            signing_key: Some(SecretString::from(KEY.to_string())),
            ..FnsConfig::default()
        };
        AppState::init(&config, CancellationToken::new()).unwrap()
    }

    fn event(name: &str) -> Bytes {
        Bytes::from(json!({ "id": "exec-1", "run_id": "run-1", "name": name }).to_string())
    }

    fn signed(body: &Bytes, key: &str) -> HeaderMap {
        let raw = std::str::from_utf8(body).unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let value = sign(raw, &SecretString::from(key.to_string()), now).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&value).unwrap());
        headers
    }

    async fn rejection(err: AppError) -> String {
        let response = err.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_config_lists_bundled_functions() {
        let Json(config) = get_config(State(state(true))).await;
        let names: Vec<_> = config.definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["HelloWorld", "LockerToUnlock"]);
        assert_eq!(config.checksum.len(), 64);
    }

    #[tokio::test]
    async fn test_signed_event_is_invoked() {
        let body = event("HelloWorld");
        let headers = signed(&body, KEY);
        let Json(response) = post_event(State(state(false)), headers, body).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Incomplete);
        assert_eq!(response.mutations.len(), 1);
    }

    #[tokio::test]
    async fn test_forged_signature_is_rejected() {
        let body = event("HelloWorld");
        let headers = signed(&body, "not-the-key");
        let err = post_event(State(state(false)), headers, body).await.unwrap_err();
        assert_eq!(rejection(err).await, "Webhook Error: invalid signature");
    }

    #[tokio::test]
    async fn test_dev_mode_accepts_unsigned_events() {
        let Json(response) = post_event(State(state(true)), HeaderMap::new(), event("LockerToUnlock"))
            .await
            .unwrap();
        assert_eq!(response.mutations[0].id(), "acquire-door");
    }

    #[tokio::test]
    async fn test_malformed_history_gets_error_envelope() {
        let body = Bytes::from(
            json!({
                "id": "exec-1",
                "run_id": "run-1",
                "name": "LockerToUnlock",
                "steps": [{ "id": "sig-1", "type": "signal", "params": null, "status": "completed" }]
            })
            .to_string(),
        );
        let Json(response) = post_event(State(state(true)), HeaderMap::new(), body).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(!response.error.unwrap().retryable);
    }

    #[tokio::test]
    async fn test_unknown_function_is_rejected() {
        let err = post_event(State(state(true)), HeaderMap::new(), event("Ghost"))
            .await
            .unwrap_err();
        assert_eq!(rejection(err).await, "Webhook Error: Function Ghost not found");
    }

    #[tokio::test]
    async fn test_shutdown_aborts_new_invocations() {
        let state = state(true);
        state.shutdown.cancel();
        let err = post_event(State(state), HeaderMap::new(), event("HelloWorld"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Handler(fns_core::HandlerError::Aborted)));
    }

    #[tokio::test]
    async fn test_health_reports_registry() {
        let Json(body) = health(State(state(true))).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["functions"], 2);
    }
}
