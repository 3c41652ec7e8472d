use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::utils::logging::*;
use crate::AppState;

pub async fn health_check() -> Json<Value> {
    log_health_check();

    Json(json!({
        "status": "healthy",
        "service": "contratos-middleware",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Pronto quando o gateway do WhatsApp responde ao `/health`
pub async fn ready_check(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    log_integration_status_check();

    let health = match state.gateway.health().await {
        Ok(health) => health,
        Err(e) => {
            log_upstream_error("/health", e.upstream_status(), &e.to_string());
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    };

    Ok(Json(json!({
        "ready": true,
        "service": "contratos-middleware",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "dependencies": {
            "gateway": {
                "status": "reachable",
                "session": health.first_status(),
                "session_ready": health.is_ready()
            }
        }
    })))
}

/// Resumo da configuração (nunca expõe credenciais)
pub async fn status_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    log_integration_status_check();

    let settings = &state.settings;
    let pairing = state.pairing.snapshot();
    let financeiro_authenticated = state.financeiro_session.read().await.is_authenticated();

    Json(json!({
        "service": "contratos-middleware",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string()),
        "integrations": {
            "middleware": {
                "base_url": state.middleware.base_url(),
                "user_configured": settings.middleware.user.is_some(),
                "token_configured": state.middleware.has_credentials()
            },
            "gateway": {
                "base_url": state.gateway.base_url(),
                "credentials_configured": settings.gateway.user.is_some() && settings.gateway.password.is_some(),
                "bot_id_configured": state.gateway.bot_id().is_some(),
                "webhook_url": settings.gateway.webhook_url
            },
            "financeiro": {
                "base_url": state.financeiro.base_url(),
                "credentials_configured": settings.financeiro.username.is_some() && settings.financeiro.password.is_some(),
                "authenticated": financeiro_authenticated
            }
        },
        "pairing": {
            "state": pairing.state.name(),
            "connected": pairing.state.is_connected()
        }
    }))
}
