//! Relay CORS para o middleware de mensagens
//!
//! O navegador não fala direto com `middleware.vstec.net` (CORS); estas rotas
//! repassam a chamada com as credenciais da configuração e devolvem status,
//! tipo de conteúdo e corpo do upstream.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use quepasa::{ContentKind, UpstreamResponse};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;

use crate::utils::logging::*;
use crate::utils::{truncate_safe, AppError, AppResult};
use crate::AppState;

/// `GET /api/whatsapp/conecta`
pub async fn conecta(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let endpoint = "/api/whatsapp/conecta";
    let start_time = Instant::now();
    log_request_received(endpoint, "GET");

    let upstream = state.middleware.conecta().await.map_err(|e| {
        log_upstream_error("/conecta", e.upstream_status(), &e.to_string());
        AppError::from(e)
    })?;

    let response = relay_response(upstream, true)?;
    log_request_processed(endpoint, response.status().as_u16(), start_time.elapsed().as_millis() as u64);
    Ok(response)
}

/// `GET /api/whatsapp/verificaconexao`
pub async fn verifica_conexao(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let endpoint = "/api/whatsapp/verificaconexao";
    let start_time = Instant::now();
    log_request_received(endpoint, "GET");

    let upstream = state.middleware.verifica_conexao().await.map_err(|e| {
        log_upstream_error("/verificaconexao", e.upstream_status(), &e.to_string());
        AppError::from(e)
    })?;

    let response = relay_response(upstream, false)?;
    log_request_processed(endpoint, response.status().as_u16(), start_time.elapsed().as_millis() as u64);
    Ok(response)
}

/// `POST /api/whatsapp/enviarmsg` (corpo JSON repassado sem alterações)
///
/// O corpo é lido como JSON independente do `Content-Type`; vazio vira `{}`.
pub async fn enviar_mensagem(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Response> {
    let endpoint = "/api/whatsapp/enviarmsg";
    let start_time = Instant::now();
    log_request_received(endpoint, "POST");

    let body = message_body(&body)?;

    let upstream = state.middleware.enviar_mensagem(&body).await.map_err(|e| {
        log_upstream_error("/enviarmsg", e.upstream_status(), &e.to_string());
        AppError::from(e)
    })?;

    let response = relay_response(upstream, false)?;
    log_request_processed(endpoint, response.status().as_u16(), start_time.elapsed().as_millis() as u64);
    Ok(response)
}

/// `GET /test`
pub async fn relay_test() -> Json<Value> {
    log_request_received("/test", "GET");

    Json(json!({
        "message": "Proxy funcionando!",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn message_body(raw: &[u8]) -> AppResult<Value> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }

    serde_json::from_slice(raw).map_err(|e| {
        log_validation_error("body", &e.to_string());
        AppError::ValidationError(format!("Corpo da mensagem não é JSON válido: {}", e))
    })
}

/// Converte a resposta do middleware em resposta do relay
///
/// - não-2xx: mesmo status, JSON `{error, status, statusText}`
/// - `image/png` (só quando `allow_png`): bytes crus
/// - `application/json`: JSON
/// - resto: `text/plain`
fn relay_response(upstream: UpstreamResponse, allow_png: bool) -> AppResult<Response> {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);

    if !upstream.is_success() {
        let body = upstream.text();
        log_upstream_error("relay", Some(upstream.status), truncate_safe(&body, 200));
        let payload = json!({
            "error": body,
            "status": upstream.status,
            "statusText": upstream.status_text
        });
        return Ok((status, Json(payload)).into_response());
    }

    let response = match upstream.kind() {
        ContentKind::Png if allow_png => {
            log_info(&format!("🖼️ Repassando PNG ({} bytes)", upstream.body.len()));
            (status, [(header::CONTENT_TYPE, "image/png")], Body::from(upstream.body)).into_response()
        }
        ContentKind::Json => {
            let value = upstream.json().map_err(|e| {
                AppError::RelayError(format!("Resposta JSON inválida do middleware: {}", e))
            })?;
            (status, Json(value)).into_response()
        }
        _ => (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            upstream.text(),
        )
            .into_response(),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: u16, content_type: Option<&str>, body: &[u8]) -> UpstreamResponse {
        UpstreamResponse {
            status,
            status_text: "Service Unavailable".to_string(),
            content_type: content_type.map(str::to_string),
            body: body.to_vec(),
        }
    }

    fn content_type(response: &Response) -> &str {
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[test]
    fn test_png_is_passed_through_only_when_allowed() {
        let png = upstream(200, Some("image/png"), &[0x89, b'P', b'N', b'G']);

        let response = relay_response(png.clone(), true).unwrap();
        assert_eq!(content_type(&response), "image/png");

        let response = relay_response(png, false).unwrap();
        assert!(content_type(&response).starts_with("text/plain"));
    }

    #[test]
    fn test_invalid_json_is_a_relay_error() {
        let result = relay_response(upstream(200, Some("application/json"), b"{oops"), false);
        assert!(matches!(result, Err(AppError::RelayError(_))));
    }

    #[test]
    fn test_message_body_parsing() {
        assert_eq!(message_body(b"").unwrap(), json!({}));
        assert_eq!(
            message_body(br#"{"chatid": "x", "text": "oi"}"#).unwrap(),
            json!({"chatid": "x", "text": "oi"})
        );
        assert!(matches!(message_body(b"chatid=x"), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_non_success_keeps_status() {
        let response = relay_response(upstream(503, Some("text/plain"), b"fora do ar"), true).unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(content_type(&response).starts_with("application/json"));
    }
}
