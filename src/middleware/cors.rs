use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::utils::logging::log_warning;

/// CORS do relay
///
/// Sem origens configuradas o relay aceita qualquer origem, como o proxy de
/// desenvolvimento sempre fez. Origens inválidas são ignoradas com aviso.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                log_warning(&format!("⚠️ Origem CORS inválida ignorada: {}", origin));
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    async fn allow_origin_for(allowed: &[String], origin: &str) -> Option<String> {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(cors_layer(allowed));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("origin", origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_permissive_without_configured_origins() {
        let header = allow_origin_for(&[], "http://localhost:3000").await;
        assert_eq!(header.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn test_restricted_to_configured_origins() {
        let allowed = vec!["http://contratos.vstec.net".to_string()];

        let header = allow_origin_for(&allowed, "http://contratos.vstec.net").await;
        assert_eq!(header.as_deref(), Some("http://contratos.vstec.net"));

        assert!(allow_origin_for(&allowed, "http://outro.site").await.is_none());
    }
}
