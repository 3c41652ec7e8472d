use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use financeiro::FinanceiroError;
use quepasa::QuepasaError;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    RelayError(String),
    FinanceiroError(String),
    ConfigError(String),
    ValidationError(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::RelayError(msg) => write!(f, "Relay error: {}", msg),
            AppError::FinanceiroError(msg) => write!(f, "Financeiro API error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<QuepasaError> for AppError {
    // Falhas do middleware viram 500 no relay: o navegador só precisa da mensagem
    fn from(err: QuepasaError) -> Self {
        match err {
            QuepasaError::ConfigError(msg) => AppError::ConfigError(msg),
            other => AppError::RelayError(other.to_string()),
        }
    }
}

impl From<FinanceiroError> for AppError {
    fn from(err: FinanceiroError) -> Self {
        AppError::FinanceiroError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::RelayError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::FinanceiroError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = json!({
            "error": error_message,
            "status": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
