//! Tipos de erro para o crate financeiro

use thiserror::Error;

/// Erros do cliente da API financeira
#[derive(Debug, Error)]
pub enum FinanceiroError {
    /// Erro de requisição HTTP
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Erro da API (status code não-2xx)
    #[error("Financeiro API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Erro de autenticação (login recusado ou token ausente)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Erro de parsing JSON
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Erro de configuração
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Erro de validação (campo obrigatório vazio)
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Tipo Result padrão para o crate
pub type Result<T> = std::result::Result<T, FinanceiroError>;
