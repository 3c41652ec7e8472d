//! Tipos de erro para o crate quepasa

use thiserror::Error;

/// Erros dos clientes do middleware e do gateway
#[derive(Debug, Error)]
pub enum QuepasaError {
    /// Falha de transporte (conexão recusada, timeout, DNS)
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Upstream respondeu com status não-2xx
    #[error("QuePasa API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Erro de parsing JSON
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Erro de configuração (credencial ou bot id ausente)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Resposta em formato inesperado (tipo de conteúdo, campo ausente)
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl QuepasaError {
    /// Status HTTP do upstream quando o erro veio de uma resposta não-2xx
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            QuepasaError::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Tipo Result padrão para o crate
pub type Result<T> = std::result::Result<T, QuepasaError>;
