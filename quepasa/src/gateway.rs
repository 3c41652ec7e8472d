//! Cliente do gateway WhatsApp (apiwpp.vstec.net)
//!
//! - **Health**: `GET /health`: estado das sessões do usuário
//! - **Webhook**: `POST /v3/bot/{bot_id}/webhook`: onde o gateway entrega eventos

use crate::error::{QuepasaError, Result};
use crate::types::{HealthResponse, WebhookConfig};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// Cliente do gateway QuePasa
#[derive(Clone, Debug)]
pub struct GatewayClient {
    http_client: HttpClient,
    base_url: String,
    user: Option<String>,
    password: Option<String>,
    bot_id: Option<String>,
}

impl GatewayClient {
    /// Cria um novo cliente (timeouts: 30s total, 5s connect)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| QuepasaError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: None,
            password: None,
            bot_id: None,
        })
    }

    /// Credenciais enviadas em `X-QUEPASA-USER` / `X-QUEPASA-PASSWORD`
    pub fn with_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }

    /// Identificador do bot usado no registro de webhook
    pub fn with_bot_id(mut self, bot_id: Option<String>) -> Self {
        self.bot_id = bot_id;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn bot_id(&self) -> Option<&str> {
        self.bot_id.as_deref()
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        tracing::debug!("GET {}", url);

        let request = self
            .authorize(self.http_client.get(&url))
            .header("Accept", "application/json");

        let response = Self::handle_response(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// `POST /v3/bot/{bot_id}/webhook`
    pub async fn register_webhook(&self, config: &WebhookConfig) -> Result<Value> {
        let bot_id = self
            .bot_id
            .as_deref()
            .ok_or_else(|| QuepasaError::ConfigError("bot id não configurado".to_string()))?;

        let url = format!("{}/v3/bot/{}/webhook", self.base_url, bot_id);
        tracing::debug!("POST {} with body: {:?}", url, config);

        let request = self
            .authorize(self.http_client.post(&url))
            .header("Accept", "application/json")
            .json(config);

        let response = Self::handle_response(request.send().await?).await?;
        let text = response.text().await?;

        // Alguns deployments respondem 200 com corpo vazio
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(user) = &self.user {
            request = request.header("X-QUEPASA-USER", user);
        }
        if let Some(password) = &self.password {
            request = request.header("X-QUEPASA-PASSWORD", password);
        }
        request
    }

    /// Processa a resposta HTTP e trata erros
    async fn handle_response(response: Response) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let status_code = status.as_u16();
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        tracing::error!("QuePasa gateway error ({}): {}", status_code, error_body);

        let message = match serde_json::from_str::<Value>(&error_body) {
            Ok(json) => json
                .get("message")
                .or_else(|| json.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or(&error_body)
                .to_string(),
            Err(_) => error_body,
        };

        Err(QuepasaError::ApiError {
            status: status_code,
            message,
        })
    }
}
