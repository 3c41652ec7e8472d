//! Cliente HTTP para o middleware de mensagens (middleware.vstec.net)
//!
//! As respostas são devolvidas cruas ([`UpstreamResponse`]) porque o relay
//! repassa status, tipo de conteúdo e corpo exatamente como recebeu. Apenas
//! falhas de transporte viram erro aqui; status não-2xx é decisão de quem chama.

use crate::error::{QuepasaError, Result};
use crate::types::{SendMessageRequest, SendMessageResponse, SessionProbe, UpstreamResponse};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// Cliente do middleware de mensagens
#[derive(Clone, Debug)]
pub struct MiddlewareClient {
    http_client: HttpClient,
    base_url: String,
    user: Option<String>,
    token: Option<String>,
}

impl MiddlewareClient {
    /// Cria um novo cliente
    ///
    /// # Timeouts
    ///
    /// - Total: 30s
    /// - Connect: 5s
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeouts(base_url, 30, 5)
    }

    /// Cria um novo cliente com timeouts customizados
    pub fn with_timeouts(
        base_url: impl Into<String>,
        total_timeout_secs: u64,
        connect_timeout_secs: u64,
    ) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(total_timeout_secs))
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .build()
            .map_err(|e| QuepasaError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: None,
            token: None,
        })
    }

    /// Usuário enviado em `X-QUEPASA-USER`
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Token enviado em `X-QUEPASA-TOKEN` / `TOKEN`
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credentials(&self) -> bool {
        self.token.is_some()
    }

    /// `GET /conecta`: solicita um QR Code (PNG, JSON ou texto)
    pub async fn conecta(&self) -> Result<UpstreamResponse> {
        let url = format!("{}/conecta", self.base_url);
        tracing::debug!("GET {}", url);

        let mut request = self
            .http_client
            .get(&url)
            .header("Accept", "application/json, image/png, */*");
        if let Some(user) = &self.user {
            request = request.header("X-QUEPASA-USER", user);
        }
        request = self.token_header(request, "X-QUEPASA-TOKEN");

        self.execute(request).await
    }

    /// `GET /verificaconexao`: estado da sessão pareada
    pub async fn verifica_conexao(&self) -> Result<UpstreamResponse> {
        let url = format!("{}/verificaconexao", self.base_url);
        tracing::debug!("GET {}", url);

        let request = self.http_client.get(&url).header("Accept", "application/json");
        let request = self.token_header(request, "X-QUEPASA-TOKEN");

        self.execute(request).await
    }

    /// `POST /enviarmsg`: repassa o corpo JSON sem alterações
    pub async fn enviar_mensagem(&self, body: &Value) -> Result<UpstreamResponse> {
        let url = format!("{}/enviarmsg", self.base_url);
        tracing::debug!("POST {} with body: {}", url, body);

        let request = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .json(body);
        let request = self.token_header(request, "TOKEN");

        self.execute(request).await
    }

    /// Consulta e interpreta o estado da sessão
    ///
    /// Status não-2xx vira [`QuepasaError::ApiError`].
    pub async fn probe_session(&self) -> Result<SessionProbe> {
        let response = self.verifica_conexao().await?;
        if !response.is_success() {
            return Err(QuepasaError::ApiError {
                status: response.status,
                message: response.text(),
            });
        }

        let value = response.json()?;
        let probe = SessionProbe::from_value(&value);
        tracing::debug!("Sessão verificada: {:?}", probe);
        Ok(probe)
    }

    /// Envia mensagem de texto e interpreta a resposta
    pub async fn send_message(&self, message: &SendMessageRequest) -> Result<SendMessageResponse> {
        let body = serde_json::to_value(message)?;
        let response = self.enviar_mensagem(&body).await?;

        if !response.is_success() {
            // O middleware costuma explicar a falha no campo "error"
            let message = response
                .json()
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("Erro HTTP: {}", response.status));
            return Err(QuepasaError::ApiError {
                status: response.status,
                message,
            });
        }

        Ok(serde_json::from_slice(&response.body)?)
    }

    fn token_header(&self, request: RequestBuilder, header: &str) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(header, token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<UpstreamResponse> {
        let response = request.send().await?;
        Self::capture(response).await
    }

    async fn capture(response: Response) -> Result<UpstreamResponse> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        tracing::debug!(
            "Middleware respondeu {} ({:?}, {} bytes)",
            status,
            content_type,
            body.len()
        );

        Ok(UpstreamResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentKind;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_client_creation_trims_base_url() {
        let client = MiddlewareClient::new("http://middleware.vstec.net/").unwrap();
        assert_eq!(client.base_url(), "http://middleware.vstec.net");
        assert!(!client.has_credentials());
    }

    #[tokio::test]
    async fn test_conecta_sends_credentials() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/conecta")
                    .header("x-quepasa-user", "ops@example.com")
                    .header("x-quepasa-token", "tok");
                then.status(200)
                    .header("content-type", "image/png")
                    .body([0x89u8, b'P', b'N', b'G']);
            })
            .await;

        let client = MiddlewareClient::new(server.base_url())
            .unwrap()
            .with_user(Some("ops@example.com".to_string()))
            .with_token(Some("tok".to_string()));

        let response = client.conecta().await.unwrap();
        mock.assert_async().await;
        assert!(response.is_success());
        assert_eq!(response.kind(), ContentKind::Png);
        assert_eq!(response.body, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_probe_session_parses_envelope() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/verificaconexao");
                then.status(200).json_body(json!({
                    "status": 1,
                    "data": {"success": true, "server": {"verified": true, "webhooks": []}}
                }));
            })
            .await;

        let client = MiddlewareClient::new(server.base_url()).unwrap();
        let probe = client.probe_session().await.unwrap();
        assert!(probe.verified);
    }

    #[tokio::test]
    async fn test_send_message_error_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/enviarmsg")
                    .header("token", "tok")
                    .json_body(json!({"chatid": "5511988887777@s.whatsapp.net", "text": "oi"}));
                then.status(400).json_body(json!({"error": "chat inválido"}));
            })
            .await;

        let client = MiddlewareClient::new(server.base_url())
            .unwrap()
            .with_token(Some("tok".to_string()));

        let err = client
            .send_message(&SendMessageRequest::for_phone("11988887777", "oi"))
            .await
            .unwrap_err();

        match err {
            QuepasaError::ApiError { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "chat inválido");
            }
            other => panic!("erro inesperado: {other:?}"),
        }
    }
}
