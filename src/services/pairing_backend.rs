//! Serviços externos usados pelo pareamento
//!
//! O trait isola a máquina de pareamento dos clientes HTTP; em produção
//! [`QuepasaBackend`] combina o middleware e o gateway.

use async_trait::async_trait;
use quepasa::{
    GatewayClient, HealthResponse, MiddlewareClient, SendMessageRequest, SendMessageResponse,
    SessionProbe, UpstreamResponse, WebhookConfig,
};
use serde_json::Value;

#[async_trait]
pub trait PairingBackend: Send + Sync + 'static {
    /// Estado da sessão (`verificaconexao`)
    async fn probe_session(&self) -> quepasa::Result<SessionProbe>;

    /// Resposta crua do `conecta`
    async fn request_qr_code(&self) -> quepasa::Result<UpstreamResponse>;

    async fn health(&self) -> quepasa::Result<HealthResponse>;

    async fn register_webhook(&self) -> quepasa::Result<Value>;

    async fn send_message(&self, request: &SendMessageRequest) -> quepasa::Result<SendMessageResponse>;

    /// URL que deve constar nos webhooks da sessão
    fn webhook_url(&self) -> &str;
}

pub struct QuepasaBackend {
    middleware: MiddlewareClient,
    gateway: GatewayClient,
    webhook: WebhookConfig,
}

impl QuepasaBackend {
    pub fn new(middleware: MiddlewareClient, gateway: GatewayClient, webhook: WebhookConfig) -> Self {
        Self {
            middleware,
            gateway,
            webhook,
        }
    }
}

#[async_trait]
impl PairingBackend for QuepasaBackend {
    async fn probe_session(&self) -> quepasa::Result<SessionProbe> {
        self.middleware.probe_session().await
    }

    async fn request_qr_code(&self) -> quepasa::Result<UpstreamResponse> {
        self.middleware.conecta().await
    }

    async fn health(&self) -> quepasa::Result<HealthResponse> {
        self.gateway.health().await
    }

    async fn register_webhook(&self) -> quepasa::Result<Value> {
        self.gateway.register_webhook(&self.webhook).await
    }

    async fn send_message(&self, request: &SendMessageRequest) -> quepasa::Result<SendMessageResponse> {
        self.middleware.send_message(request).await
    }

    fn webhook_url(&self) -> &str {
        &self.webhook.url
    }
}
