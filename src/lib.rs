// Biblioteca do relay de contratos
// Expõe módulos para uso em testes e no binário

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use quepasa::{GatewayClient, MiddlewareClient, WebhookConfig};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::{PairingHandle, PairingTiming, QuepasaBackend};
use crate::utils::{AppError, AppResult};

// AppState é definido aqui para ser compartilhado
#[derive(Clone)]
pub struct AppState {
    pub settings: config::Settings,
    pub middleware: MiddlewareClient,
    pub gateway: GatewayClient,
    pub financeiro: financeiro::FinanceiroClient,
    pub financeiro_session: Arc<RwLock<financeiro::Session>>,
    pub pairing: PairingHandle,
}

impl AppState {
    /// Monta os clientes e inicia a máquina de pareamento
    ///
    /// Precisa rodar dentro de uma runtime tokio.
    pub fn from_settings(settings: config::Settings) -> AppResult<Self> {
        let middleware = MiddlewareClient::with_timeouts(
            settings.middleware.base_url.clone(),
            settings.middleware.timeout_seconds,
            5,
        )
        .map_err(|e| AppError::ConfigError(e.to_string()))?
        .with_user(settings.middleware.user.clone())
        .with_token(settings.middleware.token.clone());

        let gateway = GatewayClient::new(settings.gateway.base_url.clone())
            .map_err(|e| AppError::ConfigError(e.to_string()))?
            .with_credentials(settings.gateway.user.clone(), settings.gateway.password.clone())
            .with_bot_id(settings.gateway.effective_bot_id(&settings.middleware));

        let financeiro = financeiro::FinanceiroClient::new(settings.financeiro.base_url.clone())
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        let backend = QuepasaBackend::new(
            middleware.clone(),
            gateway.clone(),
            WebhookConfig {
                url: settings.gateway.webhook_url.clone(),
                forwardinternal: settings.gateway.forward_internal,
            },
        );
        let pairing = PairingHandle::spawn(Arc::new(backend), PairingTiming::from(&settings.pairing));

        Ok(Self {
            settings,
            middleware,
            gateway,
            financeiro,
            financeiro_session: Arc::new(RwLock::new(financeiro::Session::new())),
            pairing,
        })
    }

    /// Login na API financeira com as credenciais da configuração
    ///
    /// Devolve `false` sem chamar a API quando usuário ou senha faltam.
    pub async fn login_financeiro(&self) -> AppResult<bool> {
        let credentials = &self.settings.financeiro;
        let (Some(username), Some(password)) = (&credentials.username, &credentials.password) else {
            return Ok(false);
        };

        let mut session = financeiro::Session::new();
        self.financeiro
            .authenticate(&mut session, username, password, false)
            .await?;

        *self.financeiro_session.write().await = session;
        Ok(true)
    }
}

/// Rotas do relay, do pareamento e de health check
pub fn build_router(state: Arc<AppState>) -> Router {
    use handlers::*;

    let cors = middleware::cors_layer(&state.settings.server.allowed_origins);

    Router::new()
        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/status", get(status_check))

        // Relay CORS para o middleware de mensagens
        .route("/test", get(relay_test))
        .route("/api/whatsapp/conecta", get(conecta))
        .route("/api/whatsapp/verificaconexao", get(verifica_conexao))
        .route("/api/whatsapp/enviarmsg", post(enviar_mensagem))

        // Pareamento
        .route("/api/whatsapp/pareamento", get(pairing_status))
        .route("/api/whatsapp/pareamento/gerar", post(generate_code))
        .route("/api/whatsapp/pareamento/verificar", post(check_connection))
        .route("/api/whatsapp/pareamento/webhook", post(configure_webhook))
        .route("/api/whatsapp/pareamento/mensagem", post(send_test_message))

        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
