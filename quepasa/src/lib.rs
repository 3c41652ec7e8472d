//! Clientes do ecossistema WhatsApp usado pelo sistema de contratos
//!
//! Este crate cobre os dois serviços externos envolvidos no pareamento e no
//! envio de mensagens:
//!
//! - **Middleware** (`middleware.vstec.net`): `/conecta`, `/verificaconexao`, `/enviarmsg`
//! - **Gateway** (`apiwpp.vstec.net`): `/health`, `/v3/bot/{id}/webhook`
//!
//! # Exemplo Básico
//!
//! ```rust,ignore
//! use quepasa::{GatewayClient, MiddlewareClient};
//!
//! #[tokio::main]
//! async fn main() -> quepasa::Result<()> {
//!     // IMPORTANTE: credenciais vêm do ambiente (NUNCA hardcode!)
//!     let token = std::env::var("QUEPASA_TOKEN").ok();
//!
//!     let middleware = MiddlewareClient::new("http://middleware.vstec.net")?
//!         .with_token(token);
//!     let probe = middleware.probe_session().await?;
//!
//!     let gateway = GatewayClient::new("https://apiwpp.vstec.net")?;
//!     let ready = gateway.health().await?.is_ready();
//!
//!     println!("verified={} ready={}", probe.verified, ready);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod gateway;
pub mod middleware;
pub mod text;
pub mod types;

pub use error::{QuepasaError, Result};
pub use gateway::GatewayClient;
pub use middleware::MiddlewareClient;
pub use text::truncate_safe;
pub use types::{
    ContentKind, HealthItem, HealthResponse, QrCode, SendMessageRequest, SendMessageResponse,
    SessionProbe, UpstreamResponse, WebhookConfig, READY_STATUS,
};
