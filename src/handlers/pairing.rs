//! Controle do pareamento do WhatsApp via HTTP
//!
//! Cada POST executa um comando na máquina de pareamento e responde com o
//! estado resultante.

use axum::{extract::State, response::Json};
use std::sync::Arc;

use crate::models::{PairingSnapshot, SendMessageBody};
use crate::services::PairingCommand;
use crate::utils::logging::*;
use crate::utils::AppResult;
use crate::AppState;

/// `GET /api/whatsapp/pareamento`
pub async fn pairing_status(State(state): State<Arc<AppState>>) -> Json<PairingSnapshot> {
    log_request_received("/api/whatsapp/pareamento", "GET");
    Json(state.pairing.snapshot())
}

/// `POST /api/whatsapp/pareamento/gerar`
pub async fn generate_code(State(state): State<Arc<AppState>>) -> AppResult<Json<PairingSnapshot>> {
    log_request_received("/api/whatsapp/pareamento/gerar", "POST");
    Ok(Json(state.pairing.execute(PairingCommand::GenerateCode).await?))
}

/// `POST /api/whatsapp/pareamento/verificar`
pub async fn check_connection(State(state): State<Arc<AppState>>) -> AppResult<Json<PairingSnapshot>> {
    log_request_received("/api/whatsapp/pareamento/verificar", "POST");
    Ok(Json(state.pairing.execute(PairingCommand::CheckConnection).await?))
}

/// `POST /api/whatsapp/pareamento/webhook`
pub async fn configure_webhook(State(state): State<Arc<AppState>>) -> AppResult<Json<PairingSnapshot>> {
    log_request_received("/api/whatsapp/pareamento/webhook", "POST");
    Ok(Json(state.pairing.execute(PairingCommand::ConfigureWebhook).await?))
}

/// `POST /api/whatsapp/pareamento/mensagem`
///
/// Campos vazios não são rejeitados aqui: a máquina responde com uma
/// notificação de aviso, como a tela fazia.
pub async fn send_test_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendMessageBody>,
) -> AppResult<Json<PairingSnapshot>> {
    log_request_received("/api/whatsapp/pareamento/mensagem", "POST");
    let command = PairingCommand::SendMessage {
        phone: body.phone,
        text: body.text,
    };
    Ok(Json(state.pairing.execute(command).await?))
}
