//! Estado público do pareamento do WhatsApp
//!
//! O [`PairingSnapshot`] é o que a tela de pareamento consome: estado atual,
//! mensagem de status, último erro e as notificações recentes.

use chrono::{DateTime, Utc};
use quepasa::QrCode;
use serde::Serialize;
use std::collections::VecDeque;

/// Quantidade de notificações mantidas no histórico
pub const NOTIFICATION_HISTORY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PairingState {
    Idle,
    Generating,
    AwaitingScan { qr: QrCode, seconds_left: u64 },
    Verifying { attempt: u32 },
    Connected,
}

impl PairingState {
    pub fn name(&self) -> &'static str {
        match self {
            PairingState::Idle => "idle",
            PairingState::Generating => "generating",
            PairingState::AwaitingScan { .. } => "awaiting_scan",
            PairingState::Verifying { .. } => "verifying",
            PairingState::Connected => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, PairingState::Connected)
    }

    pub fn qr_code(&self) -> Option<&QrCode> {
        match self {
            PairingState::AwaitingScan { qr, .. } => Some(qr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

/// Aviso exibido ao usuário (antes um modal do navegador)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairingSnapshot {
    #[serde(flatten)]
    pub state: PairingState,
    pub status_message: Option<String>,
    pub last_error: Option<String>,
    pub notifications: VecDeque<Notification>,
}

impl Default for PairingSnapshot {
    fn default() -> Self {
        Self {
            state: PairingState::Idle,
            status_message: None,
            last_error: None,
            notifications: VecDeque::new(),
        }
    }
}

impl PairingSnapshot {
    /// Acrescenta ao histórico descartando as mais antigas
    pub fn notify(&mut self, notification: Notification) {
        if self.notifications.len() == NOTIFICATION_HISTORY {
            self.notifications.pop_front();
        }
        self.notifications.push_back(notification);
    }

    pub fn last_notification(&self) -> Option<&Notification> {
        self.notifications.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_serialization_flattens_state() {
        let snapshot = PairingSnapshot {
            state: PairingState::AwaitingScan {
                qr: QrCode::Code("2@abc".to_string()),
                seconds_left: 20,
            },
            ..Default::default()
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["state"], "awaiting_scan");
        assert_eq!(value["seconds_left"], 20);
        assert_eq!(value["qr"], json!({"format": "code", "data": "2@abc"}));
    }

    #[test]
    fn test_notification_history_is_bounded() {
        let mut snapshot = PairingSnapshot::default();
        for i in 0..(NOTIFICATION_HISTORY + 5) {
            snapshot.notify(Notification::new(NotificationLevel::Warning, "Atenção!", i.to_string()));
        }
        assert_eq!(snapshot.notifications.len(), NOTIFICATION_HISTORY);
        assert_eq!(snapshot.notifications.front().unwrap().text, "5");
        assert_eq!(
            snapshot.last_notification().unwrap().text,
            (NOTIFICATION_HISTORY + 4).to_string()
        );
    }

    #[test]
    fn test_state_helpers() {
        assert!(PairingState::Connected.is_connected());
        assert_eq!(PairingState::Verifying { attempt: 1 }.name(), "verifying");
        assert!(PairingState::Idle.qr_code().is_none());
    }
}
