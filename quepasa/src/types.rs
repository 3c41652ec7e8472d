//! Documentos trocados com o middleware e com o gateway
//!
//! ## ⚠️ Notas Importantes
//!
//! - **verificaconexao** responde em dois formatos: o envelope novo
//!   `{status: 1, data: {success, server}}` e o formato antigo `{success, server}`.
//!   Um `1` solto ou `{status: 0}` significa desconectado.
//! - **health** só indica sessão pronta quando `items[0].status == "Ready"`.
//! - **conecta** pode devolver PNG, JSON com `qrcode` ou texto livre.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text::truncate_safe;

/// Status reportado pelo gateway quando a sessão está pareada
pub const READY_STATUS: &str = "Ready";

/// Palavras que identificam um QR Code em respostas de texto livre
const QR_TEXT_MARKERS: [&str; 3] = ["qrcode", "QR", "PNG"];

/// Tipo de conteúdo de uma resposta do middleware, usado para decidir o relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Png,
    Json,
    Text,
}

impl ContentKind {
    /// Classifica pelo header `Content-Type` (ausente = texto)
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.contains("image/png") => ContentKind::Png,
            Some(ct) if ct.contains("application/json") => ContentKind::Json,
            _ => ContentKind::Text,
        }
    }
}

/// Resposta crua do middleware, repassada sem interpretação pelo relay
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn kind(&self) -> ContentKind {
        ContentKind::from_content_type(self.content_type.as_deref())
    }

    /// Corpo como texto (bytes inválidos em UTF-8 são substituídos)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Corpo como JSON
    pub fn json(&self) -> crate::Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Resposta do endpoint `/health` do gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub items: Vec<HealthItem>,
}

/// Sessão individual listada pelo `/health`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthItem {
    #[serde(default)]
    pub status: String,

    /// Demais campos do gateway (wid, número, etc.)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl HealthResponse {
    /// Status da primeira sessão, quando existir
    pub fn first_status(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.items.first().map(|item| item.status.as_str())
    }

    /// `true` quando a primeira sessão está pronta
    pub fn is_ready(&self) -> bool {
        self.first_status() == Some(READY_STATUS)
    }
}

/// Resultado interpretado do `verificaconexao`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionProbe {
    pub verified: bool,
    pub wid: Option<String>,
    pub user: Option<String>,
    /// URLs dos webhooks já registrados no provedor
    pub webhooks: Vec<String>,
}

impl SessionProbe {
    /// Interpreta qualquer um dos dois formatos de resposta
    pub fn from_value(value: &Value) -> Self {
        let server = if value.get("status").and_then(Value::as_i64) == Some(1) {
            value
                .get("data")
                .filter(|data| data.get("success").and_then(Value::as_bool) == Some(true))
                .and_then(|data| data.get("server"))
        } else if value.get("success").and_then(Value::as_bool) == Some(true) {
            value.get("server")
        } else {
            None
        };

        let Some(server) = server else {
            return Self::default();
        };

        if server.get("verified").and_then(Value::as_bool) != Some(true) {
            return Self::default();
        }

        let webhooks = server
            .get("webhooks")
            .and_then(Value::as_array)
            .map(|hooks| {
                hooks
                    .iter()
                    .filter_map(|hook| hook.get("url").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            verified: true,
            wid: server.get("wid").and_then(Value::as_str).map(str::to_string),
            user: server.get("user").and_then(Value::as_str).map(str::to_string),
            webhooks,
        }
    }

    pub fn has_webhook(&self, url: &str) -> bool {
        self.webhooks.iter().any(|hook| hook == url)
    }
}

/// Corpo do registro de webhook do bot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    pub forwardinternal: bool,
}

/// Corpo aceito pelo `enviarmsg`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendMessageRequest {
    pub chatid: String,
    pub text: String,
}

impl SendMessageRequest {
    /// Monta o chat id brasileiro: `55` + número + `@s.whatsapp.net`
    pub fn for_phone(phone: &str, text: &str) -> Self {
        Self {
            chatid: format!("55{}@s.whatsapp.net", phone.trim()),
            text: text.trim().to_string(),
        }
    }
}

/// Resposta do `enviarmsg`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub message: Option<String>,
}

/// QR Code pronto para exibição
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", content = "data", rename_all = "snake_case")]
pub enum QrCode {
    /// `data:image/png;base64,...`
    DataUrl(String),
    /// Campo `qrcode` de uma resposta JSON
    Code(String),
    /// Texto livre que parece conter um QR Code (já truncado)
    Text(String),
}

impl QrCode {
    pub fn as_str(&self) -> &str {
        match self {
            QrCode::DataUrl(s) | QrCode::Code(s) | QrCode::Text(s) => s,
        }
    }

    /// Converte bytes PNG em data URL
    pub fn from_png(bytes: &[u8]) -> Self {
        QrCode::DataUrl(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
    }

    /// Classifica uma resposta 2xx do `conecta`
    ///
    /// PNG nunca passa pelo parser JSON. Texto livre é aceito apenas quando
    /// contém um dos marcadores `qrcode`, `QR` ou `PNG`.
    pub fn classify(response: &UpstreamResponse) -> crate::Result<Self> {
        match response.kind() {
            ContentKind::Png => Ok(Self::from_png(&response.body)),
            ContentKind::Json => {
                let value = response.json()?;
                value
                    .get("qrcode")
                    .and_then(Value::as_str)
                    .filter(|code| !code.is_empty())
                    .map(|code| QrCode::Code(code.to_string()))
                    .ok_or_else(|| {
                        crate::QuepasaError::UnexpectedResponse(
                            "API respondeu com JSON, mas sem QR Code na resposta".to_string(),
                        )
                    })
            }
            ContentKind::Text => {
                let text = response.text();
                if QR_TEXT_MARKERS.iter().any(|marker| text.contains(marker)) {
                    Ok(QrCode::Text(truncate_safe(&text, 500).to_string()))
                } else {
                    Err(crate::QuepasaError::UnexpectedResponse(format!(
                        "API respondeu com tipo não reconhecido: {} - Conteúdo: {}",
                        response.content_type.as_deref().unwrap_or("desconhecido"),
                        truncate_safe(&text, 200)
                    )))
                }
            }
        }
    }
}
