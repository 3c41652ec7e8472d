use serde::{Deserialize, Serialize};

/// Corpo de `POST /api/whatsapp/pareamento/mensagem`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessageBody {
    #[serde(default, alias = "telefone")]
    pub phone: String,
    #[serde(default, alias = "mensagem")]
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_portuguese_aliases() {
        let body: SendMessageBody =
            serde_json::from_str(r#"{"telefone": "11999990000", "mensagem": "Olá"}"#).unwrap();
        assert_eq!(body.phone, "11999990000");
        assert_eq!(body.text, "Olá");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let body: SendMessageBody = serde_json::from_str("{}").unwrap();
        assert!(body.phone.is_empty());
        assert!(body.text.is_empty());
    }
}
