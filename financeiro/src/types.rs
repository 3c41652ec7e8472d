//! Registros da API financeira
//!
//! Clientes, contratos e planos são documentos opacos: o sistema só precisa
//! extrair o identificador (para deduplicação) e alguns campos de exibição.
//! O ID aparece com nomes diferentes conforme o endpoint e pode vir como
//! string ou número.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static CPF_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{3}\.?\d{3}\.?\d{3}-?\d{2}|\d{11})$").expect("regex de CPF válida"));

/// Tipo de registro listado com paginação "carregar mais"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Cliente,
    PlanoPagamento,
}

impl RecordKind {
    /// Campos candidatos a ID, em ordem de preferência
    pub fn id_fields(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Cliente => &["ClientesID", "ID", "id"],
            RecordKind::PlanoPagamento => &["ID", "id"],
        }
    }

    /// Caminho da coleção na API
    pub fn collection_path(&self) -> &'static str {
        match self {
            RecordKind::Cliente => "/clientes/",
            RecordKind::PlanoPagamento => "/planos-pagamentos/",
        }
    }

    /// Limite de registros acumulados enquanto páginas só trazem duplicatas
    pub fn default_ceiling(&self) -> usize {
        match self {
            RecordKind::Cliente => 512,
            RecordKind::PlanoPagamento => 1000,
        }
    }

    /// Extrai o ID de um registro (string ou número, nunca vazio/zero)
    pub fn record_id(&self, record: &Value) -> Option<String> {
        self.id_fields().iter().find_map(|field| match record.get(*field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.as_i64() != Some(0) => Some(n.to_string()),
            _ => None,
        })
    }
}

/// Normaliza respostas de listagem: array puro ou `{ results: [...] }`
pub fn records_from(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// `true` para termos no formato de CPF (`000.000.000-00` ou 11 dígitos)
pub fn is_cpf(term: &str) -> bool {
    CPF_PATTERN.is_match(term.trim())
}

/// Nome de exibição (a API usa `Nome` ou `nome`)
pub fn display_name(record: &Value) -> Option<&str> {
    record
        .get("Nome")
        .or_else(|| record.get("nome"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_preference() {
        let cliente = json!({"ClientesID": 42, "ID": 7, "Nome": "Ana"});
        assert_eq!(RecordKind::Cliente.record_id(&cliente).as_deref(), Some("42"));
        assert_eq!(RecordKind::PlanoPagamento.record_id(&cliente).as_deref(), Some("7"));

        let by_lowercase = json!({"id": "abc"});
        assert_eq!(RecordKind::Cliente.record_id(&by_lowercase).as_deref(), Some("abc"));

        assert_eq!(RecordKind::Cliente.record_id(&json!({"ID": 0})), None);
        assert_eq!(RecordKind::Cliente.record_id(&json!({"Nome": "sem id"})), None);
    }

    #[test]
    fn test_records_from_shapes() {
        assert_eq!(records_from(json!([{"id": 1}, {"id": 2}])).len(), 2);
        assert_eq!(records_from(json!({"results": [{"id": 1}]})).len(), 1);
        assert!(records_from(json!({"detail": "vazio"})).is_empty());
        assert!(records_from(json!(null)).is_empty());
    }

    #[test]
    fn test_cpf_detection() {
        assert!(is_cpf("123.456.789-09"));
        assert!(is_cpf("12345678909"));
        assert!(is_cpf(" 123456789-09 "));
        assert!(!is_cpf("Maria Silva"));
        assert!(!is_cpf("1234567890"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(&json!({"Nome": "Plano Ouro"})), Some("Plano Ouro"));
        assert_eq!(display_name(&json!({"nome": "plano"})), Some("plano"));
        assert_eq!(display_name(&json!({})), None);
    }
}
