use serde::{Deserialize, Serialize};
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub middleware: MiddlewareSettings,
    pub gateway: GatewaySettings,
    pub financeiro: FinanceiroSettings,
    pub pairing: PairingSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,  // Vazio = CORS permissivo
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MiddlewareSettings {
    pub base_url: String,
    pub user: Option<String>,   // X-QUEPASA-USER
    pub token: Option<String>,  // X-QUEPASA-TOKEN / TOKEN
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewaySettings {
    pub base_url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub bot_id: Option<String>,  // Sem valor: usa o token do middleware
    pub webhook_url: String,
    pub forward_internal: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FinanceiroSettings {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PairingSettings {
    pub qr_lifetime_seconds: u64,
    pub poll_interval_seconds: u64,
    pub extended_checks: u32,
    pub final_probe_delay_ms: u64,
    pub probe_on_startup: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for MiddlewareSettings {
    fn default() -> Self {
        Self {
            base_url: "http://middleware.vstec.net".to_string(),
            user: None,
            token: None,
            timeout_seconds: 30,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: "https://apiwpp.vstec.net".to_string(),
            user: None,
            password: None,
            bot_id: None,
            webhook_url: "http://financeiro.vstec.net/webhooks/webhook".to_string(),
            forward_internal: true,
        }
    }
}

impl Default for FinanceiroSettings {
    fn default() -> Self {
        Self {
            base_url: "http://financeiro.vstec.net".to_string(),
            username: None,
            password: None,
        }
    }
}

impl Default for PairingSettings {
    fn default() -> Self {
        Self {
            qr_lifetime_seconds: 20,
            poll_interval_seconds: 3,
            extended_checks: 3,
            final_probe_delay_ms: 1000,
            probe_on_startup: true,
        }
    }
}

impl GatewaySettings {
    /// Bot id efetivo: configurado ou, na falta, o token do middleware
    pub fn effective_bot_id(&self, middleware: &MiddlewareSettings) -> Option<String> {
        self.bot_id.clone().or_else(|| middleware.token.clone())
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            // Arquivo de configuração base
            .add_source(File::with_name("config/default").required(false))
            // Arquivo específico do ambiente
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        // Credenciais só via ambiente (nunca versionadas)
        for (var, key) in [
            ("QUEPASA_USER", "middleware.user"),
            ("QUEPASA_TOKEN", "middleware.token"),
            ("QUEPASA_GATEWAY_USER", "gateway.user"),
            ("QUEPASA_PASSWORD", "gateway.password"),
            ("QUEPASA_BOT_ID", "gateway.bot_id"),
            ("FINANCEIRO_USERNAME", "financeiro.username"),
            ("FINANCEIRO_PASSWORD", "financeiro.password"),
        ] {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        // O gateway usa o mesmo usuário do middleware quando não há um específico
        if std::env::var("QUEPASA_GATEWAY_USER").is_err() {
            if let Ok(user) = std::env::var("QUEPASA_USER") {
                builder = builder.set_override("gateway.user", user)?;
            }
        }

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        // CONTRATOS__SERVER__PORT, CONTRATOS__GATEWAY__WEBHOOK_URL, ...
        builder = builder.add_source(Environment::with_prefix("CONTRATOS").separator("__"));

        let s = builder.build()?;

        s.try_deserialize()
    }
}
