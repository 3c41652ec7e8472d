pub mod settings;

pub use settings::{
    FinanceiroSettings, GatewaySettings, MiddlewareSettings, PairingSettings, ServerSettings,
    Settings,
};
