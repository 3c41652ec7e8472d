// Handlers HTTP do servidor de relay
pub mod health;
pub mod pairing;
pub mod relay;

pub use health::*;
pub use pairing::*;
pub use relay::*;
