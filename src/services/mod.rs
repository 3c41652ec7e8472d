pub mod pairing;
pub mod pairing_backend;

pub use pairing::{PairingCommand, PairingHandle, PairingTiming};
pub use pairing_backend::{PairingBackend, QuepasaBackend};
