pub mod pairing;
pub mod relay;

pub use pairing::{Notification, NotificationLevel, PairingSnapshot, PairingState};
pub use relay::SendMessageBody;
