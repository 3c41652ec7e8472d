pub mod error;
pub mod logging;

pub use error::*;
pub use quepasa::truncate_safe;
