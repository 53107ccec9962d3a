pub mod config;
pub mod error;
pub mod event;
pub mod signal;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{BatonError, Result};
pub use event::SignalBus;
pub use signal::{Signal, SignalType};
pub use types::*;
