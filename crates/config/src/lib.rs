//! Environment-driven configuration for the translation worker.

mod error;
mod settings;

pub use error::{ConfigError, Result};
pub use settings::Settings;
