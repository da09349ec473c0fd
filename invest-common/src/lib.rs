//! Invest Common - Shared configuration, logging, and error types for the stock-invest services.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.stock-invest/config.json`)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup with noise filtering

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, NetworkConfig, ObservabilityConfig, ProviderConfig, ProviderKind, ScannerConfig,
    ScriptConfig, TigerConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, ProviderConfig, ScannerConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
