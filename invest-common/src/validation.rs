//! Configuration validation.
//!
//! Checks that required values are present and within valid ranges before
//! the service starts taking requests.

use thiserror::Error;

use crate::config::{
    Config, NetworkConfig, ObservabilityConfig, ProviderConfig, ProviderKind, ScannerConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 4] = [
            &self.network,
            &self.observability,
            &self.provider,
            &self.scanner,
        ];

        let mut errors: Vec<ValidationError> = sections
            .iter()
            .filter_map(|section| section.validate().err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load, apply environment overrides, and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "network.port".into(),
            });
        }

        if self.bind.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "network.bind".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for ProviderConfig {
    fn validate(&self) -> ValidationResult<()> {
        let kind = self
            .provider_kind()
            .map_err(|reason| ValidationError::InvalidValue {
                field: "provider.kind".into(),
                reason,
            })?;

        match kind {
            ProviderKind::Tiger => {
                let credentials = [
                    ("provider.tiger.tiger_id", &self.tiger.tiger_id),
                    ("provider.tiger.account", &self.tiger.account),
                    ("provider.tiger.private_key", &self.tiger.private_key),
                ];
                let mut missing: Vec<ValidationError> = credentials
                    .iter()
                    .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
                    .map(|(field, _)| ValidationError::MissingField {
                        field: (*field).into(),
                    })
                    .collect();

                if missing.len() == 1 {
                    return Err(missing.remove(0));
                }
                if !missing.is_empty() {
                    return Err(ValidationError::Multiple(missing));
                }

                if self.tiger.rate_limit_rpm == 0 {
                    return Err(ValidationError::InvalidValue {
                        field: "provider.tiger.rate_limit_rpm".into(),
                        reason: "must be greater than 0".into(),
                    });
                }
            }
            ProviderKind::YFinance | ProviderKind::TwelveData => {
                if self.script.interpreter.trim().is_empty() {
                    return Err(ValidationError::MissingField {
                        field: "provider.script.interpreter".into(),
                    });
                }
                if self.script.timeout_secs == 0 {
                    return Err(ValidationError::InvalidValue {
                        field: "provider.script.timeout_secs".into(),
                        reason: "must be greater than 0".into(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Validate for ScannerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !matches!(self.market.trim().to_uppercase().as_str(), "US" | "HK" | "CN") {
            errors.push(ValidationError::InvalidValue {
                field: "scanner.market".into(),
                reason: format!("'{}' is not one of US, HK, CN", self.market),
            });
        }

        if self.batch_size == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "scanner.batch_size".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.overfetch_factor == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "scanner.overfetch_factor".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.concurrency == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "scanner.concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.min_bars < 7 {
            errors.push(ValidationError::InvalidValue {
                field: "scanner.min_bars".into(),
                reason: "the volume pattern needs at least 7 bars".into(),
            });
        }

        if self.min_price < 0.0 || self.max_price < 0.0 {
            errors.push(ValidationError::InvalidValue {
                field: "scanner.min_price".into(),
                reason: "prices must not be negative".into(),
            });
        } else if self.min_price > self.max_price {
            errors.push(ValidationError::Conflict {
                reason: format!(
                    "scanner.min_price ({}) is greater than scanner.max_price ({})",
                    self.min_price, self.max_price
                ),
            });
        }

        if self.scan_timeout_secs == Some(0) {
            errors.push(ValidationError::InvalidValue {
                field: "scanner.scan_timeout_secs".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::default();
        config.network.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPort { port: 0, .. })
        ));
    }

    #[test_case("verbose" ; "unknown level")]
    #[test_case("" ; "empty level")]
    fn test_invalid_log_level(level: &str) {
        let config = ObservabilityConfig {
            log_level: level.into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unknown_provider_kind() {
        let config = ProviderConfig {
            kind: "alpaca".into(),
            ..Default::default()
        };
        match config.validate() {
            Err(ValidationError::InvalidValue { field, .. }) => assert_eq!(field, "provider.kind"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_tiger_requires_credentials() {
        let mut config = ProviderConfig {
            kind: "tiger".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::Multiple(ref e)) if e.len() == 3));

        config.tiger.tiger_id = Some("20150001".into());
        config.tiger.account = Some("DU575569".into());
        match config.validate() {
            Err(ValidationError::MissingField { field }) => {
                assert_eq!(field, "provider.tiger.private_key")
            }
            other => panic!("unexpected: {:?}", other),
        }

        config.tiger.private_key = Some("MIIEvQ".into());
        assert!(config.validate().is_ok());
    }

    #[test_case(0, 2, 1, 7 ; "zero batch size")]
    #[test_case(10, 0, 1, 7 ; "zero overfetch")]
    #[test_case(10, 2, 0, 7 ; "zero concurrency")]
    #[test_case(10, 2, 1, 6 ; "too few bars")]
    fn test_invalid_scanner_policy(batch: usize, overfetch: usize, concurrency: usize, bars: usize) {
        let config = ScannerConfig {
            batch_size: batch,
            overfetch_factor: overfetch,
            concurrency,
            min_bars: bars,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_price_band_conflict() {
        let config = ScannerConfig {
            min_price: 1.0,
            max_price: 0.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::Conflict { .. })));
    }

    #[test_case("LSE" ; "unsupported market")]
    #[test_case("" ; "empty market")]
    fn test_invalid_market(market: &str) {
        let config = ScannerConfig {
            market: market.into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "scanner.market"
        ));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let config = ScannerConfig {
            batch_size: 0,
            overfetch_factor: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::Multiple(ref e)) if e.len() == 2));
    }
}
