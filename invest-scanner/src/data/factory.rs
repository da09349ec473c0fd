//! Provider construction from configuration.

use std::sync::Arc;
use tracing::info;

use invest_common::config::{ProviderConfig, ProviderKind};

use super::cache::CachingProvider;
use super::provider::{ProviderInitError, SeriesProvider};
use super::script::{ScriptFlavor, ScriptProvider};
use super::tiger::TigerAdapter;

/// Build the configured provider.
///
/// Unknown provider keys and missing Tiger credentials are fatal. When
/// `cache_ttl_secs` is non-zero the provider is wrapped in a series cache.
pub fn build_provider(
    config: &ProviderConfig,
) -> Result<Arc<dyn SeriesProvider>, ProviderInitError> {
    let kind = config
        .provider_kind()
        .map_err(|_| ProviderInitError::UnknownProvider(config.kind.clone()))?;

    let provider: Arc<dyn SeriesProvider> = match kind {
        ProviderKind::Tiger => {
            let adapter = TigerAdapter::from_config(&config.tiger)?;
            info!(
                provider = "tiger",
                endpoint = %config.tiger.endpoint,
                rate_limit_rpm = config.tiger.rate_limit_rpm,
                "Registered Tiger provider"
            );
            Arc::new(adapter)
        }
        ProviderKind::YFinance => {
            let provider = ScriptProvider::from_config(ScriptFlavor::YFinance, &config.script);
            info!(
                provider = "yfinance",
                script = %config.script.yfinance_script.display(),
                "Registered yfinance provider"
            );
            Arc::new(provider)
        }
        ProviderKind::TwelveData => {
            let provider = ScriptProvider::from_config(ScriptFlavor::TwelveData, &config.script);
            info!(
                provider = "twelvedata",
                script = %config.script.twelvedata_script.display(),
                "Registered twelvedata provider"
            );
            Arc::new(provider)
        }
    };

    if config.cache_ttl_secs == 0 {
        return Ok(provider);
    }

    info!(ttl_secs = config.cache_ttl_secs, "Series cache enabled");
    Ok(Arc::new(CachingProvider::new(provider, config.cache_ttl_secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_script_providers() {
        let mut config = ProviderConfig::default();
        config.cache_ttl_secs = 0;

        config.kind = "yfinance".into();
        assert_eq!(build_provider(&config).unwrap().name(), "yfinance");

        config.kind = "TwelveData".into();
        assert_eq!(build_provider(&config).unwrap().name(), "twelvedata");
    }

    #[test]
    fn test_build_unknown_provider() {
        let config = ProviderConfig {
            kind: "bloomberg".into(),
            ..Default::default()
        };
        match build_provider(&config) {
            Err(ProviderInitError::UnknownProvider(kind)) => assert_eq!(kind, "bloomberg"),
            other => panic!("expected UnknownProvider, got {:?}", other.map(|p| p.name())),
        }
    }

    #[test]
    fn test_build_tiger_requires_credentials() {
        let config = ProviderConfig {
            kind: "tiger".into(),
            ..Default::default()
        };
        assert!(matches!(
            build_provider(&config),
            Err(ProviderInitError::MissingCredential("tiger_id"))
        ));
    }

    #[test]
    fn test_build_tiger_with_cache() {
        let mut config = ProviderConfig {
            kind: "tiger".into(),
            cache_ttl_secs: 60,
            ..Default::default()
        };
        config.tiger.tiger_id = Some("20150001".into());
        config.tiger.account = Some("DU575569".into());
        config.tiger.private_key = Some("MIIEvQ".into());

        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "tiger");
    }
}
