//! Runtime initializers: turn an account and a provider name into a ready runtime.
//!
//! This is the single place vendors are wired in. Adding a vendor means adding a
//! [`RuntimeProvider`] variant and a match arm here.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::lambdalabs::{self, LambdaLabs};
use crate::runtime::Runtime;
use crate::types::RuntimeProvider;

/// Builds runtimes on demand.
///
/// Implementations decide where provider credentials come from: process
/// configuration, a per-account secret store, or anything else.
#[async_trait]
pub trait Initializer: Send + Sync {
    async fn initialize(
        &self,
        account_id: Uuid,
        provider: RuntimeProvider,
    ) -> Result<Box<dyn Runtime>>;
}

/// Provider credentials and tuning for [`EnvInitializer`].
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// LambdaLabs API key.
    pub lambdalabs_api_key: Option<String>,
    /// LambdaLabs API base URL.
    pub lambdalabs_api_url: String,
    /// Interval between status polls when watching nodes.
    pub poll_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            lambdalabs_api_key: None,
            lambdalabs_api_url: lambdalabs::API_BASE_URL.to_string(),
            poll_interval: lambdalabs::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Initializer backed by process-wide configuration, shared by every account.
///
/// Meant for development and self-hosting.
#[derive(Debug, Clone, Default)]
pub struct EnvInitializer {
    config: ProviderConfig,
}

impl EnvInitializer {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Initializer for EnvInitializer {
    async fn initialize(
        &self,
        account_id: Uuid,
        provider: RuntimeProvider,
    ) -> Result<Box<dyn Runtime>> {
        debug!(account_id = %account_id, provider = %provider, "Initializing runtime");

        match provider {
            RuntimeProvider::LambdaLabs => {
                let api_key = self
                    .config
                    .lambdalabs_api_key
                    .as_deref()
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| {
                        Error::internal("Missing LambdaLabs API key in runtime config")
                            .with_provider(provider)
                            .with_suggestion("Set LAMBDALABS_API_KEY")
                    })?;
                let runtime =
                    LambdaLabs::with_base_url(api_key, self.config.lambdalabs_api_url.as_str())?
                        .with_poll_interval(self.config.poll_interval);
                Ok(Box::new(runtime))
            }
            RuntimeProvider::Unweave => Err(Error::bad_request(format!(
                "{provider:?} provider not supported in the env initializer"
            ))
            .with_provider(provider)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_missing_api_key_names_provider() {
        let initializer = EnvInitializer::default();
        let err = initializer
            .initialize(Uuid::new_v4(), RuntimeProvider::LambdaLabs)
            .await
            .err()
            .expect("initialization should fail");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.provider(), Some(RuntimeProvider::LambdaLabs));
        assert!(err.message().contains("LambdaLabs"));
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        let initializer = EnvInitializer::default();
        let err = initializer
            .initialize(Uuid::new_v4(), RuntimeProvider::Unweave)
            .await
            .err()
            .expect("initialization should fail");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(err.message().contains("Unweave"));
    }

    #[tokio::test]
    async fn test_lambdalabs_runtime() {
        let initializer = EnvInitializer::new(ProviderConfig {
            lambdalabs_api_key: Some("secret".into()),
            ..ProviderConfig::default()
        });
        let runtime = initializer
            .initialize(Uuid::new_v4(), RuntimeProvider::LambdaLabs)
            .await
            .unwrap();
        assert_eq!(runtime.provider(), RuntimeProvider::LambdaLabs);
    }
}
