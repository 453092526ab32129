use std::sync::Arc;

use sejong_core::config::{AppConfig, ConfigError, LoadOptions};
use sejong_core::inflight::InFlightRegistry;
use sejong_db::repositories::{
    RepositoryError, RestBudgetRepository, RestCatalogRepository, RestFlightRequestRepository,
    RestLessonPlanRepository, RestObjectStorage, RestProfileRepository, RestReceiptRepository,
    RestRequestRepository, RestSettingsRepository,
};
use sejong_db::GatewaySlot;
use thiserror::Error;
use tracing::info;

use crate::context::ServiceContext;
use crate::refresh::RefreshBus;

pub struct Application {
    pub config: AppConfig,
    pub context: ServiceContext,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("gateway client could not be built: {0}")]
    Gateway(#[source] RepositoryError),
}

/// Loads configuration and wires every repository to the shared gateway
/// client in `slot`. Nothing is sent to the backend here.
pub async fn bootstrap(
    options: LoadOptions,
    slot: &GatewaySlot,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;

    let gateway = slot.get_or_init(&config.gateway).await.map_err(BootstrapError::Gateway)?;
    info!(
        event_name = "system.bootstrap.gateway_ready",
        correlation_id = "bootstrap",
        base_url = gateway.base_url(),
        timeout_secs = ?config.gateway.timeout_secs,
        "gateway client ready"
    );

    let context = ServiceContext {
        requests: Arc::new(RestRequestRepository::new(gateway.clone())),
        lesson_plans: Arc::new(RestLessonPlanRepository::new(gateway.clone())),
        budgets: Arc::new(RestBudgetRepository::new(gateway.clone())),
        flights: Arc::new(RestFlightRequestRepository::new(gateway.clone())),
        catalog: Arc::new(RestCatalogRepository::new(gateway.clone())),
        receipts: Arc::new(RestReceiptRepository::new(gateway.clone())),
        storage: Arc::new(RestObjectStorage::new(gateway.clone())),
        profiles: Arc::new(RestProfileRepository::new(gateway.clone())),
        settings: Arc::new(RestSettingsRepository::new(gateway)),
        buckets: config.storage.clone(),
        inflight: InFlightRegistry::default(),
        refresh: RefreshBus::default(),
    };
    info!(
        event_name = "system.bootstrap.repositories_wired",
        correlation_id = "bootstrap",
        receipts_bucket = %config.storage.receipts_bucket,
        "repositories wired to gateway"
    );

    Ok(Application { config, context })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sejong_core::config::{ConfigOverrides, LoadOptions};
    use sejong_db::GatewaySlot;

    use super::{bootstrap, BootstrapError};

    fn options(url: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                gateway_url: url.map(str::to_string),
                gateway_anon_key: Some("anon-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_gateway_url() {
        let slot = GatewaySlot::new();
        let result = bootstrap(options(None), &slot).await;

        let Err(BootstrapError::Config(error)) = result else {
            panic!("expected a configuration error");
        };
        assert!(error.to_string().contains("gateway.url"));
        assert!(slot.get().is_none());
    }

    #[tokio::test]
    async fn bootstrap_shares_the_first_gateway_client() {
        let slot = GatewaySlot::new();
        let first = bootstrap(options(Some("https://first.supabase.co")), &slot)
            .await
            .expect("first bootstrap");
        let second = bootstrap(options(Some("https://second.supabase.co")), &slot)
            .await
            .expect("second bootstrap");

        let client = slot.get().expect("client initialized");
        assert_eq!(client.base_url(), "https://first.supabase.co");
        assert_eq!(first.context.buckets.receipts_bucket, "receipt-files");
        assert_eq!(second.config.gateway.url, "https://second.supabase.co");
        assert!(Arc::strong_count(&client) > 1);
    }
}
