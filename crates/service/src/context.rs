use std::sync::Arc;

use sejong_core::config::StorageConfig;
use sejong_core::inflight::InFlightRegistry;
use sejong_db::repositories::{
    BudgetRepository, CatalogRepository, FlightRequestRepository, InMemoryBudgetRepository,
    InMemoryCatalogRepository, InMemoryFlightRequestRepository, InMemoryLessonPlanRepository,
    InMemoryObjectStorage, InMemoryProfileRepository, InMemoryReceiptRepository,
    InMemoryRequestRepository, InMemorySettingsRepository, LessonPlanRepository, ObjectStorage,
    ProfileRepository, ReceiptRepository, RequestRepository, SettingsRepository,
};
use uuid::Uuid;

use crate::refresh::RefreshBus;

/// Everything a handler needs, built once at startup and shared.
#[derive(Clone)]
pub struct ServiceContext {
    pub requests: Arc<dyn RequestRepository>,
    pub lesson_plans: Arc<dyn LessonPlanRepository>,
    pub budgets: Arc<dyn BudgetRepository>,
    pub flights: Arc<dyn FlightRequestRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub receipts: Arc<dyn ReceiptRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub buckets: StorageConfig,
    pub inflight: InFlightRegistry,
    pub refresh: RefreshBus,
}

/// Who is acting, and the id that ties their logs and errors together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionContext {
    pub actor: String,
    pub correlation_id: String,
}

impl ActionContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self { actor: actor.into(), correlation_id: Uuid::new_v4().to_string() }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

/// In-memory backend with typed handles kept around for seeding and
/// inspection.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    pub requests: Arc<InMemoryRequestRepository>,
    pub lesson_plans: Arc<InMemoryLessonPlanRepository>,
    pub budgets: Arc<InMemoryBudgetRepository>,
    pub flights: Arc<InMemoryFlightRequestRepository>,
    pub catalog: Arc<InMemoryCatalogRepository>,
    pub receipts: Arc<InMemoryReceiptRepository>,
    pub storage: Arc<InMemoryObjectStorage>,
    pub profiles: Arc<InMemoryProfileRepository>,
    pub settings: Arc<InMemorySettingsRepository>,
}

impl MemoryBackend {
    pub fn context(&self) -> ServiceContext {
        ServiceContext {
            requests: self.requests.clone(),
            lesson_plans: self.lesson_plans.clone(),
            budgets: self.budgets.clone(),
            flights: self.flights.clone(),
            catalog: self.catalog.clone(),
            receipts: self.receipts.clone(),
            storage: self.storage.clone(),
            profiles: self.profiles.clone(),
            settings: self.settings.clone(),
            buckets: StorageConfig {
                receipts_bucket: "receipt-files".to_string(),
                flight_tickets_bucket: "flight-tickets".to_string(),
            },
            inflight: InFlightRegistry::default(),
            refresh: RefreshBus::default(),
        }
    }
}
