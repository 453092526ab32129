use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use sejong_core::domain::budget::{FieldRate, SpecialRequestStatus, StudentBudget};
use sejong_core::domain::catalog::{
    ActiveStatus, ExamQuestion, FeatureSetting, Institute, SystemSetting,
};
use sejong_core::domain::flight::{BaggageStatus, FlightRequest, FlightRequestId, FlightStatus};
use sejong_core::domain::lesson_plan::{LessonPlan, LessonPlanStatus};
use sejong_core::domain::receipt::{Receipt, ReceiptFile};
use sejong_core::domain::request::{Request, RequestId, RequestStatus};
use sejong_core::domain::student::{StudentProfile, UserId};

pub mod budget;
pub mod catalog;
pub mod flight;
pub mod lesson_plan;
pub mod memory;
pub mod profile;
pub mod receipt;
pub mod request;

pub use budget::RestBudgetRepository;
pub use catalog::RestCatalogRepository;
pub use flight::RestFlightRequestRepository;
pub use lesson_plan::RestLessonPlanRepository;
pub use memory::{
    InMemoryBudgetRepository, InMemoryCatalogRepository, InMemoryFlightRequestRepository,
    InMemoryLessonPlanRepository, InMemoryObjectStorage, InMemoryProfileRepository,
    InMemoryReceiptRepository, InMemoryRequestRepository, InMemorySettingsRepository,
};
pub use profile::{RestProfileRepository, RestSettingsRepository};
pub use receipt::{RestObjectStorage, RestReceiptRepository};
pub use request::RestRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub user_id: Option<UserId>,
    /// Empty means every status.
    pub statuses: Vec<RequestStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlightRequestFilter {
    pub user_id: Option<UserId>,
    pub statuses: Vec<FlightStatus>,
}

/// Columns written by a request transition. `rejection_reason` is always
/// written, so `None` clears it; the other fields are only written when set.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestUpdate {
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub final_purchase_amount: Option<Decimal>,
    pub purchase_date: Option<NaiveDate>,
}

impl RequestUpdate {
    pub fn to_status(status: RequestStatus) -> Self {
        Self {
            status,
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            final_purchase_amount: None,
            purchase_date: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LessonPlanUpdate {
    pub status: LessonPlanStatus,
    pub rejection_reason: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlightUpdate {
    pub status: FlightStatus,
    pub rejection_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BaggageDecision {
    pub status: BaggageStatus,
    pub rejection_reason: Option<String>,
}

/// Outcome of a special budget request review. Approval clears the reason.
#[derive(Clone, Debug, PartialEq)]
pub struct SpecialRequestDecision {
    pub status: SpecialRequestStatus,
    pub rejection_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogKind {
    Institute,
    ExamQuestion,
}

impl CatalogKind {
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Institute => "institutes",
            Self::ExamQuestion => "exam_questions",
        }
    }
}

// Every `transition`-style method below is a filtered write: it only touches
// the record when its current state is one of `from`, and returns how many
// rows it changed. Zero means someone else got there first.

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError>;
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;
    async fn transition(
        &self,
        id: &RequestId,
        from: &[RequestStatus],
        update: RequestUpdate,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait LessonPlanRepository: Send + Sync {
    async fn list(&self, statuses: &[LessonPlanStatus]) -> Result<Vec<LessonPlan>, RepositoryError>;
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<LessonPlan>, RepositoryError>;
    async fn transition(
        &self,
        user_id: &UserId,
        from: &[LessonPlanStatus],
        update: LessonPlanUpdate,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait BudgetRepository: Send + Sync {
    async fn find_by_user(&self, user_id: &UserId)
        -> Result<Option<StudentBudget>, RepositoryError>;
    async fn field_rate(&self, field: &str) -> Result<Option<FieldRate>, RepositoryError>;
    async fn decide_special_request(
        &self,
        user_id: &UserId,
        from: &[SpecialRequestStatus],
        decision: SpecialRequestDecision,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait FlightRequestRepository: Send + Sync {
    async fn list(&self, filter: &FlightRequestFilter)
        -> Result<Vec<FlightRequest>, RepositoryError>;
    async fn find_by_id(&self, id: &FlightRequestId)
        -> Result<Option<FlightRequest>, RepositoryError>;
    async fn transition(
        &self,
        id: &FlightRequestId,
        from: &[FlightStatus],
        update: FlightUpdate,
    ) -> Result<u64, RepositoryError>;
    async fn decide_baggage(
        &self,
        id: &FlightRequestId,
        from: &[BaggageStatus],
        decision: BaggageDecision,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_institutes(&self) -> Result<Vec<Institute>, RepositoryError>;
    async fn list_exam_questions(&self) -> Result<Vec<ExamQuestion>, RepositoryError>;
    async fn find_institute(&self, id: &str) -> Result<Option<Institute>, RepositoryError>;
    async fn find_exam_question(&self, id: &str) -> Result<Option<ExamQuestion>, RepositoryError>;
    async fn set_status(
        &self,
        kind: CatalogKind,
        id: &str,
        from: &[ActiveStatus],
        to: ActiveStatus,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    async fn insert(&self, receipt: Receipt) -> Result<Receipt, RepositoryError>;
    async fn find_by_request(&self, request_id: &RequestId)
        -> Result<Option<Receipt>, RepositoryError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the file under `bucket/path` and returns its public URL.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        file: &ReceiptFile,
    ) -> Result<String, RepositoryError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<StudentProfile>, RepositoryError>;
    async fn find_by_name_and_birth_date(
        &self,
        name: &str,
        birth_date: NaiveDate,
    ) -> Result<Vec<StudentProfile>, RepositoryError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn system_settings(&self) -> Result<Vec<SystemSetting>, RepositoryError>;
    async fn feature_settings(&self) -> Result<Vec<FeatureSetting>, RepositoryError>;
}
