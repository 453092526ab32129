pub mod config;
pub mod credentials;
pub mod domain;
pub mod error_log;
pub mod errors;
pub mod inflight;
pub mod lifecycle;
pub mod status;
pub mod wire;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::budget::{BudgetSource, BudgetSummary, FieldRate, StudentBudget};
pub use domain::catalog::{ActiveStatus, ExamQuestion, FeatureSetting, Institute, SystemSetting};
pub use domain::flight::{BaggageStatus, FlightRequest, FlightRequestId, FlightStatus};
pub use domain::lesson_plan::{ApprovalStatus, LessonPlan, LessonPlanStatus, LessonSchedule};
pub use domain::receipt::{Receipt, ReceiptFile, ReceiptMetadata};
pub use domain::request::{PurchaseChannel, Request, RequestId, RequestStatus};
pub use domain::student::{StudentProfile, UserId};
pub use error_log::{ErrorEntry, ErrorLog};
pub use errors::{ApplicationError, DomainError, InterfaceError, Presentation};
pub use inflight::{InFlightGuard, InFlightRegistry};
pub use lifecycle::{EntityKind, Lifecycle, LifecycleAction};
pub use status::{normalize, AvailableAction, NormalizedStatus, RecordKind, RecordRef, StatusClass};
