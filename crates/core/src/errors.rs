use thiserror::Error;

use crate::lifecycle::{EntityKind, LifecycleAction};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid {entity} transition from `{from}` using {action}")]
    InvalidTransition { entity: EntityKind, from: &'static str, action: LifecycleAction },
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("a non-empty rejection reason is required")]
    ReasonRequired,
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was already processed")]
    AlreadyProcessed { entity: EntityKind, id: String },
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: EntityKind, id: String },
    #[error("another action on {entity} `{id}` is still in flight")]
    Busy { entity: EntityKind, id: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// How the failure should be shown to the person at the screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presentation {
    /// Auto-dismissing notice.
    Toast { dismiss_after_secs: u64 },
    /// Blocking dialog.
    Alert { redirect_to_login: bool },
}

const TOAST: Presentation = Presentation::Toast { dismiss_after_secs: 3 };

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("already processed: {message}")]
    AlreadyProcessed { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("session expired: {message}")]
    SessionExpired { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "입력값을 확인한 뒤 다시 시도해 주세요.",
            Self::AlreadyProcessed { .. } => "이미 처리된 항목입니다. 목록을 새로고침합니다.",
            Self::Conflict { .. } => "같은 항목에 대한 처리가 진행 중입니다. 잠시 후 다시 시도해 주세요.",
            Self::SessionExpired { .. } => "세션이 만료되었습니다. 다시 로그인해 주세요.",
            Self::ServiceUnavailable { .. } => {
                "서버와 통신하지 못했습니다. 잠시 후 다시 시도해 주세요."
            }
            Self::Internal { .. } => "시스템 설정 오류가 발생했습니다. 관리자에게 문의해 주세요.",
        }
    }

    pub fn presentation(&self) -> Presentation {
        match self {
            Self::BadRequest { .. }
            | Self::AlreadyProcessed { .. }
            | Self::Conflict { .. }
            | Self::ServiceUnavailable { .. } => TOAST,
            Self::SessionExpired { .. } => Presentation::Alert { redirect_to_login: true },
            Self::Internal { .. } => Presentation::Alert { redirect_to_login: false },
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::AlreadyProcessed { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::SessionExpired { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::AlreadyProcessed { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::SessionExpired { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::NotFound { .. } => {
                Self::BadRequest { message: value.to_string(), correlation_id }
            }
            ApplicationError::AlreadyProcessed { .. } => {
                Self::AlreadyProcessed { message: value.to_string(), correlation_id }
            }
            ApplicationError::Busy { .. } => {
                Self::Conflict { message: value.to_string(), correlation_id }
            }
            ApplicationError::Unauthorized(message) => {
                Self::SessionExpired { message, correlation_id }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
