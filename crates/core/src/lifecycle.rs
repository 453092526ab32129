//! Closed transition tables for every record that moves through a review
//! lifecycle. Handlers never compare status strings; they ask the table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::budget::SpecialRequestStatus;
use crate::domain::catalog::ActiveStatus;
use crate::domain::flight::{BaggageStatus, FlightStatus};
use crate::domain::lesson_plan::LessonPlanStatus;
use crate::domain::request::RequestStatus;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Request,
    LessonPlan,
    FlightRequest,
    StudentBudget,
    Institute,
    ExamQuestion,
}

impl EntityKind {
    /// Backend collection holding this entity.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Request => "requests",
            Self::LessonPlan => "lesson_plans",
            Self::FlightRequest => "flight_requests",
            Self::StudentBudget => "student_budgets",
            Self::Institute => "institutes",
            Self::ExamQuestion => "exam_questions",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::LessonPlan => "lesson plan",
            Self::FlightRequest => "flight request",
            Self::StudentBudget => "student budget",
            Self::Institute => "institute",
            Self::ExamQuestion => "exam question",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Submit,
    Approve,
    Reject,
    MarkPurchased,
    SubmitReceipt,
    Complete,
    ApproveSpecialRequest,
    RejectSpecialRequest,
    Activate,
    Deactivate,
}

impl LifecycleAction {
    pub const ALL: &'static [LifecycleAction] = &[
        Self::Submit,
        Self::Approve,
        Self::Reject,
        Self::MarkPurchased,
        Self::SubmitReceipt,
        Self::Complete,
        Self::ApproveSpecialRequest,
        Self::RejectSpecialRequest,
        Self::Activate,
        Self::Deactivate,
    ];
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::MarkPurchased => "mark_purchased",
            Self::SubmitReceipt => "submit_receipt",
            Self::Complete => "complete",
            Self::ApproveSpecialRequest => "approve_special_request",
            Self::RejectSpecialRequest => "reject_special_request",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        })
    }
}

pub trait Lifecycle: Copy + Eq + fmt::Debug + 'static {
    /// Every state, in declaration order.
    const STATES: &'static [Self];

    fn as_str(&self) -> &'static str;

    /// The table itself: `None` means the action is not allowed from `self`.
    fn next(self, action: LifecycleAction) -> Option<Self>;

    fn transition(self, entity: EntityKind, action: LifecycleAction) -> Result<Self, DomainError> {
        self.next(action).ok_or(DomainError::InvalidTransition {
            entity,
            from: self.as_str(),
            action,
        })
    }

    /// States from which `action` is allowed. Filtered writes are scoped to
    /// these, so a record that already moved on matches zero rows.
    fn sources(action: LifecycleAction) -> Vec<Self> {
        Self::STATES.iter().copied().filter(|state| state.next(action).is_some()).collect()
    }

    /// The state `action` leads to, if any state allows it.
    fn target(action: LifecycleAction) -> Option<Self> {
        Self::STATES.iter().find_map(|state| state.next(action))
    }

    /// True when `self` can only be reached by moving on from a state that
    /// allowed `action`: someone already acted on this record.
    fn is_past(self, action: LifecycleAction) -> bool {
        let sources = Self::sources(action);
        if sources.contains(&self) {
            return false;
        }
        let mut reached: Vec<Self> = sources;
        let mut index = 0;
        while index < reached.len() {
            let state = reached[index];
            for next in LifecycleAction::ALL.iter().filter_map(|step| state.next(*step)) {
                if !reached.contains(&next) {
                    reached.push(next);
                }
            }
            index += 1;
        }
        reached.contains(&self)
    }
}

impl Lifecycle for RequestStatus {
    const STATES: &'static [Self] =
        &[Self::Pending, Self::Approved, Self::Rejected, Self::Purchased, Self::Unknown];

    fn as_str(&self) -> &'static str {
        RequestStatus::as_str(self)
    }

    fn next(self, action: LifecycleAction) -> Option<Self> {
        use LifecycleAction::{Approve, MarkPurchased, Reject, SubmitReceipt};
        match (self, action) {
            (Self::Pending, Approve) => Some(Self::Approved),
            (Self::Pending, Reject) => Some(Self::Rejected),
            (Self::Approved, MarkPurchased) | (Self::Approved, SubmitReceipt) => {
                Some(Self::Purchased)
            }
            _ => None,
        }
    }
}

impl Lifecycle for LessonPlanStatus {
    const STATES: &'static [Self] = &[Self::Draft, Self::Submitted, Self::Approved, Self::Rejected];

    fn as_str(&self) -> &'static str {
        LessonPlanStatus::as_str(self)
    }

    // A rejected plan goes back through `submitted`, never straight to approved.
    fn next(self, action: LifecycleAction) -> Option<Self> {
        use LifecycleAction::{Approve, Reject, Submit};
        match (self, action) {
            (Self::Draft, Submit) | (Self::Rejected, Submit) => Some(Self::Submitted),
            (Self::Submitted, Approve) => Some(Self::Approved),
            (Self::Submitted, Reject) => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl Lifecycle for FlightStatus {
    const STATES: &'static [Self] =
        &[Self::Pending, Self::Approved, Self::Rejected, Self::Completed, Self::Unknown];

    fn as_str(&self) -> &'static str {
        FlightStatus::as_str(self)
    }

    fn next(self, action: LifecycleAction) -> Option<Self> {
        use LifecycleAction::{Approve, Complete, Reject};
        match (self, action) {
            (Self::Pending, Approve) => Some(Self::Approved),
            (Self::Pending, Reject) => Some(Self::Rejected),
            (Self::Approved, Complete) => Some(Self::Completed),
            _ => None,
        }
    }
}

impl Lifecycle for BaggageStatus {
    const STATES: &'static [Self] = &[Self::Pending, Self::Approved, Self::Rejected];

    fn as_str(&self) -> &'static str {
        BaggageStatus::as_str(self)
    }

    fn next(self, action: LifecycleAction) -> Option<Self> {
        use LifecycleAction::{ApproveSpecialRequest, RejectSpecialRequest};
        match (self, action) {
            (Self::Pending, ApproveSpecialRequest) => Some(Self::Approved),
            (Self::Pending, RejectSpecialRequest) => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl Lifecycle for SpecialRequestStatus {
    const STATES: &'static [Self] = &[Self::Pending, Self::Approved, Self::Rejected];

    fn as_str(&self) -> &'static str {
        SpecialRequestStatus::as_str(self)
    }

    fn next(self, action: LifecycleAction) -> Option<Self> {
        use LifecycleAction::{ApproveSpecialRequest, RejectSpecialRequest};
        match (self, action) {
            (Self::Pending, ApproveSpecialRequest) => Some(Self::Approved),
            (Self::Pending, RejectSpecialRequest) => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl Lifecycle for ActiveStatus {
    const STATES: &'static [Self] = &[Self::Active, Self::Inactive, Self::Unknown];

    fn as_str(&self) -> &'static str {
        ActiveStatus::as_str(self)
    }

    fn next(self, action: LifecycleAction) -> Option<Self> {
        match (self, action) {
            (Self::Inactive, LifecycleAction::Activate) => Some(Self::Active),
            (Self::Active, LifecycleAction::Deactivate) => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Trimmed reason, or [`DomainError::ReasonRequired`] when nothing is left.
pub fn require_reason(reason: &str) -> Result<String, DomainError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(DomainError::ReasonRequired);
    }
    Ok(trimmed.to_owned())
}
