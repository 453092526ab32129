//! Turns a canonical record into what a list row shows: a label, a style
//! class and the actions that may be offered. Pure and deterministic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::budget::{SpecialRequestStatus, StudentBudget, StudentBudgetRow};
use crate::domain::catalog::{ActiveStatus, ExamQuestion, Institute};
use crate::domain::flight::{FlightRequest, FlightRequestRow, FlightStatus};
use crate::domain::lesson_plan::{ApprovalStatus, LessonPlan, LessonPlanRow};
use crate::domain::request::{Request, RequestRow, RequestStatus};

/// Shown wherever a value is missing.
pub const UNSET_LABEL: &str = "미설정";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Request,
    LessonPlan,
    FlightRequest,
    StudentBudget,
    Institute,
    ExamQuestion,
}

impl RecordKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "request" | "requests" => Some(Self::Request),
            "lesson_plan" | "lesson_plans" | "lesson" => Some(Self::LessonPlan),
            "flight" | "flight_request" | "flight_requests" => Some(Self::FlightRequest),
            "budget" | "student_budget" | "special_request" => Some(Self::StudentBudget),
            "institute" | "institutes" => Some(Self::Institute),
            "exam" | "exam_question" | "exam_questions" => Some(Self::ExamQuestion),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Draft,
    Pending,
    Approved,
    Rejected,
    Purchased,
    Active,
    Inactive,
    Unknown,
}

impl StatusClass {
    /// CSS class used by the list cards.
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Draft => "status-draft",
            Self::Pending => "status-pending",
            Self::Approved => "status-approved",
            Self::Rejected => "status-rejected",
            Self::Purchased => "status-purchased",
            Self::Active => "status-active",
            Self::Inactive => "status-inactive",
            Self::Unknown => "status-unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailableAction {
    Approve,
    Reject,
    MarkPurchased,
    RegisterReceipt,
    ViewReceipt,
    SpecialBaggage,
    Complete,
    Activate,
    Deactivate,
    View,
}

impl AvailableAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "승인",
            Self::Reject => "반려",
            Self::MarkPurchased => "구매완료 처리",
            Self::RegisterReceipt => "영수증 등록",
            Self::ViewReceipt => "영수증 보기",
            Self::SpecialBaggage => "특별 수하물 검토",
            Self::Complete => "완료 처리",
            Self::Activate => "활성화",
            Self::Deactivate => "비활성화",
            Self::View => "상세 보기",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NormalizedStatus {
    pub display_status: &'static str,
    pub status_class: StatusClass,
    pub available_actions: Vec<AvailableAction>,
}

impl NormalizedStatus {
    fn new(
        display_status: &'static str,
        status_class: StatusClass,
        available_actions: Vec<AvailableAction>,
    ) -> Self {
        Self { display_status, status_class, available_actions }
    }

    fn unset() -> Self {
        Self::new(UNSET_LABEL, StatusClass::Unknown, Vec::new())
    }

    pub fn allows(&self, action: AvailableAction) -> bool {
        self.available_actions.contains(&action)
    }
}

/// Borrowed canonical record; the variant is the record kind.
#[derive(Clone, Copy, Debug)]
pub enum RecordRef<'a> {
    Request(&'a Request),
    LessonPlan(&'a LessonPlan),
    FlightRequest(&'a FlightRequest),
    StudentBudget(&'a StudentBudget),
    Institute(&'a Institute),
    ExamQuestion(&'a ExamQuestion),
}

impl RecordRef<'_> {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Request(_) => RecordKind::Request,
            Self::LessonPlan(_) => RecordKind::LessonPlan,
            Self::FlightRequest(_) => RecordKind::FlightRequest,
            Self::StudentBudget(_) => RecordKind::StudentBudget,
            Self::Institute(_) => RecordKind::Institute,
            Self::ExamQuestion(_) => RecordKind::ExamQuestion,
        }
    }
}

pub fn normalize(record: RecordRef<'_>) -> NormalizedStatus {
    match record {
        RecordRef::Request(request) => normalize_request(request),
        RecordRef::LessonPlan(plan) => normalize_lesson_plan(plan),
        RecordRef::FlightRequest(flight) => normalize_flight(flight),
        RecordRef::StudentBudget(budget) => normalize_special_request(budget),
        RecordRef::Institute(institute) => normalize_active(institute.status),
        RecordRef::ExamQuestion(question) => normalize_active(question.status),
    }
}

/// Runs the wire boundary first, so any accepted row shape can be passed in.
/// A row that cannot be read at all normalizes to the unset label.
pub fn normalize_value(raw: &Value, kind: RecordKind) -> NormalizedStatus {
    fn decode<T: serde::de::DeserializeOwned>(raw: &Value, kind: RecordKind) -> Option<T> {
        match serde_json::from_value::<T>(raw.clone()) {
            Ok(row) => Some(row),
            Err(error) => {
                tracing::warn!(
                    event_name = "status.normalize.undecodable_row",
                    kind = ?kind,
                    error = %error,
                    "record could not be decoded, showing unset status"
                );
                None
            }
        }
    }

    let normalized = match kind {
        RecordKind::Request => decode::<RequestRow>(raw, kind)
            .map(Request::from)
            .map(|request| normalize_request(&request)),
        RecordKind::LessonPlan => decode::<LessonPlanRow>(raw, kind)
            .map(LessonPlan::from)
            .map(|plan| normalize_lesson_plan(&plan)),
        RecordKind::FlightRequest => decode::<FlightRequestRow>(raw, kind)
            .map(FlightRequest::from)
            .map(|flight| normalize_flight(&flight)),
        RecordKind::StudentBudget => decode::<StudentBudgetRow>(raw, kind)
            .map(StudentBudget::from)
            .map(|budget| normalize_special_request(&budget)),
        RecordKind::Institute => {
            decode::<Institute>(raw, kind).map(|institute| normalize_active(institute.status))
        }
        RecordKind::ExamQuestion => {
            decode::<ExamQuestion>(raw, kind).map(|question| normalize_active(question.status))
        }
    };
    normalized.unwrap_or_else(NormalizedStatus::unset)
}

fn normalize_request(request: &Request) -> NormalizedStatus {
    use AvailableAction::{Approve, MarkPurchased, RegisterReceipt, Reject, View, ViewReceipt};

    match request.status {
        RequestStatus::Pending => {
            NormalizedStatus::new("검토 중", StatusClass::Pending, vec![Approve, Reject])
        }
        RequestStatus::Approved => {
            let next = if request.is_offline() { RegisterReceipt } else { MarkPurchased };
            NormalizedStatus::new("승인됨", StatusClass::Approved, vec![next])
        }
        RequestStatus::Rejected => NormalizedStatus::new("반려됨", StatusClass::Rejected, vec![View]),
        RequestStatus::Purchased => {
            let actions = if request.is_offline() { vec![ViewReceipt] } else { Vec::new() };
            NormalizedStatus::new("구매완료", StatusClass::Purchased, actions)
        }
        RequestStatus::Unknown => NormalizedStatus::unset(),
    }
}

fn normalize_lesson_plan(plan: &LessonPlan) -> NormalizedStatus {
    use AvailableAction::{Approve, Reject, View};

    match plan.approval_status() {
        ApprovalStatus::Draft => NormalizedStatus::new("임시저장", StatusClass::Draft, Vec::new()),
        ApprovalStatus::Pending => {
            NormalizedStatus::new("승인 대기", StatusClass::Pending, vec![Approve, Reject])
        }
        ApprovalStatus::Approved => {
            NormalizedStatus::new("승인됨", StatusClass::Approved, vec![View])
        }
        ApprovalStatus::Rejected => {
            NormalizedStatus::new("반려됨", StatusClass::Rejected, vec![View])
        }
    }
}

fn normalize_flight(flight: &FlightRequest) -> NormalizedStatus {
    use AvailableAction::{Approve, Complete, Reject, SpecialBaggage, View};

    let mut normalized = match flight.status {
        FlightStatus::Pending => {
            NormalizedStatus::new("검토 중", StatusClass::Pending, vec![Approve, Reject])
        }
        FlightStatus::Approved => {
            NormalizedStatus::new("승인됨", StatusClass::Approved, vec![Complete])
        }
        FlightStatus::Rejected => NormalizedStatus::new("반려됨", StatusClass::Rejected, vec![View]),
        FlightStatus::Completed => {
            NormalizedStatus::new("구매완료", StatusClass::Purchased, vec![View])
        }
        FlightStatus::Unknown => return NormalizedStatus::unset(),
    };
    if flight.has_pending_baggage_request() {
        normalized.available_actions.insert(0, SpecialBaggage);
    }
    normalized
}

/// A budget row is only reviewable through its special request.
fn normalize_special_request(budget: &StudentBudget) -> NormalizedStatus {
    use AvailableAction::{Approve, Reject};

    match budget.special_request_status {
        Some(SpecialRequestStatus::Pending) => {
            NormalizedStatus::new("검토 중", StatusClass::Pending, vec![Approve, Reject])
        }
        Some(SpecialRequestStatus::Approved) => {
            NormalizedStatus::new("승인됨", StatusClass::Approved, Vec::new())
        }
        Some(SpecialRequestStatus::Rejected) => {
            NormalizedStatus::new("반려됨", StatusClass::Rejected, Vec::new())
        }
        None => NormalizedStatus::unset(),
    }
}

fn normalize_active(status: ActiveStatus) -> NormalizedStatus {
    match status {
        ActiveStatus::Active => NormalizedStatus::new(
            "활성",
            StatusClass::Active,
            vec![AvailableAction::Deactivate],
        ),
        ActiveStatus::Inactive => NormalizedStatus::new(
            "비활성",
            StatusClass::Inactive,
            vec![AvailableAction::Activate],
        ),
        ActiveStatus::Unknown => NormalizedStatus::unset(),
    }
}
