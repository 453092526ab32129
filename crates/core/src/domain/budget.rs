use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::lesson_plan::LessonPlanStatus;
use crate::domain::UserId;
use crate::wire;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl SpecialRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Precomputed `student_budgets` row. Admin adjustments land here, so when a
/// row exists it wins over anything derived from the lesson plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudentBudget {
    pub user_id: UserId,
    pub field: Option<String>,
    pub allocated_budget: Decimal,
    pub used_budget: Decimal,
    pub special_request_amount: Option<Decimal>,
    pub special_request_status: Option<SpecialRequestStatus>,
    pub special_request_rejection_reason: Option<String>,
}

impl StudentBudget {
    pub fn remaining(&self) -> Decimal {
        remaining(self.allocated_budget, self.used_budget)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct StudentBudgetRow {
    #[serde(deserialize_with = "wire::text_or_empty")]
    pub user_id: String,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub field: Option<String>,
    #[serde(default, deserialize_with = "wire::decimal_or_zero")]
    pub allocated_budget: Decimal,
    #[serde(default, deserialize_with = "wire::decimal_or_zero")]
    pub used_budget: Decimal,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    pub special_request_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub special_request_status: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub special_request_rejection_reason: Option<String>,
}

impl From<StudentBudgetRow> for StudentBudget {
    fn from(row: StudentBudgetRow) -> Self {
        let special_request_status =
            row.special_request_status.as_deref().and_then(SpecialRequestStatus::parse);
        // Only a rejected special request carries a reason.
        let special_request_rejection_reason =
            if special_request_status == Some(SpecialRequestStatus::Rejected) {
                row.special_request_rejection_reason
            } else {
                None
            };
        Self {
            user_id: UserId(row.user_id),
            field: row.field,
            allocated_budget: row.allocated_budget,
            used_budget: row.used_budget,
            special_request_amount: row.special_request_amount,
            special_request_status,
            special_request_rejection_reason,
        }
    }
}

/// Per-field rate from `budget_settings`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldRate {
    #[serde(deserialize_with = "wire::text_or_empty")]
    pub field: String,
    #[serde(default, deserialize_with = "wire::decimal_or_zero")]
    pub per_lesson_amount: Decimal,
    #[serde(default, alias = "max_budget_limit", deserialize_with = "wire::optional_decimal")]
    pub max_budget: Option<Decimal>,
}

impl FieldRate {
    /// `per_lesson × lessons`, capped at `max_budget` when one is configured.
    /// A zero or negative cap is treated as unconfigured.
    pub fn allocation_for(&self, total_lessons: u32) -> Decimal {
        let product = self.per_lesson_amount * Decimal::from(total_lessons);
        match self.max_budget {
            Some(cap) if cap > Decimal::ZERO => product.min(cap),
            _ => product,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetSource {
    Direct,
    Derived,
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub allocated: Decimal,
    pub used: Decimal,
    pub remaining: Decimal,
    pub field: Option<String>,
    pub lesson_plan_status: Option<LessonPlanStatus>,
    pub source: BudgetSource,
}

impl BudgetSummary {
    pub fn new(
        allocated: Decimal,
        used: Decimal,
        field: Option<String>,
        lesson_plan_status: Option<LessonPlanStatus>,
        source: BudgetSource,
    ) -> Self {
        Self { allocated, used, remaining: remaining(allocated, used), field, lesson_plan_status, source }
    }

    pub fn from_row(row: &StudentBudget, lesson_plan_status: Option<LessonPlanStatus>) -> Self {
        Self::new(
            row.allocated_budget,
            row.used_budget,
            row.field.clone(),
            lesson_plan_status,
            BudgetSource::Direct,
        )
    }

    pub fn unavailable() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO, None, None, BudgetSource::Unavailable)
    }

    pub fn field_label(&self) -> &str {
        self.field.as_deref().unwrap_or(crate::status::UNSET_LABEL)
    }
}

pub fn remaining(allocated: Decimal, used: Decimal) -> Decimal {
    (allocated - used).max(Decimal::ZERO)
}
