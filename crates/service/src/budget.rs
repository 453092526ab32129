use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use sejong_core::domain::budget::{BudgetSource, BudgetSummary};
use sejong_core::domain::lesson_plan::LessonPlanStatus;
use sejong_core::domain::student::UserId;
use sejong_db::repositories::{
    BudgetRepository, LessonPlanRepository, ProfileRepository, RepositoryError, RequestFilter,
    RequestRepository,
};

use crate::context::ServiceContext;

/// Two-tier budget lookup: the precomputed row when one exists, otherwise a
/// figure derived from the profile field, the approved lesson plan and the
/// field rate.
#[derive(Clone)]
pub struct BudgetService {
    budgets: Arc<dyn BudgetRepository>,
    profiles: Arc<dyn ProfileRepository>,
    lesson_plans: Arc<dyn LessonPlanRepository>,
    requests: Arc<dyn RequestRepository>,
}

impl BudgetService {
    pub fn new(context: &ServiceContext) -> Self {
        Self {
            budgets: context.budgets.clone(),
            profiles: context.profiles.clone(),
            lesson_plans: context.lesson_plans.clone(),
            requests: context.requests.clone(),
        }
    }

    /// Never fails: any read error degrades to a zero summary.
    pub async fn summary(&self, user_id: &UserId) -> BudgetSummary {
        match self.lookup(user_id).await {
            Ok(summary) => {
                debug!(
                    event_name = "budget.summary.resolved",
                    user_id = %user_id,
                    source = ?summary.source,
                    allocated = %summary.allocated,
                    used = %summary.used,
                    "budget summary resolved"
                );
                summary
            }
            Err(error) => {
                warn!(
                    event_name = "budget.summary.degraded",
                    user_id = %user_id,
                    error = %error,
                    "budget lookup failed, showing an empty budget"
                );
                BudgetSummary::unavailable()
            }
        }
    }

    async fn lookup(&self, user_id: &UserId) -> Result<BudgetSummary, RepositoryError> {
        if let Some(row) = self.budgets.find_by_user(user_id).await? {
            // The plan status is informational here; a failed read does not
            // invalidate the row.
            let plan_status = match self.lesson_plans.find_by_user(user_id).await {
                Ok(plan) => plan.map(|plan| plan.status),
                Err(error) => {
                    debug!(
                        event_name = "budget.summary.plan_status_unavailable",
                        user_id = %user_id,
                        error = %error,
                        "lesson plan status unavailable for direct budget row"
                    );
                    None
                }
            };
            return Ok(BudgetSummary::from_row(&row, plan_status));
        }
        self.derive(user_id).await
    }

    async fn derive(&self, user_id: &UserId) -> Result<BudgetSummary, RepositoryError> {
        let field = self.profiles.find_by_id(user_id).await?.and_then(|profile| profile.field);
        let plan = self.lesson_plans.find_by_user(user_id).await?;
        let plan_status = plan.as_ref().map(|plan| plan.status);
        let total_lessons = match &plan {
            Some(plan) if plan.status == LessonPlanStatus::Approved => plan.schedule.total_lessons,
            _ => 0,
        };

        let allocated = match field.as_deref() {
            Some(field) => self
                .budgets
                .field_rate(field)
                .await?
                .map(|rate| rate.allocation_for(total_lessons))
                .unwrap_or(Decimal::ZERO),
            None => Decimal::ZERO,
        };

        let filter = RequestFilter { user_id: Some(user_id.clone()), statuses: Vec::new() };
        let used = self
            .requests
            .list(&filter)
            .await?
            .iter()
            .filter(|request| request.status.counts_against_budget())
            .map(|request| request.price)
            .sum::<Decimal>();

        Ok(BudgetSummary::new(allocated, used, field, plan_status, BudgetSource::Derived))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use sejong_core::domain::budget::{BudgetSource, FieldRate, StudentBudget};
    use sejong_core::domain::lesson_plan::{LessonPlan, LessonPlanStatus, LessonSchedule};
    use sejong_core::domain::request::{PurchaseChannel, Request, RequestId, RequestStatus};
    use sejong_core::domain::student::{StudentProfile, UserId};

    use super::BudgetService;
    use crate::context::MemoryBackend;

    fn won(amount: i64) -> Decimal {
        Decimal::new(amount, 0)
    }

    fn user() -> UserId {
        UserId("u-1".to_string())
    }

    fn profile(field: &str) -> StudentProfile {
        StudentProfile {
            id: user(),
            name: "김세종".to_string(),
            birth_date: None,
            field: Some(field.to_string()),
            sejong_institute: None,
            password_hash: None,
        }
    }

    fn plan(status: LessonPlanStatus, total_lessons: u32) -> LessonPlan {
        LessonPlan {
            user_id: user(),
            status,
            rejection_reason: None,
            schedule: LessonSchedule { total_lessons, ..LessonSchedule::default() },
            submitted_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn request(id: &str, status: RequestStatus, price: i64) -> Request {
        Request {
            id: RequestId(id.to_string()),
            user_id: user(),
            item_name: "교구".to_string(),
            purpose: "수업".to_string(),
            price: won(price),
            purchase_type: PurchaseChannel::Online,
            is_bundle: false,
            link: None,
            store_info: None,
            account_id: None,
            status,
            rejection_reason: if status == RequestStatus::Rejected {
                Some("예산 초과".to_string())
            } else {
                None
            },
            reviewed_by: None,
            reviewed_at: None,
            final_purchase_amount: None,
            purchase_date: None,
            created_at: None,
            updated_at: None,
        }
    }

    async fn seeded(plan_status: LessonPlanStatus) -> MemoryBackend {
        let backend = MemoryBackend::default();
        backend.profiles.insert(profile("한국어교육")).await;
        backend.lesson_plans.insert(plan(plan_status, 30)).await;
        backend
            .budgets
            .insert_rate(FieldRate {
                field: "한국어교육".to_string(),
                per_lesson_amount: won(15_000),
                max_budget: Some(won(400_000)),
            })
            .await;
        backend
    }

    #[tokio::test]
    async fn derived_allocation_is_capped_and_counts_approved_and_purchased() {
        let backend = seeded(LessonPlanStatus::Approved).await;
        backend.requests.insert(request("r-1", RequestStatus::Approved, 100_000)).await;
        backend.requests.insert(request("r-2", RequestStatus::Purchased, 50_000)).await;
        backend.requests.insert(request("r-3", RequestStatus::Pending, 70_000)).await;
        backend.requests.insert(request("r-4", RequestStatus::Rejected, 90_000)).await;

        let summary = BudgetService::new(&backend.context()).summary(&user()).await;

        assert_eq!(summary.source, BudgetSource::Derived);
        assert_eq!(summary.allocated, won(400_000));
        assert_eq!(summary.used, won(150_000));
        assert_eq!(summary.remaining, won(250_000));
        assert_eq!(summary.field.as_deref(), Some("한국어교육"));
        assert_eq!(summary.lesson_plan_status, Some(LessonPlanStatus::Approved));
    }

    #[tokio::test]
    async fn unapproved_plan_allocates_nothing() {
        let backend = seeded(LessonPlanStatus::Submitted).await;
        backend.requests.insert(request("r-1", RequestStatus::Approved, 30_000)).await;

        let summary = BudgetService::new(&backend.context()).summary(&user()).await;

        assert_eq!(summary.allocated, Decimal::ZERO);
        assert_eq!(summary.used, won(30_000));
        assert_eq!(summary.remaining, Decimal::ZERO);
    }

    #[tokio::test]
    async fn direct_row_wins_over_derivation() {
        let backend = seeded(LessonPlanStatus::Approved).await;
        backend
            .budgets
            .insert_budget(StudentBudget {
                user_id: user(),
                field: Some("한국어교육".to_string()),
                allocated_budget: won(500_000),
                used_budget: won(120_000),
                special_request_amount: None,
                special_request_status: None,
                special_request_rejection_reason: None,
            })
            .await;

        let summary = BudgetService::new(&backend.context()).summary(&user()).await;

        assert_eq!(summary.source, BudgetSource::Direct);
        assert_eq!(summary.remaining, won(380_000));
        assert_eq!(summary.lesson_plan_status, Some(LessonPlanStatus::Approved));
    }

    #[tokio::test]
    async fn outage_degrades_to_an_unset_zero_budget() {
        let backend = seeded(LessonPlanStatus::Approved).await;
        backend.budgets.set_unavailable(true);

        let summary = BudgetService::new(&backend.context()).summary(&user()).await;

        assert_eq!(summary.source, BudgetSource::Unavailable);
        assert_eq!(summary.allocated, Decimal::ZERO);
        assert_eq!(summary.field_label(), "미설정");
    }
}
