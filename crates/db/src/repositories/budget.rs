use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use sejong_core::domain::budget::{
    FieldRate, SpecialRequestStatus, StudentBudget, StudentBudgetRow,
};
use sejong_core::domain::student::UserId;

use super::request::status_filter;
use super::{BudgetRepository, RepositoryError, SpecialRequestDecision};
use crate::gateway::{GatewayClient, Query};

const BUDGETS: &str = "student_budgets";
const SETTINGS: &str = "budget_settings";

pub struct RestBudgetRepository {
    gateway: Arc<GatewayClient>,
}

impl RestBudgetRepository {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl BudgetRepository for RestBudgetRepository {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<StudentBudget>, RepositoryError> {
        let query = Query::new().select("*").eq("user_id", user_id);
        let row = self.gateway.select_one::<StudentBudgetRow>(BUDGETS, &query).await?;
        Ok(row.map(StudentBudget::from))
    }

    async fn field_rate(&self, field: &str) -> Result<Option<FieldRate>, RepositoryError> {
        let query = Query::new().select("*").eq("field", field);
        self.gateway.select_one::<FieldRate>(SETTINGS, &query).await
    }

    async fn decide_special_request(
        &self,
        user_id: &UserId,
        from: &[SpecialRequestStatus],
        decision: SpecialRequestDecision,
    ) -> Result<u64, RepositoryError> {
        let query = Query::new().eq("user_id", user_id).is_in(
            "special_request_status",
            status_filter(from, SpecialRequestStatus::as_str),
        );
        let body = json!({
            "special_request_status": decision.status.as_str(),
            "special_request_rejection_reason": decision.rejection_reason,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let changed = self.gateway.update(BUDGETS, &query, &body).await?;
        Ok(changed.len() as u64)
    }
}
