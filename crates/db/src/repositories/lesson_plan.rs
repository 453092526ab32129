use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};

use sejong_core::domain::lesson_plan::{LessonPlan, LessonPlanRow, LessonPlanStatus};
use sejong_core::domain::student::UserId;

use super::request::status_filter;
use super::{LessonPlanRepository, LessonPlanUpdate, RepositoryError};
use crate::gateway::{GatewayClient, Query};

const TABLE: &str = "lesson_plans";

pub struct RestLessonPlanRepository {
    gateway: Arc<GatewayClient>,
}

impl RestLessonPlanRepository {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

fn update_payload(update: &LessonPlanUpdate) -> Value {
    let mut body = Map::new();
    body.insert("status".to_string(), json!(update.status.as_str()));
    body.insert("rejection_reason".to_string(), json!(update.rejection_reason));
    if let Some(submitted_at) = update.submitted_at {
        body.insert("submitted_at".to_string(), json!(submitted_at.to_rfc3339()));
    }
    body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
    Value::Object(body)
}

#[async_trait::async_trait]
impl LessonPlanRepository for RestLessonPlanRepository {
    async fn list(&self, statuses: &[LessonPlanStatus]) -> Result<Vec<LessonPlan>, RepositoryError> {
        let mut query = Query::new().select("*").order("updated_at", false);
        if !statuses.is_empty() {
            query = query.is_in("status", status_filter(statuses, LessonPlanStatus::as_str));
        }
        let rows = self.gateway.select::<LessonPlanRow>(TABLE, &query).await?;
        Ok(rows.into_iter().map(LessonPlan::from).collect())
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<LessonPlan>, RepositoryError> {
        let query = Query::new().select("*").eq("user_id", user_id);
        let row = self.gateway.select_one::<LessonPlanRow>(TABLE, &query).await?;
        Ok(row.map(LessonPlan::from))
    }

    async fn transition(
        &self,
        user_id: &UserId,
        from: &[LessonPlanStatus],
        update: LessonPlanUpdate,
    ) -> Result<u64, RepositoryError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .is_in("status", status_filter(from, LessonPlanStatus::as_str));
        let changed = self.gateway.update(TABLE, &query, &update_payload(&update)).await?;
        Ok(changed.len() as u64)
    }
}
