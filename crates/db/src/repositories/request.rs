use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};

use sejong_core::domain::request::{Request, RequestId, RequestRow, RequestStatus};

use super::{RepositoryError, RequestFilter, RequestRepository, RequestUpdate};
use crate::gateway::{GatewayClient, Query};

const TABLE: &str = "requests";

pub struct RestRequestRepository {
    gateway: Arc<GatewayClient>,
}

impl RestRequestRepository {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

pub(crate) fn status_filter<S, F>(statuses: &[S], as_str: F) -> Vec<&'static str>
where
    F: Fn(&S) -> &'static str,
{
    statuses.iter().map(as_str).collect()
}

fn update_payload(update: &RequestUpdate) -> Value {
    let mut body = Map::new();
    body.insert("status".to_string(), json!(update.status.as_str()));
    body.insert("rejection_reason".to_string(), json!(update.rejection_reason));
    if let Some(reviewed_by) = &update.reviewed_by {
        body.insert("reviewed_by".to_string(), json!(reviewed_by));
    }
    if let Some(reviewed_at) = update.reviewed_at {
        body.insert("reviewed_at".to_string(), json!(reviewed_at.to_rfc3339()));
    }
    if let Some(amount) = update.final_purchase_amount {
        body.insert("final_purchase_amount".to_string(), json!(amount));
    }
    if let Some(date) = update.purchase_date {
        body.insert("purchase_date".to_string(), json!(date.to_string()));
    }
    body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
    Value::Object(body)
}

#[async_trait::async_trait]
impl RequestRepository for RestRequestRepository {
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError> {
        let mut query = Query::new().select("*").order("created_at", false);
        if let Some(user_id) = &filter.user_id {
            query = query.eq("user_id", user_id);
        }
        if !filter.statuses.is_empty() {
            let mut spellings = status_filter(&filter.statuses, RequestStatus::as_str);
            // legacy rows were written as `completed`
            if filter.statuses.contains(&RequestStatus::Purchased) {
                spellings.push("completed");
            }
            query = query.is_in("status", spellings);
        }

        let rows = self.gateway.select::<RequestRow>(TABLE, &query).await?;
        Ok(rows.into_iter().map(Request::from).collect())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let query = Query::new().select("*").eq("id", id);
        let row = self.gateway.select_one::<RequestRow>(TABLE, &query).await?;
        Ok(row.map(Request::from))
    }

    async fn transition(
        &self,
        id: &RequestId,
        from: &[RequestStatus],
        update: RequestUpdate,
    ) -> Result<u64, RepositoryError> {
        let query =
            Query::new().eq("id", id).is_in("status", status_filter(from, RequestStatus::as_str));
        let changed = self.gateway.update(TABLE, &query, &update_payload(&update)).await?;
        Ok(changed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::Value;

    use sejong_core::domain::request::RequestStatus;

    use super::update_payload;
    use crate::repositories::RequestUpdate;

    #[test]
    fn approval_payload_clears_reason_and_records_reviewer() {
        let mut update = RequestUpdate::to_status(RequestStatus::Approved);
        update.reviewed_by = Some("admin".to_string());

        let payload = update_payload(&update);

        assert_eq!(payload["status"], "approved");
        assert_eq!(payload["rejection_reason"], Value::Null);
        assert_eq!(payload["reviewed_by"], "admin");
        assert!(payload.get("final_purchase_amount").is_none());
    }

    #[test]
    fn purchase_payload_carries_amount_and_date() {
        let mut update = RequestUpdate::to_status(RequestStatus::Purchased);
        update.final_purchase_amount = Some(Decimal::new(32000, 0));
        update.purchase_date = NaiveDate::from_ymd_opt(2024, 3, 2);

        let payload = update_payload(&update);

        assert_eq!(payload["status"], "purchased");
        assert_eq!(payload["purchase_date"], "2024-03-02");
        assert!(payload.get("reviewed_by").is_none());
    }
}
