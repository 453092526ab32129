use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use sejong_core::domain::flight::{
    BaggageStatus, FlightRequest, FlightRequestId, FlightRequestRow, FlightStatus,
};

use super::request::status_filter;
use super::{
    BaggageDecision, FlightRequestFilter, FlightRequestRepository, FlightUpdate, RepositoryError,
};
use crate::gateway::{GatewayClient, Query};

const TABLE: &str = "flight_requests";

pub struct RestFlightRequestRepository {
    gateway: Arc<GatewayClient>,
}

impl RestFlightRequestRepository {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl FlightRequestRepository for RestFlightRequestRepository {
    async fn list(
        &self,
        filter: &FlightRequestFilter,
    ) -> Result<Vec<FlightRequest>, RepositoryError> {
        let mut query = Query::new().select("*").order("created_at", false);
        if let Some(user_id) = &filter.user_id {
            query = query.eq("user_id", user_id);
        }
        if !filter.statuses.is_empty() {
            query = query.is_in("status", status_filter(&filter.statuses, FlightStatus::as_str));
        }
        let rows = self.gateway.select::<FlightRequestRow>(TABLE, &query).await?;
        Ok(rows.into_iter().map(FlightRequest::from).collect())
    }

    async fn find_by_id(
        &self,
        id: &FlightRequestId,
    ) -> Result<Option<FlightRequest>, RepositoryError> {
        let query = Query::new().select("*").eq("id", id);
        let row = self.gateway.select_one::<FlightRequestRow>(TABLE, &query).await?;
        Ok(row.map(FlightRequest::from))
    }

    async fn transition(
        &self,
        id: &FlightRequestId,
        from: &[FlightStatus],
        update: FlightUpdate,
    ) -> Result<u64, RepositoryError> {
        let query =
            Query::new().eq("id", id).is_in("status", status_filter(from, FlightStatus::as_str));
        let body = json!({
            "status": update.status.as_str(),
            "rejection_reason": update.rejection_reason,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let changed = self.gateway.update(TABLE, &query, &body).await?;
        Ok(changed.len() as u64)
    }

    async fn decide_baggage(
        &self,
        id: &FlightRequestId,
        from: &[BaggageStatus],
        decision: BaggageDecision,
    ) -> Result<u64, RepositoryError> {
        let query = Query::new()
            .eq("id", id)
            .is_in("special_baggage_status", status_filter(from, BaggageStatus::as_str));
        let body = json!({
            "special_baggage_status": decision.status.as_str(),
            "special_baggage_rejection_reason": decision.rejection_reason,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let changed = self.gateway.update(TABLE, &query, &body).await?;
        Ok(changed.len() as u64)
    }
}
