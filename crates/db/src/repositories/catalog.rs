use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use sejong_core::domain::catalog::{ActiveStatus, ExamQuestion, Institute};

use super::request::status_filter;
use super::{CatalogKind, CatalogRepository, RepositoryError};
use crate::gateway::{GatewayClient, Query};

pub struct RestCatalogRepository {
    gateway: Arc<GatewayClient>,
}

impl RestCatalogRepository {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl CatalogRepository for RestCatalogRepository {
    async fn list_institutes(&self) -> Result<Vec<Institute>, RepositoryError> {
        let query = Query::new().select("*").order("name", true);
        self.gateway.select(CatalogKind::Institute.collection(), &query).await
    }

    async fn list_exam_questions(&self) -> Result<Vec<ExamQuestion>, RepositoryError> {
        let query = Query::new().select("*").order("order_index", true);
        self.gateway.select(CatalogKind::ExamQuestion.collection(), &query).await
    }

    async fn find_institute(&self, id: &str) -> Result<Option<Institute>, RepositoryError> {
        let query = Query::new().select("*").eq("id", id);
        self.gateway.select_one(CatalogKind::Institute.collection(), &query).await
    }

    async fn find_exam_question(&self, id: &str) -> Result<Option<ExamQuestion>, RepositoryError> {
        let query = Query::new().select("*").eq("id", id);
        self.gateway.select_one(CatalogKind::ExamQuestion.collection(), &query).await
    }

    async fn set_status(
        &self,
        kind: CatalogKind,
        id: &str,
        from: &[ActiveStatus],
        to: ActiveStatus,
    ) -> Result<u64, RepositoryError> {
        let query =
            Query::new().eq("id", id).is_in("status", status_filter(from, ActiveStatus::as_str));
        let body = json!({ "status": to.as_str(), "updated_at": Utc::now().to_rfc3339() });
        let changed = self.gateway.update(kind.collection(), &query, &body).await?;
        Ok(changed.len() as u64)
    }
}
