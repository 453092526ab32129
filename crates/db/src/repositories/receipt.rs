use std::sync::Arc;

use sejong_core::domain::receipt::{Receipt, ReceiptFile};
use sejong_core::domain::request::RequestId;

use super::{ObjectStorage, ReceiptRepository, RepositoryError};
use crate::gateway::{decode_rows, GatewayClient, Query};

const TABLE: &str = "receipts";

pub struct RestReceiptRepository {
    gateway: Arc<GatewayClient>,
}

impl RestReceiptRepository {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl ReceiptRepository for RestReceiptRepository {
    async fn insert(&self, receipt: Receipt) -> Result<Receipt, RepositoryError> {
        let body = serde_json::to_value(&receipt)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let rows = self.gateway.insert(TABLE, &body).await?;
        // the backend assigns the id; keep the local copy if it echoes nothing usable
        Ok(decode_rows::<Receipt>(TABLE, rows).into_iter().next().unwrap_or(receipt))
    }

    async fn find_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Receipt>, RepositoryError> {
        let query =
            Query::new().select("*").eq("request_id", request_id).order("uploaded_at", false);
        self.gateway.select_one(TABLE, &query).await
    }
}

pub struct RestObjectStorage {
    gateway: Arc<GatewayClient>,
}

impl RestObjectStorage {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl ObjectStorage for RestObjectStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        file: &ReceiptFile,
    ) -> Result<String, RepositoryError> {
        self.gateway.upload(bucket, path, &file.content_type, file.bytes.clone()).await
    }
}
