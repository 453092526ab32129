use std::sync::Arc;

use chrono::NaiveDate;

use sejong_core::domain::catalog::{FeatureSetting, SystemSetting};
use sejong_core::domain::student::{StudentProfile, UserId};

use super::{ProfileRepository, RepositoryError, SettingsRepository};
use crate::gateway::{GatewayClient, Query};

const PROFILES: &str = "user_profiles";

pub struct RestProfileRepository {
    gateway: Arc<GatewayClient>,
}

impl RestProfileRepository {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl ProfileRepository for RestProfileRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<StudentProfile>, RepositoryError> {
        let query = Query::new().select("*").eq("id", id);
        self.gateway.select_one(PROFILES, &query).await
    }

    async fn find_by_name_and_birth_date(
        &self,
        name: &str,
        birth_date: NaiveDate,
    ) -> Result<Vec<StudentProfile>, RepositoryError> {
        let query =
            Query::new().select("*").eq("name", name.trim()).eq("birth_date", birth_date);
        self.gateway.select(PROFILES, &query).await
    }
}

pub struct RestSettingsRepository {
    gateway: Arc<GatewayClient>,
}

impl RestSettingsRepository {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl SettingsRepository for RestSettingsRepository {
    async fn system_settings(&self) -> Result<Vec<SystemSetting>, RepositoryError> {
        self.gateway.select("system_settings", &Query::new().select("*")).await
    }

    async fn feature_settings(&self) -> Result<Vec<FeatureSetting>, RepositoryError> {
        self.gateway.select("feature_settings", &Query::new().select("*")).await
    }
}
