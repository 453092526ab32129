use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::errors::DomainError;
use crate::wire;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Purchased,
    /// Missing or unrecognized on the wire. Shown as unset and never actionable.
    Unknown,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Purchased => "purchased",
            Self::Unknown => "unknown",
        }
    }

    /// `completed` is an older spelling of `purchased` still present in some rows.
    /// Never yields [`RequestStatus::Unknown`].
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "purchased" | "completed" => Some(Self::Purchased),
            _ => None,
        }
    }

    pub fn counts_against_budget(&self) -> bool {
        matches!(self, Self::Approved | Self::Purchased)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseChannel {
    #[default]
    Online,
    Offline,
}

impl PurchaseChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Canonical equipment/reimbursement request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub user_id: UserId,
    pub item_name: String,
    pub purpose: String,
    pub price: Decimal,
    pub purchase_type: PurchaseChannel,
    pub is_bundle: bool,
    pub link: Option<String>,
    pub store_info: Option<String>,
    pub account_id: Option<String>,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub final_purchase_amount: Option<Decimal>,
    pub purchase_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Request {
    pub fn is_offline(&self) -> bool {
        self.purchase_type == PurchaseChannel::Offline
    }

    /// A rejection reason is present exactly when the request is rejected.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        let has_reason =
            self.rejection_reason.as_deref().map(|reason| !reason.trim().is_empty()).unwrap_or(false);
        let rejected = self.status == RequestStatus::Rejected;
        if has_reason != rejected {
            return Err(DomainError::InvariantViolation(format!(
                "request {} has status `{}` but rejection_reason present = {has_reason}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}

/// Wire shape of a `requests` row.
#[derive(Clone, Debug, Deserialize)]
pub struct RequestRow {
    #[serde(deserialize_with = "wire::text_or_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "wire::text_or_empty")]
    pub user_id: String,
    #[serde(default, deserialize_with = "wire::text_or_empty")]
    pub item_name: String,
    #[serde(default, deserialize_with = "wire::text_or_empty")]
    pub purpose: String,
    #[serde(default, deserialize_with = "wire::decimal_or_zero")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub purchase_type: Option<String>,
    #[serde(default, deserialize_with = "wire::bool_or_false")]
    pub is_bundle: bool,
    #[serde(default, alias = "purchase_link", deserialize_with = "wire::optional_text")]
    pub link: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub store_info: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub account_id: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub rejection_reason: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub reviewed_by: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_timestamp")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    pub final_purchase_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "wire::optional_date")]
    pub purchase_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "wire::optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<RequestRow> for Request {
    fn from(row: RequestRow) -> Self {
        let status = row.status.as_deref().and_then(RequestStatus::parse).unwrap_or_else(|| {
            tracing::warn!(
                event_name = "wire.request.unknown_status",
                request_id = %row.id,
                status = ?row.status,
                "unrecognized request status"
            );
            RequestStatus::Unknown
        });
        // Stale reasons survive on rows that were re-opened; only a rejected
        // request carries one.
        let rejection_reason =
            if status == RequestStatus::Rejected { row.rejection_reason } else { None };

        Self {
            id: RequestId(row.id),
            user_id: UserId(row.user_id),
            item_name: row.item_name,
            purpose: row.purpose,
            price: row.price,
            purchase_type: row
                .purchase_type
                .as_deref()
                .and_then(PurchaseChannel::parse)
                .unwrap_or_default(),
            is_bundle: row.is_bundle,
            link: row.link,
            store_info: row.store_info,
            account_id: row.account_id,
            status,
            rejection_reason,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            final_purchase_amount: row.final_purchase_amount,
            purchase_date: row.purchase_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
