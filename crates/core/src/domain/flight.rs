use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::wire;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlightRequestId(pub String);

impl std::fmt::Display for FlightRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    /// Missing or unrecognized on the wire.
    Unknown,
}

impl FlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaggageStatus {
    Pending,
    Approved,
    Rejected,
}

impl BaggageStatus {
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

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPurchaseType {
    #[default]
    Direct,
    Agency,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecialBaggageRequest {
    pub status: BaggageStatus,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightRequest {
    pub id: FlightRequestId,
    pub user_id: UserId,
    pub status: FlightStatus,
    pub purchase_type: FlightPurchaseType,
    pub departure_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub departure_airport: Option<String>,
    pub arrival_airport: Option<String>,
    pub ticket_price: Decimal,
    pub ticket_url: Option<String>,
    pub rejection_reason: Option<String>,
    pub special_baggage: Option<SpecialBaggageRequest>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FlightRequest {
    pub fn has_pending_baggage_request(&self) -> bool {
        self.special_baggage
            .as_ref()
            .map(|baggage| baggage.status == BaggageStatus::Pending)
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FlightRequestRow {
    #[serde(deserialize_with = "wire::text_or_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "wire::text_or_empty")]
    pub user_id: String,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub purchase_type: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_date")]
    pub departure_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "wire::optional_date")]
    pub return_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub departure_airport: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub arrival_airport: Option<String>,
    #[serde(default, deserialize_with = "wire::decimal_or_zero")]
    pub ticket_price: Decimal,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub ticket_url: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub rejection_reason: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub special_baggage_status: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    pub special_baggage_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub special_baggage_reason: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub special_baggage_rejection_reason: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<FlightRequestRow> for FlightRequest {
    fn from(row: FlightRequestRow) -> Self {
        let status = row.status.as_deref().and_then(FlightStatus::parse).unwrap_or_else(|| {
            tracing::warn!(
                event_name = "wire.flight.unknown_status",
                flight_id = %row.id,
                status = ?row.status,
                "unrecognized flight status"
            );
            FlightStatus::Unknown
        });
        let special_baggage = row
            .special_baggage_status
            .as_deref()
            .and_then(BaggageStatus::parse)
            .map(|status| SpecialBaggageRequest {
                status,
                amount: row.special_baggage_amount,
                reason: row.special_baggage_reason,
                rejection_reason: row.special_baggage_rejection_reason,
            });
        let purchase_type = match row.purchase_type.as_deref().map(str::trim) {
            Some("agency") => FlightPurchaseType::Agency,
            _ => FlightPurchaseType::Direct,
        };

        Self {
            id: FlightRequestId(row.id),
            user_id: UserId(row.user_id),
            status,
            purchase_type,
            departure_date: row.departure_date,
            return_date: row.return_date,
            departure_airport: row.departure_airport,
            arrival_airport: row.arrival_airport,
            ticket_price: row.ticket_price,
            ticket_url: row.ticket_url,
            rejection_reason: if status == FlightStatus::Rejected {
                row.rejection_reason
            } else {
                None
            },
            special_baggage,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{BaggageStatus, FlightPurchaseType, FlightRequest, FlightRequestRow};

    #[test]
    fn baggage_columns_fold_into_sub_request() {
        let row: FlightRequestRow = serde_json::from_value(json!({
            "id": "f-1",
            "user_id": "u-1",
            "status": "pending",
            "purchase_type": "agency",
            "special_baggage_status": "pending",
            "special_baggage_amount": 80000,
            "special_baggage_reason": "교구 운송"
        }))
        .expect("row");
        let flight = FlightRequest::from(row);

        assert_eq!(flight.purchase_type, FlightPurchaseType::Agency);
        assert!(flight.has_pending_baggage_request());
        assert_eq!(
            flight.special_baggage.as_ref().map(|b| b.status),
            Some(BaggageStatus::Pending)
        );
    }

    #[test]
    fn no_baggage_status_means_no_sub_request() {
        let row: FlightRequestRow =
            serde_json::from_value(json!({ "id": "f-2", "special_baggage_amount": 1000 }))
                .expect("row");
        let flight = FlightRequest::from(row);
        assert!(flight.special_baggage.is_none());
        assert!(!flight.has_pending_baggage_request());
    }
}
