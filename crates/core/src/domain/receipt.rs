use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;
use crate::domain::UserId;
use crate::errors::DomainError;

/// Operator-entered details that accompany an uploaded receipt image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiptMetadata {
    pub purchase_date: NaiveDate,
    pub total_amount: Decimal,
    pub purchase_store: Option<String>,
    pub note: Option<String>,
}

impl ReceiptMetadata {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.total_amount <= Decimal::ZERO {
            return Err(DomainError::MissingFields(vec!["total_amount".to_string()]));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiptFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ReceiptFile {
    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.len() <= 5)
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub request_id: RequestId,
    pub user_id: UserId,
    pub file_path: String,
    pub file_url: String,
    pub purchase_date: NaiveDate,
    pub total_amount: Decimal,
    pub purchase_store: Option<String>,
    pub note: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Object path inside the receipts bucket: `{user_id}/receipt_{request_id}_{millis}.{ext}`.
pub fn receipt_object_path(
    user_id: &UserId,
    request_id: &RequestId,
    file: &ReceiptFile,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}/receipt_{}_{}.{}",
        user_id.0,
        request_id.0,
        at.timestamp_millis(),
        file.extension().to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{receipt_object_path, ReceiptFile};
    use crate::domain::request::RequestId;
    use crate::domain::UserId;

    #[test]
    fn object_path_is_scoped_to_user_and_request() {
        let file = ReceiptFile {
            file_name: "영수증.JPG".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![1, 2, 3],
        };
        let at = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).single().expect("timestamp");
        let path = receipt_object_path(
            &UserId("u-7".to_string()),
            &RequestId("r-9".to_string()),
            &file,
            at,
        );

        assert_eq!(path, format!("u-7/receipt_r-9_{}.jpg", at.timestamp_millis()));
    }

    #[test]
    fn missing_extension_falls_back_to_bin() {
        let file = ReceiptFile {
            file_name: "scan".to_string(),
            content_type: "application/octet-stream".to_string(),
            bytes: Vec::new(),
        };
        assert_eq!(file.extension(), "bin");
    }

    #[test]
    fn extension_with_path_characters_falls_back_to_bin() {
        for name in ["scan.p/g", "scan.j?g", "scan.a b", "scan.%2e"] {
            let file = ReceiptFile {
                file_name: name.to_string(),
                content_type: "image/png".to_string(),
                bytes: Vec::new(),
            };
            assert_eq!(file.extension(), "bin", "{name}");
        }

        let file = ReceiptFile {
            file_name: "scan.tar.Webp".to_string(),
            content_type: "image/webp".to_string(),
            bytes: Vec::new(),
        };
        let at = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).single().expect("timestamp");
        let path =
            receipt_object_path(&UserId("u".to_string()), &RequestId("r".to_string()), &file, at);
        assert!(path.ends_with(".webp"));
    }
}
