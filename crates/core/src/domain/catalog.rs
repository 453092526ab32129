//! Administrative reference data: institutes and exam questions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::wire;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStatus {
    Active,
    Inactive,
    /// Missing or unrecognized on the wire.
    Unknown,
}

impl ActiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

fn active_or_unknown<'de, D>(deserializer: D) -> Result<ActiveStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = wire::optional_text(deserializer)?;
    Ok(raw.as_deref().and_then(ActiveStatus::parse).unwrap_or(ActiveStatus::Unknown))
}

fn unknown_status() -> ActiveStatus {
    ActiveStatus::Unknown
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Institute {
    #[serde(deserialize_with = "wire::text_or_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "wire::text_or_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub field: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub contact: Option<String>,
    #[serde(default = "unknown_status", deserialize_with = "active_or_unknown")]
    pub status: ActiveStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExamQuestion {
    #[serde(deserialize_with = "wire::text_or_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "wire::text_or_empty")]
    pub question_text: String,
    #[serde(default, deserialize_with = "wire::strings_or_empty")]
    pub choices: Vec<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub correct_answer: Option<String>,
    #[serde(default = "unknown_status", deserialize_with = "active_or_unknown")]
    pub status: ActiveStatus,
    #[serde(default, deserialize_with = "wire::int_or_zero")]
    pub order_index: i32,
}

impl ExamQuestion {
    /// Active questions in presentation order.
    pub fn active_in_order(mut questions: Vec<ExamQuestion>) -> Vec<ExamQuestion> {
        questions.retain(|question| question.status == ActiveStatus::Active);
        questions.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.id.cmp(&b.id)));
        questions
    }
}

/// Keyed value from `system_settings`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemSetting {
    pub setting_key: String,
    #[serde(default)]
    pub setting_value: Value,
}

/// Toggle from `feature_settings`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSetting {
    pub feature_name: String,
    #[serde(default, deserialize_with = "wire::bool_or_false")]
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ActiveStatus, ExamQuestion, Institute};

    #[test]
    fn missing_status_is_not_read_as_active() {
        let institute: Institute =
            serde_json::from_value(json!({ "id": "i-1", "name": "세종학당 하노이", "status": null }))
                .expect("institute");
        assert_eq!(institute.status, ActiveStatus::Unknown);

        let institute: Institute =
            serde_json::from_value(json!({ "id": "i-2", "name": "세종학당 리마" }))
                .expect("institute");
        assert_eq!(institute.status, ActiveStatus::Unknown);
    }

    #[test]
    fn inactive_questions_are_hidden_and_rest_ordered() {
        let questions: Vec<ExamQuestion> = serde_json::from_value(json!([
            { "id": "q-3", "question_text": "c", "order_index": 3, "status": "ACTIVE" },
            { "id": "q-4", "question_text": "d", "order_index": 0 },
            { "id": "q-1", "question_text": "a", "order_index": 1, "status": "inactive" },
            { "id": "q-2", "question_text": "b", "order_index": 2, "status": "active" }
        ]))
        .expect("questions");

        let ordered = ExamQuestion::active_in_order(questions);
        let ids: Vec<_> = ordered.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q-2", "q-3"]);
    }
}
