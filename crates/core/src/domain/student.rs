use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::wire;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row of `user_profiles`. Students sign in with name + birth date, so both
/// are required on the wire; everything else is optional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: UserId,
    #[serde(default, deserialize_with = "wire::text_or_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "wire::optional_date")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub field: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub sejong_institute: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text", skip_serializing)]
    pub password_hash: Option<String>,
}

impl StudentProfile {
    pub fn field_label(&self) -> &str {
        self.field.as_deref().unwrap_or(crate::status::UNSET_LABEL)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::StudentProfile;

    #[test]
    fn profile_without_field_shows_unset_label() {
        let profile: StudentProfile = serde_json::from_value(json!({
            "id": "u-1",
            "name": "김세종",
            "birth_date": "2001-05-14",
            "field": null
        }))
        .expect("profile");

        assert_eq!(profile.field_label(), "미설정");
        assert_eq!(profile.birth_date.map(|d| d.to_string()).as_deref(), Some("2001-05-14"));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let profile: StudentProfile = serde_json::from_value(json!({
            "id": "u-2",
            "name": "이한글",
            "password_hash": "abc123"
        }))
        .expect("profile");

        let rendered = serde_json::to_string(&profile).expect("serialize");
        assert!(!rendered.contains("abc123"));
    }
}
