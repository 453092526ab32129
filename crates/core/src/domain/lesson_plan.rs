//! Lesson plans and the normalization boundary for their `lessons` payload.
//!
//! The payload has been written by several generations of the student form:
//! camelCase objects, snake_case objects, bare arrays of lessons and JSON
//! documents stored as a string. [`normalize_lessons`] is the only place that
//! knows about those shapes; everything downstream works on [`LessonSchedule`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::UserId;
use crate::wire;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonPlanStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

/// Reviewer-facing view of a plan's status. Never stored; always derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl LessonPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn approval_status(&self) -> ApprovalStatus {
        match self {
            Self::Draft => ApprovalStatus::Draft,
            Self::Submitted => ApprovalStatus::Pending,
            Self::Approved => ApprovalStatus::Approved,
            Self::Rejected => ApprovalStatus::Rejected,
        }
    }
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonEntry {
    pub number: u32,
    pub date: Option<NaiveDate>,
    pub topic: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSchedule {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_lessons: u32,
    pub lessons: Vec<LessonEntry>,
    pub goals: Vec<String>,
    pub notes: Option<String>,
}

impl LessonSchedule {
    /// Payload in the shape the current student form writes.
    pub fn to_payload(&self) -> Value {
        let schedule: Vec<Value> = self
            .lessons
            .iter()
            .map(|lesson| {
                json!({
                    "lessonNumber": lesson.number,
                    "date": lesson.date.map(|d| d.to_string()),
                    "topic": lesson.topic,
                    "content": lesson.content,
                })
            })
            .collect();

        json!({
            "startDate": self.start_date.map(|d| d.to_string()),
            "endDate": self.end_date.map(|d| d.to_string()),
            "totalLessons": self.total_lessons,
            "schedule": schedule,
            "overallGoals": self.goals,
            "specialNotes": self.notes,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LessonPlan {
    pub user_id: UserId,
    pub status: LessonPlanStatus,
    pub rejection_reason: Option<String>,
    pub schedule: LessonSchedule,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LessonPlan {
    pub fn approval_status(&self) -> ApprovalStatus {
        self.status.approval_status()
    }

    pub fn is_editable(&self) -> bool {
        matches!(self.status, LessonPlanStatus::Draft | LessonPlanStatus::Rejected)
    }
}

/// Wire shape of a `lesson_plans` row.
#[derive(Clone, Debug, Deserialize)]
pub struct LessonPlanRow {
    #[serde(deserialize_with = "wire::text_or_empty")]
    pub user_id: String,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub lessons: Value,
    #[serde(default, deserialize_with = "wire::optional_timestamp")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<LessonPlanRow> for LessonPlan {
    fn from(row: LessonPlanRow) -> Self {
        let status =
            row.status.as_deref().and_then(LessonPlanStatus::parse).unwrap_or(LessonPlanStatus::Draft);
        let rejection_reason =
            if status == LessonPlanStatus::Rejected { row.rejection_reason } else { None };

        Self {
            user_id: UserId(row.user_id),
            status,
            rejection_reason,
            schedule: normalize_lessons(&row.lessons),
            submitted_at: row.submitted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const TOTAL_KEYS: &[&str] = &["totalLessons", "total_lessons", "lessonCount", "lesson_count"];
const SCHEDULE_KEYS: &[&str] = &["schedule", "lessons", "lessonPlans", "lesson_plans"];
const START_KEYS: &[&str] = &["startDate", "start_date"];
const END_KEYS: &[&str] = &["endDate", "end_date"];
const GOAL_KEYS: &[&str] = &["overallGoals", "overall_goals", "goals"];
const NOTE_KEYS: &[&str] = &["specialNotes", "special_notes", "notes"];

/// Maps any accepted payload shape to a [`LessonSchedule`]. Malformed input
/// yields an empty schedule and a warning, never an error.
pub fn normalize_lessons(raw: &Value) -> LessonSchedule {
    match raw {
        Value::Null => LessonSchedule::default(),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::String(_)) | Err(_) => {
                tracing::warn!(
                    event_name = "wire.lesson_plan.unparseable_payload",
                    "lesson payload string is not a JSON document, using empty schedule"
                );
                LessonSchedule::default()
            }
            Ok(decoded) => normalize_lessons(&decoded),
        },
        Value::Array(items) => {
            let lessons = lesson_entries(items);
            LessonSchedule { total_lessons: lessons.len() as u32, lessons, ..LessonSchedule::default() }
        }
        Value::Object(map) => normalize_object(map),
        other => {
            tracing::warn!(
                event_name = "wire.lesson_plan.unexpected_shape",
                shape = %value_kind(other),
                "lesson payload has unexpected shape, using empty schedule"
            );
            LessonSchedule::default()
        }
    }
}

fn normalize_object(map: &Map<String, Value>) -> LessonSchedule {
    let lessons = first_of(map, SCHEDULE_KEYS)
        .and_then(Value::as_array)
        .map(|items| lesson_entries(items))
        .unwrap_or_default();

    let total_lessons = first_of(map, TOTAL_KEYS)
        .and_then(count_from_value)
        .unwrap_or(lessons.len() as u32);

    LessonSchedule {
        start_date: first_of(map, START_KEYS).and_then(Value::as_str).and_then(wire::parse_date),
        end_date: first_of(map, END_KEYS).and_then(Value::as_str).and_then(wire::parse_date),
        total_lessons,
        lessons,
        goals: first_of(map, GOAL_KEYS).map(string_list).unwrap_or_default(),
        notes: first_of(map, NOTE_KEYS)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .map(str::to_owned),
    }
}

fn lesson_entries(items: &[Value]) -> Vec<LessonEntry> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let fallback_number = index as u32 + 1;
            let Some(map) = item.as_object() else {
                return LessonEntry {
                    number: fallback_number,
                    topic: item.as_str().unwrap_or_default().to_owned(),
                    ..LessonEntry::default()
                };
            };
            LessonEntry {
                number: first_of(map, &["lessonNumber", "lesson_number", "number"])
                    .and_then(count_from_value)
                    .unwrap_or(fallback_number),
                date: first_of(map, &["date", "lessonDate", "lesson_date"])
                    .and_then(Value::as_str)
                    .and_then(wire::parse_date),
                topic: first_of(map, &["topic", "title"])
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                content: first_of(map, &["content", "description", "plan"])
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            }
        })
        .collect()
}

fn first_of<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| map.get(*key)).find(|value| !value.is_null())
}

fn count_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => vec![text.trim().to_owned()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|goal| !goal.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        normalize_lessons, ApprovalStatus, LessonPlan, LessonPlanRow, LessonPlanStatus,
        LessonSchedule,
    };

    #[test]
    fn approval_status_is_a_fixed_view_of_status() {
        let cases = [
            (LessonPlanStatus::Draft, ApprovalStatus::Draft),
            (LessonPlanStatus::Submitted, ApprovalStatus::Pending),
            (LessonPlanStatus::Approved, ApprovalStatus::Approved),
            (LessonPlanStatus::Rejected, ApprovalStatus::Rejected),
        ];
        for (status, expected) in cases {
            assert_eq!(status.approval_status(), expected, "{status:?}");
        }
    }

    #[test]
    fn camel_and_snake_payloads_agree_on_total() {
        let schedule: Vec<_> =
            (1..=12).map(|n| json!({ "lessonNumber": n, "topic": format!("{n}과") })).collect();
        let camel = json!({ "totalLessons": 12, "startDate": "2026-03-02", "schedule": schedule });
        let snake = json!({ "total_lessons": 12, "start_date": "2026-03-02", "lessons": schedule });

        let from_camel = normalize_lessons(&camel);
        let from_snake = normalize_lessons(&snake);

        assert_eq!(from_camel.total_lessons, 12);
        assert_eq!(from_snake.total_lessons, 12);
        assert_eq!(from_camel.lessons.len(), 12);
        assert_eq!(from_camel, from_snake);
    }

    #[test]
    fn written_payload_normalizes_back_to_same_schedule() {
        let schedule = normalize_lessons(&json!({
            "total_lessons": "3",
            "end_date": "2026-06-30",
            "lesson_plans": [
                { "lesson_number": 1, "title": "인사", "description": "자기소개" },
                { "lesson_number": 2, "title": "숫자" },
                { "lesson_number": 3, "title": "음식" }
            ],
            "overall_goals": ["말하기", "듣기"],
            "special_notes": "  "
        }));

        assert_eq!(schedule.total_lessons, 3);
        assert_eq!(schedule.lessons[0].content, "자기소개");
        assert_eq!(schedule.notes, None);
        assert_eq!(normalize_lessons(&schedule.to_payload()), schedule);
    }

    #[test]
    fn string_encoded_payload_is_decoded() {
        let encoded = json!({ "totalLessons": 8, "schedule": [] }).to_string();
        assert_eq!(normalize_lessons(&json!(encoded)).total_lessons, 8);
    }

    #[test]
    fn malformed_payloads_fall_back_to_empty_schedule() {
        assert_eq!(normalize_lessons(&json!("{not json")), LessonSchedule::default());
        assert_eq!(normalize_lessons(&json!(42)), LessonSchedule::default());
        assert_eq!(normalize_lessons(&json!({ "totalLessons": "many" })).total_lessons, 0);
    }

    #[test]
    fn bare_array_counts_its_entries() {
        let schedule = normalize_lessons(&json!([{ "topic": "a" }, { "topic": "b" }]));
        assert_eq!(schedule.total_lessons, 2);
        assert_eq!(schedule.lessons[1].number, 2);
    }

    #[test]
    fn row_without_status_is_a_draft() {
        let row: LessonPlanRow =
            serde_json::from_value(json!({ "user_id": "u-1", "lessons": null })).expect("row");
        let plan = LessonPlan::from(row);
        assert_eq!(plan.status, LessonPlanStatus::Draft);
        assert!(plan.is_editable());
    }
}
