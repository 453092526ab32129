//! Lenient deserializers shared by the `*Row` wire shapes.
//!
//! Rows come back from the hosted backend with nullable columns, numbers that
//! were sometimes stored as text ("150,000"), and timestamps that may be
//! missing entirely. Every helper here maps those to a safe default instead of
//! failing the whole row.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn decimal_or_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_value).unwrap_or(Decimal::ZERO))
}

pub fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_value))
}

pub fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => non_empty(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

pub fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_text(deserializer)?.unwrap_or_default())
}

pub fn bool_or_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(text)) => matches!(text.trim(), "true" | "1" | "yes"),
        Some(Value::Number(number)) => number.as_i64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    })
}

pub fn strings_or_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => {
            items.iter().filter_map(Value::as_str).map(str::to_owned).collect()
        }
        _ => Vec::new(),
    })
}

pub fn int_or_zero<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => {
            number.as_i64().and_then(|n| i32::try_from(n).ok()).unwrap_or_default()
        }
        Some(Value::String(text)) => text.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

pub fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

pub fn optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(parse_date))
}

pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => number.to_string().parse::<Decimal>().ok(),
        Value::String(text) => {
            let cleaned: String =
                text.chars().filter(|ch| !matches!(ch, ',' | '원' | ' ')).collect();
            cleaned.parse::<Decimal>().ok()
        }
        _ => None,
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // PostgREST omits the `T` and sometimes the offset for `timestamp` columns.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
                .map(|naive| naive.and_utc())
                .ok()
        })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "super::decimal_or_zero")]
        price: Decimal,
        #[serde(default, deserialize_with = "super::optional_text")]
        reason: Option<String>,
        #[serde(default, deserialize_with = "super::bool_or_false")]
        is_bundle: bool,
    }

    #[test]
    fn formatted_price_text_is_parsed() {
        let sample: Sample =
            serde_json::from_value(json!({ "price": "150,000원", "reason": "  " })).expect("sample");
        assert_eq!(sample.price, Decimal::new(150_000, 0));
        assert_eq!(sample.reason, None);
        assert!(!sample.is_bundle);
    }

    #[test]
    fn null_and_missing_fields_fall_back_to_defaults() {
        let sample: Sample = serde_json::from_value(json!({ "price": null })).expect("sample");
        assert_eq!(sample.price, Decimal::ZERO);
        assert_eq!(sample.reason, None);
    }

    #[test]
    fn postgrest_timestamp_without_offset_is_accepted() {
        assert!(super::parse_timestamp("2026-03-02 09:15:00.123").is_some());
        assert!(super::parse_timestamp("2026-03-02T09:15:00+09:00").is_some());
        assert!(super::parse_timestamp("not a date").is_none());
    }
}
