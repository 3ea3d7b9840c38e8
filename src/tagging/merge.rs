use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use super::schema::{Tag, TagValue, TagValueType};
use crate::error::{Result, TagError};

/// Merges `new_tag` into `existing`: any tag with the same key is dropped and
/// the new tag is appended, so it always lands last. Unrelated tags keep their
/// relative order.
pub fn merge_tags(existing: &[Tag], new_tag: Tag) -> Vec<Tag> {
    let mut merged: Vec<Tag> = existing
        .iter()
        .filter(|t| t.key != new_tag.key)
        .cloned()
        .collect();
    merged.push(new_tag);
    merged
}

/// Builds a user tag from raw form input.
pub fn build_tag(key: &str, value: &str, value_type: TagValueType) -> Result<Tag> {
    let invalid = || TagError::InvalidTagValue {
        value_type: value_type.as_str().to_string(),
        value: value.to_string(),
    };

    let value = match value_type {
        TagValueType::Number => {
            let n: f64 = value.trim().parse().map_err(|_| invalid())?;
            if !n.is_finite() {
                return Err(invalid());
            }
            TagValue::Number(n)
        }
        TagValueType::Datetime => {
            TagValue::DateTime(normalize_datetime(value).ok_or_else(invalid)?)
        }
        TagValueType::Boolean => TagValue::Boolean(value == "true" || value == "1"),
        TagValueType::String => TagValue::String(value.to_string()),
    };

    Ok(Tag::new(key, value))
}

/// Normalizes a user-supplied timestamp to `YYYY-MM-DDTHH:MM:SS.mmmZ`.
/// Naive inputs are read as UTC.
pub fn normalize_datetime(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&Utc)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.and_utc()
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        naive.and_utc()
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_utc()
    };
    Some(iso_millis(parsed))
}

pub(crate) fn iso_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
