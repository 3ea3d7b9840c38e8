use serde::{Deserialize, Deserializer, Serialize};

/// Tag key used by the job-folder action and the status lookup.
pub const JOB_FOLDER_KEY: &str = "JobFolder.Number";

/// Default tag source when the remote omits one.
pub const DEFAULT_SOURCE: &str = "user";

/// A remote file record, as returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub storage_id: Option<String>,
    #[serde(default)]
    pub storage_location: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<Tag>,
}

impl FileRecord {
    pub fn filename(&self) -> &str {
        self.filename.as_deref().unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn tag(&self, key: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.key == key)
    }
}

/// A single typed key/value metadata entry.
///
/// On the wire the value is spread across four optional fields; at most one
/// is kept, picked in the encoder's priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireTag", into = "WireTag")]
pub struct Tag {
    pub key: String,
    pub source: String,
    pub value: Option<TagValue>,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: TagValue) -> Self {
        Self {
            key: key.into(),
            source: DEFAULT_SOURCE.to_string(),
            value: Some(value),
        }
    }

    pub fn string_value(&self) -> Option<&str> {
        match &self.value {
            Some(TagValue::String(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// Normalized `YYYY-MM-DDTHH:MM:SS.mmmZ` timestamp.
    DateTime(String),
    Number(f64),
    Boolean(bool),
    String(String),
}

/// Value type named by the user when submitting a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TagValueType {
    #[default]
    String,
    Number,
    Datetime,
    Boolean,
}

impl TagValueType {
    /// Unknown names fall back to plain strings.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "number" => Self::Number,
            "datetime" => Self::Datetime,
            "boolean" => Self::Boolean,
            _ => Self::String,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Datetime => "datetime",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTag {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_time_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bool_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
}

impl From<WireTag> for Tag {
    fn from(wire: WireTag) -> Self {
        let value = if let Some(dt) = wire.date_time_value {
            Some(TagValue::DateTime(dt))
        } else if let Some(n) = wire.double_value {
            Some(TagValue::Number(n))
        } else if let Some(b) = wire.bool_value {
            Some(TagValue::Boolean(b))
        } else {
            wire.string_value.map(TagValue::String)
        };
        Tag {
            key: wire.key,
            source: wire
                .source
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            value,
        }
    }
}

impl From<Tag> for WireTag {
    fn from(tag: Tag) -> Self {
        let mut wire = WireTag {
            key: tag.key,
            source: Some(tag.source),
            ..WireTag::default()
        };
        match tag.value {
            Some(TagValue::DateTime(dt)) => wire.date_time_value = Some(dt),
            Some(TagValue::Number(n)) => wire.double_value = Some(n),
            Some(TagValue::Boolean(b)) => wire.bool_value = Some(b),
            Some(TagValue::String(s)) => wire.string_value = Some(s),
            None => {}
        }
        wire
    }
}

/// Body of `GET /v1/files/search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<FileRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
    Float(f64),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
            StringOrNumber::Float(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(de).map(StringOrNumber::into_string)
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(de)?.map(StringOrNumber::into_string))
}

fn null_as_empty<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(de)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_accepts_numeric_ids_and_null_tags() {
        let record: FileRecord = serde_json::from_value(json!({
            "id": 42,
            "filename": "plan.pdf",
            "storageId": 3,
            "tags": null
        }))
        .unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.storage_id.as_deref(), Some("3"));
        assert!(record.tags.is_empty());
        assert_eq!(record.title(), "");
    }

    #[test]
    fn wire_tag_keeps_highest_priority_value() {
        let tag: Tag = serde_json::from_value(json!({
            "key": "Mixed",
            "stringValue": "x",
            "doubleValue": 2.5
        }))
        .unwrap();
        assert_eq!(tag.value, Some(TagValue::Number(2.5)));
        assert_eq!(tag.source, "user");
    }

    #[test]
    fn tag_serializes_single_value_field() {
        let tag = Tag::new(JOB_FOLDER_KEY, TagValue::String("JF1".into()));
        let value = serde_json::to_value(&tag).unwrap();
        assert_eq!(
            value,
            json!({"key": "JobFolder.Number", "source": "user", "stringValue": "JF1"})
        );
    }

    #[test]
    fn value_type_falls_back_to_string() {
        assert_eq!(TagValueType::parse("Number"), TagValueType::Number);
        assert_eq!(TagValueType::parse("datetime"), TagValueType::Datetime);
        assert_eq!(TagValueType::parse("boolean"), TagValueType::Boolean);
        assert_eq!(TagValueType::parse("colour"), TagValueType::String);
    }
}
