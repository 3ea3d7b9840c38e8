//! Multipart encoding of file updates.
//!
//! The update endpoint takes `multipart/form-data` with one field per
//! file attribute and a `Tags[i][...]` triplet per tag. The body is built by
//! hand so the exact field order and boundary are under our control.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::merge::iso_millis;
use super::schema::{FileRecord, Tag, TagValue};

/// Written to `FileUpdatedBy` on every update.
pub const UPDATED_BY: &str = "Bulk Tagger";

const BOUNDARY_PREFIX: &str = "----BulkTag";

static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedUpdate {
    pub content_type: String,
    pub body: String,
}

/// Boundary derived from the current time, with a sequence suffix so two
/// requests in the same millisecond still differ.
pub fn new_boundary() -> String {
    let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{BOUNDARY_PREFIX}{}{seq:04}", Utc::now().timestamp_millis())
}

pub fn encode_update(
    record: &FileRecord,
    tags: &[Tag],
    now: DateTime<Utc>,
    boundary: &str,
) -> EncodedUpdate {
    let mut form = FormWriter::new(boundary);

    let title = [record.title(), record.filename()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("Untitled");
    let storage_id = record
        .storage_id
        .as_deref()
        .filter(|s| !s.is_empty() && *s != "0")
        .unwrap_or("1");

    form.field("Title", title);
    form.field("Filename", record.filename());
    form.field("StorageId", storage_id);
    form.field("StorageLocation", record.storage_location.as_deref().unwrap_or(""));
    form.field("FileUpdatedDate", &iso_millis(now));
    form.field("FileUpdatedBy", UPDATED_BY);

    for (i, tag) in tags.iter().enumerate() {
        form.field(&format!("Tags[{i}][key]"), &tag.key);
        form.field(&format!("Tags[{i}][source]"), &tag.source);
        let (field, value) = match &tag.value {
            Some(TagValue::DateTime(dt)) => ("dateTimeValue", dt.clone()),
            Some(TagValue::Number(n)) => ("doubleValue", n.to_string()),
            Some(TagValue::Boolean(b)) => ("boolValue", b.to_string()),
            Some(TagValue::String(s)) => ("stringValue", s.clone()),
            None => continue,
        };
        form.field(&format!("Tags[{i}][{field}]"), &value);
    }

    EncodedUpdate {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        body: form.finish(),
    }
}

struct FormWriter<'a> {
    boundary: &'a str,
    body: String,
}

impl<'a> FormWriter<'a> {
    fn new(boundary: &'a str) -> Self {
        Self {
            boundary,
            body: String::new(),
        }
    }

    fn field(&mut self, name: &str, value: &str) {
        let _ = write!(
            self.body,
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            self.boundary, name, value
        );
    }

    fn finish(mut self) -> String {
        let _ = write!(self.body, "--{}--\r\n", self.boundary);
        self.body
    }
}
