//! Turns a model's free-text reply into a [`PageRecord`].
//!
//! Models asked for strict JSON still wrap it in markdown fences or break
//! string values across lines, so the reply is normalized before parsing.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::ExtractionError;

static LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*```(?:json)?[ \t]*\r?\n?").expect("valid fence regex"));
static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?```\s*$").expect("valid fence regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Category {
    Music,
    Science,
    Business,
    Lifestyle,
    Work,
    Cinema,
    SpareTime,
    Cooking,
    Sport,
    Other,
    /// Outside the advisory list; kept verbatim.
    Unrecognized(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Music => "music",
            Category::Science => "science",
            Category::Business => "business",
            Category::Lifestyle => "lifestyle",
            Category::Work => "work",
            Category::Cinema => "cinema",
            Category::SpareTime => "spare-time",
            Category::Cooking => "cooking",
            Category::Sport => "sport",
            Category::Other => "other",
            Category::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Category::Unrecognized(_))
    }
}

impl From<String> for Category {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "music" => Category::Music,
            "science" => Category::Science,
            "business" => Category::Business,
            "lifestyle" => Category::Lifestyle,
            "work" => Category::Work,
            "cinema" => Category::Cinema,
            "spare-time" | "spare time" | "spare_time" => Category::SpareTime,
            "cooking" => Category::Cooking,
            "sport" => Category::Sport,
            "other" => Category::Other,
            _ => Category::Unrecognized(raw),
        }
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        match category {
            Category::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const RESPONSE_BODY_KEY: &str = "responseBody";

/// Structured description of a fetched page.
///
/// Holds the model's object as emitted: absent keys stay absent and values keep
/// their JSON type. Only `responseBody` belongs to the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PageRecord {
    fields: Map<String, Value>,
    response_body: String,
}

impl PageRecord {
    /// Any `responseBody` among `fields` is discarded in favour of `response_body`.
    pub fn new(mut fields: Map<String, Value>, response_body: String) -> Self {
        fields.remove(RESPONSE_BODY_KEY);
        Self {
            fields,
            response_body,
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.text("url")
    }

    pub fn title(&self) -> Option<&str> {
        self.text("title")
    }

    pub fn header(&self) -> Option<&str> {
        self.text("header")
    }

    pub fn subheader(&self) -> Option<&str> {
        self.text("subheader")
    }

    pub fn excerpt(&self) -> Option<&str> {
        self.text("excerpt")
    }

    /// `None` when the key is absent or `null`. Non-string values are unrecognized.
    pub fn category(&self) -> Option<Category> {
        match self.fields.get("category")? {
            Value::Null => None,
            Value::String(raw) => Some(Category::from(raw.clone())),
            other => Some(Category::Unrecognized(other.to_string())),
        }
    }

    pub fn response_body(&self) -> &str {
        &self.response_body
    }

    /// Everything the model emitted, in its original JSON types.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

impl Serialize for PageRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(RESPONSE_BODY_KEY, &self.response_body)?;
        map.end()
    }
}

/// Removes an optional markdown fence around the reply, then trims and
/// collapses line breaks into single spaces.
pub fn normalize_completion(raw: &str) -> String {
    let unfenced = LEADING_FENCE.replace(raw, "");
    let unfenced = TRAILING_FENCE.replace(&unfenced, "");

    unfenced
        .trim()
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

/// Parses a model reply into a [`PageRecord`] and attaches `fetched_body`.
pub fn extract(raw_completion: &str, fetched_body: &str) -> Result<PageRecord, ExtractionError> {
    let normalized = normalize_completion(raw_completion);

    let malformed = |reason: String| ExtractionError::MalformedModelOutput {
        raw: raw_completion.to_string(),
        reason,
    };

    let value: Value =
        serde_json::from_str(&normalized).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;
    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )));
        }
    };

    let record = PageRecord::new(fields, fetched_body.to_string());

    if let Some(category) = record.category().filter(|c| !c.is_recognized()) {
        tracing::warn!(
            %category,
            url = record.url().unwrap_or("-"),
            "model returned an unrecognized category"
        );
    }

    Ok(record)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
