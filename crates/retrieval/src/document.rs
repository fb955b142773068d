//! Documents as they come back from a search.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the store's internal identifier field.
pub const ID_FIELD: &str = "_id";

/// Synthetic field the search pipeline writes the similarity score into.
pub const SCORE_FIELD: &str = "score";

/// A retrieved document.
///
/// `id` is only present when the projection kept the store's `_id`. The
/// embedding field is only present when a projection explicitly included it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Opaque store identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    /// Content and metadata fields
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create a document without an identifier.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { id: None, fields }
    }

    /// Split a raw result object into identifier and content fields.
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let id = object.shift_remove(ID_FIELD);
        Self { id, fields: object }
    }

    /// Look up a field by dotted path (`imdb.rating`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.fields, path)
    }

    /// Content fields as a JSON object, identifier stripped.
    pub fn into_content(self) -> Value {
        Value::Object(self.fields)
    }

    /// Content fields rendered as compact JSON text.
    pub fn content_text(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

/// A document paired with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Resolve a dotted path through nested objects.
pub(crate) fn lookup_path<'a>(object: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = object.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
