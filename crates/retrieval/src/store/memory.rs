//! In-process document store.
//!
//! Documents live in a `Vec` behind a `tokio::sync::RwLock`. Aggregation
//! pipelines are interpreted stage by stage with the same rules Atlas
//! applies to the stages the retrieval pipeline emits, including the
//! requirement that pre-filter paths be declared on the vector index.
//! Vector search is exact (cosine over every document), so `numCandidates`
//! only bounds the candidate set.

use super::mql;
use super::DocumentStore;
use crate::document::{lookup_path, ID_FIELD};
use async_trait::async_trait;
use docquery_core::{AppError, AppResult};
use mongodb::bson::{Bson, Document as BsonDocument};
use serde_json::{Map, Value};
use std::path::Path;
use tokio::sync::RwLock;

/// Atlas rejects candidate counts above this.
const MAX_NUM_CANDIDATES: u64 = 10_000;

const VECTOR_SEARCH_SCORE: &str = "vectorSearchScore";

/// The vector index the store pretends to have.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndexDefinition {
    /// Index name referenced by `$vectorSearch.index`
    pub name: String,

    /// Field holding the embedding
    pub path: String,

    /// Fields declared with `type: filter`
    pub filter_fields: Vec<String>,
}

impl VectorIndexDefinition {
    pub fn new(name: &str, path: &str, filter_fields: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            filter_fields,
        }
    }
}

/// In-memory collection with one vector index.
#[derive(Debug)]
pub struct InMemoryStore {
    index: VectorIndexDefinition,
    documents: RwLock<Vec<Map<String, Value>>>,
}

/// A document flowing through the pipeline with its search score.
struct Row {
    fields: Map<String, Value>,
    search_score: Option<f64>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new(index: VectorIndexDefinition) -> Self {
        Self {
            index,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Load documents from a JSON array file.
    pub async fn from_seed_file(path: &Path, index: VectorIndexDefinition) -> AppResult<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("Failed to read seed file {:?}: {}", path, e))
        })?;
        let value: Value = serde_json::from_str(&contents)?;
        let Value::Array(documents) = value else {
            return Err(AppError::Config(format!(
                "Seed file {:?} must contain a JSON array",
                path
            )));
        };

        let store = Self::new(index);
        store.insert_many(documents).await?;
        tracing::info!(
            "Loaded {} documents into in-memory store from {:?}",
            store.len().await,
            path
        );
        Ok(store)
    }

    /// Insert one document. A missing `_id` is assigned.
    pub async fn insert(&self, document: Value) -> AppResult<()> {
        let Value::Object(mut object) = document else {
            return Err(AppError::Datastore(
                "Documents must be JSON objects".to_string(),
            ));
        };

        let mut documents = self.documents.write().await;
        match object.get(ID_FIELD) {
            Some(id) => {
                if documents.iter().any(|d| d.get(ID_FIELD) == Some(id)) {
                    return Err(AppError::Datastore(format!("Duplicate key _id: {}", id)));
                }
            }
            None => {
                let id = format!("doc-{}", documents.len() + 1);
                object.insert(ID_FIELD.to_string(), Value::String(id));
            }
        }
        documents.push(object);
        Ok(())
    }

    /// Insert several documents in order.
    pub async fn insert_many(&self, documents: impl IntoIterator<Item = Value>) -> AppResult<()> {
        for document in documents {
            self.insert(document).await?;
        }
        Ok(())
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Fetch a stored document by identifier.
    pub async fn get(&self, id: &Value) -> Option<Map<String, Value>> {
        self.documents
            .read()
            .await
            .iter()
            .find(|d| d.get(ID_FIELD) == Some(id))
            .cloned()
    }

    fn vector_search(&self, rows: Vec<Row>, spec: &Value) -> AppResult<Vec<Row>> {
        let spec = spec
            .as_object()
            .ok_or_else(|| rejected("$vectorSearch takes an object"))?;

        let index = spec.get("index").and_then(Value::as_str).unwrap_or_default();
        if index != self.index.name {
            return Err(rejected(&format!("Index '{}' not found", index)));
        }

        let path = spec.get("path").and_then(Value::as_str).unwrap_or_default();
        if path != self.index.path {
            return Err(rejected(&format!(
                "Path '{}' is not indexed as a vector field",
                path
            )));
        }

        let query: Vec<f64> = spec
            .get("queryVector")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        if query.is_empty() {
            return Err(rejected("queryVector must be a nonempty array of numbers"));
        }

        let limit = positive_int(spec.get("limit"), "limit")?;
        let num_candidates = positive_int(spec.get("numCandidates"), "numCandidates")?;
        if num_candidates < limit || num_candidates > MAX_NUM_CANDIDATES {
            return Err(rejected(&format!(
                "numCandidates must be between limit and {}",
                MAX_NUM_CANDIDATES
            )));
        }

        let filter = spec.get("filter");
        if let Some(filter) = filter {
            let mut paths = Vec::new();
            mql::referenced_paths(filter, &mut paths);
            if let Some(path) = paths
                .iter()
                .find(|p| !self.index.filter_fields.contains(*p))
            {
                return Err(rejected(&format!(
                    "Path '{}' needs to be indexed as filter",
                    path
                )));
            }
        }

        let mut scored = Vec::new();
        for row in rows {
            if let Some(filter) = filter {
                if !mql::matches(&row.fields, filter)? {
                    continue;
                }
            }
            let Some(embedding) = lookup_path(&row.fields, path).and_then(numeric_vector) else {
                continue;
            };
            if embedding.len() != query.len() {
                continue;
            }
            let score = (1.0 + cosine_similarity(&embedding, &query)) / 2.0;
            scored.push(Row {
                fields: row.fields,
                search_score: Some(score),
            });
        }

        scored.sort_by(|a, b| {
            b.search_score
                .partial_cmp(&a.search_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(num_candidates as usize);
        scored.truncate(limit as usize);
        Ok(scored)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn aggregate(&self, pipeline: Vec<BsonDocument>) -> AppResult<Vec<BsonDocument>> {
        let stages: Vec<Value> = pipeline
            .into_iter()
            .map(|stage| Bson::Document(stage).into_relaxed_extjson())
            .collect();

        let mut rows: Vec<Row> = self
            .documents
            .read()
            .await
            .iter()
            .map(|d| Row {
                fields: d.clone(),
                search_score: None,
            })
            .collect();

        for (position, stage) in stages.iter().enumerate() {
            let (name, spec) = single_entry(stage)?;
            tracing::trace!("Applying stage {} at position {}", name, position);

            rows = match name {
                "$vectorSearch" if position == 0 => self.vector_search(rows, spec)?,
                "$vectorSearch" => {
                    return Err(rejected("$vectorSearch must be the first stage"));
                }
                "$set" | "$addFields" => set_stage(rows, spec)?,
                "$project" => project_stage(rows, spec)?,
                "$unset" => unset_stage(rows, spec)?,
                "$match" => {
                    let mut kept = Vec::with_capacity(rows.len());
                    for row in rows {
                        if mql::matches(&row.fields, spec)? {
                            kept.push(row);
                        }
                    }
                    kept
                }
                "$limit" => {
                    let n = positive_int(Some(spec), "$limit")? as usize;
                    rows.into_iter().take(n).collect()
                }
                "$skip" => {
                    let n = spec
                        .as_u64()
                        .ok_or_else(|| rejected("$skip takes a non-negative integer"))?;
                    rows.into_iter().skip(n as usize).collect()
                }
                other => {
                    return Err(rejected(&format!(
                        "Unrecognized pipeline stage name: '{}'",
                        other
                    )))
                }
            };
        }

        rows.into_iter().map(|row| to_bson(row.fields)).collect()
    }

    async fn find_missing(&self, field: &str) -> AppResult<Vec<BsonDocument>> {
        let documents = self.documents.read().await;
        documents
            .iter()
            .filter(|d| lookup_path(d, field).is_none())
            .map(|d| to_bson(d.clone()))
            .collect()
    }

    async fn set_fields(&self, id: &Bson, fields: BsonDocument) -> AppResult<()> {
        let id = id.clone().into_relaxed_extjson();
        let Value::Object(updates) = Bson::Document(fields).into_relaxed_extjson() else {
            return Err(rejected("$set takes an object"));
        };

        let mut documents = self.documents.write().await;
        let document = documents
            .iter_mut()
            .find(|d| d.get(ID_FIELD) == Some(&id))
            .ok_or_else(|| AppError::Datastore(format!("No document with _id {}", id)))?;

        for (path, value) in updates {
            set_path(document, &path, value);
        }
        Ok(())
    }
}

fn rejected(message: &str) -> AppError {
    AppError::Datastore(message.to_string())
}

fn single_entry(stage: &Value) -> AppResult<(&str, &Value)> {
    match stage.as_object() {
        Some(object) if object.len() == 1 => object
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| rejected("empty pipeline stage")),
        _ => Err(rejected(
            "A pipeline stage specification object must contain exactly one field",
        )),
    }
}

fn positive_int(value: Option<&Value>, what: &str) -> AppResult<u64> {
    value
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .ok_or_else(|| rejected(&format!("{} must be a positive integer", what)))
}

fn numeric_vector(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn set_stage(mut rows: Vec<Row>, spec: &Value) -> AppResult<Vec<Row>> {
    let assignments = spec
        .as_object()
        .ok_or_else(|| rejected("$set takes an object"))?;

    for row in &mut rows {
        for (path, expression) in assignments {
            let value = evaluate(expression, row.search_score)?;
            set_path(&mut row.fields, path, value);
        }
    }
    Ok(rows)
}

/// Literal values and `{$meta: "vectorSearchScore"}`; field references and
/// other expressions are not interpreted.
fn evaluate(expression: &Value, search_score: Option<f64>) -> AppResult<Value> {
    match expression {
        Value::Object(object) if object.keys().any(|k| k.starts_with('$')) => {
            match object.get("$meta").and_then(Value::as_str) {
                Some(VECTOR_SEARCH_SCORE) if object.len() == 1 => search_score
                    .map(Value::from)
                    .ok_or_else(|| rejected("vectorSearchScore requires a $vectorSearch stage")),
                _ => Err(rejected(&format!("Unsupported expression: {}", expression))),
            }
        }
        Value::String(s) if s.starts_with('$') => {
            Err(rejected(&format!("Unsupported field reference: {}", s)))
        }
        literal => Ok(literal.clone()),
    }
}

fn project_stage(rows: Vec<Row>, spec: &Value) -> AppResult<Vec<Row>> {
    let spec = spec
        .as_object()
        .ok_or_else(|| rejected("$project takes an object"))?;
    if spec.is_empty() {
        return Err(rejected("$project specification must have at least one field"));
    }

    let mut directives = Vec::with_capacity(spec.len());
    for (path, flag) in spec {
        let include = match flag {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => return Err(rejected(&format!("Unsupported projection for '{}'", path))),
        };
        directives.push((path.as_str(), include));
    }

    let includes = directives.iter().any(|(_, include)| *include);
    let excludes = directives
        .iter()
        .any(|(path, include)| *path != ID_FIELD && !*include);
    if includes && excludes {
        return Err(rejected("Cannot mix inclusion and exclusion in $project"));
    }

    let projected = rows
        .into_iter()
        .map(|row| {
            let fields = if includes {
                let mut kept = Map::new();
                let keep_id = directives
                    .iter()
                    .find(|(path, _)| *path == ID_FIELD)
                    .map_or(true, |(_, include)| *include);
                if keep_id {
                    if let Some(id) = row.fields.get(ID_FIELD) {
                        kept.insert(ID_FIELD.to_string(), id.clone());
                    }
                }
                for (path, include) in &directives {
                    if *include && *path != ID_FIELD {
                        if let Some(value) = lookup_path(&row.fields, path) {
                            set_path(&mut kept, path, value.clone());
                        }
                    }
                }
                kept
            } else {
                let mut fields = row.fields;
                for (path, _) in &directives {
                    remove_path(&mut fields, path);
                }
                fields
            };
            Row {
                fields,
                search_score: row.search_score,
            }
        })
        .collect();
    Ok(projected)
}

fn unset_stage(mut rows: Vec<Row>, spec: &Value) -> AppResult<Vec<Row>> {
    let paths: Vec<&str> = match spec {
        Value::String(path) => vec![path.as_str()],
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().ok_or_else(|| rejected("$unset takes field names")))
            .collect::<AppResult<_>>()?,
        _ => return Err(rejected("$unset takes a field name or an array of names")),
    };

    for row in &mut rows {
        for path in &paths {
            remove_path(&mut row.fields, path);
        }
    }
    Ok(rows)
}

fn set_path(object: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            object.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = object
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(inner) = child {
                set_path(inner, rest, value);
            }
        }
    }
}

fn remove_path(object: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            object.shift_remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = object.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

fn to_bson(fields: Map<String, Value>) -> AppResult<BsonDocument> {
    match Bson::try_from(Value::Object(fields)) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(AppError::Datastore(format!(
            "Stored value is not a document: {}",
            other
        ))),
        Err(e) => Err(AppError::Datastore(format!(
            "Failed to convert stored document: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use serde_json::json;

    async fn store() -> InMemoryStore {
        let store = InMemoryStore::new(VectorIndexDefinition::new(
            "vector_index",
            "embedding",
            vec!["year".to_string(), "genres".to_string()],
        ));
        store
            .insert_many(vec![
                json!({"_id": "a", "title": "A", "year": 1993, "genres": ["Drama"], "embedding": [1.0, 0.0]}),
                json!({"_id": "b", "title": "B", "year": 2001, "genres": ["Comedy"], "embedding": [0.6, 0.8]}),
                json!({"_id": "c", "title": "C", "year": 1993, "genres": ["Comedy"], "embedding": [0.0, 1.0]}),
                json!({"_id": "d", "title": "D", "year": 1950}),
            ])
            .await
            .unwrap();
        store
    }

    fn search(limit: i32, filter: Option<BsonDocument>) -> BsonDocument {
        let mut params = doc! {
            "index": "vector_index",
            "path": "embedding",
            "queryVector": [1.0f64, 0.0f64],
            "numCandidates": limit * 10,
            "limit": limit,
        };
        if let Some(filter) = filter {
            params.insert("filter", filter);
        }
        doc! { "$vectorSearch": params }
    }

    fn titles(results: &[BsonDocument]) -> Vec<String> {
        results
            .iter()
            .map(|d| d.get_str("title").unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_vector_search_ranks_and_limits() {
        let store = store().await;
        let results = store
            .aggregate(vec![
                search(2, None),
                doc! { "$set": { "score": { "$meta": "vectorSearchScore" } } },
            ])
            .await
            .unwrap();

        assert_eq!(titles(&results), vec!["A", "B"]);
        let top = results[0].get_f64("score").unwrap();
        let second = results[1].get_f64("score").unwrap();
        assert!((top - 1.0).abs() < 1e-9);
        assert!(top > second);
    }

    #[tokio::test]
    async fn test_pre_filter_on_indexed_field() {
        let store = store().await;
        let results = store
            .aggregate(vec![search(3, Some(doc! { "year": { "$eq": 1993 } }))])
            .await
            .unwrap();
        assert_eq!(titles(&results), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_pre_filter_on_unindexed_field_is_rejected() {
        let store = store().await;
        let result = store
            .aggregate(vec![search(3, Some(doc! { "title": "A" }))])
            .await;
        match result {
            Err(AppError::Datastore(msg)) => assert!(msg.contains("needs to be indexed as filter")),
            other => panic!("Expected datastore error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[tokio::test]
    async fn test_rejects_bad_search_parameters() {
        let store = store().await;

        let mut wrong_index = search(2, None);
        wrong_index
            .get_document_mut("$vectorSearch")
            .unwrap()
            .insert("index", "other");
        assert!(store.aggregate(vec![wrong_index]).await.is_err());

        let mut few_candidates = search(2, None);
        few_candidates
            .get_document_mut("$vectorSearch")
            .unwrap()
            .insert("numCandidates", 1);
        assert!(store.aggregate(vec![few_candidates]).await.is_err());

        let late = vec![doc! { "$match": {} }, search(2, None)];
        assert!(store.aggregate(late).await.is_err());
    }

    #[tokio::test]
    async fn test_project_and_post_stages() {
        let store = store().await;
        let results = store
            .aggregate(vec![
                search(3, None),
                doc! { "$set": { "score": { "$meta": "vectorSearchScore" } } },
                doc! { "$project": { "_id": 0, "embedding": 0 } },
                doc! { "$match": { "genres": "Comedy" } },
                doc! { "$limit": 1 },
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let doc = &results[0];
        assert_eq!(doc.get_str("title").unwrap(), "B");
        assert!(!doc.contains_key("_id"));
        assert!(!doc.contains_key("embedding"));
        assert!(doc.contains_key("score"));
    }

    #[tokio::test]
    async fn test_inclusion_projection() {
        let store = store().await;
        let results = store
            .aggregate(vec![
                search(1, None),
                doc! { "$set": { "score": { "$meta": "vectorSearchScore" } } },
                doc! { "$project": { "title": 1, "score": 1 } },
            ])
            .await
            .unwrap();

        let keys: Vec<&String> = results[0].keys().collect();
        assert_eq!(keys, vec!["_id", "title", "score"]);
    }

    #[tokio::test]
    async fn test_unknown_stage_is_rejected() {
        let store = store().await;
        let result = store.aggregate(vec![doc! { "$lookup": {} }]).await;
        assert!(matches!(result, Err(AppError::Datastore(_))));
    }

    #[tokio::test]
    async fn test_score_meta_requires_vector_search() {
        let store = store().await;
        let result = store
            .aggregate(vec![doc! { "$set": { "score": { "$meta": "vectorSearchScore" } } }])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_find_missing_and_set_fields() {
        let store = store().await;
        let missing = store.find_missing("embedding").await.unwrap();
        assert_eq!(missing.len(), 1);

        let id = missing[0].get("_id").unwrap().clone();
        store
            .set_fields(&id, doc! { "embedding": [0.5f64, 0.5f64] })
            .await
            .unwrap();

        assert!(store.find_missing("embedding").await.unwrap().is_empty());
        let updated = store.get(&json!("d")).await.unwrap();
        assert_eq!(updated["embedding"], json!([0.5, 0.5]));
    }

    #[tokio::test]
    async fn test_set_fields_unknown_id() {
        let store = store().await;
        let result = store
            .set_fields(&Bson::String("zzz".to_string()), doc! { "x": 1 })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_rejects_duplicates() {
        let store = store().await;
        store.insert(json!({"title": "E"})).await.unwrap();
        assert!(store.get(&json!("doc-5")).await.is_some());
        assert!(store.insert(json!({"_id": "a"})).await.is_err());
        assert!(store.insert(json!([1, 2])).await.is_err());
    }
}
