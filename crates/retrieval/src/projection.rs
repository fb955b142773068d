//! Result projection.
//!
//! A projection is an ordered list of field directives. It is either the
//! default (hide the identifier and the embedding field) or parsed from a
//! caller-supplied JSON text, and is rendered as a `$project` stage placed
//! after the score annotation in the search pipeline.

use crate::document::{ID_FIELD, SCORE_FIELD};
use docquery_core::{AppError, AppResult};
use mongodb::bson::{doc, Document as BsonDocument};
use serde_json::Value;

const PROJECT_STAGE: &str = "$project";

/// What to do with one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Include,
    Exclude,
}

/// Ordered field-inclusion/exclusion directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    directives: Vec<(String, Directive)>,
}

impl Projection {
    /// Exclude the identifier and the embedding field.
    pub fn default_for(embedding_key: &str) -> Self {
        Self {
            directives: vec![
                (ID_FIELD.to_string(), Directive::Exclude),
                (embedding_key.to_string(), Directive::Exclude),
            ],
        }
    }

    /// Parse a caller-supplied projection.
    ///
    /// Accepts a bare object (`{"title": 1, "_id": 0}`) or a full stage
    /// (`{"$project": {...}}`). Anything else is rejected.
    pub fn parse(text: &str) -> AppResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| AppError::InvalidRequest(format!("Projection is not valid JSON: {}", e)))?;
        Self::from_json(&value)
    }

    /// Build a projection from an already-decoded JSON value.
    pub fn from_json(value: &Value) -> AppResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| AppError::InvalidRequest("Projection must be a JSON object".to_string()))?;

        let spec = match object.get(PROJECT_STAGE) {
            Some(inner) if object.len() == 1 => inner.as_object().ok_or_else(|| {
                AppError::InvalidRequest("$project must map to an object".to_string())
            })?,
            Some(_) => {
                return Err(AppError::InvalidRequest(
                    "$project stage cannot carry sibling keys".to_string(),
                ))
            }
            None => object,
        };

        if spec.is_empty() {
            return Err(AppError::InvalidRequest(
                "Projection must name at least one field".to_string(),
            ));
        }

        let mut directives = Vec::with_capacity(spec.len());
        for (field, raw) in spec {
            if field.is_empty() || field.starts_with('$') {
                return Err(AppError::InvalidRequest(format!(
                    "Invalid projection field name: '{}'",
                    field
                )));
            }
            directives.push((field.clone(), parse_directive(field, raw)?));
        }

        let projection = Self { directives };
        projection.check_consistent()?;
        if !projection.is_inclusion()
            && projection.directives.iter().all(|(field, _)| field == SCORE_FIELD)
        {
            return Err(AppError::InvalidRequest(format!(
                "Projection must name a field other than '{}'",
                SCORE_FIELD
            )));
        }
        Ok(projection)
    }

    /// Also exclude `field` unless the projection already decides it.
    ///
    /// Inclusion projections drop unnamed fields on their own.
    pub fn hiding(mut self, field: &str) -> Self {
        let named = self.directives.iter().any(|(name, _)| name == field);
        if !named && !self.is_inclusion() {
            self.directives.push((field.to_string(), Directive::Exclude));
        }
        self
    }

    /// The directives in declaration order.
    pub fn directives(&self) -> &[(String, Directive)] {
        &self.directives
    }

    /// Whether this projection whitelists fields rather than hiding them.
    ///
    /// `{"_id": 1}` alone is an inclusion projection, as in MongoDB.
    pub fn is_inclusion(&self) -> bool {
        let includes = self.directives.iter().any(|(_, d)| *d == Directive::Include);
        let excludes = self
            .directives
            .iter()
            .any(|(field, d)| field != ID_FIELD && *d == Directive::Exclude);
        includes && !excludes
    }

    /// Whether `field` survives this projection.
    pub fn keeps(&self, field: &str) -> bool {
        let explicit = self
            .directives
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, d)| *d);
        match explicit {
            Some(directive) => directive == Directive::Include,
            None if field == ID_FIELD => true,
            None => !self.is_inclusion(),
        }
    }

    /// Render as a `$project` pipeline stage.
    ///
    /// The score field is always kept so results can be materialized.
    pub fn to_stage(&self) -> BsonDocument {
        let mut spec = BsonDocument::new();
        for (field, directive) in &self.directives {
            if field == SCORE_FIELD {
                continue;
            }
            let flag = match directive {
                Directive::Include => 1,
                Directive::Exclude => 0,
            };
            spec.insert(field.clone(), flag);
        }
        if self.is_inclusion() {
            spec.insert(SCORE_FIELD, 1);
        }
        doc! { "$project": spec }
    }

    fn check_consistent(&self) -> AppResult<()> {
        let mut includes = false;
        let mut excludes = false;
        for (field, directive) in &self.directives {
            if field == ID_FIELD {
                continue;
            }
            match directive {
                Directive::Include => includes = true,
                Directive::Exclude => excludes = true,
            }
        }
        if includes && excludes {
            return Err(AppError::InvalidRequest(
                "Projection cannot mix inclusion and exclusion".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_directive(field: &str, raw: &Value) -> AppResult<Directive> {
    let include = match raw {
        Value::Bool(b) => *b,
        Value::Number(n) if n.as_f64() == Some(1.0) => true,
        Value::Number(n) if n.as_f64() == Some(0.0) => false,
        _ => {
            return Err(AppError::InvalidRequest(format!(
                "Projection value for '{}' must be 0, 1, true or false",
                field
            )))
        }
    };
    Ok(if include {
        Directive::Include
    } else {
        Directive::Exclude
    })
}
