//! Query-language evaluation for the in-memory backend.
//!
//! Supports the subset the pipeline produces: field equality, comparison
//! operators, membership, `$exists`, `$not`, and the `$and`/`$or`/`$nor`
//! combinators. Array-valued fields match when any element matches.

use crate::document::lookup_path;
use docquery_core::{AppError, AppResult};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Evaluate `filter` against `doc`.
pub(crate) fn matches(doc: &Map<String, Value>, filter: &Value) -> AppResult<bool> {
    let clauses = filter
        .as_object()
        .ok_or_else(|| unsupported("filter must be an object"))?;

    for (key, condition) in clauses {
        let hit = match key.as_str() {
            "$and" => all_of(doc, condition)?,
            "$or" => any_of(doc, condition)?,
            "$nor" => !any_of(doc, condition)?,
            op if op.starts_with('$') => {
                return Err(unsupported(&format!("unknown top-level operator {}", op)))
            }
            path => field_matches(lookup_path(doc, path), condition)?,
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Every field path a filter refers to.
pub(crate) fn referenced_paths(filter: &Value, out: &mut Vec<String>) {
    let Some(clauses) = filter.as_object() else {
        return;
    };
    for (key, condition) in clauses {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                if let Some(items) = condition.as_array() {
                    for item in items {
                        referenced_paths(item, out);
                    }
                }
            }
            op if op.starts_with('$') => {}
            path => {
                if !out.iter().any(|p| p == path) {
                    out.push(path.to_string());
                }
            }
        }
    }
}

fn all_of(doc: &Map<String, Value>, condition: &Value) -> AppResult<bool> {
    for filter in sub_filters(condition)? {
        if !matches(doc, filter)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(doc: &Map<String, Value>, condition: &Value) -> AppResult<bool> {
    for filter in sub_filters(condition)? {
        if matches(doc, filter)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn sub_filters(condition: &Value) -> AppResult<&Vec<Value>> {
    match condition.as_array() {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(unsupported("$and/$or/$nor must be a nonempty array")),
    }
}

fn is_operator_object(condition: &Value) -> bool {
    condition
        .as_object()
        .map(|o| !o.is_empty() && o.keys().all(|k| k.starts_with('$')))
        .unwrap_or(false)
}

fn field_matches(value: Option<&Value>, condition: &Value) -> AppResult<bool> {
    if !is_operator_object(condition) {
        return Ok(equals(value, condition));
    }

    let operators = condition.as_object().map(|o| o.iter()).into_iter().flatten();
    for (op, arg) in operators {
        let hit = match op.as_str() {
            "$eq" => equals(value, arg),
            "$ne" => !equals(value, arg),
            "$gt" => compares(value, arg, |o| o == Ordering::Greater),
            "$gte" => compares(value, arg, |o| o != Ordering::Less),
            "$lt" => compares(value, arg, |o| o == Ordering::Less),
            "$lte" => compares(value, arg, |o| o != Ordering::Greater),
            "$in" => member_of(value, arg)?,
            "$nin" => !member_of(value, arg)?,
            "$exists" => {
                let wanted = arg
                    .as_bool()
                    .ok_or_else(|| unsupported("$exists takes a boolean"))?;
                value.is_some() == wanted
            }
            "$not" => {
                if !is_operator_object(arg) {
                    return Err(unsupported("$not needs an operator expression"));
                }
                !field_matches(value, arg)?
            }
            other => return Err(unsupported(&format!("unknown operator {}", other))),
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Values a predicate is tested against: the field itself and, for arrays,
/// each element.
fn candidates(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => std::iter::once(value).chain(items.iter()).collect(),
        other => vec![other],
    }
}

fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(actual) => candidates(actual).into_iter().any(|c| same(c, expected)),
    }
}

fn member_of(value: Option<&Value>, list: &Value) -> AppResult<bool> {
    let options = list
        .as_array()
        .ok_or_else(|| unsupported("$in/$nin take an array"))?;
    Ok(options.iter().any(|option| equals(value, option)))
}

fn compares(value: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(actual) = value else {
        return false;
    };
    candidates(actual)
        .into_iter()
        .filter_map(|c| order(c, bound))
        .any(accept)
}

fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering within a type bracket; values of different types never compare.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn unsupported(message: &str) -> AppError {
    AppError::Datastore(format!("Unsupported query: {}", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn movie() -> Map<String, Value> {
        json!({
            "title": "Jurassic Park",
            "year": 1993,
            "imdb": {"rating": 8.1},
            "genres": ["Action", "Science fiction"],
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn check(filter: Value) -> bool {
        matches(&movie(), &filter).unwrap()
    }

    #[test]
    fn test_comparisons() {
        assert!(check(json!({"year": 1993})));
        assert!(check(json!({"year": {"$eq": 1993.0}})));
        assert!(check(json!({"year": {"$gt": 1990, "$lte": 1993}})));
        assert!(!check(json!({"year": {"$lt": 1993}})));
        assert!(check(json!({"imdb.rating": {"$gte": 7.7}})));
        assert!(!check(json!({"year": {"$gt": "1990"}})));
    }

    #[test]
    fn test_array_fields_match_any_element() {
        assert!(check(json!({"genres": "Science fiction"})));
        assert!(check(json!({"genres": {"$in": ["Drama", "Action"]}})));
        assert!(!check(json!({"genres": {"$nin": ["Action"]}})));
        assert!(check(json!({"genres": {"$ne": "Comedy"}})));
    }

    #[test]
    fn test_missing_fields() {
        assert!(check(json!({"director": null})));
        assert!(check(json!({"director": {"$exists": false}})));
        assert!(!check(json!({"director": {"$gt": 1}})));
        assert!(check(json!({"director": {"$ne": "Spielberg"}})));
    }

    #[test]
    fn test_combinators() {
        assert!(check(json!({"$and": [{"year": 1993}, {"genres": "Action"}]})));
        assert!(check(json!({"$or": [{"year": 1990}, {"genres": "Action"}]})));
        assert!(!check(json!({"$nor": [{"year": 1993}]})));
        assert!(check(json!({"year": {"$not": {"$lt": 1990}}})));
    }

    #[test]
    fn test_unknown_operator_is_datastore_error() {
        let result = matches(&movie(), &json!({"year": {"$regex": "19"}}));
        assert!(matches!(result, Err(AppError::Datastore(_))));
        assert!(matches(&movie(), &json!({"$where": "true"})).is_err());
    }

    #[test]
    fn test_referenced_paths() {
        let mut paths = Vec::new();
        referenced_paths(
            &json!({"$and": [{"year": {"$gt": 1990}}, {"$nor": [{"genres": "Drama"}]}], "year": 1}),
            &mut paths,
        );
        assert_eq!(paths, vec!["year", "genres"]);
    }
}
