//! Translation of filters into the store's query language.

use super::filter::{Filter, FilterValue, Operator};
use mongodb::bson::{Bson, Document as BsonDocument};

/// Translate a validated filter into a `$vectorSearch` pre-filter.
///
/// `eq("year", 1993)` becomes `{"year": {"$eq": 1993}}`; `and`/`or` become
/// `$and`/`$or` (a single argument is passed through unwrapped) and `not`
/// becomes `$nor`.
pub fn to_mongo_filter(filter: &Filter) -> BsonDocument {
    match filter {
        Filter::Comparison {
            comparator,
            attribute,
            value,
        } => {
            let mut condition = BsonDocument::new();
            condition.insert(format!("${}", comparator.as_str()), to_bson(value));
            let mut clause = BsonDocument::new();
            clause.insert(attribute.clone(), condition);
            clause
        }
        Filter::Operation {
            operator,
            arguments,
        } => {
            let translated: Vec<BsonDocument> = arguments.iter().map(to_mongo_filter).collect();
            let key = match operator {
                Operator::And | Operator::Or if translated.len() == 1 => {
                    return translated.into_iter().next().unwrap_or_default();
                }
                Operator::And => "$and",
                Operator::Or => "$or",
                Operator::Not => "$nor",
            };
            let mut clause = BsonDocument::new();
            clause.insert(
                key,
                translated.into_iter().map(Bson::Document).collect::<Vec<_>>(),
            );
            clause
        }
    }
}

fn to_bson(value: &FilterValue) -> Bson {
    match value {
        FilterValue::Integer(i) => Bson::Int64(*i),
        FilterValue::Float(x) => Bson::Double(*x),
        FilterValue::String(s) => Bson::String(s.clone()),
        FilterValue::Bool(b) => Bson::Boolean(*b),
        FilterValue::List(items) => Bson::Array(items.iter().map(to_bson).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::self_query::filter::Comparator;
    use mongodb::bson::doc;

    #[test]
    fn test_comparison() {
        let filter = Filter::comparison(Comparator::Gte, "imdb.rating", FilterValue::Float(7.7));
        assert_eq!(
            to_mongo_filter(&filter),
            doc! { "imdb.rating": { "$gte": 7.7 } }
        );
    }

    #[test]
    fn test_operations() {
        let filter = Filter::operation(
            Operator::And,
            vec![
                Filter::comparison(Comparator::Eq, "year", FilterValue::Integer(1993)),
                Filter::comparison(
                    Comparator::In,
                    "genres",
                    FilterValue::List(vec![FilterValue::String("Science fiction".into())]),
                ),
                Filter::operation(
                    Operator::Not,
                    vec![Filter::comparison(
                        Comparator::Eq,
                        "genres",
                        FilterValue::String("Comedy".into()),
                    )],
                ),
            ],
        );

        assert_eq!(
            to_mongo_filter(&filter),
            doc! {
                "$and": [
                    { "year": { "$eq": 1993_i64 } },
                    { "genres": { "$in": ["Science fiction"] } },
                    { "$nor": [ { "genres": { "$eq": "Comedy" } } ] },
                ]
            }
        );
    }

    #[test]
    fn test_single_argument_collapses() {
        let filter = Filter::operation(
            Operator::Or,
            vec![Filter::comparison(Comparator::Ne, "flag", FilterValue::Bool(false))],
        );
        assert_eq!(to_mongo_filter(&filter), doc! { "flag": { "$ne": false } });
    }
}
