//! Filter expression tree.

use super::schema::{AttributeType, MetadataSchema};
use docquery_core::{AppError, AppResult};
use std::fmt;

/// Comparison between an attribute and a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl Comparator {
    pub const ALL: [Comparator; 8] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::In,
        Self::Nin,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Nin => "nin",
        }
    }

    /// Whether the value operand is a list.
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }

    fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

/// Boolean combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
}

impl Operator {
    pub const ALL: [Operator; 3] = [Self::And, Self::Or, Self::Not];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        }
    }
}

/// Literal operand of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Integer(i64),
    Float(f64),
    String(String),
    Bool(bool),
    List(Vec<FilterValue>),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Predicate tree over schema attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Comparison {
        comparator: Comparator,
        attribute: String,
        value: FilterValue,
    },
    Operation {
        operator: Operator,
        arguments: Vec<Filter>,
    },
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison {
                comparator,
                attribute,
                value,
            } => write!(f, "{}({:?}, {})", comparator.as_str(), attribute, value),
            Self::Operation {
                operator,
                arguments,
            } => {
                write!(f, "{}(", operator.as_str())?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", argument)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Filter {
    pub fn comparison(
        comparator: Comparator,
        attribute: impl Into<String>,
        value: FilterValue,
    ) -> Self {
        Self::Comparison {
            comparator,
            attribute: attribute.into(),
            value,
        }
    }

    pub fn operation(operator: Operator, arguments: Vec<Filter>) -> Self {
        Self::Operation {
            operator,
            arguments,
        }
    }

    /// Every attribute name the filter mentions.
    pub fn attributes(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_attributes(&mut names);
        names
    }

    fn collect_attributes<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Comparison { attribute, .. } => {
                if !names.contains(&attribute.as_str()) {
                    names.push(attribute);
                }
            }
            Self::Operation { arguments, .. } => {
                for argument in arguments {
                    argument.collect_attributes(names);
                }
            }
        }
    }

    /// Check the filter against `schema` and normalize its values.
    ///
    /// Integer attributes accept numbers and numeric strings; enum values
    /// are matched case-insensitively and rewritten to the declared
    /// spelling.
    ///
    /// # Errors
    /// `AppError::FilterGrammar` for attributes outside the schema, values
    /// of the wrong type, or malformed operations.
    pub fn validate(self, schema: &MetadataSchema) -> AppResult<Filter> {
        match self {
            Self::Comparison {
                comparator,
                attribute,
                value,
            } => {
                let info = schema.get(&attribute).ok_or_else(|| {
                    AppError::FilterGrammar(format!(
                        "Attribute '{}' is not filterable; allowed: {}",
                        attribute,
                        schema.names().join(", ")
                    ))
                })?;

                let value = match (comparator.takes_list(), value) {
                    (true, FilterValue::List(items)) if !items.is_empty() => FilterValue::List(
                        items
                            .into_iter()
                            .map(|v| coerce(&attribute, &info.attribute_type, v))
                            .collect::<AppResult<_>>()?,
                    ),
                    (true, FilterValue::List(_)) => {
                        return Err(AppError::FilterGrammar(format!(
                            "{} on '{}' needs a nonempty list",
                            comparator.as_str(),
                            attribute
                        )))
                    }
                    (true, scalar) => {
                        FilterValue::List(vec![coerce(&attribute, &info.attribute_type, scalar)?])
                    }
                    (false, FilterValue::List(_)) => {
                        return Err(AppError::FilterGrammar(format!(
                            "{} on '{}' takes a single value",
                            comparator.as_str(),
                            attribute
                        )))
                    }
                    (false, scalar) => coerce(&attribute, &info.attribute_type, scalar)?,
                };

                if comparator.is_ordering() && matches!(info.attribute_type, AttributeType::Enum(_))
                {
                    return Err(AppError::FilterGrammar(format!(
                        "Attribute '{}' cannot be compared with {}",
                        attribute,
                        comparator.as_str()
                    )));
                }

                Ok(Self::Comparison {
                    comparator,
                    attribute,
                    value,
                })
            }
            Self::Operation {
                operator,
                arguments,
            } => {
                match (operator, arguments.len()) {
                    (_, 0) => {
                        return Err(AppError::FilterGrammar(format!(
                            "{} needs at least one argument",
                            operator.as_str()
                        )))
                    }
                    (Operator::Not, n) if n > 1 => {
                        return Err(AppError::FilterGrammar(
                            "not takes exactly one argument".to_string(),
                        ))
                    }
                    _ => {}
                }
                let arguments = arguments
                    .into_iter()
                    .map(|a| a.validate(schema))
                    .collect::<AppResult<_>>()?;
                Ok(Self::Operation {
                    operator,
                    arguments,
                })
            }
        }
    }
}

fn coerce(attribute: &str, attribute_type: &AttributeType, value: FilterValue) -> AppResult<FilterValue> {
    let mismatch = |value: &FilterValue| {
        AppError::FilterGrammar(format!(
            "Value {} does not fit attribute '{}'",
            value, attribute
        ))
    };

    match attribute_type {
        AttributeType::Integer => match value {
            FilterValue::Integer(_) | FilterValue::Float(_) => Ok(value),
            FilterValue::String(ref s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Ok(FilterValue::Integer(i))
                } else if let Ok(x) = trimmed.parse::<f64>() {
                    Ok(FilterValue::Float(x))
                } else {
                    Err(mismatch(&value))
                }
            }
            _ => Err(mismatch(&value)),
        },
        AttributeType::String => match value {
            FilterValue::String(_) => Ok(value),
            _ => Err(mismatch(&value)),
        },
        AttributeType::Enum(allowed) => match value {
            FilterValue::String(ref s) => allowed
                .iter()
                .find(|a| a.eq_ignore_ascii_case(s.trim()))
                .map(|a| FilterValue::String(a.clone()))
                .ok_or_else(|| {
                    AppError::FilterGrammar(format!(
                        "Value {} is not one of the allowed values for '{}'",
                        value, attribute
                    ))
                }),
            _ => Err(mismatch(&value)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::self_query::schema::AttributeInfo;

    fn schema() -> MetadataSchema {
        MetadataSchema::new(vec![
            AttributeInfo::new("year", AttributeType::Integer, "Release year"),
            AttributeInfo::new("title", AttributeType::String, "Title"),
            AttributeInfo::new(
                "genres",
                AttributeType::Enum(vec!["Science fiction".to_string(), "Drama".to_string()]),
                "Genres",
            ),
        ])
        .unwrap()
    }

    fn eq(attribute: &str, value: FilterValue) -> Filter {
        Filter::comparison(Comparator::Eq, attribute, value)
    }

    #[test]
    fn test_names_round_trip() {
        for comparator in Comparator::ALL {
            assert_eq!(Comparator::parse(comparator.as_str()), Some(comparator));
        }
        for operator in Operator::ALL {
            assert_eq!(Operator::parse(operator.as_str()), Some(operator));
        }
        assert_eq!(Comparator::parse("like"), None);
    }

    #[test]
    fn test_unknown_attribute_is_grammar_error() {
        let result = eq("director", FilterValue::String("Spielberg".into())).validate(&schema());
        match result {
            Err(AppError::FilterGrammar(msg)) => assert!(msg.contains("director")),
            other => panic!("Expected grammar error, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_unknown_attribute_is_rejected() {
        let filter = Filter::operation(
            Operator::And,
            vec![
                eq("year", FilterValue::Integer(1993)),
                Filter::operation(
                    Operator::Not,
                    vec![eq("rating", FilterValue::Float(7.7))],
                ),
            ],
        );
        assert!(filter.validate(&schema()).is_err());
    }

    #[test]
    fn test_integer_coercion() {
        let filter = Filter::comparison(Comparator::Gt, "year", FilterValue::String(" 1990 ".into()))
            .validate(&schema())
            .unwrap();
        assert_eq!(
            filter,
            Filter::comparison(Comparator::Gt, "year", FilterValue::Integer(1990))
        );

        assert!(eq("year", FilterValue::String("nineties".into()))
            .validate(&schema())
            .is_err());
        assert!(eq("year", FilterValue::Bool(true)).validate(&schema()).is_err());
    }

    #[test]
    fn test_enum_normalization() {
        let filter = eq("genres", FilterValue::String("science FICTION".into()))
            .validate(&schema())
            .unwrap();
        assert_eq!(
            filter,
            eq("genres", FilterValue::String("Science fiction".into()))
        );

        assert!(eq("genres", FilterValue::String("Western".into()))
            .validate(&schema())
            .is_err());
        assert!(
            Filter::comparison(Comparator::Gt, "genres", FilterValue::String("Drama".into()))
                .validate(&schema())
                .is_err()
        );
    }

    #[test]
    fn test_list_operands() {
        let filter = Filter::comparison(Comparator::In, "genres", FilterValue::String("drama".into()))
            .validate(&schema())
            .unwrap();
        assert_eq!(
            filter,
            Filter::comparison(
                Comparator::In,
                "genres",
                FilterValue::List(vec![FilterValue::String("Drama".into())])
            )
        );

        assert!(
            Filter::comparison(Comparator::In, "year", FilterValue::List(vec![]))
                .validate(&schema())
                .is_err()
        );
        assert!(eq("year", FilterValue::List(vec![FilterValue::Integer(1)]))
            .validate(&schema())
            .is_err());
    }

    #[test]
    fn test_operation_arity() {
        assert!(Filter::operation(Operator::And, vec![])
            .validate(&schema())
            .is_err());
        let two = vec![
            eq("year", FilterValue::Integer(1)),
            eq("year", FilterValue::Integer(2)),
        ];
        assert!(Filter::operation(Operator::Not, two)
            .validate(&schema())
            .is_err());
    }

    #[test]
    fn test_display_and_attributes() {
        let filter = Filter::operation(
            Operator::And,
            vec![
                eq("year", FilterValue::Integer(1993)),
                Filter::comparison(
                    Comparator::In,
                    "genres",
                    FilterValue::List(vec![FilterValue::String("Drama".into())]),
                ),
                Filter::comparison(Comparator::Gte, "year", FilterValue::Float(1.5)),
            ],
        );
        assert_eq!(
            filter.to_string(),
            r#"and(eq("year", 1993), in("genres", ["Drama"]), gte("year", 1.5))"#
        );
        assert_eq!(filter.attributes(), vec!["year", "genres"]);
    }
}
