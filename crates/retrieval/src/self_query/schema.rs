//! Metadata schema the query constructor may filter on.

use docquery_core::config::MetadataAttributeConfig;
use docquery_core::{AppError, AppResult};
use serde_json::{json, Map, Value};

/// Semantic type of a filterable attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    Integer,
    String,
    /// A string restricted to the listed values
    Enum(Vec<String>),
}

impl AttributeType {
    /// Type name shown to the model. Enums are presented as strings.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::String | Self::Enum(_) => "string",
        }
    }
}

/// One filterable attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Dotted field path, e.g. `imdb.rating`
    pub name: String,
    pub attribute_type: AttributeType,
    pub description: String,
}

impl AttributeInfo {
    pub fn new(
        name: impl Into<String>,
        attribute_type: AttributeType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            description: description.into(),
        }
    }
}

/// Ordered set of filterable attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSchema {
    attributes: Vec<AttributeInfo>,
}

impl MetadataSchema {
    /// Build a schema. Attribute names must be unique and nonempty.
    pub fn new(attributes: Vec<AttributeInfo>) -> AppResult<Self> {
        for (i, attribute) in attributes.iter().enumerate() {
            if attribute.name.trim().is_empty() {
                return Err(AppError::Config(
                    "Metadata attribute name cannot be empty".to_string(),
                ));
            }
            if attributes[..i].iter().any(|a| a.name == attribute.name) {
                return Err(AppError::Config(format!(
                    "Duplicate metadata attribute: {}",
                    attribute.name
                )));
            }
            if let AttributeType::Enum(values) = &attribute.attribute_type {
                if values.is_empty() {
                    return Err(AppError::Config(format!(
                        "Enum attribute '{}' needs at least one value",
                        attribute.name
                    )));
                }
            }
        }
        Ok(Self { attributes })
    }

    /// Build a schema from its configuration form.
    pub fn from_config(config: &[MetadataAttributeConfig]) -> AppResult<Self> {
        let attributes = config
            .iter()
            .map(|entry| {
                let attribute_type = match entry.attribute_type.to_lowercase().as_str() {
                    "integer" | "int" => AttributeType::Integer,
                    "string" | "str" if entry.values.is_empty() => AttributeType::String,
                    "string" | "str" | "enum" => AttributeType::Enum(entry.values.clone()),
                    other => {
                        return Err(AppError::Config(format!(
                            "Unknown type '{}' for metadata attribute '{}'",
                            other, entry.name
                        )))
                    }
                };
                Ok(AttributeInfo::new(
                    entry.name.clone(),
                    attribute_type,
                    entry.description.clone(),
                ))
            })
            .collect::<AppResult<Vec<_>>>()?;
        Self::new(attributes)
    }

    /// Look up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    /// Attribute names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    /// Attribute descriptors as the JSON object embedded in the prompt.
    pub fn to_prompt_json(&self) -> String {
        let mut object = Map::new();
        for attribute in &self.attributes {
            let description = match &attribute.attribute_type {
                AttributeType::Enum(values) => format!(
                    "{}. One of [{}]",
                    attribute.description.trim_end_matches('.'),
                    values
                        .iter()
                        .map(|v| format!("'{}'", v))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                _ => attribute.description.clone(),
            };
            object.insert(
                attribute.name.clone(),
                json!({
                    "description": description,
                    "type": attribute.attribute_type.prompt_name(),
                }),
            );
        }
        serde_json::to_string_pretty(&Value::Object(object)).unwrap_or_else(|_| "{}".to_string())
    }
}
