//! Prompt types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named Handlebars template together with the slots it requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Unique template identifier
    pub id: String,

    /// Template string with Handlebars syntax
    pub template: String,

    /// Variables that must be supplied when rendering
    #[serde(rename = "inputVariables")]
    pub input_variables: Vec<String>,
}

impl PromptTemplate {
    /// Create a template.
    pub fn new(
        id: impl Into<String>,
        template: impl Into<String>,
        input_variables: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
            input_variables: input_variables.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source template ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Template variables that were resolved
    #[serde(rename = "resolvedVariables")]
    pub resolved_variables: HashMap<String, String>,
}

impl BuiltPrompt {
    /// Create a new built prompt.
    pub fn new(
        system: Option<String>,
        user: String,
        source_prompt_id: String,
        resolved_variables: HashMap<String, String>,
    ) -> Self {
        Self {
            system,
            user,
            metadata: BuiltPromptMetadata {
                source_prompt_id,
                resolved_variables,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_creation() {
        let template = PromptTemplate::new("t", "{{a}} {{b}}", &["a", "b"]);
        assert_eq!(template.id, "t");
        assert_eq!(template.input_variables, vec!["a", "b"]);
    }

    #[test]
    fn test_built_prompt_serialization() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "why?".to_string());

        let built = BuiltPrompt::new(None, "User message".to_string(), "rag.answer".to_string(), vars);
        let json = serde_json::to_value(&built).unwrap();

        assert_eq!(json["user"], "User message");
        assert_eq!(json["metadata"]["sourcePromptId"], "rag.answer");
        assert_eq!(json["metadata"]["resolvedVariables"]["question"], "why?");
    }
}
