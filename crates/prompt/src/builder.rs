//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptTemplate};
use docquery_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build a prompt from a template and input variables.
///
/// Every variable named in `template.input_variables` must be present.
/// Extra variables are ignored by the renderer but recorded in the metadata.
///
/// # Example
/// ```
/// use docquery_prompt::{answer_template, build_prompt};
/// use std::collections::HashMap;
///
/// let mut vars = HashMap::new();
/// vars.insert("context".to_string(), "Rust is a language.".to_string());
/// vars.insert("question".to_string(), "What is Rust?".to_string());
///
/// let built = build_prompt(&answer_template(), vars).unwrap();
/// assert!(built.user.contains("Question: What is Rust?"));
/// ```
pub fn build_prompt(
    template: &PromptTemplate,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", template.id);

    if let Some(missing) = template
        .input_variables
        .iter()
        .find(|name| !variables.contains_key(name.as_str()))
    {
        return Err(AppError::Prompt(format!(
            "Missing variable '{}' for prompt {}",
            missing, template.id
        )));
    }

    let rendered = render_template(&template.id, &template.template, &variables)?;

    Ok(BuiltPrompt::new(
        None,
        rendered,
        template.id.clone(),
        variables,
    ))
}

/// Render a Handlebars template with variables.
fn render_template(
    name: &str,
    template: &str,
    variables: &HashMap<String, String>,
) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text prompts, no HTML escaping
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.set_strict_mode(true);

    handlebars
        .register_template_string(name, template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render(name, variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{answer_template, query_constructor_template};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_simple_template() {
        let result = render_template("t", "Question: {{prompt}}", &vars(&[("prompt", "Hello")]));
        assert_eq!(result.unwrap(), "Question: Hello");
    }

    #[test]
    fn test_render_does_not_escape() {
        let result = render_template("t", "{{x}}", &vars(&[("x", "{\"a\": \"<b>\"}")]));
        assert_eq!(result.unwrap(), "{\"a\": \"<b>\"}");
    }

    #[test]
    fn test_render_template_missing_variable_is_error() {
        let result = render_template("t", "Question: {{missing}}", &HashMap::new());
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_build_answer_prompt() {
        let built = build_prompt(
            &answer_template(),
            vars(&[("context", "doc one\n\ndoc two"), ("question", "Which doc?")]),
        )
        .unwrap();

        assert_eq!(
            built.user,
            "Answer the question based only on the following context:\ndoc one\n\ndoc two\n\nQuestion: Which doc?\n"
        );
        assert_eq!(built.metadata.source_prompt_id, "rag.answer");
        assert!(built.system.is_none());
    }

    #[test]
    fn test_build_prompt_requires_declared_slots() {
        let result = build_prompt(&answer_template(), vars(&[("question", "q")]));
        match result {
            Err(AppError::Prompt(msg)) => assert!(msg.contains("context")),
            other => panic!("Expected prompt error, got {:?}", other),
        }
    }

    #[test]
    fn test_build_constructor_prompt() {
        let built = build_prompt(
            &query_constructor_template(),
            vars(&[
                ("content", "\"Brief summary of a movie\""),
                ("attributes", "{\"year\": {\"type\": \"integer\"}}"),
                ("comparators", "eq | gt"),
                ("operators", "and | or"),
                ("query", "movies after 1990"),
                ("limit_schema", ""),
                ("limit_instructions", ""),
            ]),
        )
        .unwrap();

        assert!(built.user.contains("\"content\": \"Brief summary of a movie\""));
        assert!(built.user.contains("\"attributes\": {\"year\": {\"type\": \"integer\"}}"));
        assert!(built.user.contains("<< User Query >>\nmovies after 1990"));
        assert!(!built.user.contains("limit"));
    }
}
