//! LLM-backed construction of structured queries.

use super::filter::{Comparator, Operator};
use super::parser::{parse_structured_output, StructuredQuery};
use super::schema::MetadataSchema;
use docquery_core::config::{LlmSettings, RetrievalSettings};
use docquery_core::AppResult;
use docquery_llm::{LlmClient, LlmRequest};
use docquery_prompt::{build_prompt, query_constructor_template};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const LIMIT_SCHEMA: &str =
    ",\n    \"limit\": int \\ the number of documents to retrieve";

const LIMIT_INSTRUCTIONS: &str = "\nMake sure the `limit` is always an int value. \
It is an optional parameter so leave it blank if it does not make sense.";

/// Turns a free-text question into a [`StructuredQuery`].
///
/// The model is called in JSON mode with the query-constructor prompt; its
/// output is parsed and the filter is checked against the schema before it
/// is returned.
#[derive(Clone)]
pub struct SelfQueryConstructor {
    llm: Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f32>,
    schema: MetadataSchema,
    document_content_description: String,
    enable_limit: bool,
}

impl SelfQueryConstructor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        schema: MetadataSchema,
        document_content_description: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            temperature: None,
            schema,
            document_content_description: document_content_description.into(),
            enable_limit: false,
        }
    }

    /// Build from the model and retrieval settings.
    pub fn from_config(
        llm: Arc<dyn LlmClient>,
        llm_settings: &LlmSettings,
        retrieval: &RetrievalSettings,
    ) -> AppResult<Self> {
        let schema = MetadataSchema::from_config(&retrieval.metadata_schema)?;
        let mut constructor = Self::new(
            llm,
            &llm_settings.model,
            schema,
            &retrieval.document_content_description,
        )
        .with_limit(retrieval.enable_limit);
        constructor.temperature = llm_settings.temperature;
        Ok(constructor)
    }

    /// Let the model propose a result count.
    pub fn with_limit(mut self, enable: bool) -> Self {
        self.enable_limit = enable;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn schema(&self) -> &MetadataSchema {
        &self.schema
    }

    /// Render the constructor prompt for `query`.
    pub fn render_prompt(&self, query: &str) -> AppResult<String> {
        let join = |names: Vec<&str>| names.join(" | ");

        let mut variables = HashMap::new();
        variables.insert(
            "content".to_string(),
            serde_json::to_string(&self.document_content_description)?,
        );
        variables.insert("attributes".to_string(), self.schema.to_prompt_json());
        variables.insert(
            "comparators".to_string(),
            join(Comparator::ALL.iter().map(Comparator::as_str).collect()),
        );
        variables.insert(
            "operators".to_string(),
            join(Operator::ALL.iter().map(Operator::as_str).collect()),
        );
        variables.insert("query".to_string(), query.to_string());
        let (limit_schema, limit_instructions) = if self.enable_limit {
            (LIMIT_SCHEMA, LIMIT_INSTRUCTIONS)
        } else {
            ("", "")
        };
        variables.insert("limit_schema".to_string(), limit_schema.to_string());
        variables.insert(
            "limit_instructions".to_string(),
            limit_instructions.to_string(),
        );

        Ok(build_prompt(&query_constructor_template(), variables)?.user)
    }

    /// JSON schema passed to providers that constrain output.
    fn output_schema(&self) -> serde_json::Value {
        let mut properties = json!({
            "query": { "type": "string" },
            "filter": { "type": "string" },
        });
        if self.enable_limit {
            properties["limit"] = json!({ "type": "integer" });
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": ["query", "filter"],
        })
    }

    /// Ask the model for a structured query and validate it.
    ///
    /// # Errors
    /// - `AppError::Llm` if the model call fails
    /// - `AppError::FilterParse` if the output is not a well-formed request
    /// - `AppError::FilterGrammar` if the filter breaks the grammar or schema
    #[tracing::instrument(skip(self), fields(model = %self.model))]
    pub async fn construct(&self, query: &str) -> AppResult<StructuredQuery> {
        let prompt = self.render_prompt(query)?;

        let mut request = LlmRequest::new(prompt, &self.model).with_json_schema(self.output_schema());
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        let response = self.llm.complete(&request).await?;
        tracing::debug!("Structured request: {}", response.content);

        let mut structured = parse_structured_output(&response.content)?;
        structured.filter = structured
            .filter
            .map(|filter| filter.validate(&self.schema))
            .transpose()?;
        if !self.enable_limit {
            structured.limit = None;
        }

        match &structured.filter {
            Some(filter) => tracing::info!("Constructed filter: {}", filter),
            None => tracing::info!("No filter constructed"),
        }
        Ok(structured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::self_query::filter::{Filter, FilterValue};
    use docquery_core::AppError;
    use docquery_llm::MockLlmClient;

    fn constructor(mock: Arc<MockLlmClient>) -> SelfQueryConstructor {
        SelfQueryConstructor::from_config(
            mock,
            &LlmSettings::default(),
            &RetrievalSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_prompt_mentions_schema_and_query() {
        let c = constructor(Arc::new(MockLlmClient::new()));
        let prompt = c.render_prompt("sci-fi from 1993").unwrap();

        assert!(prompt.contains("Brief summary of a movie"));
        assert!(prompt.contains("\"imdb.rating\""));
        assert!(prompt.contains("eq | ne | gt | gte | lt | lte | in | nin"));
        assert!(prompt.contains("and | or | not"));
        assert!(prompt.contains("sci-fi from 1993"));
        assert!(!prompt.contains("\"limit\""));

        let with_limit = c.with_limit(true).render_prompt("q").unwrap();
        assert!(with_limit.contains("\"limit\": int"));
    }

    #[test]
    fn test_data_source_block_is_valid_json() {
        let mock: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
        let c = SelfQueryConstructor::new(
            mock,
            "llama3",
            MetadataSchema::from_config(&RetrievalSettings::default().metadata_schema).unwrap(),
            "Plot of a \"classic\" film\nwith cast notes",
        );
        let prompt = c.render_prompt("q").unwrap();

        let start = prompt.find("```json").unwrap() + "```json".len();
        let end = start + prompt[start..].find("```").unwrap();
        let source: serde_json::Value = serde_json::from_str(&prompt[start..end]).unwrap();
        assert_eq!(
            source["content"],
            "Plot of a \"classic\" film\nwith cast notes"
        );
        assert!(source["attributes"].is_object());
    }

    #[tokio::test]
    async fn test_construct_validates_and_normalizes() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_structured(
            r#"{"query": "dinosaurs", "filter": "and(eq(\"year\", \"1993\"), eq(\"genres\", \"science fiction\"))", "limit": 4}"#,
        );
        let c = constructor(mock.clone());

        let structured = c.construct("dinosaur sci-fi from 1993").await.unwrap();
        assert_eq!(structured.query, "dinosaurs");
        assert_eq!(structured.limit, None);
        assert_eq!(
            structured.filter,
            Some(Filter::operation(
                Operator::And,
                vec![
                    Filter::comparison(Comparator::Eq, "year", FilterValue::Integer(1993)),
                    Filter::comparison(
                        Comparator::Eq,
                        "genres",
                        FilterValue::String("Science fiction".into())
                    ),
                ]
            ))
        );

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_structured());
    }

    #[tokio::test]
    async fn test_limit_kept_when_enabled() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_structured(r#"{"query": "comedies", "filter": "NO_FILTER", "limit": 2}"#);
        let c = constructor(mock).with_limit(true);
        assert_eq!(c.construct("two comedies").await.unwrap().limit, Some(2));
    }

    #[tokio::test]
    async fn test_error_classes() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_structured("definitely not json");
        mock.push_structured(r#"{"query": "q", "filter": "eq(\"director\", \"Spielberg\")"}"#);
        let c = constructor(mock);

        assert!(matches!(
            c.construct("q").await,
            Err(AppError::FilterParse(_))
        ));
        assert!(matches!(
            c.construct("q").await,
            Err(AppError::FilterGrammar(_))
        ));
    }
}
