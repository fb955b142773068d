//! Built-in prompt templates.

use crate::types::PromptTemplate;

/// Answer-synthesis template. Exactly two slots: `context` and `question`.
pub const ANSWER_TEMPLATE: &str = "Answer the question based only on the following context:
{{context}}

Question: {{question}}
";

const QUERY_CONSTRUCTOR_TEMPLATE: &str = r#"Your goal is to structure the user's query to match the request schema provided below.

<< Structured Request Schema >>
When responding use a JSON object formatted in the following schema:

{
    "query": string \ text string to compare to document contents
    "filter": string \ logical condition statement for filtering documents{{limit_schema}}
}

The query string should contain only text that is expected to match the contents of documents. Any conditions in the filter should not be mentioned in the query as well.

A logical condition statement is composed of one or more comparison and logical operation statements.

A comparison statement takes the form: `comp(attr, val)`:
- `comp` ({{comparators}}): comparator
- `attr` (string): name of attribute to apply the comparison to
- `val` (string, number, boolean or list): the comparison value

A logical operation statement takes the form `op(statement1, statement2, ...)`:
- `op` ({{operators}}): logical operator
- `statement1`, `statement2`, ... (comparison statements or logical operation statements): one or more statements to apply the operation to

Make sure that you only use the comparators and logical operators listed above and no others.
Make sure that filters only refer to attributes that exist in the data source.
Make sure that filters only use the attribute names with its function names if there are functions applied on them.
Make sure that filters take into account the descriptions of attributes and only make comparisons that are feasible given the type of data being stored.
Make sure that filters are only used as needed. If there are no filters that should be applied return "NO_FILTER" for the filter value.{{limit_instructions}}

<< Data Source >>
```json
{
    "content": {{content}},
    "attributes": {{attributes}}
}
```

<< User Query >>
{{query}}

<< Structured Request >>
"#;

/// The answer template as a [`PromptTemplate`].
pub fn answer_template() -> PromptTemplate {
    PromptTemplate::new("rag.answer", ANSWER_TEMPLATE, &["context", "question"])
}

/// The query-constructor template as a [`PromptTemplate`].
///
/// Slots: `content` (document content description as a JSON string), `attributes` (JSON
/// object of attribute descriptors), `comparators` and `operators`
/// (pipe-separated names), `query`, and the two limit fragments, which are
/// empty strings when limits are disabled.
pub fn query_constructor_template() -> PromptTemplate {
    PromptTemplate::new(
        "self_query.constructor",
        QUERY_CONSTRUCTOR_TEMPLATE,
        &[
            "content",
            "attributes",
            "comparators",
            "operators",
            "query",
            "limit_schema",
            "limit_instructions",
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_template_has_two_slots() {
        let template = answer_template();
        assert_eq!(template.input_variables, vec!["context", "question"]);
        assert!(template.template.contains("{{context}}"));
        assert!(template.template.contains("{{question}}"));
    }

    #[test]
    fn test_constructor_template_mentions_every_slot() {
        let template = query_constructor_template();
        for var in &template.input_variables {
            assert!(
                template.template.contains(&format!("{{{{{}}}}}", var)),
                "missing slot {}",
                var
            );
        }
    }
}
