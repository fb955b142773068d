//! Prompt rendering for DocQuery.
//!
//! This crate owns the two prompts the pipeline sends to a generation model:
//! - the answer template, with exactly two slots (`context`, `question`)
//! - the query-constructor prompt used for self-querying
//!
//! Templates are Handlebars strings rendered in strict mode, so a missing
//! slot is an error rather than an empty substitution.

pub mod builder;
pub mod templates;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use templates::{answer_template, query_constructor_template, ANSWER_TEMPLATE};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptTemplate};
