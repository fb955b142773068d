//! Self-querying: metadata filters constructed by the generation model.
//!
//! The flow is schema → prompt → model output → [`StructuredQuery`] →
//! validated [`Filter`] → store pre-filter.

pub mod constructor;
pub mod filter;
pub mod parser;
pub mod schema;
pub mod translator;

pub use constructor::SelfQueryConstructor;
pub use filter::{Comparator, Filter, FilterValue, Operator};
pub use parser::{parse_filter, parse_structured_output, StructuredQuery, NO_FILTER};
pub use schema::{AttributeInfo, AttributeType, MetadataSchema};
pub use translator::to_mongo_filter;
