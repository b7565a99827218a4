//! Directive extraction.
//!
//! Walks a parsed schema and produces `SchemaMetadata`: types, root fields,
//! enums, attached directives and the derived set of join-table names.

mod directive;
mod extract;
mod metadata;
pub mod normalize;

pub use directive::{DirectiveKind, ReturnShape};
pub use extract::{extract, extract_sdl, DEFAULT_MUTATION_TYPE, DEFAULT_QUERY_TYPE};
pub use metadata::{ArgumentMetadata, FieldMetadata, SchemaMetadata, TypeMetadata};
