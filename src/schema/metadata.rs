//! Structural metadata produced by one extraction pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::directive::{DirectiveKind, ReturnShape};

/// A single field argument, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentMetadata {
    pub name: String,
    pub type_name: String,
    pub required: bool,
    pub list: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub name: String,
    /// Innermost named type, with list and non-null wrappers stripped.
    pub type_name: String,
    pub required: bool,
    pub list: bool,
    pub arguments: Vec<ArgumentMetadata>,
    pub directive: DirectiveKind,
    /// True for every root-query field, marker or not.
    pub task: bool,
    /// Author-declared via `@returns`, or filled by the normalization pass.
    pub return_shape: Option<ReturnShape>,
}

impl FieldMetadata {
    /// The query template, present exactly when a data-access directive
    /// was attached.
    pub fn template(&self) -> Option<&str> {
        self.directive.template()
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentMetadata> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMetadata {
    pub name: String,
    pub fields: Vec<FieldMetadata>,
    pub resolver: bool,
    pub primitive: bool,
    pub task_response: bool,
}

impl TypeMetadata {
    /// Primitive, resolver-backed and task-response types get no default
    /// create/read/update/delete operations.
    pub fn excluded_from_crud(&self) -> bool {
        self.primitive || self.resolver || self.task_response
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Immutable result of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub types: Vec<TypeMetadata>,
    pub queries: Vec<FieldMetadata>,
    pub mutations: Vec<FieldMetadata>,
    pub enums: Vec<String>,
    /// Distinct logical names referenced through `$join_table(...)`.
    pub join_tables: BTreeSet<String>,
}

impl SchemaMetadata {
    pub fn find_type(&self, name: &str) -> Option<&TypeMetadata> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn query(&self, name: &str) -> Option<&FieldMetadata> {
        self.queries.iter().find(|f| f.name == name)
    }

    pub fn mutation(&self, name: &str) -> Option<&FieldMetadata> {
        self.mutations.iter().find(|f| f.name == name)
    }

    /// Types eligible for default create/read/update/delete generation.
    pub fn crud_types(&self) -> impl Iterator<Item = &TypeMetadata> {
        self.types.iter().filter(|t| !t.excluded_from_crud())
    }
}
