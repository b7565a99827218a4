//! Operation set generation for a whole schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use tracing::{debug, info};

use super::join_table::JoinTableMap;
use super::template::{Args, CompiledQuery, PreparedTemplate, QueryCompiler};
use crate::config::Config;
use crate::schema::{extract_sdl, FieldMetadata, ReturnShape, SchemaMetadata};
use crate::{Error, Result};

/// Where a directive-bearing field is declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "type")]
pub enum FieldOwner {
    Query,
    Mutation,
    /// A field on an ordinary object type, resolved per parent record.
    Type(String),
}

impl std::fmt::Display for FieldOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldOwner::Query => write!(f, "Query"),
            FieldOwner::Mutation => write!(f, "Mutation"),
            FieldOwner::Type(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub owner: FieldOwner,
    pub field: String,
    pub template: PreparedTemplate,
    /// Root-query fields are always tracked as tasks.
    pub task: bool,
    pub response_type: String,
    pub list: bool,
    pub return_shape: Option<ReturnShape>,
}

impl Operation {
    pub fn render(&self, args: &Args) -> Result<CompiledQuery> {
        self.template.render(args)
    }
}

/// Every directive-bearing field of one schema, prepared together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSet {
    pub operations: Vec<Operation>,
    pub join_tables: BTreeSet<String>,
}

impl OperationSet {
    /// Prepare every template in `metadata`.
    ///
    /// # Errors
    ///
    /// The first compile-time error aborts the whole set, so a generated set
    /// is never missing a field that failed.
    pub fn build(metadata: &SchemaMetadata, compiler: &QueryCompiler) -> Result<Self> {
        let mut operations = Vec::new();

        let owned_fields = metadata
            .queries
            .iter()
            .map(|f| (FieldOwner::Query, f))
            .chain(metadata.mutations.iter().map(|f| (FieldOwner::Mutation, f)))
            .chain(metadata.types.iter().flat_map(|t| {
                t.fields
                    .iter()
                    .map(move |f| (FieldOwner::Type(t.name.clone()), f))
            }));

        for (owner, field) in owned_fields {
            if let Some(op) = prepare_field(compiler, owner, field)? {
                operations.push(op);
            }
        }

        info!(
            operations = operations.len(),
            join_tables = metadata.join_tables.len(),
            "operation set built"
        );
        Ok(Self {
            operations,
            join_tables: metadata.join_tables.clone(),
        })
    }

    pub fn get(&self, owner: &FieldOwner, field: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| &op.owner == owner && op.field == field)
    }

    pub fn query(&self, field: &str) -> Option<&Operation> {
        self.get(&FieldOwner::Query, field)
    }

    pub fn mutation(&self, field: &str) -> Option<&Operation> {
        self.get(&FieldOwner::Mutation, field)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter().filter(|op| op.task)
    }
}

fn prepare_field(
    compiler: &QueryCompiler,
    owner: FieldOwner,
    field: &FieldMetadata,
) -> Result<Option<Operation>> {
    let Some(template) = field.template() else {
        return Ok(None);
    };
    let prepared = compiler.prepare(template).map_err(|e| match e {
        Error::Compile(msg) => Error::Compile(format!("{}.{}: {}", owner, field.name, msg)),
        other => other,
    })?;
    debug!(owner = %owner, field = %field.name, kind = %prepared.kind, "field prepared");

    Ok(Some(Operation {
        task: matches!(owner, FieldOwner::Query),
        owner,
        field: field.name.clone(),
        template: prepared,
        response_type: field.type_name.clone(),
        list: field.list,
        return_shape: field.return_shape,
    }))
}

/// A schema compiled end to end: metadata, join-table table, compiler and
/// operation set.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    pub metadata: SchemaMetadata,
    pub compiler: QueryCompiler,
    pub operations: OperationSet,
}

impl CompiledSchema {
    pub fn from_sdl(text: &str, config: &Config) -> Result<Self> {
        Self::from_metadata(extract_sdl(text)?, config)
    }

    pub fn from_metadata(metadata: SchemaMetadata, config: &Config) -> Result<Self> {
        let join_tables = JoinTableMap::build(&metadata.join_tables, &config.join_tables)?;
        let compiler = QueryCompiler::new(join_tables);
        let operations = OperationSet::build(&metadata, &compiler)?;
        Ok(Self {
            metadata,
            compiler,
            operations,
        })
    }
}
