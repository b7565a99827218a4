//! Query template compiler.
//!
//! Turns a data-access template plus live argument values into a safe query
//! string and its classification. The only state is the read-only
//! join-table table built once per schema.

mod classify;
mod encode;
mod join_table;
mod operation;
mod template;

pub use classify::{classify, QueryKind};
pub use encode::{encode_embedded, encode_literal, escape_string, ArgValue};
pub use join_table::{collect_join_tables, JoinTableMap};
pub use operation::{CompiledSchema, FieldOwner, Operation, OperationSet};
pub use template::{Args, CompiledQuery, PreparedTemplate, QueryCompiler};
