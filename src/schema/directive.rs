//! Directive lookup for schema types and fields.
//!
//! Directives are matched by name, never by position. Each type or field
//! resolves to exactly one tagged variant so callers use exhaustive `match`
//! instead of probing for individual directives.

use graphql_parser::schema::{Directive, Value};
use serde::{Deserialize, Serialize};

/// Data-access directive: `@sql(query: "...")`.
pub const SQL_DIRECTIVE: &str = "sql";
/// Argument of the data-access directive holding the template.
pub const SQL_QUERY_ARG: &str = "query";
/// Type-level marker for task status response types.
pub const TASK_RESPONSE_DIRECTIVE: &str = "task_response";
/// Type-level marker for types backed by a custom resolver.
pub const RESOLVER_DIRECTIVE: &str = "resolver";
/// Field-level task marker. Informational only.
pub const TASK_DIRECTIVE: &str = "task";
/// Explicit mutation return shape: `@returns(shape: ROWS | ROW | ACK)`.
pub const RETURNS_DIRECTIVE: &str = "returns";
pub const RETURNS_SHAPE_ARG: &str = "shape";

/// The behavior-selecting directive attached to a field or type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DirectiveKind {
    #[default]
    NoDirective,
    /// Carries the raw query template. A malformed argument degrades to an
    /// empty template; the compiler reports it when the field is prepared.
    DataAccess { template: String },
    TaskResponse,
    Resolver,
}

impl DirectiveKind {
    pub fn template(&self) -> Option<&str> {
        match self {
            DirectiveKind::DataAccess { template } => Some(template),
            DirectiveKind::NoDirective | DirectiveKind::TaskResponse | DirectiveKind::Resolver => {
                None
            }
        }
    }
}

/// Declared result shape of a root mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnShape {
    /// An ordered list of records.
    Rows,
    /// A single record.
    Row,
    /// No row payload, only an acknowledgement.
    Ack,
}

impl ReturnShape {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ROWS" => Some(Self::Rows),
            "ROW" => Some(Self::Row),
            "ACK" => Some(Self::Ack),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnShape::Rows => write!(f, "rows"),
            ReturnShape::Row => write!(f, "row"),
            ReturnShape::Ack => write!(f, "ack"),
        }
    }
}

fn find<'d, 'a>(
    directives: &'d [Directive<'a, String>],
    name: &str,
) -> Option<&'d Directive<'a, String>> {
    directives.iter().find(|d| d.name == name)
}

fn argument<'d, 'a>(
    directive: &'d Directive<'a, String>,
    name: &str,
) -> Option<&'d Value<'a, String>> {
    directive
        .arguments
        .iter()
        .find(|(arg, _)| arg == name)
        .map(|(_, value)| value)
}

/// Resolve the field-level directive. Only the data-access directive is
/// meaningful on fields.
pub fn field_directive(directives: &[Directive<'_, String>]) -> DirectiveKind {
    match find(directives, SQL_DIRECTIVE) {
        Some(sql) => {
            let template = match argument(sql, SQL_QUERY_ARG) {
                Some(Value::String(s)) => s.clone(),
                _ => String::new(),
            };
            DirectiveKind::DataAccess { template }
        }
        None => DirectiveKind::NoDirective,
    }
}

/// Resolve the type-level directive. A task-response marker wins over a
/// resolver marker, so a type never carries both.
pub fn type_directive(directives: &[Directive<'_, String>]) -> DirectiveKind {
    if find(directives, TASK_RESPONSE_DIRECTIVE).is_some() {
        DirectiveKind::TaskResponse
    } else if find(directives, RESOLVER_DIRECTIVE).is_some() {
        DirectiveKind::Resolver
    } else {
        DirectiveKind::NoDirective
    }
}

pub fn has_task_marker(directives: &[Directive<'_, String>]) -> bool {
    find(directives, TASK_DIRECTIVE).is_some()
}

/// Read `@returns(shape: ...)`. Accepts an enum value or a string.
pub fn declared_return_shape(directives: &[Directive<'_, String>]) -> Option<ReturnShape> {
    let returns = find(directives, RETURNS_DIRECTIVE)?;
    match argument(returns, RETURNS_SHAPE_ARG)? {
        Value::Enum(s) | Value::String(s) => ReturnShape::parse(s),
        _ => None,
    }
}
