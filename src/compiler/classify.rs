//! Query classification by leading keyword.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Read,
    Insert,
    Update,
    Delete,
}

impl QueryKind {
    /// Insert, update and delete conventionally yield no row payload.
    pub fn yields_rows(&self) -> bool {
        matches!(self, QueryKind::Read)
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKind::Read => write!(f, "read"),
            QueryKind::Insert => write!(f, "insert"),
            QueryKind::Update => write!(f, "update"),
            QueryKind::Delete => write!(f, "delete"),
        }
    }
}

/// Classify a template by its first keyword, ignoring case and surrounding
/// whitespace.
pub fn classify(template: &str) -> Result<QueryKind> {
    let trimmed = template.trim_start();
    let keyword: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    // The keyword must end at a word boundary: "SELECTION" is not "SELECT".
    let rest = &trimmed[keyword.len()..];
    if rest
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(unrecognized(template));
    }

    match keyword.to_ascii_uppercase().as_str() {
        "SELECT" => Ok(QueryKind::Read),
        "INSERT" => Ok(QueryKind::Insert),
        "UPDATE" => Ok(QueryKind::Update),
        "DELETE" => Ok(QueryKind::Delete),
        _ => Err(unrecognized(template)),
    }
}

fn unrecognized(template: &str) -> Error {
    let head: String = template.trim().chars().take(24).collect();
    if head.is_empty() {
        Error::Compile("empty query template".to_string())
    } else {
        Error::Compile(format!("unrecognized query keyword in template '{}'", head))
    }
}
