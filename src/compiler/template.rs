//! Placeholder substitution.
//!
//! Templates reference arguments as `$args.<name>` or `$source.<name>`.
//! Substitution is one left-to-right scan over the template: inserted text
//! is never scanned again, so an argument value can never introduce a
//! placeholder, a macro or an unbalanced quote.
//!
//! Placement rules:
//! - outside a string literal a placeholder becomes the full literal
//!   (`'O''Brien'`, `42`, `true`, `NULL`);
//! - a literal that is exactly one placeholder (`'$args.name'`) is replaced
//!   as a whole by the full literal;
//! - a placeholder inside a larger literal (`'%$args.q%'`) is spliced as
//!   escaped text.
//!
//! `--` line comments, `/* */` block comments and `"..."` quoted identifiers
//! are copied untouched, placeholders included. Placeholders for keys that
//! are not supplied are left verbatim.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::classify::{classify, QueryKind};
use super::encode::{encode_embedded, encode_literal, ArgValue};
use super::join_table::JoinTableMap;
use crate::{Error, Result};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:args|source)\.[A-Za-z_][A-Za-z0-9_]*").unwrap()
});

/// Argument values keyed by argument name.
pub type Args = BTreeMap<String, ArgValue>;

/// A query ready to hand to the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub query: String,
    pub kind: QueryKind,
}

/// A template with join-table macros resolved and its kind known, awaiting
/// argument values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTemplate {
    pub text: String,
    pub kind: QueryKind,
}

impl PreparedTemplate {
    /// Substitute `args` into the template.
    ///
    /// Every supplied argument is encoded up front, so a non-finite number
    /// or an unsupported value fails the call even when the template never
    /// references it.
    pub fn render(&self, args: &Args) -> Result<CompiledQuery> {
        let mut literals = HashMap::with_capacity(args.len());
        for (key, value) in args {
            literals.insert(key.as_str(), encode_literal(key, value)?);
        }

        let mut query = String::with_capacity(self.text.len());
        for segment in split_segments(&self.text)? {
            match segment {
                Segment::Verbatim(text) => query.push_str(text),
                Segment::Bare(text) => {
                    query.push_str(&replace_placeholders(text, |key| {
                        literals.get(key).cloned().map(Ok)
                    })?);
                }
                Segment::Literal(body) => match whole_placeholder(body) {
                    Some(key) if literals.contains_key(key) => query.push_str(&literals[key]),
                    _ => {
                        query.push('\'');
                        query.push_str(&replace_placeholders(body, |key| {
                            args.get(key).map(|value| encode_embedded(key, value))
                        })?);
                        query.push('\'');
                    }
                },
            }
        }

        trace!(kind = %self.kind, args = args.len(), "template rendered");
        Ok(CompiledQuery {
            query,
            kind: self.kind,
        })
    }
}

/// Compiles templates against the read-only join-table table of one schema.
///
/// Cheap to clone and safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    join_tables: Arc<JoinTableMap>,
}

impl QueryCompiler {
    pub fn new(join_tables: JoinTableMap) -> Self {
        Self {
            join_tables: Arc::new(join_tables),
        }
    }

    pub fn join_tables(&self) -> &JoinTableMap {
        &self.join_tables
    }

    /// Resolve join-table macros, classify and check literal balance.
    pub fn prepare(&self, template: &str) -> Result<PreparedTemplate> {
        let kind = classify(template)?;
        let text = self.join_tables.resolve(template)?;
        split_segments(&text)?;
        Ok(PreparedTemplate { text, kind })
    }

    /// Compile `template` with live argument values.
    pub fn compile(&self, template: &str, args: &Args) -> Result<CompiledQuery> {
        self.prepare(template)?.render(args)
    }
}

enum Segment<'t> {
    Bare(&'t str),
    /// Comment or quoted identifier, copied as is.
    Verbatim(&'t str),
    /// Body of a single-quoted literal, quotes excluded, `''` kept as is.
    Literal(&'t str),
}

fn split_segments(text: &str) -> Result<Vec<Segment<'_>>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut bare_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let (end, segment) = match (bytes[i], bytes.get(i + 1)) {
            (b'\'', _) => {
                let close = i + 1
                    + quoted_end(&text[i + 1..], b'\'')
                        .ok_or_else(|| unterminated("string literal"))?;
                (close + 1, Segment::Literal(&text[i + 1..close]))
            }
            (b'"', _) => {
                let close = i + 1
                    + quoted_end(&text[i + 1..], b'"')
                        .ok_or_else(|| unterminated("quoted identifier"))?;
                (close + 1, Segment::Verbatim(&text[i..=close]))
            }
            (b'-', Some(b'-')) => {
                let end = text[i..].find('\n').map_or(text.len(), |n| i + n);
                (end, Segment::Verbatim(&text[i..end]))
            }
            (b'/', Some(b'*')) => {
                let end = text[i + 2..]
                    .find("*/")
                    .map(|n| i + 2 + n + 2)
                    .ok_or_else(|| unterminated("block comment"))?;
                (end, Segment::Verbatim(&text[i..end]))
            }
            _ => {
                i += 1;
                continue;
            }
        };
        if i > bare_start {
            segments.push(Segment::Bare(&text[bare_start..i]));
        }
        segments.push(segment);
        i = end;
        bare_start = end;
    }
    if bare_start < text.len() {
        segments.push(Segment::Bare(&text[bare_start..]));
    }
    Ok(segments)
}

fn unterminated(what: &str) -> Error {
    Error::Compile(format!("unterminated {} in query template", what))
}

/// Byte offset of the closing `quote`, skipping doubled quotes.
fn quoted_end(s: &str, quote: u8) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn placeholder_key(placeholder: &str) -> &str {
    placeholder.split_once('.').map_or("", |(_, key)| key)
}

fn whole_placeholder(body: &str) -> Option<&str> {
    PLACEHOLDER_RE
        .find(body)
        .filter(|m| m.start() == 0 && m.end() == body.len())
        .map(|m| placeholder_key(m.as_str()))
}

fn replace_placeholders<F>(text: &str, mut encode: F) -> Result<String>
where
    F: FnMut(&str) -> Option<Result<String>>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in PLACEHOLDER_RE.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        match encode(placeholder_key(m.as_str())) {
            Some(encoded) => out.push_str(&encoded?),
            None => out.push_str(m.as_str()),
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}
