//! `$join_table(<name>)` discovery and resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::JoinTableConfig;
use crate::{Error, Result};

static JOIN_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$join_table\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)").unwrap()
});

/// Physical identifiers: dotted SQL identifiers, nothing that needs quoting.
static PHYSICAL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap()
});

/// Add every join-table name referenced by `template` to `acc`.
pub fn collect_join_tables(template: &str, acc: &mut BTreeSet<String>) {
    for caps in JOIN_TABLE_RE.captures_iter(template) {
        acc.insert(caps[1].to_string());
    }
}

/// Read-only logical name -> physical identifier table, built once per
/// schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinTableMap {
    tables: BTreeMap<String, String>,
}

impl JoinTableMap {
    /// Build the table for the discovered names using the configured
    /// naming rule.
    pub fn build<'n>(
        names: impl IntoIterator<Item = &'n String>,
        config: &JoinTableConfig,
    ) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for name in names {
            let physical = config.physical_name(name);
            if !PHYSICAL_NAME_RE.is_match(&physical) {
                return Err(Error::Config(format!(
                    "join table '{}' maps to invalid identifier '{}'",
                    name, physical
                )));
            }
            tables.insert(name.clone(), physical);
        }
        Ok(Self { tables })
    }

    pub fn get(&self, logical: &str) -> Option<&str> {
        self.tables.get(logical).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every macro with its physical identifier.
    ///
    /// # Errors
    ///
    /// Returns `Error::Compile` naming the first unresolved logical table.
    pub fn resolve(&self, template: &str) -> Result<String> {
        if let Some(missing) = JOIN_TABLE_RE
            .captures_iter(template)
            .map(|caps| caps.get(1).map_or("", |m| m.as_str()))
            .find(|name| !self.tables.contains_key(*name))
        {
            return Err(Error::Compile(format!(
                "unresolved join table '{}'",
                missing
            )));
        }
        Ok(JOIN_TABLE_RE
            .replace_all(template, |caps: &Captures<'_>| {
                self.tables[&caps[1]].clone()
            })
            .into_owned())
    }
}
