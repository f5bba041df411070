//! Legacy permission compatibility table.
//!
//! Profile rows are never migrated, so tokens written under older naming
//! schemes must keep working. The table maps a requested `"{module}:{action}"`
//! token to the alternate tokens that also satisfy it. It is an explicit,
//! versioned value: new entries are added by shipping a new version, never
//! inferred at runtime.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::modules::Module;
use crate::permissions::Permission;

#[derive(Debug, Error)]
pub enum CompatTableError {
    #[error("failed to read compatibility table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed compatibility table: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityTable {
    pub version: u32,
    pub entries: BTreeMap<String, Vec<Permission>>,
}

impl CompatibilityTable {
    /// Table with no aliases (only the three token schemes apply).
    pub fn empty() -> Self {
        Self {
            version: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Built-in table, version 1.
    ///
    /// Historical profile rows granted `"{module}:read"` while screens check
    /// `"{module}:view"`; the two are interchangeable for every catalog module.
    pub fn v1() -> Self {
        let mut entries = BTreeMap::new();
        for module in Module::CATALOG {
            let m = module.as_str();
            entries.insert(format!("{m}:view"), vec![Permission::action(m, "read")]);
            entries.insert(format!("{m}:read"), vec![Permission::action(m, "view")]);
        }
        Self { version: 1, entries }
    }

    pub fn from_json(raw: &str) -> Result<Self, CompatTableError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CompatTableError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CompatTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Alternate tokens accepted in place of `"{module}:{action}"`.
    pub fn alternates(&self, module: &str, action: &str) -> &[Permission] {
        self.entries
            .get(&format!("{module}:{action}"))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for CompatibilityTable {
    fn default() -> Self {
        Self::v1()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn v1_aliases_view_and_read() {
        let table = CompatibilityTable::v1();
        assert_eq!(table.version, 1);
        assert_eq!(
            table.alternates("orders", "view"),
            &[Permission::from("orders:read")]
        );
        assert_eq!(
            table.alternates("customers", "read"),
            &[Permission::from("customers:view")]
        );
        assert!(table.alternates("orders", "delete").is_empty());
        assert!(table.alternates("reports", "view").is_empty());
    }

    #[test]
    fn parses_json_table() {
        let table = CompatibilityTable::from_json(
            r#"{"version": 7, "entries": {"orders:edit": ["orders:update", "orders:write"]}}"#,
        )
        .unwrap();
        assert_eq!(table.version, 7);
        assert_eq!(table.alternates("orders", "edit").len(), 2);
    }

    #[test]
    fn load_reports_missing_file_and_bad_json() {
        let err = CompatibilityTable::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, CompatTableError::Io { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = CompatibilityTable::load(file.path()).unwrap_err();
        assert!(matches!(err, CompatTableError::Malformed(_)));
    }
}
