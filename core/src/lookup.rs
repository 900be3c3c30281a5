//! Description store: syscall name → description template.

use crate::{Result, VoiceTraceError};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Read-only source of description templates, queried by exact syscall name.
#[cfg_attr(test, mockall::automock)]
pub trait DescriptionLookup {
    /// Template for `name`, or `None` if the syscall is not described.
    fn lookup(&self, name: &str) -> Option<String>;
}

impl DescriptionLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).filter(|d| !d.is_empty()).cloned()
    }
}

impl<T: DescriptionLookup + ?Sized> DescriptionLookup for Box<T> {
    fn lookup(&self, name: &str) -> Option<String> {
        (**self).lookup(name)
    }
}

/// Description table stored in SQLite (`tab(name, description)`).
pub struct SqliteDescriptions {
    conn: Connection,
}

const DESCRIPTION_QUERY: &str = "SELECT description FROM tab WHERE name = ?1";

impl SqliteDescriptions {
    /// Open an existing description database read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            VoiceTraceError::StoreError(format!("cannot open {}: {}", path.display(), e))
        })?;
        // Fail at open time rather than on the first lookup.
        conn.prepare_cached(DESCRIPTION_QUERY)?;

        info!(target: "lookup", path = %path.display(), "Description store opened");
        Ok(Self { conn })
    }

    fn query(&self, name: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare_cached(DESCRIPTION_QUERY)?;
        let description = stmt
            .query_row([name], |row| row.get::<_, Option<String>>(0))
            .optional()?
            .flatten();
        Ok(description)
    }
}

impl DescriptionLookup for SqliteDescriptions {
    fn lookup(&self, name: &str) -> Option<String> {
        match self.query(name) {
            Ok(description) => description.filter(|d| !d.is_empty()),
            Err(e) => {
                warn!(target: "lookup", syscall = name, error = %e, "Description query failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_db(path: &Path, rows: &[(&str, &str)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute("CREATE TABLE tab (name TEXT, description TEXT)", [])
            .unwrap();
        for (name, description) in rows {
            conn.execute(
                "INSERT INTO tab (name, description) VALUES (?1, ?2)",
                [name, description],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_sqlite_lookup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("desctab.db");
        create_db(&path, &[("openat", "open {1}, {succeeded}"), ("blank", "")]);

        let store = SqliteDescriptions::open(&path).unwrap();
        assert_eq!(store.lookup("openat").as_deref(), Some("open {1}, {succeeded}"));
        assert_eq!(store.lookup("read"), None);
        assert_eq!(store.lookup("blank"), None);
        assert_eq!(store.lookup("x' OR '1'='1"), None);
    }

    #[test]
    fn test_open_missing_database_fails() {
        let dir = tempdir().unwrap();
        let result = SqliteDescriptions::open(dir.path().join("absent.db"));
        assert!(matches!(result, Err(VoiceTraceError::StoreError(_))));
    }

    #[test]
    fn test_open_database_without_table_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .unwrap()
            .execute("CREATE TABLE other (x TEXT)", [])
            .unwrap();
        assert!(SqliteDescriptions::open(&path).is_err());
    }

    #[test]
    fn test_hashmap_lookup() {
        let mut map = HashMap::new();
        map.insert("write".to_string(), "write {2} bytes".to_string());
        map.insert("empty".to_string(), String::new());
        assert_eq!(map.lookup("write").as_deref(), Some("write {2} bytes"));
        assert_eq!(map.lookup("empty"), None);
        assert_eq!(map.lookup("read"), None);
    }
}
