//! SQLite metadata backend

use crate::metadata::MetadataBackend;
use crate::models::WalletMetadata;
use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

/// Metadata documents in a `wallet_metadata` table
///
/// Each wallet is one JSON row replaced inside a transaction.
pub struct SqliteMetadataBackend {
    conn: Mutex<Connection>,
}

impl SqliteMetadataBackend {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// In-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::create_table(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create wallet_metadata table
    pub fn create_table(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_metadata (
                wallet_id TEXT PRIMARY KEY NOT NULL,
                metadata TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(())
    }
}

impl MetadataBackend for SqliteMetadataBackend {
    fn load(&self, wallet_id: &str) -> Result<Option<WalletMetadata>> {
        let conn = self.conn.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT metadata FROM wallet_metadata WHERE wallet_id = ?1",
                params![wallet_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    fn save(&self, metadata: &WalletMetadata) -> Result<()> {
        let json = serde_json::to_string(metadata)?;
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::WriteFailed(e.to_string()))?;
        tx.execute(
            r#"
            INSERT INTO wallet_metadata (wallet_id, metadata, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(wallet_id) DO UPDATE SET
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
            params![metadata.id, json, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::WriteFailed(e.to_string()))?;
        tx.commit().map_err(|e| Error::WriteFailed(e.to_string()))
    }

    fn delete(&self, wallet_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM wallet_metadata WHERE wallet_id = ?1",
            params![wallet_id],
        )
        .map_err(|e| Error::WriteFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AddressMetadata;

    fn sample(id: &str) -> WalletMetadata {
        let mut metadata = WalletMetadata::new(id);
        metadata.addresses.push(AddressMetadata {
            index: 0,
            label: Some("Main".to_string()),
            color: "#3ED282".to_string(),
            is_default: true,
        });
        metadata
    }

    #[test]
    fn test_save_load_replace() {
        let backend = SqliteMetadataBackend::open_in_memory().unwrap();
        assert!(backend.load("w1").unwrap().is_none());

        backend.save(&sample("w1")).unwrap();
        assert_eq!(backend.load("w1").unwrap(), Some(sample("w1")));

        let mut updated = sample("w1");
        updated.addresses[0].label = None;
        backend.save(&updated).unwrap();
        assert_eq!(backend.load("w1").unwrap(), Some(updated));
    }

    #[test]
    fn test_delete() {
        let backend = SqliteMetadataBackend::open_in_memory().unwrap();
        backend.save(&sample("w1")).unwrap();
        backend.save(&sample("w2")).unwrap();
        backend.delete("w1").unwrap();
        assert!(backend.load("w1").unwrap().is_none());
        assert!(backend.load("w2").unwrap().is_some());
    }
}
