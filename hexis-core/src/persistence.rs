//! Saved effect records and the `SQLite` effect store.
//!
//! An owner's durable effects are saved as one [`OwnerRecord`]: an ordered
//! list of `(tag, payload)` entries. Records are serialised to JSON and
//! stored per owner:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS owner_effects (
//!     owner_id   INTEGER PRIMARY KEY,
//!     kind       TEXT NOT NULL,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! - WAL mode for concurrent reads during gameplay
//! - JSON inside a BLOB column keeps the schema stable when effect types
//!   are added, changed or retired
//! - Optional CRC-32 checksum detects save corruption
//! - Backup support via `SQLite`'s online-backup API

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{HexisError, Result};
use crate::types::{EffectId, OwnerId, OwnerKind};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One saved effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEffect {
    /// Registered type tag; selects the loader.
    pub tag: String,
    /// Instance ID, kept so partner effects can find each other again.
    pub id: EffectId,
    /// Effect-defined state.
    pub payload: serde_json::Value,
    /// Applicability prog ID, if one was attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prog: Option<u64>,
    /// Time left on the pending schedule entry, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<u64>,
}

/// Everything saved for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRecord {
    /// Owner ID.
    pub owner: OwnerId,
    /// Owner kind.
    pub kind: OwnerKind,
    /// Display name.
    pub name: String,
    /// Durable effects, in attachment order.
    pub effects: Vec<PersistedEffect>,
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 of `data` as a lowercase hex string.
fn crc32_hex(data: &[u8]) -> String {
    let crc = crc32_compute(data);
    format!("{crc:08x}")
}

/// Basic CRC-32 (ISO 3309 / ITU-T V.42) computation.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// Owner IDs are stored in an `INTEGER` column; the cast is a bijection.
#[allow(clippy::cast_possible_wrap)]
fn sql_id(id: OwnerId) -> i64 {
    id.0 as i64
}

#[allow(clippy::cast_sign_loss)]
fn owner_from_sql(raw: i64) -> OwnerId {
    OwnerId(raw as u64)
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS owner_effects (
    owner_id   INTEGER PRIMARY KEY,
    kind       TEXT NOT NULL,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

// ---------------------------------------------------------------------------
// EffectStore
// ---------------------------------------------------------------------------

/// Handle to an open `SQLite` database that stores [`OwnerRecord`]s.
///
/// # Usage
///
/// ```no_run
/// # use hexis_core::persistence::{EffectStore, OwnerRecord};
/// # use hexis_core::config::PersistenceConfig;
/// # use hexis_core::types::{OwnerId, OwnerKind};
/// let store = EffectStore::open("world_effects.db", &PersistenceConfig::default())?;
/// let record = OwnerRecord {
///     owner: OwnerId(1),
///     kind: OwnerKind::Character,
///     name: "Ada".into(),
///     effects: vec![],
/// };
/// store.save_owner(&record)?;
/// let loaded = store.load_owner(OwnerId(1))?;
/// # Ok::<(), hexis_core::error::HexisError>(())
/// ```
pub struct EffectStore {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for EffectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EffectStore {
    /// Open (or create) a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] on `SQLite` failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Effect store opened");

        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] on `SQLite` failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Core CRUD
    // ------------------------------------------------------------------

    /// Save (upsert) one owner's record.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Serialization`] if JSON encoding fails, or
    /// [`HexisError::Database`] on `SQLite` failures.
    pub fn save_owner(&self, record: &OwnerRecord) -> Result<()> {
        let start = Instant::now();
        let json =
            serde_json::to_vec(record).map_err(|e| HexisError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO owner_effects (owner_id, kind, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(owner_id) DO UPDATE SET
                kind = excluded.kind,
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![sql_id(record.owner), record.kind.as_str(), json, now, checksum],
        )?;

        debug!(
            owner = %record.owner,
            effects = record.effects.len(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved owner effects"
        );
        Ok(())
    }

    /// Save several records in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any record fails; nothing is committed then.
    pub fn save_owners(&mut self, records: &[OwnerRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO owner_effects (owner_id, kind, data, updated_at, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(owner_id) DO UPDATE SET
                    kind = excluded.kind,
                    data = excluded.data,
                    updated_at = excluded.updated_at,
                    checksum = excluded.checksum",
            )?;
            let now = Utc::now().to_rfc3339();
            for record in records {
                let json = serde_json::to_vec(record)
                    .map_err(|e| HexisError::Serialization(e.to_string()))?;
                let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
                stmt.execute(params![
                    sql_id(record.owner),
                    record.kind.as_str(),
                    json,
                    now,
                    checksum
                ])?;
            }
        }
        tx.commit()?;
        debug!(owners = records.len(), "Saved owner batch");
        Ok(())
    }

    /// Load one owner's record.
    ///
    /// Returns `None` if no row exists. A checksum mismatch is logged but
    /// the data is still returned.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Serialization`] if JSON decoding fails, or
    /// [`HexisError::Database`] on `SQLite` failures.
    pub fn load_owner(&self, owner: OwnerId) -> Result<Option<OwnerRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data, checksum FROM owner_effects WHERE owner_id = ?1")?;

        let result: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![sql_id(owner)], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = result else {
            return Ok(None);
        };
        self.verify_checksum(owner, &data, stored_checksum.as_deref());

        let record: OwnerRecord =
            serde_json::from_slice(&data).map_err(|e| HexisError::Serialization(e.to_string()))?;
        Ok(Some(record))
    }

    /// Load every stored record, ordered by owner ID.
    ///
    /// Rows that fail to decode are skipped with a warning so one corrupt
    /// owner never blocks a world restore.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] on `SQLite` failures.
    pub fn load_all(&self) -> Result<Vec<OwnerRecord>> {
        let start = Instant::now();
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT owner_id, data, checksum FROM owner_effects ORDER BY owner_id",
            )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let data: Vec<u8> = row.get(1)?;
            let checksum: Option<String> = row.get(2)?;
            Ok((owner_from_sql(id), data, checksum))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (owner, data, checksum) = row?;
            self.verify_checksum(owner, &data, checksum.as_deref());
            match serde_json::from_slice::<OwnerRecord>(&data) {
                Ok(record) => records.push(record),
                Err(e) => warn!(owner = %owner, error = %e, "Skipping undecodable owner record"),
            }
        }

        info!(
            owners = records.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Loaded owner records"
        );
        Ok(records)
    }

    /// Delete one owner's record. Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] on `SQLite` failures.
    pub fn delete_owner(&self, owner: OwnerId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM owner_effects WHERE owner_id = ?1", params![sql_id(owner)])?;
        Ok(deleted > 0)
    }

    /// IDs of every stored owner, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] on `SQLite` failures.
    pub fn list_owners(&self) -> Result<Vec<OwnerId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT owner_id FROM owner_effects ORDER BY owner_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut owners = Vec::new();
        for row in rows {
            owners.push(owner_from_sql(row?));
        }
        Ok(owners)
    }

    /// IDs of stored owners of one kind, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] on `SQLite` failures.
    pub fn list_owners_of_kind(&self, kind: OwnerKind) -> Result<Vec<OwnerId>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT owner_id FROM owner_effects WHERE kind = ?1 ORDER BY owner_id",
            )?;
        let rows = stmt.query_map(params![kind.as_str()], |row| row.get::<_, i64>(0))?;
        let mut owners = Vec::new();
        for row in rows {
            owners.push(owner_from_sql(row?));
        }
        Ok(owners)
    }

    /// Number of stored owners.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] on `SQLite` failures.
    pub fn owner_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM owner_effects", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn verify_checksum(&self, owner: OwnerId, data: &[u8], stored: Option<&str>) {
        if !self.config.checksum_enabled {
            return;
        }
        if let Some(expected) = stored {
            let actual = crc32_hex(data);
            if expected != actual {
                warn!(
                    owner = %owner,
                    expected = %expected,
                    actual = %actual,
                    "Checksum mismatch, possible save corruption"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Back up the database to `dest_path` using `SQLite`'s online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] on `SQLite` failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Effect store backup completed"
        );
        Ok(())
    }

    /// Create a numbered backup next to the database file, keeping at most
    /// `config.backup_count` of them. A no-op for in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] or [`HexisError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        if self.db_path.as_os_str() == ":memory:" {
            return Ok(());
        }
        let max = self.config.backup_count;
        if max == 0 {
            return Ok(());
        }

        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup(self.backup_path(1))?;

        info!(max_backups = max, "Rotating backup created");
        Ok(())
    }

    /// Path to a numbered backup file (e.g. `world_effects.db.bak.1`).
    fn backup_path(&self, n: usize) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension().map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `PRAGMA integrity_check`. `Ok(false)` means corruption.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self.conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Reclaim unused space.
    ///
    /// # Errors
    ///
    /// Returns [`HexisError::Database`] on `SQLite` failures.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
