//! Persistent environment store
//!
//! Maps an environment key (`<language>-<dependency fingerprint>`) to a record
//! describing the environment built for it. The record outlives a run, so
//! later runs reuse a built environment until its dependency set changes.

use lintel_core::{Error, Result};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Table holding bincode-encoded [`EnvironmentRecord`]s
const ENVIRONMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("environments");

/// What the store knows about one built environment
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct EnvironmentRecord {
    /// Language name as written in the configuration
    pub language: String,
    /// Hex digest of the dependency set
    pub fingerprint: String,
    /// Directory the environment was built in
    pub path: String,
    /// Dependencies, in declared order
    pub dependencies: Vec<String>,
    /// Build time, seconds since the Unix epoch
    pub created: u64,
}

impl EnvironmentRecord {
    /// Create a record stamped with the current time
    pub fn new(
        language: impl Into<String>,
        fingerprint: impl Into<String>,
        path: &Path,
        dependencies: Vec<String>,
    ) -> Self {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            language: language.into(),
            fingerprint: fingerprint.into(),
            path: path.to_string_lossy().into_owned(),
            dependencies,
            created,
        }
    }

    /// Directory of the environment
    #[must_use]
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    /// Serialize to bytes using bincode
    ///
    /// # Errors
    ///
    /// Returns `Error::State` if encoding fails
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| Error::State(format!("Failed to encode environment record: {e}")))
    }

    /// Deserialize from bytes using bincode
    ///
    /// Returns `None` for records written by an incompatible version.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .ok()
            .map(|(record, _len)| record)
    }
}

/// Storage backend for environment records
pub trait PersistentState: Send + Sync {
    /// Get the record stored under `key`
    fn get(&self, key: &str) -> Result<Option<EnvironmentRecord>>;

    /// Store `record` under `key`, replacing any previous one
    fn put(&self, key: &str, record: &EnvironmentRecord) -> Result<()>;

    /// Remove the record under `key`
    fn remove(&self, key: &str) -> Result<()>;

    /// All stored records
    ///
    /// Undecodable records are returned as `None` so callers can drop them.
    fn entries(&self) -> Result<Vec<(String, Option<EnvironmentRecord>)>>;

    /// Remove every record
    fn clear(&self) -> Result<()>;
}

/// Environment store backed by redb
///
/// redb serializes concurrent writers internally, so one instance can be
/// shared by all worker threads of a run.
pub struct RedbPersistentState {
    db: Database,
}

// Static assertions to ensure thread safety
const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}

    let _ = assert_send::<RedbPersistentState>;
    let _ = assert_sync::<RedbPersistentState>;
};

impl RedbPersistentState {
    /// Create or open the store at `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::State` if the database cannot be created, for example
    /// because another lintel process holds it open.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)
            .map_err(|e| Error::State(format!("Failed to create database: {e}")))?;
        Ok(Self { db })
    }
}

impl PersistentState for RedbPersistentState {
    fn get(&self, key: &str) -> Result<Option<EnvironmentRecord>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::State(format!("Failed to begin read transaction: {e}")))?;

        let table = match read_txn.open_table(ENVIRONMENTS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(Error::State(format!("Failed to open table: {e}"))),
        };

        let value = table
            .get(key)
            .map_err(|e| Error::State(format!("Failed to get value: {e}")))?;
        Ok(value.and_then(|v| EnvironmentRecord::from_bytes(v.value())))
    }

    fn put(&self, key: &str, record: &EnvironmentRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        {
            let mut table = write_txn
                .open_table(ENVIRONMENTS)
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(|e| Error::State(format!("Failed to insert value: {e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        {
            let mut table = write_txn
                .open_table(ENVIRONMENTS)
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            table
                .remove(key)
                .map_err(|e| Error::State(format!("Failed to remove value: {e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))
    }

    fn entries(&self) -> Result<Vec<(String, Option<EnvironmentRecord>)>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::State(format!("Failed to begin read transaction: {e}")))?;

        let table = match read_txn.open_table(ENVIRONMENTS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(Error::State(format!("Failed to open table: {e}"))),
        };

        let iter = table
            .iter()
            .map_err(|e| Error::State(format!("Failed to iterate table: {e}")))?;

        let mut out = Vec::new();
        for item in iter {
            let (key, value) =
                item.map_err(|e| Error::State(format!("Failed to read item: {e}")))?;
            out.push((
                key.value().to_string(),
                EnvironmentRecord::from_bytes(value.value()),
            ));
        }
        Ok(out)
    }

    fn clear(&self) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        write_txn
            .delete_table(ENVIRONMENTS)
            .map_err(|e| Error::State(format!("Failed to delete table: {e}")))?;
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))
    }
}

/// In-memory store for tests
///
/// Records are kept bincode-encoded, like on disk.
#[derive(Default)]
pub struct MockPersistentState {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MockPersistentState {
    /// Create an empty mock store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes, bypassing encoding
    pub fn put_raw(&self, key: &str, bytes: Vec<u8>) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes);
    }
}

impl PersistentState for MockPersistentState {
    fn get(&self, key: &str) -> Result<Option<EnvironmentRecord>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).and_then(|b| EnvironmentRecord::from_bytes(b)))
    }

    fn put(&self, key: &str, record: &EnvironmentRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        self.put_raw(key, bytes);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, Option<EnvironmentRecord>)>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = data
            .iter()
            .map(|(k, v)| (k.clone(), EnvironmentRecord::from_bytes(v)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn clear(&self) -> Result<()> {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
