//! Crash-safe backend: in-memory tables made durable with a write-ahead log
//! and periodic snapshots.
//!
//! On-disk layout under the data directory:
//!
//! ```text
//! snapshot.json   tables and rows as of the last checkpoint
//! wal.log         mutations since the last checkpoint
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::memory::{check_dimensions, MemoryBackend, TableDump};
use super::wal::{Wal, WalEntry};
use super::{BackendResult, QueryRow, RowSelector, StorageBackend, TableSpec, VectorQuery};
use crate::config::SyncMode;
use crate::document::{DocumentId, StoredDocument};
use crate::error::BackendError;
use crate::filter::QueryCondition;

const SNAPSHOT_FILE: &str = "snapshot.json";
const SNAPSHOT_TMP_FILE: &str = "snapshot.json.tmp";
const WAL_FILE: &str = "wal.log";

/// A [`MemoryBackend`] whose mutations survive restarts.
///
/// Reads go straight to memory. Writes are serialized: each is logged, then
/// applied.
///
/// # Example
///
/// ```no_run
/// use ragstore_core::backend::{DurableBackend, StorageBackend};
/// use ragstore_core::SyncMode;
///
/// let backend = DurableBackend::open("./data", SyncMode::Batched).unwrap();
/// println!("{} tables", backend.list_tables().unwrap().len());
/// backend.checkpoint().unwrap();
/// ```
#[derive(Debug)]
pub struct DurableBackend {
    dir: PathBuf,
    memory: MemoryBackend,
    wal: Mutex<Wal>,
}

impl DurableBackend {
    /// Opens (or creates) a store in `dir`, replaying the snapshot and log.
    pub fn open<P: AsRef<Path>>(dir: P, sync_mode: SyncMode) -> BackendResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let memory = match read_snapshot(&dir.join(SNAPSHOT_FILE))? {
            Some(dumps) => MemoryBackend::restore(dumps),
            None => MemoryBackend::new(),
        };

        let (wal, entries) = Wal::open(dir.join(WAL_FILE), sync_mode)?;
        let replayed = entries.len();
        for entry in entries {
            replay(&memory, entry)?;
        }

        info!(
            dir = %dir.display(),
            tables = memory.list_tables()?.len(),
            replayed,
            "opened durable backend"
        );

        Ok(Self {
            dir,
            memory,
            wal: Mutex::new(wal),
        })
    }

    /// Writes a snapshot of all tables and empties the log.
    pub fn checkpoint(&self) -> BackendResult<()> {
        let mut wal = self.wal.lock();
        let dumps = self.memory.dump();

        let tmp = self.dir.join(SNAPSHOT_TMP_FILE);
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &dumps)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, self.dir.join(SNAPSHOT_FILE))?;
        // the rename must be durable before the log it replaces is emptied
        sync_dir(&self.dir)?;
        wal.truncate()?;

        info!(dir = %self.dir.display(), tables = dumps.len(), "checkpoint written");
        Ok(())
    }

    /// Syncs buffered log records to disk.
    pub fn sync(&self) -> BackendResult<()> {
        self.wal.lock().sync()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn read_snapshot(path: &Path) -> BackendResult<Option<Vec<TableDump>>> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    let dumps = serde_json::from_reader(reader)
        .map_err(|e| BackendError::Corrupted(format!("{}: {e}", path.display())))?;
    Ok(Some(dumps))
}

/// Applies a logged entry, returning the number of rows it touched.
fn apply(memory: &MemoryBackend, entry: WalEntry) -> BackendResult<usize> {
    match entry {
        WalEntry::CreateTable { spec } => memory.create_table(&spec).map(|()| 0),
        WalEntry::DropTable { name } => memory.drop_table(&name).map(usize::from),
        WalEntry::UpsertRows { table, rows } => memory.upsert_rows(&table, rows),
        WalEntry::DeleteRows { table, ids } => memory.delete_rows(&table, &RowSelector::Ids(ids)),
    }
}

/// Applies a logged entry during recovery. Entries already reflected in the
/// snapshot (a crash between snapshot and log truncation) are no-ops.
fn replay(memory: &MemoryBackend, entry: WalEntry) -> BackendResult<()> {
    match apply(memory, entry) {
        Ok(_) => Ok(()),
        Err(BackendError::TableExists(name)) | Err(BackendError::TableNotFound(name)) => {
            debug!(table = %name, "skipped already-applied log entry");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

impl StorageBackend for DurableBackend {
    fn create_table(&self, spec: &TableSpec) -> BackendResult<()> {
        let mut wal = self.wal.lock();
        if self.memory.spec(&spec.name).is_ok() {
            return Err(BackendError::TableExists(spec.name.clone()));
        }
        let entry = WalEntry::CreateTable { spec: spec.clone() };
        wal.append(&entry)?;
        apply(&self.memory, entry).map(drop)
    }

    fn drop_table(&self, name: &str) -> BackendResult<bool> {
        let mut wal = self.wal.lock();
        if self.memory.spec(name).is_err() {
            return Ok(false);
        }
        let entry = WalEntry::DropTable {
            name: name.to_string(),
        };
        wal.append(&entry)?;
        apply(&self.memory, entry).map(|dropped| dropped > 0)
    }

    fn list_tables(&self) -> BackendResult<Vec<TableSpec>> {
        self.memory.list_tables()
    }

    fn execute_query(&self, table: &str, query: &VectorQuery) -> BackendResult<Vec<QueryRow>> {
        self.memory.execute_query(table, query)
    }

    fn fetch_rows(&self, table: &str, ids: &[DocumentId]) -> BackendResult<Vec<StoredDocument>> {
        self.memory.fetch_rows(table, ids)
    }

    fn upsert_rows(&self, table: &str, rows: Vec<StoredDocument>) -> BackendResult<usize> {
        let mut wal = self.wal.lock();
        // nothing is logged for a write the memory tables would reject
        check_dimensions(&self.memory.spec(table)?, &rows)?;

        let entry = WalEntry::UpsertRows {
            table: table.to_string(),
            rows,
        };
        wal.append(&entry)?;
        apply(&self.memory, entry)
    }

    fn delete_rows(&self, table: &str, selector: &RowSelector) -> BackendResult<usize> {
        let mut wal = self.wal.lock();
        let ids: Vec<DocumentId> = match selector {
            RowSelector::Ids(ids) => self
                .memory
                .fetch_rows(table, ids)?
                .into_iter()
                .map(|row| row.id)
                .collect(),
            RowSelector::Condition(condition) => self
                .memory
                .execute_query(table, &VectorQuery::filter(condition.clone()))?
                .into_iter()
                .map(|row| row.document.id)
                .collect(),
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let entry = WalEntry::DeleteRows {
            table: table.to_string(),
            ids,
        };
        wal.append(&entry)?;
        apply(&self.memory, entry)
    }

    fn count_rows(&self, table: &str, condition: &QueryCondition) -> BackendResult<usize> {
        self.memory.count_rows(table, condition)
    }
}

/// Flushes directory entries (creates, renames) to disk.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> BackendResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> BackendResult<()> {
    Ok(())
}
