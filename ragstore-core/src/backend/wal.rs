//! Write-ahead log for the durable backend.
//!
//! Every mutation is appended here before it is applied in memory. On open,
//! the log is replayed over the last snapshot.
//!
//! # Format
//!
//! Each record is:
//! ```text
//! [checksum:u32][length:u32][json:length]
//! ```
//! with the checksum (CRC32) taken over the JSON bytes. A record cut short
//! by a crash at the end of the file is dropped on recovery and the file is
//! truncated back to the last complete record.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{BackendResult, TableSpec};
use crate::config::SyncMode;
use crate::document::{DocumentId, StoredDocument};
use crate::error::BackendError;

const HEADER_LEN: u64 = 8;
const BATCH_SIZE: usize = 100;

/// A logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalEntry {
    CreateTable { spec: TableSpec },
    DropTable { name: String },
    UpsertRows { table: String, rows: Vec<StoredDocument> },
    /// Deletes are logged by identity, including deletes issued by condition.
    DeleteRows { table: String, ids: Vec<DocumentId> },
}

/// Append-only log file.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_mode: SyncMode,
    entries_since_sync: usize,
}

impl Wal {
    /// Opens or creates the log, returning the entries it already holds.
    ///
    /// A torn record at the tail is discarded and cut from the file.
    pub fn open<P: AsRef<Path>>(path: P, sync_mode: SyncMode) -> BackendResult<(Self, Vec<WalEntry>)> {
        let path = path.as_ref().to_path_buf();
        let (entries, valid_len) = Self::read_all(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if file.metadata()?.len() > valid_len {
            warn!(path = %path.display(), valid_len, "truncating torn write-ahead log tail");
            file.set_len(valid_len)?;
        }

        let wal = Self {
            path,
            writer: BufWriter::new(file),
            sync_mode,
            entries_since_sync: 0,
        };
        Ok((wal, entries))
    }

    /// Appends an entry, syncing according to the sync mode.
    pub fn append(&mut self, entry: &WalEntry) -> BackendResult<()> {
        let data = serde_json::to_vec(entry)?;
        let length = u32::try_from(data.len())
            .map_err(|_| BackendError::InvalidQuery("log record exceeds 4 GiB".into()))?;
        let checksum = crc32fast::hash(&data);

        self.writer.write_all(&checksum.to_le_bytes())?;
        self.writer.write_all(&length.to_le_bytes())?;
        self.writer.write_all(&data)?;

        self.entries_since_sync += 1;
        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batched if self.entries_since_sync >= BATCH_SIZE => self.sync()?,
            SyncMode::Batched => self.writer.flush()?,
            SyncMode::NoSync => {}
        }
        Ok(())
    }

    /// Flushes buffered records and syncs them to disk.
    pub fn sync(&mut self) -> BackendResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.entries_since_sync = 0;
        Ok(())
    }

    /// Empties the log. Called once its entries are covered by a snapshot.
    pub fn truncate(&mut self) -> BackendResult<()> {
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.set_len(0)?;
        file.sync_all()?;
        self.entries_since_sync = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every complete record, returning them with the byte length they span.
    fn read_all(path: &Path) -> BackendResult<(Vec<WalEntry>, u64)> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut offset = 0u64;

        while offset < file_len {
            let mut header = [0u8; HEADER_LEN as usize];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let expected = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            let record_end = offset + HEADER_LEN + u64::from(length);
            if record_end > file_len {
                break;
            }

            let mut data = vec![0u8; length as usize];
            reader.read_exact(&mut data)?;

            if crc32fast::hash(&data) != expected {
                if record_end == file_len {
                    // last record half-written before a crash
                    break;
                }
                return Err(BackendError::Corrupted(format!(
                    "checksum mismatch in {} at offset {offset}",
                    path.display()
                )));
            }

            entries.push(serde_json::from_slice(&data)?);
            offset = record_end;
        }

        Ok((entries, offset))
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}
