//! # History Journal — Memory-Mapped Record Log
//!
//! Released records are appended, in replay order, to a single file mapped
//! into memory. The file is pre-allocated at open and truncated to its used
//! length when sealed.
//!
//! Layout:
//! ```text
//! [0 .. 32)          → Header: magic "VGJ1", version u32, entries u64, used u64, reserved
//! [32 .. used)       → Entries: [len: u32 LE][crc32: u32 LE][rkyv archive of OperationRecord]
//! [used .. capacity) → Free (removed by `seal`)
//! ```

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use memmap2::{Mmap, MmapMut};
use thiserror::Error;
use tracing::{debug, info};
use vg_core::OperationRecord;

pub const MAGIC: [u8; 4] = *b"VGJ1";
pub const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 32;
const ENTRY_PREFIX: usize = 8;

/// Default pre-allocation: 256 MiB.
pub const DEFAULT_JOURNAL_CAPACITY: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("journal capacity of {capacity} bytes exhausted")]
    Full { capacity: usize },

    #[error("journal capacity {0} is smaller than the header")]
    TooSmall(u64),

    #[error("not a history journal (bad magic or version)")]
    BadHeader,

    #[error("entry {index} at offset {offset} is truncated")]
    Truncated { index: u64, offset: usize },

    #[error("entry {index} checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum {
        index: u64,
        stored: u32,
        computed: u32,
    },

    #[error("entry codec: {0}")]
    Codec(String),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> JournalError + '_ {
    move |source| JournalError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

pub struct JournalWriter {
    mmap: MmapMut,
    file: File,
    path: PathBuf,
    used: usize,
    entries: u64,
}

impl JournalWriter {
    /// Create (or truncate) a journal at `path`, pre-allocated to
    /// `capacity` bytes.
    pub fn create(path: &Path, capacity: u64) -> Result<Self, JournalError> {
        if capacity < HEADER_SIZE as u64 {
            return Err(JournalError::TooSmall(capacity));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(io_err(path))?;
        file.set_len(capacity).map_err(io_err(path))?;

        // SAFETY: the file was just created and is owned by this writer;
        // nothing else maps it while the writer lives.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(io_err(path))?;

        debug!(path = %path.display(), capacity, "journal opened");
        Ok(Self {
            mmap,
            file,
            path: path.to_path_buf(),
            used: HEADER_SIZE,
            entries: 0,
        })
    }

    pub fn append(&mut self, record: &OperationRecord) -> Result<(), JournalError> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(record)
            .map_err(|e| JournalError::Codec(e.to_string()))?;
        let end = self.used + ENTRY_PREFIX + bytes.len();
        if end > self.mmap.len() {
            return Err(JournalError::Full {
                capacity: self.mmap.len(),
            });
        }

        let at = self.used;
        self.mmap[at..at + 4].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.mmap[at + 4..at + 8].copy_from_slice(&checksum(&bytes).to_le_bytes());
        self.mmap[at + ENTRY_PREFIX..end].copy_from_slice(&bytes);
        self.used = end;
        self.entries += 1;
        Ok(())
    }

    pub fn append_all(&mut self, records: &[OperationRecord]) -> Result<(), JournalError> {
        records.iter().try_for_each(|r| self.append(r))
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Write the header, flush, and shrink the file to its used length.
    pub fn seal(mut self) -> Result<PathBuf, JournalError> {
        self.mmap[0..4].copy_from_slice(&MAGIC);
        self.mmap[4..8].copy_from_slice(&VERSION.to_le_bytes());
        self.mmap[8..16].copy_from_slice(&self.entries.to_le_bytes());
        self.mmap[16..24].copy_from_slice(&(self.used as u64).to_le_bytes());
        self.mmap[24..32].fill(0);
        self.mmap.flush().map_err(io_err(&self.path))?;

        let Self {
            mmap,
            file,
            path,
            used,
            entries,
        } = self;
        drop(mmap);
        file.set_len(used as u64).map_err(io_err(&path))?;
        file.sync_all().map_err(io_err(&path))?;

        info!(path = %path.display(), entries, bytes = used, "journal sealed");
        Ok(path)
    }
}

/// Read every record of a sealed journal, validating each checksum.
pub fn read_journal(path: &Path) -> Result<Vec<OperationRecord>, JournalError> {
    let file = File::open(path).map_err(io_err(path))?;
    // SAFETY: the journal is sealed and not modified while mapped.
    let mmap = unsafe { Mmap::map(&file) }.map_err(io_err(path))?;

    if mmap.len() < HEADER_SIZE || mmap[0..4] != MAGIC {
        return Err(JournalError::BadHeader);
    }
    let version = u32::from_le_bytes(le_array(&mmap[4..8]));
    if version != VERSION {
        return Err(JournalError::BadHeader);
    }
    let entries = u64::from_le_bytes(le_array(&mmap[8..16]));
    let used = u64::from_le_bytes(le_array(&mmap[16..24])) as usize;
    if used > mmap.len() || used < HEADER_SIZE {
        return Err(JournalError::BadHeader);
    }

    let mut records = Vec::with_capacity(entries as usize);
    let mut offset = HEADER_SIZE;
    for index in 0..entries {
        if offset + ENTRY_PREFIX > used {
            return Err(JournalError::Truncated { index, offset });
        }
        let len = u32::from_le_bytes(le_array(&mmap[offset..offset + 4])) as usize;
        let stored = u32::from_le_bytes(le_array(&mmap[offset + 4..offset + 8]));
        let start = offset + ENTRY_PREFIX;
        let end = start + len;
        if end > used {
            return Err(JournalError::Truncated { index, offset });
        }

        let body = &mmap[start..end];
        let computed = checksum(body);
        if computed != stored {
            return Err(JournalError::Checksum {
                index,
                stored,
                computed,
            });
        }
        let record = rkyv::from_bytes::<OperationRecord, rkyv::rancor::Error>(body)
            .map_err(|e| JournalError::Codec(e.to_string()))?;
        records.push(record);
        offset = end;
    }

    debug!(path = %path.display(), entries, "journal read");
    Ok(records)
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
