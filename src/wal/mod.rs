//! Write-Ahead Logging (WAL) Module
//!
//! A durable, append-only, segmented log of `(key, value?, tombstone)`
//! records. Every write the engine accepts is appended here, and
//! drained to the OS, before it is applied to the memtable — the WAL
//! tail is the only durability story for data not yet in an SSTable.
//!
//! ## On-disk layout
//!
//! ```text
//! [HEADER][HEADER_CRC32 BE]
//! [REC_LEN u32 BE][REC_BYTES][REC_CRC32 BE]
//! [REC_LEN u32 BE][REC_BYTES][REC_CRC32 BE]
//! ...
//! ```
//!
//! The record length prefix is big-endian, matching the rest of the
//! on-disk formats. `REC_BYTES` is a self-describing encoding of
//! `(key, value?, tombstone)` built on [`crate::encoding`]; the CRC32
//! trailer guards the frame against torn writes.
//!
//! Segments are named `wal_{seq:06}.log` with a monotonically
//! increasing sequence number, zero-padded to 6 digits.
//!
//! ## Durability
//!
//! Every [`Wal::append`] call writes and drains to the OS before
//! returning. [`WalFsync`] additionally controls when `fsync` is
//! invoked: per record, on an interval, or never (left to the OS).
//!
//! ## Replay
//!
//! [`Wal::replay_iter`] reads framed records until EOF or a partial
//! frame. A trailing partial or corrupt frame silently ends replay for
//! that segment (torn-tail tolerance) rather than erroring; a corrupt
//! frame that is *not* the last one is a [`WalError::Corrupt`].

#[cfg(test)]
mod tests;

use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crc32fast::Hasher as Crc32;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::encoding::{self, Decode, Encode, EncodingError};

const U32_SIZE: usize = 4;
const MAGIC: [u8; 4] = *b"LWAL";
const VERSION: u32 = 1;

/// Default maximum size of a single encoded record (1 MiB).
pub const DEFAULT_MAX_RECORD_SIZE: u32 = 1024 * 1024;

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to decode a record payload that passed its checksum.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A non-trailing frame failed its checksum or carried a malformed
    /// header. Unlike a torn tail, this is not silently tolerated.
    #[error("corrupt WAL frame at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// Record exceeds the configured maximum size.
    #[error("record size {0} exceeds configured limit")]
    RecordTooLarge(usize),

    /// Segment filename did not match `wal_{seq:06}.log`.
    #[error("invalid WAL segment filename: {0}")]
    InvalidName(String),

    /// Internal locking or bookkeeping failure.
    #[error("internal WAL error: {0}")]
    Internal(String),
}

/// Controls when `fsync` is invoked beyond the mandatory write+drain
/// on every append.
#[derive(Debug, Clone, Copy)]
pub enum WalFsync {
    /// Fsync after every record.
    PerRecord,
    /// Fsync at most once per `Duration`, on the next append after it
    /// elapses.
    Interval(Duration),
    /// Never fsync explicitly (rely on OS page cache flush policy).
    Off,
}

impl Default for WalFsync {
    fn default() -> Self {
        WalFsync::PerRecord
    }
}

/// The logical unit of durability: a single key's write or deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub tombstone: bool,
}

impl Record {
    pub fn set(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value: Some(value),
            tombstone: false,
        }
    }

    pub fn delete(key: Vec<u8>) -> Self {
        Self {
            key,
            value: None,
            tombstone: true,
        }
    }
}

impl Encode for Record {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.key.encode_to(buf)?;
        self.value.encode_to(buf)?;
        self.tombstone.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for Record {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (value, n) = Option::<Vec<u8>>::decode_from(&buf[offset..])?;
        offset += n;
        let (tombstone, n) = bool::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Record {
                key,
                value,
                tombstone,
            },
            offset,
        ))
    }
}

struct Header {
    magic: [u8; 4],
    version: u32,
    max_record_size: u32,
    seq: u32,
}

impl Header {
    /// `magic(4) + version(4) + max_record_size(4) + seq(4)`.
    const ENCODED_SIZE: usize = 4 + 4 + 4 + 4;
    const DISK_SIZE: usize = Self::ENCODED_SIZE + U32_SIZE;

    fn write_to<W: Write>(&self, w: &mut W) -> Result<(), WalError> {
        let mut buf = Vec::with_capacity(Self::ENCODED_SIZE);
        buf.extend_from_slice(&self.magic);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.max_record_size.to_be_bytes());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        let crc = crc32(&[&buf]);
        w.write_all(&buf)?;
        w.write_all(&crc.to_be_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, WalError> {
        let mut buf = vec![0u8; Self::ENCODED_SIZE];
        r.read_exact(&mut buf)?;
        let mut crc_buf = [0u8; U32_SIZE];
        r.read_exact(&mut crc_buf)?;
        let stored = u32::from_be_bytes(crc_buf);
        if crc32(&[&buf]) != stored {
            return Err(WalError::Corrupt {
                offset: 0,
                reason: "header checksum mismatch".into(),
            });
        }

        let magic: [u8; 4] = buf[0..4].try_into().expect("4 bytes");
        if magic != MAGIC {
            return Err(WalError::Corrupt {
                offset: 0,
                reason: "bad magic".into(),
            });
        }
        let version = u32::from_be_bytes(buf[4..8].try_into().expect("4 bytes"));
        if version != VERSION {
            return Err(WalError::Corrupt {
                offset: 0,
                reason: format!("unsupported version {version}"),
            });
        }
        let max_record_size = u32::from_be_bytes(buf[8..12].try_into().expect("4 bytes"));
        let seq = u32::from_be_bytes(buf[12..16].try_into().expect("4 bytes"));

        Ok(Self {
            magic,
            version,
            max_record_size,
            seq,
        })
    }
}

fn crc32(parts: &[&[u8]]) -> u32 {
    let mut hasher = Crc32::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// Formats a WAL segment filename for sequence number `seq`.
pub fn segment_name(seq: u32) -> String {
    format!("wal_{seq:06}.log")
}

/// Parses the sequence number out of a WAL segment filename, or `None`
/// if it doesn't match `wal_{seq:06}.log`.
pub fn parse_seq(path: &Path) -> Option<u32> {
    let name = path.file_name().and_then(OsStr::to_str)?;
    let digits = name.strip_prefix("wal_")?.strip_suffix(".log")?;
    digits.parse::<u32>().ok()
}

/// A single WAL segment: a durable, append-only, CRC-protected record
/// log with a fixed sequence number.
pub struct Wal {
    file: Arc<Mutex<File>>,
    path: PathBuf,
    seq: u32,
    max_record_size: u32,
    fsync: WalFsync,
    last_fsync: Mutex<Instant>,
}

impl Wal {
    /// Opens or creates the WAL segment at `path`. The filename must
    /// match `wal_{seq:06}.log` and its embedded sequence must agree
    /// with an existing header, if one is present.
    pub fn open<P: AsRef<Path>>(path: P, fsync: WalFsync) -> Result<Self, WalError> {
        let path = path.as_ref();
        let seq = parse_seq(path)
            .ok_or_else(|| WalError::InvalidName(path.display().to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let max_record_size = if file.metadata()?.len() == 0 {
            let header = Header {
                magic: MAGIC,
                version: VERSION,
                max_record_size: DEFAULT_MAX_RECORD_SIZE,
                seq,
            };
            header.write_to(&mut file)?;
            file.sync_all()?;
            info!(path = %path.display(), seq, "WAL segment created");
            header.max_record_size
        } else {
            file.seek(SeekFrom::Start(0))?;
            let header = Header::read_from(&mut file)?;
            if header.seq != seq {
                return Err(WalError::Corrupt {
                    offset: 0,
                    reason: format!(
                        "header seq {} does not match filename seq {seq}",
                        header.seq
                    ),
                });
            }
            debug!(path = %path.display(), seq, "WAL segment opened");
            header.max_record_size
        };

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_path_buf(),
            seq,
            max_record_size,
            fsync,
            last_fsync: Mutex::new(Instant::now()),
        })
    }

    /// Appends `record`, writing and draining to the OS before
    /// returning. Fsyncs according to `self.fsync`.
    pub fn append(&self, record: &Record) -> Result<(), WalError> {
        let payload = encoding::encode_to_vec(record)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| WalError::RecordTooLarge(payload.len()))?;
        if len > self.max_record_size {
            return Err(WalError::RecordTooLarge(payload.len()));
        }

        let len_be = len.to_be_bytes();
        let crc = crc32(&[&len_be, &payload]);

        let mut guard = self
            .file
            .lock()
            .map_err(|_| WalError::Internal("mutex poisoned".into()))?;
        guard.write_all(&len_be)?;
        guard.write_all(&payload)?;
        guard.write_all(&crc.to_be_bytes())?;

        let should_fsync = match self.fsync {
            WalFsync::PerRecord => true,
            WalFsync::Off => false,
            WalFsync::Interval(period) => {
                let mut last = self
                    .last_fsync
                    .lock()
                    .map_err(|_| WalError::Internal("mutex poisoned".into()))?;
                if last.elapsed() >= period {
                    *last = Instant::now();
                    true
                } else {
                    false
                }
            }
        };
        if should_fsync {
            guard.sync_all()?;
        }

        trace!(seq = self.seq, len, "WAL record appended");
        Ok(())
    }

    /// Returns an iterator that replays every valid record in this
    /// segment from the start of the data section.
    pub fn replay_iter(&self) -> Result<WalIter, WalError> {
        Ok(WalIter {
            file: Arc::clone(&self.file),
            offset: Header::DISK_SIZE as u64,
            max_record_size: self.max_record_size as usize,
            done: false,
        })
    }

    /// Fsyncs the underlying file handle.
    pub fn sync(&self) -> Result<(), WalError> {
        let guard = self
            .file
            .lock()
            .map_err(|_| WalError::Internal("mutex poisoned".into()))?;
        guard.sync_all()?;
        Ok(())
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Streaming WAL replay iterator. Stops (without error) at EOF or at a
/// partial/corrupt trailing frame; a corrupt frame with a well-formed
/// successor is reported as [`WalError::Corrupt`].
pub struct WalIter {
    file: Arc<Mutex<File>>,
    offset: u64,
    max_record_size: usize,
    done: bool,
}

impl Iterator for WalIter {
    type Item = Result<Record, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut guard = match self.file.lock() {
            Ok(g) => g,
            Err(_) => {
                self.done = true;
                return Some(Err(WalError::Internal("mutex poisoned".into())));
            }
        };

        if let Err(e) = guard.seek(SeekFrom::Start(self.offset)) {
            self.done = true;
            return Some(Err(WalError::Io(e)));
        }

        let mut len_buf = [0u8; U32_SIZE];
        match guard.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(WalError::Io(e)));
            }
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_record_size {
            // A length this large cannot be a legitimate frame; treat
            // it as a torn/garbage tail rather than erroring.
            warn!(offset = self.offset, len, "WAL replay stopped: implausible record length");
            self.done = true;
            return None;
        }

        let mut payload = vec![0u8; len];
        if let Err(e) = guard.read_exact(&mut payload) {
            self.done = true;
            if e.kind() == io::ErrorKind::UnexpectedEof {
                warn!(offset = self.offset, len, "WAL replay stopped: torn record payload");
                return None;
            }
            return Some(Err(WalError::Io(e)));
        }

        let mut crc_buf = [0u8; U32_SIZE];
        if let Err(e) = guard.read_exact(&mut crc_buf) {
            self.done = true;
            if e.kind() == io::ErrorKind::UnexpectedEof {
                warn!(offset = self.offset, len, "WAL replay stopped: torn record checksum");
                return None;
            }
            return Some(Err(WalError::Io(e)));
        }
        let stored_crc = u32::from_be_bytes(crc_buf);

        let frame_start = self.offset;
        let next_offset = match guard.stream_position() {
            Ok(pos) => pos,
            Err(e) => {
                self.done = true;
                return Some(Err(WalError::Io(e)));
            }
        };

        if crc32(&[&len_buf, &payload]) != stored_crc {
            // A checksum mismatch on what looked like a complete frame
            // could still be a torn tail if it's the last frame in the
            // file; peek ahead to decide.
            let file_len = guard.metadata().map(|m| m.len()).unwrap_or(next_offset);
            self.done = true;
            if next_offset >= file_len {
                warn!(offset = frame_start, "WAL replay stopped: checksum mismatch at tail");
                return None;
            }
            return Some(Err(WalError::Corrupt {
                offset: frame_start,
                reason: "record checksum mismatch".into(),
            }));
        }

        self.offset = next_offset;

        match encoding::decode_from_slice::<Record>(&payload) {
            Ok((record, _)) => Some(Ok(record)),
            Err(e) => {
                self.done = true;
                Some(Err(WalError::Encoding(e)))
            }
        }
    }
}
