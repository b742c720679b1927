//! Sorted String Table (SSTable) Module
//!
//! An immutable, sorted, on-disk segment: the unit a memtable flushes
//! into and that compaction reads from and rewrites.
//!
//! ## On-disk layout
//!
//! ```text
//! [ record 0 ][ record 1 ] … [ record n-1 ]
//! [ index blob                             ]
//! [ bloom blob                             ]
//! [ footer: index_off: u64 BE | bloom_off: u64 BE ]
//! ```
//!
//! **Record encoding**: `klen: u32 BE | vlen: u32 BE | tomb: u8 |
//! key[klen] | value[vlen]`. If `tomb == 1`, `vlen` is always 0.
//!
//! **Sparse index**: one `(key, offset)` entry per [`BLOCK_STRIDE`]
//! consecutive records (the first record's entry is always present),
//! encoded with the same self-describing scheme used for WAL payloads
//! ([`crate::encoding`]).
//!
//! **Bloom filter**: the serialized form from [`crate::bloom`].
//!
//! The footer is exactly 16 bytes: two big-endian `u64` offsets.
//!
//! ## Sub-modules
//!
//! - [`builder`]: streams a sorted, deduplicated record sequence to
//!   disk and publishes the finished file atomically.
//! - [`iterator`]: sequential scan over the data section.
//!
//! ## Concurrency
//!
//! An [`SSTable`] is immutable once opened. Its data section is
//! memory-mapped and read lazily; the index and Bloom filter are
//! loaded eagerly at `open`. Multiple readers may share one handle
//! without locking.

pub mod builder;
pub mod iterator;


pub use builder::create;
pub use iterator::ScanIterator;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

use crate::bloom::{BloomError, BloomFilter};
use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::wal::Record;

/// Records per sparse-index entry.
pub const DEFAULT_BLOCK_STRIDE: usize = 64;

/// Footer size: two `u64` big-endian offsets.
const FOOTER_SIZE: usize = 16;

/// Errors returned by SSTable operations.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index or Bloom blob failed to decode.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Bloom filter blob failed to decode.
    #[error("bloom filter error: {0}")]
    Bloom(#[from] BloomError),

    /// Structural violation: malformed header, truncated record,
    /// out-of-range footer offset, or an index not in key order.
    #[error("corrupt SSTable {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// One sparse-index entry: the first key of a block and its byte
/// offset in the data section.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexEntry {
    key: Vec<u8>,
    offset: u64,
}

impl Encode for IndexEntry {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.key.encode_to(buf)?;
        self.offset.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for IndexEntry {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (off, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((IndexEntry { key, offset: off }, offset))
    }
}

/// An open, immutable, on-disk sorted segment.
#[derive(Debug)]
pub struct SSTable {
    path: PathBuf,
    mmap: Option<Mmap>,
    bloom: BloomFilter,
    index: Vec<IndexEntry>,
    data_end: u64,
}

impl SSTable {
    /// Opens an existing SSTable file: reads the footer, then the
    /// Bloom filter, then the sparse index. The data section is not
    /// read here; it is memory-mapped for lazy, on-demand access.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SSTableError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        if file_len < FOOTER_SIZE as u64 {
            return Err(SSTableError::Corrupt {
                path,
                reason: "file shorter than footer".into(),
            });
        }

        // SAFETY: the file is opened read-only and not truncated by
        // this process while the mapping is alive; readers treat the
        // mapping as an immutable byte slice.
        let mmap = unsafe { Mmap::map(&file)? };

        let footer_start = (file_len - FOOTER_SIZE as u64) as usize;
        let footer = &mmap[footer_start..];
        let index_off = u64::from_be_bytes(footer[0..8].try_into().expect("8 bytes"));
        let bloom_off = u64::from_be_bytes(footer[8..16].try_into().expect("8 bytes"));

        if index_off > bloom_off || bloom_off > footer_start as u64 {
            return Err(SSTableError::Corrupt {
                path,
                reason: format!(
                    "footer offsets out of range: index_off={index_off}, bloom_off={bloom_off}, file_len={file_len}"
                ),
            });
        }

        let index_blob = &mmap[index_off as usize..bloom_off as usize];
        let (index, _) = decode_index(index_blob).map_err(|e| SSTableError::Corrupt {
            path: path.clone(),
            reason: format!("index decode failed: {e}"),
        })?;

        verify_index_order(&index).map_err(|reason| SSTableError::Corrupt {
            path: path.clone(),
            reason,
        })?;

        let bloom_blob = &mmap[bloom_off as usize..footer_start];
        let bloom = BloomFilter::from_bytes(bloom_blob)?;

        Ok(Self {
            path,
            mmap: Some(mmap),
            bloom,
            index,
            data_end: index_off,
        })
    }

    /// Creates a new SSTable from a sorted, deduplicated slice of
    /// records. See [`builder::create`] for the write protocol.
    pub fn create<P: AsRef<Path>>(
        path: P,
        items: &[Record],
        bloom_fp_rate: f64,
        block_stride: usize,
    ) -> Result<Self, SSTableError> {
        builder::create(path, items, bloom_fp_rate, block_stride)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current on-disk file size in bytes.
    pub fn size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn data(&self) -> &[u8] {
        match &self.mmap {
            Some(m) => &m[..self.data_end as usize],
            None => &[],
        }
    }

    /// The smallest key stored in this table, if non-empty.
    pub fn first_key(&self) -> Option<&[u8]> {
        self.index.first().map(|e| e.key.as_slice())
    }

    /// The largest key stored in this table, if non-empty. Requires a
    /// linear scan of the last block.
    pub fn last_key(&self) -> Option<Vec<u8>> {
        let start = self.index.last()?.offset as usize;
        let data = self.data();
        let mut cursor = start;
        let mut last = None;
        while cursor < data.len() {
            let (rec, consumed) = decode_data_record(&data[cursor..]).ok()?;
            last = Some(rec.key);
            cursor += consumed;
        }
        last
    }

    /// Returns `true` if `key` falls within `[first_key, last_key]`
    /// (both inclusive). Used by compaction to test range overlap
    /// without doing a full lookup.
    pub fn key_range(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        let first = self.first_key()?.to_vec();
        let last = self.last_key()?;
        Some((first, last))
    }

    /// Point lookup. Returns `Ok(None)` if the key is absent (either
    /// ruled out by the Bloom filter or not found by scan) and
    /// `Ok(Some(None))` if the key is present but tombstoned.
    pub fn get(&self, key: &[u8]) -> Result<Option<Option<Vec<u8>>>, SSTableError> {
        if !self.bloom.contains(key) {
            return Ok(None);
        }

        let Some(block_idx) = self.locate_block(key) else {
            return Ok(None);
        };

        let start = self.index[block_idx].offset as usize;
        let end = self
            .index
            .get(block_idx + 1)
            .map(|e| e.offset as usize)
            .unwrap_or(self.data_end as usize);

        let data = self.data();
        let mut cursor = start;
        while cursor < end {
            let (rec, consumed) =
                decode_data_record(&data[cursor..end]).map_err(|reason| SSTableError::Corrupt {
                    path: self.path.clone(),
                    reason,
                })?;
            match rec.key.as_slice().cmp(key) {
                std::cmp::Ordering::Equal => {
                    return Ok(Some(if rec.tombstone { None } else { rec.value }));
                }
                std::cmp::Ordering::Greater => return Ok(None),
                std::cmp::Ordering::Less => {}
            }
            cursor += consumed;
        }
        Ok(None)
    }

    /// Binary-searches the sparse index for the block that may
    /// contain `key`: the largest entry whose key is `<= key`.
    fn locate_block(&self, key: &[u8]) -> Option<usize> {
        if self.index.is_empty() {
            return None;
        }
        let mut lo = 0usize;
        let mut hi = self.index.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.index[mid].key.as_slice() <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == 0 {
            None
        } else {
            Some(lo - 1)
        }
    }

    /// Yields every record in ascending key order.
    pub fn scan(&self) -> ScanIterator<'_> {
        ScanIterator::new(self.data())
    }
}

fn decode_data_record(buf: &[u8]) -> Result<(Record, usize), String> {
    if buf.len() < 9 {
        return Err("truncated record header".into());
    }
    let klen = u32::from_be_bytes(buf[0..4].try_into().expect("4 bytes")) as usize;
    let vlen = u32::from_be_bytes(buf[4..8].try_into().expect("4 bytes")) as usize;
    let tomb = buf[8];
    if tomb > 1 {
        return Err(format!("invalid tombstone byte {tomb}"));
    }
    let tombstone = tomb == 1;
    if tombstone && vlen != 0 {
        return Err("tombstone record carries a non-zero value length".into());
    }

    let header_len = 9;
    let total = header_len + klen + vlen;
    if buf.len() < total {
        return Err("truncated record body".into());
    }

    let key = buf[header_len..header_len + klen].to_vec();
    let value = if tombstone {
        None
    } else {
        Some(buf[header_len + klen..total].to_vec())
    };

    Ok((
        Record {
            key,
            value,
            tombstone,
        },
        total,
    ))
}

fn encode_data_record(record: &Record, buf: &mut Vec<u8>) {
    let klen = record.key.len() as u32;
    let vlen = record.value.as_ref().map(|v| v.len()).unwrap_or(0) as u32;
    buf.extend_from_slice(&klen.to_be_bytes());
    buf.extend_from_slice(&vlen.to_be_bytes());
    buf.push(u8::from(record.tombstone));
    buf.extend_from_slice(&record.key);
    if let Some(v) = &record.value {
        buf.extend_from_slice(v);
    }
}

fn decode_index(buf: &[u8]) -> Result<(Vec<IndexEntry>, usize), EncodingError> {
    encoding::decode_vec::<IndexEntry>(buf)
}

fn encode_index(entries: &[IndexEntry]) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    encoding::encode_vec(entries, &mut buf)?;
    Ok(buf)
}

fn verify_index_order(index: &[IndexEntry]) -> Result<(), String> {
    for pair in index.windows(2) {
        if pair[0].key >= pair[1].key {
            return Err("sparse index keys are not strictly ascending".into());
        }
    }
    Ok(())
}
