//! Streaming SSTable writer.
//!
//! [`create`] implements the write protocol from the module's
//! documentation: stream records, accumulate the sparse index and
//! Bloom filter as it goes, append index/bloom/footer, fsync, then
//! publish the file atomically and reopen it as a memory-mapped
//! [`SSTable`].

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use super::{encode_data_record, encode_index, IndexEntry, SSTable, SSTableError};
use crate::bloom::BloomFilter;
use crate::wal::Record;

/// Writes `items` (already sorted and deduplicated by key) to a new
/// SSTable at `path`.
///
/// 1. size the Bloom filter from `items.len()`
/// 2. stream records, recording a sparse-index entry every
///    `block_stride` records (always including the first)
/// 3. append the index blob, then the Bloom blob, then the footer
/// 4. fsync and rename into place
/// 5. reopen the published file to obtain a memory-mapped handle
pub fn create<P: AsRef<Path>>(
    path: P,
    items: &[Record],
    bloom_fp_rate: f64,
    block_stride: usize,
) -> Result<SSTable, SSTableError> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("sst.tmp");

    let mut bloom = BloomFilter::with_capacity(items.len(), bloom_fp_rate);
    let mut index = Vec::new();

    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        let mut offset: u64 = 0;

        for (i, record) in items.iter().enumerate() {
            if i % block_stride.max(1) == 0 {
                index.push(IndexEntry {
                    key: record.key.clone(),
                    offset,
                });
            }
            bloom.add(&record.key);

            let mut buf = Vec::new();
            encode_data_record(record, &mut buf);
            writer.write_all(&buf)?;
            offset += buf.len() as u64;
        }

        let index_off = offset;
        let index_blob = encode_index(&index)?;
        writer.write_all(&index_blob)?;
        offset += index_blob.len() as u64;

        let bloom_off = offset;
        let bloom_blob = bloom.to_bytes();
        writer.write_all(&bloom_blob)?;

        writer.write_all(&index_off.to_be_bytes())?;
        writer.write_all(&bloom_off.to_be_bytes())?;

        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), records = items.len(), "SSTable published");

    SSTable::open(path)
}
