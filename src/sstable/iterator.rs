//! Sequential scan over an SSTable's data section.

use super::decode_data_record;
use crate::wal::Record;

/// Yields every record in an SSTable's data section in ascending key
/// order. Borrows the table's memory-mapped bytes, so it cannot
/// outlive the [`super::SSTable`] it was created from.
pub struct ScanIterator<'a> {
    data: &'a [u8],
    cursor: usize,
    errored: bool,
}

impl<'a> ScanIterator<'a> {
    pub(super) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            cursor: 0,
            errored: false,
        }
    }
}

impl<'a> Iterator for ScanIterator<'a> {
    type Item = Result<Record, String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored || self.cursor >= self.data.len() {
            return None;
        }
        match decode_data_record(&self.data[self.cursor..]) {
            Ok((record, consumed)) => {
                self.cursor += consumed;
                Some(Ok(record))
            }
            Err(e) => {
                self.errored = true;
                Some(Err(e))
            }
        }
    }
}
