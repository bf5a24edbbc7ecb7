use std::io;

use byteorder::{ByteOrder as _, LE};
use positioned_io::ReadAt;

use crate::address::Family;

const BUCKETS: usize = 1 << 16;
const ENTRY_LEN: usize = 8;

/// Inclusive range of rows that may contain the addresses of a bucket.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RowRange {
    pub low_row: u32,
    pub high_row: u32,
}

/// Bucket index of one row table, keyed by the top 16 bits of an address.
pub(crate) struct Index {
    table: Box<[RowRange]>,
}

impl Index {
    /// Reads the 65536 entries starting at the 0-based `offset`.
    pub fn read<R: ReadAt + ?Sized>(raf: &R, offset: u64) -> io::Result<Index> {
        let mut buf = vec![0; BUCKETS * ENTRY_LEN];
        raf.read_exact_at(offset, &mut buf)?;
        let table = buf
            .chunks_exact(ENTRY_LEN)
            .map(|entry| RowRange {
                low_row: LE::read_u32(&entry[..4]),
                high_row: LE::read_u32(&entry[4..]),
            })
            .collect();
        Ok(Index { table })
    }

    pub fn get(&self, family: Family, magnitude: u128) -> RowRange {
        self.table[family.bucket(magnitude)]
    }
}
