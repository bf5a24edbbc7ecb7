//! Writer for small BIN files used by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write as _;

use ip2proxy::Columns;
use tempfile::NamedTempFile;

pub const HEADER_LEN: usize = 64;
pub const INDEX_LEN: usize = 65536 * 8;

/// Columns of each package, including IP-From.
pub const COLUMN_COUNTS: [u8; 12] = [2, 3, 5, 6, 7, 8, 10, 11, 12, 12, 13, 14];

/// Attribute columns in file order and the first package carrying them.
const ATTRIBUTES: [(Columns, u8); 13] = [
    (Columns::PROXY_TYPE, 2),
    (Columns::COUNTRY_SHORT, 1),
    (Columns::REGION, 3),
    (Columns::CITY, 3),
    (Columns::ISP, 4),
    (Columns::DOMAIN, 5),
    (Columns::USAGE_TYPE, 6),
    (Columns::ASN, 7),
    (Columns::AS_NAME, 7),
    (Columns::LAST_SEEN, 8),
    (Columns::THREAT, 9),
    (Columns::PROVIDER, 11),
    (Columns::FRAUD_SCORE, 12),
];

/// A range starting at `from`, up to the start of the next record.
#[derive(Debug, Clone)]
pub struct Record {
    pub from: u128,
    pub country_short: &'static str,
    pub country_long: &'static str,
    values: HashMap<u32, &'static str>,
}

impl Record {
    pub fn new(from: u128, proxy_type: &'static str, country_short: &'static str, country_long: &'static str) -> Record {
        Record {
            from,
            country_short,
            country_long,
            values: HashMap::new(),
        }
        .with(Columns::PROXY_TYPE, proxy_type)
    }

    /// A range that is not a proxy, with `-` in every column.
    pub fn empty(from: u128) -> Record {
        Record::new(from, "-", "-", "-")
    }

    pub fn with(mut self, column: Columns, value: &'static str) -> Record {
        self.values.insert(column.bits(), value);
        self
    }

    pub fn get(&self, column: Columns) -> &'static str {
        self.values.get(&column.bits()).copied().unwrap_or("-")
    }
}

#[derive(Default)]
struct Strings {
    start: u32,
    data: Vec<u8>,
    seen: HashMap<Vec<u8>, u32>,
}

impl Strings {
    fn push(&mut self, bytes: &[u8]) -> u32 {
        if let Some(&ptr) = self.seen.get(bytes) {
            return ptr;
        }
        let ptr = self.start + self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        self.seen.insert(bytes.to_vec(), ptr);
        ptr
    }

    fn put(&mut self, s: &str) -> u32 {
        let mut bytes = vec![s.len() as u8];
        bytes.extend_from_slice(s.as_bytes());
        self.push(&bytes)
    }

    /// Short code padded to 3 bytes, directly followed by the long name.
    fn put_country(&mut self, short: &str, long: &str) -> u32 {
        let mut bytes = vec![short.len() as u8];
        bytes.extend_from_slice(short.as_bytes());
        bytes.resize(3, 0);
        bytes.push(long.len() as u8);
        bytes.extend_from_slice(long.as_bytes());
        self.push(&bytes)
    }
}

pub struct Fixture {
    px: u8,
    year: u8,
    month: u8,
    day: u8,
    product_code: u8,
    index: bool,
    terminator: bool,
    ipv4: Vec<Record>,
    ipv6: Vec<Record>,
}

impl Fixture {
    pub fn new(px: u8) -> Fixture {
        Fixture {
            px,
            year: 24,
            month: 6,
            day: 1,
            product_code: 2,
            index: true,
            terminator: true,
            ipv4: Vec::new(),
            ipv6: Vec::new(),
        }
    }

    pub fn date(mut self, year: u8, month: u8, day: u8) -> Fixture {
        self.year = year;
        self.month = month;
        self.day = day;
        self
    }

    pub fn product_code(mut self, product_code: u8) -> Fixture {
        self.product_code = product_code;
        self
    }

    pub fn without_index(mut self) -> Fixture {
        self.index = false;
        self
    }

    /// Leaves out the final row that closes the last range.
    pub fn without_terminator(mut self) -> Fixture {
        self.terminator = false;
        self
    }

    pub fn ipv4(mut self, records: Vec<Record>) -> Fixture {
        self.ipv4 = records;
        self
    }

    pub fn ipv6(mut self, records: Vec<Record>) -> Fixture {
        self.ipv6 = records;
        self
    }

    fn attributes(&self) -> Vec<Columns> {
        ATTRIBUTES
            .iter()
            .filter(|&&(_, since)| since <= self.px)
            .map(|&(column, _)| column)
            .collect()
    }

    fn num_columns(&self) -> u8 {
        COLUMN_COUNTS[usize::from(self.px) - 1]
    }

    fn pointers(&self, record: &Record, strings: &mut Strings) -> Vec<u32> {
        self.attributes()
            .into_iter()
            .map(|column| {
                if column == Columns::COUNTRY_SHORT {
                    strings.put_country(record.country_short, record.country_long)
                } else {
                    strings.put(record.get(column))
                }
            })
            .collect()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        assert_eq!(self.attributes().len() + 1, usize::from(self.num_columns()));
        for records in &[&self.ipv4, &self.ipv6] {
            assert!(records.windows(2).all(|w| w[0].from < w[1].from), "records must be sorted");
        }

        let fields = usize::from(self.num_columns()) - 1;
        let stride_v4 = 4 + fields * 4;
        let stride_v6 = 16 + fields * 4;
        let extra = usize::from(self.terminator);
        let rows_v4 = if self.ipv4.is_empty() { 0 } else { self.ipv4.len() + extra };
        let rows_v6 = if self.ipv6.is_empty() { 0 } else { self.ipv6.len() + extra };

        let mut pos = HEADER_LEN;
        let index_v4 = if self.index && rows_v4 > 0 { Some(take(&mut pos, INDEX_LEN)) } else { None };
        let index_v6 = if self.index && rows_v6 > 0 { Some(take(&mut pos, INDEX_LEN)) } else { None };
        let base_v4 = take(&mut pos, rows_v4 * stride_v4);
        let base_v6 = take(&mut pos, rows_v6 * stride_v6);

        let mut strings = Strings { start: pos as u32, ..Strings::default() };

        let mut rows = Vec::new();
        for record in &self.ipv4 {
            rows.extend_from_slice(&(record.from as u32).to_le_bytes());
            put_pointers(&mut rows, &self.pointers(record, &mut strings));
        }
        if let Some(first) = self.ipv4.first().filter(|_| self.terminator) {
            rows.extend_from_slice(&u32::MAX.to_le_bytes());
            put_pointers(&mut rows, &self.pointers(first, &mut strings));
        }
        for record in &self.ipv6 {
            rows.extend_from_slice(&record.from.to_le_bytes());
            put_pointers(&mut rows, &self.pointers(record, &mut strings));
        }
        if let Some(first) = self.ipv6.first().filter(|_| self.terminator) {
            rows.extend_from_slice(&u128::MAX.to_le_bytes());
            put_pointers(&mut rows, &self.pointers(first, &mut strings));
        }

        let mut buf = vec![0; HEADER_LEN];
        buf[0] = self.px;
        buf[1] = self.num_columns();
        buf[2] = self.year;
        buf[3] = self.month;
        buf[4] = self.day;
        buf[5..9].copy_from_slice(&(rows_v4 as u32).to_le_bytes());
        buf[9..13].copy_from_slice(&one_based(rows_v4, base_v4).to_le_bytes());
        buf[13..17].copy_from_slice(&(rows_v6 as u32).to_le_bytes());
        buf[17..21].copy_from_slice(&one_based(rows_v6, base_v6).to_le_bytes());
        buf[21..25].copy_from_slice(&index_v4.map_or(0, |p| p as u32 + 1).to_le_bytes());
        buf[25..29].copy_from_slice(&index_v6.map_or(0, |p| p as u32 + 1).to_le_bytes());
        buf[29] = self.product_code;

        if index_v4.is_some() {
            write_index(&mut buf, &self.ipv4, self.terminator.then(|| u128::from(u32::MAX)), 16);
        }
        if index_v6.is_some() {
            write_index(&mut buf, &self.ipv6, self.terminator.then(|| u128::MAX), 112);
        }
        buf.extend_from_slice(&rows);
        buf.extend_from_slice(&strings.data);

        let file_size = buf.len() as u32;
        buf[31..35].copy_from_slice(&file_size.to_le_bytes());
        buf
    }

    pub fn write(&self) -> NamedTempFile {
        write_bytes(&self.to_bytes())
    }
}

pub fn write_bytes(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn take(pos: &mut usize, len: usize) -> usize {
    let start = *pos;
    *pos += len;
    start
}

fn one_based(rows: usize, offset: usize) -> u32 {
    if rows == 0 {
        0
    } else {
        offset as u32 + 1
    }
}

fn put_pointers(buf: &mut Vec<u8>, pointers: &[u32]) {
    for ptr in pointers {
        buf.extend_from_slice(&ptr.to_le_bytes());
    }
}

/// Each bucket spans the rows containing its first and its last address.
fn write_index(buf: &mut Vec<u8>, records: &[Record], terminator: Option<u128>, shift: u32) {
    let mut froms: Vec<u128> = records.iter().map(|r| r.from).collect();
    froms.extend(terminator);
    let row_of = |addr: u128| froms.iter().rposition(|&from| from <= addr).unwrap_or(0) as u32;

    let span = (1u128 << shift) - 1;
    for bucket in 0..65536u128 {
        let first = bucket << shift;
        buf.extend_from_slice(&row_of(first).to_le_bytes());
        buf.extend_from_slice(&row_of(first | span).to_le_bytes());
    }
}
