use std::fmt;
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::Path;

use bstr::BString;
use byteorder::{ByteOrder as _, LE};
use log::{debug, trace, warn};
use positioned_io::{RandomAccessFile, ReadAt};

use crate::address::{canonicalize, Canonical, Family};
use crate::columns::{Columns, Layout};
use crate::header::{Header, HEADER_LEN, MAX_COLUMNS};
use crate::index::{Index, RowRange};
use crate::storage::{self, Extent, Extents, IoMode, Storage, View};

/// Attributes of the range containing a queried address.
///
/// Each field is `None` if the column is not supported by the database or
/// was not selected.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Row {
    pub proxy_type: Option<BString>,
    pub country_short: Option<BString>,
    pub country_long: Option<BString>,
    pub region: Option<BString>,
    pub city: Option<BString>,
    pub isp: Option<BString>,
    pub domain: Option<BString>,
    pub usage_type: Option<BString>,
    pub asn: Option<BString>,
    pub as_name: Option<BString>,
    pub last_seen: Option<BString>,
    pub threat: Option<BString>,
    pub provider: Option<BString>,
    pub fraud_score: Option<BString>,
    #[cfg_attr(feature = "serde", serde(skip))]
    _priv: (),
}

/// Outcome of a textual query.
#[derive(Debug, Clone)]
pub enum Lookup {
    Found(Row),
    /// The text is not a valid address, or no range contains it.
    InvalidAddress,
    /// An IPv6 address was queried, but the database has no ranges for the
    /// table it maps to.
    Ipv6Unsupported,
}

/// An open BIN file.
///
/// Everything is read-only after [`Database::open`], so a database can be
/// queried from many threads at once.
pub struct Database {
    storage: Box<dyn Storage>,
    header: Header,
    layout: Layout,
    columns: Columns,
    index_v4: Option<Index>,
    index_v6: Option<Index>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("header", &self.header)
            .field("columns", &self.columns)
            .field("storage", &self.storage)
            .finish()
    }
}

fn table_extent(header: &Header, family: Family) -> Option<Extent> {
    match (header.table_offset(family), header.rows(family)) {
        (Some(start), rows) if rows > 0 => Some(Extent {
            start,
            len: u64::from(rows) * header.row_size(family),
        }),
        _ => None,
    }
}

fn extents(header: &Header, file_len: u64) -> io::Result<Extents> {
    let ipv4 = table_extent(header, Family::V4);
    let ipv6 = table_extent(header, Family::V6);
    if ipv4.is_none() && ipv6.is_none() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "database has no rows"));
    }

    // Strings follow the last row table.
    let start = ipv4.iter().chain(ipv6.iter()).map(Extent::end).max().unwrap_or(HEADER_LEN as u64);
    let len = file_len.checked_sub(start).ok_or_else(|| {
        io::Error::new(io::ErrorKind::UnexpectedEof, "row tables exceed file size")
    })?;

    Ok(Extents { ipv4, ipv6, strings: Extent { start, len } })
}

fn read_index(raf: &RandomAccessFile, header: &Header, family: Family) -> io::Result<Option<Index>> {
    header.index_offset(family).map(|offset| Index::read(raf, offset)).transpose()
}

impl Database {
    /// Opens a BIN file, reading the header and the bucket indexes.
    ///
    /// Fails with [`io::ErrorKind::InvalidData`] if the file is not a
    /// supported IP2Proxy database.
    pub fn open<P: AsRef<Path>>(path: P, mode: IoMode) -> io::Result<Database> {
        let path = path.as_ref();
        let raf = RandomAccessFile::open(path)?;

        let mut header_buf = [0; HEADER_LEN];
        raf.read_exact_at(0, &mut header_buf)?;
        let header = Header::read(&header_buf[..])?;
        let layout = Layout::new(header.package());

        let extents = extents(&header, fs::metadata(path)?.len())?;
        let index_v4 = read_index(&raf, &header, Family::V4)?;
        let index_v6 = read_index(&raf, &header, Family::V6)?;
        let storage = storage::open(path, mode, extents)?;

        debug!(
            "opened {:?} ({:?}): {:?} released {}, {} ipv4 rows, {} ipv6 rows",
            path,
            mode,
            header.package(),
            header.version(),
            header.rows_ipv4(),
            header.rows_ipv6()
        );

        Ok(Database {
            columns: header.package().columns(),
            layout,
            index_v4,
            index_v6,
            storage,
            header,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Columns supported by this database.
    pub fn columns(&self) -> Columns {
        self.columns
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn mode(&self) -> IoMode {
        self.storage.mode()
    }

    /// Looks up an address, reading only the `query` columns.
    ///
    /// Returns `None` if no range contains the address, or for IPv6
    /// addresses if the database has no IPv6 ranges.
    pub fn query(&self, addr: IpAddr, query: Columns) -> io::Result<Option<Row>> {
        match self.resolve(Canonical::from_ip(addr), query)? {
            Lookup::Found(row) => Ok(Some(row)),
            Lookup::InvalidAddress | Lookup::Ipv6Unsupported => Ok(None),
        }
    }

    /// Looks up an address literal, reading only the `query` columns.
    pub fn lookup(&self, ip: &str, query: Columns) -> io::Result<Lookup> {
        match canonicalize(ip) {
            Ok(addr) => self.resolve(addr, query),
            Err(_) => Ok(Lookup::InvalidAddress),
        }
    }

    fn query_index(&self, family: Family, key: u128) -> Option<RowRange> {
        let index = match family {
            Family::V4 => self.index_v4.as_ref(),
            Family::V6 => self.index_v6.as_ref(),
        };
        index.map(|i| i.get(family, key))
    }

    /// Binary search for the row containing `addr`.
    pub fn resolve(&self, addr: Canonical, query: Columns) -> io::Result<Lookup> {
        let family = addr.family;
        let rows = self.header.rows(family);
        let base_ptr = match self.header.table_offset(family) {
            Some(base_ptr) if rows > 0 => base_ptr,
            _ if addr.original_family == Family::V6 => return Ok(Lookup::Ipv6Unsupported),
            _ => return Ok(Lookup::InvalidAddress),
        };

        let key = addr.search_key();
        let RowRange { mut low_row, mut high_row } = self.query_index(family, key).unwrap_or(RowRange {
            low_row: 0,
            high_row: rows - 1,
        });

        let addr_size = family.addr_size();
        let row_size = self.header.row_size(family);
        let view = self.storage.view()?;

        while low_row <= high_row {
            let mid_row = mid(low_row, high_row);
            let row_ptr = base_ptr + u64::from(mid_row) * row_size;

            let ip_from = view.read_ip(family, row_ptr)?.ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "index points past the end of the row table")
            })?;
            if key < ip_from {
                high_row = match mid_row.checked_sub(1) {
                    Some(row) => row,
                    None => break,
                };
                continue;
            }

            let ip_to = view.read_ip(family, row_ptr + row_size)?;
            if ip_to.is_none() {
                warn!("upper bound of row {} is outside of the {:?} table", mid_row, family);
            }

            if ip_to.map_or(true, |ip_to| key >= ip_to) {
                low_row = match mid_row.checked_add(1) {
                    Some(row) => row,
                    None => break,
                };
            } else {
                trace!("{:?} address {:#x} in row {}", family, addr.magnitude, mid_row);
                let mut buffer = [0; (MAX_COLUMNS as usize - 1) * 4];
                let buf = &mut buffer[..(row_size - addr_size) as usize];
                view.read_row(family, row_ptr + addr_size, buf)?;
                return Ok(Lookup::Found(self.read_row(&*view, buf, query)?));
            }
        }

        Ok(Lookup::InvalidAddress)
    }

    fn read_row(&self, view: &dyn View, buf: &[u8], query: Columns) -> io::Result<Row> {
        let (country_short, country_long) = self.read_country_col(view, buf, query)?;

        Ok(Row {
            proxy_type: self.read_col(view, buf, query, Columns::PROXY_TYPE)?,
            country_short,
            country_long,
            region: self.read_col(view, buf, query, Columns::REGION)?,
            city: self.read_col(view, buf, query, Columns::CITY)?,
            isp: self.read_col(view, buf, query, Columns::ISP)?,
            domain: self.read_col(view, buf, query, Columns::DOMAIN)?,
            usage_type: self.read_col(view, buf, query, Columns::USAGE_TYPE)?,
            asn: self.read_col(view, buf, query, Columns::ASN)?,
            as_name: self.read_col(view, buf, query, Columns::AS_NAME)?,
            last_seen: self.read_col(view, buf, query, Columns::LAST_SEEN)?,
            threat: self.read_col(view, buf, query, Columns::THREAT)?,
            provider: self.read_col(view, buf, query, Columns::PROVIDER)?,
            fraud_score: self.read_col(view, buf, query, Columns::FRAUD_SCORE)?,
            _priv: (),
        })
    }

    fn read_country_col(&self, view: &dyn View, buf: &[u8], query: Columns) -> io::Result<(Option<BString>, Option<BString>)> {
        match self.layout.offset(Columns::COUNTRY_SHORT) {
            Some(offset) if query.intersects(Columns::COUNTRY_SHORT | Columns::COUNTRY_LONG) => {
                // The short code always takes 3 bytes, directly followed by
                // the long name.
                let ptr = u64::from(LE::read_u32(&buf[offset..]));
                let country_short = match query.contains(Columns::COUNTRY_SHORT) {
                    true => view.read_str(ptr)?,
                    false => None,
                };
                let country_long = match query.contains(Columns::COUNTRY_LONG) {
                    true => view.read_str(ptr + 3)?, // ptr <= u32::MAX
                    false => None,
                };
                Ok((country_short, country_long))
            }
            _ => Ok((None, None)),
        }
    }

    fn read_col(&self, view: &dyn View, buf: &[u8], query: Columns, column: Columns) -> io::Result<Option<BString>> {
        match self.layout.offset(column) {
            Some(offset) if query.contains(column) => view.read_str(u64::from(LE::read_u32(&buf[offset..]))),
            _ => Ok(None),
        }
    }
}

fn mid(low_row: u32, high_row: u32) -> u32 {
    ((u64::from(low_row) + u64::from(high_row)) / 2) as u32
}
