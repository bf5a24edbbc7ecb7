//! Access to the row tables and the string segment of an open BIN file.
//!
//! Both strategies address the file by absolute 0-based offsets and enforce
//! the same bounds, so a query behaves identically no matter which one was
//! selected at open time.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use bstr::BString;
use byteorder::{ByteOrder as _, LE};
use memmap2::{Mmap, MmapOptions};
use positioned_io::{RandomAccessFile, ReadAt};

use crate::address::Family;

/// How an open database reads the file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum IoMode {
    /// Open the file for every query and use positioned reads.
    FileIo,
    /// Map the row tables and the string segment once at open time.
    MemoryMapped,
}

impl Default for IoMode {
    fn default() -> IoMode {
        IoMode::FileIo
    }
}

/// A contiguous part of the file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Extent {
    pub start: u64,
    pub len: u64,
}

impl Extent {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Position of `[pos, pos + n)` relative to the start of the extent, if
    /// it lies completely within.
    pub fn locate(&self, pos: u64, n: u64) -> Option<u64> {
        let local = pos.checked_sub(self.start)?;
        match local.checked_add(n) {
            Some(end) if end <= self.len => Some(local),
            _ => None,
        }
    }
}

/// Where the row tables and the string segment are.
#[derive(Debug, Clone)]
pub struct Extents {
    pub ipv4: Option<Extent>,
    pub ipv6: Option<Extent>,
    pub strings: Extent,
}

impl Extents {
    pub fn table(&self, family: Family) -> Option<Extent> {
        match family {
            Family::V4 => self.ipv4,
            Family::V6 => self.ipv6,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Segment {
    Table(Family),
    Strings,
}

/// Reads of a single query.
///
/// Implementations only provide the data of each segment. Bounds checks and
/// decoding are shared.
pub trait View {
    fn extents(&self) -> &Extents;

    /// Reader for `segment` and the absolute file offset of its position 0.
    fn source(&self, segment: Segment) -> (&dyn ReadAt, u64);

    /// Reads `buf.len()` bytes at absolute `pos`, provided they lie within
    /// `segment`. Returns `false` without reading otherwise.
    fn read_within(&self, segment: Segment, pos: u64, buf: &mut [u8]) -> io::Result<bool> {
        let extent = match segment {
            Segment::Table(family) => self.extents().table(family),
            Segment::Strings => Some(self.extents().strings),
        };
        if extent.and_then(|e| e.locate(pos, buf.len() as u64)).is_none() {
            return Ok(false);
        }
        let (reader, origin) = self.source(segment);
        reader.read_exact_at(pos - origin, buf)?;
        Ok(true)
    }

    /// Reads the IP-From column of the row at absolute `pos`. `None` if the
    /// row is not part of the table.
    fn read_ip(&self, family: Family, pos: u64) -> io::Result<Option<u128>> {
        let mut buf = [0; 16];
        let buf = &mut buf[..family.addr_size() as usize];
        if !self.read_within(Segment::Table(family), pos, buf)? {
            return Ok(None);
        }
        Ok(Some(match family {
            Family::V4 => u128::from(LE::read_u32(buf)),
            Family::V6 => LE::read_u128(buf),
        }))
    }

    /// Reads raw row data at absolute `pos`.
    fn read_row(&self, family: Family, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        if self.read_within(Segment::Table(family), pos, buf)? {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::InvalidData, "row outside of table"))
        }
    }

    /// Reads the length prefixed string at absolute `ptr`. `None` if it does
    /// not fit into the string segment.
    fn read_str(&self, ptr: u64) -> io::Result<Option<BString>> {
        // +-----+-------+-------+-----+
        // | len | buf 0 | buf 1 | ... |
        // +-----+-------+-------+-----+
        let mut len = [0; 1];
        if !self.read_within(Segment::Strings, ptr, &mut len)? {
            return Ok(None);
        }
        let mut buf = vec![0; usize::from(len[0])];
        if !self.read_within(Segment::Strings, ptr + 1, &mut buf)? {
            return Ok(None);
        }
        Ok(Some(buf.into()))
    }
}

fn extent_start(extent: Option<Extent>) -> u64 {
    extent.map_or(0, |e| e.start)
}

/// I/O strategy of an open database.
pub trait Storage: fmt::Debug + Send + Sync {
    fn mode(&self) -> IoMode;

    /// Starts the reads of a single query.
    fn view(&self) -> io::Result<Box<dyn View + '_>>;
}

pub(crate) fn open(path: &Path, mode: IoMode, extents: Extents) -> io::Result<Box<dyn Storage>> {
    Ok(match mode {
        IoMode::FileIo => Box::new(FileStorage { path: path.to_owned(), extents }),
        IoMode::MemoryMapped => Box::new(MmapStorage::open(path, extents)?),
    })
}

/// Opens the file again for every query.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    extents: Extents,
}

struct FileView<'a> {
    raf: RandomAccessFile,
    extents: &'a Extents,
}

impl Storage for FileStorage {
    fn mode(&self) -> IoMode {
        IoMode::FileIo
    }

    fn view(&self) -> io::Result<Box<dyn View + '_>> {
        Ok(Box::new(FileView {
            raf: RandomAccessFile::open(&self.path)?,
            extents: &self.extents,
        }))
    }
}

impl View for FileView<'_> {
    fn extents(&self) -> &Extents {
        self.extents
    }

    fn source(&self, _segment: Segment) -> (&dyn ReadAt, u64) {
        (&self.raf, 0)
    }
}

/// Row tables and string segment mapped into memory.
pub struct MmapStorage {
    ipv4: Option<Mmap>,
    ipv6: Option<Mmap>,
    strings: Option<Mmap>,
    extents: Extents,
}

impl fmt::Debug for MmapStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmapStorage").field("extents", &self.extents).finish()
    }
}

#[allow(unsafe_code)]
fn map(file: &File, extent: Extent) -> io::Result<Option<Mmap>> {
    if extent.len == 0 {
        return Ok(None);
    }
    let len = usize::try_from(extent.len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "segment too large to map"))?;
    // Safety: the mapping is read-only. BIN files are replaced, not modified
    // in place, while a database is open.
    let mmap = unsafe { MmapOptions::new().offset(extent.start).len(len).map(file)? };
    Ok(Some(mmap))
}

impl MmapStorage {
    fn open(path: &Path, extents: Extents) -> io::Result<MmapStorage> {
        let file = File::open(path)?;
        Ok(MmapStorage {
            ipv4: extents.ipv4.map(|e| map(&file, e)).transpose()?.flatten(),
            ipv6: extents.ipv6.map(|e| map(&file, e)).transpose()?.flatten(),
            strings: map(&file, extents.strings)?,
            extents,
        })
    }
}

struct MmapView<'a> {
    ipv4: &'a [u8],
    ipv6: &'a [u8],
    strings: &'a [u8],
    extents: &'a Extents,
}

fn bytes(mmap: &Option<Mmap>) -> &[u8] {
    mmap.as_deref().unwrap_or(&[])
}

impl Storage for MmapStorage {
    fn mode(&self) -> IoMode {
        IoMode::MemoryMapped
    }

    fn view(&self) -> io::Result<Box<dyn View + '_>> {
        Ok(Box::new(MmapView {
            ipv4: bytes(&self.ipv4),
            ipv6: bytes(&self.ipv6),
            strings: bytes(&self.strings),
            extents: &self.extents,
        }))
    }
}

impl View for MmapView<'_> {
    fn extents(&self) -> &Extents {
        self.extents
    }

    fn source(&self, segment: Segment) -> (&dyn ReadAt, u64) {
        match segment {
            Segment::Table(Family::V4) => (&self.ipv4, extent_start(self.extents.ipv4)),
            Segment::Table(Family::V6) => (&self.ipv6, extent_start(self.extents.ipv6)),
            Segment::Strings => (&self.strings, self.extents.strings.start),
        }
    }
}
