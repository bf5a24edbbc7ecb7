use std::io;
use std::io::Read;

use byteorder::{ReadBytesExt as _, LE};

use crate::address::Family;
use crate::columns::PackageType;

pub(crate) const HEADER_LEN: usize = 64;

pub(crate) const MAX_COLUMNS: u8 = 14;

/// Product code of IP2Proxy files. Only set by files released since 2021.
const PRODUCT_CODE: u8 = 2;

/// Parsed BIN file header.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Header {
    package: PackageType,
    num_columns: u8,
    year: u8,
    month: u8,
    day: u8,
    rows_v4: u32,
    base_ptr_v4: u32,
    rows_v6: u32,
    base_ptr_v6: u32,
    index_ptr_v4: u32,
    index_ptr_v6: u32,
    product_code: u8,
    product_type: u8,
    file_size: u32,
}

fn corrupt() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        "Incorrect IP2Proxy BIN file format. Please make sure that you are using the latest IP2Proxy BIN file.",
    )
}

impl Header {
    pub(crate) fn read<R: Read>(mut reader: R) -> io::Result<Header> {
        let px = reader.read_u8()?;
        let num_columns = reader.read_u8()?;
        let year = reader.read_u8()?;
        let month = reader.read_u8()?;
        let day = reader.read_u8()?;
        let rows_v4 = reader.read_u32::<LE>()?;
        let base_ptr_v4 = reader.read_u32::<LE>()?;
        let rows_v6 = reader.read_u32::<LE>()?;
        let base_ptr_v6 = reader.read_u32::<LE>()?;
        let index_ptr_v4 = reader.read_u32::<LE>()?;
        let index_ptr_v6 = reader.read_u32::<LE>()?;
        let product_code = reader.read_u8()?;
        let product_type = reader.read_u8()?;
        let file_size = reader.read_u32::<LE>()?;

        // "PK" is the signature of a zip archive that was not unpacked.
        if (product_code != PRODUCT_CODE && year >= 21) || (px == b'P' && num_columns == b'K') {
            return Err(corrupt());
        }

        let package = PackageType::try_from(px)?;
        if num_columns < package.min_columns() || MAX_COLUMNS < num_columns {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid number of columns"));
        }

        Ok(Header {
            package,
            num_columns,
            year,
            month,
            day,
            rows_v4,
            base_ptr_v4,
            rows_v6,
            base_ptr_v6,
            index_ptr_v4,
            index_ptr_v6,
            product_code,
            product_type,
            file_size,
        })
    }

    pub fn package(&self) -> PackageType {
        self.package
    }

    pub fn px(&self) -> u8 {
        self.package as u8
    }

    pub fn num_columns(&self) -> u8 {
        self.num_columns
    }

    pub fn year(&self) -> u8 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn rows_ipv4(&self) -> u32 {
        self.rows_v4
    }

    pub fn rows_ipv6(&self) -> u32 {
        self.rows_v6
    }

    pub fn product_code(&self) -> u8 {
        self.product_code
    }

    pub fn product_type(&self) -> u8 {
        self.product_type
    }

    /// File size as recorded by the producer. Not checked against the actual
    /// file.
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    /// Release date formatted as `20YY.M.D`, or empty if the file does not
    /// carry one.
    pub fn version(&self) -> String {
        if self.year == 0 {
            String::new()
        } else {
            format!("20{}.{}.{}", self.year, self.month, self.day)
        }
    }

    pub(crate) fn rows(&self, family: Family) -> u32 {
        match family {
            Family::V4 => self.rows_v4,
            Family::V6 => self.rows_v6,
        }
    }

    /// 0-based file offset of the first row of the `family` table, if present.
    pub(crate) fn table_offset(&self, family: Family) -> Option<u64> {
        let base_ptr = match family {
            Family::V4 => self.base_ptr_v4,
            Family::V6 => self.base_ptr_v6,
        };
        match base_ptr {
            0 => None,
            ptr => Some(u64::from(ptr) - 1),
        }
    }

    /// 0-based file offset of the `family` bucket index, if present.
    pub(crate) fn index_offset(&self, family: Family) -> Option<u64> {
        let index_ptr = match family {
            Family::V4 => self.index_ptr_v4,
            Family::V6 => self.index_ptr_v6,
        };
        match index_ptr {
            0 => None,
            ptr => Some(u64::from(ptr) - 1),
        }
    }

    /// Size of a row in the `family` table.
    pub(crate) fn row_size(&self, family: Family) -> u64 {
        family.addr_size() + (u64::from(self.num_columns) - 1) * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(px: u8, num_columns: u8, year: u8, product_code: u8) -> [u8; HEADER_LEN] {
        let mut buf = [0; HEADER_LEN];
        buf[0] = px;
        buf[1] = num_columns;
        buf[2] = year;
        buf[3] = 6;
        buf[4] = 1;
        buf[5..9].copy_from_slice(&150u32.to_le_bytes());
        buf[9..13].copy_from_slice(&1_048_641u32.to_le_bytes());
        buf[21..25].copy_from_slice(&65u32.to_le_bytes());
        buf[29] = product_code;
        buf
    }

    #[test]
    fn test_read() {
        let header = Header::read(&header_bytes(4, 6, 24, 2)[..]).unwrap();
        assert_eq!(header.package(), PackageType::PX4);
        assert_eq!(header.px(), 4);
        assert_eq!(header.rows_ipv4(), 150);
        assert_eq!(header.rows_ipv6(), 0);
        assert_eq!(header.version(), "2024.6.1");
        assert_eq!(header.row_size(Family::V4), 24);
        assert_eq!(header.row_size(Family::V6), 36);
        assert_eq!(header.table_offset(Family::V4), Some(1_048_640));
        assert_eq!(header.table_offset(Family::V6), None);
        assert_eq!(header.index_offset(Family::V4), Some(64));
        assert_eq!(header.index_offset(Family::V6), None);
    }

    #[test]
    fn test_legacy_product_code() {
        // Files from before 2021 did not set the product code.
        assert!(Header::read(&header_bytes(4, 6, 20, 0)[..]).is_ok());
        assert!(Header::read(&header_bytes(4, 6, 21, 0)[..]).is_err());
    }

    #[test]
    fn test_zip_signature() {
        let err = Header::read(&header_bytes(b'P', b'K', 3, 4)[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_invalid_columns() {
        assert!(Header::read(&header_bytes(4, 5, 24, 2)[..]).is_err());
        assert!(Header::read(&header_bytes(4, 15, 24, 2)[..]).is_err());
        assert!(Header::read(&header_bytes(13, 14, 24, 2)[..]).is_err());
    }
}
