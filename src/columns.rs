use std::io;

use bitflags::bitflags;

bitflags! {
    /// Set of supported or selected columns.
    ///
    /// # Example
    ///
    /// ```
    /// use ip2proxy::Columns;
    ///
    /// assert_eq!(Columns::PX2, Columns::PROXY_TYPE | Columns::COUNTRY_SHORT | Columns::COUNTRY_LONG);
    /// ```
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct Columns: u32 {
        /// See [`Row::proxy_type`](struct.Row.html#structfield.proxy_type).
        const PROXY_TYPE    = 1 <<  0;
        /// See [`Row::country_short`](struct.Row.html#structfield.country_short).
        const COUNTRY_SHORT = 1 <<  1;
        /// See [`Row::country_long`](struct.Row.html#structfield.country_long).
        const COUNTRY_LONG  = 1 <<  2;
        /// See [`Row::region`](struct.Row.html#structfield.region).
        const REGION        = 1 <<  3;
        /// See [`Row::city`](struct.Row.html#structfield.city).
        const CITY          = 1 <<  4;
        /// See [`Row::isp`](struct.Row.html#structfield.isp).
        const ISP           = 1 <<  5;
        /// See [`Row::domain`](struct.Row.html#structfield.domain).
        const DOMAIN        = 1 <<  6;
        /// See [`Row::usage_type`](struct.Row.html#structfield.usage_type).
        const USAGE_TYPE    = 1 <<  7;
        /// See [`Row::asn`](struct.Row.html#structfield.asn).
        const ASN           = 1 <<  8;
        /// See [`Row::as_name`](struct.Row.html#structfield.as_name).
        const AS_NAME       = 1 <<  9;
        /// See [`Row::last_seen`](struct.Row.html#structfield.last_seen).
        const LAST_SEEN     = 1 << 10;
        /// See [`Row::threat`](struct.Row.html#structfield.threat).
        const THREAT        = 1 << 11;
        /// See [`Row::provider`](struct.Row.html#structfield.provider).
        const PROVIDER      = 1 << 12;
        /// See [`Row::fraud_score`](struct.Row.html#structfield.fraud_score).
        const FRAUD_SCORE   = 1 << 13;

        /// Alias for columns of PX1: IP-Country Database.
        const PX1 = Columns::COUNTRY_SHORT.bits | Columns::COUNTRY_LONG.bits;
        /// Alias for columns of PX2: IP-ProxyType-Country Database.
        const PX2 = Columns::PROXY_TYPE.bits | Columns::PX1.bits;
        /// Alias for columns of PX3: IP-ProxyType-Country-Region-City Database.
        const PX3 = Columns::PX2.bits | Columns::REGION.bits | Columns::CITY.bits;
        /// Alias for columns of PX4: IP-ProxyType-Country-Region-City-ISP Database.
        const PX4 = Columns::PX3.bits | Columns::ISP.bits;
        /// Alias for columns of PX5: IP-ProxyType-Country-Region-City-ISP-Domain Database.
        const PX5 = Columns::PX4.bits | Columns::DOMAIN.bits;
        /// Alias for columns of PX6: IP-ProxyType-Country-Region-City-ISP-Domain-UsageType
        /// Database.
        const PX6 = Columns::PX5.bits | Columns::USAGE_TYPE.bits;
        /// Alias for columns of PX7: IP-ProxyType-Country-Region-City-ISP-Domain-UsageType-ASN
        /// Database.
        const PX7 = Columns::PX6.bits | Columns::ASN.bits | Columns::AS_NAME.bits;
        /// Alias for columns of PX8:
        /// IP-ProxyType-Country-Region-City-ISP-Domain-UsageType-ASN-LastSeen Database.
        const PX8 = Columns::PX7.bits | Columns::LAST_SEEN.bits;
        /// Alias for columns of PX9:
        /// IP-ProxyType-Country-Region-City-ISP-Domain-UsageType-ASN-LastSeen-Threat Database.
        const PX9 = Columns::PX8.bits | Columns::THREAT.bits;
        /// Alias for columns of PX10:
        /// IP-ProxyType-Country-Region-City-ISP-Domain-UsageType-ASN-LastSeen-Threat-Residential
        /// Database. Same columns as PX9, with residential proxies included in the data.
        const PX10 = Columns::PX9.bits;
        /// Alias for columns of PX11:
        /// IP-ProxyType-Country-Region-City-ISP-Domain-UsageType-ASN-LastSeen-Threat-Residential-Provider
        /// Database.
        const PX11 = Columns::PX10.bits | Columns::PROVIDER.bits;
        /// Alias for columns of PX12: PX11 plus fraud score.
        const PX12 = Columns::PX11.bits | Columns::FRAUD_SCORE.bits;
    }
}

/// Package tier of a BIN file, as stored in the first header byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PackageType {
    PX1 = 1,
    PX2,
    PX3,
    PX4,
    PX5,
    PX6,
    PX7,
    PX8,
    PX9,
    PX10,
    PX11,
    PX12,
}

const PACKAGES: [PackageType; 12] = [
    PackageType::PX1,
    PackageType::PX2,
    PackageType::PX3,
    PackageType::PX4,
    PackageType::PX5,
    PackageType::PX6,
    PackageType::PX7,
    PackageType::PX8,
    PackageType::PX9,
    PackageType::PX10,
    PackageType::PX11,
    PackageType::PX12,
];

impl TryFrom<u8> for PackageType {
    type Error = io::Error;

    fn try_from(px: u8) -> io::Result<PackageType> {
        usize::from(px)
            .checked_sub(1)
            .and_then(|i| PACKAGES.get(i))
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("unsupported package type {}", px)))
    }
}

impl PackageType {
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Columns carried by files of this package.
    pub fn columns(self) -> Columns {
        FIELDS.iter()
            .filter(|(_, positions)| positions[self.index()] != 0)
            .fold(Columns::empty(), |acc, (column, _)| acc | *column)
    }

    /// Number of 4 byte columns a row needs, counting IP-From as the first.
    pub fn min_columns(self) -> u8 {
        FIELDS.iter().map(|(_, positions)| positions[self.index()]).max().unwrap_or(1)
    }
}

const NUM_FIELDS: usize = 14;

// 1-based column of each attribute per package (PX1 .. PX12), 0 if absent.
// Column 1 is always IP-From.
const FIELDS: [(Columns, [u8; 12]); NUM_FIELDS] = [
    (Columns::PROXY_TYPE,    [0, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2]),
    (Columns::COUNTRY_SHORT, [2, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3]),
    (Columns::COUNTRY_LONG,  [2, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3]),
    (Columns::REGION,        [0, 0, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4]),
    (Columns::CITY,          [0, 0, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5]),
    (Columns::ISP,           [0, 0, 0, 6, 6, 6, 6, 6, 6, 6, 6, 6]),
    (Columns::DOMAIN,        [0, 0, 0, 0, 7, 7, 7, 7, 7, 7, 7, 7]),
    (Columns::USAGE_TYPE,    [0, 0, 0, 0, 0, 8, 8, 8, 8, 8, 8, 8]),
    (Columns::ASN,           [0, 0, 0, 0, 0, 0, 9, 9, 9, 9, 9, 9]),
    (Columns::AS_NAME,       [0, 0, 0, 0, 0, 0, 10, 10, 10, 10, 10, 10]),
    (Columns::LAST_SEEN,     [0, 0, 0, 0, 0, 0, 0, 11, 11, 11, 11, 11]),
    (Columns::THREAT,        [0, 0, 0, 0, 0, 0, 0, 0, 12, 12, 12, 12]),
    (Columns::PROVIDER,      [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 13, 13]),
    (Columns::FRAUD_SCORE,   [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 14]),
];

/// Byte offsets of each attribute pointer, relative to the end of the IP-From
/// column of a row.
#[derive(Debug, Clone)]
pub struct Layout {
    package: PackageType,
    offsets: [Option<usize>; NUM_FIELDS],
}

impl Layout {
    pub fn new(package: PackageType) -> Layout {
        let mut offsets = [None; NUM_FIELDS];
        for (slot, (_, positions)) in offsets.iter_mut().zip(FIELDS.iter()) {
            let position = positions[package.index()];
            if position != 0 {
                *slot = Some((usize::from(position) - 2) * 4);
            }
        }
        Layout { package, offsets }
    }

    pub fn package(&self) -> PackageType {
        self.package
    }

    /// Offset of the pointer for a single `column`, or `None` if the package
    /// does not carry it.
    pub fn offset(&self, column: Columns) -> Option<usize> {
        FIELDS.iter()
            .position(|(c, _)| *c == column)
            .and_then(|i| self.offsets[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_columns() {
        assert_eq!(PackageType::PX1.columns(), Columns::PX1);
        assert_eq!(PackageType::PX4.columns(), Columns::PX4);
        assert_eq!(PackageType::PX8.columns(), Columns::PX8);
        assert_eq!(PackageType::PX10.columns(), Columns::PX9);
        assert_eq!(PackageType::PX12.columns(), Columns::all());
    }

    #[test]
    fn test_min_columns() {
        assert_eq!(PackageType::PX1.min_columns(), 2);
        assert_eq!(PackageType::PX2.min_columns(), 3);
        assert_eq!(PackageType::PX3.min_columns(), 5);
        assert_eq!(PackageType::PX11.min_columns(), 13);
        assert_eq!(PackageType::PX12.min_columns(), 14);
    }

    #[test]
    fn test_try_from() {
        assert_eq!(PackageType::try_from(1).unwrap(), PackageType::PX1);
        assert_eq!(PackageType::try_from(12).unwrap(), PackageType::PX12);
        assert!(PackageType::try_from(0).is_err());
        assert!(PackageType::try_from(13).is_err());
    }

    #[test]
    fn test_layout() {
        let px1 = Layout::new(PackageType::PX1);
        assert_eq!(px1.offset(Columns::COUNTRY_SHORT), Some(0));
        assert_eq!(px1.offset(Columns::COUNTRY_LONG), Some(0));
        assert_eq!(px1.offset(Columns::PROXY_TYPE), None);

        let px11 = Layout::new(PackageType::PX11);
        assert_eq!(px11.offset(Columns::PROXY_TYPE), Some(0));
        assert_eq!(px11.offset(Columns::COUNTRY_SHORT), Some(4));
        assert_eq!(px11.offset(Columns::ISP), Some(16));
        assert_eq!(px11.offset(Columns::PROVIDER), Some(44));
        assert_eq!(px11.offset(Columns::FRAUD_SCORE), None);

        // Not a single column.
        assert_eq!(px11.offset(Columns::PX2), None);
    }
}
