//! Canonical form of query addresses.
//!
//! Every query is reduced to a numeric magnitude and the family of the table
//! that has to be searched. IPv6 addresses that merely wrap an IPv4 address
//! (IPv4-mapped, IPv4-compatible, 6to4 and Teredo) are searched in the IPv4
//! table.

use std::error::Error;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Address family, and at the same time the row table to search.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Size of the IP-From column.
    pub fn addr_size(self) -> u64 {
        match self {
            Family::V4 => 4,
            Family::V6 => 16,
        }
    }

    /// Largest representable address.
    pub fn max(self) -> u128 {
        match self {
            Family::V4 => u128::from(u32::MAX),
            Family::V6 => u128::MAX,
        }
    }

    /// Bucket of the index covering `magnitude`, keyed by its top 16 bits.
    pub(crate) fn bucket(self, magnitude: u128) -> usize {
        match self {
            Family::V4 => (magnitude >> 16) as usize & 0xffff,
            Family::V6 => (magnitude >> 112) as usize,
        }
    }
}

const FROM_6TO4: u128   = 0x2002_0000_0000_0000_0000_0000_0000_0000;
const TO_6TO4: u128     = 0x2002_ffff_ffff_ffff_ffff_ffff_ffff_ffff;
const FROM_TEREDO: u128 = 0x2001_0000_0000_0000_0000_0000_0000_0000;
const TO_TEREDO: u128   = 0x2001_0000_ffff_ffff_ffff_ffff_ffff_ffff;
const LAST_32_BITS: u128 = 0xffff_ffff;

/// The input is not an address literal, or it is one of the rejected
/// ambiguous forms.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InvalidAddress;

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid ip address")
    }
}

impl Error for InvalidAddress {}

/// Query address after normalization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Canonical {
    /// Numeric value of the address within `family`.
    pub magnitude: u128,
    /// Table to search.
    pub family: Family,
    /// Family of the address as given, before unwrapping embedded IPv4
    /// addresses.
    pub original_family: Family,
}

impl Canonical {
    pub fn from_ip(addr: IpAddr) -> Canonical {
        match addr {
            IpAddr::V4(addr) => Canonical::from_ipv4(addr),
            IpAddr::V6(addr) => Canonical::from_ipv6(addr),
        }
    }

    pub fn from_ipv4(addr: Ipv4Addr) -> Canonical {
        Canonical {
            magnitude: u128::from(u32::from(addr)),
            family: Family::V4,
            original_family: Family::V4,
        }
    }

    pub fn from_ipv6(addr: Ipv6Addr) -> Canonical {
        let m = u128::from(addr);
        let embedded = if FROM_6TO4 <= m && m <= TO_6TO4 {
            Some((m >> 80) & LAST_32_BITS)
        } else if FROM_TEREDO <= m && m <= TO_TEREDO {
            // Teredo stores the client address with all bits flipped.
            Some(!m & LAST_32_BITS)
        } else if m >> 32 == 0xffff {
            // ::ffff:a.b.c.d
            Some(m & LAST_32_BITS)
        } else if m >> 32 == 0 {
            // ::a.b.c.d, including :: and ::1
            Some(m)
        } else {
            None
        };

        Canonical {
            magnitude: embedded.unwrap_or(m),
            family: if embedded.is_some() { Family::V4 } else { Family::V6 },
            original_family: Family::V6,
        }
    }

    /// Magnitude to search for. The largest address of a family is moved
    /// into the last stored range.
    pub fn search_key(&self) -> u128 {
        if self.magnitude == self.family.max() {
            self.magnitude - 1
        } else {
            self.magnitude
        }
    }
}

/// Parses an address literal.
///
/// Surrounding whitespace is ignored. Host names are not resolved.
///
/// # Example
///
/// ```
/// use ip2proxy::{canonicalize, Family};
///
/// let addr = canonicalize("2002:c000:0204::1").unwrap();
/// assert_eq!(addr.family, Family::V4);
/// assert_eq!(addr.magnitude, 0xc000_0204); // 192.0.2.4
/// assert_eq!(addr.original_family, Family::V6);
/// ```
pub fn canonicalize(text: &str) -> Result<Canonical, InvalidAddress> {
    let text = text.trim();

    if let Some(addr) = parse_dotted_quad(text, true) {
        return Ok(Canonical::from_ipv4(addr));
    }

    if is_legacy_numeric(text) {
        return Err(InvalidAddress);
    }

    parse_ipv6(text)
        .map(|groups| Canonical::from_ipv6(Ipv6Addr::from(groups)))
        .ok_or(InvalidAddress)
}

/// `a.b.c.d` with decimal octets. Octets with leading zeros are only
/// accepted for a standalone IPv4 address, where they are still decimal.
fn parse_dotted_quad(text: &str, allow_leading_zeros: bool) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = text.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if !allow_leading_zeros && part.len() > 1 && part.starts_with('0') {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    match parts.next() {
        Some(_) => None,
        None => Some(Ipv4Addr::from(octets)),
    }
}

/// Pure decimal numbers and the shortened `a.b` and `a.b.c` notations.
fn is_legacy_numeric(text: &str) -> bool {
    let parts = text.split('.').count();
    parts <= 3 && text.split('.').all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    /// Nothing consumed yet.
    Start,
    /// A leading `:` that must start a `::`.
    LeadingColon,
    /// Inside a hexadecimal group.
    Group,
    /// After a `:` that terminated a group.
    Colon,
    /// Right after `::`.
    Gap,
}

/// Expands an IPv6 literal to its eight groups.
///
/// Accepts at most one `::` (standing for one or more zero groups) and a
/// trailing dotted quad in place of the last two groups. Octets of the dotted
/// quad must not have leading zeros.
fn parse_ipv6(text: &str) -> Option<[u16; 8]> {
    let mut groups: Vec<u16> = Vec::with_capacity(8);
    let mut gap: Option<usize> = None;
    let mut state = State::Start;
    let mut group = 0u16;
    let mut group_len = 0;
    let mut group_start = 0;

    for (i, c) in text.char_indices() {
        state = match (state, c) {
            (State::Start, ':') => State::LeadingColon,
            (State::LeadingColon, ':') => {
                gap = Some(0);
                State::Gap
            }
            (State::Colon, ':') if gap.is_none() => {
                gap = Some(groups.len());
                State::Gap
            }
            (State::Group, ':') => {
                groups.push(group);
                State::Colon
            }
            (State::Group, '.') => {
                // The current group was the first octet of an embedded IPv4
                // address, which has to end the literal.
                let addr = parse_dotted_quad(&text[group_start..], false)?;
                let [a, b, c, d] = addr.octets();
                groups.push(u16::from_be_bytes([a, b]));
                groups.push(u16::from_be_bytes([c, d]));
                return expand(groups, gap);
            }
            (State::Group, c) if c.is_ascii_hexdigit() => {
                if group_len == 4 {
                    return None;
                }
                group = (group << 4) | c.to_digit(16)? as u16;
                group_len += 1;
                State::Group
            }
            (State::Start, c) | (State::Colon, c) | (State::Gap, c) if c.is_ascii_hexdigit() => {
                group = c.to_digit(16)? as u16;
                group_len = 1;
                group_start = i;
                State::Group
            }
            _ => return None,
        };

        if groups.len() > 8 {
            return None;
        }
    }

    match state {
        State::Group => groups.push(group),
        State::Gap => (),
        State::Start | State::LeadingColon | State::Colon => return None,
    }

    expand(groups, gap)
}

fn expand(mut groups: Vec<u16>, gap: Option<usize>) -> Option<[u16; 8]> {
    match gap {
        Some(at) if groups.len() < 8 => {
            let zeros = 8 - groups.len();
            groups.splice(at..at, std::iter::repeat(0).take(zeros));
        }
        None if groups.len() == 8 => (),
        _ => return None,
    }

    let mut expanded = [0; 8];
    expanded.copy_from_slice(&groups);
    Some(expanded)
}
