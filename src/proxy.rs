use std::io;
use std::path::Path;

use bstr::BString;
use log::debug;

use crate::address::canonicalize;
use crate::columns::Columns;
use crate::database::{Database, Lookup, Row};
use crate::storage::IoMode;

/// Value of columns the database does not carry.
pub const MSG_NOT_SUPPORTED: &str = "NOT SUPPORTED";
/// Value of all columns if the address is invalid or not covered.
pub const MSG_INVALID_IP: &str = "INVALID IP ADDRESS";
/// Value of all columns if no database is open.
pub const MSG_MISSING_FILE: &str = "MISSING FILE";
/// Value of all columns if an IPv6 address is queried in an IPv4 database.
pub const MSG_IPV6_UNSUPPORTED: &str = "IPV6 ADDRESS MISSING IN IPV4 BIN";

/// Proxy classification derived from the country and the proxy type.
///
/// * `0`: not a proxy (either value is `-`)
/// * `1`: proxy
/// * `2`: data center, hosting or search engine range (`DCH`, `SES`)
///
/// # Example
///
/// ```
/// use ip2proxy::proxy_class;
///
/// assert_eq!(proxy_class(Some("-"), Some("DCH")), 0);
/// assert_eq!(proxy_class(Some("US"), Some("SES")), 2);
/// assert_eq!(proxy_class(Some("US"), Some("VPN")), 1);
/// ```
pub fn proxy_class(country_short: Option<&str>, proxy_type: Option<&str>) -> i32 {
    if country_short == Some("-") || proxy_type == Some("-") {
        0
    } else if proxy_type == Some("DCH") || proxy_type == Some("SES") {
        2
    } else {
        1
    }
}

/// Answer to a query.
///
/// Columns that were not requested are `None`. Requested columns the
/// database does not carry are [`MSG_NOT_SUPPORTED`]. If the query failed as
/// a whole, every column holds the reason and `is_proxy` is `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProxyResult {
    pub is_proxy: i32,
    pub proxy_type: Option<String>,
    pub country_short: Option<String>,
    pub country_long: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub domain: Option<String>,
    pub usage_type: Option<String>,
    pub asn: Option<String>,
    pub as_name: Option<String>,
    pub last_seen: Option<String>,
    pub threat: Option<String>,
    pub provider: Option<String>,
    pub fraud_score: Option<String>,
}

impl ProxyResult {
    fn failed(msg: &str) -> ProxyResult {
        let msg = Some(msg.to_owned());
        ProxyResult {
            is_proxy: -1,
            proxy_type: msg.clone(),
            country_short: msg.clone(),
            country_long: msg.clone(),
            region: msg.clone(),
            city: msg.clone(),
            isp: msg.clone(),
            domain: msg.clone(),
            usage_type: msg.clone(),
            asn: msg.clone(),
            as_name: msg.clone(),
            last_seen: msg.clone(),
            threat: msg.clone(),
            provider: msg.clone(),
            fraud_score: msg,
        }
    }

    fn from_row(row: Row, supported: Columns, query: Columns) -> ProxyResult {
        let col = |column: Columns, value: Option<BString>| {
            if !query.contains(column) {
                None
            } else if !supported.contains(column) {
                Some(MSG_NOT_SUPPORTED.to_owned())
            } else {
                value.map(|v| v.to_string())
            }
        };

        let proxy_type = col(Columns::PROXY_TYPE, row.proxy_type);
        let country_short = col(Columns::COUNTRY_SHORT, row.country_short);

        ProxyResult {
            is_proxy: proxy_class(country_short.as_deref(), proxy_type.as_deref()),
            proxy_type,
            country_short,
            country_long: col(Columns::COUNTRY_LONG, row.country_long),
            region: col(Columns::REGION, row.region),
            city: col(Columns::CITY, row.city),
            isp: col(Columns::ISP, row.isp),
            domain: col(Columns::DOMAIN, row.domain),
            usage_type: col(Columns::USAGE_TYPE, row.usage_type),
            asn: col(Columns::ASN, row.asn),
            as_name: col(Columns::AS_NAME, row.as_name),
            last_seen: col(Columns::LAST_SEEN, row.last_seen),
            threat: col(Columns::THREAT, row.threat),
            provider: col(Columns::PROVIDER, row.provider),
            fraud_score: col(Columns::FRAUD_SCORE, row.fraud_score),
        }
    }
}

/// Database handle with an explicit open/close lifecycle.
///
/// Queries never fail because of bad input or a missing database. Those
/// outcomes are reported in the returned [`ProxyResult`]. Only I/O errors
/// while reading an open database are returned as `Err`.
///
/// # Example
///
/// ```no_run
/// use ip2proxy::{Ip2Proxy, IoMode};
///
/// let mut proxy = Ip2Proxy::new();
/// proxy.open("IP2PROXY-LITE-PX1.BIN", IoMode::MemoryMapped)?;
/// let result = proxy.get_all("1.2.3.4")?;
/// println!("{:?} {}", result.country_short, result.is_proxy);
/// proxy.close();
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Ip2Proxy {
    database: Option<Database>,
}

impl Ip2Proxy {
    pub fn new() -> Ip2Proxy {
        Ip2Proxy::default()
    }

    /// Opens the BIN file at `path`. Does nothing if a database is already
    /// open.
    pub fn open<P: AsRef<Path>>(&mut self, path: P, mode: IoMode) -> io::Result<()> {
        if self.database.is_some() {
            debug!("database already open, ignoring {:?}", path.as_ref());
            return Ok(());
        }
        self.database = Some(Database::open(path, mode)?);
        Ok(())
    }

    /// Releases the open database, if any. Another file can be opened
    /// afterwards.
    pub fn close(&mut self) {
        if self.database.take().is_some() {
            debug!("database closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.database.is_some()
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Version of this library.
    pub fn module_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Package type of the open database, `0` if none is open.
    pub fn package_version(&self) -> String {
        self.database.as_ref().map_or(0, |db| db.header().px()).to_string()
    }

    /// Release date of the open database as `20YY.M.D`, empty if none is
    /// open.
    pub fn database_version(&self) -> String {
        self.database.as_ref().map(|db| db.header().version()).unwrap_or_default()
    }

    /// Looks up `ip`, reading only the `query` columns.
    pub fn query(&self, ip: &str, query: Columns) -> io::Result<ProxyResult> {
        let addr = match canonicalize(ip) {
            Ok(addr) => addr,
            Err(_) => return Ok(ProxyResult::failed(MSG_INVALID_IP)),
        };

        let database = match self.database {
            Some(ref database) => database,
            None => return Ok(ProxyResult::failed(MSG_MISSING_FILE)),
        };

        Ok(match database.resolve(addr, query)? {
            Lookup::Found(row) => ProxyResult::from_row(row, database.columns(), query),
            Lookup::InvalidAddress => ProxyResult::failed(MSG_INVALID_IP),
            Lookup::Ipv6Unsupported => ProxyResult::failed(MSG_IPV6_UNSUPPORTED),
        })
    }

    /// Looks up all columns of `ip`.
    pub fn get_all(&self, ip: &str) -> io::Result<ProxyResult> {
        self.query(ip, Columns::all())
    }

    /// `-1` on error, otherwise see [`proxy_class`].
    pub fn is_proxy(&self, ip: &str) -> io::Result<i32> {
        Ok(self.query(ip, Columns::PROXY_TYPE | Columns::COUNTRY_SHORT)?.is_proxy)
    }

    pub fn proxy_type(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::PROXY_TYPE)?.proxy_type)
    }

    /// ISO 3166 country code.
    pub fn country_short(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::COUNTRY_SHORT)?.country_short)
    }

    pub fn country_long(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::COUNTRY_LONG)?.country_long)
    }

    pub fn region(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::REGION)?.region)
    }

    pub fn city(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::CITY)?.city)
    }

    pub fn isp(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::ISP)?.isp)
    }

    pub fn domain(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::DOMAIN)?.domain)
    }

    pub fn usage_type(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::USAGE_TYPE)?.usage_type)
    }

    /// Autonomous system number.
    pub fn asn(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::ASN)?.asn)
    }

    /// Autonomous system name.
    pub fn as_name(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::AS_NAME)?.as_name)
    }

    /// Days since the proxy was last seen.
    pub fn last_seen(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::LAST_SEEN)?.last_seen)
    }

    pub fn threat(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::THREAT)?.threat)
    }

    pub fn provider(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::PROVIDER)?.provider)
    }

    pub fn fraud_score(&self, ip: &str) -> io::Result<Option<String>> {
        Ok(self.query(ip, Columns::FRAUD_SCORE)?.fraud_score)
    }
}
