//! Offline lookup of proxy, VPN and hosting ranges in IP2Proxy BIN files.
//!
//! [`Ip2Proxy`] is the high level handle. It reports invalid input and a
//! missing database as sentinel values in the result, the same way for every
//! column. [`Database`] is the underlying reader with a plain `io::Result`
//! API.
//!
//! # Example
//!
//! ```no_run
//! use ip2proxy::{Columns, Database, IoMode};
//!
//! let db = Database::open("IP2PROXY-IP-PROXYTYPE-COUNTRY.BIN", IoMode::FileIo)?;
//! let row = db.query("1.2.3.4".parse().unwrap(), Columns::all())?;
//! # Ok::<(), std::io::Error>(())
//! ```

#![doc(html_root_url = "https://docs.rs/ip2proxy-lookup/1.1.0")]
#![deny(unsafe_code)]

mod address;
mod columns;
mod database;
mod header;
mod index;
mod proxy;
mod storage;

#[cfg(feature = "webservice")]
pub mod webservice;

pub use address::{canonicalize, Canonical, Family, InvalidAddress};
pub use columns::{Columns, Layout, PackageType};
pub use database::{Database, Lookup, Row};
pub use header::Header;
pub use index::RowRange;
pub use proxy::{
    proxy_class, Ip2Proxy, ProxyResult, MSG_INVALID_IP, MSG_IPV6_UNSUPPORTED, MSG_MISSING_FILE,
    MSG_NOT_SUPPORTED,
};
pub use storage::IoMode;
