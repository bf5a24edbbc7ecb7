//! Client for the hosted IP2Proxy web service.
//!
//! Independent of the BIN file reader. Requires the `webservice` feature.

use std::io;

use log::debug;
use reqwest::Url;
use serde_json::{Map, Value};

const HOST: &str = "api.ip2proxy.com";

pub mod http {
    use std::io;

    use reqwest::header::ACCEPT;

    fn other<E>(err: E) -> io::Error
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        io::Error::new(io::ErrorKind::Other, err)
    }

    /// Blocking GET of `url`, returning the body. Fails if the status is not
    /// 2xx.
    pub fn get(url: &str) -> io::Result<String> {
        reqwest::blocking::Client::new()
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(other)?
            .error_for_status()
            .map_err(other)?
            .text()
            .map_err(other)
    }
}

/// Validated credentials for the web service.
#[derive(Debug, Clone)]
pub struct WebService {
    api_key: String,
    package: String,
    use_ssl: bool,
}

fn is_api_key(key: &str) -> bool {
    key.len() == 10 && key.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

fn is_package(package: &str) -> bool {
    match package.strip_prefix("PX") {
        Some(num) => !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn invalid_input(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

impl WebService {
    /// Fails with [`io::ErrorKind::InvalidInput`] unless `api_key` consists
    /// of 10 digits or uppercase letters and `package` is of the form `PX1`,
    /// `PX2`, ...
    pub fn open(api_key: &str, package: &str, use_ssl: bool) -> io::Result<WebService> {
        if !is_api_key(api_key) {
            return Err(invalid_input("Invalid API key."));
        }
        if !is_package(package) {
            return Err(invalid_input("Invalid package name."));
        }
        Ok(WebService {
            api_key: api_key.to_owned(),
            package: package.to_owned(),
            use_ssl,
        })
    }

    fn url(&self, params: &[(&str, &str)]) -> io::Result<Url> {
        let scheme = if self.use_ssl { "https" } else { "http" };
        Url::parse_with_params(&format!("{}://{}/", scheme, HOST), params)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
    }

    pub fn ip_query_url(&self, ip: &str) -> io::Result<Url> {
        self.url(&[("key", self.api_key.as_str()), ("package", self.package.as_str()), ("ip", ip)])
    }

    pub fn credit_url(&self) -> io::Result<Url> {
        self.url(&[("key", self.api_key.as_str()), ("check", "true")])
    }

    /// Queries the attributes of `ip`.
    pub fn ip_query(&self, ip: &str) -> io::Result<Map<String, Value>> {
        fetch_object(self.ip_query_url(ip)?)
    }

    /// Queries the remaining credit of the API key.
    pub fn credit(&self) -> io::Result<Map<String, Value>> {
        fetch_object(self.credit_url()?)
    }
}

fn fetch_object(url: Url) -> io::Result<Map<String, Value>> {
    debug!("requesting {}://{}{}", url.scheme(), HOST, url.path());
    let body = http::get(url.as_str())?;
    match serde_json::from_str::<Value>(&body)? {
        Value::Object(map) => Ok(map),
        _ => Err(io::Error::new(io::ErrorKind::InvalidData, "expected json object")),
    }
}
