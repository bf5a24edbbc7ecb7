use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use ip2proxy::{Columns, Ip2Proxy, IoMode, ProxyResult};

#[derive(Parser)]
#[command(name = "ip2proxy")]
#[command(about = "Look up proxy, VPN and hosting ranges in an IP2Proxy BIN file", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the BIN file
    #[arg(long, env = "IP2PROXY_DB", value_name = "FILE")]
    db: PathBuf,

    /// Map the file into memory instead of reading it per query
    #[arg(long)]
    mmap: bool,

    /// Only print these fields (default: all)
    #[arg(short, long, value_enum)]
    field: Vec<Field>,

    /// Addresses to look up
    #[arg(value_name = "IP", required = true)]
    ips: Vec<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Field {
    IsProxy,
    ProxyType,
    CountryShort,
    CountryLong,
    Region,
    City,
    Isp,
    Domain,
    UsageType,
    Asn,
    AsName,
    LastSeen,
    Threat,
    Provider,
    FraudScore,
}

impl Field {
    const ALL: [Field; 15] = [
        Field::IsProxy,
        Field::ProxyType,
        Field::CountryShort,
        Field::CountryLong,
        Field::Region,
        Field::City,
        Field::Isp,
        Field::Domain,
        Field::UsageType,
        Field::Asn,
        Field::AsName,
        Field::LastSeen,
        Field::Threat,
        Field::Provider,
        Field::FraudScore,
    ];

    fn columns(self) -> Columns {
        match self {
            Field::IsProxy => Columns::PROXY_TYPE | Columns::COUNTRY_SHORT,
            Field::ProxyType => Columns::PROXY_TYPE,
            Field::CountryShort => Columns::COUNTRY_SHORT,
            Field::CountryLong => Columns::COUNTRY_LONG,
            Field::Region => Columns::REGION,
            Field::City => Columns::CITY,
            Field::Isp => Columns::ISP,
            Field::Domain => Columns::DOMAIN,
            Field::UsageType => Columns::USAGE_TYPE,
            Field::Asn => Columns::ASN,
            Field::AsName => Columns::AS_NAME,
            Field::LastSeen => Columns::LAST_SEEN,
            Field::Threat => Columns::THREAT,
            Field::Provider => Columns::PROVIDER,
            Field::FraudScore => Columns::FRAUD_SCORE,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Field::IsProxy => "is_proxy",
            Field::ProxyType => "proxy_type",
            Field::CountryShort => "country_short",
            Field::CountryLong => "country_long",
            Field::Region => "region",
            Field::City => "city",
            Field::Isp => "isp",
            Field::Domain => "domain",
            Field::UsageType => "usage_type",
            Field::Asn => "asn",
            Field::AsName => "as_name",
            Field::LastSeen => "last_seen",
            Field::Threat => "threat",
            Field::Provider => "provider",
            Field::FraudScore => "fraud_score",
        }
    }

    fn value(self, result: &ProxyResult) -> Option<String> {
        match self {
            Field::IsProxy => Some(result.is_proxy.to_string()),
            Field::ProxyType => result.proxy_type.clone(),
            Field::CountryShort => result.country_short.clone(),
            Field::CountryLong => result.country_long.clone(),
            Field::Region => result.region.clone(),
            Field::City => result.city.clone(),
            Field::Isp => result.isp.clone(),
            Field::Domain => result.domain.clone(),
            Field::UsageType => result.usage_type.clone(),
            Field::Asn => result.asn.clone(),
            Field::AsName => result.as_name.clone(),
            Field::LastSeen => result.last_seen.clone(),
            Field::Threat => result.threat.clone(),
            Field::Provider => result.provider.clone(),
            Field::FraudScore => result.fraud_score.clone(),
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let fields = if cli.field.is_empty() { &Field::ALL[..] } else { &cli.field[..] };
    let query = fields.iter().fold(Columns::empty(), |acc, f| acc | f.columns());
    let mode = if cli.mmap { IoMode::MemoryMapped } else { IoMode::FileIo };

    let mut proxy = Ip2Proxy::new();
    if let Err(err) = proxy.open(&cli.db, mode) {
        eprintln!("error: {}: {}", cli.db.display(), err);
        process::exit(1);
    }

    println!("module_version: {}", Ip2Proxy::module_version());
    println!("package_version: {}", proxy.package_version());
    println!("database_version: {}", proxy.database_version());

    for ip in &cli.ips {
        let result = match proxy.query(ip, query) {
            Ok(result) => result,
            Err(err) => {
                eprintln!("error: {}: {}", ip, err);
                process::exit(1);
            }
        };
        println!();
        println!("ip: {}", ip);
        for &field in fields {
            println!("{}: {}", field.name(), field.value(&result).unwrap_or_default());
        }
    }

    proxy.close();
}
