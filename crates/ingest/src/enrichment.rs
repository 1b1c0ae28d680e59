//! GeoIP enrichment of flow records.
//!
//! Looks up the city and the autonomous system of both flow endpoints in
//! MaxMind databases. An address the database does not cover (private
//! ranges, mostly) yields empty fields for that side only. The first failed
//! lookup ends enrichment of that record; fields filled before the failure
//! are kept.

use crate::transform::ip_from_bytes;
use flow_core::{Error, FlowMessage, FlowRecord, Location, Result};
use maxminddb::{geoip2, MaxMindDBError, Reader};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub geoip_enabled: bool,
    /// GeoLite2/GeoIP2 City database
    pub city_db: PathBuf,
    /// GeoLite2/GeoIP2 ASN database
    pub asn_db: PathBuf,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            geoip_enabled: false,
            city_db: PathBuf::from("data/GeoLite2-City.mmdb"),
            asn_db: PathBuf::from("data/GeoLite2-ASN.mmdb"),
        }
    }
}

/// City lookup result with English names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CityInfo {
    pub location: Location,
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsnInfo {
    pub number: u32,
    pub organization: String,
}

/// Read-only address metadata database.
pub trait GeoLookup: Send + Sync {
    fn city(&self, ip: IpAddr) -> Result<CityInfo>;
    fn asn(&self, ip: IpAddr) -> Result<AsnInfo>;
}

/// [`GeoLookup`] over MaxMind City and ASN databases loaded into memory.
pub struct MaxMindLookup {
    city: Reader<Vec<u8>>,
    asn: Reader<Vec<u8>>,
}

impl MaxMindLookup {
    pub fn open(city_db: impl AsRef<Path>, asn_db: impl AsRef<Path>) -> Result<Self> {
        let city = open_reader(city_db.as_ref())?;
        let asn = open_reader(asn_db.as_ref())?;
        Ok(Self { city, asn })
    }
}

fn open_reader(path: &Path) -> Result<Reader<Vec<u8>>> {
    let reader = Reader::open_readfile(path).map_err(|e| {
        Error::enrichment(format!("Failed to open {}: {}", path.display(), e))
    })?;

    info!(
        path = %path.display(),
        database = %reader.metadata.database_type,
        "Opened GeoIP database"
    );
    Ok(reader)
}

fn english(names: Option<std::collections::BTreeMap<&str, &str>>) -> String {
    names
        .and_then(|names| names.get("en").map(|name| name.to_string()))
        .unwrap_or_default()
}

/// `None` when the address is not in the database.
fn found<T>(
    result: std::result::Result<T, MaxMindDBError>,
    what: &str,
    ip: IpAddr,
) -> Result<Option<T>> {
    match result {
        Ok(record) => Ok(Some(record)),
        Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
        Err(e) => Err(Error::enrichment(format!("{} lookup for {}: {}", what, ip, e))),
    }
}

impl GeoLookup for MaxMindLookup {
    fn city(&self, ip: IpAddr) -> Result<CityInfo> {
        let Some(record) = found(self.city.lookup::<geoip2::City>(ip), "city", ip)? else {
            return Ok(CityInfo::default());
        };

        let location = record
            .location
            .map(|l| Location {
                lat: l.latitude.unwrap_or_default(),
                lon: l.longitude.unwrap_or_default(),
            })
            .unwrap_or_default();

        Ok(CityInfo {
            location,
            city: english(record.city.and_then(|c| c.names)),
            country: english(record.country.and_then(|c| c.names)),
        })
    }

    fn asn(&self, ip: IpAddr) -> Result<AsnInfo> {
        let Some(record) = found(self.asn.lookup::<geoip2::Asn>(ip), "ASN", ip)? else {
            return Ok(AsnInfo::default());
        };

        Ok(AsnInfo {
            number: record.autonomous_system_number.unwrap_or_default(),
            organization: record
                .autonomous_system_organization
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Fills the location and AS fields of a record.
#[derive(Clone)]
pub struct GeoEnricher {
    lookup: Arc<dyn GeoLookup>,
}

impl GeoEnricher {
    pub fn new(lookup: Arc<dyn GeoLookup>) -> Self {
        Self { lookup }
    }

    /// Opens the MaxMind databases when GeoIP is enabled.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Option<Self>> {
        if !config.geoip_enabled {
            return Ok(None);
        }
        let lookup = MaxMindLookup::open(&config.city_db, &config.asn_db)?;
        Ok(Some(Self::new(Arc::new(lookup))))
    }

    pub fn enrich(&self, msg: &FlowMessage, record: &mut FlowRecord) -> Result<()> {
        let src = endpoint(&msg.src_addr, "source")?;
        let dst = endpoint(&msg.dst_addr, "destination")?;

        let src_city = self.lookup.city(src)?;
        let dst_city = self.lookup.city(dst)?;

        record.src_location = src_city.location;
        record.dst_location = dst_city.location;
        record.src_country = src_city.country;
        record.dst_country = dst_city.country;
        record.src_city = src_city.city;
        record.dst_city = dst_city.city;

        let src_as = self.lookup.asn(src)?;
        record.src_as = src_as.number;
        record.src_org = src_as.organization;

        let dst_as = self.lookup.asn(dst)?;
        record.dst_as = dst_as.number;
        record.dst_org = dst_as.organization;

        Ok(())
    }
}

fn endpoint(raw: &[u8], side: &str) -> Result<IpAddr> {
    ip_from_bytes(raw)
        .ok_or_else(|| Error::enrichment(format!("{} address is not an IP ({} bytes)", side, raw.len())))
}
