//! GeoIP lookup service using MaxMind GeoLite2/GeoIP2 MMDB
//!
//! This module provides thread-safe, high-performance IP geolocation
//! using memory-mapped MaxMind databases.

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::models::GeoLocation;

/// Resolves a client IP string to a location.
///
/// Total: a miss or an unparseable IP is `None`, never an error.
pub trait GeoResolver: Send + Sync {
    fn resolve(&self, ip: &str) -> Option<GeoLocation>;
}

/// GeoIP lookup service that supports both City and ASN databases
#[derive(Clone)]
pub struct GeoIpService {
    city_reader: Option<Arc<Reader<Mmap>>>,
    asn_reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoIpService {
    /// Create a new GeoIP service from MMDB file paths
    ///
    /// # Arguments
    /// * `city_path` - Optional path to the MaxMind GeoLite2-City or GeoIP2-City .mmdb file
    /// * `asn_path` - Optional path to the MaxMind GeoLite2-ASN .mmdb file
    pub fn new(city_path: Option<&str>, asn_path: Option<&str>) -> Result<Self> {
        let city_reader = if let Some(path) = city_path {
            let reader = unsafe { Reader::open_mmap(path) }
                .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
            Some(Arc::new(reader))
        } else {
            None
        };

        let asn_reader = if let Some(path) = asn_path {
            let reader = unsafe { Reader::open_mmap(path) }
                .with_context(|| format!("Failed to open GeoIP ASN database at {}", path))?;
            Some(Arc::new(reader))
        } else {
            None
        };

        Ok(Self {
            city_reader,
            asn_reader,
        })
    }

    /// True when at least one database is loaded
    pub fn has_databases(&self) -> bool {
        self.city_reader.is_some() || self.asn_reader.is_some()
    }

    /// Lookup geographic location for an IP address
    ///
    /// Returns a location carrying only the IP version when nothing matched.
    pub fn lookup(&self, ip: IpAddr) -> GeoLocation {
        let ip_version = match ip {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 6,
        };

        let mut geo_location = GeoLocation {
            ip_version,
            ..Default::default()
        };

        if let Some(ref reader) = self.city_reader {
            if let Ok(result) = reader.lookup(ip) {
                match result.decode::<geoip2::City>() {
                    Ok(Some(city)) => extract_from_city(&city, &mut geo_location),
                    // Country databases carry no city records
                    _ => {
                        if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
                            extract_from_country(&country, &mut geo_location);
                        }
                    }
                }
            }
        }

        if let Some(ref reader) = self.asn_reader {
            if let Ok(result) = reader.lookup(ip) {
                if let Ok(Some(asn)) = result.decode::<geoip2::Asn>() {
                    geo_location.asn = asn.autonomous_system_number;
                    geo_location.asn_org =
                        asn.autonomous_system_organization.map(|s| s.to_string());
                }
            }
        }

        geo_location
    }
}

impl GeoResolver for GeoIpService {
    fn resolve(&self, ip: &str) -> Option<GeoLocation> {
        let ip = ip.trim().parse::<IpAddr>().ok()?;
        let location = self.lookup(ip);
        (!location.is_unresolved()).then_some(location)
    }
}

fn extract_from_city(city: &geoip2::City, geo_location: &mut GeoLocation) {
    geo_location.country_code = city.country.iso_code.map(|s| s.to_string());
    geo_location.country_name = city.country.names.english.map(|s| s.to_string());

    if let Some(subdivision) = city.subdivisions.first() {
        geo_location.region = subdivision.names.english.map(|s| s.to_string());
    }

    geo_location.city = city.city.names.english.map(|s| s.to_string());
}

fn extract_from_country(country: &geoip2::Country, geo_location: &mut GeoLocation) {
    geo_location.country_code = country.country.iso_code.map(|s| s.to_string());
    geo_location.country_name = country.country.names.english.map(|s| s.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geoip_service_creation_invalid_path() {
        let result = GeoIpService::new(Some("/nonexistent/path.mmdb"), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_without_databases_is_absent() {
        let service = GeoIpService::new(None, None).unwrap();
        assert!(!service.has_databases());
        assert_eq!(service.resolve("203.0.113.5"), None);
    }

    #[test]
    fn test_resolve_unparseable_ip_is_absent() {
        let service = GeoIpService::new(None, None).unwrap();
        assert_eq!(service.resolve("not-an-ip"), None);
        assert_eq!(service.resolve(""), None);
    }

    #[test]
    fn test_lookup_keeps_ip_version() {
        let service = GeoIpService::new(None, None).unwrap();
        let geo = service.lookup("2001:db8::1".parse().unwrap());
        assert_eq!(geo.ip_version, 6);
        assert!(geo.is_unresolved());
    }
}
