//! Data models for click enrichment

use serde::{Deserialize, Serialize};

/// Geographic location information derived from IP address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB")
    pub country_code: Option<String>,

    /// Country name
    pub country_name: Option<String>,

    /// Region/state/province
    pub region: Option<String>,

    /// City name
    pub city: Option<String>,

    /// Autonomous System Number
    pub asn: Option<u32>,

    /// ASN organization name
    pub asn_org: Option<String>,

    /// IP version (4 or 6)
    pub ip_version: u8,
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self {
            country_code: None,
            country_name: None,
            region: None,
            city: None,
            asn: None,
            asn_org: None,
            ip_version: 4,
        }
    }
}

impl GeoLocation {
    /// True when no lookup produced any information
    pub fn is_unresolved(&self) -> bool {
        self.country_code.is_none()
            && self.country_name.is_none()
            && self.region.is_none()
            && self.city.is_none()
            && self.asn.is_none()
    }
}

/// Classification of a raw user-agent string.
///
/// Fields the parser cannot determine stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserAgentInfo {
    /// Browser family (e.g., "Firefox")
    pub family: String,

    /// Dotted browser version (e.g., "121.0")
    pub version: String,

    /// Operating system with version (e.g., "Windows 10")
    pub os: String,

    /// Hardware / platform (e.g., "iPhone", "Mac")
    pub platform: String,

    pub bot: bool,

    pub mobile: bool,
}

impl UserAgentInfo {
    /// Browser label counted as `browser:<label>`
    pub fn label(&self) -> String {
        format!("{} {}", self.family, self.version)
    }
}
