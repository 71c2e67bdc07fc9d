//! Click analytics
//!
//! Enrichment of raw clicks (user agent, GeoIP), counter key derivation and
//! the locked counter transaction that produces each click's snapshot.

pub mod aggregator;
pub mod enrich;
pub mod geoip;
pub mod ip_extractor;
pub mod keys;
pub mod models;
pub mod snapshot;
pub mod transaction;
pub mod user_agent;

pub use aggregator::ClickAggregator;
pub use enrich::{Enricher, UNKNOWN_BROWSER};
pub use geoip::{GeoIpService, GeoResolver};
pub use ip_extractor::{anonymize_ip, extract_client_ip};
pub use models::{GeoLocation, UserAgentInfo};
pub use user_agent::{NoopUserAgentParser, UapUserAgentParser, UserAgentParser};
