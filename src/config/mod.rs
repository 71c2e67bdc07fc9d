use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::storage::LockOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub lock: LockConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis connection URL, including database index and credentials
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    pub lease_ms: u64,
    pub acquire_timeout_ms: u64,
    pub retry_delay_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: 8000,
            acquire_timeout_ms: 10_000,
            retry_delay_ms: 20,
        }
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(config: &LockConfig) -> Self {
        LockOptions {
            lease: Duration::from_millis(config.lease_ms),
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Trust a single header set by the fronting proxy
    Header,
    /// Trust `CF-Connecting-IP`
    Cloudflare,
    /// `Forwarded` / `X-Forwarded-For` with hop or CIDR trust
    Standard,
    /// Socket address only
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Count `ip:<ip>` fields and return the IP count in snapshots
    pub track_ip: bool,
    pub geoip_city_db_path: Option<String>,
    pub geoip_asn_db_path: Option<String>,
    /// uap-core `regexes.yaml`; without it user agents are not classified
    pub ua_regexes_path: Option<String>,
    pub ip_anonymization: bool,
    pub trusted_proxy_mode: TrustedProxyMode,
    pub client_ip_header: String,
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            track_ip: true,
            geoip_city_db_path: None,
            geoip_asn_db_path: None,
            ua_regexes_path: None,
            ip_anonymization: false,
            trusted_proxy_mode: TrustedProxyMode::Header,
            client_ip_header: "X-Real-IP".to_string(),
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

fn env_path(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("LISTEN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env_parse::<u16>("LISTEN_PORT", 8080)?;

        let backend_str = std::env::var("STORE_BACKEND").unwrap_or_else(|_| "redis".to_string());
        let backend = match backend_str.to_lowercase().as_str() {
            "redis" => StoreBackend::Redis,
            "memory" => StoreBackend::Memory,
            other => {
                tracing::warn!(
                    "Unknown STORE_BACKEND '{other}', falling back to 'redis'. Supported values: redis, memory"
                );
                StoreBackend::Redis
            }
        };
        let store_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let lock_defaults = LockConfig::default();
        let lock = LockConfig {
            lease_ms: env_parse("LOCK_LEASE_MS", lock_defaults.lease_ms)?,
            acquire_timeout_ms: env_parse(
                "LOCK_ACQUIRE_TIMEOUT_MS",
                lock_defaults.acquire_timeout_ms,
            )?,
            retry_delay_ms: env_parse("LOCK_RETRY_DELAY_MS", lock_defaults.retry_delay_ms)?,
        };
        if lock.lease_ms == 0 {
            anyhow::bail!("LOCK_LEASE_MS must be greater than zero");
        }

        let analytics_defaults = AnalyticsConfig::default();

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "header".to_string())
            .to_lowercase()
            .as_str()
        {
            "header" => TrustedProxyMode::Header,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            "standard" => TrustedProxyMode::Standard,
            "none" => TrustedProxyMode::None,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'header'. Supported values: header, cloudflare, standard, none"
                );
                TrustedProxyMode::Header
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|cidr| {
                cidr.parse::<IpNet>()
                    .with_context(|| format!("TRUSTED_PROXIES contains an invalid CIDR: {cidr}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .with_context(|| format!("NUM_TRUSTED_PROXIES has an invalid value: {v}"))
            })
            .transpose()?;

        let analytics = AnalyticsConfig {
            track_ip: env_flag("TRACK_IP", analytics_defaults.track_ip),
            geoip_city_db_path: env_path("GEOIP_CITY_DB_PATH"),
            geoip_asn_db_path: env_path("GEOIP_ASN_DB_PATH"),
            ua_regexes_path: env_path("UA_REGEXES_PATH"),
            ip_anonymization: env_flag("IP_ANONYMIZATION", analytics_defaults.ip_anonymization),
            trusted_proxy_mode,
            client_ip_header: std::env::var("CLIENT_IP_HEADER")
                .unwrap_or(analytics_defaults.client_ip_header),
            trusted_proxies,
            num_trusted_proxies,
        };

        Ok(Config {
            server: ServerConfig { host, port },
            store: StoreConfig {
                backend,
                url: store_url,
            },
            lock,
            analytics,
        })
    }
}
