//! Client IP extraction from HTTP headers with trust validation
//!
//! - A single configurable header (`X-Real-IP` by default) set by a fronting proxy
//! - Vendor-specific headers (`CF-Connecting-IP`)
//! - `Forwarded` / `X-Forwarded-For` chains walked right to left past trusted hops
//! - Socket remote address when headers are absent or untrusted

use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::warn;

use crate::config::{AnalyticsConfig, TrustedProxyMode};

/// Extract the client IP address from HTTP headers
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address (fallback)
/// * `config` - Analytics configuration with trust settings
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Header => {
            extract_header_ip(headers, &config.client_ip_header).unwrap_or(socket_addr)
        }
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).unwrap_or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

/// IP from a single proxy-set header; an unparseable value is ignored
fn extract_header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }

    match value.parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            warn!(header = %name, value = %value, "proxy IP header is not an IP address, using socket address");
            None
        }
    }
}

/// Extract IP from Cloudflare-specific header
fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Extract IP from standard headers (Forwarded, X-Forwarded-For)
fn extract_standard_ip(headers: &HeaderMap, config: &AnalyticsConfig) -> Option<IpAddr> {
    // Prefer RFC 7239 Forwarded header
    if let Some(ip) = extract_from_forwarded(headers, config) {
        return Some(ip);
    }

    extract_from_x_forwarded_for(headers, config)
}

/// Parse one `for=` value: quotes, brackets and ports are stripped
fn parse_forwarded_for(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    // IPv4 with port
    value.rsplit_once(':')?.0.parse().ok()
}

/// Parse RFC 7239 Forwarded header: `Forwarded: for=192.0.2.60;proto=http, for=...`
fn extract_from_forwarded(headers: &HeaderMap, config: &AnalyticsConfig) -> Option<IpAddr> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    let chain: Vec<IpAddr> = forwarded
        .split(',')
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let (name, value) = param.trim().split_once('=')?;
                if name.eq_ignore_ascii_case("for") {
                    parse_forwarded_for(value)
                } else {
                    None
                }
            })
        })
        .collect();

    pick_from_chain(&chain, config)
}

fn extract_from_x_forwarded_for(headers: &HeaderMap, config: &AnalyticsConfig) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    pick_from_chain(&chain, config)
}

/// Choose the client from a proxy chain (left = client side) by walking it
/// right to left past the trusted hops
fn pick_from_chain(chain: &[IpAddr], config: &AnalyticsConfig) -> Option<IpAddr> {
    if chain.is_empty() {
        return None;
    }

    if let Some(num_trusted) = config.num_trusted_proxies {
        return if chain.len() > num_trusted {
            Some(chain[chain.len() - num_trusted - 1])
        } else {
            // Not enough hops in the chain, the leftmost is all we have
            chain.first().copied()
        };
    }

    if !config.trusted_proxies.is_empty() {
        return chain
            .iter()
            .rev()
            .find(|ip| !is_trusted(ip, &config.trusted_proxies))
            .or_else(|| chain.first())
            .copied();
    }

    chain.last().copied()
}

fn is_trusted(ip: &IpAddr, trusted: &[IpNet]) -> bool {
    trusted.iter().any(|net| net.contains(ip))
}

/// Anonymize an IP address by truncating to network prefix
///
/// - IPv4: Truncate to /24 (zero last octet)
/// - IPv6: Truncate to /48 (zero last 80 bits)
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(addr) => {
            let octets = addr.octets();
            IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], 0))
        }
        IpAddr::V6(addr) => {
            let segments = addr.segments();
            IpAddr::V6(Ipv6Addr::new(
                segments[0],
                segments[1],
                segments[2],
                0,
                0,
                0,
                0,
                0,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn create_config(mode: TrustedProxyMode) -> AnalyticsConfig {
        AnalyticsConfig {
            trusted_proxy_mode: mode,
            ..AnalyticsConfig::default()
        }
    }

    fn socket() -> IpAddr {
        "192.168.1.1".parse().unwrap()
    }

    #[test]
    fn test_extract_client_ip_none_mode() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::None);

        assert_eq!(extract_client_ip(&headers, socket(), &config), socket());
    }

    #[test]
    fn test_extract_real_ip_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 203.0.113.5 "));
        let config = create_config(TrustedProxyMode::Header);

        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "203.0.113.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_invalid_real_ip_header_falls_back_to_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("garbage"));
        let config = create_config(TrustedProxyMode::Header);

        assert_eq!(extract_client_ip(&headers, socket(), &config), socket());
        assert_eq!(extract_client_ip(&HeaderMap::new(), socket(), &config), socket());
    }

    #[test]
    fn test_custom_header_name() {
        let mut headers = HeaderMap::new();
        headers.insert("x-client-ip", HeaderValue::from_static("2001:db8::7"));
        let config = AnalyticsConfig {
            trusted_proxy_mode: TrustedProxyMode::Header,
            client_ip_header: "X-Client-IP".to_string(),
            ..AnalyticsConfig::default()
        };

        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "2001:db8::7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_extract_cloudflare_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::Cloudflare);

        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "203.0.113.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_extract_x_forwarded_for_basic() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        let config = create_config(TrustedProxyMode::Standard);

        let result = extract_client_ip(&headers, socket(), &config);
        // Should return rightmost IP in the absence of trust configuration
        assert_eq!(result, "198.51.100.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_x_forwarded_for_skips_trusted_cidrs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1, 10.0.0.2, 10.0.0.3"),
        );
        let config = AnalyticsConfig {
            trusted_proxy_mode: TrustedProxyMode::Standard,
            trusted_proxies: vec!["10.0.0.0/8".parse().unwrap()],
            ..AnalyticsConfig::default()
        };

        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "198.51.100.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_x_forwarded_for_with_hop_count() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1, 10.0.0.2"),
        );
        let config = AnalyticsConfig {
            trusted_proxy_mode: TrustedProxyMode::Standard,
            num_trusted_proxies: Some(2),
            ..AnalyticsConfig::default()
        };

        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "203.0.113.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_forwarded_header_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "forwarded",
            HeaderValue::from_static("for=\"[2001:db8:cafe::17]:4711\";proto=https, for=192.0.2.43:8080"),
        );
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.1"));
        let config = AnalyticsConfig {
            trusted_proxy_mode: TrustedProxyMode::Standard,
            num_trusted_proxies: Some(1),
            ..AnalyticsConfig::default()
        };

        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "2001:db8:cafe::17".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_anonymize_ipv4() {
        let ip: IpAddr = "192.168.1.100".parse().unwrap();
        let anonymized = anonymize_ip(ip);
        assert_eq!(anonymized, "192.168.1.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_anonymize_ipv6() {
        let ip: IpAddr = "2001:db8::1234:5678".parse().unwrap();
        let anonymized = anonymize_ip(ip);
        // Should zero out everything after first 48 bits (3 segments)
        assert_eq!(anonymized, "2001:db8::".parse::<IpAddr>().unwrap());
    }
}
