//! User-agent classification backed by the uap-core regex set

use anyhow::{anyhow, Result};
use uaparser::Parser;

use crate::analytics::models::UserAgentInfo;

/// Family name uap-core reports when nothing matched
const UNKNOWN_FAMILY: &str = "Other";

/// Device family uap-core assigns to crawlers
const BOT_DEVICE_FAMILY: &str = "Spider";

const MOBILE_OS_FAMILIES: &[&str] = &[
    "Android",
    "iOS",
    "Windows Phone",
    "BlackBerry OS",
    "KaiOS",
    "Symbian OS",
    "Firefox OS",
    "Tizen",
];

/// Turns a raw user-agent string into its classification.
///
/// Total: anything it cannot recognise is left at the default value.
pub trait UserAgentParser: Send + Sync {
    fn parse(&self, raw: &str) -> UserAgentInfo;
}

/// Parser used when no regex file is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUserAgentParser;

impl UserAgentParser for NoopUserAgentParser {
    fn parse(&self, _raw: &str) -> UserAgentInfo {
        UserAgentInfo::default()
    }
}

pub struct UapUserAgentParser {
    inner: uaparser::UserAgentParser,
}

impl UapUserAgentParser {
    /// Load a uap-core `regexes.yaml`
    pub fn from_yaml(path: &str) -> Result<Self> {
        let inner = uaparser::UserAgentParser::from_yaml(path)
            .map_err(|e| anyhow!("Failed to load user agent regexes at {}: {:?}", path, e))?;
        Ok(Self { inner })
    }
}

impl UserAgentParser for UapUserAgentParser {
    fn parse(&self, raw: &str) -> UserAgentInfo {
        let client = self.inner.parse(raw);

        let version = dotted(&[
            client.user_agent.major.as_deref(),
            client.user_agent.minor.as_deref(),
            client.user_agent.patch.as_deref(),
        ]);
        let os_version = dotted(&[client.os.major.as_deref(), client.os.minor.as_deref()]);

        classify(
            raw,
            &client.user_agent.family,
            &version,
            &client.os.family,
            &os_version,
            &client.device.family,
        )
    }
}

/// Join the leading present version components with dots
fn dotted(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .map_while(|part| part.filter(|p| !p.is_empty()))
        .collect::<Vec<_>>()
        .join(".")
}

fn known(family: &str) -> &str {
    if family == UNKNOWN_FAMILY {
        ""
    } else {
        family
    }
}

/// Derive the counted dimensions from the parser's raw families
fn classify(
    raw: &str,
    family: &str,
    version: &str,
    os_family: &str,
    os_version: &str,
    device_family: &str,
) -> UserAgentInfo {
    let family = known(family);
    let os_family = known(os_family);
    let device_family = known(device_family);

    let os = match (os_family, os_version) {
        ("", _) => String::new(),
        (os, "") => os.to_string(),
        (os, v) => format!("{} {}", os, v),
    };

    let platform = if device_family.is_empty() {
        os_family.to_string()
    } else {
        device_family.to_string()
    };

    let bot = device_family == BOT_DEVICE_FAMILY;
    let mobile = !bot && (MOBILE_OS_FAMILIES.contains(&os_family) || raw.contains("Mobi"));

    UserAgentInfo {
        family: family.to_string(),
        version: if family.is_empty() {
            String::new()
        } else {
            version.to_string()
        },
        os,
        platform,
        bot,
        mobile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_stops_at_first_missing_part() {
        assert_eq!(dotted(&[Some("121"), Some("0"), None]), "121.0");
        assert_eq!(dotted(&[Some("17"), None, Some("3")]), "17");
        assert_eq!(dotted(&[None, Some("1")]), "");
    }

    #[test]
    fn test_classify_desktop_browser() {
        let info = classify(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Firefox/121.0",
            "Firefox",
            "121.0",
            "Windows",
            "10",
            "Other",
        );

        assert_eq!(info.family, "Firefox");
        assert_eq!(info.label(), "Firefox 121.0");
        assert_eq!(info.os, "Windows 10");
        assert_eq!(info.platform, "Windows");
        assert!(!info.bot);
        assert!(!info.mobile);
    }

    #[test]
    fn test_classify_mobile_device() {
        let info = classify(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) Mobile/15E148",
            "Mobile Safari",
            "17.1",
            "iOS",
            "17.1",
            "iPhone",
        );

        assert_eq!(info.platform, "iPhone");
        assert_eq!(info.os, "iOS 17.1");
        assert!(info.mobile);
    }

    #[test]
    fn test_classify_crawler_is_bot_not_mobile() {
        let info = classify(
            "Mozilla/5.0 (Linux; Android 6.0.1; Nexus 5X Build/MMB29P) Mobile Safari (compatible; Googlebot/2.1)",
            "Googlebot",
            "2.1",
            "Android",
            "6.0",
            "Spider",
        );

        assert!(info.bot);
        assert!(!info.mobile);
    }

    #[test]
    fn test_classify_unrecognised_agent_stays_empty() {
        let info = classify("curl-ish", "Other", "", "Other", "", "Other");

        assert_eq!(info.family, "");
        assert_eq!(info.os, "");
        assert_eq!(info.platform, "");
        assert_eq!(info.label(), " ");
        assert!(!info.bot);
        assert!(!info.mobile);
    }

    #[test]
    fn test_noop_parser_returns_defaults() {
        assert_eq!(NoopUserAgentParser.parse("anything"), UserAgentInfo::default());
    }
}
