use serde::Serialize;

use crate::analytics::models::GeoLocation;
use crate::error::ClickError;
use crate::models::GLOBAL_SCOPE;

/// Raw click as received from the caller
#[derive(Debug, Clone, Serialize)]
pub struct ClickEvent {
    #[serde(rename = "host")]
    site: String,
    #[serde(rename = "uri")]
    resource: String,
    ip: String,
    #[serde(skip)]
    user_agent: String,
}

impl ClickEvent {
    /// Build a click, rejecting an empty site or resource.
    ///
    /// `global` is refused as a site: its counters share the aggregate hash.
    pub fn new(
        site: impl Into<String>,
        resource: impl Into<String>,
        ip: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Result<Self, ClickError> {
        let site = site.into();
        let resource = resource.into();

        if site.is_empty() {
            return Err(ClickError::InvalidClick("site must not be empty"));
        }
        if site == GLOBAL_SCOPE {
            return Err(ClickError::InvalidClick("site name is reserved"));
        }
        if resource.is_empty() {
            return Err(ClickError::InvalidClick("resource must not be empty"));
        }

        Ok(Self {
            site,
            resource,
            ip: ip.into(),
            user_agent: user_agent.into(),
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// Click with the dimensions derived from its user agent and IP
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub click: ClickEvent,

    /// Resolved location of the client IP
    pub location: Option<GeoLocation>,

    /// Counts read back right after this click was recorded
    #[serde(rename = "click")]
    pub stat: Option<ClickStat>,

    pub browser_family: String,

    /// Browser family and version, `"unknown"` without a user agent
    pub browser: String,

    pub platform: String,

    pub os: String,

    #[serde(rename = "is_bot")]
    pub bot: bool,

    #[serde(rename = "is_mobile")]
    pub mobile: bool,
}

impl EnrichedEvent {
    /// Event with every derived field at its zero value
    pub fn bare(click: ClickEvent) -> Self {
        Self {
            click,
            location: None,
            stat: None,
            browser_family: String::new(),
            browser: String::new(),
            platform: String::new(),
            os: String::new(),
            bot: false,
            mobile: false,
        }
    }
}

/// Site-scope counters read back after a click was committed.
///
/// Only valid at the moment of the commit; later clicks are not reflected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClickStat {
    pub uri: u64,
    pub total: u64,
    pub browser_family: u64,
    pub browser: u64,
    pub os: u64,
    pub platform: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_site_and_resource() {
        assert!(matches!(
            ClickEvent::new("", "/x", "", ""),
            Err(ClickError::InvalidClick(_))
        ));
        assert!(matches!(
            ClickEvent::new("a.com", "", "", ""),
            Err(ClickError::InvalidClick(_))
        ));
    }

    #[test]
    fn test_new_rejects_global_as_site() {
        let err = ClickEvent::new(GLOBAL_SCOPE, "/x", "", "").unwrap_err();
        assert!(matches!(err, ClickError::InvalidClick("site name is reserved")));

        // Only the exact scope name is reserved
        assert!(ClickEvent::new("global.example", "/x", "", "").is_ok());
    }
}
