//! Derives browser, OS, platform, bot/mobile and location from a raw click

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analytics::geoip::{GeoIpService, GeoResolver};
use crate::analytics::models::GeoLocation;
use crate::analytics::user_agent::{NoopUserAgentParser, UapUserAgentParser, UserAgentParser};
use crate::config::AnalyticsConfig;
use crate::models::{ClickEvent, EnrichedEvent};

/// Browser label used when the request carried no user agent
pub const UNKNOWN_BROWSER: &str = "unknown";

/// Stateless enrichment stage; cheap to clone and share between tasks
#[derive(Clone)]
pub struct Enricher {
    user_agents: Arc<dyn UserAgentParser>,
    geo: Option<Arc<dyn GeoResolver>>,
}

impl Enricher {
    pub fn new(user_agents: Arc<dyn UserAgentParser>, geo: Option<Arc<dyn GeoResolver>>) -> Self {
        Self { user_agents, geo }
    }

    /// Load the configured regex file and GeoIP databases
    pub fn from_config(config: &AnalyticsConfig) -> Result<Self> {
        let user_agents: Arc<dyn UserAgentParser> = match config.ua_regexes_path.as_deref() {
            Some(path) => {
                info!("Loading user agent regexes from {}", path);
                Arc::new(UapUserAgentParser::from_yaml(path)?)
            }
            None => {
                warn!("UA_REGEXES_PATH not set, user agents will not be classified");
                Arc::new(NoopUserAgentParser)
            }
        };

        let geoip = GeoIpService::new(
            config.geoip_city_db_path.as_deref(),
            config.geoip_asn_db_path.as_deref(),
        )?;
        let geo: Option<Arc<dyn GeoResolver>> = if geoip.has_databases() {
            info!("GeoIP lookups enabled");
            Some(Arc::new(geoip))
        } else {
            info!("No GeoIP database configured, locations will be omitted");
            None
        };

        Ok(Self::new(user_agents, geo))
    }

    pub fn enrich(&self, click: ClickEvent) -> EnrichedEvent {
        let user_agent = click.user_agent().to_string();
        let ip = click.ip().to_string();
        let mut event = EnrichedEvent::bare(click);

        if user_agent.is_empty() {
            event.browser = UNKNOWN_BROWSER.to_string();
        } else {
            let info = self.user_agents.parse(&user_agent);
            event.browser = info.label();
            event.browser_family = info.family;
            event.os = info.os;
            event.platform = info.platform;
            event.bot = info.bot;
            event.mobile = info.mobile;
        }

        event.location = self.locate(&ip);
        event
    }

    /// Location of `ip`, or `None` when it is empty or unresolved
    pub fn locate(&self, ip: &str) -> Option<GeoLocation> {
        if ip.is_empty() {
            return None;
        }
        self.geo.as_ref().and_then(|geo| geo.resolve(ip))
    }
}
