use serde::Serialize;
use std::fmt;

/// Hash key of the aggregate bucket shared by every site
pub const GLOBAL_SCOPE: &str = "global";

/// Aggregate bucket a counter belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Counters of a single site, keyed by the site identifier
    Site(String),
    /// Counters across all sites
    Global,
}

impl Scope {
    pub fn site(site: impl Into<String>) -> Self {
        Scope::Site(site.into())
    }

    /// Store key holding this scope's counters
    pub fn key(&self) -> &str {
        match self {
            Scope::Site(site) => site,
            Scope::Global => GLOBAL_SCOPE,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single counter increment: add `delta` to `field` inside `scope`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterOp {
    pub scope: Scope,
    pub field: String,
    pub delta: i64,
}

impl CounterOp {
    pub fn incr(scope: Scope, field: impl Into<String>) -> Self {
        Self {
            scope,
            field: field.into(),
            delta: 1,
        }
    }
}
