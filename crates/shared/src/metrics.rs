//! Dashboard metrics derived from the in-memory roster.
//!
//! Everything here is a pure function of the client list and a caller-supplied
//! `now`, so the dashboard, the analytics view and the exporters agree on
//! bucket boundaries.
//!
//! Boundary conventions:
//! - recent: `now - latest_pull_date <= 7 days` (inclusive)
//! - outdated: never pulled, or `now - latest_pull_date > 30 days` (exclusive)
//! - health: elapsed `< 7 days` → 90, `< 30 days` → 70, otherwise 30, so a
//!   pull exactly 7 days old scores 70 and one exactly 30 days old scores 30.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Client;

pub const RECENT_WINDOW_DAYS: i64 = 7;
pub const OUTDATED_WINDOW_DAYS: i64 = 30;
pub const TOP_CONTRIBUTORS_LIMIT: usize = 5;
pub const UNKNOWN_VERSION_LABEL: &str = "Unknown";
pub const NO_VERSION_LABEL: &str = "No Version";

// ============================================================================
// Recency & health
// ============================================================================

/// Time since the client's last recorded pull, `None` if it never pulled.
pub fn elapsed_since_pull(client: &Client, now: DateTime<Utc>) -> Option<Duration> {
    client.latest_pull_date.map(|pulled| now - pulled)
}

pub fn is_recent(client: &Client, now: DateTime<Utc>) -> bool {
    elapsed_since_pull(client, now).is_some_and(|elapsed| elapsed <= Duration::days(RECENT_WINDOW_DAYS))
}

pub fn is_outdated(client: &Client, now: DateTime<Utc>) -> bool {
    match elapsed_since_pull(client, now) {
        Some(elapsed) => elapsed > Duration::days(OUTDATED_WINDOW_DAYS),
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTier {
    Excellent,
    Good,
    NeedsAttention,
}

impl HealthTier {
    pub fn value(self) -> u8 {
        match self {
            HealthTier::Excellent => 90,
            HealthTier::Good => 70,
            HealthTier::NeedsAttention => 30,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HealthTier::Excellent => "Excellent",
            HealthTier::Good => "Good",
            HealthTier::NeedsAttention => "Needs Attention",
        }
    }
}

impl fmt::Display for HealthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}%", self.label(), self.value())
    }
}

pub fn health_tier(client: &Client, now: DateTime<Utc>) -> HealthTier {
    match elapsed_since_pull(client, now) {
        Some(elapsed) if elapsed < Duration::days(RECENT_WINDOW_DAYS) => HealthTier::Excellent,
        Some(elapsed) if elapsed < Duration::days(OUTDATED_WINDOW_DAYS) => HealthTier::Good,
        _ => HealthTier::NeedsAttention,
    }
}

pub fn health_score(client: &Client, now: DateTime<Utc>) -> u8 {
    health_tier(client, now).value()
}

// ============================================================================
// Filtering
// ============================================================================

/// Case-insensitive substring match over the searchable columns.
pub fn matches_search(client: &Client, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    let hit = |value: &str| value.to_lowercase().contains(&term);

    hit(&client.client_name)
        || hit(&client.domain_url)
        || hit(&client.client_id)
        || client.latest_pull_by.as_deref().is_some_and(hit)
        || client.gsos_version.as_deref().is_some_and(hit)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullStatusFilter {
    #[default]
    All,
    Recent,
    Outdated,
    Never,
}

impl PullStatusFilter {
    pub fn matches(self, client: &Client, now: DateTime<Utc>) -> bool {
        match self {
            PullStatusFilter::All => true,
            PullStatusFilter::Recent => is_recent(client, now),
            PullStatusFilter::Outdated => is_outdated(client, now),
            PullStatusFilter::Never => client.latest_pull_date.is_none(),
        }
    }

    pub fn next(self) -> Self {
        match self {
            PullStatusFilter::All => PullStatusFilter::Recent,
            PullStatusFilter::Recent => PullStatusFilter::Outdated,
            PullStatusFilter::Outdated => PullStatusFilter::Never,
            PullStatusFilter::Never => PullStatusFilter::All,
        }
    }
}

/// Filters on the numeric health value: healthy ≥ 70, warning 30..70,
/// critical < 30.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthFilter {
    #[default]
    All,
    Healthy,
    Warning,
    Critical,
}

impl HealthFilter {
    pub fn matches(self, client: &Client, now: DateTime<Utc>) -> bool {
        let value = health_score(client, now);
        match self {
            HealthFilter::All => true,
            HealthFilter::Healthy => value >= 70,
            HealthFilter::Warning => (30..70).contains(&value),
            HealthFilter::Critical => value < 30,
        }
    }

    pub fn next(self) -> Self {
        match self {
            HealthFilter::All => HealthFilter::Healthy,
            HealthFilter::Healthy => HealthFilter::Warning,
            HealthFilter::Warning => HealthFilter::Critical,
            HealthFilter::Critical => HealthFilter::All,
        }
    }
}

macro_rules! impl_filter_text {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self { $($ty::$variant => $text),+ })
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!("unknown {} value: {}", stringify!($ty), other)),
                }
            }
        }
    };
}

impl_filter_text!(PullStatusFilter {
    All => "all",
    Recent => "recent",
    Outdated => "outdated",
    Never => "never",
});

impl_filter_text!(HealthFilter {
    All => "all",
    Healthy => "healthy",
    Warning => "warning",
    Critical => "critical",
});

/// Combined dashboard filter. The default lets everything through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientFilter {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub pull_status: PullStatusFilter,
    #[serde(default)]
    pub health: HealthFilter,
}

impl ClientFilter {
    pub fn matches(&self, client: &Client, now: DateTime<Utc>) -> bool {
        if !matches_search(client, &self.search) {
            return false;
        }
        let version = self.version.trim().to_lowercase();
        if !version.is_empty()
            && !client
                .gsos_version
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&version))
        {
            return false;
        }
        self.pull_status.matches(client, now) && self.health.matches(client, now)
    }

    pub fn apply(&self, clients: &[Client], now: DateTime<Utc>) -> Vec<Client> {
        clients
            .iter()
            .filter(|c| self.matches(c, now))
            .cloned()
            .collect()
    }

    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty()
            || !self.version.trim().is_empty()
            || self.pull_status != PullStatusFilter::All
            || self.health != HealthFilter::All
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// Counts keys in first-seen order, then sorts by count descending. The sort
/// is stable, so equal counts keep first-seen order.
fn ranked_counts<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();

    for key in keys {
        match index.get(key) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(key, counts.len());
                counts.push((key.to_string(), 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Clients per `gsos_version`; missing versions are counted under
/// `missing_label`.
pub fn version_histogram(clients: &[Client], missing_label: &str) -> Vec<(String, usize)> {
    ranked_counts(
        clients
            .iter()
            .map(|c| c.gsos_version.as_deref().unwrap_or(missing_label)),
    )
}

/// Most frequent `latest_pull_by` values, clients without one excluded.
pub fn top_contributors(clients: &[Client], limit: usize) -> Vec<(String, usize)> {
    let mut ranked = ranked_counts(clients.iter().filter_map(|c| c.latest_pull_by.as_deref()));
    ranked.truncate(limit);
    ranked
}

/// Share of clients with a recent pull, as a rounded percentage.
pub fn fleet_health(clients: &[Client], now: DateTime<Utc>) -> u32 {
    if clients.is_empty() {
        return 0;
    }
    let recent = clients.iter().filter(|c| is_recent(c, now)).count();
    (recent as f64 / clients.len() as f64 * 100.0).round() as u32
}

pub fn distinct_versions(clients: &[Client]) -> usize {
    let mut seen: Vec<&str> = clients.iter().filter_map(|c| c.gsos_version.as_deref()).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSummary {
    pub total: usize,
    pub recent: usize,
    pub outdated: usize,
    pub with_history: usize,
    pub without_history: usize,
    pub distinct_versions: usize,
    pub healthy: usize,
}

pub fn summarize(clients: &[Client], now: DateTime<Utc>) -> RosterSummary {
    let with_history = clients.iter().filter(|c| c.has_pull_history()).count();
    RosterSummary {
        total: clients.len(),
        recent: clients.iter().filter(|c| is_recent(c, now)).count(),
        outdated: clients.iter().filter(|c| is_outdated(c, now)).count(),
        with_history,
        without_history: clients.len() - with_history,
        distinct_versions: distinct_versions(clients),
        healthy: clients.iter().filter(|c| HealthFilter::Healthy.matches(c, now)).count(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub summary: RosterSummary,
    pub fleet_health: u32,
    pub versions: Vec<(String, usize)>,
    pub top_contributors: Vec<(String, usize)>,
}

pub fn analytics(clients: &[Client], now: DateTime<Utc>) -> Analytics {
    Analytics {
        summary: summarize(clients, now),
        fleet_health: fleet_health(clients, now),
        versions: version_histogram(clients, UNKNOWN_VERSION_LABEL),
        top_contributors: top_contributors(clients, TOP_CONTRIBUTORS_LIMIT),
    }
}

/// Remembers the analytics for one roster generation.
///
/// Callers bump the generation whenever they replace the roster; asking again
/// with the same generation returns the cached value. Time-based buckets are
/// frozen at the moment of computation until the next refresh.
#[derive(Debug, Default)]
pub struct MetricsCache {
    entry: Option<(u64, Analytics)>,
}

impl MetricsCache {
    pub fn get_or_compute(&mut self, generation: u64, clients: &[Client], now: DateTime<Utc>) -> &Analytics {
        if self.entry.as_ref().map(|(g, _)| *g) != Some(generation) {
            self.entry = None;
        }
        let (_, cached) = self
            .entry
            .get_or_insert_with(|| (generation, analytics(clients, now)));
        cached
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
