//! Plain terminal output for the one-shot commands.

use chrono::{DateTime, Utc};
use shared::metrics::{self, Analytics, HealthTier};
use shared::{Client, PullHistoryEntry};

use crate::notifications::Notification;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[90m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

pub fn tier_colour(tier: HealthTier) -> &'static str {
    match tier {
        HealthTier::Excellent => GREEN,
        HealthTier::Good => YELLOW,
        HealthTier::NeedsAttention => RED,
    }
}

/// Pads or cuts `value` to exactly `width` characters.
pub fn cell(value: &str, width: usize) -> String {
    let count = value.chars().count();
    if count <= width {
        format!("{}{}", value, " ".repeat(width - count))
    } else if width > 1 {
        let kept: String = value.chars().take(width - 1).collect();
        format!("{}…", kept)
    } else {
        value.chars().take(width).collect()
    }
}

pub fn date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

fn datetime(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

pub fn print_clients(clients: &[Client], now: DateTime<Utc>) {
    if clients.is_empty() {
        println!("{}No clients found.{}", DIM, RESET);
        return;
    }

    println!(
        "{}{} {} {} {} {} {} {} {}{}",
        BOLD,
        cell("ID", 5),
        cell("Name", 24),
        cell("Domain", 28),
        cell("Client ID", 12),
        cell("Last Pull", 10),
        cell("By", 12),
        cell("Version", 9),
        "Health",
        RESET
    );
    for client in clients {
        let tier = metrics::health_tier(client, now);
        println!(
            "{} {} {} {} {} {} {} {}{}{}",
            cell(&client.id.to_string(), 5),
            cell(&client.client_name, 24),
            cell(&client.domain_url, 28),
            cell(&client.client_id, 12),
            cell(&date(client.latest_pull_date), 10),
            cell(client.latest_pull_by.as_deref().unwrap_or("-"), 12),
            cell(client.gsos_version.as_deref().unwrap_or("-"), 9),
            tier_colour(tier),
            tier,
            RESET
        );
    }
}

pub fn print_client(client: &Client, now: DateTime<Utc>) {
    let tier = metrics::health_tier(client, now);
    println!("{}{}{} (#{})", BOLD, client.client_name, RESET, client.id);
    println!("  Domain:        {}", client.domain_url);
    println!("  Client ID:     {}", client.client_id);
    if let Some(password) = &client.original_password {
        println!("  Password:      {}", password);
    }
    println!("  Latest pull:   {}", datetime(client.latest_pull_date));
    println!("  Pulled by:     {}", client.latest_pull_by.as_deref().unwrap_or("N/A"));
    println!("  GSOS version:  {}", client.gsos_version.as_deref().unwrap_or("N/A"));
    println!("  Health:        {}{}{}", tier_colour(tier), tier, RESET);
    println!("  Created:       {}", datetime(client.created_at));
    println!("  Updated:       {}", datetime(client.updated_at));
}

pub fn print_history(entries: &[PullHistoryEntry]) {
    if entries.is_empty() {
        println!("{}No pull history recorded.{}", DIM, RESET);
        return;
    }

    println!("{}{} {} {}{}", BOLD, cell("Pull Date", 17), cell("Pulled By", 20), "Version", RESET);
    for entry in entries {
        println!(
            "{} {} {}",
            cell(&entry.pull_date.format("%Y-%m-%d %H:%M").to_string(), 17),
            cell(&entry.pull_by, 20),
            entry.version.as_deref().unwrap_or("-")
        );
    }
}

fn bar(count: usize, max: usize, width: usize) -> String {
    if max == 0 {
        return String::new();
    }
    "█".repeat((count * width).div_ceil(max))
}

pub fn print_analytics(analytics: &Analytics) {
    let s = &analytics.summary;
    println!("{}Fleet overview{}", BOLD, RESET);
    println!("  Total clients:          {}", s.total);
    println!("  Pulled in last 7 days:  {}", s.recent);
    println!("  Outdated (>30 days):    {}", s.outdated);
    println!("  Never pulled:           {}", s.without_history);
    println!("  Distinct versions:      {}", s.distinct_versions);
    println!("  Healthy:                {}", s.healthy);
    let colour = match analytics.fleet_health {
        h if h >= 70 => GREEN,
        h if h >= 30 => YELLOW,
        _ => RED,
    };
    println!("  Fleet health:           {}{}%{}", colour, analytics.fleet_health, RESET);

    println!();
    println!("{}Versions{}", BOLD, RESET);
    let max = analytics.versions.first().map(|(_, n)| *n).unwrap_or(0);
    for (version, count) in &analytics.versions {
        println!("  {} {:>4} {}", cell(version, 12), count, bar(*count, max, 30));
    }

    println!();
    println!("{}Top contributors{}", BOLD, RESET);
    if analytics.top_contributors.is_empty() {
        println!("  {}No pulls recorded yet.{}", DIM, RESET);
    }
    for (i, (name, count)) in analytics.top_contributors.iter().enumerate() {
        println!("  {}. {} {}", i + 1, cell(name, 20), count);
    }
}

pub fn print_notifications(entries: &[Notification]) {
    if entries.is_empty() {
        println!("{}No notifications.{}", DIM, RESET);
        return;
    }

    for entry in entries {
        let marker = if entry.read { " " } else { "●" };
        println!(
            "{} {}{}{} {} {} {}",
            marker,
            DIM,
            entry.short_id(),
            RESET,
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            cell(&entry.kind.to_string(), 8),
            entry.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_pads_and_cuts() {
        assert_eq!(cell("ab", 4), "ab  ");
        assert_eq!(cell("abcdef", 4), "abc…");
        assert_eq!(cell("abcd", 4), "abcd");
        assert_eq!(cell("héllo", 6).chars().count(), 6);
    }

    #[test]
    fn test_bar_scales_to_max() {
        assert_eq!(bar(10, 10, 5).chars().count(), 5);
        assert_eq!(bar(1, 10, 5).chars().count(), 1);
        assert_eq!(bar(3, 0, 5), "");
    }
}
