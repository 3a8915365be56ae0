//! Roster reports. Each format renders a filtered client list to bytes; the
//! caller decides where they go.

use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::{metrics, Client};
use std::fmt;
use std::str::FromStr;

mod csv;
mod excel;
mod pdf;

pub const REPORT_TITLE: &str = "GSOS Client Management Report";
pub const SYSTEM_NAME: &str = "GSOS Client Management System";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unknown export format: {} (expected xlsx, csv or pdf)", other)),
        }
    }
}

/// Totals printed in every report header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStats {
    pub total: usize,
    pub with_history: usize,
    pub without_history: usize,
    pub distinct_versions: usize,
}

impl ReportStats {
    pub fn of(clients: &[Client]) -> Self {
        let with_history = clients.iter().filter(|c| c.has_pull_history()).count();
        Self {
            total: clients.len(),
            with_history,
            without_history: clients.len() - with_history,
            distinct_versions: metrics::distinct_versions(clients),
        }
    }
}

pub(crate) fn format_date(value: Option<DateTime<Utc>>, missing: &str) -> String {
    value
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| missing.to_string())
}

pub(crate) fn format_generated(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub(crate) fn or_na(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("N/A")
}

pub fn render(format: ExportFormat, clients: &[Client], now: DateTime<Utc>) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Xlsx => excel::render(clients, now),
        ExportFormat::Csv => self::csv::render(clients, now),
        ExportFormat::Pdf => pdf::render(clients, now),
    }
}

/// `gsos-clients-YYYY-MM-DD`, the stem used when no name is given.
pub fn default_filename(now: DateTime<Utc>) -> String {
    format!("gsos-clients-{}", now.format("%Y-%m-%d"))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};
    use shared::Client;

    pub fn clients() -> Vec<Client> {
        vec![
            Client {
                id: 1,
                client_name: "Acme, Inc.".to_string(),
                domain_url: "https://acme.example".to_string(),
                client_id: "ACME-01".to_string(),
                original_password: Some("pw".to_string()),
                latest_pull_date: Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()),
                latest_pull_by: Some("dana".to_string()),
                gsos_version: Some("4.2".to_string()),
                created_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
                updated_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()),
            },
            Client {
                id: 2,
                client_name: "Globex".to_string(),
                domain_url: "globex.example".to_string(),
                client_id: "GLX-7".to_string(),
                original_password: None,
                latest_pull_date: None,
                latest_pull_by: None,
                gsos_version: None,
                created_at: None,
                updated_at: None,
            },
        ]
    }
}
