use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::Client;
use std::io::Write;

use super::{format_date, format_generated, or_na, ReportStats, REPORT_TITLE};

const HEADERS: [&str; 8] = [
    "Client Name",
    "Domain URL",
    "Client ID",
    "Latest Pull Date",
    "Latest Pull By",
    "GSOS Version",
    "Created Date",
    "Last Updated",
];

/// CSV with a `#` comment preamble, a blank line, then one row per client.
pub fn render(clients: &[Client], now: DateTime<Utc>) -> Result<Vec<u8>> {
    let stats = ReportStats::of(clients);

    let mut out = Vec::new();
    writeln!(out, "# {}", REPORT_TITLE)?;
    writeln!(out, "# Generated on: {}", format_generated(now))?;
    writeln!(out, "# Total Clients: {}", stats.total)?;
    writeln!(out, "# Clients with Pull History: {}", stats.with_history)?;
    writeln!(out)?;

    // Rows starting with '#' get quoted so comment-skipping readers keep them
    let mut writer = ::csv::WriterBuilder::new().comment(Some(b'#')).from_writer(out);
    writer.write_record(HEADERS)?;
    for client in clients {
        let pulled = format_date(client.latest_pull_date, "Never");
        let created = format_date(client.created_at, "N/A");
        let updated = format_date(client.updated_at, "N/A");
        writer.write_record([
            client.client_name.as_str(),
            client.domain_url.as_str(),
            client.client_id.as_str(),
            pulled.as_str(),
            or_na(&client.latest_pull_by),
            or_na(&client.gsos_version),
            created.as_str(),
            updated.as_str(),
        ])?;
    }

    Ok(writer.into_inner().map_err(|e| anyhow::anyhow!("failed to flush CSV: {}", e))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures;

    #[test]
    fn test_preamble() {
        let bytes = render(&fixtures::clients(), Utc::now()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# GSOS Client Management Report");
        assert!(lines[1].starts_with("# Generated on: "));
        assert_eq!(lines[2], "# Total Clients: 2");
        assert_eq!(lines[3], "# Clients with Pull History: 1");
        assert_eq!(lines[4], "");
        assert!(lines[5].starts_with("Client Name,Domain URL"));
    }

    #[test]
    fn test_reparse_skipping_comments() {
        let clients = fixtures::clients();
        let bytes = render(&clients, Utc::now()).unwrap();

        let mut reader = ::csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .from_reader(bytes.as_slice());
        assert_eq!(reader.headers().unwrap().len(), HEADERS.len());

        let rows: Vec<::csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), clients.len());
        for (row, client) in rows.iter().zip(&clients) {
            assert_eq!(&row[0], client.client_name);
            assert_eq!(&row[1], client.domain_url);
            assert_eq!(&row[2], client.client_id);
        }

        assert_eq!(&rows[0][3], "2024-06-01");
        assert_eq!(&rows[1][3], "Never");
        assert_eq!(&rows[1][4], "N/A");
        assert_eq!(&rows[1][7], "N/A");
    }

    #[test]
    fn test_hash_prefixed_name_survives_reparse() {
        let mut clients = fixtures::clients();
        clients[1].client_name = "#1 Priority Co".to_string();
        let bytes = render(&clients, Utc::now()).unwrap();

        let mut reader = ::csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .from_reader(bytes.as_slice());
        let rows: Vec<::csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][0], "#1 Priority Co");
    }
}
