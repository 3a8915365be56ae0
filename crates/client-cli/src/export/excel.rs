use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use shared::{metrics, Client};

use super::{format_date, format_generated, or_na, ReportStats};

const CLIENT_HEADERS: [(&str, f64); 7] = [
    ("Client Name", 28.0),
    ("Domain URL", 36.0),
    ("Client ID", 16.0),
    ("Latest Pull Date", 16.0),
    ("Latest Pull By", 18.0),
    ("GSOS Version", 14.0),
    ("Created Date", 14.0),
];

fn write_header(sheet: &mut Worksheet, headers: &[(&str, f64)], bold: &Format) -> Result<()> {
    for (col, (title, width)) in headers.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, *title, bold)?;
        sheet.set_column_width(col, *width)?;
    }
    Ok(())
}

/// Workbook with "Client Data", "Summary" and "Version Breakdown" sheets.
pub fn render(clients: &[Client], now: DateTime<Utc>) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Client Data")?;
        write_header(sheet, &CLIENT_HEADERS, &bold)?;
        for (i, client) in clients.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, &client.client_name)?;
            sheet.write_string(row, 1, &client.domain_url)?;
            sheet.write_string(row, 2, &client.client_id)?;
            sheet.write_string(row, 3, format_date(client.latest_pull_date, "Never"))?;
            sheet.write_string(row, 4, or_na(&client.latest_pull_by))?;
            sheet.write_string(row, 5, or_na(&client.gsos_version))?;
            sheet.write_string(row, 6, format_date(client.created_at, "N/A"))?;
        }
    }

    {
        let stats = ReportStats::of(clients);
        let sheet = workbook.add_worksheet();
        sheet.set_name("Summary")?;
        write_header(sheet, &[("Metric", 30.0), ("Value", 26.0)], &bold)?;
        let counts = [
            ("Total Clients", stats.total),
            ("Clients with Pull History", stats.with_history),
            ("Clients without Pull History", stats.without_history),
            ("Different GSOS Versions", stats.distinct_versions),
        ];
        for (i, (metric, value)) in counts.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, *metric)?;
            sheet.write_number(row, 1, *value as f64)?;
        }
        let row = counts.len() as u32 + 1;
        sheet.write_string(row, 0, "Report Generated")?;
        sheet.write_string(row, 1, format_generated(now))?;
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Version Breakdown")?;
        write_header(sheet, &[("GSOS Version", 20.0), ("Client Count", 14.0)], &bold)?;
        for (i, (version, count)) in metrics::version_histogram(clients, metrics::NO_VERSION_LABEL)
            .iter()
            .enumerate()
        {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, version)?;
            sheet.write_number(row, 1, *count as f64)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}
