use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Rect, Rgb,
};
use shared::Client;

use super::{format_date, or_na, ReportStats, SYSTEM_NAME};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 14.0;
const ROW_HEIGHT: f32 = 7.0;
const TABLE_BOTTOM: f32 = 20.0;
const FIRST_TABLE_TOP: f32 = PAGE_HEIGHT - 90.0;
const NEXT_TABLE_TOP: f32 = PAGE_HEIGHT - 20.0;
const TABLE_FONT_SIZE: f32 = 8.0;

const COLUMNS: [(&str, f32); 6] = [
    ("Client Name", 35.0),
    ("Domain URL", 45.0),
    ("Client ID", 25.0),
    ("Latest Pull", 25.0),
    ("Pull By", 25.0),
    ("Version", 20.0),
];

const ACCENT: (f32, f32, f32) = (102.0, 126.0, 234.0);
const STRIPE: (f32, f32, f32) = (245.0, 247.0, 250.0);
const WHITE: (f32, f32, f32) = (255.0, 255.0, 255.0);
const BLACK: (f32, f32, f32) = (0.0, 0.0, 0.0);
const GREY: (f32, f32, f32) = (128.0, 128.0, 128.0);

fn pdf_err<E: std::fmt::Debug>(e: E) -> anyhow::Error {
    anyhow!("PDF rendering failed: {:?}", e)
}

fn color((r, g, b): (f32, f32, f32)) -> Color {
    Color::Rgb(Rgb::new(r / 255.0, g / 255.0, b / 255.0, None))
}

fn fill_rect(layer: &PdfLayerReference, x: f32, y: f32, width: f32, height: f32, rgb: (f32, f32, f32)) {
    layer.set_fill_color(color(rgb));
    layer.add_rect(Rect::new(Mm(x), Mm(y), Mm(x + width), Mm(y + height)).with_mode(PaintMode::Fill));
}

fn text(layer: &PdfLayerReference, value: &str, size: f32, x: f32, y: f32, font: &IndirectFontRef, rgb: (f32, f32, f32)) {
    layer.set_fill_color(color(rgb));
    layer.use_text(value, size, Mm(x), Mm(y), font);
}

/// Approximate Helvetica advance in mm for `chars` characters.
fn text_width(chars: usize, size: f32) -> f32 {
    chars as f32 * size * 0.5 * 0.3528
}

/// Shortens `value` so it fits a cell of `width` mm.
fn fit(value: &str, width: f32) -> String {
    let max = ((width - 2.0) / text_width(1, TABLE_FONT_SIZE)).floor() as usize;
    if value.chars().count() <= max {
        return value.to_string();
    }
    let kept: String = value.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// How many table rows fit below `top`, leaving room for the header row.
fn rows_below(top: f32) -> usize {
    ((top - ROW_HEIGHT - TABLE_BOTTOM) / ROW_HEIGHT).floor() as usize
}

/// Splits `rows` into per-page chunk sizes.
fn page_sizes(rows: usize) -> Vec<usize> {
    let first = rows_below(FIRST_TABLE_TOP);
    let next = rows_below(NEXT_TABLE_TOP);
    let mut sizes = vec![rows.min(first)];
    let mut remaining = rows.saturating_sub(first);
    while remaining > 0 {
        sizes.push(remaining.min(next));
        remaining = remaining.saturating_sub(next);
    }
    sizes
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn draw_table(layer: &PdfLayerReference, fonts: &Fonts, top: f32, rows: &[[String; 6]]) {
    let table_width: f32 = COLUMNS.iter().map(|(_, w)| w).sum();

    let mut y = top - ROW_HEIGHT;
    fill_rect(layer, MARGIN, y, table_width, ROW_HEIGHT, ACCENT);
    let mut x = MARGIN;
    for (title, width) in COLUMNS {
        text(layer, title, TABLE_FONT_SIZE, x + 1.5, y + 2.3, &fonts.bold, WHITE);
        x += width;
    }

    for (i, row) in rows.iter().enumerate() {
        y -= ROW_HEIGHT;
        if i % 2 == 1 {
            fill_rect(layer, MARGIN, y, table_width, ROW_HEIGHT, STRIPE);
        }
        let mut x = MARGIN;
        for (cell, (_, width)) in row.iter().zip(COLUMNS) {
            text(layer, &fit(cell, width), TABLE_FONT_SIZE, x + 1.5, y + 2.3, &fonts.regular, BLACK);
            x += width;
        }
    }
}

fn add_page(doc: &PdfDocumentReference) -> PdfLayerReference {
    let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    doc.get_page(page).get_layer(layer)
}

/// A4 report: header band, summary block, striped client table across as
/// many pages as needed, and a footer on every page.
pub fn render(clients: &[Client], now: DateTime<Utc>) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(super::REPORT_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?,
    };
    let first = doc.get_page(page).get_layer(layer);

    fill_rect(&first, 0.0, PAGE_HEIGHT - 40.0, PAGE_WIDTH, 40.0, ACCENT);
    text(&first, "GSOS CLIENT MANAGEMENT REPORT", 24.0, MARGIN, PAGE_HEIGHT - 20.0, &fonts.bold, WHITE);
    let generated = format!(
        "Generated on: {} at {} UTC",
        now.format("%Y-%m-%d"),
        now.format("%H:%M:%S")
    );
    text(&first, &generated, 12.0, MARGIN, PAGE_HEIGHT - 30.0, &fonts.regular, WHITE);

    let stats = ReportStats::of(clients);
    text(&first, "Summary Statistics", 14.0, MARGIN, PAGE_HEIGHT - 55.0, &fonts.bold, BLACK);
    let lines = [
        format!("Total Clients: {}", stats.total),
        format!("Clients with Pull History: {}", stats.with_history),
        format!("Different GSOS Versions: {}", stats.distinct_versions),
    ];
    for (i, line) in lines.iter().enumerate() {
        text(&first, line, 10.0, MARGIN, PAGE_HEIGHT - 65.0 - 7.0 * i as f32, &fonts.regular, BLACK);
    }

    let rows: Vec<[String; 6]> = clients
        .iter()
        .map(|c| {
            [
                c.client_name.clone(),
                c.domain_url.clone(),
                c.client_id.clone(),
                format_date(c.latest_pull_date, "Never"),
                or_na(&c.latest_pull_by).to_string(),
                or_na(&c.gsos_version).to_string(),
            ]
        })
        .collect();

    let mut layers = vec![first];
    let mut offset = 0;
    for (i, size) in page_sizes(rows.len()).into_iter().enumerate() {
        let top = if i == 0 {
            FIRST_TABLE_TOP
        } else {
            layers.push(add_page(&doc));
            NEXT_TABLE_TOP
        };
        draw_table(&layers[layers.len() - 1], &fonts, top, &rows[offset..offset + size]);
        offset += size;
    }

    let total = layers.len();
    let system_x = PAGE_WIDTH - MARGIN - text_width(SYSTEM_NAME.len(), 8.0);
    for (i, layer) in layers.iter().enumerate() {
        text(layer, &format!("Page {} of {}", i + 1, total), 8.0, MARGIN, 10.0, &fonts.regular, GREY);
        text(layer, SYSTEM_NAME, 8.0, system_x, 10.0, &fonts.regular, GREY);
    }

    doc.save_to_bytes().map_err(pdf_err)
}
