//! Plain-text rendering for rankings, mappings, and store summaries.

use std::borrow::Cow;
use std::fmt::Write as _;

use itertools::Itertools;

use crate::{
    catalog::LogicalField, record::RankedEntry, resolver::ResolvedMapping, store::YearSummary,
};

pub const RANKING_HEADERS: &[&str] = &[
    "rank", "code", "name", "uf", "municipality", "region", "basic", "prof", "eja", "esp",
    "fund", "inf", "med", "total",
];

pub fn ranking_rows(entries: &[RankedEntry]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|entry| {
            let record = &entry.record;
            let geo = &record.geography;
            let counts = &record.enrollment;
            vec![
                entry.rank.to_string(),
                record.entity_code.clone(),
                record.entity_name.clone(),
                geo.state_abbrev.clone(),
                geo.municipality_name.clone(),
                geo.region_name.clone(),
                counts.basic.to_string(),
                counts.professional.to_string(),
                counts.adult_education.to_string(),
                counts.special_needs.to_string(),
                counts.elementary.to_string(),
                counts.preschool.to_string(),
                counts.secondary.to_string(),
                record.total_enrollment.to_string(),
            ]
        })
        .collect()
}

pub const MAPPING_HEADERS: &[&str] = &["field", "required", "source column", "position"];

pub fn mapping_rows(mapping: &ResolvedMapping) -> Vec<Vec<String>> {
    mapping
        .entries()
        .map(|(field, column)| {
            let required = if LogicalField::is_required(field) { "yes" } else { "" };
            match column {
                Some(column) => vec![
                    field.to_string(),
                    required.to_string(),
                    column.source_name.clone(),
                    (column.position + 1).to_string(),
                ],
                None => vec![
                    field.to_string(),
                    required.to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ],
            }
        })
        .collect()
}

pub const SUMMARY_HEADERS: &[&str] = &["year", "entities", "total", "committed", "sources"];

pub fn summary_rows(summaries: &[YearSummary]) -> Vec<Vec<String>> {
    summaries
        .iter()
        .map(|summary| {
            vec![
                summary.year.to_string(),
                summary.entities.to_string(),
                summary.total_enrollment.to_string(),
                summary
                    .committed_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
                summary
                    .sources
                    .iter()
                    .map(|source| source.file_name.as_str())
                    .join(", "),
            ]
        })
        .collect()
}

pub fn render_table<H: AsRef<str>>(headers: &[H], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers
        .iter()
        .map(|h| display_width(h.as_ref()).max(1))
        .collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    let mut output = String::new();
    let header_cells = headers
        .iter()
        .map(|h| h.as_ref().to_string())
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table<H: AsRef<str>>(headers: &[H], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EntityYearRecord, Geography, assign_ranks};

    #[test]
    fn render_table_aligns_columns() {
        let rows = vec![
            vec!["1".to_string(), "São Paulo".to_string()],
            vec!["10".to_string(), "Rio".to_string()],
        ];
        let rendered = render_table(&["rank", "name"], &rows);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec!["rank  name", "----  ---------", "1     São Paulo", "10    Rio"]
        );
    }

    #[test]
    fn control_characters_are_flattened() {
        let rows = vec![vec!["Escola\tNova\nSede".to_string()]];
        let rendered = render_table(&["name"], &rows);
        assert_eq!(rendered.lines().nth(2), Some("Escola Nova Sede"));
    }

    #[test]
    fn ranking_rows_follow_header_layout() {
        let mut record = EntityYearRecord::new(
            "3500",
            2023,
            "Escola A",
            Geography {
                state_abbrev: "SP".to_string(),
                ..Geography::default()
            },
        );
        record.enrollment.basic = 12;
        record.total_enrollment = 12;
        let rows = ranking_rows(&assign_ranks(vec![record]));
        assert_eq!(rows[0].len(), RANKING_HEADERS.len());
        assert_eq!(rows[0][0], "1");
        assert_eq!(rows[0][3], "SP");
        assert_eq!(rows[0][13], "12");
    }
}
