//! Output formatting for cycle reports and history (table, JSON, markdown, CSV).

use crate::commands::track::{CycleReport, FailedCycle, TrackedCycle};
use crate::config::OutputFormat;
use crate::extract::models::format_timestamp;
use crate::extract::{ChangeResult, ObservationRecord};

const TITLE_WIDTH: usize = 50;

/// Formats reports and history listings for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the outcome of one tracking cycle.
    pub fn format_report(&self, report: &CycleReport) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Table => self.table_report(report),
            OutputFormat::Markdown => self.markdown_report(report),
            OutputFormat::Csv => self.csv_report(report),
        }
    }

    /// Formats stored observations, newest first.
    pub fn format_history(&self, records: &[ObservationRecord]) -> String {
        if records.is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                OutputFormat::Csv => ObservationRecord::COLUMNS.join(","),
                _ => "No observations recorded.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Table => self.table_history(records),
            OutputFormat::Markdown => self.markdown_history(records),
            OutputFormat::Csv => self.csv_rows(records),
        }
    }

    // Table formatting

    fn table_report(&self, report: &CycleReport) -> String {
        match report {
            CycleReport::Tracked(TrackedCycle { record, change }) => {
                let mut lines = vec![
                    format!("[{}] {}", format_timestamp(&record.timestamp), record.product_name),
                    format!("Price:   {} (Discount: {})", record.price, record.discount),
                    format!("Rating:  {} ({} ratings)", record.rating, record.num_ratings),
                ];
                if let Some(alert) = alert_line(change) {
                    lines.push(alert);
                }
                lines.join("\n")
            }
            CycleReport::Failed(FailedCycle { error, timestamp }) => {
                format!("[{}] {}", format_timestamp(timestamp), error)
            }
        }
    }

    fn table_history(&self, records: &[ObservationRecord]) -> String {
        let ts_width = 19;
        let price_width = 14;
        let discount_width = 11;
        let rating_width = 13;
        let count_width = 13;
        let title_width = TITLE_WIDTH;

        let mut lines = Vec::new();

        lines.push(format!(
            "{:<ts_width$}  {:<price_width$}  {:<discount_width$}  {:<rating_width$}  {:<count_width$}  {}",
            "Timestamp", "Price", "Discount", "Rating", "Ratings", "Product"
        ));
        lines.push(format!(
            "{:-<ts_width$}  {:-<price_width$}  {:-<discount_width$}  {:-<rating_width$}  {:-<count_width$}  {:-<title_width$}",
            "", "", "", "", "", ""
        ));

        for record in records {
            lines.push(format!(
                "{:<ts_width$}  {:>price_width$}  {:>discount_width$}  {:>rating_width$}  {:>count_width$}  {}",
                format_timestamp(&record.timestamp),
                record.price,
                record.discount,
                record.rating,
                record.num_ratings,
                truncate(&record.product_name, title_width)
            ));
        }

        lines.push(String::new());
        lines.push(format!("Total: {} observations", records.len()));

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_report(&self, report: &CycleReport) -> String {
        match report {
            CycleReport::Tracked(TrackedCycle { record, change }) => {
                let mut lines = vec![
                    format!("## {}", record.product_name),
                    String::new(),
                    format!("- **Checked:** {}", format_timestamp(&record.timestamp)),
                    format!("- **Price:** {}", record.price),
                    format!("- **Discount:** {}", record.discount),
                    format!("- **Rating:** {} ({} ratings)", record.rating, record.num_ratings),
                ];
                if let Some(alert) = alert_line(change) {
                    lines.push(String::new());
                    lines.push(format!("> **{}**", alert));
                }
                lines.join("\n")
            }
            CycleReport::Failed(FailedCycle { error, timestamp }) => {
                format!("**Error** ({}): {}", format_timestamp(timestamp), error)
            }
        }
    }

    fn markdown_history(&self, records: &[ObservationRecord]) -> String {
        let mut lines = Vec::new();

        lines.push("| Timestamp | Price | Discount | Rating | Ratings | Product |".to_string());
        lines.push("|-----------|-------|----------|--------|---------|---------|".to_string());

        for record in records {
            lines.push(format!(
                "| {} | {} | {} | {} | {} | {} |",
                format_timestamp(&record.timestamp),
                record.price,
                record.discount,
                record.rating,
                record.num_ratings,
                truncate(&record.product_name, 40).replace('|', "\\|")
            ));
        }

        lines.push(String::new());
        lines.push(format!("*{} observations*", records.len()));

        lines.join("\n")
    }

    // CSV formatting

    fn csv_report(&self, report: &CycleReport) -> String {
        match report {
            CycleReport::Tracked(TrackedCycle { record, .. }) => {
                self.csv_rows(std::slice::from_ref(record))
            }
            CycleReport::Failed(failed) => write_csv(std::slice::from_ref(failed)),
        }
    }

    fn csv_rows(&self, records: &[ObservationRecord]) -> String {
        write_csv(records)
    }
}

/// The alert line printed when a cycle flags a price move.
pub fn alert_line(change: &Option<ChangeResult>) -> Option<String> {
    change
        .as_ref()
        .filter(|c| c.changed)
        .map(|c| format!("PRICE CHANGE ALERT: {:.2}% change detected!", c.percent_change * 100.0))
}

fn write_csv<T: serde::Serialize>(rows: &[T]) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        if writer.serialize(row).is_err() {
            return String::new();
        }
    }

    writer
        .into_inner()
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .map(|s| s.trim_end().to_string())
        .unwrap_or_default()
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_record() -> ObservationRecord {
        ObservationRecord {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 24, 12, 0, 0).unwrap(),
            product_name: "Widget, Deluxe".to_string(),
            price: "$ 1,234.56".to_string(),
            price_numeric: Some(1234.56),
            discount: "-10%".to_string(),
            rating: "4.3 out of 5".to_string(),
            num_ratings: "2,501".to_string(),
        }
    }

    fn tracked(change: Option<ChangeResult>) -> CycleReport {
        CycleReport::Tracked(TrackedCycle { record: make_record(), change })
    }

    fn failed() -> CycleReport {
        CycleReport::Failed(FailedCycle {
            error: "Failed to extract price".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 24, 12, 0, 0).unwrap(),
        })
    }

    fn alert() -> Option<ChangeResult> {
        Some(ChangeResult { changed: true, percent_change: 0.025 })
    }

    // Report tests

    #[test]
    fn test_table_report() {
        let output = Formatter::new(OutputFormat::Table).format_report(&tracked(None));

        assert!(output.starts_with("[2025-03-24 12:00:00] Widget, Deluxe"));
        assert!(output.contains("Price:   $ 1,234.56 (Discount: -10%)"));
        assert!(output.contains("Rating:  4.3 out of 5 (2,501 ratings)"));
        assert!(!output.contains("ALERT"));
    }

    #[test]
    fn test_table_report_with_alert() {
        let output = Formatter::new(OutputFormat::Table).format_report(&tracked(alert()));
        assert!(output.ends_with("PRICE CHANGE ALERT: 2.50% change detected!"));
    }

    #[test]
    fn test_unchanged_result_has_no_alert() {
        let change = Some(ChangeResult { changed: false, percent_change: 0.004 });
        assert!(alert_line(&change).is_none());
        assert!(alert_line(&None).is_none());
    }

    #[test]
    fn test_table_failed_report() {
        let output = Formatter::new(OutputFormat::Table).format_report(&failed());
        assert_eq!(output, "[2025-03-24 12:00:00] Failed to extract price");
    }

    #[test]
    fn test_json_report() {
        let output = Formatter::new(OutputFormat::Json).format_report(&tracked(alert()));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["product_name"], "Widget, Deluxe");
        assert_eq!(value["timestamp"], "2025-03-24 12:00:00");
        assert_eq!(value["change"]["changed"], true);
    }

    #[test]
    fn test_json_failed_report() {
        let output = Formatter::new(OutputFormat::Json).format_report(&failed());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["error"], "Failed to extract price");
        assert_eq!(value["timestamp"], "2025-03-24 12:00:00");
    }

    #[test]
    fn test_markdown_report() {
        let output = Formatter::new(OutputFormat::Markdown).format_report(&tracked(alert()));

        assert!(output.starts_with("## Widget, Deluxe"));
        assert!(output.contains("- **Price:** $ 1,234.56"));
        assert!(output.contains("> **PRICE CHANGE ALERT"));
    }

    #[test]
    fn test_csv_report_quotes_fields() {
        let output = Formatter::new(OutputFormat::Csv).format_report(&tracked(None));
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], ObservationRecord::COLUMNS.join(","));
        assert_eq!(
            lines[1],
            "2025-03-24 12:00:00,\"Widget, Deluxe\",\"$ 1,234.56\",1234.56,-10%,4.3 out of 5,\"2,501\""
        );
    }

    #[test]
    fn test_csv_failed_report() {
        let output = Formatter::new(OutputFormat::Csv).format_report(&failed());
        assert_eq!(output, "error,timestamp\nFailed to extract price,2025-03-24 12:00:00");
    }

    // History tests

    #[test]
    fn test_history_empty() {
        assert_eq!(Formatter::new(OutputFormat::Json).format_history(&[]), "[]");
        assert_eq!(
            Formatter::new(OutputFormat::Csv).format_history(&[]),
            ObservationRecord::COLUMNS.join(",")
        );
        assert_eq!(
            Formatter::new(OutputFormat::Markdown).format_history(&[]),
            "No observations recorded."
        );
    }

    #[test]
    fn test_table_history() {
        let output = Formatter::new(OutputFormat::Table).format_history(&[make_record()]);

        assert!(output.contains("Timestamp"));
        assert!(output.contains("Widget, Deluxe"));
        assert!(output.contains("Total: 1 observations"));
    }

    #[test]
    fn test_table_history_truncates_long_names() {
        let mut record = make_record();
        record.product_name = "Ü".repeat(80);
        let output = Formatter::new(OutputFormat::Table).format_history(&[record]);

        assert!(output.contains(&format!("{}...", "Ü".repeat(47))));
        assert!(!output.contains(&"Ü".repeat(48)));
    }

    #[test]
    fn test_markdown_history() {
        let output = Formatter::new(OutputFormat::Markdown).format_history(&[make_record()]);

        assert!(output.contains("| Timestamp | Price |"));
        assert!(output.contains("| 2025-03-24 12:00:00 | $ 1,234.56 |"));
        assert!(output.contains("*1 observations*"));
    }
}
