//! Output formatting for run summaries

use anyhow::{Context, Result};
use serde::Serialize;

use crate::engine::KeyStatus;
use crate::pipeline::RunSummary;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

impl OutputFormat {
    /// Parse output format from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            _ => anyhow::bail!("Unsupported output format: '{}'. Use 'json' or 'table'.", s),
        }
    }
}

/// Print a run summary in the requested format
pub fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            print_summary_table(summary);
            Ok(())
        }
    }
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

fn print_summary_table(summary: &RunSummary) {
    println!("Action:        {}", summary.action);
    println!("Mount:         {}", summary.mount);
    println!("Source keys:   {}", summary.source_keys);
    if summary.action.writes_destination() {
        println!("Dest keys:     {}", summary.destination_keys);
        println!("Unchanged:     {}", summary.unchanged);
    }
    println!("Planned:       {}", summary.planned);
    println!("Succeeded:     {}", summary.report.copied());
    println!("Failed:        {}", summary.report.failed());
    if let Some(file) = &summary.output_file {
        println!("Snapshot:      {}", file.display());
    }

    let failures: Vec<_> = summary.report.failures().collect();
    if !failures.is_empty() {
        print_table_header(&[("Path", 50), ("Worker", 6), ("Reason", 40)]);
        for outcome in failures {
            let reason = match &outcome.status {
                KeyStatus::Failed(reason) => reason.as_str(),
                KeyStatus::Copied => "",
            };
            println!(
                "{:<50} {:<6} {}",
                truncate(&outcome.path, 48),
                outcome.worker,
                truncate(reason, 40)
            );
        }
    }

    if !summary.delete_candidates.is_empty() {
        println!();
        println!("Destination-only keys (not deleted):");
        for path in &summary.delete_candidates {
            println!("  {}", path);
        }
    }
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a horizontal separator line
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    println!();
    let mut header = String::new();
    for (name, width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = *width));
    }
    println!("{}", header.trim());

    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    print_separator(total_width.saturating_sub(1));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("TABLE").unwrap(), OutputFormat::Table);
        assert!(OutputFormat::from_str("yaml").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hello", 3), "...");
        assert_eq!(truncate("sécrét/path", 7), "sécr...");
    }
}
