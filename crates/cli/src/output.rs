//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a threat label based on severity
pub fn color_threat(threat: &str) -> String {
    match threat {
        "none" => threat.green().to_string(),
        "malware" | "sqli" => threat.red().bold().to_string(),
        "phishing" | "brute_force" | "xss" => threat.red().to_string(),
        _ => threat.to_string(),
    }
}

/// Color a health status
pub fn color_status(status: &str) -> String {
    match status {
        "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a confidence value: high-confidence verdicts deserve attention
pub fn format_confidence(confidence: u8) -> String {
    let formatted = format!("{confidence}%");
    if confidence >= 80 {
        formatted.red().to_string()
    } else if confidence >= 50 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Truncate a log line for table display
pub fn truncate_log(log: &str, max_chars: usize) -> String {
    if log.chars().count() <= max_chars {
        log.to_string()
    } else {
        let truncated: String = log.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}
