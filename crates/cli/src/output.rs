//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
#[allow(dead_code)]
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Render a unix timestamp as UTC
pub fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Format a cost estimate
pub fn format_cost(amount: f64) -> String {
    format!("${:.2}", amount)
}

/// Color an action or component status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "proposed" | "executing" | "pending_approval" => status.yellow().to_string(),
        "succeeded" | "healthy" | "ready" => status.green().to_string(),
        "expired" | "degraded" | "warning" => status.yellow().to_string(),
        "failed" | "denied" | "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a severity band
pub fn color_severity(severity: &str) -> String {
    match severity.to_lowercase().as_str() {
        "warning" => severity.yellow().to_string(),
        "critical" => severity.red().to_string(),
        "emergency" => severity.red().bold().to_string(),
        _ => severity.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1_704_067_200), "2024-01-01 00:00:00");
    }

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(1234.5), "$1234.50");
    }
}
