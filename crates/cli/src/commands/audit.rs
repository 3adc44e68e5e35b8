//! Audit trail CLI commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, AuditEntry};
use crate::output::{color_status, format_timestamp, print_warning, OutputFormat};

/// Row for the audit table
#[derive(Tabled)]
struct AuditRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Action")]
    action_id: String,
    #[tabled(rename = "Handle")]
    handle: String,
    #[tabled(rename = "Transition")]
    transition: String,
    #[tabled(rename = "Actor")]
    actor: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Query the audit trail, optionally filtered by handle and time range
pub async fn query_audit(
    client: &ApiClient,
    handle: Option<String>,
    from: Option<i64>,
    to: Option<i64>,
    format: OutputFormat,
) -> Result<()> {
    let mut path = "v1/audit".to_string();
    let mut params = Vec::new();
    if let Some(handle) = &handle {
        params.push(format!("handle={}", handle));
    }
    if let Some(from) = from {
        params.push(format!("from={}", from));
    }
    if let Some(to) = to {
        params.push(format!("to={}", to));
    }
    if !params.is_empty() {
        path = format!("{}?{}", path, params.join("&"));
    }

    let records: Vec<AuditEntry> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Table => {
            if records.is_empty() {
                print_warning("No audit records found");
                return Ok(());
            }

            let rows: Vec<AuditRow> = records
                .iter()
                .map(|r| AuditRow {
                    time: format_timestamp(r.timestamp),
                    action_id: r.action_id.clone(),
                    handle: r.handle_key.clone(),
                    transition: match &r.previous_status {
                        Some(previous) => {
                            format!("{} -> {}", previous, color_status(&r.new_status))
                        }
                        None => color_status(&r.new_status),
                    },
                    actor: r.actor.clone(),
                    detail: r.detail.clone(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} records", records.len());
        }
    }

    Ok(())
}
