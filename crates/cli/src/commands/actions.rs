//! Action-related CLI commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ActionList, ActionRecord, ApiClient, ApprovalRequest};
use crate::output::{
    color_severity, color_status, format_cost, format_timestamp, print_success, print_warning,
    OutputFormat,
};

/// Row for the actions table
#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Handle")]
    handle: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Requested")]
    requested: String,
    #[tabled(rename = "Est. Cost")]
    cost: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Ref")]
    reference: String,
}

fn to_row(action: &ActionRecord) -> ActionRow {
    ActionRow {
        id: action.action_id.clone(),
        handle: action.handle.key(),
        kind: action.kind.clone(),
        severity: color_severity(&action.severity),
        requested: format!("{:.0}", action.requested_value),
        cost: format_cost(action.estimated_cost),
        status: color_status(&action.status),
        created: format_timestamp(action.created_at),
        reference: action
            .workflow_id
            .clone()
            .or_else(|| action.ticket_id.clone())
            .unwrap_or_else(|| "-".to_string()),
    }
}

/// List outstanding (and optionally recent) actions
pub async fn list_actions(client: &ApiClient, all: bool, format: OutputFormat) -> Result<()> {
    let result: ActionList = client.get("v1/actions").await?;

    match format {
        OutputFormat::Json => {
            let payload = if all {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string_pretty(&result.outstanding)?
            };
            println!("{}", payload);
        }
        OutputFormat::Table => {
            if result.outstanding.is_empty() {
                print_warning("No outstanding actions");
            } else {
                let rows: Vec<ActionRow> = result.outstanding.iter().map(to_row).collect();
                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
            }

            if all && !result.recent.is_empty() {
                println!("\nRecently resolved:");
                let rows: Vec<ActionRow> = result.recent.iter().map(to_row).collect();
                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
            }
        }
    }

    Ok(())
}

/// Resolve a pending approval workflow
pub async fn resolve_approval(
    client: &ApiClient,
    workflow_id: &str,
    approved: bool,
) -> Result<()> {
    let decision = if approved { "approved" } else { "denied" };
    let action: ActionRecord = client
        .post(
            &format!("v1/approvals/{}", workflow_id),
            &ApprovalRequest {
                decision: decision.to_string(),
            },
        )
        .await?;

    print_success(&format!(
        "Workflow {} {}: action {} is now {}",
        workflow_id, decision, action.action_id, action.status
    ));
    Ok(())
}
