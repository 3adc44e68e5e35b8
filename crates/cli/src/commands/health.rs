//! Health and readiness CLI commands

use anyhow::Result;

use crate::client::{ApiClient, HealthSummary, ReadinessSummary};
use crate::output::{color_status, print_info, OutputFormat};

/// Show governor health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthSummary = client.get("healthz").await?;
    let readiness: ReadinessSummary = client.get("readyz").await?;

    match format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "health": health,
                "readiness": readiness,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        OutputFormat::Table => {
            print_info(&format!("Overall: {}", color_status(&health.status)));
            print_info(&format!(
                "Ready: {}",
                if readiness.ready {
                    color_status("ready")
                } else {
                    color_status(&format!(
                        "not ready ({})",
                        readiness.reason.as_deref().unwrap_or("unknown")
                    ))
                }
            ));

            if let Some(components) = health.components.as_object() {
                for (name, component) in components {
                    let status = component["status"].as_str().unwrap_or("unknown");
                    let message = component["message"].as_str().unwrap_or("");
                    println!("  {:<20} {} {}", name, color_status(status), message);
                }
            }
        }
    }

    Ok(())
}
