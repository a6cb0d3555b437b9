//! Service health command

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, format_timestamp, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Checked")]
    checked: String,
}

#[derive(Serialize)]
struct HealthSummary {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

/// Show liveness and readiness of the scheduler service
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthResponse) = client.probe("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.probe("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&HealthSummary { health, readiness })?,
        OutputFormat::Table => {
            println!("Status:                 {}", color_status(&health.status).bold());
            let ready = if readiness.ready {
                "yes".green()
            } else {
                "no".red()
            };
            match &readiness.reason {
                Some(reason) => println!("Ready:                  {} ({})", ready, reason),
                None => println!("Ready:                  {}", ready),
            }
            println!();

            let mut components: Vec<_> = health.components.into_iter().collect();
            components.sort_by(|a, b| a.0.cmp(&b.0));
            let rows: Vec<ComponentRow> = components
                .into_iter()
                .map(|(name, c)| ComponentRow {
                    name,
                    status: color_status(&c.status),
                    message: c.message.unwrap_or_default(),
                    checked: format_timestamp(c.last_check_timestamp),
                })
                .collect();
            print_rows(rows, "No components registered");
        }
    }

    Ok(())
}
