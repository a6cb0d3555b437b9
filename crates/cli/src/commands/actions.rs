//! Action statistics and in-flight listing

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ActionStats, ApiClient, InFlightAction};
use crate::output::{
    color_confidence, color_status, format_timestamp, print_heading, print_json, print_rows,
    OutputFormat,
};

#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Total")]
    total: u64,
    #[tabled(rename = "Succeeded")]
    succeeded: u64,
    #[tabled(rename = "Failed")]
    failed: u64,
}

#[derive(Tabled)]
struct InFlightRow {
    #[tabled(rename = "Action")]
    id: String,
    #[tabled(rename = "Resource")]
    resource_id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Submitted")]
    submitted: String,
}

pub async fn show_stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats: ActionStats = client.get("api/v1/actions/stats").await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            print_heading("Action Statistics");
            println!("Total:                  {}", stats.total);
            println!("Succeeded:              {}", stats.succeeded);
            println!("Failed:                 {}", stats.failed);
            println!("In flight:              {}", stats.in_flight);
            println!("Success rate:           {:.1}%", stats.success_rate * 100.0);
            println!();

            let rows: Vec<KindRow> = stats
                .by_kind
                .iter()
                .map(|(kind, s)| KindRow {
                    kind: kind.clone(),
                    total: s.total,
                    succeeded: s.succeeded,
                    failed: s.failed,
                })
                .collect();
            print_rows(rows, "No actions executed yet");
        }
    }

    Ok(())
}

pub async fn list_in_flight(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let slots: Vec<InFlightAction> = client.get("api/v1/actions/in-flight").await?;

    match format {
        OutputFormat::Json => print_json(&slots)?,
        OutputFormat::Table => {
            let rows: Vec<InFlightRow> = slots
                .iter()
                .map(|slot| InFlightRow {
                    id: slot.action.id.clone(),
                    resource_id: slot.action.resource_id.clone(),
                    kind: slot.action.kind.clone(),
                    state: color_status(&slot.state),
                    confidence: color_confidence(slot.action.confidence),
                    submitted: format_timestamp(slot.submitted_at),
                })
                .collect();
            print_rows(rows, "No actions in flight");
        }
    }

    Ok(())
}
