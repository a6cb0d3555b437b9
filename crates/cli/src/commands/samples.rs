//! Sample ingestion command

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, IngestResponse, Sample};
use crate::output::{print_json, print_rows, print_success, print_warning, OutputFormat};

#[derive(Tabled)]
struct RejectedRow {
    #[tabled(rename = "Resource")]
    resource_id: String,
    #[tabled(rename = "Timestamp")]
    timestamp: i64,
    #[tabled(rename = "Reason")]
    error: String,
}

/// Read samples from a JSON array file
pub fn read_samples(path: &Path) -> Result<Vec<Sample>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of samples", path.display()))
}

/// Push a batch of samples to the ingestion endpoint
pub async fn ingest(client: &ApiClient, path: &Path, format: OutputFormat) -> Result<()> {
    let samples = read_samples(path)?;
    if samples.is_empty() {
        print_warning("No samples in file");
        return Ok(());
    }

    let result: IngestResponse = client.post("api/v1/samples", &samples).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_success(&format!("{} sample(s) accepted", result.accepted));
            if !result.rejected.is_empty() {
                println!(
                    "{}",
                    format!("{} sample(s) rejected", result.rejected.len()).red()
                );
                let rows: Vec<RejectedRow> = result
                    .rejected
                    .into_iter()
                    .map(|r| RejectedRow {
                        resource_id: r.resource_id,
                        timestamp: r.timestamp,
                        error: r.error,
                    })
                    .collect();
                print_rows(rows, "");
            }
        }
    }

    Ok(())
}
