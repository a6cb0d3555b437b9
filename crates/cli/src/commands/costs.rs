//! Cost report command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, CostReport};
use crate::output::{format_currency, print_heading, print_json, print_rows, OutputFormat};

/// Row for the per-resource cost table
#[derive(Tabled)]
struct CostRow {
    #[tabled(rename = "Resource")]
    resource_id: String,
    #[tabled(rename = "Monthly Cost")]
    monthly_cost: String,
    #[tabled(rename = "Projected Savings")]
    projected_savings: String,
}

/// Show monthly cost and projected savings
pub async fn show_costs(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: CostReport = client.get("api/v1/costs").await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_heading("Cost Report");

            let rows: Vec<CostRow> = report
                .resources
                .iter()
                .map(|r| CostRow {
                    resource_id: r.resource_id.clone(),
                    monthly_cost: format_currency(r.monthly_cost),
                    projected_savings: format_currency(r.projected_savings),
                })
                .collect();
            print_rows(rows, "No resources registered");
            println!();

            println!(
                "Total monthly cost:     {}",
                format_currency(report.total_monthly_cost)
            );

            let savings_pct = if report.total_monthly_cost > 0.0 {
                (report.total_projected_savings / report.total_monthly_cost) * 100.0
            } else {
                0.0
            };
            println!(
                "{} {} ({:.1}%)",
                "Projected savings:     ".bold(),
                format_currency(report.total_projected_savings).green().bold(),
                savings_pct
            );
        }
    }

    Ok(())
}
