//! Resource inspection commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, Resource, ResourceDetail, UtilizationStats};
use crate::output::{
    color_confidence, color_status, format_currency, format_pct, format_timestamp, print_heading,
    print_info, print_json, print_rows, OutputFormat,
};

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Instance")]
    instance_id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "vCPU")]
    cpu: u32,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Monthly")]
    monthly: String,
}

impl From<&Resource> for ResourceRow {
    fn from(r: &Resource) -> Self {
        Self {
            id: r.id.clone(),
            instance_id: r.instance_id.clone(),
            kind: r.kind.clone(),
            class: r.spec.instance_class.clone(),
            cpu: r.spec.cpu_cores,
            memory: format!("{:.0}GB", r.spec.memory_gb),
            status: color_status(&r.status),
            monthly: format_currency(r.hourly_cost * 720.0),
        }
    }
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Action")]
    action_id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Resolved")]
    resolved: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// List tracked resources
pub async fn list_resources(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let resources: Vec<Resource> = client.get("api/v1/resources").await?;

    match format {
        OutputFormat::Json => print_json(&resources)?,
        OutputFormat::Table => {
            let rows: Vec<ResourceRow> = resources.iter().map(ResourceRow::from).collect();
            print_rows(rows, "No resources registered");
        }
    }

    Ok(())
}

/// Show the latest report, in-flight action and history for one resource
pub async fn show_resource(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let detail: ResourceDetail = client.get(&format!("api/v1/resources/{}", id)).await?;

    if format == OutputFormat::Json {
        return print_json(&detail);
    }

    let r = &detail.resource;
    print_heading(&format!("Resource {}", r.id));
    println!("Instance:               {}", r.instance_id.cyan());
    println!("Kind:                   {}", r.kind);
    println!(
        "Spec:                   {} ({} vCPU, {:.0}GB memory, {:.0}GB storage)",
        r.spec.instance_class, r.spec.cpu_cores, r.spec.memory_gb, r.spec.storage_gb
    );
    println!("Status:                 {}", color_status(&r.status));
    if let Some(region) = &r.region {
        println!("Region:                 {}", region);
    }
    println!("Monthly cost:           {}", format_currency(r.hourly_cost * 720.0));
    println!();

    match &detail.report {
        None => print_info("Not evaluated yet"),
        Some(report) => {
            println!("{}", "Latest Evaluation".bold());
            println!("{}", "-".repeat(50));
            println!(
                "Tick {} at {}",
                report.tick,
                format_timestamp(report.evaluated_at).dimmed()
            );
            println!("State:                  {}", color_status(&report.state));

            if let Some(forecast) = &report.forecast {
                let peak_cpu = forecast.points.iter().map(|p| p.cpu_pct).fold(0.0, f64::max);
                let peak_mem = forecast.points.iter().map(|p| p.mem_pct).fold(0.0, f64::max);
                println!(
                    "Forecast:               peak CPU {}, peak memory {}, confidence {}",
                    format_pct(peak_cpu),
                    format_pct(peak_mem),
                    color_confidence(forecast.confidence)
                );
            }

            if let Some(action) = &report.action {
                println!(
                    "Action:                 {} ({})",
                    action.kind.bold(),
                    action.reason
                );
                if action.monthly_cost_delta != 0.0 {
                    println!(
                        "Cost delta:             {}/month",
                        format_currency(action.monthly_cost_delta)
                    );
                }
            }

            if let Some(outcome) = &report.outcome {
                println!(
                    "Outcome:                {} after {} attempt(s)",
                    color_status(&outcome.status),
                    outcome.attempts
                );
            }

            if let Some(error) = &report.error {
                println!("Error:                  {}", error.red());
            }
        }
    }

    if let Some(slot) = &detail.in_flight {
        println!();
        println!(
            "{} {} {} since {}",
            "In flight:".bold(),
            slot.action.kind,
            color_status(&slot.state),
            format_timestamp(slot.submitted_at)
        );
    }

    if !detail.history.is_empty() {
        println!();
        println!("{}", "History".bold());
        let rows: Vec<OutcomeRow> = detail
            .history
            .iter()
            .map(|o| OutcomeRow {
                action_id: o.action_id.clone(),
                kind: o.kind.clone(),
                status: color_status(&o.status),
                attempts: o.attempts,
                resolved: o.resolved_at.map(format_timestamp).unwrap_or_default(),
                error: o.error.clone().unwrap_or_default(),
            })
            .collect();
        print_rows(rows, "No actions recorded");
    }

    Ok(())
}

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "Max")]
    max: String,
}

/// Show utilization statistics over a reporting period
pub async fn show_stats(
    client: &ApiClient,
    id: &str,
    period: &str,
    format: OutputFormat,
) -> Result<()> {
    let stats: UtilizationStats = client
        .get(&format!("api/v1/resources/{}/stats?period={}", id, period))
        .await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            print_heading(&format!("Utilization of {} over {}", stats.resource_id, period));
            println!("Samples:                {}", stats.sample_count);
            println!();

            let rows: Vec<StatsRow> = [
                ("CPU", stats.cpu),
                ("Memory", stats.memory),
                ("Disk", stats.disk),
            ]
            .into_iter()
            .map(|(metric, s)| StatsRow {
                metric,
                min: format_pct(s.min),
                avg: format_pct(s.avg),
                max: format_pct(s.max),
            })
            .collect();
            print_rows(rows, "No samples");
        }
    }

    Ok(())
}
