//! Cost estimation
//!
//! Monthly cost of a resource spec from an hourly pricing table, and the
//! signed delta between two specs.

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{Action, CostReportEntry, PricingEntry, Resource, ResourceSpec};
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::Path;

/// Billing hours in a month (24 × 30)
pub const HOURS_PER_MONTH: f64 = 24.0 * 30.0;

/// Hourly prices keyed by pricing class
///
/// Instance classes carry their capacity so the decision engine can pick a
/// target size; storage and cache classes are priced per GB-hour.
#[derive(Debug, Default)]
pub struct PricingTable {
    entries: DashMap<String, PricingEntry>,
}

impl PricingTable {
    pub fn new(entries: impl IntoIterator<Item = PricingEntry>) -> Self {
        let table = Self::default();
        table.merge(entries);
        table
    }

    /// Built-in price list used when no table is configured
    pub fn builtin() -> Self {
        let instance = |class: &str, rate: f64, cores: u32, mem: f64| PricingEntry {
            class: class.to_string(),
            hourly_rate: rate,
            cpu_cores: Some(cores),
            memory_gb: Some(mem),
        };
        let per_gb = |class: &str, rate: f64| PricingEntry {
            class: class.to_string(),
            hourly_rate: rate,
            cpu_cores: None,
            memory_gb: None,
        };
        Self::new([
            instance("ecs.c6.large", 0.32, 2, 4.0),
            instance("ecs.c6.xlarge", 0.64, 4, 8.0),
            instance("ecs.c6.2xlarge", 1.28, 8, 16.0),
            instance("ecs.c6.4xlarge", 2.56, 16, 32.0),
            per_gb("disk.standard", 0.001),
            per_gb("cache.redis", 0.05),
        ])
    }

    /// Parse a JSON array of pricing entries
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<PricingEntry> =
            serde_json::from_str(json).context("Failed to parse pricing table")?;
        Ok(Self::new(entries))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pricing table {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Insert or replace entries, keeping classes not mentioned
    pub fn merge(&self, entries: impl IntoIterator<Item = PricingEntry>) {
        for entry in entries {
            self.entries.insert(entry.class.clone(), entry);
        }
    }

    pub fn get(&self, class: &str) -> Option<PricingEntry> {
        self.entries.get(class).map(|e| e.value().clone())
    }

    pub fn rate(&self, class: &str) -> SchedulerResult<f64> {
        self.entries
            .get(class)
            .map(|e| e.hourly_rate)
            .ok_or_else(|| SchedulerError::UnknownPricingClass(class.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries sorted by class
    pub fn entries(&self) -> Vec<PricingEntry> {
        let mut entries: Vec<PricingEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.class.cmp(&b.class));
        entries
    }

    /// Instance classes ordered by hourly rate, cheapest first
    pub fn instance_classes(&self) -> Vec<PricingEntry> {
        let mut classes: Vec<PricingEntry> = self
            .entries
            .iter()
            .filter(|e| e.cpu_cores.is_some())
            .map(|e| e.value().clone())
            .collect();
        classes.sort_by(|a, b| {
            a.hourly_rate
                .partial_cmp(&b.hourly_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.class.cmp(&b.class))
        });
        classes
    }

    /// Hourly cost of a spec: compute plus per-GB attachments
    pub fn hourly_cost(&self, spec: &ResourceSpec) -> SchedulerResult<f64> {
        let mut total = self.rate(&spec.instance_class)?;
        for attachment in &spec.attachments {
            total += self.rate(&attachment.class)? * attachment.size_gb;
        }
        Ok(total)
    }
}

/// Monthly cost of a spec
pub fn estimate(spec: &ResourceSpec, table: &PricingTable) -> SchedulerResult<f64> {
    Ok(table.hourly_cost(spec)? * HOURS_PER_MONTH)
}

/// Signed monthly cost change from `current` to `target`
pub fn delta(current: &ResourceSpec, target: &ResourceSpec, table: &PricingTable) -> SchedulerResult<f64> {
    Ok(estimate(target, table)? - estimate(current, table)?)
}

/// Cost report rows for the given resources
///
/// `recommendations` maps resource id to its latest action; a cheaper
/// recommendation contributes its saving. Resources whose class is missing
/// from the table fall back to their recorded hourly cost.
pub fn cost_report(
    resources: &[Resource],
    recommendations: &HashMap<String, Action>,
    table: &PricingTable,
) -> Vec<CostReportEntry> {
    let mut report: Vec<CostReportEntry> = resources
        .iter()
        .map(|resource| {
            let monthly_cost = estimate(&resource.spec, table)
                .unwrap_or(resource.hourly_cost * HOURS_PER_MONTH);
            let projected_savings = recommendations
                .get(&resource.id)
                .filter(|a| !a.is_no_op() && a.monthly_cost_delta < 0.0)
                .map(|a| -a.monthly_cost_delta)
                .unwrap_or(0.0);
            CostReportEntry {
                resource_id: resource.id.clone(),
                monthly_cost,
                projected_savings,
            }
        })
        .collect();
    report.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
    report
}
