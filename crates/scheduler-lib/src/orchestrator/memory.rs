//! In-memory cloud provider
//!
//! Keeps instances in a map, records every call, and can be scripted to fail
//! specific operations. Used for local runs without a vendor endpoint and in
//! tests.

use super::provider::{CloudProvider, ProviderResult};
use crate::cost::PricingTable;
use crate::error::ProviderError;
use crate::models::{PricingEntry, ResourceSpec};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Resize,
    Terminate,
    Migrate,
    GetPricing,
}

/// A recorded provider call
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCall {
    pub operation: Operation,
    /// Instance the call targeted (source instance for migrations)
    pub instance_id: Option<String>,
    pub idempotency_key: Option<String>,
}

pub struct SimulatedProvider {
    instances: DashMap<String, ResourceSpec>,
    /// Effects already applied, keyed by idempotency key
    applied: DashMap<String, String>,
    failures: DashMap<Operation, VecDeque<ProviderError>>,
    calls: Mutex<Vec<ProviderCall>>,
    pricing: Vec<PricingEntry>,
    latency: Duration,
    next_id: AtomicU64,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            applied: DashMap::new(),
            failures: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            pricing: PricingTable::builtin().entries(),
            latency: Duration::ZERO,
            next_id: AtomicU64::new(1),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_pricing(mut self, pricing: Vec<PricingEntry>) -> Self {
        self.pricing = pricing;
        self
    }

    /// Seed an existing instance
    pub fn add_instance(&self, instance_id: impl Into<String>, spec: ResourceSpec) {
        self.instances.insert(instance_id.into(), spec);
    }

    pub fn instance(&self, instance_id: &str) -> Option<ResourceSpec> {
        self.instances.get(instance_id).map(|s| s.value().clone())
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Fail the next `times` calls of `operation` with `error`
    pub fn fail_next(&self, operation: Operation, error: ProviderError, times: usize) {
        let mut queue = self.failures.entry(operation).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    async fn begin(
        &self,
        operation: Operation,
        instance_id: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> ProviderResult<()> {
        self.calls.lock().await.push(ProviderCall {
            operation,
            instance_id: instance_id.map(str::to_string),
            idempotency_key: idempotency_key.map(str::to_string),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let scripted = self
            .failures
            .get_mut(&operation)
            .and_then(|mut queue| queue.pop_front());
        match scripted {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn require_instance(&self, instance_id: &str) -> ProviderResult<()> {
        if self.instances.contains_key(instance_id) {
            Ok(())
        } else {
            Err(ProviderError::Fatal(format!("instance {} not found", instance_id)))
        }
    }
}

#[async_trait]
impl CloudProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn create(
        &self,
        spec: &ResourceSpec,
        _region: Option<&str>,
        idempotency_key: &str,
    ) -> ProviderResult<String> {
        self.begin(Operation::Create, None, Some(idempotency_key)).await?;
        if let Some(existing) = self.applied.get(idempotency_key) {
            return Ok(existing.value().clone());
        }
        let instance_id = format!("sim-{:06}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.instances.insert(instance_id.clone(), spec.clone());
        self.applied
            .insert(idempotency_key.to_string(), instance_id.clone());
        Ok(instance_id)
    }

    async fn resize(
        &self,
        instance_id: &str,
        spec: &ResourceSpec,
        idempotency_key: &str,
    ) -> ProviderResult<()> {
        self.begin(Operation::Resize, Some(instance_id), Some(idempotency_key))
            .await?;
        if self.applied.contains_key(idempotency_key) {
            return Ok(());
        }
        self.require_instance(instance_id)?;
        self.instances.insert(instance_id.to_string(), spec.clone());
        self.applied
            .insert(idempotency_key.to_string(), instance_id.to_string());
        Ok(())
    }

    async fn terminate(&self, instance_id: &str, idempotency_key: &str) -> ProviderResult<()> {
        self.begin(Operation::Terminate, Some(instance_id), Some(idempotency_key))
            .await?;
        if self.applied.contains_key(idempotency_key) {
            return Ok(());
        }
        self.require_instance(instance_id)?;
        self.instances.remove(instance_id);
        self.applied
            .insert(idempotency_key.to_string(), instance_id.to_string());
        Ok(())
    }

    async fn migrate(
        &self,
        from_instance_id: &str,
        to_instance_id: &str,
        idempotency_key: &str,
    ) -> ProviderResult<()> {
        self.begin(Operation::Migrate, Some(from_instance_id), Some(idempotency_key))
            .await?;
        if self.applied.contains_key(idempotency_key) {
            return Ok(());
        }
        self.require_instance(from_instance_id)?;
        self.require_instance(to_instance_id)?;
        self.applied
            .insert(idempotency_key.to_string(), to_instance_id.to_string());
        Ok(())
    }

    async fn get_pricing(&self) -> ProviderResult<Vec<PricingEntry>> {
        self.begin(Operation::GetPricing, None, None).await?;
        Ok(self.pricing.clone())
    }
}
