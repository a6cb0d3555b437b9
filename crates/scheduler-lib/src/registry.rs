//! Inventory of tracked resources
//!
//! Holds the last-known-good state of every resource. The orchestrator is
//! the only writer after registration and only writes after a provider has
//! confirmed an action.

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::Resource;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: DashMap<String, Resource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a resource; returns true when it was not known before
    pub fn register(&self, resource: Resource) -> bool {
        self.resources.insert(resource.id.clone(), resource).is_none()
    }

    pub fn get(&self, resource_id: &str) -> Option<Resource> {
        self.resources.get(resource_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, resource_id: &str) -> bool {
        self.resources.contains_key(resource_id)
    }

    /// All resources ordered by id
    pub fn list(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> = self.resources.iter().map(|r| r.value().clone()).collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));
        resources
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.resources.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn remove(&self, resource_id: &str) -> Option<Resource> {
        self.resources.remove(resource_id).map(|(_, r)| r)
    }

    /// Apply a confirmed change to a resource
    pub fn update<F>(&self, resource_id: &str, apply: F) -> SchedulerResult<Resource>
    where
        F: FnOnce(&mut Resource),
    {
        let mut entry = self
            .resources
            .get_mut(resource_id)
            .ok_or_else(|| SchedulerError::UnknownResource(resource_id.to_string()))?;
        apply(entry.value_mut());
        Ok(entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceKind, ResourceSpec, ResourceStatus};

    fn resource(id: &str) -> Resource {
        Resource {
            id: id.to_string(),
            instance_id: format!("i-{}", id),
            kind: ResourceKind::Compute,
            spec: ResourceSpec {
                instance_class: "ecs.c6.large".to_string(),
                cpu_cores: 2,
                memory_gb: 4.0,
                storage_gb: 40.0,
                attachments: vec![],
            },
            status: ResourceStatus::Running,
            region: Some("cn-hangzhou".to_string()),
            hourly_cost: 0.32,
        }
    }

    #[test]
    fn test_register_and_list_sorted() {
        let registry = ResourceRegistry::new();
        assert!(registry.register(resource("r2")));
        assert!(registry.register(resource("r1")));
        assert!(!registry.register(resource("r1")));

        assert_eq!(registry.ids(), vec!["r1", "r2"]);
        assert_eq!(registry.list()[0].id, "r1");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_update_unknown_resource() {
        let registry = ResourceRegistry::new();
        let result = registry.update("missing", |r| r.status = ResourceStatus::Stopped);
        assert!(matches!(result, Err(SchedulerError::UnknownResource(_))));
    }

    #[test]
    fn test_update_applies_change() {
        let registry = ResourceRegistry::new();
        registry.register(resource("r1"));
        let updated = registry
            .update("r1", |r| r.instance_id = "i-new".to_string())
            .unwrap();
        assert_eq!(updated.instance_id, "i-new");
        assert_eq!(registry.get("r1").unwrap().instance_id, "i-new");
    }
}
