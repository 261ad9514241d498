//! Tenant partition registry
//!
//! Maps every configured tenant key to its resident partition handle. The
//! tenant set is fixed at construction; lookups are lock-free reads of an
//! immutable map.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::config::TenantConfig;
use super::errors::{TenantError, TenantResult};
use super::key::TenantKey;
use crate::observability::{log_event, Event};
use crate::partition::{MemoryPartition, PartitionHandle, PartitionStore};

/// Tenant key to partition mapping, sorted by key
#[derive(Debug, Clone)]
pub struct TenantPartitionRegistry {
    partitions: BTreeMap<TenantKey, PartitionHandle>,
}

impl TenantPartitionRegistry {
    /// Builds a registry from explicit partitions.
    ///
    /// Rejects an empty tenant set and duplicate keys.
    pub fn new<I>(partitions: I) -> TenantResult<Self>
    where
        I: IntoIterator<Item = (TenantKey, Arc<dyn PartitionStore>)>,
    {
        let mut map = BTreeMap::new();
        for (key, store) in partitions {
            if map.contains_key(&key) {
                return Err(TenantError::InvalidConfig(format!(
                    "tenant {} configured twice",
                    key
                )));
            }
            map.insert(key, PartitionHandle::new(key, store));
        }
        if map.is_empty() {
            return Err(TenantError::InvalidConfig(
                "at least one tenant is required".to_string(),
            ));
        }

        let registry = Self { partitions: map };
        let count = registry.len().to_string();
        let keys = registry
            .all_tenant_keys()
            .iter()
            .map(TenantKey::to_string)
            .collect::<Vec<_>>()
            .join(",");
        log_event(Event::RegistryReady, &[("partitions", &count), ("keys", &keys)]);
        Ok(registry)
    }

    /// Builds a registry by asking `open` for each configured partition.
    pub fn from_config<F>(config: &TenantConfig, mut open: F) -> TenantResult<Self>
    where
        F: FnMut(TenantKey, String) -> Arc<dyn PartitionStore>,
    {
        let partitions: Vec<_> = config
            .keys
            .iter()
            .map(|&key| (key, open(key, config.partition_name(key))))
            .collect();
        Self::new(partitions)
    }

    /// Registry backed by empty resident partitions.
    pub fn in_memory(config: &TenantConfig) -> TenantResult<Self> {
        Self::from_config(config, |_, name| Arc::new(MemoryPartition::new(name)))
    }

    /// The partition of a configured tenant.
    pub fn resolve(&self, key: TenantKey) -> TenantResult<&PartitionHandle> {
        self.partitions
            .get(&key)
            .ok_or(TenantError::UnknownTenant(key))
    }

    /// Every configured key, ascending
    pub fn all_tenant_keys(&self) -> Vec<TenantKey> {
        self.partitions.keys().copied().collect()
    }

    /// Every partition, ascending by key
    pub fn partitions(&self) -> impl Iterator<Item = &PartitionHandle> {
        self.partitions.values()
    }

    pub fn contains(&self, key: TenantKey) -> bool {
        self.partitions.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}
