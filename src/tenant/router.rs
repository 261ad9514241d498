//! Shard router
//!
//! Resolves a tenant identifier to its partition. Keys resolve directly;
//! aliases are matched case-insensitively against the configured alias
//! attributes of the documents in each partition. Partitions are probed in
//! ascending key order and the first partition holding a matching document
//! wins.

use std::sync::Arc;

use super::errors::{TenantError, TenantResult};
use super::key::TenantIdentifier;
use super::registry::TenantPartitionRegistry;
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::partition::{Filter, PartitionHandle};

pub struct ShardRouter {
    registry: Arc<TenantPartitionRegistry>,
    alias_fields: Vec<String>,
    metrics: Arc<MetricsRegistry>,
}

impl ShardRouter {
    pub fn new(
        registry: Arc<TenantPartitionRegistry>,
        alias_fields: Vec<String>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry,
            alias_fields,
            metrics,
        }
    }

    pub fn registry(&self) -> &TenantPartitionRegistry {
        &self.registry
    }

    /// Resolves an identifier to the partition that owns it.
    pub async fn route(&self, identifier: &TenantIdentifier) -> TenantResult<PartitionHandle> {
        let handle = match identifier.canonical() {
            TenantIdentifier::Key(key) => self.registry.resolve(key)?.clone(),
            TenantIdentifier::Alias(alias) => self.route_alias(&alias).await?,
        };
        let tenant = handle.key().to_string();
        let id = identifier.to_string();
        log_event(Event::TenantRouted, &[("identifier", &id), ("tenant", &tenant)]);
        Ok(handle)
    }

    async fn route_alias(&self, alias: &str) -> TenantResult<PartitionHandle> {
        self.metrics.increment_alias_lookups();
        let filter = self.alias_filter(alias);
        for handle in self.registry.partitions() {
            let hit = handle
                .find_one(&filter)
                .await
                .map_err(|source| TenantError::Partition {
                    tenant: handle.key(),
                    source,
                })?;
            if hit.is_some() {
                return Ok(handle.clone());
            }
        }
        log_event(Event::TenantUnresolved, &[("alias", alias)]);
        Err(TenantError::AmbiguousOrUnknownTenant(alias.to_string()))
    }

    fn alias_filter(&self, alias: &str) -> Filter {
        let alternatives = self
            .alias_fields
            .iter()
            .map(|field| Filter::eq_ignore_case(field.clone(), alias))
            .collect();
        Filter::new().or(alternatives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Member;
    use crate::partition::{MemoryPartition, PartitionError, PartitionStore};
    use crate::tenant::TenantKey;
    use serde_json::json;

    fn member(id: &str, attrs: serde_json::Value) -> Member {
        let mut doc = attrs;
        doc["_id"] = json!(id);
        Member::from_json(doc).unwrap()
    }

    fn router() -> (ShardRouter, Arc<MemoryPartition>) {
        let p1 = Arc::new(MemoryPartition::with_members(
            "members_ac_1",
            [member("a", json!({"aci_name": "Varanasi"}))],
        ));
        let p2 = Arc::new(MemoryPartition::with_members(
            "members_ac_2",
            [member("b", json!({"ac_name": {"value": "Kashi North", "visible": true}}))],
        ));
        let registry = TenantPartitionRegistry::new(vec![
            (TenantKey::new(1), p1.clone() as Arc<dyn PartitionStore>),
            (TenantKey::new(2), p2 as Arc<dyn PartitionStore>),
        ])
        .unwrap();
        let router = ShardRouter::new(
            Arc::new(registry),
            vec!["aci_name".into(), "ac_name".into()],
            Arc::new(MetricsRegistry::new()),
        );
        (router, p1)
    }

    #[tokio::test]
    async fn test_route_by_key() {
        let (router, _) = router();
        let handle = router.route(&TenantIdentifier::parse("2")).await.unwrap();
        assert_eq!(handle.key(), TenantKey::new(2));
        assert!(matches!(
            router.route(&TenantIdentifier::parse("5")).await,
            Err(TenantError::UnknownTenant(_))
        ));
    }

    #[tokio::test]
    async fn test_route_by_alias_ignores_case_and_wrapping() {
        let (router, _) = router();
        let handle = router.route(&TenantIdentifier::parse("VARANASI")).await.unwrap();
        assert_eq!(handle.key(), TenantKey::new(1));
        let handle = router.route(&"kashi north".into()).await.unwrap();
        assert_eq!(handle.key(), TenantKey::new(2));
    }

    #[tokio::test]
    async fn test_unknown_alias() {
        let (router, _) = router();
        assert_eq!(
            router.route(&"Nowhere".into()).await.unwrap_err(),
            TenantError::AmbiguousOrUnknownTenant("Nowhere".into())
        );
    }

    #[tokio::test]
    async fn test_alias_probe_failure_is_reported() {
        let (router, p1) = router();
        p1.set_offline(true);
        let err = router.route(&"Kashi North".into()).await.unwrap_err();
        assert_eq!(
            err,
            TenantError::Partition {
                tenant: TenantKey::new(1),
                source: PartitionError::Unavailable("members_ac_1".into()),
            }
        );
    }
}
