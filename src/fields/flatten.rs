//! Legacy-to-flat conversion
//!
//! Streams every document of every partition in id order and rewrites
//! legacy-wrapped attributes to their logical value. `Flatten` updates are
//! conditional per attribute, so a value written flat in the meantime is
//! left alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::errors::FieldResult;
use super::registry::FieldSchemaRegistry;
use crate::document::Member;
use crate::observability::{log_event, Event};
use crate::partition::{DocumentWrite, Filter, Update};
use crate::tenant::TenantKey;

/// Flattening counts for one partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFlatten {
    /// Wrapped attributes rewritten
    pub attributes: u64,
    /// Documents updated
    pub documents: u64,
}

/// Result of `convert_all_legacy_to_flat`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenReport {
    pub partitions: BTreeMap<TenantKey, PartitionFlatten>,
    pub attributes: u64,
    pub documents: u64,
}

fn plan_flatten(member: &Member) -> Option<(u64, DocumentWrite)> {
    let legacy = member.legacy_attributes();
    if legacy.is_empty() {
        return None;
    }
    let update = legacy
        .iter()
        .fold(Update::new(), |update, field| update.flatten(*field));
    Some((
        legacy.len() as u64,
        DocumentWrite::new(member.id().clone(), update),
    ))
}

impl FieldSchemaRegistry {
    /// Rewrites every legacy-wrapped attribute in every partition to the
    /// flat encoding, in batches of `batch_size` documents.
    pub async fn convert_all_legacy_to_flat(&self) -> FieldResult<FlattenReport> {
        let partitions = self.engine.registry().len().to_string();
        log_event(Event::LegacyFlattenBegin, &[("partitions", &partitions)]);

        let everything = Filter::new();
        let mut report = FlattenReport::default();
        let mut applied = 0;

        for handle in self.engine.registry().partitions() {
            let mut attributes = 0;
            let documents = self
                .mutate_partition(
                    handle,
                    "flatten",
                    &everything,
                    &mut |member: &Member| {
                        let (count, write) = plan_flatten(member)?;
                        attributes += count;
                        Some(write)
                    },
                    &mut applied,
                )
                .await?;

            report.attributes += attributes;
            report.documents += documents;
            report.partitions.insert(
                handle.key(),
                PartitionFlatten {
                    attributes,
                    documents,
                },
            );
        }

        let attributes = report.attributes.to_string();
        let documents = report.documents.to_string();
        log_event(
            Event::LegacyFlattenComplete,
            &[("attributes", &attributes), ("documents", &documents)],
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::super::registry::tests::{member, registry_over};
    use super::*;
    use crate::document::{LegacyValueNormalizer, Value};
    use crate::fields::{FieldError, MemoryMetadataStore};
    use serde_json::json;
    use std::sync::Arc;

    fn legacy(value: serde_json::Value) -> serde_json::Value {
        json!({"value": value, "visible": true})
    }

    #[tokio::test]
    async fn test_flatten_reports_per_partition() {
        let parts = vec![
            vec![
                member("a", json!({"gender": legacy(json!("Male")), "age": legacy(json!(30))})),
                member("b", json!({"gender": "Female"})),
                member("c", json!({"booth": legacy(json!(null))})),
            ],
            vec![member("d", json!({"gender": legacy(json!("Male"))}))],
        ];
        let (registry, stores) = registry_over(parts, Arc::new(MemoryMetadataStore::new()));

        let report = registry.convert_all_legacy_to_flat().await.unwrap();
        assert_eq!(report.attributes, 4);
        assert_eq!(report.documents, 3);
        assert_eq!(
            report.partitions[&TenantKey::new(1)],
            PartitionFlatten {
                attributes: 3,
                documents: 2
            }
        );

        let a = stores[0].get("a").unwrap();
        assert_eq!(a.raw("gender"), Some(&Value::from("Male")));
        assert_eq!(a.raw("age"), Some(&Value::from(30)));
        assert_eq!(stores[0].get("c").unwrap().raw("booth"), Some(&Value::Null));
        for store in &stores {
            for id in ["a", "b", "c", "d"] {
                if let Some(m) = store.get(id) {
                    assert!(m.attributes().all(|(_, v)| !LegacyValueNormalizer::is_legacy(v)));
                }
            }
        }

        let again = registry.convert_all_legacy_to_flat().await.unwrap();
        assert_eq!(again.documents, 0);
    }

    #[tokio::test]
    async fn test_flatten_interruption_keeps_committed_batches() {
        let parts = vec![(0..5)
            .map(|i| member(&format!("m{}", i), json!({"g": legacy(json!(i))})))
            .collect()];
        let (registry, stores) = registry_over(parts, Arc::new(MemoryMetadataStore::new()));
        stores[0].fail_writes_after(Some(3));

        let err = registry.convert_all_legacy_to_flat().await.unwrap_err();
        assert!(matches!(err, FieldError::Interrupted { applied: 3, .. }));
        assert_eq!(stores[0].get("m2").unwrap().raw("g"), Some(&Value::from(2)));
        assert!(LegacyValueNormalizer::is_legacy(stores[0].get("m3").unwrap().raw("g").unwrap()));
    }
}
