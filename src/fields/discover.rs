//! Field discovery from stored documents

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::errors::FieldResult;
use super::registry::FieldSchemaRegistry;
use crate::document::{infer_from_samples, is_system_attribute, FieldType, LegacyValueNormalizer, Value};
use crate::fanout::FanoutFind;
use crate::observability::{log_event, Event};
use crate::partition::Filter;

/// One attribute observed in the sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredField {
    pub name: String,
    /// Sampled documents carrying the attribute
    pub occurrences: u64,
    /// Of those, how many still use the legacy wrapper
    pub legacy_wrapped: u64,
    pub inferred_type: FieldType,
    /// A descriptor exists for this name
    pub described: bool,
}

/// Result of `discover_fields_from_sample`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Documents actually sampled
    pub sampled: u64,
    /// Ordered by name
    pub fields: Vec<DiscoveredField>,
}

#[derive(Default)]
struct Observed {
    occurrences: u64,
    legacy_wrapped: u64,
    values: Vec<Value>,
}

impl FieldSchemaRegistry {
    /// Samples up to `sample_size` members across all partitions and
    /// reports every non-system attribute seen.
    pub async fn discover_fields_from_sample(&self, sample_size: usize) -> FieldResult<DiscoveryReport> {
        let sample = self
            .engine
            .find_across_all(&Filter::new(), &FanoutFind::limit(sample_size))
            .await?;
        let described: BTreeSet<String> = self
            .metadata
            .list()
            .await?
            .into_iter()
            .map(|d| d.name)
            .collect();

        let mut observed: BTreeMap<String, Observed> = BTreeMap::new();
        for located in &sample {
            for (name, raw) in located.item.attributes() {
                if is_system_attribute(name) {
                    continue;
                }
                let entry = observed.entry(name.to_string()).or_default();
                entry.occurrences += 1;
                if LegacyValueNormalizer::is_legacy(raw) {
                    entry.legacy_wrapped += 1;
                }
                entry.values.push(raw.clone());
            }
        }

        let fields: Vec<DiscoveredField> = observed
            .into_iter()
            .map(|(name, seen)| DiscoveredField {
                inferred_type: infer_from_samples(seen.values.iter()),
                described: described.contains(&name),
                occurrences: seen.occurrences,
                legacy_wrapped: seen.legacy_wrapped,
                name,
            })
            .collect();

        let sampled = sample.len() as u64;
        let (sampled_str, count) = (sampled.to_string(), fields.len().to_string());
        log_event(
            Event::FieldsDiscovered,
            &[("sampled", &sampled_str), ("fields", &count)],
        );
        Ok(DiscoveryReport { sampled, fields })
    }
}
