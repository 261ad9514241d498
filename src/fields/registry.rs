//! Field schema registry
//!
//! Owns the descriptor metadata and orchestrates the document mutations
//! that schema changes imply. Document mutations walk partitions in
//! ascending tenant key order, each partition in id-ordered batches of
//! `batch_size`. Batches are not atomic with each other: a failure leaves
//! earlier batches committed and reports how many documents were applied.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::config::SchemaConfig;
use super::descriptor::{FieldDescriptor, FieldPatch, NewField};
use super::errors::{FieldError, FieldResult, MetadataError};
use super::metadata::MetadataStore;
use super::name::validate_field_name;
use crate::document::{
    has_meaningful_value, infer_type, is_system_attribute, DocumentId, FieldType, LegacyValueNormalizer,
    Member, Value,
};
use crate::fanout::FanoutQueryEngine;
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::partition::{
    DocumentWrite, Filter, FilterExpr, FilterOperator, FindOptions, PartitionError, PartitionHandle,
    Update,
};
use crate::tenant::TenantKey;

/// Documents changed per tenant
pub type PartitionCounts = BTreeMap<TenantKey, u64>;

/// Result of `add_field`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddFieldReport {
    pub field: FieldDescriptor,
    /// Documents that received the default
    pub backfilled: u64,
    pub partitions: PartitionCounts,
}

/// Result of `update_field`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFieldReport {
    pub field: FieldDescriptor,
    /// Documents that received a newly set default
    pub backfilled: u64,
    pub partitions: PartitionCounts,
}

/// Result of `delete_field`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFieldReport {
    pub field: String,
    pub descriptor_removed: bool,
    /// Documents the attribute was removed from
    pub unset: u64,
    pub partitions: PartitionCounts,
}

/// Result of `set_visibility`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityReport {
    pub field: FieldDescriptor,
    /// The descriptor did not exist and was inferred from a document
    pub synthesized: bool,
}

pub struct FieldSchemaRegistry {
    pub(super) engine: Arc<FanoutQueryEngine>,
    pub(super) metadata: Arc<dyn MetadataStore>,
    pub(super) config: SchemaConfig,
    pub(super) metrics: Arc<MetricsRegistry>,
}

impl FieldSchemaRegistry {
    pub fn new(
        engine: Arc<FanoutQueryEngine>,
        metadata: Arc<dyn MetadataStore>,
        config: SchemaConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            engine,
            metadata,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// Every descriptor, ordered by name
    pub async fn list_descriptors(&self) -> FieldResult<Vec<FieldDescriptor>> {
        Ok(self.metadata.list().await?)
    }

    pub async fn get_descriptor(&self, name: &str) -> FieldResult<Option<FieldDescriptor>> {
        Ok(self.metadata.get(name).await?)
    }

    /// Registers a field and backfills its default (or null) into every
    /// document lacking the attribute.
    pub async fn add_field(&self, field: NewField) -> FieldResult<AddFieldReport> {
        validate_field_name(&field.name)?;
        if is_system_attribute(&field.name) {
            return Err(FieldError::InvalidFieldName(field.name));
        }
        if self.metadata.get(&field.name).await?.is_some() {
            return Err(FieldError::DuplicateField(field.name));
        }

        let descriptor = field.into_descriptor();
        self.metadata
            .insert(descriptor.clone())
            .await
            .map_err(|err| match err {
                MetadataError::DuplicateKey(name) => FieldError::DuplicateField(name),
                other => other.into(),
            })?;

        let partitions = self
            .backfill(&descriptor.name, &descriptor.backfill_value())
            .await?;
        let backfilled: u64 = partitions.values().sum();

        let count = backfilled.to_string();
        log_event(
            Event::FieldAdded,
            &[("field", &descriptor.name), ("backfilled", &count)],
        );
        Ok(AddFieldReport {
            field: descriptor,
            backfilled,
            partitions,
        })
    }

    /// Patches a descriptor. A meaningful new default is backfilled into
    /// documents missing the attribute; existing values are never touched.
    pub async fn update_field(&self, name: &str, patch: FieldPatch) -> FieldResult<UpdateFieldReport> {
        validate_field_name(name)?;
        let mut descriptor = self
            .metadata
            .get(name)
            .await?
            .ok_or_else(|| FieldError::NotFound(name.to_string()))?;
        descriptor.apply(&patch);
        self.metadata.replace(descriptor.clone()).await?;

        let partitions = match (&patch.default, &descriptor.default) {
            (Some(_), Some(default)) if has_meaningful_value(Some(default)) => {
                self.backfill(name, default).await?
            }
            _ => PartitionCounts::new(),
        };
        let backfilled: u64 = partitions.values().sum();

        let count = backfilled.to_string();
        log_event(Event::FieldUpdated, &[("field", name), ("backfilled", &count)]);
        Ok(UpdateFieldReport {
            field: descriptor,
            backfilled,
            partitions,
        })
    }

    /// Removes the descriptor (if any) and unsets the attribute from every
    /// document in every partition.
    pub async fn delete_field(&self, name: &str) -> FieldResult<DeleteFieldReport> {
        validate_field_name(name)?;
        let descriptor_removed = self.metadata.remove(name).await?;

        let present = Filter::exists(name, true);
        let partitions = self
            .mutate_all("delete", &present, |member| {
                Some(DocumentWrite::new(member.id().clone(), Update::new().unset(name)))
            })
            .await?;
        let unset: u64 = partitions.values().sum();

        let count = unset.to_string();
        log_event(
            Event::FieldDeleted,
            &[
                ("field", name),
                ("descriptor_removed", if descriptor_removed { "true" } else { "false" }),
                ("unset", &count),
            ],
        );
        Ok(DeleteFieldReport {
            field: name.to_string(),
            descriptor_removed,
            unset,
            partitions,
        })
    }

    /// Shows or hides a field. An undescribed field that is present in
    /// documents gets a descriptor synthesized from a stored value.
    pub async fn set_visibility(&self, name: &str, visible: bool) -> FieldResult<VisibilityReport> {
        validate_field_name(name)?;
        let patch = FieldPatch {
            visible: Some(visible),
            ..FieldPatch::default()
        };

        if let Some(field) = self.patch_existing(name, &patch).await? {
            self.log_visibility(&field, false);
            return Ok(VisibilityReport {
                field,
                synthesized: false,
            });
        }

        let field_type = self.sample_type(name).await?;
        let descriptor = FieldDescriptor::synthesized(name, field_type, visible);
        match self.metadata.insert(descriptor.clone()).await {
            Ok(()) => {
                self.log_visibility(&descriptor, true);
                Ok(VisibilityReport {
                    field: descriptor,
                    synthesized: true,
                })
            }
            // Created concurrently; apply the flag to the winner.
            Err(MetadataError::DuplicateKey(_)) => {
                self.metrics.increment_metadata_conflicts();
                let field = self
                    .patch_existing(name, &patch)
                    .await?
                    .ok_or_else(|| FieldError::NotFound(name.to_string()))?;
                self.log_visibility(&field, false);
                Ok(VisibilityReport {
                    field,
                    synthesized: false,
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn patch_existing(&self, name: &str, patch: &FieldPatch) -> FieldResult<Option<FieldDescriptor>> {
        let Some(mut descriptor) = self.metadata.get(name).await? else {
            return Ok(None);
        };
        descriptor.apply(patch);
        self.metadata.replace(descriptor.clone()).await?;
        Ok(Some(descriptor))
    }

    /// Type of one stored value, preferring a non-null one.
    async fn sample_type(&self, name: &str) -> FieldResult<FieldType> {
        let non_null = Filter::exists(name, true).and(FilterExpr::new(name, FilterOperator::Ne, Value::Null));
        let sample = match self.engine.find_one_across_all(&non_null).await? {
            Some(hit) => hit,
            None => self
                .engine
                .find_one_across_all(&Filter::exists(name, true))
                .await?
                .ok_or_else(|| FieldError::NotFound(name.to_string()))?,
        };
        Ok(sample.item.raw(name).map(infer_type).unwrap_or(FieldType::Null))
    }

    fn log_visibility(&self, field: &FieldDescriptor, synthesized: bool) {
        log_event(
            Event::FieldVisibilityChanged,
            &[
                ("field", &field.name),
                ("visible", if field.visible { "true" } else { "false" }),
                ("synthesized", if synthesized { "true" } else { "false" }),
            ],
        );
    }

    /// Writes `value` into every document lacking `name`. The absence is
    /// re-checked at write time so concurrent writers win.
    async fn backfill(&self, name: &str, value: &Value) -> FieldResult<PartitionCounts> {
        let value = LegacyValueNormalizer::flatten(value);
        let missing = Filter::exists(name, false);
        self.mutate_all("backfill", &missing, |member| {
            Some(
                DocumentWrite::new(member.id().clone(), Update::new().set(name, value.clone()))
                    .when(missing.clone()),
            )
        })
        .await
    }

    /// Runs `plan` over every document matching `filter`, partition by
    /// partition in ascending key order.
    pub(super) async fn mutate_all<P>(
        &self,
        operation: &str,
        filter: &Filter,
        mut plan: P,
    ) -> FieldResult<PartitionCounts>
    where
        P: FnMut(&Member) -> Option<DocumentWrite>,
    {
        let mut applied = 0;
        let mut counts = PartitionCounts::new();
        for handle in self.engine.registry().partitions() {
            let modified = self
                .mutate_partition(handle, operation, filter, &mut plan, &mut applied)
                .await?;
            counts.insert(handle.key(), modified);
        }
        Ok(counts)
    }

    /// Pages through one partition by id and submits each page's planned
    /// writes as one ordered bulk write. `applied` accumulates committed
    /// documents across the whole operation.
    pub(super) async fn mutate_partition<P>(
        &self,
        handle: &PartitionHandle,
        operation: &str,
        filter: &Filter,
        plan: &mut P,
        applied: &mut u64,
    ) -> FieldResult<u64>
    where
        P: FnMut(&Member) -> Option<DocumentWrite>,
    {
        let tenant = handle.key();
        let batch_size = self.config.batch_size.max(1);
        let mut after: Option<DocumentId> = None;
        let mut modified = 0;

        loop {
            let page = match handle
                .find(filter, &FindOptions::page_after(after.clone(), batch_size))
                .await
            {
                Ok(page) => page,
                Err(source) => return Err(self.interrupted(operation, tenant, *applied, source)),
            };
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id().clone());

            let writes: Vec<DocumentWrite> = page.iter().filter_map(|m| plan(m)).collect();
            if !writes.is_empty() {
                match handle.bulk_write(writes).await {
                    Ok(summary) => {
                        modified += summary.modified;
                        *applied += summary.modified;
                        self.metrics.add_documents_mutated(summary.modified);
                        let tenant_str = tenant.to_string();
                        let count = summary.modified.to_string();
                        log_event(
                            Event::BatchCommitted,
                            &[("operation", operation), ("tenant", &tenant_str), ("documents", &count)],
                        );
                    }
                    Err(source) => {
                        let partial = source.applied_writes();
                        *applied += partial;
                        self.metrics.add_documents_mutated(partial);
                        return Err(self.interrupted(operation, tenant, *applied, source));
                    }
                }
            }

            if page.len() < batch_size {
                break;
            }
        }
        Ok(modified)
    }

    fn interrupted(&self, operation: &str, tenant: TenantKey, applied: u64, source: PartitionError) -> FieldError {
        let tenant_str = tenant.to_string();
        let applied_str = applied.to_string();
        let reason = source.to_string();
        log_event(
            Event::MutationInterrupted,
            &[
                ("operation", operation),
                ("tenant", &tenant_str),
                ("applied", &applied_str),
                ("reason", &reason),
            ],
        );
        FieldError::Interrupted {
            tenant,
            applied,
            source,
        }
    }
}
