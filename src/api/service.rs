//! Member service
//!
//! Single entry point for the HTTP layer in front of the store. Composes
//! tenant routing, fan-out reads and field schema evolution; every method
//! maps subsystem errors into [`ServiceError`].

use std::sync::Arc;

use chrono::Utc;
use futures_util::future;

use super::errors::{ServiceError, ServiceResult};
use super::request::{FindMembersRequest, MemberPatch};
use super::response::{LocatedMember, MemberPage};
use crate::config::StoreConfig;
use crate::document::{is_system_attribute, DocumentId, LegacyValueNormalizer, Value};
use crate::fanout::{FanoutFind, FanoutQueryEngine, QueryError};
use crate::fields::{
    validate_field_name, AddFieldReport, DeleteFieldReport, DiscoveryReport, FieldDescriptor,
    FieldPatch, FieldSchemaRegistry, FlattenReport, MemoryMetadataStore, MetadataStore, NewField,
    RenameOutcome, UpdateFieldReport, VisibilityReport,
};
use crate::observability::{MetricsRegistry, MetricsSnapshot};
use crate::partition::{Filter, FindOptions, Update};
use crate::tenant::{ShardRouter, TenantIdentifier, TenantKey, TenantPartitionRegistry};

/// Attribute stamped on every member update
const UPDATED_AT: &str = "updatedAt";

pub struct MemberService {
    router: ShardRouter,
    engine: Arc<FanoutQueryEngine>,
    fields: FieldSchemaRegistry,
    metrics: Arc<MetricsRegistry>,
}

impl MemberService {
    /// Builds the service over an existing registry and metadata store.
    pub fn new(
        registry: TenantPartitionRegistry,
        metadata: Arc<dyn MetadataStore>,
        config: &StoreConfig,
    ) -> ServiceResult<Self> {
        config.validate()?;
        config.apply_log_level()?;

        let registry = Arc::new(registry);
        let metrics = Arc::new(MetricsRegistry::new());
        let router = ShardRouter::new(
            registry.clone(),
            config.tenants.alias_fields.clone(),
            metrics.clone(),
        );
        let engine = Arc::new(FanoutQueryEngine::new(
            registry,
            config.fanout.clone(),
            metrics.clone(),
        ));
        let fields = FieldSchemaRegistry::new(
            engine.clone(),
            metadata,
            config.schema.clone(),
            metrics.clone(),
        );

        Ok(Self {
            router,
            engine,
            fields,
            metrics,
        })
    }

    /// Service over empty resident partitions, one per configured tenant.
    pub fn in_memory(config: &StoreConfig) -> ServiceResult<Self> {
        config.validate()?;
        let registry = TenantPartitionRegistry::in_memory(&config.tenants)?;
        Self::new(registry, Arc::new(MemoryMetadataStore::new()), config)
    }

    pub fn engine(&self) -> &FanoutQueryEngine {
        &self.engine
    }

    pub fn fields(&self) -> &FieldSchemaRegistry {
        &self.fields
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ==================
    // Members
    // ==================

    pub async fn resolve_tenant(&self, identifier: &TenantIdentifier) -> ServiceResult<TenantKey> {
        Ok(self.router.route(identifier).await?.key())
    }

    /// Counts matching members in one tenant, or in every tenant.
    pub async fn count_members(
        &self,
        tenant: Option<&TenantIdentifier>,
        filter: &Filter,
    ) -> ServiceResult<u64> {
        match tenant {
            Some(identifier) => {
                let key = self.resolve_tenant(identifier).await?;
                Ok(self.engine.count_in(key, filter).await?)
            }
            None => Ok(self.engine.count_across_all(filter).await?),
        }
    }

    /// One page of matching members, in the flat encoding.
    ///
    /// Without a sort, cross-tenant pages follow ascending tenant order.
    pub async fn find_members(&self, request: &FindMembersRequest) -> ServiceResult<MemberPage> {
        let page = request.page;
        page.validate()?;

        let (total, members) = match &request.tenant {
            Some(identifier) => {
                let key = self.resolve_tenant(identifier).await?;
                let options = FindOptions {
                    limit: Some(page.limit),
                    skip: page.offset,
                    sort: request.sort.clone(),
                    after_id: None,
                };
                let (total, found) = future::try_join(
                    self.engine.count_in(key, &request.filter),
                    self.engine.find_in(key, &request.filter, &options),
                )
                .await?;
                let members = found
                    .into_iter()
                    .map(|member| LocatedMember {
                        tenant: key,
                        member: member.normalized(),
                    })
                    .collect();
                (total, members)
            }
            None if request.sort.is_none() => {
                let (total, found) = self
                    .engine
                    .find_page_across_all(&request.filter, page.offset, page.limit)
                    .await?;
                let members = found
                    .into_iter()
                    .map(|located| LocatedMember::from(located.map(|m| m.normalized())))
                    .collect();
                (total, members)
            }
            None => {
                let find = FanoutFind {
                    limit: Some(page.window()),
                    sort: request.sort.clone(),
                };
                let (total, found) = future::try_join(
                    self.engine.count_across_all(&request.filter),
                    self.engine.find_across_all(&request.filter, &find),
                )
                .await?;
                let members = found
                    .into_iter()
                    .skip(page.offset)
                    .take(page.limit)
                    .map(|located| LocatedMember::from(located.map(|m| m.normalized())))
                    .collect();
                (total, members)
            }
        };

        Ok(MemberPage {
            members,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    /// Looks a member up in every tenant; the lowest tenant key wins.
    pub async fn find_member_by_id(&self, id: &DocumentId) -> ServiceResult<LocatedMember> {
        self.engine
            .find_by_id_across_all(id)
            .await?
            .map(|located| LocatedMember::from(located.map(|m| m.normalized())))
            .ok_or_else(|| ServiceError::NotFound(format!("member '{}'", id)))
    }

    /// Writes `patch` to the member in the flat encoding and stamps
    /// `updatedAt`. Returns the updated member.
    pub async fn update_member_by_id(
        &self,
        id: &DocumentId,
        patch: &MemberPatch,
    ) -> ServiceResult<LocatedMember> {
        if patch.is_empty() {
            return Err(ServiceError::InvalidRequest("empty patch".to_string()));
        }
        let mut update = Update::new();
        for (name, value) in patch {
            validate_field_name(name)?;
            if is_system_attribute(name) {
                return Err(ServiceError::InvalidFieldName(name.clone()));
            }
            update = update.set(name.clone(), LegacyValueNormalizer::flatten(value));
        }
        update = update.set(UPDATED_AT, Value::Timestamp(Utc::now()));

        let located = self
            .engine
            .find_by_id_across_all(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("member '{}'", id)))?;
        let tenant = located.tenant;
        let handle = self.engine.registry().resolve(tenant)?;
        let updated = handle
            .update_by_id(id, &update)
            .await
            .map_err(|source| QueryError::partition(tenant, source))?
            .ok_or_else(|| ServiceError::NotFound(format!("member '{}'", id)))?;
        self.metrics.add_documents_mutated(1);

        Ok(LocatedMember {
            tenant,
            member: updated.normalized(),
        })
    }

    // ==================
    // Fields
    // ==================

    pub async fn list_field_descriptors(&self) -> ServiceResult<Vec<FieldDescriptor>> {
        Ok(self.fields.list_descriptors().await?)
    }

    pub async fn add_field(&self, field: NewField) -> ServiceResult<AddFieldReport> {
        Ok(self.fields.add_field(field).await?)
    }

    pub async fn update_field(&self, name: &str, patch: FieldPatch) -> ServiceResult<UpdateFieldReport> {
        Ok(self.fields.update_field(name, patch).await?)
    }

    pub async fn rename_field(&self, from: &str, to: &str) -> ServiceResult<RenameOutcome> {
        Ok(self.fields.rename_field(from, to).await?)
    }

    pub async fn delete_field(&self, name: &str) -> ServiceResult<DeleteFieldReport> {
        Ok(self.fields.delete_field(name).await?)
    }

    pub async fn set_field_visibility(&self, name: &str, visible: bool) -> ServiceResult<VisibilityReport> {
        Ok(self.fields.set_visibility(name, visible).await?)
    }

    pub async fn discover_fields_from_sample(&self, sample_size: usize) -> ServiceResult<DiscoveryReport> {
        if sample_size == 0 {
            return Err(ServiceError::InvalidRequest("sample size must be positive".to_string()));
        }
        Ok(self.fields.discover_fields_from_sample(sample_size).await?)
    }

    pub async fn flatten_legacy_fields(&self) -> ServiceResult<FlattenReport> {
        Ok(self.fields.convert_all_legacy_to_flat().await?)
    }
}
