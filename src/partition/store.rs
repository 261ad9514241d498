//! Partition store trait
//!
//! A partition is one physical collection of member documents. Every call
//! is a round-trip to the backend and returns a boxed future so that the
//! trait stays object-safe behind `Arc<dyn PartitionStore>`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::aggregate::{Pipeline, Row};
use super::errors::PartitionResult;
use super::filter::Filter;
use super::sorter::SortSpec;
use super::update::{DocumentWrite, Update, WriteSummary};
use crate::document::{DocumentId, Member};
use crate::tenant::TenantKey;

/// Future returned by partition operations
pub type PartitionFuture<'a, T> = Pin<Box<dyn Future<Output = PartitionResult<T>> + Send + 'a>>;

/// Options for `find`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    /// Maximum documents returned
    #[serde(default)]
    pub limit: Option<usize>,
    /// Documents skipped after filtering and sorting
    #[serde(default)]
    pub skip: usize,
    /// Sort order; natural (ascending id) order when absent
    #[serde(default)]
    pub sort: Option<SortSpec>,
    /// Keyset paging: only ids strictly greater than this one
    #[serde(default)]
    pub after_id: Option<DocumentId>,
}

impl FindOptions {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Page of `size` documents in id order following `after`
    pub fn page_after(after: Option<DocumentId>, size: usize) -> Self {
        Self {
            limit: Some(size),
            after_id: after,
            ..Self::default()
        }
    }

    pub fn sorted(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// Access to one physical partition
pub trait PartitionStore: Send + Sync {
    /// Physical collection name
    fn name(&self) -> &str;

    fn count<'a>(&'a self, filter: &'a Filter) -> PartitionFuture<'a, u64>;

    fn find<'a>(&'a self, filter: &'a Filter, options: &'a FindOptions)
        -> PartitionFuture<'a, Vec<Member>>;

    fn find_one<'a>(&'a self, filter: &'a Filter) -> PartitionFuture<'a, Option<Member>>;

    fn find_by_id<'a>(&'a self, id: &'a DocumentId) -> PartitionFuture<'a, Option<Member>>;

    fn aggregate<'a>(&'a self, pipeline: &'a Pipeline) -> PartitionFuture<'a, Vec<Row>>;

    fn insert(&self, member: Member) -> PartitionFuture<'_, DocumentId>;

    /// Applies an update to one document; returns the updated document.
    fn update_by_id<'a>(
        &'a self,
        id: &'a DocumentId,
        update: &'a Update,
    ) -> PartitionFuture<'a, Option<Member>>;

    fn update_many<'a>(
        &'a self,
        filter: &'a Filter,
        update: &'a Update,
    ) -> PartitionFuture<'a, WriteSummary>;

    /// Ordered conditional writes. Stops at the first failure with
    /// `WriteInterrupted`, leaving earlier writes committed.
    fn bulk_write(&self, writes: Vec<DocumentWrite>) -> PartitionFuture<'_, WriteSummary>;
}

/// A tenant's resident partition accessor
#[derive(Clone)]
pub struct PartitionHandle {
    key: TenantKey,
    store: Arc<dyn PartitionStore>,
}

impl PartitionHandle {
    pub fn new(key: TenantKey, store: Arc<dyn PartitionStore>) -> Self {
        Self { key, store }
    }

    pub fn key(&self) -> TenantKey {
        self.key
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub fn store(&self) -> &dyn PartitionStore {
        self.store.as_ref()
    }
}

impl fmt::Debug for PartitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionHandle")
            .field("key", &self.key)
            .field("name", &self.store.name())
            .finish()
    }
}

impl std::ops::Deref for PartitionHandle {
    type Target = dyn PartitionStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}
