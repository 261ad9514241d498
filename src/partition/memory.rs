//! Resident in-memory partition
//!
//! Documents live in a `BTreeMap` keyed by id, so natural order is
//! ascending id and keyset paging is a range scan. Transport faults can be
//! injected to exercise fail-fast and partial-completion paths.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::aggregate::{Pipeline, Row};
use super::errors::{PartitionError, PartitionResult};
use super::filter::Filter;
use super::sorter::ResultSorter;
use super::store::{FindOptions, PartitionFuture, PartitionStore};
use super::update::{DocumentWrite, Update, WriteSummary};
use crate::document::{DocumentId, Member};

type Documents = BTreeMap<DocumentId, Member>;

/// In-process partition backend
#[derive(Debug)]
pub struct MemoryPartition {
    name: String,
    documents: RwLock<Documents>,
    offline: AtomicBool,
    /// Remaining document writes before an injected failure
    write_budget: Mutex<Option<u64>>,
    latency: Option<Duration>,
}

impl MemoryPartition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(BTreeMap::new()),
            offline: AtomicBool::new(false),
            write_budget: Mutex::new(None),
            latency: None,
        }
    }

    pub fn with_members(name: impl Into<String>, members: impl IntoIterator<Item = Member>) -> Self {
        let partition = Self::new(name);
        if let Ok(mut docs) = partition.documents.write() {
            for m in members {
                docs.insert(m.id().clone(), m);
            }
        }
        partition
    }

    /// Adds a simulated round-trip delay to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While offline every call fails with `Unavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Lets `n` more document writes succeed, then fails every write.
    /// `None` removes the limit.
    pub fn fail_writes_after(&self, n: Option<u64>) {
        if let Ok(mut budget) = self.write_budget.lock() {
            *budget = n;
        }
    }

    /// Number of stored documents (bypasses fault injection)
    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of one stored document, in its raw encoding
    pub fn get(&self, id: &str) -> Option<Member> {
        self.documents
            .read()
            .ok()
            .and_then(|d| d.get(&DocumentId::new(id)).cloned())
    }

    async fn round_trip(&self) -> PartitionResult<()> {
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(PartitionError::Unavailable(self.name.clone()));
        }
        Ok(())
    }

    fn read(&self) -> PartitionResult<RwLockReadGuard<'_, Documents>> {
        self.documents
            .read()
            .map_err(|_| PartitionError::transport(&self.name, "lock poisoned"))
    }

    fn write(&self) -> PartitionResult<RwLockWriteGuard<'_, Documents>> {
        self.documents
            .write()
            .map_err(|_| PartitionError::transport(&self.name, "lock poisoned"))
    }

    fn take_write_permit(&self) -> Result<(), String> {
        let mut budget = self
            .write_budget
            .lock()
            .map_err(|_| "lock poisoned".to_string())?;
        match *budget {
            Some(0) => Err("injected write failure".to_string()),
            Some(n) => {
                *budget = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn interrupted(&self, applied: u64, reason: String) -> PartitionError {
        PartitionError::WriteInterrupted {
            partition: self.name.clone(),
            applied,
            reason,
        }
    }

    fn find_now(&self, filter: &Filter, options: &FindOptions) -> PartitionResult<Vec<Member>> {
        let docs = self.read()?;
        let lower = match &options.after_id {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        let candidates = docs
            .range::<DocumentId, _>((lower, Bound::Unbounded))
            .map(|(_, m)| m)
            .filter(|m| filter.matches(m));

        let found: Vec<Member> = match &options.sort {
            Some(spec) => {
                let mut all: Vec<Member> = candidates.cloned().collect();
                ResultSorter::sort_members(&mut all, spec);
                all.into_iter()
                    .skip(options.skip)
                    .take(options.limit.unwrap_or(usize::MAX))
                    .collect()
            }
            None => candidates
                .skip(options.skip)
                .take(options.limit.unwrap_or(usize::MAX))
                .cloned()
                .collect(),
        };
        Ok(found)
    }

    fn update_many_now(&self, filter: &Filter, update: &Update) -> PartitionResult<WriteSummary> {
        let mut docs = self.write()?;
        let mut summary = WriteSummary::default();
        for member in docs.values_mut().filter(|m| filter.matches(m)) {
            summary.matched += 1;
            let mut candidate = member.clone();
            if update.apply(&mut candidate) {
                self.take_write_permit()
                    .map_err(|reason| self.interrupted(summary.modified, reason))?;
                *member = candidate;
                summary.modified += 1;
            }
        }
        Ok(summary)
    }

    fn bulk_write_now(&self, writes: Vec<DocumentWrite>) -> PartitionResult<WriteSummary> {
        let mut docs = self.write()?;
        let mut summary = WriteSummary::default();
        for write in writes {
            let Some(member) = docs.get_mut(&write.id) else {
                continue;
            };
            if let Some(condition) = &write.condition {
                if !condition.matches(member) {
                    continue;
                }
            }
            summary.matched += 1;
            let mut candidate = member.clone();
            if write.update.apply(&mut candidate) {
                self.take_write_permit()
                    .map_err(|reason| self.interrupted(summary.modified, reason))?;
                *member = candidate;
                summary.modified += 1;
            }
        }
        Ok(summary)
    }
}

impl PartitionStore for MemoryPartition {
    fn name(&self) -> &str {
        &self.name
    }

    fn count<'a>(&'a self, filter: &'a Filter) -> PartitionFuture<'a, u64> {
        Box::pin(async move {
            self.round_trip().await?;
            let docs = self.read()?;
            Ok(docs.values().filter(|m| filter.matches(m)).count() as u64)
        })
    }

    fn find<'a>(
        &'a self,
        filter: &'a Filter,
        options: &'a FindOptions,
    ) -> PartitionFuture<'a, Vec<Member>> {
        Box::pin(async move {
            self.round_trip().await?;
            self.find_now(filter, options)
        })
    }

    fn find_one<'a>(&'a self, filter: &'a Filter) -> PartitionFuture<'a, Option<Member>> {
        Box::pin(async move {
            self.round_trip().await?;
            let docs = self.read()?;
            Ok(docs.values().find(|m| filter.matches(m)).cloned())
        })
    }

    fn find_by_id<'a>(&'a self, id: &'a DocumentId) -> PartitionFuture<'a, Option<Member>> {
        Box::pin(async move {
            self.round_trip().await?;
            Ok(self.read()?.get(id).cloned())
        })
    }

    fn aggregate<'a>(&'a self, pipeline: &'a Pipeline) -> PartitionFuture<'a, Vec<Row>> {
        Box::pin(async move {
            self.round_trip().await?;
            let rows: Vec<Row> = self.read()?.values().map(Member::to_row).collect();
            Ok(pipeline.run(rows))
        })
    }

    fn insert(&self, member: Member) -> PartitionFuture<'_, DocumentId> {
        Box::pin(async move {
            self.round_trip().await?;
            let mut docs = self.write()?;
            if docs.contains_key(member.id()) {
                return Err(PartitionError::DuplicateId(member.id().clone()));
            }
            self.take_write_permit()
                .map_err(|reason| PartitionError::transport(&self.name, reason))?;
            let id = member.id().clone();
            docs.insert(id.clone(), member);
            Ok(id)
        })
    }

    fn update_by_id<'a>(
        &'a self,
        id: &'a DocumentId,
        update: &'a Update,
    ) -> PartitionFuture<'a, Option<Member>> {
        Box::pin(async move {
            self.round_trip().await?;
            let mut docs = self.write()?;
            let Some(member) = docs.get_mut(id) else {
                return Ok(None);
            };
            let mut candidate = member.clone();
            if update.apply(&mut candidate) {
                self.take_write_permit()
                    .map_err(|reason| PartitionError::transport(&self.name, reason))?;
                *member = candidate;
            }
            Ok(Some(member.clone()))
        })
    }

    fn update_many<'a>(
        &'a self,
        filter: &'a Filter,
        update: &'a Update,
    ) -> PartitionFuture<'a, WriteSummary> {
        Box::pin(async move {
            self.round_trip().await?;
            self.update_many_now(filter, update)
        })
    }

    fn bulk_write(&self, writes: Vec<DocumentWrite>) -> PartitionFuture<'_, WriteSummary> {
        Box::pin(async move {
            self.round_trip().await?;
            self.bulk_write_now(writes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Value;
    use crate::partition::sorter::SortSpec;
    use serde_json::json;

    fn seeded() -> MemoryPartition {
        let members = (1..=5).map(|i| {
            Member::from_json(json!({"_id": format!("m{}", i), "age": 20 + i, "booth": i % 2}))
                .unwrap()
        });
        MemoryPartition::with_members("members_ac_1", members)
    }

    #[tokio::test]
    async fn test_count_and_find() {
        let p = seeded();
        assert_eq!(p.count(&Filter::new()).await.unwrap(), 5);
        assert_eq!(p.count(&Filter::eq("booth", 1)).await.unwrap(), 3);

        let found = p.find(&Filter::new(), &FindOptions::limit(2)).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.id().as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_keyset_paging() {
        let p = seeded();
        let page = p
            .find(&Filter::new(), &FindOptions::page_after(Some("m3".into()), 10))
            .await
            .unwrap();
        let ids: Vec<_> = page.iter().map(|m| m.id().as_str()).collect();
        assert_eq!(ids, vec!["m4", "m5"]);
    }

    #[tokio::test]
    async fn test_sorted_find() {
        let p = seeded();
        let opts = FindOptions::limit(1).sorted(SortSpec::desc("age"));
        let found = p.find(&Filter::new(), &opts).await.unwrap();
        assert_eq!(found[0].id().as_str(), "m5");
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let p = seeded();
        p.set_offline(true);
        let err = p.count(&Filter::new()).await.unwrap_err();
        assert_eq!(err, PartitionError::Unavailable("members_ac_1".into()));
        p.set_offline(false);
        assert!(p.count(&Filter::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let p = seeded();
        let dup = Member::new("m1".into());
        assert!(matches!(p.insert(dup).await, Err(PartitionError::DuplicateId(_))));
    }

    #[tokio::test]
    async fn test_update_many_counts_modifications() {
        let p = seeded();
        let summary = p
            .update_many(&Filter::exists("flag", false), &Update::new().set("flag", false))
            .await
            .unwrap();
        assert_eq!(summary, WriteSummary { matched: 5, modified: 5 });
        assert_eq!(p.count(&Filter::eq("flag", false)).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_bulk_write_checks_condition_at_write_time() {
        let p = seeded();
        let writes = vec![
            DocumentWrite::new("m1".into(), Update::new().set("x", 1)).when(Filter::exists("x", false)),
            DocumentWrite::new("m1".into(), Update::new().set("x", 2)).when(Filter::exists("x", false)),
            DocumentWrite::new("missing".into(), Update::new().set("x", 3)),
        ];
        let summary = p.bulk_write(writes).await.unwrap();
        assert_eq!(summary, WriteSummary { matched: 1, modified: 1 });
        assert_eq!(p.get("m1").unwrap().value("x"), Some(&Value::from(1)));
    }

    #[tokio::test]
    async fn test_bulk_write_interruption_keeps_prior_writes() {
        let p = seeded();
        p.fail_writes_after(Some(2));
        let writes = (1..=5)
            .map(|i| DocumentWrite::new(format!("m{}", i).as_str().into(), Update::new().set("y", i)))
            .collect();
        let err = p.bulk_write(writes).await.unwrap_err();
        assert_eq!(err.applied_writes(), 2);
        assert_eq!(p.count(&Filter::exists("y", true)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_aggregate_runs_pipeline() {
        let p = seeded();
        let rows = p
            .aggregate(&Pipeline::new().matching(Filter::eq("booth", 0)))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
