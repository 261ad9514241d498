//! Fan-out query engine
//!
//! Runs the same logical operation against one partition or against every
//! partition of the registry. Cross-partition calls use a bounded worker
//! pool; results are merged in ascending tenant key order regardless of
//! completion order. The first partition failure cancels the rest of the
//! call and is returned: a partial total is never reported as complete.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::cancel::CancellationToken;
use super::config::FanoutConfig;
use super::errors::{QueryError, QueryResult};
use crate::document::{DocumentId, Member};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::partition::{
    Filter, FindOptions, PartitionFuture, PartitionHandle, Pipeline, ResultSorter, Row, SortSpec,
};
use crate::tenant::{TenantKey, TenantPartitionRegistry};

/// A result tagged with the tenant whose partition produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Located<T> {
    pub tenant: TenantKey,
    pub item: T,
}

impl<T> Located<T> {
    pub fn new(tenant: TenantKey, item: T) -> Self {
        Self { tenant, item }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Located<U> {
        Located {
            tenant: self.tenant,
            item: f(self.item),
        }
    }
}

/// Options for `find_across_all`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FanoutFind {
    /// Global result cap; `None` scans everything
    #[serde(default)]
    pub limit: Option<usize>,
    /// Global order; partition-grouped order when absent
    #[serde(default)]
    pub sort: Option<SortSpec>,
}

impl FanoutFind {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            sort: None,
        }
    }

    pub fn sorted(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }
}

pub struct FanoutQueryEngine {
    registry: Arc<TenantPartitionRegistry>,
    config: FanoutConfig,
    metrics: Arc<MetricsRegistry>,
}

impl FanoutQueryEngine {
    pub fn new(
        registry: Arc<TenantPartitionRegistry>,
        config: FanoutConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry,
            config,
            metrics,
        }
    }

    pub fn registry(&self) -> &TenantPartitionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    fn workers(&self) -> usize {
        self.config.workers_for(self.registry.len())
    }

    // ==================
    // Single partition
    // ==================

    pub async fn count_in(&self, tenant: TenantKey, filter: &Filter) -> QueryResult<u64> {
        let handle = self.registry.resolve(tenant)?;
        handle
            .count(filter)
            .await
            .map_err(|source| QueryError::partition(tenant, source))
    }

    pub async fn find_in(
        &self,
        tenant: TenantKey,
        filter: &Filter,
        options: &FindOptions,
    ) -> QueryResult<Vec<Member>> {
        let handle = self.registry.resolve(tenant)?;
        handle
            .find(filter, options)
            .await
            .map_err(|source| QueryError::partition(tenant, source))
    }

    pub async fn find_one_in(&self, tenant: TenantKey, filter: &Filter) -> QueryResult<Option<Member>> {
        let handle = self.registry.resolve(tenant)?;
        handle
            .find_one(filter)
            .await
            .map_err(|source| QueryError::partition(tenant, source))
    }

    pub async fn find_by_id_in(
        &self,
        tenant: TenantKey,
        id: &DocumentId,
    ) -> QueryResult<Option<Member>> {
        let handle = self.registry.resolve(tenant)?;
        handle
            .find_by_id(id)
            .await
            .map_err(|source| QueryError::partition(tenant, source))
    }

    pub async fn aggregate_in(&self, tenant: TenantKey, pipeline: &Pipeline) -> QueryResult<Vec<Row>> {
        let handle = self.registry.resolve(tenant)?;
        handle
            .aggregate(pipeline)
            .await
            .map_err(|source| QueryError::partition(tenant, source))
    }

    // ==================
    // Every partition
    // ==================

    /// Per-tenant match counts
    pub async fn count_per_partition(&self, filter: &Filter) -> QueryResult<BTreeMap<TenantKey, u64>> {
        let counts = self.fan_out("count", |p| p.count(filter)).await?;
        Ok(counts.into_iter().collect())
    }

    /// Total match count over every partition
    pub async fn count_across_all(&self, filter: &Filter) -> QueryResult<u64> {
        let counts = self.count_per_partition(filter).await?;
        Ok(counts.values().sum())
    }

    /// Matching members from every partition.
    ///
    /// Unsorted results are grouped by partition in ascending key order,
    /// each partition contributing at most the configured sample. Sorted
    /// results are globally ordered; ties keep partition order.
    pub async fn find_across_all(
        &self,
        filter: &Filter,
        find: &FanoutFind,
    ) -> QueryResult<Vec<Located<Member>>> {
        let per_partition = match (&find.sort, find.limit) {
            (None, Some(limit)) => Some(limit.min(self.config.per_partition_sample)),
            (_, limit) => limit,
        };
        let options = FindOptions {
            limit: per_partition,
            sort: find.sort.clone(),
            ..FindOptions::default()
        };

        let found = self.fan_out("find", |p| p.find(filter, &options)).await?;
        let mut merged: Vec<Located<Member>> = found
            .into_iter()
            .flat_map(|(tenant, members)| members.into_iter().map(move |m| Located::new(tenant, m)))
            .collect();

        if let Some(spec) = &find.sort {
            merged.sort_by(|a, b| ResultSorter::compare_members(&a.item, &b.item, spec));
        }
        if let Some(limit) = find.limit {
            merged.truncate(limit);
        }
        Ok(merged)
    }

    /// One unsorted page over the partition-grouped order, plus the total.
    ///
    /// Per-tenant counts place `skip` inside the right partition, so every
    /// matching member is reachable however deep the page.
    pub async fn find_page_across_all(
        &self,
        filter: &Filter,
        skip: usize,
        limit: usize,
    ) -> QueryResult<(u64, Vec<Located<Member>>)> {
        let counts = self.count_per_partition(filter).await?;
        let total = counts.values().sum();

        let mut skip = skip;
        let mut page = Vec::new();
        for (tenant, count) in counts {
            if page.len() >= limit {
                break;
            }
            let count = usize::try_from(count).unwrap_or(usize::MAX);
            if skip >= count {
                skip -= count;
                continue;
            }
            let options = FindOptions {
                limit: Some(limit - page.len()),
                skip,
                ..FindOptions::default()
            };
            let found = self.find_in(tenant, filter, &options).await?;
            page.extend(found.into_iter().map(|m| Located::new(tenant, m)));
            skip = 0;
        }
        Ok((total, page))
    }

    /// First matching member by partition order (not globally best).
    pub async fn find_one_across_all(&self, filter: &Filter) -> QueryResult<Option<Located<Member>>> {
        self.first_hit("find_one", |p| p.find_one(filter)).await
    }

    /// Locates a member by id. Ids are unique per partition only; the
    /// lowest tenant key holding the id wins.
    pub async fn find_by_id_across_all(&self, id: &DocumentId) -> QueryResult<Option<Located<Member>>> {
        self.first_hit("find_by_id", |p| p.find_by_id(id)).await
    }

    /// Runs a pipeline over the union of every partition.
    ///
    /// Leading match/project stages and a directly following group run
    /// inside each partition; partial groups are combined and the remaining
    /// stages run over the merged rows.
    pub async fn aggregate_across_all(&self, pipeline: &Pipeline) -> QueryResult<Vec<Row>> {
        let plan = pipeline.split_for_fanout();
        let partials = self
            .fan_out("aggregate", |p| p.aggregate(&plan.pushdown))
            .await?;

        let mut rows: Vec<Row> = partials.into_iter().flat_map(|(_, rows)| rows).collect();
        if let Some(group) = &plan.merge {
            rows = group.merge_partials(rows);
        }
        Ok(plan.rest.run(rows))
    }

    /// Issues `run` against every partition through the worker pool.
    ///
    /// Returns per-tenant results in ascending key order, or the first
    /// partition failure observed.
    async fn fan_out<'a, T, F>(&'a self, operation: &str, run: F) -> QueryResult<Vec<(TenantKey, T)>>
    where
        F: Fn(&'a PartitionHandle) -> PartitionFuture<'a, T>,
    {
        self.metrics.increment_fanout_calls();
        let workers = self.workers();
        let partitions = self.registry.len().to_string();
        log_event(
            Event::FanoutBegin,
            &[("operation", operation), ("partitions", &partitions)],
        );

        let token = CancellationToken::new();
        let metrics = &self.metrics;
        let jobs = self.registry.partitions().map(|handle| {
            let token = token.clone();
            let call = run(handle);
            async move {
                let tenant = handle.key();
                if token.is_cancelled() {
                    return (tenant, None);
                }
                metrics.increment_partition_probes();
                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    result = call => Some(result),
                };
                (tenant, outcome)
            }
        });

        let mut pending = stream::iter(jobs).buffer_unordered(workers);
        let mut results = Vec::with_capacity(self.registry.len());
        let mut failure = None;
        // Drain so cancelled siblings settle before returning.
        while let Some((tenant, outcome)) = pending.next().await {
            match outcome {
                Some(Ok(value)) => results.push((tenant, value)),
                Some(Err(source)) if failure.is_none() => {
                    token.cancel();
                    failure = Some(QueryError::partition(tenant, source));
                }
                Some(Err(_)) | None => {}
            }
        }

        if let Some(err) = failure {
            self.abort(operation, &err);
            return Err(err);
        }

        results.sort_by_key(|(tenant, _)| *tenant);
        log_event(
            Event::FanoutComplete,
            &[("operation", operation), ("partitions", &partitions)],
        );
        Ok(results)
    }

    /// Probes partitions in windows of `workers`, ascending by key, and
    /// returns the lowest-key hit. A failure on a lower key than any hit
    /// aborts the call, exactly as a sequential scan would.
    async fn first_hit<'a, F>(&'a self, operation: &str, run: F) -> QueryResult<Option<Located<Member>>>
    where
        F: Fn(&'a PartitionHandle) -> PartitionFuture<'a, Option<Member>>,
    {
        self.metrics.increment_fanout_calls();
        let handles: Vec<&'a PartitionHandle> = self.registry.partitions().collect();

        for window in handles.chunks(self.workers()) {
            let outcomes = future::join_all(window.iter().map(|handle| {
                self.metrics.increment_partition_probes();
                run(*handle)
            }))
            .await;

            for (handle, outcome) in window.iter().zip(outcomes) {
                match outcome {
                    Ok(Some(member)) => return Ok(Some(Located::new(handle.key(), member))),
                    Ok(None) => {}
                    Err(source) => {
                        let err = QueryError::partition(handle.key(), source);
                        self.abort(operation, &err);
                        return Err(err);
                    }
                }
            }
        }
        Ok(None)
    }

    fn abort(&self, operation: &str, err: &QueryError) {
        self.metrics.increment_fanout_failures();
        let tenant = err
            .failed_tenant()
            .map(|t| t.to_string())
            .unwrap_or_default();
        let reason = err.to_string();
        log_event(
            Event::FanoutAborted,
            &[("operation", operation), ("tenant", &tenant), ("reason", &reason)],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{Accumulator, GroupSpec, MemoryPartition, PartitionError, PartitionStore};
    use crate::tenant::TenantError;
    use serde_json::json;
    use std::time::Duration;

    fn member(id: &str, attrs: serde_json::Value) -> Member {
        let mut doc = attrs;
        doc["_id"] = json!(id);
        Member::from_json(doc).unwrap()
    }

    /// Partitions keyed 1..=n, partition k holding k members
    fn engine_with(n: u16, workers: usize) -> (FanoutQueryEngine, Vec<Arc<MemoryPartition>>) {
        let stores: Vec<Arc<MemoryPartition>> = (1..=n)
            .map(|k| {
                let members = (0..k).map(|i| {
                    member(&format!("m{}", i), json!({"age": 20 + i as i64, "ac": k as i64}))
                });
                Arc::new(MemoryPartition::with_members(format!("members_ac_{}", k), members))
            })
            .collect();
        let registry = TenantPartitionRegistry::new(
            stores
                .iter()
                .enumerate()
                .map(|(i, s)| (TenantKey::new(i as u16 + 1), s.clone() as Arc<dyn PartitionStore>)),
        )
        .unwrap();
        let config = FanoutConfig {
            max_workers: workers,
            per_partition_sample: 2,
        };
        let engine = FanoutQueryEngine::new(Arc::new(registry), config, Arc::new(MetricsRegistry::new()));
        (engine, stores)
    }

    #[tokio::test]
    async fn test_count_across_all_equals_sum_of_counts() {
        let (engine, _) = engine_with(5, 2);
        let filter = Filter::new();
        let mut sum = 0;
        for key in engine.registry().all_tenant_keys() {
            sum += engine.count_in(key, &filter).await.unwrap();
        }
        assert_eq!(engine.count_across_all(&filter).await.unwrap(), sum);
        assert_eq!(sum, 15);
    }

    #[tokio::test]
    async fn test_count_per_partition_is_keyed() {
        let (engine, _) = engine_with(3, 3);
        let counts = engine.count_per_partition(&Filter::new()).await.unwrap();
        let expected: BTreeMap<TenantKey, u64> =
            [(1, 1), (2, 2), (3, 3)].into_iter().map(|(k, c)| (TenantKey::new(k), c)).collect();
        assert_eq!(counts, expected);
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let (engine, _) = engine_with(2, 2);
        let err = engine.count_in(TenantKey::new(9), &Filter::new()).await.unwrap_err();
        assert_eq!(err, QueryError::Tenant(TenantError::UnknownTenant(TenantKey::new(9))));
    }

    #[tokio::test]
    async fn test_partition_failure_aborts_count() {
        let (engine, stores) = engine_with(4, 2);
        stores[2].set_offline(true);
        let err = engine.count_across_all(&Filter::new()).await.unwrap_err();
        assert_eq!(err.failed_tenant(), Some(TenantKey::new(3)));
        assert!(matches!(
            err,
            QueryError::Partition {
                source: PartitionError::Unavailable(_),
                ..
            }
        ));
        assert_eq!(engine.metrics.snapshot().fanout_failures, 1);
    }

    #[tokio::test]
    async fn test_first_failure_cancels_slow_partitions() {
        let slow = Arc::new(
            MemoryPartition::with_members("members_ac_1", [member("a", json!({}))])
                .with_latency(Duration::from_secs(5)),
        );
        let down = Arc::new(MemoryPartition::with_members("members_ac_2", [member("b", json!({}))]));
        down.set_offline(true);
        let registry = TenantPartitionRegistry::new(vec![
            (TenantKey::new(1), slow as Arc<dyn PartitionStore>),
            (TenantKey::new(2), down as Arc<dyn PartitionStore>),
        ])
        .unwrap();
        let engine = FanoutQueryEngine::new(
            Arc::new(registry),
            FanoutConfig::default(),
            Arc::new(MetricsRegistry::new()),
        );

        let outcome = tokio::time::timeout(
            Duration::from_millis(500),
            engine.count_across_all(&Filter::new()),
        )
        .await
        .expect("failure should not wait for the slow partition");
        let err = outcome.unwrap_err();
        assert_eq!(err.failed_tenant(), Some(TenantKey::new(2)));
    }

    #[tokio::test]
    async fn test_find_page_across_all_skips_by_counts() {
        let (engine, _) = engine_with(3, 2);
        let (total, page) = engine
            .find_page_across_all(&Filter::new(), 2, 3)
            .await
            .unwrap();
        assert_eq!(total, 6);
        let placed: Vec<(u16, &str)> = page
            .iter()
            .map(|l| (l.tenant.get(), l.item.id().as_str()))
            .collect();
        assert_eq!(placed, vec![(2, "m1"), (3, "m0"), (3, "m1")]);

        // past the sample of 2 inside one partition
        let (_, page) = engine
            .find_page_across_all(&Filter::new(), 5, 10)
            .await
            .unwrap();
        let placed: Vec<(u16, &str)> = page
            .iter()
            .map(|l| (l.tenant.get(), l.item.id().as_str()))
            .collect();
        assert_eq!(placed, vec![(3, "m2")]);
    }

    #[tokio::test]
    async fn test_merge_order_ignores_completion_order() {
        let slow = Arc::new(
            MemoryPartition::with_members("members_ac_1", [member("a", json!({}))])
                .with_latency(Duration::from_millis(30)),
        );
        let fast = Arc::new(MemoryPartition::with_members("members_ac_2", [member("b", json!({}))]));
        let registry = TenantPartitionRegistry::new(vec![
            (TenantKey::new(1), slow as Arc<dyn PartitionStore>),
            (TenantKey::new(2), fast as Arc<dyn PartitionStore>),
        ])
        .unwrap();
        let engine = FanoutQueryEngine::new(
            Arc::new(registry),
            FanoutConfig::default(),
            Arc::new(MetricsRegistry::new()),
        );
        let found = engine
            .find_across_all(&Filter::new(), &FanoutFind::default())
            .await
            .unwrap();
        let tenants: Vec<u16> = found.iter().map(|l| l.tenant.get()).collect();
        assert_eq!(tenants, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_find_across_all_is_partition_grouped_and_sampled() {
        let (engine, _) = engine_with(3, 2);
        let found = engine
            .find_across_all(&Filter::new(), &FanoutFind::limit(4))
            .await
            .unwrap();
        // sample of 2 per partition: 1 + 2 + 2, truncated to 4
        let tenants: Vec<u16> = found.iter().map(|l| l.tenant.get()).collect();
        assert_eq!(tenants, vec![1, 2, 2, 3]);
    }

    #[tokio::test]
    async fn test_find_across_all_sorted_globally() {
        let (engine, _) = engine_with(3, 3);
        let find = FanoutFind::limit(3).sorted(SortSpec::desc("age"));
        let found = engine.find_across_all(&Filter::new(), &find).await.unwrap();
        let ages: Vec<f64> = found
            .iter()
            .map(|l| l.item.value("age").and_then(|v| v.as_f64()).unwrap())
            .collect();
        assert_eq!(ages, vec![22.0, 21.0, 21.0]);
        assert_eq!(found[0].tenant, TenantKey::new(3));
    }

    #[tokio::test]
    async fn test_find_one_prefers_lowest_key() {
        let (engine, _) = engine_with(4, 4);
        let hit = engine
            .find_one_across_all(&Filter::eq("age", 21))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.tenant, TenantKey::new(2));

        let none = engine.find_one_across_all(&Filter::eq("age", 99)).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_find_by_id_error_below_hit_aborts() {
        let (engine, stores) = engine_with(3, 3);
        // m2 lives only in partition 3
        stores[0].set_offline(true);
        let err = engine.find_by_id_across_all(&"m2".into()).await.unwrap_err();
        assert_eq!(err.failed_tenant(), Some(TenantKey::new(1)));

        stores[0].set_offline(false);
        stores[2].set_offline(true);
        // m0 found in partition 1 before the failing partition matters
        let hit = engine.find_by_id_across_all(&"m0".into()).await.unwrap().unwrap();
        assert_eq!(hit.tenant, TenantKey::new(1));
    }

    #[tokio::test]
    async fn test_aggregate_merges_partial_groups() {
        let (engine, _) = engine_with(3, 2);
        let pipeline = Pipeline::new().group(
            GroupSpec::by("age")
                .accumulate("n", Accumulator::Count)
                .accumulate("total", Accumulator::Sum("ac".into())),
        );
        let rows = engine.aggregate_across_all(&pipeline).await.unwrap();
        let summary: Vec<(f64, f64, f64)> = rows
            .iter()
            .map(|r| {
                (
                    r["_id"].as_f64().unwrap(),
                    r["n"].as_f64().unwrap(),
                    r["total"].as_f64().unwrap(),
                )
            })
            .collect();
        assert_eq!(summary, vec![(20.0, 3.0, 6.0), (21.0, 2.0, 5.0), (22.0, 1.0, 3.0)]);
    }
}
