//! Aggregation pipelines
//!
//! Pipelines run over rows (attribute maps with `_id`). Grouping reads
//! logical values, so wrapped and flat encodings land in the same group.
//!
//! For cross-partition execution a pipeline is split into a part pushed
//! down to each partition and a part evaluated over the merged rows; see
//! [`Pipeline::split_for_fanout`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::filter::Filter;
use super::sorter::{ResultSorter, SortSpec};
use crate::document::{LegacyValueNormalizer, Value, ID_KEY};

/// An aggregation row
pub type Row = BTreeMap<String, Value>;

/// Per-group accumulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fn", content = "field", rename_all = "snake_case")]
pub enum Accumulator {
    Count,
    Sum(String),
    Min(String),
    Max(String),
}

impl Accumulator {
    fn initial(&self) -> Value {
        match self {
            Accumulator::Count | Accumulator::Sum(_) => Value::Number(0.0),
            Accumulator::Min(_) | Accumulator::Max(_) => Value::Null,
        }
    }

    fn fold(&self, state: &mut Value, row: &Row) {
        match self {
            Accumulator::Count => add(state, 1.0),
            Accumulator::Sum(field) => {
                if let Some(n) = logical(row, field).and_then(Value::as_f64) {
                    add(state, n);
                }
            }
            Accumulator::Min(field) | Accumulator::Max(field) => {
                if let Some(v) = logical(row, field) {
                    self.combine(state, v);
                }
            }
        }
    }

    /// Combines a partial result produced by another partition.
    fn combine(&self, state: &mut Value, partial: &Value) {
        match self {
            Accumulator::Count | Accumulator::Sum(_) => add(state, partial.as_f64().unwrap_or(0.0)),
            Accumulator::Min(_) => {
                if !partial.is_null() && (state.is_null() || partial.total_cmp(state).is_lt()) {
                    *state = partial.clone();
                }
            }
            Accumulator::Max(_) => {
                if !partial.is_null() && (state.is_null() || partial.total_cmp(state).is_gt()) {
                    *state = partial.clone();
                }
            }
        }
    }
}

fn add(state: &mut Value, n: f64) {
    *state = Value::Number(state.as_f64().unwrap_or(0.0) + n);
}

fn logical<'a>(row: &'a Row, field: &str) -> Option<&'a Value> {
    LegacyValueNormalizer::unwrap_opt(row.get(field))
}

/// Named accumulator in a group stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorSpec {
    pub name: String,
    pub accumulator: Accumulator,
}

/// Group rows by one field (or everything together when `by` is `None`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub accumulators: Vec<AccumulatorSpec>,
}

impl GroupSpec {
    pub fn by(field: impl Into<String>) -> Self {
        Self {
            by: Some(field.into()),
            accumulators: Vec::new(),
        }
    }

    pub fn accumulate(mut self, name: impl Into<String>, accumulator: Accumulator) -> Self {
        self.accumulators.push(AccumulatorSpec {
            name: name.into(),
            accumulator,
        });
        self
    }

    /// Groups raw rows.
    pub fn evaluate(&self, rows: Vec<Row>) -> Vec<Row> {
        let key_of = |row: &Row| match &self.by {
            Some(field) => logical(row, field).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        };
        self.collect(rows, key_of, |spec, state, row| spec.accumulator.fold(state, row))
    }

    /// Combines rows previously produced by `evaluate` on disjoint inputs.
    pub fn merge_partials(&self, rows: Vec<Row>) -> Vec<Row> {
        let key_of = |row: &Row| row.get(ID_KEY).cloned().unwrap_or(Value::Null);
        self.collect(rows, key_of, |spec, state, row| {
            if let Some(partial) = row.get(&spec.name) {
                spec.accumulator.combine(state, partial);
            }
        })
    }

    fn collect<K, F>(&self, rows: Vec<Row>, key_of: K, step: F) -> Vec<Row>
    where
        K: Fn(&Row) -> Value,
        F: Fn(&AccumulatorSpec, &mut Value, &Row),
    {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();

        for row in &rows {
            let key = key_of(row);
            let slot = *index.entry(key.to_json().to_string()).or_insert_with(|| {
                let states = self.accumulators.iter().map(|a| a.accumulator.initial()).collect();
                groups.push((key.clone(), states));
                groups.len() - 1
            });
            let states = &mut groups[slot].1;
            for (spec, state) in self.accumulators.iter().zip(states.iter_mut()) {
                step(spec, state, row);
            }
        }

        groups.sort_by(|a, b| a.0.total_cmp(&b.0));
        groups
            .into_iter()
            .map(|(key, states)| {
                let mut out = Row::new();
                out.insert(ID_KEY.to_string(), key);
                for (spec, state) in self.accumulators.iter().zip(states) {
                    out.insert(spec.name.clone(), state);
                }
                out
            })
            .collect()
    }
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Match { filter: Filter },
    /// Keep only the listed fields (plus `_id`)
    Project { fields: Vec<String> },
    Group(GroupSpec),
    Sort(SortSpec),
    Skip { count: usize },
    Limit { count: usize },
}

/// Ordered list of stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// A pipeline split for cross-partition execution
#[derive(Debug, Clone, PartialEq)]
pub struct PushdownPlan {
    /// Runs inside every partition
    pub pushdown: Pipeline,
    /// Combines per-partition partial groups, when a group was pushed down
    pub merge: Option<GroupSpec>,
    /// Runs over the merged rows
    pub rest: Pipeline,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn matching(self, filter: Filter) -> Self {
        self.stage(Stage::Match { filter })
    }

    pub fn group(self, spec: GroupSpec) -> Self {
        self.stage(Stage::Group(spec))
    }

    pub fn sort(self, spec: SortSpec) -> Self {
        self.stage(Stage::Sort(spec))
    }

    pub fn limit(self, count: usize) -> Self {
        self.stage(Stage::Limit { count })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Evaluates every stage in order.
    pub fn run(&self, mut rows: Vec<Row>) -> Vec<Row> {
        for stage in &self.stages {
            rows = match stage {
                Stage::Match { filter } => rows.into_iter().filter(|r| filter.matches_row(r)).collect(),
                Stage::Project { fields } => rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .filter(|(k, _)| k == ID_KEY || fields.contains(k))
                            .collect()
                    })
                    .collect(),
                Stage::Group(spec) => spec.evaluate(rows),
                Stage::Sort(spec) => {
                    ResultSorter::sort_rows(&mut rows, spec);
                    rows
                }
                Stage::Skip { count } => rows.into_iter().skip(*count).collect(),
                Stage::Limit { count } => rows.into_iter().take(*count).collect(),
            };
        }
        rows
    }

    /// Splits off the leading stages that are safe to run per partition.
    ///
    /// Leading `Match` and `Project` stages are pushed down, together with
    /// a `Group` that immediately follows them. Everything after that runs
    /// over the merged rows.
    pub fn split_for_fanout(&self) -> PushdownPlan {
        let mut pushdown = Vec::new();
        let mut merge = None;
        let mut rest_start = self.stages.len();

        for (i, stage) in self.stages.iter().enumerate() {
            match stage {
                Stage::Match { .. } | Stage::Project { .. } => pushdown.push(stage.clone()),
                Stage::Group(spec) => {
                    pushdown.push(stage.clone());
                    merge = Some(spec.clone());
                    rest_start = i + 1;
                    break;
                }
                _ => {
                    rest_start = i;
                    break;
                }
            }
        }

        PushdownPlan {
            pushdown: Pipeline { stages: pushdown },
            merge,
            rest: Pipeline {
                stages: self.stages[rest_start..].to_vec(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Member;
    use serde_json::json;

    fn rows() -> Vec<Row> {
        [
            json!({"_id": "1", "gender": "Male", "age": 30}),
            json!({"_id": "2", "gender": {"value": "Male", "visible": true}, "age": 50}),
            json!({"_id": "3", "gender": "Female", "age": 41}),
            json!({"_id": "4"}),
        ]
        .into_iter()
        .map(|j| Member::from_json(j).unwrap().to_row())
        .collect()
    }

    fn count_by_gender() -> GroupSpec {
        GroupSpec::by("gender")
            .accumulate("n", Accumulator::Count)
            .accumulate("total_age", Accumulator::Sum("age".into()))
            .accumulate("oldest", Accumulator::Max("age".into()))
    }

    #[test]
    fn test_group_reads_logical_values() {
        let out = Pipeline::new().group(count_by_gender()).run(rows());
        assert_eq!(out.len(), 3);
        let male = out.iter().find(|r| r[ID_KEY] == Value::from("Male")).unwrap();
        assert_eq!(male["n"], Value::from(2));
        assert_eq!(male["total_age"], Value::from(80));
        assert_eq!(male["oldest"], Value::from(50));
        let missing = out.iter().find(|r| r[ID_KEY].is_null()).unwrap();
        assert_eq!(missing["oldest"], Value::Null);
    }

    #[test]
    fn test_merge_partials_equals_single_pass() {
        let all = rows();
        let spec = count_by_gender();
        let whole = spec.evaluate(all.clone());

        let (left, right) = all.split_at(2);
        let mut partials = spec.evaluate(left.to_vec());
        partials.extend(spec.evaluate(right.to_vec()));
        assert_eq!(spec.merge_partials(partials), whole);
    }

    #[test]
    fn test_match_sort_limit() {
        let out = Pipeline::new()
            .matching(Filter::exists("age", true))
            .sort(SortSpec::desc("age"))
            .limit(2)
            .run(rows());
        let ids: Vec<_> = out.iter().map(|r| r[ID_KEY].clone()).collect();
        assert_eq!(ids, vec![Value::from("2"), Value::from("3")]);
    }

    #[test]
    fn test_project_keeps_id() {
        let out = Pipeline::new()
            .stage(Stage::Project { fields: vec!["age".into()] })
            .run(rows());
        assert_eq!(out[0].keys().collect::<Vec<_>>(), vec!["_id", "age"]);
    }

    #[test]
    fn test_split_pushes_down_leading_group() {
        let pipeline = Pipeline::new()
            .matching(Filter::eq("gender", "Male"))
            .group(count_by_gender())
            .sort(SortSpec::desc("n"));
        let plan = pipeline.split_for_fanout();
        assert_eq!(plan.pushdown.stages().len(), 2);
        assert!(plan.merge.is_some());
        assert_eq!(plan.rest.stages().len(), 1);
    }

    #[test]
    fn test_split_stops_at_sort() {
        let pipeline = Pipeline::new()
            .matching(Filter::new())
            .sort(SortSpec::asc("age"))
            .group(count_by_gender());
        let plan = pipeline.split_for_fanout();
        assert_eq!(plan.pushdown.stages().len(), 1);
        assert!(plan.merge.is_none());
        assert_eq!(plan.rest.stages().len(), 2);
    }

    #[test]
    fn test_pipeline_json_form() {
        let pipeline: Pipeline = serde_json::from_value(json!([
            {"stage": "match", "filter": {"gender": "Male"}},
            {"stage": "group", "by": "booth", "accumulators": [
                {"name": "n", "accumulator": {"fn": "count"}},
                {"name": "age", "accumulator": {"fn": "sum", "field": "age"}}
            ]},
            {"stage": "limit", "count": 5}
        ]))
        .unwrap();
        assert_eq!(pipeline.stages().len(), 3);
    }
}
