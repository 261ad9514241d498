//! Filter expressions over member attributes
//!
//! All comparisons see the logical value of an attribute, so a filter
//! matches flat and legacy-wrapped documents alike. The JSON form follows
//! the familiar operator-object layout:
//!
//! ```text
//! {"gender": "Male", "age": {"$gte": 18}, "$or": [{"booth": 4}, {"booth": 5}]}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::errors::{PartitionError, PartitionResult};
use crate::document::{LegacyValueNormalizer, Member, Value, ID_KEY};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Value in list
    In,
    /// Attribute presence (`true`) or absence (`false`)
    Exists,
    /// Case-insensitive string equality
    IEq,
}

impl FilterOperator {
    /// Operator key in the JSON form
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "$eq",
            FilterOperator::Ne => "$ne",
            FilterOperator::Gt => "$gt",
            FilterOperator::Gte => "$gte",
            FilterOperator::Lt => "$lt",
            FilterOperator::Lte => "$lte",
            FilterOperator::In => "$in",
            FilterOperator::Exists => "$exists",
            FilterOperator::IEq => "$ieq",
        }
    }

    fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => FilterOperator::Eq,
            "$ne" => FilterOperator::Ne,
            "$gt" => FilterOperator::Gt,
            "$gte" => FilterOperator::Gte,
            "$lt" => FilterOperator::Lt,
            "$lte" => FilterOperator::Lte,
            "$in" => FilterOperator::In,
            "$exists" => FilterOperator::Exists,
            "$ieq" => FilterOperator::IEq,
            _ => return None,
        })
    }
}

/// A single `field <op> value` clause
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl FilterExpr {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Evaluates the clause against the raw stored value of its field.
    pub fn eval(&self, raw: Option<&Value>) -> bool {
        let actual = LegacyValueNormalizer::unwrap_opt(raw);

        match self.operator {
            FilterOperator::Eq => eq_match(actual, &self.value),
            FilterOperator::Ne => !eq_match(actual, &self.value),
            FilterOperator::Gt => range_match(actual, &self.value, |o| o.is_gt()),
            FilterOperator::Gte => range_match(actual, &self.value, |o| o.is_ge()),
            FilterOperator::Lt => range_match(actual, &self.value, |o| o.is_lt()),
            FilterOperator::Lte => range_match(actual, &self.value, |o| o.is_le()),
            FilterOperator::In => match &self.value {
                Value::Sequence(options) => options.iter().any(|o| eq_match(actual, o)),
                _ => false,
            },
            FilterOperator::IEq => match (actual, &self.value) {
                (Some(Value::String(a)), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
                _ => false,
            },
            FilterOperator::Exists => raw.is_some() == self.value.as_bool().unwrap_or(true),
        }
    }
}

/// `eq null` also matches an absent attribute.
fn eq_match(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(v) => v == expected,
    }
}

/// Range comparisons only between values of the same variant.
fn range_match(
    actual: Option<&Value>,
    bound: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    match (actual, bound) {
        (Some(a @ Value::Number(_)), Value::Number(_))
        | (Some(a @ Value::String(_)), Value::String(_))
        | (Some(a @ Value::Timestamp(_)), Value::Timestamp(_)) => accept(a.total_cmp(bound)),
        _ => false,
    }
}

/// Conjunction of clauses and disjunction groups.
///
/// Every clause and every group must match; a group matches when one of
/// its alternatives does. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonValue", into = "JsonValue")]
pub struct Filter {
    all: Vec<FilterExpr>,
    any: Vec<Vec<Filter>>,
}

impl Filter {
    /// Matches everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, expr: FilterExpr) -> Self {
        self.all.push(expr);
        self
    }

    /// Adds a disjunction group; one of its alternatives must match.
    pub fn or(mut self, alternatives: Vec<Filter>) -> Self {
        self.any.push(alternatives);
        self
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(FilterExpr::new(field, FilterOperator::Eq, value.into()))
    }

    pub fn exists(field: impl Into<String>, present: bool) -> Self {
        Self::new().and(FilterExpr::new(field, FilterOperator::Exists, Value::Bool(present)))
    }

    pub fn eq_ignore_case(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new().and(FilterExpr::new(
            field,
            FilterOperator::IEq,
            Value::String(value.into()),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.any.is_empty()
    }

    pub fn clauses(&self) -> &[FilterExpr] {
        &self.all
    }

    /// Evaluates against any attribute source.
    pub fn matches_with<'a, F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        self.all.iter().all(|expr| expr.eval(lookup(&expr.field)))
            && self
                .any
                .iter()
                .all(|group| group.iter().any(|f| f.matches_with(lookup)))
    }

    pub fn matches(&self, member: &Member) -> bool {
        let id = Value::String(member.id().as_str().to_string());
        self.matches_with(&|field: &str| {
            if field == ID_KEY {
                Some(&id)
            } else {
                member.raw(field)
            }
        })
    }

    pub fn matches_row(&self, row: &BTreeMap<String, Value>) -> bool {
        self.matches_with(&|field: &str| row.get(field))
    }

    /// Parses the JSON operator-object form.
    pub fn from_json(json: &JsonValue) -> PartitionResult<Self> {
        let obj = match json {
            JsonValue::Null => return Ok(Self::new()),
            JsonValue::Object(obj) => obj,
            other => {
                return Err(PartitionError::InvalidQuery(format!(
                    "filter must be an object, got {}",
                    other
                )))
            }
        };

        let mut filter = Self::new();
        for (key, value) in obj {
            match key.as_str() {
                "$or" => filter.any.push(Self::parse_list(key, value)?),
                "$and" => {
                    for sub in Self::parse_list(key, value)? {
                        filter.all.extend(sub.all);
                        filter.any.extend(sub.any);
                    }
                }
                k if k.starts_with('$') => {
                    return Err(PartitionError::InvalidQuery(format!(
                        "unsupported top-level operator '{}'",
                        k
                    )))
                }
                field => filter.all.extend(Self::parse_field(field, value)?),
            }
        }
        Ok(filter)
    }

    fn parse_list(key: &str, value: &JsonValue) -> PartitionResult<Vec<Filter>> {
        value
            .as_array()
            .ok_or_else(|| PartitionError::InvalidQuery(format!("'{}' expects an array", key)))?
            .iter()
            .map(Self::from_json)
            .collect()
    }

    fn parse_field(field: &str, value: &JsonValue) -> PartitionResult<Vec<FilterExpr>> {
        let ops = match value {
            JsonValue::Object(obj)
                if !obj.is_empty()
                    && obj.keys().all(|k| k.starts_with('$'))
                    && !obj.contains_key("$date") =>
            {
                obj
            }
            literal => {
                return Ok(vec![FilterExpr::new(
                    field,
                    FilterOperator::Eq,
                    Value::from_json(literal.clone()),
                )])
            }
        };

        ops.iter()
            .map(|(op, operand)| {
                let operator = FilterOperator::parse(op).ok_or_else(|| {
                    PartitionError::InvalidQuery(format!("unsupported operator '{}'", op))
                })?;
                let operand = Value::from_json(operand.clone());
                if operator == FilterOperator::In && !matches!(operand, Value::Sequence(_)) {
                    return Err(PartitionError::InvalidQuery(format!(
                        "'$in' on '{}' expects an array",
                        field
                    )));
                }
                Ok(FilterExpr::new(field, operator, operand))
            })
            .collect()
    }

    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        for expr in &self.all {
            let entry = obj
                .entry(expr.field.clone())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            if let JsonValue::Object(ops) = entry {
                ops.insert(expr.operator.as_str().to_string(), expr.value.to_json());
            }
        }
        let group_json = |group: &Vec<Filter>| {
            JsonValue::Array(group.iter().map(Filter::to_json).collect())
        };
        match self.any.as_slice() {
            [] => {}
            [group] => {
                obj.insert("$or".to_string(), group_json(group));
            }
            groups => {
                let conjuncts = groups
                    .iter()
                    .map(|g| {
                        let mut wrapper = serde_json::Map::new();
                        wrapper.insert("$or".to_string(), group_json(g));
                        JsonValue::Object(wrapper)
                    })
                    .collect();
                obj.insert("$and".to_string(), JsonValue::Array(conjuncts));
            }
        }
        JsonValue::Object(obj)
    }
}

impl TryFrom<JsonValue> for Filter {
    type Error = PartitionError;

    fn try_from(json: JsonValue) -> Result<Self, Self::Error> {
        Filter::from_json(&json)
    }
}

impl From<Filter> for JsonValue {
    fn from(filter: Filter) -> Self {
        filter.to_json()
    }
}
