//! Partition access layer
//!
//! One partition holds the member documents of one tenant. Callers reach a
//! partition through a [`PartitionHandle`] obtained from the tenant
//! registry; the handle wraps an `Arc<dyn PartitionStore>` so resident
//! in-memory partitions and remote collections are interchangeable.
//!
//! Filters, sorts and aggregation read attribute values through the legacy
//! normalizer, so both stored encodings behave identically.

mod aggregate;
mod errors;
mod filter;
mod memory;
mod sorter;
mod store;
mod update;

pub use aggregate::{Accumulator, AccumulatorSpec, GroupSpec, Pipeline, PushdownPlan, Row, Stage};
pub use errors::{PartitionError, PartitionResult};
pub use filter::{Filter, FilterExpr, FilterOperator};
pub use memory::MemoryPartition;
pub use sorter::{ResultSorter, SortDirection, SortSpec};
pub use store::{FindOptions, PartitionFuture, PartitionHandle, PartitionStore};
pub use update::{DocumentWrite, Update, UpdateOp, WriteSummary};
