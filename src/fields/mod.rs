//! Field schema registry and online schema evolution
//!
//! Field descriptors live in a [`MetadataStore`], apart from the member
//! partitions. [`FieldSchemaRegistry`] keeps the two in step: adding,
//! renaming, deleting or re-defaulting a field also rewrites the affected
//! documents in every partition, in ordered batches and without locking
//! the partitions.
//!
//! Multi-partition mutations are not transactional. A partition failure
//! stops the operation with [`FieldError::Interrupted`], carrying the
//! number of documents already committed.

mod config;
mod descriptor;
mod discover;
mod errors;
mod flatten;
mod metadata;
mod name;
mod registry;
mod rename;

pub use config::SchemaConfig;
pub use descriptor::{FieldDescriptor, FieldPatch, NewField};
pub use discover::{DiscoveredField, DiscoveryReport};
pub use errors::{FieldError, FieldResult, MetadataError, MetadataResult};
pub use flatten::{FlattenReport, PartitionFlatten};
pub use metadata::{MemoryMetadataStore, MetadataFuture, MetadataStore};
pub use name::validate_field_name;
pub use registry::{
    AddFieldReport, DeleteFieldReport, FieldSchemaRegistry, PartitionCounts, UpdateFieldReport,
    VisibilityReport,
};
pub use rename::{RejectReason, RenameOutcome, RenameReport};
