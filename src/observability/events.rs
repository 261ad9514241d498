//! Observable events
//!
//! Events are explicit and typed. Each carries a fixed severity so call
//! sites never pick one ad hoc.

use std::fmt;

use super::logger::Severity;

/// Observable events in the member store
///
/// These events cover:
/// - Lifecycle and configuration
/// - Tenant routing
/// - Cross-partition fan-out
/// - Schema evolution and its write batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Tenant registry built
    RegistryReady,

    // Routing
    /// Identifier resolved to a partition
    TenantRouted,
    /// Alias matched no partition
    TenantUnresolved,

    // Fan-out
    /// Cross-partition operation started
    FanoutBegin,
    /// Cross-partition operation finished on every partition
    FanoutComplete,
    /// A partition failed; the whole operation was abandoned
    FanoutAborted,

    // Schema evolution
    /// Field registered and backfilled
    FieldAdded,
    /// Field descriptor patched
    FieldUpdated,
    /// Field renamed without collisions
    FieldRenamed,
    /// Field renamed into an existing field
    FieldMerged,
    /// Metadata rename collided; fell back to a merge
    RenameMergeFallback,
    /// Field removed from every document and the metadata
    FieldDeleted,
    /// Visibility flag changed, descriptor possibly synthesized
    FieldVisibilityChanged,
    /// Fields discovered from a document sample
    FieldsDiscovered,
    /// Legacy flattening started
    LegacyFlattenBegin,
    /// Legacy flattening finished
    LegacyFlattenComplete,
    /// One write batch committed
    BatchCommitted,
    /// Multi-partition mutation stopped part-way
    MutationInterrupted,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RegistryReady => "TENANT_REGISTRY_READY",

            Event::TenantRouted => "TENANT_ROUTED",
            Event::TenantUnresolved => "TENANT_UNRESOLVED",

            Event::FanoutBegin => "FANOUT_BEGIN",
            Event::FanoutComplete => "FANOUT_COMPLETE",
            Event::FanoutAborted => "FANOUT_ABORTED",

            Event::FieldAdded => "FIELD_ADDED",
            Event::FieldUpdated => "FIELD_UPDATED",
            Event::FieldRenamed => "FIELD_RENAMED",
            Event::FieldMerged => "FIELD_MERGED",
            Event::RenameMergeFallback => "FIELD_RENAME_MERGE_FALLBACK",
            Event::FieldDeleted => "FIELD_DELETED",
            Event::FieldVisibilityChanged => "FIELD_VISIBILITY_CHANGED",
            Event::FieldsDiscovered => "FIELDS_DISCOVERED",
            Event::LegacyFlattenBegin => "LEGACY_FLATTEN_BEGIN",
            Event::LegacyFlattenComplete => "LEGACY_FLATTEN_COMPLETE",
            Event::BatchCommitted => "BATCH_COMMITTED",
            Event::MutationInterrupted => "MUTATION_INTERRUPTED",
        }
    }

    /// Returns the fixed severity of the event
    ///
    /// Per-partition fan-out progress and batch commits are TRACE; aborted
    /// or interrupted work is ERROR.
    pub fn severity(&self) -> Severity {
        match self {
            Event::FanoutBegin | Event::FanoutComplete | Event::BatchCommitted => Severity::Trace,
            Event::TenantUnresolved | Event::RenameMergeFallback => Severity::Warn,
            Event::FanoutAborted | Event::MutationInterrupted => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
