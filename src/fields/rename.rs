//! Field rename and merge
//!
//! Renaming never fails because the destination already exists. Documents
//! are rewritten first, partition by partition; the metadata write comes
//! last. When a document already carries the destination, the meaningful
//! value wins, the destination on a tie.

use serde::{Deserialize, Serialize};

use super::errors::{FieldError, FieldResult, MetadataError};
use super::name::validate_field_name;
use super::registry::{FieldSchemaRegistry, PartitionCounts};
use crate::document::{has_meaningful_value, LegacyValueNormalizer, Member};
use crate::observability::{log_event, Event};
use crate::partition::{DocumentWrite, Filter, FilterExpr, FilterOperator, Update};

/// Why a rename was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Source and destination are the same name
    SameName,
    /// No descriptor and no document carries the source
    SourceMissing,
}

/// Counts for a completed rename
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameReport {
    pub from: String,
    pub to: String,
    /// Documents that had no destination; value moved as is
    pub renamed: u64,
    /// Documents whose empty destination was overwritten by the source
    pub merged: u64,
    /// Documents whose destination was kept and source dropped
    pub kept_destination: u64,
    /// Documents written per tenant
    pub partitions: PartitionCounts,
}

/// Outcome of `rename_field`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RenameOutcome {
    /// Destination was unused; the descriptor moved in place
    Renamed(RenameReport),
    /// Destination existed in metadata or in documents
    Merged(RenameReport),
    Rejected(RejectReason),
}

impl RenameOutcome {
    pub fn report(&self) -> Option<&RenameReport> {
        match self {
            Self::Renamed(report) | Self::Merged(report) => Some(report),
            Self::Rejected(_) => None,
        }
    }
}

/// What happened to one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentRename {
    Moved,
    SourceWon,
    DestinationKept,
}

/// Plans the rewrite of one document carrying `from`.
fn plan_document(member: &Member, from: &str, to: &str) -> Option<(DocumentRename, DocumentWrite)> {
    let source = member.raw(from)?;
    let source_present = Filter::exists(from, true);
    let id = member.id().clone();
    let moved = || {
        Update::new()
            .set(to, LegacyValueNormalizer::flatten(source))
            .unset(from)
    };

    let planned = match member.raw(to) {
        None => (
            DocumentRename::Moved,
            DocumentWrite::new(id, moved()).when(
                source_present.and(FilterExpr::new(to, FilterOperator::Exists, false.into())),
            ),
        ),
        Some(dest) if !has_meaningful_value(Some(dest)) && has_meaningful_value(Some(source)) => (
            DocumentRename::SourceWon,
            DocumentWrite::new(id, moved()).when(source_present),
        ),
        Some(_) => (
            DocumentRename::DestinationKept,
            DocumentWrite::new(id, Update::new().unset(from)).when(source_present),
        ),
    };
    Some(planned)
}

impl FieldSchemaRegistry {
    /// Renames `from` to `to` across every partition and the metadata.
    pub async fn rename_field(&self, from: &str, to: &str) -> FieldResult<RenameOutcome> {
        validate_field_name(from)?;
        validate_field_name(to)?;
        for name in [from, to] {
            if self.config.is_protected(name) {
                return Err(FieldError::CriticalFieldProtected(name.to_string()));
            }
        }
        if from == to {
            return Ok(RenameOutcome::Rejected(RejectReason::SameName));
        }

        let source_descriptor = self.metadata.get(from).await?;
        let destination_descriptor = self.metadata.get(to).await?;
        if source_descriptor.is_none()
            && self.engine.count_across_all(&Filter::exists(from, true)).await? == 0
        {
            return Ok(RenameOutcome::Rejected(RejectReason::SourceMissing));
        }

        let mut report = RenameReport {
            from: from.to_string(),
            to: to.to_string(),
            ..RenameReport::default()
        };
        let carrying = Filter::exists(from, true);
        let (mut renamed, mut merged, mut kept) = (0, 0, 0);
        report.partitions = self
            .mutate_all("rename", &carrying, |member| {
                let (kind, write) = plan_document(member, from, to)?;
                match kind {
                    DocumentRename::Moved => renamed += 1,
                    DocumentRename::SourceWon => merged += 1,
                    DocumentRename::DestinationKept => kept += 1,
                }
                Some(write)
            })
            .await?;
        report.renamed = renamed;
        report.merged = merged;
        report.kept_destination = kept;

        let mut merge_path = destination_descriptor.is_some() || merged + kept > 0;
        match (source_descriptor, destination_descriptor) {
            (Some(_), None) => match self.metadata.rename(from, to).await {
                Ok(_) => {}
                Err(MetadataError::DuplicateKey(_)) => {
                    // Destination was described concurrently; keep it.
                    self.metrics.increment_metadata_conflicts();
                    log_event(
                        Event::RenameMergeFallback,
                        &[("from", from), ("to", to)],
                    );
                    self.metadata.remove(from).await?;
                    merge_path = true;
                }
                Err(other) => return Err(other.into()),
            },
            (Some(_), Some(_)) => {
                self.metadata.remove(from).await?;
            }
            (None, _) => {}
        }

        let counts = [
            ("renamed", report.renamed.to_string()),
            ("merged", report.merged.to_string()),
            ("kept_destination", report.kept_destination.to_string()),
        ];
        let mut fields: Vec<(&str, &str)> = vec![("from", from), ("to", to)];
        fields.extend(counts.iter().map(|(k, v)| (*k, v.as_str())));

        if merge_path {
            log_event(Event::FieldMerged, &fields);
            Ok(RenameOutcome::Merged(report))
        } else {
            log_event(Event::FieldRenamed, &fields);
            Ok(RenameOutcome::Renamed(report))
        }
    }
}
