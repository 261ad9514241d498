//! Member document model
//!
//! Members have an open attribute schema. Each attribute is a closed
//! [`Value`] variant, stored either flat or in the legacy `{value, visible}`
//! wrapper. [`LegacyValueNormalizer`] is the single place that tells the two
//! encodings apart.

mod errors;
mod infer;
mod legacy;
mod member;
mod value;

pub use errors::{DocumentError, DocumentResult};
pub use infer::{infer_from_samples, infer_type, FieldType};
pub use legacy::{has_meaningful_value, LegacyValueNormalizer, Unwrapped};
pub use member::{is_system_attribute, DocumentId, Member, ID_KEY, SYSTEM_ATTRIBUTES};
pub use value::Value;
