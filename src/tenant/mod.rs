//! Tenants and partition routing
//!
//! Every tenant (one constituency) owns exactly one partition. The
//! [`TenantPartitionRegistry`] holds the fixed key-to-partition map and the
//! [`ShardRouter`] resolves keys or constituency aliases against it.

mod config;
mod errors;
mod key;
mod registry;
mod router;

pub use config::TenantConfig;
pub use errors::{TenantError, TenantResult};
pub use key::{TenantIdentifier, TenantKey};
pub use registry::TenantPartitionRegistry;
pub use router::ShardRouter;
