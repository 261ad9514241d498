//! memberdb - multi-tenant member store
//!
//! Member records of each constituency live in their own partition. The
//! crate routes requests to the right partition, fans queries out across
//! all of them, reads both legacy and flat attribute encodings, and evolves
//! the open field schema online.

pub mod api;
pub mod config;
pub mod document;
pub mod fanout;
pub mod fields;
pub mod observability;
pub mod partition;
pub mod tenant;

pub use api::{MemberService, ServiceError, ServiceResult};
pub use config::{ConfigError, StoreConfig};
