//! Fan-out query execution
//!
//! [`FanoutQueryEngine`] executes find, count, aggregate, find-one and
//! find-by-id against one tenant's partition or against all of them.
//! Cross-partition calls are fail-fast: the first partition failure
//! cancels outstanding probes and is returned to the caller.

mod cancel;
mod config;
mod engine;
mod errors;

pub use cancel::CancellationToken;
pub use config::FanoutConfig;
pub use engine::{FanoutFind, FanoutQueryEngine, Located};
pub use errors::{QueryError, QueryResult};
