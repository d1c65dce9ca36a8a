pub mod concurrency;
pub mod connector;
pub mod delivery;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod policy;
pub mod publisher;
pub mod registry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod types;
pub mod workers;
