//! Test helpers shared between unit and integration tests.
//!
//! Compiled only for tests or with the `test-utils` feature enabled.

mod connector;
mod event;
mod pipeline;
mod publisher;

pub use connector::{FailingConnector, FlakyConnector};
pub use event::{insert_change, row, update_change};
pub use pipeline::{memory_pipeline, test_pipeline_config, wait_for};
pub use publisher::{BlocklistBroker, FlakyBroker};
