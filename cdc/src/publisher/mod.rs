pub mod base;
pub mod memory;
pub mod webhook;

pub use base::{BoxedPublisher, BrokerPublisher, PublishAck, build_publisher};
pub use memory::MemoryBroker;
pub use webhook::WebhookPublisher;
