pub mod base;
pub mod memory;
pub mod postgres;

pub use base::{BoxedConnector, ConnectorFactory, SourceConnector, build_connector_factory};
pub use memory::MemoryConnector;
pub use postgres::PostgresConnector;
