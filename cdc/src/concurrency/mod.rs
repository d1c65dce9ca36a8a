pub mod shutdown;

pub use shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel, signaled};
