mod base;
mod capture;

pub use base::{Worker, WorkerHandle};
pub use capture::{CaptureWorker, CaptureWorkerHandle};
