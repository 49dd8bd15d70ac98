//! Concurrent parse driver.
//!
//! Splits a file into contiguous line batches, fans them out to a shared
//! worker pool, and reassembles the results in batch order so the outcome
//! is identical for any worker count.
//!
//! # Module Structure
//!
//! - `types`: driver configuration and the raw batch-result structs
//! - `pool`: the process-wide, lazily-initialized worker pool
//! - `driver`: batching, fan-out, ordered reassembly, fallback paths

mod driver;
mod pool;
mod types;

pub use driver::{parse, parse_with};
pub use pool::{global_pool, shutdown_global_pool, WorkerPool};
pub use types::DriverConfig;
