//! Driver configuration and the batch-result structs crossing the worker
//! boundary.

use crate::model::ParseError;
use crate::parsers::RawRecord;

/// Tuning knobs for the parse driver. Neither value affects correctness;
/// batch size only shapes fan-out granularity and the byte threshold keeps
/// small files on the cheaper single-threaded path.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Lines per worker batch.
    pub batch_lines: usize,
    /// Files smaller than this parse single-threaded; parallel overhead
    /// would dominate.
    pub min_parallel_bytes: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            batch_lines: 4096,
            min_parallel_bytes: 1 << 20,
        }
    }
}

/// One batch of input lines, indexed so reassembly can restore file order
/// regardless of worker completion order.
#[derive(Debug)]
pub(crate) struct BatchInput {
    pub start_line: usize,
    pub lines: Vec<String>,
}

/// What a worker hands back: the cheapest serializable representation of
/// its batch. Records still carry raw timestamp tokens; the driver resolves
/// them after reassembly.
#[derive(Debug)]
pub(crate) struct RawBatch {
    pub index: usize,
    pub records: Vec<RawRecord>,
    pub errors: Vec<ParseError>,
    /// Timestamps were non-decreasing within this batch.
    pub sorted: bool,
}
