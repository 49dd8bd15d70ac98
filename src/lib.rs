//! Parsing and time-indexed storage core for industrial-automation signal
//! logs.
//!
//! The crate ingests the supported log dialects, normalizes them into a
//! timestamp-ordered entry stream and makes that stream queryable by time
//! window without holding whole files in memory:
//!
//! - [`registry::ParserRegistry`] — dialect detection and the uniform
//!   parse entry point
//! - [`parallel`] — batched concurrent parsing over a shared worker pool
//! - [`merge`] — combining per-file results into one chronological log
//! - [`waveform`] — per-signal state intervals for rendering
//! - [`chunked::ChunkedStore`] — LRU-cached random access by time window
//!
//! All parse entry points are synchronous and may block; callers with a UI
//! thread invoke them from their own worker context. Per-line problems
//! never abort a parse: they are collected as [`model::ParseError`]s next
//! to whatever data was recovered.

pub mod chunked;
pub mod error;
pub mod merge;
pub mod model;
pub mod parallel;
pub mod parsers;
pub mod registry;
pub mod timestamp;
pub mod waveform;

pub use chunked::{ChunkConfig, ChunkedStore, TimeChunk};
pub use error::{ErrorKind, LineError, RegistryError};
pub use merge::{merge_parse_results, merge_parsed_logs};
pub use model::{LogEntry, ParseError, ParseResult, ParsedLog, SignalType, Value};
pub use parallel::{global_pool, shutdown_global_pool, DriverConfig, WorkerPool};
pub use parsers::Dialect;
pub use registry::ParserRegistry;
pub use waveform::{derive_signal_data, group_by_signal, SignalData, SignalState};
