//! Batching, fan-out and ordered reassembly for a single file's parse.

use crossbeam_channel::unbounded;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::pool::{global_pool, WorkerPool};
use super::types::{BatchInput, DriverConfig, RawBatch};
use crate::error::ErrorKind;
use crate::model::{LogEntry, ParseError, ParseResult};
use crate::parsers::{self, Dialect, LineArity, RawRecord};
use crate::timestamp::RawTs;

/// Parse a file with the default driver configuration and the shared pool.
///
/// `worker_count` semantics: `0` uses every pool thread, `1` forces the
/// single-threaded path, anything larger caps the in-flight batches.
/// Worker count never changes the resulting `ParsedLog`.
pub fn parse(dialect: &Arc<dyn Dialect>, path: &Path, worker_count: usize) -> ParseResult {
    parse_with(dialect, path, worker_count, &DriverConfig::default(), global_pool())
}

/// Parse with explicit tuning and an injected pool handle.
pub fn parse_with(
    dialect: &Arc<dyn Dialect>,
    path: &Path,
    worker_count: usize,
    config: &DriverConfig,
    pool: &WorkerPool,
) -> ParseResult {
    let workers = if worker_count == 0 {
        pool.size()
    } else {
        worker_count
    };

    if workers <= 1 {
        return parsers::parse_single_threaded(&**dialect, path);
    }
    if dialect.arity() == LineArity::ManyPerLine {
        // Batched reconstruction is only valid when each line maps to one
        // entry; variable-arity dialects keep batch boundaries fuzzy.
        debug!(dialect = dialect.name(), "variable-arity dialect, parsing single-threaded");
        return parsers::parse_single_threaded(&**dialect, path);
    }
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() >= config.min_parallel_bytes => {}
        Ok(_) => {
            debug!(path = %path.display(), "file below parallel threshold");
            return parsers::parse_single_threaded(&**dialect, path);
        }
        Err(_) => {
            // Let the single-threaded path produce the IO error result.
            return parsers::parse_single_threaded(&**dialect, path);
        }
    }

    parse_parallel(dialect, path, workers, config, pool)
}

fn parse_parallel(
    dialect: &Arc<dyn Dialect>,
    path: &Path,
    workers: usize,
    config: &DriverConfig,
    pool: &WorkerPool,
) -> ParseResult {
    let (inputs, mut errors) = match read_batches(path, config.batch_lines) {
        Ok(read) => read,
        Err(error) => return ParseResult::failure(vec![error]),
    };
    let total = inputs.len();
    if total == 0 {
        return ParseResult::from_entries(Vec::new(), errors);
    }
    debug!(
        dialect = dialect.name(),
        batches = total,
        workers,
        "parallel parse"
    );

    let inputs = Arc::new(inputs);
    let (result_tx, result_rx) = unbounded::<RawBatch>();

    let mut outcomes: Vec<Option<RawBatch>> = Vec::with_capacity(total);
    outcomes.resize_with(total, || None);

    let mut next = 0usize;
    let mut received = 0usize;
    while received < total {
        // Keep at most `workers` batches in flight; the pool may be shared
        // with other parses.
        while next < total && next - received < workers {
            let index = next;
            next += 1;
            let dialect_job = Arc::clone(dialect);
            let inputs_job = Arc::clone(&inputs);
            let tx = result_tx.clone();
            let queued = pool.execute(move || {
                let input = &inputs_job[index];
                let batch = parse_batch(&*dialect_job, index, input);
                let _ = tx.send(batch);
            });
            if !queued {
                // Pool already shut down; do the work on this thread.
                let input = &inputs[index];
                let batch = parse_batch(&**dialect, index, input);
                let _ = result_tx.send(batch);
            }
        }
        match result_rx.recv() {
            Ok(batch) => {
                let slot = batch.index;
                outcomes[slot] = Some(batch);
                received += 1;
            }
            Err(_) => break,
        }
    }

    // Reassemble in batch order; completion order is irrelevant from here.
    let mut entries: Vec<LogEntry> = Vec::new();
    let mut monotonic = true;
    for outcome in outcomes.into_iter().flatten() {
        if !outcome.sorted {
            monotonic = false;
        }
        let mut batch_errors = outcome.errors;
        errors.append(&mut batch_errors);
        for record in outcome.records {
            match record.into_entry() {
                Ok(entry) => {
                    if monotonic {
                        if let Some(last) = entries.last() {
                            if entry.timestamp < last.timestamp {
                                monotonic = false;
                            }
                        }
                    }
                    entries.push(entry);
                }
                Err(error) => errors.push(error),
            }
        }
    }

    if !monotonic {
        warn!(dialect = dialect.name(), path = %path.display(), "timestamps out of order, sorting");
        entries.sort_by_key(|entry| entry.timestamp);
    }
    // Timestamp-resolution errors surface during reassembly, after the
    // scan errors of later batches; restore line order.
    errors.sort_by_key(|error| error.line);
    ParseResult::from_entries(entries, errors)
}

fn read_batches(
    path: &Path,
    batch_lines: usize,
) -> Result<(Vec<BatchInput>, Vec<ParseError>), ParseError> {
    let file = File::open(path).map_err(|err| {
        let reason = if err.kind() == std::io::ErrorKind::NotFound {
            format!("file not found: {}", path.display())
        } else {
            format!("failed to read {}: {}", path.display(), err)
        };
        ParseError::file_scope(ErrorKind::Io, reason)
    })?;

    let mut inputs = Vec::new();
    let mut errors = Vec::new();
    let mut current = Vec::with_capacity(batch_lines);
    let mut batch_start = 1usize;
    let mut line_no = 0usize;
    let mut first = true;

    for line in BufReader::new(file).lines() {
        line_no += 1;
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                errors.push(ParseError::file_scope(
                    ErrorKind::Io,
                    format!("failed to read {}: {}", path.display(), err),
                ));
                break;
            }
        };
        let line = if first {
            first = false;
            parsers::strip_bom(&line).to_string()
        } else {
            line
        };
        current.push(line);
        if current.len() >= batch_lines {
            inputs.push(BatchInput {
                start_line: batch_start,
                lines: std::mem::take(&mut current),
            });
            batch_start = line_no + 1;
            current.reserve(batch_lines);
        }
    }
    if !current.is_empty() {
        inputs.push(BatchInput {
            start_line: batch_start,
            lines: current,
        });
    }
    Ok((inputs, errors))
}

/// Worker body: decode one batch into raw records plus its local errors.
fn parse_batch(dialect: &dyn Dialect, index: usize, input: &BatchInput) -> RawBatch {
    let mut records: Vec<RawRecord> = Vec::with_capacity(input.lines.len());
    let mut errors = Vec::new();
    let mut scratch = Vec::with_capacity(1);
    let mut sorted = true;
    let mut last_ts: Option<RawTs> = None;

    for (offset, line) in input.lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = input.start_line + offset;
        scratch.clear();
        match dialect.parse_line(line_no, line, &mut scratch) {
            Ok(()) => {
                for record in scratch.drain(..) {
                    if let Some(prev) = last_ts {
                        if record.ts < prev {
                            sorted = false;
                        }
                    }
                    last_ts = Some(record.ts);
                    records.push(record);
                }
            }
            Err(err) => errors.push(ParseError::line(line_no, line.as_str(), err)),
        }
    }

    RawBatch {
        index,
        records,
        errors,
        sorted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::CsvSignalDialect;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn csv_lines(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                format!(
                    "2025-10-21 23:{:02}:{:02}.000,DEV-{},SIG,{}",
                    i / 60,
                    i % 60,
                    i % 3,
                    i
                )
            })
            .collect()
    }

    fn test_config() -> DriverConfig {
        DriverConfig {
            batch_lines: 7,
            min_parallel_bytes: 0,
        }
    }

    #[test]
    fn worker_count_never_changes_the_result() {
        let mut lines = csv_lines(100);
        lines.insert(50, "not a log line".to_string());
        let file = fixture(&lines);
        let dialect: Arc<dyn Dialect> = Arc::new(CsvSignalDialect::new());
        let pool = WorkerPool::new(4);

        let single = parse_with(&dialect, file.path(), 1, &test_config(), &pool);
        let parallel = parse_with(&dialect, file.path(), 4, &test_config(), &pool);

        let single_log = single.data.unwrap();
        let parallel_log = parallel.data.unwrap();
        assert_eq!(single_log.entries(), parallel_log.entries());
        assert_eq!(single.errors.len(), 1);
        assert_eq!(parallel.errors.len(), 1);
        assert_eq!(parallel.errors[0].line, 51);
        pool.shutdown();
    }

    #[test]
    fn unsorted_input_is_sorted_before_returning() {
        let mut lines = csv_lines(40);
        lines.reverse();
        let file = fixture(&lines);
        let dialect: Arc<dyn Dialect> = Arc::new(CsvSignalDialect::new());
        let pool = WorkerPool::new(3);

        let result = parse_with(&dialect, file.path(), 3, &test_config(), &pool);
        let log = result.data.unwrap();
        assert!(log
            .entries()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(log.entry_count(), 40);
        pool.shutdown();
    }

    #[test]
    fn shut_down_pool_falls_back_inline() {
        let file = fixture(&csv_lines(20));
        let dialect: Arc<dyn Dialect> = Arc::new(CsvSignalDialect::new());
        let pool = WorkerPool::new(2);
        pool.shutdown();

        let result = parse_with(&dialect, file.path(), 2, &test_config(), &pool);
        assert_eq!(result.data.unwrap().entry_count(), 20);
    }

    #[test]
    fn missing_file_is_an_io_failure() {
        let dialect: Arc<dyn Dialect> = Arc::new(CsvSignalDialect::new());
        let pool = WorkerPool::new(1);
        let result = parse_with(
            &dialect,
            Path::new("/nonexistent/file.log"),
            2,
            &test_config(),
            &pool,
        );
        assert!(!result.success());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::Io);
        assert_eq!(result.errors[0].line, 0);
        pool.shutdown();
    }
}
