//! Time-chunked random access into large log files.
//!
//! A [`ChunkedStore`] partitions a file's time span into fixed windows and
//! rebuilds any window on demand with `parse_time_window`, so a viewport
//! can pan through a multi-gigabyte file while only a bounded set of
//! chunks stays resident. Eviction is LRU over an index guarded by a
//! single mutex; chunk payloads are reference-counted, so a reader holding
//! a chunk across an eviction keeps valid data and the cache stays an
//! optimization, never a correctness fork.

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDateTime};
use lru::LruCache;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::model::LogEntry;
use crate::parallel::global_pool;
use crate::parsers::{self, Dialect};
use crate::registry::ParserRegistry;
use crate::timestamp::RawTs;

/// How much of the file tail the time-range probe reads when looking for
/// the last timestamp.
const TAIL_PROBE_BYTES: u64 = 64 * 1024;
/// How many head lines the probe scans before giving up.
const HEAD_PROBE_LINES: usize = 1000;

/// Cache sizing knobs. `max_resident` bounds memory; `chunk_duration`
/// trades rebuild cost against per-chunk footprint.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub chunk_duration: Duration,
    pub max_resident: NonZeroUsize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::seconds(300),
            max_resident: NonZeroUsize::new(5).unwrap(),
        }
    }
}

/// Entries within one time window. Owned by the store's cache; consumers
/// receive entry copies, never a reference into the cache.
#[derive(Debug, Clone)]
pub struct TimeChunk {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub entries: Vec<LogEntry>,
    pub signals: BTreeSet<String>,
    pub devices: BTreeSet<String>,
}

impl TimeChunk {
    fn from_entries(start: NaiveDateTime, end: NaiveDateTime, entries: Vec<LogEntry>) -> Self {
        let mut signals = BTreeSet::new();
        let mut devices = BTreeSet::new();
        for entry in &entries {
            signals.insert(entry.signal_key());
            devices.insert(entry.device_id.clone());
        }
        Self {
            start,
            end,
            entries,
            signals,
            devices,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Chunk-cached view over one log file. Cloning is cheap and shares the
/// cache; the prefetcher relies on that to warm chunks off-thread.
#[derive(Clone)]
pub struct ChunkedStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    dialect: Arc<dyn Dialect>,
    time_range: (NaiveDateTime, NaiveDateTime),
    chunk_ms: i64,
    cache: Mutex<LruCache<i64, Arc<TimeChunk>>>,
}

impl ChunkedStore {
    /// Open a file, detect its dialect through the registry and probe its
    /// time range from the head and a bounded tail scan.
    pub fn open(
        path: impl Into<PathBuf>,
        registry: &ParserRegistry,
        config: ChunkConfig,
    ) -> Result<Self> {
        let path = path.into();
        let dialect = registry
            .detect_parser(&path)
            .ok_or_else(|| anyhow!("no suitable parser for {}", path.display()))?;
        let time_range = probe_time_range(&*dialect, &path)?;
        Ok(Self::with_time_range(path, dialect, time_range, config))
    }

    /// Build a store when the caller already knows the file's time range,
    /// e.g. from a previous full parse.
    pub fn with_time_range(
        path: impl Into<PathBuf>,
        dialect: Arc<dyn Dialect>,
        time_range: (NaiveDateTime, NaiveDateTime),
        config: ChunkConfig,
    ) -> Self {
        let chunk_ms = config.chunk_duration.num_milliseconds().max(1);
        Self {
            inner: Arc::new(StoreInner {
                path: path.into(),
                dialect,
                time_range,
                chunk_ms,
                cache: Mutex::new(LruCache::new(config.max_resident)),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn dialect_name(&self) -> &'static str {
        self.inner.dialect.name()
    }

    pub fn time_range(&self) -> (NaiveDateTime, NaiveDateTime) {
        self.inner.time_range
    }

    /// Number of chunks currently resident in the cache.
    pub fn resident_chunks(&self) -> usize {
        self.inner.cache.lock().unwrap().len()
    }

    /// Evict everything. The underlying file is untouched; every chunk is
    /// reconstructible.
    pub fn clear_cache(&self) {
        self.inner.cache.lock().unwrap().clear();
    }

    /// All entries with `start <= timestamp < end`, pulled from resident
    /// chunks where possible and rebuilt from the file otherwise.
    ///
    /// With `with_prefetch`, the window following `end` (same span) is
    /// warmed asynchronously for smooth panning.
    pub fn get_entries_in_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        with_prefetch: bool,
    ) -> Vec<LogEntry> {
        let entries = self.inner.entries_in_range(start, end);
        if with_prefetch {
            self.prefetch_chunks(end, end + (end - start));
        }
        entries
    }

    /// Warm the cache for `[start, end)` off the calling thread and
    /// discard the results. Best-effort: a shut-down pool skips the warm.
    pub fn prefetch_chunks(&self, start: NaiveDateTime, end: NaiveDateTime) {
        for ordinal in self.inner.overlapping(start, end) {
            if self.inner.cache.lock().unwrap().contains(&ordinal) {
                continue;
            }
            let inner = Arc::clone(&self.inner);
            let queued = global_pool().execute(move || {
                let _ = inner.chunk(ordinal);
            });
            if !queued {
                break;
            }
        }
    }
}

impl StoreInner {
    fn entries_in_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        for ordinal in self.overlapping(start, end) {
            let chunk = self.chunk(ordinal);
            entries.extend(
                chunk
                    .entries
                    .iter()
                    .filter(|entry| entry.timestamp >= start && entry.timestamp < end)
                    .cloned(),
            );
        }
        // Chunks are consecutive and internally sorted; this only runs for
        // pathological inputs.
        if !entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
            entries.sort_by_key(|entry| entry.timestamp);
        }
        entries
    }

    /// Resolve one chunk: cache hit bumps recency, miss rebuilds from the
    /// file. The build runs outside the index lock; when two threads race
    /// on the same window, the first insert wins and the loser's copy is
    /// dropped.
    fn chunk(&self, ordinal: i64) -> Arc<TimeChunk> {
        if let Some(chunk) = self.cache.lock().unwrap().get(&ordinal) {
            return Arc::clone(chunk);
        }

        let chunk = Arc::new(self.load_chunk(ordinal));
        let mut cache = self.cache.lock().unwrap();
        if let Some(existing) = cache.get(&ordinal) {
            return Arc::clone(existing);
        }
        if let Some((evicted, _)) = cache.push(ordinal, Arc::clone(&chunk)) {
            if evicted != ordinal {
                debug!(chunk = evicted, "evicted least-recently-used chunk");
            }
        }
        chunk
    }

    fn load_chunk(&self, ordinal: i64) -> TimeChunk {
        let (start, end) = self.window(ordinal);
        debug!(chunk = ordinal, %start, %end, "rebuilding chunk");
        let result = parsers::parse_time_window(&*self.dialect, &self.path, start, end);
        if result.has_errors() {
            debug!(
                chunk = ordinal,
                errors = result.error_count(),
                "chunk rebuild skipped malformed lines"
            );
        }
        let entries = result
            .data
            .map(|log| log.into_entries())
            .unwrap_or_default();
        TimeChunk::from_entries(start, end, entries)
    }

    fn ordinal(&self, at: NaiveDateTime) -> i64 {
        (at - self.time_range.0)
            .num_milliseconds()
            .div_euclid(self.chunk_ms)
    }

    fn window(&self, ordinal: i64) -> (NaiveDateTime, NaiveDateTime) {
        let start = self.time_range.0 + Duration::milliseconds(ordinal * self.chunk_ms);
        (start, start + Duration::milliseconds(self.chunk_ms))
    }

    /// Ordinals of chunks overlapping `[start, end)`, clamped to the
    /// file's own time range.
    fn overlapping(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<i64> {
        let (range_start, range_end) = self.time_range;
        if end <= start || end <= range_start || start > range_end {
            return Vec::new();
        }
        let lo = self.ordinal(start.max(range_start));
        let mut hi = self.ordinal(end.min(range_end));
        // `end` is exclusive: a window starting exactly at `end` is out.
        if end <= range_end && self.window(hi).0 >= end {
            hi -= 1;
        }
        (lo..=hi).collect()
    }
}

/// First and last valid timestamps of a file: a line scan from the head
/// and a bounded scan over the tail. Falls back to a full single-threaded
/// parse when the tail probe disagrees with the head (unsorted file).
fn probe_time_range(
    dialect: &dyn Dialect,
    path: &Path,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let first = probe_first(dialect, path)
        .with_context(|| format!("probing {}", path.display()))?
        .ok_or_else(|| anyhow!("no parseable timestamp in {}", path.display()))?;
    let last = probe_last(dialect, path)
        .with_context(|| format!("probing {}", path.display()))?;

    match last {
        Some(last) if last >= first => Ok((first, last)),
        _ => {
            warn!(path = %path.display(), "tail probe failed, falling back to full parse");
            let result = parsers::parse_single_threaded(dialect, path);
            result
                .data
                .and_then(|log| log.time_range())
                .ok_or_else(|| anyhow!("no parseable entries in {}", path.display()))
        }
    }
}

fn probe_first(dialect: &dyn Dialect, path: &Path) -> Result<Option<NaiveDateTime>> {
    let file = File::open(path)?;
    let mut first_line = true;
    for (checked, line) in BufReader::new(file).lines().enumerate() {
        if checked >= HEAD_PROBE_LINES {
            break;
        }
        let line = line?;
        let line = if first_line {
            first_line = false;
            parsers::strip_bom(&line).to_string()
        } else {
            line
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Some(ts) = resolve_scan(dialect.scan_timestamp(&line)) {
            return Ok(Some(ts));
        }
    }
    Ok(None)
}

fn probe_last(dialect: &dyn Dialect, path: &Path) -> Result<Option<NaiveDateTime>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let offset = len.saturating_sub(TAIL_PROBE_BYTES);
    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    // Mid-character seeks make the tail invalid UTF-8; degrade to lossy.
    let tail = String::from_utf8_lossy(&bytes);

    let mut lines: Vec<&str> = tail.lines().collect();
    if offset > 0 && !lines.is_empty() {
        // First line is almost certainly a partial line.
        lines.remove(0);
    }
    for line in lines.iter().rev() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(ts) = resolve_scan(dialect.scan_timestamp(line)) {
            return Ok(Some(ts));
        }
    }
    Ok(None)
}

fn resolve_scan(raw: Option<RawTs>) -> Option<NaiveDateTime> {
    raw.and_then(|ts| ts.resolve())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::CsvSignalDialect;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 21)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap()
    }

    /// One entry every second for `count` seconds.
    fn fixture(count: u32) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..count {
            let ts = base() + Duration::seconds(i as i64);
            writeln!(
                file,
                "{},DEV-{},SIG,{}",
                ts.format("%Y-%m-%d %H:%M:%S%.3f"),
                i % 2,
                i
            )
            .unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn store(file: &NamedTempFile, chunk_secs: i64, max_resident: usize) -> ChunkedStore {
        ChunkedStore::with_time_range(
            file.path(),
            Arc::new(CsvSignalDialect::new()),
            (base(), base() + Duration::seconds(119)),
            ChunkConfig {
                chunk_duration: Duration::seconds(chunk_secs),
                max_resident: NonZeroUsize::new(max_resident).unwrap(),
            },
        )
    }

    #[test]
    fn range_queries_match_regardless_of_cache_state() {
        let file = fixture(120);
        let store = store(&file, 10, 4);

        let start = base() + Duration::seconds(15);
        let end = base() + Duration::seconds(42);
        let cold = store.get_entries_in_range(start, end, false);
        let warm = store.get_entries_in_range(start, end, false);

        assert_eq!(cold.len(), 27);
        assert_eq!(cold, warm);
        assert!(cold
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(cold.first().unwrap().timestamp, start);
        // End of the range is exclusive.
        assert!(cold.iter().all(|entry| entry.timestamp < end));
    }

    #[test]
    fn eviction_respects_the_residency_budget() {
        let file = fixture(120);
        let store = store(&file, 10, 2);

        for offset in (0..120).step_by(10) {
            let window_start = base() + Duration::seconds(offset);
            store.get_entries_in_range(window_start, window_start + Duration::seconds(10), false);
            assert!(store.resident_chunks() <= 2);
        }

        // Evicted chunks rebuild transparently with identical content.
        let again = store.get_entries_in_range(base(), base() + Duration::seconds(10), false);
        assert_eq!(again.len(), 10);
    }

    #[test]
    fn clear_cache_keeps_data_reconstructible() {
        let file = fixture(60);
        let store = store(&file, 20, 4);
        let before = store.get_entries_in_range(base(), base() + Duration::seconds(60), false);
        assert!(store.resident_chunks() > 0);

        store.clear_cache();
        assert_eq!(store.resident_chunks(), 0);
        let after = store.get_entries_in_range(base(), base() + Duration::seconds(60), false);
        assert_eq!(before, after);
    }

    #[test]
    fn queries_outside_the_file_range_are_empty() {
        let file = fixture(30);
        let store = store(&file, 10, 4);
        let far = base() + Duration::hours(2);
        assert!(store
            .get_entries_in_range(far, far + Duration::seconds(10), false)
            .is_empty());
        assert!(store
            .get_entries_in_range(
                base() - Duration::hours(1),
                base() - Duration::minutes(30),
                false
            )
            .is_empty());
        assert!(store.get_entries_in_range(base(), base(), false).is_empty());
    }

    #[test]
    fn prefetch_warms_the_cache_without_blocking() {
        let file = fixture(120);
        let store = store(&file, 10, 6);
        store.prefetch_chunks(base(), base() + Duration::seconds(30));

        // Prefetch is asynchronous; poll briefly for the warm-up.
        for _ in 0..100 {
            if store.resident_chunks() >= 3 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(store.resident_chunks() >= 3);

        let entries = store.get_entries_in_range(base(), base() + Duration::seconds(30), false);
        assert_eq!(entries.len(), 30);
    }

    #[test]
    fn open_probes_the_time_range() {
        let file = fixture(90);
        let registry = ParserRegistry::with_builtin_dialects();
        let store = ChunkedStore::open(file.path(), &registry, ChunkConfig::default()).unwrap();
        let (start, end) = store.time_range();
        assert_eq!(start, base());
        assert_eq!(end, base() + Duration::seconds(89));
        assert_eq!(store.dialect_name(), "csv_signal");
    }

    #[test]
    fn open_rejects_files_without_timestamps() {
        let mut file = NamedTempFile::new().unwrap();
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(CsvSignalDialect::new()), true);
        writeln!(file, "no timestamps here").unwrap();
        file.flush().unwrap();
        assert!(ChunkedStore::open(file.path(), &registry, ChunkConfig::default()).is_err());
    }
}
