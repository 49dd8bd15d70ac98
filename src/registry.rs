//! Registry mapping files to dialect parsers.
//!
//! Parsers register once at startup; the list is immutable afterwards, so
//! detection and parsing read it without locking. Detection samples a few
//! lines per registered dialect in registration order and falls back to
//! the default parser.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::RegistryError;
use crate::model::{ParseError, ParseResult};
use crate::parallel;
use crate::parsers::{
    CsvSignalDialect, Dialect, GenericDialect, McsDialect, PlcDebugDialect, PlcTabDialect,
};

/// Progress callback for multi-file parsing: `(file_index, total_files,
/// path)`, invoked synchronously between file parses.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize, &Path) + Send + Sync);

#[derive(Default)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn Dialect>>,
    by_name: HashMap<&'static str, usize>,
    default: Option<usize>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five built-in dialects, `generic` as the default.
    pub fn with_builtin_dialects() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlcDebugDialect::new()), false);
        registry.register(Arc::new(PlcTabDialect::new()), false);
        registry.register(Arc::new(McsDialect::new()), false);
        registry.register(Arc::new(CsvSignalDialect::new()), false);
        registry.register(Arc::new(GenericDialect::new()), true);
        registry
    }

    /// Register a parser; re-registering a name replaces the earlier entry
    /// in place, keeping its detection position.
    pub fn register(&mut self, parser: Arc<dyn Dialect>, is_default: bool) {
        let name = parser.name();
        let index = match self.by_name.get(name) {
            Some(&index) => {
                self.parsers[index] = parser;
                index
            }
            None => {
                self.parsers.push(parser);
                self.parsers.len() - 1
            }
        };
        self.by_name.insert(name, index);
        if is_default {
            self.default = Some(index);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Dialect>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.parsers[index]))
    }

    pub fn default_parser(&self) -> Option<Arc<dyn Dialect>> {
        self.default.map(|index| Arc::clone(&self.parsers[index]))
    }

    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|parser| parser.name()).collect()
    }

    /// First registered parser whose sniff accepts the file, else the
    /// default parser.
    pub fn detect_parser(&self, path: &Path) -> Option<Arc<dyn Dialect>> {
        for parser in &self.parsers {
            if parser.can_parse(path) {
                debug!(dialect = parser.name(), path = %path.display(), "dialect detected");
                return Some(Arc::clone(parser));
            }
        }
        self.default_parser()
    }

    /// Detection result by name, for UI feedback before committing to a
    /// parse.
    pub fn detect_parser_name(&self, path: &Path) -> Option<&'static str> {
        self.detect_parser(path).map(|parser| parser.name())
    }

    /// Primary entry point: parse with auto-detection or an explicitly
    /// named parser.
    ///
    /// An unregistered `parser_name` and a failed detection produce
    /// distinct error kinds; the first indicates caller misconfiguration,
    /// the second bad input.
    pub fn parse(
        &self,
        path: &Path,
        parser_name: Option<&str>,
        worker_count: usize,
    ) -> ParseResult {
        let parser = match parser_name {
            Some(name) => match self.get(name) {
                Some(parser) => parser,
                None => return selection_failure(RegistryError::UnknownParser(name.to_string())),
            },
            None => match self.detect_parser(path) {
                Some(parser) => parser,
                None => return selection_failure(RegistryError::NoParserFound),
            },
        };
        parallel::parse(&parser, path, worker_count)
    }

    /// Parse a batch of files, reporting progress between files. Per-file
    /// failures never abort the batch; the caller merges the results.
    pub fn parse_files(
        &self,
        files: &[PathBuf],
        worker_count: usize,
        progress: Option<ProgressFn<'_>>,
    ) -> IndexMap<PathBuf, ParseResult> {
        let total = files.len();
        let mut results = IndexMap::with_capacity(total);
        for (index, path) in files.iter().enumerate() {
            if let Some(report) = progress {
                report(index, total, path);
            }
            let result = self.parse(path, None, worker_count);
            results.insert(path.clone(), result);
        }
        results
    }
}

fn selection_failure(error: RegistryError) -> ParseResult {
    let kind = error.kind();
    ParseResult::failure(vec![ParseError::file_scope(kind, error)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn detects_csv_dialect() {
        let file = fixture(
            "2025-10-21 23:08:27.995,DEV-1,B,62\n2025-10-21 23:08:28.100,DEV-1,B,63\n",
        );
        let registry = ParserRegistry::with_builtin_dialects();
        assert_eq!(registry.detect_parser_name(file.path()), Some("csv_signal"));
    }

    #[test]
    fn unmatched_file_falls_back_to_default() {
        let file = fixture("complete nonsense\nmore nonsense\n");
        let registry = ParserRegistry::with_builtin_dialects();
        assert_eq!(registry.detect_parser_name(file.path()), Some("generic"));
    }

    #[test]
    fn unknown_parser_name_is_a_distinct_error() {
        let file = fixture("DEVICE_A MOTOR_START 10:30:45 true boolean\n");
        let registry = ParserRegistry::with_builtin_dialects();
        let result = registry.parse(file.path(), Some("does_not_exist"), 1);
        assert!(!result.success());
        assert_eq!(result.errors[0].kind, ErrorKind::UnknownParser);
        assert_eq!(result.errors[0].line, 0);
        assert!(result.errors[0].reason.contains("does_not_exist"));
    }

    #[test]
    fn no_parser_and_no_default_reports_no_parser_found() {
        let file = fixture("complete nonsense\n");
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(CsvSignalDialect::new()), false);
        let result = registry.parse(file.path(), None, 1);
        assert!(!result.success());
        assert_eq!(result.errors[0].kind, ErrorKind::NoParserFound);
        assert_eq!(result.errors[0].reason, "no suitable parser found");
    }

    #[test]
    fn progress_callback_fires_per_file() {
        let a = fixture("2025-10-21 23:08:27.995,DEV-1,B,62\n");
        let b = fixture("DEVICE_A MOTOR_START 10:30:45 true boolean\n");
        let files = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        let registry = ParserRegistry::with_builtin_dialects();

        let seen = std::sync::Mutex::new(Vec::new());
        let progress = |index: usize, total: usize, _path: &Path| {
            seen.lock().unwrap().push((index, total));
        };
        let results = registry.parse_files(&files, 1, Some(&progress));

        assert_eq!(results.len(), 2);
        assert!(results.values().all(|result| result.success()));
        assert_eq!(*seen.lock().unwrap(), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn re_registering_replaces_in_place() {
        let mut registry = ParserRegistry::with_builtin_dialects();
        let before = registry.parser_names();
        registry.register(Arc::new(CsvSignalDialect::new()), false);
        assert_eq!(registry.parser_names(), before);
    }
}
