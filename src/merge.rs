//! Combining per-file parse results into one chronological log.

use indexmap::IndexMap;
use std::path::PathBuf;

use crate::error::ErrorKind;
use crate::model::{ParseError, ParseResult, ParsedLog};

/// Merge parsed logs into a single combined log, or `None` when there is
/// nothing to merge.
///
/// Entries are concatenated in input order and stable-sorted by timestamp,
/// so entries sharing a timestamp keep input order then per-log insertion
/// order. Indexes and the time range are recomputed from the merged
/// entries.
pub fn merge_parsed_logs<I>(logs: I) -> Option<ParsedLog>
where
    I: IntoIterator<Item = ParsedLog>,
{
    let mut entries = Vec::new();
    let mut any = false;
    for log in logs {
        any = true;
        entries.extend(log.into_entries());
    }
    if !any {
        return None;
    }
    entries.sort_by_key(|entry| entry.timestamp);
    Some(ParsedLog::from_sorted_entries(entries))
}

/// Merge parse results keyed by file path.
///
/// Successful inputs contribute their entries; every error from every
/// input is retained with its `file_path` assigned by the merger. The
/// merged result is successful iff at least one input succeeded. A failed
/// input carrying no errors of its own gets one synthesized error so the
/// failure stays visible.
pub fn merge_parse_results(results: IndexMap<PathBuf, ParseResult>) -> ParseResult {
    let mut logs = Vec::new();
    let mut errors: Vec<ParseError> = Vec::new();

    for (path, result) in results {
        let failed_silently = !result.success() && !result.has_errors();
        if let Some(log) = result.data {
            logs.push(log);
        }
        for mut error in result.errors {
            if error.file_path.as_deref() != Some(path.as_path()) {
                error.file_path = Some(path.clone());
            }
            errors.push(error);
        }
        if failed_silently {
            let mut error = ParseError::file_scope(
                ErrorKind::Io,
                "parsing failed with no additional details",
            );
            error.file_path = Some(path);
            errors.push(error);
        }
    }

    ParseResult {
        data: merge_parsed_logs(logs),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogEntry, SignalType, Value};
    use chrono::NaiveDate;

    fn entry(device: &str, secs: u32, value: i64) -> LogEntry {
        LogEntry {
            device_id: device.to_string(),
            signal_name: "SIG".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 9, 22)
                .unwrap()
                .and_hms_opt(13, 0, secs)
                .unwrap(),
            value: Value::Int(value),
            signal_type: SignalType::Integer,
        }
    }

    fn result_of(entries: Vec<LogEntry>, errors: Vec<ParseError>) -> ParseResult {
        ParseResult::from_entries(entries, errors)
    }

    #[test]
    fn merges_entries_and_interleaves_by_timestamp() {
        let mut results = IndexMap::new();
        results.insert(
            PathBuf::from("a.log"),
            result_of(vec![entry("A", 1, 1), entry("A", 5, 2)], vec![]),
        );
        results.insert(
            PathBuf::from("b.log"),
            result_of(vec![entry("B", 3, 3), entry("B", 7, 4)], vec![]),
        );

        let merged = merge_parse_results(results);
        let log = merged.data.unwrap();
        let devices: Vec<&str> = log
            .entries()
            .iter()
            .map(|e| e.device_id.as_str())
            .collect();
        assert_eq!(devices, vec!["A", "B", "A", "B"]);
        assert_eq!(log.device_count(), 2);
        let (start, end) = log.time_range().unwrap();
        assert_eq!(start, log.entries()[0].timestamp);
        assert_eq!(end, log.entries()[3].timestamp);
    }

    #[test]
    fn equal_timestamps_keep_file_order() {
        let mut results = IndexMap::new();
        results.insert(
            PathBuf::from("first.log"),
            result_of(vec![entry("FIRST", 1, 1)], vec![]),
        );
        results.insert(
            PathBuf::from("second.log"),
            result_of(vec![entry("SECOND", 1, 2)], vec![]),
        );

        let log = merge_parse_results(results).data.unwrap();
        assert_eq!(log.entries()[0].device_id, "FIRST");
        assert_eq!(log.entries()[1].device_id, "SECOND");
    }

    #[test]
    fn error_counts_add_up_and_paths_are_assigned() {
        let mut results = IndexMap::new();
        results.insert(
            PathBuf::from("a.log"),
            result_of(
                vec![entry("A", 1, 1)],
                vec![
                    ParseError::line(2, "bad", "line does not match csv_signal format"),
                    ParseError::line(9, "bad", "line does not match csv_signal format"),
                ],
            ),
        );
        results.insert(
            PathBuf::from("b.log"),
            result_of(
                vec![entry("B", 2, 2)],
                vec![ParseError::line(4, "bad", "invalid timestamp: x")],
            ),
        );

        let merged = merge_parse_results(results);
        assert_eq!(merged.errors.len(), 3);
        assert!(merged
            .errors
            .iter()
            .all(|error| error.file_path.is_some()));
        assert_eq!(
            merged.errors[2].file_path.as_deref(),
            Some(std::path::Path::new("b.log"))
        );
        assert_eq!(merged.data.unwrap().entry_count(), 2);
    }

    #[test]
    fn silent_failure_gets_a_synthesized_error() {
        let mut results = IndexMap::new();
        results.insert(PathBuf::from("empty.log"), ParseResult::failure(vec![]));
        results.insert(
            PathBuf::from("ok.log"),
            result_of(vec![entry("A", 1, 1)], vec![]),
        );

        let merged = merge_parse_results(results);
        assert!(merged.success());
        assert_eq!(merged.errors.len(), 1);
        assert_eq!(
            merged.errors[0].file_path.as_deref(),
            Some(std::path::Path::new("empty.log"))
        );
    }

    #[test]
    fn all_failed_means_no_data() {
        let mut results = IndexMap::new();
        results.insert(PathBuf::from("a.log"), ParseResult::failure(vec![]));
        let merged = merge_parse_results(results);
        assert!(!merged.success());
        assert!(merged.has_errors());
    }

    #[test]
    fn merging_nothing_yields_none() {
        assert!(merge_parsed_logs(Vec::new()).is_none());
        let merged = merge_parse_results(IndexMap::new());
        assert!(!merged.success());
        assert!(!merged.has_errors());
    }
}
