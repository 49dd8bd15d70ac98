//! Deriving contiguous per-signal state intervals from raw entries.
//!
//! The waveform and table renderers consume [`SignalData`]; everything here
//! is a pure function of a [`ParsedLog`].

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::{LogEntry, ParsedLog, SignalType, Value};

/// The time span during which one signal holds one constant value.
///
/// States for a signal never overlap and are contiguous: each state's end
/// is the next state's start. Only the final state of a single-sample
/// series may be zero-width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub value: Value,
}

impl SignalState {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// One signal's entries plus its derived state intervals.
///
/// `states` is computed lazily and cached; replacing the entries
/// invalidates it.
#[derive(Debug, Clone)]
pub struct SignalData {
    pub key: String,
    pub device_id: String,
    pub name: String,
    pub signal_type: SignalType,
    entries: Vec<LogEntry>,
    time_range: (NaiveDateTime, NaiveDateTime),
    states: Option<Vec<SignalState>>,
}

impl SignalData {
    fn new(
        device_id: String,
        name: String,
        entries: Vec<LogEntry>,
        time_range: (NaiveDateTime, NaiveDateTime),
    ) -> Self {
        let key = format!("{}::{}", device_id, name);
        let signal_type = entries
            .first()
            .map(|entry| entry.signal_type)
            .unwrap_or(SignalType::String);
        Self {
            key,
            device_id,
            name,
            signal_type,
            entries,
            time_range,
            states: None,
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Derived state intervals, computed on first access.
    pub fn states(&mut self) -> &[SignalState] {
        if self.states.is_none() {
            self.states = Some(signal_states(&self.entries, self.time_range));
        }
        self.states.as_deref().unwrap_or(&[])
    }

    pub fn has_transitions(&mut self) -> bool {
        self.states().len() > 1
    }

    /// Swap in a new entry sequence (time-sorted), dropping cached states.
    pub fn replace_entries(&mut self, entries: Vec<LogEntry>) {
        self.entries = entries;
        self.states = None;
    }

    pub fn display_label(&self) -> String {
        format!("{} -> {}", self.device_id, self.name)
    }
}

/// Group entries by `(device, signal)`, each group stable-sorted by
/// timestamp. Group order is first appearance in the log.
pub fn group_by_signal(log: &ParsedLog) -> IndexMap<(String, String), Vec<LogEntry>> {
    let mut grouped: IndexMap<(String, String), Vec<LogEntry>> = IndexMap::new();
    for entry in log.entries() {
        grouped
            .entry((entry.device_id.clone(), entry.signal_name.clone()))
            .or_default()
            .push(entry.clone());
    }
    for group in grouped.values_mut() {
        group.sort_by_key(|entry| entry.timestamp);
    }
    grouped
}

/// Convert a signal's time-sorted entries into contiguous states over
/// `time_range`. State `i` spans from entry `i` to entry `i+1`; the final
/// state extends to the end of the range.
pub fn signal_states(
    entries: &[LogEntry],
    time_range: (NaiveDateTime, NaiveDateTime),
) -> Vec<SignalState> {
    let (_, range_end) = time_range;
    let mut states = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let end = match entries.get(i + 1) {
            Some(next) => next.timestamp,
            None => range_end,
        };
        states.push(SignalState {
            start: entry.timestamp,
            end,
            value: entry.value.clone(),
        });
    }
    states
}

/// Process a parsed log into per-signal data ready for rendering, sorted
/// by device then signal name. States are precomputed.
pub fn derive_signal_data(log: &ParsedLog) -> Vec<SignalData> {
    let Some(time_range) = log.time_range() else {
        return Vec::new();
    };

    let mut signals: Vec<SignalData> = group_by_signal(log)
        .into_iter()
        .map(|((device_id, name), entries)| {
            let mut data = SignalData::new(device_id, name, entries, time_range);
            data.states();
            data
        })
        .collect();

    signals.sort_by(|a, b| {
        a.device_id
            .cmp(&b.device_id)
            .then_with(|| a.name.cmp(&b.name))
    });
    signals
}
