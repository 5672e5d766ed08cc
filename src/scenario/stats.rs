//! Per-scenario execution statistics.

use crate::variant::{Dictionary, Sequence, Variant};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

const TOP_REPORT_SIZE: usize = 10;

/// Invocation count with accumulated wall-clock and thread CPU time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeCounter {
    pub count: u64,
    pub global_time: Duration,
    pub thread_time: Duration,
}

impl TimeCounter {
    fn add(&mut self, global: Duration, thread: Duration) {
        self.count += 1;
        self.global_time += global;
        self.thread_time += thread;
    }

    /// `{"count", "globalTime", "threadTime"}` with times in milliseconds
    pub fn to_variant(&self) -> Variant {
        crate::dict! {
            "count" => self.count,
            "globalTime" => self.global_time.as_millis() as u64,
            "threadTime" => self.thread_time.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionStatistic {
    pub total: TimeCounter,
    pub lines: Vec<TimeCounter>,
}

/// Timings of one scenario invocation
#[derive(Debug, Clone, Default)]
pub struct ExecutionSample {
    pub global_time: Duration,
    pub thread_time: Duration,
    /// (line index, global, thread) per executed line
    pub lines: Vec<(usize, Duration, Duration)>,
}

struct ScenarioEntry {
    line_labels: Vec<String>,
    stat: ExecutionStatistic,
}

struct State {
    enabled: bool,
    generation: u64,
    scenarios: BTreeMap<String, ScenarioEntry>,
}

/// Statistics of all scenarios of one manager, guarded by a single mutex
pub struct StatisticCollector {
    state: Mutex<State>,
}

impl StatisticCollector {
    /// `scenarios` lists each scenario name with its line labels
    pub fn new(enabled: bool, scenarios: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        let scenarios = scenarios
            .into_iter()
            .map(|(name, line_labels)| {
                let stat = ExecutionStatistic {
                    total: TimeCounter::default(),
                    lines: vec![TimeCounter::default(); line_labels.len()],
                };
                (name, ScenarioEntry { line_labels, stat })
            })
            .collect();
        Self {
            state: Mutex::new(State {
                enabled,
                generation: 0,
                scenarios,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Switch collection. Turning it on after it was off starts from zero.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        if enabled && !state.enabled {
            state.generation += 1;
            for entry in state.scenarios.values_mut() {
                entry.stat = ExecutionStatistic {
                    total: TimeCounter::default(),
                    lines: vec![TimeCounter::default(); entry.line_labels.len()],
                };
            }
        }
        state.enabled = enabled;
    }

    /// Token for a starting invocation; `None` when collection is off
    pub fn begin(&self) -> Option<u64> {
        let state = self.state.lock();
        state.enabled.then_some(state.generation)
    }

    /// Record an invocation started under `token`. Samples from an earlier
    /// collection period are dropped.
    pub fn record(&self, token: u64, scenario: &str, sample: &ExecutionSample) {
        let mut state = self.state.lock();
        if !state.enabled || state.generation != token {
            return;
        }
        let Some(entry) = state.scenarios.get_mut(scenario) else {
            return;
        };
        entry.stat.total.add(sample.global_time, sample.thread_time);
        for (line, global, thread) in &sample.lines {
            if let Some(counter) = entry.stat.lines.get_mut(*line) {
                counter.add(*global, *thread);
            }
        }
    }

    pub fn snapshot(&self, scenario: &str) -> Option<ExecutionStatistic> {
        self.state.lock().scenarios.get(scenario).map(|e| e.stat.clone())
    }

    /// `{}` when disabled, otherwise `{"total", "full"?, "reports"}`
    pub fn report(&self, show_line_info: bool) -> Variant {
        let state = self.state.lock();
        if !state.enabled {
            return Variant::Dictionary(Dictionary::new());
        }

        let mut total = Dictionary::new();
        let mut full = Dictionary::new();
        for (name, entry) in &state.scenarios {
            total.put(name.as_str(), entry.stat.total.to_variant());
            if show_line_info {
                let mut lines = Dictionary::new();
                for (label, counter) in entry.line_labels.iter().zip(&entry.stat.lines) {
                    lines.put(label.as_str(), counter.to_variant());
                }
                full.put(
                    name.as_str(),
                    crate::dict! { "total" => entry.stat.total.to_variant(), "lines" => lines },
                );
            }
        }

        let mut reports = Dictionary::new();
        reports.put("topByCount", top_by(&state, |c| (c.count, c.thread_time)));
        reports.put("topByThreadTime", top_by(&state, |c| (c.thread_time.as_micros() as u64, c.global_time)));
        reports.put("topByGlobalTime", top_by(&state, |c| (c.global_time.as_micros() as u64, c.thread_time)));

        let mut result = Dictionary::new();
        result.put("total", total);
        if show_line_info {
            result.put("full", full);
        }
        result.put("reports", reports);
        Variant::Dictionary(result)
    }
}

fn top_by<K: Ord>(state: &State, key: impl Fn(&TimeCounter) -> K) -> Sequence {
    let mut ranked: Vec<(&String, &TimeCounter)> = state
        .scenarios
        .iter()
        .map(|(name, entry)| (name, &entry.stat.total))
        .filter(|(_, counter)| counter.count > 0)
        .collect();
    ranked.sort_by(|a, b| key(b.1).cmp(&key(a.1)).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(TOP_REPORT_SIZE)
        .map(|(name, counter)| {
            let mut item = Dictionary::new();
            item.put("name", name.as_str());
            item.put("count", counter.count);
            item.put("threadTime", counter.thread_time.as_millis() as u64);
            item.put("globalTime", counter.global_time.as_millis() as u64);
            Variant::Dictionary(item)
        })
        .collect()
}
