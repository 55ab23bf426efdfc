use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters and simple perf totals for save calls.
/// State is kept per thread.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub perf: EventPerf,
    pub tables: BTreeMap<String, TableCounters>,
    pub since_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            perf: EventPerf::default(),
            tables: BTreeMap::new(),
            since_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Save entrypoints
    pub save_calls: u64,
    pub save_failures: u64,
    pub rows_affected: u64,

    // Preparation
    pub intents_prepared: u64,
    pub noop_updates_elided: u64,
    pub independent_sets: u64,
    pub batches_prepared: u64,
    pub cycles_detected: u64,

    // Execution
    pub batches_executed: u64,
    pub commands_executed: u64,
    pub parameters_bound: u64,
    pub concurrency_conflicts: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,

    // Retry
    pub retries_scheduled: u64,
    pub retry_limits_exceeded: u64,
}

///
/// TableCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TableCounters {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
}

///
/// Perf
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventPerf {
    pub save_micros_total: u128,
    pub save_micros_max: u64,
    pub retry_delay_ms_total: u128,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all event state: counters and perf.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Accumulate elapsed time and track a max.
pub(crate) fn add_elapsed(total: &mut u128, max: &mut u64, delta: u64) {
    *total = total.saturating_add(u128::from(delta));
    if delta > *max {
        *max = delta;
    }
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Ephemeral runtime counters since `since_ms`.
    pub counters: Option<EventState>,
    /// Per-table write counters, busiest first.
    pub table_counters: Vec<TableSummary>,
}

///
/// TableSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub total: u64,
}

/// Build a report, or an empty one if the current window started before
/// `window_start_ms`.
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let snap = with_state(Clone::clone);
    if let Some(requested) = window_start_ms
        && snap.since_ms < requested
    {
        return EventReport::default();
    }

    let mut table_counters = snap
        .tables
        .iter()
        .map(|(table, counters)| TableSummary {
            table: table.clone(),
            inserts: counters.inserts,
            updates: counters.updates,
            deletes: counters.deletes,
            total: counters
                .inserts
                .saturating_add(counters.updates)
                .saturating_add(counters.deletes),
        })
        .collect::<Vec<_>>();

    // Busiest first, then table name.
    table_counters.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.table.cmp(&b.table)));

    EventReport {
        counters: Some(snap),
        table_counters,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_all_clears_state() {
        with_state_mut(|m| {
            m.ops.save_calls = 3;
            m.ops.batches_executed = 2;
            m.perf.save_micros_max = 9;
            m.tables.insert(
                "alpha".to_string(),
                TableCounters {
                    inserts: 1,
                    ..Default::default()
                },
            );
        });

        reset_all();

        with_state(|m| {
            assert_eq!(m.ops.save_calls, 0);
            assert_eq!(m.ops.batches_executed, 0);
            assert_eq!(m.perf.save_micros_max, 0);
            assert!(m.tables.is_empty());
        });
    }

    #[test]
    fn report_sorts_tables_by_total_writes() {
        reset_all();
        with_state_mut(|m| {
            m.tables.insert(
                "alpha".to_string(),
                TableCounters {
                    inserts: 2,
                    ..Default::default()
                },
            );
            m.tables.insert(
                "beta".to_string(),
                TableCounters {
                    inserts: 1,
                    updates: 2,
                    deletes: 1,
                },
            );
            m.tables.insert(
                "gamma".to_string(),
                TableCounters {
                    deletes: 2,
                    ..Default::default()
                },
            );
        });

        let report = report_window_start(None);
        let tables: Vec<_> = report
            .table_counters
            .iter()
            .map(|t| t.table.as_str())
            .collect();

        assert_eq!(tables, ["beta", "alpha", "gamma"]);
        assert_eq!(report.table_counters[0].total, 4);
    }

    #[test]
    fn future_window_start_yields_empty_report() {
        reset_all();
        let report = report_window_start(Some(u64::MAX));

        assert!(report.counters.is_none());
        assert!(report.table_counters.is_empty());
    }
}
