//! Metrics sink boundary.
//!
//! Engine logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between execution logic
//! and the per-thread metrics state.
use crate::{command::Operation, model::TableId, obs::metrics};
use std::{cell::RefCell, rc::Rc, time::Instant};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    SaveStart,
    SaveFinish {
        rows_affected: u64,
        succeeded: bool,
        elapsed_micros: u64,
    },
    IntentsPrepared {
        intents: u64,
        noop_updates: u64,
    },
    BatchesPrepared {
        independent_sets: u64,
        batches: u64,
    },
    CycleDetected {
        writes: u64,
    },
    BatchExecuted {
        commands: u64,
        parameters: u64,
    },
    WriteApplied {
        table: &'a TableId,
        operation: Operation,
    },
    ConcurrencyConflict {
        expected: u64,
        actual: u64,
    },
    TransactionCommitted,
    TransactionDisposed {
        committed: bool,
    },
    RetryScheduled {
        attempt: u64,
        delay_ms: u64,
    },
    RetryLimitExceeded {
        attempts: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink that writes into the per-thread metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::SaveStart => {
                metrics::with_state_mut(|m| m.ops.save_calls = m.ops.save_calls.saturating_add(1));
            }

            MetricsEvent::SaveFinish {
                rows_affected,
                succeeded,
                elapsed_micros,
            } => {
                metrics::with_state_mut(|m| {
                    if succeeded {
                        m.ops.rows_affected = m.ops.rows_affected.saturating_add(rows_affected);
                    } else {
                        m.ops.save_failures = m.ops.save_failures.saturating_add(1);
                    }
                    metrics::add_elapsed(
                        &mut m.perf.save_micros_total,
                        &mut m.perf.save_micros_max,
                        elapsed_micros,
                    );
                });
            }

            MetricsEvent::IntentsPrepared {
                intents,
                noop_updates,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.intents_prepared = m.ops.intents_prepared.saturating_add(intents);
                    m.ops.noop_updates_elided =
                        m.ops.noop_updates_elided.saturating_add(noop_updates);
                });
            }

            MetricsEvent::BatchesPrepared {
                independent_sets,
                batches,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.independent_sets = m.ops.independent_sets.saturating_add(independent_sets);
                    m.ops.batches_prepared = m.ops.batches_prepared.saturating_add(batches);
                });
            }

            MetricsEvent::CycleDetected { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.cycles_detected = m.ops.cycles_detected.saturating_add(1);
                });
            }

            MetricsEvent::BatchExecuted {
                commands,
                parameters,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.batches_executed = m.ops.batches_executed.saturating_add(1);
                    m.ops.commands_executed = m.ops.commands_executed.saturating_add(commands);
                    m.ops.parameters_bound = m.ops.parameters_bound.saturating_add(parameters);
                });
            }

            MetricsEvent::WriteApplied { table, operation } => {
                metrics::with_state_mut(|m| {
                    let entry = m.tables.entry(table.to_string()).or_default();
                    match operation {
                        Operation::Insert => entry.inserts = entry.inserts.saturating_add(1),
                        Operation::Update => entry.updates = entry.updates.saturating_add(1),
                        Operation::Delete => entry.deletes = entry.deletes.saturating_add(1),
                    }
                });
            }

            MetricsEvent::ConcurrencyConflict { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.concurrency_conflicts = m.ops.concurrency_conflicts.saturating_add(1);
                });
            }

            MetricsEvent::TransactionCommitted => {
                metrics::with_state_mut(|m| {
                    m.ops.transactions_committed = m.ops.transactions_committed.saturating_add(1);
                });
            }

            MetricsEvent::TransactionDisposed { committed } => {
                if !committed {
                    metrics::with_state_mut(|m| {
                        m.ops.transactions_rolled_back =
                            m.ops.transactions_rolled_back.saturating_add(1);
                    });
                }
            }

            MetricsEvent::RetryScheduled { delay_ms, .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.retries_scheduled = m.ops.retries_scheduled.saturating_add(1);
                    m.perf.retry_delay_ms_total = m
                        .perf
                        .retry_delay_ms_total
                        .saturating_add(u128::from(delay_ms));
                });
            }

            MetricsEvent::RetryLimitExceeded { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.retry_limits_exceeded = m.ops.retry_limits_exceeded.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current thread's metrics state.
///
/// `window_start_ms` filters by window start (`EventState::since_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state (counters + perf).
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let previous = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = previous;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

/// Span
/// RAII guard that emits start/finish metrics events for one save call.
/// Ensures finish accounting happens even on unwind or early return.

pub(crate) struct Span {
    start: Instant,
    rows: u64,
    succeeded: bool,
    finished: bool,
}

impl Span {
    #[must_use]
    pub(crate) fn new() -> Self {
        record(MetricsEvent::SaveStart);

        Self {
            start: Instant::now(),
            rows: 0,
            succeeded: false,
            finished: false,
        }
    }

    /// Mark the save as successful with its affected-row total.
    pub(crate) const fn succeed(&mut self, rows: u64) {
        self.rows = rows;
        self.succeeded = true;
    }

    fn finish_inner(&self) {
        let elapsed_micros = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);

        record(MetricsEvent::SaveFinish {
            rows_affected: self.rows,
            succeeded: self.succeeded,
            elapsed_micros,
        });
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if !self.finished {
            self.finish_inner();
            self.finished = true;
        }
    }
}

///
/// TESTS
///
