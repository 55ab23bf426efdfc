use crate::{
    batch::{BatchResult, BatchRunner, SealedBatch},
    entry::TrackedEntry,
    error::{ErrorClass, ErrorDetail, InternalError, StoreFaultKind},
    executor::{BatchExecutor, TransactionScope},
    model::{EntityDef, Model},
    obs::{metrics_report, metrics_reset_all},
    test_support::{
        FakeConnection, ScriptedRunner, Step, blog_model, blog_row, entity, post_row, preparer,
    },
    value::{Value, ValueKind},
};
use tokio_util::sync::CancellationToken;

// Blog 1 and Post 10 -> Blog 1: two batches.
fn two_batches() -> Vec<SealedBatch> {
    let model = blog_model();
    let entries = vec![
        TrackedEntry::added(entity(&model, "Blog"), blog_row(1, "news")),
        TrackedEntry::added(entity(&model, "Post"), post_row(10, Some(1), "hello")),
    ];

    preparer(&model)
        .batch_commands(&entries)
        .expect("prepared")
        .batches
}

#[test]
fn owned_transaction_is_begun_committed_and_disposed_once() {
    metrics_reset_all();
    let batches = two_batches();
    let runner = ScriptedRunner::default();
    let mut connection = FakeConnection::default();

    let outcome = BatchExecutor::default()
        .execute(&batches, &runner, &mut connection)
        .expect("save succeeds");

    assert_eq!(outcome.transaction, TransactionScope::OwnedByExecutor);
    assert_eq!(outcome.rows_affected, 2);
    assert_eq!(outcome.batches, 2);
    assert_eq!(
        connection.log,
        vec!["open", "begin", "batch", "batch", "commit", "dispose", "close"]
    );
    assert_eq!(connection.committed, vec![0, 1]);
    assert!(!connection.is_open);

    let counters = metrics_report(None).counters.expect("counters present");
    assert_eq!(counters.ops.transactions_committed, 1);
    assert_eq!(counters.ops.transactions_rolled_back, 0);
    assert_eq!(counters.ops.batches_executed, 2);
}

#[test]
fn ambient_transaction_is_never_begun_committed_disposed_or_closed() {
    let batches = two_batches();
    let runner = ScriptedRunner::default();
    let mut connection = FakeConnection::with_ambient_transaction();

    let outcome = BatchExecutor::default()
        .execute(&batches, &runner, &mut connection)
        .expect("save succeeds");

    assert_eq!(outcome.transaction, TransactionScope::AmbientExternal);
    assert_eq!(connection.log, vec!["batch", "batch"]);
    assert_eq!(connection.pending, vec![0, 1]);
    assert!(connection.is_open && connection.in_transaction);
}

#[test]
fn disabled_auto_transactions_only_open_and_close() {
    let batches = two_batches();
    let runner = ScriptedRunner::default();
    let mut connection = FakeConnection::default();

    let outcome = BatchExecutor::new(false)
        .execute(&batches, &runner, &mut connection)
        .expect("save succeeds");

    assert_eq!(outcome.transaction, TransactionScope::None);
    assert_eq!(connection.log, vec!["open", "batch", "batch", "close"]);
    assert_eq!(connection.committed, vec![0, 1]);
}

#[test]
fn empty_plan_leaves_the_connection_untouched() {
    let runner = ScriptedRunner::default();
    let mut connection = FakeConnection::default();

    let outcome = BatchExecutor::default()
        .execute(&[], &runner, &mut connection)
        .expect("nothing to do");

    assert_eq!(outcome.rows_affected, 0);
    assert_eq!(outcome.batches, 0);
    assert!(connection.log.is_empty());
}

#[test]
fn already_open_connection_is_left_open() {
    let batches = two_batches();
    let runner = ScriptedRunner::default();
    let mut connection = FakeConnection {
        is_open: true,
        ..FakeConnection::default()
    };

    BatchExecutor::default()
        .execute(&batches, &runner, &mut connection)
        .expect("save succeeds");

    assert_eq!(connection.count("close"), 0);
    assert!(connection.is_open);
}

#[test]
fn failed_batch_aborts_and_rolls_back() {
    metrics_reset_all();
    let batches = two_batches();
    let runner = ScriptedRunner::new([Step::Affect, Step::Fault(StoreFaultKind::ConstraintViolation)]);
    let mut connection = FakeConnection::default();

    let err = BatchExecutor::default()
        .execute(&batches, &runner, &mut connection)
        .expect_err("second batch fails");

    assert_eq!(err.class, ErrorClass::Store);
    assert_eq!(
        err.store_fault().map(|fault| fault.kind),
        Some(StoreFaultKind::ConstraintViolation)
    );
    assert_eq!(connection.log, vec!["open", "begin", "batch", "batch", "dispose", "close"]);
    assert!(connection.committed.is_empty());
    assert!(connection.pending.is_empty());

    let counters = metrics_report(None).counters.expect("counters present");
    assert_eq!(counters.ops.transactions_rolled_back, 1);
}

#[test]
fn short_row_count_is_a_concurrency_conflict() {
    let batches = two_batches();
    let runner = ScriptedRunner::new([Step::Short(0)]);
    let mut connection = FakeConnection::default();

    let err = BatchExecutor::default()
        .execute(&batches, &runner, &mut connection)
        .expect_err("zero rows for one write");

    assert!(err.is_concurrency_conflict());
    assert!(matches!(
        err.detail,
        Some(ErrorDetail::Concurrency {
            expected: 1,
            actual: 0
        })
    ));
    assert_eq!(runner.calls(), 1);
    assert_eq!(connection.count("commit"), 0);
    assert_eq!(connection.count("dispose"), 1);
}

struct GeneratedIdRunner;

impl BatchRunner<FakeConnection> for GeneratedIdRunner {
    fn run(
        &self,
        batch: &SealedBatch,
        _connection: &mut FakeConnection,
    ) -> Result<BatchResult, InternalError> {
        let mut result = BatchResult::affected(batch.len());
        for (position, _) in batch.intents().iter().enumerate() {
            let id = i64::try_from(position).unwrap_or_default() + 100;
            result = result.with_returned(position, vec![Value::Int(id)]);
        }

        Ok(result)
    }
}

#[test]
fn generated_values_are_returned_for_propagation() {
    let model = Model::builder()
        .entity(
            EntityDef::new("Ticket")
                .generated_property("Id", ValueKind::Int)
                .property("Title", ValueKind::Text)
                .key(&["Id"]),
        )
        .build()
        .expect("ticket model");
    let ticket = entity(&model, "Ticket");
    let entries = vec![
        TrackedEntry::added(ticket, vec![Value::Null, Value::from("a")]),
        TrackedEntry::added(ticket, vec![Value::Null, Value::from("b")]),
    ];
    let batches = preparer(&model)
        .batch_commands(&entries)
        .expect("prepared")
        .batches;

    let outcome = BatchExecutor::default()
        .execute(&batches, &GeneratedIdRunner, &mut FakeConnection::default())
        .expect("save succeeds");

    let propagated = outcome
        .propagated
        .iter()
        .map(|p| (p.entry_index, p.values.clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        propagated,
        vec![
            (0, vec![(0, Value::Int(100))]),
            (1, vec![(0, Value::Int(101))]),
        ]
    );
}

#[tokio::test]
async fn async_execution_matches_sync_lifecycle() {
    let batches = two_batches();
    let runner = ScriptedRunner::default();
    let mut connection = FakeConnection::default();

    let outcome = BatchExecutor::default()
        .execute_async(&batches, &runner, &mut connection, &CancellationToken::new())
        .await
        .expect("save succeeds");

    assert_eq!(outcome.rows_affected, 2);
    assert_eq!(
        connection.log,
        vec!["open", "begin", "batch", "batch", "commit", "dispose", "close"]
    );
}

#[tokio::test]
async fn cancellation_stops_before_the_next_batch() {
    let batches = two_batches();
    let runner = ScriptedRunner::default();
    let mut connection = FakeConnection::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = BatchExecutor::default()
        .execute_async(&batches, &runner, &mut connection, &cancel)
        .await
        .expect_err("cancelled");

    assert_eq!(err.class, ErrorClass::Cancelled);
    assert_eq!(runner.calls(), 0);
    assert!(connection.log.is_empty());
}
