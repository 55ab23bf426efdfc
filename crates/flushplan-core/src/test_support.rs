//! Shared fixtures for in-crate tests.

use crate::{
    batch::{AsyncBatchRunner, BatchLimits, BatchResult, BatchRunner, SealedBatch},
    command::{CommandBatchPreparer, Operation, WriteIntent},
    error::{InternalError, StoreFault, StoreFaultKind},
    executor::{AsyncConnection, Connection, ConnectionState},
    model::{EntityDef, EntityId, ForeignKeyDef, Model},
    value::{Value, ValueKind},
};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
    },
};

/// Blog <- Post (`FK_Post_Blog`, nullable `BlogId`).
pub(crate) fn blog_model() -> Model {
    Model::builder()
        .entity(
            EntityDef::new("Blog")
                .property("Id", ValueKind::Int)
                .property("Name", ValueKind::Text)
                .key(&["Id"]),
        )
        .entity(
            EntityDef::new("Post")
                .property("Id", ValueKind::Int)
                .property("BlogId", ValueKind::Int)
                .property("Title", ValueKind::Text)
                .key(&["Id"]),
        )
        .foreign_key(ForeignKeyDef::new("FK_Post_Blog", "Post", &["BlogId"], "Blog"))
        .build()
        .expect("blog model should build")
}

pub(crate) fn entity(model: &Model, name: &str) -> EntityId {
    model
        .entity_id(name)
        .unwrap_or_else(|| panic!("entity '{name}' should exist"))
}

pub(crate) fn blog_row(id: i64, name: &str) -> Vec<Value> {
    vec![Value::Int(id), Value::from(name)]
}

pub(crate) fn post_row(id: i64, blog_id: Option<i64>, title: &str) -> Vec<Value> {
    vec![
        Value::Int(id),
        blog_id.map_or(Value::Null, Value::Int),
        Value::from(title),
    ]
}

pub(crate) fn preparer(model: &Model) -> CommandBatchPreparer<'_> {
    CommandBatchPreparer::new(model, Arc::new(BatchLimits::default()))
}

/// `(entity name, operation, first key value)` for one intent.
pub(crate) fn describe(model: &Model, intent: &WriteIntent) -> (String, Operation, Value) {
    (
        model.entity(intent.entity()).name.clone(),
        intent.operation(),
        intent.key_values().first().cloned().unwrap_or(Value::Null),
    )
}

pub(crate) fn describe_sets(
    model: &Model,
    sets: &[Vec<WriteIntent>],
) -> Vec<Vec<(String, Operation, Value)>> {
    sets.iter()
        .map(|set| set.iter().map(|intent| describe(model, intent)).collect())
        .collect()
}

/// Entry indexes in batch execution order.
pub(crate) fn execution_order(batches: &[SealedBatch]) -> Vec<usize> {
    batches
        .iter()
        .flat_map(SealedBatch::intents)
        .map(WriteIntent::entry_index)
        .collect()
}

// ---------------------------------------------------------------------------
// In-memory store fakes
// ---------------------------------------------------------------------------

///
/// FakeConnection
///
/// Records lifecycle calls and keeps written entry indexes pending until
/// commit; disposing an uncommitted transaction discards them.
///

#[derive(Debug, Default)]
pub(crate) struct FakeConnection {
    pub(crate) is_open: bool,
    pub(crate) in_transaction: bool,
    pub(crate) log: Vec<&'static str>,
    pub(crate) pending: Vec<usize>,
    pub(crate) committed: Vec<usize>,
}

impl FakeConnection {
    /// Connection already open inside a caller-started transaction.
    pub(crate) fn with_ambient_transaction() -> Self {
        Self {
            is_open: true,
            in_transaction: true,
            ..Self::default()
        }
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.log.iter().filter(|entry| **entry == call).count()
    }

    fn write(&mut self, batch: &SealedBatch) {
        let written = batch.intents().iter().map(WriteIntent::entry_index);
        if self.in_transaction {
            self.pending.extend(written);
        } else {
            self.committed.extend(written);
        }
    }
}

impl ConnectionState for FakeConnection {
    fn has_transaction(&self) -> bool {
        self.in_transaction
    }

    fn close(&mut self) {
        self.log.push("close");
        self.is_open = false;
    }

    fn dispose_transaction(&mut self) {
        self.log.push("dispose");
        self.in_transaction = false;
        self.pending.clear();
    }
}

impl Connection for FakeConnection {
    fn open(&mut self) -> Result<bool, InternalError> {
        if self.is_open {
            return Ok(false);
        }
        self.log.push("open");
        self.is_open = true;

        Ok(true)
    }

    fn begin_transaction(&mut self) -> Result<(), InternalError> {
        self.log.push("begin");
        self.in_transaction = true;

        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), InternalError> {
        self.log.push("commit");
        self.committed.append(&mut self.pending);

        Ok(())
    }
}

#[async_trait]
impl AsyncConnection for FakeConnection {
    async fn open(&mut self) -> Result<bool, InternalError> {
        Connection::open(self)
    }

    async fn begin_transaction(&mut self) -> Result<(), InternalError> {
        Connection::begin_transaction(self)
    }

    async fn commit_transaction(&mut self) -> Result<(), InternalError> {
        Connection::commit_transaction(self)
    }
}

///
/// Step
///
/// Scripted response of [`ScriptedRunner`] to one batch.
///

#[derive(Clone, Debug)]
pub(crate) enum Step {
    Affect,
    Short(usize),
    Fault(StoreFaultKind),
}

///
/// ScriptedRunner
///
/// Plays back queued steps, one per batch; an empty script means success.
///

#[derive(Debug, Default)]
pub(crate) struct ScriptedRunner {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedRunner {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    fn step(&self, batch: &SealedBatch, connection: &mut FakeConnection) -> Result<BatchResult, InternalError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        connection.log.push("batch");

        let step = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Step::Affect);
        match step {
            Step::Affect => {
                connection.write(batch);
                Ok(BatchResult::affected(batch.len()))
            }
            Step::Short(rows) => Ok(BatchResult::affected(rows)),
            Step::Fault(kind) => Err(InternalError::store(StoreFault::new(kind, "scripted fault"))),
        }
    }
}

impl BatchRunner<FakeConnection> for ScriptedRunner {
    fn run(&self, batch: &SealedBatch, connection: &mut FakeConnection) -> Result<BatchResult, InternalError> {
        self.step(batch, connection)
    }
}

#[async_trait]
impl AsyncBatchRunner<FakeConnection> for ScriptedRunner {
    async fn run(
        &self,
        batch: &SealedBatch,
        connection: &mut FakeConnection,
    ) -> Result<BatchResult, InternalError> {
        tokio::task::yield_now().await;
        self.step(batch, connection)
    }
}
