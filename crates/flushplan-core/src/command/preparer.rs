use crate::{
    batch::{BatchPolicy, ModificationBatch, SealedBatch},
    command::{
        Operation, WriteIntent,
        comparer::sort_independent_set,
        key_index::{IndexFactory, KeyValueIndex, ValueSource},
    },
    entry::TrackedEntry,
    error::{CycleHop, InternalError},
    graph::{Cycle, Multigraph},
    model::{ForeignKeyId, Model},
    obs::sink::{self, MetricsEvent},
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

///
/// PreparedCommands
///
/// Output of one preparation pass: sealed batches in execution order.
///

#[derive(Debug)]
pub struct PreparedCommands {
    pub batches: Vec<SealedBatch>,
    pub independent_sets: usize,
    pub noop_updates: usize,
}

impl PreparedCommands {
    /// Total write intents across every batch.
    #[must_use]
    pub fn intent_count(&self) -> usize {
        self.batches.iter().map(SealedBatch::len).sum()
    }
}

///
/// CommandBatchPreparer
///
/// Turns tracked entries into ordered, sealed batches:
/// intents -> dependency graph -> independent sets -> batches.
///

#[derive(Clone, Debug)]
pub struct CommandBatchPreparer<'m> {
    model: &'m Model,
    policy: Arc<dyn BatchPolicy>,
}

impl<'m> CommandBatchPreparer<'m> {
    #[must_use]
    pub fn new(model: &'m Model, policy: Arc<dyn BatchPolicy>) -> Self {
        Self { model, policy }
    }

    #[must_use]
    pub const fn model(&self) -> &'m Model {
        self.model
    }

    /// Run every preparation stage for one save attempt.
    pub fn batch_commands(&self, entries: &[TrackedEntry]) -> Result<PreparedCommands, InternalError> {
        let (intents, noop_updates) = self.create_intents(entries)?;
        let sets = self.top_sort(intents)?;
        let independent_sets = sets.len();

        let mut batches = Vec::new();
        for set in sets {
            batches.extend(self.batch_independent_set(set)?);
        }

        debug!(
            intents = batches.iter().map(SealedBatch::len).sum::<usize>(),
            independent_sets,
            batches = batches.len(),
            noop_updates,
            "prepared modification batches"
        );
        sink::record(MetricsEvent::BatchesPrepared {
            independent_sets: independent_sets as u64,
            batches: batches.len() as u64,
        });

        Ok(PreparedCommands {
            batches,
            independent_sets,
            noop_updates,
        })
    }

    /// Build one intent per entry, dropping updates that write nothing.
    /// Returns the intents and the number of elided updates.
    pub fn create_intents(
        &self,
        entries: &[TrackedEntry],
    ) -> Result<(Vec<WriteIntent>, usize), InternalError> {
        let mut intents = Vec::with_capacity(entries.len());
        let mut noop_updates = 0;

        for (index, entry) in entries.iter().enumerate() {
            let entity = entry.validate(self.model)?;
            let intent = WriteIntent::new(index, entry, entity)?;
            if intent.is_noop() {
                noop_updates += 1;
                continue;
            }
            intents.push(intent);
        }

        sink::record(MetricsEvent::IntentsPrepared {
            intents: intents.len() as u64,
            noop_updates: noop_updates as u64,
        });

        Ok((intents, noop_updates))
    }

    /// Order intents into independent sets, each sorted for determinism.
    pub fn top_sort(&self, intents: Vec<WriteIntent>) -> Result<Vec<Vec<WriteIntent>>, InternalError> {
        let graph = self.build_dependency_graph(intents)?;

        let layers = match graph.batching_topological_sort() {
            Ok(layers) => layers,
            Err(cycle) => {
                sink::record(MetricsEvent::CycleDetected {
                    writes: cycle.edges.len() as u64,
                });
                return Err(self.cycle_error(&graph, &cycle));
            }
        };

        let mut slots = graph.into_vertices().into_iter().map(Some).collect::<Vec<_>>();
        let mut sets = Vec::with_capacity(layers.len());
        for layer in layers {
            let mut set = Vec::with_capacity(layer.len());
            for vertex in layer {
                let intent = slots
                    .get_mut(vertex)
                    .and_then(Option::take)
                    .ok_or_else(|| {
                        InternalError::command_invariant(format!(
                            "topological sort emitted vertex {vertex} more than once"
                        ))
                    })?;
                set.push(intent);
            }
            sort_independent_set(&mut set);
            sets.push(set);
        }

        Ok(sets)
    }

    /// Build the dependency graph over `intents` in two passes over a
    /// predecessor map keyed by key values.
    pub fn build_dependency_graph(
        &self,
        intents: Vec<WriteIntent>,
    ) -> Result<Multigraph<WriteIntent, ForeignKeyId>, InternalError> {
        let mut graph = Multigraph::with_capacity(intents.len());
        graph.add_vertices(intents);

        let predecessors = self.collect_predecessors(graph.vertices())?;

        let mut edges = Vec::new();
        for (vertex, intent) in graph.vertices().iter().enumerate() {
            let mut link = |index: &KeyValueIndex| {
                if let Some(froms) = predecessors.get(index) {
                    for from in froms {
                        if *from != vertex {
                            edges.push((*from, vertex, index.foreign_key()));
                        }
                    }
                }
            };

            match intent.operation() {
                Operation::Insert | Operation::Update => {
                    for fk in self.model.declared_foreign_keys(intent.entity()) {
                        let factory = IndexFactory::get(&fk.principal_key.shape);
                        if let Some(index) =
                            factory.dependent_index(intent, fk, ValueSource::Current)?
                        {
                            link(&index);
                            if fk.unique {
                                link(&index.with_original_values_flag());
                            }
                        }
                    }
                }
                Operation::Delete => {
                    for fk in self.model.referencing_foreign_keys(intent.entity()) {
                        let factory = IndexFactory::get(&fk.principal_key.shape);
                        if let Some(index) =
                            factory.principal_index(intent, fk, ValueSource::Original)?
                        {
                            link(&index);
                        }
                    }
                }
            }
        }

        for (from, to, fk) in edges {
            graph.add_edge(from, to, fk);
        }

        Ok(graph)
    }

    // Record every intent under the key values it creates or releases.
    fn collect_predecessors(
        &self,
        intents: &[WriteIntent],
    ) -> Result<HashMap<KeyValueIndex, Vec<usize>>, InternalError> {
        let mut predecessors: HashMap<KeyValueIndex, Vec<usize>> = HashMap::new();

        for (vertex, intent) in intents.iter().enumerate() {
            let operation = intent.operation();

            if matches!(operation, Operation::Insert | Operation::Update) {
                for fk in self.model.referencing_foreign_keys(intent.entity()) {
                    if operation == Operation::Update
                        && !intent.any_modified(&fk.principal_key.properties)
                    {
                        continue;
                    }
                    let factory = IndexFactory::get(&fk.principal_key.shape);
                    if let Some(index) = factory.principal_index(intent, fk, ValueSource::Current)? {
                        predecessors.entry(index).or_default().push(vertex);
                    }
                }
            }

            if matches!(operation, Operation::Update | Operation::Delete) {
                for fk in self.model.declared_foreign_keys(intent.entity()) {
                    if operation == Operation::Update && !intent.any_modified(&fk.properties) {
                        continue;
                    }
                    let factory = IndexFactory::get(&fk.principal_key.shape);
                    if let Some(index) = factory.dependent_index(intent, fk, ValueSource::Original)? {
                        predecessors.entry(index).or_default().push(vertex);
                    }
                }
            }
        }

        Ok(predecessors)
    }

    // Greedily fill batches; a rejected intent opens the next batch once.
    fn batch_independent_set(&self, set: Vec<WriteIntent>) -> Result<Vec<SealedBatch>, InternalError> {
        let mut sealed = Vec::new();
        let mut batch = ModificationBatch::new(Arc::clone(&self.policy));

        for intent in set {
            let Err(rejected) = batch.try_add(intent) else {
                continue;
            };
            if batch.is_empty() {
                return Err(self.capacity_error(&rejected));
            }

            let full = std::mem::replace(&mut batch, ModificationBatch::new(Arc::clone(&self.policy)));
            sealed.push(full.seal()?);

            if let Err(rejected) = batch.try_add(rejected) {
                return Err(self.capacity_error(&rejected));
            }
        }

        if !batch.is_empty() {
            sealed.push(batch.seal()?);
        }

        Ok(sealed)
    }

    fn capacity_error(&self, intent: &WriteIntent) -> InternalError {
        let entity = self.model.entity(intent.entity());

        InternalError::capacity(format!(
            "{} of '{}' on {} binds {} parameter(s) and does not fit in an empty batch",
            intent.operation(),
            entity.name,
            intent.table(),
            intent.parameter_count(),
        ))
    }

    fn cycle_error(
        &self,
        graph: &Multigraph<WriteIntent, ForeignKeyId>,
        cycle: &Cycle<ForeignKeyId>,
    ) -> InternalError {
        let hops = cycle
            .edges
            .iter()
            .filter_map(|edge| {
                let from = graph.vertex(edge.from)?;
                let to = graph.vertex(edge.to)?;

                Some(CycleHop {
                    from_entity: self.model.entity(from.entity()).name.clone(),
                    from_operation: from.operation(),
                    to_entity: self.model.entity(to.entity()).name.clone(),
                    to_operation: to.operation(),
                    foreign_keys: edge
                        .labels
                        .iter()
                        .map(|fk| self.model.foreign_key(*fk).name.clone())
                        .collect(),
                })
            })
            .collect();

        InternalError::ordering_cycle(hops)
    }
}
