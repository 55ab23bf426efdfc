//! Directed multigraph with a layered topological sort.
//!
//! Vertices live in an arena and are addressed by insertion index. Edges
//! carry labels; parallel edges between the same pair of vertices keep each
//! distinct label. Self-edges are allowed and always form a cycle.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

///
/// Multigraph
///

#[derive(Clone, Debug)]
pub struct Multigraph<V, E> {
    vertices: Vec<V>,
    successors: Vec<BTreeMap<usize, Vec<E>>>,
    edge_count: usize,
}

impl<V, E> Default for Multigraph<V, E> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            successors: Vec::new(),
            edge_count: 0,
        }
    }
}

impl<V, E> Multigraph<V, E>
where
    E: Clone + PartialEq,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(vertices: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            successors: Vec::with_capacity(vertices),
            edge_count: 0,
        }
    }

    /// Add a vertex and return its index.
    pub fn add_vertex(&mut self, vertex: V) -> usize {
        self.vertices.push(vertex);
        self.successors.push(BTreeMap::new());

        self.vertices.len() - 1
    }

    pub fn add_vertices(&mut self, vertices: impl IntoIterator<Item = V>) {
        for vertex in vertices {
            self.add_vertex(vertex);
        }
    }

    /// Add a labelled edge `from -> to`.
    ///
    /// Returns `false` when either endpoint is out of range or the same
    /// label already connects the pair.
    pub fn add_edge(&mut self, from: usize, to: usize, label: E) -> bool {
        if from >= self.vertices.len() || to >= self.vertices.len() {
            return false;
        }

        let labels = self.successors[from].entry(to).or_default();
        if labels.contains(&label) {
            return false;
        }
        labels.push(label);
        self.edge_count += 1;

        true
    }

    #[must_use]
    pub fn vertex(&self, index: usize) -> Option<&V> {
        self.vertices.get(index)
    }

    #[must_use]
    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    #[must_use]
    pub const fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub const fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Labels on edges `from -> to`, in insertion order.
    #[must_use]
    pub fn edges(&self, from: usize, to: usize) -> &[E] {
        self.successors
            .get(from)
            .and_then(|targets| targets.get(&to))
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn successors(&self, from: usize) -> impl Iterator<Item = usize> + '_ {
        self.successors
            .get(from)
            .into_iter()
            .flat_map(|targets| targets.keys().copied())
    }

    #[must_use]
    pub fn into_vertices(self) -> Vec<V> {
        self.vertices
    }

    /// Partition vertices into layers such that every edge points from an
    /// earlier layer to a strictly later one.
    ///
    /// Each layer is ascending by vertex index. On failure the returned
    /// [`Cycle`] names one concrete cycle among the vertices left unsorted.
    pub fn batching_topological_sort(&self) -> Result<Vec<Vec<usize>>, Cycle<E>> {
        let mut in_degree = vec![0usize; self.vertices.len()];
        for targets in &self.successors {
            for to in targets.keys() {
                in_degree[*to] += 1;
            }
        }

        let mut current = (0..self.vertices.len())
            .filter(|vertex| in_degree[*vertex] == 0)
            .collect::<Vec<_>>();
        let mut layers = Vec::new();
        let mut sorted = 0;

        while !current.is_empty() {
            let mut next = Vec::new();
            for vertex in &current {
                for to in self.successors[*vertex].keys() {
                    in_degree[*to] -= 1;
                    if in_degree[*to] == 0 {
                        next.push(*to);
                    }
                }
            }
            next.sort_unstable();

            sorted += current.len();
            layers.push(current);
            current = next;
        }

        if sorted == self.vertices.len() {
            return Ok(layers);
        }

        let remaining = in_degree.iter().map(|degree| *degree > 0).collect::<Vec<_>>();

        Err(self.find_cycle(&remaining))
    }

    /// Flat topological order (layers concatenated).
    pub fn topological_sort(&self) -> Result<Vec<usize>, Cycle<E>> {
        Ok(self
            .batching_topological_sort()?
            .into_iter()
            .flatten()
            .collect())
    }

    // Every unsorted vertex still has an unsorted predecessor, so walking
    // predecessors from any of them must eventually revisit a vertex.
    fn find_cycle(&self, remaining: &[bool]) -> Cycle<E> {
        let mut predecessors = vec![Vec::new(); self.vertices.len()];
        for (from, targets) in self.successors.iter().enumerate() {
            if !remaining[from] {
                continue;
            }
            for to in targets.keys() {
                predecessors[*to].push(from);
            }
        }

        let Some(start) = remaining.iter().position(|flag| *flag) else {
            return Cycle { edges: Vec::new() };
        };

        let mut path = vec![start];
        let mut position_in_path = vec![None; self.vertices.len()];
        position_in_path[start] = Some(0);
        let mut cursor = start;

        let entry = loop {
            let Some(predecessor) = predecessors[cursor].first().copied() else {
                return Cycle { edges: Vec::new() };
            };
            if let Some(position) = position_in_path[predecessor] {
                break position;
            }
            position_in_path[predecessor] = Some(path.len());
            path.push(predecessor);
            cursor = predecessor;
        };

        // path[entry] -> path[last] -> ... -> path[entry + 1] -> path[entry]
        let mut order = vec![path[entry]];
        order.extend(path[entry + 1..].iter().rev());

        let edges = order
            .iter()
            .enumerate()
            .map(|(i, from)| {
                let to = order[(i + 1) % order.len()];
                CycleEdge {
                    from: *from,
                    to,
                    labels: self.edges(*from, to).to_vec(),
                }
            })
            .collect();

        Cycle { edges }
    }
}

///
/// Cycle
///
/// Closed walk through the graph; each edge's `to` is the next edge's `from`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cycle<E> {
    pub edges: Vec<CycleEdge<E>>,
}

impl<E> Cycle<E> {
    /// Vertices on the cycle, in walk order.
    pub fn vertices(&self) -> impl Iterator<Item = usize> + '_ {
        self.edges.iter().map(|edge| edge.from)
    }
}

///
/// CycleEdge
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CycleEdge<E> {
    pub from: usize,
    pub to: usize,
    pub labels: Vec<E>,
}
