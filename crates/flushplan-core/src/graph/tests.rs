use crate::graph::Multigraph;
use proptest::prelude::*;

fn layer_of(layers: &[Vec<usize>], vertex: usize) -> usize {
    layers
        .iter()
        .position(|layer| layer.contains(&vertex))
        .expect("every vertex must be placed in a layer")
}

#[test]
fn independent_vertices_share_one_layer() {
    let mut graph = Multigraph::<&str, &str>::new();
    graph.add_vertices(["a", "b", "c"]);

    let layers = graph
        .batching_topological_sort()
        .expect("edgeless graph must sort");
    assert_eq!(layers, vec![vec![0, 1, 2]]);
}

#[test]
fn chain_produces_one_layer_per_vertex() {
    let mut graph = Multigraph::<&str, &str>::new();
    graph.add_vertices(["blog", "post", "comment"]);
    assert!(graph.add_edge(0, 1, "FK_Post_Blog"));
    assert!(graph.add_edge(1, 2, "FK_Comment_Post"));

    let layers = graph.batching_topological_sort().expect("chain must sort");
    assert_eq!(layers, vec![vec![0], vec![1], vec![2]]);
    assert_eq!(graph.topological_sort().expect("chain must sort"), vec![0, 1, 2]);
}

#[test]
fn parallel_edges_keep_distinct_labels_only() {
    let mut graph = Multigraph::<(), &str>::new();
    graph.add_vertices([(), ()]);

    assert!(graph.add_edge(0, 1, "FK_A"));
    assert!(graph.add_edge(0, 1, "FK_B"));
    assert!(!graph.add_edge(0, 1, "FK_A"));
    assert!(!graph.add_edge(0, 5, "FK_C"));

    assert_eq!(graph.edges(0, 1), &["FK_A", "FK_B"]);
    assert_eq!(graph.edge_count(), 2);
    assert_eq!(graph.successors(0).collect::<Vec<_>>(), vec![1]);

    let layers = graph
        .batching_topological_sort()
        .expect("parallel edges are not a cycle");
    assert_eq!(layers, vec![vec![0], vec![1]]);
}

#[test]
fn self_edge_is_reported_as_cycle() {
    let mut graph = Multigraph::<(), &str>::new();
    graph.add_vertices([(), ()]);
    graph.add_edge(0, 1, "FK_Next");
    graph.add_edge(1, 1, "FK_Self");

    let cycle = graph
        .batching_topological_sort()
        .expect_err("self edge must not sort");
    assert_eq!(cycle.edges.len(), 1);
    assert_eq!(cycle.edges[0].from, 1);
    assert_eq!(cycle.edges[0].to, 1);
    assert_eq!(cycle.edges[0].labels, vec!["FK_Self"]);
}

#[test]
fn cycle_excludes_vertices_downstream_of_it() {
    // 0 -> 1 -> 2 -> 1, 2 -> 3
    let mut graph = Multigraph::<(), &str>::new();
    graph.add_vertices([(), (), (), ()]);
    graph.add_edge(0, 1, "a");
    graph.add_edge(1, 2, "b");
    graph.add_edge(2, 1, "c");
    graph.add_edge(2, 3, "d");

    let cycle = graph
        .batching_topological_sort()
        .expect_err("1 <-> 2 must not sort");

    let mut vertices = cycle.vertices().collect::<Vec<_>>();
    vertices.sort_unstable();
    assert_eq!(vertices, vec![1, 2]);
}

fn dag_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..24).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..(n * 3));
        (Just(n), edges)
    })
}

proptest! {
    #[test]
    fn acyclic_graphs_sort_into_strictly_increasing_layers((n, raw) in dag_strategy()) {
        let mut graph = Multigraph::<usize, usize>::with_capacity(n);
        graph.add_vertices(0..n);

        // Orient every edge low -> high so the graph stays acyclic.
        let edges = raw
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect::<Vec<_>>();
        for (label, (from, to)) in edges.iter().enumerate() {
            graph.add_edge(*from, *to, label);
        }

        let layers = graph.batching_topological_sort().expect("dag must sort");

        let mut placed = layers.iter().flatten().copied().collect::<Vec<_>>();
        placed.sort_unstable();
        prop_assert_eq!(placed, (0..n).collect::<Vec<_>>());

        for (from, to) in &edges {
            prop_assert!(layer_of(&layers, *from) < layer_of(&layers, *to));
        }
        for layer in &layers {
            prop_assert!(!layer.is_empty());
            prop_assert!(layer.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn cyclic_graphs_report_a_closed_walk_of_real_edges((n, raw) in dag_strategy(), back in any::<prop::sample::Index>()) {
        let mut graph = Multigraph::<usize, usize>::with_capacity(n + 1);
        graph.add_vertices(0..=n);

        for (label, (a, b)) in raw.iter().enumerate() {
            if a != b {
                graph.add_edge(*a.min(b), *a.max(b), label);
            }
        }

        // Chain 0..=n forward, then close it from n back to a chosen vertex.
        for vertex in 0..n {
            graph.add_edge(vertex, vertex + 1, usize::MAX);
        }
        let target = back.index(n + 1);
        graph.add_edge(n, target, usize::MAX - 1);

        let cycle = graph.batching_topological_sort().expect_err("closed chain must not sort");
        prop_assert!(!cycle.edges.is_empty());

        for (i, edge) in cycle.edges.iter().enumerate() {
            let next = &cycle.edges[(i + 1) % cycle.edges.len()];
            prop_assert_eq!(edge.to, next.from);
            prop_assert!(!edge.labels.is_empty());
            prop_assert_eq!(graph.edges(edge.from, edge.to), edge.labels.as_slice());
        }
    }
}
