//! Integration Tests for the DAG Engine
//!
//! These tests drive the public API end to end: mutation with cycle
//! prevention, closures under concurrent use, reduction, flows and
//! snapshots.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use trellis_core::{
    Dag, DagError, ErrorKind, FlowError, HashFn, Options, ParentResult, StorableDag,
};

fn numbered(n: usize, edges: &[(usize, usize)]) -> Dag<usize> {
    let dag = Dag::new();
    for i in 0..n {
        dag.add_vertex_by_id(i.to_string(), i).unwrap();
    }
    for (src, dst) in edges {
        dag.add_edge(&src.to_string(), &dst.to_string()).unwrap();
    }
    dag
}

fn ids(set: &trellis_core::IdSet) -> HashSet<String> {
    set.iter().cloned().collect()
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Reachable sets computed by a plain search, ignoring any cache.
fn reachable(dag: &Dag<usize>, id: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack = vec![id.to_string()];
    while let Some(current) = stack.pop() {
        for child in dag.get_children(&current).unwrap().into_keys() {
            if seen.insert(child.clone()) {
                stack.push(child);
            }
        }
    }
    seen
}

/// Test closures and cycle rejection on the reference graph.
#[test]
fn closures_and_cycle_rejection() {
    let dag = numbered(5, &[(0, 1), (0, 3), (1, 2), (2, 4), (3, 4)]);

    assert_eq!(ids(&dag.get_descendants("0").unwrap()), set(&["1", "2", "3", "4"]));
    assert_eq!(ids(&dag.get_ancestors("4").unwrap()), set(&["0", "1", "2", "3"]));

    let err = dag.add_edge("4", "0").unwrap_err();
    assert!(matches!(err, DagError::EdgeLoop { .. }));
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(err.to_string(), "edge between '4' and '0' would create a loop");

    // the rejected edge left nothing behind
    assert_eq!(dag.get_size(), 5);
    assert!(dag.get_descendants("4").unwrap().is_empty());
}

/// Test that closures stay correct through a mixed sequence of mutations.
#[test]
fn closures_track_mutations() {
    let dag = numbered(8, &[(0, 1), (1, 2), (2, 3), (4, 5), (5, 6)]);

    // warm every closure
    for i in 0..8 {
        dag.get_descendants(&i.to_string()).unwrap();
        dag.get_ancestors(&i.to_string()).unwrap();
    }

    dag.add_edge("3", "4").unwrap();
    dag.add_edge("6", "7").unwrap();
    dag.delete_edge("1", "2").unwrap();
    dag.add_edge("0", "5").unwrap();
    dag.delete_vertex("5").unwrap();

    for i in [0, 1, 2, 3, 4, 6, 7] {
        let id = i.to_string();
        assert_eq!(ids(&dag.get_descendants(&id).unwrap()), reachable(&dag, &id), "vertex {id}");
    }
    assert_eq!(ids(&dag.get_ancestors("7").unwrap()), set(&["6"]));
    assert_eq!(ids(&dag.get_ancestors("4").unwrap()), set(&["2", "3"]));
}

/// Test that deleting twice fails cleanly without side effects.
#[test]
fn repeated_deletion_errors() {
    let dag = numbered(3, &[(0, 1), (1, 2)]);

    dag.delete_edge("0", "1").unwrap();
    let err = dag.delete_edge("0", "1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    dag.delete_vertex("2").unwrap();
    assert_eq!(dag.delete_vertex("2").unwrap_err(), DagError::IdUnknown("2".into()));
    assert_eq!(dag.get_order(), 2);
    assert_eq!(dag.get_size(), 0);
}

/// Test that the shortcut of a diamond is the only edge removed.
#[test]
fn transitive_reduction_of_diamond() {
    let dag = Dag::new();
    for id in ["A", "B", "C", "D"] {
        dag.add_vertex_by_id(id, id.to_lowercase()).unwrap();
    }
    for (src, dst) in [("A", "B"), ("A", "C"), ("B", "D"), ("C", "D"), ("A", "D")] {
        dag.add_edge(src, dst).unwrap();
    }

    assert_eq!(dag.reduce_transitively(), 1);
    assert!(!dag.is_edge("A", "D").unwrap());
    for (src, dst) in [("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")] {
        assert!(dag.is_edge(src, dst).unwrap());
    }
}

/// Test the sum flow: each vertex adds its own id to its parents' results.
#[test]
fn descendants_flow_sums() {
    let dag = numbered(5, &[(0, 1), (0, 3), (1, 2), (2, 4), (3, 4)]);
    let calls = AtomicUsize::new(0);

    let results = dag
        .descendants_flow(
            "0",
            None,
            |dag: &Dag<usize>, id: &str, parents: &[ParentResult<'_, usize>]| {
                calls.fetch_add(1, Ordering::SeqCst);
                let own = *dag.get_vertex(id)?;
                Ok::<_, DagError>(own + parents.iter().map(|p| *p.result).sum::<usize>())
            },
        )
        .unwrap();

    assert_eq!(results["4"], 10);
    assert_eq!(results.len(), 5);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

/// Test that a failed flow reports the error and keeps finished results.
#[test]
fn descendants_flow_failure() {
    let dag = numbered(4, &[(0, 1), (1, 2), (2, 3)]);

    let err = dag
        .descendants_flow(
            "0",
            Some(&1),
            |_: &Dag<usize>, id: &str, parents: &[ParentResult<'_, usize>]| {
                if id == "2" {
                    return Err(format!("cannot process {id}"));
                }
                Ok(parents.iter().map(|p| *p.result).sum::<usize>())
            },
        )
        .unwrap_err();

    assert_eq!(err.to_string(), "flow callback for '2' failed: cannot process 2");
    let partial = err.partial_results().unwrap();
    assert_eq!(partial.len(), 2);
    assert_eq!(partial["0"], 1);
    assert_eq!(partial["1"], 1);
    assert!(matches!(err, FlowError::Callback { ref id, .. } if id == "2"));
}

/// Test many threads reading and writing one DAG.
#[test]
fn concurrent_mutation_and_queries() {
    let dag = Arc::new(Dag::new());
    let threads = 8;
    let per_thread = 40;

    thread::scope(|s| {
        for t in 0..threads {
            let dag = Arc::clone(&dag);
            s.spawn(move || {
                let mut previous: Option<String> = None;
                for i in 0..per_thread {
                    let id = format!("{t}-{i}");
                    dag.add_vertex_by_id(id.clone(), id.clone()).unwrap();
                    if let Some(prev) = &previous {
                        dag.add_edge(prev, &id).unwrap();
                    }
                    // readers race with the writers of other chains
                    let root = format!("{t}-0");
                    assert_eq!(dag.get_descendants(&root).unwrap().len(), i);
                    assert_eq!(dag.get_ancestors(&id).unwrap().len(), i);
                    previous = Some(id);
                }
            });
        }
    });

    assert_eq!(dag.get_order(), threads * per_thread);
    assert_eq!(dag.get_size(), threads * (per_thread - 1));
    assert_eq!(dag.get_roots().len(), threads);
}

/// Test that concurrent attempts to close a cycle never all succeed.
#[test]
fn concurrent_cycle_attempts() {
    for _ in 0..20 {
        let dag = Dag::new();
        for id in ["a", "b", "c"] {
            dag.add_vertex_by_id(id, id.to_string()).unwrap();
        }

        let accepted = AtomicUsize::new(0);
        thread::scope(|s| {
            for (src, dst) in [("a", "b"), ("b", "c"), ("c", "a")] {
                let dag = &dag;
                let accepted = &accepted;
                s.spawn(move || match dag.add_edge(src, dst) {
                    Ok(()) => {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => assert!(matches!(err, DagError::EdgeLoop { .. })),
                });
            }
        });

        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert_eq!(dag.get_size(), 2);
    }
}

/// Test a JSON round trip through the default snapshot type.
#[test]
fn json_snapshot_round_trip() {
    let dag = Dag::new();
    for id in ["1", "2", "3"] {
        dag.add_vertex_by_id(id, format!("value {id}")).unwrap();
    }
    dag.add_edge("1", "2").unwrap();
    dag.add_edge("1", "3").unwrap();

    let json = serde_json::to_string(&dag.to_storable()).unwrap();
    assert!(json.starts_with(r#"{"vs":[{"i":"1","v":"value 1"}"#));
    assert!(json.ends_with(r#""es":[{"s":"1","d":"2"},{"s":"1","d":"3"}]}"#));

    let storable: StorableDag<String> = serde_json::from_str(&json).unwrap();
    let restored = Dag::from_storable(&storable).unwrap();
    assert_eq!(restored.get_order(), 3);
    assert_eq!(restored.get_size(), 2);
    assert_eq!(*restored.get_vertex("3").unwrap(), "value 3");
    assert_eq!(restored.to_string(), dag.to_string());
}

/// Test a DAG of non-comparable values keyed by a hash function.
#[test]
fn hash_function_keys() {
    struct Job {
        name: String,
        #[allow(dead_code)]
        run: fn() -> u32,
    }

    let options = Options::with_hasher(HashFn(|job: &Job| job.name.clone()));
    let dag = Dag::with_options(options).unwrap();
    let (build, test) = dag
        .connect(
            Job { name: "build".into(), run: || 1 },
            Job { name: "test".into(), run: || 2 },
        )
        .unwrap();

    // a second "build" resolves to the existing vertex
    let (again, deploy) = dag
        .connect(
            Job { name: "build".into(), run: || 3 },
            Job { name: "deploy".into(), run: || 4 },
        )
        .unwrap();
    assert_eq!(again, build);
    assert_eq!(dag.get_order(), 3);
    assert_eq!(dag.get_children(&build).unwrap().len(), 2);
    assert!(dag.is_leaf(&test).unwrap() && dag.is_leaf(&deploy).unwrap());

    let err = dag
        .add_vertex(Job { name: "test".into(), run: || 5 })
        .unwrap_err();
    assert_eq!(err, DagError::VertexDuplicate(test));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

/// Test that a walker can be cancelled from another thread.
#[test]
fn walker_cancelled_from_another_thread() {
    let chain: Vec<(usize, usize)> = (0..99).map(|i| (i, i + 1)).collect();
    let dag = numbered(100, &chain);

    let (walker, signal) = dag.descendants_walker("0").unwrap();
    let mut taken = Vec::new();
    for id in walker {
        taken.push(id);
        if taken.len() == 10 {
            let signal = signal.clone();
            thread::spawn(move || signal.cancel()).join().unwrap();
        }
    }
    assert_eq!(taken.len(), 10);
    assert_eq!(taken[9], "10");
}
