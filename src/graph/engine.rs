// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Executing graphs.

use std::{
    any::Any,
    collections::{HashMap, HashSet},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use crossbeam_channel::{bounded, unbounded, Receiver};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, trace, warn};
use petgraph::{
    graph::{DiGraph, NodeIndex},
    Direction,
};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::{Dynamic, GraphError, Node, Plan};
use crate::PROGRESS_BARS;

/// The outputs of a batch, keyed by the id of each requested node.
pub type Outputs = HashMap<usize, Dynamic>;

/// Something that can execute graphs.
pub trait Engine: Send + Sync {
    /// The number of workers currently available.
    fn num_workers(&self) -> usize;

    /// Start executing `graph`. This doesn't block; see [`Submission::wait`].
    fn submit(&self, graph: TaskGraph) -> Submission;
}

/// The plans requested in a batch. Every node reachable from them is executed
/// exactly once.
#[derive(Default)]
pub struct TaskGraph {
    roots: Vec<Arc<Node>>,
}

impl TaskGraph {
    pub fn new() -> TaskGraph {
        TaskGraph::default()
    }

    /// Request the output of `plan`.
    pub fn add_root<T>(&mut self, plan: &Plan<T>) {
        self.roots.push(Arc::clone(&plan.node));
    }

    pub fn num_roots(&self) -> usize {
        self.roots.len()
    }

    /// Every node reachable from the roots as a DAG, with an edge from each
    /// dependency to its dependent. Also returns a map from node ids to DAG
    /// indices and the DAG indices of the roots.
    fn build(&self) -> (DiGraph<Arc<Node>, ()>, HashMap<usize, NodeIndex>, Vec<NodeIndex>) {
        let mut dag = DiGraph::new();
        let mut index_of = HashMap::new();
        let mut stack = self.roots.clone();
        while let Some(node) = stack.pop() {
            if index_of.contains_key(&node.id) {
                continue;
            }
            stack.extend(node.dependencies.iter().cloned());
            let id = node.id;
            let index = dag.add_node(node);
            index_of.insert(id, index);
        }

        // One edge per dependency, so a node that depends on the same plan
        // twice has two edges.
        for index in dag.node_indices().collect::<Vec<_>>() {
            let node = Arc::clone(&dag[index]);
            for dep in &node.dependencies {
                dag.add_edge(index_of[&dep.id], index, ());
            }
        }
        debug_assert!(!petgraph::algo::is_cyclic_directed(&dag));

        let roots = self.roots.iter().map(|root| index_of[&root.id]).collect();
        (dag, index_of, roots)
    }
}

/// A batch that has been handed to an [`Engine`].
pub struct Submission {
    receiver: Receiver<Result<Outputs, GraphError>>,
}

impl Submission {
    pub fn new(receiver: Receiver<Result<Outputs, GraphError>>) -> Submission {
        Submission { receiver }
    }

    /// Block until the batch completes.
    pub fn wait(self) -> Result<Outputs, GraphError> {
        self.receiver.recv().map_err(|_| GraphError::Disconnected)?
    }
}

/// An engine running tasks on its own thread pool.
pub struct LocalEngine {
    pool: Arc<ThreadPool>,
}

impl LocalEngine {
    pub fn new(num_workers: usize) -> Result<LocalEngine, GraphError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("imaging-worker-{i}"))
            .build()?;
        Ok(LocalEngine {
            pool: Arc::new(pool),
        })
    }
}

impl Engine for LocalEngine {
    fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn submit(&self, graph: TaskGraph) -> Submission {
        let (sender, receiver) = bounded(1);
        let pool = Arc::clone(&self.pool);
        // The scheduler runs on its own thread so that it never occupies a
        // worker while it waits for tasks.
        std::thread::spawn(move || {
            let result = run_graph(&graph, &pool);
            // Nobody may be waiting.
            let _ = sender.send(result);
        });
        Submission::new(receiver)
    }
}

/// Convenience function to make a progress bar while executing a graph.
fn make_graph_progress_bar(num_tasks: usize) -> ProgressBar {
    ProgressBar::with_draw_target(
        Some(num_tasks as _),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg}: [{wide_bar:.blue}] {pos:3}/{len:3} ({elapsed_precise}<{eta_precise})")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message("Running tasks")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Execute a graph on `pool`. Tasks are spawned as soon as their dependencies
/// are met. Outputs are dropped once every dependent has started. After the
/// first failure, no new tasks are started, but tasks already running are
/// waited on.
fn run_graph(graph: &TaskGraph, pool: &ThreadPool) -> Result<Outputs, GraphError> {
    let (dag, index_of, roots) = graph.build();
    let num_tasks = dag.node_count();
    debug!("Running a graph of {num_tasks} tasks for {} requested plans", roots.len());

    // A map from a dependency to the nodes that depend on it.
    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in dag.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }
    let mut dependency_counts: Vec<usize> = dag
        .node_indices()
        .map(|i| dag.neighbors_directed(i, Direction::Incoming).count())
        .collect();
    // The number of consumers of each output that are yet to start. The caller
    // consumes the roots.
    let root_set: HashSet<NodeIndex> = roots.iter().copied().collect();
    let mut consumers: Vec<usize> = dag
        .node_indices()
        .map(|i| {
            dag.neighbors_directed(i, Direction::Outgoing).count() + usize::from(root_set.contains(&i))
        })
        .collect();

    let mut cache: HashMap<NodeIndex, Dynamic> = HashMap::new();
    let mut ready: Vec<NodeIndex> = dag
        .node_indices()
        .filter(|i| dependency_counts[i.index()] == 0)
        .collect();
    let mut first_error = None;
    let progress_bar = make_graph_progress_bar(num_tasks);
    let (result_sender, result_receiver) = unbounded::<(NodeIndex, Result<Dynamic, GraphError>)>();

    pool.in_place_scope(|s| {
        let mut in_flight = 0;
        loop {
            if first_error.is_none() {
                for index in ready.drain(..) {
                    let node = Arc::clone(&dag[index]);
                    let inputs: Vec<Dynamic> = node
                        .dependencies
                        .iter()
                        .map(|dep| Arc::clone(&cache[&index_of[&dep.id]]))
                        .collect();
                    for dep in &node.dependencies {
                        let dep_index = index_of[&dep.id];
                        consumers[dep_index.index()] -= 1;
                        if consumers[dep_index.index()] == 0 {
                            cache.remove(&dep_index);
                        }
                    }

                    let sender = result_sender.clone();
                    in_flight += 1;
                    s.spawn(move |_| {
                        trace!("Running '{}'", node.name);
                        let result = match catch_unwind(AssertUnwindSafe(|| (node.func)(&inputs))) {
                            Ok(Ok(output)) => Ok(output),
                            Ok(Err(source)) => Err(GraphError::Task {
                                name: node.name.clone(),
                                source,
                            }),
                            Err(payload) => Err(GraphError::Panicked {
                                name: node.name.clone(),
                                message: panic_message(payload.as_ref()),
                            }),
                        };
                        drop(inputs);
                        // The scheduler outlives every task it spawns.
                        let _ = sender.send((index, result));
                    });
                }
            }
            if in_flight == 0 {
                break;
            }

            let (index, result) = match result_receiver.recv() {
                Ok(message) => message,
                Err(_) => break,
            };
            in_flight -= 1;
            progress_bar.inc(1);
            match result {
                Ok(output) if first_error.is_none() => {
                    cache.insert(index, output);
                    for &dependent in dependents.get(&index).into_iter().flatten() {
                        dependency_counts[dependent.index()] -= 1;
                        if dependency_counts[dependent.index()] == 0 {
                            ready.push(dependent);
                        }
                    }
                }
                Ok(_) => (),
                Err(e) => {
                    if first_error.is_none() {
                        warn!("{e}; waiting for running tasks before stopping");
                        first_error = Some(e);
                    } else {
                        debug!("Another task failed after the first failure: {e}");
                    }
                }
            }
        }
    });

    if let Some(e) = first_error {
        progress_bar.abandon_with_message("Failed");
        return Err(e);
    }
    progress_bar.finish();

    let mut outputs = Outputs::with_capacity(roots.len());
    for root in roots {
        match cache.get(&root) {
            Some(output) => {
                outputs.insert(dag[root].id, Arc::clone(output));
            }
            None => return Err(GraphError::Disconnected),
        }
    }
    Ok(outputs)
}
