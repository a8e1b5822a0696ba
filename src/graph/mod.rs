// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Deferred computation graphs.

A [`Plan<T>`] is a typed handle to a task that will produce a `T` once it's
executed. Building plans does no computation; plans are wired together by
naming them as the dependencies of new tasks, and a list of plans is computed by
handing it to an [`Engine`] with [`compute_list`].

Under the hood, the graph is type-erased; every output is stored as an
`Arc<dyn Any + Send + Sync>`. `Plan<T>` holds `T` only in `PhantomData`, so the
compiler enforces that a task receives exactly the types its dependencies
produce. Tasks only ever receive shared references to their inputs, so the same
plan can feed any number of tasks.
 */

mod engine;
mod error;
#[cfg(test)]
mod tests;

pub use engine::{Engine, LocalEngine, Outputs, Submission, TaskGraph};
pub use error::GraphError;

use std::{
    any::Any,
    marker::PhantomData,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use log::debug;

use crate::error::ImagingError;

/// A type-erased task output.
pub type Dynamic = Arc<dyn Any + Send + Sync>;

type TaskFn = dyn Fn(&[Dynamic]) -> Result<Dynamic, ImagingError> + Send + Sync;

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(0);

/// A task in a graph.
pub struct Node {
    /// Unique to every node ever made; used to find nodes shared between
    /// plans.
    pub(crate) id: usize,
    pub(crate) name: String,
    pub(crate) dependencies: Vec<Arc<Node>>,
    pub(crate) func: Box<TaskFn>,
}

/// A type-safe reference to a task that will produce a `T`.
pub struct Plan<T> {
    pub(crate) node: Arc<Node>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for Plan<T> {
    fn clone(&self) -> Self {
        Plan {
            node: Arc::clone(&self.node),
            _phantom: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Plan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("name", &self.node.name)
            .field("id", &self.node.id)
            .finish()
    }
}

impl<T: Send + Sync + 'static> Plan<T> {
    fn from_fn(name: String, dependencies: Vec<Arc<Node>>, func: Box<TaskFn>) -> Plan<T> {
        Plan {
            node: Arc::new(Node {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
                name,
                dependencies,
                func,
            }),
            _phantom: PhantomData,
        }
    }

    /// A plan whose output is already known.
    pub fn value(name: impl Into<String>, value: T) -> Plan<T> {
        let value: Dynamic = Arc::new(value);
        Plan::from_fn(
            name.into(),
            vec![],
            Box::new(move |_: &[Dynamic]| Ok(Arc::clone(&value))),
        )
    }

    /// A plan that runs `f` on the outputs of `dependencies`.
    pub fn task<D, F>(name: impl Into<String>, dependencies: D, f: F) -> Plan<T>
    where
        D: Dependencies + Send + Sync + 'static,
        F: for<'a> Fn(D::Output<'a>) -> Result<T, ImagingError> + Send + Sync + 'static,
    {
        let mut nodes = Vec::with_capacity(dependencies.num_nodes());
        dependencies.nodes(&mut nodes);
        Plan::from_fn(
            name.into(),
            nodes,
            Box::new(move |outputs: &[Dynamic]| {
                let inputs = dependencies.resolve(outputs);
                f(inputs).map(|output| Arc::new(output) as Dynamic)
            }),
        )
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// A plan of this plan's output transformed by `f`.
    pub fn map<U, F>(&self, name: impl Into<String>, f: F) -> Plan<U>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> Result<U, ImagingError> + Send + Sync + 'static,
    {
        Plan::task(name, self.clone(), move |t: &T| f(t))
    }
}

impl<T: Clone + Send + Sync + 'static> Plan<Vec<T>> {
    /// Combine plans into one plan of all of their outputs.
    pub fn collect(name: impl Into<String>, plans: Vec<Plan<T>>) -> Plan<Vec<T>> {
        Plan::task(name, plans, |outputs: Vec<&T>| {
            Ok(outputs.into_iter().cloned().collect())
        })
    }

    /// Split this plan into `n` plans, one per element. `n` is fixed now; if
    /// the output doesn't have exactly `n` elements when it's computed, the
    /// split tasks fail.
    pub fn split(&self, n: usize) -> Vec<Plan<T>> {
        let parent = self.name().to_string();
        (0..n)
            .map(|i| {
                let parent = parent.clone();
                Plan::task(format!("{parent}[{i}]"), self.clone(), move |v: &Vec<T>| {
                    if v.len() != n {
                        return Err(ImagingError::FanOut {
                            name: parent.clone(),
                            expected: n,
                            got: v.len(),
                        });
                    }
                    Ok(v[i].clone())
                })
            })
            .collect()
    }
}

/// A collection of [`Plan`]s that a task can depend on.
///
/// Implemented for a single plan, vectors and tuples of dependencies, and `()`.
pub trait Dependencies {
    /// The inputs of a task when all dependencies are resolved. For a
    /// `Plan<T>` this is `&'a T`, for a vector it's a vector and for a tuple
    /// it's a tuple.
    type Output<'a>;

    /// The number of nodes behind these dependencies.
    fn num_nodes(&self) -> usize;

    /// Append the nodes behind these dependencies to `nodes`, in order.
    fn nodes(&self, nodes: &mut Vec<Arc<Node>>);

    /// Resolve the type-erased outputs of the nodes (in the order given by
    /// `nodes`) into concrete types.
    ///
    /// # Panics
    ///
    /// This method panics if an output can't be downcast to its expected type.
    /// `Plan<T>` makes this impossible.
    fn resolve<'a>(&self, outputs: &'a [Dynamic]) -> Self::Output<'a>;
}

impl Dependencies for () {
    type Output<'a> = ();

    fn num_nodes(&self) -> usize {
        0
    }

    fn nodes(&self, _: &mut Vec<Arc<Node>>) {}

    fn resolve<'a>(&self, _: &'a [Dynamic]) -> Self::Output<'a> {}
}

impl<T: Send + Sync + 'static> Dependencies for Plan<T> {
    type Output<'a> = &'a T;

    fn num_nodes(&self) -> usize {
        1
    }

    fn nodes(&self, nodes: &mut Vec<Arc<Node>>) {
        nodes.push(Arc::clone(&self.node));
    }

    fn resolve<'a>(&self, outputs: &'a [Dynamic]) -> Self::Output<'a> {
        outputs[0]
            .downcast_ref::<T>()
            .expect("Type mismatch in dependency resolution")
    }
}

impl<D: Dependencies> Dependencies for Vec<D> {
    type Output<'a> = Vec<D::Output<'a>>;

    fn num_nodes(&self) -> usize {
        self.iter().map(|d| d.num_nodes()).sum()
    }

    fn nodes(&self, nodes: &mut Vec<Arc<Node>>) {
        self.iter().for_each(|d| d.nodes(nodes));
    }

    fn resolve<'a>(&self, mut outputs: &'a [Dynamic]) -> Self::Output<'a> {
        let mut result = Vec::with_capacity(self.len());
        for d in self {
            let (these, rest) = outputs.split_at(d.num_nodes());
            result.push(d.resolve(these));
            outputs = rest;
        }
        result
    }
}

macro_rules! impl_deps {
    ($($D:ident),*) => {
        #[allow(non_snake_case, unused_assignments)]
        impl<$($D: Dependencies),*> Dependencies for ($($D,)*) {
            type Output<'a> = ($($D::Output<'a>,)*);

            fn num_nodes(&self) -> usize {
                let ($($D,)*) = self;
                0 $(+ $D.num_nodes())*
            }

            fn nodes(&self, nodes: &mut Vec<Arc<Node>>) {
                let ($($D,)*) = self;
                $($D.nodes(nodes);)*
            }

            fn resolve<'a>(&self, mut outputs: &'a [Dynamic]) -> Self::Output<'a> {
                let ($($D,)*) = self;
                ($({
                    let (these, rest) = outputs.split_at($D.num_nodes());
                    outputs = rest;
                    $D.resolve(these)
                },)*)
            }
        }
    };
}

impl_deps!(A);
impl_deps!(A, B);
impl_deps!(A, B, C);
impl_deps!(A, B, C, D);
impl_deps!(A, B, C, D, E);

/// Compute `plans` on `engine`, returning their outputs in order.
///
/// The number of workers of the engine is checked before and after the batch;
/// if any were lost, the batch fails with [`GraphError::LostWorkers`].
pub fn compute_list<T, E>(engine: &E, plans: &[Plan<T>]) -> Result<Vec<T>, GraphError>
where
    T: Clone + Send + Sync + 'static,
    E: Engine + ?Sized,
{
    let before = engine.num_workers();
    let mut graph = TaskGraph::new();
    plans.iter().for_each(|plan| graph.add_root(plan));
    debug!("Computing {} plans with {before} workers", plans.len());
    let mut outputs = engine.submit(graph).wait()?;
    let after = engine.num_workers();
    if after < before {
        return Err(GraphError::LostWorkers { before, after });
    }

    plans
        .iter()
        .enumerate()
        .map(|(i, plan)| {
            let id = plan.node.id;
            // The same plan may be requested more than once; only move its
            // output out on its last use.
            let last_use = plans[i + 1..].iter().all(|p| p.node.id != id);
            let output = if last_use {
                outputs.remove(&id)
            } else {
                outputs.get(&id).cloned()
            }
            .ok_or(GraphError::Disconnected)?;
            let output = Arc::downcast::<T>(output).map_err(|_| GraphError::Downcast {
                name: plan.name().to_string(),
            })?;
            Ok(Arc::try_unwrap(output).unwrap_or_else(|output| (*output).clone()))
        })
        .collect()
}

/// Compute a single plan on `engine`.
pub fn compute<T, E>(engine: &E, plan: &Plan<T>) -> Result<T, GraphError>
where
    T: Clone + Send + Sync + 'static,
    E: Engine + ?Sized,
{
    let mut outputs = compute_list(engine, std::slice::from_ref(plan))?;
    Ok(outputs.remove(0))
}
