// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::*;
use crate::vis::VisError;

fn engine() -> LocalEngine {
    LocalEngine::new(2).unwrap()
}

#[test]
fn test_values_and_tasks() {
    let a = Plan::value("a", 2_i32);
    let b = Plan::value("b", 3_i32);
    let sum = Plan::task("sum", (a.clone(), b), |(a, b): (&i32, &i32)| Ok(a + b));
    let doubled = sum.map("doubled", |s| Ok(s * 2));
    let nothing = Plan::task("nothing", (), |()| Ok(7_u8));

    let engine = engine();
    assert_eq!(compute(&engine, &a).unwrap(), 2);
    assert_eq!(compute(&engine, &sum).unwrap(), 5);
    assert_eq!(compute(&engine, &doubled).unwrap(), 10);
    assert_eq!(compute(&engine, &nothing).unwrap(), 7);
}

#[test]
fn test_plans_are_lazy() {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let plan = Plan::task("count", (), move |()| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert_eq!(count.load(Ordering::SeqCst), 0);

    compute(&engine(), &plan).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shared_node_executed_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let top = Plan::task("top", (), move |()| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(10_u64)
    });
    let left = top.map("left", |t| Ok(t + 1));
    let right = top.map("right", |t| Ok(t + 2));
    let bottom = Plan::task("bottom", (left.clone(), right), |(l, r): (&u64, &u64)| {
        Ok(l * r)
    });

    let results = compute_list(&engine(), &[bottom, left]).unwrap();
    assert_eq!(results, vec![11 * 12, 11]);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_vec_and_nested_dependencies() {
    let plans = (0..5).map(|i| Plan::value(format!("v{i}"), i)).collect::<Vec<_>>();
    let scale = Plan::value("scale", 10);
    let sums = vec![plans[..2].to_vec(), plans[2..].to_vec()];
    let total = Plan::task(
        "total",
        (sums, scale),
        |(sums, scale): (Vec<Vec<&i32>>, &i32)| {
            assert_eq!(sums.len(), 2);
            assert_eq!(sums[0].len(), 2);
            assert_eq!(sums[1].len(), 3);
            Ok(sums.into_iter().flatten().sum::<i32>() * scale)
        },
    );
    assert_eq!(compute(&engine(), &total).unwrap(), 100);
}

#[test]
fn test_same_dependency_twice() {
    let a = Plan::value("a", 4);
    let squared = Plan::task("squared", (a.clone(), a), |(x, y): (&i32, &i32)| Ok(x * y));
    assert_eq!(compute(&engine(), &squared).unwrap(), 16);
}

#[test]
fn test_collect_and_split() {
    let plans = (0..4).map(|i| Plan::value(format!("v{i}"), i * i)).collect();
    let all = Plan::collect("all", plans);
    let parts = all.split(4);
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[2].name(), "all[2]");

    let results = compute_list(&engine(), &parts).unwrap();
    assert_eq!(results, vec![0, 1, 4, 9]);
}

#[test]
fn test_split_arity_mismatch() {
    let all = Plan::value("all", vec![1, 2, 3]);
    let parts = all.split(2);
    let result = compute_list(&engine(), &parts);
    match result {
        Err(GraphError::Task {
            name,
            source: ImagingError::FanOut {
                name: parent,
                expected,
                got,
            },
        }) => {
            assert!(name.starts_with("all["));
            assert_eq!(parent, "all");
            assert_eq!(expected, 2);
            assert_eq!(got, 3);
        }
        _ => panic!("Expected a fan-out error"),
    }
}

#[test]
fn test_same_plan_requested_twice() {
    let a = Plan::value("a", String::from("hello"));
    let results = compute_list(&engine(), &[a.clone(), a]).unwrap();
    assert_eq!(results, vec!["hello", "hello"]);
}

#[test]
fn test_empty_list() {
    let results = compute_list::<i32, _>(&engine(), &[]).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_task_error_stops_downstream() {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let bad: Plan<i32> = Plan::task("bad", (), |()| Err(VisError::NothingToGather.into()));
    let downstream = bad.map("downstream", move |x| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(x + 1)
    });

    let result = compute(&engine(), &downstream);
    match result {
        Err(GraphError::Task {
            name,
            source: ImagingError::Vis(VisError::NothingToGather),
        }) => assert_eq!(name, "bad"),
        _ => panic!("Expected a task error"),
    }
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_panicking_task() {
    let bad: Plan<i32> = Plan::task("bad", (), |()| panic!("oh no"));
    let result = compute(&engine(), &bad);
    match result {
        Err(GraphError::Panicked { name, message }) => {
            assert_eq!(name, "bad");
            assert_eq!(message, "oh no");
        }
        _ => panic!("Expected a panic to be reported"),
    }

    // The engine is still usable.
    let engine = engine();
    let _ = compute(&engine, &Plan::<i32>::task("bad", (), |()| panic!("{}", 1)));
    assert_eq!(compute(&engine, &Plan::value("fine", 1)).unwrap(), 1);
}

/// An engine that loses a worker every time something is submitted.
struct ShrinkingEngine {
    inner: LocalEngine,
    workers: AtomicUsize,
}

impl Engine for ShrinkingEngine {
    fn num_workers(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }

    fn submit(&self, graph: TaskGraph) -> Submission {
        let submission = self.inner.submit(graph);
        self.workers.fetch_sub(1, Ordering::SeqCst);
        submission
    }
}

#[test]
fn test_lost_workers() {
    let engine = ShrinkingEngine {
        inner: engine(),
        workers: AtomicUsize::new(2),
    };
    let result = compute(&engine, &Plan::value("a", 1));
    assert!(matches!(
        result,
        Err(GraphError::LostWorkers {
            before: 2,
            after: 1
        })
    ));
}

#[test]
fn test_dyn_engine() {
    let engine: Box<dyn Engine> = Box::new(engine());
    assert_eq!(engine.num_workers(), 2);
    assert_eq!(compute(engine.as_ref(), &Plan::value("a", 1.5)).unwrap(), 1.5);
}

#[test]
fn test_wide_graph() {
    let leaves = (0..200)
        .map(|i| Plan::task(format!("leaf{i}"), (), move |()| Ok(i as u64)))
        .collect::<Vec<_>>();
    let sum = Plan::task("sum", leaves, |v: Vec<&u64>| Ok(v.into_iter().sum::<u64>()));
    assert_eq!(compute(&engine(), &sum).unwrap(), 199 * 200 / 2);
}
