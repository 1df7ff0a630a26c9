//! Minimal dependency graph executed on a Rayon pool
//!
//! Nodes are one-shot closures; edges order them.  A node becomes ready once
//! every predecessor has finished, and is then spawned onto the pool by
//! whichever thread finished the last predecessor.  Only nodes reachable from
//! a pushed root ever run.
use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use crate::config::ThreadPool;

/// Handle to a node in a [`TaskGraph`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodeId(usize);

type Work<'a> = Box<dyn FnOnce() + Send + 'a>;

struct Node<'a> {
    work: Work<'a>,
    succ: Vec<NodeId>,
    preds: usize,
}

/// A graph of one-shot tasks
#[derive(Default)]
pub struct TaskGraph<'a> {
    nodes: Vec<Node<'a>>,
    roots: Vec<NodeId>,
}

/// Graph state shared between worker threads during execution
struct Shared<'a> {
    work: Vec<Mutex<Option<Work<'a>>>>,
    succ: Vec<Vec<NodeId>>,
    pending: Vec<AtomicUsize>,
}

impl<'a> TaskGraph<'a> {
    /// Builds an empty graph
    pub fn new() -> Self {
        Self {
            nodes: vec![],
            roots: vec![],
        }
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Checks whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node
    pub fn add_node<F: FnOnce() + Send + 'a>(&mut self, f: F) -> NodeId {
        self.nodes.push(Node {
            work: Box::new(f),
            succ: vec![],
            preds: 0,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Orders `to` after `from`
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.0].succ.push(to);
        self.nodes[to.0].preds += 1;
    }

    /// Marks a node with no predecessors as a starting point
    pub fn push_work(&mut self, root: NodeId) {
        assert_eq!(self.nodes[root.0].preds, 0, "root has predecessors");
        self.roots.push(root);
    }

    /// Runs the graph to completion, blocking the calling thread
    ///
    /// If `threads` is `None`, nodes run on the calling thread in dependency
    /// order.
    pub fn work_and_wait(self, threads: Option<&ThreadPool>) {
        let TaskGraph { nodes, roots } = self;
        let mut work = Vec::with_capacity(nodes.len());
        let mut succ = Vec::with_capacity(nodes.len());
        let mut pending = Vec::with_capacity(nodes.len());
        for n in nodes {
            work.push(Mutex::new(Some(n.work)));
            succ.push(n.succ);
            pending.push(AtomicUsize::new(n.preds));
        }
        let shared = Shared {
            work,
            succ,
            pending,
        };

        match threads {
            None => {
                let mut queue = roots;
                while let Some(n) = queue.pop() {
                    queue.extend(shared.run(n));
                }
            }
            Some(pool) => pool.run(|| {
                rayon::scope(|s| {
                    for &r in &roots {
                        spawn(s, &shared, r);
                    }
                })
            }),
        }
        debug_assert!(
            shared.work.iter().all(|w| match w.lock() {
                Ok(w) => w.is_none(),
                Err(..) => true,
            }),
            "task graph has unreachable nodes"
        );
    }
}

impl Shared<'_> {
    /// Runs a node, returning successors that became ready
    fn run(&self, n: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let work = match self.work[n.0].lock() {
            Ok(mut w) => w.take(),
            Err(e) => e.into_inner().take(),
        };
        if let Some(f) = work {
            f();
        }
        self.succ[n.0].iter().cloned().filter(|s| {
            self.pending[s.0].fetch_sub(1, Ordering::AcqRel) == 1
        })
    }
}

fn spawn<'s>(s: &rayon::Scope<'s>, shared: &'s Shared<'_>, n: NodeId) {
    s.spawn(move |s| {
        for next in shared.run(n) {
            spawn(s, shared, next);
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn runs_in_order() {
        for pool in [None, Some(&ThreadPool::Global)] {
            let log = Mutex::new(vec![]);
            let mut g = TaskGraph::new();
            let root = g.add_node(|| log.lock().unwrap().push(0));
            let mid: Vec<_> = (1..=4)
                .map(|i| {
                    let log = &log;
                    g.add_node(move || log.lock().unwrap().push(i))
                })
                .collect();
            let join = g.add_node(|| log.lock().unwrap().push(5));
            for &m in &mid {
                g.add_edge(root, m);
                g.add_edge(m, join);
            }
            g.push_work(root);
            g.work_and_wait(pool);

            let log = log.into_inner().unwrap();
            assert_eq!(log.len(), 6);
            assert_eq!(log[0], 0);
            assert_eq!(log[5], 5);
            let mut mid = log[1..5].to_vec();
            mid.sort();
            assert_eq!(mid, [1, 2, 3, 4]);
        }
    }

    #[test]
    fn fan_in_waits_for_all() {
        let pool = ThreadPool::with_threads(4).unwrap();
        let count = AtomicUsize::new(0);
        let ok = AtomicBool::new(false);
        let mut g = TaskGraph::new();
        let root = g.add_node(|| ());
        let join = g.add_node(|| {
            ok.store(count.load(Ordering::Acquire) == 64, Ordering::Release)
        });
        for _ in 0..64 {
            let n = g.add_node(|| {
                count.fetch_add(1, Ordering::AcqRel);
            });
            g.add_edge(root, n);
            g.add_edge(n, join);
        }
        g.push_work(root);
        g.work_and_wait(Some(&pool));
        assert!(ok.load(Ordering::Acquire));
    }

    #[test]
    #[should_panic]
    fn root_with_predecessor() {
        let mut g = TaskGraph::new();
        let a = g.add_node(|| ());
        let b = g.add_node(|| ());
        g.add_edge(a, b);
        g.push_work(b);
    }
}
