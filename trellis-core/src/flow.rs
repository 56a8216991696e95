//! Descendants Flow
//!
//! Runs a callback once for every vertex reachable from a root, each only
//! after all of its parents inside that sub-graph have produced a result.
//!
//! # How It Works
//!
//! 1. **Plan.** Under the structural read lock, the sub-graph below the root
//!    is copied into dense indices: ids, in-subgraph parents and children,
//!    and a join counter per vertex holding its number of parents. The lock
//!    is released before any callback runs, so callbacks are free to query
//!    or mutate the DAG. Later changes do not affect a running flow.
//!
//! 2. **Execute.** Inside a rayon scope the root is spawned first. A finished
//!    vertex publishes its result into a write-once slot, then decrements
//!    the counter of each child. The decrement that reaches zero spawns the
//!    child, so every child starts exactly once, after all parents.
//!
//! 3. **Fail.** The first callback error is recorded and raises an abort
//!    flag. Callbacks already running finish and keep their results; vertices
//!    that have not started yet never start.
//!
//! Each vertex moves through `pending -> ready -> running -> done | failed`.
//! Counter decrements use acquire/release ordering, so a child always sees
//! the published results of its parents.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::dag::Dag;
use crate::error::FlowError;
use crate::options::VertexHasher;

/// A parent's id and its result, as handed to a flow callback.
#[derive(Debug)]
pub struct ParentResult<'a, R> {
    pub id: &'a str,
    pub result: &'a R,
}

impl<R> Clone for ParentResult<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for ParentResult<'_, R> {}

const PENDING: u8 = 0;
const READY: u8 = 1;
const RUNNING: u8 = 2;
const DONE: u8 = 3;
const FAILED: u8 = 4;

type Indices = SmallVec<[usize; 4]>;

/// Dense copy of the sub-graph below a root. Index 0 is the root.
struct Plan {
    ids: Vec<String>,
    parents: Vec<Indices>,
    children: Vec<Indices>,
}

struct Run<'a, V, H, R, E, F>
where
    H: VertexHasher<V>,
{
    dag: &'a Dag<V, H>,
    plan: &'a Plan,
    callback: &'a F,
    initial: Option<&'a R>,
    results: Vec<OnceLock<R>>,
    waiting: Vec<AtomicUsize>,
    states: Vec<AtomicU8>,
    aborted: AtomicBool,
    failure: Mutex<Option<(String, E)>>,
}

impl<'a, V, H, R, E, F> Run<'a, V, H, R, E, F>
where
    V: Send + Sync,
    H: VertexHasher<V>,
    R: Send + Sync,
    E: Send,
    F: Fn(&Dag<V, H>, &str, &[ParentResult<'_, R>]) -> Result<R, E> + Sync,
{
    fn new(dag: &'a Dag<V, H>, plan: &'a Plan, callback: &'a F, initial: Option<&'a R>) -> Self {
        let len = plan.ids.len();
        let states = (0..len)
            .map(|i| AtomicU8::new(if i == 0 { READY } else { PENDING }))
            .collect();
        Self {
            dag,
            plan,
            callback,
            initial,
            results: (0..len).map(|_| OnceLock::new()).collect(),
            waiting: plan.parents.iter().map(|p| AtomicUsize::new(p.len())).collect(),
            states,
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    fn run<'s>(&'s self, scope: &rayon::Scope<'s>, index: usize) {
        if self.aborted.load(Ordering::Acquire) {
            return;
        }
        if self.states[index]
            .compare_exchange(READY, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let id = self.plan.ids[index].as_str();
        let inputs: SmallVec<[ParentResult<'_, R>; 4]> = if index == 0 {
            self.initial
                .map(|result| ParentResult { id, result })
                .into_iter()
                .collect()
        } else {
            self.plan.parents[index]
                .iter()
                .filter_map(|&p| {
                    self.results[p].get().map(|result| ParentResult {
                        id: self.plan.ids[p].as_str(),
                        result,
                    })
                })
                .collect()
        };

        trace!(id, parents = inputs.len(), "running flow callback");
        match (self.callback)(self.dag, id, inputs.as_slice()) {
            Ok(result) => {
                let published = self.results[index].set(result).is_ok();
                debug_assert!(published, "flow result for '{id}' published twice");
                self.states[index].store(DONE, Ordering::Release);
                for &child in &self.plan.children[index] {
                    if self.waiting[child].fetch_sub(1, Ordering::AcqRel) == 1 {
                        self.states[child].store(READY, Ordering::Release);
                        scope.spawn(move |s| self.run(s, child));
                    }
                }
            }
            Err(error) => {
                self.states[index].store(FAILED, Ordering::Release);
                self.aborted.store(true, Ordering::Release);
                let mut failure = self.failure.lock();
                if failure.is_none() {
                    *failure = Some((id.to_owned(), error));
                }
            }
        }
    }
}

impl<V, H> Dag<V, H>
where
    V: Send + Sync,
    H: VertexHasher<V>,
{
    fn flow_plan(&self, root: &str) -> crate::error::Result<Plan> {
        let store = self.read();
        store.check_id(root)?;

        let mut index: HashMap<&str, usize> = HashMap::from([(root, 0)]);
        let mut ids = vec![root.to_owned()];
        let mut queue = VecDeque::from([root.to_owned()]);
        while let Some(id) = queue.pop_front() {
            for child in store.children(&id) {
                if !index.contains_key(child.as_str()) {
                    index.insert(child.as_str(), ids.len());
                    ids.push(child.clone());
                    queue.push_back(child.clone());
                }
            }
        }

        let parents = ids
            .iter()
            .map(|id| {
                store
                    .parents(id)
                    .filter_map(|p| index.get(p.as_str()).copied())
                    .collect()
            })
            .collect();
        let children = ids
            .iter()
            .map(|id| {
                store
                    .children(id)
                    .filter_map(|c| index.get(c.as_str()).copied())
                    .collect()
            })
            .collect();

        Ok(Plan {
            ids,
            parents,
            children,
        })
    }

    /// Run `callback` over `root` and all of its descendants in topological
    /// order, in parallel where the graph allows it.
    ///
    /// The root receives `initial` as a single parent result under its own id,
    /// or no parent results at all. Every other vertex receives the results
    /// of its parents within the sub-graph.
    ///
    /// Returns the result of every vertex by id.
    ///
    /// # Errors
    /// `FlowError::Dag` for an empty or unknown root. `FlowError::Callback`
    /// with the first callback error and the results completed before it.
    pub fn descendants_flow<R, E, F>(
        &self,
        root: &str,
        initial: Option<&R>,
        callback: F,
    ) -> Result<HashMap<String, R>, FlowError<R, E>>
    where
        R: Send + Sync,
        E: Send,
        F: Fn(&Dag<V, H>, &str, &[ParentResult<'_, R>]) -> Result<R, E> + Sync,
    {
        let plan = self.flow_plan(root)?;
        debug!(root, vertices = plan.ids.len(), "starting descendants flow");

        let run = Run::new(self, &plan, &callback, initial);
        match self.flow_pool() {
            Some(pool) => pool.install(|| rayon::scope(|s| run.run(s, 0))),
            None => rayon::scope(|s| run.run(s, 0)),
        }

        let Run {
            results, failure, ..
        } = run;
        let results: HashMap<String, R> = results
            .into_iter()
            .zip(&plan.ids)
            .filter_map(|(slot, id)| slot.into_inner().map(|r| (id.clone(), r)))
            .collect();

        match failure.into_inner() {
            None => Ok(results),
            Some((id, error)) => {
                warn!(root, failed = %id, completed = results.len(), "descendants flow aborted");
                Err(FlowError::Callback {
                    id,
                    error,
                    partial: results,
                })
            }
        }
    }
}
