//! A small in-memory operator graph.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use lumen_core::Rect;
use lumen_plane::{EvalError, Evaluator, Node, Plane, Strategy, Value};
use lumen_scan::{
    dispatch_rows, dispatch_scan_processing, KernelError, RowKernel, Runtime, ScanError, Shape,
    Source, Subgroup, SubgroupBuilder,
};

pub type SingleFn = dyn Fn(&Runtime, &Node) -> Result<Value, EvalError> + Send + Sync;
pub type RowFn = dyn Fn(&Node, i32, &mut [f32]) -> Result<(), KernelError> + Send + Sync;
pub type KernelFactory = dyn Fn(&Node) -> Box<dyn RowKernel> + Send + Sync;

enum Implementation {
    Single(Box<SingleFn>),
    Threaded(Box<RowFn>),
    Fused(Box<KernelFactory>),
}

impl Implementation {
    fn strategy(&self) -> Strategy {
        match self {
            Self::Single(_) => Strategy::SingleThreaded,
            Self::Threaded(_) => Strategy::Threaded,
            Self::Fused(_) => Strategy::RowFused,
        }
    }
}

struct Registered {
    imp: Implementation,
    pulls: AtomicUsize,
}

/// An [`Evaluator`] backed by a registry of named operators.
///
/// Each operator carries a [`Strategy`]:
///
/// - single-threaded operators get the node and the runtime and return a
///   value;
/// - threaded operators fill one output row per call, rows split across
///   the worker pool;
/// - row-fused operators provide a [`RowKernel`]. When such a node is
///   pulled, every unmaterialized row-fused plane it depends on (with the
///   same bounds and this graph as evaluator) is folded into one
///   [`Subgroup`] and run through the scanline dispatcher.
///
/// Every pull is counted per operator; see [`pulls`](Self::pulls).
pub struct MockGraph {
    runtime: Runtime,
    ops: IndexMap<String, Registered>,
}

impl MockGraph {
    pub fn builder(runtime: Runtime) -> MockGraphBuilder {
        MockGraphBuilder {
            runtime,
            ops: IndexMap::new(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Strategy of a registered operator.
    pub fn strategy(&self, op: &str) -> Option<Strategy> {
        self.ops.get(op).map(|r| r.imp.strategy())
    }

    /// Registered operator names, in registration order.
    pub fn operators(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }

    /// How many times `op` has been pulled through [`Evaluator::compute`].
    /// Members folded into a fused chain are not counted.
    pub fn pulls(&self, op: &str) -> usize {
        self.ops
            .get(op)
            .map_or(0, |r| r.pulls.load(Ordering::Relaxed))
    }

    /// A lazy plane computed by this graph.
    pub fn plane(self: &Arc<Self>, op: &str, rect: Rect, deps: Vec<Value>, args: Vec<f64>) -> Plane {
        Plane::lazy(op, rect, deps, args, self.evaluator())
    }

    /// This graph as a shared evaluator handle.
    pub fn evaluator(self: &Arc<Self>) -> Arc<dyn Evaluator> {
        Arc::clone(self) as Arc<dyn Evaluator>
    }

    fn lookup(&self, op: &str) -> Result<&Registered, EvalError> {
        self.ops
            .get(op)
            .ok_or_else(|| EvalError::UnknownOperator { op: op.into() })
    }

    /// Whether `plane` can run as a member of a chain producing `rect`.
    fn fusable(&self, plane: &Plane, rect: Rect) -> bool {
        if plane.is_materialized() || plane.rect() != rect {
            return false;
        }
        let Some(node) = plane.node() else {
            return false;
        };
        std::ptr::addr_eq(Arc::as_ptr(node.evaluator()), self as *const Self)
            && self.strategy(node.op()) == Some(Strategy::RowFused)
    }

    /// Add `node` and its fusable dependencies to `builder`, producers
    /// first. Returns the member index of `node`.
    fn add_member(&self, builder: &mut SubgroupBuilder, node: &Node) -> Result<usize, EvalError> {
        let Implementation::Fused(factory) = &self.lookup(node.op())?.imp else {
            return Err(failed(node, "operator is not row-fused"));
        };
        let kernel = factory(node);
        let vertical = kernel.shape() == Shape::ManyToOne;
        let mut sources = Vec::with_capacity(node.deps().len());
        for dep in node.deps() {
            sources.push(match dep {
                Value::Plane(p) if vertical => Source::PlaneRows(p.clone()),
                Value::Plane(p) if self.fusable(p, node.rect()) => match p.node() {
                    Some(producer) => Source::Member(self.add_member(builder, producer)?),
                    None => Source::Plane(p.clone()),
                },
                Value::Plane(p) => Source::Plane(p.clone()),
                Value::Accum(a) => Source::Accum(a.clone()),
                Value::Scalar(s) => Source::Scalar(*s),
                Value::Field(_) => return Err(failed(node, "vector fields cannot be fused")),
            });
        }
        Ok(builder.add_kernel(kernel, sources))
    }

    fn fuse(&self, root: &Node) -> Result<Subgroup, EvalError> {
        let mut builder = Subgroup::builder();
        let index = self.add_member(&mut builder, root)?;
        builder.mark_output(index).map_err(|e| scan_failed(root, e))?;
        builder.build().map_err(|e| scan_failed(root, e))
    }
}

impl Evaluator for MockGraph {
    fn compute(&self, node: &Node) -> Result<Value, EvalError> {
        let registered = self.lookup(node.op())?;
        registered.pulls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            op = node.op(),
            strategy = ?registered.imp.strategy(),
            rect = %node.rect(),
            "pull"
        );
        match &registered.imp {
            Implementation::Single(f) => f(&self.runtime, node),
            Implementation::Threaded(f) => {
                dispatch_rows(&self.runtime, node.op(), node.rect(), |y, row| f(node, y, row))
                    .map(|data| Value::Plane(Plane::from_data(data)))
                    .map_err(|e| scan_failed(node, e))
            }
            Implementation::Fused(_) => {
                let subgroup = self.fuse(node)?;
                let mut outputs = dispatch_scan_processing(&self.runtime, &subgroup, node.rect())
                    .map_err(|e| scan_failed(node, e))?;
                match outputs.pop() {
                    Some(data) => Ok(Value::Plane(Plane::from_data(data))),
                    None => Err(failed(node, "fused chain produced no output")),
                }
            }
        }
    }
}

impl fmt::Debug for MockGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockGraph")
            .field("ops", &self.ops.keys().collect::<Vec<_>>())
            .field("workers", &self.runtime.threads().worker_count())
            .finish()
    }
}

fn failed(node: &Node, reason: impl Into<String>) -> EvalError {
    EvalError::OperatorFailed {
        op: node.op().into(),
        reason: reason.into(),
    }
}

fn scan_failed(node: &Node, e: ScanError) -> EvalError {
    failed(node, e.to_string())
}

/// Registers operators, then freezes them into a shared [`MockGraph`].
pub struct MockGraphBuilder {
    runtime: Runtime,
    ops: IndexMap<String, Registered>,
}

impl MockGraphBuilder {
    fn register(mut self, op: impl Into<String>, imp: Implementation) -> Self {
        self.ops.insert(
            op.into(),
            Registered {
                imp,
                pulls: AtomicUsize::new(0),
            },
        );
        self
    }

    /// Register an operator that runs on the pulling thread.
    pub fn single_threaded(
        self,
        op: impl Into<String>,
        f: impl Fn(&Runtime, &Node) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> Self {
        self.register(op, Implementation::Single(Box::new(f)))
    }

    /// Register a one-pass threaded operator producing a plane row by row.
    pub fn threaded(
        self,
        op: impl Into<String>,
        f: impl Fn(&Node, i32, &mut [f32]) -> Result<(), KernelError> + Send + Sync + 'static,
    ) -> Self {
        self.register(op, Implementation::Threaded(Box::new(f)))
    }

    /// Register a row-fused operator. `factory` builds the kernel for a
    /// node, typically capturing its scalar arguments.
    pub fn row_fused(
        self,
        op: impl Into<String>,
        factory: impl Fn(&Node) -> Box<dyn RowKernel> + Send + Sync + 'static,
    ) -> Self {
        self.register(op, Implementation::Fused(Box::new(factory)))
    }

    pub fn build(self) -> Arc<MockGraph> {
        Arc::new(MockGraph {
            runtime: self.runtime,
            ops: self.ops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::reference_graph;
    use lumen_plane::PlaneError;

    #[test]
    fn unknown_operator_fails_on_first_access() {
        let graph = MockGraph::builder(Runtime::with_workers(0).unwrap()).build();
        let p = graph.plane("nope", Rect::with_size(2, 2).unwrap(), vec![], vec![]);
        assert_eq!(
            p.data().unwrap_err(),
            PlaneError::Eval(EvalError::UnknownOperator { op: "nope".into() })
        );
    }

    #[test]
    fn row_fused_dependencies_are_folded_into_one_pull() {
        let graph = reference_graph(Runtime::with_workers(2).unwrap());
        let rect = Rect::with_size(16, 4).unwrap();
        let src = graph.plane("ramp_x", rect, vec![], vec![1.0]);
        let grad = graph.plane("gradient_x", rect, vec![src.into()], vec![]);
        let scaled = graph.plane("scale", rect, vec![grad.clone().into()], vec![4.0]);
        assert_eq!(scaled.line(2).unwrap()[5], 4.0);
        assert_eq!(graph.pulls("scale"), 1);
        assert_eq!(graph.pulls("gradient_x"), 0);
        assert_eq!(graph.pulls("ramp_x"), 1);
        assert!(!grad.is_materialized());
    }

    #[test]
    fn materialized_or_differently_sized_deps_stay_planes() {
        let graph = reference_graph(Runtime::with_workers(0).unwrap());
        let rect = Rect::with_size(8, 2).unwrap();
        let small = graph.plane("constant", rect, vec![], vec![1.0]);
        let big = graph.plane("constant", Rect::with_size(9, 3).unwrap(), vec![], vec![2.0]);
        let sum = graph.plane("add", rect, vec![small.into(), big.into()], vec![]);
        assert!(sum.line(1).unwrap().iter().all(|&v| v == 3.0));
        assert_eq!(graph.pulls("constant"), 2);
        assert_eq!(graph.pulls("add"), 1);
    }

    #[test]
    fn strategies_are_reported() {
        let graph = reference_graph(Runtime::with_workers(0).unwrap());
        assert_eq!(graph.strategy("constant"), Some(Strategy::SingleThreaded));
        assert_eq!(graph.strategy("ramp_x"), Some(Strategy::Threaded));
        assert_eq!(graph.strategy("gradient_x"), Some(Strategy::RowFused));
        assert_eq!(graph.strategy("missing"), None);
        assert!(graph.operators().any(|op| op == "box3_v"));
    }
}
