//! The interface to the external operator graph.
//!
//! Lazy entities record a [`Node`] (operator name, dependency values,
//! scalar arguments, declared bounds and the [`Evaluator`] that can
//! compute it). Nothing runs until an accessor needs data, at which point
//! the entity calls [`Node::compute`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lumen_core::Rect;

use crate::error::EvalError;
use crate::field::VectorField;
use crate::lazy::{AccumBuffer, Plane};

/// How an operator's implementation is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Runs on the calling thread.
    SingleThreaded,
    /// One pass over the output, split by rows across the thread pool.
    Threaded,
    /// Fused with neighbouring row-wise operators and run through the
    /// scanline dispatcher.
    RowFused,
}

/// Computes graph nodes on demand.
pub trait Evaluator: Send + Sync {
    /// Produce the value of `node`. Returned data must match
    /// `node.rect()`.
    fn compute(&self, node: &Node) -> Result<Value, EvalError>;
}

/// A value flowing along a graph edge.
#[derive(Clone, Debug)]
pub enum Value {
    /// Single-precision 2-D data.
    Plane(Plane),
    /// Double-precision 2-D data.
    Accum(AccumBuffer),
    /// A pair of planes.
    Field(VectorField),
    /// A single number.
    Scalar(f64),
}

impl Value {
    /// Short kind name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Plane(_) => "plane",
            Self::Accum(_) => "accum buffer",
            Self::Field(_) => "vector field",
            Self::Scalar(_) => "scalar",
        }
    }

    /// The plane, if this is one.
    pub fn as_plane(&self) -> Option<&Plane> {
        match self {
            Self::Plane(p) => Some(p),
            _ => None,
        }
    }

    /// The accumulation buffer, if this is one.
    pub fn as_accum(&self) -> Option<&AccumBuffer> {
        match self {
            Self::Accum(a) => Some(a),
            _ => None,
        }
    }

    /// The vector field, if this is one.
    pub fn as_field(&self) -> Option<&VectorField> {
        match self {
            Self::Field(v) => Some(v),
            _ => None,
        }
    }

    /// The scalar, if this is one.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(s) => Some(*s),
            _ => None,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Plane(p) => p.hash(state),
            Self::Accum(a) => a.hash(state),
            Self::Field(v) => v.hash(state),
            Self::Scalar(s) => {
                "scalar".hash(state);
                s.to_bits().hash(state);
            }
        }
    }
}

impl From<Plane> for Value {
    fn from(p: Plane) -> Self {
        Self::Plane(p)
    }
}

impl From<AccumBuffer> for Value {
    fn from(a: AccumBuffer) -> Self {
        Self::Accum(a)
    }
}

impl From<VectorField> for Value {
    fn from(v: VectorField) -> Self {
        Self::Field(v)
    }
}

impl From<f64> for Value {
    fn from(s: f64) -> Self {
        Self::Scalar(s)
    }
}

struct NodeDesc {
    op: String,
    deps: Vec<Value>,
    args: Vec<f64>,
    rect: Rect,
    evaluator: Arc<dyn Evaluator>,
}

/// An immutable description of one graph operation. Cheap to clone.
#[derive(Clone)]
pub struct Node(Arc<NodeDesc>);

impl Node {
    /// Describe `op` applied to `deps` and `args`, producing `rect`.
    pub fn new(
        op: impl Into<String>,
        rect: Rect,
        deps: Vec<Value>,
        args: Vec<f64>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self(Arc::new(NodeDesc {
            op: op.into(),
            deps,
            args,
            rect,
            evaluator,
        }))
    }

    /// Operator name.
    pub fn op(&self) -> &str {
        &self.0.op
    }

    /// Declared output bounds.
    pub fn rect(&self) -> Rect {
        self.0.rect
    }

    /// Dependency values in order.
    pub fn deps(&self) -> &[Value] {
        &self.0.deps
    }

    /// Dependency `index`, or [`EvalError::MissingDependency`].
    pub fn dep(&self, index: usize) -> Result<&Value, EvalError> {
        self.0.deps.get(index).ok_or_else(|| EvalError::MissingDependency {
            op: self.0.op.clone(),
            index,
        })
    }

    /// Extra scalar arguments.
    pub fn args(&self) -> &[f64] {
        &self.0.args
    }

    /// The evaluator that computes this node.
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.0.evaluator
    }

    /// Ask the evaluator for this node's value.
    pub fn compute(&self) -> Result<Value, EvalError> {
        self.0.evaluator.compute(self)
    }
}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.op.hash(state);
        self.0.rect.hash(state);
        self.0.deps.hash(state);
        for a in &self.0.args {
            a.to_bits().hash(state);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("op", &self.0.op)
            .field("rect", &self.0.rect)
            .field("deps", &self.0.deps.len())
            .field("args", &self.0.args)
            .finish()
    }
}
