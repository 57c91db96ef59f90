//! Lazily materialized grids: [`Plane`] and [`AccumBuffer`].

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use lumen_core::Rect;
use lumen_pool::PoolAllocator;

use crate::data::{GridData, GridElement};
use crate::error::PlaneError;
use crate::graph::{Evaluator, Node, Value};

/// Element types with a lazy grid variant in [`Value`].
pub trait LazyElement: GridElement {
    /// Unwrap the matching [`Value`] variant, handing back anything else.
    fn from_value(value: Value) -> Result<LazyGrid<Self>, Value>;
}

impl LazyElement for f32 {
    fn from_value(value: Value) -> Result<LazyGrid<Self>, Value> {
        match value {
            Value::Plane(p) => Ok(p),
            other => Err(other),
        }
    }
}

impl LazyElement for f64 {
    fn from_value(value: Value) -> Result<LazyGrid<Self>, Value> {
        match value {
            Value::Accum(a) => Ok(a),
            other => Err(other),
        }
    }
}

/// A 2-D grid that is described first and computed on first access.
///
/// Until materialized it holds only a graph [`Node`]. The first accessor
/// that needs data (`data`, `line`, `stride`, ...) pulls the node's value
/// from its evaluator, checks its shape, and caches the buffer. Later
/// accesses return the cached buffer without touching the graph.
///
/// Cloning a materialized grid shares the buffer. Cloning an
/// unmaterialized grid shares only the node, so each clone materializes
/// independently.
pub struct LazyGrid<T> {
    rect: Rect,
    node: Option<Node>,
    data: OnceLock<Arc<GridData<T>>>,
}

/// Lazily computed single-precision 2-D array.
pub type Plane = LazyGrid<f32>;

/// Lazily computed double-precision 2-D array (summed-area tables and
/// other accumulations).
pub type AccumBuffer = LazyGrid<f64>;

// Compile-time assertion: lazy grids are read from every worker.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Plane>();
    assert::<AccumBuffer>();
};

impl<T: LazyElement> LazyGrid<T> {
    /// A grid computed by `node`. No computation happens here.
    pub fn from_node(node: Node) -> Self {
        Self {
            rect: node.rect(),
            node: Some(node),
            data: OnceLock::new(),
        }
    }

    /// Shorthand for [`from_node`](Self::from_node) with a fresh [`Node`].
    pub fn lazy(
        op: impl Into<String>,
        rect: Rect,
        deps: Vec<Value>,
        args: Vec<f64>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self::from_node(Node::new(op, rect, deps, args, evaluator))
    }

    /// An already materialized grid.
    pub fn from_data(data: GridData<T>) -> Self {
        Self::from_shared(Arc::new(data))
    }

    /// An already materialized grid sharing `data`.
    pub fn from_shared(data: Arc<GridData<T>>) -> Self {
        Self {
            rect: data.rect(),
            node: None,
            data: OnceLock::from(data),
        }
    }

    /// A materialized grid with every element set to `value`.
    pub fn filled(pool: &PoolAllocator, rect: Rect, value: T) -> Result<Self, PlaneError> {
        Ok(Self::from_data(GridData::filled(pool, rect, value)?))
    }

    /// Declared bounds.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Declared width.
    pub fn width(&self) -> usize {
        self.rect.width()
    }

    /// Declared height.
    pub fn height(&self) -> usize {
        self.rect.height()
    }

    /// The graph node, if this grid was built from one.
    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    /// Whether data has been computed (or was supplied up front).
    pub fn is_materialized(&self) -> bool {
        self.data.get().is_some()
    }

    fn check_compute(&self) -> Result<&Arc<GridData<T>>, PlaneError> {
        if let Some(data) = self.data.get() {
            return Ok(data);
        }
        let node = self.node.as_ref().ok_or(PlaneError::NoSource)?;
        let grid = T::from_value(node.compute()?).map_err(|other| PlaneError::WrongKind {
            expected: T::NAME,
            actual: other.kind_name(),
        })?;
        let data = grid.shared_data()?;
        if data.rect() != self.rect {
            return Err(PlaneError::ShapeMismatch {
                expected: self.rect,
                actual: data.rect(),
            });
        }
        if data.stride() < self.width() {
            return Err(PlaneError::StrideTooSmall {
                stride: data.stride(),
                width: self.width(),
            });
        }
        tracing::debug!(op = node.op(), kind = T::NAME, rect = %self.rect, "materialized");
        // A concurrent pull may have won; either result is equivalent.
        Ok(self.data.get_or_init(|| data))
    }

    /// The materialized data, computing it if needed.
    pub fn data(&self) -> Result<&GridData<T>, PlaneError> {
        self.check_compute().map(|d| &**d)
    }

    /// A shared handle to the materialized data.
    pub fn shared_data(&self) -> Result<Arc<GridData<T>>, PlaneError> {
        self.check_compute().cloned()
    }

    /// Row `y` (absolute).
    pub fn line(&self, y: i32) -> Result<&[T], PlaneError> {
        let data = self.check_compute()?;
        data.row(y).ok_or(PlaneError::RowOutOfRange { y, rect: self.rect })
    }

    /// `width` elements of row `y` starting at absolute column `x1`.
    pub fn row_span(&self, y: i32, x1: i32, width: usize) -> Result<&[T], PlaneError> {
        let span = Rect::new(x1, y, x1 + width as i32 - 1, y)?;
        if !self.rect.contains(&span) {
            return Err(PlaneError::ShapeMismatch {
                expected: self.rect,
                actual: span,
            });
        }
        let row = self.line(y)?;
        let start = (x1 - self.rect.x1()) as usize;
        Ok(&row[start..start + width])
    }

    /// Row stride of the materialized data.
    pub fn stride(&self) -> Result<usize, PlaneError> {
        Ok(self.check_compute()?.stride())
    }

    /// Hash of the bounds and every element, materializing if needed.
    ///
    /// Unlike [`Hash`], which uses buffer identity, equal contents give
    /// equal hashes.
    pub fn content_hash(&self) -> Result<u64, PlaneError> {
        let data = self.check_compute()?;
        let mut h = DefaultHasher::new();
        T::NAME.hash(&mut h);
        self.rect.hash(&mut h);
        data.content_hash(&mut h);
        Ok(h.finish())
    }
}

impl<T> Clone for LazyGrid<T> {
    fn clone(&self) -> Self {
        let data = OnceLock::new();
        if let Some(shared) = self.data.get() {
            let _ = data.set(Arc::clone(shared));
        }
        Self {
            rect: self.rect,
            node: self.node.clone(),
            data,
        }
    }
}

impl<T: GridElement> Hash for LazyGrid<T> {
    /// Shape, kind, then buffer identity once materialized or the node
    /// description before.
    fn hash<H: Hasher>(&self, state: &mut H) {
        T::NAME.hash(state);
        self.rect.hash(state);
        match self.data.get() {
            Some(data) => (data.as_ptr() as usize).hash(state),
            None => self.node.hash(state),
        }
    }
}

impl<T: GridElement> fmt::Debug for LazyGrid<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyGrid")
            .field("kind", &T::NAME)
            .field("rect", &self.rect)
            .field("node", &self.node.as_ref().map(Node::op))
            .field("materialized", &self.data.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PlaneData;
    use crate::error::EvalError;
    use lumen_pool::PoolConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a ramp plane for "ramp", the declared rect shifted by one
    /// for "shifted", and a scalar for anything else.
    struct Ramp {
        pool: PoolAllocator,
        pulls: AtomicUsize,
    }

    impl Evaluator for Ramp {
        fn compute(&self, node: &Node) -> Result<Value, EvalError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            let fail = |e: PlaneError| EvalError::OperatorFailed {
                op: node.op().to_string(),
                reason: e.to_string(),
            };
            match node.op() {
                "ramp" => {
                    let data = PlaneData::from_fn(&self.pool, node.rect(), |x, _| x as f32).map_err(fail)?;
                    Ok(Value::Plane(Plane::from_data(data)))
                }
                "shifted" => {
                    let r = node.rect();
                    let rect = Rect::new(r.x1() + 1, r.y1(), r.x2() + 1, r.y2()).map_err(|e| fail(e.into()))?;
                    Ok(Value::Plane(Plane::filled(&self.pool, rect, 0.0).map_err(fail)?))
                }
                _ => Ok(Value::Scalar(1.0)),
            }
        }
    }

    fn ramp() -> Arc<Ramp> {
        Arc::new(Ramp {
            pool: PoolAllocator::new(PoolConfig::default()).unwrap(),
            pulls: AtomicUsize::new(0),
        })
    }

    fn lazy(eval: &Arc<Ramp>, op: &str) -> Plane {
        let evaluator: Arc<dyn Evaluator> = eval.clone();
        Plane::lazy(op, Rect::with_size(8, 2).unwrap(), vec![], vec![], evaluator)
    }

    #[test]
    fn construction_does_not_compute() {
        let eval = ramp();
        let plane = lazy(&eval, "ramp");
        assert!(!plane.is_materialized());
        assert_eq!(plane.width(), 8);
        assert_eq!(eval.pulls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn data_pulls_once_and_returns_same_pointer() {
        let eval = ramp();
        let plane = lazy(&eval, "ramp");
        let a = plane.data().unwrap().as_ptr();
        let b = plane.data().unwrap().as_ptr();
        assert_eq!(a, b);
        assert_eq!(eval.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(plane.line(1).unwrap()[3], 3.0);
        assert!(plane.stride().unwrap() >= 8);
    }

    #[test]
    fn clone_of_materialized_shares_buffer() {
        let eval = ramp();
        let plane = lazy(&eval, "ramp");
        plane.data().unwrap();
        let copy = plane.clone();
        assert!(copy.is_materialized());
        assert_eq!(copy.data().unwrap().as_ptr(), plane.data().unwrap().as_ptr());
        assert_eq!(eval.pulls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clone_of_unmaterialized_computes_independently() {
        let eval = ramp();
        let plane = lazy(&eval, "ramp");
        let copy = plane.clone();
        plane.data().unwrap();
        assert!(!copy.is_materialized());
        copy.data().unwrap();
        assert_eq!(eval.pulls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let eval = ramp();
        let plane = lazy(&eval, "shifted");
        assert!(matches!(plane.data(), Err(PlaneError::ShapeMismatch { .. })));
        assert!(!plane.is_materialized());
    }

    #[test]
    fn wrong_kind_is_reported() {
        let eval = ramp();
        let plane = lazy(&eval, "scalar");
        assert_eq!(
            plane.data().unwrap_err(),
            PlaneError::WrongKind {
                expected: "plane",
                actual: "scalar"
            }
        );
    }

    #[test]
    fn row_out_of_range_and_span_bounds() {
        let eval = ramp();
        let plane = lazy(&eval, "ramp");
        assert!(matches!(plane.line(2), Err(PlaneError::RowOutOfRange { y: 2, .. })));
        assert_eq!(plane.row_span(0, 2, 3).unwrap(), &[2.0, 3.0, 4.0]);
        assert!(plane.row_span(0, 6, 3).is_err());
    }

    #[test]
    fn hash_switches_to_identity_after_materialization() {
        let hash = |p: &Plane| {
            let mut h = DefaultHasher::new();
            p.hash(&mut h);
            h.finish()
        };
        let eval = ramp();
        let a = lazy(&eval, "ramp");
        let b = lazy(&eval, "ramp");
        assert_eq!(hash(&a), hash(&b));
        a.data().unwrap();
        b.data().unwrap();
        assert_ne!(hash(&a), hash(&b));
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn from_data_without_node_never_pulls() {
        let pool = PoolAllocator::new(PoolConfig::default()).unwrap();
        let acc = AccumBuffer::filled(&pool, Rect::with_size(3, 3).unwrap(), 2.5).unwrap();
        assert!(acc.is_materialized());
        assert!(acc.node().is_none());
        assert_eq!(acc.line(2).unwrap(), &[2.5, 2.5, 2.5]);
    }
}
