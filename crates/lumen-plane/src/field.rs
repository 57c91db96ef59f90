//! Vector fields: paired `(u, v)` planes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use lumen_core::Rect;
use lumen_pool::PoolAllocator;

use crate::data::PlaneData;
use crate::error::PlaneError;
use crate::graph::{Evaluator, Node, Value};
use crate::lazy::Plane;

/// Graph operator that turns a relative field into absolute coordinates.
pub const TO_ABSOLUTE_OP: &str = "vector_field.to_absolute";

/// Graph operator that turns an absolute field into displacements.
pub const TO_RELATIVE_OP: &str = "vector_field.to_relative";

/// Two same-shaped planes, either absolute pixel coordinates or relative
/// displacements.
///
/// Materializes lazily, like [`Plane`]. Switching between absolute and
/// relative is a graph operation because it depends on each pixel's
/// coordinates.
pub struct VectorField {
    rect: Rect,
    absolute: bool,
    node: Option<Node>,
    planes: OnceLock<(Plane, Plane)>,
}

impl VectorField {
    /// A field computed by `node`.
    pub fn from_node(node: Node, absolute: bool) -> Self {
        Self {
            rect: node.rect(),
            absolute,
            node: Some(node),
            planes: OnceLock::new(),
        }
    }

    /// A field built from existing planes. Both must share bounds.
    pub fn from_planes(u: Plane, v: Plane, absolute: bool) -> Result<Self, PlaneError> {
        if u.rect() != v.rect() {
            return Err(PlaneError::ShapeMismatch {
                expected: u.rect(),
                actual: v.rect(),
            });
        }
        Ok(Self {
            rect: u.rect(),
            absolute,
            node: None,
            planes: OnceLock::from((u, v)),
        })
    }

    /// Declared bounds.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Whether `(u, v)` are absolute coordinates rather than displacements.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Whether both component planes are known and materialized.
    pub fn is_materialized(&self) -> bool {
        self.planes
            .get()
            .is_some_and(|(u, v)| u.is_materialized() && v.is_materialized())
    }

    fn check_compute(&self) -> Result<&(Plane, Plane), PlaneError> {
        if let Some(planes) = self.planes.get() {
            planes.0.data()?;
            planes.1.data()?;
            return Ok(planes);
        }
        let node = self.node.as_ref().ok_or(PlaneError::NoSource)?;
        let field = match node.compute()? {
            Value::Field(field) => field,
            other => {
                return Err(PlaneError::WrongKind {
                    expected: "vector field",
                    actual: other.kind_name(),
                })
            }
        };
        if field.absolute != self.absolute {
            return Err(PlaneError::WrongKind {
                expected: mode_name(self.absolute),
                actual: mode_name(field.absolute),
            });
        }
        let (u, v) = field.check_compute()?;
        for plane in [u, v] {
            if plane.rect() != self.rect {
                return Err(PlaneError::ShapeMismatch {
                    expected: self.rect,
                    actual: plane.rect(),
                });
            }
            plane.data()?;
        }
        tracing::debug!(op = node.op(), rect = %self.rect, absolute = self.absolute, "vector field materialized");
        Ok(self.planes.get_or_init(|| (u.clone(), v.clone())))
    }

    /// Horizontal component.
    pub fn u(&self) -> Result<&Plane, PlaneError> {
        Ok(&self.check_compute()?.0)
    }

    /// Vertical component.
    pub fn v(&self) -> Result<&Plane, PlaneError> {
        Ok(&self.check_compute()?.1)
    }

    /// This field in absolute coordinates. Returns a clone if it already
    /// is; otherwise a lazy [`TO_ABSOLUTE_OP`] node.
    pub fn to_absolute(&self, evaluator: &Arc<dyn Evaluator>) -> Self {
        self.convert(true, evaluator)
    }

    /// This field as relative displacements. Returns a clone if it already
    /// is; otherwise a lazy [`TO_RELATIVE_OP`] node.
    pub fn to_relative(&self, evaluator: &Arc<dyn Evaluator>) -> Self {
        self.convert(false, evaluator)
    }

    fn convert(&self, absolute: bool, evaluator: &Arc<dyn Evaluator>) -> Self {
        if self.absolute == absolute {
            return self.clone();
        }
        let op = if absolute { TO_ABSOLUTE_OP } else { TO_RELATIVE_OP };
        let node = Node::new(
            op,
            self.rect,
            vec![Value::Field(self.clone())],
            vec![],
            Arc::clone(evaluator),
        );
        Self::from_node(node, absolute)
    }

    /// Per-pixel implementation of the mode switch, for evaluators that
    /// register [`TO_ABSOLUTE_OP`] and [`TO_RELATIVE_OP`].
    ///
    /// Adds `(x, y)` to every vector when going absolute and subtracts it
    /// when going relative.
    pub fn shift_by_coordinates(
        &self,
        pool: &PoolAllocator,
        absolute: bool,
    ) -> Result<Self, PlaneError> {
        if self.absolute == absolute {
            return Ok(self.clone());
        }
        let sign = if absolute { 1.0 } else { -1.0 };
        let (u, v) = self.check_compute()?;
        let (u, v) = (u.data()?, v.data()?);
        let su = PlaneData::from_fn(pool, self.rect, |x, y| {
            component(u, x, y) + sign * x as f32
        })?;
        let sv = PlaneData::from_fn(pool, self.rect, |x, y| {
            component(v, x, y) + sign * y as f32
        })?;
        Self::from_planes(Plane::from_data(su), Plane::from_data(sv), absolute)
    }
}

fn component(data: &PlaneData, x: i32, y: i32) -> f32 {
    data.row_clamped(y)[(x - data.rect().x1()) as usize]
}

fn mode_name(absolute: bool) -> &'static str {
    if absolute {
        "absolute vector field"
    } else {
        "relative vector field"
    }
}

impl Clone for VectorField {
    fn clone(&self) -> Self {
        let planes = OnceLock::new();
        if let Some((u, v)) = self.planes.get() {
            let _ = planes.set((u.clone(), v.clone()));
        }
        Self {
            rect: self.rect,
            absolute: self.absolute,
            node: self.node.clone(),
            planes,
        }
    }
}

impl Hash for VectorField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        "vector field".hash(state);
        self.rect.hash(state);
        self.absolute.hash(state);
        match self.planes.get() {
            Some((u, v)) => {
                u.hash(state);
                v.hash(state);
            }
            None => self.node.hash(state),
        }
    }
}

impl fmt::Debug for VectorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorField")
            .field("rect", &self.rect)
            .field("absolute", &self.absolute)
            .field("node", &self.node.as_ref().map(Node::op))
            .field("materialized", &self.planes.get().is_some())
            .finish()
    }
}
