//! Reference row kernels and a graph registering them.
//!
//! - [`GradientX`]: horizontal central difference, edges 0 (N/A in place).
//! - [`Scale`]: multiply by a constant, in place.
//! - [`Add`]: sum of two inputs, in place.
//! - [`Box3V`]: vertical 3-tap mean over plane rows (N-to-1).
//! - [`AccumToPlane`]: narrows an accumulation row.

use std::sync::Arc;

use lumen_plane::{
    AccumBuffer, AccumData, EvalError, Node, Plane, PlaneData, Value, TO_ABSOLUTE_OP,
    TO_RELATIVE_OP,
};
use lumen_scan::{KernelError, RowArgs, RowKernel, Runtime, Shape};

use crate::graph::MockGraph;

/// `out[i] = (in[i + 1] - in[i - 1]) / 2`, with the first and last column 0.
pub struct GradientX;

impl RowKernel for GradientX {
    fn name(&self) -> &str {
        "gradient_x"
    }

    fn run(&self, args: &RowArgs<'_>, out: &mut [f32]) -> Result<(), KernelError> {
        let input = args
            .line(0)
            .ok_or_else(|| KernelError::new("gradient_x needs a float row"))?;
        let w = args.width;
        out[0] = 0.0;
        out[w - 1] = 0.0;
        for i in 1..w.saturating_sub(1) {
            out[i] = (input[i + 1] - input[i - 1]) / 2.0;
        }
        Ok(())
    }
}

/// `out = in * factor`.
pub struct Scale {
    pub factor: f32,
}

impl RowKernel for Scale {
    fn name(&self) -> &str {
        "scale"
    }

    fn allows_in_place(&self) -> bool {
        true
    }

    fn run(&self, args: &RowArgs<'_>, out: &mut [f32]) -> Result<(), KernelError> {
        for i in 0..args.width {
            out[i] = args.sample(0, i, out) * self.factor;
        }
        Ok(())
    }
}

/// `out = a + b`; either input may be a row, an accumulation row or a
/// scalar.
pub struct Add;

impl RowKernel for Add {
    fn name(&self) -> &str {
        "add"
    }

    fn allows_in_place(&self) -> bool {
        true
    }

    fn run(&self, args: &RowArgs<'_>, out: &mut [f32]) -> Result<(), KernelError> {
        if args.inputs.len() != 2 {
            return Err(KernelError::new(format!(
                "add takes 2 inputs, got {}",
                args.inputs.len()
            )));
        }
        for i in 0..args.width {
            out[i] = args.sample(0, i, out) + args.sample(1, i, out);
        }
        Ok(())
    }
}

/// Mean of rows `y - 1`, `y` and `y + 1` of the source plane, with its
/// top and bottom rows repeated.
pub struct Box3V;

impl RowKernel for Box3V {
    fn name(&self) -> &str {
        "box3_v"
    }

    fn shape(&self) -> Shape {
        Shape::ManyToOne
    }

    fn run(&self, args: &RowArgs<'_>, out: &mut [f32]) -> Result<(), KernelError> {
        let rows = args
            .rows(0)
            .ok_or_else(|| KernelError::new("box3_v needs plane rows"))?;
        let above = rows.row_clamped(args.y - 1);
        let here = rows.row_clamped(args.y);
        let below = rows.row_clamped(args.y + 1);
        for (i, v) in out.iter_mut().enumerate() {
            *v = (above[i] + here[i] + below[i]) / 3.0;
        }
        Ok(())
    }
}

/// Copy an accumulation row into a plane row.
pub struct AccumToPlane;

impl RowKernel for AccumToPlane {
    fn name(&self) -> &str {
        "accum_to_plane"
    }

    fn run(&self, args: &RowArgs<'_>, out: &mut [f32]) -> Result<(), KernelError> {
        let row = args
            .accum(0)
            .ok_or_else(|| KernelError::new("accum_to_plane needs an accumulation row"))?;
        for (o, v) in out.iter_mut().zip(row) {
            *o = *v as f32;
        }
        Ok(())
    }
}

fn op_failed(node: &Node, e: impl ToString) -> EvalError {
    EvalError::OperatorFailed {
        op: node.op().into(),
        reason: e.to_string(),
    }
}

fn arg(node: &Node, index: usize, default: f64) -> f64 {
    node.args().get(index).copied().unwrap_or(default)
}

fn plane_dep<'n>(node: &'n Node, index: usize) -> Result<&'n Plane, EvalError> {
    node.dep(index)?
        .as_plane()
        .ok_or_else(|| EvalError::MissingDependency {
            op: node.op().into(),
            index,
        })
}

/// Summed-area table of a plane: entry `(x, y)` is the sum of every
/// source value at or above and left of it.
fn integral(rt: &Runtime, node: &Node) -> Result<Value, EvalError> {
    let src = plane_dep(node, 0)?;
    let data = src.data().map_err(|e| op_failed(node, e))?;
    let rect = node.rect();
    if !data.rect().contains(&rect) {
        return Err(op_failed(node, format!("source {} does not cover {rect}", data.rect())));
    }
    let mut table = AccumData::allocate(rt.pool(), rect).map_err(|e| op_failed(node, e))?;
    let start = (rect.x1() - data.rect().x1()) as usize;
    let mut above = vec![0.0f64; rect.width()];
    for (y, out) in (rect.y1()..).zip(table.rows_mut()) {
        let row = data
            .row(y)
            .ok_or_else(|| op_failed(node, format!("source has no row {y}")))?;
        let mut run = 0.0f64;
        for (i, o) in out.iter_mut().enumerate() {
            run += f64::from(row[start + i]);
            above[i] += run;
            *o = above[i];
        }
    }
    Ok(Value::Accum(AccumBuffer::from_data(table)))
}

fn shift_field(rt: &Runtime, node: &Node, absolute: bool) -> Result<Value, EvalError> {
    let field = node
        .dep(0)?
        .as_field()
        .ok_or_else(|| EvalError::MissingDependency {
            op: node.op().into(),
            index: 0,
        })?;
    field
        .shift_by_coordinates(rt.pool(), absolute)
        .map(Value::Field)
        .map_err(|e| op_failed(node, e))
}

/// A graph with every reference operator registered:
///
/// | operator | strategy | semantics |
/// |----------|----------|-----------|
/// | `constant` | single-threaded | every value `args[0]` |
/// | `ramp_x` | threaded | `x * args[0]` |
/// | `integral` | single-threaded | summed-area accumulation of dep 0 |
/// | `gradient_x` | row-fused | [`GradientX`] |
/// | `scale` | row-fused | [`Scale`] by `args[0]` |
/// | `add` | row-fused | [`Add`] |
/// | `box3_v` | row-fused | [`Box3V`] |
/// | `accum_to_plane` | row-fused | [`AccumToPlane`] |
/// | [`TO_ABSOLUTE_OP`], [`TO_RELATIVE_OP`] | single-threaded | vector field mode switch |
pub fn reference_graph(runtime: Runtime) -> Arc<MockGraph> {
    MockGraph::builder(runtime)
        .single_threaded("constant", |rt, node| {
            let value = arg(node, 0, 0.0) as f32;
            PlaneData::filled(rt.pool(), node.rect(), value)
                .map(|data| Value::Plane(Plane::from_data(data)))
                .map_err(|e| op_failed(node, e))
        })
        .threaded("ramp_x", |node, _, row| {
            let step = arg(node, 0, 1.0) as f32;
            let x1 = node.rect().x1();
            for (i, v) in row.iter_mut().enumerate() {
                *v = (x1 + i as i32) as f32 * step;
            }
            Ok(())
        })
        .single_threaded("integral", integral)
        .row_fused("gradient_x", |_| Box::new(GradientX))
        .row_fused("scale", |node| {
            Box::new(Scale {
                factor: arg(node, 0, 1.0) as f32,
            })
        })
        .row_fused("add", |_| Box::new(Add))
        .row_fused("box3_v", |_| Box::new(Box3V))
        .row_fused("accum_to_plane", |_| Box::new(AccumToPlane))
        .single_threaded(TO_ABSOLUTE_OP, |rt, node| shift_field(rt, node, true))
        .single_threaded(TO_RELATIVE_OP, |rt, node| shift_field(rt, node, false))
        .build()
}
