//! Row kernels and the values they consume.

use lumen_core::Rect;
use lumen_plane::PlaneData;

use crate::error::KernelError;

/// Row shape of a kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// One input row in, one output row out (horizontal filters).
    OneToOne,
    /// Any rows of a source plane in, one row out (vertical filters).
    ManyToOne,
}

/// Neighbour-row access to a materialized plane, restricted to the
/// dispatch columns.
#[derive(Clone, Copy, Debug)]
pub struct PlaneRows<'r> {
    data: &'r PlaneData,
    start: usize,
    width: usize,
}

impl<'r> PlaneRows<'r> {
    /// Restrict `data` to `width` columns starting at absolute `x1`.
    /// The caller has checked that the columns are in bounds.
    pub(crate) fn new(data: &'r PlaneData, x1: i32, width: usize) -> Self {
        Self {
            data,
            start: (x1 - data.rect().x1()) as usize,
            width,
        }
    }

    /// Bounds of the whole source plane.
    pub fn rect(&self) -> Rect {
        self.data.rect()
    }

    /// Row `y` (absolute), or `None` outside the plane.
    pub fn row(&self, y: i32) -> Option<&'r [f32]> {
        self.data
            .row(y)
            .map(|row| &row[self.start..self.start + self.width])
    }

    /// Row `y` with the plane's top and bottom rows repeated outward.
    pub fn row_clamped(&self, y: i32) -> &'r [f32] {
        &self.data.row_clamped(y)[self.start..self.start + self.width]
    }
}

/// One input of a kernel call.
#[derive(Clone, Copy, Debug)]
pub enum RowValue<'r> {
    /// A float row.
    Line(&'r [f32]),
    /// This input shares storage with the destination; read it from `out`
    /// before overwriting.
    Aliased,
    /// A double-precision accumulation row.
    Accum(&'r [f64]),
    /// Arbitrary rows of a source plane (for [`Shape::ManyToOne`]).
    Rows(PlaneRows<'r>),
    /// A scalar argument.
    Scalar(f64),
}

/// Arguments of one kernel call.
#[derive(Debug)]
pub struct RowArgs<'r> {
    /// Absolute row being produced.
    pub y: i32,
    /// Absolute first column.
    pub x1: i32,
    /// Number of columns.
    pub width: usize,
    /// Inputs in declaration order.
    pub inputs: &'r [RowValue<'r>],
}

impl RowArgs<'_> {
    /// Input `index` at column `i`, reading aliased inputs from `out`.
    ///
    /// Scalars broadcast; accumulation rows are narrowed to `f32`;
    /// plane-row inputs read row `y`, clamped.
    pub fn sample(&self, index: usize, i: usize, out: &[f32]) -> f32 {
        match self.inputs[index] {
            RowValue::Line(line) => line[i],
            RowValue::Aliased => out[i],
            RowValue::Accum(row) => row[i] as f32,
            RowValue::Rows(rows) => rows.row_clamped(self.y)[i],
            RowValue::Scalar(s) => s as f32,
        }
    }

    /// Input `index` as a float row, if it is one.
    pub fn line(&self, index: usize) -> Option<&[f32]> {
        match self.inputs.get(index)? {
            RowValue::Line(line) => Some(*line),
            _ => None,
        }
    }

    /// Input `index` as a scalar, if it is one.
    pub fn scalar(&self, index: usize) -> Option<f64> {
        match self.inputs.get(index)? {
            RowValue::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Input `index` as plane rows, if it is.
    pub fn rows(&self, index: usize) -> Option<PlaneRows<'_>> {
        match self.inputs.get(index)? {
            RowValue::Rows(rows) => Some(*rows),
            _ => None,
        }
    }

    /// Input `index` as an accumulation row, if it is one.
    pub fn accum(&self, index: usize) -> Option<&[f64]> {
        match self.inputs.get(index)? {
            RowValue::Accum(row) => Some(*row),
            _ => None,
        }
    }
}

/// A per-row implementation bound to a subgroup member.
///
/// `run` writes exactly `args.width` values into `out`. It may be called
/// concurrently from several threads on different rows.
pub trait RowKernel: Send + Sync {
    /// Name used in errors and traces.
    fn name(&self) -> &str;

    /// Row shape. Defaults to [`Shape::OneToOne`].
    fn shape(&self) -> Shape {
        Shape::OneToOne
    }

    /// Whether `out` may alias one of the float-row inputs. Kernels that
    /// read neighbouring columns of an input must return `false`.
    fn allows_in_place(&self) -> bool {
        false
    }

    /// Produce row `args.y`.
    fn run(&self, args: &RowArgs<'_>, out: &mut [f32]) -> Result<(), KernelError>;
}
