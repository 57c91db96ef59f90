//! Row-by-row execution of a fused [`Subgroup`] across the worker pool.
//!
//! Each dispatch range owns one [`ScanlineGroup`]. Within a row, members
//! run in order; each member's result is published to its consumers'
//! input slots as a shared scanline and dropped as soon as the last
//! consumer has run, so scratch buffers circulate inside the range
//! instead of going back to the allocator.

use std::rc::Rc;
use std::sync::{Mutex, OnceLock, PoisonError};

use smallvec::SmallVec;

use lumen_core::Rect;
use lumen_plane::{AccumData, GridData, GridElement, PlaneData};
use lumen_pool::PoolAllocator;

use crate::error::ScanError;
use crate::group::{Checkout, ScanlineGroup, SharedLine};
use crate::kernel::{PlaneRows, RowArgs, RowKernel, RowValue};
use crate::runtime::Runtime;
use crate::scanline::Scanline;
use crate::subgroup::{Member, Source, Subgroup};

/// A member input resolved against materialized data.
#[derive(Clone, Copy)]
enum Bound<'a> {
    Member(usize),
    Line(&'a PlaneData),
    Rows(&'a PlaneData),
    Accum(&'a AccumData),
    Scalar(f64),
}

type Bindings<'a> = SmallVec<[Bound<'a>; 4]>;
type Slots<'a> = SmallVec<[Option<SharedLine<'a>>; 4]>;

/// One output row, claimed by exactly one range.
pub(crate) type RowCell<'a, T> = Mutex<Option<&'a mut [T]>>;

/// Evaluate `subgroup` over `dims` and return one plane per output slot,
/// in slot order.
///
/// Every plane, plane-rows and accumulation input is materialized before
/// any row runs and must cover the columns of `dims` (and, except for
/// plane-rows inputs, its rows). The row range is split across
/// `runtime`'s worker pool; the result does not depend on the worker
/// count.
pub fn dispatch_scan_processing(
    runtime: &Runtime,
    subgroup: &Subgroup,
    dims: Rect,
) -> Result<Vec<PlaneData>, ScanError> {
    subgroup.check_bound()?;
    let bound = bind(subgroup, dims)?;
    let mut outputs = (0..subgroup.output_count())
        .map(|_| PlaneData::allocate(runtime.pool(), dims))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::trace!(
        dims = %dims,
        members = subgroup.members().len(),
        outputs = outputs.len(),
        workers = runtime.threads().worker_count(),
        "scanline dispatch"
    );

    {
        let rows: Vec<Vec<RowCell<'_, f32>>> = outputs
            .iter_mut()
            .map(|plane| plane.rows_mut().map(|row| Mutex::new(Some(row))).collect())
            .collect();
        let pass = Pass {
            subgroup,
            bound: &bound,
            rows: &rows,
            pool: runtime.pool(),
            dims,
            x1: dims.x1(),
            width: dims.width(),
        };
        let failed = OnceLock::new();
        runtime.threads().dispatch(
            |_, start, end| {
                if failed.get().is_some() {
                    return;
                }
                if let Err(e) = pass.run_range(start, end) {
                    let _ = failed.set(e);
                }
            },
            0,
            dims.height(),
        )?;
        if let Some(e) = failed.into_inner() {
            return Err(e);
        }
    }
    Ok(outputs)
}

/// Resolve every member source, materializing planes and checking that
/// they cover `dims`.
fn bind(subgroup: &Subgroup, dims: Rect) -> Result<Vec<Bindings<'_>>, ScanError> {
    subgroup
        .members()
        .iter()
        .map(|member| {
            member
                .sources()
                .iter()
                .map(|source| {
                    Ok(match source {
                        Source::Member(j) => Bound::Member(*j),
                        Source::Plane(plane) => {
                            let data = plane.data()?;
                            covers(member, data.rect(), dims)?;
                            Bound::Line(data)
                        }
                        Source::PlaneRows(plane) => {
                            let data = plane.data()?;
                            let r = data.rect();
                            if r.x1() > dims.x1() || r.x2() < dims.x2() {
                                return Err(out_of_bounds(member, dims, r));
                            }
                            Bound::Rows(data)
                        }
                        Source::Accum(accum) => {
                            let data = accum.data()?;
                            covers(member, data.rect(), dims)?;
                            Bound::Accum(data)
                        }
                        Source::Scalar(s) => Bound::Scalar(*s),
                    })
                })
                .collect::<Result<Bindings<'_>, ScanError>>()
        })
        .collect()
}

fn covers(member: &Member, available: Rect, dims: Rect) -> Result<(), ScanError> {
    if available.contains(&dims) {
        Ok(())
    } else {
        Err(out_of_bounds(member, dims, available))
    }
}

fn out_of_bounds(member: &Member, dims: Rect, available: Rect) -> ScanError {
    ScanError::Bounds {
        member: member.name().to_string(),
        dims,
        available,
    }
}

/// Per-dispatch state shared by every range.
struct Pass<'p, 'a, 'b: 'a> {
    subgroup: &'a Subgroup,
    bound: &'p [Bindings<'b>],
    rows: &'p [Vec<RowCell<'a, f32>>],
    pool: &'p PoolAllocator,
    dims: Rect,
    x1: i32,
    width: usize,
}

impl<'a> Pass<'_, 'a, '_> {
    /// Rows `[start, end)` relative to `dims`, sharing one scanline group.
    fn run_range(&self, start: usize, end: usize) -> Result<(), ScanError> {
        let mut group = ScanlineGroup::new(self.pool.clone(), self.x1, self.width);
        let mut slots: Vec<Slots<'a>> = self
            .subgroup
            .members()
            .iter()
            .map(|m| m.sources().iter().map(|_| None).collect())
            .collect();
        for row in start..end {
            self.run_row(&mut group, &mut slots, row)?;
            for slot in slots.iter_mut().flat_map(|s| s.iter_mut()) {
                if let Some(line) = slot.take() {
                    group.recycle(line);
                }
            }
        }
        Ok(())
    }

    fn run_row(
        &self,
        group: &mut ScanlineGroup<'a>,
        slots: &mut [Slots<'a>],
        row: usize,
    ) -> Result<(), ScanError> {
        let y = self.dims.y1() + row as i32;
        for (i, member) in self.subgroup.members().iter().enumerate() {
            let kernel = member.kernel().ok_or_else(|| ScanError::Subgroup {
                reason: format!("member '{}' has no kernel bound", member.name()),
            })?;
            for (k, bound) in self.bound[i].iter().enumerate() {
                if let Bound::Line(data) = *bound {
                    let span = self.span(member, data, y)?;
                    slots[i][k] = Some(Rc::new(Scanline::borrowed(self.x1, span)));
                }
            }
            let out_row = match member.output() {
                Some(slot) => Some(self.claim_output(member, slot, row)?),
                None => None,
            };

            let checkout =
                group.find_or_checkout(&mut slots[i], kernel.allows_in_place(), out_row)?;
            let line = match checkout {
                Checkout::InPlace {
                    input,
                    mut line,
                    output,
                } => {
                    let out = line.get_mut(group.pool())?;
                    self.run_member(i, member, kernel, &slots[i], Some(input), y, out)?;
                    if let Some(row) = output {
                        row.copy_from_slice(line.get());
                    }
                    line
                }
                Checkout::Output(row) => {
                    self.run_member(i, member, kernel, &slots[i], None, y, row)?;
                    Scanline::borrowed(self.x1, row)
                }
                Checkout::Scratch(mut line) => {
                    let out = line.get_mut(group.pool())?;
                    self.run_member(i, member, kernel, &slots[i], None, y, out)?;
                    line
                }
            };

            for slot in slots[i].iter_mut() {
                if let Some(input) = slot.take() {
                    group.recycle(input);
                }
            }
            let shared = Rc::new(line);
            for &(consumer, k) in self.subgroup.consumers(i) {
                slots[consumer][k] = Some(Rc::clone(&shared));
            }
            group.recycle(shared);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_member(
        &self,
        i: usize,
        member: &Member,
        kernel: &dyn RowKernel,
        slots: &[Option<SharedLine<'a>>],
        aliased: Option<usize>,
        y: i32,
        out: &mut [f32],
    ) -> Result<(), ScanError> {
        let mut values: SmallVec<[RowValue<'_>; 4]> = SmallVec::new();
        for (k, bound) in self.bound[i].iter().enumerate() {
            let value = match *bound {
                _ if aliased == Some(k) => RowValue::Aliased,
                Bound::Member(_) | Bound::Line(_) => match &slots[k] {
                    Some(line) => RowValue::Line(line.get()),
                    None => {
                        return Err(ScanError::Subgroup {
                            reason: format!(
                                "input {k} of member '{}' was not published for row {y}",
                                member.name()
                            ),
                        })
                    }
                },
                Bound::Rows(data) => RowValue::Rows(PlaneRows::new(data, self.x1, self.width)),
                Bound::Accum(data) => RowValue::Accum(self.span(member, data, y)?),
                Bound::Scalar(s) => RowValue::Scalar(s),
            };
            values.push(value);
        }
        let args = RowArgs {
            y,
            x1: self.x1,
            width: self.width,
            inputs: &values,
        };
        kernel.run(&args, out).map_err(|e| ScanError::Kernel {
            member: member.name().to_string(),
            reason: e.reason,
        })
    }

    /// Take this range's view of output row `row` of `slot`.
    fn claim_output(
        &self,
        member: &Member,
        slot: usize,
        row: usize,
    ) -> Result<&'a mut [f32], ScanError> {
        self.rows[slot][row]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| ScanError::Subgroup {
                reason: format!("output row {row} of '{}' claimed twice", member.name()),
            })
    }

    /// The dispatch columns of row `y` of `data`.
    fn span<'d, T: GridElement>(
        &self,
        member: &Member,
        data: &'d GridData<T>,
        y: i32,
    ) -> Result<&'d [T], ScanError> {
        let start = (self.x1 - data.rect().x1()) as usize;
        data.row(y)
            .and_then(|row| row.get(start..start + self.width))
            .ok_or_else(|| out_of_bounds(member, self.dims, data.rect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use lumen_plane::{AccumBuffer, Plane};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Add;

    impl RowKernel for Add {
        fn name(&self) -> &str {
            "add"
        }

        fn allows_in_place(&self) -> bool {
            true
        }

        fn run(&self, args: &RowArgs<'_>, out: &mut [f32]) -> Result<(), KernelError> {
            for i in 0..args.width {
                out[i] = args.sample(0, i, out) + args.sample(1, i, out);
            }
            Ok(())
        }
    }

    /// Writes the absolute column index, ignoring inputs.
    struct Columns;

    impl RowKernel for Columns {
        fn name(&self) -> &str {
            "columns"
        }

        fn run(&self, args: &RowArgs<'_>, out: &mut [f32]) -> Result<(), KernelError> {
            for (i, v) in out.iter_mut().enumerate() {
                *v = (args.x1 + i as i32) as f32;
            }
            Ok(())
        }
    }

    struct Fails(AtomicUsize);

    impl RowKernel for Fails {
        fn name(&self) -> &str {
            "fails"
        }

        fn run(&self, args: &RowArgs<'_>, _: &mut [f32]) -> Result<(), KernelError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            if args.y == 2 {
                Err(KernelError::new("row 2 is cursed"))
            } else {
                Ok(())
            }
        }
    }

    fn ramp(rt: &Runtime, rect: Rect) -> Plane {
        Plane::from_data(PlaneData::from_fn(rt.pool(), rect, |x, y| (x + 10 * y) as f32).unwrap())
    }

    #[test]
    fn chain_reads_planes_scalars_and_earlier_members() {
        let rt = Runtime::with_workers(0).unwrap();
        let dims = Rect::new(1, 1, 4, 3).unwrap();
        let src = ramp(&rt, Rect::with_size(6, 5).unwrap());
        let mut b = Subgroup::builder();
        let a = b.add_kernel(Box::new(Add), vec![Source::Plane(src), Source::Scalar(1.0)]);
        let c = b.add_kernel(Box::new(Add), vec![Source::Member(a), Source::Member(a)]);
        b.mark_output(c).unwrap();
        let out = dispatch_scan_processing(&rt, &b.build().unwrap(), dims).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rect(), dims);
        assert_eq!(out[0].row(2).unwrap(), &[44.0, 46.0, 48.0, 50.0]);
    }

    #[test]
    fn intermediate_and_final_outputs_are_both_written() {
        let rt = Runtime::with_workers(1).unwrap();
        let dims = Rect::with_size(3, 2).unwrap();
        let mut b = Subgroup::builder();
        let a = b.add_kernel(Box::new(Columns), vec![]);
        let c = b.add_kernel(Box::new(Add), vec![Source::Member(a), Source::Scalar(0.5)]);
        assert_eq!(b.mark_output(a).unwrap(), 0);
        assert_eq!(b.mark_output(c).unwrap(), 1);
        let out = dispatch_scan_processing(&rt, &b.build().unwrap(), dims).unwrap();
        assert_eq!(out[0].row(1).unwrap(), &[0.0, 1.0, 2.0]);
        assert_eq!(out[1].row(1).unwrap(), &[0.5, 1.5, 2.5]);
    }

    #[test]
    fn accum_inputs_are_narrowed() {
        let rt = Runtime::with_workers(0).unwrap();
        let rect = Rect::with_size(2, 2).unwrap();
        let acc = AccumBuffer::from_data(AccumData::filled(rt.pool(), rect, 2.25).unwrap());
        let mut b = Subgroup::builder();
        let a = b.add_kernel(Box::new(Add), vec![Source::Accum(acc), Source::Scalar(1.0)]);
        b.mark_output(a).unwrap();
        let out = dispatch_scan_processing(&rt, &b.build().unwrap(), rect).unwrap();
        assert_eq!(out[0].row(0).unwrap(), &[3.25, 3.25]);
    }

    #[test]
    fn short_input_is_a_bounds_error() {
        let rt = Runtime::with_workers(0).unwrap();
        let src = ramp(&rt, Rect::with_size(4, 4).unwrap());
        let mut b = Subgroup::builder();
        let a = b.add_kernel(Box::new(Add), vec![Source::Plane(src), Source::Scalar(0.0)]);
        b.mark_output(a).unwrap();
        let err = dispatch_scan_processing(&rt, &b.build().unwrap(), Rect::with_size(5, 4).unwrap())
            .unwrap_err();
        assert!(matches!(err, ScanError::Bounds { ref member, .. } if member == "add"));
    }

    #[test]
    fn kernel_error_names_the_member_and_stops_the_range() {
        let rt = Runtime::with_workers(0).unwrap();
        let mut b = Subgroup::builder();
        let a = b.add_kernel(Box::new(Fails(AtomicUsize::new(0))), vec![]);
        b.mark_output(a).unwrap();
        let g = b.build().unwrap();
        let err = dispatch_scan_processing(&rt, &g, Rect::with_size(2, 6).unwrap()).unwrap_err();
        assert_eq!(
            err,
            ScanError::Kernel {
                member: "fails".into(),
                reason: "row 2 is cursed".into()
            }
        );
    }

    #[test]
    fn unbound_member_is_rejected_before_running() {
        let rt = Runtime::with_workers(0).unwrap();
        let mut b = Subgroup::builder();
        let a = b.add("later", vec![]);
        b.mark_output(a).unwrap();
        let err =
            dispatch_scan_processing(&rt, &b.build().unwrap(), Rect::with_size(1, 1).unwrap())
                .unwrap_err();
        assert!(matches!(err, ScanError::Subgroup { .. }));
    }

    #[test]
    fn source_plane_is_never_written() {
        let rt = Runtime::with_workers(2).unwrap();
        let rect = Rect::with_size(8, 8).unwrap();
        let src = ramp(&rt, rect);
        let before = src.content_hash().unwrap();
        let mut b = Subgroup::builder();
        let a = b.add_kernel(Box::new(Add), vec![Source::Plane(src.clone()), Source::Scalar(3.0)]);
        b.mark_output(a).unwrap();
        dispatch_scan_processing(&rt, &b.build().unwrap(), rect).unwrap();
        assert_eq!(src.content_hash().unwrap(), before);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn every_output_pixel_is_written_for_any_split(
                x1 in -20i32..20,
                y1 in -20i32..20,
                w in 1usize..40,
                h in 1usize..40,
                workers in 0usize..4,
            ) {
                let rt = Runtime::with_workers(workers).unwrap();
                let dims = Rect::new(x1, y1, x1 + w as i32 - 1, y1 + h as i32 - 1).unwrap();
                let mut b = Subgroup::builder();
                let a = b.add_kernel(Box::new(Columns), vec![]);
                let c = b.add_kernel(Box::new(Add), vec![Source::Member(a), Source::Scalar(0.5)]);
                b.mark_output(c).unwrap();
                let out = dispatch_scan_processing(&rt, &b.build().unwrap(), dims).unwrap();
                for y in dims.y1()..=dims.y2() {
                    for (i, v) in out[0].row(y).unwrap().iter().enumerate() {
                        prop_assert_eq!(*v, (x1 + i as i32) as f32 + 0.5);
                    }
                }
            }
        }
    }
}
