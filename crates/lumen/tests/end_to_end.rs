//! End-to-end: a horizontal gradient over a 64×4 plane, pulled lazily
//! through an operator graph and dispatched across the worker pool.

use lumen::prelude::*;
use lumen::pool::PoolKind;
use lumen_test_utils::{init_tracing, reference_graph, rows_of};

const RECT: (usize, usize) = (64, 4);

fn rect() -> Rect {
    Rect::with_size(RECT.0, RECT.1).unwrap()
}

fn gradient_of(workers: usize, source_op: &str, value: f64) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    let graph = reference_graph(Runtime::with_workers(workers).unwrap());
    let src = graph.plane(source_op, rect(), vec![], vec![value]);
    let src_rows = rows_of(&src);
    let grad = graph.plane("gradient_x", rect(), vec![src.into()], vec![]);
    assert!(!grad.is_materialized());
    let out = rows_of(&grad);
    assert!(grad.is_materialized());
    rows_of(&grad);
    assert_eq!(graph.pulls(source_op), 1);
    assert_eq!(graph.pulls("gradient_x"), 1);
    (src_rows, out)
}

fn check_gradient(src: &[Vec<f32>], out: &[Vec<f32>]) {
    assert_eq!(out.len(), RECT.1);
    for (s, o) in src.iter().zip(out) {
        assert_eq!(o.len(), RECT.0);
        assert_eq!(o[0], 0.0);
        assert_eq!(o[RECT.0 - 1], 0.0);
        for x in 1..RECT.0 - 1 {
            assert_eq!(o[x], (s[x + 1] - s[x - 1]) / 2.0, "column {x}");
        }
    }
}

#[test]
fn gradient_of_constant_is_zero() {
    init_tracing();
    let (src, out) = gradient_of(4, "constant", 7.25);
    check_gradient(&src, &out);
    assert!(out.iter().flatten().all(|&v| v == 0.0));
}

#[test]
fn gradient_of_ramp_matches_central_difference() {
    let (src, out) = gradient_of(4, "ramp_x", 0.75);
    check_gradient(&src, &out);
    assert_eq!(out[2][10], 0.75);
}

/// The caller runs chunks too, so `workers` background threads means
/// `workers + 1` threads in total.
#[test]
fn one_and_four_threads_are_bit_identical() {
    for op in ["constant", "ramp_x"] {
        let (_, single) = gradient_of(0, op, 1.3);
        let (_, multi) = gradient_of(3, op, 1.3);
        let bits = |rows: &[Vec<f32>]| -> Vec<u32> { rows.iter().flatten().map(|v| v.to_bits()).collect() };
        assert_eq!(bits(&single), bits(&multi), "{op}");
    }
}

#[test]
fn buffers_return_to_the_stash_when_planes_drop() {
    let graph = reference_graph(Runtime::with_workers(4).unwrap());
    {
        let src = graph.plane("ramp_x", rect(), vec![], vec![1.0]);
        let grad = graph.plane("gradient_x", rect(), vec![src.into()], vec![]);
        grad.data().unwrap();
        let live = graph.runtime().pool().report();
        assert_eq!(live.get(PoolKind::Rect).live_count, 2);
    }
    let report = graph.runtime().pool().report();
    assert_eq!(report.total_live_bytes(), 0);
    assert!(report.get(PoolKind::Rect).stashed_count >= 2);
}
