//! Integration test: materialization through the mock graph.

use lumen_core::Rect;
use lumen_scan::Runtime;
use lumen_test_utils::{init_tracing, plane_from_fn, reference_graph, rows_of};

#[test]
fn repeated_access_pulls_once_and_shares_the_buffer() {
    init_tracing();
    let graph = reference_graph(Runtime::with_workers(2).unwrap());
    let rect = Rect::with_size(10, 10).unwrap();
    let ramp = graph.plane("ramp_x", rect, vec![], vec![0.5]);
    let a = ramp.data().unwrap().as_ptr();
    let b = ramp.data().unwrap().as_ptr();
    assert_eq!(a, b);
    assert_eq!(graph.pulls("ramp_x"), 1);
    let copy = ramp.clone();
    assert_eq!(copy.data().unwrap().as_ptr(), a);
    assert_eq!(graph.pulls("ramp_x"), 1);
}

#[test]
fn unmaterialized_clones_pull_independently() {
    let graph = reference_graph(Runtime::with_workers(0).unwrap());
    let rect = Rect::with_size(3, 3).unwrap();
    let c = graph.plane("constant", rect, vec![], vec![2.0]);
    let d = c.clone();
    c.data().unwrap();
    d.data().unwrap();
    assert_eq!(graph.pulls("constant"), 2);
}

#[test]
fn deep_fused_chain_matches_direct_computation() {
    let graph = reference_graph(Runtime::with_workers(3).unwrap());
    let pool = graph.runtime().pool().clone();
    let rect = Rect::new(-4, -4, 27, 19).unwrap();
    let src = plane_from_fn(&pool, rect, |x, y| (x * x - y) as f32);
    let grad = graph.plane("gradient_x", rect, vec![src.clone().into()], vec![]);
    let doubled = graph.plane("scale", rect, vec![grad.into()], vec![2.0]);
    let shifted = graph.plane("add", rect, vec![doubled.into(), 1.0.into()], vec![]);
    let rows = rows_of(&shifted);
    for (dy, row) in rows.iter().enumerate() {
        let y = rect.y1() + dy as i32;
        let s = src.line(y).unwrap();
        for (i, v) in row.iter().enumerate() {
            let g = if i == 0 || i == row.len() - 1 {
                0.0
            } else {
                (s[i + 1] - s[i - 1]) / 2.0
            };
            assert_eq!(*v, g * 2.0 + 1.0, "({i}, {y})");
        }
    }
    assert_eq!(graph.pulls("add"), 1);
    assert_eq!(graph.pulls("gradient_x") + graph.pulls("scale"), 0);
}
