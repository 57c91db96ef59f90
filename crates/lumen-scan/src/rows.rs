//! One-pass threaded evaluation: a row closure over a fresh grid.

use std::sync::{Mutex, OnceLock, PoisonError};

use lumen_core::Rect;
use lumen_plane::{GridData, GridElement};

use crate::dispatch::RowCell;
use crate::error::{KernelError, ScanError};
use crate::runtime::Runtime;

/// Allocate a grid over `rect` and fill it by calling `f(y, row)` once
/// per row, rows split across `runtime`'s worker pool.
///
/// `row` is `rect.width()` long and its initial contents are unspecified.
/// The first error stops further rows and is returned as
/// [`ScanError::Kernel`] under `name`.
pub fn dispatch_rows<T, F>(
    runtime: &Runtime,
    name: &str,
    rect: Rect,
    f: F,
) -> Result<GridData<T>, ScanError>
where
    T: GridElement,
    F: Fn(i32, &mut [T]) -> Result<(), KernelError> + Sync,
{
    let mut grid = GridData::<T>::allocate(runtime.pool(), rect)?;
    tracing::trace!(op = name, rect = %rect, kind = T::NAME, "row dispatch");
    {
        let rows: Vec<RowCell<'_, T>> = grid.rows_mut().map(|row| Mutex::new(Some(row))).collect();
        let failed = OnceLock::new();
        runtime.threads().dispatch(
            |_, start, end| {
                for i in start..end {
                    if failed.get().is_some() {
                        return;
                    }
                    let Some(row) = rows[i].lock().unwrap_or_else(PoisonError::into_inner).take()
                    else {
                        continue;
                    };
                    if let Err(e) = f(rect.y1() + i as i32, row) {
                        let _ = failed.set(ScanError::Kernel {
                            member: name.to_string(),
                            reason: e.reason,
                        });
                        return;
                    }
                }
            },
            0,
            rect.height(),
        )?;
        if let Some(e) = failed.into_inner() {
            return Err(e);
        }
    }
    Ok(grid)
}
