#![forbid(unsafe_code)]

//! Clear-range geometry.
//!
//! Erase commands are carried out with a single linear fill starting at the
//! first cell of the range. [`count_cells`] computes how many cells that
//! fill must cover for an inclusive `from..=to` range in a buffer of the
//! given size.

use crate::console::Coord;

/// Number of cells in the inclusive range `from..=to`, filled row-major.
///
/// Returns `0` (nothing to clear) when either coordinate is negative or
/// outside `size`, or when `from` lies on a later row than `to`.
#[must_use]
pub fn count_cells(from: Coord, to: Coord, size: Coord) -> u32 {
    let in_bounds = |c: Coord| c.x >= 0 && c.y >= 0 && c.x < size.x && c.y < size.y;
    if !in_bounds(from) || !in_bounds(to) || from.y > to.y {
        return 0;
    }

    // All values are non-negative and below `size` from here on.
    let width = i32::from(size.x);
    let (fx, fy, tx, ty) = (
        i32::from(from.x),
        i32::from(from.y),
        i32::from(to.x),
        i32::from(to.y),
    );

    let cells = if fy == ty {
        tx - fx + 1
    } else {
        // Tail of the first row, head of the last row, full rows between.
        (width - fx) + tx + 1 + width * (ty - fy - 1)
    };
    u32::try_from(cells).unwrap_or(0)
}
