//! Tiling a volume's slices into one 2-D canvas.

use ndarray::{Array2, Array3, Axis};

/// Mosaic layout in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
}

/// Grid for `n_slices` tiles. Without an explicit column count the grid is
/// as square as possible.
pub fn grid_shape(n_slices: usize, columns: Option<usize>) -> Grid {
    let cols = columns
        .filter(|&c| c > 0)
        .unwrap_or_else(|| (n_slices as f64).sqrt().ceil() as usize)
        .max(1);
    Grid {
        rows: n_slices.div_ceil(cols),
        cols,
    }
}

/// Tile the slices of `volume` row-major along its smallest axis.
///
/// Each tile is `len(b)` pixels high and `len(a)` wide, where `a < b` are
/// the two remaining axes; `b` runs bottom-up so images come out upright.
/// Unused grid cells stay at zero.
pub fn build_mosaic(volume: &Array3<f32>, columns: Option<usize>) -> Array2<f32> {
    let shape = volume.shape();
    let slice_axis = (0..3)
        .min_by_key(|&axis| shape[axis])
        .unwrap_or(2);
    let n_slices = shape[slice_axis];
    let grid = grid_shape(n_slices, columns);

    // Remaining axes keep their order once the slice axis is removed.
    let [a, b]: [usize; 2] = match slice_axis {
        0 => [1, 2],
        1 => [0, 2],
        _ => [0, 1],
    };
    let (width, height) = (shape[a], shape[b]);

    let mut mosaic = Array2::<f32>::zeros((grid.rows * height, grid.cols * width));
    for (index, slice) in volume.axis_iter(Axis(slice_axis)).enumerate() {
        let top = (index / grid.cols) * height;
        let left = (index % grid.cols) * width;
        for ((col, row), &value) in slice.indexed_iter() {
            mosaic[[top + height - 1 - row, left + col]] = value;
        }
    }
    mosaic
}
