//! Grid level processing shared by the spectrum transforms.
//!
//! All functions take a retention time x drift time grid and return a new grid.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Reflect boundary helper: maps idx back into valid [0, len)
/// reflecting around the edges like ... 1 0 | 0 1 2 3 | 3 2 ...
#[inline(always)]
fn reflect_index(idx: isize, len: usize) -> usize {
    let len_i = len as isize;
    if len == 0 { return 0; }
    let mut x = idx;
    if x < 0 || x >= len_i {
        x = x.rem_euclid(2 * len_i);
        if x >= len_i { x = 2 * len_i - 1 - x; }
    }
    x as usize
}

#[derive(Clone, Copy)]
enum Extremum {
    Min,
    Max,
}

/// Sliding window minimum or maximum along one lane.
///
/// The window for output `i` spans `i + lo ..= i + hi`.
fn filter_lane(lane: ArrayView1<f64>, lo: isize, hi: isize, kind: Extremum) -> Vec<f64> {
    let n = lane.len();
    (0..n)
        .map(|i| {
            let mut acc = match kind {
                Extremum::Min => f64::INFINITY,
                Extremum::Max => f64::NEG_INFINITY,
            };
            for k in lo..=hi {
                let v = lane[reflect_index(i as isize + k, n)];
                acc = match kind {
                    Extremum::Min => acc.min(v),
                    Extremum::Max => acc.max(v),
                };
            }
            acc
        })
        .collect()
}

/// Flat square morphology, applied separably along both axes.
fn square_filter(values: &ArrayView2<f64>, size: usize, kind: Extremum) -> Array2<f64> {
    let half = (size / 2) as isize;
    let size = size as isize;
    // dilation uses the mirrored window so that opening stays anti-extensive for even sizes
    let (lo, hi) = match kind {
        Extremum::Min => (-half, size - 1 - half),
        Extremum::Max => (half - size + 1, half),
    };

    let mut out = values.to_owned();
    for axis in [Axis(1), Axis(0)] {
        let source = out.clone();
        for (mut target, lane) in out.lanes_mut(axis).into_iter().zip(source.lanes(axis)) {
            let filtered = filter_lane(lane, lo, hi, kind);
            for (t, v) in target.iter_mut().zip(filtered) {
                *t = v;
            }
        }
    }
    out
}

/// Grey erosion with a flat `size x size` square.
pub fn grey_erosion(values: &ArrayView2<f64>, size: usize) -> Array2<f64> {
    square_filter(values, size, Extremum::Min)
}

/// Grey dilation with a flat `size x size` square.
pub fn grey_dilation(values: &ArrayView2<f64>, size: usize) -> Array2<f64> {
    square_filter(values, size, Extremum::Max)
}

/// White tophat: the grid minus its grey opening.
///
/// Removes background structures larger than the structuring element while
/// keeping narrow peaks.
pub fn white_tophat(values: &ArrayView2<f64>, size: usize) -> Array2<f64> {
    let eroded = grey_erosion(values, size);
    let opened = grey_dilation(&eroded.view(), size);
    values - &opened
}

/// Means over consecutive groups of `n` rows, trailing rows that do not fill
/// a group are dropped.
pub fn row_group_mean(values: &ArrayView2<f64>, n: usize) -> Array2<f64> {
    let (rows, cols) = values.dim();
    let groups = rows / n;
    Array2::from_shape_fn((groups, cols), |(g, j)| {
        values.slice(ndarray::s![g * n..(g + 1) * n, j]).sum() / n as f64
    })
}

/// Means over `n x n` blocks after truncating both dimensions to multiples of `n`.
pub fn block_mean(values: &ArrayView2<f64>, n: usize) -> Array2<f64> {
    let (rows, cols) = values.dim();
    let (r, c) = (rows / n, cols / n);
    let area = (n * n) as f64;
    Array2::from_shape_fn((r, c), |(i, j)| {
        values
            .slice(ndarray::s![i * n..(i + 1) * n, j * n..(j + 1) * n])
            .sum()
            / area
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        assert_eq!(reflect_index(2, 4), 2);
    }

    #[test]
    fn test_erosion_and_dilation() {
        let grid = array![[0.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 0.0]];
        let eroded = grey_erosion(&grid.view(), 3);
        assert!(eroded.iter().all(|&v| v == 0.0));
        let dilated = grey_dilation(&grid.view(), 3);
        assert!(dilated.iter().all(|&v| v == 5.0));
    }

    #[test]
    fn test_tophat_removes_flat_baseline() {
        // constant baseline of 10 with a single narrow peak
        let mut grid = Array2::from_elem((7, 7), 10.0);
        grid[[3, 3]] = 25.0;
        let filtered = white_tophat(&grid.view(), 3);
        assert!((filtered[[3, 3]] - 15.0).abs() < 1e-12);
        assert!((filtered[[0, 0]]).abs() < 1e-12);
        assert!(filtered.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_tophat_even_size_is_non_negative() {
        let grid = Array2::from_shape_fn((6, 5), |(i, j)| ((i * 3 + j * 7) % 5) as f64);
        let filtered = white_tophat(&grid.view(), 2);
        assert!(filtered.iter().all(|&v| v >= -1e-12));
    }

    #[test]
    fn test_row_group_mean() {
        let grid = array![[1.0, 1.0], [3.0, 5.0], [10.0, 10.0]];
        assert_eq!(row_group_mean(&grid.view(), 2), array![[2.0, 3.0]]);
    }

    #[test]
    fn test_block_mean() {
        let grid = array![[1.0, 2.0, 9.0], [3.0, 4.0, 9.0], [9.0, 9.0, 9.0]];
        assert_eq!(block_mean(&grid.view(), 2), array![[2.5]]);
    }
}
