use itertools::Itertools;
use ndarray::ArrayView2;
use ordered_float::OrderedFloat;
use statrs::statistics::{Data, Median};

/// Median of a slice of values, NaN for an empty slice.
///
/// For an even number of values the two central values are averaged.
pub fn median(values: &[f64]) -> f64 {
    Data::new(values.to_vec()).median()
}

/// Column index of the first maximum in every row of a grid.
pub fn argmax_rows(values: &ArrayView2<f64>) -> Vec<usize> {
    values
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_value = f64::NEG_INFINITY;
            for (i, &v) in row.iter().enumerate() {
                if v > best_value {
                    best_value = v;
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// Index of the axis point closest to `value`.
pub fn nearest_index(axis: &[f64], value: f64) -> usize {
    axis.iter()
        .position_min_by_key(|&&x| OrderedFloat((x - value).abs()))
        .unwrap_or(0)
}

/// Distinct values in ascending order.
pub fn unique_sorted<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .sorted()
        .dedup()
        .map(str::to_string)
        .collect()
}

/// Means of consecutive, non-overlapping groups of `n` values.
///
/// Trailing values that do not fill a whole group are ignored.
pub fn group_means(values: &[f64], n: usize) -> Vec<f64> {
    values
        .chunks_exact(n)
        .map(|chunk| chunk.iter().sum::<f64>() / n as f64)
        .collect()
}
