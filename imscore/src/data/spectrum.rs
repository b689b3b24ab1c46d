use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Div};

use bincode::{Decode, Encode};
use bincode::error::DecodeError;
use ndarray::{s, Array1, Array2};

use crate::algorithm::vec_utils::{group_means, nearest_index};
use crate::data::processing::{block_mean, row_group_mean, white_tophat};
use crate::error::{DatasetError, Result};

pub const DRIFT_TIME_LABEL: &str = "Drift Time [ms]";
pub const DRIFT_TIME_RIP_RELATIVE_LABEL: &str = "Drift Time RIP relative";

/// Represents a single GC-IMS measurement.
///
/// # Description
///
/// Intensities are stored as a dense grid where rows follow the retention
/// time axis and columns follow the drift time axis.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrum {
    pub name: String,
    pub values: Array2<f64>,
    pub ret_time: Array1<f64>,
    pub drift_time: Array1<f64>,
    pub drift_time_label: String,
}

impl Spectrum {
    /// Constructs a new `Spectrum`.
    ///
    /// # Arguments
    ///
    /// * `name` - Display name, usually the file stem of the measurement.
    /// * `values` - Intensity grid, retention time x drift time.
    /// * `ret_time` - Retention time axis, one value per row.
    /// * `drift_time` - Drift time axis, one value per column.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use imscore::data::spectrum::Spectrum;
    /// # use ndarray::{array, Array1};
    /// let spectrum = Spectrum::new(
    ///     "run_01",
    ///     array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
    ///     Array1::from(vec![0.0, 1.0]),
    ///     Array1::from(vec![0.0, 0.1, 0.2]),
    /// ).unwrap();
    /// assert_eq!(spectrum.shape(), (2, 3));
    /// ```
    pub fn new(
        name: impl Into<String>,
        values: Array2<f64>,
        ret_time: Array1<f64>,
        drift_time: Array1<f64>,
    ) -> Result<Self> {
        let name = name.into();
        let (rows, cols) = values.dim();
        if ret_time.len() != rows || drift_time.len() != cols {
            return Err(DatasetError::ShapeMismatch {
                name,
                expected: (rows, cols),
                found: (ret_time.len(), drift_time.len()),
            });
        }
        Ok(Spectrum {
            name,
            values,
            ret_time,
            drift_time,
            drift_time_label: DRIFT_TIME_LABEL.to_string(),
        })
    }

    /// (retention time points, drift time points)
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Applies a white tophat filter as baseline correction.
    ///
    /// # Arguments
    ///
    /// * `size` - Edge length of the square structuring element. Larger is slower.
    pub fn tophat(&mut self, size: usize) -> Result<&mut Self> {
        if size == 0 {
            return Err(DatasetError::InvalidArgument("tophat size must be at least 1".to_string()));
        }
        self.values = white_tophat(&self.values.view(), size);
        Ok(self)
    }

    /// Subtracts the first row from every row, negative results are set to zero.
    pub fn sub_first_row(&mut self) -> &mut Self {
        if self.values.nrows() == 0 {
            return self;
        }
        let first = self.values.row(0).to_owned();
        self.values -= &first;
        self.values.mapv_inplace(|v| v.max(0.0));
        self
    }

    /// Scales all intensities relative to the global maximum.
    ///
    /// A grid without a positive finite maximum is left untouched.
    pub fn rip_scaling(&mut self) -> &mut Self {
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max.is_finite() && max > 0.0 {
            self.values.mapv_inplace(|v| v / max);
        }
        self
    }

    /// Averages every `n` consecutive retention time rows.
    ///
    /// The number of rows must be divisible by `n`.
    pub fn resample(&mut self, n: usize) -> Result<&mut Self> {
        if n == 0 {
            return Err(DatasetError::InvalidArgument("resample factor must be at least 1".to_string()));
        }
        let rows = self.values.nrows();
        if rows % n != 0 {
            return Err(DatasetError::NotDivisible { len: rows, factor: n });
        }
        self.values = row_group_mean(&self.values.view(), n);
        self.ret_time = Array1::from(group_means(&self.ret_time.to_vec(), n));
        Ok(self)
    }

    /// Downsamples by averaging `n x n` blocks.
    ///
    /// A dimension that is not divisible by `n` is shortened by the remainder
    /// at its long end before binning.
    pub fn binning(&mut self, n: usize) -> Result<&mut Self> {
        if n == 0 {
            return Err(DatasetError::InvalidArgument("binning factor must be at least 1".to_string()));
        }
        let (rows, cols) = self.shape();
        if rows < n || cols < n {
            return Err(DatasetError::InvalidArgument(format!(
                "binning factor {} exceeds grid shape {:?} of '{}'",
                n, (rows, cols), self.name
            )));
        }
        self.values = block_mean(&self.values.view(), n);
        self.ret_time = Array1::from(group_means(&self.ret_time.to_vec(), n));
        self.drift_time = Array1::from(group_means(&self.drift_time.to_vec(), n));
        Ok(self)
    }

    /// Cuts the drift time axis to the points between `start` and `stop`.
    ///
    /// Coordinates are axis values, not indices; the nearest axis points are
    /// used and the stop point is excluded.
    pub fn cut_dt(&mut self, start: f64, stop: f64) -> Result<&mut Self> {
        let axis = self.drift_time.to_vec();
        let (lo, hi) = cut_bounds(&axis, start, stop)?;
        self.values = self.values.slice(s![.., lo..hi]).to_owned();
        self.drift_time = self.drift_time.slice(s![lo..hi]).to_owned();
        Ok(self)
    }

    /// Cuts the retention time axis to the points between `start` and `stop`.
    pub fn cut_rt(&mut self, start: f64, stop: f64) -> Result<&mut Self> {
        let axis = self.ret_time.to_vec();
        let (lo, hi) = cut_bounds(&axis, start, stop)?;
        self.values = self.values.slice(s![lo..hi, ..]).to_owned();
        self.ret_time = self.ret_time.slice(s![lo..hi]).to_owned();
        Ok(self)
    }
}

fn cut_bounds(axis: &[f64], start: f64, stop: f64) -> Result<(usize, usize)> {
    if axis.is_empty() {
        return Err(DatasetError::Empty);
    }
    let lo = nearest_index(axis, start);
    let hi = nearest_index(axis, stop);
    if lo >= hi {
        return Err(DatasetError::DegenerateRange { start, end: stop });
    }
    Ok((lo, hi))
}

impl Display for Spectrum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (rows, cols) = self.shape();
        write!(f, "Spectrum({}, retention time points: {}, drift time points: {})", self.name, rows, cols)
    }
}

impl Add<&Spectrum> for Spectrum {
    type Output = Spectrum;
    /// Sums intensities elementwise, keeping the axes and name of `self`.
    ///
    /// # Panics
    ///
    /// Panics if the grid shapes differ.
    fn add(mut self, other: &Spectrum) -> Spectrum {
        self.values += &other.values;
        self
    }
}

impl Div<f64> for Spectrum {
    type Output = Spectrum;
    fn div(mut self, divisor: f64) -> Spectrum {
        self.values.mapv_inplace(|v| v / divisor);
        self
    }
}

// Manual bincode implementation, ndarray containers are encoded as shape plus flat data
impl Encode for Spectrum {
    fn encode<E: bincode::enc::Encoder>(&self, encoder: &mut E) -> std::result::Result<(), bincode::error::EncodeError> {
        let (rows, cols) = self.shape();
        bincode::Encode::encode(&self.name, encoder)?;
        bincode::Encode::encode(&(rows as u64), encoder)?;
        bincode::Encode::encode(&(cols as u64), encoder)?;
        bincode::Encode::encode(&self.values.iter().copied().collect::<Vec<f64>>(), encoder)?;
        bincode::Encode::encode(&self.ret_time.to_vec(), encoder)?;
        bincode::Encode::encode(&self.drift_time.to_vec(), encoder)?;
        bincode::Encode::encode(&self.drift_time_label, encoder)?;
        Ok(())
    }
}

impl<Context> Decode<Context> for Spectrum {
    fn decode<D: bincode::de::Decoder<Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        let name: String = bincode::Decode::decode(decoder)?;
        let rows: u64 = bincode::Decode::decode(decoder)?;
        let cols: u64 = bincode::Decode::decode(decoder)?;
        let values: Vec<f64> = bincode::Decode::decode(decoder)?;
        let ret_time: Vec<f64> = bincode::Decode::decode(decoder)?;
        let drift_time: Vec<f64> = bincode::Decode::decode(decoder)?;
        let drift_time_label: String = bincode::Decode::decode(decoder)?;

        let values = Array2::from_shape_vec((rows as usize, cols as usize), values)
            .map_err(|e| DecodeError::OtherString(format!("invalid grid for '{}': {}", name, e)))?;
        let mut spectrum = Spectrum::new(name, values, Array1::from(ret_time), Array1::from(drift_time))
            .map_err(|e| DecodeError::OtherString(e.to_string()))?;
        spectrum.drift_time_label = drift_time_label;
        Ok(spectrum)
    }
}

impl<'de, Context> bincode::BorrowDecode<'de, Context> for Spectrum {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        <Spectrum as Decode<Context>>::decode(decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn spectrum(values: Array2<f64>) -> Spectrum {
        let (rows, cols) = values.dim();
        let ret_time = Array1::from_iter((0..rows).map(|i| i as f64));
        let drift_time = Array1::from_iter((0..cols).map(|j| j as f64 * 0.5));
        Spectrum::new("test", values, ret_time, drift_time).unwrap()
    }

    #[test]
    fn test_new_rejects_axis_mismatch() {
        let result = Spectrum::new(
            "bad",
            Array2::zeros((3, 4)),
            Array1::zeros(3),
            Array1::zeros(5),
        );
        assert!(matches!(result, Err(DatasetError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_sub_first_row_clips_negatives() {
        let mut s = spectrum(array![[1.0, 2.0], [3.0, 1.0], [0.5, 5.0]]);
        s.sub_first_row();
        assert_eq!(s.values, array![[0.0, 0.0], [2.0, 0.0], [0.0, 3.0]]);
    }

    #[test]
    fn test_rip_scaling_divides_by_global_max() {
        let mut s = spectrum(array![[1.0, 2.0], [4.0, 8.0]]);
        s.rip_scaling();
        assert_eq!(s.values, array![[0.125, 0.25], [0.5, 1.0]]);
    }

    #[test]
    fn test_resample_requires_divisible_rows() {
        let mut s = spectrum(Array2::ones((5, 2)));
        assert!(matches!(s.resample(2), Err(DatasetError::NotDivisible { len: 5, factor: 2 })));
    }

    #[test]
    fn test_resample_averages_rows() {
        let mut s = spectrum(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]]);
        s.resample(2).unwrap();
        assert_eq!(s.values, array![[2.0, 3.0], [6.0, 7.0]]);
        assert_eq!(s.ret_time.to_vec(), vec![0.5, 2.5]);
    }

    #[test]
    fn test_binning_truncates_remainder() {
        let mut s = spectrum(Array2::from_shape_fn((5, 7), |(i, j)| (i * 7 + j) as f64));
        s.binning(2).unwrap();
        assert_eq!(s.shape(), (2, 3));
        assert_eq!(s.ret_time.len(), 2);
        assert_eq!(s.drift_time.len(), 3);
        // block rows 0-1, cols 0-1: 0, 1, 7, 8
        assert!((s.values[[0, 0]] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_cut_dt_uses_nearest_points() {
        let mut s = spectrum(Array2::from_shape_fn((2, 6), |(_, j)| j as f64));
        // drift axis 0.0 .. 2.5 step 0.5
        s.cut_dt(0.4, 1.6).unwrap();
        assert_eq!(s.drift_time.to_vec(), vec![0.5, 1.0]);
        assert_eq!(s.values.row(0).to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_cut_rt_rejects_empty_range() {
        let mut s = spectrum(Array2::ones((4, 2)));
        assert!(s.cut_rt(3.0, 1.0).is_err());
    }

    #[test]
    fn test_add_and_divide() {
        let a = spectrum(array![[1.0, 2.0]]);
        let b = spectrum(array![[3.0, 6.0]]);
        let mean = (a + &b) / 2.0;
        assert_eq!(mean.values, array![[2.0, 4.0]]);
    }

    #[test]
    fn test_bincode_roundtrip_keeps_axis_label() {
        let mut s = spectrum(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        s.drift_time_label = DRIFT_TIME_RIP_RELATIVE_LABEL.to_string();
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(&s, config).unwrap();
        let (decoded, _): (Spectrum, usize) = bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(decoded, s);
    }
}
