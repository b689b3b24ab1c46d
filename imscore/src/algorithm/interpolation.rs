//! Cubic spline interpolation along a shared axis.
//!
//! A GC-IMS grid is interpolated row by row over the same drift time axis, so
//! the tridiagonal system of the spline is factorized once per axis and only
//! the right hand side is swept per row.

use crate::error::{DatasetError, Result};

/// Not-a-knot cubic spline basis over a strictly increasing axis.
///
/// The third derivative is continuous across the second and the second to
/// last knot. With three knots the spline degenerates to the interpolating
/// parabola, with two knots to the line through both points.
#[derive(Clone, Debug)]
pub struct CubicSpline {
    x: Vec<f64>,
    h: Vec<f64>,
    // Thomas factorization of the reduced system over the interior knots.
    sub: Vec<f64>,
    upper: Vec<f64>,
    denom: Vec<f64>,
}

impl CubicSpline {
    /// Builds the spline basis for the knots `x`.
    ///
    /// # Arguments
    ///
    /// * `x` - Knot positions, strictly increasing, at least two of them.
    ///
    /// # Example
    ///
    /// ```
    /// use imscore::algorithm::interpolation::CubicSpline;
    ///
    /// let spline = CubicSpline::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
    /// let y = vec![0.0, 1.0, 8.0, 27.0];
    /// let v = spline.interpolate(&y, &[1.5]);
    /// assert!((v[0] - 3.375).abs() < 1e-9);
    /// ```
    pub fn new(x: Vec<f64>) -> Result<Self> {
        if x.len() < 2 {
            return Err(DatasetError::InvalidArgument(format!(
                "cubic interpolation needs at least 2 knots, got {}",
                x.len()
            )));
        }

        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        if h.iter().any(|&step| !(step > 0.0)) {
            return Err(DatasetError::InvalidArgument(
                "interpolation axis must be strictly increasing".to_string(),
            ));
        }

        let n = x.len();
        let mut spline = CubicSpline { x, h, sub: Vec::new(), upper: Vec::new(), denom: Vec::new() };
        if n >= 4 {
            spline.factorize();
        }
        Ok(spline)
    }

    fn factorize(&mut self) {
        let h = &self.h;
        let n = self.x.len();
        let k = n - 2;

        let mut lower = Vec::with_capacity(k);
        let mut diag = Vec::with_capacity(k);
        let mut upper = Vec::with_capacity(k);
        for i in 1..=k {
            lower.push(h[i - 1]);
            diag.push(2.0 * (h[i - 1] + h[i]));
            upper.push(h[i]);
        }

        // eliminate M[0] using the left not-a-knot condition
        diag[0] += h[0] * (h[0] + h[1]) / h[1];
        upper[0] -= h[0] * h[0] / h[1];

        // eliminate M[n-1] using the right not-a-knot condition
        let (p, q) = (n - 3, n - 2);
        diag[k - 1] += h[q] * (h[p] + h[q]) / h[p];
        lower[k - 1] -= h[q] * h[q] / h[p];

        let mut c_prime = vec![0.0; k];
        let mut denom = vec![0.0; k];
        denom[0] = diag[0];
        c_prime[0] = upper[0] / denom[0];
        for i in 1..k {
            denom[i] = diag[i] - lower[i] * c_prime[i - 1];
            c_prime[i] = upper[i] / denom[i];
        }

        self.sub = lower;
        self.upper = c_prime;
        self.denom = denom;
    }

    /// First and last knot.
    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// First coordinate in `xi` outside the knot range, if any.
    pub fn first_outside(&self, xi: &[f64]) -> Option<f64> {
        let (lo, hi) = self.domain();
        xi.iter().copied().find(|&v| !(v >= lo && v <= hi))
    }

    /// Second derivatives of the spline through `y` at every knot.
    pub fn second_derivatives(&self, y: &[f64]) -> Vec<f64> {
        let n = self.x.len();
        let h = &self.h;

        match n {
            2 => vec![0.0; 2],
            3 => {
                let curvature = 2.0 * ((y[2] - y[1]) / h[1] - (y[1] - y[0]) / h[0]) / (h[0] + h[1]);
                vec![curvature; 3]
            }
            _ => {
                let k = n - 2;
                let slopes: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

                let mut d = vec![0.0; k];
                d[0] = 6.0 * (slopes[1] - slopes[0]) / self.denom[0];
                for i in 1..k {
                    let rhs = 6.0 * (slopes[i + 1] - slopes[i]);
                    d[i] = (rhs - self.sub[i] * d[i - 1]) / self.denom[i];
                }
                for i in (0..k - 1).rev() {
                    d[i] -= self.upper[i] * d[i + 1];
                }

                let mut m = Vec::with_capacity(n);
                m.push(((h[0] + h[1]) * d[0] - h[0] * d[1]) / h[1]);
                m.extend_from_slice(&d);
                let (p, q) = (n - 3, n - 2);
                m.push(((h[p] + h[q]) * d[k - 1] - h[q] * d[k - 2]) / h[p]);
                m
            }
        }
    }

    /// Evaluates the spline through `y` at the coordinates `xi`.
    ///
    /// Coordinates must lie inside [`CubicSpline::domain`], check with
    /// [`CubicSpline::first_outside`] beforehand.
    pub fn interpolate(&self, y: &[f64], xi: &[f64]) -> Vec<f64> {
        let m = self.second_derivatives(y);
        let last = self.x.len() - 2;

        xi.iter()
            .map(|&v| {
                let i = self.x.partition_point(|&knot| knot <= v).saturating_sub(1).min(last);
                let h = self.h[i];
                let a = (self.x[i + 1] - v) / h;
                let b = (v - self.x[i]) / h;
                a * y[i] + b * y[i + 1] + ((a * a * a - a) * m[i] + (b * b * b - b) * m[i + 1]) * h * h / 6.0
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reproduces_cubic_on_uneven_grid() {
        let x = vec![0.0, 0.4, 1.1, 1.5, 2.3, 3.0];
        let f = |v: f64| v * v * v - 2.0 * v + 1.0;
        let y: Vec<f64> = x.iter().map(|&v| f(v)).collect();

        let spline = CubicSpline::new(x).unwrap();
        let xi = [0.0, 0.2, 0.75, 1.9, 2.9, 3.0];
        for (v, s) in xi.iter().zip(spline.interpolate(&y, &xi)) {
            assert!((f(*v) - s).abs() < 1e-9, "at {}: {} vs {}", v, f(*v), s);
        }
    }

    #[test]
    fn test_passes_through_knots() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = vec![0.3, -1.0, 2.5, 0.0, 4.0];
        let spline = CubicSpline::new(x.clone()).unwrap();
        for (a, b) in y.iter().zip(spline.interpolate(&y, &x)) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_three_knots_is_parabola() {
        let x = vec![0.0, 1.0, 3.0];
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        let spline = CubicSpline::new(x).unwrap();
        let v = spline.interpolate(&y, &[2.0]);
        assert!((v[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_knots_is_linear() {
        let spline = CubicSpline::new(vec![0.0, 2.0]).unwrap();
        let v = spline.interpolate(&[1.0, 3.0], &[0.5]);
        assert!((v[0] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_axes() {
        assert!(CubicSpline::new(vec![1.0]).is_err());
        assert!(CubicSpline::new(vec![0.0, 1.0, 1.0, 2.0]).is_err());
        assert!(CubicSpline::new(vec![0.0, 2.0, 1.0]).is_err());
    }

    #[test]
    fn test_first_outside() {
        let spline = CubicSpline::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(spline.first_outside(&[0.0, 1.5, 3.0]), None);
        assert_eq!(spline.first_outside(&[0.5, 3.2]), Some(3.2));
    }
}
