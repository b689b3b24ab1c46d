//! Drift time alignment relative to the reactant ion peak (RIP).

use log::{debug, info};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::algorithm::interpolation::CubicSpline;
use crate::algorithm::vec_utils::{argmax_rows, median};
use crate::data::spectrum::{Spectrum, DRIFT_TIME_RIP_RELATIVE_LABEL};
use crate::error::{DatasetError, Result};

/// Column index of the RIP: the median over all rows of the per row maximum,
/// truncated to an integer index.
pub fn rip_index(spectrum: &Spectrum) -> Result<usize> {
    if spectrum.values.is_empty() {
        return Err(DatasetError::Empty);
    }
    let maxima: Vec<f64> = argmax_rows(&spectrum.values.view())
        .into_iter()
        .map(|i| i as f64)
        .collect();
    Ok(median(&maxima) as usize)
}

/// Drift time axis divided by the drift time of the RIP, so that the RIP
/// lands on 1.0.
pub fn rip_relative_axis(spectrum: &Spectrum) -> Result<Vec<f64>> {
    let rip = rip_index(spectrum)?;
    let rip_dt = spectrum.drift_time[rip];
    if !(rip_dt.is_finite() && rip_dt > 0.0) {
        return Err(DatasetError::InvalidArgument(format!(
            "RIP drift time of '{}' must be positive, found {}",
            spectrum.name, rip_dt
        )));
    }
    Ok(spectrum.drift_time.iter().map(|&dt| dt / rip_dt).collect())
}

/// Common evenly spaced axis covered by every input axis.
///
/// Starts at the largest first value, stops before the smallest last value and
/// uses the median of `(last - first) / len` as step.
pub fn common_axis(axes: &[Vec<f64>]) -> Result<Vec<f64>> {
    if axes.is_empty() || axes.iter().any(|a| a.is_empty()) {
        return Err(DatasetError::Empty);
    }

    let start = axes.iter().map(|a| a[0]).fold(f64::NEG_INFINITY, f64::max);
    let end = axes.iter().map(|a| a[a.len() - 1]).fold(f64::INFINITY, f64::min);
    if !(start < end) {
        return Err(DatasetError::DegenerateRange { start, end });
    }

    let steps: Vec<f64> = axes
        .iter()
        .map(|a| (a[a.len() - 1] - a[0]) / a.len() as f64)
        .collect();
    let step = median(&steps);
    if !(step > 0.0) {
        return Err(DatasetError::InvalidArgument(format!(
            "drift time step must be positive, found {}",
            step
        )));
    }

    let n = ((end - start) / step).ceil() as usize;
    Ok((0..n)
        .map(|i| start + i as f64 * step)
        .take_while(|&v| v < end)
        .collect())
}

/// Interpolates all spectra onto one common RIP relative drift time axis.
///
/// Every row is interpolated with a not-a-knot cubic spline over the RIP
/// relative axis of its own spectrum. Coordinates outside a spectrum's domain
/// are an error, they are never extrapolated or clamped.
pub fn interp_riprel(spectra: &mut [Spectrum]) -> Result<()> {
    let axes: Vec<Vec<f64>> = spectra
        .iter()
        .map(rip_relative_axis)
        .collect::<Result<_>>()?;

    let new_dt = common_axis(&axes)?;
    info!(
        "aligning {} spectra onto {} RIP relative drift time points [{:.4}, {:.4}]",
        spectra.len(),
        new_dt.len(),
        new_dt[0],
        new_dt[new_dt.len() - 1]
    );

    spectra
        .par_iter_mut()
        .zip(axes.into_par_iter())
        .try_for_each(|(spectrum, axis)| -> Result<()> {
            let spline = CubicSpline::new(axis)?;
            if let Some(x) = spline.first_outside(&new_dt) {
                let (lo, hi) = spline.domain();
                return Err(DatasetError::OutOfDomain { name: spectrum.name.clone(), x, lo, hi });
            }

            let rows = spectrum.values.nrows();
            let mut values = Array2::zeros((rows, new_dt.len()));
            for (i, row) in spectrum.values.rows().into_iter().enumerate() {
                let y = row.to_vec();
                let interpolated = spline.interpolate(&y, &new_dt);
                values.row_mut(i).assign(&Array1::from(interpolated));
            }

            debug!("interpolated {} onto RIP relative axis", spectrum.name);
            spectrum.values = values;
            spectrum.drift_time = Array1::from(new_dt.clone());
            spectrum.drift_time_label = DRIFT_TIME_RIP_RELATIVE_LABEL.to_string();
            Ok(())
        })
}
