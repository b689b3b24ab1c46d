use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// Feature weighting applied column wise to a flattened dataset matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMethod {
    /// 1 / standard deviation
    Auto,
    /// 1 / sqrt(standard deviation)
    #[default]
    Pareto,
    /// 1 / variance
    Var,
}

impl Display for ScalingMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScalingMethod::Auto => write!(f, "auto"),
            ScalingMethod::Pareto => write!(f, "pareto"),
            ScalingMethod::Var => write!(f, "var"),
        }
    }
}

impl FromStr for ScalingMethod {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ScalingMethod::Auto),
            "pareto" => Ok(ScalingMethod::Pareto),
            "var" => Ok(ScalingMethod::Var),
            other => Err(DatasetError::InvalidArgument(format!(
                "{} is not a supported scaling method",
                other
            ))),
        }
    }
}

/// One weight per column of `x` (spectra x features).
///
/// Population statistics are used. Columns without spread produce a
/// non-finite weight, which is replaced by 0 so the feature is suppressed.
pub fn scaling_weights(x: &Array2<f64>, method: ScalingMethod) -> Array1<f64> {
    let variance = x.var_axis(Axis(0), 0.0);
    let weights = match method {
        ScalingMethod::Auto => variance.mapv(|v| 1.0 / v.sqrt()),
        ScalingMethod::Pareto => variance.mapv(|v| 1.0 / v.sqrt().sqrt()),
        ScalingMethod::Var => variance.mapv(|v| 1.0 / v),
    };
    weights.mapv(|w| if w.is_finite() { w } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_zero_variance_column_gets_zero_weight() {
        let x = array![[1.0, 5.0], [3.0, 5.0], [5.0, 5.0]];
        for method in [ScalingMethod::Auto, ScalingMethod::Pareto, ScalingMethod::Var] {
            let w = scaling_weights(&x, method);
            assert_eq!(w[1], 0.0, "{}", method);
            assert!(w[0].is_finite() && w[0] > 0.0);
        }
    }

    #[test]
    fn test_weights_per_method() {
        // column variance 4, std 2
        let x = array![[0.0], [4.0]];
        assert!((scaling_weights(&x, ScalingMethod::Var)[0] - 0.25).abs() < 1e-12);
        assert!((scaling_weights(&x, ScalingMethod::Auto)[0] - 0.5).abs() < 1e-12);
        assert!((scaling_weights(&x, ScalingMethod::Pareto)[0] - 1.0 / 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_default_method_is_pareto() {
        assert_eq!(ScalingMethod::default(), ScalingMethod::Pareto);
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("var".parse::<ScalingMethod>().unwrap(), ScalingMethod::Var);
        assert!(matches!("minmax".parse::<ScalingMethod>(), Err(DatasetError::InvalidArgument(_))));
    }
}
