use log::info;
use serde::{Deserialize, Serialize};

use crate::algorithm::scaling::ScalingMethod;
use crate::data::dataset::Dataset;
use crate::error::Result;

/// One batch preprocessing call on a [`Dataset`].
///
/// Serialized with a `step` tag, e.g. `{"step": "cut_dt", "start": 5.0, "stop": 15.0}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PreprocessingStep {
    Tophat {
        #[serde(default = "default_tophat_size")]
        size: usize,
    },
    SubFirstRow,
    InterpRiprel,
    RipScaling,
    Resample { n: usize },
    Binning { n: usize },
    CutDt { start: f64, stop: f64 },
    CutRt { start: f64, stop: f64 },
    Mean,
    Scaling {
        #[serde(default)]
        method: ScalingMethod,
    },
}

fn default_tophat_size() -> usize {
    15
}

/// Ordered list of preprocessing steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub steps: Vec<PreprocessingStep>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            steps: vec![
                PreprocessingStep::InterpRiprel,
                PreprocessingStep::Tophat { size: default_tophat_size() },
                PreprocessingStep::RipScaling,
            ],
        }
    }
}

impl Dataset {
    pub fn apply(&mut self, step: &PreprocessingStep) -> Result<&mut Self> {
        match *step {
            PreprocessingStep::Tophat { size } => self.tophat(size),
            PreprocessingStep::SubFirstRow => self.sub_first_row(),
            PreprocessingStep::InterpRiprel => self.interp_riprel(),
            PreprocessingStep::RipScaling => self.rip_scaling(),
            PreprocessingStep::Resample { n } => self.resample(n),
            PreprocessingStep::Binning { n } => self.binning(n),
            PreprocessingStep::CutDt { start, stop } => self.cut_dt(start, stop),
            PreprocessingStep::CutRt { start, stop } => self.cut_rt(start, stop),
            PreprocessingStep::Mean => self.mean(),
            PreprocessingStep::Scaling { method } => self.scaling(method),
        }
    }

    /// Runs all steps in order, stopping at the first failure.
    pub fn apply_pipeline(&mut self, config: &PipelineConfig) -> Result<&mut Self> {
        info!("running {} preprocessing steps on {}", config.steps.len(), self.name);
        for step in &config.steps {
            self.apply(step)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::spectrum::Spectrum;
    use ndarray::{Array1, Array2};

    fn dataset() -> Dataset {
        let data: Vec<Spectrum> = (0..4)
            .map(|k| {
                Spectrum::new(
                    format!("f{}", k),
                    Array2::from_shape_fn((8, 6), |(i, j)| (k + i * j) as f64),
                    Array1::from_iter((0..8).map(|i| i as f64)),
                    Array1::from_iter((0..6).map(|j| j as f64)),
                )
                .unwrap()
            })
            .collect();
        let files = data.iter().map(|s| s.name.clone()).collect();
        let samples = vec!["A", "A", "B", "B"].into_iter().map(String::from).collect();
        let labels = vec!["x", "x", "y", "y"].into_iter().map(String::from).collect();
        Dataset::new(data, "pipe", files, samples, labels).unwrap()
    }

    #[test]
    fn test_parse_pipeline_json() {
        let json = r#"{"steps": [
            {"step": "sub_first_row"},
            {"step": "cut_rt", "start": 1.0, "stop": 7.0},
            {"step": "tophat"},
            {"step": "scaling", "method": "auto"}
        ]}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.steps.len(), 4);
        assert_eq!(config.steps[2], PreprocessingStep::Tophat { size: 15 });
        assert_eq!(config.steps[3], PreprocessingStep::Scaling { method: ScalingMethod::Auto });
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        let json = r#"{"steps": [{"step": "smooth"}]}"#;
        assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
    }

    #[test]
    fn test_apply_pipeline_runs_in_order() {
        let mut ds = dataset();
        let config = PipelineConfig {
            steps: vec![
                PreprocessingStep::Mean,
                PreprocessingStep::Resample { n: 2 },
                PreprocessingStep::CutDt { start: 1.0, stop: 4.0 },
            ],
        };
        ds.apply_pipeline(&config).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0).unwrap().shape(), (4, 3));
        assert_eq!(ds.preprocessing, vec!["mean", "resample(2)", "cut_dt(1, 4)"]);
    }

    #[test]
    fn test_failing_step_stops_pipeline() {
        let mut ds = dataset();
        let before = ds.clone();
        let config = PipelineConfig {
            steps: vec![PreprocessingStep::Resample { n: 3 }, PreprocessingStep::RipScaling],
        };
        assert!(ds.apply_pipeline(&config).is_err());
        assert!(ds.preprocessing.is_empty());
        assert_eq!(ds.entries(), before.entries());
    }
}
