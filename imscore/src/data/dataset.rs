//! Labeled collection of GC-IMS spectra.
//!
//! A [`Dataset`] stores one [`Entry`] per spectrum holding the measurement
//! together with its file name, sample name and label, so the four always move
//! together under selection, deletion and aggregation.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Bound, RangeBounds};
use std::str::FromStr;

use log::{debug, info};
use ndarray::{Array1, Array2, Array3, ArrayD, Axis};
use rayon::prelude::*;

use crate::algorithm::alignment;
use crate::algorithm::scaling::{scaling_weights, ScalingMethod};
use crate::algorithm::splitting::{CrossValidator, KFold, LeaveOneOut, Partition, ShuffleSplit, StratifiedKFold};
use crate::algorithm::vec_utils::unique_sorted;
use crate::data::spectrum::Spectrum;
use crate::error::{DatasetError, Result};

/// One spectrum with its metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub spectrum: Spectrum,
    pub file: String,
    pub sample: String,
    pub label: String,
}

impl Entry {
    pub fn key(&self, key: GroupKey) -> &str {
        match key {
            GroupKey::Label => &self.label,
            GroupKey::Sample => &self.sample,
        }
    }
}

/// Metadata column used for grouping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKey {
    Label,
    Sample,
}

impl FromStr for GroupKey {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "label" => Ok(GroupKey::Label),
            "sample" => Ok(GroupKey::Sample),
            other => Err(DatasetError::Usage(format!(
                "only \"label\" or \"sample\" are valid keys, got \"{}\"",
                other
            ))),
        }
    }
}

/// Features and targets of one train/test partition.
#[derive(Clone, Debug)]
pub struct SplitXY {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<String>,
    pub y_test: Array1<String>,
}

/// Forward-only sequence of train/test splits.
///
/// Fold membership is computed when the sequence is created, every step slices
/// the dataset and extracts the flattened features of one fold.
pub struct Folds<'a> {
    dataset: &'a Dataset,
    partitions: std::vec::IntoIter<Partition>,
}

impl<'a> Iterator for Folds<'a> {
    type Item = Result<SplitXY>;

    fn next(&mut self) -> Option<Self::Item> {
        let partition = self.partitions.next()?;
        debug!("fold: {} train, {} test", partition.train.len(), partition.test.len());
        Some(self.dataset.split_xy(&partition))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.partitions.size_hint()
    }
}

impl<'a> ExactSizeIterator for Folds<'a> {}

#[derive(Clone, Debug)]
pub struct Dataset {
    pub name: String,
    entries: Vec<Entry>,
    /// Descriptors of the preprocessing steps applied so far, in order.
    pub preprocessing: Vec<String>,
    weights: Option<Array1<f64>>,
}

impl Dataset {
    /// Creates a dataset from parallel sequences.
    ///
    /// # Arguments
    ///
    /// * `data` - Spectra, one per entry.
    /// * `name` - Display name, readers use the directory name.
    /// * `files` - Original file name of every spectrum.
    /// * `samples` - Sample name of every spectrum.
    /// * `labels` - Label of every spectrum.
    ///
    /// Fails with [`DatasetError::LengthMismatch`] unless all four have the same length.
    pub fn new(
        data: Vec<Spectrum>,
        name: impl Into<String>,
        files: Vec<String>,
        samples: Vec<String>,
        labels: Vec<String>,
    ) -> Result<Self> {
        let n = data.len();
        if files.len() != n || samples.len() != n || labels.len() != n {
            return Err(DatasetError::LengthMismatch {
                data: n,
                files: files.len(),
                samples: samples.len(),
                labels: labels.len(),
            });
        }

        let entries = data
            .into_iter()
            .zip(files)
            .zip(samples)
            .zip(labels)
            .map(|(((spectrum, file), sample), label)| Entry { spectrum, file, sample, label })
            .collect();
        Ok(Dataset::from_entries(name, entries))
    }

    pub fn from_entries(name: impl Into<String>, entries: Vec<Entry>) -> Self {
        Dataset { name: name.into(), entries, preprocessing: Vec::new(), weights: None }
    }

    fn derive(&self, name: impl Into<String>, entries: Vec<Entry>) -> Dataset {
        Dataset {
            name: name.into(),
            entries,
            preprocessing: self.preprocessing.clone(),
            weights: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Spectrum> {
        self.entries.iter().map(|e| &e.spectrum)
    }

    pub fn files(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.file.as_str()).collect()
    }

    pub fn samples(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.sample.as_str()).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    /// Weights stored by the last call to [`Dataset::scaling`].
    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref()
    }

    /// The spectrum at `index`.
    pub fn get(&self, index: usize) -> Option<&Spectrum> {
        self.entries.get(index).map(|e| &e.spectrum)
    }

    /// New dataset with the same name restricted to a contiguous range.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Result<Dataset> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e + 1,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };
        if end > len || start > end {
            return Err(DatasetError::IndexOutOfBounds { index: end.max(start), len });
        }
        Ok(self.derive(self.name.clone(), self.entries[start..end].to_vec()))
    }

    /// New dataset with the same name holding the given indices in the given order.
    pub fn take(&self, indices: &[usize]) -> Result<Dataset> {
        let entries = indices
            .iter()
            .map(|&i| {
                self.entries
                    .get(i)
                    .cloned()
                    .ok_or(DatasetError::IndexOutOfBounds { index: i, len: self.len() })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.derive(self.name.clone(), entries))
    }

    /// Removes and returns the entry at `index`.
    pub fn delete(&mut self, index: usize) -> Result<Entry> {
        if index >= self.len() {
            return Err(DatasetError::IndexOutOfBounds { index, len: self.len() });
        }
        Ok(self.entries.remove(index))
    }

    /// Appends a spectrum, its name becomes the file name of the new entry.
    ///
    /// Sample name and label must be given because the spectrum does not carry them.
    pub fn add(&mut self, spectrum: Spectrum, sample: impl Into<String>, label: impl Into<String>) -> &mut Self {
        let file = spectrum.name.clone();
        self.entries.push(Entry { spectrum, file, sample: sample.into(), label: label.into() });
        self
    }

    /// Sample names in ascending order mapped to the ascending indices of their spectra.
    pub fn sample_indices(&self) -> BTreeMap<String, Vec<usize>> {
        let mut indices: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            indices.entry(entry.sample.clone()).or_default().push(i);
        }
        indices
    }

    fn filter_by(&self, label: Option<&str>, sample: Option<&str>, keep_matching: bool) -> Result<Dataset> {
        let (key, value) = match (label, sample) {
            (Some(l), None) => (GroupKey::Label, l),
            (None, Some(s)) => (GroupKey::Sample, s),
            (None, None) => {
                return Err(DatasetError::Usage("must give either label or sample value".to_string()))
            }
            (Some(_), Some(_)) => {
                return Err(DatasetError::Usage("give either label or sample value, not both".to_string()))
            }
        };

        let entries = self
            .entries
            .iter()
            .filter(|e| (e.key(key) == value) == keep_matching)
            .cloned()
            .collect();
        Ok(self.derive(value, entries))
    }

    /// Keeps all spectra of the given label or sample.
    ///
    /// Exactly one of `label` and `sample` must be given. The result is named
    /// after the selected value.
    ///
    /// # Example
    ///
    /// ```
    /// use imscore::data::dataset::Dataset;
    ///
    /// let ds = Dataset::new(Vec::new(), "empty", Vec::new(), Vec::new(), Vec::new()).unwrap();
    /// assert!(ds.select(None, None).is_err());
    /// assert_eq!(ds.select(Some("control"), None).unwrap().name, "control");
    /// ```
    pub fn select(&self, label: Option<&str>, sample: Option<&str>) -> Result<Dataset> {
        self.filter_by(label, sample, true)
    }

    /// Removes all spectra of the given label or sample.
    pub fn drop(&self, label: Option<&str>, sample: Option<&str>) -> Result<Dataset> {
        self.filter_by(label, sample, false)
    }

    /// One dataset per distinct label or sample, in ascending order of the key.
    pub fn group_by(&self, key: GroupKey) -> Result<Vec<Dataset>> {
        unique_sorted(self.entries.iter().map(|e| e.key(key)))
            .iter()
            .map(|value| match key {
                GroupKey::Label => self.select(Some(value.as_str()), None),
                GroupKey::Sample => self.select(None, Some(value.as_str())),
            })
            .collect()
    }

    /// Replaces repeat determinations by their mean spectrum, one per sample.
    ///
    /// Samples are ordered ascending; the mean spectrum and its file entry are
    /// named after the sample. Fails if a sample mixes labels or grid shapes.
    pub fn mean(&mut self) -> Result<&mut Self> {
        let mut means = Vec::new();
        for (sample, indices) in self.sample_indices() {
            let first = &self.entries[indices[0]];
            let label = first.label.clone();

            let labels = unique_sorted(indices.iter().map(|&i| self.entries[i].label.as_str()));
            if labels.len() > 1 {
                return Err(DatasetError::HeterogeneousLabels { sample, labels });
            }

            let shape = first.spectrum.shape();
            let mut sum = first.spectrum.clone();
            for &i in &indices[1..] {
                let other = &self.entries[i].spectrum;
                if other.shape() != shape {
                    return Err(DatasetError::ShapeMismatch {
                        name: other.name.clone(),
                        expected: shape,
                        found: other.shape(),
                    });
                }
                sum = sum + other;
            }

            let mut mean = sum / indices.len() as f64;
            mean.name = sample.clone();
            debug!("mean of {} spectra for sample {}", indices.len(), sample);
            means.push(Entry { spectrum: mean, file: sample.clone(), sample, label });
        }

        info!("mean: {} spectra collapsed into {} samples", self.len(), means.len());
        self.entries = means;
        self.preprocessing.push("mean".to_string());
        Ok(self)
    }

    /// Runs `f` on copies of all spectra and swaps them in only if every one succeeded.
    fn map_spectra<F>(&mut self, step: String, f: F) -> Result<&mut Self>
    where
        F: Fn(&mut Spectrum) -> Result<()> + Send + Sync,
    {
        let spectra = self
            .entries
            .par_iter()
            .map(|e| {
                let mut spectrum = e.spectrum.clone();
                f(&mut spectrum)?;
                Ok(spectrum)
            })
            .collect::<Result<Vec<Spectrum>>>()?;
        for (entry, spectrum) in self.entries.iter_mut().zip(spectra) {
            entry.spectrum = spectrum;
        }
        info!("{}: applied to {} spectra", step, self.len());
        self.preprocessing.push(step);
        Ok(self)
    }

    /// White tophat baseline correction on every spectrum.
    pub fn tophat(&mut self, size: usize) -> Result<&mut Self> {
        self.map_spectra("tophat".to_string(), |s| s.tophat(size).map(|_| ()))
    }

    /// Subtracts the first row of every spectrum.
    pub fn sub_first_row(&mut self) -> Result<&mut Self> {
        self.map_spectra("sub_first_row".to_string(), |s| {
            s.sub_first_row();
            Ok(())
        })
    }

    /// Scales every spectrum relative to its global maximum.
    pub fn rip_scaling(&mut self) -> Result<&mut Self> {
        self.map_spectra("rip_scaling".to_string(), |s| {
            s.rip_scaling();
            Ok(())
        })
    }

    /// Averages every `n` retention time rows of every spectrum.
    pub fn resample(&mut self, n: usize) -> Result<&mut Self> {
        self.map_spectra(format!("resample({})", n), |s| s.resample(n).map(|_| ()))
    }

    /// Downsamples every spectrum by `n x n` block means.
    pub fn binning(&mut self, n: usize) -> Result<&mut Self> {
        self.map_spectra(format!("binning({})", n), |s| s.binning(n).map(|_| ()))
    }

    /// Cuts every spectrum on the drift time axis, coordinates are axis values.
    pub fn cut_dt(&mut self, start: f64, stop: f64) -> Result<&mut Self> {
        self.map_spectra(format!("cut_dt({}, {})", start, stop), |s| s.cut_dt(start, stop).map(|_| ()))
    }

    /// Cuts every spectrum on the retention time axis, coordinates are axis values.
    pub fn cut_rt(&mut self, start: f64, stop: f64) -> Result<&mut Self> {
        self.map_spectra(format!("cut_rt({}, {})", start, stop), |s| s.cut_rt(start, stop).map(|_| ()))
    }

    /// Interpolates all spectra to a common RIP relative drift time axis.
    pub fn interp_riprel(&mut self) -> Result<&mut Self> {
        let mut spectra: Vec<Spectrum> = self.entries.iter().map(|e| e.spectrum.clone()).collect();
        alignment::interp_riprel(&mut spectra)?;
        for (entry, spectrum) in self.entries.iter_mut().zip(spectra) {
            entry.spectrum = spectrum;
        }
        self.preprocessing.push("interp_riprel".to_string());
        Ok(self)
    }

    /// Stacks all grids into spectra x retention time x drift time.
    pub fn stack(&self) -> Result<Array3<f64>> {
        let first = self.entries.first().ok_or(DatasetError::Empty)?;
        let (rows, cols) = first.spectrum.shape();

        let mut flat = Vec::with_capacity(self.len() * rows * cols);
        for entry in &self.entries {
            let found = entry.spectrum.shape();
            if found != (rows, cols) {
                return Err(DatasetError::ShapeMismatch {
                    name: entry.spectrum.name.clone(),
                    expected: (rows, cols),
                    found,
                });
            }
            flat.extend(entry.spectrum.values.iter().copied());
        }

        Array3::from_shape_vec((self.len(), rows, cols), flat)
            .map_err(|e| DatasetError::InvalidArgument(e.to_string()))
    }

    fn flat_features(&self) -> Result<Array2<f64>> {
        let stacked = self.stack()?;
        let (n, rows, cols) = stacked.dim();
        stacked
            .into_shape((n, rows * cols))
            .map_err(|e| DatasetError::InvalidArgument(e.to_string()))
    }

    fn targets(&self) -> Array1<String> {
        self.entries.iter().map(|e| e.label.clone()).collect()
    }

    /// Features and labels for machine learning.
    ///
    /// `X` has shape (spectra, retention time, drift time), or
    /// (spectra, retention time * drift time) when `flatten` is set.
    /// All spectra must share one grid shape.
    pub fn get_xy(&self, flatten: bool) -> Result<(ArrayD<f64>, Array1<String>)> {
        let x = if flatten {
            self.flat_features()?.into_dyn()
        } else {
            self.stack()?.into_dyn()
        };
        Ok((x, self.targets()))
    }

    /// Scales every feature column with weights computed over this dataset.
    ///
    /// The weights are kept on the dataset. To avoid leaking test data into
    /// training, call this on the training partition only and reuse the
    /// weights with [`Dataset::apply_weights`].
    pub fn scaling(&mut self, method: ScalingMethod) -> Result<&mut Self> {
        let x = self.flat_features()?;
        let weights = scaling_weights(&x, method);
        self.write_back(x * &weights)?;
        self.weights = Some(weights);
        self.preprocessing.push(format!("scaling({})", method));
        Ok(self)
    }

    /// Multiplies every flattened spectrum with previously computed weights.
    pub fn apply_weights(&mut self, weights: &Array1<f64>) -> Result<&mut Self> {
        let x = self.flat_features()?;
        if x.ncols() != weights.len() {
            return Err(DatasetError::InvalidArgument(format!(
                "{} weights for {} features",
                weights.len(),
                x.ncols()
            )));
        }
        self.write_back(x * weights)?;
        self.preprocessing.push("apply_weights".to_string());
        Ok(self)
    }

    fn write_back(&mut self, x: Array2<f64>) -> Result<()> {
        for (entry, row) in self.entries.iter_mut().zip(x.axis_iter(Axis(0))) {
            let shape = entry.spectrum.shape();
            entry.spectrum.values = row
                .to_owned()
                .into_shape(shape)
                .map_err(|e| DatasetError::InvalidArgument(e.to_string()))?;
        }
        Ok(())
    }

    fn split_xy(&self, partition: &Partition) -> Result<SplitXY> {
        let train = self.take(&partition.train)?;
        let test = self.take(&partition.test)?;
        Ok(SplitXY {
            x_train: train.flat_features()?,
            x_test: test.flat_features()?,
            y_train: train.targets(),
            y_test: test.targets(),
        })
    }

    /// Splits into one random train and test set.
    ///
    /// # Arguments
    ///
    /// * `test_size` - Proportion used for testing, between 0 and 1.
    /// * `random_state` - Seed for reproducible splits.
    pub fn train_test_split(&self, test_size: f64, random_state: Option<u64>) -> Result<SplitXY> {
        let partitions = ShuffleSplit::new(test_size, random_state).partitions(&self.labels())?;
        self.split_xy(&partitions[0])
    }

    /// K-fold cross-validation, stratified by label when `stratify` is set.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use imscore::data::dataset::Dataset;
    /// # fn run(ds: &Dataset) -> imscore::error::Result<()> {
    /// for fold in ds.kfold_split(5, true, Some(1), true)? {
    ///     let fold = fold?;
    ///     println!("{} train, {} test", fold.x_train.nrows(), fold.x_test.nrows());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn kfold_split(
        &self,
        n_splits: usize,
        shuffle: bool,
        random_state: Option<u64>,
        stratify: bool,
    ) -> Result<Folds<'_>> {
        if stratify {
            self.split_with(&StratifiedKFold::new(n_splits, shuffle, random_state))
        } else {
            self.split_with(&KFold::new(n_splits, shuffle, random_state))
        }
    }

    /// Uses every spectrum once as test set, the rest for training.
    pub fn leave_one_out(&self) -> Result<Folds<'_>> {
        self.split_with(&LeaveOneOut)
    }

    /// Lazy splits from any index partitioning strategy.
    pub fn split_with(&self, validator: &dyn CrossValidator) -> Result<Folds<'_>> {
        let partitions = validator.partitions(&self.labels())?;
        Ok(Folds { dataset: self, partitions: partitions.into_iter() })
    }
}

impl Display for Dataset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Dataset: {}, {} Spectra", self.name, self.len())
    }
}
