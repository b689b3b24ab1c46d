//! Index partitioning strategies for holdout and cross-validation.
//!
//! Splitters only ever produce index sets, the dataset slices itself with them.

use std::collections::HashMap;

use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{DatasetError, Result};

/// One train/test partition of dataset indices.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Produces every partition of a collection up front.
pub trait CrossValidator {
    /// Partitions `0..labels.len()`, labels are only consulted by stratified splitters.
    fn partitions(&self, labels: &[&str]) -> Result<Vec<Partition>>;
}

fn rng_from(random_state: Option<u64>) -> StdRng {
    match random_state {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Complement of `test` within `0..n`, ascending.
fn complement(n: usize, test: &[usize]) -> Vec<usize> {
    let mut in_test = vec![false; n];
    for &i in test {
        in_test[i] = true;
    }
    (0..n).filter(|&i| !in_test[i]).collect()
}

/// Single random train/test split.
#[derive(Clone, Debug)]
pub struct ShuffleSplit {
    /// Proportion of the collection used for testing, in (0, 1).
    pub test_size: f64,
    pub random_state: Option<u64>,
}

impl ShuffleSplit {
    pub fn new(test_size: f64, random_state: Option<u64>) -> Self {
        ShuffleSplit { test_size, random_state }
    }
}

impl CrossValidator for ShuffleSplit {
    fn partitions(&self, labels: &[&str]) -> Result<Vec<Partition>> {
        let n = labels.len();
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(DatasetError::InvalidArgument(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }

        let n_test = (self.test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(DatasetError::InvalidArgument(format!(
                "test_size {} leaves an empty partition for {} spectra",
                self.test_size, n
            )));
        }

        let mut permutation: Vec<usize> = (0..n).collect();
        permutation.shuffle(&mut rng_from(self.random_state));
        let (test, train) = permutation.split_at(n_test);
        Ok(vec![Partition { train: train.to_vec(), test: test.to_vec() }])
    }
}

/// Consecutive folds, optionally over shuffled indices.
///
/// The first `n % n_splits` folds hold one index more than the others.
#[derive(Clone, Debug)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl KFold {
    pub fn new(n_splits: usize, shuffle: bool, random_state: Option<u64>) -> Self {
        KFold { n_splits, shuffle, random_state }
    }
}

fn check_n_splits(n_splits: usize, n: usize) -> Result<()> {
    if n_splits < 2 {
        return Err(DatasetError::Usage(format!(
            "k-fold cross-validation requires at least 2 splits, got {}",
            n_splits
        )));
    }
    if n_splits > n {
        return Err(DatasetError::InvalidArgument(format!(
            "cannot have {} splits with only {} spectra",
            n_splits, n
        )));
    }
    Ok(())
}

impl CrossValidator for KFold {
    fn partitions(&self, labels: &[&str]) -> Result<Vec<Partition>> {
        let n = labels.len();
        check_n_splits(self.n_splits, n)?;

        let mut indices: Vec<usize> = (0..n).collect();
        if self.shuffle {
            indices.shuffle(&mut rng_from(self.random_state));
        }

        let base = n / self.n_splits;
        let extra = n % self.n_splits;
        let mut start = 0;
        let mut folds = Vec::with_capacity(self.n_splits);
        for fold in 0..self.n_splits {
            let size = base + usize::from(fold < extra);
            let test = indices[start..start + size].to_vec();
            folds.push(Partition { train: complement(n, &test), test });
            start += size;
        }
        Ok(folds)
    }
}

/// Folds that preserve the proportion of every label class.
///
/// Labels sorted by class are dealt round robin onto the folds to decide how
/// many members of each class a fold receives; class members are then
/// assigned to folds in order, or at random when shuffling.
#[derive(Clone, Debug)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize, shuffle: bool, random_state: Option<u64>) -> Self {
        StratifiedKFold { n_splits, shuffle, random_state }
    }
}

impl CrossValidator for StratifiedKFold {
    fn partitions(&self, labels: &[&str]) -> Result<Vec<Partition>> {
        let n = labels.len();
        check_n_splits(self.n_splits, n)?;

        // classes in order of first appearance
        let mut class_of: HashMap<&str, usize> = HashMap::new();
        let mut encoded = Vec::with_capacity(n);
        for &label in labels {
            let next = class_of.len();
            encoded.push(*class_of.entry(label).or_insert(next));
        }
        let n_classes = class_of.len();

        let mut counts = vec![0usize; n_classes];
        for &c in &encoded {
            counts[c] += 1;
        }
        let largest = counts.iter().copied().max().unwrap_or(0);
        if largest < self.n_splits {
            return Err(DatasetError::InvalidArgument(format!(
                "n_splits={} cannot be greater than the number of members in each class",
                self.n_splits
            )));
        }
        let smallest = counts.iter().copied().min().unwrap_or(0);
        if smallest < self.n_splits {
            warn!(
                "the least populated class has only {} members, which is less than n_splits={}",
                smallest, self.n_splits
            );
        }

        let mut sorted_classes = encoded.clone();
        sorted_classes.sort_unstable();
        let mut allocation = vec![vec![0usize; n_classes]; self.n_splits];
        for (position, &c) in sorted_classes.iter().enumerate() {
            allocation[position % self.n_splits][c] += 1;
        }

        let mut rng = rng_from(self.random_state);
        let mut test_fold = vec![0usize; n];
        for c in 0..n_classes {
            let mut folds_for_class: Vec<usize> = (0..self.n_splits)
                .flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][c]))
                .collect();
            if self.shuffle {
                folds_for_class.shuffle(&mut rng);
            }
            let members = encoded.iter().enumerate().filter(|(_, &e)| e == c).map(|(i, _)| i);
            for (i, fold) in members.zip(folds_for_class) {
                test_fold[i] = fold;
            }
        }

        Ok((0..self.n_splits)
            .map(|fold| {
                let test: Vec<usize> = (0..n).filter(|&i| test_fold[i] == fold).collect();
                Partition { train: complement(n, &test), test }
            })
            .collect())
    }
}

/// Every index is the test set exactly once.
#[derive(Clone, Debug, Default)]
pub struct LeaveOneOut;

impl CrossValidator for LeaveOneOut {
    fn partitions(&self, labels: &[&str]) -> Result<Vec<Partition>> {
        let n = labels.len();
        if n < 2 {
            return Err(DatasetError::InvalidArgument(format!(
                "leave-one-out needs at least 2 spectra, got {}",
                n
            )));
        }
        Ok((0..n)
            .map(|i| Partition { train: (0..n).filter(|&j| j != i).collect(), test: vec![i] })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covers_once(folds: &[Partition], n: usize) -> bool {
        let mut seen = vec![0; n];
        for fold in folds {
            for &i in &fold.test {
                seen[i] += 1;
            }
        }
        seen.iter().all(|&c| c == 1)
    }

    #[test]
    fn test_kfold_two_splits_over_four() {
        let labels = ["a", "a", "b", "b"];
        let folds = KFold::new(2, true, Some(7)).partitions(&labels).unwrap();
        assert_eq!(folds.len(), 2);
        assert!(covers_once(&folds, 4));
        for fold in &folds {
            assert_eq!(fold.test.len(), 2);
            assert_eq!(fold.train.len(), 2);
            assert!(fold.test.iter().all(|i| !fold.train.contains(i)));
        }
    }

    #[test]
    fn test_kfold_unshuffled_is_consecutive() {
        let labels = ["x"; 5];
        let folds = KFold::new(2, false, None).partitions(&labels).unwrap();
        assert_eq!(folds[0].test, vec![0, 1, 2]);
        assert_eq!(folds[1].test, vec![3, 4]);
        assert_eq!(folds[1].train, vec![0, 1, 2]);
    }

    #[test]
    fn test_kfold_seed_is_reproducible() {
        let labels = ["x"; 10];
        let a = KFold::new(3, true, Some(42)).partitions(&labels).unwrap();
        let b = KFold::new(3, true, Some(42)).partitions(&labels).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_kfold_rejects_single_split() {
        let labels = ["x"; 4];
        assert!(matches!(KFold::new(1, false, None).partitions(&labels), Err(DatasetError::Usage(_))));
        assert!(KFold::new(5, false, None).partitions(&labels).is_err());
    }

    #[test]
    fn test_stratified_keeps_class_balance() {
        let labels = ["a", "a", "a", "a", "b", "b", "b", "b"];
        let folds = StratifiedKFold::new(2, true, Some(3)).partitions(&labels).unwrap();
        assert!(covers_once(&folds, 8));
        for fold in &folds {
            let a = fold.test.iter().filter(|&&i| labels[i] == "a").count();
            let b = fold.test.iter().filter(|&&i| labels[i] == "b").count();
            assert_eq!((a, b), (2, 2));
        }
    }

    #[test]
    fn test_stratified_rejects_too_many_splits() {
        let labels = ["a", "b", "c"];
        assert!(StratifiedKFold::new(2, false, None).partitions(&labels).is_err());
    }

    #[test]
    fn test_shuffle_split_sizes() {
        let labels = ["x"; 10];
        let split = &ShuffleSplit::new(0.25, Some(1)).partitions(&labels).unwrap()[0];
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 7);
        let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
        all.sort();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_split_rejects_bad_size() {
        let labels = ["x"; 10];
        assert!(ShuffleSplit::new(1.5, None).partitions(&labels).is_err());
        assert!(ShuffleSplit::new(0.0, None).partitions(&labels).is_err());
    }

    #[test]
    fn test_leave_one_out() {
        let labels = ["x"; 3];
        let folds = LeaveOneOut.partitions(&labels).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[1], Partition { train: vec![0, 2], test: vec![1] });
    }
}
