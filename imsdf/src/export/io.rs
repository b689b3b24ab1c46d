use std::fs;
use std::path::Path;

use imscore::algorithm::vec_utils::unique_sorted;
use imscore::data::dataset::Dataset;
use log::info;
use rayon::prelude::*;

use crate::data::meta::{read_labels_sql, read_preprocessing_sql, write_labels_sql, write_preprocessing_sql, LabelRecord};
use imscore::data::spectrum::Spectrum;

use crate::data::utility::{compress_collection, compress_spectrum, decompress_spectrum};
use crate::error::{ImsDfError, Result};

pub const DATA_DIR: &str = "data";
const BINARY_EXTENSION: &str = "bin";

fn spectrum_path(folder: &Path, idx: usize) -> std::path::PathBuf {
    folder.join(DATA_DIR).join(format!("{}.{}", idx, BINARY_EXTENSION))
}

/// Writes one spectrum as a zstd compressed binary file.
pub fn write_spectrum(spectrum: &Spectrum, path: &Path, compression_level: i32) -> Result<()> {
    fs::write(path, compress_spectrum(spectrum, compression_level)?)?;
    Ok(())
}

pub fn read_spectrum(path: &Path) -> Result<Spectrum> {
    decompress_spectrum(&fs::read(path)?)
}

/// Writes the fast binary format.
///
/// `folder/data/<i>.bin` holds the zstd compressed spectrum `i`,
/// `folder/labels.db` the file, sample and label of every index together with
/// the preprocessing log. `folder` must not exist yet.
pub fn write_binary(dataset: &Dataset, folder: &Path, compression_level: i32, num_threads: usize) -> Result<()> {
    fs::create_dir(folder)?;
    fs::create_dir(folder.join(DATA_DIR))?;

    let spectra: Vec<_> = dataset.iter().cloned().collect();
    let compressed = compress_collection(&spectra, compression_level, num_threads)?;
    for (idx, bytes) in compressed.iter().enumerate() {
        fs::write(spectrum_path(folder, idx), bytes)?;
    }

    let records: Vec<LabelRecord> = dataset
        .entries()
        .iter()
        .enumerate()
        .map(|(idx, e)| LabelRecord {
            idx: idx as i64,
            file: e.file.clone(),
            sample: e.sample.clone(),
            label: e.label.clone(),
        })
        .collect();
    write_labels_sql(folder, &records)?;
    write_preprocessing_sql(folder, &dataset.preprocessing)?;

    info!("wrote {} spectra to {}", dataset.len(), folder.display());
    Ok(())
}

/// Reads a folder written by [`write_binary`], in index order.
pub fn read_binary(folder: &Path) -> Result<Dataset> {
    let records = read_labels_sql(folder)?;
    let data = records
        .par_iter()
        .map(|r| -> Result<_> {
            let idx = usize::try_from(r.idx).map_err(|_| ImsDfError::format(folder, format!("negative index {}", r.idx)))?;
            read_spectrum(&spectrum_path(folder, idx))
        })
        .collect::<Result<Vec<_>>>()?;

    let name = folder
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut files = Vec::with_capacity(records.len());
    let mut samples = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());
    for r in records {
        files.push(r.file);
        samples.push(r.sample);
        labels.push(r.label);
    }

    let mut dataset = Dataset::new(data, name, files, samples, labels)?;
    dataset.preprocessing = read_preprocessing_sql(folder)?;
    info!("read {}", dataset);
    Ok(dataset)
}

/// Maps class names to consecutive integers in sorted class order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a, I: IntoIterator<Item = &'a str>>(labels: I) -> Self {
        LabelEncoder { classes: unique_sorted(labels) }
    }

    pub fn transform(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok()
    }
}

fn write_column<T: ToString>(path: &Path, values: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for value in values {
        writer.write_record([value.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Exports the intensity grids as plain CSV arrays for external tools.
///
/// Writes `data/<i>.csv` per spectrum plus `labels.csv` (encoded labels),
/// `label_names.csv` (class name of every code) and `samples.csv`.
pub fn write_arrays(dataset: &Dataset, folder: &Path) -> Result<()> {
    fs::create_dir(folder)?;
    fs::create_dir(folder.join(DATA_DIR))?;

    let encoder = LabelEncoder::fit(dataset.labels());
    let codes: Vec<usize> = dataset
        .labels()
        .iter()
        .filter_map(|l| encoder.transform(l))
        .collect();
    write_column(&folder.join("labels.csv"), codes)?;
    write_column(&folder.join("label_names.csv"), &encoder.classes)?;
    write_column(&folder.join("samples.csv"), dataset.samples())?;

    dataset
        .iter()
        .enumerate()
        .collect::<Vec<_>>()
        .par_iter()
        .try_for_each(|(i, spectrum)| -> Result<()> {
            let mut writer = csv::Writer::from_path(folder.join(DATA_DIR).join(format!("{}.csv", i)))?;
            for row in spectrum.values.rows() {
                writer.write_record(row.iter().map(|v| v.to_string()))?;
            }
            writer.flush()?;
            Ok(())
        })?;

    info!("exported {} arrays to {}", dataset.len(), folder.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn dataset() -> Dataset {
        let data: Vec<Spectrum> = (0..3)
            .map(|k| {
                Spectrum::new(
                    format!("f{}", k),
                    Array2::from_shape_fn((3, 2), |(i, j)| (k * 10 + i * 2 + j) as f64 / 4.0),
                    Array1::from(vec![0.0, 0.1, 0.2]),
                    Array1::from(vec![1.0, 2.0]),
                )
                .unwrap()
            })
            .collect();
        let files = vec!["f0.mea".to_string(), "f1.mea".to_string(), "f2.mea".to_string()];
        let samples = vec!["S1".to_string(), "S1".to_string(), "S2".to_string()];
        let labels = vec!["sick".to_string(), "sick".to_string(), "healthy".to_string()];
        Dataset::new(data, "study", files, samples, labels).unwrap()
    }

    #[test]
    fn test_binary_roundtrip_keeps_order() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("study");
        let mut ds = dataset();
        ds.rip_scaling().unwrap();
        write_binary(&ds, &folder, 3, 2).unwrap();

        let read = read_binary(&folder).unwrap();
        assert_eq!(read.name, "study");
        assert_eq!(read.files(), ds.files());
        assert_eq!(read.samples(), ds.samples());
        assert_eq!(read.labels(), ds.labels());
        assert_eq!(read.get(2), ds.get(2));
        assert_eq!(read.preprocessing, vec!["rip_scaling"]);
    }

    #[test]
    fn test_single_spectrum_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f1.bin");
        let ds = dataset();
        let spectrum = ds.get(1).unwrap();
        write_spectrum(spectrum, &path, 5).unwrap();
        assert_eq!(&read_spectrum(&path).unwrap(), spectrum);
        assert!(read_spectrum(&tmp.path().join("missing.bin")).is_err());
    }

    #[test]
    fn test_existing_folder_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(write_binary(&dataset(), tmp.path(), 3, 1).is_err());
        assert!(write_arrays(&dataset(), tmp.path()).is_err());
    }

    #[test]
    fn test_label_encoder_uses_sorted_classes() {
        let encoder = LabelEncoder::fit(["sick", "healthy", "sick"]);
        assert_eq!(encoder.classes, vec!["healthy", "sick"]);
        assert_eq!(encoder.transform("sick"), Some(1));
        assert_eq!(encoder.transform("other"), None);
    }

    #[test]
    fn test_write_arrays() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("arrays");
        write_arrays(&dataset(), &folder).unwrap();

        let lines = |name: &str| -> Vec<String> {
            fs::read_to_string(folder.join(name)).unwrap().lines().map(String::from).collect()
        };
        assert_eq!(lines("labels.csv"), vec!["1", "1", "0"]);
        assert_eq!(lines("label_names.csv"), vec!["healthy", "sick"]);
        assert_eq!(lines("samples.csv"), vec!["S1", "S1", "S2"]);
        let grid = fs::read_to_string(folder.join("data").join("1.csv")).unwrap();
        assert_eq!(grid.lines().count(), 3);
        assert_eq!(grid.lines().next().unwrap(), "2.5,2.75");
    }
}
