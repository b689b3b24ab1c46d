use std::fs;
use std::path::{Path, PathBuf};

use imscore::data::dataset::Dataset;
use log::{debug, info};
use rayon::prelude::*;

use crate::data::handle::{SpectrumFormat, SpectrumReader};
use crate::error::{ImsDfError, Result};
use crate::export::io::read_binary;

/// Measurement file together with the names taken from its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub path: PathBuf,
    pub file: String,
    pub sample: String,
    pub label: String,
}

fn final_component(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sorted_entries(dir: &Path, want_dirs: bool) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() == want_dirs {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Lists the measurement files below `root` in sorted order.
///
/// With `subfolders` the layout is `root/<label>/<sample>/<file>` and label and
/// sample names come from the directory names. Otherwise every file directly in
/// `root` is a measurement with empty sample and label.
pub fn measurements(root: &Path, subfolders: bool) -> Result<Vec<Measurement>> {
    if !root.is_dir() {
        return Err(ImsDfError::format(root, "not a directory"));
    }

    if !subfolders {
        return Ok(sorted_entries(root, false)?
            .into_iter()
            .map(|path| Measurement {
                file: final_component(&path),
                sample: String::new(),
                label: String::new(),
                path,
            })
            .collect());
    }

    let mut found = Vec::new();
    for label_dir in sorted_entries(root, true)? {
        let label = final_component(&label_dir);
        for sample_dir in sorted_entries(&label_dir, true)? {
            let sample = final_component(&sample_dir);
            for path in sorted_entries(&sample_dir, false)? {
                found.push(Measurement {
                    file: final_component(&path),
                    sample: sample.clone(),
                    label: label.clone(),
                    path,
                });
            }
        }
    }
    Ok(found)
}

/// Reads every measurement below `root` into a dataset named after `root`.
///
/// # Arguments
///
/// * `root` - Directory with the data.
/// * `format` - Format of the individual measurement files.
/// * `subfolders` - Take labels and sample names from the directory tree.
pub fn read_dataset(root: &Path, format: SpectrumFormat, subfolders: bool) -> Result<Dataset> {
    let found = measurements(root, subfolders)?;
    info!("reading {} {:?} files from {}", found.len(), format, root.display());

    let data = found
        .par_iter()
        .map(|m| {
            debug!("reading {}", m.path.display());
            format.read_spectrum(&m.path)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut files = Vec::with_capacity(found.len());
    let mut samples = Vec::with_capacity(found.len());
    let mut labels = Vec::with_capacity(found.len());
    for m in found {
        files.push(m.file);
        samples.push(m.sample);
        labels.push(m.label);
    }

    Ok(Dataset::new(data, final_component(root), files, samples, labels)?)
}

/// Every on-disk layout a dataset can be loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputFormat {
    /// Directory of `.mea` files.
    Mea,
    /// Directory of zipped CSV exports.
    Zip,
    /// Folder written by the binary exporter.
    Binary,
}

pub fn load_dataset(root: &Path, format: InputFormat, subfolders: bool) -> Result<Dataset> {
    match format {
        InputFormat::Mea => read_dataset(root, SpectrumFormat::Mea, subfolders),
        InputFormat::Zip => read_dataset(root, SpectrumFormat::Zip, subfolders),
        InputFormat::Binary => read_binary(root),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::handle::tests::write_mea;

    fn tree(root: &Path) {
        for (label, sample, file, offset) in [
            ("healthy", "S2", "b.mea", 1),
            ("healthy", "S1", "a.mea", 0),
            ("sick", "S3", "c.mea", 2),
            ("sick", "S3", "d.mea", 3),
        ] {
            let dir = root.join(label).join(sample);
            fs::create_dir_all(&dir).unwrap();
            write_mea(&dir.join(file), 2, 3, offset);
        }
    }

    #[test]
    fn test_read_dataset_with_subfolders() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("study");
        tree(&root);

        let ds = read_dataset(&root, SpectrumFormat::Mea, true).unwrap();
        assert_eq!(ds.name, "study");
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.files(), vec!["a.mea", "b.mea", "c.mea", "d.mea"]);
        assert_eq!(ds.samples(), vec!["S1", "S2", "S3", "S3"]);
        assert_eq!(ds.labels(), vec!["healthy", "healthy", "sick", "sick"]);
        assert_eq!(ds.get(1).unwrap().values[[0, 0]], 1.0);
    }

    #[test]
    fn test_read_dataset_flat() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("flat");
        fs::create_dir(&root).unwrap();
        write_mea(&root.join("y.mea"), 2, 2, 0);
        write_mea(&root.join("x.mea"), 2, 2, 0);

        let ds = load_dataset(&root, InputFormat::Mea, false).unwrap();
        assert_eq!(ds.files(), vec!["x.mea", "y.mea"]);
        assert_eq!(ds.labels(), vec!["", ""]);
    }

    #[test]
    fn test_unreadable_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("junk.mea"), b"no header").unwrap();
        assert!(read_dataset(tmp.path(), SpectrumFormat::Mea, false).is_err());
    }

    #[test]
    fn test_missing_directory_fails() {
        assert!(measurements(Path::new("/definitely/not/here"), true).is_err());
    }
}
