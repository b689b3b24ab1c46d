use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use imscore::algorithm::vec_utils::unique_sorted;
use imscore::data::dataset::{Dataset, Entry};
use imscore::data::spectrum::Spectrum;
use log::{debug, info};

use crate::error::Result;

/// Intensities mapped linearly onto [0, 1]; a flat grid maps to 0.
pub fn normalized(spectrum: &Spectrum) -> Vec<f64> {
    let (min, max) = spectrum
        .values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    spectrum
        .values
        .iter()
        .map(|&v| if range > 0.0 { (v - min) / range } else { 0.0 })
        .collect()
}

/// Grayscale image of the grid, one pixel per value.
///
/// Columns follow the drift time axis, rows the retention time axis.
pub fn grayscale_image(spectrum: &Spectrum) -> GrayImage {
    let (rows, cols) = spectrum.shape();
    let scaled = normalized(spectrum);
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = scaled[y as usize * cols + x as usize];
        Luma([(v * 255.0).round() as u8])
    })
}

/// File stem of an exported spectrum, `<sample>_<name>` so that equal file
/// names from different samples of one label stay apart.
pub fn output_stem(entry: &Entry) -> String {
    if entry.sample.is_empty() {
        entry.spectrum.name.clone()
    } else {
        format!("{}_{}", entry.sample, entry.spectrum.name)
    }
}

/// Output path of an exported spectrum inside the label tree.
pub fn output_path(folder: &Path, entry: &Entry, extension: &str) -> PathBuf {
    folder.join(&entry.label).join(format!("{}.{}", output_stem(entry), extension))
}

pub fn export_image(spectrum: &Spectrum, path: &Path) -> Result<()> {
    grayscale_image(spectrum).save(path)?;
    debug!("saved {}", path.display());
    Ok(())
}

/// Creates `folder` with one subdirectory per label, `folder` must not exist.
pub fn create_label_tree(dataset: &Dataset, folder: &Path) -> Result<()> {
    fs::create_dir(folder)?;
    for label in unique_sorted(dataset.labels()) {
        fs::create_dir_all(folder.join(label))?;
    }
    Ok(())
}

/// Saves a grayscale image of every spectrum into `folder/<label>/`.
///
/// Meant as input for image classifiers, not as a plot.
pub fn export_images(dataset: &Dataset, folder: &Path) -> Result<()> {
    create_label_tree(dataset, folder)?;
    for indices in dataset.sample_indices().values() {
        for &i in indices {
            let entry = &dataset.entries()[i];
            export_image(&entry.spectrum, &output_path(folder, entry, "png"))?;
        }
    }
    info!("exported {} images to {}", dataset.len(), folder.display());
    Ok(())
}
