use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imscore::data::dataset::Dataset;
use imscore::data::spectrum::Spectrum;
use log::{debug, info};

use crate::error::Result;
use crate::export::image::{create_label_tree, normalized, output_path};

/// Draws one spectrum to a file.
///
/// `title` is `<spectrum name>; <label>`, renderers that draw text put it above the plot.
pub trait PlotRenderer {
    /// File extension of the rendered plots, without the dot.
    fn extension(&self) -> &str;

    fn render(&self, spectrum: &Spectrum, title: &str, path: &Path) -> Result<()>;
}

/// Interpolate between two colors
fn interpolate_color(c1: Rgb<u8>, c2: Rgb<u8>, t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    Rgb([
        ((1.0 - t) * c1.0[0] as f64 + t * c2.0[0] as f64) as u8,
        ((1.0 - t) * c1.0[1] as f64 + t * c2.0[1] as f64) as u8,
        ((1.0 - t) * c1.0[2] as f64 + t * c2.0[2] as f64) as u8,
    ])
}

/// Maps a value in [0, 1] onto a black, blue, cyan, yellow, red scale.
pub fn heatmap_color(value: f64) -> Rgb<u8> {
    const STOPS: [Rgb<u8>; 5] = [
        Rgb([0, 0, 0]),
        Rgb([0, 0, 255]),
        Rgb([0, 255, 255]),
        Rgb([255, 255, 0]),
        Rgb([255, 0, 0]),
    ];
    let v = value.clamp(0.0, 1.0) * 4.0;
    let segment = (v as usize).min(3);
    interpolate_color(STOPS[segment], STOPS[segment + 1], v - segment as f64)
}

/// Color heatmap with drift time on the x axis and retention time growing upwards.
///
/// The image holds the heatmap only and carries no title. The title is logged
/// and the output path already names sample and spectrum.
#[derive(Debug, Clone)]
pub struct HeatmapRenderer {
    /// Edge length in pixels of one grid cell.
    pub scale: u32,
}

impl Default for HeatmapRenderer {
    fn default() -> Self {
        HeatmapRenderer { scale: 1 }
    }
}

impl HeatmapRenderer {
    pub fn heatmap(&self, spectrum: &Spectrum) -> RgbImage {
        let (rows, cols) = spectrum.shape();
        let scale = self.scale.max(1);
        let scaled = normalized(spectrum);
        RgbImage::from_fn(cols as u32 * scale, rows as u32 * scale, |x, y| {
            let j = (x / scale) as usize;
            let i = rows - 1 - (y / scale) as usize;
            heatmap_color(scaled[i * cols + j])
        })
    }
}

impl PlotRenderer for HeatmapRenderer {
    fn extension(&self) -> &str {
        "png"
    }

    fn render(&self, spectrum: &Spectrum, title: &str, path: &Path) -> Result<()> {
        self.heatmap(spectrum).save(path)?;
        debug!("rendered '{}' to {}", title, path.display());
        Ok(())
    }
}

pub fn plot_title(spectrum: &Spectrum, label: &str) -> String {
    format!("{}; {}", spectrum.name, label)
}

/// Folder used when no plot folder is given.
pub fn default_plot_folder(dataset: &Dataset) -> PathBuf {
    PathBuf::from(format!("{}_plots", dataset.name))
}

/// Renders every spectrum into `folder/<label>/<sample>_<name>.<ext>`.
pub fn export_plots(dataset: &Dataset, folder: &Path, renderer: &dyn PlotRenderer) -> Result<()> {
    create_label_tree(dataset, folder)?;
    for indices in dataset.sample_indices().values() {
        for &i in indices {
            let entry = &dataset.entries()[i];
            let path = output_path(folder, entry, renderer.extension());
            renderer.render(&entry.spectrum, &plot_title(&entry.spectrum, &entry.label), &path)?;
        }
    }
    info!("exported {} plots to {}", dataset.len(), folder.display());
    Ok(())
}
