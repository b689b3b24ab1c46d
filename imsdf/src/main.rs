//! # imsdf
//!
//! Command-line tool for GC-IMS spectrum collections.
//!
//! ## Usage
//!
//! ```bash
//! # Summary of a labeled measurement tree
//! imsdf info data/study --format mea --subfolders
//!
//! # Preprocess and store in the fast binary format
//! imsdf process data/study --subfolders --config pipeline.json --output study_processed
//!
//! # Heatmaps into study_plots/<label>/
//! imsdf process data/study --subfolders --export plots
//!
//! # Fold sizes of a stratified 5-fold split
//! imsdf cv study_processed --format binary --folds 5 --stratify --seed 1
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use imscore::data::dataset::Dataset;
use imscore::data::pipeline::PipelineConfig;
use imscore::error::DatasetError;
use imsdf::data::ingest::{load_dataset, InputFormat};
use imsdf::error::Result;
use imsdf::export::image::export_images;
use imsdf::export::io::{write_arrays, write_binary};
use imsdf::export::plot::{default_plot_folder, export_plots, HeatmapRenderer};

/// imsdf - GC-IMS dataset reader, preprocessor and exporter
#[derive(Parser)]
#[command(name = "imsdf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportKind {
    /// zstd compressed spectra plus SQLite label store
    Binary,
    /// CSV arrays plus encoded labels
    Arrays,
    /// Grayscale images per label
    Images,
    /// Heatmap plots per label
    Plots,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a summary of a dataset
    Info {
        /// Dataset directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        #[arg(short, long, value_enum, default_value = "mea")]
        format: InputFormat,

        /// Read labels and samples from a <label>/<sample>/<file> tree
        #[arg(short, long)]
        subfolders: bool,
    },

    /// Read, preprocess and export a dataset
    Process {
        /// Dataset directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output directory, must not exist. Plots default to <NAME>_plots
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "mea")]
        format: InputFormat,

        #[arg(short, long)]
        subfolders: bool,

        /// JSON pipeline, the default pipeline is used when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "binary")]
        export: ExportKind,

        /// Compression level for ZSTD
        #[arg(short = 'c', long, default_value = "3")]
        compression_level: i32,

        /// Threads used for compression
        #[arg(short = 't', long, default_value = "4")]
        num_threads: usize,
    },

    /// Print fold sizes of a k-fold split
    Cv {
        /// Dataset directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        #[arg(short, long, value_enum, default_value = "mea")]
        format: InputFormat,

        #[arg(short, long)]
        subfolders: bool,

        #[arg(short = 'k', long, default_value = "5")]
        folds: usize,

        /// Keep label proportions in every fold
        #[arg(long)]
        stratify: bool,

        /// Seed for shuffling, folds are consecutive without it
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Output folder of `process`, only plots may omit `--output`.
fn output_folder(output: Option<PathBuf>, export: ExportKind, dataset: &Dataset) -> Result<PathBuf> {
    match (output, export) {
        (Some(path), _) => Ok(path),
        (None, ExportKind::Plots) => Ok(default_plot_folder(dataset)),
        (None, _) => Err(DatasetError::Usage("--output is required unless exporting plots".to_string()).into()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Info { dir, format, subfolders } => {
            let dataset = load_dataset(&dir, format, subfolders)?;
            println!("{}", dataset);

            let mut labels: BTreeMap<&str, usize> = BTreeMap::new();
            for label in dataset.labels() {
                *labels.entry(label).or_default() += 1;
            }
            for (label, count) in &labels {
                println!("  label {:?}: {} spectra", label, count);
            }
            println!("  samples: {}", dataset.sample_indices().len());
            if let Some(first) = dataset.get(0) {
                println!("  first spectrum: {}", first);
            }
            if !dataset.preprocessing.is_empty() {
                println!("  preprocessing: {}", dataset.preprocessing.join(", "));
            }
        }

        Commands::Process {
            dir,
            output,
            format,
            subfolders,
            config,
            export,
            compression_level,
            num_threads,
        } => {
            let pipeline = match config {
                Some(path) => serde_json::from_str::<PipelineConfig>(&fs::read_to_string(path)?)?,
                None => PipelineConfig::default(),
            };

            let mut dataset = load_dataset(&dir, format, subfolders)?;
            dataset.apply_pipeline(&pipeline)?;
            info!("{} after {} steps", dataset, pipeline.steps.len());
            let output = output_folder(output, export, &dataset)?;

            match export {
                ExportKind::Binary => write_binary(&dataset, &output, compression_level, num_threads)?,
                ExportKind::Arrays => write_arrays(&dataset, &output)?,
                ExportKind::Images => export_images(&dataset, &output)?,
                ExportKind::Plots => export_plots(&dataset, &output, &HeatmapRenderer::default())?,
            }
            println!("{} written to {}", dataset, output.display());
        }

        Commands::Cv { dir, format, subfolders, folds, stratify, seed } => {
            let dataset = load_dataset(&dir, format, subfolders)?;
            println!("{}", dataset);
            let splits = dataset.kfold_split(folds, seed.is_some(), seed, stratify)?;
            for (k, fold) in splits.enumerate() {
                let fold = fold?;
                println!(
                    "  fold {}: {} train, {} test, {} features",
                    k + 1,
                    fold.x_train.nrows(),
                    fold.x_test.nrows(),
                    fold.x_train.ncols()
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::new(Vec::new(), "study", Vec::new(), Vec::new(), Vec::new()).unwrap()
    }

    #[test]
    fn test_plots_default_to_dataset_folder() {
        let folder = output_folder(None, ExportKind::Plots, &dataset()).unwrap();
        assert_eq!(folder, PathBuf::from("study_plots"));
        let given = output_folder(Some(PathBuf::from("out")), ExportKind::Plots, &dataset()).unwrap();
        assert_eq!(given, PathBuf::from("out"));
    }

    #[test]
    fn test_other_exports_need_output() {
        assert!(output_folder(None, ExportKind::Binary, &dataset()).is_err());
        assert!(output_folder(None, ExportKind::Arrays, &dataset()).is_err());
    }

    #[test]
    fn test_cli_parses_optional_output() {
        let cli = Cli::try_parse_from(["imsdf", "process", "data", "--export", "plots"]).unwrap();
        match cli.command {
            Commands::Process { output, export, .. } => {
                assert!(output.is_none());
                assert!(matches!(export, ExportKind::Plots));
            }
            _ => panic!("expected process"),
        }
    }
}
