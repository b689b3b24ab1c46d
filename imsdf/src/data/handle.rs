use std::fs;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use imscore::data::spectrum::Spectrum;
use log::{debug, warn};
use ndarray::{Array1, Array2};
use zip::ZipArchive;

use crate::data::meta::MeaMetaData;
use crate::data::utility::parse_i16_le;
use crate::error::{ImsDfError, Result};

/// Reads one measurement file into a [`Spectrum`].
pub trait SpectrumReader {
    fn read_spectrum(&self, path: &Path) -> Result<Spectrum>;
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Binary `.mea` files from the GAS instrument software.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeaReader;

impl SpectrumReader for MeaReader {
    fn read_spectrum(&self, path: &Path) -> Result<Spectrum> {
        let bytes = fs::read(path)?;
        let header_end = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ImsDfError::format(path, "header is not terminated by a NUL byte"))?;

        let header = String::from_utf8_lossy(&bytes[..header_end]);
        let meta = MeaMetaData::from_header(path, &header)?;
        let (rows, cols) = (meta.chunks_count, meta.chunk_sample_count);

        let mut samples = parse_i16_le(&bytes[header_end + 1..]);
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| ImsDfError::format(path, format!("grid of {}x{} samples is too large", rows, cols)))?;
        if samples.len() < expected {
            return Err(ImsDfError::format(
                path,
                format!("expected {} samples for a {}x{} grid, found {}", expected, rows, cols, samples.len()),
            ));
        }
        if samples.len() > expected {
            warn!("{}: ignoring {} trailing samples", path.display(), samples.len() - expected);
            samples.truncate(expected);
        }

        let values = Array2::from_shape_vec((rows, cols), samples)
            .map_err(|e| ImsDfError::format(path, e.to_string()))?;
        debug!("read {} with shape {:?}", path.display(), (rows, cols));

        Ok(Spectrum::new(
            file_stem(path),
            values,
            Array1::from(meta.retention_times()),
            Array1::from(meta.drift_times()),
        )?)
    }
}

/// Zip archives holding one CSV export of a measurement.
///
/// The first row holds the drift times after one leading cell, every further
/// row holds a retention time followed by the intensities.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCsvReader;

impl ZipCsvReader {
    pub fn parse_csv<R: Read>(&self, name: String, path: &Path, reader: R) -> Result<Spectrum> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let parse = |cell: &str| -> Result<f64> {
            cell.parse::<f64>()
                .map_err(|_| ImsDfError::format(path, format!("'{}' is not a number", cell)))
        };

        let mut records = csv_reader.records();
        let header = records
            .next()
            .ok_or_else(|| ImsDfError::format(path, "empty CSV"))??;
        let drift_time = header.iter().skip(1).map(parse).collect::<Result<Vec<f64>>>()?;

        let mut ret_time = Vec::new();
        let mut values = Vec::new();
        for record in records {
            let record = record?;
            let mut cells = record.iter();
            let Some(rt) = cells.next() else { continue };
            if rt.is_empty() {
                continue;
            }
            ret_time.push(parse(rt)?);
            let row = cells.map(parse).collect::<Result<Vec<f64>>>()?;
            if row.len() != drift_time.len() {
                return Err(ImsDfError::format(
                    path,
                    format!("row {} has {} values, expected {}", ret_time.len(), row.len(), drift_time.len()),
                ));
            }
            values.extend(row);
        }

        let values = Array2::from_shape_vec((ret_time.len(), drift_time.len()), values)
            .map_err(|e| ImsDfError::format(path, e.to_string()))?;
        Ok(Spectrum::new(name, values, Array1::from(ret_time), Array1::from(drift_time))?)
    }
}

impl SpectrumReader for ZipCsvReader {
    fn read_spectrum(&self, path: &Path) -> Result<Spectrum> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        if archive.len() == 0 {
            return Err(ImsDfError::format(path, "archive holds no CSV file"));
        }
        let entry = archive.by_index(0)?;
        debug!("reading {} from {}", entry.name(), path.display());
        self.parse_csv(file_stem(path), path, entry)
    }
}

/// Per file measurement formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SpectrumFormat {
    Mea,
    Zip,
}

impl SpectrumReader for SpectrumFormat {
    fn read_spectrum(&self, path: &Path) -> Result<Spectrum> {
        match self {
            SpectrumFormat::Mea => MeaReader.read_spectrum(path),
            SpectrumFormat::Zip => ZipCsvReader.read_spectrum(path),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use zip::write::SimpleFileOptions;

    /// Writes a `.mea` file with a `rows x cols` grid holding `i * cols + j + offset`.
    pub(crate) fn write_mea(path: &Path, rows: usize, cols: usize, offset: i16) {
        let mut bytes = format!(
            "Chunks count = {}\nChunk sample count = {}\nChunk averages = 4\n\
             Chunk trigger repetition = 20 [ms]\nChunk sample rate = 150 [kHz]\n",
            rows, cols
        )
        .into_bytes();
        bytes.push(0);
        for k in 0..rows * cols {
            bytes.extend_from_slice(&(k as i16 + offset).to_le_bytes());
        }
        fs::write(path, bytes).unwrap();
    }

    fn write_zip(path: &PathBuf, csv: &str) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("spectrum.csv", SimpleFileOptions::default()).unwrap();
        zip.write_all(csv.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_read_mea() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_01.mea");
        write_mea(&path, 3, 4, -2);

        let spectrum = SpectrumFormat::Mea.read_spectrum(&path).unwrap();
        assert_eq!(spectrum.name, "run_01");
        assert_eq!(spectrum.shape(), (3, 4));
        assert_eq!(spectrum.values[[0, 0]], -2.0);
        assert_eq!(spectrum.values[[2, 3]], 9.0);
        assert!((spectrum.ret_time[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_read_truncated_mea_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.mea");
        write_mea(&path, 3, 4, 0);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(MeaReader.read_spectrum(&path), Err(ImsDfError::Format { .. })));
    }

    #[test]
    fn test_oversized_mea_grid_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.mea");
        let mut bytes = b"Chunks count = 1e20\nChunk sample count = 1e20\nChunk averages = 4\n\
             Chunk trigger repetition = 20 [ms]\nChunk sample rate = 150 [kHz]\n"
            .to_vec();
        bytes.extend_from_slice(&[0, 1, 0, 2, 0]);
        fs::write(&path, bytes).unwrap();
        assert!(matches!(MeaReader.read_spectrum(&path), Err(ImsDfError::Format { .. })));
    }

    #[test]
    fn test_read_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_02.zip");
        write_zip(&path, "rt\\dt, 0.0, 0.5, 1.0\n0.0, 1, 2, 3\n0.1, 4, 5, 6\n");

        let spectrum = SpectrumFormat::Zip.read_spectrum(&path).unwrap();
        assert_eq!(spectrum.name, "run_02");
        assert_eq!(spectrum.shape(), (2, 3));
        assert_eq!(spectrum.drift_time.to_vec(), vec![0.0, 0.5, 1.0]);
        assert_eq!(spectrum.values[[1, 2]], 6.0);
    }

    #[test]
    fn test_zip_ragged_row_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.zip");
        write_zip(&path, "x,0.0,0.5\n0.0,1\n");
        assert!(ZipCsvReader.read_spectrum(&path).is_err());
    }
}
