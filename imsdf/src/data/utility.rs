use std::io;
use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use imscore::data::spectrum::Spectrum;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::error::Result;

/// Decompresses a ZSTD compressed byte array
///
/// # Arguments
///
/// * `compressed_data` - A byte slice that holds the compressed data
///
/// # Returns
///
/// * `decompressed_data` - A vector of u8 that holds the decompressed data
///
pub fn zstd_decompress(compressed_data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(compressed_data)?;
    let mut decompressed_data = Vec::new();
    decoder.read_to_end(&mut decompressed_data)?;
    Ok(decompressed_data)
}

/// Compresses a byte array using ZSTD
///
/// # Arguments
///
/// * `decompressed_data` - A byte slice that holds the decompressed data
/// * `compression_level` - ZSTD level, 0 selects the library default
///
/// # Returns
///
/// * `compressed_data` - A vector of u8 that holds the compressed data
///
pub fn zstd_compress(decompressed_data: &[u8], compression_level: i32) -> io::Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), compression_level)?;
    encoder.write_all(decompressed_data)?;
    let compressed_data = encoder.finish()?;
    Ok(compressed_data)
}

/// Interprets raw bytes as little endian `i16` samples.
///
/// A trailing odd byte is ignored.
pub fn parse_i16_le(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(2)
        .map(|chunk| LittleEndian::read_i16(chunk) as f64)
        .collect()
}

/// Encodes a spectrum with bincode and compresses the result.
pub fn compress_spectrum(spectrum: &Spectrum, compression_level: i32) -> Result<Vec<u8>> {
    let encoded = bincode::encode_to_vec(spectrum, bincode::config::standard())?;
    Ok(zstd_compress(&encoded, compression_level)?)
}

/// Inverse of [`compress_spectrum`].
pub fn decompress_spectrum(compressed_data: &[u8]) -> Result<Spectrum> {
    let decompressed = zstd_decompress(compressed_data)?;
    let (spectrum, _): (Spectrum, usize) =
        bincode::decode_from_slice(&decompressed, bincode::config::standard())?;
    Ok(spectrum)
}

/// Compresses all spectra in parallel, keeping their order.
pub fn compress_collection(spectra: &[Spectrum], compression_level: i32, num_threads: usize) -> Result<Vec<Vec<u8>>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(io::Error::other)?;

    pool.install(|| {
        spectra
            .par_iter()
            .map(|spectrum| compress_spectrum(spectrum, compression_level))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_parse_i16_le() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x07];
        assert_eq!(parse_i16_le(&bytes), vec![1.0, -1.0, -32768.0]);
    }

    #[test]
    fn test_spectrum_compression_roundtrip() {
        let spectrum = Spectrum::new(
            "run",
            array![[1.0, 2.0], [3.0, 4.5]],
            Array1::from(vec![0.0, 0.1]),
            Array1::from(vec![0.0, 0.02]),
        )
        .unwrap();
        let compressed = compress_collection(&[spectrum.clone()], 3, 2).unwrap();
        assert_eq!(compressed.len(), 1);
        assert_eq!(decompress_spectrum(&compressed[0]).unwrap(), spectrum);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress_spectrum(&[1, 2, 3, 4]).is_err());
    }
}
