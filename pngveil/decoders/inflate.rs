use std::io::Read;

use flate2::read::ZlibDecoder;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::decoders::header::ImageHeader;
use crate::utils::error::{VeilError, VeilResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterType {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl FilterType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(FilterType::None),
            1 => Some(FilterType::Sub),
            2 => Some(FilterType::Up),
            3 => Some(FilterType::Average),
            4 => Some(FilterType::Paeth),
            _ => None,
        }
    }
}

/// What to do with a scanline whose filter byte is not 0-4.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnknownFilterPolicy {
    /// Abort the decode with `UnknownFilterType`.
    #[default]
    Fail,
    /// Log it and repeat the previous reconstructed row in its place.
    CarryForward,
}

/// One row of the inflated stream: the filter byte and the `stride` filtered bytes after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scanline<'a> {
    pub row: u32,
    pub filter_byte: u8,
    pub raw: &'a [u8],
}

impl Scanline<'_> {
    pub fn filter_type(&self) -> Option<FilterType> {
        FilterType::from_u8(self.filter_byte)
    }
}

/// Splits inflated image data into `height` scanlines of `1 + stride` bytes each.
pub fn split_scanlines(data: &[u8], height: u32, stride: usize) -> VeilResult<Vec<Scanline<'_>>> {
    let row_len = stride + 1;
    let mut scanlines = Vec::with_capacity(height as usize);

    for row in 0..height {
        let start = row as usize * row_len;
        let available = data.len().saturating_sub(start);

        if available == 0 {
            return Err(VeilError::TruncatedImageData {
                row,
                expected: row_len,
                available,
            });
        }

        if available < row_len {
            return Err(VeilError::MalformedScanline {
                row,
                expected: stride,
                actual: available - 1,
            });
        }

        scanlines.push(Scanline {
            row,
            filter_byte: data[start],
            raw: &data[start + 1..start + row_len],
        });
    }

    let used = height as usize * row_len;
    if data.len() > used {
        warn!("Ignoring {} bytes of image data past the last scanline", data.len() - used);
    }

    Ok(scanlines)
}

pub fn unfilter_sub(src: &[u8], dst: &mut [u8], bytes_per_pixel: usize) {
    for i in 0..src.len() {
        let left = if i >= bytes_per_pixel { dst[i - bytes_per_pixel] } else { 0 };
        dst[i] = src[i].wrapping_add(left);
    }
}

pub fn unfilter_up(src: &[u8], dst: &mut [u8], prior: &[u8]) {
    for i in 0..src.len() {
        dst[i] = src[i].wrapping_add(prior[i]);
    }
}

pub fn unfilter_average(src: &[u8], dst: &mut [u8], prior: &[u8], bytes_per_pixel: usize) {
    for i in 0..src.len() {
        let left = if i >= bytes_per_pixel { dst[i - bytes_per_pixel] as u16 } else { 0 };
        let above = prior[i] as u16;

        dst[i] = src[i].wrapping_add(((left + above) >> 1) as u8);
    }
}

pub fn unfilter_paeth(src: &[u8], dst: &mut [u8], prior: &[u8], bytes_per_pixel: usize) {
    for i in 0..src.len() {
        let (left, upper_left) = if i >= bytes_per_pixel {
            (dst[i - bytes_per_pixel], prior[i - bytes_per_pixel])
        } else {
            (0, 0)
        };

        dst[i] = src[i].wrapping_add(paeth_predictor(left, prior[i], upper_left));
    }
}

pub fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    // a = left, b = above, c = upper left
    let a = a as i16;
    let b = b as i16;
    let c = c as i16;

    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

/// Reverses `filter` for one row. `prior` is the previous reconstructed row (zeros above row 0).
pub fn unfilter_row(filter: FilterType, src: &[u8], dst: &mut [u8], prior: &[u8], bytes_per_pixel: usize) {
    debug_assert_eq!(src.len(), dst.len());
    debug_assert_eq!(src.len(), prior.len());

    match filter {
        FilterType::None => dst.copy_from_slice(src),
        FilterType::Sub => unfilter_sub(src, dst, bytes_per_pixel),
        FilterType::Up => unfilter_up(src, dst, prior),
        FilterType::Average => unfilter_average(src, dst, prior, bytes_per_pixel),
        FilterType::Paeth => unfilter_paeth(src, dst, prior, bytes_per_pixel),
    }
}

/// Reverses the per-row filters of already inflated image data.
///
/// The result is `height * stride` bytes of raw pixel data, row after row.
pub fn defilter(data: &[u8], header: &ImageHeader, policy: UnknownFilterPolicy) -> VeilResult<Vec<u8>> {
    let stride = header.stride();
    let bytes_per_pixel = header.bytes_per_pixel();
    let scanlines = split_scanlines(data, header.height, stride)?;

    let zero_row = vec![0u8; stride];
    let mut reconstructed = vec![0u8; header.height as usize * stride];

    for scanline in scanlines {
        let start = scanline.row as usize * stride;
        let (done, rest) = reconstructed.split_at_mut(start);
        let prior = if start == 0 { &zero_row[..] } else { &done[start - stride..] };
        let dst = &mut rest[..stride];

        match scanline.filter_type() {
            Some(filter) => unfilter_row(filter, scanline.raw, dst, prior, bytes_per_pixel),
            None => match policy {
                UnknownFilterPolicy::Fail => {
                    return Err(VeilError::UnknownFilterType {
                        row: scanline.row,
                        filter: scanline.filter_byte,
                    });
                }
                UnknownFilterPolicy::CarryForward => {
                    warn!(
                        "Unknown filter type {} at row {}, repeating the previous row",
                        scanline.filter_byte, scanline.row
                    );
                    dst.copy_from_slice(prior);
                }
            },
        }
    }

    Ok(reconstructed)
}

/// Collects `IDAT` payloads in file order and turns them back into raw pixel rows.
#[derive(Debug, Clone, Default)]
pub struct InflateEngine {
    compressed: Vec<u8>,
    chunk_count: usize,
}

impl InflateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.compressed.extend_from_slice(data);
        self.chunk_count += 1;
    }

    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    /// Number of `IDAT` chunks accumulated.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Inflates the accumulated zlib stream. Output is capped at `limit` bytes.
    pub fn inflate(&self, limit: usize) -> VeilResult<Vec<u8>> {
        if self.compressed.is_empty() {
            warn!("No IDAT data to inflate");
            return Ok(Vec::new());
        }

        let mut decoder = ZlibDecoder::new(self.compressed.as_slice()).take(limit as u64);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|source| VeilError::DecompressionError {
                compressed_len: self.compressed.len(),
                source,
            })?;

        debug!(
            "Inflated {} bytes from {} IDAT chunks into {} bytes",
            self.compressed.len(),
            self.chunk_count,
            decompressed.len()
        );

        Ok(decompressed)
    }

    /// Inflates and defilters in one go.
    pub fn reconstruct(&self, header: &ImageHeader, policy: UnknownFilterPolicy) -> VeilResult<Vec<u8>> {
        // One spare byte beyond the expected size is enough to notice trailing data
        let expected = header.height as usize * (header.stride() + 1);
        let decompressed = self.inflate(expected + 1)?;

        defilter(&decompressed, header, policy)
    }
}
