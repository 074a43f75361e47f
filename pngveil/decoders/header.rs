use log::warn;
use serde::{Deserialize, Serialize};

use crate::decoders::chunk::{Chunk, ChunkKind};
use crate::utils::error::{VeilError, VeilResult};
use crate::utils::traits::ByteSliceExt;

pub const MAX_WIDTH: u32 = 15_000;
pub const MAX_HEIGHT: u32 = 15_000;

const IHDR_LENGTH: usize = 13;
const MAX_PALETTE_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorType {
    Grayscale = 0,
    Truecolor = 2,
    Indexed = 3,
    GrayscaleAlpha = 4,
    TruecolorAlpha = 6,
}

impl ColorType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ColorType::Grayscale),
            2 => Some(ColorType::Truecolor),
            3 => Some(ColorType::Indexed),
            4 => Some(ColorType::GrayscaleAlpha),
            6 => Some(ColorType::TruecolorAlpha),
            _ => None,
        }
    }

    /// Bytes per pixel at 8 bits per channel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ColorType::Grayscale => 1,
            ColorType::Truecolor => 3,
            ColorType::Indexed => 1,
            ColorType::GrayscaleAlpha => 2,
            ColorType::TruecolorAlpha => 4,
        }
    }
}

/// Maximum accepted image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderLimits {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        Self {
            max_width: MAX_WIDTH,
            max_height: MAX_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub compression_method: u8,
    pub filter_method: u8,
    pub interlace_method: u8,
}

impl ImageHeader {
    pub fn bytes_per_pixel(&self) -> usize {
        self.color_type.bytes_per_pixel()
    }

    /// Bytes in one unfiltered scanline, not counting the filter byte.
    pub fn stride(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaletteEntry {
    pub index: u32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Interprets an `IHDR` chunk and checks it against `limits`.
///
/// The size check happens here so that an oversized image is rejected before a single
/// byte of image data is buffered.
pub fn parse_ihdr(chunk: &Chunk, limits: &HeaderLimits) -> VeilResult<ImageHeader> {
    if chunk.kind() != ChunkKind::IHDR {
        return Err(VeilError::InvalidHeader(format!("first chunk is {}, expected IHDR", chunk.kind())));
    }

    let data = chunk.data();
    if data.len() < IHDR_LENGTH {
        return Err(VeilError::InvalidHeader(format!(
            "expected {} data bytes, got {}",
            IHDR_LENGTH,
            data.len()
        )));
    }

    if data.len() > IHDR_LENGTH {
        warn!("IHDR carries {} trailing bytes, ignoring them", data.len() - IHDR_LENGTH);
    }

    let width = data.be_u32_at(0).unwrap_or_default();
    let height = data.be_u32_at(4).unwrap_or_default();
    let bit_depth = data[8];
    let color_type = data[9];
    let compression_method = data[10];
    let filter_method = data[11];
    let interlace_method = data[12];

    if width == 0 || height == 0 {
        return Err(VeilError::InvalidDimensions { width, height });
    }

    if width > limits.max_width || height > limits.max_height {
        return Err(VeilError::ImageTooLarge {
            width,
            height,
            max_width: limits.max_width,
            max_height: limits.max_height,
        });
    }

    if bit_depth != 8 {
        return Err(VeilError::UnsupportedBitDepth(bit_depth));
    }

    let color_type = ColorType::from_u8(color_type).ok_or(VeilError::UnsupportedColorType(color_type))?;

    if interlace_method != 0 {
        return Err(VeilError::UnsupportedInterlace(interlace_method));
    }

    if compression_method != 0 {
        warn!("Unknown compression method: {}, assuming deflate", compression_method);
    }

    if filter_method != 0 {
        warn!("Unknown filter method: {}, assuming adaptive filtering", filter_method);
    }

    Ok(ImageHeader {
        width,
        height,
        bit_depth,
        color_type,
        compression_method,
        filter_method,
        interlace_method,
    })
}

/// Interprets a `PLTE` chunk. `index` is the chunk's position in the stream, for error context.
pub fn parse_plte(chunk: &Chunk, index: usize) -> VeilResult<Vec<PaletteEntry>> {
    let data = chunk.data();

    if data.len() % 3 != 0 {
        return Err(VeilError::InvalidPalette {
            index,
            reason: format!("length {} is not a multiple of 3", data.len()),
        });
    }

    let entries = data.len() / 3;
    if entries > MAX_PALETTE_ENTRIES {
        return Err(VeilError::InvalidPalette {
            index,
            reason: format!("{} entries, at most {} allowed", entries, MAX_PALETTE_ENTRIES),
        });
    }

    Ok(data
        .chunks_exact(3)
        .enumerate()
        .map(|(i, rgb)| PaletteEntry {
            index: i as u32,
            r: rgb[0],
            g: rgb[1],
            b: rgb[2],
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::chunk::tests::raw_chunk;
    use crate::decoders::chunk::ChunkReader;
    use std::io::Cursor;

    fn chunk_from(tag: &[u8; 4], data: &[u8]) -> Chunk {
        let mut bytes = crate::decoders::chunk::PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&raw_chunk(tag, data));

        ChunkReader::new(Cursor::new(bytes))
            .and_then(|mut reader| reader.read_chunk())
            .ok()
            .flatten()
            .expect("test chunk should parse")
    }

    fn ihdr_data(width: u32, height: u32, bit_depth: u8, color_type: u8, interlace: u8) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[bit_depth, color_type, 0, 0, interlace]);
        data
    }

    #[test]
    fn parses_geometry_and_format() -> VeilResult<()> {
        let chunk = chunk_from(b"IHDR", &ihdr_data(640, 480, 8, 6, 0));
        let header = parse_ihdr(&chunk, &HeaderLimits::default())?;

        assert_eq!(header.width, 640);
        assert_eq!(header.height, 480);
        assert_eq!(header.color_type, ColorType::TruecolorAlpha);
        assert_eq!(header.bytes_per_pixel(), 4);
        assert_eq!(header.stride(), 2560);

        Ok(())
    }

    #[test]
    fn rejects_dimensions_above_limits() {
        let limits = HeaderLimits { max_width: 100, max_height: 100 };

        let chunk = chunk_from(b"IHDR", &ihdr_data(101, 10, 8, 2, 0));
        assert!(matches!(
            parse_ihdr(&chunk, &limits),
            Err(VeilError::ImageTooLarge { width: 101, height: 10, .. })
        ));

        let chunk = chunk_from(b"IHDR", &ihdr_data(10, 15_001, 8, 2, 0));
        assert!(matches!(
            parse_ihdr(&chunk, &HeaderLimits::default()),
            Err(VeilError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_formats() {
        let limits = HeaderLimits::default();

        let chunk = chunk_from(b"IHDR", &ihdr_data(4, 4, 16, 2, 0));
        assert!(matches!(parse_ihdr(&chunk, &limits), Err(VeilError::UnsupportedBitDepth(16))));

        let chunk = chunk_from(b"IHDR", &ihdr_data(4, 4, 8, 5, 0));
        assert!(matches!(parse_ihdr(&chunk, &limits), Err(VeilError::UnsupportedColorType(5))));

        let chunk = chunk_from(b"IHDR", &ihdr_data(4, 4, 8, 2, 1));
        assert!(matches!(parse_ihdr(&chunk, &limits), Err(VeilError::UnsupportedInterlace(1))));

        let chunk = chunk_from(b"IHDR", &ihdr_data(0, 4, 8, 2, 0));
        assert!(matches!(parse_ihdr(&chunk, &limits), Err(VeilError::InvalidDimensions { .. })));

        let chunk = chunk_from(b"IHDR", &[0; 5]);
        assert!(matches!(parse_ihdr(&chunk, &limits), Err(VeilError::InvalidHeader(_))));

        let chunk = chunk_from(b"IDAT", &ihdr_data(4, 4, 8, 2, 0));
        assert!(matches!(parse_ihdr(&chunk, &limits), Err(VeilError::InvalidHeader(_))));
    }

    #[test]
    fn parses_palette_entries() -> VeilResult<()> {
        let chunk = chunk_from(b"PLTE", &[255, 0, 0, 0, 255, 0]);
        let palette = parse_plte(&chunk, 1)?;

        assert_eq!(palette.len(), 2);
        assert_eq!(palette[1], PaletteEntry { index: 1, r: 0, g: 255, b: 0 });

        Ok(())
    }

    #[test]
    fn rejects_malformed_palettes() {
        let chunk = chunk_from(b"PLTE", &[1, 2, 3, 4]);
        assert!(matches!(parse_plte(&chunk, 2), Err(VeilError::InvalidPalette { index: 2, .. })));

        let chunk = chunk_from(b"PLTE", &[0; 257 * 3]);
        assert!(matches!(parse_plte(&chunk, 2), Err(VeilError::InvalidPalette { .. })));
    }
}
