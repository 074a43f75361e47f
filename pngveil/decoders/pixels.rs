use log::warn;
use serde::Serialize;

use crate::decoders::header::{ColorType, ImageHeader, PaletteEntry};
use crate::utils::error::{VeilError, VeilResult};

/// How the rendering side should interpret the samples of a [`PixelGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorMode {
    L,
    RGB,
    Palette,
    LA,
    RGBA,
}

impl ColorMode {
    pub fn from_color_type(color_type: ColorType) -> Self {
        match color_type {
            ColorType::Grayscale => ColorMode::L,
            ColorType::Truecolor => ColorMode::RGB,
            ColorType::Indexed => ColorMode::Palette,
            ColorType::GrayscaleAlpha => ColorMode::LA,
            ColorType::TruecolorAlpha => ColorMode::RGBA,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, ColorMode::LA | ColorMode::RGBA)
    }

    /// Values per pixel.
    pub fn channels(&self) -> usize {
        match self {
            ColorMode::L | ColorMode::Palette => 1,
            ColorMode::LA => 2,
            ColorMode::RGB => 3,
            ColorMode::RGBA => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pixel {
    L(u8),
    RGB([u8; 3]),
    Index(u8),
    LA([u8; 2]),
    RGBA([u8; 4]),
}

/// Row-major pixel storage, one variant per color mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelData {
    L8(Vec<u8>),
    RGB8(Vec<[u8; 3]>),
    Indexed(Vec<u8>),
    LA8(Vec<[u8; 2]>),
    RGBA8(Vec<[u8; 4]>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::L8(data) | PixelData::Indexed(data) => data.len(),
            PixelData::RGB8(data) => data.len(),
            PixelData::LA8(data) => data.len(),
            PixelData::RGBA8(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens the pixels back into interleaved samples.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PixelData::L8(data) | PixelData::Indexed(data) => data.clone(),
            PixelData::RGB8(data) => data.iter().flatten().copied().collect(),
            PixelData::LA8(data) => data.iter().flatten().copied().collect(),
            PixelData::RGBA8(data) => data.iter().flatten().copied().collect(),
        }
    }
}

/// A borrowed view of one row of a [`PixelGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelRow<'a> {
    L8(&'a [u8]),
    RGB8(&'a [[u8; 3]]),
    Indexed(&'a [u8]),
    LA8(&'a [[u8; 2]]),
    RGBA8(&'a [[u8; 4]]),
}

impl PixelRow<'_> {
    pub fn len(&self) -> usize {
        match self {
            PixelRow::L8(row) | PixelRow::Indexed(row) => row.len(),
            PixelRow::RGB8(row) => row.len(),
            PixelRow::LA8(row) => row.len(),
            PixelRow::RGBA8(row) => row.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, x: usize) -> Option<Pixel> {
        match self {
            PixelRow::L8(row) => row.get(x).map(|&v| Pixel::L(v)),
            PixelRow::RGB8(row) => row.get(x).map(|&v| Pixel::RGB(v)),
            PixelRow::Indexed(row) => row.get(x).map(|&v| Pixel::Index(v)),
            PixelRow::LA8(row) => row.get(x).map(|&v| Pixel::LA(v)),
            PixelRow::RGBA8(row) => row.get(x).map(|&v| Pixel::RGBA(v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    mode: ColorMode,
    data: PixelData,
    palette: Vec<PaletteEntry>,
}

impl PixelGrid {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    /// The palette indexed pixels refer to. Empty for every other mode.
    pub fn palette(&self) -> &[PaletteEntry] {
        &self.palette
    }

    pub fn row(&self, y: u32) -> Option<PixelRow<'_>> {
        if y >= self.height {
            return None;
        }

        let width = self.width as usize;
        let range = y as usize * width..(y as usize + 1) * width;

        Some(match &self.data {
            PixelData::L8(data) => PixelRow::L8(&data[range]),
            PixelData::RGB8(data) => PixelRow::RGB8(&data[range]),
            PixelData::Indexed(data) => PixelRow::Indexed(&data[range]),
            PixelData::LA8(data) => PixelRow::LA8(&data[range]),
            PixelData::RGBA8(data) => PixelRow::RGBA8(&data[range]),
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = PixelRow<'_>> + '_ {
        (0..self.height).filter_map(move |y| self.row(y))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        self.row(y)?.get(x as usize)
    }

    /// Resolves palette indices into RGB triples. Indices past the end of the palette
    /// come out black.
    ///
    /// Returns `None` unless the grid is in palette mode.
    pub fn expand_palette(&self) -> Option<Vec<[u8; 3]>> {
        let PixelData::Indexed(indices) = &self.data else {
            return None;
        };

        Some(
            indices
                .iter()
                .map(|&index| {
                    self.palette
                        .get(index as usize)
                        .map(|entry| [entry.r, entry.g, entry.b])
                        .unwrap_or([0, 0, 0])
                })
                .collect(),
        )
    }
}

fn group<const N: usize>(raw: &[u8]) -> Vec<[u8; N]> {
    raw.chunks_exact(N)
        .map(|chunk| {
            let mut pixel = [0u8; N];
            pixel.copy_from_slice(chunk);
            pixel
        })
        .collect()
}

/// Groups reconstructed scanline bytes into pixels according to the header's color type.
///
/// `raw` must hold exactly `height * stride` bytes. Indexed images need a non-empty palette.
pub fn assemble(raw: &[u8], header: &ImageHeader, palette: Option<&[PaletteEntry]>) -> VeilResult<PixelGrid> {
    let expected = header.height as usize * header.stride();
    if raw.len() != expected {
        return Err(VeilError::TruncatedImageData {
            row: (raw.len() / header.stride().max(1)) as u32,
            expected,
            available: raw.len(),
        });
    }

    let mode = ColorMode::from_color_type(header.color_type);
    let mut palette_entries = Vec::new();

    let data = match header.color_type {
        ColorType::Grayscale => PixelData::L8(raw.to_vec()),
        ColorType::Truecolor => PixelData::RGB8(group::<3>(raw)),
        ColorType::Indexed => {
            let palette = match palette {
                Some(palette) if !palette.is_empty() => palette,
                _ => return Err(VeilError::MissingPalette),
            };

            let out_of_range = raw.iter().filter(|&&index| index as usize >= palette.len()).count();
            if out_of_range > 0 {
                warn!(
                    "{} pixels refer to palette entries past the {} available",
                    out_of_range,
                    palette.len()
                );
            }

            palette_entries = palette.to_vec();
            PixelData::Indexed(raw.to_vec())
        }
        ColorType::GrayscaleAlpha => PixelData::LA8(group::<2>(raw)),
        ColorType::TruecolorAlpha => PixelData::RGBA8(group::<4>(raw)),
    };

    Ok(PixelGrid {
        width: header.width,
        height: header.height,
        mode,
        data,
        palette: palette_entries,
    })
}
