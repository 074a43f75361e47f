use std::io::Read;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::decoders::chunk::{Chunk, ChunkKind, ChunkReader};
use crate::decoders::header::{parse_ihdr, parse_plte, ColorType, HeaderLimits, ImageHeader, PaletteEntry};
use crate::decoders::inflate::{InflateEngine, UnknownFilterPolicy};
use crate::decoders::metadata::{MetadataFlags, MetadataScanner, TextEntry};
use crate::decoders::payload::{payload_chain, HiddenPayload, MAX_NESTING_DEPTH};
use crate::decoders::pixels::{assemble, ColorMode, PixelGrid};
use crate::utils::error::{VeilError, VeilResult};
use crate::utils::info::{ChunkSummary, PngInfo};

/// Knobs for one decode.
///
/// The defaults reject images above 15000x15000 and skip CRC checks. They unwrap up to
/// [`MAX_NESTING_DEPTH`] nested payloads.
///
/// An unknown filter type fails the decode by default. The non-fatal behaviour, where the row is
/// logged and the previous reconstructed row repeated in its place, needs
/// `with_unknown_filter(UnknownFilterPolicy::CarryForward)`. The CLI's `--lenient-filters` sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub limits: HeaderLimits,
    pub unknown_filter: UnknownFilterPolicy,
    pub verify_crc: bool,
    pub max_nesting_depth: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            limits: HeaderLimits::default(),
            unknown_filter: UnknownFilterPolicy::Fail,
            verify_crc: false,
            max_nesting_depth: MAX_NESTING_DEPTH,
        }
    }
}

impl DecoderConfig {
    pub fn with_limits(mut self, max_width: u32, max_height: u32) -> Self {
        self.limits = HeaderLimits { max_width, max_height };
        self
    }

    pub fn with_unknown_filter(mut self, policy: UnknownFilterPolicy) -> Self {
        self.unknown_filter = policy;
        self
    }

    pub fn with_crc_verification(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }
}

/// Drives a single pass over a PNG stream.
pub struct PngDecoder<R: Read> {
    reader: R,
    config: DecoderConfig,
}

impl<R: Read> PngDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, DecoderConfig::default())
    }

    pub fn with_config(reader: R, config: DecoderConfig) -> Self {
        Self { reader, config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Reads the whole chunk stream and whatever follows `IEND`.
    ///
    /// Header limits are enforced on the first chunk, so an oversized image fails before any
    /// `IDAT` is buffered. Image data is only collected here, inflating it is left to
    /// [`ParsedPng::decode_pixels`].
    pub fn parse(self) -> VeilResult<ParsedPng> {
        let config = self.config;
        let mut reader = ChunkReader::new(self.reader)?;

        let first = reader
            .read_chunk()?
            .ok_or_else(|| VeilError::InvalidHeader("stream has no chunks".to_string()))?;
        check_crc(&config, 0, &first)?;

        let header = parse_ihdr(&first, &config.limits)?;
        info!(
            "PNG {}x{}, {:?}, {} bits per channel",
            header.width, header.height, header.color_type, header.bit_depth
        );

        let mut chunks = vec![first];
        let mut palette: Option<Vec<PaletteEntry>> = None;
        let mut idat = InflateEngine::new();
        let mut scanner = MetadataScanner::new();

        while let Some(chunk) = reader.read_chunk()? {
            let index = chunks.len();
            check_crc(&config, index, &chunk)?;

            match chunk.kind() {
                ChunkKind::IHDR => warn!("Ignoring duplicate IHDR chunk #{}", index),
                ChunkKind::PLTE => {
                    if header.color_type != ColorType::Indexed {
                        warn!("Ignoring PLTE chunk for {:?} image", header.color_type);
                    } else if palette.is_some() {
                        warn!("Ignoring duplicate PLTE chunk #{}", index);
                    } else {
                        palette = Some(parse_plte(&chunk, index)?);
                    }
                }
                ChunkKind::IDAT => idat.push(chunk.data()),
                ChunkKind::IEND => {}
                ChunkKind::TEXT | ChunkKind::ZTXT | ChunkKind::ITXT => {
                    scanner.scan(&chunk);
                }
                ChunkKind::Other(_) => debug!("Keeping {} chunk #{} uninterpreted", chunk.kind(), index),
            }

            chunks.push(chunk);
        }

        let payload = if reader.saw_end() {
            HiddenPayload::new(reader.into_remainder()?)
        } else {
            warn!("Stream ended after {} chunks without IEND", chunks.len());
            HiddenPayload::default()
        };

        if !payload.is_empty() {
            info!(
                "Found {} bytes after IEND{}",
                payload.len(),
                if payload.is_png() { " (nested PNG)" } else { "" }
            );
        }

        let (flags, text) = scanner.into_parts();
        if flags.any() {
            info!(
                "Metadata requests blur: {}, grayscale with alpha: {}",
                flags.should_blur(),
                flags.should_grayscale_with_alpha()
            );
        }

        Ok(ParsedPng {
            config,
            chunks,
            header,
            palette,
            idat,
            text,
            flags,
            payload,
        })
    }
}

fn check_crc(config: &DecoderConfig, index: usize, chunk: &Chunk) -> VeilResult<()> {
    if !config.verify_crc {
        return Ok(());
    }

    let computed = chunk.computed_crc();
    if computed != chunk.crc() {
        return Err(VeilError::CrcMismatch {
            index,
            kind: chunk.kind().to_string(),
            stored: chunk.crc(),
            computed,
        });
    }

    Ok(())
}

/// Everything one pass over the chunk stream collected, before any pixel work.
#[derive(Debug, Clone)]
pub struct ParsedPng {
    config: DecoderConfig,
    chunks: Vec<Chunk>,
    header: ImageHeader,
    palette: Option<Vec<PaletteEntry>>,
    idat: InflateEngine,
    text: Vec<TextEntry>,
    flags: MetadataFlags,
    payload: HiddenPayload,
}

impl ParsedPng {
    /// Chunks in file order, `IEND` included when present.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn palette(&self) -> Option<&[PaletteEntry]> {
        self.palette.as_deref()
    }

    pub fn idat(&self) -> &InflateEngine {
        &self.idat
    }

    pub fn text(&self) -> &[TextEntry] {
        &self.text
    }

    pub fn flags(&self) -> MetadataFlags {
        self.flags
    }

    pub fn payload(&self) -> &HiddenPayload {
        &self.payload
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// The hidden payload followed by every PNG nested inside it, up to the configured depth.
    pub fn payload_chain(&self) -> Vec<HiddenPayload> {
        payload_chain(&self.payload, self.config.max_nesting_depth)
    }

    /// Inflates, defilters and assembles the image data.
    pub fn decode_pixels(&self) -> VeilResult<PixelGrid> {
        let raw = self.idat.reconstruct(&self.header, self.config.unknown_filter)?;
        assemble(&raw, &self.header, self.palette())
    }

    pub fn decode(self) -> VeilResult<DecodedPng> {
        let grid = self.decode_pixels()?;

        Ok(DecodedPng {
            header: self.header,
            grid,
            flags: self.flags,
            text: self.text,
            payload: self.payload,
        })
    }

    pub fn info(&self) -> PngInfo {
        PngInfo {
            width: self.header.width,
            height: self.header.height,
            bit_depth: self.header.bit_depth,
            color_type: self.header.color_type,
            compression_method: self.header.compression_method,
            filter_method: self.header.filter_method,
            interlace_method: self.header.interlace_method,
            palette: self
                .palette
                .as_ref()
                .map(|entries| entries.iter().map(|e| [e.r, e.g, e.b]).collect()),
            idat_chunks: self.idat.chunk_count(),
            compressed_size: self.idat.compressed().len(),
            chunks: self
                .chunks
                .iter()
                .enumerate()
                .map(|(index, chunk)| ChunkSummary::new(index, chunk))
                .collect(),
            text_chunks: self.text.clone(),
            flags: self.flags,
            payload: self.payload.summary(),
        }
    }
}

/// A fully decoded image together with what the chunk scan found alongside it.
#[derive(Debug, Clone)]
pub struct DecodedPng {
    header: ImageHeader,
    grid: PixelGrid,
    flags: MetadataFlags,
    text: Vec<TextEntry>,
    payload: HiddenPayload,
}

impl DecodedPng {
    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn mode(&self) -> ColorMode {
        self.grid.mode()
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    pub fn flags(&self) -> MetadataFlags {
        self.flags
    }

    pub fn text(&self) -> &[TextEntry] {
        &self.text
    }

    pub fn payload(&self) -> &HiddenPayload {
        &self.payload
    }

    pub fn into_grid(self) -> PixelGrid {
        self.grid
    }
}
