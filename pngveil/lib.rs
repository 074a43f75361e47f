pub mod decoders;
mod utils;

pub use decoders::chunk::{crc32, Chunk, ChunkKind, ChunkReader, PNG_SIGNATURE};
pub use decoders::header::{ColorType, HeaderLimits, ImageHeader, PaletteEntry, MAX_HEIGHT, MAX_WIDTH};
pub use decoders::inflate::{FilterType, InflateEngine, UnknownFilterPolicy};
pub use decoders::metadata::{MetadataFlags, MetadataScanner, TextEntry, BLUR_MARKER, GRAYSCALE_MARKER};
pub use decoders::payload::{
    embed_payload, embed_png, extract_payload, payload_chain, HiddenPayload, PayloadSummary, MAX_NESTING_DEPTH,
};
pub use decoders::pixels::{ColorMode, Pixel, PixelData, PixelGrid, PixelRow};
pub use decoders::session::{DecodedPng, DecoderConfig, ParsedPng, PngDecoder};
pub use utils::error::{VeilError, VeilResult};
pub use utils::info::{ChunkSummary, PngInfo};
pub use utils::logger::Logger;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Entry point for decoding a PNG and whatever it hides.
///
/// ```no_run
/// use pngveil::PngVeil;
///
/// let decoded = PngVeil::open("cat.png")?.decode()?;
/// if decoded.payload().is_png() {
///     let _nested = PngVeil::decode_nested(decoded.payload(), Default::default())?;
/// }
/// # Ok::<(), pngveil::VeilError>(())
/// ```
pub struct PngVeil<R: Read> {
    reader: R,
    config: DecoderConfig,
}

impl PngVeil<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> VeilResult<PngVeil<BufReader<File>>> {
        let file = File::open(path)?;
        Ok(PngVeil::new(BufReader::new(file)))
    }
}

impl<'a> PngVeil<&'a [u8]> {
    pub fn from_bytes(data: &'a [u8]) -> Self {
        PngVeil::new(data)
    }

    /// Decodes a nested PNG payload. Returns `None` when the payload is not a PNG.
    pub fn decode_nested(payload: &'a HiddenPayload, config: DecoderConfig) -> VeilResult<Option<DecodedPng>> {
        if !payload.is_png() {
            return Ok(None);
        }

        PngVeil::from_bytes(payload.bytes()).with_config(config).decode().map(Some)
    }
}

impl<R: Read> PngVeil<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            config: DecoderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Reads the chunk stream without decoding any pixels.
    pub fn parse(self) -> VeilResult<ParsedPng> {
        PngDecoder::with_config(self.reader, self.config).parse()
    }

    pub fn decode(self) -> VeilResult<DecodedPng> {
        self.parse()?.decode()
    }

    pub fn get_info(self) -> VeilResult<PngInfo> {
        Ok(self.parse()?.info())
    }
}
