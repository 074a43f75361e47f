use std::io;
use thiserror::Error;

/// Every fatal condition a decode can run into.
///
/// Non-fatal conditions (undecodable text chunks, a stray `PLTE`, trailing scanline bytes)
/// are logged and never surface here.
#[derive(Debug, Error)]
pub enum VeilError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Not a PNG file: signature mismatch")]
    NotAPngFile,

    #[error("Corrupt chunk #{index} at byte offset {offset}: {reason}")]
    CorruptChunk { index: usize, offset: u64, reason: String },

    #[error("Invalid IHDR chunk: {0}")]
    InvalidHeader(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Image too large: {width}x{height} exceeds the configured maximum of {max_width}x{max_height}")]
    ImageTooLarge { width: u32, height: u32, max_width: u32, max_height: u32 },

    #[error("Unsupported bit depth: {0} (only 8 bits per channel is supported)")]
    UnsupportedBitDepth(u8),

    #[error("Unsupported interlace method: {0}")]
    UnsupportedInterlace(u8),

    #[error("Unsupported color type: {0}")]
    UnsupportedColorType(u8),

    #[error("Invalid PLTE chunk #{index}: {reason}")]
    InvalidPalette { index: usize, reason: String },

    #[error("Indexed-color image has no palette")]
    MissingPalette,

    #[error("Failed to inflate {compressed_len} bytes of IDAT data: {source}")]
    DecompressionError { compressed_len: usize, source: io::Error },

    #[error("Image data truncated at row {row}: expected {expected} bytes, {available} available")]
    TruncatedImageData { row: u32, expected: usize, available: usize },

    #[error("Malformed scanline at row {row}: expected {expected} bytes after the filter byte, got {actual}")]
    MalformedScanline { row: u32, expected: usize, actual: usize },

    #[error("Unknown filter type {filter} at row {row}")]
    UnknownFilterType { row: u32, filter: u8 },

    #[error("CRC mismatch in chunk #{index} ({kind}): stored 0x{stored:08x}, computed 0x{computed:08x}")]
    CrcMismatch { index: usize, kind: String, stored: u32, computed: u32 },

    #[error("No IEND chunk found in container")]
    MissingEnd,
}

// Result type alias for pngveil operations
pub type VeilResult<T> = Result<T, VeilError>;
