use log::{debug, info, warn};
use serde::Serialize;

use crate::decoders::chunk::ChunkReader;
use crate::utils::error::{VeilError, VeilResult};
use crate::utils::traits::ByteSliceExt;

/// Default bound on how many payloads [`payload_chain`] will unwrap.
pub const MAX_NESTING_DEPTH: usize = 8;

/// Bytes found after the `IEND` chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HiddenPayload {
    bytes: Vec<u8>,
    is_png: bool,
}

impl HiddenPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        let is_png = bytes.starts_with_png_signature();
        Self { bytes, is_png }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Whether the payload starts with the PNG signature.
    pub fn is_png(&self) -> bool {
        self.is_png
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The payload as text, if it is valid UTF-8 and not a PNG.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_png || self.is_empty() {
            return None;
        }

        std::str::from_utf8(&self.bytes).ok()
    }

    /// Extracts the payload hidden inside this one, if this one is a PNG.
    pub fn nested(&self) -> VeilResult<Option<HiddenPayload>> {
        if !self.is_png {
            return Ok(None);
        }

        extract_payload(&self.bytes).map(Some)
    }

    pub fn summary(&self) -> PayloadSummary {
        PayloadSummary {
            length: self.bytes.len(),
            is_png: self.is_png,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayloadSummary {
    pub length: usize,
    pub is_png: bool,
}

/// Walks a PNG stream up to and including `IEND` and returns whatever follows.
///
/// Only chunk framing is checked, nothing is decompressed. A stream that ends without `IEND`
/// has no payload.
pub fn extract_payload(data: &[u8]) -> VeilResult<HiddenPayload> {
    let mut reader = ChunkReader::new(data)?;

    while reader.read_chunk()?.is_some() {}

    if !reader.saw_end() {
        warn!("Stream ended after {} chunks without IEND", reader.chunks_read());
        return Ok(HiddenPayload::default());
    }

    let payload = HiddenPayload::new(reader.into_remainder()?);
    if !payload.is_empty() {
        debug!("{} bytes after IEND (PNG: {})", payload.len(), payload.is_png());
    }

    Ok(payload)
}

/// Unwraps PNG-in-PNG payloads, outermost first, returning at most `max_depth` entries.
///
/// The walk ends at the first payload that is empty or not a PNG. A nested PNG that cannot
/// be framed ends the walk with a warning; the payloads found so far are still returned.
pub fn payload_chain(first: &HiddenPayload, max_depth: usize) -> Vec<HiddenPayload> {
    let mut chain = Vec::new();

    if first.is_empty() || max_depth == 0 {
        return chain;
    }

    chain.push(first.clone());

    while let Some(last) = chain.last() {
        if !last.is_png() {
            break;
        }

        if chain.len() >= max_depth {
            warn!("Stopping at nesting depth {}, deeper payloads are not extracted", max_depth);
            break;
        }

        match extract_payload(last.bytes()) {
            Ok(next) if next.is_empty() => break,
            Ok(next) => {
                debug!("Nested payload at depth {}: {} bytes", chain.len() + 1, next.len());
                chain.push(next);
            }
            Err(e) => {
                warn!("Nested PNG at depth {} is unreadable: {}", chain.len(), e);
                break;
            }
        }
    }

    chain
}

/// Appends `hidden` right after the `IEND` chunk that ends the chunk stream of `container`.
///
/// The container is walked chunk by chunk, so an earlier payload that happens to contain an
/// `IEND` tag (a nested PNG, say) is replaced along with everything else after the real end.
pub fn embed_payload(container: &[u8], hidden: &[u8]) -> VeilResult<Vec<u8>> {
    let mut reader = ChunkReader::new(container)?;

    while reader.read_chunk()?.is_some() {}

    if !reader.saw_end() {
        return Err(VeilError::MissingEnd);
    }

    let end = usize::try_from(reader.position()).map_err(|_| VeilError::MissingEnd)?;
    if end < container.len() {
        warn!("Replacing {} bytes that already followed IEND", container.len() - end);
    }

    let mut out = Vec::with_capacity(end + hidden.len());
    out.extend_from_slice(&container[..end]);
    out.extend_from_slice(hidden);

    info!("Embedded {} bytes after IEND at offset {}", hidden.len(), end);

    Ok(out)
}

/// Same as [`embed_payload`], but `hidden` must itself be a PNG.
pub fn embed_png(container: &[u8], hidden: &[u8]) -> VeilResult<Vec<u8>> {
    if !hidden.starts_with_png_signature() {
        return Err(VeilError::NotAPngFile);
    }

    embed_payload(container, hidden)
}
