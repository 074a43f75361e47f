use std::io::Read;

use flate2::read::ZlibDecoder;
use log::{debug, warn};
use serde::Serialize;

use crate::decoders::chunk::{Chunk, ChunkKind};
use crate::utils::traits::ByteSliceExt;

/// Text containing this marks the image for blurring.
pub const BLUR_MARKER: &str = "18+";
/// Text containing this marks the image for grayscale conversion that keeps alpha.
pub const GRAYSCALE_MARKER: &str = "1950s vibe";

// Upper bound on inflated zTXt/iTXt text
const MAX_INFLATED_TEXT: u64 = 16 * 1024 * 1024;

/// Post-processing requests raised by text chunks. Flags only ever go from `false` to `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetadataFlags {
    should_blur: bool,
    should_grayscale_with_alpha: bool,
}

impl MetadataFlags {
    pub fn should_blur(&self) -> bool {
        self.should_blur
    }

    pub fn should_grayscale_with_alpha(&self) -> bool {
        self.should_grayscale_with_alpha
    }

    pub fn any(&self) -> bool {
        self.should_blur || self.should_grayscale_with_alpha
    }

    /// Raises whichever flags `text` asks for.
    pub fn observe(&mut self, text: &str) {
        if text.contains(BLUR_MARKER) {
            self.should_blur = true;
        }

        if text.contains(GRAYSCALE_MARKER) {
            self.should_grayscale_with_alpha = true;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TextEntry {
    Basic {
        keyword: String,
        text: String,
    },
    Compressed {
        keyword: String,
        text: String,
    },
    International {
        keyword: String,
        language_tag: String,
        translated_keyword: String,
        text: String,
    },
}

impl TextEntry {
    pub fn keyword(&self) -> &str {
        match self {
            TextEntry::Basic { keyword, .. }
            | TextEntry::Compressed { keyword, .. }
            | TextEntry::International { keyword, .. } => keyword,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            TextEntry::Basic { text, .. }
            | TextEntry::Compressed { text, .. }
            | TextEntry::International { text, .. } => text,
        }
    }
}

fn utf8(bytes: &[u8], what: &str) -> Result<String, String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| format!("{} is not valid UTF-8: {}", what, e))
}

fn inflate_text(compressed: &[u8]) -> Result<Vec<u8>, String> {
    let mut decoder = ZlibDecoder::new(compressed).take(MAX_INFLATED_TEXT);
    let mut inflated = Vec::new();

    decoder
        .read_to_end(&mut inflated)
        .map_err(|e| format!("compressed text does not inflate: {}", e))?;

    Ok(inflated)
}

fn decode_text(data: &[u8]) -> Result<TextEntry, String> {
    let (keyword, text) = data.split_at_nul().ok_or("no NUL separator after keyword")?;

    Ok(TextEntry::Basic {
        keyword: utf8(keyword, "keyword")?,
        text: utf8(text, "text")?,
    })
}

fn decode_ztxt(data: &[u8]) -> Result<TextEntry, String> {
    let (keyword, rest) = data.split_at_nul().ok_or("no NUL separator after keyword")?;
    let (&method, compressed) = rest.split_first().ok_or("missing compression method")?;

    if method != 0 {
        return Err(format!("unknown compression method {}", method));
    }

    Ok(TextEntry::Compressed {
        keyword: utf8(keyword, "keyword")?,
        text: utf8(&inflate_text(compressed)?, "text")?,
    })
}

fn decode_itxt(data: &[u8]) -> Result<TextEntry, String> {
    let (keyword, rest) = data.split_at_nul().ok_or("no NUL separator after keyword")?;

    let (flag, method, rest) = match rest {
        [flag, method, rest @ ..] => (*flag, *method, rest),
        _ => return Err("missing compression flag and method".to_string()),
    };

    let (language_tag, rest) = rest.split_at_nul().ok_or("unterminated language tag")?;
    let (translated_keyword, text) = rest.split_at_nul().ok_or("unterminated translated keyword")?;

    let text = match flag {
        0 => text.to_vec(),
        1 if method == 0 => inflate_text(text)?,
        1 => return Err(format!("unknown compression method {}", method)),
        _ => return Err(format!("invalid compression flag {}", flag)),
    };

    Ok(TextEntry::International {
        keyword: utf8(keyword, "keyword")?,
        language_tag: utf8(language_tag, "language tag")?,
        translated_keyword: utf8(translated_keyword, "translated keyword")?,
        text: utf8(&text, "text")?,
    })
}

/// Decodes text chunks and turns the markers they carry into [`MetadataFlags`].
///
/// A chunk that cannot be decoded is logged and skipped; it never fails the parse.
#[derive(Debug, Default)]
pub struct MetadataScanner {
    flags: MetadataFlags,
    entries: Vec<TextEntry>,
}

impl MetadataScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk to the scanner. Non-text chunks are ignored.
    ///
    /// Returns `true` if the chunk was a text chunk and decoded cleanly.
    pub fn scan(&mut self, chunk: &Chunk) -> bool {
        let decoded = match chunk.kind() {
            ChunkKind::TEXT => decode_text(chunk.data()),
            ChunkKind::ZTXT => decode_ztxt(chunk.data()),
            ChunkKind::ITXT => decode_itxt(chunk.data()),
            _ => return false,
        };

        match decoded {
            Ok(entry) => {
                debug!("{} chunk: keyword {:?}", chunk.kind(), entry.keyword());

                self.flags.observe(entry.text());
                self.entries.push(entry);

                true
            }
            Err(reason) => {
                warn!("Skipping {} chunk at offset {}: {}", chunk.kind(), chunk.offset(), reason);
                false
            }
        }
    }

    pub fn flags(&self) -> MetadataFlags {
        self.flags
    }

    pub fn entries(&self) -> &[TextEntry] {
        &self.entries
    }

    pub fn into_parts(self) -> (MetadataFlags, Vec<TextEntry>) {
        (self.flags, self.entries)
    }
}
