use std::fmt::{self, Display, Formatter};
use std::io::Read;

use log::debug;
use serde::{Serialize, Serializer};

use crate::utils::bytereader::ByteReader;
use crate::utils::error::{VeilError, VeilResult};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

// Chunk lengths are limited to 2^31 - 1 by the PNG format
const MAX_CHUNK_LENGTH: u32 = i32::MAX as u32;

const CRC_TABLE: [u32; 256] = make_crc_table();

const fn make_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;

    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;

        while k < 8 {
            if c & 1 == 1 {
                c = 0xedb88320u32 ^ (c >> 1);
            } else {
                c >>= 1;
            }
            k += 1;
        }

        table[n] = c;
        n += 1;
    }

    table
}

fn update_crc(crc: u32, buf: &[u8]) -> u32 {
    buf.iter()
        .fold(crc, |c, &b| CRC_TABLE[((c ^ u32::from(b)) & 0xff) as usize] ^ (c >> 8))
}

/// CRC-32 as used by PNG chunks. For a chunk, `bytes` is the type tag followed by the data.
pub fn crc32(bytes: &[u8]) -> u32 {
    update_crc(0xffffffff, bytes) ^ 0xffffffff
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    // Critical chunks
    IHDR, // Image header
    PLTE, // Palette
    IDAT, // Image data
    IEND, // End of image

    // Text chunks
    TEXT, // Text
    ZTXT, // Compressed text
    ITXT, // International text

    // Anything else is kept but not interpreted
    Other([u8; 4]),
}

impl ChunkKind {
    pub fn from_tag(tag: [u8; 4]) -> Self {
        match &tag {
            b"IHDR" => ChunkKind::IHDR,
            b"PLTE" => ChunkKind::PLTE,
            b"IDAT" => ChunkKind::IDAT,
            b"IEND" => ChunkKind::IEND,
            b"tEXt" => ChunkKind::TEXT,
            b"zTXt" => ChunkKind::ZTXT,
            b"iTXt" => ChunkKind::ITXT,
            _ => ChunkKind::Other(tag),
        }
    }

    pub fn tag(&self) -> [u8; 4] {
        match self {
            ChunkKind::IHDR => *b"IHDR",
            ChunkKind::PLTE => *b"PLTE",
            ChunkKind::IDAT => *b"IDAT",
            ChunkKind::IEND => *b"IEND",
            ChunkKind::TEXT => *b"tEXt",
            ChunkKind::ZTXT => *b"zTXt",
            ChunkKind::ITXT => *b"iTXt",
            ChunkKind::Other(tag) => *tag,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ChunkKind::TEXT | ChunkKind::ZTXT | ChunkKind::ITXT)
    }
}

impl Display for ChunkKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.tag()))
    }
}

// Serialized as the four character tag
impl Serialize for ChunkKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One length-prefixed record from the chunk stream, exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    length: u32,
    kind: ChunkKind,
    data: Vec<u8>,
    crc: u32,
    offset: u64,
}

impl Chunk {
    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The CRC as stored in the file. Nothing checks it unless asked to.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Byte offset of the chunk's length field, counted from the start of the stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// CRC-32 over the type tag and data, the way the stored value is supposed to be computed.
    pub fn computed_crc(&self) -> u32 {
        let crc = update_crc(0xffffffff, &self.kind.tag());
        update_crc(crc, &self.data) ^ 0xffffffff
    }

    pub fn verify_crc(&self) -> bool {
        self.computed_crc() == self.crc
    }
}

/// Checks the 8 byte signature at the start of `reader`.
pub fn read_signature<R: Read>(reader: &mut ByteReader<R>) -> VeilResult<()> {
    let mut signature = [0u8; 8];
    let read = reader.fill(&mut signature)?;

    if read < signature.len() || signature != PNG_SIGNATURE {
        return Err(VeilError::NotAPngFile);
    }

    Ok(())
}

/// Lazily splits a byte stream into chunks.
///
/// Iteration stops after `IEND` or at a clean end of stream, and also stops for good after
/// the first error. Whatever follows `IEND` is left unread and can be taken with
/// [`ChunkReader::into_remainder`].
#[derive(Debug)]
pub struct ChunkReader<R: Read> {
    reader: ByteReader<R>,
    index: usize,
    finished: bool,
    saw_end: bool,
}

impl<R: Read> ChunkReader<R> {
    /// Validates the signature and positions the reader on the first chunk.
    pub fn new(reader: R) -> VeilResult<Self> {
        let mut reader = ByteReader::new(reader);
        read_signature(&mut reader)?;

        Ok(ChunkReader {
            reader,
            index: 0,
            finished: false,
            saw_end: false,
        })
    }

    /// Number of chunks yielded so far.
    pub fn chunks_read(&self) -> usize {
        self.index
    }

    /// Whether iteration stopped on an `IEND` chunk rather than at end of stream.
    pub fn saw_end(&self) -> bool {
        self.saw_end
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Reads the next chunk, or `None` once the stream is exhausted or `IEND` has been seen.
    pub fn read_chunk(&mut self) -> VeilResult<Option<Chunk>> {
        if self.finished {
            return Ok(None);
        }

        let result = self.read_chunk_inner();

        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }

        result
    }

    fn read_chunk_inner(&mut self) -> VeilResult<Option<Chunk>> {
        let offset = self.reader.position();

        let mut length_bytes = [0u8; 4];
        match self.reader.fill(&mut length_bytes)? {
            0 => return Ok(None),
            4 => {}
            n => return Err(self.corrupt(offset, format!("truncated length field ({} of 4 bytes)", n))),
        }

        let length = u32::from_be_bytes(length_bytes);
        if length > MAX_CHUNK_LENGTH {
            return Err(self.corrupt(offset, format!("length {} exceeds 2^31 - 1", length)));
        }

        let mut tag = [0u8; 4];
        if self.reader.fill(&mut tag)? < tag.len() {
            return Err(self.corrupt(offset, "truncated type tag".to_string()));
        }
        let kind = ChunkKind::from_tag(tag);

        let data = self.reader.read_bytes(length as usize)?;
        if data.len() < length as usize {
            return Err(self.corrupt(
                offset,
                format!("{} declares {} data bytes, only {} available", kind, length, data.len()),
            ));
        }

        let mut crc_bytes = [0u8; 4];
        if self.reader.fill(&mut crc_bytes)? < crc_bytes.len() {
            return Err(self.corrupt(offset, format!("{} is missing its CRC", kind)));
        }

        debug!("Chunk #{} {} at offset {}: {} bytes", self.index, kind, offset, length);

        self.index += 1;

        if kind == ChunkKind::IEND {
            self.saw_end = true;
            self.finished = true;
        }

        Ok(Some(Chunk {
            length,
            kind,
            data,
            crc: u32::from_be_bytes(crc_bytes),
            offset,
        }))
    }

    fn corrupt(&self, offset: u64, reason: String) -> VeilError {
        VeilError::CorruptChunk { index: self.index, offset, reason }
    }

    /// Consumes the reader and returns every byte it has not read yet.
    pub fn into_remainder(mut self) -> VeilResult<Vec<u8>> {
        Ok(self.reader.read_to_end()?)
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = VeilResult<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_chunk().transpose()
    }
}

impl<R: Read> std::iter::FusedIterator for ChunkReader<R> {}
