use crate::decoders::chunk::{Chunk, ChunkKind};
use crate::decoders::header::ColorType;
use crate::decoders::metadata::{MetadataFlags, TextEntry};
use crate::decoders::payload::PayloadSummary;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub kind: ChunkKind,
    pub length: u32,
    pub offset: u64,
    pub crc: u32,
}

impl ChunkSummary {
    pub fn new(index: usize, chunk: &Chunk) -> Self {
        Self {
            index,
            kind: chunk.kind(),
            length: chunk.length(),
            offset: chunk.offset(),
            crc: chunk.crc(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PngInfo {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub compression_method: u8,
    pub filter_method: u8,
    pub interlace_method: u8,
    pub palette: Option<Vec<[u8; 3]>>,
    pub idat_chunks: usize,
    pub compressed_size: usize,
    pub chunks: Vec<ChunkSummary>,
    pub text_chunks: Vec<TextEntry>,
    pub flags: MetadataFlags,
    pub payload: PayloadSummary,
}
