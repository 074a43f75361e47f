#[cfg(test)]
mod tests {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use pngveil::{
        crc32, embed_payload, embed_png, extract_payload, ChunkKind, ChunkReader, ColorMode, DecoderConfig, Pixel,
        PixelRow, PngVeil, UnknownFilterPolicy, VeilError, MAX_NESTING_DEPTH, PNG_SIGNATURE,
    };
    use proptest::prelude::*;
    use std::io::Write;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Small in-memory PNG writer, just enough to produce fixtures.
    struct Fixture {
        bytes: Vec<u8>,
    }

    impl Fixture {
        fn new(width: u32, height: u32, color_type: u8) -> Self {
            let mut ihdr = Vec::new();
            ihdr.extend_from_slice(&width.to_be_bytes());
            ihdr.extend_from_slice(&height.to_be_bytes());
            ihdr.extend_from_slice(&[8, color_type, 0, 0, 0]);

            let mut fixture = Fixture {
                bytes: PNG_SIGNATURE.to_vec(),
            };
            fixture.chunk(b"IHDR", &ihdr);
            fixture
        }

        fn chunk(&mut self, tag: &[u8; 4], data: &[u8]) -> &mut Self {
            let mut crc_input = tag.to_vec();
            crc_input.extend_from_slice(data);

            self.bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
            self.bytes.extend_from_slice(tag);
            self.bytes.extend_from_slice(data);
            self.bytes.extend_from_slice(&crc32(&crc_input).to_be_bytes());
            self
        }

        /// Compresses `scanlines` and spreads them over `parts` IDAT chunks.
        fn image_data(&mut self, scanlines: &[u8], parts: usize) -> &mut Self {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(scanlines).unwrap();
            let compressed = encoder.finish().unwrap();

            let size = compressed.len().div_ceil(parts).max(1);
            for part in compressed.chunks(size) {
                self.chunk(b"IDAT", part);
            }
            self
        }

        fn text(&mut self, keyword: &str, text: &str) -> &mut Self {
            let data = format!("{}\0{}", keyword, text);
            self.chunk(b"tEXt", data.as_bytes())
        }

        fn end(&mut self) -> Vec<u8> {
            self.chunk(b"IEND", &[]);
            self.bytes.clone()
        }
    }

    fn truecolor(width: u32, height: u32) -> Vec<u8> {
        let mut scanlines = Vec::new();
        for y in 0..height {
            scanlines.push(0);
            for x in 0..width {
                scanlines.extend_from_slice(&[x as u8, y as u8, (x + y) as u8]);
            }
        }

        Fixture::new(width, height, 2).image_data(&scanlines, 3).end()
    }

    #[test]
    fn test_truecolor_grid_shape() -> TestResult {
        let decoded = PngVeil::from_bytes(&truecolor(7, 5)).decode()?;

        assert_eq!(decoded.mode(), ColorMode::RGB);
        assert_eq!((decoded.width(), decoded.height()), (7, 5));

        let rows: Vec<PixelRow> = decoded.grid().rows().collect();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|row| row.len() == 7));
        assert_eq!(decoded.grid().pixel(6, 4), Some(Pixel::RGB([6, 4, 10])));

        Ok(())
    }

    #[test]
    fn test_all_filters_in_one_image() -> TestResult {
        // 3x1 grayscale rows, filtered by hand
        let scanlines = [
            0, 10, 20, 30, // None
            1, 5, 5, 5, // Sub
            2, 1, 1, 1, // Up
            3, 0, 0, 0, // Average
            4, 0, 0, 0, // Paeth
        ];
        let bytes = Fixture::new(3, 5, 0).image_data(&scanlines, 1).end();
        let grid = PngVeil::from_bytes(&bytes).decode()?.into_grid();

        let expected: [[u8; 3]; 5] = [[10, 20, 30], [5, 10, 15], [6, 11, 16], [3, 7, 11], [3, 7, 11]];
        for (y, row) in expected.iter().enumerate() {
            assert_eq!(grid.row(y as u32), Some(PixelRow::L8(row)));
        }

        Ok(())
    }

    #[test]
    fn test_not_a_png() {
        let result = PngVeil::from_bytes(b"GIF89a\x01\x00\x01\x00").parse();
        assert!(matches!(result, Err(VeilError::NotAPngFile)));

        assert!(matches!(ChunkReader::new(&b"short"[..]), Err(VeilError::NotAPngFile)));
    }

    #[test]
    fn test_image_too_large_before_idat() {
        let bytes = Fixture::new(20_000, 10, 2).chunk(b"IDAT", b"never inflated").end();

        assert!(matches!(
            PngVeil::from_bytes(&bytes).parse(),
            Err(VeilError::ImageTooLarge { width: 20_000, .. })
        ));

        let bytes = Fixture::new(64, 64, 2).chunk(b"IDAT", b"never inflated").end();
        let config = DecoderConfig::default().with_limits(32, 32);
        assert!(matches!(
            PngVeil::from_bytes(&bytes).with_config(config).parse(),
            Err(VeilError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn test_missing_palette_surfaces_at_assembly() -> TestResult {
        let bytes = Fixture::new(2, 2, 3).image_data(&[0, 0, 1, 0, 1, 0], 1).end();

        let parsed = PngVeil::from_bytes(&bytes).parse()?;
        assert!(parsed.palette().is_none());
        assert!(matches!(parsed.decode_pixels(), Err(VeilError::MissingPalette)));

        Ok(())
    }

    #[test]
    fn test_indexed_image_with_palette() -> TestResult {
        let bytes = Fixture::new(2, 1, 3)
            .chunk(b"PLTE", &[255, 0, 0, 0, 255, 0])
            .image_data(&[0, 1, 0], 1)
            .end();

        let decoded = PngVeil::from_bytes(&bytes).decode()?;
        assert_eq!(decoded.mode(), ColorMode::Palette);
        assert_eq!(decoded.grid().expand_palette(), Some(vec![[0, 255, 0], [255, 0, 0]]));

        Ok(())
    }

    #[test]
    fn test_metadata_flags() -> TestResult {
        let cases = [
            (vec![("Rating", "18+")], true, false),
            (vec![("Style", "very 1950s vibe")], false, true),
            (vec![("Comment", "18+ with a 1950s vibe")], true, true),
            (vec![("Author", "nobody")], false, false),
            (vec![("Rating", "18+"), ("Title", "later chunk")], true, false),
        ];

        for (texts, blur, grayscale) in cases {
            let mut fixture = Fixture::new(1, 1, 6);
            for (keyword, text) in texts {
                fixture.text(keyword, text);
            }
            let bytes = fixture.image_data(&[0, 1, 2, 3, 4], 1).end();

            let decoded = PngVeil::from_bytes(&bytes).decode()?;
            assert_eq!(decoded.flags().should_blur(), blur);
            assert_eq!(decoded.flags().should_grayscale_with_alpha(), grayscale);
        }

        Ok(())
    }

    #[test]
    fn test_broken_text_chunk_does_not_abort() -> TestResult {
        let bytes = Fixture::new(1, 1, 0)
            .chunk(b"tEXt", b"no separator")
            .chunk(b"tEXt", b"Bad\x00\xC3\x28")
            .image_data(&[0, 1], 1)
            .end();

        let decoded = PngVeil::from_bytes(&bytes).decode()?;
        assert!(decoded.text().is_empty());
        assert!(!decoded.flags().any());

        Ok(())
    }

    #[test]
    fn test_hidden_text_payload() -> TestResult {
        let mut bytes = truecolor(2, 2);
        bytes.extend_from_slice(b"the eagle lands at noon");

        let parsed = PngVeil::from_bytes(&bytes).parse()?;
        assert_eq!(parsed.payload().as_text(), Some("the eagle lands at noon"));
        assert!(!parsed.payload().is_png());
        assert_eq!(parsed.chunks().last().map(|c| c.kind()), Some(ChunkKind::IEND));

        Ok(())
    }

    #[test]
    fn test_nested_png_payload() -> TestResult {
        let inner = embed_payload(&truecolor(3, 3), b"deepest secret")?;
        let outer = embed_png(&truecolor(4, 4), &inner)?;

        let decoded = PngVeil::from_bytes(&outer).decode()?;
        assert_eq!(decoded.width(), 4);
        assert!(decoded.payload().is_png());
        assert_eq!(decoded.payload().bytes(), inner.as_slice());

        let nested = PngVeil::decode_nested(decoded.payload(), DecoderConfig::default())?
            .ok_or("payload should decode as PNG")?;
        assert_eq!(nested.width(), 3);
        assert_eq!(nested.payload().bytes(), b"deepest secret");

        let chain = PngVeil::from_bytes(&outer).parse()?.payload_chain();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].as_text(), Some("deepest secret"));

        Ok(())
    }

    #[test]
    fn test_nesting_depth_is_configurable() -> TestResult {
        let mut file = b"bottom".to_vec();
        for _ in 0..MAX_NESTING_DEPTH + 1 {
            file = embed_payload(&truecolor(1, 1), &file)?;
        }

        let chain = PngVeil::from_bytes(&file).parse()?.payload_chain();
        assert_eq!(chain.len(), MAX_NESTING_DEPTH);

        let config = DecoderConfig::default().with_max_nesting_depth(MAX_NESTING_DEPTH + 1);
        let chain = PngVeil::from_bytes(&file).with_config(config).parse()?.payload_chain();
        assert_eq!(chain.len(), MAX_NESTING_DEPTH + 1);
        assert_eq!(chain.last().map(|p| p.bytes()), Some(&b"bottom"[..]));

        Ok(())
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let mut bytes = truecolor(2, 2);
        // Drop IEND, then leave two bytes of a length field
        bytes.truncate(bytes.len() - 12);
        bytes.extend_from_slice(&[0, 0]);

        assert!(matches!(
            PngVeil::from_bytes(&bytes).parse(),
            Err(VeilError::CorruptChunk { .. })
        ));
    }

    #[test]
    fn test_unknown_filter_policy() -> TestResult {
        let bytes = Fixture::new(2, 2, 0).image_data(&[0, 3, 4, 9, 0, 0], 1).end();

        assert!(matches!(
            PngVeil::from_bytes(&bytes).decode(),
            Err(VeilError::UnknownFilterType { row: 1, filter: 9 })
        ));

        let config = DecoderConfig::default().with_unknown_filter(UnknownFilterPolicy::CarryForward);
        let grid = PngVeil::from_bytes(&bytes).with_config(config).decode()?.into_grid();
        assert_eq!(grid.row(1), Some(PixelRow::L8(&[3, 4])));

        Ok(())
    }

    #[test]
    fn test_info_serializes() -> TestResult {
        let mut bytes = Fixture::new(1, 1, 0).text("Rating", "18+").image_data(&[0, 0], 1).end();
        bytes.extend_from_slice(b"tail");

        let info = PngVeil::from_bytes(&bytes).get_info()?;
        assert_eq!(info.chunks.len(), 4);
        assert_eq!(info.payload.length, 4);
        assert!(info.flags.should_blur());
        assert!(info.text_chunks.iter().any(|t| t.keyword() == "Rating"));

        Ok(())
    }

    #[test]
    fn test_fixtures_pass_crc_verification() -> TestResult {
        let config = DecoderConfig::default().with_crc_verification(true);
        let decoded = PngVeil::from_bytes(&truecolor(3, 3)).with_config(config).decode()?;

        assert_eq!((decoded.width(), decoded.height()), (3, 3));

        Ok(())
    }

    proptest! {
        #[test]
        fn prop_embed_then_extract_round_trips(hidden in proptest::collection::vec(any::<u8>(), 0..512)) {
            let container = truecolor(2, 2);
            let stego = embed_payload(&container, &hidden).unwrap();
            let payload = extract_payload(&stego).unwrap();

            prop_assert_eq!(payload.bytes(), hidden.as_slice());
            prop_assert_eq!(payload.is_png(), hidden.starts_with(&PNG_SIGNATURE));
        }

        #[test]
        fn prop_re_embedding_replaces_the_old_payload(
            old in proptest::collection::vec(any::<u8>(), 0..256),
            new in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let carrier = embed_png(&truecolor(2, 2), &embed_payload(&truecolor(1, 1), &old).unwrap()).unwrap();
            let stego = embed_payload(&carrier, &new).unwrap();

            let extracted = extract_payload(&stego).unwrap();
            prop_assert_eq!(extracted.bytes(), new.as_slice());
        }

        #[test]
        fn prop_extraction_is_idempotent(tail in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut bytes = truecolor(1, 1);
            bytes.extend_from_slice(&tail);

            let first = extract_payload(&bytes).ok();
            let second = extract_payload(&bytes).ok();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_non_png_input_is_rejected(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assume!(!data.starts_with(&PNG_SIGNATURE));

            prop_assert!(matches!(PngVeil::from_bytes(&data).parse(), Err(VeilError::NotAPngFile)));
        }
    }
}
