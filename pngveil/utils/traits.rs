pub(crate) trait ByteSliceExt {
    fn be_u32_at(&self, offset: usize) -> Option<u32>;
    fn split_at_nul(&self) -> Option<(&[u8], &[u8])>;
    fn starts_with_png_signature(&self) -> bool;
}

impl ByteSliceExt for [u8] {
    /// Reads a big-endian `u32` starting at `offset`.
    ///
    /// # Returns
    ///
    /// * `Some(u32)` - The decoded value if four bytes are available at `offset`.
    /// * `None` - If the slice is too short.
    fn be_u32_at(&self, offset: usize) -> Option<u32> {
        let end = offset.checked_add(4)?;
        let bytes: [u8; 4] = self.get(offset..end)?.try_into().ok()?;

        Some(u32::from_be_bytes(bytes))
    }

    /// Splits the slice at the first NUL byte, dropping the separator.
    ///
    /// # Returns
    ///
    /// * `Some((before, after))` - The bytes on either side of the first NUL.
    /// * `None` - If the slice contains no NUL byte.
    fn split_at_nul(&self) -> Option<(&[u8], &[u8])> {
        let position = self.iter().position(|&b| b == 0)?;

        Some((&self[..position], &self[position + 1..]))
    }

    fn starts_with_png_signature(&self) -> bool {
        self.starts_with(&crate::decoders::chunk::PNG_SIGNATURE)
    }
}
