use std::io::{ErrorKind, Read};

/// Byte reader that keeps track of how far into the stream it is.
///
/// Reads report how many bytes actually arrived instead of failing on a short read, so callers
/// can tell a clean end of stream from one that stops mid-field.
#[derive(Debug)]
pub struct ByteReader<R: Read> {
    reader: R,
    position: u64,
}

impl<R: Read> ByteReader<R> {
    pub fn new(reader: R) -> Self {
        ByteReader { reader, position: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads until `buf` is full or the stream ends.
    ///
    /// # Returns
    /// - The number of bytes written into `buf`; less than `buf.len()` only at end of stream
    /// - `std::io::Error` if an I/O error other than an interruption occurs
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.position += filled as u64;

        Ok(filled)
    }

    /// Reads up to `n` bytes. The buffer grows as data arrives, so a bogus `n` does not
    /// allocate up front.
    ///
    /// # Returns
    /// - The bytes read; shorter than `n` only at end of stream
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, std::io::Error> {
        let mut bytes = Vec::new();
        let read = (&mut self.reader).take(n as u64).read_to_end(&mut bytes)?;
        self.position += read as u64;

        Ok(bytes)
    }

    /// Reads everything left in the stream.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>, std::io::Error> {
        let mut bytes = Vec::new();
        let read = self.reader.read_to_end(&mut bytes)?;
        self.position += read as u64;

        Ok(bytes)
    }
}
