//! Byte stream abstraction for serialization.
//!
//! The engine never touches files or sockets directly; it talks to a
//! seekable [`Stream`]. Seeking is required because column and archetype
//! lengths are backpatched after their payload is written.

use std::io;

use byteorder::{ByteOrder, LittleEndian};

/// A seekable byte stream. All engine integers are little-endian.
pub trait Stream {
    /// Write all given bytes at the current position.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read exactly `data.len()` bytes.
    fn read(&mut self, data: &mut [u8]) -> io::Result<()>;

    /// Current read/write position.
    fn position(&self) -> u64;

    /// Move the read/write position.
    fn set_position(&mut self, position: u64) -> io::Result<()>;

    /// Advance the position by `count` bytes.
    fn skip(&mut self, count: u64) -> io::Result<()> {
        self.set_position(self.position() + count)
    }
}

/// Fixed-width little-endian helpers over any [`Stream`].
///
/// Components use these from their `save`/`load` hooks; the serializer uses
/// them for every header field.
pub trait StreamExt: Stream {
    fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.write(&[value])
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write(&buf)
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.write(&buf)
    }

    fn read_u64(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.read(&mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    fn write_f32(&mut self, value: f32) -> io::Result<()> {
        let mut buf = [0u8; 4];
        LittleEndian::write_f32(&mut buf, value);
        self.write(&buf)
    }

    fn read_f32(&mut self) -> io::Result<f32> {
        let mut buf = [0u8; 4];
        self.read(&mut buf)?;
        Ok(LittleEndian::read_f32(&buf))
    }
}

impl<S: Stream + ?Sized> StreamExt for S {}

/// Seekable in-memory stream backed by a byte vector.
///
/// Writing past the end extends the buffer; reading past the end fails with
/// [`io::ErrorKind::UnexpectedEof`].
#[derive(Default)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: usize,
}

impl MemoryStream {
    /// A new, empty stream positioned at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing buffer, positioned at zero.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    /// The underlying bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the stream, returning the buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Reset the position to the start for reading back.
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl Stream for MemoryStream {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let end = self.position + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.position..end].copy_from_slice(data);
        self.position = end;
        Ok(())
    }

    fn read(&mut self, data: &mut [u8]) -> io::Result<()> {
        let end = self.position + data.len();
        if end > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of memory stream",
            ));
        }
        data.copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    fn set_position(&mut self, position: u64) -> io::Result<()> {
        if position > self.data.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek past end of memory stream",
            ));
        }
        self.position = position as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let mut stream = MemoryStream::new();
        stream.write_u32(0xdead_beef).unwrap();
        stream.write_u8(7).unwrap();
        stream.write_f32(1.5).unwrap();

        stream.rewind();
        assert_eq!(stream.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(stream.read_u8().unwrap(), 7);
        assert_eq!(stream.read_f32().unwrap(), 1.5);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut stream = MemoryStream::new();
        stream.write_u32(0x0102_0304).unwrap();
        assert_eq!(stream.data(), &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_backpatch_via_seek() {
        let mut stream = MemoryStream::new();
        stream.write_u32(0).unwrap();
        stream.write(b"payload").unwrap();
        let end = stream.position();

        stream.set_position(0).unwrap();
        stream.write_u32(7).unwrap();
        stream.set_position(end).unwrap();

        assert_eq!(stream.position(), 11);
        stream.rewind();
        assert_eq!(stream.read_u32().unwrap(), 7);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut stream = MemoryStream::from_vec(vec![1, 2]);
        let mut buf = [0u8; 4];
        assert!(stream.read(&mut buf).is_err());
    }

    #[test]
    fn test_seek_past_end_fails() {
        let mut stream = MemoryStream::from_vec(vec![1, 2]);
        assert!(stream.set_position(3).is_err());
    }
}
