//! Buffer primitives shared by every message codec: bounds-checked reads,
//! big-endian integer access, and the 1-byte / 3-byte frame length prefix.

use bytes::{BufMut, BytesMut};

use crate::constants::{EXTENDED_LENGTH_THRESHOLD, MAX_FRAME_LENGTH};
use crate::error::{CodecError, Result};

/// Parsed frame prefix: total length on the wire, number of bytes the
/// length prefix itself occupies, and the message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub total_length: usize,
    pub header_length: usize,
    pub message_type: u8,
}

impl FrameHeader {
    /// Parses the length prefix and type byte from the head of `buf`.
    ///
    /// # Errors
    /// `ShortBuffer` when the prefix is incomplete, `InvalidLength` when the
    /// declared length cannot hold the header itself or exceeds the buffer.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.is_empty() {
            return Err(CodecError::ShortBuffer {
                needed: 2,
                available: 0,
            });
        }

        let (total_length, length_bytes) = if buf[0] == 0x01 {
            if buf.len() < 4 {
                return Err(CodecError::ShortBuffer {
                    needed: 4,
                    available: buf.len(),
                });
            }
            (usize::from(u16::from_be_bytes([buf[1], buf[2]])), 3)
        } else {
            (usize::from(buf[0]), 1)
        };

        // Minimum frame is length + type.
        if total_length < length_bytes + 1 || total_length > MAX_FRAME_LENGTH {
            return Err(CodecError::InvalidLength(total_length));
        }
        if buf.len() < total_length {
            return Err(CodecError::ShortBuffer {
                needed: total_length,
                available: buf.len(),
            });
        }

        Ok(Self {
            total_length,
            header_length: length_bytes + 1,
            message_type: buf[length_bytes],
        })
    }

    /// The message body, excluding length prefix and type byte.
    #[must_use]
    pub fn body<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.header_length..self.total_length]
    }
}

/// Writes the length prefix and type byte for a body of `body_len` bytes,
/// returning the complete frame buffer with the body appended by `fill`.
///
/// # Errors
/// `InvalidLength` when the resulting frame exceeds the maximum frame size.
pub fn write_frame<F>(message_type: u8, body_len: usize, fill: F) -> Result<BytesMut>
where
    F: FnOnce(&mut BytesMut),
{
    let short_total = body_len + 2;
    let total = if short_total > EXTENDED_LENGTH_THRESHOLD {
        body_len + 4
    } else {
        short_total
    };
    if total > MAX_FRAME_LENGTH {
        return Err(CodecError::InvalidLength(total));
    }

    let mut buf = BytesMut::with_capacity(total);
    if total > EXTENDED_LENGTH_THRESHOLD {
        buf.put_u8(0x01);
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u16(total as u16);
    } else {
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(total as u8);
    }
    buf.put_u8(message_type);
    fill(&mut buf);
    debug_assert_eq!(buf.len(), total);
    Ok(buf)
}

/// Bounds-checked cursor over a message body.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn ensure(&self, count: usize) -> Result<()> {
        if self.remaining() < count {
            return Err(CodecError::ShortBuffer {
                needed: self.pos + count,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        let v = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let v = u32::from_be_bytes([
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(v)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.ensure(count)?;
        let v = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(v)
    }

    /// Consumes everything left in the body.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let v = &self.buf[self.pos..];
        self.pos = self.buf.len();
        v
    }

    /// Consumes the rest of the body as UTF-8.
    ///
    /// # Errors
    /// `FieldOutOfRange` when the bytes are not valid UTF-8.
    pub fn read_rest_utf8(&mut self, field: &'static str) -> Result<String> {
        let bytes = self.read_rest();
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::FieldOutOfRange(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_frame_header() {
        assert!(matches!(
            FrameHeader::parse(&[]),
            Err(CodecError::ShortBuffer { .. })
        ));
        assert!(matches!(
            FrameHeader::parse(&[0x01, 0x00]),
            Err(CodecError::ShortBuffer { .. })
        ));
    }

    #[test]
    fn one_byte_length() {
        let frame = [0x03, 0x18, 0x00];
        let header = FrameHeader::parse(&frame).unwrap();
        assert_eq!(header.total_length, 3);
        assert_eq!(header.header_length, 2);
        assert_eq!(header.message_type, 0x18);
        assert_eq!(header.body(&frame), &[0x00]);
    }

    #[test]
    fn three_byte_length() {
        let mut frame = vec![0x01, 0x01, 0x0A, 0x0C];
        frame.extend_from_slice(&[0u8; 0x106]);
        let header = FrameHeader::parse(&frame).unwrap();
        assert_eq!(header.total_length, 0x10A);
        assert_eq!(header.header_length, 4);
        assert_eq!(header.message_type, 0x0C);
        assert_eq!(header.body(&frame).len(), 0x106);
    }

    #[test]
    fn declared_length_exceeds_buffer() {
        assert!(matches!(
            FrameHeader::parse(&[0x10, 0x0C, 0x00]),
            Err(CodecError::ShortBuffer { .. })
        ));
    }

    #[test]
    fn zero_length_rejected() {
        assert!(matches!(
            FrameHeader::parse(&[0x00, 0x0C]),
            Err(CodecError::InvalidLength(0))
        ));
    }

    #[test]
    fn write_frame_picks_extended_prefix() {
        let small = write_frame(0x0C, 10, |b| b.put_slice(&[0u8; 10])).unwrap();
        assert_eq!(small[0], 12);

        let large = write_frame(0x0C, 300, |b| b.put_slice(&[0u8; 300])).unwrap();
        assert_eq!(large[0], 0x01);
        assert_eq!(u16::from_be_bytes([large[1], large[2]]), 304);
        let header = FrameHeader::parse(&large).unwrap();
        assert_eq!(header.total_length, 304);
    }

    #[test]
    fn reader_bounds() {
        let mut reader = Reader::new(&[0xAB, 0xCD]);
        assert_eq!(reader.read_u16().unwrap(), 0xABCD);
        assert!(matches!(
            reader.read_u8(),
            Err(CodecError::ShortBuffer { .. })
        ));
    }
}
