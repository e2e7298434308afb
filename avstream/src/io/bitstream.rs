//! Sub-byte cursor layered on a [`ByteCursor`].
//!
//! The absolute bit offset is `8 * byte_offset + bit_position`; decoders use
//! it as a retry checkpoint. Two read families are provided: MSB-first
//! ([`BitCursor::read`]) and LSB-first ([`BitCursor::read_lsb`]). Both are
//! limited to 40 bits per call.

use crate::io::chunk::Chunk;
use crate::io::stream::ByteCursor;
use crate::utils::errors::CursorError;

pub const MAX_READ_BITS: u32 = 40;

#[inline]
fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

#[inline]
fn to_signed(value: u64, bits: u32) -> i64 {
    if bits > 0 && value >> (bits - 1) & 1 == 1 {
        value as i64 - (1i64 << bits)
    } else {
        value as i64
    }
}

#[derive(Debug, Clone, Default)]
pub struct BitCursor {
    stream: ByteCursor,
    bit_position: u32,
}

impl BitCursor {
    pub fn new(stream: ByteCursor) -> Self {
        Self {
            stream,
            bit_position: 0,
        }
    }

    pub fn append(&mut self, chunk: Chunk) {
        self.stream.append(chunk);
    }

    pub fn stream(&self) -> &ByteCursor {
        &self.stream
    }

    /// Byte-level access. Only meaningful while [`BitCursor::is_aligned`].
    pub fn stream_mut(&mut self) -> &mut ByteCursor {
        &mut self.stream
    }

    #[inline]
    pub fn bit_position(&self) -> u32 {
        self.bit_position
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.bit_position == 0
    }

    /// Absolute bit offset from the start of the stream.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.stream.offset() * 8 + u64::from(self.bit_position)
    }

    #[inline]
    pub fn remaining_bits(&self) -> u64 {
        self.stream.remaining_bytes() * 8 - u64::from(self.bit_position)
    }

    #[inline]
    pub fn available(&self, bits: u64) -> bool {
        bits <= self.remaining_bits()
    }

    pub fn advance(&mut self, bits: u64) -> Result<(), CursorError> {
        if !self.available(bits) {
            return Err(CursorError::Underflow);
        }

        let position = u64::from(self.bit_position) + bits;
        self.stream.advance(position >> 3)?;
        self.bit_position = (position & 7) as u32;
        Ok(())
    }

    pub fn rewind(&mut self, bits: u64) -> Result<(), CursorError> {
        let position = i64::from(self.bit_position) - bits as i64;
        if position < 0 {
            self.stream.rewind(position.unsigned_abs().div_ceil(8))?;
        }
        self.bit_position = (position & 7) as u32;
        Ok(())
    }

    pub fn seek(&mut self, offset: u64) -> Result<(), CursorError> {
        let current = self.offset();
        if offset > current {
            self.advance(offset - current)
        } else {
            self.rewind(current - offset)
        }
    }

    /// Skips to the next byte boundary, consuming the partial byte.
    pub fn align(&mut self) -> Result<(), CursorError> {
        if self.bit_position != 0 {
            self.stream.advance(1)?;
            self.bit_position = 0;
        }
        Ok(())
    }

    fn check(&self, bits: u32) -> Result<u32, CursorError> {
        if bits > MAX_READ_BITS {
            return Err(CursorError::TooManyBits(bits));
        }
        if !self.available(u64::from(bits)) {
            return Err(CursorError::Underflow);
        }
        Ok((self.bit_position + bits).div_ceil(8))
    }

    pub fn peek(&self, bits: u32) -> Result<u64, CursorError> {
        if bits == 0 {
            return Ok(0);
        }
        let bytes = self.check(bits)?;

        let mut acc = 0u64;
        for i in 0..bytes {
            acc = acc << 8 | u64::from(self.stream.peek_u8(u64::from(i))?);
        }
        let span = self.bit_position + bits;
        Ok(acc >> (bytes * 8 - span) & mask(bits))
    }

    pub fn read(&mut self, bits: u32) -> Result<u64, CursorError> {
        let value = self.peek(bits)?;
        self.advance(u64::from(bits))?;
        Ok(value)
    }

    pub fn peek_signed(&self, bits: u32) -> Result<i64, CursorError> {
        self.peek(bits).map(|v| to_signed(v, bits))
    }

    pub fn read_signed(&mut self, bits: u32) -> Result<i64, CursorError> {
        self.read(bits).map(|v| to_signed(v, bits))
    }

    pub fn peek_lsb(&self, bits: u32) -> Result<u64, CursorError> {
        if bits == 0 {
            return Ok(0);
        }
        let bytes = self.check(bits)?;

        let mut acc = 0u64;
        for i in 0..bytes {
            acc |= u64::from(self.stream.peek_u8(u64::from(i))?) << (8 * i);
        }
        Ok(acc >> self.bit_position & mask(bits))
    }

    pub fn read_lsb(&mut self, bits: u32) -> Result<u64, CursorError> {
        let value = self.peek_lsb(bits)?;
        self.advance(u64::from(bits))?;
        Ok(value)
    }

    pub fn peek_lsb_signed(&self, bits: u32) -> Result<i64, CursorError> {
        self.peek_lsb(bits).map(|v| to_signed(v, bits))
    }

    pub fn read_lsb_signed(&mut self, bits: u32) -> Result<i64, CursorError> {
        self.read_lsb(bits).map(|v| to_signed(v, bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream_io::{BigEndian, BitRead, BitReader, LittleEndian};
    use std::io::Cursor;

    fn bits_over(data: &[u8]) -> BitCursor {
        let mut stream = BitCursor::default();
        stream.append(Chunk::from(data));
        stream
    }

    /// Same bytes, delivered in chunks of the given sizes.
    fn bits_split(data: &[u8], sizes: &[usize]) -> BitCursor {
        let mut stream = BitCursor::default();
        let mut rest = data;
        for &size in sizes.iter().cycle() {
            if rest.is_empty() {
                break;
            }
            let (head, tail) = rest.split_at(size.min(rest.len()));
            stream.append(Chunk::from(head));
            rest = tail;
        }
        stream
    }

    const DATA: [u8; 8] = [0x5d, 0x6f, 0xae, 0xc8, 0x70, 0x9a, 0x25, 0xf3];

    #[test]
    fn short_reads() {
        let mut bs = bits_over(&DATA[..2]);
        assert_eq!(bs.peek(2).unwrap(), 1);
        assert_eq!(bs.read(2).unwrap(), 1);
        assert_eq!(bs.read(4).unwrap(), 7);
        assert_eq!(bs.bit_position(), 6);
    }

    #[test]
    fn msb_reads_across_chunks() {
        let mut bs = bits_split(&DATA, &[1, 3, 2]);
        assert_eq!(bs.read(2).unwrap(), 1);
        assert_eq!(bs.read(4).unwrap(), 7);
        assert_eq!(bs.read(10).unwrap(), 0x16f);
        assert_eq!(bs.read(16).unwrap(), 0xaec8);
        assert_eq!(bs.peek(32).unwrap(), 0x709a25f3);
        assert_eq!(bs.peek(31).unwrap(), 0x384d12f9);
        assert_eq!(bs.read(31).unwrap(), 0x384d12f9);
        assert_eq!(bs.read(1).unwrap(), 1);
        assert!(!bs.available(1));
    }

    #[test]
    fn wide_msb_reads() {
        let mut bs = bits_over(&DATA[..5]);
        assert_eq!(bs.peek(40).unwrap(), 0x5d6faec870);
        assert_eq!(bs.read(2).unwrap(), 1);
        assert_eq!(bs.read(33).unwrap(), 0xeb7d7643);

        let ones = bits_over(&[0xff; 16]);
        for bits in 1..=40 {
            assert_eq!(ones.peek(bits).unwrap(), (1u64 << bits) - 1);
        }
    }

    #[test]
    fn too_many_bits_is_fatal() {
        let mut bs = bits_over(&[0xff; 16]);
        assert_eq!(bs.read(41), Err(CursorError::TooManyBits(41)));
        assert_eq!(bs.read(128), Err(CursorError::TooManyBits(128)));
        assert_eq!(bs.read_lsb(64), Err(CursorError::TooManyBits(64)));
        assert_eq!(bs.offset(), 0);
    }

    #[test]
    fn zero_bit_reads() {
        let mut bs = bits_over(&[]);
        assert_eq!(bs.read(0).unwrap(), 0);
        assert_eq!(bs.read_lsb_signed(0).unwrap(), 0);
        assert_eq!(bs.offset(), 0);
    }

    #[test]
    fn signed_msb_reads() {
        let mut bs = bits_over(&DATA);
        assert_eq!(bs.read_signed(4).unwrap(), 5);
        assert_eq!(bs.read_signed(4).unwrap(), -3);
        assert_eq!(bs.read_signed(4).unwrap(), 6);
        assert_eq!(bs.read_signed(4).unwrap(), -1);
        assert_eq!(bs.read_signed(8).unwrap(), -82);
        assert_eq!(bs.read_signed(12).unwrap(), -889);
        assert_eq!(bs.read_signed(8).unwrap(), 9);
        assert_eq!(bs.read_signed(19).unwrap(), -191751);
        assert_eq!(bs.read_signed(1).unwrap(), -1);

        let mut bs = bits_over(&DATA[..5]);
        bs.advance(1).unwrap();
        assert_eq!(bs.peek_signed(35).unwrap(), -9278133113);
    }

    #[test]
    fn lsb_reads() {
        let mut bs = bits_over(&[0xfc, 0x08]);
        assert_eq!(bs.read_lsb(4).unwrap(), 12);
        assert_eq!(bs.read_lsb(3).unwrap(), 7);
        assert_eq!(bs.read_lsb(9).unwrap(), 0x11);

        let mut bs = bits_over(&[0xfc, 0x08]);
        assert_eq!(bs.read_lsb_signed(4).unwrap(), -4);
        assert_eq!(bs.read_lsb_signed(3).unwrap(), -1);
        assert_eq!(bs.read_lsb_signed(9).unwrap(), 0x11);

        let mut bs = bits_split(&[0x70, 0x9a, 0x25, 0xf3], &[3, 1]);
        assert_eq!(bs.peek_lsb(32).unwrap(), 0xf3259a70);
        assert_eq!(bs.peek_lsb_signed(32).unwrap(), -215639440);
        assert_eq!(bs.read_lsb(31).unwrap(), 0x73259a70);
        assert_eq!(bs.read_lsb(1).unwrap(), 1);

        let mut bs = bits_over(&[0x70, 0x9a, 0x25, 0xf3]);
        assert_eq!(bs.read_lsb_signed(31).unwrap(), -215639440);
        assert_eq!(bs.read_lsb_signed(1).unwrap(), -1);
    }

    #[test]
    fn wide_lsb_reads() {
        let bs = bits_over(&[0xc8, 0x70, 0x9a, 0x25, 0xf3]);
        assert_eq!(bs.peek_lsb(40).unwrap(), 0xf3259a70c8);
        assert_eq!(bs.peek_lsb_signed(40).unwrap(), -55203696440);

        let bs = bits_split(&[0x70, 0x9a, 0x25, 0xff, 0xf3], &[2]);
        assert_eq!(bs.peek_lsb(40).unwrap(), 0xf3ff259a70);
        assert_eq!(bs.peek_lsb_signed(40).unwrap(), -51553920400);
    }

    #[test]
    fn bit_movement() {
        let mut bs = bits_split(&[10, 160], &[1]);
        assert!(bs.available(16));
        assert!(!bs.available(17));

        bs.advance(2).unwrap();
        assert_eq!(bs.bit_position(), 2);
        assert_eq!(bs.offset(), 2);
        bs.advance(7).unwrap();
        assert_eq!(bs.bit_position(), 1);
        assert_eq!(bs.offset(), 9);
        assert_eq!(bs.advance(40), Err(CursorError::Underflow));
        assert_eq!(bs.offset(), 9);

        bs.rewind(2).unwrap();
        assert_eq!(bs.bit_position(), 7);
        assert_eq!(bs.offset(), 7);
        bs.rewind(7).unwrap();
        assert_eq!(bs.offset(), 0);
        assert_eq!(bs.rewind(10), Err(CursorError::Underflow));
        assert_eq!(bs.offset(), 0);
    }

    #[test]
    fn seek_and_align() {
        let mut bs = bits_over(&[10, 160]);
        bs.seek(3).unwrap();
        assert_eq!(bs.offset(), 3);
        bs.seek(15).unwrap();
        assert_eq!(bs.read(1).unwrap(), 0);
        bs.seek(1).unwrap();
        assert_eq!(bs.offset(), 1);
        assert!(bs.seek(100).is_err());

        bs.seek(2).unwrap();
        bs.align().unwrap();
        assert_eq!(bs.offset(), 8);
        bs.align().unwrap();
        assert_eq!(bs.offset(), 8);
    }

    #[test]
    fn peek_then_read_and_rewind_agree() {
        let data: Vec<u8> = (0..64u32).map(|i| (i * 37 + 123) as u8).collect();
        for bits in 1..=MAX_READ_BITS {
            let mut bs = bits_split(&data, &[3, 1, 5]);
            bs.advance(u64::from(bits % 7)).unwrap();

            let peeked = bs.peek(bits).unwrap();
            let read = bs.read(bits).unwrap();
            assert_eq!(peeked, read, "msb {bits}");
            bs.rewind(u64::from(bits)).unwrap();
            assert_eq!(bs.read(bits).unwrap(), read, "msb reread {bits}");

            let peeked = bs.peek_lsb(bits).unwrap();
            let read = bs.read_lsb(bits).unwrap();
            assert_eq!(peeked, read, "lsb {bits}");
            bs.rewind(u64::from(bits)).unwrap();
            assert_eq!(bs.read_lsb(bits).unwrap(), read, "lsb reread {bits}");
        }
    }

    #[test]
    fn matches_bitstream_io_big_endian() {
        let data: Vec<u8> = (0..96u32).map(|i| (i * 37 + 123) as u8).collect();
        let mut ours = bits_split(&data, &[1, 2, 7]);
        let mut oracle = BitReader::<_, BigEndian>::new(Cursor::new(&data[..]));

        let mut width = 1u32;
        while ours.available(u64::from(width)) {
            if width >= 2 && width % 3 == 0 {
                let expected: i64 = oracle.read_signed_var(width).unwrap();
                assert_eq!(ours.read_signed(width).unwrap(), expected, "signed {width}");
            } else {
                let expected: u64 = oracle.read_unsigned_var(width).unwrap();
                assert_eq!(ours.read(width).unwrap(), expected, "unsigned {width}");
            }
            width = width % MAX_READ_BITS + 1;
        }
    }

    #[test]
    fn matches_bitstream_io_little_endian() {
        let data: Vec<u8> = (0..96u32).map(|i| (i * 91 + 7) as u8).collect();
        let mut ours = bits_split(&data, &[5, 1]);
        let mut oracle = BitReader::<_, LittleEndian>::new(Cursor::new(&data[..]));

        let mut width = 1u32;
        while ours.available(u64::from(width)) {
            let expected: u64 = oracle.read_unsigned_var(width).unwrap();
            assert_eq!(ours.read_lsb(width).unwrap(), expected, "lsb {width}");
            width = (width * 7) % MAX_READ_BITS + 1;
        }
    }
}
