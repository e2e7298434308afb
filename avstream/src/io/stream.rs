//! Byte-granular read/peek cursor over a [`ChunkChain`].
//!
//! Every read first checks [`ByteCursor::available`]; a failed check returns
//! [`CursorError::Underflow`] without consuming anything. Movement across
//! chunk boundaries walks the chain one chunk at a time, so positions are
//! never re-derived from scratch.

use crate::io::chunk::{Chunk, ChunkChain};
use crate::utils::errors::CursorError;

/// Text encodings understood by [`ByteCursor::read_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Latin1,
    Utf8,
    Utf16Be,
    Utf16Le,
    /// UTF-16 whose first two bytes are a byte order mark.
    Utf16Bom,
}

macro_rules! impl_multi_byte {
    ($($read:ident, $peek:ident, $ty:ty, $n:literal;)*) => {$(
        pub fn $read(&mut self, little_endian: bool) -> Result<$ty, CursorError> {
            let value = self.$peek(0, little_endian)?;
            self.advance($n)?;
            Ok(value)
        }

        pub fn $peek(&self, offset: u64, little_endian: bool) -> Result<$ty, CursorError> {
            let bytes = self.peek_array::<$n>(offset)?;
            Ok(if little_endian {
                <$ty>::from_le_bytes(bytes)
            } else {
                <$ty>::from_be_bytes(bytes)
            })
        }
    )*};
}

#[derive(Debug, Clone, Default)]
pub struct ByteCursor {
    chain: ChunkChain,
    local_offset: u64,
    offset: u64,
}

impl ByteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chain(chain: ChunkChain) -> Self {
        Self {
            chain,
            local_offset: 0,
            offset: 0,
        }
    }

    pub fn append(&mut self, chunk: Chunk) {
        self.chain.append(chunk);
    }

    pub fn chain(&self) -> &ChunkChain {
        &self.chain
    }

    /// Drops chunks that lie entirely before the cursor.
    pub fn release_consumed(&mut self) -> usize {
        self.chain.release_consumed()
    }

    /// Drops consumed chunks that end at or before the absolute offset `floor`.
    pub fn release_before(&mut self, floor: u64) -> usize {
        self.chain.release_before(floor)
    }

    /// Bytes consumed since the start of the stream.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Position inside the current head chunk.
    #[inline]
    pub fn local_offset(&self) -> u64 {
        self.local_offset
    }

    #[inline]
    pub fn remaining_bytes(&self) -> u64 {
        self.chain.available_bytes() - self.local_offset
    }

    #[inline]
    pub fn available(&self, bytes: u64) -> bool {
        bytes <= self.remaining_bytes()
    }

    /// Bytes the cursor can still move backwards over.
    fn rewindable(&self) -> u64 {
        self.offset - self.chain.released_bytes()
    }

    pub fn advance(&mut self, bytes: u64) -> Result<(), CursorError> {
        if !self.available(bytes) {
            return Err(CursorError::Underflow);
        }

        self.local_offset += bytes;
        self.offset += bytes;

        loop {
            let len = match self.chain.head() {
                Some(head) if self.local_offset >= head.len() as u64 => head.len() as u64,
                _ => break,
            };
            self.local_offset -= len;
            self.chain.advance();
        }

        Ok(())
    }

    pub fn rewind(&mut self, bytes: u64) -> Result<(), CursorError> {
        if bytes == 0 {
            return Ok(());
        }
        if bytes > self.rewindable() {
            return Err(CursorError::Underflow);
        }

        if self.chain.head().is_none() {
            self.chain.rewind();
            self.local_offset = self.chain.head().map_or(0, |c| c.len() as u64);
        }

        self.offset -= bytes;
        let mut local = self.local_offset as i64 - bytes as i64;
        while local < 0 {
            self.chain.rewind();
            local += self.chain.head().map_or(0, |c| c.len() as i64);
        }
        self.local_offset = local as u64;

        Ok(())
    }

    /// Moves to an absolute stream offset by the signed difference from here.
    pub fn seek(&mut self, position: u64) -> Result<(), CursorError> {
        if position > self.offset {
            self.advance(position - self.offset)
        } else {
            self.rewind(self.offset - position)
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        let value = self.peek_u8(0)?;
        self.advance(1)?;
        Ok(value)
    }

    pub fn peek_u8(&self, offset: u64) -> Result<u8, CursorError> {
        if !self.available(offset + 1) {
            return Err(CursorError::Underflow);
        }

        let mut position = self.local_offset + offset;
        let mut index = 0;
        while let Some(chunk) = self.chain.ahead(index) {
            let len = chunk.len() as u64;
            if position < len {
                return Ok(chunk[position as usize]);
            }
            position -= len;
            index += 1;
        }

        Err(CursorError::Underflow)
    }

    pub fn read_i8(&mut self) -> Result<i8, CursorError> {
        self.read_u8().map(|b| b as i8)
    }

    pub fn peek_i8(&self, offset: u64) -> Result<i8, CursorError> {
        self.peek_u8(offset).map(|b| b as i8)
    }

    /// Copies `N` bytes starting `offset` bytes past the cursor.
    pub fn peek_array<const N: usize>(&self, offset: u64) -> Result<[u8; N], CursorError> {
        if !self.available(offset + N as u64) {
            return Err(CursorError::Underflow);
        }

        let mut out = [0u8; N];
        let mut position = self.local_offset + offset;
        let mut filled = 0;
        let mut index = 0;
        while filled < N {
            let Some(chunk) = self.chain.ahead(index) else {
                return Err(CursorError::Underflow);
            };
            let len = chunk.len() as u64;
            if position < len {
                let start = position as usize;
                let take = (chunk.len() - start).min(N - filled);
                out[filled..filled + take].copy_from_slice(&chunk[start..start + take]);
                filled += take;
                position = 0;
            } else {
                position -= len;
            }
            index += 1;
        }

        Ok(out)
    }

    impl_multi_byte! {
        read_u16, peek_u16, u16, 2;
        read_i16, peek_i16, i16, 2;
        read_u32, peek_u32, u32, 4;
        read_i32, peek_i32, i32, 4;
        read_u64, peek_u64, u64, 8;
        read_i64, peek_i64, i64, 8;
        read_f32, peek_f32, f32, 4;
        read_f64, peek_f64, f64, 8;
    }

    pub fn read_u24(&mut self, little_endian: bool) -> Result<u32, CursorError> {
        let value = self.peek_u24(0, little_endian)?;
        self.advance(3)?;
        Ok(value)
    }

    pub fn peek_u24(&self, offset: u64, little_endian: bool) -> Result<u32, CursorError> {
        let [a, b, c] = self.peek_array::<3>(offset)?;
        Ok(if little_endian {
            u32::from(a) | u32::from(b) << 8 | u32::from(c) << 16
        } else {
            u32::from(a) << 16 | u32::from(b) << 8 | u32::from(c)
        })
    }

    pub fn read_i24(&mut self, little_endian: bool) -> Result<i32, CursorError> {
        let value = self.peek_i24(0, little_endian)?;
        self.advance(3)?;
        Ok(value)
    }

    pub fn peek_i24(&self, offset: u64, little_endian: bool) -> Result<i32, CursorError> {
        let unsigned = self.peek_u24(offset, little_endian)?;
        Ok(((unsigned << 8) as i32) >> 8)
    }

    pub fn read_f80(&mut self, little_endian: bool) -> Result<f64, CursorError> {
        let value = self.peek_f80(0, little_endian)?;
        self.advance(10)?;
        Ok(value)
    }

    /// IEEE 754 80-bit extended precision: sign, 15-bit exponent and a 64-bit
    /// mantissa with an explicit integer bit.
    pub fn peek_f80(&self, offset: u64, little_endian: bool) -> Result<f64, CursorError> {
        let mut bytes = self.peek_array::<10>(offset)?;
        if little_endian {
            bytes.reverse();
        }

        let negative = bytes[0] & 0x80 != 0;
        let exponent = i32::from(bytes[0] & 0x7f) << 8 | i32::from(bytes[1]);
        let mut mantissa = [0u8; 8];
        mantissa.copy_from_slice(&bytes[2..]);
        let mantissa = u64::from_be_bytes(mantissa);

        let magnitude = if exponent == 0 && mantissa == 0 {
            0.0
        } else if exponent == 0x7fff {
            if mantissa == 0 { f64::INFINITY } else { return Ok(f64::NAN) }
        } else {
            mantissa as f64 * 2f64.powi(exponent - 16383 - 63)
        };

        Ok(if negative { -magnitude } else { magnitude })
    }

    /// Reads `length` bytes. Zero-copy when they lie inside the head chunk.
    pub fn read_bytes(&mut self, length: u64) -> Result<Chunk, CursorError> {
        if !self.available(length) {
            return Err(CursorError::Underflow);
        }
        if length == 0 {
            return Ok(Chunk::default());
        }

        let local = self.local_offset as usize;
        let chunk = match self.chain.head() {
            Some(head) if local + length as usize <= head.len() => head.slice(local, length as usize),
            _ => {
                let mut data = Vec::with_capacity(length as usize);
                for i in 0..length {
                    data.push(self.peek_u8(i)?);
                }
                Chunk::from(data)
            }
        };

        self.advance(length)?;
        Ok(chunk)
    }

    /// Returns up to `length` bytes from the head chunk only, without copying.
    pub fn read_single_chunk(&mut self, length: u64) -> Result<Chunk, CursorError> {
        let chunk = self.peek_single_chunk(length)?;
        self.advance(chunk.len() as u64)?;
        Ok(chunk)
    }

    /// Empty when nothing past the cursor is buffered yet.
    pub fn peek_single_chunk(&self, length: u64) -> Result<Chunk, CursorError> {
        let Some(head) = self.chain.head().filter(|_| length > 0) else {
            return Ok(Chunk::default());
        };
        let local = self.local_offset as usize;
        let take = (head.len() - local).min(usize::try_from(length).unwrap_or(usize::MAX));
        Ok(head.slice(local, take))
    }

    /// Reads a string of `length` bytes, or up to and including a NUL
    /// terminator when `length` is `None`.
    pub fn read_string(
        &mut self,
        length: Option<u64>,
        encoding: Encoding,
    ) -> Result<String, CursorError> {
        let (text, consumed) = self.decode_string(0, length, encoding)?;
        self.advance(consumed)?;
        Ok(text)
    }

    pub fn peek_string(
        &self,
        offset: u64,
        length: Option<u64>,
        encoding: Encoding,
    ) -> Result<String, CursorError> {
        self.decode_string(offset, length, encoding).map(|(text, _)| text)
    }

    fn decode_string(
        &self,
        offset: u64,
        length: Option<u64>,
        encoding: Encoding,
    ) -> Result<(String, u64), CursorError> {
        if let Some(length) = length {
            if !self.available(offset + length) {
                return Err(CursorError::Underflow);
            }
        }
        let end = length.map(|l| offset + l);
        let terminated = length.is_none();

        let mut pos = offset;
        let text = match encoding {
            Encoding::Ascii | Encoding::Latin1 | Encoding::Utf8 => {
                let mut bytes = Vec::new();
                while end.is_none_or(|end| pos < end) {
                    let byte = self.peek_u8(pos)?;
                    pos += 1;
                    if terminated && byte == 0 {
                        break;
                    }
                    bytes.push(byte);
                }
                if encoding == Encoding::Utf8 {
                    String::from_utf8_lossy(&bytes).into_owned()
                } else {
                    bytes.into_iter().map(char::from).collect()
                }
            }
            Encoding::Utf16Be | Encoding::Utf16Le | Encoding::Utf16Bom => {
                let mut little_endian = encoding == Encoding::Utf16Le;
                if encoding == Encoding::Utf16Bom {
                    if let Some(length) = length.filter(|&l| l < 2) {
                        return Ok((String::new(), length));
                    }
                    let bom = self.peek_u16(pos, false)?;
                    pos += 2;
                    if terminated && bom == 0 {
                        return Ok((String::new(), pos - offset));
                    }
                    little_endian = bom == 0xfffe;
                }

                let mut units = Vec::new();
                while end.is_none_or(|end| pos + 1 < end) {
                    let unit = self.peek_u16(pos, little_endian)?;
                    pos += 2;
                    if terminated && unit == 0 {
                        break;
                    }
                    units.push(unit);
                }
                char::decode_utf16(units)
                    .collect::<Result<String, _>>()
                    .map_err(|_| CursorError::InvalidUtf16)?
            }
        };

        let consumed = length.unwrap_or(pos - offset);
        Ok((text, consumed))
    }
}
