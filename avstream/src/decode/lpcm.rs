//! Linear PCM in either byte order.

use anyhow::Result;

use super::{PacketReader, Samples};
use crate::demux::FormatDescriptor;
use crate::io::{BitCursor, ByteCursor};
use crate::utils::errors::{CursorError, DecodeError};

/// Upper bound on the bytes consumed by one packet.
pub const MAX_PACKET_BYTES: u64 = 4096;

#[derive(Debug, Default)]
pub struct LpcmReader;

fn read_n<T>(
    stream: &mut ByteCursor,
    count: usize,
    mut read: impl FnMut(&mut ByteCursor) -> Result<T, CursorError>,
) -> Result<Vec<T>, CursorError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read(stream)?);
    }
    Ok(out)
}

impl PacketReader for LpcmReader {
    fn init(&mut self, format: &mut FormatDescriptor) -> Result<()> {
        match (format.floating_point, format.bits_per_channel) {
            (false, 8 | 16 | 24 | 32) | (true, 32 | 64) => Ok(()),
            (_, bits) => Err(DecodeError::UnsupportedBitDepth(bits).into()),
        }
    }

    fn read_packet(
        &mut self,
        bits: &mut BitCursor,
        format: &FormatDescriptor,
    ) -> Result<Option<Samples>> {
        let stream = bits.stream_mut();
        let width = u64::from(format.bits_per_channel / 8);
        let count = (stream.remaining_bytes().min(MAX_PACKET_BYTES) / width) as usize;
        if count == 0 {
            return Ok(None);
        }

        let le = format.little_endian;
        let samples = match (format.floating_point, format.bits_per_channel) {
            (false, 8) => Samples::I8(read_n(stream, count, |s| s.read_i8())?),
            (false, 16) => Samples::I16(read_n(stream, count, |s| s.read_i16(le))?),
            (false, 24) => Samples::I32(read_n(stream, count, |s| s.read_i24(le))?),
            (false, 32) => Samples::I32(read_n(stream, count, |s| s.read_i32(le))?),
            (true, 32) => Samples::F32(read_n(stream, count, |s| s.read_f32(le))?),
            (true, 64) => Samples::F64(read_n(stream, count, |s| s.read_f64(le))?),
            (_, bits) => return Err(DecodeError::UnsupportedBitDepth(bits).into()),
        };
        Ok(Some(samples))
    }
}
