//! Sun/NeXT `.au`.

use anyhow::Result;

use super::{ContainerParser, DemuxContext, DemuxEvent, FormatDescriptor, FourCC};
use crate::utils::errors::DemuxError;

const HEADER_SIZE: u64 = 24;
const UNKNOWN_SIZE: u32 = 0xffff_ffff;

/// Bits per sample for the encodings we can describe.
fn bits_for_encoding(encoding: u32) -> Option<u32> {
    Some(match encoding {
        1 | 2 | 27 => 8,
        3 => 16,
        4 => 24,
        5 | 6 => 32,
        7 => 64,
        _ => return None,
    })
}

#[derive(Debug, Default)]
pub struct AuParser {
    read_header: bool,
    /// Annotation bytes between the header and the data offset.
    skip: u64,
    /// `None` when the header leaves the data size open.
    remaining: Option<u64>,
}

impl AuParser {
    fn read_header(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        let stream = &mut ctx.stream;
        if &stream.peek_array::<4>(0)? != b".snd" {
            return Err(DemuxError::InvalidMagic {
                container: "AU",
                expected: FourCC(*b".snd"),
            }
            .into());
        }
        stream.advance(4)?;

        let data_offset = u64::from(stream.read_u32(false)?);
        let data_size = stream.read_u32(false)?;
        let encoding = stream.read_u32(false)?;
        let sample_rate = stream.read_u32(false)?;
        let channels = stream.read_u32(false)?;

        if data_offset < HEADER_SIZE {
            return Err(DemuxError::InvalidSize {
                name: FourCC(*b".snd"),
                size: data_offset,
            }
            .into());
        }
        let bits = bits_for_encoding(encoding).ok_or(DemuxError::UnsupportedEncoding {
            container: "AU",
            encoding,
        })?;

        let format_id = match encoding {
            1 => FourCC::ULAW,
            27 => FourCC::ALAW,
            _ => FourCC::LPCM,
        };
        let mut format = FormatDescriptor::pcm(format_id, sample_rate.into(), channels, bits);
        format.floating_point = matches!(encoding, 6 | 7);

        let frame_bytes = u64::from(bits / 8 * channels);
        ctx.emit(DemuxEvent::Format(format.clone()));
        if data_size != UNKNOWN_SIZE && frame_bytes > 0 {
            let frames = u64::from(data_size) / frame_bytes;
            ctx.emit(DemuxEvent::Duration(format.frames_to_ms(frames)));
        }

        self.skip = data_offset - HEADER_SIZE;
        self.remaining = (data_size != UNKNOWN_SIZE).then_some(data_size.into());
        Ok(())
    }
}

impl ContainerParser for AuParser {
    fn read_chunk(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        if !self.read_header {
            if !ctx.stream.available(HEADER_SIZE) {
                return Ok(());
            }
            self.read_header(ctx)?;
            self.read_header = true;
        }

        if self.skip > 0 {
            let skip = self.skip.min(ctx.stream.remaining_bytes());
            ctx.stream.advance(skip)?;
            self.skip -= skip;
            if self.skip > 0 {
                return Ok(());
            }
        }

        while ctx.stream.available(1) {
            match self.remaining {
                Some(0) => {
                    // Trailing bytes past the declared size are ignored.
                    let rest = ctx.stream.remaining_bytes();
                    ctx.stream.advance(rest)?;
                }
                remaining => {
                    let data = ctx.stream.read_single_chunk(remaining.unwrap_or(u64::MAX))?;
                    self.remaining = remaining.map(|r| r - data.len() as u64);
                    ctx.emit(DemuxEvent::Data(data));
                }
            }
        }

        Ok(())
    }
}
