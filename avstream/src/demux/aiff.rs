//! AIFF and AIFF-C.

use anyhow::Result;
use log::debug;

use super::{ContainerParser, DemuxContext, DemuxEvent, FormatDescriptor, FourCC};
use crate::utils::errors::DemuxError;

#[derive(Debug)]
struct IffChunk {
    id: FourCC,
    remaining: u64,
    pad: u64,
}

#[derive(Debug, Default)]
pub struct AiffParser {
    read_start: bool,
    aifc: bool,
    chunk: Option<IffChunk>,
    /// Bytes still to skip before the first sample of `SSND`.
    ssnd_skip: Option<u64>,
}

/// Maps an AIFF-C compression type onto a format id and sample layout.
fn apply_compression(format: &mut FormatDescriptor, compression: FourCC) {
    match compression.as_bytes() {
        b"NONE" | b"twos" | b"in24" | b"in32" => format.format_id = FourCC::LPCM,
        b"sowt" => {
            format.format_id = FourCC::LPCM;
            format.little_endian = format.bits_per_channel > 8;
        }
        b"fl32" | b"FL32" => {
            format.format_id = FourCC::LPCM;
            format.floating_point = true;
            format.bits_per_channel = 32;
        }
        b"fl64" | b"FL64" => {
            format.format_id = FourCC::LPCM;
            format.floating_point = true;
            format.bits_per_channel = 64;
        }
        // G.711 stores one byte per sample whatever COMM declares.
        b"ulaw" | b"ULAW" => {
            format.format_id = FourCC::ULAW;
            format.bits_per_channel = 8;
        }
        b"alaw" | b"ALAW" => {
            format.format_id = FourCC::ALAW;
            format.bits_per_channel = 8;
        }
        _ => format.format_id = compression,
    }
}

impl AiffParser {
    fn read_comm(&self, ctx: &mut DemuxContext, size: u64) -> Result<()> {
        let min = if self.aifc { 22 } else { 18 };
        if size < min {
            return Err(DemuxError::InvalidSize {
                name: FourCC(*b"COMM"),
                size,
            }
            .into());
        }

        let end = ctx.stream.offset() + size;
        let stream = &mut ctx.stream;
        let channels = u32::from(stream.read_u16(false)?);
        let frames = stream.read_u32(false)?;
        let bits = u32::from(stream.read_u16(false)?);
        let sample_rate = stream.read_f80(false)?;

        let mut format = FormatDescriptor::pcm(FourCC::LPCM, sample_rate, channels, bits);
        if self.aifc {
            let compression = FourCC(stream.peek_array::<4>(0)?);
            apply_compression(&mut format, compression);
            format.bytes_per_packet = format.bits_per_channel / 8 * channels;
        }
        ctx.stream.seek(end)?;

        let duration = format.frames_to_ms(frames.into());
        ctx.emit(DemuxEvent::Format(format));
        ctx.emit(DemuxEvent::Duration(duration));
        Ok(())
    }
}

impl ContainerParser for AiffParser {
    fn read_chunk(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        if !self.read_start {
            if !ctx.stream.available(12) {
                return Ok(());
            }
            let form_type = ctx.stream.peek_array::<4>(8)?;
            if &ctx.stream.peek_array::<4>(0)? != b"FORM" || !matches!(&form_type, b"AIFF" | b"AIFC") {
                return Err(DemuxError::InvalidMagic {
                    container: "AIFF",
                    expected: FourCC(*b"FORM"),
                }
                .into());
            }
            self.aifc = &form_type == b"AIFC";
            ctx.stream.advance(12)?;
            self.read_start = true;
        }

        while ctx.stream.available(1) {
            let Some(chunk) = self.chunk.as_mut() else {
                if !ctx.stream.available(8) {
                    return Ok(());
                }
                let id = FourCC(ctx.stream.peek_array::<4>(0)?);
                ctx.stream.advance(4)?;
                let size = u64::from(ctx.stream.read_u32(false)?);
                self.chunk = Some(IffChunk {
                    id,
                    remaining: size,
                    pad: size & 1,
                });
                continue;
            };

            if chunk.remaining == 0 {
                if !ctx.stream.available(chunk.pad) {
                    return Ok(());
                }
                ctx.stream.advance(chunk.pad)?;
                self.chunk = None;
                continue;
            }

            match chunk.id.as_bytes() {
                b"COMM" => {
                    let size = chunk.remaining;
                    if !ctx.stream.available(size) {
                        return Ok(());
                    }
                    chunk.remaining = 0;
                    self.read_comm(ctx, size)?;
                }
                b"SSND" => {
                    if ctx.format().is_none() {
                        return Err(DemuxError::MissingChunk {
                            missing: FourCC(*b"COMM"),
                            found: chunk.id,
                        }
                        .into());
                    }

                    let skip = match self.ssnd_skip {
                        Some(skip) => skip,
                        None => {
                            if !ctx.stream.available(8) {
                                return Ok(());
                            }
                            let offset = u64::from(ctx.stream.read_u32(false)?);
                            ctx.stream.advance(4)?; // block size
                            chunk.remaining = chunk.remaining.saturating_sub(8);
                            offset
                        }
                    };

                    let skipped = skip.min(ctx.stream.remaining_bytes()).min(chunk.remaining);
                    ctx.stream.advance(skipped)?;
                    chunk.remaining -= skipped;
                    self.ssnd_skip = Some(skip - skipped);
                    if skip > skipped && chunk.remaining > 0 {
                        continue;
                    }

                    if chunk.remaining > 0 {
                        if !ctx.stream.available(1) {
                            return Ok(());
                        }
                        let data = ctx.stream.read_single_chunk(chunk.remaining)?;
                        chunk.remaining -= data.len() as u64;
                        ctx.emit(DemuxEvent::Data(data));
                    }
                }
                _ => {
                    let skip = chunk.remaining.min(ctx.stream.remaining_bytes());
                    ctx.stream.advance(skip)?;
                    chunk.remaining -= skip;
                    if chunk.remaining == 0 {
                        debug!("AIFF: skipped {} chunk", chunk.id);
                    }
                }
            }
        }

        Ok(())
    }
}
