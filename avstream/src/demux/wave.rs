//! RIFF WAVE.

use anyhow::Result;
use log::{debug, warn};

use super::{ContainerParser, DemuxContext, DemuxEvent, FormatDescriptor, FourCC};
use crate::utils::errors::DemuxError;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_ALAW: u16 = 0x0006;
const WAVE_FORMAT_MULAW: u16 = 0x0007;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

#[derive(Debug)]
struct RiffChunk {
    id: FourCC,
    remaining: u64,
    /// RIFF chunks are word aligned; odd sizes carry one pad byte.
    pad: u64,
}

#[derive(Debug, Default)]
pub struct WaveParser {
    read_start: bool,
    chunk: Option<RiffChunk>,
    sent_duration: bool,
}

fn format_for_tag(tag: u16, channels: u32, sample_rate: f64, bits: u32) -> Result<FormatDescriptor> {
    let format_id = match tag {
        WAVE_FORMAT_PCM | WAVE_FORMAT_IEEE_FLOAT => FourCC::LPCM,
        WAVE_FORMAT_ALAW => FourCC::ALAW,
        WAVE_FORMAT_MULAW => FourCC::ULAW,
        other => {
            return Err(DemuxError::UnsupportedEncoding {
                container: "WAVE",
                encoding: other.into(),
            }
            .into());
        }
    };

    let mut format = FormatDescriptor::pcm(format_id, sample_rate, channels, bits);
    format.floating_point = tag == WAVE_FORMAT_IEEE_FLOAT;
    format.little_endian = format_id == FourCC::LPCM;
    Ok(format)
}

impl WaveParser {
    fn read_fmt(ctx: &mut DemuxContext, size: u64) -> Result<()> {
        if size < 16 {
            return Err(DemuxError::InvalidSize {
                name: FourCC(*b"fmt "),
                size,
            }
            .into());
        }

        let end = ctx.stream.offset() + size;
        let stream = &mut ctx.stream;
        let mut tag = stream.read_u16(true)?;
        let channels = stream.read_u16(true)?;
        let sample_rate = stream.read_u32(true)?;
        stream.advance(6)?; // byte rate, block align
        let bits = stream.read_u16(true)?;

        if tag == WAVE_FORMAT_EXTENSIBLE && size >= 40 {
            stream.advance(8)?; // cbSize, valid bits, channel mask
            tag = stream.read_u16(true)?;
        }

        let format = format_for_tag(tag, channels.into(), sample_rate.into(), bits.into())?;
        ctx.stream.seek(end)?;
        ctx.emit(DemuxEvent::Format(format));
        Ok(())
    }
}

impl ContainerParser for WaveParser {
    fn read_chunk(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        if !self.read_start {
            if !ctx.stream.available(12) {
                return Ok(());
            }
            if &ctx.stream.peek_array::<4>(0)? != b"RIFF" || &ctx.stream.peek_array::<4>(8)? != b"WAVE" {
                return Err(DemuxError::InvalidMagic {
                    container: "WAVE",
                    expected: FourCC(*b"RIFF"),
                }
                .into());
            }
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
                let size = u64::from(ctx.stream.read_u32(true)?);
                self.chunk = Some(RiffChunk {
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
                b"fmt " => {
                    let size = chunk.remaining;
                    if !ctx.stream.available(size) {
                        return Ok(());
                    }
                    chunk.remaining = 0;
                    Self::read_fmt(ctx, size)?;
                }
                b"data" => {
                    let Some(format) = ctx.format().cloned() else {
                        return Err(DemuxError::MissingChunk {
                            missing: FourCC(*b"fmt "),
                            found: chunk.id,
                        }
                        .into());
                    };

                    if !self.sent_duration {
                        let bytes_per_sample = u64::from(format.bits_per_channel / 8);
                        let channels = u64::from(format.channels_per_frame);
                        if bytes_per_sample > 0 && channels > 0 {
                            let frames = chunk.remaining / bytes_per_sample / channels;
                            ctx.emit(DemuxEvent::Duration(format.frames_to_ms(frames)));
                        }
                        self.sent_duration = true;
                    }

                    let data = ctx.stream.read_single_chunk(chunk.remaining)?;
                    chunk.remaining -= data.len() as u64;
                    ctx.emit(DemuxEvent::Data(data));
                }
                _ => {
                    let skip = chunk.remaining.min(ctx.stream.remaining_bytes());
                    ctx.stream.advance(skip)?;
                    chunk.remaining -= skip;
                    if chunk.remaining == 0 {
                        debug!("WAVE: skipped {} chunk", chunk.id);
                    }
                }
            }
        }

        Ok(())
    }

    fn finish(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        if let Some(chunk) = &self.chunk {
            if chunk.id == b"data" && chunk.remaining > 0 {
                warn!("WAVE data chunk is {} bytes short", chunk.remaining);
            }
        }
        if ctx.format().is_none() {
            return Err(DemuxError::MissingChunk {
                missing: FourCC(*b"fmt "),
                found: FourCC(*b"EOF "),
            }
            .into());
        }
        Ok(())
    }
}
