//! Core Audio Format.

use anyhow::{Result, ensure};
use log::debug;

use super::m4a::esds::{read_descr_len, read_esds};
use super::{ContainerParser, DemuxContext, DemuxEvent, FormatDescriptor, FourCC, Metadata};
use crate::io::Encoding;
use crate::utils::errors::DemuxError;

/// File header plus the `desc` chunk, which must come first.
const HEADER_SIZE: u64 = 52;
const DESC_SIZE: u64 = 32;

#[derive(Debug)]
struct PendingChunk {
    kind: FourCC,
    /// `None` for a `data` chunk that runs to the end of the file.
    remaining: Option<u64>,
    started: bool,
}

#[derive(Debug, Default)]
pub struct CafParser {
    read_header: bool,
    chunk: Option<PendingChunk>,
    sent_duration: bool,
}

impl CafParser {
    fn read_header(&mut self, ctx: &mut DemuxContext) -> Result<bool> {
        let stream = &mut ctx.stream;
        if !stream.available(HEADER_SIZE) {
            return Ok(false);
        }

        if &stream.peek_array::<4>(0)? != b"caff" {
            return Err(DemuxError::InvalidMagic {
                container: "CAF",
                expected: FourCC(*b"caff"),
            }
            .into());
        }
        stream.advance(4)?;
        let version = stream.read_u16(false)?;
        if version != 1 {
            return Err(DemuxError::UnsupportedVersion {
                container: "CAF",
                version: version.into(),
            }
            .into());
        }
        stream.advance(2)?; // flags

        let kind = FourCC(stream.peek_array::<4>(0)?);
        if kind != b"desc" {
            return Err(DemuxError::MissingChunk {
                missing: FourCC(*b"desc"),
                found: kind,
            }
            .into());
        }
        stream.advance(4)?;
        let size = stream.read_u64(false)?;
        if size != DESC_SIZE {
            return Err(DemuxError::InvalidSize { name: kind, size }.into());
        }

        let sample_rate = stream.read_f64(false)?;
        let format_id = FourCC(stream.peek_array::<4>(0)?);
        stream.advance(4)?;
        let flags = stream.read_u32(false)?;
        let mut format = FormatDescriptor {
            format_id,
            sample_rate,
            bytes_per_packet: stream.read_u32(false)?,
            frames_per_packet: stream.read_u32(false)?,
            channels_per_frame: stream.read_u32(false)?,
            bits_per_channel: stream.read_u32(false)?,
            ..Default::default()
        };
        if format_id == FourCC::LPCM {
            format.floating_point = flags & 1 != 0;
            format.little_endian = flags & 2 != 0;
        }

        ctx.emit(DemuxEvent::Format(format));
        Ok(true)
    }

    fn read_cookie(ctx: &mut DemuxContext, size: u64) -> Result<()> {
        let end = ctx.stream.offset() + size;
        let is_aac = ctx.format().is_some_and(|f| f.format_id == b"aac ");
        if is_aac {
            if let Some(cookie) = read_esds(&mut ctx.stream)? {
                ctx.emit(DemuxEvent::Cookie(cookie));
            }
            ensure!(ctx.stream.offset() <= end, DemuxError::Overrun);
            ctx.stream.seek(end)?;
        } else {
            let cookie = ctx.stream.read_bytes(size)?;
            ctx.emit(DemuxEvent::Cookie(cookie));
        }
        Ok(())
    }

    fn read_packet_table(&mut self, ctx: &mut DemuxContext, size: u64) -> Result<()> {
        let end = ctx.stream.offset() + size;
        let format = ctx.format().cloned().unwrap_or_default();

        let packets = ctx.stream.read_u64(false)?;
        let frames = ctx.stream.read_u64(false)?;
        ctx.stream.advance(8)?; // priming and remainder frames

        ctx.emit(DemuxEvent::Duration(format.frames_to_ms(frames)));
        self.sent_duration = true;

        // Constant packets are seeked analytically.
        if format.bytes_per_packet == 0 || format.frames_per_packet == 0 {
            let mut byte_offset = 0u64;
            let mut frame_offset = 0u64;
            for _ in 0..packets {
                ctx.add_seek_point(byte_offset, frame_offset);
                byte_offset += match format.bytes_per_packet {
                    0 => u64::from(read_descr_len(&mut ctx.stream)?),
                    n => u64::from(n),
                };
                frame_offset += match format.frames_per_packet {
                    0 => u64::from(read_descr_len(&mut ctx.stream)?),
                    n => u64::from(n),
                };
                ensure!(ctx.stream.offset() <= end, DemuxError::Overrun);
            }
            debug!("CAF packet table: {} seek points", ctx.seek_table().len());
        }

        ensure!(ctx.stream.offset() <= end, DemuxError::Overrun);
        ctx.stream.seek(end)?;
        Ok(())
    }

    fn read_info(ctx: &mut DemuxContext, size: u64) -> Result<()> {
        let end = ctx.stream.offset() + size;
        let entries = ctx.stream.read_u32(false)?;

        let mut metadata = Metadata::new();
        for _ in 0..entries {
            let key = ctx.stream.read_string(None, Encoding::Utf8)?;
            let value = ctx.stream.read_string(None, Encoding::Utf8)?;
            ensure!(ctx.stream.offset() <= end, DemuxError::Overrun);
            metadata.insert(key, value.into());
        }

        ctx.stream.seek(end)?;
        ctx.emit(DemuxEvent::Metadata(metadata));
        Ok(())
    }
}

impl ContainerParser for CafParser {
    fn read_chunk(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        if !self.read_header {
            if !self.read_header(ctx)? {
                return Ok(());
            }
            self.read_header = true;
        }

        while ctx.stream.available(1) {
            let Some(chunk) = self.chunk.as_mut() else {
                if !ctx.stream.available(12) {
                    return Ok(());
                }
                let kind = FourCC(ctx.stream.peek_array::<4>(0)?);
                ctx.stream.advance(4)?;
                let size = ctx.stream.read_i64(false)?;
                let remaining = match size {
                    -1 if kind == b"data" => None,
                    size if size >= 0 => Some(size as u64),
                    size => {
                        return Err(DemuxError::InvalidSize {
                            name: kind,
                            size: size as u64,
                        }
                        .into());
                    }
                };
                self.chunk = Some(PendingChunk {
                    kind,
                    remaining,
                    started: false,
                });
                continue;
            };

            let kind = chunk.kind;
            match kind.as_bytes() {
                b"data" => {
                    if !chunk.started {
                        if !ctx.stream.available(4) {
                            return Ok(());
                        }
                        ctx.stream.advance(4)?; // edit count
                        chunk.remaining = chunk.remaining.map(|r| r.saturating_sub(4));
                        chunk.started = true;

                        if !self.sent_duration {
                            let format = ctx.format().cloned().unwrap_or_default();
                            if let Some(size) = chunk.remaining.filter(|_| format.bytes_per_packet != 0) {
                                let packets = size / u64::from(format.bytes_per_packet);
                                let frames = packets * u64::from(format.frames_per_packet);
                                ctx.emit(DemuxEvent::Duration(format.frames_to_ms(frames)));
                                self.sent_duration = true;
                            }
                        }
                    }

                    let want = chunk.remaining.unwrap_or(u64::MAX);
                    if want > 0 {
                        if !ctx.stream.available(1) {
                            return Ok(());
                        }
                        let data = ctx.stream.read_single_chunk(want)?;
                        if data.is_empty() {
                            return Ok(());
                        }
                        chunk.remaining = chunk.remaining.map(|r| r - data.len() as u64);
                        ctx.emit(DemuxEvent::Data(data));
                    }
                    if chunk.remaining == Some(0) {
                        self.chunk = None;
                    }
                }
                b"kuki" | b"pakt" | b"info" => {
                    let size = chunk.remaining.unwrap_or_default();
                    if !ctx.stream.available(size) {
                        return Ok(());
                    }
                    self.chunk = None;
                    match kind.as_bytes() {
                        b"kuki" => Self::read_cookie(ctx, size)?,
                        b"pakt" => self.read_packet_table(ctx, size)?,
                        _ => Self::read_info(ctx, size)?,
                    }
                }
                _ => {
                    let remaining = chunk.remaining.unwrap_or_default();
                    let skip = remaining.min(ctx.stream.remaining_bytes());
                    ctx.stream.advance(skip)?;
                    chunk.remaining = Some(remaining - skip);
                    if remaining == skip {
                        debug!("CAF: skipped {kind} chunk");
                        self.chunk = None;
                    }
                }
            }
        }

        Ok(())
    }
}
