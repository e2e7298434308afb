//! SNES SPC700 sound files.
//!
//! The whole image is handed on as payload: a player needs the header, RAM
//! and DSP registers. The demuxer contributes the fixed format, the ID666
//! text tags and, when present, the extended `xid6` tags.

use anyhow::Result;

use super::{ContainerParser, DemuxContext, DemuxEvent, FormatDescriptor, FourCC, Metadata, MetadataValue};
use crate::io::{ByteCursor, Encoding};
use crate::utils::errors::{CursorError, DemuxError};

pub const MAGIC: &str = "SNES-SPC700 Sound File Data v0.30";

/// Header, 64 KiB RAM, DSP registers and extra RAM.
pub const IMAGE_SIZE: u64 = 0x10200;
const XID6_HEADER: u64 = 8;

/// Text ID666 fields: key, offset, length.
const ID666_FIELDS: [(&str, u64, u64); 6] = [
    ("song_title", 0x2e, 32),
    ("game_title", 0x4e, 32),
    ("dumper", 0x6e, 16),
    ("comments", 0x7e, 32),
    ("dump_date", 0x9e, 11),
    ("artist", 0xb1, 32),
];
const SONG_SECONDS: u64 = 0xa9;
const FADE_LENGTH: u64 = 0xac;

#[derive(Debug, Default)]
pub struct SpcParser {
    read_header: bool,
}

fn peek_text(stream: &ByteCursor, offset: u64, length: u64) -> Result<String, CursorError> {
    let raw = stream.peek_string(offset, Some(length), Encoding::Latin1)?;
    let text = raw.split('\0').next().unwrap_or_default();
    Ok(text.trim().to_string())
}

fn xid6_key(id: u8) -> Option<&'static str> {
    Some(match id {
        0x01 => "song_name",
        0x02 => "game_name",
        0x03 => "artist_name",
        0x04 => "dumper_name",
        0x05 => "date_dumped",
        0x06 => "emulator",
        0x07 => "comments",
        0x10 => "ost_title",
        0x11 => "ost_disc",
        0x12 => "ost_track",
        0x13 => "publisher",
        0x14 => "copyright_year",
        0x30 => "intro_length",
        0x31 => "loop_length",
        0x32 => "end_length",
        0x33 => "fade_length",
        0x34 => "muted_channels",
        0x35 => "loop_count",
        0x36 => "amplification",
        _ => return None,
    })
}

/// Decodes an inline xid6 value (type 0, stored in the length field).
fn xid6_inline(id: u8, value: u16) -> MetadataValue {
    match id {
        0x06 => MetadataValue::Text(
            match value {
                1 => "ZSNES".to_string(),
                2 => "Snes9x".to_string(),
                other => format!("Unknown emulator ({other})"),
            },
        ),
        0x12 => {
            let number = value >> 8;
            match (value & 0xff) as u8 {
                0 => MetadataValue::Integer(number.into()),
                letter => MetadataValue::Text(format!("{number}{}", letter as char)),
            }
        }
        _ => MetadataValue::Integer(value.into()),
    }
}

/// Parses the extended tag block that starts at `start` (after its header).
fn read_xid6(stream: &ByteCursor, start: u64, length: u64, metadata: &mut Metadata) -> Result<(), CursorError> {
    let end = start + length;
    let mut offset = start;

    while offset + 4 <= end {
        let id = stream.peek_u8(offset)?;
        let kind = stream.peek_u8(offset + 1)?;
        let len = stream.peek_u16(offset + 2, true)?;

        let (value, size) = match kind {
            0 => (xid6_inline(id, len), 0),
            1 => {
                let text = peek_text(stream, offset + 4, u64::from(len))?;
                (MetadataValue::Text(text), u64::from(len))
            }
            4 => {
                let value = stream.peek_u32(offset + 4, true)?;
                (MetadataValue::Integer(value.into()), 4)
            }
            _ => {
                offset += (4 + u64::from(len)).next_multiple_of(4);
                continue;
            }
        };

        let key = xid6_key(id).map_or_else(|| format!("unknown_{id}_type_{kind}"), str::to_string);
        metadata.insert(key, value);
        offset += (4 + size).next_multiple_of(4);
    }
    Ok(())
}

impl SpcParser {
    /// Whether enough of the stream is buffered to read all tags.
    fn tags_available(ctx: &DemuxContext) -> Result<bool> {
        let stream = &ctx.stream;
        if !stream.available(IMAGE_SIZE + XID6_HEADER) {
            return Ok(ctx.is_final());
        }
        if &stream.peek_array::<4>(IMAGE_SIZE)? != b"xid6" {
            return Ok(true);
        }
        let length = u64::from(stream.peek_u32(IMAGE_SIZE + 4, true)?);
        Ok(ctx.is_final() || stream.available(IMAGE_SIZE + XID6_HEADER + length))
    }

    fn read_header(ctx: &mut DemuxContext) -> Result<()> {
        let stream = &ctx.stream;
        if stream.peek_string(0, Some(MAGIC.len() as u64), Encoding::Latin1)? != MAGIC {
            return Err(DemuxError::InvalidMagic {
                container: "SPC",
                expected: FourCC(*b"SNES"),
            }
            .into());
        }

        let mut metadata = Metadata::new();
        for (key, offset, length) in ID666_FIELDS {
            let text = peek_text(stream, offset, length)?;
            if !text.is_empty() {
                metadata.insert(key.to_string(), text.into());
            }
        }

        if stream.available(IMAGE_SIZE + XID6_HEADER) && &stream.peek_array::<4>(IMAGE_SIZE)? == b"xid6" {
            let declared = u64::from(stream.peek_u32(IMAGE_SIZE + 4, true)?);
            let start = IMAGE_SIZE + XID6_HEADER;
            // A truncated tail keeps what is complete.
            let length = declared.min(stream.remaining_bytes().saturating_sub(start));
            read_xid6(stream, start, length, &mut metadata)?;
        }

        let seconds = peek_text(stream, SONG_SECONDS, 3)?.parse::<u64>().ok();
        let fade = peek_text(stream, FADE_LENGTH, 3)?.parse::<u64>().unwrap_or(0);

        let mut format = FormatDescriptor::pcm(FourCC(*b"spc7"), 32000.0, 2, 16);
        format.little_endian = false;
        ctx.emit(DemuxEvent::Format(format));
        if let Some(seconds) = seconds {
            ctx.emit(DemuxEvent::Duration(seconds * 1000 + fade));
        }
        ctx.emit(DemuxEvent::Metadata(metadata));
        Ok(())
    }
}

impl ContainerParser for SpcParser {
    fn read_chunk(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        if !self.read_header {
            if !ctx.stream.available(IMAGE_SIZE) {
                if ctx.is_final() {
                    return Err(DemuxError::Truncated(IMAGE_SIZE - ctx.stream.remaining_bytes()).into());
                }
                return Ok(());
            }
            if !Self::tags_available(ctx)? {
                return Ok(());
            }
            Self::read_header(ctx)?;
            self.read_header = true;
        }

        while ctx.stream.available(1) {
            let data = ctx.stream.read_single_chunk(u64::MAX)?;
            ctx.emit(DemuxEvent::Data(data));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::{ContainerKind, Demuxer};
    use crate::io::Chunk;
    use crate::testutil;
    use crate::utils::errors::ErrorKind;

    fn demux(data: &[u8], piece: usize) -> Vec<DemuxEvent> {
        let mut demuxer = Demuxer::new(ContainerKind::Spc);
        for piece in data.chunks(piece) {
            demuxer.push(Chunk::from(piece));
        }
        demuxer.finish();
        testutil::collapse_data(demuxer.collect())
    }

    fn text(value: &str) -> MetadataValue {
        MetadataValue::Text(value.to_string())
    }

    #[test]
    fn id666_tags_and_duration() {
        let file = testutil::spc_file(false);
        let events = demux(&file, usize::MAX);

        let DemuxEvent::Format(format) = &events[0] else {
            panic!("no format: {events:?}");
        };
        assert_eq!(format.format_id, FourCC(*b"spc7"));
        assert_eq!(format.sample_rate, 32000.0);
        assert_eq!(format.bytes_per_packet, 4);

        assert_eq!(events[1], DemuxEvent::Duration(125_500));
        let DemuxEvent::Metadata(metadata) = &events[2] else {
            panic!("no metadata: {events:?}");
        };
        assert_eq!(metadata.get("song_title"), Some(&text("Overworld")));
        assert_eq!(metadata.get("game_title"), Some(&text("Quest")));
        assert_eq!(metadata.get("artist"), Some(&text("Composer")));
        assert!(!metadata.contains_key("comments"));

        assert_eq!(events[3], DemuxEvent::Data(Chunk::from(file)));
    }

    #[test]
    fn xid6_tags() {
        let events = demux(&testutil::spc_file(true), usize::MAX);
        let DemuxEvent::Metadata(metadata) = &events[2] else {
            panic!("no metadata: {events:?}");
        };
        assert_eq!(metadata.get("song_name"), Some(&text("Overworld Theme")));
        assert_eq!(metadata.get("emulator"), Some(&text("Snes9x")));
        assert_eq!(metadata.get("ost_track"), Some(&text("12b")));
        assert_eq!(metadata.get("copyright_year"), Some(&MetadataValue::Integer(1994)));
        assert_eq!(metadata.get("date_dumped"), Some(&MetadataValue::Integer(20010203)));
    }

    #[test]
    fn chunking_does_not_change_events() {
        let file = testutil::spc_file(true);
        let whole = demux(&file, usize::MAX);
        for piece in [4096, 65536, 66049] {
            assert_eq!(demux(&file, piece), whole, "piece size {piece}");
        }
    }

    #[test]
    fn truncated_image() {
        let file = testutil::spc_file(false);
        let events = demux(&file[..40000], 1000);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DemuxEvent::Error(f) if f.kind == ErrorKind::MalformedStructure
        ));
    }

    #[test]
    fn payload_start_on_push_boundary() {
        let file = testutil::spc_file(true);
        let whole = demux(&file, usize::MAX);
        for at in [0x25, 0x100, 0x101, 0x10100, IMAGE_SIZE as usize, IMAGE_SIZE as usize + 8] {
            assert_eq!(testutil::demux_split(ContainerKind::Spc, &file, at), whole, "split at {at}");
        }
    }
}
