//! MPEG-4 audio (`.m4a`, `.m4b`, QuickTime `.mov`) box tree.
//!
//! Boxes are parsed with an explicit stack of open boxes. Leaf boxes are
//! handled once their whole payload is buffered; `mdat` is the exception and
//! is streamed sample run by sample run. When `mdat` precedes `moov` it is
//! skipped once and revisited after the sample tables are known.

pub mod atoms;
pub mod esds;
pub mod ilst;
pub mod track;

use anyhow::Result;
use log::{Level, debug, info, trace};

use self::atoms::BoxKind;
use self::track::{SampleToChunk, TimeToSample, Track};
use super::{Chapter, ContainerParser, DemuxContext, DemuxEvent, FormatDescriptor, FourCC, Metadata};
use crate::io::{ByteCursor, Encoding};
use crate::log_or_err;
use crate::utils::errors::DemuxError;

/// Common file type brands, see <http://mp4ra.org/filetype.html>.
const MP4_BRANDS: [&[u8; 4]; 7] = [b"M4A ", b"M4P ", b"M4B ", b"M4V ", b"isom", b"mp42", b"qt  "];

pub fn is_mp4_brand(brand: [u8; 4]) -> bool {
    MP4_BRANDS.contains(&&brand)
}

/// Sample entry sizes after the box header, by entry version.
const SAMPLE_ENTRY_V0: u64 = 28;
const SAMPLE_ENTRY_V1: u64 = 44;

/// Encoders tend to write 16 bits per channel regardless of the codec.
fn corrected_bits(format_id: &[u8; 4]) -> Option<u32> {
    match format_id {
        b"ulaw" | b"alaw" => Some(8),
        b"in24" => Some(24),
        b"in32" | b"fl32" => Some(32),
        b"fl64" => Some(64),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenBox {
    kind: BoxKind,
    header: u64,
    start: u64,
    /// `u64::MAX` for a box that runs to the end of the file.
    end: u64,
}

/// Progress through the audio track's chunks while streaming `mdat`.
#[derive(Debug, Default)]
struct SampleCursor {
    chunk_index: usize,
    stsc_index: usize,
    sample_index: usize,
    /// Bytes and samples of a partially delivered chunk.
    tail_offset: u64,
    tail_samples: u32,
}

#[derive(Debug, Default)]
pub struct M4aParser {
    stack: Vec<OpenBox>,
    /// The top of `stack` has been entered and its handler not yet run.
    in_box: bool,
    tracks: Vec<Track>,
    audio: Option<usize>,
    moov_done: bool,
    metadata: Option<Metadata>,
    mdat_header: Option<u64>,
    started_data: bool,
    chapters: Vec<Chapter>,
    chapters_read: bool,
    samples: SampleCursor,
    reported_tail: bool,
}

fn current_track(tracks: &mut [Track]) -> Result<&mut Track, DemuxError> {
    tracks.last_mut().ok_or(DemuxError::SampleTable("track box outside of trak"))
}

/// Checks that `entries` records of `entry_size` bytes fit in `available`.
fn table_len(name: &[u8; 4], entries: u32, entry_size: u64, available: u64) -> Result<usize> {
    if u64::from(entries) * entry_size > available {
        return Err(DemuxError::InvalidSize {
            name: FourCC(*name),
            size: available,
        }
        .into());
    }
    Ok(entries as usize)
}

fn read_sample_entry(stream: &mut ByteCursor, name: FourCC) -> Result<FormatDescriptor> {
    stream.advance(8)?; // reserved, data reference index
    let version = stream.read_u16(false)?;
    stream.advance(6)?; // revision level, vendor

    let channels = u32::from(stream.read_u16(false)?);
    let bits = u32::from(stream.read_u16(false)?);
    stream.advance(4)?; // compression id, packet size
    let sample_rate = f64::from(stream.read_u16(false)?);
    stream.advance(2)?;

    let mut format = FormatDescriptor {
        format_id: name,
        sample_rate,
        channels_per_frame: channels,
        bits_per_channel: bits,
        ..Default::default()
    };

    if version == 1 {
        format.frames_per_packet = stream.read_u32(false)?;
        stream.advance(12)?; // bytes per packet, frame and sample
    }

    let id = name.as_bytes();
    if let Some(bits) = corrected_bits(id) {
        format.bits_per_channel = bits;
    }
    format.floating_point = matches!(id, b"fl32" | b"fl64");
    format.little_endian = id == b"sowt" && format.bits_per_channel > 8;
    if matches!(id, b"twos" | b"sowt" | b"in24" | b"in32" | b"fl32" | b"fl64" | b"raw " | b"NONE") {
        format.format_id = FourCC::LPCM;
    }

    Ok(format)
}

fn read_time_to_sample(stream: &mut ByteCursor, len: u64) -> Result<Vec<TimeToSample>> {
    stream.advance(4)?; // version and flags
    let entries = stream.read_u32(false)?;
    let entries = table_len(b"stts", entries, 8, len.saturating_sub(8))?;
    (0..entries)
        .map(|_| {
            Ok(TimeToSample {
                count: stream.read_u32(false)?,
                duration: stream.read_u32(false)?,
            })
        })
        .collect()
}

fn read_sample_to_chunk(stream: &mut ByteCursor, len: u64) -> Result<Vec<SampleToChunk>> {
    stream.advance(4)?; // version and flags
    let entries = stream.read_u32(false)?;
    let entries = table_len(b"stsc", entries, 12, len.saturating_sub(8))?;
    (0..entries)
        .map(|_| {
            Ok(SampleToChunk {
                first: stream.read_u32(false)?,
                samples_per_chunk: stream.read_u32(false)?,
                description: stream.read_u32(false)?,
            })
        })
        .collect()
}

fn read_chunk_offsets(stream: &mut ByteCursor, len: u64, wide: bool) -> Result<Vec<u64>> {
    stream.advance(4)?; // version and flags
    let entries = stream.read_u32(false)?;
    let (name, size) = if wide { (b"co64", 8) } else { (b"stco", 4) };
    let entries = table_len(name, entries, size, len.saturating_sub(8))?;
    (0..entries)
        .map(|_| {
            Ok(if wide {
                stream.read_u64(false)?
            } else {
                u64::from(stream.read_u32(false)?)
            })
        })
        .collect()
}

impl M4aParser {
    /// Reads the next box header and pushes the box. False when the header is
    /// not fully buffered yet.
    fn read_header(&mut self, ctx: &mut DemuxContext) -> Result<bool> {
        let stream = &mut ctx.stream;
        if !stream.available(8) {
            return Ok(false);
        }

        let header = stream.offset();
        let size = stream.peek_u32(0, false)?;
        let name = FourCC(stream.peek_array::<4>(4)?);
        let (header_len, end) = match size {
            0 => (8, u64::MAX),
            1 => {
                if !stream.available(16) {
                    return Ok(false);
                }
                let size = stream.peek_u64(8, false)?;
                if size < 16 {
                    return Err(DemuxError::InvalidSize { name, size }.into());
                }
                (16, header + size)
            }
            size if size < 8 => {
                return Err(DemuxError::InvalidSize {
                    name,
                    size: size.into(),
                }
                .into());
            }
            size => (8, header + u64::from(size)),
        };
        stream.advance(header_len)?;
        let start = header + header_len;

        let parent = self.stack.last();
        if let Some(parent) = parent {
            if end > parent.end {
                return Err(DemuxError::InvalidSize {
                    name,
                    size: end - header,
                }
                .into());
            }
        }

        let mut kind = BoxKind::resolve(parent.map(|p| p.kind), name);
        let skip = match kind {
            _ if start == end => true,
            BoxKind::Moov => self.moov_done,
            BoxKind::SampleEntry(_) => self.tracks.last().is_none_or(|t| t.format.is_some()),
            _ => false,
        };
        if skip {
            kind = BoxKind::Unknown(name);
        }

        trace!("M4A box {name} ({kind:?}) at {header}, payload {start}..{end}");
        self.stack.push(OpenBox {
            kind,
            header,
            start,
            end,
        });
        self.in_box = true;
        Ok(true)
    }

    /// Payload bytes left in `open`, or `None` while a box that runs to the
    /// end of the file can still grow.
    fn payload_left(ctx: &DemuxContext, open: &OpenBox) -> Option<u64> {
        if open.end == u64::MAX {
            ctx.is_final().then(|| ctx.stream.remaining_bytes())
        } else {
            Some(open.end.saturating_sub(ctx.stream.offset()))
        }
    }

    /// Whether everything the handler of `open` reads is buffered.
    fn ready(&self, ctx: &DemuxContext, open: &OpenBox) -> Result<bool> {
        let Some(left) = Self::payload_left(ctx, open) else {
            return Ok(false);
        };
        let audio = self.tracks.last().is_some_and(Track::is_audio);

        let need = match open.kind {
            BoxKind::Trak => 0,
            BoxKind::Stsd if audio => 8,
            BoxKind::Meta => 4,
            BoxKind::SampleEntry(name) => {
                if left < SAMPLE_ENTRY_V0 {
                    return Err(DemuxError::InvalidSize { name, size: left }.into());
                }
                if !ctx.stream.available(SAMPLE_ENTRY_V0) {
                    return Ok(false);
                }
                match ctx.stream.peek_u16(8, false)? {
                    0 => SAMPLE_ENTRY_V0,
                    1 => SAMPLE_ENTRY_V1,
                    version => {
                        return Err(DemuxError::UnsupportedVersion {
                            container: "MP4 sample entry",
                            version: version.into(),
                        }
                        .into());
                    }
                }
            }
            _ => left,
        };

        if need > left {
            return Err(DemuxError::InvalidSize {
                name: open.kind.name(),
                size: left,
            }
            .into());
        }
        Ok(ctx.stream.available(need))
    }

    fn handle(&mut self, ctx: &mut DemuxContext, open: &OpenBox) -> Result<()> {
        let len = Self::payload_left(ctx, open).unwrap_or_else(|| ctx.stream.remaining_bytes());

        match open.kind {
            BoxKind::Ftyp => {
                let brand = ctx.stream.peek_array::<4>(0)?;
                if !is_mp4_brand(brand) {
                    return Err(DemuxError::UnsupportedBrand(FourCC(brand)).into());
                }
            }
            BoxKind::Trak => self.tracks.push(Track::default()),
            BoxKind::Tkhd => {
                let track = current_track(&mut self.tracks)?;
                let version = ctx.stream.read_u8()?;
                ctx.stream.advance(3)?; // flags
                ctx.stream.advance(if version == 1 { 16 } else { 8 })?; // creation and modification time
                track.id = ctx.stream.read_u32(false)?;
            }
            BoxKind::Hdlr => {
                let track = current_track(&mut self.tracks)?;
                ctx.stream.advance(8)?; // version, flags and component type
                track.handler = FourCC(ctx.stream.peek_array::<4>(0)?);
            }
            BoxKind::Mdhd => {
                let track = current_track(&mut self.tracks)?;
                let version = ctx.stream.read_u8()?;
                ctx.stream.advance(3)?;
                if version == 1 {
                    ctx.stream.advance(16)?;
                    track.time_scale = ctx.stream.read_u32(false)?;
                    track.duration = ctx.stream.read_u64(false)?;
                } else {
                    ctx.stream.advance(8)?;
                    track.time_scale = ctx.stream.read_u32(false)?;
                    track.duration = ctx.stream.read_u32(false)?.into();
                }
            }
            BoxKind::Stsd => {
                if !self.tracks.last().is_some_and(Track::is_audio) {
                    ctx.stream.advance(len)?;
                    return Ok(());
                }
                ctx.stream.advance(4)?; // version and flags
                let entries = ctx.stream.read_u32(false)?;
                if entries == 0 {
                    return Err(DemuxError::SampleDescriptionCount(0).into());
                }
                if entries > 1 {
                    log_or_err!(ctx, Level::Warn, DemuxError::SampleDescriptionCount(entries));
                }
            }
            BoxKind::SampleEntry(name) => {
                let format = read_sample_entry(&mut ctx.stream, name)?;
                info!(
                    "M4A sample entry {name}: {} Hz, {} channels, {} bits",
                    format.sample_rate, format.channels_per_frame, format.bits_per_channel
                );
                current_track(&mut self.tracks)?.format = Some(format);
            }
            BoxKind::Alac => {
                if len < 4 {
                    return Err(DemuxError::InvalidSize {
                        name: FourCC(*b"alac"),
                        size: len,
                    }
                    .into());
                }
                ctx.stream.advance(4)?;
                current_track(&mut self.tracks)?.cookie = Some(ctx.stream.read_bytes(len - 4)?);
            }
            BoxKind::Esds => {
                current_track(&mut self.tracks)?.cookie = esds::read_esds(&mut ctx.stream)?;
            }
            BoxKind::Enda => {
                let little_endian = ctx.stream.read_u16(false)? != 0;
                if let Some(format) = current_track(&mut self.tracks)?.format.as_mut() {
                    format.little_endian = little_endian;
                }
            }
            BoxKind::Stts => {
                let track = current_track(&mut self.tracks)?;
                track.time_to_sample = Some(read_time_to_sample(&mut ctx.stream, len)?);
                track.setup_seek_points()?;
            }
            BoxKind::Stsc => {
                let track = current_track(&mut self.tracks)?;
                track.sample_to_chunk = Some(read_sample_to_chunk(&mut ctx.stream, len)?);
                track.setup_seek_points()?;
            }
            BoxKind::Stsz => {
                let track = current_track(&mut self.tracks)?;
                ctx.stream.advance(4)?; // version and flags
                let size = ctx.stream.read_u32(false)?;
                let count = ctx.stream.read_u32(false)?;
                if size == 0 {
                    let entries = table_len(b"stsz", count, 4, len.saturating_sub(12))?;
                    track.sample_sizes = (0..entries)
                        .map(|_| ctx.stream.read_u32(false))
                        .collect::<Result<_, _>>()?;
                }
                track.sample_size = Some(size);
                track.sample_count = count;
                track.setup_seek_points()?;
            }
            BoxKind::Stco | BoxKind::Co64 => {
                let track = current_track(&mut self.tracks)?;
                let wide = open.kind == BoxKind::Co64;
                track.chunk_offsets = Some(read_chunk_offsets(&mut ctx.stream, len, wide)?);
                track.setup_seek_points()?;
            }
            BoxKind::Chap => {
                let track = current_track(&mut self.tracks)?;
                track.chapter_tracks = (0..len / 4)
                    .map(|_| ctx.stream.read_u32(false))
                    .collect::<Result<_, _>>()?;
            }
            BoxKind::Meta => {
                ctx.stream.advance(4)?; // version and flags
                self.metadata = Some(Metadata::new());
            }
            BoxKind::IlstData(tag) => {
                if len < 8 {
                    return Err(DemuxError::InvalidSize {
                        name: FourCC(*b"data"),
                        size: len,
                    }
                    .into());
                }
                ctx.stream.advance(8)?; // type and locale
                if let Some(metadata) = self.metadata.as_mut() {
                    ilst::read_item(&mut ctx.stream, tag.as_bytes(), len - 8, metadata)?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn finish_moov(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        self.moov_done = true;

        let index = self
            .tracks
            .iter()
            .position(Track::is_audio)
            .ok_or(DemuxError::NoAudioTrack)?;
        self.audio = Some(index);
        let track = &self.tracks[index];
        let format = track.format.clone().ok_or(DemuxError::MissingChunk {
            missing: FourCC(*b"stsd"),
            found: FourCC(*b"moov"),
        })?;

        debug!(
            "M4A: audio track {} of {}, {} seek points",
            track.id,
            self.tracks.len(),
            track.seek_points.len()
        );
        ctx.emit(DemuxEvent::Format(format));
        ctx.emit(DemuxEvent::Duration(track.to_ms(track.duration)));
        if let Some(cookie) = &track.cookie {
            ctx.emit(DemuxEvent::Cookie(cookie.clone()));
        }
        ctx.set_seek_table(track.seek_points.clone());

        if let Some(header) = self.mdat_header {
            debug!("M4A: returning to mdat at {header}");
            ctx.stream.seek(header)?;
        }
        Ok(())
    }

    /// Reads chapter titles from the chapter track's samples. False while
    /// the next title is not buffered.
    fn read_chapters(&mut self, ctx: &mut DemuxContext) -> Result<bool> {
        let Some(audio) = self.audio.and_then(|i| self.tracks.get(i)) else {
            return Ok(true);
        };
        let Some(&id) = audio.chapter_tracks.first() else {
            return Ok(true);
        };
        let Some(track) = self.tracks.iter().find(|t| t.id == id) else {
            log_or_err!(ctx, Level::Warn, DemuxError::MissingChapterTrack(id));
            return Ok(true);
        };

        let stream = &mut ctx.stream;
        while self.chapters.len() < track.seek_points.len() {
            let index = self.chapters.len();
            let Some(position) = track.seek_points.get(index).and_then(|p| p.position) else {
                break;
            };

            let offset = stream.offset();
            if position >= offset && !stream.available(position - offset + 2) {
                return Ok(false);
            }
            stream.seek(position)?;
            if !stream.available(2) {
                return Ok(false);
            }

            let len = u64::from(stream.peek_u16(0, false)?);
            if !stream.available(2 + len) {
                return Ok(false);
            }
            stream.advance(2)?;

            let bom = len > 2 && matches!(stream.peek_u16(0, false)?, 0xfeff | 0xfffe);
            let encoding = if bom { Encoding::Utf16Bom } else { Encoding::Utf8 };
            let title = stream.read_string(Some(len), encoding)?;

            match track::chapter_at(track, index, title) {
                Some(chapter) => self.chapters.push(chapter),
                None => break,
            }
        }

        debug!("M4A: {} chapters", self.chapters.len());
        ctx.emit(DemuxEvent::Chapters(self.chapters.clone()));
        Ok(true)
    }

    /// Streams the next run of contiguous samples out of `mdat`. False when
    /// nothing more can be extracted from what is buffered.
    fn read_mdat(&mut self, ctx: &mut DemuxContext, open: &OpenBox) -> Result<bool> {
        if !self.started_data {
            if self.mdat_header.is_none() {
                self.mdat_header = Some(open.header);
            }

            // Payload before the sample tables: skip it for now.
            if !self.moov_done {
                let skip = (open.end - ctx.stream.offset()).min(ctx.stream.remaining_bytes());
                ctx.stream.advance(skip)?;
                return Ok(true);
            }

            self.samples = SampleCursor::default();
            self.started_data = true;
        }

        if !self.chapters_read {
            if !self.read_chapters(ctx)? {
                return Ok(false);
            }
            self.chapters_read = true;
            ctx.stream.seek(open.start)?;
        }

        let track = self
            .audio
            .and_then(|i| self.tracks.get(i))
            .ok_or(DemuxError::NoAudioTrack)?;
        let offsets = track.chunk_offsets.as_deref().unwrap_or_default();
        let stsc = track.sample_to_chunk.as_deref().unwrap_or_default();
        let cursor = &mut self.samples;
        let stream = &mut ctx.stream;

        if cursor.chunk_index >= offsets.len() || stsc.is_empty() {
            let rest = (open.end - stream.offset()).min(stream.remaining_bytes());
            if rest > 0 && !self.reported_tail {
                self.reported_tail = true;
                log_or_err!(ctx, Level::Info, DemuxError::UnreferencedPayload(rest));
            }
            ctx.stream.advance(rest)?;
            return Ok(true);
        }

        let offset = offsets[cursor.chunk_index] + cursor.tail_offset;
        if offset < open.start {
            return Err(DemuxError::SampleTable("chunk offset precedes its mdat").into());
        }
        if offset >= open.end {
            // The chunk lives in a later mdat.
            let rest = (open.end - stream.offset()).min(stream.remaining_bytes());
            stream.advance(rest)?;
            return Ok(true);
        }

        let current = stream.offset();
        if offset > current && !stream.available(offset - current) {
            return Ok(false);
        }
        stream.seek(offset)?;

        let start_chunk = cursor.chunk_index;
        let mut length = 0u64;
        while cursor.chunk_index < offsets.len() {
            let run = stsc[cursor.stsc_index];
            let samples = run.samples_per_chunk.saturating_sub(cursor.tail_samples);

            let mut chunk_size = 0;
            let mut sample = 0;
            while sample < samples {
                let size = track.size_of_sample(cursor.sample_index)?;
                if !stream.available(length + size) {
                    break;
                }
                length += size;
                chunk_size += size;
                cursor.sample_index += 1;
                sample += 1;
            }

            if sample < samples {
                cursor.tail_offset += chunk_size;
                cursor.tail_samples += sample;
                break;
            }

            cursor.chunk_index += 1;
            cursor.tail_offset = 0;
            cursor.tail_samples = 0;
            if cursor.stsc_index + 1 < stsc.len()
                && cursor.chunk_index + 1 == stsc[cursor.stsc_index + 1].first as usize
            {
                cursor.stsc_index += 1;
            }

            // Stop at the first gap between chunks.
            if offsets.get(cursor.chunk_index) != Some(&(offset + length)) {
                break;
            }
        }

        if length == 0 {
            return Ok(cursor.chunk_index != start_chunk);
        }
        if offset + length > open.end {
            return Err(DemuxError::SampleTable("samples overrun mdat").into());
        }

        let data = stream.read_bytes(length)?;
        ctx.emit(DemuxEvent::Data(data));
        Ok(true)
    }

    /// Pops every box the cursor has reached the end of, innermost first,
    /// running after-hooks on the way. With `eof` set, boxes that run to the
    /// end of the file close too. True when anything was popped.
    fn close_boxes(&mut self, ctx: &mut DemuxContext, eof: bool) -> Result<bool> {
        let mut closed = false;
        while let Some(&open) = self.stack.last() {
            let unsized_at_eof = eof && open.end == u64::MAX;
            if ctx.stream.offset() < open.end && !unsized_at_eof {
                break;
            }
            self.stack.pop();
            self.in_box = false;
            closed = true;

            match open.kind {
                BoxKind::Moov => self.finish_moov(ctx)?,
                BoxKind::Meta => {
                    if let Some(metadata) = self.metadata.take() {
                        ctx.emit(DemuxEvent::Metadata(metadata));
                    }
                }
                _ => {}
            }
        }
        Ok(closed)
    }

    fn read_boxes(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        while ctx.stream.available(1) {
            if !self.in_box && !self.read_header(ctx)? {
                return Ok(());
            }
            let Some(&open) = self.stack.last() else {
                self.in_box = false;
                continue;
            };

            match open.kind {
                BoxKind::Mdat => {
                    if !self.read_mdat(ctx, &open)? {
                        return Ok(());
                    }
                }
                kind if kind.has_handler() => {
                    if !self.ready(ctx, &open)? {
                        return Ok(());
                    }
                    self.handle(ctx, &open)?;
                    self.in_box = false;

                    if !kind.is_container() {
                        let offset = ctx.stream.offset();
                        if offset > open.end {
                            return Err(DemuxError::InvalidSize {
                                name: kind.name(),
                                size: open.end - open.start,
                            }
                            .into());
                        }
                        let end = if open.end == u64::MAX {
                            offset + ctx.stream.remaining_bytes()
                        } else {
                            open.end
                        };
                        ctx.stream.seek(end)?;
                    }
                }
                kind if kind.is_container() => self.in_box = false,
                _ => {
                    let offset = ctx.stream.offset();
                    let skip = (open.end - offset).min(ctx.stream.remaining_bytes());
                    ctx.stream.advance(skip)?;
                    if offset + skip < open.end {
                        return Ok(());
                    }
                }
            }

            self.close_boxes(ctx, false)?;
        }

        Ok(())
    }
}

impl ContainerParser for M4aParser {
    fn read_chunk(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        loop {
            self.read_boxes(ctx)?;
            // Closing `moov` may seek back into earlier data.
            if !ctx.is_final() || ctx.stream.available(1) || !self.close_boxes(ctx, true)? {
                return Ok(());
            }
        }
    }

    fn rewind_floor(&self, ctx: &DemuxContext) -> u64 {
        let offset = ctx.stream.offset();
        match self.mdat_header {
            None => offset,
            Some(header) if !self.started_data || !self.chapters_read => header.min(offset),
            Some(_) => self
                .audio
                .and_then(|i| self.tracks.get(i))
                .and_then(|t| t.chunk_offsets.as_ref()?.get(self.samples.chunk_index).copied())
                .map_or(offset, |next| offset.min(next + self.samples.tail_offset)),
        }
    }

    fn finish(&mut self, ctx: &mut DemuxContext) -> Result<()> {
        if !self.moov_done {
            return Err(DemuxError::MissingChunk {
                missing: FourCC(*b"moov"),
                found: FourCC(*b"EOF "),
            }
            .into());
        }

        if let Some(track) = self.audio.and_then(|i| self.tracks.get(i)) {
            let missing = track.bytes_from(self.samples.sample_index);
            if missing > 0 {
                log_or_err!(ctx, Level::Warn, DemuxError::Truncated(missing));
            }
        }
        Ok(())
    }
}
