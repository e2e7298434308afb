//! Builders for small synthetic container files used across the unit tests.

use crate::demux::{ContainerKind, DemuxEvent, Demuxer};
use crate::demux::spc;
use crate::io::Chunk;

/// Deterministic filler bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 37 + 123) % 256) as u8).collect()
}

/// Merges runs of adjacent `Data` events so event lists compare equal
/// regardless of how the input was split.
pub fn collapse_data(events: Vec<DemuxEvent>) -> Vec<DemuxEvent> {
    let mut out: Vec<DemuxEvent> = Vec::new();
    for event in events {
        if let DemuxEvent::Data(next) = &event {
            if let Some(DemuxEvent::Data(prev)) = out.last_mut() {
                let mut merged = prev.to_vec();
                merged.extend_from_slice(next);
                *prev = Chunk::from(merged);
                continue;
            }
        }
        out.push(event);
    }
    out
}

/// Collapsed events of `file` delivered as two pushes split at `at`.
pub fn demux_split(kind: ContainerKind, file: &[u8], at: usize) -> Vec<DemuxEvent> {
    let mut demuxer = Demuxer::new(kind);
    demuxer.push(Chunk::from(&file[..at]));
    demuxer.push(Chunk::from(&file[at..]));
    demuxer.finish();
    collapse_data(demuxer.collect())
}

/// Asserts every two-push split of `file` yields the same events as one push.
pub fn assert_split_invariant(kind: ContainerKind, file: &[u8]) {
    let whole = demux_split(kind, file, file.len());
    assert!(
        whole.iter().any(|e| matches!(e, DemuxEvent::Data(_))),
        "no payload: {whole:?}"
    );
    assert_eq!(whole.last(), Some(&DemuxEvent::End));
    for at in 1..file.len() {
        assert_eq!(demux_split(kind, file, at), whole, "split at {at}");
    }
}

// RIFF / WAVE

pub fn wave_fmt(tag: u16, channels: u16, bits: u16) -> Vec<u8> {
    let rate = 44100u32;
    let block = channels * bits / 8;
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&tag.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&rate.to_le_bytes());
    fmt.extend_from_slice(&(rate * u32::from(block)).to_le_bytes());
    fmt.extend_from_slice(&block.to_le_bytes());
    fmt.extend_from_slice(&bits.to_le_bytes());
    fmt
}

pub fn riff_file(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut body = b"WAVE".to_vec();
    for (id, payload) in chunks {
        body.extend_from_slice(*id);
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            body.push(0);
        }
    }

    let mut file = b"RIFF".to_vec();
    file.extend_from_slice(&(body.len() as u32).to_le_bytes());
    file.extend_from_slice(&body);
    file
}

pub fn wave_file(tag: u16, channels: u16, bits: u16, data: &[u8]) -> Vec<u8> {
    riff_file(&[(b"fmt ", wave_fmt(tag, channels, bits)), (b"data", data.to_vec())])
}

// CAF

pub struct CafChunk {
    pub kind: [u8; 4],
    pub payload: Vec<u8>,
}

impl CafChunk {
    pub fn new(kind: &[u8; 4], payload: Vec<u8>) -> Self {
        Self {
            kind: *kind,
            payload,
        }
    }

    /// A `data` chunk with a zero edit count.
    pub fn data(samples: &[u8]) -> Self {
        let mut payload = 0u32.to_be_bytes().to_vec();
        payload.extend_from_slice(samples);
        Self::new(b"data", payload)
    }
}

/// A `desc` payload. Linear PCM is flagged little endian.
pub fn caf_desc(
    format_id: &[u8; 4],
    bytes_per_packet: u32,
    frames_per_packet: u32,
    channels: u32,
    sample_rate: u32,
    bits: u32,
) -> Vec<u8> {
    let flags: u32 = if format_id == b"lpcm" { 2 } else { 0 };
    let mut desc = f64::from(sample_rate).to_be_bytes().to_vec();
    desc.extend_from_slice(format_id);
    for value in [flags, bytes_per_packet, frames_per_packet, channels, bits] {
        desc.extend_from_slice(&value.to_be_bytes());
    }
    desc
}

pub fn caf_info(pairs: &[(&str, &str)]) -> Vec<u8> {
    let mut info = (pairs.len() as u32).to_be_bytes().to_vec();
    for (key, value) in pairs {
        for text in [key, value] {
            info.extend_from_slice(text.as_bytes());
            info.push(0);
        }
    }
    info
}

pub fn caf_file(desc: &[u8], chunks: &[CafChunk]) -> Vec<u8> {
    let mut file = b"caff".to_vec();
    file.extend_from_slice(&1u16.to_be_bytes());
    file.extend_from_slice(&0u16.to_be_bytes());

    let desc = CafChunk::new(b"desc", desc.to_vec());
    for chunk in std::iter::once(&desc).chain(chunks) {
        file.extend_from_slice(&chunk.kind);
        file.extend_from_slice(&(chunk.payload.len() as i64).to_be_bytes());
        file.extend_from_slice(&chunk.payload);
    }
    file
}

/// 16-bit little endian stereo at 44.1 kHz with `data` as the last chunk.
pub fn caf_lpcm_file(data: &[u8]) -> Vec<u8> {
    caf_file(&caf_desc(b"lpcm", 4, 1, 2, 44100, 16), &[CafChunk::data(data)])
}

// AIFF

/// An 80-bit extended float holding a whole number.
fn f80(value: u32) -> [u8; 10] {
    let mut out = [0u8; 10];
    if value == 0 {
        return out;
    }
    let exponent = 31 - value.leading_zeros();
    let mantissa = u64::from(value) << (63 - exponent);
    out[..2].copy_from_slice(&(16383 + exponent as u16).to_be_bytes());
    out[2..].copy_from_slice(&mantissa.to_be_bytes());
    out
}

/// A `COMM` payload at 44.1 kHz; AIFC when `compression` is given.
pub fn aiff_comm(channels: u16, frames: u32, bits: u16, compression: Option<&[u8; 4]>) -> Vec<u8> {
    let mut comm = channels.to_be_bytes().to_vec();
    comm.extend_from_slice(&frames.to_be_bytes());
    comm.extend_from_slice(&bits.to_be_bytes());
    comm.extend_from_slice(&f80(44100));
    if let Some(compression) = compression {
        comm.extend_from_slice(compression);
        comm.extend_from_slice(&[0, 0]); // empty pascal string, padded
    }
    comm
}

pub fn iff_file(form_type: &[u8; 4], chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut body = form_type.to_vec();
    for (id, payload) in chunks {
        body.extend_from_slice(*id);
        body.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        body.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            body.push(0);
        }
    }

    let mut file = b"FORM".to_vec();
    file.extend_from_slice(&(body.len() as u32).to_be_bytes());
    file.extend_from_slice(&body);
    file
}

/// 16-bit stereo at 44.1 kHz. The AIFC variant is byte swapped (`sowt`).
pub fn aiff_file(aifc: bool, data: &[u8]) -> Vec<u8> {
    let frames = (data.len() / 4) as u32;
    let mut ssnd = vec![0u8; 8];
    ssnd.extend_from_slice(data);

    if aifc {
        iff_file(
            b"AIFC",
            &[
                (b"FVER", 0xa280_5140u32.to_be_bytes().to_vec()),
                (b"COMM", aiff_comm(2, frames, 16, Some(b"sowt"))),
                (b"SSND", ssnd),
            ],
        )
    } else {
        iff_file(b"AIFF", &[(b"COMM", aiff_comm(2, frames, 16, None)), (b"SSND", ssnd)])
    }
}

// AU

/// Mono at 8 kHz with the data right after the 24-byte header.
pub fn au_file(encoding: u32, data: &[u8]) -> Vec<u8> {
    let mut file = b".snd".to_vec();
    for value in [24, data.len() as u32, encoding, 8000, 1] {
        file.extend_from_slice(&value.to_be_bytes());
    }
    file.extend_from_slice(data);
    file
}

// SPC

fn put_text(file: &mut [u8], offset: usize, text: &str) {
    file[offset..offset + text.len()].copy_from_slice(text.as_bytes());
}

fn xid6_item(block: &mut Vec<u8>, id: u8, kind: u8, len: u16, data: &[u8]) {
    block.extend_from_slice(&[id, kind]);
    block.extend_from_slice(&len.to_le_bytes());
    block.extend_from_slice(data);
    while block.len() % 4 != 0 {
        block.push(0);
    }
}

/// A complete image tagged "Overworld" by "Composer", 125 s plus a 500 ms
/// fade, optionally followed by an `xid6` block.
pub fn spc_file(with_xid6: bool) -> Vec<u8> {
    let mut file = vec![0u8; spc::IMAGE_SIZE as usize];
    put_text(&mut file, 0, spc::MAGIC);
    file[0x21..0x25].copy_from_slice(&[26, 26, 26, 30]);
    put_text(&mut file, 0x2e, "Overworld");
    put_text(&mut file, 0x4e, "Quest");
    put_text(&mut file, 0xa9, "125");
    put_text(&mut file, 0xac, "500");
    put_text(&mut file, 0xb1, "Composer");
    file[0x100..].copy_from_slice(&pattern(spc::IMAGE_SIZE as usize - 0x100));

    if with_xid6 {
        let mut block = Vec::new();
        let title = b"Overworld Theme\0";
        xid6_item(&mut block, 0x01, 1, title.len() as u16, title);
        xid6_item(&mut block, 0x06, 0, 2, &[]);
        xid6_item(&mut block, 0x12, 0, 12 << 8 | u16::from(b'b'), &[]);
        xid6_item(&mut block, 0x14, 0, 1994, &[]);
        xid6_item(&mut block, 0x05, 4, 4, &20010203u32.to_le_bytes());

        file.extend_from_slice(b"xid6");
        file.extend_from_slice(&(block.len() as u32).to_le_bytes());
        file.extend_from_slice(&block);
    }
    file
}

// MP4

#[derive(Debug, Clone)]
pub enum M4aCookie {
    /// Decoder specific info wrapped in an `esds` box.
    Esds(Vec<u8>),
    /// Raw `alac` magic cookie.
    Alac(Vec<u8>),
}

/// Shape of a synthetic M4A file: one audio track, optionally a chapter
/// text track and iTunes metadata.
#[derive(Debug, Clone)]
pub struct M4aParams {
    pub mdat_first: bool,
    /// Filler bytes between consecutive audio chunks.
    pub chunk_gap: usize,
    pub metadata: bool,
    pub chapters: Vec<String>,
    /// Encode every second chapter title as UTF-16 with a BOM.
    pub utf16_chapters: bool,
    pub samples: usize,
    pub samples_per_chunk: usize,
    pub sample_duration: u32,
    pub format_id: [u8; 4],
    pub cookie: Option<M4aCookie>,
    pub co64: bool,
    pub large_mdat: bool,
    pub brand: [u8; 4],
    pub handler: [u8; 4],
    pub sample_descriptions: u32,
}

impl Default for M4aParams {
    fn default() -> Self {
        Self {
            mdat_first: false,
            chunk_gap: 0,
            metadata: false,
            chapters: Vec::new(),
            utf16_chapters: false,
            samples: 24,
            samples_per_chunk: 5,
            sample_duration: 1024,
            format_id: *b"twos",
            cookie: None,
            co64: false,
            large_mdat: false,
            brand: *b"M4A ",
            handler: *b"soun",
            sample_descriptions: 1,
        }
    }
}

const AUDIO_TIME_SCALE: u32 = 44100;
const CHAPTER_LENGTH_MS: u32 = 1500;

impl M4aParams {
    /// Sizes of the audio samples, all multiples of a 16-bit stereo frame.
    pub fn sample_sizes(&self) -> Vec<u32> {
        (0..self.samples).map(|i| 4 * (8 + (i * 5 % 7)) as u32).collect()
    }

    /// The audio samples in decode order, without container gaps.
    pub fn payload(&self) -> Vec<u8> {
        let total: u32 = self.sample_sizes().iter().sum();
        pattern(total as usize)
    }

    fn chunk_lengths(&self) -> Vec<usize> {
        let mut lengths = vec![self.samples_per_chunk; self.samples / self.samples_per_chunk];
        if self.samples % self.samples_per_chunk != 0 {
            lengths.push(self.samples % self.samples_per_chunk);
        }
        lengths
    }

    fn chapter_samples(&self) -> Vec<Vec<u8>> {
        self.chapters
            .iter()
            .enumerate()
            .map(|(i, title)| {
                let text = if self.utf16_chapters && i % 2 == 1 {
                    let mut text = vec![0xfe, 0xff];
                    text.extend(title.encode_utf16().flat_map(u16::to_be_bytes));
                    text
                } else {
                    title.as_bytes().to_vec()
                };
                let mut sample = (text.len() as u16).to_be_bytes().to_vec();
                sample.extend_from_slice(&text);
                sample
            })
            .collect()
    }
}

fn mp4_box(name: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(name);
    out.extend_from_slice(payload);
    out
}

fn full_box(name: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(payload);
    mp4_box(name, &body)
}

fn u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// An `esds` payload (version and flags included) carrying `config` as
/// decoder specific info.
pub fn esds_payload(config: &[u8]) -> Vec<u8> {
    let mut specific = vec![0x05, config.len() as u8];
    specific.extend_from_slice(config);

    let mut decoder_config = vec![0x04, (13 + specific.len()) as u8];
    decoder_config.extend_from_slice(&[0x40, 0x15, 0, 0x18, 0, 0, 1, 0xf4, 0, 0, 1, 0xf4, 0]);
    decoder_config.extend_from_slice(&specific);

    let body_len = 3 + decoder_config.len() + 3;
    let mut out = vec![0, 0, 0, 0, 0x03, 0x80, 0x80, 0x80, body_len as u8];
    out.extend_from_slice(&[0, 1, 0]); // ES_ID, flags
    out.extend_from_slice(&decoder_config);
    out.extend_from_slice(&[0x06, 0x01, 0x02]);
    out
}

fn tkhd(id: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    payload.extend_from_slice(&id.to_be_bytes());
    payload.extend_from_slice(&[0; 68]);
    full_box(b"tkhd", &payload)
}

fn mdhd(time_scale: u32, duration: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    payload.extend_from_slice(&u32s(&[time_scale, duration]));
    payload.extend_from_slice(&[0x55, 0xc4, 0, 0]);
    full_box(b"mdhd", &payload)
}

fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(handler);
    payload.extend_from_slice(&[0; 13]);
    full_box(b"hdlr", &payload)
}

fn sample_table(stsd: Vec<u8>, stts: &[u32], stsc: &[u32], sizes: &[u32], offsets: &[u64], wide: bool) -> Vec<u8> {
    let mut stbl = stsd;
    stbl.extend(full_box(b"stts", &u32s(stts)));
    stbl.extend(full_box(b"stsc", &u32s(stsc)));

    let mut stsz = u32s(&[0, sizes.len() as u32]);
    stsz.extend(u32s(sizes));
    stbl.extend(full_box(b"stsz", &stsz));

    let mut chunk_offsets = u32s(&[offsets.len() as u32]);
    if wide {
        chunk_offsets.extend(offsets.iter().flat_map(|o| o.to_be_bytes()));
        stbl.extend(full_box(b"co64", &chunk_offsets));
    } else {
        chunk_offsets.extend(offsets.iter().flat_map(|&o| (o as u32).to_be_bytes()));
        stbl.extend(full_box(b"stco", &chunk_offsets));
    }
    mp4_box(b"stbl", &stbl)
}

fn trak(children: &[Vec<u8>]) -> Vec<u8> {
    mp4_box(b"trak", &children.concat())
}

fn ilst_item(tag: &[u8; 4], kind: u32, value: &[u8]) -> Vec<u8> {
    let mut data = u32s(&[kind, 0]);
    data.extend_from_slice(value);
    mp4_box(tag, &mp4_box(b"data", &data))
}

fn audio_trak(params: &M4aParams, offsets: &[u64]) -> Vec<u8> {
    let mut entry = vec![0u8; 6];
    entry.extend_from_slice(&1u16.to_be_bytes()); // data reference index
    entry.extend_from_slice(&[0; 8]); // version, revision, vendor
    entry.extend_from_slice(&2u16.to_be_bytes());
    entry.extend_from_slice(&16u16.to_be_bytes());
    entry.extend_from_slice(&[0; 4]);
    entry.extend_from_slice(&(AUDIO_TIME_SCALE as u16).to_be_bytes());
    entry.extend_from_slice(&[0; 2]);
    match &params.cookie {
        Some(M4aCookie::Esds(config)) => entry.extend(mp4_box(b"esds", &esds_payload(config))),
        Some(M4aCookie::Alac(cookie)) => entry.extend(full_box(b"alac", cookie)),
        None => {}
    }
    let entry = mp4_box(&params.format_id, &entry);

    let mut stsd = u32s(&[params.sample_descriptions]);
    for _ in 0..params.sample_descriptions {
        stsd.extend_from_slice(&entry);
    }

    let lengths = params.chunk_lengths();
    let mut stsc = vec![1, params.samples_per_chunk as u32, 1];
    if let Some(&last) = lengths.last() {
        if last != params.samples_per_chunk {
            stsc.extend([lengths.len() as u32, last as u32, 1]);
        }
    }
    let stsc_entries = (stsc.len() / 3) as u32;
    stsc.insert(0, stsc_entries);

    let stbl = sample_table(
        full_box(b"stsd", &stsd),
        &[1, params.samples as u32, params.sample_duration],
        &stsc,
        &params.sample_sizes(),
        offsets,
        params.co64,
    );

    let duration = params.samples as u32 * params.sample_duration;
    let minf = mp4_box(b"minf", &[full_box(b"smhd", &[0; 4]), stbl].concat());
    let mdia = mp4_box(b"mdia", &[mdhd(AUDIO_TIME_SCALE, duration), hdlr(&params.handler), minf].concat());

    let mut children = vec![tkhd(1)];
    if !params.chapters.is_empty() {
        children.push(mp4_box(b"tref", &mp4_box(b"chap", &2u32.to_be_bytes())));
    }
    children.push(mdia);
    trak(&children)
}

fn chapter_trak(params: &M4aParams, offsets: &[u64]) -> Vec<u8> {
    let count = params.chapters.len() as u32;
    let sizes: Vec<u32> = params.chapter_samples().iter().map(|s| s.len() as u32).collect();
    let stsd = full_box(b"stsd", &[u32s(&[1]), mp4_box(b"text", &[0; 8])].concat());
    let stbl = sample_table(
        stsd,
        &[1, count, CHAPTER_LENGTH_MS],
        &[1, 1, 1, 1],
        &sizes,
        offsets,
        params.co64,
    );

    let minf = mp4_box(b"minf", &stbl);
    let mdia = mp4_box(
        b"mdia",
        &[mdhd(1000, count * CHAPTER_LENGTH_MS), hdlr(b"text"), minf].concat(),
    );
    trak(&[tkhd(2), mdia])
}

fn moov(params: &M4aParams, audio_offsets: &[u64], chapter_offsets: &[u64]) -> Vec<u8> {
    let mut children = vec![full_box(b"mvhd", &[0; 96]), audio_trak(params, audio_offsets)];
    if !params.chapters.is_empty() {
        children.push(chapter_trak(params, chapter_offsets));
    }
    if params.metadata {
        let ilst = [
            ilst_item(b"\xa9nam", 1, b"Test Tone"),
            ilst_item(b"\xa9ART", 1, b"Nobody"),
            ilst_item(b"trkn", 0, &[0, 0, 0, 2, 0, 9, 0, 0]),
            ilst_item(b"pgap", 21, &[1]),
        ]
        .concat();
        let meta = full_box(b"meta", &[hdlr(b"mdir"), mp4_box(b"ilst", &ilst)].concat());
        children.push(mp4_box(b"udta", &meta));
    }
    mp4_box(b"moov", &children.concat())
}

struct M4aLayout {
    ftyp: Vec<u8>,
    mdat: Vec<u8>,
    moov: Vec<u8>,
}

fn m4a_layout(params: &M4aParams) -> M4aLayout {
    let mut ftyp = params.brand.to_vec();
    ftyp.extend_from_slice(&[0; 4]);
    ftyp.extend_from_slice(&params.brand);
    ftyp.extend_from_slice(b"isom");
    let ftyp = mp4_box(b"ftyp", &ftyp);

    // Offsets relative to the mdat payload.
    let payload = params.payload();
    let sizes = params.sample_sizes();
    let mut body = Vec::new();
    let mut audio_offsets = Vec::new();
    let mut sample = 0;
    let mut consumed = 0;
    for (index, length) in params.chunk_lengths().into_iter().enumerate() {
        if index > 0 {
            body.extend(std::iter::repeat_n(0xee, params.chunk_gap));
        }
        audio_offsets.push(body.len() as u64);
        let bytes: u32 = sizes[sample..sample + length].iter().sum();
        body.extend_from_slice(&payload[consumed..consumed + bytes as usize]);
        consumed += bytes as usize;
        sample += length;
    }
    let mut chapter_offsets = Vec::new();
    for chapter in params.chapter_samples() {
        chapter_offsets.push(body.len() as u64);
        body.extend(chapter);
    }

    let header_len = if params.large_mdat { 16 } else { 8 };
    let moov_len = moov(params, &audio_offsets, &chapter_offsets).len();
    let start = (ftyp.len() + header_len + if params.mdat_first { 0 } else { moov_len }) as u64;
    let shift = |offsets: &[u64]| offsets.iter().map(|o| o + start).collect::<Vec<_>>();
    let moov = moov(params, &shift(&audio_offsets), &shift(&chapter_offsets));

    let mdat = if params.large_mdat {
        let mut mdat = vec![0, 0, 0, 1];
        mdat.extend_from_slice(b"mdat");
        mdat.extend_from_slice(&((body.len() + 16) as u64).to_be_bytes());
        mdat.extend_from_slice(&body);
        mdat
    } else {
        mp4_box(b"mdat", &body)
    };

    M4aLayout { ftyp, mdat, moov }
}

pub fn m4a_file(params: &M4aParams) -> Vec<u8> {
    let M4aLayout { ftyp, mdat, moov } = m4a_layout(params);
    if params.mdat_first {
        [ftyp, mdat, moov].concat()
    } else {
        [ftyp, moov, mdat].concat()
    }
}

/// Where `moov` starts in [`m4a_file`].
pub fn m4a_moov_offset(params: &M4aParams) -> usize {
    let layout = m4a_layout(params);
    if params.mdat_first {
        layout.ftyp.len() + layout.mdat.len()
    } else {
        layout.ftyp.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn m4a_offsets_point_at_samples() {
        let params = M4aParams {
            chunk_gap: 2,
            ..Default::default()
        };
        let file = m4a_file(&params);
        let payload = params.payload();
        let sizes = params.sample_sizes();
        let first_chunk: u32 = sizes[..params.samples_per_chunk].iter().sum();
        let start = file.len() - (payload.len() + 2 * (params.chunk_lengths().len() - 1));
        assert_eq!(&file[start..start + first_chunk as usize], &payload[..first_chunk as usize]);
    }

    #[test]
    fn f80_encodes_sample_rates() {
        assert_eq!(f80(44100), [0x40, 0x0e, 0xac, 0x44, 0, 0, 0, 0, 0, 0]);
        assert_eq!(f80(8000)[..4], [0x40, 0x0b, 0xfa, 0x00]);
    }
}
