//! Stream descriptors shared by every demuxer and decoder.

use std::collections::BTreeMap;
use std::fmt;

use crate::io::Chunk;

/// A four character code as found in container headers.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const LPCM: FourCC = FourCC(*b"lpcm");
    pub const ULAW: FourCC = FourCC(*b"ulaw");
    pub const ALAW: FourCC = FourCC(*b"alaw");

    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        Self(value)
    }
}

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC(\"{self}\")")
    }
}

/// Describes the payload a demuxer emits and a decoder consumes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormatDescriptor {
    pub format_id: FourCC,
    pub sample_rate: f64,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
    /// Zero when packets vary in length.
    pub frames_per_packet: u32,
    /// Zero when packets vary in size.
    pub bytes_per_packet: u32,
    pub floating_point: bool,
    pub little_endian: bool,
}

impl FormatDescriptor {
    /// Uncompressed PCM with one frame per packet.
    pub fn pcm(
        format_id: FourCC,
        sample_rate: f64,
        channels_per_frame: u32,
        bits_per_channel: u32,
    ) -> Self {
        Self {
            format_id,
            sample_rate,
            channels_per_frame,
            bits_per_channel,
            frames_per_packet: 1,
            bytes_per_packet: bits_per_channel / 8 * channels_per_frame,
            floating_point: false,
            little_endian: false,
        }
    }

    /// Whole milliseconds covered by `frames` sample frames.
    pub fn frames_to_ms(&self, frames: u64) -> u64 {
        if self.sample_rate > 0.0 {
            (frames as f64 / self.sample_rate * 1000.0) as u64
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Flag(bool),
    Binary(Chunk),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Flag(value) => write!(f, "{value}"),
            Self::Binary(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    /// Start in milliseconds.
    pub timestamp: u64,
    /// Length in milliseconds.
    pub duration: u64,
}
