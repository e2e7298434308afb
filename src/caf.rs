use std::io::{self, Seek, SeekFrom, Write};

use avstream::decode::Samples;
use avstream::demux::{FormatDescriptor, FourCC, Metadata};

use crate::byteorder::WriteBytesBe;
use crate::impl_u32_enum;
use avstreamd_macros::{ToBytes, caf_chunk_type};

pub fn write_caf_file_header<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(b"caff")?;
    writer.write_all(&1u16.to_be_bytes())?;
    writer.write_all(&0u16.to_be_bytes())?;

    Ok(())
}

pub trait CafChunk {
    fn chunk_type(&self) -> &[u8; 4];
    fn chunk_data(&self) -> Vec<u8>;

    fn write_all<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let chunk_data = self.chunk_data();
        writer.write_all(self.chunk_type())?;
        writer.write_all(&(chunk_data.len() as u64).to_be_bytes())?;
        writer.write_all(&chunk_data)?;

        Ok(())
    }
}

#[derive(Debug, ToBytes)]
#[caf_chunk_type(b"desc")]
pub struct AudioDescription {
    pub sample_rate: f64,
    pub format_id: FourCC,
    pub format_flags: u32,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
}

#[derive(Debug, ToBytes)]
#[caf_chunk_type(b"chan")]
pub struct ChannelLayout {
    pub channel_layout_tag: ChannelLayoutTag,
    pub channel_bitmap: u32,
    pub number_channel_descriptions: u32,
}

#[allow(non_camel_case_types)]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayoutTag {
    /// Standard mono stream
    Mono = (100 << 16) | 1,
    /// Standard stereo stream (L R)
    Stereo = (101 << 16) | 2,
    /// Quadraphonic (front left, front right, back left, back right)
    Quadraphonic = (108 << 16) | 4,
    MPEG_3_0_A = (113 << 16) | 3, // L R C
    MPEG_5_0_A = (117 << 16) | 5, // L R C Ls Rs
    MPEG_5_1_A = (121 << 16) | 6, // L R C LFE Ls Rs
    MPEG_7_1_A = (126 << 16) | 8, // L R C LFE Ls Rs Lc Rc
}

impl_u32_enum!(ChannelLayoutTag);

impl ChannelLayoutTag {
    pub fn for_channels(channels: u32) -> Option<Self> {
        Some(match channels {
            1 => Self::Mono,
            2 => Self::Stereo,
            3 => Self::MPEG_3_0_A,
            4 => Self::Quadraphonic,
            5 => Self::MPEG_5_0_A,
            6 => Self::MPEG_5_1_A,
            8 => Self::MPEG_7_1_A,
            _ => return None,
        })
    }
}

/// `info` chunk: an entry count followed by NUL terminated key/value pairs.
#[derive(Debug, Default)]
pub struct Information {
    pub entries: Vec<(String, String)>,
}

impl CafChunk for Information {
    fn chunk_type(&self) -> &[u8; 4] {
        b"info"
    }

    fn chunk_data(&self) -> Vec<u8> {
        let mut vec = Vec::new();
        (self.entries.len() as u32).write_be(&mut vec);
        for (key, value) in &self.entries {
            for text in [key, value] {
                vec.extend_from_slice(text.as_bytes());
                vec.push(0);
            }
        }
        vec
    }
}

/// Linear PCM format flags following Core Audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearPcmFormatFlags {
    /// kLinearPCMFormatFlagIsFloat (bit 0)
    pub is_float: bool,
    /// kLinearPCMFormatFlagIsLittleEndian (bit 1)
    pub is_little_endian: bool,
}

impl LinearPcmFormatFlags {
    pub fn to_u32(self) -> u32 {
        let mut flags = 0u32;
        if self.is_float {
            flags |= 1 << 0;
        }
        if self.is_little_endian {
            flags |= 1 << 1;
        }
        flags
    }
}

/// Serializes decoded samples at the width `bits_per_channel` describes.
/// 24-bit samples are packed into three bytes.
pub fn pack_samples(samples: &Samples, bits_per_channel: u32, little_endian: bool) -> Vec<u8> {
    match samples {
        Samples::I32(values) if bits_per_channel == 24 => {
            let mut buffer = Vec::with_capacity(values.len() * 3);
            for &sample in values {
                if little_endian {
                    buffer.extend_from_slice(&sample.to_le_bytes()[0..3]);
                } else {
                    buffer.extend_from_slice(&sample.to_be_bytes()[1..4]);
                }
            }
            buffer
        }
        other => other.to_bytes(little_endian),
    }
}

/// CAF writer that writes a header with unknown data length and patches it
/// on `finish`.
pub struct CafWriter<W: Write + Seek> {
    writer: W,
    description: Option<AudioDescription>,
    channel_layout: Option<ChannelLayout>,
    information: Information,
    data_chunk_start: Option<u64>,
    data_size_position: Option<u64>,
    data_written: u64,
    finished: bool,
}

impl<W: Write + Seek> CafWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            description: None,
            channel_layout: None,
            information: Information::default(),
            data_chunk_start: None,
            data_size_position: None,
            data_written: 0,
            finished: false,
        }
    }

    fn check_not_finished(&self) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Writer already finished",
            ));
        }
        Ok(())
    }

    fn ensure_header_written(&self) -> io::Result<(u64, u64)> {
        match (self.data_size_position, self.data_chunk_start) {
            (Some(size_pos), Some(start)) => Ok((size_pos, start)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Must call write_header() before this operation",
            )),
        }
    }

    /// Describes big-endian linear PCM matching a decoder's output format.
    pub fn set_format(&mut self, format: &FormatDescriptor) -> io::Result<()> {
        if format.channels_per_frame == 0 || format.bits_per_channel == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Cannot write {} channels of {}-bit audio",
                    format.channels_per_frame, format.bits_per_channel
                ),
            ));
        }

        let flags = LinearPcmFormatFlags {
            is_float: format.floating_point,
            is_little_endian: false,
        };
        self.description = Some(AudioDescription {
            sample_rate: format.sample_rate,
            format_id: FourCC::LPCM,
            format_flags: flags.to_u32(),
            bytes_per_packet: format.bits_per_channel.div_ceil(8) * format.channels_per_frame,
            frames_per_packet: 1,
            channels_per_frame: format.channels_per_frame,
            bits_per_channel: format.bits_per_channel,
        });
        self.channel_layout =
            ChannelLayoutTag::for_channels(format.channels_per_frame).map(|tag| ChannelLayout {
                channel_layout_tag: tag,
                channel_bitmap: 0,
                number_channel_descriptions: 0,
            });
        Ok(())
    }

    /// Queues container metadata for the `info` chunk.
    pub fn add_metadata(&mut self, metadata: &Metadata) {
        self.information.entries.extend(
            metadata
                .iter()
                .map(|(key, value)| (key.clone(), value.to_string())),
        );
    }

    /// Begins writing the file. Must be called before `write_samples`.
    pub fn write_header(&mut self) -> io::Result<()> {
        self.check_not_finished()?;
        let description = self.description.as_ref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "Audio format must be set before writing header",
            )
        })?;

        write_caf_file_header(&mut self.writer)?;
        description.write_all(&mut self.writer)?;
        if let Some(layout) = &self.channel_layout {
            layout.write_all(&mut self.writer)?;
        }
        if !self.information.entries.is_empty() {
            self.information.write_all(&mut self.writer)?;
        }

        self.writer.write_all(b"data")?;
        self.data_size_position = Some(self.writer.stream_position()?);
        self.writer.write_all(&(-1i64).to_be_bytes())?; // unknown size
        self.writer.write_all(&0u32.to_be_bytes())?; // edit count

        self.data_chunk_start = Some(self.writer.stream_position()?);
        Ok(())
    }

    pub fn write_samples(&mut self, samples: &Samples) -> io::Result<()> {
        let bits = self
            .description
            .as_ref()
            .map_or(0, |description| description.bits_per_channel);
        self.write_data(&pack_samples(samples, bits, false))
    }

    pub fn write_data(&mut self, data: &[u8]) -> io::Result<()> {
        self.ensure_header_written()?;
        self.check_not_finished()?;

        self.writer.write_all(data)?;
        self.data_written += data.len() as u64;
        Ok(())
    }

    /// Patches the data chunk size.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        let (size_pos, data_start) = self.ensure_header_written()?;

        let current_pos = self.writer.stream_position()?;
        let chunk_size = current_pos - data_start + 4; // edit count

        self.writer.seek(SeekFrom::Start(size_pos))?;
        self.writer.write_all(&(chunk_size as i64).to_be_bytes())?;
        self.writer.seek(SeekFrom::Start(current_pos))?;
        self.writer.flush()?;

        self.finished = true;
        Ok(())
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.finish()?;
        Ok(self.writer)
    }
}
