//! Transactional sample decoding.
//!
//! A [`Decoder`] owns a [`BitCursor`] fed with the demuxer's payload chunks
//! and a format-specific [`PacketReader`]. Every [`Decoder::decode`] call
//! records the cursor's bit offset before asking the reader for a packet.
//! When the packet cannot be completed the cursor is rolled back to that
//! checkpoint, so a retry after more data arrives behaves as if the data had
//! been there all along.

pub mod lpcm;
pub mod xlaw;

use std::collections::VecDeque;

use anyhow::Result;
use log::{debug, error, trace};

use crate::demux::{FormatDescriptor, FourCC};
use crate::io::{BitCursor, Chunk};
use crate::utils::errors::{DecodeError, ErrorKind, Failure};

/// Samples of one decoded packet, interleaved by channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    I8(Vec<i8>),
    I16(Vec<i16>),
    /// 24-bit samples are sign extended into 32 bits.
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of one sample in memory.
    pub fn sample_bytes(&self) -> usize {
        match self {
            Self::I8(_) => 1,
            Self::I16(_) => 2,
            Self::I32(_) | Self::F32(_) => 4,
            Self::F64(_) => 8,
        }
    }

    /// Serializes the samples in the requested byte order.
    pub fn to_bytes(&self, little_endian: bool) -> Vec<u8> {
        macro_rules! serialize {
            ($values:expr) => {
                $values
                    .iter()
                    .flat_map(|v| {
                        if little_endian {
                            v.to_le_bytes()
                        } else {
                            v.to_be_bytes()
                        }
                    })
                    .collect()
            };
        }

        match self {
            Self::I8(v) => v.iter().map(|&s| s as u8).collect(),
            Self::I16(v) => serialize!(v),
            Self::I32(v) => serialize!(v),
            Self::F32(v) => serialize!(v),
            Self::F64(v) => serialize!(v),
        }
    }
}

/// Format-specific packet extraction.
///
/// `read_packet` may consume bytes and then fail with an underflow, or
/// return `Ok(None)` when too little data is buffered. Either way the
/// [`Decoder`] restores the cursor, so readers need no undo logic of their
/// own.
pub trait PacketReader: Send {
    /// Validates the input format and adjusts it to describe the output.
    fn init(&mut self, _format: &mut FormatDescriptor) -> Result<()> {
        Ok(())
    }

    /// Receives codec configuration embedded in the container.
    fn set_cookie(&mut self, _cookie: &Chunk) -> Result<()> {
        Ok(())
    }

    fn read_packet(
        &mut self,
        bits: &mut BitCursor,
        format: &FormatDescriptor,
    ) -> Result<Option<Samples>>;
}

/// Looks up a reader for a container format id.
pub fn find(format_id: FourCC) -> Option<Box<dyn PacketReader>> {
    match format_id {
        FourCC::LPCM => Some(Box::new(lpcm::LpcmReader::default())),
        FourCC::ULAW => Some(Box::new(xlaw::XlawReader::ulaw())),
        FourCC::ALAW => Some(Box::new(xlaw::XlawReader::alaw())),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    Data(Samples),
    Error(Failure),
    End,
}

/// Outcome of one [`Decoder::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    /// A packet was emitted and more may follow.
    Produced,
    /// Nothing could be produced until more data arrives.
    Waiting,
    /// End of stream has been emitted.
    Finished,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Running,
    Waiting,
    Ended,
    Failed,
}

type CookieHook = Box<dyn FnMut(&Chunk) -> Result<()> + Send>;

/// Drives a [`PacketReader`] with checkpoint and rollback.
///
/// Events are drained through the [`Iterator`] implementation.
pub struct Decoder {
    format: FormatDescriptor,
    reader: Box<dyn PacketReader>,
    bits: BitCursor,
    events: VecDeque<DecodeEvent>,
    cookie_hook: Option<CookieHook>,
    state: DecodeState,
    final_chunk: bool,
}

impl Decoder {
    /// Creates a decoder for the format a demuxer reported.
    pub fn new(format: &FormatDescriptor) -> Result<Self> {
        let reader = find(format.format_id).ok_or(DecodeError::NoDecoder(format.format_id))?;
        Self::with_reader(format, reader)
    }

    pub fn with_reader(
        format: &FormatDescriptor,
        mut reader: Box<dyn PacketReader>,
    ) -> Result<Self> {
        let mut format = format.clone();
        reader.init(&mut format)?;
        debug!(
            "Decoding {} at {} Hz, {} channels, {} bits",
            format.format_id, format.sample_rate, format.channels_per_frame, format.bits_per_channel
        );

        Ok(Self {
            format,
            reader,
            bits: BitCursor::default(),
            events: VecDeque::new(),
            cookie_hook: None,
            state: DecodeState::Running,
            final_chunk: false,
        })
    }

    /// Installs a callback that sees every cookie before the reader does.
    pub fn set_cookie_hook(&mut self, hook: impl FnMut(&Chunk) -> Result<()> + Send + 'static) {
        self.cookie_hook = Some(Box::new(hook));
    }

    /// Output format: the input descriptor as adjusted by the reader.
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn bits(&self) -> &BitCursor {
        &self.bits
    }

    /// Hands embedded codec configuration to the hook and the reader.
    /// Failures inside either become an `Error` event.
    pub fn push_cookie(&mut self, cookie: &Chunk) {
        if self.is_done() {
            return;
        }

        let mut result = Ok(());
        if let Some(hook) = self.cookie_hook.as_mut() {
            result = hook(cookie);
        }
        if result.is_ok() {
            result = self.reader.set_cookie(cookie);
        }

        if let Err(err) = result {
            let err = anyhow::Error::new(DecodeError::Cookie(format!("{err:#}")));
            self.fail(err);
        }
    }

    /// Appends payload and decodes as far as it reaches.
    pub fn push(&mut self, chunk: Chunk) {
        if self.is_done() {
            return;
        }
        self.bits.append(chunk);
        if self.state == DecodeState::Waiting {
            self.state = DecodeState::Running;
        }
        self.run();
    }

    /// Signals that no more payload will arrive, drains what is left and
    /// emits `End`.
    pub fn finish(&mut self) {
        if self.is_done() {
            return;
        }
        self.final_chunk = true;
        self.state = DecodeState::Running;
        self.run();
    }

    /// Decodes until a call produces nothing.
    pub fn run(&mut self) -> DecodeStep {
        loop {
            let step = self.decode();
            if step != DecodeStep::Produced {
                return step;
            }
        }
    }

    /// Attempts one packet.
    pub fn decode(&mut self) -> DecodeStep {
        match self.state {
            DecodeState::Ended => return DecodeStep::Finished,
            DecodeState::Failed => return DecodeStep::Failed,
            _ => {}
        }

        let checkpoint = self.bits.offset();
        match self.reader.read_packet(&mut self.bits, &self.format) {
            Ok(Some(samples)) if !samples.is_empty() => {
                trace!("decoded {} samples at bit {checkpoint}", samples.len());
                self.state = DecodeState::Running;
                self.events.push_back(DecodeEvent::Data(samples));
                DecodeStep::Produced
            }
            Ok(_) => self.roll_back(checkpoint),
            Err(err) if ErrorKind::classify(&err) == ErrorKind::Underflow => {
                self.roll_back(checkpoint)
            }
            Err(err) => {
                self.fail(err);
                DecodeStep::Failed
            }
        }
    }

    fn roll_back(&mut self, checkpoint: u64) -> DecodeStep {
        if let Err(err) = self.bits.seek(checkpoint) {
            self.fail(err.into());
            return DecodeStep::Failed;
        }

        if self.final_chunk {
            if self.bits.remaining_bits() > 0 {
                debug!(
                    "Dropping {} trailing bits that do not form a packet",
                    self.bits.remaining_bits()
                );
            }
            self.events.push_back(DecodeEvent::End);
            self.state = DecodeState::Ended;
            DecodeStep::Finished
        } else {
            self.state = DecodeState::Waiting;
            DecodeStep::Waiting
        }
    }

    fn fail(&mut self, err: anyhow::Error) {
        let failure = Failure::from(&err);
        error!("{} decoder: {}", self.format.format_id, failure.message);
        self.events.push_back(DecodeEvent::Error(failure));
        self.state = DecodeState::Failed;
    }

    fn is_done(&self) -> bool {
        matches!(self.state, DecodeState::Ended | DecodeState::Failed)
    }

    /// Moves to a byte offset into the payload, e.g. one resolved through a
    /// seek table. Fails when that part of the history has been released.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.bits.seek(offset * 8)?;
        if self.state == DecodeState::Ended && self.bits.remaining_bits() > 0 {
            self.state = DecodeState::Running;
            self.final_chunk = true;
        }
        Ok(())
    }

    /// Drops payload chunks that lie entirely behind the cursor.
    pub fn release_history(&mut self) -> usize {
        self.bits.stream_mut().release_consumed()
    }
}

impl Iterator for Decoder {
    type Item = DecodeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.pop_front()
    }
}
