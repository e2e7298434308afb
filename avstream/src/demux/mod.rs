//! Incremental container demuxing.
//!
//! A [`Demuxer`] owns the byte cursor for one stream and a per-format
//! [`ContainerParser`]. Every pushed chunk re-enters the parser, which checks
//! availability before each read and keeps whatever it needs to resume in its
//! own state. Results come out as [`DemuxEvent`]s in FIFO order.
//!
//! ```rust,no_run
//! use avstream::demux::{ContainerKind, DemuxEvent, Demuxer};
//! use avstream::io::{ByteCursor, Chunk};
//!
//! let file = std::fs::read("song.caf")?;
//! let mut head = ByteCursor::new();
//! head.append(Chunk::from(file));
//!
//! let kind = ContainerKind::probe(&head).ok_or("unknown container")?;
//! let mut demuxer = Demuxer::from_stream(kind, head);
//! demuxer.finish();
//!
//! for event in demuxer.by_ref() {
//!     if let DemuxEvent::Format(format) = event {
//!         println!("{} Hz", format.sample_rate);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod aiff;
pub mod au;
pub mod caf;
pub mod format;
pub mod m4a;
pub mod seek;
pub mod spc;
pub mod wave;

use std::collections::VecDeque;

use anyhow::Result;
use log::{debug, error, trace};

use crate::io::{ByteCursor, Chunk, Encoding};
use crate::utils::errors::{DemuxError, ErrorKind, Failure};

pub use format::{Chapter, FormatDescriptor, FourCC, Metadata, MetadataValue};
pub use seek::{SeekPoint, SeekTable};

#[derive(Debug, Clone, PartialEq)]
pub enum DemuxEvent {
    Format(FormatDescriptor),
    /// Total length in milliseconds.
    Duration(u64),
    Metadata(Metadata),
    /// Codec configuration embedded in the container.
    Cookie(Chunk),
    Data(Chunk),
    Chapters(Vec<Chapter>),
    Error(Failure),
    End,
}

/// State shared between the [`Demuxer`] driver and its parser.
#[derive(Debug)]
pub struct DemuxContext {
    pub stream: ByteCursor,
    pub fail_level: log::Level,
    events: VecDeque<DemuxEvent>,
    seek_table: SeekTable,
    format: Option<FormatDescriptor>,
    final_chunk: bool,
}

impl DemuxContext {
    fn new(stream: ByteCursor) -> Self {
        Self {
            stream,
            fail_level: log::Level::Error,
            events: VecDeque::new(),
            seek_table: SeekTable::new(),
            format: None,
            final_chunk: false,
        }
    }

    pub fn emit(&mut self, event: DemuxEvent) {
        trace!("emit {:?}", EventName(&event));
        if let DemuxEvent::Format(format) = &event {
            self.format = Some(format.clone());
        }
        self.events.push_back(event);
    }

    pub fn format(&self) -> Option<&FormatDescriptor> {
        self.format.as_ref()
    }

    /// True once the source has signalled that no more chunks will arrive.
    pub fn is_final(&self) -> bool {
        self.final_chunk
    }

    pub fn add_seek_point(&mut self, offset: u64, timestamp: u64) {
        self.seek_table.add_point(offset, timestamp);
    }

    pub fn set_seek_table(&mut self, table: SeekTable) {
        self.seek_table = table;
    }

    pub fn seek_table(&self) -> &SeekTable {
        &self.seek_table
    }
}

struct EventName<'a>(&'a DemuxEvent);

impl std::fmt::Debug for EventName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            DemuxEvent::Data(chunk) => write!(f, "Data({} bytes)", chunk.len()),
            DemuxEvent::Cookie(chunk) => write!(f, "Cookie({} bytes)", chunk.len()),
            DemuxEvent::Metadata(map) => write!(f, "Metadata({} entries)", map.len()),
            DemuxEvent::Chapters(list) => write!(f, "Chapters({})", list.len()),
            other => write!(f, "{other:?}"),
        }
    }
}

/// A resumable, per-format parse step.
///
/// `read_chunk` is re-entered after every arrival and once more at the end of
/// the stream. It must return `Ok(())` without consuming anything when the
/// next structure is not yet fully available.
pub trait ContainerParser: Send {
    fn read_chunk(&mut self, ctx: &mut DemuxContext) -> Result<()>;

    /// Lowest stream offset the parser may still seek back to.
    fn rewind_floor(&self, ctx: &DemuxContext) -> u64 {
        ctx.stream.offset()
    }

    /// Runs after the final `read_chunk`, before `End` is emitted.
    fn finish(&mut self, _ctx: &mut DemuxContext) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    M4a,
    Caf,
    Wave,
    Aiff,
    Au,
    Spc,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 6] = [
        Self::M4a,
        Self::Caf,
        Self::Wave,
        Self::Aiff,
        Self::Au,
        Self::Spc,
    ];

    /// Longest prefix any format needs for sniffing.
    pub const PROBE_BYTES: u64 = 33;

    /// Sniffs the container from the first bytes of a stream.
    pub fn probe(stream: &ByteCursor) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.matches(stream))
    }

    fn matches(self, stream: &ByteCursor) -> bool {
        let tag = |offset| stream.peek_array::<4>(offset).ok();
        match self {
            Self::M4a => tag(4) == Some(*b"ftyp") && tag(8).is_some_and(m4a::is_mp4_brand),
            Self::Caf => tag(0) == Some(*b"caff"),
            Self::Wave => tag(0) == Some(*b"RIFF") && tag(8) == Some(*b"WAVE"),
            Self::Aiff => {
                tag(0) == Some(*b"FORM") && matches!(tag(8), Some(t) if &t == b"AIFF" || &t == b"AIFC")
            }
            Self::Au => tag(0) == Some(*b".snd"),
            Self::Spc => stream
                .peek_string(0, Some(spc::MAGIC.len() as u64), Encoding::Latin1)
                .is_ok_and(|magic| magic == spc::MAGIC),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::M4a => "m4a",
            Self::Caf => "caf",
            Self::Wave => "wave",
            Self::Aiff => "aiff",
            Self::Au => "au",
            Self::Spc => "spc",
        }
    }

    fn parser(self) -> Box<dyn ContainerParser> {
        match self {
            Self::M4a => Box::new(m4a::M4aParser::default()),
            Self::Caf => Box::new(caf::CafParser::default()),
            Self::Wave => Box::new(wave::WaveParser::default()),
            Self::Aiff => Box::new(aiff::AiffParser::default()),
            Self::Au => Box::new(au::AuParser::default()),
            Self::Spc => Box::new(spc::SpcParser::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    Running,
    Ended,
    Failed,
}

/// Drives a [`ContainerParser`] over pushed chunks.
///
/// Events are drained through the [`Iterator`] implementation.
pub struct Demuxer {
    kind: ContainerKind,
    ctx: DemuxContext,
    parser: Box<dyn ContainerParser>,
    state: DemuxState,
}

impl Demuxer {
    pub fn new(kind: ContainerKind) -> Self {
        Self::from_stream(kind, ByteCursor::new())
    }

    /// Takes over a cursor that already holds the first chunks, e.g. the
    /// ones used for probing. They are parsed by the next [`Demuxer::resume`],
    /// [`Demuxer::push`] or [`Demuxer::finish`].
    pub fn from_stream(kind: ContainerKind, stream: ByteCursor) -> Self {
        debug!("Creating {} demuxer", kind.name());
        Self {
            kind,
            ctx: DemuxContext::new(stream),
            parser: kind.parser(),
            state: DemuxState::Running,
        }
    }

    /// Sets the level at or above which recoverable anomalies become fatal.
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.ctx.fail_level = level;
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    pub fn format(&self) -> Option<&FormatDescriptor> {
        self.ctx.format()
    }

    pub fn seek_table(&self) -> &SeekTable {
        self.ctx.seek_table()
    }

    pub fn stream(&self) -> &ByteCursor {
        &self.ctx.stream
    }

    pub fn push(&mut self, chunk: Chunk) {
        if self.state != DemuxState::Running {
            return;
        }
        self.ctx.stream.append(chunk);
        self.run();
    }

    /// Signals end of stream: parses once more, then emits `End`.
    pub fn finish(&mut self) {
        if self.state != DemuxState::Running {
            return;
        }
        self.ctx.final_chunk = true;
        self.run();
        if self.state != DemuxState::Running {
            return;
        }

        if let Err(err) = self.parser.finish(&mut self.ctx) {
            self.fail(err);
            return;
        }
        self.ctx.emit(DemuxEvent::End);
        self.state = DemuxState::Ended;
    }

    /// Parses whatever is buffered without adding data.
    pub fn resume(&mut self) {
        if self.state == DemuxState::Running {
            self.run();
        }
    }

    fn run(&mut self) {
        if let Err(err) = self.parser.read_chunk(&mut self.ctx) {
            self.fail(err);
        }
    }

    fn fail(&mut self, err: anyhow::Error) {
        let mut failure = Failure::from(&err);
        if failure.kind == ErrorKind::Underflow {
            failure = Failure::new(
                ErrorKind::MalformedStructure,
                format!("{}: {}", DemuxError::Overrun, failure.message),
            );
        }

        error!("{} demuxer: {}", self.kind.name(), failure.message);
        self.ctx.emit(DemuxEvent::Error(failure));
        self.state = DemuxState::Failed;
    }

    /// Resolves a timestamp to a payload offset.
    ///
    /// Constant bit rate formats are computed exactly; everything else uses
    /// the seek table.
    pub fn seek(&self, timestamp: u64) -> Option<SeekPoint> {
        if let Some(format) = self.ctx.format() {
            if format.frames_per_packet > 0 && format.bytes_per_packet > 0 {
                return Some(SeekPoint {
                    offset: u64::from(format.bytes_per_packet) * timestamp
                        / u64::from(format.frames_per_packet),
                    position: None,
                    timestamp,
                });
            }
        }
        self.ctx.seek_table.lookup(timestamp)
    }

    /// Frees chunks the parser will never seek back into.
    pub fn release_history(&mut self) -> usize {
        let floor = self.parser.rewind_floor(&self.ctx);
        self.ctx.stream.release_before(floor)
    }
}

impl Iterator for Demuxer {
    type Item = DemuxEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.ctx.events.pop_front()
    }
}
