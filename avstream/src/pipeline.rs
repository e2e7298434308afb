//! Wires a [`Demuxer`] to a [`Decoder`] for one asset.
//!
//! Chunks are buffered until the container can be sniffed, then every
//! demuxer event is handled in arrival order. Payload goes to the decoder,
//! whose loop runs to exhaustion before the next demuxer event is looked at.

use std::collections::VecDeque;

use log::{debug, info};

use crate::decode::{DecodeEvent, Decoder, Samples};
use crate::demux::{
    Chapter, ContainerKind, DemuxEvent, Demuxer, FormatDescriptor, Metadata, SeekPoint,
};
use crate::io::{ByteCursor, Chunk};
use crate::utils::errors::{DemuxError, Failure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Decode payload into samples. When false only the descriptive events
    /// are produced.
    pub decode: bool,
    /// Treat warnings as fatal.
    pub strict: bool,
    /// Keep every pushed chunk so the stream can be rewound arbitrarily.
    pub retain_history: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            decode: true,
            strict: false,
            retain_history: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Output format; adjusted by the decoder when decoding.
    Format(FormatDescriptor),
    /// Milliseconds.
    Duration(u64),
    Metadata(Metadata),
    Chapters(Vec<Chapter>),
    Samples(Samples),
    Error(Failure),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Probing,
    Running,
    Ended,
    Failed,
}

type CookieHook = Box<dyn FnMut(&Chunk) -> anyhow::Result<()> + Send>;

pub struct Pipeline {
    options: PipelineOptions,
    head: ByteCursor,
    demuxer: Option<Demuxer>,
    decoder: Option<Decoder>,
    cookie_hook: Option<CookieHook>,
    events: VecDeque<PipelineEvent>,
    state: PipelineState,
    payload_bytes: u64,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            head: ByteCursor::new(),
            demuxer: None,
            decoder: None,
            cookie_hook: None,
            events: VecDeque::new(),
            state: PipelineState::Probing,
            payload_bytes: 0,
        }
    }

    /// Installs a callback invoked with embedded codec configuration. It is
    /// handed to the decoder once the format is known.
    pub fn set_cookie_hook(
        &mut self,
        hook: impl FnMut(&Chunk) -> anyhow::Result<()> + Send + 'static,
    ) {
        self.cookie_hook = Some(Box::new(hook));
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn kind(&self) -> Option<ContainerKind> {
        self.demuxer.as_ref().map(Demuxer::kind)
    }

    pub fn demuxer(&self) -> Option<&Demuxer> {
        self.demuxer.as_ref()
    }

    pub fn decoder(&self) -> Option<&Decoder> {
        self.decoder.as_ref()
    }

    /// Payload bytes the demuxer has emitted so far.
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    pub fn push(&mut self, chunk: Chunk) {
        match self.state {
            PipelineState::Probing => {
                self.head.append(chunk);
                if self.head.available(ContainerKind::PROBE_BYTES) {
                    self.start();
                }
            }
            PipelineState::Running => {
                if let Some(demuxer) = self.demuxer.as_mut() {
                    demuxer.push(chunk);
                }
            }
            PipelineState::Ended | PipelineState::Failed => return,
        }
        self.pump();
    }

    /// Signals end of stream.
    pub fn finish(&mut self) {
        if self.state == PipelineState::Probing {
            self.start();
        }
        if self.state != PipelineState::Running {
            return;
        }

        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.finish();
        }
        self.pump();
    }

    /// Resolves a timestamp in sample frames to a payload offset.
    pub fn seek(&self, timestamp: u64) -> Option<SeekPoint> {
        self.demuxer.as_ref()?.seek(timestamp)
    }

    fn start(&mut self) {
        let Some(kind) = ContainerKind::probe(&self.head) else {
            self.fail(Failure::from(&anyhow::Error::new(DemuxError::UnknownContainer)));
            return;
        };

        info!("Detected {} container", kind.name());
        let mut demuxer = Demuxer::from_stream(kind, std::mem::take(&mut self.head));
        if self.options.strict {
            demuxer.set_fail_level(log::Level::Warn);
        }
        demuxer.resume();
        self.demuxer = Some(demuxer);
        self.state = PipelineState::Running;
    }

    fn pump(&mut self) {
        while self.state == PipelineState::Running {
            let Some(event) = self.demuxer.as_mut().and_then(Iterator::next) else {
                break;
            };
            self.handle(event);
            self.drain_decoder();
        }

        if !self.options.retain_history {
            if let Some(demuxer) = self.demuxer.as_mut() {
                demuxer.release_history();
            }
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.release_history();
            }
        }
    }

    fn handle(&mut self, event: DemuxEvent) {
        match event {
            DemuxEvent::Format(format) => self.open_decoder(format),
            DemuxEvent::Duration(ms) => self.emit(PipelineEvent::Duration(ms)),
            DemuxEvent::Metadata(metadata) => self.emit(PipelineEvent::Metadata(metadata)),
            DemuxEvent::Chapters(chapters) => self.emit(PipelineEvent::Chapters(chapters)),
            DemuxEvent::Cookie(cookie) => {
                if let Some(decoder) = self.decoder.as_mut() {
                    decoder.push_cookie(&cookie);
                }
            }
            DemuxEvent::Data(chunk) => {
                self.payload_bytes += chunk.len() as u64;
                if let Some(decoder) = self.decoder.as_mut() {
                    decoder.push(chunk);
                }
            }
            DemuxEvent::Error(failure) => self.fail(failure),
            DemuxEvent::End => match self.decoder.as_mut() {
                Some(decoder) => decoder.finish(),
                None => {
                    self.emit(PipelineEvent::End);
                    self.state = PipelineState::Ended;
                }
            },
        }
    }

    fn open_decoder(&mut self, format: FormatDescriptor) {
        if !self.options.decode {
            self.emit(PipelineEvent::Format(format));
            return;
        }

        match Decoder::new(&format) {
            Ok(mut decoder) => {
                if let Some(hook) = self.cookie_hook.take() {
                    decoder.set_cookie_hook(hook);
                }
                self.emit(PipelineEvent::Format(decoder.format().clone()));
                self.decoder = Some(decoder);
            }
            Err(err) => self.fail(Failure::from(&err)),
        }
    }

    fn drain_decoder(&mut self) {
        while self.state == PipelineState::Running {
            let Some(event) = self.decoder.as_mut().and_then(Iterator::next) else {
                break;
            };
            match event {
                DecodeEvent::Data(samples) => self.emit(PipelineEvent::Samples(samples)),
                DecodeEvent::Error(failure) => self.fail(failure),
                DecodeEvent::End => {
                    self.emit(PipelineEvent::End);
                    self.state = PipelineState::Ended;
                }
            }
        }
    }

    fn emit(&mut self, event: PipelineEvent) {
        self.events.push_back(event);
    }

    fn fail(&mut self, failure: Failure) {
        debug!("Pipeline stopped: {failure}");
        self.emit(PipelineEvent::Error(failure));
        self.state = PipelineState::Failed;
    }
}

impl Iterator for Pipeline {
    type Item = PipelineEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.pop_front()
    }
}
