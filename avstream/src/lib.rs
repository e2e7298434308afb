#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Push-driven demuxing and decoding of audio containers that arrive as an
//! arbitrarily fragmented byte stream.
//!
//! ### Byte Substrate
//!
//! Every delivered chunk is kept in a [`io::ChunkChain`] until released. The
//! [`io::ByteCursor`] and [`io::BitCursor`] read across chunk boundaries and
//! can rewind into history, which is what lets a parser wait for more data
//! and retry without copying.
//!
//! ### Demuxers
//!
//! - M4A / MP4 / QuickTime box trees, with chapter tracks and iTunes metadata
//! - CAF
//! - WAVE
//! - AIFF and AIFC
//! - Sun/NeXT AU
//! - SNES SPC
//!
//! ### Decoders
//!
//! - Linear PCM, 8 to 32 bit integer and 32/64 bit float, either byte order
//! - G.711 μ-law and A-law
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avstream::io::Chunk;
//! use avstream::pipeline::{Pipeline, PipelineEvent, PipelineOptions};
//!
//! let mut pipeline = Pipeline::new(PipelineOptions::default());
//! for piece in std::fs::read("song.m4a")?.chunks(4096) {
//!     pipeline.push(Chunk::from(piece));
//! }
//! pipeline.finish();
//!
//! for event in pipeline {
//!     match event {
//!         PipelineEvent::Format(format) => println!("{} Hz", format.sample_rate),
//!         PipelineEvent::Samples(samples) => println!("{} samples", samples.len()),
//!         PipelineEvent::Error(failure) => eprintln!("{failure}"),
//!         _ => {}
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Chunks, the rewindable chain and the byte and bit cursors.
pub mod io;

/// Container parsers and the [`demux::Demuxer`] driver.
///
/// - **Descriptors** ([`demux::format`]): format, metadata and chapters
/// - **Seeking** ([`demux::seek`]): timestamp to offset tables
/// - **Formats**: [`demux::m4a`], [`demux::caf`], [`demux::wave`],
///   [`demux::aiff`], [`demux::au`], [`demux::spc`]
pub mod demux;

/// Packet readers and the rollback [`decode::Decoder`].
pub mod decode;

/// Demuxer and decoder wired together for one asset.
pub mod pipeline;

/// Error types and the strict mode helper.
pub mod utils;

#[cfg(test)]
mod testutil;
