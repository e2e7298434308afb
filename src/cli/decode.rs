use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{AudioFormat, Cli, DecodeArgs};
use crate::caf::{CafWriter, pack_samples};
use crate::input::InputReader;
use crate::timestamp::{ms_str, time_str};
use avstream::decode::Samples;
use avstream::demux::{FormatDescriptor, Metadata};
use avstream::pipeline::{Pipeline, PipelineEvent, PipelineOptions};
use avstream::utils::errors::Failure;

fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(existing_ext) if existing_ext == expected_ext => base_path.to_path_buf(),
        Some(_) => {
            let file_name = base_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            base_path.with_file_name(format!("{file_name}.{expected_ext}"))
        }
        None => base_path.with_extension(expected_ext),
    }
}

enum AudioWriter {
    Pcm(BufWriter<File>),
    Caf(CafWriter<BufWriter<File>>),
}

/// State carried across pipeline events while decoding.
struct DecodeSession {
    base_path: Option<PathBuf>,
    audio_format: AudioFormat,
    writer: Option<AudioWriter>,
    format: Option<FormatDescriptor>,
    metadata: Metadata,
    duration_ms: Option<u64>,
    frames: u64,
    bytes_written: u64,
    failure: Option<Failure>,
    ended: bool,
    pb: Option<ProgressBar>,
}

impl DecodeSession {
    fn handle(&mut self, event: PipelineEvent) -> Result<()> {
        match event {
            PipelineEvent::Format(format) => {
                log::info!(
                    "Decoding {} at {} Hz, {} channels, {} bits{}",
                    format.format_id,
                    format.sample_rate,
                    format.channels_per_frame,
                    format.bits_per_channel,
                    if format.floating_point { " float" } else { "" }
                );
                self.format = Some(format);
            }
            PipelineEvent::Duration(ms) => {
                log::info!("Duration: {}", ms_str(ms));
                self.duration_ms = Some(ms);
                if let Some(pb) = &self.pb {
                    pb.set_length(ms);
                }
            }
            PipelineEvent::Metadata(metadata) => {
                if self.writer.is_some() {
                    log::debug!("Metadata after the audio header is not written");
                }
                self.metadata.extend(metadata);
            }
            PipelineEvent::Chapters(chapters) => {
                for chapter in &chapters {
                    log::info!("Chapter {} {}", ms_str(chapter.timestamp), chapter.title);
                }
            }
            PipelineEvent::Samples(samples) => self.write_samples(&samples)?,
            PipelineEvent::Error(failure) => {
                log::error!("{failure}");
                self.failure = Some(failure);
            }
            PipelineEvent::End => self.ended = true,
        }
        Ok(())
    }

    fn open_writer(&self, format: &FormatDescriptor) -> Result<Option<AudioWriter>> {
        let Some(base_path) = &self.base_path else {
            return Ok(None);
        };

        let writer = match self.audio_format {
            AudioFormat::Caf => {
                let path = create_path_with_extension(base_path, "caf");
                log::info!("Writing CAF audio to {}", path.display());
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let mut writer = CafWriter::new(BufWriter::new(file));
                writer.set_format(format)?;
                writer.add_metadata(&self.metadata);
                writer.write_header()?;
                AudioWriter::Caf(writer)
            }
            AudioFormat::Pcm => {
                let path = create_path_with_extension(base_path, "pcm");
                log::info!("Writing raw PCM audio to {}", path.display());
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                AudioWriter::Pcm(BufWriter::new(file))
            }
        };
        Ok(Some(writer))
    }

    fn write_samples(&mut self, samples: &Samples) -> Result<()> {
        let Some(format) = self.format.clone() else {
            bail!("Samples arrived before a format");
        };

        if self.writer.is_none() {
            self.writer = self.open_writer(&format)?;
        }

        match &mut self.writer {
            Some(AudioWriter::Caf(writer)) => writer.write_samples(samples)?,
            Some(AudioWriter::Pcm(writer)) => {
                writer.write_all(&pack_samples(samples, format.bits_per_channel, true))?
            }
            None => {}
        }

        let channels = u64::from(format.channels_per_frame.max(1));
        self.frames += samples.len() as u64 / channels;
        self.bytes_written += (samples.len() as u64) * u64::from(format.bits_per_channel.div_ceil(8));

        if let Some(pb) = &self.pb {
            let ms = format.frames_to_ms(self.frames);
            pb.set_position(ms);
            pb.set_message(format!("decoded {}", ms_str(ms)));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(AudioWriter::Caf(mut writer)) => {
                writer.finish()?;
                log::debug!("CAF data chunk holds {} bytes", writer.data_written());
            }
            Some(AudioWriter::Pcm(mut writer)) => writer.flush()?,
            None => {}
        }
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
        Ok(())
    }
}

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Decoding stream: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let mut input_reader = InputReader::new(&args.input)?;
    if input_reader.is_pipe() {
        log::debug!("Reading from stdin");
    }

    if let Some(base_path) = &args.output_path {
        log::info!("Output path specified: {}", base_path.display());
    } else {
        log::info!("No output path given, decoding without writing");
    }

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new(0));
            pb.set_style(ProgressStyle::with_template(
                "{bar:40.cyan/blue} ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
            )?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("probing container");
            Some(pb)
        }
        None => None,
    };

    let mut pipeline = Pipeline::new(PipelineOptions {
        decode: true,
        strict: cli.strict,
        ..Default::default()
    });

    let mut session = DecodeSession {
        base_path: args.output_path.clone(),
        audio_format: args.format,
        writer: None,
        format: None,
        metadata: Metadata::new(),
        duration_ms: None,
        frames: 0,
        bytes_written: 0,
        failure: None,
        ended: false,
        pb,
    };

    let start = std::time::Instant::now();
    let mut bytes_read = 0u64;

    input_reader.process_chunks(args.chunk_size, |chunk| {
        bytes_read += chunk.len() as u64;
        pipeline.push(chunk);
        for event in pipeline.by_ref() {
            session.handle(event)?;
        }
        Ok(session.failure.is_none() && !session.ended)
    })?;

    pipeline.finish();
    for event in pipeline.by_ref() {
        session.handle(event)?;
    }
    session.finish()?;

    if let Some(failure) = session.failure {
        bail!("Decoding failed: {failure}");
    }

    let elapsed = start.elapsed().as_secs_f64();
    let seconds = session
        .format
        .as_ref()
        .filter(|format| format.sample_rate > 0.0)
        .map_or(0.0, |format| session.frames as f64 / format.sample_rate);
    log::info!(
        "Decoded {} frames ({}) from {bytes_read} bytes in {elapsed:.3}s, {} bytes of PCM",
        session.frames,
        time_str(seconds),
        session.bytes_written
    );
    if let Some(expected) = session.duration_ms {
        let decoded = session
            .format
            .as_ref()
            .map_or(0, |format| format.frames_to_ms(session.frames));
        if decoded.abs_diff(expected) > 1 {
            log::warn!(
                "Decoded length {} differs from declared duration {}",
                ms_str(decoded),
                ms_str(expected)
            );
        }
    }

    Ok(())
}
