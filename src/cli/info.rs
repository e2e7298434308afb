use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use crate::timestamp::ms_str;
use avstream::decode;
use avstream::demux::{Chapter, FormatDescriptor};
use avstream::pipeline::{Pipeline, PipelineEvent, PipelineOptions};

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing stream: {}", args.input.display());

    let report = analyze_stream(&args.input, args.chunk_size, cli, multi)?;
    print!("{}", serde_yaml_ng::to_string(&report)?);

    if let Some(error) = report.error {
        bail!("{error}");
    }
    Ok(())
}

#[derive(Debug, Default, Serialize)]
struct StreamReport {
    container: Option<String>,
    format: Option<FormatReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    size_bytes: u64,
    payload_bytes: u64,
    seek_points: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    chapters: Vec<ChapterReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct FormatReport {
    format_id: String,
    sample_rate: f64,
    channels: u32,
    bits_per_channel: u32,
    frames_per_packet: u32,
    bytes_per_packet: u32,
    floating_point: bool,
    little_endian: bool,
    decodable: bool,
}

impl From<&FormatDescriptor> for FormatReport {
    fn from(format: &FormatDescriptor) -> Self {
        Self {
            format_id: format.format_id.to_string(),
            sample_rate: format.sample_rate,
            channels: format.channels_per_frame,
            bits_per_channel: format.bits_per_channel,
            frames_per_packet: format.frames_per_packet,
            bytes_per_packet: format.bytes_per_packet,
            floating_point: format.floating_point,
            little_endian: format.little_endian,
            decodable: decode::find(format.format_id).is_some(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChapterReport {
    title: String,
    start: String,
    duration: String,
}

impl From<&Chapter> for ChapterReport {
    fn from(chapter: &Chapter) -> Self {
        Self {
            title: chapter.title.clone(),
            start: ms_str(chapter.timestamp),
            duration: ms_str(chapter.duration),
        }
    }
}

impl StreamReport {
    fn handle(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Format(format) => {
                log::debug!("Format: {format:?}");
                self.format = Some(FormatReport::from(&format));
            }
            PipelineEvent::Duration(ms) => {
                self.duration = Some(ms_str(ms));
                self.duration_ms = Some(ms);
            }
            PipelineEvent::Metadata(metadata) => self.metadata.extend(
                metadata
                    .into_iter()
                    .map(|(key, value)| (key, value.to_string())),
            ),
            PipelineEvent::Chapters(chapters) => {
                self.chapters = chapters.iter().map(ChapterReport::from).collect();
            }
            PipelineEvent::Samples(_) | PipelineEvent::End => {}
            PipelineEvent::Error(failure) => {
                log::error!("{failure}");
                self.error = Some(failure.to_string());
            }
        }
    }
}

fn analyze_stream(
    input_path: &Path,
    chunk_size: usize,
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<StreamReport> {
    let mut input_reader = InputReader::new(input_path)?;
    let mut pipeline = Pipeline::new(PipelineOptions {
        decode: false,
        strict: cli.strict,
        ..Default::default()
    });
    let mut report = StreamReport::default();

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Analyzing...");
            Some(pb)
        }
        None => None,
    };

    input_reader.process_chunks(chunk_size, |chunk| {
        report.size_bytes += chunk.len() as u64;
        pipeline.push(chunk);
        for event in pipeline.by_ref() {
            report.handle(event);
        }

        if let Some(pb) = &pb {
            pb.set_message(format!("Analyzing...       {} bytes", report.size_bytes));
        }

        // The demuxer ignores input once it has ended or failed.
        Ok(report.error.is_none())
    })?;

    pipeline.finish();
    for event in pipeline.by_ref() {
        report.handle(event);
    }

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    report.container = pipeline.kind().map(|kind| kind.name().to_string());
    report.payload_bytes = pipeline.payload_bytes();
    report.seek_points = pipeline
        .demuxer()
        .map_or(0, |demuxer| demuxer.seek_table().len());

    Ok(report)
}
