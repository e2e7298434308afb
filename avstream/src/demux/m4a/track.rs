//! Per-track sample tables and the seek table built from them.

use crate::demux::{Chapter, FormatDescriptor, FourCC, SeekPoint, SeekTable};
use crate::io::Chunk;
use crate::utils::errors::DemuxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToSample {
    pub count: u32,
    pub duration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunk {
    /// One-based index of the first chunk of this run.
    pub first: u32,
    pub samples_per_chunk: u32,
    pub description: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Track {
    pub id: u32,
    pub handler: FourCC,
    pub time_scale: u32,
    pub duration: u64,
    pub format: Option<FormatDescriptor>,
    pub cookie: Option<Chunk>,
    pub chapter_tracks: Vec<u32>,
    pub time_to_sample: Option<Vec<TimeToSample>>,
    pub sample_to_chunk: Option<Vec<SampleToChunk>>,
    /// Constant sample size; zero when `sample_sizes` holds one entry per sample.
    pub sample_size: Option<u32>,
    pub sample_sizes: Vec<u32>,
    pub sample_count: u32,
    pub chunk_offsets: Option<Vec<u64>>,
    pub seek_points: SeekTable,
}

impl Track {
    pub fn is_audio(&self) -> bool {
        self.handler == b"soun"
    }

    pub fn size_of_sample(&self, index: usize) -> Result<u64, DemuxError> {
        match self.sample_size {
            Some(size) if size > 0 => Ok(size.into()),
            _ => self
                .sample_sizes
                .get(index)
                .map(|&size| u64::from(size))
                .ok_or(DemuxError::SampleTable("sample size table is too short")),
        }
    }

    /// Total size of the samples from `index` to the end of the track.
    pub fn bytes_from(&self, index: usize) -> u64 {
        match self.sample_size {
            Some(size) if size > 0 => {
                u64::from(size) * u64::from(self.sample_count).saturating_sub(index as u64)
            }
            _ => self.sample_sizes.iter().skip(index).map(|&s| u64::from(s)).sum(),
        }
    }

    pub fn to_ms(&self, ticks: u64) -> u64 {
        if self.time_scale == 0 {
            0
        } else {
            ticks * 1000 / u64::from(self.time_scale)
        }
    }

    /// Rebuilds `seek_points` once every table it needs has been parsed.
    ///
    /// Each sample gets its payload offset with container gaps removed, its
    /// physical position in the file and its timestamp in track ticks.
    pub fn setup_seek_points(&mut self) -> Result<(), DemuxError> {
        let (Some(offsets), Some(stsc), Some(_), Some(stts)) = (
            &self.chunk_offsets,
            &self.sample_to_chunk,
            self.sample_size,
            &self.time_to_sample,
        ) else {
            return Ok(());
        };
        if stsc.is_empty() {
            return Ok(());
        }

        let mut table = SeekTable::new();
        let mut stsc_index = 0;
        let mut stts_index = 0;
        let mut stts_sample = 0;
        let mut sample_index = 0;
        let mut offset = 0u64;
        let mut timestamp = 0u64;
        let sample_count = self.sample_count as usize;

        for (chunk, &chunk_offset) in offsets.iter().enumerate() {
            if sample_index == sample_count {
                break;
            }
            let mut position = chunk_offset;
            let in_chunk = stsc[stsc_index].samples_per_chunk as usize;
            for _ in 0..in_chunk.min(sample_count - sample_index) {
                table.add(SeekPoint {
                    offset,
                    position: Some(position),
                    timestamp,
                });

                let size = self.size_of_sample(sample_index)?;
                sample_index += 1;
                offset += size;
                position += size;

                if let Some(entry) = stts.get(stts_index) {
                    timestamp += u64::from(entry.duration);
                    stts_sample += 1;
                    if stts_index + 1 < stts.len() && stts_sample == entry.count {
                        stts_sample = 0;
                        stts_index += 1;
                    }
                }
            }

            if stsc_index + 1 < stsc.len() && chunk + 2 == stsc[stsc_index + 1].first as usize {
                stsc_index += 1;
            }
        }

        self.seek_points = table;
        Ok(())
    }
}

/// Converts chapter samples into [`Chapter`]s once their titles are known.
pub fn chapter_at(track: &Track, index: usize, title: String) -> Option<Chapter> {
    let points = track.seek_points.points();
    let point = points.get(index)?;
    let next = points
        .get(index + 1)
        .map(|p| p.timestamp)
        .filter(|&ts| ts != 0)
        .unwrap_or(track.duration);

    Some(Chapter {
        title,
        timestamp: track.to_ms(point.timestamp),
        duration: track.to_ms(next.saturating_sub(point.timestamp)),
    })
}
