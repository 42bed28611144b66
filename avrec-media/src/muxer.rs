//! Stream muxer
//!
//! Collects the formats of every expected stream, writes the container
//! header once the last one arrives, and then interleaves samples from both
//! drain threads by timestamp. Writes are serialized by a single mutex.

use crate::container::{ContainerWriter, TrackFileWriter};
use crate::error::{MediaError, MediaResult};
use avrec_core::{EncodedSample, StreamFormat, StreamKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, error, info};

/// Largest timestamp spread held back while waiting for a lagging stream
pub const DEFAULT_INTERLEAVE_WINDOW_US: i64 = 500_000;

/// Per-track write statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackStats {
    /// Stream kind
    pub kind: StreamKind,
    /// Samples written
    pub samples: u64,
    /// Payload bytes written
    pub bytes: u64,
    /// First written timestamp
    pub first_pts_us: Option<i64>,
    /// Last written timestamp
    pub last_pts_us: Option<i64>,
}

impl TrackStats {
    fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            samples: 0,
            bytes: 0,
            first_pts_us: None,
            last_pts_us: None,
        }
    }

    fn record(&mut self, sample: &EncodedSample) {
        self.samples += 1;
        self.bytes += sample.len() as u64;
        self.first_pts_us.get_or_insert(sample.pts_us());
        self.last_pts_us = Some(sample.pts_us());
    }
}

/// Snapshot of muxer progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxerStats {
    /// One entry per added stream, in track order
    pub tracks: Vec<TrackStats>,
    /// Container bytes, known once finished
    pub bytes_written: u64,
}

impl MuxerStats {
    /// Samples written for a stream kind
    pub fn samples(&self, kind: StreamKind) -> u64 {
        self.tracks
            .iter()
            .filter(|track| track.kind == kind)
            .map(|track| track.samples)
            .sum()
    }

    /// Span from the earliest to the latest written timestamp
    pub fn duration_us(&self) -> i64 {
        let first = self.tracks.iter().filter_map(|t| t.first_pts_us).min();
        let last = self.tracks.iter().filter_map(|t| t.last_pts_us).max();
        match (first, last) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AddingStreams,
    Started,
    Finished,
}

struct Track {
    format: StreamFormat,
    queue: VecDeque<EncodedSample>,
    stats: TrackStats,
}

struct MuxerInner {
    writer: Box<dyn ContainerWriter>,
    expected: usize,
    tracks: Vec<Track>,
    phase: Phase,
    window_us: i64,
    bytes_written: u64,
}

/// Thread-safe interleaving muxer
pub struct Muxer {
    inner: Mutex<MuxerInner>,
}

impl Muxer {
    /// Create a muxer expecting `expected_streams` streams
    pub fn new(writer: Box<dyn ContainerWriter>, expected_streams: usize) -> Self {
        Self {
            inner: Mutex::new(MuxerInner {
                writer,
                expected: expected_streams,
                tracks: Vec::with_capacity(expected_streams),
                phase: Phase::AddingStreams,
                window_us: DEFAULT_INTERLEAVE_WINDOW_US,
                bytes_written: 0,
            }),
        }
    }

    /// Create the output file and a muxer writing to it
    pub fn create(path: impl AsRef<Path>, expected_streams: usize) -> MediaResult<Self> {
        let writer = TrackFileWriter::create(path)?;
        Ok(Self::new(Box::new(writer), expected_streams))
    }

    /// Override the interleave window
    pub fn with_interleave_window(self, window_us: i64) -> Self {
        self.inner.lock().window_us = window_us.max(0);
        self
    }

    /// Register a stream; returns its track index
    ///
    /// The header is written as soon as every expected stream is present.
    pub fn add_stream(&self, format: StreamFormat) -> MediaResult<usize> {
        let mut inner = self.inner.lock();
        match inner.phase {
            Phase::AddingStreams => {}
            Phase::Started => return Err(MediaError::AlreadyStarted),
            Phase::Finished => return Err(MediaError::AlreadyFinished),
        }

        let kind = format.kind();
        if inner.tracks.iter().any(|track| track.stats.kind == kind) {
            return Err(MediaError::DuplicateStream { kind });
        }

        let index = inner.tracks.len();
        info!(track = index, stream = %kind, mime = %format.mime, "Stream added");
        inner.tracks.push(Track {
            format,
            queue: VecDeque::new(),
            stats: TrackStats::new(kind),
        });

        if inner.tracks.len() == inner.expected {
            inner.start()?;
        }
        Ok(index)
    }

    /// Whether every expected stream has been added
    pub fn is_started(&self) -> bool {
        self.inner.lock().phase == Phase::Started
    }

    /// Track index of a stream kind, once added
    pub fn track_of(&self, kind: StreamKind) -> Option<usize> {
        self.inner
            .lock()
            .tracks
            .iter()
            .position(|track| track.stats.kind == kind)
    }

    /// Queue one sample and write whatever is ready in timestamp order
    pub fn write_sample(&self, index: usize, sample: EncodedSample) -> MediaResult<()> {
        let mut inner = self.inner.lock();
        match inner.phase {
            Phase::AddingStreams => {
                return Err(MediaError::MuxerNotStarted {
                    added: inner.tracks.len(),
                    expected: inner.expected,
                })
            }
            Phase::Started => {}
            Phase::Finished => return Err(MediaError::AlreadyFinished),
        }

        let track = inner
            .tracks
            .get_mut(index)
            .ok_or(MediaError::UnknownStream { index })?;
        if track.stats.kind != sample.kind() {
            return Err(MediaError::UnknownStream { index });
        }
        track.queue.push_back(sample);

        inner.interleave(false)
    }

    /// Flush queued samples and finalize the container
    pub fn finish(&self) -> MediaResult<MuxerStats> {
        let mut inner = self.inner.lock();
        match inner.phase {
            Phase::AddingStreams => {
                inner.phase = Phase::Finished;
                return Err(MediaError::MuxerNotStarted {
                    added: inner.tracks.len(),
                    expected: inner.expected,
                });
            }
            Phase::Started => {}
            Phase::Finished => return Err(MediaError::AlreadyFinished),
        }

        inner.interleave(true)?;
        inner.phase = Phase::Finished;
        let bytes_written = inner.writer.finish().map_err(|e| {
            error!("Failed to finalize container: {}", e);
            e
        })?;
        inner.bytes_written = bytes_written;

        let stats = inner.stats();
        info!(
            bytes = stats.bytes_written,
            duration_us = stats.duration_us(),
            video_samples = stats.samples(StreamKind::Video),
            audio_samples = stats.samples(StreamKind::Audio),
            "Muxer finished"
        );
        Ok(stats)
    }

    /// Current statistics
    pub fn stats(&self) -> MuxerStats {
        self.inner.lock().stats()
    }
}

impl MuxerInner {
    fn start(&mut self) -> MediaResult<()> {
        let formats: Vec<StreamFormat> = self.tracks.iter().map(|t| t.format.clone()).collect();
        if let Err(e) = self.writer.write_header(&formats) {
            self.phase = Phase::Finished;
            return Err(e);
        }
        self.phase = Phase::Started;
        info!(tracks = formats.len(), "Muxer started");
        Ok(())
    }

    /// Write queued samples while the earliest one is safe to commit
    ///
    /// A head sample is committed when every track has something queued, or
    /// when the newest queued sample is more than the window ahead of it.
    fn interleave(&mut self, flush_all: bool) -> MediaResult<()> {
        loop {
            let next = self
                .tracks
                .iter()
                .enumerate()
                .filter_map(|(i, t)| t.queue.front().map(|s| (s.pts_us(), i)))
                .min();
            let (head_pts, index) = match next {
                Some(next) => next,
                None => return Ok(()),
            };

            if !flush_all && self.tracks.iter().any(|t| t.queue.is_empty()) {
                let newest = self
                    .tracks
                    .iter()
                    .filter_map(|t| t.queue.back().map(EncodedSample::pts_us))
                    .max()
                    .unwrap_or(head_pts);
                if newest - head_pts <= self.window_us {
                    return Ok(());
                }
                debug!(track = index, head_pts, newest, "Interleave window exceeded");
            }

            let track = &mut self.tracks[index];
            let sample = match track.queue.pop_front() {
                Some(sample) => sample,
                None => return Ok(()),
            };
            if let Err(e) = self.writer.write_sample(index, &sample) {
                error!(track = index, "Container write failed: {}", e);
                self.phase = Phase::Finished;
                return Err(e);
            }
            track.stats.record(&sample);
        }
    }

    fn stats(&self) -> MuxerStats {
        MuxerStats {
            tracks: self.tracks.iter().map(|t| t.stats.clone()).collect(),
            bytes_written: self.bytes_written,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrec_core::SampleFlags;
    use bytes::Bytes;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorded {
        header: Vec<StreamFormat>,
        samples: Vec<(usize, i64)>,
    }

    struct MemoryWriter(Arc<Mutex<Recorded>>);

    impl ContainerWriter for MemoryWriter {
        fn write_header(&mut self, tracks: &[StreamFormat]) -> MediaResult<()> {
            self.0.lock().header = tracks.to_vec();
            Ok(())
        }
        fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> MediaResult<()> {
            self.0.lock().samples.push((track, sample.pts_us()));
            Ok(())
        }
        fn finish(&mut self) -> MediaResult<u64> {
            Ok(42)
        }
    }

    fn sample(kind: StreamKind, pts_us: i64) -> EncodedSample {
        EncodedSample::new(kind, Bytes::from_static(b"data"), pts_us, SampleFlags::default())
    }

    fn muxer() -> (Muxer, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let muxer = Muxer::new(Box::new(MemoryWriter(recorded.clone())), 2);
        (muxer, recorded)
    }

    #[test]
    fn test_write_before_all_streams_added() {
        let (muxer, _) = muxer();
        let video = muxer
            .add_stream(StreamFormat::video("video/avc", 640, 480, 30))
            .unwrap();
        assert!(!muxer.is_started());

        let error = muxer.write_sample(video, sample(StreamKind::Video, 0)).unwrap_err();
        assert!(matches!(
            error,
            MediaError::MuxerNotStarted {
                added: 1,
                expected: 2
            }
        ));
    }

    #[test]
    fn test_duplicate_stream_rejected() {
        let (muxer, _) = muxer();
        muxer
            .add_stream(StreamFormat::video("video/avc", 640, 480, 30))
            .unwrap();
        assert!(matches!(
            muxer.add_stream(StreamFormat::video("video/avc", 640, 480, 30)),
            Err(MediaError::DuplicateStream {
                kind: StreamKind::Video
            })
        ));
    }

    #[test]
    fn test_interleaves_by_timestamp() {
        let (muxer, recorded) = muxer();
        let audio = muxer
            .add_stream(StreamFormat::audio("audio/mp4a-latm", 44_100, 1))
            .unwrap();
        let video = muxer
            .add_stream(StreamFormat::video("video/avc", 640, 480, 30))
            .unwrap();
        assert!(muxer.is_started());
        assert_eq!(recorded.lock().header.len(), 2);

        for pts in [0, 33_333, 66_666] {
            muxer.write_sample(video, sample(StreamKind::Video, pts)).unwrap();
        }
        for pts in [0, 23_219, 46_439, 69_659] {
            muxer.write_sample(audio, sample(StreamKind::Audio, pts)).unwrap();
        }

        let stats = muxer.finish().unwrap();
        assert_eq!(stats.bytes_written, 42);
        assert_eq!(stats.samples(StreamKind::Video), 3);
        assert_eq!(stats.samples(StreamKind::Audio), 4);
        assert_eq!(stats.duration_us(), 69_659);

        let written: Vec<i64> = recorded.lock().samples.iter().map(|s| s.1).collect();
        assert!(written.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", written);
    }

    #[test]
    fn test_window_bounds_buffering_for_silent_stream() {
        let (muxer, recorded) = muxer();
        let video = muxer
            .add_stream(StreamFormat::video("video/avc", 640, 480, 30))
            .unwrap();
        muxer
            .add_stream(StreamFormat::audio("audio/mp4a-latm", 44_100, 1))
            .unwrap();

        for i in 0..30 {
            muxer
                .write_sample(video, sample(StreamKind::Video, i * 33_333))
                .unwrap();
        }

        // only samples more than the window behind the newest are committed
        let written = recorded.lock().samples.len();
        assert!(written > 0 && written < 30, "written {}", written);
        assert_eq!(muxer.stats().samples(StreamKind::Video), written as u64);
    }

    #[test]
    fn test_finish_twice_and_write_after_finish() {
        let (muxer, _) = muxer();
        let video = muxer
            .add_stream(StreamFormat::video("video/avc", 640, 480, 30))
            .unwrap();
        muxer
            .add_stream(StreamFormat::audio("audio/mp4a-latm", 44_100, 1))
            .unwrap();
        muxer.finish().unwrap();

        assert!(matches!(muxer.finish(), Err(MediaError::AlreadyFinished)));
        assert!(matches!(
            muxer.write_sample(video, sample(StreamKind::Video, 0)),
            Err(MediaError::AlreadyFinished)
        ));
    }
}
