//! Muxer and container integration tests

use avrec_core::*;
use avrec_media::*;
use bytes::Bytes;
use rand::Rng;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn sample(kind: StreamKind, pts_us: i64, flags: SampleFlags) -> EncodedSample {
    let payload = Bytes::from(format!("{}-{}", kind, pts_us).into_bytes());
    EncodedSample::new(kind, payload, pts_us, flags)
}

// ============================================================================
// FILE ROUND TRIP
// ============================================================================

#[test]
fn test_concurrent_writers_produce_interleaved_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(format!("session.{}", FILE_EXTENSION));

    let muxer = Arc::new(Muxer::create(&path, 2).unwrap());
    let video = muxer
        .add_stream(StreamFormat::video("video/avc", 1280, 720, 30).with_bit_rate(3_686_400))
        .unwrap();
    let audio = muxer
        .add_stream(StreamFormat::audio("audio/mp4a-latm", 44_100, 1))
        .unwrap();

    let video_writer = {
        let muxer = muxer.clone();
        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for i in 0..90 {
                let flags = if i % 30 == 0 {
                    SampleFlags::key_frame()
                } else {
                    SampleFlags::default()
                };
                muxer
                    .write_sample(video, sample(StreamKind::Video, i * 33_333, flags))
                    .unwrap();
                if rng.gen_ratio(1, 8) {
                    thread::yield_now();
                }
            }
        })
    };
    let audio_writer = {
        let muxer = muxer.clone();
        thread::spawn(move || {
            for i in 0..130 {
                muxer
                    .write_sample(audio, sample(StreamKind::Audio, i * 23_219, SampleFlags::default()))
                    .unwrap();
            }
        })
    };
    video_writer.join().unwrap();
    audio_writer.join().unwrap();

    let stats = muxer.finish().unwrap();
    assert_eq!(stats.samples(StreamKind::Video), 90);
    assert_eq!(stats.samples(StreamKind::Audio), 130);
    assert_eq!(stats.bytes_written, std::fs::metadata(&path).unwrap().len());

    let mut reader = TrackFileReader::open(&path).unwrap();
    assert_eq!(reader.tracks()[video].kind(), StreamKind::Video);
    assert_eq!(reader.tracks()[audio].kind(), StreamKind::Audio);
    assert_eq!(reader.tracks()[video].bit_rate, Some(3_686_400));
    assert_eq!(reader.index().len(), 220);
    assert_eq!(reader.samples_for(video).filter(|e| e.flags.key_frame).count(), 3);
    assert_eq!(reader.duration_us(video), Some(89 * 33_333));

    for track in [video, audio] {
        let pts: Vec<i64> = reader.samples_for(track).map(|e| e.pts_us).collect();
        assert!(pts.windows(2).all(|pair| pair[0] < pair[1]));
    }

    let last = reader.index().len() - 1;
    let sample = reader.read_sample(last).unwrap();
    let expected = format!("{}-{}", sample.kind(), sample.pts_us());
    assert_eq!(&sample.payload()[..], expected.as_bytes());
}

// ============================================================================
// FAILURES
// ============================================================================

struct FailingWriter {
    fail_after: usize,
    written: usize,
}

impl ContainerWriter for FailingWriter {
    fn write_header(&mut self, _tracks: &[StreamFormat]) -> MediaResult<()> {
        Ok(())
    }

    fn write_sample(&mut self, _track: usize, _sample: &EncodedSample) -> MediaResult<()> {
        if self.written >= self.fail_after {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "No space left on device").into());
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<u64> {
        Ok(0)
    }
}

#[test]
fn test_write_failure_poisons_muxer() {
    let muxer = Muxer::new(
        Box::new(FailingWriter {
            fail_after: 2,
            written: 0,
        }),
        1,
    )
    .with_interleave_window(0);
    let video = muxer
        .add_stream(StreamFormat::video("video/avc", 640, 480, 30))
        .unwrap();

    let mut result = Ok(());
    for i in 0..5 {
        result = muxer.write_sample(video, sample(StreamKind::Video, i * 1000, SampleFlags::default()));
        if result.is_err() {
            break;
        }
    }

    let error: RecorderError = result.unwrap_err().into();
    assert_eq!(error.code(), Some(ErrorCode::MuxerFailed));
    assert!(error.to_string().contains("No space left"));
    assert!(matches!(muxer.finish(), Err(MediaError::AlreadyFinished)));
}

#[test]
fn test_finish_without_streams_reports_not_started() {
    let dir = TempDir::new().unwrap();
    let muxer = Muxer::create(dir.path().join("empty.avrc"), 2).unwrap();
    muxer
        .add_stream(StreamFormat::audio("audio/mp4a-latm", 44_100, 1))
        .unwrap();

    let error: RecorderError = muxer.finish().unwrap_err().into();
    assert!(matches!(
        error,
        RecorderError::MuxerNotStarted {
            added: 1,
            expected: 2
        }
    ));
}

#[test]
fn test_create_in_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let result = Muxer::create(dir.path().join("missing").join("out.avrc"), 2);
    assert!(matches!(result, Err(MediaError::Io { .. })));
}
