//! Record Demo - Two Second Clip With Pause/Resume
//!
//! Records a synthetic video track and a test tone into an .avrc container
//! in the system temp directory, pausing once in the middle, then reads the
//! finished file back and prints its tracks.

use avrec::{
    init_logging, AudioEncoderConfig, FrameRenderer, PipelineState, Recorder, RecorderCallback,
    RecorderConfig, RenderResult, TrackFileReader, VideoEncoderConfig,
    MIME_AUDIO_RAW, MIME_VIDEO_PASSTHROUGH,
};
use std::path::Path;
use std::time::Duration;

/// Renderer that would draw a color ramp on a real GPU surface
struct GradientRenderer {
    frame: u64,
}

impl FrameRenderer for GradientRenderer {
    fn on_context_created(&mut self) {
        println!("🎨 GPU context created");
    }

    fn on_surface_changed(&mut self, width: u32, height: u32) {
        println!("🎨 Surface is {}x{}", width, height);
    }

    fn on_draw_frame(&mut self) -> RenderResult<()> {
        self.frame += 1;
        Ok(())
    }

    fn on_context_destroyed(&mut self) {
        println!("🎨 Drew {} frames", self.frame);
    }
}

struct ConsoleCallback;

impl RecorderCallback for ConsoleCallback {
    fn on_start(&mut self) {
        println!("▶️  Recording started");
    }

    fn on_progress(&mut self, elapsed_ms: u64) {
        if elapsed_ms % 500 < 100 {
            println!("⏱️  {} ms recorded", elapsed_ms);
        }
    }

    fn on_pause(&mut self) {
        println!("⏸️  Paused");
    }

    fn on_resume(&mut self) {
        println!("⏯️  Resumed");
    }

    fn on_complete(&mut self, output: &Path) {
        println!("✅ Completed: {}", output.display());
    }

    fn on_failed(&mut self, code: avrec::ErrorCode, error: &avrec::RecorderError) {
        println!("❌ Failed with {}: {}", code, error);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    println!("🎬 avrec Record Demo");
    println!("====================");

    let config = RecorderConfig {
        video: VideoEncoderConfig {
            mime: MIME_VIDEO_PASSTHROUGH.to_string(),
            ..VideoEncoderConfig::new(640, 360)
        },
        audio: AudioEncoderConfig {
            mime: MIME_AUDIO_RAW.to_string(),
            sample_rate: 48_000,
            chunk_frames: 960,
            ..AudioEncoderConfig::default()
        },
        ..RecorderConfig::default()
    }
    .with_output_dir(std::env::temp_dir());

    let (mut recorder, mut events) = Recorder::builder(config)
        .renderer(GradientRenderer { frame: 0 })
        .build();
    println!("🆔 Session {}", recorder.id());

    recorder.prepare()?;
    recorder.start()?;

    let mut callback = ConsoleCallback;
    for step in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        events.dispatch(&mut callback);

        match (step, recorder.state()) {
            (8, PipelineState::Running) => recorder.pause()?,
            (11, PipelineState::Paused) => recorder.resume()?,
            _ => {}
        }
    }

    let summary = recorder.stop()?;
    drop(recorder);
    while let Some(event) = events.next().await {
        let terminal = event.is_terminal();
        event.deliver(&mut callback);
        if terminal {
            break;
        }
    }

    println!("\n📦 Container summary");
    println!("  Duration: {:.2}s", summary.duration_us as f64 / 1_000_000.0);
    println!("  Video samples: {}", summary.video_samples);
    println!("  Audio samples: {}", summary.audio_samples);
    println!("  Bytes: {}", summary.bytes_written);

    let reader = TrackFileReader::open(&summary.output)?;
    for (track, format) in reader.tracks().iter().enumerate() {
        println!(
            "  Track {}: {} {} ({} samples, {:?} us)",
            track,
            format.kind(),
            format.mime,
            reader.samples_for(track).count(),
            reader.duration_us(track)
        );
    }

    // keep the temp directory clean
    std::fs::remove_file(&summary.output)?;
    Ok(())
}
