//! Recording session configuration
//!
//! Configuration is passed by value into each [`crate::Recorder`]; nothing
//! is staged globally between sessions.

use avrec_core::{AudioEncoderConfig, RecorderError, RecorderResult, VideoEncoderConfig};
use avrec_media::FILE_EXTENSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Container file written by the session
    pub output_path: PathBuf,
    /// Video encoder settings
    pub video: VideoEncoderConfig,
    /// Audio encoder settings
    pub audio: AudioEncoderConfig,
    /// Minimum recorded time between progress events, milliseconds
    pub progress_interval_ms: u64,
    /// Samples held while waiting for every stream's format
    pub pending_sample_limit: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::new(),
            video: VideoEncoderConfig::default(),
            audio: AudioEncoderConfig::default(),
            progress_interval_ms: 100,
            pending_sample_limit: 512,
        }
    }
}

impl RecorderConfig {
    /// Configuration writing to `output_path` with default encoders
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> RecorderResult<Self> {
        serde_json::from_str(json).map_err(|e| RecorderError::InvalidConfiguration {
            message: format!("Invalid recorder configuration: {}", e),
        })
    }

    /// Write into `dir` with a timestamped file name
    ///
    /// Files are named `VID_<yyyyMMdd_HHmmss>.avrc` from local time.
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.output_path = dir
            .as_ref()
            .join(format!("VID_{}.{}", stamp, FILE_EXTENSION));
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> RecorderResult<()> {
        if self.output_path.as_os_str().is_empty() {
            return Err(RecorderError::InvalidConfiguration {
                message: "Output path must be set".to_string(),
            });
        }

        if self.progress_interval_ms == 0 {
            return Err(RecorderError::InvalidConfiguration {
                message: "Progress interval must be > 0".to_string(),
            });
        }

        if self.pending_sample_limit == 0 {
            return Err(RecorderError::InvalidConfiguration {
                message: "Pending sample limit must be > 0".to_string(),
            });
        }

        self.video.validate()?;
        self.audio.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrec_core::ErrorCode;

    #[test]
    fn test_default_requires_output_path() {
        let config = RecorderConfig::default();
        let error = config.validate().unwrap_err();
        assert!(matches!(error, RecorderError::InvalidConfiguration { .. }));

        assert!(RecorderConfig::new("/tmp/out.avrc").validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = RecorderConfig::from_json(
            r#"{
                "output_path": "/data/rec.avrc",
                "video": { "width": 640, "height": 480, "frame_rate": 24 },
                "progress_interval_ms": 250
            }"#,
        )
        .unwrap();

        assert_eq!(config.output_path, PathBuf::from("/data/rec.avrc"));
        assert_eq!(config.video.width, 640);
        assert_eq!(config.video.frame_rate, 24);
        assert_eq!(config.video.mime, "video/avc");
        assert_eq!(config.video.effective_bit_rate(), 640 * 480 * 4);
        assert_eq!(config.audio, AudioEncoderConfig::default());
        assert_eq!(config.progress_interval_ms, 250);
        assert_eq!(config.pending_sample_limit, 512);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let error = RecorderConfig::from_json("{ not json").unwrap_err();
        assert_eq!(error.code(), Some(ErrorCode::EncoderPrepareFailed));
    }

    #[test]
    fn test_output_dir_file_name() {
        let config = RecorderConfig::default().with_output_dir("/sdcard/Movies");
        let name = config
            .output_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap()
            .to_string();

        assert!(config.output_path.starts_with("/sdcard/Movies"));
        assert!(name.starts_with("VID_"));
        assert!(name.ends_with(".avrc"));
        // VID_ + yyyyMMdd_HHmmss + .avrc
        assert_eq!(name.len(), 4 + 15 + 5);
    }

    #[test]
    fn test_unsupported_mime_is_reported() {
        let mut config = RecorderConfig::new("/tmp/out.avrc");
        config.audio.mime = "text/plain".to_string();
        assert_eq!(
            config.validate().unwrap_err().code(),
            Some(ErrorCode::UnsupportedType)
        );
    }
}
