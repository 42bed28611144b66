//! Encoder configuration shared by codec devices and the recorder

use crate::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};

/// H.264 / AVC
pub const MIME_VIDEO_AVC: &str = "video/avc";
/// AAC in LATM framing
pub const MIME_AUDIO_AAC: &str = "audio/mp4a-latm";
/// Opus
pub const MIME_AUDIO_OPUS: &str = "audio/opus";

/// Video encoder configuration
///
/// The device is always configured with a surface-backed color format; raw
/// frames reach it through the input surface, never through byte buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoEncoderConfig {
    /// Target MIME type
    pub mime: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub frame_rate: u32,
    /// Bit rate in bits per second, `width * height * 4` when unset
    pub bit_rate: Option<u32>,
    /// Seconds between key frames
    pub i_frame_interval_secs: u32,
}

impl Default for VideoEncoderConfig {
    fn default() -> Self {
        Self {
            mime: MIME_VIDEO_AVC.to_string(),
            width: 1280,
            height: 720,
            frame_rate: 30,
            bit_rate: None,
            i_frame_interval_secs: 1,
        }
    }
}

impl VideoEncoderConfig {
    /// Create a config for the given resolution with default settings
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Effective bit rate
    pub fn effective_bit_rate(&self) -> u32 {
        self.bit_rate
            .unwrap_or_else(|| self.width.saturating_mul(self.height).saturating_mul(4))
    }

    /// Validate configuration
    pub fn validate(&self) -> RecorderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecorderError::InvalidConfiguration {
                message: format!("Invalid video resolution {}x{}", self.width, self.height),
            });
        }

        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err(RecorderError::InvalidConfiguration {
                message: format!("Invalid video frame rate: {}", self.frame_rate),
            });
        }

        if !self.mime.starts_with("video/") {
            return Err(RecorderError::UnsupportedType {
                mime: self.mime.clone(),
            });
        }

        Ok(())
    }
}

/// Audio encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEncoderConfig {
    /// Target MIME type
    pub mime: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Bit rate in bits per second
    pub bit_rate: u32,
    /// PCM frames pushed to the device per input chunk
    pub chunk_frames: usize,
}

impl Default for AudioEncoderConfig {
    fn default() -> Self {
        Self {
            mime: MIME_AUDIO_AAC.to_string(),
            sample_rate: 44100,
            channels: 1,
            bit_rate: 64_000,
            chunk_frames: 1024,
        }
    }
}

impl AudioEncoderConfig {
    /// Validate configuration
    pub fn validate(&self) -> RecorderResult<()> {
        if self.sample_rate == 0 {
            return Err(RecorderError::InvalidConfiguration {
                message: "Audio sample rate must be > 0".to_string(),
            });
        }

        if self.channels == 0 || self.channels > 8 {
            return Err(RecorderError::InvalidConfiguration {
                message: format!("Invalid audio channel count: {}", self.channels),
            });
        }

        if self.chunk_frames == 0 {
            return Err(RecorderError::InvalidConfiguration {
                message: "Audio chunk size must be > 0".to_string(),
            });
        }

        if !self.mime.starts_with("audio/") {
            return Err(RecorderError::UnsupportedType {
                mime: self.mime.clone(),
            });
        }

        Ok(())
    }

    /// Duration of one PCM chunk in microseconds
    pub fn chunk_duration_us(&self) -> i64 {
        (self.chunk_frames as i64 * 1_000_000) / self.sample_rate.max(1) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_defaults() {
        let config = VideoEncoderConfig::default();
        assert_eq!(config.mime, "video/avc");
        assert_eq!(config.effective_bit_rate(), 1280 * 720 * 4);
        assert!(config.validate().is_ok());

        let explicit = VideoEncoderConfig {
            bit_rate: Some(2_000_000),
            ..VideoEncoderConfig::new(640, 480)
        };
        assert_eq!(explicit.effective_bit_rate(), 2_000_000);
    }

    #[test]
    fn test_video_validation() {
        let zero = VideoEncoderConfig::new(0, 480);
        assert!(matches!(
            zero.validate(),
            Err(RecorderError::InvalidConfiguration { .. })
        ));

        let wrong_mime = VideoEncoderConfig {
            mime: "audio/opus".to_string(),
            ..VideoEncoderConfig::default()
        };
        assert!(matches!(
            wrong_mime.validate(),
            Err(RecorderError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_audio_chunk_duration() {
        let config = AudioEncoderConfig {
            sample_rate: 48000,
            chunk_frames: 960,
            ..AudioEncoderConfig::default()
        };
        assert_eq!(config.chunk_duration_us(), 20_000);
        assert!(config.validate().is_ok());

        let bad = AudioEncoderConfig {
            channels: 0,
            ..AudioEncoderConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
