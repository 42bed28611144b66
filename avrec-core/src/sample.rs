//! Encoded sample and stream format types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Video stream
    Video,
    /// Audio stream
    Audio,
}

impl StreamKind {
    /// Lowercase name used in logs and container headers
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags attached to an access unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleFlags {
    /// Sync sample, decodable on its own
    pub key_frame: bool,
    /// Last sample of the stream
    pub end_of_stream: bool,
    /// Codec specific data rather than media
    pub codec_config: bool,
}

impl SampleFlags {
    const KEY_FRAME: u8 = 0x01;
    const CODEC_CONFIG: u8 = 0x02;
    const END_OF_STREAM: u8 = 0x04;

    /// Flags for a key frame
    pub fn key_frame() -> Self {
        Self {
            key_frame: true,
            ..Self::default()
        }
    }

    /// Flags for a codec config buffer
    pub fn codec_config() -> Self {
        Self {
            codec_config: true,
            ..Self::default()
        }
    }

    /// Pack into a single byte
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.key_frame {
            bits |= Self::KEY_FRAME;
        }
        if self.codec_config {
            bits |= Self::CODEC_CONFIG;
        }
        if self.end_of_stream {
            bits |= Self::END_OF_STREAM;
        }
        bits
    }

    /// Unpack from a single byte, ignoring unknown bits
    pub fn from_bits(bits: u8) -> Self {
        Self {
            key_frame: bits & Self::KEY_FRAME != 0,
            codec_config: bits & Self::CODEC_CONFIG != 0,
            end_of_stream: bits & Self::END_OF_STREAM != 0,
        }
    }
}

/// One compressed access unit with its presentation timestamp
///
/// Samples are immutable once built. The timestamp carried here is the one
/// the muxer writes, so the drain loop builds the sample only after the
/// timestamp has been rebased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSample {
    kind: StreamKind,
    payload: Bytes,
    pts_us: i64,
    flags: SampleFlags,
}

impl EncodedSample {
    /// Create a new sample
    pub fn new(kind: StreamKind, payload: Bytes, pts_us: i64, flags: SampleFlags) -> Self {
        Self {
            kind,
            payload,
            pts_us,
            flags,
        }
    }

    /// Stream this sample belongs to
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Encoded bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Presentation timestamp in microseconds
    pub fn pts_us(&self) -> i64 {
        self.pts_us
    }

    /// Sample flags
    pub fn flags(&self) -> SampleFlags {
        self.flags
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Codec specific stream parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FormatParams {
    /// Video parameters
    Video {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// Frames per second
        frame_rate: u32,
    },
    /// Audio parameters
    Audio {
        /// Sample rate in Hz
        sample_rate: u32,
        /// Channel count
        channels: u16,
    },
}

/// Output format announced by a codec device on its first output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// MIME type of the encoded stream
    pub mime: String,
    /// Stream parameters
    pub params: FormatParams,
    /// Bit rate in bits per second, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u32>,
    /// Codec specific data (parameter sets, decoder config)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codec_config: Vec<u8>,
}

impl StreamFormat {
    /// Create a video format
    pub fn video(mime: &str, width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            mime: mime.to_string(),
            params: FormatParams::Video {
                width,
                height,
                frame_rate,
            },
            bit_rate: None,
            codec_config: Vec::new(),
        }
    }

    /// Create an audio format
    pub fn audio(mime: &str, sample_rate: u32, channels: u16) -> Self {
        Self {
            mime: mime.to_string(),
            params: FormatParams::Audio {
                sample_rate,
                channels,
            },
            bit_rate: None,
            codec_config: Vec::new(),
        }
    }

    /// Set the bit rate
    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    /// Set the codec specific data
    pub fn with_codec_config(mut self, codec_config: Vec<u8>) -> Self {
        self.codec_config = codec_config;
        self
    }

    /// Stream kind described by this format
    pub fn kind(&self) -> StreamKind {
        match self.params {
            FormatParams::Video { .. } => StreamKind::Video,
            FormatParams::Audio { .. } => StreamKind::Audio,
        }
    }
}
