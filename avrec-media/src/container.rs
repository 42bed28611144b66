//! Seekable track file container
//!
//! Layout of an `.avrc` file:
//!
//! ```text
//! header  := "AVRC" version:u8 track_count:varint (format_json:bytes)*
//! sample  := 0x01 track:varint flags:u8 pts_us:varint payload:bytes
//! index   := 0x02 count:varint (track:varint flags:u8 pts_us:varint offset:varint size:varint)*
//! footer  := header_len:u64 index_offset:u64 "AVRI"
//! ```
//!
//! Varints use the two-bit length prefix encoding (1, 2, 4 or 8 bytes);
//! `bytes` is a varint length followed by the raw data. Fixed width integers
//! are big-endian. Sample records appear in write order, which the muxer
//! keeps interleaved by timestamp.

use crate::error::{MediaError, MediaResult};
use avrec_core::{EncodedSample, SampleFlags, StreamFormat};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// File magic
pub const MAGIC: &[u8; 4] = b"AVRC";
/// Footer magic
pub const FOOTER_MAGIC: &[u8; 4] = b"AVRI";
/// Current format version
pub const VERSION: u8 = 1;
/// Recommended file extension
pub const FILE_EXTENSION: &str = "avrc";

const RECORD_SAMPLE: u8 = 0x01;
const RECORD_INDEX: u8 = 0x02;
const FOOTER_LEN: u64 = 8 + 8 + 4;
const MAX_VARINT: u64 = 0x3FFF_FFFF_FFFF_FFFF;

/// Encode a variable-length integer
pub fn encode_varint(value: u64, buf: &mut BytesMut) -> MediaResult<()> {
    if value < 0x40 {
        buf.put_u8(value as u8);
    } else if value < 0x4000 {
        buf.put_u16((0x4000 | value) as u16);
    } else if value < 0x4000_0000 {
        buf.put_u32((0x8000_0000 | value) as u32);
    } else if value <= MAX_VARINT {
        buf.put_u64(0xC000_0000_0000_0000 | value);
    } else {
        return Err(MediaError::InvalidContainer {
            reason: format!("value too large for varint encoding: {}", value),
        });
    }
    Ok(())
}

/// Decode a variable-length integer
pub fn decode_varint(buf: &mut Cursor<&[u8]>) -> MediaResult<u64> {
    if !buf.has_remaining() {
        return Err(truncated("varint"));
    }

    let first_byte = buf.get_u8();
    let high = (first_byte & 0x3F) as u64;
    let extra = match first_byte >> 6 {
        0 => 0,
        1 => 1,
        2 => 3,
        _ => 7,
    };
    if buf.remaining() < extra {
        return Err(truncated("varint"));
    }
    if extra == 0 {
        return Ok(high);
    }
    let low = buf.get_uint(extra);
    Ok((high << (extra * 8)) | low)
}

fn encode_bytes(data: &[u8], buf: &mut BytesMut) -> MediaResult<()> {
    encode_varint(data.len() as u64, buf)?;
    buf.extend_from_slice(data);
    Ok(())
}

fn decode_bytes(buf: &mut Cursor<&[u8]>) -> MediaResult<Vec<u8>> {
    let length = decode_varint(buf)? as usize;
    if buf.remaining() < length {
        return Err(truncated("byte string"));
    }
    let mut data = vec![0u8; length];
    buf.copy_to_slice(&mut data);
    Ok(data)
}

fn decode_u8(buf: &mut Cursor<&[u8]>) -> MediaResult<u8> {
    if !buf.has_remaining() {
        return Err(truncated("flags"));
    }
    Ok(buf.get_u8())
}

fn truncated(what: &str) -> MediaError {
    MediaError::InvalidContainer {
        reason: format!("truncated {}", what),
    }
}

fn pts_to_wire(pts_us: i64) -> MediaResult<u64> {
    u64::try_from(pts_us).map_err(|_| MediaError::InvalidContainer {
        reason: format!("negative timestamp {}", pts_us),
    })
}

/// Location of one sample's payload in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Track index
    pub track: usize,
    /// Presentation timestamp, microseconds
    pub pts_us: i64,
    /// Sample flags
    pub flags: SampleFlags,
    /// Byte offset of the payload
    pub offset: u64,
    /// Payload size in bytes
    pub size: u64,
}

/// Sink for muxed output
pub trait ContainerWriter: Send {
    /// Write the track table; called once before any sample
    fn write_header(&mut self, tracks: &[StreamFormat]) -> MediaResult<()>;

    /// Append one sample
    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> MediaResult<()>;

    /// Write the index and footer; returns the total size in bytes
    fn finish(&mut self) -> MediaResult<u64>;
}

/// Writer for the `.avrc` track file format
#[derive(Debug)]
pub struct TrackFileWriter<W: Write + Send> {
    out: W,
    position: u64,
    header_len: Option<u64>,
    index: Vec<IndexEntry>,
    finished: bool,
}

impl TrackFileWriter<BufWriter<File>> {
    /// Create the file at `path`, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> MediaResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> TrackFileWriter<W> {
    /// Wrap an output stream
    pub fn new(out: W) -> Self {
        Self {
            out,
            position: 0,
            header_len: None,
            index: Vec::new(),
            finished: false,
        }
    }

    /// Bytes written so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Take back the output stream
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, data: &[u8]) -> MediaResult<()> {
        self.out.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }
}

impl<W: Write + Send> ContainerWriter for TrackFileWriter<W> {
    fn write_header(&mut self, tracks: &[StreamFormat]) -> MediaResult<()> {
        if self.header_len.is_some() {
            return Err(MediaError::AlreadyStarted);
        }

        let mut buf = BytesMut::new();
        buf.extend_from_slice(MAGIC);
        buf.put_u8(VERSION);
        encode_varint(tracks.len() as u64, &mut buf)?;
        for format in tracks {
            let json = serde_json::to_vec(format).map_err(|e| MediaError::InvalidContainer {
                reason: format!("format not serializable: {}", e),
            })?;
            encode_bytes(&json, &mut buf)?;
        }

        self.emit(&buf)?;
        self.header_len = Some(self.position);
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> MediaResult<()> {
        if self.header_len.is_none() {
            return Err(MediaError::InvalidContainer {
                reason: "sample written before header".to_string(),
            });
        }
        if self.finished {
            return Err(MediaError::AlreadyFinished);
        }

        let pts = pts_to_wire(sample.pts_us())?;
        let mut prefix = BytesMut::with_capacity(24);
        prefix.put_u8(RECORD_SAMPLE);
        encode_varint(track as u64, &mut prefix)?;
        prefix.put_u8(sample.flags().bits());
        encode_varint(pts, &mut prefix)?;
        encode_varint(sample.len() as u64, &mut prefix)?;

        self.emit(&prefix)?;
        let offset = self.position;
        self.emit(sample.payload())?;

        self.index.push(IndexEntry {
            track,
            pts_us: sample.pts_us(),
            flags: sample.flags(),
            offset,
            size: sample.len() as u64,
        });
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<u64> {
        if self.finished {
            return Err(MediaError::AlreadyFinished);
        }
        let header_len = self.header_len.ok_or_else(|| MediaError::InvalidContainer {
            reason: "finished before header".to_string(),
        })?;

        let index_offset = self.position;
        let mut buf = BytesMut::with_capacity(16 + self.index.len() * 16);
        buf.put_u8(RECORD_INDEX);
        encode_varint(self.index.len() as u64, &mut buf)?;
        for entry in &self.index {
            encode_varint(entry.track as u64, &mut buf)?;
            buf.put_u8(entry.flags.bits());
            encode_varint(pts_to_wire(entry.pts_us)?, &mut buf)?;
            encode_varint(entry.offset, &mut buf)?;
            encode_varint(entry.size, &mut buf)?;
        }
        buf.put_u64(header_len);
        buf.put_u64(index_offset);
        buf.extend_from_slice(FOOTER_MAGIC);

        self.emit(&buf)?;
        self.out.flush()?;
        self.finished = true;
        Ok(self.position)
    }
}

/// Reader for `.avrc` track files
#[derive(Debug)]
pub struct TrackFileReader<R: Read + Seek> {
    input: R,
    tracks: Vec<StreamFormat>,
    index: Vec<IndexEntry>,
}

impl TrackFileReader<BufReader<File>> {
    /// Open and index the file at `path`
    pub fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> TrackFileReader<R> {
    /// Parse the header, footer and index of a container
    pub fn new(mut input: R) -> MediaResult<Self> {
        let file_len = input.seek(SeekFrom::End(0))?;
        if file_len < FOOTER_LEN + MAGIC.len() as u64 + 1 {
            return Err(truncated("file"));
        }

        input.seek(SeekFrom::Start(file_len - FOOTER_LEN))?;
        let mut footer = [0u8; FOOTER_LEN as usize];
        input.read_exact(&mut footer)?;
        let mut footer_buf = &footer[..];
        let header_len = footer_buf.get_u64();
        let index_offset = footer_buf.get_u64();
        if footer_buf != FOOTER_MAGIC {
            return Err(MediaError::InvalidContainer {
                reason: "missing footer, file was not finalized".to_string(),
            });
        }
        if header_len > index_offset || index_offset > file_len - FOOTER_LEN {
            return Err(MediaError::InvalidContainer {
                reason: "footer offsets out of range".to_string(),
            });
        }

        let header = read_region(&mut input, 0, header_len)?;
        let tracks = parse_header(&header)?;

        let index_len = file_len - FOOTER_LEN - index_offset;
        let index_bytes = read_region(&mut input, index_offset, index_len)?;
        let index = parse_index(&index_bytes, tracks.len())?;

        Ok(Self {
            input,
            tracks,
            index,
        })
    }

    /// Track formats in track index order
    pub fn tracks(&self) -> &[StreamFormat] {
        &self.tracks
    }

    /// Every sample in file order
    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    /// Samples belonging to one track
    pub fn samples_for(&self, track: usize) -> impl Iterator<Item = &IndexEntry> {
        self.index.iter().filter(move |entry| entry.track == track)
    }

    /// Span between the first and last timestamp of a track
    pub fn duration_us(&self, track: usize) -> Option<i64> {
        let mut pts = self.samples_for(track).map(|entry| entry.pts_us);
        let first = pts.next()?;
        let last = pts.last().unwrap_or(first);
        Some(last - first)
    }

    /// Read the `n`th sample in file order
    pub fn read_sample(&mut self, n: usize) -> MediaResult<EncodedSample> {
        let entry = *self
            .index
            .get(n)
            .ok_or(MediaError::UnknownStream { index: n })?;
        let kind = self
            .tracks
            .get(entry.track)
            .map(StreamFormat::kind)
            .ok_or(MediaError::UnknownStream { index: entry.track })?;

        let payload = read_region(&mut self.input, entry.offset, entry.size)?;
        Ok(EncodedSample::new(
            kind,
            Bytes::from(payload),
            entry.pts_us,
            entry.flags,
        ))
    }
}

fn read_region<R: Read + Seek>(input: &mut R, offset: u64, len: u64) -> MediaResult<Vec<u8>> {
    input.seek(SeekFrom::Start(offset))?;
    let mut data = vec![0u8; len as usize];
    input.read_exact(&mut data)?;
    Ok(data)
}

fn parse_header(header: &[u8]) -> MediaResult<Vec<StreamFormat>> {
    let mut buf = Cursor::new(header);
    if buf.remaining() < MAGIC.len() + 1 {
        return Err(truncated("header"));
    }
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if &magic != MAGIC {
        return Err(MediaError::InvalidContainer {
            reason: "bad magic".to_string(),
        });
    }
    let version = buf.get_u8();
    if version != VERSION {
        return Err(MediaError::InvalidContainer {
            reason: format!("unsupported version {}", version),
        });
    }

    let count = decode_varint(&mut buf)?;
    let mut tracks = Vec::new();
    for _ in 0..count {
        let json = decode_bytes(&mut buf)?;
        let format = serde_json::from_slice(&json).map_err(|e| MediaError::InvalidContainer {
            reason: format!("bad track format: {}", e),
        })?;
        tracks.push(format);
    }
    Ok(tracks)
}

fn parse_index(data: &[u8], track_count: usize) -> MediaResult<Vec<IndexEntry>> {
    let mut buf = Cursor::new(data);
    if decode_u8(&mut buf)? != RECORD_INDEX {
        return Err(MediaError::InvalidContainer {
            reason: "index record expected".to_string(),
        });
    }

    let count = decode_varint(&mut buf)?;
    let mut index = Vec::new();
    for _ in 0..count {
        let track = decode_varint(&mut buf)? as usize;
        if track >= track_count {
            return Err(MediaError::UnknownStream { index: track });
        }
        let flags = SampleFlags::from_bits(decode_u8(&mut buf)?);
        let pts_us = decode_varint(&mut buf)? as i64;
        let offset = decode_varint(&mut buf)?;
        let size = decode_varint(&mut buf)?;
        index.push(IndexEntry {
            track,
            pts_us,
            flags,
            offset,
            size,
        });
    }
    Ok(index)
}
