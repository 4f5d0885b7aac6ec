// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! WAVE header encoding and chunk scanning.
//!
//! The container always writes the minimal 44-byte float32 header. Reading is
//! more forgiving: any RIFF/WAVE file with a float32 `fmt ` chunk is accepted,
//! whatever chunks sit in front of the payload.

use std::io::{self, Read, Seek, SeekFrom};

use super::{StoreError, StoreResult, DEFAULT_SAMPLE_RATE, MAX_TRACKS, SAMPLE_SIZE};

/// Size of the minimal header, and the payload offset of a normalised container
pub const HEADER_SIZE: u64 = 44;

/// WAVE_FORMAT_IEEE_FLOAT
pub const FORMAT_IEEE_FLOAT: u16 = 3;

/// WAVE_FORMAT_EXTENSIBLE
pub const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

pub const BITS_PER_SAMPLE: u16 = 32;

/// Largest `fmt ` chunk we are willing to buffer
const MAX_FMT_CHUNK: u32 = 1024;

/// Audio layout of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl WaveFormat {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_size(&self) -> usize {
        self.channels as usize * SAMPLE_SIZE
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.frame_size() as u32
    }
}

/// Result of scanning a header: format plus where the payload lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub format: WaveFormat,
    /// Byte offset of the first payload byte
    pub data_start: u64,
    /// Size field of the `data` chunk as written in the file
    pub declared_len: u32,
}

/// Serialise the minimal header for `payload_bytes` bytes of samples.
pub fn encode(format: WaveFormat, payload_bytes: u32) -> [u8; HEADER_SIZE as usize] {
    let mut header = [0u8; HEADER_SIZE as usize];
    let riff_size = payload_bytes.saturating_add(HEADER_SIZE as u32 - 8);

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&FORMAT_IEEE_FLOAT.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&(format.frame_size() as u16).to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&payload_bytes.to_le_bytes());
    header
}

/// True if `bytes` starts with a RIFF/WAVE preamble
pub fn has_signature(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Walk the chunk list and locate the format and payload.
///
/// Unknown chunks are skipped by their declared size plus the RIFF pad byte.
/// The `fmt ` chunk must come before `data`.
pub fn scan<R: Read + Seek>(reader: &mut R) -> StoreResult<Layout> {
    reader.seek(SeekFrom::Start(0))?;

    let mut preamble = [0u8; 12];
    read_or_corrupt(reader, &mut preamble, "truncated RIFF preamble")?;
    if !has_signature(&preamble) {
        return Err(StoreError::Corrupt("missing RIFF/WAVE signature".into()));
    }

    let mut format = None;
    loop {
        let mut chunk = [0u8; 8];
        read_or_corrupt(reader, &mut chunk, "no data chunk")?;
        let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let size = le32(&chunk, 4);

        match &id {
            b"fmt " => {
                if !(16..=MAX_FMT_CHUNK).contains(&size) {
                    return Err(StoreError::Corrupt(format!("fmt chunk of {} bytes", size)));
                }
                let mut body = vec![0u8; size as usize];
                read_or_corrupt(reader, &mut body, "truncated fmt chunk")?;
                skip_pad(reader, size)?;
                format = Some(parse_format(&body)?);
            }
            b"data" => {
                let format = format.ok_or_else(|| {
                    StoreError::Corrupt("data chunk precedes fmt chunk".into())
                })?;
                return Ok(Layout {
                    format,
                    data_start: reader.stream_position()?,
                    declared_len: size,
                });
            }
            _ => {
                let skip = size as i64 + (size & 1) as i64;
                reader.seek(SeekFrom::Current(skip))?;
            }
        }
    }
}

fn parse_format(body: &[u8]) -> StoreResult<WaveFormat> {
    let tag = le16(body, 0);
    let channels = le16(body, 2);
    let sample_rate = le32(body, 4);
    let bits = le16(body, 14);

    let is_float = match tag {
        FORMAT_IEEE_FLOAT => true,
        // cbSize, valid bits, channel mask, then the sub-format GUID
        FORMAT_EXTENSIBLE => body.len() >= 26 && le16(body, 24) == FORMAT_IEEE_FLOAT,
        _ => false,
    };
    if !is_float || bits != BITS_PER_SAMPLE {
        return Err(StoreError::UnsupportedFormat { format: tag, bits });
    }
    if channels == 0 || channels as usize > MAX_TRACKS {
        return Err(StoreError::Corrupt(format!("{} channels", channels)));
    }

    let sample_rate = if sample_rate == 0 {
        DEFAULT_SAMPLE_RATE
    } else {
        sample_rate
    };
    Ok(WaveFormat::new(channels, sample_rate))
}

fn read_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> StoreResult<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(StoreError::Corrupt(what.into())),
        Err(e) => Err(e.into()),
    }
}

fn skip_pad<R: Seek>(reader: &mut R, size: u32) -> StoreResult<()> {
    if size & 1 == 1 {
        reader.seek(SeekFrom::Current(1))?;
    }
    Ok(())
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn fmt_body(tag: u16, channels: u16, rate: u32, bits: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&tag.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        body.extend_from_slice(&(rate * channels as u32 * bits as u32 / 8).to_le_bytes());
        body.extend_from_slice(&(channels * bits / 8).to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        body
    }

    fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32 + 4).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_encode_minimal_header() {
        let header = encode(WaveFormat::new(2, 44100), 800);

        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(le32(&header, 4), 836);
        assert_eq!(&header[8..16], b"WAVEfmt ");
        assert_eq!(le16(&header, 20), FORMAT_IEEE_FLOAT);
        assert_eq!(header[22], 2);
        assert_eq!(le32(&header, 24), 44100);
        assert_eq!(le32(&header, 28), 44100 * 8);
        assert_eq!(le16(&header, 32), 8);
        assert_eq!(le16(&header, 34), 32);
        assert_eq!(&header[36..40], b"data");
        assert_eq!(le32(&header, 40), 800);
    }

    #[test]
    fn test_scan_minimal_header() {
        let format = WaveFormat::new(16, 48000);
        let mut cursor = Cursor::new(encode(format, 0).to_vec());

        let layout = scan(&mut cursor).unwrap();
        assert_eq!(layout.format, format);
        assert_eq!(layout.data_start, HEADER_SIZE);
        assert_eq!(layout.declared_len, 0);
    }

    #[test]
    fn test_scan_skips_unknown_chunks_with_padding() {
        let bytes = riff(&[
            chunk(b"JUNK", &[1, 2, 3]),
            chunk(b"fmt ", &fmt_body(3, 4, 44100, 32)),
            chunk(b"LIST", &[0; 9]),
            chunk(b"data", &[0; 32]),
        ]);
        let layout = scan(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(layout.format, WaveFormat::new(4, 44100));
        // 12 preamble + JUNK (8 + 4) + fmt (8 + 16) + LIST (8 + 10) + data header 8
        assert_eq!(layout.data_start, 12 + 12 + 24 + 18 + 8);
        assert_eq!(layout.declared_len, 32);
    }

    #[test]
    fn test_scan_accepts_extensible_float() {
        let mut body = fmt_body(FORMAT_EXTENSIBLE, 2, 96000, 32);
        body.extend_from_slice(&22u16.to_le_bytes());
        body.extend_from_slice(&32u16.to_le_bytes());
        body.extend_from_slice(&3u32.to_le_bytes());
        body.extend_from_slice(&FORMAT_IEEE_FLOAT.to_le_bytes());
        body.extend_from_slice(&[0u8; 14]);
        let bytes = riff(&[chunk(b"fmt ", &body), chunk(b"data", &[])]);

        let layout = scan(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(layout.format, WaveFormat::new(2, 96000));
    }

    #[test]
    fn test_scan_rejects_pcm() {
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(1, 2, 44100, 16)), chunk(b"data", &[])]);
        let err = scan(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFormat { format: 1, bits: 16 }));
    }

    #[test]
    fn test_scan_rejects_data_before_fmt() {
        let bytes = riff(&[chunk(b"data", &[0; 8]), chunk(b"fmt ", &fmt_body(3, 2, 44100, 32))]);
        assert!(matches!(scan(&mut Cursor::new(bytes)), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_scan_missing_data_chunk() {
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(3, 2, 44100, 32))]);
        assert!(matches!(scan(&mut Cursor::new(bytes)), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_scan_rejects_too_many_channels() {
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(3, 17, 44100, 32)), chunk(b"data", &[])]);
        assert!(matches!(scan(&mut Cursor::new(bytes)), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_scan_defaults_zero_sample_rate() {
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(3, 1, 0, 32)), chunk(b"data", &[])]);
        let layout = scan(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(layout.format.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_signature() {
        assert!(has_signature(&encode(WaveFormat::new(1, 44100), 0)));
        assert!(!has_signature(b"RIFF"));
        assert!(!has_signature(b"RIFF\0\0\0\0AVI LIST"));
    }
}
