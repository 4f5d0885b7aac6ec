// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The tape container: an interleaved float32 WAVE file that grows while
//! recording.
//!
//! A normalised container has its payload at byte 44. Files with any other
//! layout are rewritten through a staging file on open.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::header::{self, WaveFormat, HEADER_SIZE};
use super::{FrameStore, NewContainer, StoreError, StoreResult, Take, MAX_TRACKS, SAMPLE_SIZE};

/// Copy size used when normalising a foreign layout
const IMPORT_CHUNK: usize = 64 * 1024;

/// Open container file
pub struct Container {
    file: File,
    path: PathBuf,
    format: WaveFormat,
    /// Byte offset of the first payload byte
    data_start: u64,
    /// Byte offset one past the last whole frame
    data_end: u64,
    /// Reusable byte buffer for sample conversion
    scratch: Vec<u8>,
    closed: bool,
}

impl Container {
    /// Open or create a container
    pub fn open(path: impl AsRef<Path>, defaults: &NewContainer) -> StoreResult<Self> {
        Self::open_with_progress(path, defaults, &mut |_| {})
    }

    /// Open or create a container, reporting import progress in percent
    pub fn open_with_progress(
        path: impl AsRef<Path>,
        defaults: &NewContainer,
        progress: &mut dyn FnMut(u8),
    ) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(StoreError::NotFound(parent.to_path_buf()));
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut container = Self {
            file,
            path: path.to_path_buf(),
            format: WaveFormat::new(defaults.channels, defaults.sample_rate),
            data_start: HEADER_SIZE,
            data_end: HEADER_SIZE,
            scratch: Vec::new(),
            closed: false,
        };

        if !container.has_signature()? {
            container.initialise(defaults)?;
        }
        container.load_layout(progress)?;

        info!(
            path = %container.path.display(),
            channels = container.format.channels,
            sample_rate = container.format.sample_rate,
            frames = container.frames(),
            "opened container"
        );
        Ok(container)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Content length in frames
    pub fn frames(&self) -> u64 {
        (self.data_end - self.data_start) / self.format.frame_size() as u64
    }

    /// Re-read the header from disk
    pub fn read_header(&mut self) -> StoreResult<WaveFormat> {
        Ok(header::scan(&mut self.file)?.format)
    }

    /// Write the minimal header describing `payload_bytes` bytes of `channels`
    pub fn write_header(&mut self, payload_bytes: u64, channels: u16) -> StoreResult<()> {
        let format = WaveFormat::new(channels, self.format.sample_rate);
        let payload = u32::try_from(payload_bytes).unwrap_or(u32::MAX);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header::encode(format, payload))?;
        Ok(())
    }

    /// Rewrite a file whose payload does not start at byte 44.
    ///
    /// The minimal header and the payload are streamed into a staging file in
    /// the same directory, which then replaces the original in one rename.
    pub fn import_foreign_layout(&mut self, progress: &mut dyn FnMut(u8)) -> StoreResult<()> {
        if self.data_start == HEADER_SIZE {
            return Ok(());
        }

        let payload = self.data_end - self.data_start;
        info!(
            path = %self.path.display(),
            data_start = self.data_start,
            bytes = payload,
            "normalising container layout"
        );

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staging = tempfile::Builder::new()
            .prefix(".tapedeck-import")
            .tempfile_in(dir)?;
        fs::set_permissions(staging.path(), self.file.metadata()?.permissions())?;

        let header = header::encode(self.format, u32::try_from(payload).unwrap_or(u32::MAX));
        staging.as_file_mut().write_all(&header)?;

        self.file.seek(SeekFrom::Start(self.data_start))?;
        let mut chunk = vec![0u8; IMPORT_CHUNK];
        let mut copied = 0u64;
        let mut reported = None;
        while copied < payload {
            let want = (payload - copied).min(IMPORT_CHUNK as u64) as usize;
            self.file.read_exact(&mut chunk[..want])?;
            staging.as_file_mut().write_all(&chunk[..want])?;
            copied += want as u64;

            let percent = (copied * 100 / payload) as u8;
            if reported != Some(percent) {
                reported = Some(percent);
                progress(percent);
            }
        }
        if payload == 0 {
            progress(100);
        }

        staging.as_file().sync_all()?;
        self.file = staging.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        self.data_start = HEADER_SIZE;
        self.data_end = HEADER_SIZE + payload;

        info!(path = %self.path.display(), "container layout normalised");
        Ok(())
    }

    /// Read up to `out.len() / channels` frames starting at `head`.
    pub fn read_frames(&mut self, head: u64, out: &mut [f32]) -> StoreResult<usize> {
        let channels = self.format.channels as usize;
        let frame_size = self.format.frame_size();
        let wanted = (out.len() / channels) as u64;
        let frames = wanted.min(self.frames().saturating_sub(head)) as usize;
        if frames == 0 {
            return Ok(0);
        }

        let bytes = frames * frame_size;
        self.reserve_scratch(bytes);
        self.file.seek(SeekFrom::Start(self.offset_of(head)))?;
        let read = read_fully(&mut self.file, &mut self.scratch[..bytes])?;

        let frames = read / frame_size;
        decode_samples(&self.scratch[..frames * frame_size], &mut out[..frames * channels]);
        Ok(frames)
    }

    /// Overwrite interleaved frames in place starting at `frame`.
    pub fn rewrite_frames(&mut self, frame: u64, samples: &[f32]) -> StoreResult<()> {
        let channels = self.format.channels as usize;
        let frames = (samples.len() / channels) as u64;
        let end = self.frames();
        if frame.saturating_add(frames) > end {
            return Err(StoreError::OutOfBounds { frame, frames, end });
        }

        let count = frames as usize * channels;
        let bytes = count * SAMPLE_SIZE;
        self.reserve_scratch(bytes);
        encode_samples(&samples[..count], &mut self.scratch[..bytes]);
        self.file.seek(SeekFrom::Start(self.offset_of(frame)))?;
        self.file.write_all(&self.scratch[..bytes])?;
        Ok(())
    }

    /// Grow the payload by `count` frames of silence, returning the new length.
    pub fn extend_by_frames(&mut self, count: u64) -> StoreResult<u64> {
        let end = self.data_end + count * self.format.frame_size() as u64;
        self.file.set_len(end)?;
        self.data_end = end;
        debug!(frames = self.frames(), "container extended");
        Ok(self.frames())
    }

    /// Read back `frames` frames at `frame`, replace the channels named by
    /// `takes` and write the block back.
    pub fn overdub(&mut self, frame: u64, frames: usize, takes: &[Take<'_>]) -> StoreResult<()> {
        let channels = self.format.channels as usize;
        let bytes = frames * self.format.frame_size();
        self.reserve_scratch(bytes);

        let offset = self.offset_of(frame);
        let available = self.data_end.saturating_sub(offset).min(bytes as u64) as usize;
        self.file.seek(SeekFrom::Start(offset))?;
        let read = read_fully(&mut self.file, &mut self.scratch[..available])?;
        if read != bytes {
            return Err(StoreError::ShortRead {
                expected: bytes,
                actual: read,
            });
        }

        for take in takes {
            if take.channel >= channels {
                continue;
            }
            for (i, sample) in take.samples.iter().take(frames).enumerate() {
                let at = (i * channels + take.channel) * SAMPLE_SIZE;
                self.scratch[at..at + SAMPLE_SIZE].copy_from_slice(&sample.to_le_bytes());
            }
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&self.scratch[..bytes])?;
        Ok(())
    }

    /// Finalise the header and release the file
    pub fn close(mut self) -> StoreResult<()> {
        self.finalise()?;
        self.closed = true;
        info!(path = %self.path.display(), frames = self.frames(), "closed container");
        Ok(())
    }

    /// Rewrite both size fields from the authoritative end of data
    fn finalise(&mut self) -> StoreResult<()> {
        let riff_size = u32::try_from(self.data_end - 8).unwrap_or(u32::MAX);
        let data_size = u32::try_from(self.data_end - self.data_start).unwrap_or(u32::MAX);

        self.file.seek(SeekFrom::Start(4))?;
        self.file.write_all(&riff_size.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(self.data_start - 4))?;
        self.file.write_all(&data_size.to_le_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }

    fn has_signature(&mut self) -> StoreResult<bool> {
        let mut preamble = [0u8; 12];
        self.file.seek(SeekFrom::Start(0))?;
        let read = read_fully(&mut self.file, &mut preamble)?;
        Ok(header::has_signature(&preamble[..read]))
    }

    /// Replace the contents with a minimal header and silence
    fn initialise(&mut self, defaults: &NewContainer) -> StoreResult<()> {
        if defaults.channels == 0 || defaults.channels as usize > MAX_TRACKS {
            return Err(StoreError::TooManyChannels(defaults.channels));
        }

        let existing = self.file.metadata()?.len();
        if existing > 0 {
            warn!(
                path = %self.path.display(),
                bytes = existing,
                "not a RIFF/WAVE file, replacing contents with silence"
            );
        }

        self.format = WaveFormat::new(defaults.channels, defaults.sample_rate);
        let payload = defaults.sample_rate as u64 * defaults.seconds as u64 * self.format.frame_size() as u64;

        self.file.set_len(0)?;
        self.write_header(payload, defaults.channels)?;
        self.file.set_len(HEADER_SIZE + payload)?;
        self.file.sync_all()?;

        info!(
            path = %self.path.display(),
            channels = defaults.channels,
            seconds = defaults.seconds,
            "created container"
        );
        Ok(())
    }

    fn load_layout(&mut self, progress: &mut dyn FnMut(u8)) -> StoreResult<()> {
        let layout = header::scan(&mut self.file)?;
        let file_len = self.file.metadata()?.len();
        let available = file_len.saturating_sub(layout.data_start);

        // A normalised container may never have had its sizes finalised
        let payload = if layout.data_start == HEADER_SIZE
            || layout.declared_len == 0
            || layout.declared_len == u32::MAX
        {
            available
        } else {
            (layout.declared_len as u64).min(available)
        };

        self.format = layout.format;
        let frame_size = self.format.frame_size() as u64;
        self.data_start = layout.data_start;
        self.data_end = layout.data_start + payload / frame_size * frame_size;

        self.import_foreign_layout(progress)
    }

    fn offset_of(&self, frame: u64) -> u64 {
        self.data_start + frame * self.format.frame_size() as u64
    }

    fn reserve_scratch(&mut self, bytes: usize) {
        if self.scratch.len() < bytes {
            self.scratch.resize(bytes, 0);
        }
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.finalise() {
                error!(path = %self.path.display(), "failed to finalise container: {}", e);
            }
        }
    }
}

impl FrameStore for Container {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn frames(&self) -> u64 {
        Container::frames(self)
    }

    fn read_frames(&mut self, head: u64, out: &mut [f32]) -> StoreResult<usize> {
        Container::read_frames(self, head, out)
    }

    fn extend_by_frames(&mut self, count: u64) -> StoreResult<u64> {
        Container::extend_by_frames(self, count)
    }

    fn overdub(&mut self, frame: u64, frames: usize, takes: &[Take<'_>]) -> StoreResult<()> {
        Container::overdub(self, frame, frames, takes)
    }
}

/// Read until `buf` is full or the file ends
fn read_fully(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn decode_samples(bytes: &[u8], out: &mut [f32]) {
    for (sample, raw) in out.iter_mut().zip(bytes.chunks_exact(SAMPLE_SIZE)) {
        *sample = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    }
}

fn encode_samples(samples: &[f32], out: &mut [u8]) {
    for (raw, sample) in out.chunks_exact_mut(SAMPLE_SIZE).zip(samples) {
        raw.copy_from_slice(&sample.to_le_bytes());
    }
}
