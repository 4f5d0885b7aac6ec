// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Real-time safe access to the container.
//!
//! The audio callback never touches the file. An I/O thread owns the
//! [`Container`], reads ahead of the head into preallocated blocks and carries
//! out extend and overdub requests. Blocks travel between the two threads
//! through lock-free rings and are recycled, so the callback neither blocks
//! nor allocates.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::{Consumer, Producer, PushError, RingBuffer};
use tracing::{debug, info, warn};

use super::{Container, FrameStore, StoreError, StoreResult, Take, WaveFormat};
use crate::engine::MAX_PERIOD;

/// Frames per read-ahead block
pub const STAGE_BLOCK_FRAMES: usize = 4096;

/// Read-ahead blocks in circulation
const STAGE_BLOCKS: usize = 8;

/// Overdub buffers in circulation
const OVERDUB_BLOCKS: usize = 8;

const REQUEST_CAPACITY: usize = 64;

/// Sleep when the I/O thread has nothing to do
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Counters shared between the staged store, the I/O thread and the UI
#[derive(Debug, Default)]
pub struct IoStats {
    /// Reads the callback could not satisfy from staged memory
    pub underruns: AtomicU32,
    /// Record blocks dropped because the I/O thread fell behind
    pub dropped_blocks: AtomicU32,
    /// Failed container reads or writes on the I/O thread
    pub io_errors: AtomicU32,
}

impl IoStats {
    pub fn clear(&self) {
        self.underruns.store(0, Ordering::Relaxed);
        self.dropped_blocks.store(0, Ordering::Relaxed);
        self.io_errors.store(0, Ordering::Relaxed);
    }
}

struct StagedBlock {
    generation: u64,
    start: u64,
    frames: usize,
    samples: Box<[f32]>,
}

impl StagedBlock {
    fn new(channels: usize) -> Self {
        Self {
            generation: 0,
            start: 0,
            frames: 0,
            samples: vec![0.0; STAGE_BLOCK_FRAMES * channels].into_boxed_slice(),
        }
    }

    fn covers(&self, frame: u64) -> bool {
        self.start <= frame && frame < self.start + self.frames as u64
    }
}

/// Input for up to two channel slots, destined for one overdub
struct OverdubBlock {
    frame: u64,
    frames: usize,
    channels: [Option<usize>; 2],
    samples: [Box<[f32]>; 2],
}

impl OverdubBlock {
    fn new() -> Self {
        Self {
            frame: 0,
            frames: 0,
            channels: [None; 2],
            samples: [
                vec![0.0; MAX_PERIOD].into_boxed_slice(),
                vec![0.0; MAX_PERIOD].into_boxed_slice(),
            ],
        }
    }
}

enum IoRequest {
    Locate { generation: u64, head: u64 },
    Extend { frames: u64 },
    Overdub(Box<OverdubBlock>),
}

/// Callback-side view of the container
pub struct StagedStore {
    format: WaveFormat,
    frames: u64,
    /// Frames at or beyond this index were added since the last locate and are silent
    staged_limit: u64,
    generation: u64,
    /// Where the next read is expected to start
    expected_head: Option<u64>,
    current: Option<Box<StagedBlock>>,
    staged: Consumer<Box<StagedBlock>>,
    empty: Producer<Box<StagedBlock>>,
    requests: Producer<IoRequest>,
    spare_overdubs: Consumer<Box<OverdubBlock>>,
    /// Overdub buffer held back after a full request ring
    reserve: Option<Box<OverdubBlock>>,
    pending_locate: bool,
    pending_extend: u64,
    stats: Arc<IoStats>,
}

impl StagedStore {
    /// Hand `container` to a new I/O thread, staging from `head`.
    pub fn spawn(container: Container, head: u64) -> StoreResult<(StagedStore, IoWorker)> {
        let format = container.format();
        let frames = container.frames();
        let head = head.min(frames);
        let channels = format.channels as usize;

        let (mut empty_tx, empty_rx) = RingBuffer::new(STAGE_BLOCKS);
        let (staged_tx, staged_rx) = RingBuffer::new(STAGE_BLOCKS);
        let (requests_tx, requests_rx) = RingBuffer::new(REQUEST_CAPACITY);
        let (mut spare_tx, spare_rx) = RingBuffer::new(OVERDUB_BLOCKS);

        for _ in 0..STAGE_BLOCKS {
            let _ = empty_tx.push(Box::new(StagedBlock::new(channels)));
        }
        for _ in 0..OVERDUB_BLOCKS {
            let _ = spare_tx.push(Box::new(OverdubBlock::new()));
        }

        let stats = Arc::new(IoStats::default());
        let stop = Arc::new(AtomicBool::new(false));

        let io = IoThread {
            limit: frames,
            container,
            generation: 0,
            cursor: head,
            idle_block: None,
            empty: empty_rx,
            staged: staged_tx,
            requests: requests_rx,
            spare: spare_tx,
            stop: Arc::clone(&stop),
            stats: Arc::clone(&stats),
        };
        let handle = thread::Builder::new()
            .name("tapedeck-io".into())
            .spawn(move || io.run())?;

        let store = StagedStore {
            format,
            frames,
            staged_limit: frames,
            generation: 0,
            expected_head: Some(head),
            current: None,
            staged: staged_rx,
            empty: empty_tx,
            requests: requests_tx,
            spare_overdubs: spare_rx,
            reserve: None,
            pending_locate: false,
            pending_extend: 0,
            stats: Arc::clone(&stats),
        };
        let worker = IoWorker {
            stop,
            stats,
            handle: Some(handle),
        };
        Ok((store, worker))
    }

    pub fn stats(&self) -> Arc<IoStats> {
        Arc::clone(&self.stats)
    }

    /// Retry requests that found the ring full. A deferred extend always goes
    /// first so the I/O thread sees the longer container before any later
    /// locate or overdub.
    fn flush_pending(&mut self) {
        if self.pending_extend > 0 {
            let request = IoRequest::Extend {
                frames: self.pending_extend,
            };
            if self.requests.push(request).is_err() {
                return;
            }
            self.pending_extend = 0;
        }
        if self.pending_locate {
            if let Some(head) = self.expected_head {
                let request = IoRequest::Locate {
                    generation: self.generation,
                    head,
                };
                self.pending_locate = self.requests.push(request).is_err();
            }
        }
    }

    fn recycle_current(&mut self) {
        if let Some(block) = self.current.take() {
            let _ = self.empty.push(block);
        }
    }

    /// Make `current` the block holding `frame`, discarding stale blocks.
    fn advance_to(&mut self, frame: u64) -> bool {
        loop {
            if let Some(block) = &self.current {
                if block.generation == self.generation {
                    if block.covers(frame) {
                        return true;
                    }
                    if block.start > frame {
                        return false;
                    }
                }
                self.recycle_current();
            }
            match self.staged.pop() {
                Ok(block) => self.current = Some(block),
                Err(_) => return false,
            }
        }
    }
}

impl FrameStore for StagedStore {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn frames(&self) -> u64 {
        self.frames
    }

    fn read_frames(&mut self, head: u64, out: &mut [f32]) -> StoreResult<usize> {
        if self.expected_head != Some(head) {
            self.locate(head);
        }
        self.flush_pending();

        let channels = self.format.channels as usize;
        let wanted = (out.len() / channels) as u64;
        let end = self.frames.min(head + wanted);
        let mut frame = head;

        while frame < end {
            let offset = (frame - head) as usize * channels;
            if frame >= self.staged_limit {
                let count = (end - frame) as usize;
                out[offset..offset + count * channels].fill(0.0);
                frame += count as u64;
                continue;
            }
            if !self.advance_to(frame) {
                self.stats.underruns.fetch_add(1, Ordering::Relaxed);
                break;
            }
            if let Some(block) = &self.current {
                let block_end = block.start + block.frames as u64;
                let count = (block_end.min(end).min(self.staged_limit) - frame) as usize;
                let from = (frame - block.start) as usize * channels;
                out[offset..offset + count * channels]
                    .copy_from_slice(&block.samples[from..from + count * channels]);
                frame += count as u64;
            }
        }

        self.expected_head = Some(frame);
        Ok((frame - head) as usize)
    }

    fn extend_by_frames(&mut self, count: u64) -> StoreResult<u64> {
        self.frames += count;
        let request = IoRequest::Extend {
            frames: self.pending_extend + count,
        };
        match self.requests.push(request) {
            Ok(()) => self.pending_extend = 0,
            Err(_) => self.pending_extend += count,
        }
        Ok(self.frames)
    }

    fn overdub(&mut self, frame: u64, frames: usize, takes: &[Take<'_>]) -> StoreResult<()> {
        self.flush_pending();
        if self.pending_extend > 0 {
            self.stats.dropped_blocks.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::Backlog);
        }
        let mut block = match self.reserve.take().or_else(|| self.spare_overdubs.pop().ok()) {
            Some(block) => block,
            None => {
                self.stats.dropped_blocks.fetch_add(1, Ordering::Relaxed);
                return Err(StoreError::Backlog);
            }
        };

        let frames = frames.min(MAX_PERIOD);
        block.frame = frame;
        block.frames = frames;
        block.channels = [None; 2];
        for (slot, take) in takes.iter().take(2).enumerate() {
            let count = take.samples.len().min(frames);
            block.channels[slot] = Some(take.channel);
            block.samples[slot][..count].copy_from_slice(&take.samples[..count]);
            block.samples[slot][count..frames].fill(0.0);
        }

        match self.requests.push(IoRequest::Overdub(block)) {
            Ok(()) => Ok(()),
            Err(PushError::Full(IoRequest::Overdub(block))) => {
                self.reserve = Some(block);
                self.stats.dropped_blocks.fetch_add(1, Ordering::Relaxed);
                Err(StoreError::Backlog)
            }
            Err(PushError::Full(_)) => Err(StoreError::Backlog),
        }
    }

    fn locate(&mut self, head: u64) {
        let head = head.min(self.frames);
        if self.expected_head == Some(head) && !self.pending_locate {
            return;
        }
        self.generation += 1;
        self.expected_head = Some(head);
        self.staged_limit = self.frames;
        self.recycle_current();
        self.pending_locate = true;
        self.flush_pending();
    }
}

/// Handle to the I/O thread; owns the container until shutdown
pub struct IoWorker {
    stop: Arc<AtomicBool>,
    stats: Arc<IoStats>,
    handle: Option<JoinHandle<Container>>,
}

impl IoWorker {
    pub fn stats(&self) -> Arc<IoStats> {
        Arc::clone(&self.stats)
    }

    /// Stop the thread after it drains queued writes, then close the container.
    pub fn shutdown(mut self) -> StoreResult<()> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(container)) => container.close(),
            Some(Err(_)) => Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "I/O thread panicked",
            ))),
            None => Ok(()),
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::Release);
            let _ = handle.join();
        }
    }
}

struct IoThread {
    container: Container,
    generation: u64,
    /// Next frame to stage
    cursor: u64,
    /// Stop staging here until the next locate
    limit: u64,
    idle_block: Option<Box<StagedBlock>>,
    empty: Consumer<Box<StagedBlock>>,
    staged: Producer<Box<StagedBlock>>,
    requests: Consumer<IoRequest>,
    spare: Producer<Box<OverdubBlock>>,
    stop: Arc<AtomicBool>,
    stats: Arc<IoStats>,
}

impl IoThread {
    fn run(mut self) -> Container {
        info!(frames = self.container.frames(), "I/O thread started");

        while !self.stop.load(Ordering::Acquire) {
            let handled = self.drain_requests();
            let staged = self.stage_next();
            if !handled && !staged {
                if self.requests.is_abandoned() {
                    debug!("staged store dropped, I/O thread exiting");
                    break;
                }
                thread::sleep(IDLE_WAIT);
            }
        }

        // Writes still queued belong to the take
        self.drain_requests();
        info!("I/O thread stopped");
        self.container
    }

    fn drain_requests(&mut self) -> bool {
        let mut handled = false;
        while let Ok(request) = self.requests.pop() {
            handled = true;
            match request {
                IoRequest::Locate { generation, head } => {
                    self.generation = generation;
                    self.cursor = head;
                    self.limit = self.container.frames();
                }
                IoRequest::Extend { frames } => {
                    if let Err(e) = self.container.extend_by_frames(frames) {
                        warn!("failed to extend container: {}", e);
                        self.stats.io_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                IoRequest::Overdub(block) => {
                    self.write_take(&block);
                    let _ = self.spare.push(block);
                }
            }
        }
        handled
    }

    fn write_take(&mut self, block: &OverdubBlock) {
        let mut takes = [Take::default(); 2];
        let mut count = 0;
        for (channel, samples) in block.channels.iter().zip(&block.samples) {
            if let Some(channel) = channel {
                takes[count] = Take {
                    channel: *channel,
                    samples: &samples[..block.frames],
                };
                count += 1;
            }
        }

        if let Err(e) = self.container.overdub(block.frame, block.frames, &takes[..count]) {
            warn!(frame = block.frame, frames = block.frames, "record block lost: {}", e);
            self.stats.io_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fill one block ahead of the cursor
    fn stage_next(&mut self) -> bool {
        if self.cursor >= self.limit {
            return false;
        }
        let mut block = match self.idle_block.take().or_else(|| self.empty.pop().ok()) {
            Some(block) => block,
            None => return false,
        };

        let channels = self.container.format().channels as usize;
        let want = (self.limit - self.cursor).min(STAGE_BLOCK_FRAMES as u64) as usize;
        match self.container.read_frames(self.cursor, &mut block.samples[..want * channels]) {
            Ok(0) => {
                self.limit = self.cursor;
                self.idle_block = Some(block);
                false
            }
            Ok(frames) => {
                block.generation = self.generation;
                block.start = self.cursor;
                block.frames = frames;
                self.cursor += frames as u64;
                if let Err(PushError::Full(block)) = self.staged.push(block) {
                    self.idle_block = Some(block);
                }
                true
            }
            Err(e) => {
                warn!(frame = self.cursor, "read-ahead failed: {}", e);
                self.stats.io_errors.fetch_add(1, Ordering::Relaxed);
                self.limit = self.cursor;
                self.idle_block = Some(block);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewContainer;
    use std::time::Instant;
    use tempfile::tempdir;

    fn mono(seconds: u32) -> NewContainer {
        NewContainer {
            channels: 1,
            sample_rate: 1000,
            seconds,
        }
    }

    /// Keep reading until `out` is full, giving the I/O thread time to stage
    fn read_all(store: &mut StagedStore, head: u64, out: &mut [f32]) -> usize {
        let channels = store.format().channels as usize;
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut done = 0;
        while done * channels < out.len() && Instant::now() < deadline {
            let read = store
                .read_frames(head + done as u64, &mut out[done * channels..])
                .unwrap();
            if read == 0 {
                if head + done as u64 >= store.frames() {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            done += read;
        }
        done
    }

    #[test]
    fn test_staged_reads_match_container() {
        let dir = tempdir().unwrap();
        let mut container = Container::open(dir.path().join("t.wav"), &mono(10)).unwrap();
        let ramp: Vec<f32> = (0..10_000).map(|i| i as f32).collect();
        container.rewrite_frames(0, &ramp).unwrap();

        let (mut store, worker) = StagedStore::spawn(container, 0).unwrap();
        let mut out = vec![0.0f32; 10_000];
        assert_eq!(read_all(&mut store, 0, &mut out), 10_000);
        assert_eq!(out, ramp);

        drop(store);
        worker.shutdown().unwrap();
    }

    #[test]
    fn test_locate_discards_stale_blocks() {
        let dir = tempdir().unwrap();
        let mut container = Container::open(dir.path().join("t.wav"), &mono(10)).unwrap();
        let ramp: Vec<f32> = (0..10_000).map(|i| i as f32).collect();
        container.rewrite_frames(0, &ramp).unwrap();

        let (mut store, worker) = StagedStore::spawn(container, 0).unwrap();
        let mut out = vec![0.0f32; 100];
        read_all(&mut store, 0, &mut out);

        store.locate(7000);
        assert_eq!(read_all(&mut store, 7000, &mut out), 100);
        assert_eq!(out[0], 7000.0);
        assert_eq!(out[99], 7099.0);

        drop(store);
        worker.shutdown().unwrap();
    }

    #[test]
    fn test_extended_region_reads_silence_and_reaches_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.wav");
        let mut container = Container::open(&path, &mono(1)).unwrap();
        container.rewrite_frames(0, &[1.0; 1000]).unwrap();

        let (mut store, worker) = StagedStore::spawn(container, 900).unwrap();
        assert_eq!(store.extend_by_frames(500).unwrap(), 1500);

        let mut out = vec![9.0f32; 600];
        assert_eq!(read_all(&mut store, 900, &mut out), 600);
        assert!(out[..100].iter().all(|s| *s == 1.0));
        assert!(out[100..].iter().all(|s| *s == 0.0));

        drop(store);
        worker.shutdown().unwrap();

        let container = Container::open(&path, &mono(1)).unwrap();
        assert_eq!(container.frames(), 1500);
    }

    #[test]
    fn test_overdub_is_written_by_io_thread() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.wav");
        let defaults = NewContainer {
            channels: 2,
            sample_rate: 1000,
            seconds: 1,
        };
        let container = Container::open(&path, &defaults).unwrap();

        let (mut store, worker) = StagedStore::spawn(container, 0).unwrap();
        let take = [0.25f32; 64];
        store
            .overdub(10, 64, &[Take { channel: 1, samples: &take }])
            .unwrap();

        drop(store);
        worker.shutdown().unwrap();

        let mut container = Container::open(&path, &defaults).unwrap();
        let mut out = vec![0.0f32; 2 * 80];
        container.read_frames(0, &mut out).unwrap();
        for frame in 0..80 {
            let expected = if (10..74).contains(&frame) { 0.25 } else { 0.0 };
            assert_eq!(out[frame * 2], 0.0);
            assert_eq!(out[frame * 2 + 1], expected);
        }
    }

    /// A staged store whose requests land in the returned ring instead of an
    /// I/O thread
    fn detached(frames: u64) -> (StagedStore, Consumer<IoRequest>) {
        let (empty_tx, _) = RingBuffer::<Box<StagedBlock>>::new(STAGE_BLOCKS);
        let (_, staged_rx) = RingBuffer::<Box<StagedBlock>>::new(STAGE_BLOCKS);
        let (requests_tx, requests_rx) = RingBuffer::new(REQUEST_CAPACITY);
        let (mut spare_tx, spare_rx) = RingBuffer::new(OVERDUB_BLOCKS);
        for _ in 0..OVERDUB_BLOCKS {
            let _ = spare_tx.push(Box::new(OverdubBlock::new()));
        }

        let store = StagedStore {
            format: WaveFormat::new(1, 1000),
            frames,
            staged_limit: frames,
            generation: 0,
            expected_head: Some(0),
            current: None,
            staged: staged_rx,
            empty: empty_tx,
            requests: requests_tx,
            spare_overdubs: spare_rx,
            reserve: None,
            pending_locate: false,
            pending_extend: 0,
            stats: Arc::new(IoStats::default()),
        };
        (store, requests_rx)
    }

    #[test]
    fn test_deferred_extend_stays_ahead_of_locate_and_overdub() {
        let (mut store, mut requests) = detached(1000);
        while store.requests.push(IoRequest::Extend { frames: 0 }).is_ok() {}

        assert_eq!(store.extend_by_frames(500).unwrap(), 1500);
        store.locate(1200);
        let take = [0.5f32; 100];
        let result = store.overdub(1400, 100, &[Take { channel: 0, samples: &take }]);
        assert!(matches!(result, Err(StoreError::Backlog)));
        assert_eq!(store.stats().dropped_blocks.load(Ordering::Relaxed), 1);

        while requests.pop().is_ok() {}
        store.overdub(1400, 100, &[Take { channel: 0, samples: &take }]).unwrap();

        assert!(matches!(requests.pop(), Ok(IoRequest::Extend { frames: 500 })));
        assert!(matches!(
            requests.pop(),
            Ok(IoRequest::Locate { generation: 1, head: 1200 })
        ));
        assert!(matches!(requests.pop(), Ok(IoRequest::Overdub(block)) if block.frame == 1400));
        assert!(requests.pop().is_err());
    }

    #[test]
    fn test_reads_never_pass_end() {
        let dir = tempdir().unwrap();
        let container = Container::open(dir.path().join("t.wav"), &mono(1)).unwrap();

        let (mut store, worker) = StagedStore::spawn(container, 0).unwrap();
        let mut out = vec![0.0f32; 64];
        assert_eq!(read_all(&mut store, 980, &mut out), 20);
        assert_eq!(store.read_frames(1000, &mut out).unwrap(), 0);

        drop(store);
        worker.shutdown().unwrap();
    }
}
