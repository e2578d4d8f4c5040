//! Lossless PCM recorder
//!
//! Split into a real-time [`RecorderTap`] living in the input callback and a
//! control-side [`RecorderSink`]. They share two lock-free queues: the sink
//! keeps the tap supplied with empty, pre-allocated chunks and the tap hands
//! filled chunks back. The tap never allocates, frees or blocks.
//!
//! Every take gets a session number. When recording is switched off the tap
//! pushes its partial chunk followed by a `Flushed` marker for that session,
//! which is what [`RecorderSink::finish`] waits for.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::types::{AudioBuffer, BufferResult, Sample};

/// Frames per chunk
pub const CHUNK_FRAMES: usize = 4096;

/// Chunks in circulation (about 5.5s at 48kHz between drains)
pub const POOL_CHUNKS: usize = 64;

/// Messages from the tap to the sink
enum TapMessage {
    Chunk { session: u32, samples: Vec<Sample> },
    Flushed { session: u32 },
}

/// State shared between tap and sink
#[derive(Debug, Default)]
struct RecorderShared {
    active: AtomicBool,
    session: AtomicU32,
    dropped_frames: AtomicU64,
}

/// Create a connected tap/sink pair for `channels` interleaved input channels
pub fn recorder(channels: usize, sample_rate: u32) -> (RecorderTap, RecorderSink) {
    let channels = channels.max(1);
    let chunk_len = CHUNK_FRAMES * channels;
    let (mut free_tx, free_rx) = rtrb::RingBuffer::new(POOL_CHUNKS);
    // One extra slot so the flush marker always fits behind a full pool
    let (filled_tx, filled_rx) = rtrb::RingBuffer::new(POOL_CHUNKS + 1);

    for _ in 0..POOL_CHUNKS {
        let _ = free_tx.push(Vec::with_capacity(chunk_len));
    }

    let shared = Arc::new(RecorderShared::default());
    let tap = RecorderTap {
        free: free_rx,
        filled: filled_tx,
        current: None,
        chunk_len,
        channels,
        session: 0,
        recording: false,
        shared: Arc::clone(&shared),
    };
    let sink = RecorderSink {
        free: free_tx,
        filled: filled_rx,
        chunk_len,
        channels,
        sample_rate,
        captured: Vec::new(),
        flushed: true,
        shared,
    };
    (tap, sink)
}

// ─────────────────────────────────────────────────────────────────────────────
// Real-time side
// ─────────────────────────────────────────────────────────────────────────────

/// Input-callback half of the recorder
pub struct RecorderTap {
    free: rtrb::Consumer<Vec<Sample>>,
    filled: rtrb::Producer<TapMessage>,
    current: Option<Vec<Sample>>,
    chunk_len: usize,
    channels: usize,
    session: u32,
    /// Set while a take is running on this side, cleared once flushed
    recording: bool,
    shared: Arc<RecorderShared>,
}

impl RecorderTap {
    /// Capture one interleaved input block if recording is active
    pub fn process(&mut self, interleaved: &[Sample]) {
        if self.shared.active.load(Ordering::Acquire) {
            let session = self.shared.session.load(Ordering::Acquire);
            if !self.recording || session != self.session {
                // Leftovers of an unflushed take go out under the old session
                if !self.push_current() {
                    if let Some(stale) = self.current.as_mut() {
                        stale.clear();
                    }
                }
                self.session = session;
                self.recording = true;
            }
            self.write(interleaved);
        } else if self.recording && self.push_current() {
            let marker = TapMessage::Flushed { session: self.session };
            if self.filled.push(marker).is_ok() {
                self.recording = false;
            }
        }
    }

    fn write(&mut self, mut remaining: &[Sample]) {
        while !remaining.is_empty() {
            if self.current.is_none() {
                self.current = self.free.pop().ok();
            }
            let Some(chunk) = self.current.as_mut() else {
                self.count_dropped(remaining.len());
                return;
            };

            let n = (self.chunk_len - chunk.len()).min(remaining.len());
            chunk.extend_from_slice(&remaining[..n]);
            remaining = &remaining[n..];

            if chunk.len() >= self.chunk_len {
                self.push_current();
                // Sink is not draining; reuse the chunk and lose its contents
                let stuck = self.current.as_ref().map_or(0, Vec::len);
                if stuck > 0 {
                    self.count_dropped(stuck);
                }
                if let Some(chunk) = self.current.as_mut() {
                    chunk.clear();
                }
            }
        }
    }

    /// Push the partial chunk, if any. Returns false when the queue is full.
    fn push_current(&mut self) -> bool {
        let Some(samples) = self.current.take() else {
            return true;
        };
        if samples.is_empty() {
            self.current = Some(samples);
            return true;
        }
        match self.filled.push(TapMessage::Chunk {
            session: self.session,
            samples,
        }) {
            Ok(()) => true,
            Err(rtrb::PushError::Full(TapMessage::Chunk { samples, .. })) => {
                self.current = Some(samples);
                false
            }
            Err(rtrb::PushError::Full(TapMessage::Flushed { .. })) => false,
        }
    }

    fn count_dropped(&self, samples: usize) {
        self.shared
            .dropped_frames
            .fetch_add((samples / self.channels) as u64, Ordering::Relaxed);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control side
// ─────────────────────────────────────────────────────────────────────────────

/// A finished recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTake {
    pub buffer: AudioBuffer,
    /// Frames lost because the chunk pool ran dry
    pub dropped_frames: u64,
    /// False when the tap never confirmed the end of the take
    pub flushed: bool,
}

/// Control half of the recorder
pub struct RecorderSink {
    free: rtrb::Producer<Vec<Sample>>,
    filled: rtrb::Consumer<TapMessage>,
    chunk_len: usize,
    channels: usize,
    sample_rate: u32,
    /// Interleaved samples of the running take
    captured: Vec<Sample>,
    flushed: bool,
    shared: Arc<RecorderShared>,
}

impl RecorderSink {
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Frames captured so far in the running take (after the last drain)
    pub fn captured_frames(&self) -> usize {
        self.captured.len() / self.channels
    }

    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }

    /// Begin a new take
    pub fn start(&mut self) {
        self.drain();
        self.captured.clear();
        self.flushed = false;
        self.shared.dropped_frames.store(0, Ordering::Relaxed);
        let session = self.shared.session.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        self.shared.active.store(true, Ordering::Release);
        log::debug!("recorder: take {} started", session);
    }

    /// Move filled chunks into the take and recycle them to the tap
    ///
    /// Call regularly while recording so the pool never runs dry.
    pub fn drain(&mut self) {
        let session = self.shared.session.load(Ordering::Acquire);
        while let Ok(message) = self.filled.pop() {
            match message {
                TapMessage::Chunk {
                    session: chunk_session,
                    mut samples,
                } => {
                    if chunk_session == session {
                        self.captured.extend_from_slice(&samples);
                    }
                    samples.clear();
                    self.recycle(samples);
                }
                TapMessage::Flushed { session: flushed } => {
                    if flushed == session {
                        self.flushed = true;
                    }
                }
            }
        }
    }

    fn recycle(&mut self, mut samples: Vec<Sample>) {
        if samples.capacity() < self.chunk_len {
            samples.reserve_exact(self.chunk_len - samples.capacity());
        }
        // The pool is sized for every chunk, so this only fails if a chunk was duplicated
        let _ = self.free.push(samples);
    }

    /// Stop the take, wait up to `timeout` for the tap to flush, and build the buffer
    pub fn finish(&mut self, timeout: Duration) -> BufferResult<RecordedTake> {
        self.shared.active.store(false, Ordering::Release);

        let deadline = Instant::now() + timeout;
        loop {
            self.drain();
            if self.flushed || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if !self.flushed {
            log::warn!(
                "recorder: no flush from the input stream within {:?}, keeping {} frames",
                timeout,
                self.captured_frames()
            );
        }

        let interleaved = std::mem::take(&mut self.captured);
        let buffer = AudioBuffer::from_interleaved(self.sample_rate, self.channels, &interleaved)?;
        let take = RecordedTake {
            buffer,
            dropped_frames: self.dropped_frames(),
            flushed: self.flushed,
        };
        if take.dropped_frames > 0 {
            log::warn!("recorder: {} frames dropped (chunk pool exhausted)", take.dropped_frames);
        }
        log::debug!("recorder: take finished with {} frames", take.buffer.len());
        Ok(take)
    }
}
