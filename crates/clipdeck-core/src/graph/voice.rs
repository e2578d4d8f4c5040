//! Sample playback voices
//!
//! A fixed pool of voices mixed into the output block. Each voice reads a
//! frame range of a shared buffer and carries its own anti-click envelope:
//!
//! - 3ms fade-in on every trigger
//! - 3ms fade-out before the natural end of non-looping voices
//! - optional 10ms fade when stopped early
//!
//! Buffers are `basedrop::Shared`, so the voice dropping the last reference
//! on the audio thread only enqueues it for the collector thread.

use std::ops::Range;

use basedrop::Shared;

use crate::types::{AudioBuffer, Sample, StereoBuffer, StereoSample};

/// Voices that can sound at the same time
pub const MAX_VOICES: usize = 16;

/// Fade-in applied to every triggered voice
pub const FADE_IN_SECONDS: f32 = 0.003;

/// Fade-out before the end of non-looping voices
pub const END_FADE_SECONDS: f32 = 0.003;

/// Fade applied when a voice is stopped with `fade = true`
pub const STOP_FADE_SECONDS: f32 = 0.010;

/// Identifier handed out by the graph for each triggered voice
pub type VoiceId = u64;

/// Everything the audio thread needs to start a voice
pub struct PlayRequest {
    pub id: VoiceId,
    /// Already at the output sample rate
    pub buffer: Shared<AudioBuffer>,
    /// Frame range to play (loop range when looping)
    pub range: Range<usize>,
    pub looping: bool,
    pub gain: f32,
}

fn seconds_to_samples(seconds: f32, sample_rate: u32) -> usize {
    ((seconds * sample_rate as f32).round() as usize).max(1)
}

struct Voice {
    id: VoiceId,
    buffer: Shared<AudioBuffer>,
    start: usize,
    end: usize,
    position: usize,
    looping: bool,
    gain: f32,
    /// Samples rendered since the trigger, saturating at the fade-in length
    age: usize,
    /// `(remaining, length)` of a running stop fade
    stopping: Option<(usize, usize)>,
}

impl Voice {
    fn new(request: PlayRequest) -> Self {
        let len = request.buffer.len();
        let end = request.range.end.min(len);
        let start = request.range.start.min(end);
        Self {
            id: request.id,
            buffer: request.buffer,
            start,
            end,
            position: start,
            looping: request.looping,
            gain: request.gain,
            age: 0,
            stopping: None,
        }
    }

    #[inline]
    fn frame(&self, index: usize) -> StereoSample {
        let left = self.buffer.channel(0)[index];
        if self.buffer.channel_count() > 1 {
            StereoSample::new(left, self.buffer.channel(1)[index])
        } else {
            StereoSample::mono(left)
        }
    }

    /// Mix into `out`; returns false once the voice has finished
    fn render(&mut self, out: &mut [StereoSample], fade_in: usize, end_fade: usize) -> bool {
        if self.start >= self.end {
            return false;
        }

        for slot in out.iter_mut() {
            if self.position >= self.end {
                if !self.looping {
                    return false;
                }
                self.position = self.start;
            }

            let mut envelope = self.gain;
            if self.age < fade_in {
                envelope *= self.age as Sample / fade_in as Sample;
                self.age += 1;
            }
            if !self.looping {
                let left = self.end - self.position - 1;
                if left < end_fade {
                    envelope *= left as Sample / end_fade as Sample;
                }
            }
            if let Some((remaining, length)) = self.stopping.as_mut() {
                if *remaining == 0 {
                    return false;
                }
                *remaining -= 1;
                envelope *= *remaining as Sample / *length as Sample;
            }

            *slot += self.frame(self.position) * envelope;
            self.position += 1;
        }

        match self.stopping {
            Some((0, _)) => false,
            _ => self.looping || self.position < self.end,
        }
    }
}

/// Fixed-capacity voice pool owned by the output graph
pub struct VoicePool {
    voices: Vec<Voice>,
    fade_in: usize,
    end_fade: usize,
    stop_fade: usize,
}

impl VoicePool {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            voices: Vec::with_capacity(MAX_VOICES),
            fade_in: seconds_to_samples(FADE_IN_SECONDS, sample_rate),
            end_fade: seconds_to_samples(END_FADE_SECONDS, sample_rate),
            stop_fade: seconds_to_samples(STOP_FADE_SECONDS, sample_rate),
        }
    }

    /// Start a voice, handing the request back when every slot is busy
    pub fn start(&mut self, request: PlayRequest) -> Result<(), PlayRequest> {
        if self.voices.len() >= MAX_VOICES {
            return Err(request);
        }
        self.voices.push(Voice::new(request));
        Ok(())
    }

    /// Stop one voice, immediately or with the stop fade
    pub fn stop(&mut self, id: VoiceId, fade: bool) {
        if let Some(index) = self.voices.iter().position(|v| v.id == id) {
            if fade {
                self.begin_stop_fade(index);
            } else {
                self.voices.swap_remove(index);
            }
        }
    }

    pub fn stop_all(&mut self, fade: bool) {
        if fade {
            for index in 0..self.voices.len() {
                self.begin_stop_fade(index);
            }
        } else {
            self.voices.clear();
        }
    }

    fn begin_stop_fade(&mut self, index: usize) {
        let length = self.stop_fade;
        let voice = &mut self.voices[index];
        if voice.stopping.is_none() {
            voice.stopping = Some((length, length));
        }
    }

    pub fn active(&self) -> usize {
        self.voices.len()
    }

    pub fn is_playing(&self, id: VoiceId) -> bool {
        self.voices.iter().any(|v| v.id == id)
    }

    /// Add every voice into `out` and retire the finished ones
    pub fn render(&mut self, out: &mut StereoBuffer) {
        let (fade_in, end_fade) = (self.fade_in, self.end_fade);
        let mut index = 0;
        while index < self.voices.len() {
            if self.voices[index].render(out.as_mut_slice(), fade_in, end_fade) {
                index += 1;
            } else {
                self.voices.swap_remove(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc::gc_handle;

    const RATE: u32 = 1000;

    fn request(id: VoiceId, samples: Vec<f32>, looping: bool) -> PlayRequest {
        let len = samples.len();
        PlayRequest {
            id,
            buffer: Shared::new(&gc_handle(), AudioBuffer::mono(RATE, samples).unwrap()),
            range: 0..len,
            looping,
            gain: 1.0,
        }
    }

    fn render(pool: &mut VoicePool, frames: usize) -> StereoBuffer {
        let mut out = StereoBuffer::silence(frames);
        pool.render(&mut out);
        out
    }

    #[test]
    fn test_fade_in_and_out() {
        // 3 samples of fade at 1kHz
        let mut pool = VoicePool::new(RATE);
        pool.start(request(1, vec![1.0; 20], false)).ok().unwrap();
        let out = render(&mut pool, 24);

        assert_eq!(out[0].left, 0.0);
        assert!((out[1].left - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(out[10].left, 1.0);
        assert_eq!(out[10].right, 1.0);
        assert_eq!(out[19].left, 0.0);
        assert!(out[17].left > out[18].left && out[18].left > 0.0);
        assert_eq!(out[21].left, 0.0);
        assert_eq!(pool.active(), 0);
    }

    #[test]
    fn test_looping_voice_wraps() {
        let mut pool = VoicePool::new(RATE);
        let mut req = request(7, (0..10).map(|i| i as f32).collect(), true);
        req.range = 2..5;
        pool.start(req).ok().unwrap();
        let out = render(&mut pool, 12);

        // Past the fade-in the loop cycles 2, 3, 4
        assert_eq!(out[3].left, 2.0);
        assert_eq!(out[4].left, 3.0);
        assert_eq!(out[5].left, 4.0);
        assert_eq!(out[6].left, 2.0);
        assert!(pool.is_playing(7));
    }

    #[test]
    fn test_stop_with_fade() {
        let mut pool = VoicePool::new(RATE);
        pool.start(request(3, vec![1.0; 1000], true)).ok().unwrap();
        render(&mut pool, 10);

        pool.stop(3, true);
        let out = render(&mut pool, 20);
        assert!(out[0].left < 1.0 && out[0].left > 0.8);
        assert!(out[5].left < out[0].left);
        assert_eq!(out[9].left, 0.0);
        assert_eq!(out[15].left, 0.0);
        assert!(!pool.is_playing(3));
    }

    #[test]
    fn test_hard_stop_and_stop_all() {
        let mut pool = VoicePool::new(RATE);
        pool.start(request(1, vec![0.5; 100], true)).ok().unwrap();
        pool.start(request(2, vec![0.5; 100], true)).ok().unwrap();
        pool.stop(1, false);
        assert_eq!(pool.active(), 1);
        pool.stop_all(false);
        assert_eq!(pool.active(), 0);
        assert_eq!(render(&mut pool, 8).peak(), 0.0);
    }

    #[test]
    fn test_pool_is_bounded() {
        let mut pool = VoicePool::new(RATE);
        for id in 0..MAX_VOICES as u64 {
            assert!(pool.start(request(id, vec![0.1; 10], false)).is_ok());
        }
        let rejected = pool.start(request(99, vec![0.1; 10], false));
        assert_eq!(rejected.err().map(|r| r.id), Some(99));
    }

    #[test]
    fn test_stereo_source_and_empty_range() {
        let mut pool = VoicePool::new(RATE);
        let buffer = AudioBuffer::new(RATE, vec![vec![0.5; 10], vec![-0.5; 10]]).unwrap();
        pool.start(PlayRequest {
            id: 1,
            buffer: Shared::new(&gc_handle(), buffer),
            range: 0..10,
            looping: false,
            gain: 0.5,
        })
        .ok()
        .unwrap();
        let mut empty = request(2, vec![1.0; 10], false);
        empty.range = 4..4;
        pool.start(empty).ok().unwrap();

        let out = render(&mut pool, 10);
        assert_eq!(out[5].left, 0.25);
        assert_eq!(out[5].right, -0.25);
        assert_eq!(pool.active(), 0);
    }
}
