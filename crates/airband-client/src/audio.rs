//! Gapless audio buffer scheduling.
//!
//! Demodulated audio arrives in network-paced batches, but playback
//! wants a steady stream of fixed-size buffers with precise start
//! times. [`AudioScheduler`] packs samples into pooled quarter-second
//! buffers, crossfades adjacent buffers over a small overlap region to
//! hide splice clicks, and schedules each buffer against a smoothed
//! estimate of the source pacing so short network jitter never opens an
//! audible gap.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

const BUFFERS_PER_SECOND: u32 = 4;
const MAX_BUFFERS: usize = 20;
const OVERLAP_FRACTION: f64 = 0.05;
// Pacing estimate smoothing: heavily damped so one late batch barely
// moves the schedule.
const DELAY_SMOOTHING: f64 = 0.01;
// A gap this far off the estimate means the source stalled or jumped;
// re-anchor instead of dragging the estimate toward it.
const GAP_RESET_THRESHOLD: Duration = Duration::from_millis(200);

/// A filled buffer with its scheduled start time.
#[derive(Debug)]
pub struct ScheduledBuffer {
    pub samples: Vec<f32>,
    pub start: Instant,
}

/// Receives scheduled buffers. The sink owns each buffer until it hands
/// it back through [`AudioScheduler::recycle`].
pub type BufferSink = Box<dyn FnMut(ScheduledBuffer) + Send>;

/// Packs incoming samples into pooled, crossfaded, time-scheduled
/// buffers.
pub struct AudioScheduler {
    buffer_len: usize,
    overlap: usize,
    pool: Vec<Vec<f32>>,
    allocated: usize,
    current: Option<Vec<f32>>,
    cursor: usize,
    inter_buffer_delay: Duration,
    last_start: Option<Instant>,
    last_fill: Option<Instant>,
    sink: BufferSink,
}

fn initial_delay() -> Duration {
    // One buffer period, less the overlap the next buffer replays.
    Duration::from_secs_f64((1.0 - OVERLAP_FRACTION) / BUFFERS_PER_SECOND as f64)
}

impl AudioScheduler {
    pub fn new(sample_rate: u32, sink: BufferSink) -> AudioScheduler {
        let buffer_len = (sample_rate / BUFFERS_PER_SECOND) as usize;
        AudioScheduler {
            buffer_len,
            overlap: (buffer_len as f64 * OVERLAP_FRACTION) as usize,
            pool: Vec::new(),
            allocated: 0,
            current: None,
            cursor: 0,
            inter_buffer_delay: initial_delay(),
            last_start: None,
            last_fill: None,
            sink,
        }
    }

    /// Samples per scheduled buffer at the current rate.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Append demodulated samples, scheduling buffers as they fill.
    pub fn add_samples(&mut self, samples: &[f32]) {
        self.add_samples_at(samples, Instant::now());
    }

    /// Clock-injectable variant of [`add_samples`](Self::add_samples).
    pub fn add_samples_at(&mut self, mut samples: &[f32], now: Instant) {
        while !samples.is_empty() {
            if self.current.is_none() {
                match self.take_buffer() {
                    Some(buffer) => {
                        self.current = Some(buffer);
                        self.cursor = 0;
                    }
                    None => {
                        // Pool exhausted: playback is not consuming.
                        trace!(dropped = samples.len(), "audio pool exhausted, dropping samples");
                        return;
                    }
                }
            }

            let buffer = match self.current.as_mut() {
                Some(buffer) => buffer,
                None => return,
            };
            let take = samples.len().min(self.buffer_len - self.cursor);
            buffer[self.cursor..self.cursor + take].copy_from_slice(&samples[..take]);
            self.cursor += take;
            samples = &samples[take..];

            if self.cursor == self.buffer_len {
                self.finish_buffer(now);
            }
        }
    }

    /// Hand a played-out buffer back to the pool.
    pub fn recycle(&mut self, buffer: Vec<f32>) {
        if buffer.len() == self.buffer_len {
            self.pool.push(buffer);
        }
        // Stale-sized buffers from before a rate change are dropped.
    }

    /// Abandon the in-flight buffer and scheduling state.
    pub fn reset(&mut self) {
        if let Some(buffer) = self.current.take() {
            self.pool.push(buffer);
        }
        self.cursor = 0;
        self.last_start = None;
        self.last_fill = None;
        self.inter_buffer_delay = initial_delay();
    }

    /// Rebuild for a new sample rate. In-flight buffers of the old size
    /// are dropped when recycled.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        debug!(sample_rate, "audio scheduler rebuilt");
        self.buffer_len = (sample_rate / BUFFERS_PER_SECOND) as usize;
        self.overlap = (self.buffer_len as f64 * OVERLAP_FRACTION) as usize;
        self.pool.clear();
        self.allocated = 0;
        self.current = None;
        self.cursor = 0;
        self.last_start = None;
        self.last_fill = None;
        self.inter_buffer_delay = initial_delay();
    }

    fn take_buffer(&mut self) -> Option<Vec<f32>> {
        if let Some(buffer) = self.pool.pop() {
            return Some(buffer);
        }
        if self.allocated < MAX_BUFFERS {
            self.allocated += 1;
            return Some(vec![0.0; self.buffer_len]);
        }
        None
    }

    fn finish_buffer(&mut self, now: Instant) {
        self.update_pacing(now);

        let mut full = match self.current.take() {
            Some(buffer) => buffer,
            None => return,
        };

        // Splice: replay the (pre-taper) tail of this buffer at the head
        // of the next one, so the fade-out here crossfades with the
        // fade-in there.
        match self.take_buffer() {
            Some(mut next) => {
                let tail = self.buffer_len - self.overlap;
                next[..self.overlap].copy_from_slice(&full[tail..]);
                self.current = Some(next);
                self.cursor = self.overlap;
            }
            None => {
                warn!("audio pool exhausted at splice point");
                self.current = None;
                self.cursor = 0;
            }
        }

        taper(&mut full, self.overlap);

        let start = match self.last_start {
            None => now + self.inter_buffer_delay,
            Some(previous) => previous + self.inter_buffer_delay,
        };
        self.last_start = Some(start);
        (self.sink)(ScheduledBuffer {
            samples: full,
            start,
        });
    }

    fn update_pacing(&mut self, now: Instant) {
        if let Some(last) = self.last_fill {
            let gap = now.duration_since(last);
            let deviation = if gap > self.inter_buffer_delay {
                gap - self.inter_buffer_delay
            } else {
                self.inter_buffer_delay - gap
            };
            if deviation > GAP_RESET_THRESHOLD {
                debug!(gap_ms = gap.as_millis() as u64, "pacing discontinuity, re-anchoring");
                self.last_start = None;
            } else {
                let smoothed = DELAY_SMOOTHING * gap.as_secs_f64()
                    + (1.0 - DELAY_SMOOTHING) * self.inter_buffer_delay.as_secs_f64();
                self.inter_buffer_delay = Duration::from_secs_f64(smoothed);
            }
        }
        self.last_fill = Some(now);
    }
}

/// Linear fade-in over the first `len` samples and fade-out over the
/// last `len`.
fn taper(buffer: &mut [f32], len: usize) {
    if len == 0 || buffer.len() < 2 * len {
        return;
    }
    let delta = 1.0 / len as f32;
    for j in 0..len {
        buffer[j] *= j as f32 * delta;
    }
    let tail = buffer.len() - len;
    for j in 0..len {
        buffer[tail + j] *= 1.0 - j as f32 * delta;
    }
}

/// Playback gate over the scheduler: start/stop and output volume.
pub struct StreamPlayer {
    scheduler: AudioScheduler,
    playing: bool,
    volume: f32,
    scaled: Vec<f32>,
}

impl StreamPlayer {
    pub fn new(sample_rate: u32, sink: BufferSink) -> StreamPlayer {
        StreamPlayer {
            scheduler: AudioScheduler::new(sample_rate, sink),
            playing: false,
            volume: 1.0,
            scaled: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
        self.scheduler.reset();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Feed demodulated samples; ignored while stopped.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if !self.playing {
            return;
        }
        if (self.volume - 1.0).abs() < f32::EPSILON {
            self.scheduler.add_samples(samples);
        } else {
            self.scaled.clear();
            self.scaled.extend(samples.iter().map(|s| s * self.volume));
            let scaled = std::mem::take(&mut self.scaled);
            self.scheduler.add_samples(&scaled);
            self.scaled = scaled;
        }
    }

    pub fn recycle(&mut self, buffer: Vec<f32>) {
        self.scheduler.recycle(buffer);
    }

    /// Rebuild playback buffers for a new sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.scheduler.set_sample_rate(sample_rate);
    }
}
