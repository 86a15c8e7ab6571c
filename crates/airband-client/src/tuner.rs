//! The receive pipeline behind the [`Tuner`] trait.
//!
//! [`SpyServerTuner`] hangs off a [`SpyServerClient`] session: it watches
//! the IQ and FFT streams, runs the demodulation chain per batch, keeps
//! the AGC loop fed, and republishes demodulated audio and
//! signal-present verdicts through registered handlers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use num_complex::Complex32;
use tracing::{debug, warn};

use airband_core::{AudioHandler, Error, Result, SampleRateHandler, SignalHandler, Tuner};
use airband_dsp::{
    decode_fft_u8, decode_iq_u8, low_pass, Agc, Discriminator, FirFilter, PhaseLockLoop,
    SpectralPeakDetector, Window,
};

use crate::client::SpyServerClient;

/// How a signal-present verdict is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquelchStrategy {
    /// Carrier lock: signal present while the PLL lock metric is below
    /// the squelch threshold. Suits AM voice with a carrier.
    PhaseLock,
    /// Spectrum watch: signal present while an FFT bin stands above the
    /// noise floor. Works for carrierless modes.
    SpectralPeak,
}

/// Demodulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemodMode {
    /// Coherent AM via the PLL, band-limited by the IQ low-pass pair.
    Am,
    /// FM via the derivative discriminator, unfiltered input.
    Fm,
}

/// Tuner configuration.
#[derive(Debug, Clone)]
pub struct TunerOptions {
    pub mode: DemodMode,
    pub strategy: SquelchStrategy,
    /// Lock-metric threshold below which the carrier counts as present.
    pub squelch: f32,
    /// Settle delay after a frequency change.
    pub settle: Duration,
}

impl Default for TunerOptions {
    fn default() -> Self {
        TunerOptions {
            mode: DemodMode::Am,
            strategy: SquelchStrategy::PhaseLock,
            squelch: 0.15,
            settle: Duration::from_millis(150),
        }
    }
}

const PLL_ALPHA: f32 = 0.04;
const FM_OUTPUT_GAIN: f32 = 0.1;
const AUDIO_FILTER_TAPS: usize = 32;
const AUDIO_FILTER_CUTOFF_HZ: f64 = 4000.0;
// Gain changes below this step are not worth a server round trip.
const GAIN_HYSTERESIS: f32 = 0.5;

struct Pipeline {
    mode: DemodMode,
    strategy: SquelchStrategy,
    squelch: f32,
    sample_rate: u32,
    filters: Option<(FirFilter, FirFilter)>,
    agc: Agc,
    pll: PhaseLockLoop,
    discriminator: Discriminator,
    detector: SpectralPeakDetector,
    last_sent_gain: f32,
    signal: bool,
    audio_handlers: Vec<AudioHandler>,
    rate_handlers: Vec<SampleRateHandler>,
    signal_handlers: Vec<SignalHandler>,
    scratch: Vec<Complex32>,
    audio: Vec<f32>,
}

impl Pipeline {
    fn new(options: &TunerOptions, sample_rate: u32, max_gain: u32) -> Pipeline {
        Pipeline {
            mode: options.mode,
            strategy: options.strategy,
            squelch: options.squelch,
            sample_rate,
            filters: build_filters(options.mode, sample_rate),
            agc: Agc::new(sample_rate, max_gain),
            pll: PhaseLockLoop::new(PLL_ALPHA),
            discriminator: Discriminator::new(),
            detector: SpectralPeakDetector::default(),
            last_sent_gain: f32::NAN,
            signal: false,
            audio_handlers: Vec::new(),
            rate_handlers: Vec::new(),
            signal_handlers: Vec::new(),
            scratch: Vec::new(),
            audio: Vec::new(),
        }
    }

    /// Rebuild the rate-dependent blocks, keeping handlers and gain.
    fn set_sample_rate(&mut self, sample_rate: u32, max_gain: u32) {
        let gain = self.agc.gain();
        self.sample_rate = sample_rate;
        self.filters = build_filters(self.mode, sample_rate);
        self.agc = Agc::new(sample_rate, max_gain);
        self.agc.reset(gain);
        self.pll.reset();
        self.detector.reset();
        for handler in &mut self.rate_handlers {
            handler(sample_rate);
        }
    }

    /// Clear tracking state after a retune.
    fn reset_tracking(&mut self) {
        self.pll.reset();
        self.detector.reset();
        self.discriminator.reset();
        if let Some((i, q)) = &mut self.filters {
            i.reset();
            q.reset();
        }
        self.signal = false;
    }

    /// Run one IQ batch through the chain. Returns the AGC gain to send
    /// to the server, if it moved past the hysteresis step.
    fn process_iq(&mut self, payload: &[u8]) -> Option<f32> {
        self.scratch = decode_iq_u8(payload);
        if self.scratch.is_empty() {
            return None;
        }

        if let Some((filter_i, filter_q)) = &mut self.filters {
            for sample in &mut self.scratch {
                sample.re = filter_i.process(sample.re);
                sample.im = filter_q.process(sample.im);
            }
        }

        let gain = self.agc.update(&self.scratch);
        let send_gain = if self.last_sent_gain.is_nan()
            || (gain - self.last_sent_gain).abs() > GAIN_HYSTERESIS
        {
            self.last_sent_gain = gain;
            Some(gain)
        } else {
            None
        };

        self.audio.clear();
        match self.mode {
            DemodMode::Am => {
                for &sample in &self.scratch {
                    self.audio.push(self.pll.process(sample).am);
                }
            }
            DemodMode::Fm => {
                for &sample in &self.scratch {
                    // The PLL still runs to keep the lock metric live for
                    // the squelch.
                    self.pll.process(sample);
                    self.audio.push(self.discriminator.process(sample) * FM_OUTPUT_GAIN);
                }
            }
        }

        self.signal = match self.strategy {
            SquelchStrategy::PhaseLock => self.pll.locked(self.squelch),
            SquelchStrategy::SpectralPeak => self.detector.signal_present(),
        };
        for handler in &mut self.signal_handlers {
            handler(self.signal);
        }

        // Squelch gate: keep the audio cadence but silence closed-squelch
        // batches so downstream buffers stay gapless.
        if self.mode == DemodMode::Am && !self.signal {
            self.audio.fill(0.0);
        }
        for handler in &mut self.audio_handlers {
            handler(&self.audio);
        }

        send_gain
    }

    fn process_fft(&mut self, payload: &[u8]) {
        if self.strategy == SquelchStrategy::SpectralPeak {
            let bins = decode_fft_u8(payload);
            self.detector.add_frame(&bins);
        }
    }
}

fn build_filters(mode: DemodMode, sample_rate: u32) -> Option<(FirFilter, FirFilter)> {
    if mode != DemodMode::Am {
        return None;
    }
    match low_pass(
        AUDIO_FILTER_TAPS,
        Window::BlackmanHarris,
        0.0,
        sample_rate as f64,
        AUDIO_FILTER_CUTOFF_HZ,
    ) {
        Ok(taps) => {
            let filter_i = FirFilter::new(taps.clone()).ok()?;
            let filter_q = FirFilter::new(taps).ok()?;
            Some((filter_i, filter_q))
        }
        Err(e) => {
            // Possible only while the sample rate is still the
            // pre-negotiation placeholder.
            warn!(error = %e, sample_rate, "audio filter design failed, filters disabled");
            None
        }
    }
}

/// Receive pipeline bound to a live session.
pub struct SpyServerTuner {
    client: Arc<SpyServerClient>,
    pipeline: Arc<Mutex<Pipeline>>,
    lock_bits: Arc<AtomicU32>,
    signal: Arc<AtomicBool>,
    max_gain: Arc<AtomicU32>,
    settle: Duration,
}

const DEFAULT_MAX_GAIN: u32 = 21;

impl SpyServerTuner {
    /// Attach a tuner to a session, registering its stream watchers.
    pub fn new(client: Arc<SpyServerClient>, options: TunerOptions) -> Arc<SpyServerTuner> {
        let pipeline = Arc::new(Mutex::new(Pipeline::new(
            &options,
            client.iq_sample_rate(),
            DEFAULT_MAX_GAIN,
        )));

        let tuner = Arc::new(SpyServerTuner {
            client: Arc::clone(&client),
            pipeline,
            lock_bits: Arc::new(AtomicU32::new(0.5f32.to_bits())),
            signal: Arc::new(AtomicBool::new(false)),
            max_gain: Arc::new(AtomicU32::new(DEFAULT_MAX_GAIN)),
            settle: options.settle,
        });

        // Gain ceiling: half the hardware range, which keeps the AGC out
        // of the overload region on strong airband transmitters.
        let max_gain = Arc::clone(&tuner.max_gain);
        let pipeline = Arc::clone(&tuner.pipeline);
        client.watch_device_info(Box::new(move |info| {
            let ceiling = info.max_gain.div_ceil(2);
            debug!(device_max = info.max_gain, ceiling, "gain ceiling set");
            max_gain.store(ceiling, Ordering::SeqCst);
            if let Ok(mut pipeline) = pipeline.lock() {
                pipeline.agc.set_max_gain(ceiling);
            }
        }));

        // Seed the gain loop from the server's authoritative value.
        let pipeline = Arc::clone(&tuner.pipeline);
        client.watch_client_sync(Box::new(move |sync| {
            if let Ok(mut pipeline) = pipeline.lock() {
                pipeline.agc.reset(sync.gain as f32);
                pipeline.last_sent_gain = sync.gain as f32;
            }
        }));

        let pipeline = Arc::clone(&tuner.pipeline);
        let max_gain = Arc::clone(&tuner.max_gain);
        client.watch_iq_sample_rate(Box::new(move |rate| {
            if let Ok(mut pipeline) = pipeline.lock() {
                pipeline.set_sample_rate(rate, max_gain.load(Ordering::SeqCst));
            }
        }));

        let pipeline = Arc::clone(&tuner.pipeline);
        let lock_bits = Arc::clone(&tuner.lock_bits);
        let signal = Arc::clone(&tuner.signal);
        // Weak: this closure lives inside the client's decoder, so a
        // strong handle here would keep the session alive forever.
        let iq_client = Arc::downgrade(&client);
        client.watch_iq(Box::new(move |_, payload| {
            let send_gain = match pipeline.lock() {
                Ok(mut pipeline) => {
                    let send_gain = pipeline.process_iq(payload);
                    lock_bits.store(pipeline.pll.lock().to_bits(), Ordering::SeqCst);
                    signal.store(pipeline.signal, Ordering::SeqCst);
                    send_gain
                }
                Err(_) => None,
            };
            if let Some(gain) = send_gain {
                if let Some(client) = iq_client.upgrade() {
                    if let Err(e) = client.set_gain(gain) {
                        warn!(error = %e, "gain update not sent");
                    }
                }
            }
        }));

        let pipeline = Arc::clone(&tuner.pipeline);
        client.watch_fft(Box::new(move |_, payload| {
            if let Ok(mut pipeline) = pipeline.lock() {
                pipeline.process_fft(payload);
            }
        }));

        tuner
    }

    /// Current PLL lock metric, for diagnostics.
    pub fn lock_metric(&self) -> f32 {
        f32::from_bits(self.lock_bits.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Tuner for SpyServerTuner {
    async fn tune(&self, freq_hz: u64) -> Result<()> {
        let freq = u32::try_from(freq_hz).map_err(|_| {
            Error::InvalidParameter(format!("frequency {} Hz exceeds the tuning range", freq_hz))
        })?;
        self.client.set_centre_frequency(freq)?;
        if let Ok(mut pipeline) = self.pipeline.lock() {
            pipeline.reset_tracking();
        }
        self.signal.store(false, Ordering::SeqCst);
        // Open-loop settle: the server does not acknowledge the retune,
        // so give the hardware and stream a moment to catch up.
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    fn signal_present(&self) -> bool {
        self.signal.load(Ordering::SeqCst)
    }

    fn set_max_gain(&self, max_gain: u32) {
        self.max_gain.store(max_gain, Ordering::SeqCst);
        if let Ok(mut pipeline) = self.pipeline.lock() {
            pipeline.agc.set_max_gain(max_gain);
        }
    }

    fn on_demodulated_audio(&self, handler: AudioHandler) {
        if let Ok(mut pipeline) = self.pipeline.lock() {
            pipeline.audio_handlers.push(handler);
        }
    }

    fn on_sample_rate_changed(&self, handler: SampleRateHandler) {
        if let Ok(mut pipeline) = self.pipeline.lock() {
            pipeline.rate_handlers.push(handler);
        }
    }

    fn on_signal_detected(&self, handler: SignalHandler) {
        if let Ok(mut pipeline) = self.pipeline.lock() {
            pipeline.signal_handlers.push(handler);
        }
    }
}
