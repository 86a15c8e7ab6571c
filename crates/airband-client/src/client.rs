//! The SpyServer session.
//!
//! [`SpyServerClient`] drives one connection: it sends the hello
//! handshake, negotiates stream rates when device info arrives, keeps a
//! mirror of the server's receiver state from client sync messages, and
//! fans incoming sample payloads out to registered watchers.
//!
//! Two background tasks own the transport halves. The read loop
//! reassembles frames and dispatches them through the shared
//! [`MessageDecoder`]; the write loop drains a command queue, so state
//! watchers running on the read path can themselves queue commands
//! without deadlocking on the socket.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use airband_core::{Error, Result, SessionEvent, Transport};
use airband_proto::{
    encode_hello, encode_set, encode_sync_request, stream_mode, ClientSync, ClientSyncWatcher,
    DeviceInfo, DeviceInfoWatcher, FrameAssembler, MessageDecoder, SampleWatcher, Setting,
    StreamFormat,
};

/// Notified when the negotiated IQ sample rate is established or changes.
pub type SampleRateWatcher = Box<dyn FnMut(u32) + Send>;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Identifier sent in the hello command.
    pub client_id: String,
    /// Requested IQ sample rate; the nearest legal rate at or above this
    /// is negotiated once device info arrives.
    pub iq_sample_rate: u32,
    /// Requested FFT sample rate, negotiated the same way.
    pub fft_sample_rate: u32,
    /// FFT bin count requested from the server.
    pub fft_display_pixels: u32,
    /// dB offset applied to FFT magnitudes server-side.
    pub fft_db_offset: u32,
    /// dB range mapped onto the 8-bit FFT magnitude scale.
    pub fft_db_range: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            client_id: concat!("airband ", env!("CARGO_PKG_VERSION")).to_string(),
            iq_sample_rate: 9375,
            fft_sample_rate: 37500,
            fft_display_pixels: 512,
            fft_db_offset: 0,
            fft_db_range: 127,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    device_info: Option<DeviceInfo>,
    sync: Option<ClientSync>,
    centre_frequency: u32,
}

/// One SpyServer connection.
pub struct SpyServerClient {
    command_tx: mpsc::UnboundedSender<Vec<u8>>,
    decoder: Arc<Mutex<MessageDecoder>>,
    state: Arc<Mutex<SessionState>>,
    rate_watchers: Arc<Mutex<RateWatchers>>,
    events: broadcast::Sender<SessionEvent>,
    connected: Arc<AtomicBool>,
    iq_sample_rate: Arc<AtomicU32>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Default)]
struct RateWatchers {
    watchers: Vec<SampleRateWatcher>,
    current: Option<u32>,
}

impl RateWatchers {
    fn notify(&mut self, rate: u32) {
        self.current = Some(rate);
        for watcher in &mut self.watchers {
            watcher(rate);
        }
    }
}

impl SpyServerClient {
    /// Open a session over the given transport.
    ///
    /// Sends the hello command and initial stream settings, then spawns
    /// the read and write loops. Watchers registered before
    /// [`start_streaming`](Self::start_streaming) see every sample frame.
    pub async fn connect(
        transport: Box<dyn Transport>,
        options: ClientOptions,
    ) -> Result<Arc<SpyServerClient>> {
        let (reader, writer) = transport.into_split();
        let (command_tx, command_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        let client = Arc::new(SpyServerClient {
            command_tx,
            decoder: Arc::new(Mutex::new(MessageDecoder::new())),
            state: Arc::new(Mutex::new(SessionState::default())),
            rate_watchers: Arc::new(Mutex::new(RateWatchers::default())),
            events,
            connected,
            iq_sample_rate: Arc::new(AtomicU32::new(options.iq_sample_rate)),
            tasks: Mutex::new(Vec::new()),
        });

        client.register_state_watchers(&options);
        client.send_handshake(&options)?;

        let write_task = tokio::spawn(write_loop(
            writer,
            command_rx,
            Arc::clone(&client.connected),
            client.events.clone(),
        ));
        let read_task = tokio::spawn(read_loop(
            reader,
            Arc::clone(&client.decoder),
            Arc::clone(&client.connected),
            client.events.clone(),
        ));
        if let Ok(mut tasks) = client.tasks.lock() {
            tasks.push(write_task);
            tasks.push(read_task);
        }

        let _ = client.events.send(SessionEvent::Connected);
        info!(client_id = %options.client_id, "spyserver session opened");
        Ok(client)
    }

    fn send_handshake(&self, options: &ClientOptions) -> Result<()> {
        self.queue(encode_hello(&options.client_id))?;
        self.queue(encode_set(Setting::StreamingMode, stream_mode::FFT_IQ))?;
        self.queue(encode_set(Setting::IqFormat, StreamFormat::Uint8 as u32))?;
        self.queue(encode_set(Setting::FftFormat, StreamFormat::Uint8 as u32))?;
        self.queue(encode_set(Setting::FftDbOffset, options.fft_db_offset))?;
        self.queue(encode_set(Setting::FftDbRange, options.fft_db_range))?;
        self.queue(encode_set(
            Setting::FftDisplayPixels,
            options.fft_display_pixels,
        ))?;
        Ok(())
    }

    /// Install the watchers that react to server state: rate negotiation
    /// on device info, state mirroring on client sync.
    fn register_state_watchers(self: &Arc<Self>, options: &ClientOptions) {
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let command_tx = self.command_tx.clone();
        let rate_watchers = Arc::clone(&self.rate_watchers);
        let iq_rate = Arc::clone(&self.iq_sample_rate);
        let desired_iq = options.iq_sample_rate;
        let desired_fft = options.fft_sample_rate;

        self.with_decoder(|decoder| {
            decoder.watch_device_info(Box::new(move |info| {
                let iq = negotiate_rate(info, desired_iq);
                let fft = negotiate_rate(info, desired_fft);
                debug!(
                    iq_rate = iq.rate,
                    iq_decimation = iq.decimation,
                    fft_rate = fft.rate,
                    fft_decimation = fft.decimation,
                    "stream rates negotiated"
                );
                let _ = command_tx.send(encode_set(Setting::IqDecimation, iq.decimation));
                let _ = command_tx.send(encode_set(Setting::FftDecimation, fft.decimation));

                iq_rate.store(iq.rate, Ordering::SeqCst);
                if let Ok(mut state) = state.lock() {
                    state.device_info = Some(info.clone());
                }
                if let Ok(mut watchers) = rate_watchers.lock() {
                    watchers.notify(iq.rate);
                }
                let _ = events.send(SessionEvent::DeviceReady {
                    max_sample_rate: info.max_sample_rate,
                    decimation_stages: info.decimation_stages,
                });
                let _ = events.send(SessionEvent::SampleRateChanged { sample_rate: iq.rate });
            }));
        });

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        self.with_decoder(|decoder| {
            decoder.watch_client_sync(Box::new(move |sync| {
                if let Ok(mut state) = state.lock() {
                    state.sync = Some(sync.clone());
                    state.centre_frequency = sync.device_centre_frequency;
                }
                let _ = events.send(SessionEvent::Synced {
                    gain: sync.gain,
                    centre_frequency: sync.device_centre_frequency,
                });
            }));
        });
    }

    fn with_decoder(&self, f: impl FnOnce(&mut MessageDecoder)) {
        if let Ok(mut decoder) = self.decoder.lock() {
            f(&mut decoder);
        }
    }

    fn queue(&self, command: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.command_tx
            .send(command)
            .map_err(|_| Error::NotConnected)
    }

    /// Subscribe to session lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Latest device info, if it has arrived.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.state.lock().ok().and_then(|s| s.device_info.clone())
    }

    /// Latest receiver state mirror, if a sync has arrived.
    pub fn receiver_state(&self) -> Option<ClientSync> {
        self.state.lock().ok().and_then(|s| s.sync.clone())
    }

    /// The negotiated IQ sample rate (the requested rate until device
    /// info arrives).
    pub fn iq_sample_rate(&self) -> u32 {
        self.iq_sample_rate.load(Ordering::SeqCst)
    }

    pub fn watch_device_info(&self, watcher: DeviceInfoWatcher) {
        self.with_decoder(|d| d.watch_device_info(watcher));
    }

    pub fn watch_client_sync(&self, watcher: ClientSyncWatcher) {
        self.with_decoder(|d| d.watch_client_sync(watcher));
    }

    pub fn watch_iq(&self, watcher: SampleWatcher) {
        self.with_decoder(|d| d.watch_iq(watcher));
    }

    pub fn watch_fft(&self, watcher: SampleWatcher) {
        self.with_decoder(|d| d.watch_fft(watcher));
    }

    /// Watch the negotiated IQ sample rate. If negotiation has already
    /// happened the watcher fires immediately with the current rate.
    pub fn watch_iq_sample_rate(&self, mut watcher: SampleRateWatcher) {
        if let Ok(mut watchers) = self.rate_watchers.lock() {
            if let Some(rate) = watchers.current {
                watcher(rate);
            }
            watchers.watchers.push(watcher);
        }
    }

    /// Retune both the FFT and IQ channels and request a state sync.
    pub fn set_centre_frequency(&self, freq_hz: u32) -> Result<()> {
        debug!(freq_hz, "set centre frequency");
        self.queue(encode_set(Setting::FftFrequency, freq_hz))?;
        self.queue(encode_set(Setting::IqFrequency, freq_hz))?;
        for command in encode_sync_request() {
            self.queue(command)?;
        }
        if let Ok(mut state) = self.state.lock() {
            state.centre_frequency = freq_hz;
        }
        Ok(())
    }

    /// Set the RF gain, rounded to the nearest integer step.
    pub fn set_gain(&self, gain: f32) -> Result<()> {
        let rounded = gain.round().max(0.0) as u32;
        debug!(gain, rounded, "set gain");
        self.queue(encode_set(Setting::Gain, rounded))
    }

    /// Request a specific IQ sample rate. Must be one of the rates the
    /// device offers; fails before device info has arrived.
    pub fn set_iq_sample_rate(&self, rate: u32) -> Result<()> {
        let decimation = self.decimation_for(rate)?;
        self.queue(encode_set(Setting::IqDecimation, decimation))?;
        self.iq_sample_rate.store(rate, Ordering::SeqCst);
        if let Ok(mut watchers) = self.rate_watchers.lock() {
            watchers.notify(rate);
        }
        let _ = self
            .events
            .send(SessionEvent::SampleRateChanged { sample_rate: rate });
        Ok(())
    }

    /// Request a specific FFT sample rate, validated the same way.
    pub fn set_fft_sample_rate(&self, rate: u32) -> Result<()> {
        let decimation = self.decimation_for(rate)?;
        self.queue(encode_set(Setting::FftDecimation, decimation))
    }

    fn decimation_for(&self, rate: u32) -> Result<u32> {
        let info = self.device_info().ok_or(Error::NotConnected)?;
        let stage = info
            .available_sample_rates()
            .iter()
            .position(|&r| r == rate)
            .ok_or_else(|| {
                Error::InvalidParameter(format!("sample rate {} not offered by device", rate))
            })?;
        Ok(stage as u32)
    }

    /// Enable sample streaming.
    pub fn start_streaming(&self) -> Result<()> {
        info!("streaming enabled");
        self.queue(encode_set(Setting::StreamingEnabled, 1))
    }

    /// Disable sample streaming; the session stays open.
    pub fn stop_streaming(&self) -> Result<()> {
        info!("streaming disabled");
        self.queue(encode_set(Setting::StreamingEnabled, 0))
    }

    /// Tear the session down and stop the background tasks.
    pub async fn disconnect(&self) {
        if self.is_connected() {
            let _ = self.stop_streaming();
        }
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        let _ = self.events.send(SessionEvent::Disconnected);
        info!("spyserver session closed");
    }
}

struct NegotiatedRate {
    rate: u32,
    decimation: u32,
}

/// Choose the slowest device rate at or above `desired`.
///
/// Rates run fastest-first, so scanning the reversed list finds the
/// closest match from below. A request above every available rate falls
/// back to the device maximum.
fn negotiate_rate(info: &DeviceInfo, desired: u32) -> NegotiatedRate {
    let rates = info.available_sample_rates();
    let rate = rates
        .iter()
        .rev()
        .copied()
        .find(|&r| r >= desired)
        .unwrap_or(info.max_sample_rate);
    let decimation = rates.iter().position(|&r| r == rate).unwrap_or(0) as u32;
    NegotiatedRate { rate, decimation }
}

async fn read_loop(
    mut reader: airband_core::TransportReader,
    decoder: Arc<Mutex<MessageDecoder>>,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<SessionEvent>,
) {
    let mut assembler = FrameAssembler::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let failure = 'session: loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break 'session Error::ConnectionLost,
            Ok(n) => n,
            Err(e) => break 'session Error::from(e),
        };
        assembler.extend(&chunk[..n]);

        loop {
            match assembler.next_frame() {
                Ok(Some(frame)) => {
                    let dispatched = match decoder.lock() {
                        Ok(mut decoder) => decoder.dispatch(&frame),
                        Err(_) => break,
                    };
                    if let Err(e) = dispatched {
                        warn!(error = %e, "dropping undecodable frame");
                    }
                }
                Ok(None) => break,
                // The stream cannot be resynchronized after a framing
                // error.
                Err(e) => break 'session e,
            }
        }
    };

    if connected.swap(false, Ordering::SeqCst) {
        error!(error = %failure, "read loop terminated");
        let _ = events.send(SessionEvent::Error {
            message: failure.to_string(),
        });
        let _ = events.send(SessionEvent::Disconnected);
    }
}

async fn write_loop(
    mut writer: airband_core::TransportWriter,
    mut command_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<SessionEvent>,
) {
    while let Some(command) = command_rx.recv().await {
        let result = async {
            writer.write_all(&command).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            if connected.swap(false, Ordering::SeqCst) {
                error!(error = %e, "command write failed");
                let _ = events.send(SessionEvent::Error {
                    message: e.to_string(),
                });
                let _ = events.send(SessionEvent::Disconnected);
            }
            return;
        }
    }
}
