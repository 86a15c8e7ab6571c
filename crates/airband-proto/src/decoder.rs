//! Message dispatch.
//!
//! [`MessageDecoder`] routes complete frames to interested watchers. The
//! status messages (device info, client sync) are parsed and cached here;
//! sample payloads are handed out raw so the signal chain can choose its
//! own representation.

use std::collections::HashSet;

use airband_core::Result;
use tracing::{debug, warn};

use crate::client_sync::ClientSync;
use crate::device_info::DeviceInfo;
use crate::framing::Frame;
use crate::header::{MessageHeader, MessageType};

/// Watcher for parsed device info messages.
pub type DeviceInfoWatcher = Box<dyn FnMut(&DeviceInfo) + Send>;
/// Watcher for parsed client sync messages.
pub type ClientSyncWatcher = Box<dyn FnMut(&ClientSync) + Send>;
/// Watcher for raw sample payloads, with the frame header for context.
pub type SampleWatcher = Box<dyn FnMut(&MessageHeader, &[u8]) + Send>;

/// Decodes frames and fans them out to registered watchers.
///
/// Watchers are invoked in registration order. The most recent device
/// info and client sync are cached so late registrants and synchronous
/// queries can see state that arrived before them.
#[derive(Default)]
pub struct MessageDecoder {
    device_info_watchers: Vec<DeviceInfoWatcher>,
    client_sync_watchers: Vec<ClientSyncWatcher>,
    iq_watchers: Vec<SampleWatcher>,
    fft_watchers: Vec<SampleWatcher>,
    device_info: Option<DeviceInfo>,
    client_sync: Option<ClientSync>,
    unknown_types_seen: HashSet<u32>,
}

impl MessageDecoder {
    pub fn new() -> MessageDecoder {
        MessageDecoder::default()
    }

    /// Register a device info watcher.
    ///
    /// If device info has already arrived, the watcher is called
    /// immediately with the cached value.
    pub fn watch_device_info(&mut self, mut watcher: DeviceInfoWatcher) {
        if let Some(info) = &self.device_info {
            watcher(info);
        }
        self.device_info_watchers.push(watcher);
    }

    /// Register a client sync watcher, replayed with the cached state if
    /// one has already arrived.
    pub fn watch_client_sync(&mut self, mut watcher: ClientSyncWatcher) {
        if let Some(sync) = &self.client_sync {
            watcher(sync);
        }
        self.client_sync_watchers.push(watcher);
    }

    /// Register a watcher for unsigned 8-bit IQ payloads.
    pub fn watch_iq(&mut self, watcher: SampleWatcher) {
        self.iq_watchers.push(watcher);
    }

    /// Register a watcher for unsigned 8-bit FFT payloads.
    pub fn watch_fft(&mut self, watcher: SampleWatcher) {
        self.fft_watchers.push(watcher);
    }

    /// Most recent device info, if any has arrived.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    /// Most recent client sync, if any has arrived.
    pub fn client_sync(&self) -> Option<&ClientSync> {
        self.client_sync.as_ref()
    }

    /// Decode one frame and dispatch it.
    ///
    /// Parse failures on status messages are returned to the caller;
    /// unknown message types are logged once per type id and otherwise
    /// ignored so protocol growth does not break the session.
    pub fn dispatch(&mut self, frame: &Frame) -> Result<()> {
        match frame.header.message_type {
            MessageType::DeviceInfo => {
                let info = DeviceInfo::parse(&frame.payload)?;
                debug!(
                    device_type = ?info.device_type,
                    max_sample_rate = info.max_sample_rate,
                    decimation_stages = info.decimation_stages,
                    "device info received"
                );
                for watcher in &mut self.device_info_watchers {
                    watcher(&info);
                }
                self.device_info = Some(info);
            }
            MessageType::ClientSync => {
                let sync = ClientSync::parse(&frame.payload)?;
                debug!(
                    gain = sync.gain,
                    iq_centre_frequency = sync.iq_centre_frequency,
                    can_control = sync.can_control,
                    "client sync received"
                );
                for watcher in &mut self.client_sync_watchers {
                    watcher(&sync);
                }
                self.client_sync = Some(sync);
            }
            MessageType::Uint8Iq => {
                for watcher in &mut self.iq_watchers {
                    watcher(&frame.header, &frame.payload);
                }
            }
            MessageType::Uint8Fft => {
                for watcher in &mut self.fft_watchers {
                    watcher(&frame.header, &frame.payload);
                }
            }
            MessageType::Pong | MessageType::ReadSetting => {
                debug!(message_type = ?frame.header.message_type, "status reply ignored");
            }
            other => {
                let raw = other.raw();
                if self.unknown_types_seen.insert(raw) {
                    warn!(message_type = raw, "unhandled message type");
                }
            }
        }
        Ok(())
    }
}
