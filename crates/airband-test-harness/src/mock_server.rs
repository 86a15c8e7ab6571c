//! A scripted SpyServer for integration tests.
//!
//! Listens on an ephemeral local port, accepts a single client, records
//! every command frame the client sends, and streams whatever response
//! frames the test pushes. Frames can be fragmented into fixed-size
//! chunks to exercise the client's stream reassembly over a real socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// A command frame received from the client under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCommand {
    pub command_type: u32,
    pub args: Vec<u8>,
}

impl ReceivedCommand {
    /// First u32 of the args, for set-setting commands.
    pub fn setting(&self) -> Option<u32> {
        self.args.get(..4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Second u32 of the args, for set-setting commands.
    pub fn value(&self) -> Option<u32> {
        self.args.get(4..8).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Scripted server instance bound to an ephemeral local port.
pub struct MockSpyServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedCommand>>>,
    frames_tx: mpsc::UnboundedSender<Vec<u8>>,
    accept_task: JoinHandle<()>,
}

impl MockSpyServer {
    /// Start a server that writes responses unfragmented.
    pub async fn start() -> std::io::Result<MockSpyServer> {
        Self::start_with_chunk_size(None).await
    }

    /// Start a server that splits every queued frame into `chunk_size`
    /// byte writes with a short pause between them.
    pub async fn start_fragmented(chunk_size: usize) -> std::io::Result<MockSpyServer> {
        Self::start_with_chunk_size(Some(chunk_size)).await
    }

    async fn start_with_chunk_size(chunk_size: Option<usize>) -> std::io::Result<MockSpyServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let received_clone = Arc::clone(&received);
        let accept_task = tokio::spawn(async move {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    debug!(error = %e, "mock server accept failed");
                    return;
                }
            };
            debug!(%peer, "mock server accepted client");
            let (read_half, write_half) = stream.into_split();
            let reader = tokio::spawn(record_commands(read_half, received_clone));
            let writer = tokio::spawn(stream_frames(write_half, frames_rx, chunk_size));
            let _ = reader.await;
            writer.abort();
        });

        Ok(MockSpyServer {
            addr,
            received,
            frames_tx,
            accept_task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue raw bytes (a pre-built frame) for streaming to the client.
    pub fn push_frame(&self, bytes: Vec<u8>) {
        let _ = self.frames_tx.send(bytes);
    }

    /// Snapshot of every command received so far.
    pub async fn received_commands(&self) -> Vec<ReceivedCommand> {
        self.received.lock().await.clone()
    }

    /// Wait until a command of the given type has arrived, up to `timeout`.
    pub async fn wait_for_command(
        &self,
        command_type: u32,
        timeout: Duration,
    ) -> Option<ReceivedCommand> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(cmd) = self
                .received
                .lock()
                .await
                .iter()
                .find(|c| c.command_type == command_type)
            {
                return Some(cmd.clone());
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until a set-setting command for `setting` has arrived.
    pub async fn wait_for_setting(&self, setting: u32, timeout: Duration) -> Option<u32> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(value) = self
                .received
                .lock()
                .await
                .iter()
                .filter(|c| c.command_type == 2)
                .find(|c| c.setting() == Some(setting))
                .and_then(|c| c.value())
            {
                return Some(value);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Drop for MockSpyServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn record_commands(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    received: Arc<Mutex<Vec<ReceivedCommand>>>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match read_half.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);

        // Command framing: [type: u32][args_len: u32][args].
        while buffer.len() >= 8 {
            let command_type = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
            let args_len =
                u32::from_le_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]) as usize;
            if buffer.len() < 8 + args_len {
                break;
            }
            let args = buffer[8..8 + args_len].to_vec();
            buffer.drain(..8 + args_len);
            debug!(command_type, args_len, "mock server recorded command");
            received.lock().await.push(ReceivedCommand { command_type, args });
        }
    }
}

async fn stream_frames(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut frames_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    chunk_size: Option<usize>,
) {
    while let Some(frame) = frames_rx.recv().await {
        match chunk_size {
            None => {
                if write_half.write_all(&frame).await.is_err() {
                    return;
                }
            }
            Some(size) => {
                for chunk in frame.chunks(size.max(1)) {
                    if write_half.write_all(chunk).await.is_err() {
                        return;
                    }
                    if write_half.flush().await.is_err() {
                        return;
                    }
                    // Give the client a chance to read each chunk as a
                    // separate segment.
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }
        if write_half.flush().await.is_err() {
            return;
        }
    }
}
