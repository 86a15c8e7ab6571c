//! Byte stream reassembly.
//!
//! TCP delivers the server's messages in arbitrary chunks: a read may
//! contain half a header, several whole messages, or a header followed by
//! a partial payload. [`FrameAssembler`] buffers incoming bytes and yields
//! only complete header-plus-payload frames.

use airband_core::{Error, Result};
use bytes::{Buf, BytesMut};

use crate::header::{MessageHeader, HEADER_SIZE};

/// Upper bound on a sane payload length.
///
/// Real IQ and FFT payloads are tens of kilobytes at most. A length field
/// beyond this bound means the stream is corrupt or misaligned, so the
/// assembler fails hard rather than waiting forever for bytes that will
/// never arrive.
const MAX_PAYLOAD_SIZE: u32 = 1 << 24;

/// A complete message: parsed header plus raw payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

/// Incremental frame reassembler over a fragmented byte stream.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: BytesMut,
}

impl FrameAssembler {
    pub fn new() -> FrameAssembler {
        FrameAssembler {
            buffer: BytesMut::with_capacity(64 * 1024),
        }
    }

    /// Append newly received bytes to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Returns
    /// [`Error::Protocol`] when the buffered header carries an
    /// implausible payload length; the stream cannot be resynchronized
    /// after that and should be torn down.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = MessageHeader::parse(&self.buffer[..HEADER_SIZE])?;
        if header.length > MAX_PAYLOAD_SIZE {
            return Err(Error::Protocol(format!(
                "implausible payload length {} for message type {:?}",
                header.length, header.message_type
            )));
        }

        let total = HEADER_SIZE + header.length as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        self.buffer.advance(HEADER_SIZE);
        let payload = self.buffer.split_to(header.length as usize).to_vec();
        Ok(Some(Frame { header, payload }))
    }

    /// Bytes currently buffered awaiting a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
