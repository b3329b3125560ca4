//! Framed packet exchange over a transport.

use std::io::{Read, Write};

use tracing::trace;

use mywire_core::{Error, Result};

use crate::protocol::{MAX_PAYLOAD_LEN, PacketHeader, unexpected, writer::frame_payload};
use crate::transport::Transport;

/// Reads and writes protocol packets, tracking the sequence id.
///
/// One request/response exchange shares a sequence counter: commands go
/// out with sequence 0, every frame after increments by one. The
/// counter resets before each new command.
#[derive(Debug)]
pub struct PacketChannel {
    stream: Transport,
    sequence: u8,
}

impl PacketChannel {
    pub fn new(stream: Transport) -> Self {
        Self {
            stream,
            sequence: 0,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.stream
    }

    /// Start a new command exchange.
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
    }

    /// Read one logical packet, joining continuation frames.
    ///
    /// A frame of exactly 2^24 - 1 payload bytes is followed by more
    /// frames of the same packet, terminated by the first shorter one.
    pub fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let mut header_bytes = [0u8; PacketHeader::SIZE];
            self.stream.read_exact(&mut header_bytes).map_err(Error::Io)?;
            let header = PacketHeader::from_bytes(&header_bytes);

            if header.sequence != self.sequence {
                return Err(Error::Protocol(unexpected(format!(
                    "out-of-order packet: sequence {} where {} was expected",
                    header.sequence, self.sequence
                ))));
            }
            self.sequence = self.sequence.wrapping_add(1);

            let len = header.payload_len as usize;
            let start = payload.len();
            payload.resize(start + len, 0);
            self.stream
                .read_exact(&mut payload[start..])
                .map_err(Error::Io)?;

            if len < MAX_PAYLOAD_LEN {
                break;
            }
        }
        trace!(len = payload.len(), "read packet");
        Ok(payload)
    }

    /// Frame and send a payload, splitting when it exceeds the frame
    /// limit.
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let framed = frame_payload(payload, self.sequence);
        let frames = 1 + payload.len() / MAX_PAYLOAD_LEN;
        self.sequence = self.sequence.wrapping_add(frames as u8);

        self.stream.write_all(&framed).map_err(Error::Io)?;
        self.stream.flush().map_err(Error::Io)?;
        trace!(len = payload.len(), "wrote packet");
        Ok(())
    }

    /// Send a command payload, resetting the sequence first.
    pub fn write_command(&mut self, payload: &[u8]) -> Result<()> {
        self.reset_sequence();
        self.write_packet(payload)
    }
}
