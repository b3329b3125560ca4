//! Buffer builder for packet payloads.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{MAX_PAYLOAD_LEN, PacketHeader};

/// An append-only buffer with helpers for the protocol's encodings.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    /// Create a writer with a small default capacity.
    pub fn new() -> Self {
        Self::with_capacity(128)
    }

    /// Create a writer with a given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current payload length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrow the payload built so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, yielding the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Append a little-endian u16.
    pub fn write_u16_le(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian 3-byte integer.
    pub fn write_u24_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    /// Append a little-endian u32.
    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian u64.
    pub fn write_u64_le(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a length-encoded integer.
    pub fn write_lenenc_int(&mut self, value: u64) {
        if value < 251 {
            self.write_u8(value as u8);
        } else if value < 0x1_0000 {
            self.write_u8(0xFC);
            self.write_u16_le(value as u16);
        } else if value < 0x100_0000 {
            self.write_u8(0xFD);
            self.write_u24_le(value as u32);
        } else {
            self.write_u8(0xFE);
            self.write_u64_le(value);
        }
    }

    /// Append a length-encoded byte string.
    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.buf.extend_from_slice(data);
    }

    /// Append a length-encoded string.
    pub fn write_lenenc_string(&mut self, s: &str) {
        self.write_lenenc_bytes(s.as_bytes());
    }

    /// Append a NUL-terminated string.
    pub fn write_null_string(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Append `count` zero bytes.
    pub fn write_zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }
}

/// Frame a payload into one or more packets starting at `sequence`.
///
/// Payloads of `MAX_PAYLOAD_LEN` bytes or more are split; a chunk of
/// exactly `MAX_PAYLOAD_LEN` is followed by an empty frame so the reader
/// can tell the payload ended.
pub fn frame_payload(payload: &[u8], mut sequence: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + PacketHeader::SIZE);

    if payload.len() < MAX_PAYLOAD_LEN {
        let header = PacketHeader {
            payload_len: payload.len() as u32,
            sequence,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(payload);
        return out;
    }

    let mut offset = 0;
    loop {
        let chunk = (payload.len() - offset).min(MAX_PAYLOAD_LEN);
        let header = PacketHeader {
            payload_len: chunk as u32,
            sequence,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&payload[offset..offset + chunk]);
        offset += chunk;
        sequence = sequence.wrapping_add(1);
        if chunk < MAX_PAYLOAD_LEN {
            break;
        }
        if offset == payload.len() {
            // Terminating empty frame after an exactly-max chunk
            let header = PacketHeader {
                payload_len: 0,
                sequence,
            };
            out.extend_from_slice(&header.to_bytes());
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_writes() {
        let mut w = PacketWriter::new();
        w.write_u8(0x42);
        w.write_u16_le(0x1234);
        w.write_u24_le(0x0012_3456);
        w.write_u32_le(0x1234_5678);
        assert_eq!(
            w.as_bytes(),
            &[0x42, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12]
        );
    }

    #[test]
    fn lenenc_int_forms() {
        let mut w = PacketWriter::new();
        w.write_lenenc_int(0x42);
        assert_eq!(w.as_bytes(), &[0x42]);

        let mut w = PacketWriter::new();
        w.write_lenenc_int(0x1234);
        assert_eq!(w.as_bytes(), &[0xFC, 0x34, 0x12]);

        let mut w = PacketWriter::new();
        w.write_lenenc_int(0x0012_3456);
        assert_eq!(w.as_bytes(), &[0xFD, 0x56, 0x34, 0x12]);

        let mut w = PacketWriter::new();
        w.write_lenenc_int(0x0807_0605_0403_0201);
        assert_eq!(w.as_bytes(), &[0xFE, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn string_writes() {
        let mut w = PacketWriter::new();
        w.write_null_string("hello");
        w.write_lenenc_string("hi");
        assert_eq!(w.as_bytes(), b"hello\0\x02hi");
    }

    #[test]
    fn frame_small_payload() {
        let framed = frame_payload(b"hello", 1);
        assert_eq!(&framed[..4], &[0x05, 0x00, 0x00, 0x01]);
        assert_eq!(&framed[4..], b"hello");
    }

    #[test]
    fn frame_exactly_max_payload_appends_empty_frame() {
        let payload = vec![0xAB; MAX_PAYLOAD_LEN];
        let framed = frame_payload(&payload, 0);
        // First frame: full chunk
        assert_eq!(&framed[..4], &[0xFF, 0xFF, 0xFF, 0x00]);
        // Trailing empty frame with the next sequence id
        let tail = &framed[4 + MAX_PAYLOAD_LEN..];
        assert_eq!(tail, &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn frame_oversized_payload_splits() {
        let payload = vec![0xCD; MAX_PAYLOAD_LEN + 10];
        let framed = frame_payload(&payload, 0);
        assert_eq!(&framed[..4], &[0xFF, 0xFF, 0xFF, 0x00]);
        let second = &framed[4 + MAX_PAYLOAD_LEN..];
        assert_eq!(&second[..4], &[0x0A, 0x00, 0x00, 0x01]);
        assert_eq!(second[4..].len(), 10);
    }
}
