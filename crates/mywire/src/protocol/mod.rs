//! MySQL client/server wire protocol.
//!
//! Every packet carries a 4-byte header: a 3-byte little-endian payload
//! length and a 1-byte sequence number. Payloads of 2^24 - 1 bytes or
//! more are split across frames; the packet channel reassembles them.

pub mod handshake;
pub mod reader;
pub mod writer;

pub use reader::PacketReader;
pub use writer::PacketWriter;

use mywire_core::{ProtocolError, ProtocolErrorKind, ServerError};

/// Maximum payload carried by a single frame (2^24 - 1 bytes).
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FF_FF;

/// Client/server capability flags negotiated during the handshake.
pub mod capability {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_COMPRESS: u32 = 1 << 5;
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PS_MULTI_RESULTS: u32 = 1 << 18;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_CONNECT_ATTRS: u32 = 1 << 20;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Capabilities this client always offers.
    ///
    /// `CLIENT_DEPRECATE_EOF` is deliberately absent: result sets are
    /// terminated by classic EOF packets, which keeps the terminator
    /// classification in one place.
    pub const DEFAULT_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41
        | CLIENT_LONG_PASSWORD
        | CLIENT_SECURE_CONNECTION
        | CLIENT_TRANSACTIONS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA;

    /// Capabilities that are sent even when the server does not
    /// advertise them.
    pub const MANDATORY_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41 | CLIENT_LONG_PASSWORD;
}

/// Server status flags carried in OK and EOF packets.
pub mod status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
    pub const SERVER_STATUS_CURSOR_EXISTS: u16 = 0x0040;
    pub const SERVER_STATUS_LAST_ROW_SENT: u16 = 0x0080;
    pub const SERVER_SESSION_STATE_CHANGED: u16 = 0x4000;
}

/// Collation ids used in the handshake and column metadata.
pub mod collation {
    pub const UTF8_GENERAL_CI: u8 = 33;
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    pub const BINARY: u8 = 63;
    pub const UTF8MB4_0900_AI_CI: u8 = 255;

    /// Collation offered in the handshake response.
    pub const DEFAULT_COLLATION: u8 = UTF8MB4_GENERAL_CI;
}

/// Command opcodes this client sends (COM_xxx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Close the connection
    Quit = 0x01,
    /// Switch the default database
    InitDb = 0x02,
    /// Text protocol query
    Query = 0x03,
    /// List columns of a table (legacy)
    FieldList = 0x04,
    /// Liveness check
    Ping = 0x0e,
    /// Prepare a statement
    StmtPrepare = 0x16,
    /// Execute a prepared statement
    StmtExecute = 0x17,
    /// Close a prepared statement
    StmtClose = 0x19,
}

/// A frame header: 3-byte little-endian payload length + sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_len: u32,
    pub sequence: u8,
}

impl PacketHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 4;

    /// Decode a header from its 4 raw bytes.
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        Self {
            payload_len: u32::from(bytes[0])
                | (u32::from(bytes[1]) << 8)
                | (u32::from(bytes[2]) << 16),
            sequence: bytes[3],
        }
    }

    /// Encode the header to 4 bytes.
    pub fn to_bytes(self) -> [u8; 4] {
        [
            (self.payload_len & 0xFF) as u8,
            ((self.payload_len >> 8) & 0xFF) as u8,
            ((self.payload_len >> 16) & 0xFF) as u8,
            self.sequence,
        ]
    }
}

/// Classification of a server response payload.
///
/// Exactly one tag applies per packet. The length is checked before the
/// header byte: a long payload starting 0xFE is result-set data (an
/// 8-byte length-encoded integer), never an EOF packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// OK packet (0x00)
    Ok,
    /// ERR packet (0xFF)
    Err,
    /// EOF packet (0xFE, payload shorter than 9 bytes)
    Eof,
    /// Auth switch request (0xFE during authentication)
    AuthSwitch,
    /// LOCAL INFILE request (0xFB)
    LocalInfile,
    /// Anything else: column count, field descriptor, row data
    Data,
}

/// Classify a command-phase response payload.
pub fn classify(payload: &[u8]) -> ResponseKind {
    match payload.first() {
        Some(0x00) => ResponseKind::Ok,
        Some(0xFF) => ResponseKind::Err,
        Some(0xFE) if payload.len() < 9 => ResponseKind::Eof,
        Some(0xFB) => ResponseKind::LocalInfile,
        _ => ResponseKind::Data,
    }
}

/// Classify an authentication-phase response payload.
///
/// During authentication a 0xFE packet of any length is an auth switch
/// request, not an EOF or a row.
pub fn classify_auth(payload: &[u8]) -> ResponseKind {
    match payload.first() {
        Some(0xFE) => ResponseKind::AuthSwitch,
        _ => classify(payload),
    }
}

/// Decoded OK packet.
#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

/// Decoded EOF packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}

pub(crate) fn malformed(message: impl Into<String>) -> ProtocolError {
    ProtocolError {
        kind: ProtocolErrorKind::MalformedPacket,
        message: message.into(),
    }
}

pub(crate) fn unexpected(message: impl Into<String>) -> ProtocolError {
    ProtocolError {
        kind: ProtocolErrorKind::UnexpectedPacket,
        message: message.into(),
    }
}

/// Parse an OK packet payload (protocol 4.1 layout).
///
/// Layout: 0x00 marker, affected rows (lenenc), last insert id (lenenc),
/// status flags (2), warnings (2), optional info string.
pub fn parse_ok(payload: &[u8]) -> Result<OkPacket, ProtocolError> {
    let mut reader = PacketReader::new(payload);
    if reader.read_u8() != Some(0x00) {
        return Err(unexpected("OK packet does not start with 0x00"));
    }
    let affected_rows = reader
        .read_lenenc_int()
        .ok_or_else(|| malformed("OK packet missing affected rows"))?;
    let last_insert_id = reader
        .read_lenenc_int()
        .ok_or_else(|| malformed("OK packet missing last insert id"))?;
    let status_flags = reader
        .read_u16_le()
        .ok_or_else(|| malformed("OK packet missing status flags"))?;
    let warnings = reader
        .read_u16_le()
        .ok_or_else(|| malformed("OK packet missing warning count"))?;
    let info = reader.read_rest_string();
    Ok(OkPacket {
        affected_rows,
        last_insert_id,
        status_flags,
        warnings,
        info,
    })
}

/// Parse an ERR packet payload into the server error it carries.
///
/// Layout: 0xFF marker, error code (2), optional '#' + 5-byte SQLSTATE,
/// message.
pub fn parse_err(payload: &[u8]) -> Result<ServerError, ProtocolError> {
    let mut reader = PacketReader::new(payload);
    if reader.read_u8() != Some(0xFF) {
        return Err(unexpected("ERR packet does not start with 0xFF"));
    }
    let code = reader
        .read_u16_le()
        .ok_or_else(|| malformed("ERR packet missing error code"))?;
    let sql_state = if reader.peek() == Some(b'#') {
        reader.skip(1);
        reader
            .read_string(5)
            .ok_or_else(|| malformed("ERR packet truncated SQLSTATE"))?
    } else {
        String::new()
    };
    let message = reader.read_rest_string();
    Ok(ServerError {
        code,
        sql_state,
        message,
    })
}

/// Parse an EOF packet payload.
///
/// Layout: 0xFE marker, warnings (2), status flags (2). A bare one-byte
/// 0xFE (pre-4.1 server) decodes with zeroed fields.
pub fn parse_eof(payload: &[u8]) -> Result<EofPacket, ProtocolError> {
    let mut reader = PacketReader::new(payload);
    if reader.read_u8() != Some(0xFE) {
        return Err(unexpected("EOF packet does not start with 0xFE"));
    }
    if reader.is_empty() {
        return Ok(EofPacket::default());
    }
    let warnings = reader
        .read_u16_le()
        .ok_or_else(|| malformed("EOF packet truncated warning count"))?;
    let status_flags = reader
        .read_u16_le()
        .ok_or_else(|| malformed("EOF packet truncated status flags"))?;
    Ok(EofPacket {
        warnings,
        status_flags,
    })
}
