//! Error types for mywire operations.
//!
//! The taxonomy follows the fate of the connection: `Io`, `Protocol` and
//! `Handshake` errors poison the connection and the caller must discard
//! it, while a `Server` error is an ordinary server-side rejection and
//! the connection stays usable.

use std::fmt;

/// The primary error type for all mywire operations.
#[derive(Debug)]
pub enum Error {
    /// Transport failure. Always fatal to the connection.
    Io(std::io::Error),
    /// Wire format violation (malformed or unexpected packet). Fatal.
    Protocol(ProtocolError),
    /// Decoded ERR packet from the server. The connection remains usable.
    Server(ServerError),
    /// Authentication failed or negotiation exceeded its bounds. Fatal.
    Handshake(HandshakeError),
    /// Invalid connection configuration.
    Config(ConfigError),
}

/// A wire-level protocol violation.
#[derive(Debug)]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// Packet payload was truncated or otherwise unparseable.
    MalformedPacket,
    /// A well-formed packet arrived where the protocol does not allow it.
    UnexpectedPacket,
}

/// A decoded server ERR packet.
///
/// Carries the server's error code, five-character SQLSTATE (empty when
/// the server predates protocol 4.1 markers) and message unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: u16,
    pub sql_state: String,
    pub message: String,
}

impl ServerError {
    /// Check if this is a unique constraint violation (ER_DUP_ENTRY).
    pub fn is_duplicate_key(&self) -> bool {
        self.code == 1062
    }

    /// Check if this is a foreign key constraint violation.
    pub fn is_foreign_key_violation(&self) -> bool {
        self.code == 1451 || self.code == 1452
    }

    /// Check if this is an access-denied error (ER_ACCESS_DENIED_ERROR).
    pub fn is_access_denied(&self) -> bool {
        self.code == 1045
    }
}

/// A failure while driving the handshake state machine.
#[derive(Debug)]
pub struct HandshakeError {
    pub kind: HandshakeErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeErrorKind {
    /// The server greeting announced a protocol version we do not speak.
    UnsupportedProtocol,
    /// The server greeting could not be parsed.
    MalformedGreeting,
    /// The server kept requesting auth plugin switches past the bound.
    AuthSwitchLimit,
    /// The negotiated auth path needs a secure channel we do not have.
    InsecureAuth,
    /// Authentication was rejected in a way that is not a server ERR.
    AuthFailed,
}

/// Invalid connection configuration (bad address, unsupported option).
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl Error {
    /// Errors after which the connection must be closed and discarded.
    ///
    /// Only a `Server` error leaves the packet stream in a known state.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Server(_))
    }

    /// The server error code, if this is a decoded ERR packet.
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Error::Server(e) => Some(e.code),
            _ => None,
        }
    }

    /// The SQLSTATE, if this is a decoded ERR packet with one.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Error::Server(e) if !e.sql_state.is_empty() => Some(&e.sql_state),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "protocol error: {}", e),
            Error::Server(e) => write!(f, "server error: {}", e),
            Error::Handshake(e) => write!(f, "handshake error: {}", e),
            Error::Config(e) => write!(f, "configuration error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ProtocolErrorKind::MalformedPacket => write!(f, "malformed packet: {}", self.message),
            ProtocolErrorKind::UnexpectedPacket => write!(f, "unexpected packet: {}", self.message),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sql_state.is_empty() {
            write!(f, "ERROR {}: {}", self.code, self.message)
        } else {
            write!(f, "ERROR {} ({}): {}", self.code, self.sql_state, self.message)
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for mywire operations.
pub type Result<T> = std::result::Result<T, Error>;
