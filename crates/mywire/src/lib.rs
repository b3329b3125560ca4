//! A from-scratch MySQL client wire protocol implementation.
//!
//! The crate speaks the client side of the protocol over a blocking
//! stream: the version-10 handshake with pluggable authentication, the
//! text and binary command protocols, and result set decoding.
//!
//! ```no_run
//! use mywire::{Config, Conn};
//!
//! # fn main() -> mywire::Result<()> {
//! let mut conn = Conn::connect(
//!     Config::new("127.0.0.1:3306")
//!         .user("app")
//!         .password("secret")
//!         .database("inventory"),
//! )?;
//!
//! let result = conn.execute("SELECT id, name FROM parts WHERE qty > ?", &[5.into()])?;
//! for row in result.rows() {
//!     println!("{:?} {:?}", row.get_i64("id"), row.get_str("name"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A connection is single-owner and runs one command at a time; there
//! is no pooling, TLS or async layer here.

pub mod auth;
pub mod config;
pub mod connection;
pub mod packet;
pub mod protocol;
pub mod result;
pub mod stmt;
pub mod transport;
pub mod types;

pub use config::{Config, SslMode};
pub use connection::Conn;
pub use result::{QueryResult, ResultSet};
pub use types::{Field, FieldType};

pub use mywire_core::{
    ColumnInfo, ConfigError, Error, HandshakeError, HandshakeErrorKind, ProtocolError,
    ProtocolErrorKind, Result, Row, ServerError, Value,
};
