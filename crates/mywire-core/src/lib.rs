//! Shared types for the mywire MySQL client.
//!
//! This crate holds the pieces that have no wire-protocol knowledge of
//! their own:
//!
//! - the error taxonomy (`Error` and its per-category payloads)
//! - `Value`, the dynamically typed cell value
//! - `Row` and `ColumnInfo`, the result-row representation

pub mod error;
pub mod row;
pub mod value;

pub use error::{
    ConfigError, Error, HandshakeError, HandshakeErrorKind, ProtocolError, ProtocolErrorKind,
    Result, ServerError,
};
pub use row::{ColumnInfo, Row};
pub use value::Value;
