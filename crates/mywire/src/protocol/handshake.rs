//! Handshake packets: the server greeting, the client response and the
//! auth switch request.

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;

use mywire_core::{HandshakeError, HandshakeErrorKind};

use crate::protocol::{PacketReader, PacketWriter, capability};

/// Protocol version this client speaks.
pub const PROTOCOL_VERSION: u8 = 10;

/// Parsed HandshakeV10 greeting.
#[derive(Debug, Clone)]
pub struct Greeting {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// Reassembled auth seed (both salt halves, trailing NUL stripped).
    pub salt: Vec<u8>,
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin: String,
}

fn malformed_greeting(message: impl Into<String>) -> HandshakeError {
    HandshakeError {
        kind: HandshakeErrorKind::MalformedGreeting,
        message: message.into(),
    }
}

impl Greeting {
    /// Parse a HandshakeV10 payload.
    ///
    /// The capability word is split across the packet: the low 16 bits
    /// come right after the first salt half, the high 16 bits after the
    /// status flags. Both halves of the salt are reassembled into one
    /// seed.
    pub fn parse(payload: &[u8]) -> Result<Self, HandshakeError> {
        let mut reader = PacketReader::new(payload);

        let protocol_version = reader
            .read_u8()
            .ok_or_else(|| malformed_greeting("empty greeting"))?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(HandshakeError {
                kind: HandshakeErrorKind::UnsupportedProtocol,
                message: format!(
                    "server speaks protocol version {protocol_version}, expected {PROTOCOL_VERSION}"
                ),
            });
        }

        let server_version = reader
            .read_null_string()
            .ok_or_else(|| malformed_greeting("greeting missing server version"))?;
        let connection_id = reader
            .read_u32_le()
            .ok_or_else(|| malformed_greeting("greeting missing connection id"))?;

        let mut salt = reader
            .read_bytes(8)
            .ok_or_else(|| malformed_greeting("greeting missing auth seed"))?
            .to_vec();
        // Filler byte after the first salt half
        reader
            .read_u8()
            .ok_or_else(|| malformed_greeting("greeting truncated after auth seed"))?;

        let capability_low = reader
            .read_u16_le()
            .ok_or_else(|| malformed_greeting("greeting missing capability flags"))?;
        let mut capabilities = u32::from(capability_low);

        // Everything past this point is optional in ancient servers, but
        // any protocol-10 server in practice sends it.
        let mut charset = 0;
        let mut status_flags = 0;
        let mut auth_plugin = String::new();
        if !reader.is_empty() {
            charset = reader
                .read_u8()
                .ok_or_else(|| malformed_greeting("greeting truncated at charset"))?;
            status_flags = reader
                .read_u16_le()
                .ok_or_else(|| malformed_greeting("greeting truncated at status flags"))?;
            let capability_high = reader
                .read_u16_le()
                .ok_or_else(|| malformed_greeting("greeting truncated at capability flags"))?;
            capabilities |= u32::from(capability_high) << 16;

            let auth_data_len = reader
                .read_u8()
                .ok_or_else(|| malformed_greeting("greeting truncated at auth data length"))?;
            if !reader.skip(10) {
                return Err(malformed_greeting("greeting truncated in reserved bytes"));
            }

            if capabilities & capability::CLIENT_SECURE_CONNECTION == 0 && auth_data_len > 8 {
                // A second salt half is declared but the capability that
                // carries it is absent
                return Err(malformed_greeting(format!(
                    "greeting declares {auth_data_len} auth data bytes without the \
                     secure-connection capability"
                )));
            }

            if capabilities & capability::CLIENT_SECURE_CONNECTION != 0 {
                let second_len = 13.max(usize::from(auth_data_len).saturating_sub(8));
                let second = reader
                    .read_bytes(second_len)
                    .ok_or_else(|| malformed_greeting("greeting truncated in auth seed"))?;
                salt.extend_from_slice(second);
                // The second half usually carries a trailing NUL
                if salt.last() == Some(&0) {
                    salt.pop();
                }
            }

            if capabilities & capability::CLIENT_PLUGIN_AUTH != 0 {
                // Some servers NUL-terminate the plugin name, some do not.
                auth_plugin = match reader.read_null_string() {
                    Some(name) => name,
                    None => reader.read_rest_string(),
                };
            }
        }

        if capabilities & capability::CLIENT_PROTOCOL_41 == 0 {
            return Err(HandshakeError {
                kind: HandshakeErrorKind::UnsupportedProtocol,
                message: "server does not support the 4.1 protocol".to_string(),
            });
        }

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            salt,
            capabilities,
            charset,
            status_flags,
            auth_plugin,
        })
    }
}

/// Parsed AuthSwitchRequest (0xFE during authentication).
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest {
    pub plugin: String,
    pub salt: Vec<u8>,
}

impl AuthSwitchRequest {
    /// Parse an auth switch payload: 0xFE marker, plugin name, new seed.
    pub fn parse(payload: &[u8]) -> Result<Self, HandshakeError> {
        let mut reader = PacketReader::new(payload);
        if reader.read_u8() != Some(0xFE) {
            return Err(malformed_greeting("auth switch does not start with 0xFE"));
        }
        let plugin = reader
            .read_null_string()
            .ok_or_else(|| malformed_greeting("auth switch missing plugin name"))?;
        let mut salt = reader.read_rest().to_vec();
        if salt.last() == Some(&0) {
            salt.pop();
        }
        Ok(Self { plugin, salt })
    }
}

/// Inputs for building a HandshakeResponse41 payload.
#[derive(Debug)]
pub struct HandshakeResponse<'a> {
    pub capabilities: u32,
    pub max_packet_size: u32,
    pub collation: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: &'a str,
    pub auth_plugin: &'a str,
    pub attributes: &'a HashMap<String, String>,
}

/// Compute the capability word to send: everything both sides support,
/// plus the flags this client cannot operate without, plus
/// `CLIENT_CONNECT_WITH_DB` when a database was requested.
pub fn negotiate_capabilities(
    client_flags: u32,
    server_flags: u32,
    with_database: bool,
    with_attributes: bool,
) -> u32 {
    let mut flags = (client_flags & server_flags) | capability::MANDATORY_CLIENT_FLAGS;
    if with_database {
        flags |= capability::CLIENT_CONNECT_WITH_DB & server_flags;
    }
    if with_attributes {
        flags |= capability::CLIENT_CONNECT_ATTRS & server_flags;
    }
    flags
}

/// Build the HandshakeResponse41 payload.
pub fn build_handshake_response(response: &HandshakeResponse<'_>) -> Vec<u8> {
    let caps = response.capabilities;
    let mut writer = PacketWriter::with_capacity(128);
    writer.write_u32_le(caps);
    writer.write_u32_le(response.max_packet_size);
    writer.write_u8(response.collation);
    writer.write_zeros(23);
    writer.write_null_string(response.username);

    if caps & capability::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
        writer.write_lenenc_bytes(response.auth_response);
    } else if caps & capability::CLIENT_SECURE_CONNECTION != 0 {
        writer.write_u8(response.auth_response.len() as u8);
        writer.write_bytes(response.auth_response);
    } else {
        writer.write_bytes(response.auth_response);
        writer.write_u8(0);
    }

    if caps & capability::CLIENT_CONNECT_WITH_DB != 0 {
        writer.write_null_string(response.database);
    }
    if caps & capability::CLIENT_PLUGIN_AUTH != 0 {
        writer.write_null_string(response.auth_plugin);
    }
    if caps & capability::CLIENT_CONNECT_ATTRS != 0 {
        let mut attrs = PacketWriter::with_capacity(64);
        for (key, value) in response.attributes {
            attrs.write_lenenc_string(key);
            attrs.write_lenenc_string(value);
        }
        writer.write_lenenc_bytes(attrs.as_bytes());
    }
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::collation;

    fn sample_greeting() -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_u8(10);
        w.write_null_string("8.0.36");
        w.write_u32_le(1234);
        w.write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        w.write_u8(0);
        let caps = capability::CLIENT_PROTOCOL_41
            | capability::CLIENT_SECURE_CONNECTION
            | capability::CLIENT_PLUGIN_AUTH
            | capability::CLIENT_TRANSACTIONS;
        w.write_u16_le((caps & 0xFFFF) as u16);
        w.write_u8(collation::UTF8MB4_GENERAL_CI);
        w.write_u16_le(0x0002);
        w.write_u16_le((caps >> 16) as u16);
        w.write_u8(21);
        w.write_zeros(10);
        w.write_bytes(&[9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20]);
        w.write_u8(0);
        w.write_null_string("caching_sha2_password");
        w.into_bytes()
    }

    #[test]
    fn parse_greeting() {
        let greeting = Greeting::parse(&sample_greeting()).unwrap();
        assert_eq!(greeting.protocol_version, 10);
        assert_eq!(greeting.server_version, "8.0.36");
        assert_eq!(greeting.connection_id, 1234);
        assert_eq!(greeting.salt.len(), 20);
        assert_eq!(greeting.salt[..8], [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(greeting.salt[8..], [9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20]);
        assert_eq!(greeting.auth_plugin, "caching_sha2_password");
        assert_eq!(greeting.status_flags, 0x0002);
        assert_ne!(greeting.capabilities & capability::CLIENT_PROTOCOL_41, 0);
    }

    #[test]
    fn reject_wrong_protocol_version() {
        let mut payload = sample_greeting();
        payload[0] = 9;
        let err = Greeting::parse(&payload).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::UnsupportedProtocol);
    }

    #[test]
    fn reject_pre_41_server() {
        let mut w = PacketWriter::new();
        w.write_u8(10);
        w.write_null_string("4.0.0");
        w.write_u32_le(7);
        w.write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        w.write_u8(0);
        w.write_u16_le(0); // no CLIENT_PROTOCOL_41
        let err = Greeting::parse(w.as_bytes()).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::UnsupportedProtocol);
    }

    #[test]
    fn reject_auth_data_without_secure_connection() {
        // Declares a 21-byte auth seed, but without the capability that
        // carries the second half
        let caps = capability::CLIENT_PROTOCOL_41 | capability::CLIENT_PLUGIN_AUTH;
        let mut w = PacketWriter::new();
        w.write_u8(10);
        w.write_null_string("8.0.36");
        w.write_u32_le(7);
        w.write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        w.write_u8(0);
        w.write_u16_le((caps & 0xFFFF) as u16);
        w.write_u8(collation::UTF8MB4_GENERAL_CI);
        w.write_u16_le(0);
        w.write_u16_le((caps >> 16) as u16);
        w.write_u8(21);
        w.write_zeros(10);
        w.write_null_string("mysql_native_password");
        let err = Greeting::parse(w.as_bytes()).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::MalformedGreeting);
    }

    #[test]
    fn reject_truncated_greeting() {
        let payload = sample_greeting();
        let err = Greeting::parse(&payload[..12]).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::MalformedGreeting);
    }

    #[test]
    fn parse_auth_switch() {
        let mut w = PacketWriter::new();
        w.write_u8(0xFE);
        w.write_null_string("mysql_native_password");
        w.write_bytes(&[7u8; 20]);
        w.write_u8(0);
        let switch = AuthSwitchRequest::parse(w.as_bytes()).unwrap();
        assert_eq!(switch.plugin, "mysql_native_password");
        assert_eq!(switch.salt, vec![7u8; 20]);
    }

    #[test]
    fn negotiated_capabilities_keep_mandatory_flags() {
        // Server with nothing in common still gets the mandatory set
        let flags = negotiate_capabilities(capability::DEFAULT_CLIENT_FLAGS, 0, false, false);
        assert_eq!(flags, capability::MANDATORY_CLIENT_FLAGS);

        // CONNECT_WITH_DB only when requested and server-supported
        let server = capability::CLIENT_PROTOCOL_41 | capability::CLIENT_CONNECT_WITH_DB;
        let with_db = negotiate_capabilities(capability::DEFAULT_CLIENT_FLAGS, server, true, false);
        assert_ne!(with_db & capability::CLIENT_CONNECT_WITH_DB, 0);
        let without_db =
            negotiate_capabilities(capability::DEFAULT_CLIENT_FLAGS, server, false, false);
        assert_eq!(without_db & capability::CLIENT_CONNECT_WITH_DB, 0);
    }

    #[test]
    fn handshake_response_layout() {
        let attributes = HashMap::new();
        let caps = capability::CLIENT_PROTOCOL_41
            | capability::CLIENT_SECURE_CONNECTION
            | capability::CLIENT_PLUGIN_AUTH
            | capability::CLIENT_CONNECT_WITH_DB;
        let payload = build_handshake_response(&HandshakeResponse {
            capabilities: caps,
            max_packet_size: 16 * 1024 * 1024,
            collation: collation::UTF8MB4_GENERAL_CI,
            username: "ada",
            auth_response: &[0xAA; 20],
            database: "test",
            auth_plugin: "mysql_native_password",
            attributes: &attributes,
        });

        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u32_le(), Some(caps));
        assert_eq!(r.read_u32_le(), Some(16 * 1024 * 1024));
        assert_eq!(r.read_u8(), Some(collation::UTF8MB4_GENERAL_CI));
        assert!(r.skip(23));
        assert_eq!(r.read_null_string(), Some("ada".to_string()));
        // SECURE_CONNECTION without LENENC: 1-byte length prefix
        assert_eq!(r.read_u8(), Some(20));
        assert_eq!(r.read_bytes(20), Some(&[0xAA; 20][..]));
        assert_eq!(r.read_null_string(), Some("test".to_string()));
        assert_eq!(r.read_null_string(), Some("mysql_native_password".to_string()));
        assert!(r.is_empty());
    }

    #[test]
    fn handshake_response_lenenc_auth_data() {
        let attributes = HashMap::new();
        let caps = capability::CLIENT_PROTOCOL_41
            | capability::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA;
        let payload = build_handshake_response(&HandshakeResponse {
            capabilities: caps,
            max_packet_size: 0,
            collation: collation::DEFAULT_COLLATION,
            username: "u",
            auth_response: &[1, 2, 3],
            database: "",
            auth_plugin: "",
            attributes: &attributes,
        });
        let mut r = PacketReader::new(&payload);
        assert!(r.skip(4 + 4 + 1 + 23));
        assert_eq!(r.read_null_string(), Some("u".to_string()));
        assert_eq!(r.read_lenenc_bytes(), Some(&[1, 2, 3][..]));
        assert!(r.is_empty());
    }
}
