//! Connection configuration.

use std::collections::HashMap;
use std::time::Duration;

use mywire_core::{ConfigError, Error, Result};

use crate::protocol::{capability, collation};

/// TLS requirement for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plaintext connection.
    #[default]
    Disable,
    /// Use TLS when the server offers it.
    Preferred,
    /// Fail unless TLS is established.
    Required,
}

/// Connection settings, built fluently:
///
/// ```
/// use mywire::Config;
///
/// let config = Config::new("127.0.0.1:3306")
///     .user("app")
///     .password("secret")
///     .database("inventory");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub charset: String,
    pub collation: u8,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub ssl_mode: SslMode,
    pub attributes: HashMap<String, String>,
    pub max_packet_size: u32,
    /// How many auth switch requests to honor before failing.
    pub max_auth_switches: u32,
}

impl Config {
    /// Settings for `addr`: `host:port` for TCP, or a filesystem path
    /// (anything containing `/`) for a unix socket.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            user: String::new(),
            password: String::new(),
            database: String::new(),
            charset: "utf8mb4".to_string(),
            collation: collation::DEFAULT_COLLATION,
            connect_timeout: Some(Duration::from_secs(10)),
            read_timeout: None,
            write_timeout: None,
            ssl_mode: SslMode::Disable,
            attributes: HashMap::new(),
            max_packet_size: 16 * 1024 * 1024,
            max_auth_switches: 2,
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Character set name sent with `SET NAMES`; also picks the
    /// handshake collation id for the common cases.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self.collation = match self.charset.as_str() {
            "utf8" => collation::UTF8_GENERAL_CI,
            "binary" => collation::BINARY,
            _ => collation::UTF8MB4_GENERAL_CI,
        };
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Add a connection attribute sent during the handshake.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn max_auth_switches(mut self, limit: u32) -> Self {
        self.max_auth_switches = limit;
        self
    }

    /// Validate settings before dialing.
    pub fn validate(&self) -> Result<()> {
        if self.addr.is_empty() {
            return Err(Error::Config(ConfigError {
                message: "address is empty".to_string(),
            }));
        }
        if self.ssl_mode != SslMode::Disable {
            return Err(Error::Config(ConfigError {
                message: "TLS is not supported by this client; set ssl_mode to Disable"
                    .to_string(),
            }));
        }
        Ok(())
    }

    /// Capability flags this configuration offers to the server.
    pub fn capability_flags(&self) -> u32 {
        let mut flags = capability::DEFAULT_CLIENT_FLAGS;
        if !self.database.is_empty() {
            flags |= capability::CLIENT_CONNECT_WITH_DB;
        }
        if !self.attributes.is_empty() {
            flags |= capability::CLIENT_CONNECT_ATTRS;
        }
        flags
    }
}
