//! Connection lifecycle: dial, authenticate, run commands.

use tracing::{debug, trace, warn};

use mywire_core::{Error, HandshakeError, HandshakeErrorKind, Result, Value};

use crate::auth::{self, caching_sha2, plugin};
use crate::config::Config;
use crate::packet::PacketChannel;
use crate::protocol::handshake::{
    AuthSwitchRequest, Greeting, HandshakeResponse, build_handshake_response,
    negotiate_capabilities,
};
use crate::protocol::{
    Command, PacketWriter, ResponseKind, classify, classify_auth, malformed, parse_err, parse_ok,
    status, unexpected,
};
use crate::result::{QueryResult, read_query_result};
use crate::stmt::{StmtPrepareOk, build_stmt_close, build_stmt_execute, build_stmt_prepare};
use crate::transport::Transport;
use crate::types::Field;

/// Upper bound on COM_FIELD_LIST response packets before the stream is
/// declared misbehaving.
const FIELD_LIST_PACKET_LIMIT: usize = 4096;

/// An authenticated connection to a server.
///
/// Not thread-safe: one command runs at a time, and the caller owns the
/// connection exclusively.
#[derive(Debug)]
pub struct Conn {
    channel: PacketChannel,
    capabilities: u32,
    connection_id: u32,
    server_version: String,
    status_flags: u16,
    db: String,
    charset: String,
    closed: bool,
}

impl Conn {
    /// Dial and authenticate.
    pub fn connect(config: Config) -> Result<Self> {
        config.validate()?;

        let transport = Transport::connect(&config.addr, config.connect_timeout)?;
        transport.set_read_timeout(config.read_timeout)?;
        transport.set_write_timeout(config.write_timeout)?;
        let mut channel = PacketChannel::new(transport);

        let greeting_payload = channel.read_packet()?;
        if classify(&greeting_payload) == ResponseKind::Err {
            // Servers refuse over-limit hosts with an ERR before any
            // greeting.
            return Err(Error::Server(
                parse_err(&greeting_payload).map_err(Error::Protocol)?,
            ));
        }
        let greeting = Greeting::parse(&greeting_payload).map_err(Error::Handshake)?;
        trace!(
            server_version = %greeting.server_version,
            plugin = %greeting.auth_plugin,
            "received greeting"
        );

        let capabilities = negotiate_capabilities(
            config.capability_flags(),
            greeting.capabilities,
            !config.database.is_empty(),
            !config.attributes.is_empty(),
        );

        let mut auth_plugin = if greeting.auth_plugin.is_empty() {
            plugin::NATIVE_PASSWORD.to_string()
        } else {
            greeting.auth_plugin.clone()
        };
        let mut salt = greeting.salt.clone();
        let auth_response = auth::scramble_password(&auth_plugin, &config.password, &salt);

        let response = build_handshake_response(&HandshakeResponse {
            capabilities,
            max_packet_size: config.max_packet_size,
            collation: config.collation,
            username: &config.user,
            auth_response: &auth_response,
            database: &config.database,
            auth_plugin: &auth_plugin,
            attributes: &config.attributes,
        });
        channel.write_packet(&response)?;

        // Authentication loop: the server may switch plugins a bounded
        // number of times and, for caching_sha2, interleave extra data.
        let mut switches_left = config.max_auth_switches;
        let status_flags = loop {
            let payload = channel.read_packet()?;
            match classify_auth(&payload) {
                ResponseKind::Ok => {
                    break parse_ok(&payload).map_err(Error::Protocol)?.status_flags;
                }
                ResponseKind::Err => {
                    return Err(Error::Server(parse_err(&payload).map_err(Error::Protocol)?));
                }
                ResponseKind::AuthSwitch => {
                    if payload.len() == 1 {
                        // Bare 0xFE asks for the pre-4.1 scramble
                        return Err(Error::Handshake(HandshakeError {
                            kind: HandshakeErrorKind::InsecureAuth,
                            message: "server requested the insecure pre-4.1 authentication"
                                .to_string(),
                        }));
                    }
                    if switches_left == 0 {
                        return Err(Error::Handshake(HandshakeError {
                            kind: HandshakeErrorKind::AuthSwitchLimit,
                            message: format!(
                                "server requested more than {} auth plugin switches",
                                config.max_auth_switches
                            ),
                        }));
                    }
                    switches_left -= 1;

                    let switch = AuthSwitchRequest::parse(&payload).map_err(Error::Handshake)?;
                    debug!(from = %auth_plugin, to = %switch.plugin, "auth plugin switch");
                    auth_plugin = switch.plugin;
                    salt = switch.salt;
                    let scramble =
                        auth::scramble_password(&auth_plugin, &config.password, &salt);
                    channel.write_packet(&scramble)?;
                }
                _ if payload.first() == Some(&0x01) => {
                    // AuthMoreData, only caching_sha2/sha256 send it
                    handle_auth_more_data(&mut channel, &config, &auth_plugin, &salt, &payload)?;
                }
                _ => {
                    return Err(Error::Protocol(unexpected(
                        "unrecognized packet during authentication",
                    )));
                }
            }
        };

        debug!(
            connection_id = greeting.connection_id,
            server_version = %greeting.server_version,
            "connected"
        );
        Ok(Self {
            channel,
            db: config.database,
            charset: config.charset,
            capabilities,
            connection_id: greeting.connection_id,
            server_version: greeting.server_version,
            status_flags,
            closed: false,
        })
    }

    /// Run a statement, with optional bound parameters.
    ///
    /// Without parameters the statement goes through the text protocol;
    /// with parameters it is prepared, executed in binary format and
    /// closed again.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        if params.is_empty() {
            self.query(sql)
        } else {
            self.execute_prepared(sql, params)
        }
    }

    fn query(&mut self, sql: &str) -> Result<QueryResult> {
        trace!(len = sql.len(), "text query");
        let mut writer = PacketWriter::with_capacity(1 + sql.len());
        writer.write_u8(Command::Query as u8);
        writer.write_bytes(sql.as_bytes());
        self.channel.write_command(writer.as_bytes())?;
        let result = read_query_result(&mut self.channel, false)?;
        self.status_flags = result.status_flags();
        Ok(result)
    }

    fn execute_prepared(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let prepared = self.prepare(sql)?;
        if usize::from(prepared.num_params) != params.len() {
            self.close_stmt(prepared.statement_id);
            return Err(Error::Protocol(unexpected(format!(
                "statement expects {} parameters, {} bound",
                prepared.num_params,
                params.len()
            ))));
        }

        trace!(statement_id = prepared.statement_id, "binary execute");
        self.channel
            .write_command(&build_stmt_execute(prepared.statement_id, params))?;
        let result = read_query_result(&mut self.channel, true);
        self.close_stmt(prepared.statement_id);

        let result = result?;
        self.status_flags = result.status_flags();
        Ok(result)
    }

    fn prepare(&mut self, sql: &str) -> Result<StmtPrepareOk> {
        self.channel.write_command(&build_stmt_prepare(sql))?;
        let payload = self.channel.read_packet()?;
        if classify(&payload) == ResponseKind::Err {
            return Err(Error::Server(parse_err(&payload).map_err(Error::Protocol)?));
        }
        let prepared = StmtPrepareOk::parse(&payload).map_err(Error::Protocol)?;

        // Parameter and column definition blocks, each EOF-terminated
        self.skip_definition_block(prepared.num_params)?;
        self.skip_definition_block(prepared.num_columns)?;
        Ok(prepared)
    }

    fn skip_definition_block(&mut self, count: u16) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        for _ in 0..count {
            self.channel.read_packet()?;
        }
        let trailer = self.channel.read_packet()?;
        if classify(&trailer) != ResponseKind::Eof {
            return Err(Error::Protocol(unexpected(
                "missing EOF after definition block",
            )));
        }
        Ok(())
    }

    /// Best-effort close; the server never replies to COM_STMT_CLOSE.
    fn close_stmt(&mut self, statement_id: u32) {
        if let Err(e) = self.channel.write_command(&build_stmt_close(statement_id)) {
            warn!(statement_id, error = %e, "failed to close statement");
        }
    }

    /// Liveness check.
    pub fn ping(&mut self) -> Result<()> {
        self.channel.write_command(&[Command::Ping as u8])?;
        let ok = self.read_ok_response()?;
        self.status_flags = ok;
        Ok(())
    }

    /// Switch the default database. A no-op when `db` is already the
    /// session default, costing zero round trips.
    pub fn use_db(&mut self, db: &str) -> Result<()> {
        if self.db == db {
            return Ok(());
        }
        let mut writer = PacketWriter::with_capacity(1 + db.len());
        writer.write_u8(Command::InitDb as u8);
        writer.write_bytes(db.as_bytes());
        self.channel.write_command(writer.as_bytes())?;
        self.status_flags = self.read_ok_response()?;
        self.db = db.to_string();
        Ok(())
    }

    /// Change the session character set with `SET NAMES`. A no-op when
    /// the session already uses `charset`.
    pub fn set_charset(&mut self, charset: &str) -> Result<()> {
        if self.charset == charset {
            return Ok(());
        }
        self.query(&format!("SET NAMES {charset}"))?;
        self.charset = charset.to_string();
        Ok(())
    }

    /// Start a transaction.
    pub fn begin(&mut self) -> Result<()> {
        self.query("BEGIN").map(drop)
    }

    /// Commit the current transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.query("COMMIT").map(drop)
    }

    /// Roll back the current transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.query("ROLLBACK").map(drop)
    }

    /// Toggle autocommit for the session. A no-op when the server
    /// already reports the requested state.
    pub fn set_autocommit(&mut self, on: bool) -> Result<()> {
        if self.is_autocommit() == on {
            return Ok(());
        }
        let stmt = if on {
            "SET AUTOCOMMIT = 1"
        } else {
            "SET AUTOCOMMIT = 0"
        };
        self.query(stmt).map(drop)
    }

    /// List the columns of a table via the legacy COM_FIELD_LIST.
    ///
    /// `wildcard` filters column names with SQL pattern syntax; pass ""
    /// for all columns.
    pub fn field_list(&mut self, table: &str, wildcard: &str) -> Result<Vec<Field>> {
        let mut writer = PacketWriter::with_capacity(2 + table.len() + wildcard.len());
        writer.write_u8(Command::FieldList as u8);
        writer.write_null_string(table);
        writer.write_bytes(wildcard.as_bytes());
        self.channel.write_command(writer.as_bytes())?;

        let mut fields = Vec::new();
        loop {
            if fields.len() >= FIELD_LIST_PACKET_LIMIT {
                return Err(Error::Protocol(malformed(
                    "column list response exceeds the packet limit",
                )));
            }
            let payload = self.channel.read_packet()?;
            match classify(&payload) {
                ResponseKind::Err => {
                    return Err(Error::Server(parse_err(&payload).map_err(Error::Protocol)?));
                }
                ResponseKind::Eof => return Ok(fields),
                _ => fields.push(Field::parse(&payload, true).map_err(Error::Protocol)?),
            }
        }
    }

    /// Whether the session has autocommit enabled, per the last status
    /// flags the server reported.
    pub fn is_autocommit(&self) -> bool {
        self.status_flags & status::SERVER_STATUS_AUTOCOMMIT != 0
    }

    /// Whether a transaction is open, per the last status flags the
    /// server reported.
    pub fn is_in_transaction(&self) -> bool {
        self.status_flags & status::SERVER_STATUS_IN_TRANS != 0
    }

    /// Current default database.
    pub fn db(&self) -> &str {
        &self.db
    }

    /// Current session character set.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Thread id the server assigned to this connection.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Version string from the greeting.
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Capability flags in effect for this connection.
    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    /// Status flags from the most recent server response.
    pub fn status_flags(&self) -> u16 {
        self.status_flags
    }

    /// Send COM_QUIT and shut the stream down. Safe to call twice.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // The server usually just drops the connection in response
        if let Err(e) = self.channel.write_command(&[Command::Quit as u8]) {
            trace!(error = %e, "quit not delivered");
        }
        self.channel.transport().shutdown();
        debug!(connection_id = self.connection_id, "closed");
    }

    fn read_ok_response(&mut self) -> Result<u16> {
        let payload = self.channel.read_packet()?;
        match classify(&payload) {
            ResponseKind::Ok => Ok(parse_ok(&payload).map_err(Error::Protocol)?.status_flags),
            ResponseKind::Err => Err(Error::Server(parse_err(&payload).map_err(Error::Protocol)?)),
            _ => Err(Error::Protocol(unexpected(
                "expected OK or ERR response to command",
            ))),
        }
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle a caching_sha2/sha256 AuthMoreData packet during the
/// authentication loop.
fn handle_auth_more_data(
    channel: &mut PacketChannel,
    config: &Config,
    auth_plugin: &str,
    salt: &[u8],
    payload: &[u8],
) -> Result<()> {
    match payload.get(1) {
        Some(&caching_sha2::FAST_AUTH_SUCCESS) => {
            // Scramble matched the server's cache; OK follows
            trace!("fast auth success");
            Ok(())
        }
        Some(&caching_sha2::PERFORM_FULL_AUTH) => {
            trace!("full authentication requested");
            if config.password.is_empty() {
                // Nothing to protect; a bare NUL finishes the exchange
                channel.write_packet(&[0])?;
                return Ok(());
            }
            // Fetch the server's RSA key, then send the encrypted
            // password. Plaintext would only be safe under TLS, which
            // this client does not establish.
            channel.write_packet(&[caching_sha2::REQUEST_PUBLIC_KEY])?;
            let key_packet = channel.read_packet()?;
            if key_packet.first() != Some(&0x01) {
                return Err(Error::Protocol(unexpected(
                    "expected public key packet during full authentication",
                )));
            }
            let use_oaep = auth_plugin == plugin::CACHING_SHA2_PASSWORD;
            let encrypted =
                auth::rsa_encrypt_password(&config.password, salt, &key_packet[1..], use_oaep)
                    .map_err(Error::Handshake)?;
            channel.write_packet(&encrypted)?;
            Ok(())
        }
        _ => Err(Error::Protocol(unexpected(
            "unrecognized extra authentication data",
        ))),
    }
}
