//! Authentication plugin scrambles.
//!
//! Two plugins dominate in the wild:
//!
//! - `mysql_native_password` (SHA1, pre-8.0 default):
//!   `SHA1(password) XOR SHA1(salt + SHA1(SHA1(password)))`
//! - `caching_sha2_password` (SHA256, 8.0+ default):
//!   `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + salt)`
//!
//! caching_sha2 full authentication (cache miss without TLS) sends the
//! password RSA-encrypted with a key fetched from the server.

use sha1::Sha1;
use sha2::{Digest, Sha256};

use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;

use mywire_core::{HandshakeError, HandshakeErrorKind};

/// Well-known authentication plugin names.
pub mod plugin {
    /// SHA1 scramble (default before MySQL 8.0)
    pub const NATIVE_PASSWORD: &str = "mysql_native_password";
    /// SHA256 scramble (default since MySQL 8.0)
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    /// RSA-encrypted SHA256 authentication
    pub const SHA256_PASSWORD: &str = "sha256_password";
    /// Cleartext password (only sane over TLS or a unix socket)
    pub const CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// Status bytes inside caching_sha2_password AuthMoreData packets.
pub mod caching_sha2 {
    /// Client request for the server's RSA public key
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    /// Server: cached entry matched, an OK packet follows
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    /// Server: cache miss, full authentication required
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// Compute the `mysql_native_password` scramble.
///
/// Empty passwords produce an empty response, which the server treats
/// as "no password".
pub fn native_password_scramble(password: &str, salt: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    // Servers send 20 salt bytes, sometimes with a trailing NUL.
    let salt = trim_salt(salt);

    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(stage2);
    let mask: [u8; 20] = hasher.finalize().into();

    stage1.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}

/// Compute the `caching_sha2_password` fast-auth scramble.
pub fn caching_sha2_scramble(password: &str, salt: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let salt = trim_salt(salt);

    let hash: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let hash_hash: [u8; 32] = Sha256::digest(hash).into();

    let mut hasher = Sha256::new();
    hasher.update(hash_hash);
    hasher.update(salt);
    let mask: [u8; 32] = hasher.finalize().into();

    hash.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}

/// Cleartext password with NUL terminator, for `mysql_clear_password`.
pub fn clear_password(password: &str) -> Vec<u8> {
    let mut out = password.as_bytes().to_vec();
    out.push(0);
    out
}

/// Compute the auth response for a named plugin.
///
/// An unknown plugin name is not fatal here: the server may switch
/// plugins during negotiation, so we answer with the native scramble
/// and let the switch happen.
pub fn scramble_password(plugin_name: &str, password: &str, salt: &[u8]) -> Vec<u8> {
    match plugin_name {
        plugin::CACHING_SHA2_PASSWORD => caching_sha2_scramble(password, salt),
        plugin::CLEAR_PASSWORD => clear_password(password),
        _ => native_password_scramble(password, salt),
    }
}

/// RSA-encrypt a password for full authentication.
///
/// The plaintext is the NUL-terminated password XORed with the salt
/// (repeated), then encrypted with the server's public key. MySQL 8.0.5+
/// expects OAEP padding for caching_sha2_password; sha256_password uses
/// PKCS#1 v1.5.
pub fn rsa_encrypt_password(
    password: &str,
    salt: &[u8],
    public_key_pem: &[u8],
    use_oaep: bool,
) -> Result<Vec<u8>, HandshakeError> {
    let salt = trim_salt(salt);
    if salt.is_empty() {
        return Err(auth_failed("cannot encrypt password: empty salt"));
    }

    let mut plain = password.as_bytes().to_vec();
    plain.push(0);
    for (i, b) in plain.iter_mut().enumerate() {
        *b ^= salt[i % salt.len()];
    }

    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| auth_failed(format!("server public key is not UTF-8 PEM: {e}")))?;
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| auth_failed(format!("cannot parse server public key: {e}")))?;

    let encrypted = if use_oaep {
        key.encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &plain)
    } else {
        key.encrypt(&mut OsRng, rsa::Pkcs1v15Encrypt, &plain)
    };
    encrypted.map_err(|e| auth_failed(format!("RSA encryption failed: {e}")))
}

fn auth_failed(message: impl Into<String>) -> HandshakeError {
    HandshakeError {
        kind: HandshakeErrorKind::AuthFailed,
        message: message.into(),
    }
}

/// Drop a trailing NUL from a 21-byte salt and ignore bytes past 20.
fn trim_salt(salt: &[u8]) -> &[u8] {
    let salt = if salt.len() == 21 && salt.last() == Some(&0) {
        &salt[..20]
    } else {
        salt
    };
    if salt.len() > 20 { &salt[..20] } else { salt }
}
