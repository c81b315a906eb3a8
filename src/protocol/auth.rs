//! Login key exchange and identity derivation.
//!
//! The server holds one RSA key pair for its whole lifetime. Each login that
//! needs encryption gets a fresh 4-byte verify token; the client returns the
//! token and a 16-byte shared secret, both encrypted under the public key.
//!
//! **Per-login state**: the token lives in a [`LoginChallenge`] owned by the
//! connection's login listener, never in a global, and is zeroed on drop.
//!
//! The token comparison runs before anything the client claims is trusted.
//! Only after it passes is a [`SharedSecret`] handed out.

use crate::error::{constants, ProtocolError, Result};
use crate::protocol::packets::{EncryptionRequest, EncryptionResponse};
use crate::protocol::profile::{VerifiedIdentity, MAX_USERNAME_LEN};
use crate::utils::crypto::{server_hash, SharedSecret};
use bytes::Bytes;
use md5::{Digest, Md5};
use rand::RngCore;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::rand_core::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const VERIFY_TOKEN_LEN: usize = 4;
pub const DEFAULT_KEY_BITS: usize = 1024;

/// Server id sent in the encryption request; modern clients expect it empty.
pub const SERVER_ID: &str = "";

const OFFLINE_NAMESPACE: &str = "OfflinePlayer:";

/// The server's RSA key pair, generated once at startup and shared read-only.
pub struct ServerKeyPair {
    private: RsaPrivateKey,
    public_der: Bytes,
}

impl fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("public_der_len", &self.public_der.len())
            .finish_non_exhaustive()
    }
}

impl ServerKeyPair {
    #[instrument]
    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| ProtocolError::KeyMaterial(format!("Key generation failed: {e}")))?;
        let public_der = RsaPublicKey::from(&private)
            .to_public_key_der()
            .map_err(|e| ProtocolError::KeyMaterial(format!("Public key encoding failed: {e}")))?;
        debug!(bits, "Generated server key pair");
        Ok(Self {
            private,
            public_der: Bytes::copy_from_slice(public_der.as_bytes()),
        })
    }

    /// X.509 SubjectPublicKeyInfo encoding, as sent to clients.
    pub fn public_key_der(&self) -> &Bytes {
        &self.public_der
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.private
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| ProtocolError::KeyMaterial(format!("RSA decryption failed: {e}")))
    }
}

/// Encrypt `data` under a DER-encoded public key, the way a client answers
/// an encryption request.
pub fn encrypt_with_public_key(public_der: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let key = RsaPublicKey::from_public_key_der(public_der)
        .map_err(|e| ProtocolError::KeyMaterial(format!("Invalid public key: {e}")))?;
    key.encrypt(&mut OsRng, Pkcs1v15Encrypt, data)
        .map_err(|e| ProtocolError::KeyMaterial(format!("RSA encryption failed: {e}")))
}

/// The verify token issued to one login attempt.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct LoginChallenge {
    verify_token: [u8; VERIFY_TOKEN_LEN],
}

impl fmt::Debug for LoginChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoginChallenge(..)")
    }
}

impl LoginChallenge {
    pub fn new() -> Self {
        let mut verify_token = [0u8; VERIFY_TOKEN_LEN];
        rand::rng().fill_bytes(&mut verify_token);
        Self { verify_token }
    }

    pub fn verify_token(&self) -> &[u8] {
        &self.verify_token
    }

    /// The encryption request that carries this challenge.
    pub fn request(&self, keys: &ServerKeyPair, should_authenticate: bool) -> EncryptionRequest {
        EncryptionRequest {
            server_id: SERVER_ID.to_string(),
            public_key: keys.public_key_der().clone(),
            verify_token: Bytes::copy_from_slice(&self.verify_token),
            should_authenticate,
        }
    }

    fn matches(&self, echoed: &[u8]) -> bool {
        echoed.len() == VERIFY_TOKEN_LEN
            && self
                .verify_token
                .iter()
                .zip(echoed)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

impl Default for LoginChallenge {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the echoed token, then recover the shared secret.
///
/// # Errors
/// - `AuthenticationFailure` if the token does not match byte for byte
/// - `KeyMaterial` if either ciphertext does not decrypt or the secret has the wrong length
#[instrument(skip_all)]
pub fn verify_encryption_response(
    keys: &ServerKeyPair,
    challenge: &LoginChallenge,
    response: &EncryptionResponse,
) -> Result<SharedSecret> {
    let token = keys.decrypt(&response.verify_token)?;
    if !challenge.matches(&token) {
        warn!("Verify token mismatch");
        return Err(ProtocolError::AuthenticationFailure(
            constants::ERR_VERIFY_TOKEN_MISMATCH.into(),
        ));
    }

    let secret = keys.decrypt(&response.shared_secret)?;
    SharedSecret::from_slice(&secret)
}

/// The session id the client also computes and registers with the identity service.
pub fn session_hash(keys: &ServerKeyPair, secret: &SharedSecret) -> String {
    server_hash(SERVER_ID, secret.as_bytes(), keys.public_key_der())
}

/// Deterministic identity for offline mode: a version 3 UUID of
/// `"OfflinePlayer:" + username`.
pub fn offline_uuid(username: &str) -> Uuid {
    let digest = Md5::new()
        .chain_update(OFFLINE_NAMESPACE.as_bytes())
        .chain_update(username.as_bytes())
        .finalize();
    uuid::Builder::from_md5_bytes(digest.into()).into_uuid()
}

pub fn offline_identity(username: &str) -> VerifiedIdentity {
    VerifiedIdentity::new(offline_uuid(username), username)
}

/// Usernames are 1 to 16 printable ASCII characters without spaces.
pub fn validate_username(username: &str) -> Result<()> {
    let valid = !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username.bytes().all(|b| b > b' ' && b < 0x7F);
    if valid {
        Ok(())
    } else {
        Err(ProtocolError::MalformedPacket(format!(
            "{}: {username:?}",
            constants::ERR_INVALID_USERNAME
        )))
    }
}
