//! Stream cipher and session hashing.
//!
//! After the key exchange both directions run AES-128 in CFB8 mode, keyed and
//! seeded (IV) with the same 16-byte shared secret. CFB8 works byte by byte, so
//! any slice can be transformed in place and the cipher state simply carries
//! over to the next call. The two directions never share state.

use crate::error::{constants, ProtocolError, Result};
use aes::cipher::inout::InOutBuf;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use num_bigint::BigInt;
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes128Cfb8Enc = cfb8::Encryptor<Aes128>;
type Aes128Cfb8Dec = cfb8::Decryptor<Aes128>;

/// Length of the negotiated shared secret in bytes.
pub const SHARED_SECRET_LEN: usize = 16;

/// The symmetric key established during login. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; SHARED_SECRET_LEN] = bytes
            .try_into()
            .map_err(|_| ProtocolError::KeyMaterial(constants::ERR_SECRET_LENGTH.into()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Outbound half of a [`CipherSession`].
pub struct StreamEncryptor(Aes128Cfb8Enc);

impl StreamEncryptor {
    #[inline]
    pub fn apply(&mut self, data: &mut [u8]) {
        let (blocks, _) = InOutBuf::from(data).into_chunks();
        self.0.encrypt_blocks_inout_mut(blocks);
    }
}

/// Inbound half of a [`CipherSession`].
pub struct StreamDecryptor(Aes128Cfb8Dec);

impl StreamDecryptor {
    #[inline]
    pub fn apply(&mut self, data: &mut [u8]) {
        let (blocks, _) = InOutBuf::from(data).into_chunks();
        self.0.decrypt_blocks_inout_mut(blocks);
    }
}

/// Both directional ciphers for one connection, created once from the shared secret.
pub struct CipherSession {
    encryptor: StreamEncryptor,
    decryptor: StreamDecryptor,
}

impl CipherSession {
    pub fn new(secret: &SharedSecret) -> Result<Self> {
        let key = secret.as_bytes();
        let encryptor = Aes128Cfb8Enc::new_from_slices(key, key)
            .map_err(|e| ProtocolError::KeyMaterial(e.to_string()))?;
        let decryptor = Aes128Cfb8Dec::new_from_slices(key, key)
            .map_err(|e| ProtocolError::KeyMaterial(e.to_string()))?;
        Ok(Self {
            encryptor: StreamEncryptor(encryptor),
            decryptor: StreamDecryptor(decryptor),
        })
    }

    /// Hand each direction to the task that drives it.
    pub fn split(self) -> (StreamEncryptor, StreamDecryptor) {
        (self.encryptor, self.decryptor)
    }
}

/// Session id sent to the identity service.
///
/// SHA-1 over (server id, shared secret, DER public key), rendered as a signed
/// two's-complement big integer in lowercase hex without leading zeros.
pub fn server_hash(server_id: &str, secret: &[u8], public_key_der: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(secret);
    hasher.update(public_key_der);
    signed_hex_digest(&hasher.finalize())
}

fn signed_hex_digest(digest: &[u8]) -> String {
    BigInt::from_signed_bytes_be(digest).to_str_radix(16)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn digest_of(name: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(name.as_bytes());
        signed_hex_digest(&hasher.finalize())
    }

    #[test]
    fn test_signed_hex_digest_vectors() {
        assert_eq!(digest_of("Notch"), "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48");
        assert_eq!(digest_of("jeb_"), "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1");
        assert_eq!(digest_of("simon"), "88e16a1019277b15d58faf0541e11910eb756f6");
    }

    #[test]
    fn test_server_hash_concatenates_inputs() {
        let joined = {
            let mut hasher = Sha1::new();
            hasher.update(b"abcdef");
            signed_hex_digest(&hasher.finalize())
        };
        assert_eq!(server_hash("ab", b"cd", b"ef"), joined);
    }

    #[test]
    fn test_cipher_directions_are_symmetric() {
        let secret = SharedSecret::from_slice(&[0x42; 16]).unwrap();
        let (mut server_out, mut server_in) = CipherSession::new(&secret).unwrap().split();
        let (mut client_out, mut client_in) = CipherSession::new(&secret).unwrap().split();

        let mut message = b"frame one".to_vec();
        server_out.apply(&mut message);
        assert_ne!(&message[..], b"frame one");
        client_in.apply(&mut message);
        assert_eq!(&message[..], b"frame one");

        // state carries across calls, split at arbitrary points
        let mut message = b"and frame two".to_vec();
        client_out.apply(&mut message[..4]);
        client_out.apply(&mut message[4..]);
        server_in.apply(&mut message[..1]);
        server_in.apply(&mut message[1..]);
        assert_eq!(&message[..], b"and frame two");
    }

    #[test]
    fn test_secret_length_is_checked() {
        assert!(matches!(
            SharedSecret::from_slice(&[0u8; 15]),
            Err(ProtocolError::KeyMaterial(_))
        ));
    }
}
