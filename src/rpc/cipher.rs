//! Channel cipher for encrypted RPC calls: AES-256-GCM with a random 96-bit
//! nonce prepended to each ciphertext. The key is SHA-256 of a shared secret.

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Secret used when the configuration doesn't provide `key`
pub const DEFAULT_SECRET: &[u8] = b"edr-agent/jsonrpc/channel-secret/v1";

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out.copy_from_slice(h.as_ref());
    out
}

pub struct ChannelCipher {
    key: [u8; KEY_LEN],
}

impl ChannelCipher {
    /// `algorithm` must be `"aes"`
    pub fn new(algorithm: &str, secret: &[u8]) -> Result<Self> {
        if !algorithm.eq_ignore_ascii_case("aes") {
            return Err(Error::invalid_argument(format!("unsupported encryption <{algorithm}>")));
        }
        Ok(Self {
            key: derive_key(secret),
        })
    }

    /// nonce || ciphertext
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| Error::runtime("invalid channel key length"))?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt((&nonce).into(), plaintext)
            .map_err(|_| Error::runtime("encryption failed"))?;
        let mut out = nonce.to_vec();
        out.extend(ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(Error::invalid_format("encrypted payload is too short"));
        }
        let (nonce, ct) = data.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| Error::runtime("invalid channel key length"))?;
        cipher
            .decrypt(nonce.into(), ct)
            .map_err(|_| Error::invalid_format("can't decrypt payload: wrong key or corrupted data"))
    }

    pub fn encrypt_b64(&self, plaintext: &[u8]) -> Result<String> {
        Ok(BASE64.encode(self.encrypt(plaintext)?))
    }

    pub fn decrypt_b64(&self, encoded: &str) -> Result<Vec<u8>> {
        let raw = BASE64
            .decode(encoded)
            .map_err(|e| Error::invalid_format(format!("encrypted payload: {e}")))?;
        self.decrypt(&raw)
    }
}
