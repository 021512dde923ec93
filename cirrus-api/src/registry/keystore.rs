//! One-shot RSA private-key store for credential registration.
//!
//! `issue` generates a key pair and hands out the public half together with
//! a token; `take` consumes the private half. A token is gone after its
//! first use, success or failure.

use std::collections::HashMap;
use std::sync::Mutex;

use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{CoreError, Result};
use crate::util::new_uuid;

pub const RSA_KEY_BITS: usize = 2048;

pub struct KeyStore {
    inner: Mutex<HashMap<String, RsaPrivateKey>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Generate a key pair; returns `(token, public key PEM)`.
    pub fn issue(&self) -> Result<(String, String)> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| CoreError::Crypto(format!("RSA key generation: {}", e)))?;
        let public_pem = RsaPublicKey::from(&private_key)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CoreError::Crypto(format!("public key encoding: {}", e)))?;

        let token = new_uuid();
        self.inner
            .lock()
            .expect("key store mutex")
            .insert(token.clone(), private_key);
        Ok((token, public_pem))
    }

    /// Remove and return the private key for a token.
    pub fn take(&self, token: &str) -> Option<RsaPrivateKey> {
        self.inner.lock().expect("key store mutex").remove(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.inner.lock().expect("key store mutex").contains_key(token)
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}
