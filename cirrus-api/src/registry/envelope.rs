//! Credential envelope sealing and opening.
//!
//! The client asks for an RSA public key, encrypts a fresh AES-256 key with
//! it (OAEP/SHA-256), and encrypts every credential value under that AES key
//! with CBC + PKCS#7, prepending the 16-byte IV to each ciphertext. All
//! binary fields travel base64-encoded. The sealing half lives here too so
//! client tooling and the test suite share one implementation.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rsa::sha2::Sha256;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::KeyValue;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;
pub const AES_KEY_LEN: usize = 32;

/// Wire form of `POST /credential`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEnvelope {
    #[serde(rename = "providerName")]
    pub provider_name: String,
    #[serde(rename = "credentialHolder", default)]
    pub credential_holder: String,
    #[serde(rename = "publicKeyTokenId")]
    pub public_key_token_id: String,
    #[serde(rename = "encryptedAesKey")]
    pub encrypted_aes_key: String,
    #[serde(rename = "credentialKeyValueList")]
    pub credential_key_value_list: Vec<EncryptedKeyValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeyValue {
    pub key: String,
    /// base64(IV || ciphertext)
    pub value: String,
}

/// Open the envelope with the one-shot private key; returns the plaintext
/// credential pairs with PEM `\n` escapes restored.
pub fn open_envelope(
    private_key: &RsaPrivateKey,
    envelope: &CredentialEnvelope,
) -> Result<Vec<KeyValue>> {
    let wrapped = BASE64
        .decode(&envelope.encrypted_aes_key)
        .map_err(|e| CoreError::Crypto(format!("AES key base64: {}", e)))?;
    let aes_key = private_key
        .decrypt(Oaep::new::<Sha256>(), &wrapped)
        .map_err(|e| CoreError::Crypto(format!("AES key unwrap: {}", e)))?;
    if aes_key.len() != AES_KEY_LEN {
        return Err(CoreError::Crypto(format!(
            "AES key must be {} bytes, got {}",
            AES_KEY_LEN,
            aes_key.len()
        )));
    }

    let mut out = Vec::with_capacity(envelope.credential_key_value_list.len());
    for item in &envelope.credential_key_value_list {
        let plain = decrypt_value(&aes_key, &item.value)?;
        out.push(KeyValue {
            key: item.key.clone(),
            value: restore_newlines(&plain),
        });
    }
    Ok(out)
}

fn decrypt_value(aes_key: &[u8], encoded: &str) -> Result<String> {
    let data = BASE64
        .decode(encoded)
        .map_err(|e| CoreError::Crypto(format!("value base64: {}", e)))?;
    if data.len() < IV_LEN {
        return Err(CoreError::Crypto("ciphertext shorter than IV".into()));
    }
    let (iv, ct) = data.split_at(IV_LEN);

    let plain = Aes256CbcDec::new_from_slices(aes_key, iv)
        .map_err(|e| CoreError::Crypto(format!("cipher init: {}", e)))?
        .decrypt_padded_vec_mut::<Pkcs7>(ct)
        .map_err(|_| CoreError::Crypto("CBC padding invalid".into()))?;

    String::from_utf8(plain).map_err(|_| CoreError::Crypto("credential value not UTF-8".into()))
}

/// Restore literal `\n` escapes in PEM-style values.
fn restore_newlines(value: &str) -> String {
    value.replace("\\n", "\n")
}

// -----------------------------------------------------------------------------
// Client-side sealing (used by tooling and tests)
// -----------------------------------------------------------------------------

/// Fresh random AES-256 key.
pub fn new_aes_key() -> [u8; AES_KEY_LEN] {
    let mut key = [0u8; AES_KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Wrap an AES key under the issued public key (OAEP/SHA-256, base64).
pub fn wrap_aes_key(public_key: &RsaPublicKey, aes_key: &[u8]) -> Result<String> {
    let mut rng = rand::thread_rng();
    let wrapped = public_key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), aes_key)
        .map_err(|e| CoreError::Crypto(format!("AES key wrap: {}", e)))?;
    Ok(BASE64.encode(wrapped))
}

/// Encrypt one credential value: base64(IV || CBC(ct)).
pub fn seal_value(aes_key: &[u8], plaintext: &str) -> Result<String> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ct = Aes256CbcEnc::new_from_slices(aes_key, &iv)
        .map_err(|e| CoreError::Crypto(format!("cipher init: {}", e)))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut data = iv.to_vec();
    data.extend_from_slice(&ct);
    Ok(BASE64.encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_pair() -> (RsaPrivateKey, RsaPublicKey) {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = RsaPublicKey::from(&private);
        (private, public)
    }

    fn envelope(public: &RsaPublicKey, values: &[(&str, &str)]) -> CredentialEnvelope {
        let aes_key = new_aes_key();
        CredentialEnvelope {
            provider_name: "aws".into(),
            credential_holder: "admin".into(),
            public_key_token_id: "tok".into(),
            encrypted_aes_key: wrap_aes_key(public, &aes_key).unwrap(),
            credential_key_value_list: values
                .iter()
                .map(|(k, v)| EncryptedKeyValue {
                    key: k.to_string(),
                    value: seal_value(&aes_key, v).unwrap(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (private, public) = key_pair();
        let env = envelope(
            &public,
            &[("ClientId", "AKIA123"), ("ClientSecret", "s3cr3t/xyz")],
        );

        let kvs = open_envelope(&private, &env).unwrap();
        assert_eq!(kvs.len(), 2);
        assert_eq!(kvs[0].key, "ClientId");
        assert_eq!(kvs[0].value, "AKIA123");
        assert_eq!(kvs[1].value, "s3cr3t/xyz");
    }

    #[test]
    fn test_pem_newlines_restored() {
        let (private, public) = key_pair();
        let env = envelope(
            &public,
            &[("PrivateKey", "-----BEGIN KEY-----\\nabc\\n-----END KEY-----")],
        );

        let kvs = open_envelope(&private, &env).unwrap();
        assert_eq!(
            kvs[0].value,
            "-----BEGIN KEY-----\nabc\n-----END KEY-----"
        );
    }

    #[test]
    fn test_wrong_private_key_fails() {
        let (_, public) = key_pair();
        let (other_private, _) = key_pair();
        let env = envelope(&public, &[("K", "v")]);

        let err = open_envelope(&other_private, &env).unwrap_err();
        assert!(matches!(err, CoreError::Crypto(_)));
    }

    #[test]
    fn test_garbage_ciphertext_fails() {
        let (private, public) = key_pair();
        let mut env = envelope(&public, &[("K", "v")]);
        env.credential_key_value_list[0].value = BASE64.encode([0u8; 8]);

        let err = open_envelope(&private, &env).unwrap_err();
        assert!(matches!(err, CoreError::Crypto(_)));
    }
}
