//! 토큰 필드 암호화/복호화
//!
//! 저장 포맷 (v1, base64 STANDARD로 인코딩한 문자열):
//! - magic: `ATLTOKN1` (8 bytes)
//! - nonce: 24 bytes (XChaCha20-Poly1305)
//! - ciphertext: AEAD 결과 (= 암호문 + 태그)
//!
//! AAD: magic (포맷 바인딩)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::Rng;
use zeroize::Zeroize;

/// 포맷 매직 (8 bytes)
pub const TOKEN_MAGIC: &[u8; 8] = b"ATLTOKN1";

/// 마스터키 길이 (256-bit)
pub const MASTER_KEY_LEN: usize = 32;

/// Nonce 길이 (XChaCha20-Poly1305용 24 bytes)
pub const NONCE_LEN: usize = 24;

/// Vault 오류
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("Invalid master key format")]
    InvalidMasterKey,

    #[error("Invalid token magic")]
    InvalidMagic,

    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
}

/// 평문 토큰을 암호화해 저장용 문자열로 반환
pub fn encrypt_field(master_key: &[u8; MASTER_KEY_LEN], plaintext: &str) -> Result<String, VaultError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill(&mut nonce);

    let cipher = XChaCha20Poly1305::new(master_key.into());
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext.as_bytes(),
                aad: TOKEN_MAGIC,
            },
        )
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let mut blob = Vec::with_capacity(TOKEN_MAGIC.len() + NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(TOKEN_MAGIC);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(blob))
}

/// 저장된 문자열을 복호화
pub fn decrypt_field(master_key: &[u8; MASTER_KEY_LEN], stored: &str) -> Result<String, VaultError> {
    let blob = BASE64
        .decode(stored.trim())
        .map_err(|e| VaultError::InvalidFormat(e.to_string()))?;

    if blob.len() < TOKEN_MAGIC.len() + NONCE_LEN {
        return Err(VaultError::InvalidFormat("token blob too short".to_string()));
    }

    let (magic, rest) = blob.split_at(TOKEN_MAGIC.len());
    if magic != TOKEN_MAGIC {
        return Err(VaultError::InvalidMagic);
    }
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new(master_key.into());
    let mut plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: TOKEN_MAGIC,
            },
        )
        .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?;

    let result = String::from_utf8(plaintext.clone())
        .map_err(|e| VaultError::InvalidFormat(e.to_string()));

    // 평문 메모리 지우기
    plaintext.zeroize();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> [u8; MASTER_KEY_LEN] {
        let mut key = [0u8; MASTER_KEY_LEN];
        rand::thread_rng().fill(&mut key);
        key
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = random_key();
        let stored = encrypt_field(&key, "atl-access-token").unwrap();

        assert!(!stored.contains("atl-access-token"));
        assert_eq!(decrypt_field(&key, &stored).unwrap(), "atl-access-token");
    }

    #[test]
    fn test_nonce_differs_per_encryption() {
        let key = random_key();
        assert_ne!(encrypt_field(&key, "same").unwrap(), encrypt_field(&key, "same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let stored = encrypt_field(&random_key(), "secret").unwrap();
        assert!(matches!(
            decrypt_field(&random_key(), &stored),
            Err(VaultError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_rejects_foreign_blobs() {
        let key = random_key();
        assert!(matches!(decrypt_field(&key, "not base64!"), Err(VaultError::InvalidFormat(_))));

        let foreign = BASE64.encode([0u8; 64]);
        assert!(matches!(decrypt_field(&key, &foreign), Err(VaultError::InvalidMagic)));
    }
}
