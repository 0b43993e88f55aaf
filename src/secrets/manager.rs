//! Token Cipher - 마스터키 로드 및 토큰 필드 암호화
//!
//! - 마스터키는 `ATLASSIAN_TOKEN_ENCRYPTION_KEY`(base64)에서 우선 로드
//! - 없으면 Keychain에서 1회 로드 (`atlassian-link:master_key_v1`), 없으면 생성 후 저장

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use keyring::Entry;
use rand::Rng;
use zeroize::Zeroize;

use crate::config::AtlassianConfig;
use crate::secrets::vault::{decrypt_field, encrypt_field, VaultError, MASTER_KEY_LEN};

/// Keychain 서비스 이름
const KEYCHAIN_SERVICE: &str = "ai.oddeyes.atlassian-link";
/// 마스터키 Keychain 키
const MASTER_KEY_KEYCHAIN_KEY: &str = "atlassian-link:master_key_v1";

/// Zeroize가 적용된 마스터키 래퍼
#[derive(Clone)]
struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// 토큰 암호화기
///
/// DB에는 이 타입을 거친 값만 저장합니다.
#[derive(Clone)]
pub struct TokenCipher {
    key: MasterKey,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    pub fn from_key(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self {
            key: MasterKey { bytes },
        }
    }

    /// 무작위 키 (테스트/일회성 저장소용)
    pub fn generate() -> Self {
        Self::from_key(generate_master_key())
    }

    /// base64 인코딩된 32-byte 키
    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let mut bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| VaultError::InvalidMasterKey)?;

        if bytes.len() != MASTER_KEY_LEN {
            bytes.zeroize();
            return Err(VaultError::InvalidMasterKey);
        }

        let mut key = [0u8; MASTER_KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self::from_key(key))
    }

    /// 설정 키 → Keychain 순으로 마스터키 확보
    pub fn from_config(config: &AtlassianConfig) -> Result<Self, VaultError> {
        if let Some(encoded) = config.token_encryption_key.as_deref() {
            tracing::debug!("Using token encryption key from environment");
            return Self::from_base64(encoded);
        }

        let key = match load_master_key_from_keychain() {
            Ok(key) => {
                tracing::info!("Master key loaded from keychain");
                key
            }
            Err(KeychainLookup::NoEntry) => {
                tracing::info!("No master key found, generating new one");
                let key = generate_master_key();
                save_master_key_to_keychain(&key)?;
                key
            }
            Err(KeychainLookup::Failed(e)) => return Err(e),
        };
        Ok(Self::from_key(key))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        encrypt_field(&self.key.bytes, plaintext)
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, VaultError> {
        decrypt_field(&self.key.bytes, stored)
    }
}

enum KeychainLookup {
    NoEntry,
    Failed(VaultError),
}

/// 마스터키 생성 (CSPRNG)
fn generate_master_key() -> [u8; MASTER_KEY_LEN] {
    let mut key = [0u8; MASTER_KEY_LEN];
    rand::thread_rng().fill(&mut key);
    key
}

/// Keychain에서 마스터키 로드
fn load_master_key_from_keychain() -> Result<[u8; MASTER_KEY_LEN], KeychainLookup> {
    let entry = Entry::new(KEYCHAIN_SERVICE, MASTER_KEY_KEYCHAIN_KEY)
        .map_err(|e| KeychainLookup::Failed(VaultError::Keychain(e.to_string())))?;

    let mut password = match entry.get_password() {
        Ok(password) => password,
        Err(keyring::Error::NoEntry) => return Err(KeychainLookup::NoEntry),
        Err(e) => return Err(KeychainLookup::Failed(VaultError::Keychain(e.to_string()))),
    };

    let cipher = TokenCipher::from_base64(&password).map_err(KeychainLookup::Failed);
    password.zeroize();
    Ok(cipher?.key.bytes)
}

/// Keychain에 마스터키 저장
fn save_master_key_to_keychain(key: &[u8; MASTER_KEY_LEN]) -> Result<(), VaultError> {
    let entry = Entry::new(KEYCHAIN_SERVICE, MASTER_KEY_KEYCHAIN_KEY)
        .map_err(|e| VaultError::Keychain(e.to_string()))?;

    let mut encoded = BASE64.encode(key);
    let result = entry
        .set_password(&encoded)
        .map_err(|e| VaultError::Keychain(e.to_string()));
    encoded.zeroize();
    result
}
