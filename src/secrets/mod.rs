//! 토큰 암호화 모듈
//!
//! Master Key + AEAD 필드 암호화로 Atlassian 토큰을 저장합니다.
//!
//! - 마스터키는 환경 변수 또는 Keychain에 1개만 보관 (`atlassian-link:master_key_v1`)
//! - access/refresh token은 DB 컬럼 단위로 XChaCha20-Poly1305 암호화

pub mod manager;
pub mod vault;

pub use manager::TokenCipher;
pub use vault::VaultError;
