//! OAuth state 저장소
//!
//! 리다이렉트 전에 생성한 랜덤 state를 단일 슬롯에 보관하고,
//! 콜백 복귀 시 돌아온 `state` 파라미터와 비교합니다.
//!
//! - 쓰기: connect 액션 1곳 (새 시도마다 덮어씀, last-write-wins)
//! - 읽기: 콜백 핸들러 1곳 (비교 후 결과와 무관하게 삭제)

use rand::RngCore;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

/// 슬롯 키 (고정)
pub const OAUTH_STATE_KEY: &str = "atlassian_oauth_state";

/// state 바이트 길이 (256-bit, hex 인코딩 시 64자)
pub const STATE_BYTES: usize = 32;

/// 불투명한 OAuth state 토큰
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthState(String);

impl OAuthState {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for OAuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 단일 항목 key-value 저장소 (브라우저 sessionStorage 대응)
pub trait StateSlot: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn clear(&self, key: &str) -> Result<()>;
}

/// 프로세스 메모리 슬롯
#[derive(Debug, Default)]
pub struct MemorySlot {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateSlot for MemorySlot {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

/// 파일 슬롯
///
/// 브라우저 리다이렉트 동안 프로세스가 바뀌어도 state가 유지되어야 하는
/// 데스크톱/CLI 호스트용. 키마다 `<dir>/<key>.state` 파일 1개.
#[derive(Debug, Clone)]
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.state", key))
    }
}

impl StateSlot for FileSlot {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim().to_string()).filter(|v| !v.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        write_atomic(&path, value.as_bytes())?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 임시 파일에 쓰고 rename
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("state.tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)
}

/// OAuth state 저장소
pub struct OAuthStateStore<S: StateSlot> {
    slot: S,
}

impl<S: StateSlot> OAuthStateStore<S> {
    pub fn new(slot: S) -> Self {
        Self { slot }
    }

    /// 새 state 생성 후 슬롯에 저장 (이전 값은 덮어씀)
    pub fn generate(&self) -> Result<OAuthState> {
        let mut bytes = [0u8; STATE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let state = hex::encode(bytes);

        self.slot.set(OAUTH_STATE_KEY, &state)?;
        tracing::debug!("Generated new OAuth state");
        Ok(OAuthState(state))
    }

    /// 돌아온 state가 저장된 값과 정확히 같은지 비교 (슬롯은 유지)
    ///
    /// 저장된 값이 없거나 다르면 false.
    pub fn verify(&self, returned: &str) -> bool {
        if returned.is_empty() {
            return false;
        }
        match self.slot.get(OAUTH_STATE_KEY) {
            Ok(Some(stored)) => stored.as_bytes() == returned.as_bytes(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored OAuth state");
                false
            }
        }
    }

    /// 저장된 state 삭제 (없어도 성공)
    pub fn clear(&self) -> Result<()> {
        self.slot.clear(OAUTH_STATE_KEY)
    }

    /// 비교 후 결과와 무관하게 슬롯을 비움 (콜백 1회당 1번 호출)
    pub fn verify_and_clear(&self, returned: &str) -> bool {
        let matched = self.verify(returned);
        if let Err(e) = self.clear() {
            tracing::warn!(error = %e, "Failed to clear stored OAuth state");
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generated_state_is_64_hex_chars() {
        let store = OAuthStateStore::new(MemorySlot::new());
        let state = store.generate().unwrap();
        assert_eq!(state.as_str().len(), STATE_BYTES * 2);
        assert!(state.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_accepts_only_latest_state() {
        let store = OAuthStateStore::new(MemorySlot::new());
        let first = store.generate().unwrap();
        let second = store.generate().unwrap();

        assert_ne!(first, second);
        assert!(!store.verify(first.as_str()));
        assert!(store.verify(second.as_str()));
    }

    #[test]
    fn verify_rejects_empty_and_unknown() {
        let store = OAuthStateStore::new(MemorySlot::new());
        assert!(!store.verify("anything"));

        let state = store.generate().unwrap();
        assert!(!store.verify(""));
        assert!(!store.verify(&state.as_str().to_uppercase()));
        assert!(!store.verify(&state.as_str()[..10]));
    }

    #[test]
    fn state_is_single_use() {
        let store = OAuthStateStore::new(MemorySlot::new());
        let state = store.generate().unwrap();

        assert!(store.verify_and_clear(state.as_str()));
        assert!(!store.verify_and_clear(state.as_str()));
    }

    #[test]
    fn mismatch_still_clears_slot() {
        let store = OAuthStateStore::new(MemorySlot::new());
        let state = store.generate().unwrap();

        assert!(!store.verify_and_clear("not-the-state"));
        assert!(!store.verify(state.as_str()));
    }

    #[test]
    fn clear_is_idempotent() {
        let store = OAuthStateStore::new(MemorySlot::new());
        store.clear().unwrap();
        store.generate().unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn file_slot_survives_new_store_instance() {
        let dir = tempdir().unwrap();
        let state = OAuthStateStore::new(FileSlot::new(dir.path()))
            .generate()
            .unwrap();

        let reopened = OAuthStateStore::new(FileSlot::new(dir.path()));
        assert!(reopened.verify_and_clear(state.as_str()));
        assert!(!dir.path().join(format!("{}.state", OAUTH_STATE_KEY)).exists());
    }
}
