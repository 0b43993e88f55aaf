//! Atlassian 연동 설정
//!
//! 환경 변수에서 설정을 읽어 명시적인 `AtlassianConfig` 구조체로 보관합니다.
//! 파생 값(연결 가능 여부, scope 목록 등)은 구조체의 순수 함수로 계산되며,
//! 설정이 바뀌면 다시 호출하면 됩니다.

use std::time::Duration;

use crate::error::{AtlassianError, Result};

pub const ENV_ENABLED: &str = "ENABLE_ATLASSIAN_INTEGRATION";
pub const ENV_CLIENT_ID: &str = "ATLASSIAN_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "ATLASSIAN_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "ATLASSIAN_REDIRECT_URI";
pub const ENV_SCOPES: &str = "ATLASSIAN_SCOPES";
pub const ENV_API_BASE_URL: &str = "ATLASSIAN_API_BASE_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "ATLASSIAN_HTTP_TIMEOUT_SECS";
pub const ENV_TOKEN_ENCRYPTION_KEY: &str = "ATLASSIAN_TOKEN_ENCRYPTION_KEY";

/// 기본 요청 scope (Jira 읽기 + Confluence 읽기 + refresh token)
pub const DEFAULT_SCOPES: &str =
    "read:jira-work read:jira-user read:confluence-content.all read:confluence-space.summary search:confluence offline_access";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Atlassian 연동 설정
#[derive(Debug, Clone, PartialEq)]
pub struct AtlassianConfig {
    pub enabled: bool,
    pub client_id: String,
    /// 백엔드 서비스에서만 사용 (클라이언트에 노출 금지)
    pub client_secret: String,
    pub redirect_uri: String,
    /// 공백으로 구분된 scope 문자열
    pub scopes: String,
    /// 애플리케이션 API base (예: `https://chat.example.com/api/v1`)
    pub api_base_url: String,
    pub http_timeout: Duration,
    /// base64 인코딩된 32-byte 토큰 암호화 키
    pub token_encryption_key: Option<String>,
}

impl Default for AtlassianConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scopes: DEFAULT_SCOPES.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            token_encryption_key: None,
        }
    }
}

impl AtlassianConfig {
    /// 현재 프로세스 환경 변수에서 로드
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 key → value 조회 함수에서 로드 (테스트에서 환경 변수 오염 방지)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let enabled = get(ENV_ENABLED)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(defaults.enabled);

        let http_timeout = get(ENV_HTTP_TIMEOUT_SECS)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        Self {
            enabled,
            client_id: get(ENV_CLIENT_ID).unwrap_or_default(),
            client_secret: get(ENV_CLIENT_SECRET).unwrap_or_default(),
            redirect_uri: get(ENV_REDIRECT_URI).unwrap_or_default(),
            scopes: get(ENV_SCOPES).unwrap_or(defaults.scopes),
            api_base_url: get(ENV_API_BASE_URL)
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            http_timeout,
            token_encryption_key: get(ENV_TOKEN_ENCRYPTION_KEY),
        }
    }

    /// 연결 시작 가능 여부 (client id와 redirect URI 모두 필요)
    pub fn can_connect(&self) -> bool {
        self.missing_connect_fields().is_empty()
    }

    /// 연결 시작에 필요한데 비어 있는 항목 이름
    pub fn missing_connect_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.trim().is_empty() {
            missing.push(ENV_CLIENT_ID);
        }
        if self.redirect_uri.trim().is_empty() {
            missing.push(ENV_REDIRECT_URI);
        }
        missing
    }

    /// 연결 시작 전 검증 (설정 에러는 네트워크 호출 없이 즉시 반환)
    pub fn ensure_can_connect(&self) -> Result<()> {
        let missing = self.missing_connect_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AtlassianError::Config(format!(
                "Atlassian OAuth is not configured (missing {})",
                missing.join(", ")
            )))
        }
    }

    /// 백엔드 토큰 교환에 필요한 설정 검증
    pub fn ensure_can_exchange(&self) -> Result<()> {
        self.ensure_can_connect()?;
        if self.client_secret.trim().is_empty() {
            return Err(AtlassianError::Config(format!(
                "Atlassian OAuth is not configured (missing {})",
                ENV_CLIENT_SECRET
            )));
        }
        Ok(())
    }

    /// scope 목록 (공백 구분, 중복 제거, 순서 유지)
    pub fn scope_list(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for scope in self.scopes.split_whitespace() {
            if !out.contains(&scope) {
                out.push(scope);
            }
        }
        out
    }

    /// refresh token 발급을 위한 `offline_access` 포함 여부
    pub fn requests_offline_access(&self) -> bool {
        self.scope_list().contains(&"offline_access")
    }
}

/// `.env.local` → `.env` 순으로 환경 파일 로드
///
/// 현재 디렉터리부터 상위로 찾으며, 이미 설정된 변수는 덮어쓰지 않습니다.
/// 파일이 없는 배포 환경에서는 아무 것도 하지 않습니다.
pub fn load_env_files() {
    for filename in [".env.local", ".env"] {
        match dotenvy::from_filename(filename) {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(file = filename, error = %e, "Failed to load env file"),
        }
    }
}
