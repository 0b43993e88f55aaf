//! Atlassian Link Error Types
//!
//! 연결 흐름, API 호출, 백엔드 서비스 전역 에러 타입 정의

use serde::Serialize;
use thiserror::Error;

/// Atlassian 연동 에러
#[derive(Error, Debug)]
pub enum AtlassianError {
    /// Client ID / Redirect URI 누락 등 (네트워크 호출 전에 실패)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 콜백 state가 저장된 값과 다름 (CSRF)
    #[error("OAuth state verification failed")]
    StateMismatch,

    /// 리다이렉트 복귀 시 `error` 파라미터 (원문 그대로 노출)
    #[error("Atlassian authorization denied: {0}")]
    UpstreamDenied(String),

    /// 인가 코드 교환 실패 (만료/재사용/잘못된 코드)
    #[error("Failed to establish Atlassian connection: {0}")]
    ExchangeFailed(String),

    /// 콜백 교환이 이미 진행 중
    #[error("An Atlassian connection attempt is already in progress")]
    ExchangeInFlight,

    /// non-2xx 응답 (구조화된 에러 본문의 detail 포함)
    #[error("Atlassian API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Atlassian integration is not enabled")]
    IntegrationDisabled,

    #[error("No Atlassian connection found")]
    NotConnected,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Vault error: {0}")]
    Vault(#[from] crate::secrets::vault::VaultError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AtlassianError {
    /// HTTP 상태 코드 (백엔드 서비스 응답 매핑용)
    pub fn status_code(&self) -> u16 {
        match self {
            AtlassianError::Config(_) => 500,
            AtlassianError::StateMismatch => 400,
            AtlassianError::UpstreamDenied(_) => 400,
            AtlassianError::ExchangeFailed(_) => 500,
            AtlassianError::ExchangeInFlight => 409,
            AtlassianError::Api { status, .. } => *status,
            AtlassianError::Transport(_) => 502,
            AtlassianError::Timeout => 504,
            AtlassianError::IntegrationDisabled => 503,
            AtlassianError::NotConnected => 404,
            AtlassianError::NotFound(_) => 404,
            AtlassianError::Database(_)
            | AtlassianError::Vault(_)
            | AtlassianError::Io(_)
            | AtlassianError::Serialization(_) => 500,
        }
    }
}

impl From<reqwest::Error> for AtlassianError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AtlassianError::Timeout
        } else {
            AtlassianError::Transport(err.to_string())
        }
    }
}

/// 사용자 노출용 직렬화 가능한 에러
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl From<AtlassianError> for CommandError {
    fn from(error: AtlassianError) -> Self {
        let code = match &error {
            AtlassianError::Config(_) => "CONFIG_ERROR",
            AtlassianError::StateMismatch => "STATE_MISMATCH",
            AtlassianError::UpstreamDenied(_) => "UPSTREAM_DENIED",
            AtlassianError::ExchangeFailed(_) => "EXCHANGE_FAILED",
            AtlassianError::ExchangeInFlight => "EXCHANGE_IN_FLIGHT",
            AtlassianError::Api { .. } => "API_ERROR",
            AtlassianError::Transport(_) => "NETWORK_ERROR",
            AtlassianError::Timeout => "TIMEOUT",
            AtlassianError::IntegrationDisabled => "INTEGRATION_DISABLED",
            AtlassianError::NotConnected => "NOT_CONNECTED",
            AtlassianError::NotFound(_) => "NOT_FOUND",
            AtlassianError::Database(_) => "DB_ERROR",
            AtlassianError::Vault(_) => "VAULT_ERROR",
            AtlassianError::Io(_) => "IO_ERROR",
            AtlassianError::Serialization(_) => "SERIALIZATION_ERROR",
        };

        // 교환 실패는 일반 메시지로, 원본 사유는 details에만 남김
        let (message, details) = match &error {
            AtlassianError::ExchangeFailed(reason) => (
                "Failed to establish Atlassian connection".to_string(),
                Some(reason.clone()),
            ),
            AtlassianError::Transport(reason) => {
                ("Network error while contacting the server".to_string(), Some(reason.clone()))
            }
            _ => (error.to_string(), None),
        };

        CommandError {
            code: code.to_string(),
            message,
            details,
        }
    }
}

/// 명령 결과 타입
pub type CommandResult<T> = Result<T, CommandError>;

/// 라이브러리 내부 결과 타입
pub type Result<T, E = AtlassianError> = std::result::Result<T, E>;
