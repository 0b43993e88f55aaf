//! Atlassian Link - Jira/Confluence 계정 연결 라이브러리
//!
//! OAuth 2.0 (3LO) 연결 수명주기, 백엔드 API 클라이언트, 콘텐츠 선택기,
//! 그리고 토큰을 보관하는 백엔드 연결 서비스를 제공합니다.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod oauth;
pub mod panel;
pub mod picker;
pub mod render;
pub mod secrets;
pub mod service;

pub use api::{AtlassianApiClient, DisconnectOutcome, SearchOutcome};
pub use config::AtlassianConfig;
pub use error::{AtlassianError, CommandError, CommandResult};
pub use panel::{CallbackOutcome, ConnectionPanel, Navigator, PanelState, SystemBrowser};
pub use picker::{ContentPicker, ContentType, PickerItem, PickerView};
pub use render::{ContentKind, ContentMetadata, ImportedContent};
pub use service::AtlassianConnectionService;

/// 기본 로그 필터 (`RUST_LOG`가 없을 때)
pub const DEFAULT_LOG_FILTER: &str = "info,atlassian_link=debug";

/// 콘솔 로깅 초기화
///
/// `.env.local`/`.env`를 먼저 로드하므로 `RUST_LOG`도 파일에서 지정할 수 있습니다.
/// 이미 전역 subscriber가 있으면 아무 것도 하지 않습니다.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    config::load_env_files();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_layer = fmt::layer()
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}
