//! 백엔드 Atlassian REST API 연동 모듈
//!
//! 애플리케이션 세션 토큰(bearer)으로 백엔드의 `/atlassian/...` 엔드포인트를 호출합니다.
//! Atlassian 토큰은 클라이언트에 노출되지 않습니다.

pub mod client;
pub mod types;

pub use client::{AtlassianApiClient, DisconnectOutcome};
pub use types::*;
