//! Atlassian OAuth 2.0 (3LO) 클라이언트 측 구현
//!
//! - CSRF 방지용 state 저장소 (single slot)
//! - 인가 리다이렉트 URL 생성

pub mod authorize;
pub mod state;

pub use authorize::{build_authorization_url, AuthorizationRequest, ATLASSIAN_AUTHORIZE_URL};
pub use state::{FileSlot, MemorySlot, OAuthState, OAuthStateStore, StateSlot, OAUTH_STATE_KEY};
