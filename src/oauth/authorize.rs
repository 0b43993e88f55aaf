//! Atlassian 인가 리다이렉트 URL 생성
//!
//! 순수 함수: 네트워크 호출이나 부수 효과 없음. 실제 이동은 호출자 책임.

use crate::config::AtlassianConfig;
use crate::oauth::state::OAuthState;

/// Atlassian 인가 엔드포인트
pub const ATLASSIAN_AUTHORIZE_URL: &str = "https://auth.atlassian.com/authorize";
/// 토큰 audience (고정)
pub const ATLASSIAN_AUDIENCE: &str = "api.atlassian.com";

/// 인가 요청 파라미터 (호출자 제공 값)
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    /// 공백으로 구분된 scope 문자열
    pub scope: &'a str,
    pub state: &'a str,
}

impl<'a> AuthorizationRequest<'a> {
    pub fn from_config(config: &'a AtlassianConfig, state: &'a OAuthState) -> Self {
        Self {
            client_id: &config.client_id,
            redirect_uri: &config.redirect_uri,
            scope: &config.scopes,
            state: state.as_str(),
        }
    }
}

/// 기본 엔드포인트로 인가 URL 생성
pub fn build_authorization_url(request: &AuthorizationRequest<'_>) -> String {
    build_authorization_url_with_base(ATLASSIAN_AUTHORIZE_URL, request)
}

/// 지정한 엔드포인트로 인가 URL 생성
///
/// `prompt=consent`로 재연결 시에도 항상 동의 화면을 띄웁니다.
pub fn build_authorization_url_with_base(base: &str, request: &AuthorizationRequest<'_>) -> String {
    format!(
        "{}?audience={}&client_id={}&scope={}&redirect_uri={}&state={}&response_type=code&prompt=consent",
        base,
        urlencoding::encode(ATLASSIAN_AUDIENCE),
        urlencoding::encode(request.client_id),
        urlencoding::encode(request.scope),
        urlencoding::encode(request.redirect_uri),
        urlencoding::encode(request.state),
    )
}
