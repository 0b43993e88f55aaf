//! Atlassian 업스트림 호출 (토큰 엔드포인트 + api.atlassian.com)

use chrono::{DateTime, Duration, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::AtlassianConfig;
use crate::error::{AtlassianError, Result};
use crate::models::SiteInfo;

pub const ATLASSIAN_TOKEN_URL: &str = "https://auth.atlassian.com/oauth/token";
pub const ATLASSIAN_API_URL: &str = "https://api.atlassian.com";

/// 업스트림 엔드포인트 (테스트에서 mock 서버로 교체)
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEndpoints {
    pub token_url: String,
    pub api_base_url: String,
}

impl Default for UpstreamEndpoints {
    fn default() -> Self {
        Self {
            token_url: ATLASSIAN_TOKEN_URL.to_string(),
            api_base_url: ATLASSIAN_API_URL.to_string(),
        }
    }
}

impl UpstreamEndpoints {
    /// 하나의 mock 서버에 모두 연결 (`{base}/oauth/token`, `{base}/...`)
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            token_url: format!("{}/oauth/token", base),
            api_base_url: base.to_string(),
        }
    }
}

/// 토큰 엔드포인트 응답
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// rotation 시에만 새 값이 옴
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// 만료 시각 (`expires_in`이 표현 범위를 넘으면 None)
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Duration::try_seconds(self.expires_in).and_then(|lifetime| now.checked_add_signed(lifetime))
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token_len", &self.access_token.len())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum TokenRequest<'a> {
    AuthorizationCode {
        client_id: &'a str,
        client_secret: &'a str,
        code: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken {
        client_id: &'a str,
        client_secret: &'a str,
        refresh_token: &'a str,
    },
}

#[derive(Deserialize)]
struct MeResponse {
    account_id: String,
}

#[derive(Deserialize)]
struct AccessibleResource {
    id: String,
    name: String,
    url: String,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default, rename = "avatarUrl")]
    avatar_url: Option<String>,
}

impl From<AccessibleResource> for SiteInfo {
    fn from(r: AccessibleResource) -> Self {
        SiteInfo {
            id: r.id,
            name: r.name,
            url: r.url,
            scopes: r.scopes,
            avatar_url: r.avatar_url,
        }
    }
}

/// 상태 코드 + 본문 (프록시 응답)
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: String,
}

impl UpstreamResponse {
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Atlassian 업스트림 클라이언트
#[derive(Debug, Clone)]
pub struct AtlassianUpstream {
    http: reqwest::Client,
    endpoints: UpstreamEndpoints,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl AtlassianUpstream {
    pub fn new(config: &AtlassianConfig, endpoints: UpstreamEndpoints) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AtlassianError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoints,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    async fn token_request(&self, request: &TokenRequest<'_>) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AtlassianError::Api {
                status: status.as_u16(),
                detail: body.chars().take(200).collect(),
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        tracing::debug!(
            access_token_len = token.access_token.len(),
            expires_in = token.expires_in,
            "Atlassian token response received"
        );
        Ok(token)
    }

    /// Authorization code를 토큰으로 교환
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        tracing::info!("Exchanging Atlassian authorization code");
        self.token_request(&TokenRequest::AuthorizationCode {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            code,
            redirect_uri: &self.redirect_uri,
        })
        .await
    }

    /// 토큰 갱신
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        tracing::info!("Refreshing Atlassian access token");
        self.token_request(&TokenRequest::RefreshToken {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            refresh_token,
        })
        .await
    }

    /// api.atlassian.com GET (상태 코드는 호출 측에서 해석)
    pub async fn get(
        &self,
        access_token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<UpstreamResponse> {
        let response = self
            .http
            .request(Method::GET, format!("{}{}", self.endpoints.api_base_url, path))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(path, status = status.as_u16(), "Atlassian upstream returned error");
        }
        Ok(UpstreamResponse { status, body })
    }

    /// 현재 토큰의 Atlassian account id
    pub async fn account_id(&self, access_token: &str) -> Result<String> {
        let response = self.get(access_token, "/me", &[]).await?;
        if !response.status.is_success() {
            return Err(AtlassianError::Api {
                status: response.status.as_u16(),
                detail: "Failed to get user info from Atlassian".to_string(),
            });
        }
        let me: MeResponse = serde_json::from_str(&response.body)?;
        Ok(me.account_id)
    }

    /// 접근 가능한 사이트 목록
    pub async fn accessible_resources(&self, access_token: &str) -> Result<Vec<SiteInfo>> {
        let response = self
            .get(access_token, "/oauth/token/accessible-resources", &[])
            .await?;
        if !response.status.is_success() {
            return Err(AtlassianError::Api {
                status: response.status.as_u16(),
                detail: "Failed to get accessible sites".to_string(),
            });
        }
        let resources: Vec<AccessibleResource> = serde_json::from_str(&response.body)?;
        Ok(resources.into_iter().map(SiteInfo::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn expiry_out_of_range_is_none() {
        let token = |expires_in| TokenResponse {
            access_token: "at".into(),
            refresh_token: None,
            expires_in,
            scope: None,
        };
        let now = Utc::now();
        assert_eq!(token(3600).expires_at(now), Some(now + Duration::hours(1)));
        assert!(token(i64::MAX).expires_at(now).is_none());
        assert!(token(i64::MIN).expires_at(now).is_none());
    }

    fn upstream(server: &MockServer) -> AtlassianUpstream {
        let config = AtlassianConfig {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            redirect_uri: "https://chat.example.com/cb".into(),
            ..AtlassianConfig::default()
        };
        AtlassianUpstream::new(&config, UpstreamEndpoints::single_host(&server.uri())).unwrap()
    }

    #[tokio::test]
    async fn code_exchange_sends_json_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_json(json!({
                "grant_type": "authorization_code",
                "client_id": "cid",
                "client_secret": "secret",
                "code": "C",
                "redirect_uri": "https://chat.example.com/cb"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600,
                "scope": "read:jira-work offline_access"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = upstream(&server).exchange_code("C").await.unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert!(!format!("{:?}", token).contains("\"at\""));
    }

    #[tokio::test]
    async fn refresh_without_rotation_has_no_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at2",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let token = upstream(&server).refresh("rt").await.unwrap();
        assert!(token.refresh_token.is_none());
    }

    #[tokio::test]
    async fn rejected_grant_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(403).set_body_string(r#"{"error":"invalid_grant"}"#))
            .mount(&server)
            .await;

        let err = upstream(&server).exchange_code("used").await.unwrap_err();
        assert!(matches!(err, AtlassianError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn accessible_resources_maps_sites() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/token/accessible-resources"))
            .and(header("authorization", "Bearer at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "cloud-1",
                "name": "Acme",
                "url": "https://acme.atlassian.net",
                "scopes": ["read:jira-work"],
                "avatarUrl": "https://a/x.png"
            }])))
            .mount(&server)
            .await;

        let sites = upstream(&server).accessible_resources("at").await.unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].id, "cloud-1");
        assert_eq!(sites[0].avatar_url.as_deref(), Some("https://a/x.png"));
    }
}
