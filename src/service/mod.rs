//! Atlassian 연결 서비스 (백엔드)
//!
//! 인가 코드 교환, 암호화된 토큰 저장, 만료 토큰 자동 갱신,
//! Jira/Confluence 검색 및 상세 조회 프록시를 담당합니다.
//! HTTP 라우팅은 호스트 서버 몫이며, 각 메서드가 엔드포인트 하나에 대응합니다.

pub mod query;
pub mod upstream;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::api::types::NO_ACCESS;
use crate::config::AtlassianConfig;
use crate::db::{Database, NewConnection, StoredConnection};
use crate::error::{AtlassianError, Result};
use crate::models::{
    CallbackRequest, CallbackResponse, ConfluenceSearchRequest, ConnectionRecord, ConnectionStatus,
    DetailResponse, JiraSearchRequest, SiteInfo,
};
use crate::secrets::TokenCipher;

pub use upstream::{AtlassianUpstream, TokenResponse, UpstreamEndpoints};

/// 만료 5분 전부터 갱신
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

const CONFLUENCE_NO_ACCESS_MESSAGE: &str =
    "You don't have access to Confluence on this site. Please check with your Atlassian administrator.";
const CONFLUENCE_SPACES_NO_ACCESS_MESSAGE: &str = "You don't have access to Confluence on this site.";
const JIRA_NO_ACCESS_MESSAGE: &str =
    "You don't have access to Jira on this site. Please check with your Atlassian administrator.";

/// Atlassian 연결 서비스
pub struct AtlassianConnectionService {
    config: AtlassianConfig,
    db: Mutex<Database>,
    upstream: AtlassianUpstream,
}

impl AtlassianConnectionService {
    pub fn new(config: AtlassianConfig, db: Database, endpoints: UpstreamEndpoints) -> Result<Self> {
        db.initialize()?;
        let upstream = AtlassianUpstream::new(&config, endpoints)?;
        Ok(Self {
            config,
            db: Mutex::new(db),
            upstream,
        })
    }

    /// 설정 기반 생성 (마스터키는 환경 변수 → Keychain 순)
    pub fn open(config: AtlassianConfig, db_path: &Path) -> Result<Self> {
        let cipher = TokenCipher::from_config(&config)?;
        let db = Database::new(db_path, cipher)?;
        Self::new(config, db, UpstreamEndpoints::default())
    }

    pub fn config(&self) -> &AtlassianConfig {
        &self.config
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(AtlassianError::IntegrationDisabled)
        }
    }

    fn require_connection(&self, user_id: &str) -> Result<StoredConnection> {
        self.db()
            .get_active_connection(user_id)?
            .ok_or(AtlassianError::NotConnected)
    }

    /// 필요 시 토큰 갱신 후 저장
    ///
    /// 새 refresh token이 오지 않으면 기존 값을 유지합니다.
    async fn refresh_if_needed(&self, connection: StoredConnection) -> Result<StoredConnection> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if !connection.needs_refresh(Utc::now(), margin) {
            return Ok(connection);
        }

        let token = self.upstream.refresh(&connection.refresh_token).await?;
        let refresh_token = token
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| connection.refresh_token.clone());
        let expires_at = token.expires_at(Utc::now()).ok_or_else(|| AtlassianError::Api {
            status: 502,
            detail: invalid_lifetime(token.expires_in),
        })?;

        let user_id = connection.record.user_id.clone();
        let updated = self
            .db()
            .update_tokens(&user_id, &token.access_token, &refresh_token, expires_at)?;

        tracing::info!(user_id = %user_id, "Atlassian token refreshed");

        // 갱신 도중 비활성화된 경우 새 토큰으로 이번 요청만 처리
        Ok(updated.unwrap_or(StoredConnection {
            access_token: token.access_token,
            refresh_token,
            token_expires_at: expires_at,
            ..connection
        }))
    }

    /// 프록시 요청용 연결 (갱신 실패 시 기존 토큰으로 계속)
    async fn usable_connection(&self, user_id: &str) -> Result<StoredConnection> {
        let connection = self.require_connection(user_id)?;
        let fallback = connection.clone();
        match self.refresh_if_needed(connection).await {
            Ok(fresh) => Ok(fresh),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Atlassian token refresh failed, using stored token");
                Ok(fallback)
            }
        }
    }

    async fn require_site(&self, connection: &StoredConnection, site_id: &str) -> Result<SiteInfo> {
        self.upstream
            .accessible_resources(&connection.access_token)
            .await?
            .into_iter()
            .find(|s| s.id == site_id)
            .ok_or_else(|| AtlassianError::NotFound("Site not found".to_string()))
    }

    /// 연결 상태 + 접근 가능한 사이트
    ///
    /// 토큰 갱신에 실패하면 연결을 비활성화하고 미연결로 응답합니다.
    pub async fn status(&self, user_id: &str) -> Result<ConnectionStatus> {
        self.ensure_enabled()?;

        let Some(connection) = self.db().get_active_connection(user_id)? else {
            return Ok(ConnectionStatus::disconnected());
        };

        let connection = match self.refresh_if_needed(connection).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Atlassian token refresh failed, deactivating connection");
                self.db().deactivate_connection(user_id)?;
                return Ok(ConnectionStatus::disconnected());
            }
        };

        let sites = match self.upstream.accessible_resources(&connection.access_token).await {
            Ok(sites) => sites,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to list accessible Atlassian sites");
                Vec::new()
            }
        };

        Ok(ConnectionStatus {
            connected: true,
            sites,
            connection_info: Some(connection.record),
        })
    }

    /// 인가 코드 교환 후 연결 저장
    pub async fn handle_callback(&self, user_id: &str, callback: &CallbackRequest) -> Result<CallbackResponse> {
        self.ensure_enabled()?;
        self.config.ensure_can_exchange()?;

        let token = self
            .upstream
            .exchange_code(&callback.code)
            .await
            .map_err(|e| exchange_failed("code exchange", e))?;
        let token_expires_at = token
            .expires_at(Utc::now())
            .ok_or_else(|| AtlassianError::ExchangeFailed(invalid_lifetime(token.expires_in)))?;

        let account_id = self
            .upstream
            .account_id(&token.access_token)
            .await
            .map_err(|e| exchange_failed("account lookup", e))?;

        let refresh_token = token.refresh_token.clone().unwrap_or_else(|| {
            tracing::warn!(user_id, "Atlassian did not return a refresh token (offline_access missing?)");
            String::new()
        });

        let form = NewConnection {
            user_id: user_id.to_string(),
            atlassian_account_id: account_id,
            access_token: token.access_token,
            refresh_token,
            token_expires_at,
            scopes: token.scope.unwrap_or_else(|| self.config.scopes.clone()),
        };
        let connection = self.db().create_connection(&form)?;

        Ok(CallbackResponse {
            detail: "Atlassian connection established successfully".to_string(),
            connection,
        })
    }

    /// 연결 해제
    pub fn disconnect(&self, user_id: &str) -> Result<DetailResponse> {
        self.ensure_enabled()?;
        if self.db().remove_connection(user_id)? {
            tracing::info!(user_id, "Atlassian connection removed");
            Ok(DetailResponse {
                detail: "Atlassian connection disconnected successfully".to_string(),
            })
        } else {
            Err(AtlassianError::NotFound("No active Atlassian connection found".to_string()))
        }
    }

    /// 접근 가능한 사이트 목록
    pub async fn sites(&self, user_id: &str) -> Result<Vec<SiteInfo>> {
        self.ensure_enabled()?;
        let connection = self.usable_connection(user_id).await?;
        self.upstream.accessible_resources(&connection.access_token).await
    }

    /// Confluence space 목록 (권한 없으면 `no_access`)
    pub async fn confluence_spaces(&self, user_id: &str, site_id: &str) -> Result<Value> {
        self.ensure_enabled()?;
        let connection = self.usable_connection(user_id).await?;
        self.require_site(&connection, site_id).await?;

        let path = format!(
            "/ex/confluence/{}/wiki/api/v2/spaces",
            urlencoding::encode(site_id)
        );
        let response = self
            .upstream
            .get(&connection.access_token, &path, &[("limit", "100".to_string())])
            .await?;

        proxy_result(response, CONFLUENCE_SPACES_NO_ACCESS_MESSAGE, "Failed to get Confluence spaces")
    }

    /// Jira 이슈 검색
    pub async fn search_jira(&self, user_id: &str, request: &JiraSearchRequest) -> Result<Value> {
        self.ensure_enabled()?;
        let connection = self.usable_connection(user_id).await?;

        let path = format!("/ex/jira/{}/rest/api/3/search", urlencoding::encode(&request.site_id));
        let params = [
            ("jql", query::jira_text_search(&request.query)),
            ("maxResults", request.max_results.to_string()),
            ("fields", query::JIRA_SEARCH_FIELDS.to_string()),
        ];
        let response = self.upstream.get(&connection.access_token, &path, &params).await?;

        proxy_result(response, JIRA_NO_ACCESS_MESSAGE, "Failed to search Jira issues")
    }

    /// Confluence 페이지 검색
    pub async fn search_confluence(&self, user_id: &str, request: &ConfluenceSearchRequest) -> Result<Value> {
        self.ensure_enabled()?;
        let connection = self.usable_connection(user_id).await?;
        self.require_site(&connection, &request.site_id).await?;

        let path = format!(
            "/ex/confluence/{}/rest/api/content/search",
            urlencoding::encode(&request.site_id)
        );
        let params = [
            (
                "cql",
                query::confluence_text_search(&request.query, request.space_key.as_deref()),
            ),
            ("limit", request.max_results.to_string()),
            ("expand", query::CONFLUENCE_SEARCH_EXPAND.to_string()),
        ];
        let response = self.upstream.get(&connection.access_token, &path, &params).await?;

        proxy_result(response, CONFLUENCE_NO_ACCESS_MESSAGE, "Failed to search Confluence pages")
    }

    /// Jira 이슈 상세
    pub async fn jira_issue(&self, user_id: &str, site_id: &str, issue_key: &str) -> Result<Value> {
        self.ensure_enabled()?;
        let connection = self.usable_connection(user_id).await?;

        let path = format!(
            "/ex/jira/{}/rest/api/3/issue/{}",
            urlencoding::encode(site_id),
            urlencoding::encode(issue_key)
        );
        let response = self
            .upstream
            .get(
                &connection.access_token,
                &path,
                &[("expand", query::JIRA_ISSUE_EXPAND.to_string())],
            )
            .await?;

        passthrough(response, "Failed to fetch Jira issue")
    }

    /// Confluence 페이지 상세
    pub async fn confluence_content(&self, user_id: &str, site_id: &str, content_id: &str) -> Result<Value> {
        self.ensure_enabled()?;
        let connection = self.usable_connection(user_id).await?;
        self.require_site(&connection, site_id).await?;

        let path = format!(
            "/ex/confluence/{}/rest/api/content/{}",
            urlencoding::encode(site_id),
            urlencoding::encode(content_id)
        );
        let response = self
            .upstream
            .get(
                &connection.access_token,
                &path,
                &[("expand", query::CONFLUENCE_CONTENT_EXPAND.to_string())],
            )
            .await?;

        passthrough(response, "Failed to fetch Confluence content")
    }

    /// 모든 활성 연결 (관리자)
    pub fn admin_list_connections(&self) -> Result<Vec<ConnectionRecord>> {
        self.db().list_active_connections()
    }

    /// 사용자 연결 영구 삭제 (관리자)
    pub fn admin_delete_connection(&self, user_id: &str) -> Result<DetailResponse> {
        if self.db().delete_connection(user_id)? {
            tracing::info!(user_id, "Atlassian connection deleted by admin");
            Ok(DetailResponse {
                detail: format!("Atlassian connection for user {} deleted successfully", user_id),
            })
        } else {
            Err(AtlassianError::NotFound(format!(
                "No Atlassian connection found for user {}",
                user_id
            )))
        }
    }
}

fn exchange_failed(step: &str, error: AtlassianError) -> AtlassianError {
    tracing::error!(step, error = %error, "Error handling Atlassian OAuth callback");
    match error {
        AtlassianError::Api { detail, .. } => AtlassianError::ExchangeFailed(detail),
        other => AtlassianError::ExchangeFailed(other.to_string()),
    }
}

fn invalid_lifetime(expires_in: i64) -> String {
    format!("Atlassian returned an invalid token lifetime: expires_in={}", expires_in)
}

/// 2xx면 본문 그대로, 아니면 고정 메시지의 Api 에러
fn passthrough(response: upstream::UpstreamResponse, failure: &str) -> Result<Value> {
    if response.status.is_success() {
        return response.json();
    }
    Err(AtlassianError::Api {
        status: response.status.as_u16(),
        detail: failure.to_string(),
    })
}

/// 검색/목록용: 403은 `no_access` 소프트 에러로 변환
fn proxy_result(response: upstream::UpstreamResponse, no_access_message: &str, failure: &str) -> Result<Value> {
    if response.status == StatusCode::FORBIDDEN {
        return Ok(json!({
            "results": [],
            "error": NO_ACCESS,
            "message": no_access_message,
        }));
    }
    passthrough(response, failure)
}
