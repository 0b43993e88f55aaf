//! 백엔드 Atlassian API 클라이언트
//!
//! 요청/응답 타입 경계만 담당합니다. 재시도는 하지 않으며,
//! 재시도 여부는 UI(사용자)가 결정합니다.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::api::types::*;
use crate::config::AtlassianConfig;
use crate::error::{AtlassianError, Result};
use crate::models::{
    CallbackRequest, CallbackResponse, ConfluenceSearchRequest, ConnectionStatus, DetailResponse,
    JiraSearchRequest, SiteInfo,
};

/// 에러 본문 미리보기 최대 길이
const ERROR_BODY_PREVIEW: usize = 200;

/// disconnect 결과
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectOutcome {
    Disconnected { detail: String },
    /// 백엔드가 404(활성 연결 없음)를 반환한 경우
    AlreadyDisconnected,
}

/// 백엔드 Atlassian API 클라이언트
#[derive(Debug, Clone)]
pub struct AtlassianApiClient {
    http: reqwest::Client,
    /// 애플리케이션 API base (끝 `/` 없음)
    base_url: String,
    /// 애플리케이션 세션 토큰 (Atlassian 토큰 아님)
    session_token: String,
}

impl AtlassianApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AtlassianError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_token: session_token.into(),
        })
    }

    pub fn from_config(config: &AtlassianConfig, session_token: impl Into<String>) -> Result<Self> {
        Self::new(config.api_base_url.clone(), session_token, config.http_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.session_token)
            .header("Accept", "application/json")
    }

    /// 요청 전송 후 2xx면 JSON 파싱, 아니면 구조화된 에러로 변환
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(operation = what, error = %e, "Atlassian request failed");
            AtlassianError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = error_detail(status, &body);
            tracing::warn!(operation = what, status = status.as_u16(), %detail, "Atlassian request rejected");
            return Err(AtlassianError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(operation = what, error = %e, "Failed to parse Atlassian response");
            AtlassianError::Serialization(e)
        })
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        what: &str,
    ) -> Result<T> {
        self.send_json(self.request(Method::POST, path).json(body), what).await
    }

    /// 연결 상태 + 접근 가능한 사이트
    ///
    /// 연결되지 않은 상태는 에러가 아니라 `connected: false`입니다.
    pub async fn get_connection_status(&self) -> Result<ConnectionStatus> {
        self.send_json(
            self.request(Method::GET, "/atlassian/connection/status"),
            "connection_status",
        )
        .await
    }

    /// 인가 코드 교환
    ///
    /// 코드는 1회용이므로 절대 재시도하지 않습니다.
    pub async fn submit_callback(&self, callback: &CallbackRequest) -> Result<CallbackResponse> {
        tracing::info!(code_len = callback.code.len(), "Submitting Atlassian OAuth callback");
        self.post_json("/atlassian/connection/callback", callback, "submit_callback")
            .await
    }

    /// 연결 해제
    pub async fn disconnect(&self) -> Result<DisconnectOutcome> {
        let result: Result<DetailResponse> = self
            .send_json(self.request(Method::DELETE, "/atlassian/connection"), "disconnect")
            .await;

        match result {
            Ok(response) => Ok(DisconnectOutcome::Disconnected {
                detail: response.detail,
            }),
            Err(AtlassianError::Api { status: 404, .. }) => {
                tracing::info!("Atlassian connection was already disconnected");
                Ok(DisconnectOutcome::AlreadyDisconnected)
            }
            Err(e) => Err(e),
        }
    }

    /// 접근 가능한 사이트 목록
    pub async fn list_sites(&self) -> Result<Vec<SiteInfo>> {
        self.send_json(self.request(Method::GET, "/atlassian/sites"), "list_sites")
            .await
    }

    /// Jira 이슈 검색
    pub async fn search_issues(
        &self,
        site_id: &str,
        query: &str,
        max_results: u32,
    ) -> Result<SearchOutcome<JiraIssue>> {
        let request = JiraSearchRequest {
            site_id: site_id.to_string(),
            query: query.to_string(),
            max_results,
        };
        let value: serde_json::Value = self
            .post_json("/atlassian/search/jira", &request, "search_jira")
            .await?;
        Ok(SearchOutcome::from_value(value, "issues")?)
    }

    /// Confluence 페이지 검색 (space 필터 선택)
    pub async fn search_pages(
        &self,
        site_id: &str,
        query: &str,
        space_key: Option<&str>,
        max_results: u32,
    ) -> Result<SearchOutcome<ConfluencePage>> {
        let request = ConfluenceSearchRequest {
            site_id: site_id.to_string(),
            query: query.to_string(),
            space_key: space_key
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            max_results,
        };
        let value: serde_json::Value = self
            .post_json("/atlassian/search/confluence", &request, "search_confluence")
            .await?;
        Ok(SearchOutcome::from_value(value, "results")?)
    }

    /// Confluence space 목록
    pub async fn list_spaces(&self, site_id: &str) -> Result<SearchOutcome<ConfluenceSpace>> {
        let path = format!("/atlassian/confluence/{}/spaces", urlencoding::encode(site_id));
        let value: serde_json::Value = self
            .send_json(self.request(Method::GET, &path), "list_spaces")
            .await?;
        Ok(SearchOutcome::from_value(value, "results")?)
    }

    /// Jira 이슈 상세
    pub async fn get_issue(&self, site_id: &str, issue_key: &str) -> Result<JiraIssue> {
        let path = format!(
            "/atlassian/jira/{}/issue/{}",
            urlencoding::encode(site_id),
            urlencoding::encode(issue_key)
        );
        self.send_json(self.request(Method::GET, &path), "get_issue").await
    }

    /// Confluence 페이지 상세
    pub async fn get_content(&self, site_id: &str, content_id: &str) -> Result<ConfluencePage> {
        let path = format!(
            "/atlassian/confluence/{}/content/{}",
            urlencoding::encode(site_id),
            urlencoding::encode(content_id)
        );
        self.send_json(self.request(Method::GET, &path), "get_content").await
    }
}

/// 에러 본문에서 사람이 읽을 수 있는 detail 추출
///
/// `{detail: "..."}` → `{message: "..."}` → 본문 미리보기 → 상태 문구 순.
fn error_detail(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["detail", "message", "error"] {
            match value.get(field) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => return s.clone(),
                Some(v) if !v.is_null() && !v.is_string() => return v.to_string(),
                _ => {}
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string();
    }
    trimmed.chars().take(ERROR_BODY_PREVIEW).collect()
}
