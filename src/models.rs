//! Atlassian Link Data Models
//!
//! 백엔드 REST 표면(`/atlassian/...`)과 주고받는 데이터 모델.
//! 클라이언트와 백엔드 서비스가 같은 타입을 사용합니다.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 접근 가능한 Atlassian 사이트 (accessible-resources 항목)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    /// cloud id
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, alias = "avatarUrl")]
    pub avatar_url: Option<String>,
}

/// 연결 레코드 (토큰은 절대 포함하지 않음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: i64,
    pub user_id: String,
    pub atlassian_account_id: String,
    /// 공백으로 구분된 scope 목록
    pub scopes: String,
    pub is_active: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl ConnectionRecord {
    pub fn scope_list(&self) -> Vec<&str> {
        self.scopes.split_whitespace().collect()
    }
}

/// 연결 상태 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(default)]
    pub sites: Vec<SiteInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_info: Option<ConnectionRecord>,
}

impl ConnectionStatus {
    /// 연결되지 않은 정상 상태
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            sites: Vec::new(),
            connection_info: None,
        }
    }
}

/// 콜백 교환 요청 본문
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub code: String,
    pub state: String,
}

/// 콜백 교환 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub detail: String,
    pub connection: ConnectionRecord,
}

/// `{detail}` 형태의 단순 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailResponse {
    pub detail: String,
}

/// Jira 검색 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraSearchRequest {
    pub site_id: String,
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

/// Confluence 검색 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceSearchRequest {
    pub site_id: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_key: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

pub fn default_max_results() -> u32 {
    10
}

/// RFC 3339 또는 timezone 없는 ISO 8601 (UTC로 간주) 모두 허용
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
