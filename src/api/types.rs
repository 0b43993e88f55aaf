//! Jira / Confluence 응답 타입 정의
//!
//! 업스트림 API 객체를 그대로 전달받는 부분 레코드입니다.
//! 모든 필드는 Option이며, 없는 필드는 렌더링 단계에서 생략됩니다.

use serde::{Deserialize, Serialize};

/// `{error: "no_access"}` 소프트 에러 값
pub const NO_ACCESS: &str = "no_access";

/// 이름 필드만 사용하는 Jira 객체 (status, issuetype, priority)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Named {
    #[serde(default)]
    pub name: Option<String>,
}

/// Jira 사용자
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JiraUser {
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, rename = "accountId")]
    pub account_id: Option<String>,
}

/// ADF (Atlassian Document Format) 노드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdfNode {
    #[serde(default, rename = "type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub content: Option<Vec<AdfNode>>,
}

/// Jira description: plain text 또는 ADF 문서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JiraDescription {
    Text(String),
    Document(AdfNode),
    Other(serde_json::Value),
}

/// Jira 이슈 필드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JiraFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub status: Option<Named>,
    #[serde(default)]
    pub issuetype: Option<Named>,
    #[serde(default)]
    pub assignee: Option<JiraUser>,
    #[serde(default)]
    pub reporter: Option<JiraUser>,
    #[serde(default)]
    pub priority: Option<Named>,
    #[serde(default)]
    pub description: Option<JiraDescription>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

/// Jira 이슈 (부분 레코드)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JiraIssue {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub fields: Option<JiraFields>,
}

impl JiraIssue {
    pub fn summary(&self) -> Option<&str> {
        self.fields.as_ref()?.summary.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.fields.as_ref()?.status.as_ref()?.name.as_deref()
    }

    pub fn issue_type(&self) -> Option<&str> {
        self.fields.as_ref()?.issuetype.as_ref()?.name.as_deref()
    }

    pub fn assignee(&self) -> Option<&str> {
        self.fields.as_ref()?.assignee.as_ref()?.display_name.as_deref()
    }

    pub fn priority(&self) -> Option<&str> {
        self.fields.as_ref()?.priority.as_ref()?.name.as_deref()
    }

    pub fn description(&self) -> Option<&JiraDescription> {
        self.fields.as_ref()?.description.as_ref()
    }

    pub fn updated(&self) -> Option<&str> {
        self.fields.as_ref()?.updated.as_deref()
    }
}

/// Jira 검색 응답
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JiraSearchResponse {
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Confluence space 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceSpace {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub space_type: Option<String>,
}

/// Confluence 버전 정보
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceVersion {
    #[serde(default)]
    pub number: Option<u64>,
    /// 마지막 수정 시각 (ISO 8601)
    #[serde(default)]
    pub when: Option<String>,
}

/// storage 포맷 (XHTML)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceStorage {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceBody {
    #[serde(default)]
    pub storage: Option<ConfluenceStorage>,
}

/// Confluence 링크
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceLinks {
    #[serde(default)]
    pub webui: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
}

/// Confluence 페이지 (부분 레코드)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfluencePage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub space: Option<ConfluenceSpace>,
    #[serde(default)]
    pub version: Option<ConfluenceVersion>,
    #[serde(default)]
    pub body: Option<ConfluenceBody>,
    #[serde(default, rename = "_links")]
    pub links: Option<ConfluenceLinks>,
}

impl ConfluencePage {
    pub fn space_name(&self) -> Option<&str> {
        let space = self.space.as_ref()?;
        space.name.as_deref().or(space.key.as_deref())
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.version.as_ref()?.when.as_deref()
    }

    pub fn storage_body(&self) -> Option<&str> {
        self.body
            .as_ref()?
            .storage
            .as_ref()?
            .value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
    }
}

/// 검색 결과 또는 scope 부족 신호
///
/// 백엔드는 scope가 부족하면 HTTP 200으로 `{error: "no_access"}`를 반환합니다.
/// 빈 결과와 구분하기 위해 `error` 필드를 먼저 확인합니다.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome<T> {
    Results(Vec<T>),
    NoAccess { message: Option<String> },
}

impl<T> SearchOutcome<T> {
    pub fn is_no_access(&self) -> bool {
        matches!(self, SearchOutcome::NoAccess { .. })
    }

    pub fn results(&self) -> &[T] {
        match self {
            SearchOutcome::Results(items) => items,
            SearchOutcome::NoAccess { .. } => &[],
        }
    }
}

impl<T: serde::de::DeserializeOwned> SearchOutcome<T> {
    /// 응답 본문 파싱 (`list_field`: `issues` / `results`)
    pub fn from_value(value: serde_json::Value, list_field: &str) -> Result<Self, serde_json::Error> {
        if value.get("error").and_then(|e| e.as_str()) == Some(NO_ACCESS) {
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string());
            return Ok(SearchOutcome::NoAccess { message });
        }

        let items = match value.get(list_field) {
            Some(list) if !list.is_null() => serde_json::from_value(list.clone())?,
            _ => Vec::new(),
        };
        Ok(SearchOutcome::Results(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn issue_with_missing_fields_degrades() {
        let issue: JiraIssue = serde_json::from_value(json!({"key": "ABC-1"})).unwrap();
        assert_eq!(issue.key.as_deref(), Some("ABC-1"));
        assert_eq!(issue.summary(), None);
        assert_eq!(issue.assignee(), None);
    }

    #[test]
    fn description_variants() {
        let text: JiraFields = serde_json::from_value(json!({"description": "plain"})).unwrap();
        assert_eq!(text.description, Some(JiraDescription::Text("plain".into())));

        let doc: JiraFields = serde_json::from_value(json!({
            "description": {"type": "doc", "content": [{"type": "paragraph"}]}
        }))
        .unwrap();
        assert!(matches!(doc.description, Some(JiraDescription::Document(_))));

        let odd: JiraFields = serde_json::from_value(json!({"description": 42})).unwrap();
        assert!(matches!(odd.description, Some(JiraDescription::Other(_))));
    }

    #[test]
    fn no_access_is_checked_before_results() {
        let outcome: SearchOutcome<ConfluencePage> = SearchOutcome::from_value(
            json!({"results": [], "error": "no_access", "message": "No Confluence access"}),
            "results",
        )
        .unwrap();

        assert!(outcome.is_no_access());
        assert!(outcome.results().is_empty());
        assert_eq!(
            outcome,
            SearchOutcome::NoAccess { message: Some("No Confluence access".into()) }
        );
    }

    #[test]
    fn empty_results_are_not_no_access() {
        let outcome: SearchOutcome<JiraIssue> =
            SearchOutcome::from_value(json!({"issues": [], "total": 0}), "issues").unwrap();
        assert_eq!(outcome, SearchOutcome::Results(vec![]));
    }

    #[test]
    fn page_accessors_handle_absence() {
        let page: ConfluencePage = serde_json::from_value(json!({
            "id": "42",
            "title": "Runbook",
            "space": {"key": "OPS"},
            "body": {"storage": {"value": "   "}}
        }))
        .unwrap();

        assert_eq!(page.space_name(), Some("OPS"));
        assert_eq!(page.last_updated(), None);
        assert_eq!(page.storage_body(), None);
    }
}
