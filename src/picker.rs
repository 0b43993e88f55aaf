//! Jira / Confluence 콘텐츠 선택기
//!
//! 사이트/콘텐츠 종류/space/검색어를 고르고, 명시적으로 검색을 실행한 뒤
//! 결과 하나를 채팅용 콘텐츠로 가져옵니다.

use serde::{Deserialize, Serialize};

use crate::api::types::{ConfluencePage, ConfluenceSpace, JiraIssue, SearchOutcome};
use crate::api::AtlassianApiClient;
use crate::error::{AtlassianError, Result};
use crate::models::{default_max_results, SiteInfo};
use crate::render::{import_confluence_page, import_jira_issue, ImportedContent};

const NO_ACCESS_FALLBACK: &str =
    "Your Atlassian account does not have access to this content on the selected site.";

/// 검색 대상 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Jira,
    Confluence,
}

/// 검색 결과 항목
#[derive(Debug, Clone, PartialEq)]
pub enum PickerItem {
    Issue(JiraIssue),
    Page(ConfluencePage),
}

impl PickerItem {
    /// 목록 표시용 제목
    pub fn label(&self) -> String {
        match self {
            PickerItem::Issue(issue) => match (issue.key.as_deref(), issue.summary()) {
                (Some(key), Some(summary)) => format!("{}: {}", key, summary),
                (Some(key), None) => key.to_string(),
                (None, Some(summary)) => summary.to_string(),
                (None, None) => "Untitled issue".to_string(),
            },
            PickerItem::Page(page) => page
                .title
                .clone()
                .unwrap_or_else(|| "Untitled page".to_string()),
        }
    }
}

/// 연결 여부에 따른 화면
#[derive(Debug, Clone, PartialEq)]
pub enum PickerView {
    /// 연결 안 됨: 검색 UI 대신 연결 안내
    ConnectPrompt,
    Search,
}

/// 콘텐츠 선택기
pub struct ContentPicker {
    client: AtlassianApiClient,
    connected: bool,
    sites: Vec<SiteInfo>,
    selected_site: Option<String>,
    content_type: ContentType,
    spaces: Vec<ConfluenceSpace>,
    space_key: Option<String>,
    query: String,
    max_results: u32,
    results: Vec<PickerItem>,
    /// scope 부족 안내 (Some이면 결과는 항상 비어 있음)
    no_access: Option<String>,
}

impl ContentPicker {
    pub fn new(client: AtlassianApiClient) -> Self {
        Self {
            client,
            connected: false,
            sites: Vec::new(),
            selected_site: None,
            content_type: ContentType::default(),
            spaces: Vec::new(),
            space_key: None,
            query: String::new(),
            max_results: default_max_results(),
            results: Vec::new(),
            no_access: None,
        }
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// 열릴 때 연결 상태와 사이트 목록을 불러옴
    pub async fn open(&mut self) -> Result<PickerView> {
        let status = self.client.get_connection_status().await?;
        self.connected = status.connected;
        self.sites = status.sites;
        self.reset_results();

        if !self.connected {
            self.selected_site = None;
            return Ok(PickerView::ConnectPrompt);
        }

        // 이전 선택이 여전히 유효하면 유지
        let still_valid = self
            .selected_site
            .as_ref()
            .is_some_and(|id| self.sites.iter().any(|s| &s.id == id));
        if !still_valid {
            self.selected_site = self.sites.first().map(|s| s.id.clone());
        }

        tracing::debug!(sites = self.sites.len(), "Content picker opened");
        Ok(PickerView::Search)
    }

    pub fn view(&self) -> PickerView {
        if self.connected {
            PickerView::Search
        } else {
            PickerView::ConnectPrompt
        }
    }

    pub fn sites(&self) -> &[SiteInfo] {
        &self.sites
    }

    pub fn selected_site(&self) -> Option<&SiteInfo> {
        let id = self.selected_site.as_ref()?;
        self.sites.iter().find(|s| &s.id == id)
    }

    pub fn select_site(&mut self, site_id: &str) -> Result<()> {
        if !self.sites.iter().any(|s| s.id == site_id) {
            return Err(AtlassianError::NotFound(format!("site {}", site_id)));
        }
        if self.selected_site.as_deref() != Some(site_id) {
            self.selected_site = Some(site_id.to_string());
            self.spaces.clear();
            self.space_key = None;
            self.reset_results();
        }
        Ok(())
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        if self.content_type != content_type {
            self.content_type = content_type;
            self.reset_results();
        }
    }

    /// Confluence space 필터 (빈 문자열은 "전체")
    pub fn set_space(&mut self, space_key: Option<&str>) {
        self.space_key = space_key
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }

    pub fn space_key(&self) -> Option<&str> {
        self.space_key.as_deref()
    }

    /// 입력만 갱신 (검색은 `submit_search`에서만)
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[PickerItem] {
        &self.results
    }

    pub fn spaces(&self) -> &[ConfluenceSpace] {
        &self.spaces
    }

    pub fn no_access(&self) -> Option<&str> {
        self.no_access.as_deref()
    }

    fn reset_results(&mut self) {
        self.results.clear();
        self.no_access = None;
    }

    fn require_site(&self) -> Result<SiteInfo> {
        if !self.connected {
            return Err(AtlassianError::NotConnected);
        }
        self.selected_site()
            .cloned()
            .ok_or_else(|| AtlassianError::NotFound("no Atlassian site selected".to_string()))
    }

    /// 선택된 사이트의 Confluence space 목록
    pub async fn load_spaces(&mut self) -> Result<&[ConfluenceSpace]> {
        let site = self.require_site()?;
        match self.client.list_spaces(&site.id).await? {
            SearchOutcome::Results(spaces) => {
                self.spaces = spaces;
            }
            SearchOutcome::NoAccess { message } => {
                // space 없이 검색은 계속 가능
                tracing::info!(site = %site.id, "No access to Confluence spaces");
                self.spaces.clear();
                self.space_key = None;
                self.no_access = Some(message.unwrap_or_else(|| NO_ACCESS_FALLBACK.to_string()));
            }
        }
        Ok(&self.spaces)
    }

    /// 검색 실행
    ///
    /// 빈 검색어는 요청 없이 결과를 비웁니다. `no_access`는 에러가 아니라 플래그입니다.
    pub async fn submit_search(&mut self) -> Result<&[PickerItem]> {
        let site = self.require_site()?;
        let query = self.query.trim().to_string();
        self.reset_results();

        if query.is_empty() {
            return Ok(&self.results);
        }

        let outcome = match self.content_type {
            ContentType::Jira => {
                map_outcome(self.client.search_issues(&site.id, &query, self.max_results).await?, PickerItem::Issue)
            }
            ContentType::Confluence => map_outcome(
                self.client
                    .search_pages(&site.id, &query, self.space_key.as_deref(), self.max_results)
                    .await?,
                PickerItem::Page,
            ),
        };

        match outcome {
            SearchOutcome::Results(items) => {
                tracing::debug!(site = %site.id, count = items.len(), "Atlassian search completed");
                self.results = items;
            }
            SearchOutcome::NoAccess { message } => {
                tracing::info!(site = %site.id, content_type = ?self.content_type, "Atlassian search returned no_access");
                self.no_access = Some(message.unwrap_or_else(|| NO_ACCESS_FALLBACK.to_string()));
            }
        }
        Ok(&self.results)
    }

    /// 결과 선택 → 상세 조회 → 채팅용 콘텐츠
    pub async fn select(&self, index: usize) -> Result<ImportedContent> {
        let site = self.require_site()?;
        let item = self
            .results
            .get(index)
            .ok_or_else(|| AtlassianError::NotFound(format!("search result {}", index)))?;

        match item {
            PickerItem::Issue(issue) => {
                let key = issue
                    .key
                    .as_deref()
                    .or(issue.id.as_deref())
                    .ok_or_else(|| AtlassianError::NotFound("issue key".to_string()))?;
                let detail = self.client.get_issue(&site.id, key).await?;
                Ok(import_jira_issue(&site, &detail))
            }
            PickerItem::Page(page) => {
                let id = page
                    .id
                    .as_deref()
                    .ok_or_else(|| AtlassianError::NotFound("page id".to_string()))?;
                let detail = self.client.get_content(&site.id, id).await?;
                Ok(import_confluence_page(&site, &detail))
            }
        }
    }
}

fn map_outcome<T>(outcome: SearchOutcome<T>, wrap: fn(T) -> PickerItem) -> SearchOutcome<PickerItem> {
    match outcome {
        SearchOutcome::Results(items) => SearchOutcome::Results(items.into_iter().map(wrap).collect()),
        SearchOutcome::NoAccess { message } => SearchOutcome::NoAccess { message },
    }
}
