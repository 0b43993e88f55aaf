//! 가져온 Jira / Confluence 콘텐츠를 채팅용 텍스트로 변환
//!
//! 출력은 결정적(deterministic)이며, 없는 필드는 조용히 생략합니다.

use serde::{Deserialize, Serialize};

use crate::api::types::{AdfNode, ConfluencePage, JiraDescription, JiraIssue};
use crate::models::{parse_timestamp, SiteInfo};

const NO_DESCRIPTION: &str = "*No description provided*";
const NO_CONTENT: &str = "*No content available*";

/// 콘텐츠 종류 판별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    JiraIssue,
    ConfluencePage,
}

/// 가져온 콘텐츠의 메타데이터 (중복 제거/인용용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub url: String,
    pub title: String,
    pub site_id: String,
    pub site_name: String,
    /// Jira 이슈 키
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Confluence 콘텐츠 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// 채팅 입력기로 넘기는 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedContent {
    pub content: String,
    pub metadata: ContentMetadata,
}

/// ADF 문서에서 텍스트 추출
///
/// 모든 text 노드를 문서 순서대로 이어 붙이고, paragraph/heading 노드의
/// 자식 뒤에 개행 1개를 넣은 뒤 앞뒤 공백을 제거합니다.
pub fn extract_adf_text(node: &AdfNode) -> String {
    let mut out = String::new();
    collect_adf_text(node, &mut out);
    out.trim().to_string()
}

fn collect_adf_text(node: &AdfNode, out: &mut String) {
    if let Some(text) = &node.text {
        out.push_str(text);
    }
    if let Some(children) = &node.content {
        for child in children {
            collect_adf_text(child, out);
        }
    }
    if matches!(node.node_type.as_deref(), Some("paragraph") | Some("heading")) {
        out.push('\n');
    }
}

/// description 텍스트 (plain text 또는 ADF)
pub fn description_text(description: &JiraDescription) -> String {
    match description {
        JiraDescription::Text(text) => text.trim().to_string(),
        JiraDescription::Document(doc) => extract_adf_text(doc),
        JiraDescription::Other(value) => serde_json::from_value::<AdfNode>(value.clone())
            .map(|doc| extract_adf_text(&doc))
            .unwrap_or_default(),
    }
}

/// HTML 태그 제거 + 엔티티 4종 디코딩 (`&nbsp;` `&amp;` `&lt;` `&gt;`)
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    // &amp;는 마지막에 디코딩 (이중 디코딩 방지)
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// 날짜만 표시 (파싱 실패 시 원문)
fn display_date(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Jira 이슈 Markdown
pub fn render_jira_issue(issue: &JiraIssue) -> String {
    let key = issue.key.as_deref().unwrap_or("Unknown issue");
    let mut lines = Vec::new();

    match issue.summary() {
        Some(summary) => lines.push(format!("# {}: {}", key, summary)),
        None => lines.push(format!("# {}", key)),
    }
    lines.push(String::new());

    let fields = [
        ("Status", issue.status()),
        ("Type", issue.issue_type()),
        ("Assignee", issue.assignee()),
        ("Priority", issue.priority()),
    ];
    let mut has_fields = false;
    for (label, value) in fields {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            lines.push(format!("**{}:** {}", label, value));
            has_fields = true;
        }
    }
    if has_fields {
        lines.push(String::new());
    }

    lines.push("## Description".to_string());
    lines.push(String::new());
    let description = issue
        .description()
        .map(description_text)
        .filter(|d| !d.is_empty());
    lines.push(description.unwrap_or_else(|| NO_DESCRIPTION.to_string()));

    lines.join("\n")
}

/// Confluence 페이지 Markdown
pub fn render_confluence_page(page: &ConfluencePage) -> String {
    let mut lines = Vec::new();
    lines.push(format!("# {}", page.title.as_deref().unwrap_or("Untitled page")));
    lines.push(String::new());

    let mut has_meta = false;
    if let Some(space) = page.space_name() {
        lines.push(format!("**Space:** {}", space));
        has_meta = true;
    }
    if let Some(when) = page.last_updated() {
        lines.push(format!("**Last Updated:** {}", display_date(when)));
        has_meta = true;
    }
    if has_meta {
        lines.push(String::new());
    }

    let body = page.storage_body().map(strip_html).filter(|b| !b.is_empty());
    lines.push(body.unwrap_or_else(|| NO_CONTENT.to_string()));

    lines.join("\n")
}

/// Jira 이슈 브라우저 URL
pub fn jira_issue_url(site: &SiteInfo, key: &str) -> String {
    format!("{}/browse/{}", site.url.trim_end_matches('/'), key)
}

/// Confluence 페이지 URL (`_links` 우선)
pub fn confluence_page_url(site: &SiteInfo, page: &ConfluencePage) -> String {
    let site_url = site.url.trim_end_matches('/');
    let links = page.links.as_ref();
    match (
        links.and_then(|l| l.base.as_deref()),
        links.and_then(|l| l.webui.as_deref()),
    ) {
        (Some(base), Some(webui)) => format!("{}{}", base.trim_end_matches('/'), webui),
        (None, Some(webui)) => format!("{}/wiki{}", site_url, webui),
        _ => format!(
            "{}/wiki/pages/viewpage.action?pageId={}",
            site_url,
            page.id.as_deref().unwrap_or_default()
        ),
    }
}

/// Jira 이슈 → 채팅 콘텐츠
pub fn import_jira_issue(site: &SiteInfo, issue: &JiraIssue) -> ImportedContent {
    let key = issue.key.clone().unwrap_or_default();
    let title = match issue.summary() {
        Some(summary) => format!("{}: {}", key, summary),
        None => key.clone(),
    };

    ImportedContent {
        content: render_jira_issue(issue),
        metadata: ContentMetadata {
            kind: ContentKind::JiraIssue,
            url: jira_issue_url(site, &key),
            title,
            site_id: site.id.clone(),
            site_name: site.name.clone(),
            key: Some(key),
            id: issue.id.clone(),
        },
    }
}

/// Confluence 페이지 → 채팅 콘텐츠
pub fn import_confluence_page(site: &SiteInfo, page: &ConfluencePage) -> ImportedContent {
    ImportedContent {
        content: render_confluence_page(page),
        metadata: ContentMetadata {
            kind: ContentKind::ConfluencePage,
            url: confluence_page_url(site, page),
            title: page.title.clone().unwrap_or_else(|| "Untitled page".to_string()),
            site_id: site.id.clone(),
            site_name: site.name.clone(),
            key: None,
            id: page.id.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site() -> SiteInfo {
        SiteInfo {
            id: "cloud-1".into(),
            name: "Acme".into(),
            url: "https://acme.atlassian.net/".into(),
            scopes: vec![],
            avatar_url: None,
        }
    }

    fn adf(value: serde_json::Value) -> AdfNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn adf_extraction_inserts_newline_per_block() {
        let doc = adf(json!({
            "type": "doc",
            "content": [
                {"type": "heading", "content": [{"type": "text", "text": "Steps"}]},
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "Open "},
                    {"type": "text", "text": "settings"}
                ]},
                {"type": "bulletList", "content": [
                    {"type": "listItem", "content": [
                        {"type": "paragraph", "content": [{"type": "text", "text": "Click save"}]}
                    ]}
                ]}
            ]
        }));

        assert_eq!(extract_adf_text(&doc), "Steps\nOpen settings\nClick save");
    }

    #[test]
    fn adf_extraction_trims_and_handles_empty_paragraphs() {
        let doc = adf(json!({
            "type": "doc",
            "content": [
                {"type": "paragraph"},
                {"type": "paragraph", "content": [{"type": "text", "text": "  x  "}]},
                {"type": "paragraph"}
            ]
        }));
        assert_eq!(extract_adf_text(&doc), "x");
    }

    #[test]
    fn strip_html_decodes_named_entities() {
        assert_eq!(strip_html("<p>A &amp; B</p>"), "A & B");
        assert_eq!(strip_html("<p>1&nbsp;&lt;&nbsp;2 &gt; 0</p>"), "1 < 2 > 0");
        assert_eq!(strip_html("&amp;lt;"), "&lt;");
    }

    #[test]
    fn jira_render_includes_only_present_fields() {
        let issue: JiraIssue = serde_json::from_value(json!({
            "key": "ABC-1",
            "fields": {
                "summary": "Login fails",
                "status": {"name": "In Progress"},
                "priority": {"name": "High"},
                "description": "Steps to reproduce"
            }
        }))
        .unwrap();

        assert_eq!(
            render_jira_issue(&issue),
            "# ABC-1: Login fails\n\n**Status:** In Progress\n**Priority:** High\n\n## Description\n\nSteps to reproduce"
        );
    }

    #[test]
    fn jira_render_uses_adf_description() {
        let issue: JiraIssue = serde_json::from_value(json!({
            "key": "ABC-2",
            "fields": {
                "summary": "Crash",
                "assignee": {"displayName": "Kim"},
                "issuetype": {"name": "Bug"},
                "description": {"type": "doc", "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "Boom"}]}
                ]}
            }
        }))
        .unwrap();

        let content = render_jira_issue(&issue);
        assert!(content.contains("**Type:** Bug\n**Assignee:** Kim"));
        assert!(content.ends_with("## Description\n\nBoom"));
    }

    #[test]
    fn jira_render_without_fields() {
        let issue: JiraIssue = serde_json::from_value(json!({"key": "ABC-3"})).unwrap();
        assert_eq!(
            render_jira_issue(&issue),
            "# ABC-3\n\n## Description\n\n*No description provided*"
        );
    }

    #[test]
    fn confluence_render_with_all_parts() {
        let page: ConfluencePage = serde_json::from_value(json!({
            "id": "123",
            "title": "Runbook",
            "space": {"key": "OPS", "name": "Operations"},
            "version": {"number": 4, "when": "2024-03-05T08:15:00.000Z"},
            "body": {"storage": {"value": "<h1>Intro</h1><p>A &amp; B</p>"}}
        }))
        .unwrap();

        assert_eq!(
            render_confluence_page(&page),
            "# Runbook\n\n**Space:** Operations\n**Last Updated:** 2024-03-05\n\nIntroA & B"
        );
    }

    #[test]
    fn confluence_render_without_body() {
        let page: ConfluencePage = serde_json::from_value(json!({"title": "Empty"})).unwrap();
        assert_eq!(render_confluence_page(&page), "# Empty\n\n*No content available*");
    }

    #[test]
    fn jira_metadata_has_canonical_url() {
        let issue: JiraIssue =
            serde_json::from_value(json!({"id": "10001", "key": "ABC-1", "fields": {"summary": "S"}}))
                .unwrap();
        let imported = import_jira_issue(&site(), &issue);

        assert_eq!(imported.metadata.kind, ContentKind::JiraIssue);
        assert_eq!(imported.metadata.url, "https://acme.atlassian.net/browse/ABC-1");
        assert_eq!(imported.metadata.title, "ABC-1: S");
        assert_eq!(imported.metadata.site_id, "cloud-1");
        assert_eq!(imported.metadata.site_name, "Acme");

        let value = serde_json::to_value(&imported.metadata).unwrap();
        assert_eq!(value["type"], "jira_issue");
    }

    #[test]
    fn confluence_url_prefers_links() {
        let with_base: ConfluencePage = serde_json::from_value(json!({
            "id": "9",
            "_links": {"base": "https://acme.atlassian.net/wiki", "webui": "/spaces/OPS/pages/9"}
        }))
        .unwrap();
        assert_eq!(
            confluence_page_url(&site(), &with_base),
            "https://acme.atlassian.net/wiki/spaces/OPS/pages/9"
        );

        let bare: ConfluencePage = serde_json::from_value(json!({"id": "9"})).unwrap();
        assert_eq!(
            confluence_page_url(&site(), &bare),
            "https://acme.atlassian.net/wiki/pages/viewpage.action?pageId=9"
        );

        let imported = import_confluence_page(&site(), &bare);
        assert_eq!(imported.metadata.kind, ContentKind::ConfluencePage);
        assert_eq!(imported.metadata.title, "Untitled page");
    }
}
