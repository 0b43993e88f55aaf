//! JQL / CQL 쿼리 생성

/// Jira 검색 시 요청하는 필드
pub const JIRA_SEARCH_FIELDS: &str =
    "summary,description,issuetype,status,assignee,reporter,created,updated,priority";

/// Jira 이슈 상세 expand
pub const JIRA_ISSUE_EXPAND: &str =
    "renderedFields,names,schema,transitions,operations,editmeta,changelog";

/// Confluence 검색 expand
pub const CONFLUENCE_SEARCH_EXPAND: &str = "space,version";

/// Confluence 페이지 상세 expand
pub const CONFLUENCE_CONTENT_EXPAND: &str = "body.storage,space,version";

/// 큰따옴표 문자열 리터럴 안에 넣을 값 이스케이프
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// 전문 검색 JQL (최근 수정순)
pub fn jira_text_search(query: &str) -> String {
    format!("text ~ \"{}\" ORDER BY updated DESC", escape_literal(query))
}

/// 본문/제목 검색 CQL (space 선택)
pub fn confluence_text_search(query: &str, space_key: Option<&str>) -> String {
    let q = escape_literal(query);
    let mut cql = format!("(text ~ \"{q}\" OR title ~ \"{q}\")");
    if let Some(space) = space_key.map(str::trim).filter(|s| !s.is_empty()) {
        cql.push_str(&format!(" AND space = \"{}\"", escape_literal(space)));
    }
    cql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jql_escapes_quotes() {
        assert_eq!(
            jira_text_search(r#"say "hi""#),
            r#"text ~ "say \"hi\"" ORDER BY updated DESC"#
        );
        assert_eq!(jira_text_search(r"a\b"), r#"text ~ "a\\b" ORDER BY updated DESC"#);
    }

    #[test]
    fn cql_with_and_without_space() {
        assert_eq!(
            confluence_text_search("runbook", None),
            r#"(text ~ "runbook" OR title ~ "runbook")"#
        );
        assert_eq!(
            confluence_text_search("runbook", Some(" OPS ")),
            r#"(text ~ "runbook" OR title ~ "runbook") AND space = "OPS""#
        );
        assert_eq!(
            confluence_text_search("x", Some("")),
            r#"(text ~ "x" OR title ~ "x")"#
        );
    }
}
