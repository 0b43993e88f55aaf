//! Database Schema
//!
//! SQLite 테이블 스키마 정의

/// 데이터베이스 스키마 생성 SQL
pub const CREATE_SCHEMA: &str = r#"
-- Atlassian 연결 테이블 (토큰 컬럼은 암호화된 값)
CREATE TABLE IF NOT EXISTS atlassian_connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    atlassian_account_id TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    token_expires_at INTEGER NOT NULL,  -- epoch millis (UTC)
    scopes TEXT NOT NULL,               -- 공백 구분
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_atlassian_connections_user ON atlassian_connections(user_id);
CREATE INDEX IF NOT EXISTS idx_atlassian_connections_active ON atlassian_connections(user_id, is_active);
"#;
