//! Database Module
//!
//! Atlassian 연결 레코드 저장소 (SQLite)

mod schema;

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::models::ConnectionRecord;
use crate::secrets::TokenCipher;

/// 새 연결 생성 입력 (평문 토큰)
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub user_id: String,
    pub atlassian_account_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub scopes: String,
}

/// 복호화된 토큰을 포함한 연결 (서비스 내부 전용)
#[derive(Clone)]
pub struct StoredConnection {
    pub record: ConnectionRecord,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for StoredConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredConnection")
            .field("record", &self.record)
            .field("token_expires_at", &self.token_expires_at)
            .finish_non_exhaustive()
    }
}

impl StoredConnection {
    /// 만료되었거나 `margin` 안에 만료될 예정인지
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        now + margin >= self.token_expires_at
    }
}

const CONNECTION_COLUMNS: &str = "id, user_id, atlassian_account_id, access_token, refresh_token, \
     token_expires_at, scopes, is_active, created_at, updated_at";

/// 비활성 레코드에는 토큰을 남기지 않음
const DEACTIVATE_SQL: &str = "UPDATE atlassian_connections \
     SET is_active = 0, access_token = '', refresh_token = '', updated_at = ?2 \
     WHERE user_id = ?1 AND is_active = 1";

/// 데이터베이스 래퍼
pub struct Database {
    conn: Connection,
    cipher: TokenCipher,
}

impl Database {
    /// 새 데이터베이스 연결 생성
    pub fn new(path: &Path, cipher: TokenCipher) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn, cipher })
    }

    pub fn in_memory(cipher: TokenCipher) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, cipher })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// 데이터베이스 스키마 초기화
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(schema::CREATE_SCHEMA)?;
        Ok(())
    }

    /// 사용자의 활성 연결
    pub fn get_active_connection(&self, user_id: &str) -> Result<Option<StoredConnection>> {
        let sql = format!(
            "SELECT {} FROM atlassian_connections WHERE user_id = ?1 AND is_active = 1 \
             ORDER BY id DESC LIMIT 1",
            CONNECTION_COLUMNS
        );
        let raw = self
            .conn
            .query_row(&sql, [user_id], RawConnection::from_row)
            .optional()?;

        raw.map(|r| r.decrypt(&self.cipher)).transpose()
    }

    /// 새 연결 저장 (같은 사용자의 기존 연결은 비활성화)
    pub fn create_connection(&self, form: &NewConnection) -> Result<ConnectionRecord> {
        let now = Utc::now().timestamp_millis();
        let access_token = self.cipher.encrypt(&form.access_token)?;
        let refresh_token = self.cipher.encrypt(&form.refresh_token)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(DEACTIVATE_SQL, (&form.user_id, now))?;
        tx.execute(
            "INSERT INTO atlassian_connections
             (user_id, atlassian_account_id, access_token, refresh_token, token_expires_at, scopes, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
            (
                &form.user_id,
                &form.atlassian_account_id,
                &access_token,
                &refresh_token,
                form.token_expires_at.timestamp_millis(),
                &form.scopes,
                now,
            ),
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(user_id = %form.user_id, connection_id = id, "Atlassian connection stored");

        Ok(ConnectionRecord {
            id,
            user_id: form.user_id.clone(),
            atlassian_account_id: form.atlassian_account_id.clone(),
            scopes: form.scopes.clone(),
            is_active: true,
            created_at: millis_to_datetime(now),
            updated_at: millis_to_datetime(now),
        })
    }

    /// 활성 연결의 토큰 갱신
    pub fn update_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<Option<StoredConnection>> {
        let access = self.cipher.encrypt(access_token)?;
        let refresh = self.cipher.encrypt(refresh_token)?;

        let updated = self.conn.execute(
            "UPDATE atlassian_connections
             SET access_token = ?2, refresh_token = ?3, token_expires_at = ?4, updated_at = ?5
             WHERE user_id = ?1 AND is_active = 1",
            (
                user_id,
                &access,
                &refresh,
                token_expires_at.timestamp_millis(),
                Utc::now().timestamp_millis(),
            ),
        )?;

        if updated == 0 {
            return Ok(None);
        }
        self.get_active_connection(user_id)
    }

    /// 활성 연결 비활성화 (있었으면 true, 토큰은 비움)
    pub fn deactivate_connection(&self, user_id: &str) -> Result<bool> {
        let updated = self
            .conn
            .execute(DEACTIVATE_SQL, (user_id, Utc::now().timestamp_millis()))?;
        Ok(updated > 0)
    }

    /// 연결 해제: 활성 연결이 있으면 사용자의 모든 레코드 삭제
    pub fn remove_connection(&self, user_id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let active: i64 = tx.query_row(
            "SELECT COUNT(*) FROM atlassian_connections WHERE user_id = ?1 AND is_active = 1",
            [user_id],
            |row| row.get(0),
        )?;
        if active == 0 {
            return Ok(false);
        }
        tx.execute("DELETE FROM atlassian_connections WHERE user_id = ?1", [user_id])?;
        tx.commit()?;
        Ok(true)
    }

    /// 모든 활성 연결 (관리자용, 토큰 제외)
    pub fn list_active_connections(&self) -> Result<Vec<ConnectionRecord>> {
        let sql = format!(
            "SELECT {} FROM atlassian_connections WHERE is_active = 1 ORDER BY id ASC",
            CONNECTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let iter = stmt.query_map([], RawConnection::from_row)?;

        let mut out = Vec::new();
        for row in iter {
            out.push(row?.record);
        }
        Ok(out)
    }

    /// 사용자의 모든 연결 영구 삭제 (관리자용)
    pub fn delete_connection(&self, user_id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM atlassian_connections WHERE user_id = ?1", [user_id])?;
        Ok(deleted > 0)
    }
}

/// DB 행 (토큰은 암호문)
struct RawConnection {
    record: ConnectionRecord,
    access_token: String,
    refresh_token: String,
    token_expires_at: i64,
}

impl RawConnection {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            record: ConnectionRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                atlassian_account_id: row.get(2)?,
                scopes: row.get(6)?,
                is_active: row.get(7)?,
                created_at: millis_to_datetime(row.get(8)?),
                updated_at: millis_to_datetime(row.get(9)?),
            },
            access_token: row.get(3)?,
            refresh_token: row.get(4)?,
            token_expires_at: row.get(5)?,
        })
    }

    fn decrypt(self, cipher: &TokenCipher) -> Result<StoredConnection> {
        Ok(StoredConnection {
            access_token: cipher.decrypt(&self.access_token)?,
            refresh_token: cipher.decrypt(&self.refresh_token)?,
            token_expires_at: millis_to_datetime(self.token_expires_at),
            record: self.record,
        })
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AtlassianError;
    use chrono::Duration;
    use tempfile::tempdir;

    fn form(user: &str, account: &str) -> NewConnection {
        NewConnection {
            user_id: user.to_string(),
            atlassian_account_id: account.to_string(),
            access_token: format!("access-{}", account),
            refresh_token: format!("refresh-{}", account),
            token_expires_at: Utc::now() + Duration::hours(1),
            scopes: "read:jira-work offline_access".to_string(),
        }
    }

    fn memory_db() -> Database {
        let db = Database::in_memory(TokenCipher::generate()).unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn create_deactivates_previous_connection() {
        let db = memory_db();
        let first = db.create_connection(&form("u1", "acc-1")).unwrap();
        let second = db.create_connection(&form("u1", "acc-2")).unwrap();
        assert_ne!(first.id, second.id);

        let active = db.get_active_connection("u1").unwrap().unwrap();
        assert_eq!(active.record.id, second.id);
        assert_eq!(active.access_token, "access-acc-2");
        assert_eq!(db.list_active_connections().unwrap().len(), 1);
    }

    #[test]
    fn tokens_are_encrypted_at_rest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("atlassian.db");
        let db = Database::new(&path, TokenCipher::generate()).unwrap();
        db.initialize().unwrap();
        db.create_connection(&form("u1", "acc-1")).unwrap();

        let raw: String = db
            .conn
            .query_row("SELECT access_token FROM atlassian_connections", [], |r| r.get(0))
            .unwrap();
        assert!(!raw.contains("access-acc-1"));

        // 다른 키로는 읽을 수 없음
        drop(db);
        let other = Database::new(&path, TokenCipher::generate()).unwrap();
        assert!(matches!(other.get_active_connection("u1"), Err(AtlassianError::Vault(_))));
    }

    #[test]
    fn update_tokens_only_touches_active_record() {
        let db = memory_db();
        db.create_connection(&form("u1", "acc-1")).unwrap();

        let expires = Utc::now() + Duration::hours(2);
        let updated = db
            .update_tokens("u1", "new-access", "new-refresh", expires)
            .unwrap()
            .unwrap();
        assert_eq!(updated.access_token, "new-access");
        assert_eq!(updated.refresh_token, "new-refresh");
        assert_eq!(updated.token_expires_at.timestamp_millis(), expires.timestamp_millis());

        assert!(db.update_tokens("nobody", "a", "r", expires).unwrap().is_none());
    }

    fn rows_with_tokens(db: &Database, user_id: &str) -> i64 {
        db.conn
            .query_row(
                "SELECT COUNT(*) FROM atlassian_connections \
                 WHERE user_id = ?1 AND (access_token != '' OR refresh_token != '')",
                [user_id],
                |r| r.get(0),
            )
            .unwrap()
    }

    #[test]
    fn inactive_records_keep_no_tokens() {
        let db = memory_db();
        db.create_connection(&form("u1", "acc-1")).unwrap();
        db.create_connection(&form("u1", "acc-2")).unwrap();
        // 재연결 시 이전 레코드는 토큰 없이 남음
        assert_eq!(rows_with_tokens(&db, "u1"), 1);

        db.deactivate_connection("u1").unwrap();
        assert_eq!(rows_with_tokens(&db, "u1"), 0);
    }

    #[test]
    fn remove_connection_deletes_all_user_rows() {
        let db = memory_db();
        db.create_connection(&form("u1", "acc-1")).unwrap();
        db.create_connection(&form("u1", "acc-2")).unwrap();
        db.create_connection(&form("u2", "acc-3")).unwrap();

        assert!(db.remove_connection("u1").unwrap());
        let left: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM atlassian_connections WHERE user_id = 'u1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(left, 0);
        assert!(!db.remove_connection("u1").unwrap());
        assert!(db.get_active_connection("u2").unwrap().is_some());

        // 활성 연결이 없으면 비활성 레코드도 그대로
        db.deactivate_connection("u2").unwrap();
        assert!(!db.remove_connection("u2").unwrap());
        assert!(db.delete_connection("u2").unwrap());
    }

    #[test]
    fn deactivate_and_delete() {
        let db = memory_db();
        db.create_connection(&form("u1", "acc-1")).unwrap();

        assert!(db.deactivate_connection("u1").unwrap());
        assert!(!db.deactivate_connection("u1").unwrap());
        assert!(db.get_active_connection("u1").unwrap().is_none());

        assert!(db.delete_connection("u1").unwrap());
        assert!(!db.delete_connection("u1").unwrap());
    }

    #[test]
    fn refresh_margin() {
        let db = memory_db();
        let mut new = form("u1", "acc-1");
        new.token_expires_at = Utc::now() + Duration::minutes(3);
        db.create_connection(&new).unwrap();

        let stored = db.get_active_connection("u1").unwrap().unwrap();
        assert!(stored.needs_refresh(Utc::now(), Duration::minutes(5)));
        assert!(!stored.needs_refresh(Utc::now(), Duration::zero()));
    }
}
