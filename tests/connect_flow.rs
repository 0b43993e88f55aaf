//! 연결 흐름 통합 테스트 (리다이렉트 → 콜백 → 상태 조회)

use std::sync::{Arc, Mutex};
use std::time::Duration;

use atlassian_link::error::Result;
use atlassian_link::oauth::{FileSlot, MemorySlot};
use atlassian_link::{
    AtlassianApiClient, AtlassianConfig, CallbackOutcome, ConnectionPanel, Navigator, PanelState,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RETURN_PAGE: &str = "https://chat.example.com/settings/integrations";

#[derive(Clone, Default)]
struct RecordingNavigator {
    opened: Arc<Mutex<Vec<String>>>,
}

impl Navigator for RecordingNavigator {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

fn config() -> AtlassianConfig {
    AtlassianConfig {
        enabled: true,
        client_id: "client-1".into(),
        redirect_uri: RETURN_PAGE.into(),
        ..AtlassianConfig::default()
    }
}

fn client(server: &MockServer) -> AtlassianApiClient {
    AtlassianApiClient::new(server.uri(), "session-token", Duration::from_secs(5)).unwrap()
}

fn state_of(url: &str) -> String {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("authorization url carries state")
}

fn connection_json() -> serde_json::Value {
    json!({
        "id": 7,
        "user_id": "user-1",
        "atlassian_account_id": "acc-1",
        "scopes": "read:jira-work offline_access",
        "is_active": true,
        "created_at": "2024-05-01T10:00:00",
        "updated_at": "2024-05-01T10:00:00"
    })
}

#[tokio::test]
async fn matching_state_exchanges_once_then_reports_connected() {
    let server = MockServer::start().await;
    let nav = RecordingNavigator::default();
    let panel = ConnectionPanel::new(config(), client(&server), MemorySlot::new(), nav.clone());

    let authorize_url = panel.connect().await.unwrap();
    let state = state_of(&authorize_url);
    assert_eq!(nav.opened.lock().unwrap().len(), 1);

    Mock::given(method("POST"))
        .and(path("/atlassian/connection/callback"))
        .and(body_json(json!({"code": "C", "state": &state})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "detail": "Atlassian connection established successfully",
            "connection": connection_json()
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/atlassian/connection/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "connected": true,
            "sites": [{"id": "cloud-1", "name": "Acme", "url": "https://acme.atlassian.net", "scopes": []}],
            "connection_info": connection_json()
        })))
        .mount(&server)
        .await;

    let outcome = panel
        .handle_return(&format!("{}?code=C&state={}", RETURN_PAGE, state))
        .await;
    match &outcome {
        CallbackOutcome::Connected { cleaned_url, reload, .. } => {
            assert_eq!(cleaned_url, RETURN_PAGE);
            assert!(reload);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let status = panel.refresh_status().await.unwrap();
    assert!(status.connected);
    assert!(!status.sites.is_empty());
    assert!(matches!(panel.state(), PanelState::Connected { ref sites, .. } if sites.len() == 1));

    // 같은 URL로 다시 돌아와도 state가 이미 소비되어 교환하지 않음
    let replay = panel
        .handle_return(&format!("{}?code=C&state={}", RETURN_PAGE, state))
        .await;
    assert!(matches!(replay, CallbackOutcome::Failed { ref error, .. } if error.code == "STATE_MISMATCH"));
}

#[tokio::test]
async fn mismatched_state_never_calls_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/atlassian/connection/callback"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let panel = ConnectionPanel::new(
        config(),
        client(&server),
        MemorySlot::new(),
        RecordingNavigator::default(),
    );
    panel.connect().await.unwrap();

    let outcome = panel
        .handle_return(&format!("{}?tab=atlassian&code=C&state=S2", RETURN_PAGE))
        .await;

    match outcome {
        CallbackOutcome::Failed { error, cleaned_url } => {
            assert_eq!(error.code, "STATE_MISMATCH");
            assert_eq!(cleaned_url, format!("{}?tab=atlassian", RETURN_PAGE));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(panel.state(), PanelState::Unconnected);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn file_slot_survives_a_page_reload() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/atlassian/connection/callback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "detail": "Atlassian connection established successfully",
            "connection": connection_json()
        })))
        .expect(1)
        .mount(&server)
        .await;

    // 리다이렉트 전 패널
    let before = ConnectionPanel::new(
        config(),
        client(&server),
        FileSlot::new(dir.path()),
        RecordingNavigator::default(),
    );
    let state = state_of(&before.connect().await.unwrap());
    drop(before);

    // 복귀 후 새 패널
    let after = ConnectionPanel::new(
        config(),
        client(&server),
        FileSlot::new(dir.path()),
        RecordingNavigator::default(),
    );
    let outcome = after
        .handle_return(&format!("{}?code=C&state={}", RETURN_PAGE, state))
        .await;
    assert!(matches!(outcome, CallbackOutcome::Connected { .. }));
}
