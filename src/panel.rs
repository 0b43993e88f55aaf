//! Atlassian 연결 패널 (연결 수명주기 오케스트레이션)
//!
//! 상태: Unconnected → Connecting → CallbackPending → Connected
//! 실패(state 불일치, 업스트림 거부, 교환 실패)는 Error를 거쳐 Unconnected로 돌아갑니다.
//!
//! 화면 렌더링은 호스트 책임이며, 이 모듈은 상태와 전이만 관리합니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use url::Url;

use crate::api::{AtlassianApiClient, DisconnectOutcome};
use crate::config::AtlassianConfig;
use crate::error::{AtlassianError, CommandError, Result};
use crate::models::{CallbackRequest, CallbackResponse, ConnectionRecord, ConnectionStatus, SiteInfo};
use crate::oauth::authorize::{build_authorization_url_with_base, AuthorizationRequest, ATLASSIAN_AUTHORIZE_URL};
use crate::oauth::state::{OAuthStateStore, StateSlot};

/// 콜백 복귀 시 URL에서 제거하는 일회성 파라미터
pub const TRANSIENT_CALLBACK_PARAMS: [&str; 4] = ["code", "state", "error", "error_description"];

/// 패널 상태
#[derive(Debug, Clone, PartialEq)]
pub enum PanelState {
    Unconnected,
    /// state 저장 + 리다이렉트 발행됨
    Connecting,
    /// code+state 수신, 백엔드 교환 대기 중 (blocking indicator)
    CallbackPending,
    Connected {
        sites: Vec<SiteInfo>,
        connection: Option<ConnectionRecord>,
    },
    Error(CommandError),
}

/// 브라우저 이동 (호스트 제공)
pub trait Navigator: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// 시스템 기본 브라우저로 이동
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Navigator for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        open::that(url)?;
        Ok(())
    }
}

/// 콜백 처리 결과
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// URL에 콜백 파라미터가 없음 (일반 페이지 로드)
    NotACallback,
    Connected {
        response: CallbackResponse,
        /// 일회성 파라미터를 제거한 URL
        cleaned_url: String,
        /// 의존 상태 재로딩 필요
        reload: bool,
    },
    Failed {
        error: CommandError,
        cleaned_url: String,
    },
}

impl CallbackOutcome {
    pub fn cleaned_url(&self) -> Option<&str> {
        match self {
            CallbackOutcome::NotACallback => None,
            CallbackOutcome::Connected { cleaned_url, .. } => Some(cleaned_url),
            CallbackOutcome::Failed { cleaned_url, .. } => Some(cleaned_url),
        }
    }
}

/// 교환 진행 플래그를 drop 시 해제
struct ExchangeGuard<'a>(&'a AtomicBool);

impl<'a> ExchangeGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExchangeGuard(flag))
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 상태 전이 통지 (호스트 UI 갱신용)
pub type StateListener = Box<dyn Fn(&PanelState) + Send + Sync>;

/// Atlassian 연결 패널
pub struct ConnectionPanel<S: StateSlot, N: Navigator> {
    config: AtlassianConfig,
    client: AtlassianApiClient,
    states: OAuthStateStore<S>,
    navigator: N,
    authorize_url: String,
    state: Mutex<PanelState>,
    last_error: Mutex<Option<CommandError>>,
    exchange_in_flight: AtomicBool,
    listener: Option<StateListener>,
}

impl<S: StateSlot, N: Navigator> ConnectionPanel<S, N> {
    pub fn new(config: AtlassianConfig, client: AtlassianApiClient, slot: S, navigator: N) -> Self {
        Self {
            config,
            client,
            states: OAuthStateStore::new(slot),
            navigator,
            authorize_url: ATLASSIAN_AUTHORIZE_URL.to_string(),
            state: Mutex::new(PanelState::Unconnected),
            last_error: Mutex::new(None),
            exchange_in_flight: AtomicBool::new(false),
            listener: None,
        }
    }

    /// 상태가 바뀔 때마다 호출 (실패 시 `Error` → `Unconnected` 순서로 두 번)
    pub fn with_state_listener(mut self, listener: impl Fn(&PanelState) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// 인가 엔드포인트 변경 (테스트/프록시용)
    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn state(&self) -> PanelState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 마지막 사용자 노출 에러
    pub fn last_error(&self) -> Option<CommandError> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 콜백 교환 진행 중 여부 (true면 "connecting" 표시, connect 비활성)
    pub fn is_busy(&self) -> bool {
        self.exchange_in_flight.load(Ordering::Acquire)
    }

    /// 연결 버튼 활성화 여부 (설정 기반 파생 값)
    pub fn can_connect(&self) -> bool {
        self.config.can_connect() && !self.is_busy()
    }

    fn set_state(&self, next: PanelState) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            tracing::debug!(from = state_name(&state), to = state_name(&next), "Panel state change");
            *state = next.clone();
        }
        if let Some(listener) = &self.listener {
            listener(&next);
        }
    }

    fn record_error(&self, error: CommandError) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    /// 실패 처리: Error를 거쳐 Unconnected로
    ///
    /// `Error`는 리스너에만 전달되고, 이후에는 `last_error()`로 조회합니다.
    fn fail(&self, error: AtlassianError) -> CommandError {
        tracing::warn!(error = %error, "Atlassian connection flow failed");
        let command_error = CommandError::from(error);
        self.record_error(command_error.clone());
        self.set_state(PanelState::Error(command_error.clone()));
        self.set_state(PanelState::Unconnected);
        command_error
    }

    /// 사용자가 연결 시작 (리다이렉트 URL 반환)
    pub async fn connect(&self) -> std::result::Result<String, CommandError> {
        if self.is_busy() {
            return Err(AtlassianError::ExchangeInFlight.into());
        }

        // 설정 에러: 네트워크 호출 없이 즉시 반환, 상태 유지
        if let Err(e) = self.config.ensure_can_connect() {
            let error = CommandError::from(e);
            self.record_error(error.clone());
            return Err(error);
        }

        let state = self.states.generate().map_err(|e| self.fail(e))?;
        let url = build_authorization_url_with_base(
            &self.authorize_url,
            &AuthorizationRequest::from_config(&self.config, &state),
        );

        if let Err(e) = self.navigator.open(&url) {
            let _ = self.states.clear();
            return Err(self.fail(e));
        }

        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.set_state(PanelState::Connecting);
        tracing::info!("Redirecting to Atlassian authorization");
        Ok(url)
    }

    /// 브라우저가 리다이렉트에서 돌아왔을 때 호출
    ///
    /// 결과와 무관하게 일회성 파라미터를 제거한 URL을 돌려주므로,
    /// 호스트는 이 URL로 history를 교체해야 합니다.
    pub async fn handle_return(&self, current_url: &str) -> CallbackOutcome {
        let Ok(url) = Url::parse(current_url) else {
            return CallbackOutcome::NotACallback;
        };

        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };
        let code = param("code");
        let returned_state = param("state");
        let upstream_error = param("error");

        if code.is_none() && returned_state.is_none() && upstream_error.is_none() {
            return CallbackOutcome::NotACallback;
        }

        let cleaned_url = strip_callback_params(&url);

        // 업스트림 거부: 원문 그대로 노출
        if let Some(error) = upstream_error {
            let _ = self.states.clear();
            let message = match param("error_description") {
                Some(desc) => format!("{}: {}", error, desc),
                None => error,
            };
            let error = self.fail(AtlassianError::UpstreamDenied(message));
            return CallbackOutcome::Failed { error, cleaned_url };
        }

        // 동시에 교환 1건만 허용
        let Some(guard) = ExchangeGuard::acquire(&self.exchange_in_flight) else {
            tracing::warn!("Ignoring duplicate Atlassian callback while exchange is in flight");
            return CallbackOutcome::Failed {
                error: AtlassianError::ExchangeInFlight.into(),
                cleaned_url,
            };
        };

        let returned_state = returned_state.unwrap_or_default();
        if !self.states.verify_and_clear(&returned_state) {
            let error = self.fail(AtlassianError::StateMismatch);
            return CallbackOutcome::Failed { error, cleaned_url };
        }

        let Some(code) = code.filter(|c| !c.is_empty()) else {
            let error = self.fail(AtlassianError::ExchangeFailed(
                "Authorization code missing from callback".to_string(),
            ));
            return CallbackOutcome::Failed { error, cleaned_url };
        };

        self.set_state(PanelState::CallbackPending);

        let request = CallbackRequest {
            code,
            state: returned_state,
        };
        let response = match self.client.submit_callback(&request).await {
            Ok(response) => response,
            Err(e) => {
                let reason = e.to_string();
                let error = self.fail(AtlassianError::ExchangeFailed(reason));
                return CallbackOutcome::Failed { error, cleaned_url };
            }
        };

        drop(guard);

        self.set_state(PanelState::Connected {
            sites: Vec::new(),
            connection: Some(response.connection.clone()),
        });
        tracing::info!(account = %response.connection.atlassian_account_id, "Atlassian account connected");

        // 교환 완료 후에만 상태 재조회
        if let Err(e) = self.refresh_status().await {
            tracing::warn!(error = %e, "Failed to refresh Atlassian status after connecting");
        }

        CallbackOutcome::Connected {
            response,
            cleaned_url,
            reload: true,
        }
    }

    /// 연결 상태 재조회
    ///
    /// 콜백 교환이 진행 중이면 조회하지 않습니다 (오래된 "미연결" 결과 방지).
    pub async fn refresh_status(&self) -> Result<ConnectionStatus> {
        if self.is_busy() {
            return Err(AtlassianError::ExchangeInFlight);
        }

        let status = self.client.get_connection_status().await?;
        if status.connected {
            self.set_state(PanelState::Connected {
                sites: status.sites.clone(),
                connection: status.connection_info.clone(),
            });
        } else if self.state() != PanelState::Connecting {
            self.set_state(PanelState::Unconnected);
        }
        Ok(status)
    }

    /// 연결 해제 (사용자 확인 후)
    ///
    /// 확인하지 않으면 아무 것도 하지 않습니다. 이미 해제된 상태는 에러가 아닙니다.
    pub async fn disconnect(&self, confirmed: bool) -> std::result::Result<Option<DisconnectOutcome>, CommandError> {
        if !confirmed {
            return Ok(None);
        }

        let outcome = self.client.disconnect().await.map_err(|e| {
            let error = CommandError::from(e);
            self.record_error(error.clone());
            error
        })?;

        self.set_state(PanelState::Unconnected);
        tracing::info!(?outcome, "Atlassian account disconnected");
        Ok(Some(outcome))
    }
}

fn state_name(state: &PanelState) -> &'static str {
    match state {
        PanelState::Unconnected => "unconnected",
        PanelState::Connecting => "connecting",
        PanelState::CallbackPending => "callback_pending",
        PanelState::Connected { .. } => "connected",
        PanelState::Error(_) => "error",
    }
}

/// URL에서 콜백 일회성 파라미터 제거
pub fn strip_callback_params(url: &Url) -> String {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRANSIENT_CALLBACK_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    cleaned.to_string()
}
