//! 세션.
//!
//! 로그인부터 로그아웃까지 엔진 구성요소 전체를 소유한다. 구성요소는 세션 안에서만
//! 만들어지므로 세션을 버리면 연결, 구독, 폴러, 백그라운드 태스크가 함께 정리된다.

use chirp_core::config::AppConfig;
use chirp_core::error::CoreError;
use chirp_core::models::connection::{ConnectionSnapshot, ConnectionState};
use chirp_core::models::event::{ConversationRef, ConversationType, InboundEvent};
use chirp_core::models::notification::NotificationPreferences;
use chirp_core::models::presence::SubscriptionDiff;
use chirp_core::models::session::SessionCredentials;
use chirp_core::models::wire::OutboundCommand;
use chirp_core::ports::api_client::SocialApi;
use chirp_core::ports::notifier::LocalNotifier;
use chirp_core::ports::scheduler::ScheduledTask;
use chirp_core::ports::storage::{CheckpointStore, PreferenceStore};
use chirp_core::ports::transport::RealtimeTransport;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::active_view::{ActiveViewContext, ActiveViewGuard, ViewObserver};
use crate::arbitration::NotificationArbiter;
use crate::connection::{shutdown_requested, ConnectionManager};
use crate::event_bus::{BusEvent, EventBus, NotificationRecord, Subscription};
use crate::poller::FallbackPoller;
use crate::presence::PresenceRegistry;

/// 인바운드 이벤트 버퍼 크기
const INBOUND_BUFFER: usize = 256;

/// 세션이 사용하는 외부 포트
pub struct SessionDeps {
    pub transport: Arc<dyn RealtimeTransport>,
    pub api: Arc<dyn SocialApi>,
    pub notifier: Arc<dyn LocalNotifier>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub scheduler: Arc<dyn ScheduledTask>,
}

/// 활성 뷰 변경을 레지스트리/읽음 처리로 연결
struct ViewSync {
    registry: Weak<PresenceRegistry>,
    arbiter: Weak<NotificationArbiter>,
    connection: Weak<ConnectionManager>,
}

impl ViewObserver for ViewSync {
    fn view_changed(&self, view: Option<&ConversationRef>) {
        let open_peer = view
            .filter(|v| v.conversation_type == ConversationType::Personal)
            .map(|v| v.id.clone());
        if let Some(registry) = self.registry.upgrade() {
            registry.set_open_conversation_peer(open_peer);
        }

        let Some(conversation) = view else {
            return;
        };
        let had_unread = self
            .arbiter
            .upgrade()
            .is_some_and(|arbiter| arbiter.mark_conversation_read(conversation));
        if had_unread {
            if let Some(connection) = self.connection.upgrade() {
                connection.send(OutboundCommand::mark_read(conversation));
            }
        }
    }
}

/// 로그인 세션
pub struct Session {
    user_id: String,
    bus: Arc<EventBus>,
    active_view: Arc<ActiveViewContext>,
    connection: Arc<ConnectionManager>,
    registry: Arc<PresenceRegistry>,
    arbiter: Arc<NotificationArbiter>,
    poller: Arc<FallbackPoller>,
    api: Arc<dyn SocialApi>,
    preference_store: Arc<dyn PreferenceStore>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// 세션 시작 — 구성요소 생성, 친구 목록 로드, 실시간 연결 시작
    ///
    /// 알림 설정이나 친구 목록을 불러오지 못해도 세션은 시작된다.
    pub async fn start(
        credentials: SessionCredentials,
        deps: SessionDeps,
        config: &AppConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let SessionDeps {
            transport,
            api,
            notifier,
            checkpoints,
            preferences: preference_store,
            scheduler,
        } = deps;

        info!("세션 시작: user_id={}", credentials.user_id);

        let bus = Arc::new(EventBus::new(config.event_bus.capacity));
        let active_view = Arc::new(ActiveViewContext::new());
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

        let connection = Arc::new(ConnectionManager::new(
            transport,
            config.realtime.clone(),
            bus.clone(),
            inbound_tx,
        ));
        let registry = Arc::new(PresenceRegistry::new(connection.clone(), bus.clone()));
        let sync: Weak<PresenceRegistry> = Arc::downgrade(&registry);
        connection.set_subscription_sync(sync);

        let preferences = match preference_store.load().await {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!("알림 설정 로드 실패 — 모두 허용으로 시작: {e}");
                NotificationPreferences::default()
            }
        };

        let arbiter = Arc::new(NotificationArbiter::new(
            credentials.user_id.clone(),
            active_view.clone(),
            registry.clone(),
            bus.clone(),
            notifier,
            &config.dedup,
            preferences,
        ));
        active_view.set_observer(Arc::new(ViewSync {
            registry: Arc::downgrade(&registry),
            arbiter: Arc::downgrade(&arbiter),
            connection: Arc::downgrade(&connection),
        }));

        let poller = Arc::new(FallbackPoller::new(
            api.clone(),
            checkpoints,
            arbiter.clone(),
            scheduler,
            config.poller.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(dispatch(arbiter.clone(), inbound_rx, shutdown_rx.clone())),
            tokio::spawn(poller.clone().run(connection.watch_state(), shutdown_rx)),
        ];

        match api.fetch_friend_ids().await {
            Ok(ids) => {
                let diff = registry.set_friends(ids);
                debug!("친구 {}명 구독 대상 등록", diff.to_subscribe.len());
            }
            Err(e) => warn!("친구 목록 로드 실패 — 빈 목록으로 시작: {e}"),
        }

        let user_id = credentials.user_id.clone();
        connection.connect(credentials)?;

        Ok(Self {
            user_id,
            bus,
            active_view,
            connection,
            registry,
            arbiter,
            poller,
            api,
            preference_store,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    // ------------------------------------------------------------
    // 활성 뷰
    // ------------------------------------------------------------

    /// 대화 화면 진입
    pub fn set_active_view(&self, conversation_id: &str, conversation_type: ConversationType) {
        self.active_view
            .set_active_view(conversation_id, conversation_type);
    }

    /// 대화 화면 이탈
    pub fn clear_active_view(&self) {
        self.active_view.clear_active_view();
    }

    pub fn active_view(&self) -> Option<ConversationRef> {
        self.active_view.get_active_view()
    }

    /// 스코프 기반 대화 화면 — 가드가 drop되면 해제
    pub fn focus_conversation(&self, conversation: ConversationRef) -> ActiveViewGuard {
        self.active_view.focus(conversation)
    }

    // ------------------------------------------------------------
    // 알림 설정 / 앱 상태
    // ------------------------------------------------------------

    /// 알림 설정 변경 — 다음 이벤트부터 적용, 저장 실패는 경고만
    pub async fn update_preferences(&self, preferences: NotificationPreferences) {
        self.arbiter.update_preferences(preferences.clone());
        if let Err(e) = self.preference_store.save(&preferences).await {
            warn!("알림 설정 저장 실패: {e}");
        }
    }

    pub fn preferences(&self) -> NotificationPreferences {
        self.arbiter.preferences()
    }

    /// 앱 포그라운드/백그라운드 전환
    ///
    /// 포그라운드 복귀 시 실시간 채널이 살아 있지 않으면 즉시 재연결을 시도한다.
    pub fn set_foreground(&self, foreground: bool) {
        self.arbiter.set_foreground(foreground);
        if foreground && !self.connection.state().is_live() {
            debug!("포그라운드 복귀 — 즉시 재연결 요청");
            self.connection.reconnect_now();
        }
    }

    /// OS 푸시로 전달된 이벤트 기록
    pub fn record_push_delivered(&self, event_id: &str) {
        self.arbiter.record_push_delivered(event_id);
    }

    /// 인바운드 이벤트 직접 주입 (푸시 페이로드 등)
    pub async fn ingest(&self, event: InboundEvent) {
        self.arbiter.process(event).await;
    }

    /// 활동 알림 목록 확인
    pub fn mark_activity_read(&self) {
        self.arbiter.mark_activity_read();
    }

    pub fn unread_total(&self) -> u32 {
        self.arbiter.unread_total()
    }

    // ------------------------------------------------------------
    // 프레즌스
    // ------------------------------------------------------------

    /// 친구 목록 다시 불러오기
    pub async fn refresh_friends(&self) -> Result<SubscriptionDiff, CoreError> {
        let ids = self.api.fetch_friend_ids().await?;
        Ok(self.registry.set_friends(ids))
    }

    /// 친구 목록 직접 교체
    pub fn set_friends(&self, friend_ids: Vec<String>) -> SubscriptionDiff {
        self.registry.set_friends(friend_ids)
    }

    pub fn is_peer_online(&self, peer_id: &str) -> Option<bool> {
        self.registry.is_online(peer_id)
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------
    // 구독
    // ------------------------------------------------------------

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn on_presence_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        self.bus.on_presence_changed(listener)
    }

    pub fn on_unread_count_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.bus.on_unread_count_changed(listener)
    }

    pub fn on_notification_event<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&NotificationRecord) + Send + Sync + 'static,
    {
        self.bus.on_notification_event(listener)
    }

    // ------------------------------------------------------------
    // 연결
    // ------------------------------------------------------------

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection_snapshot(&self) -> ConnectionSnapshot {
        self.connection.snapshot()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.connection.watch_state()
    }

    pub fn reconnect_now(&self) {
        self.connection.reconnect_now();
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    /// 로그아웃 — 연결 종료, 폴러 중단, 상태 초기화
    pub async fn shutdown(self) {
        info!("세션 종료: user_id={}", self.user_id);
        let _ = self.shutdown_tx.send(true);

        self.connection.disconnect().await;
        self.poller.deactivate();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                debug!("세션 태스크 종료 에러: {e}");
            }
        }

        self.registry.clear();
        // Drop이 나머지를 정리
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        self.poller.deactivate();
        self.connection.abort();
    }
}

/// 인바운드 이벤트 → 판정 엔진
async fn dispatch(
    arbiter: Arc<NotificationArbiter>,
    mut inbound_rx: mpsc::Receiver<InboundEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = inbound_rx.recv() => match event {
                Some(event) => {
                    arbiter.process(event).await;
                }
                None => break,
            },
            _ = shutdown_requested(&mut shutdown_rx) => break,
        }
    }
    debug!("인바운드 디스패처 종료");
}
