//! 알림 판정 엔진.
//!
//! 인바운드 이벤트마다 정확히 하나의 [`NotificationDecision`]을 만든다.
//!
//! 판정 순서 (먼저 걸리는 규칙이 이긴다):
//! 1. 본인이 보낸 이벤트 → 억제
//! 2. 지금 보고 있는 대화의 이벤트 → 억제
//! 3. 사용자가 끈 카테고리 → 억제
//! 4. 앱이 포그라운드면 로컬 알림, 아니면 OS 푸시에 위임
//!
//! 알림 억제는 표시만 막는다. 읽지 않은 수와 버스 전파는 별개로 진행된다.
//! 같은 이벤트가 실시간/폴링/푸시로 중복 도착하면 첫 번째만 처리한다.

use chirp_core::config::DedupConfig;
use chirp_core::models::event::{ConversationRef, EventPayload, InboundEvent, SocialEventKind};
use chirp_core::models::notification::{
    Decision, LocalAlert, NotificationCategory, NotificationDecision, NotificationPreferences,
    SuppressReason,
};
use chirp_core::ports::notifier::LocalNotifier;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::active_view::ActiveViewContext;
use crate::dedup::DedupCache;
use crate::event_bus::{BusEvent, EventBus, NotificationRecord};
use crate::presence::PresenceRegistry;
use crate::unread::{UnreadKey, UnreadLedger};

/// 알림 판정 엔진
pub struct NotificationArbiter {
    current_user_id: String,
    active_view: Arc<ActiveViewContext>,
    registry: Arc<PresenceRegistry>,
    bus: Arc<EventBus>,
    notifier: Arc<dyn LocalNotifier>,
    preferences: RwLock<NotificationPreferences>,
    foreground: AtomicBool,
    dedup: Mutex<DedupCache>,
    unread: Mutex<UnreadLedger>,
}

impl NotificationArbiter {
    pub fn new(
        current_user_id: impl Into<String>,
        active_view: Arc<ActiveViewContext>,
        registry: Arc<PresenceRegistry>,
        bus: Arc<EventBus>,
        notifier: Arc<dyn LocalNotifier>,
        dedup: &DedupConfig,
        preferences: NotificationPreferences,
    ) -> Self {
        Self {
            current_user_id: current_user_id.into(),
            active_view,
            registry,
            bus,
            notifier,
            preferences: RwLock::new(preferences),
            foreground: AtomicBool::new(true),
            dedup: Mutex::new(DedupCache::new(dedup.capacity, dedup.ttl())),
            unread: Mutex::new(UnreadLedger::new()),
        }
    }

    /// 판정 파이프라인 (부작용 없음, 중복 검사 제외)
    pub fn decide(&self, event: &InboundEvent) -> Decision {
        if event.is_presence() {
            return Decision::Suppress(SuppressReason::NotAlertable);
        }
        // origin_id가 없으면 본인 이벤트가 아닌 것으로 본다
        if event.is_from(&self.current_user_id) {
            return Decision::Suppress(SuppressReason::SelfOrigin);
        }
        if event
            .conversation()
            .is_some_and(|conversation| self.active_view.matches(conversation))
        {
            return Decision::Suppress(SuppressReason::ActiveView);
        }
        if let Some(category) = event.category() {
            if !self.preferences.read().is_enabled(category) {
                return Decision::Suppress(SuppressReason::CategoryDisabled);
            }
        }
        if self.is_foreground() {
            Decision::ShowLocal
        } else {
            Decision::DeferToPush
        }
    }

    /// 이벤트 처리 — 중복 제거, 판정, 카운터/버스 전파, 로컬 알림
    pub async fn process(&self, event: InboundEvent) -> NotificationDecision {
        // 프레즌스는 합성 ID라 중복 검사 대상이 아니다
        if !event.is_presence() && !self.dedup.lock().check_and_record(&event.id) {
            debug!("중복 이벤트 무시: {} ({:?})", event.id, event.delivery);
            return NotificationDecision {
                event_id: event.id,
                decision: Decision::Suppress(SuppressReason::Duplicate),
                update_counters: false,
            };
        }

        let decision = self.decide(&event);
        debug!("알림 판정: {} → {:?}", event.id, decision);

        if let EventPayload::PresenceChanged { peer_id, is_online } = &event.payload {
            self.registry.apply_presence(peer_id, *is_online);
        } else {
            self.propagate(&event, decision);
        }

        if decision == Decision::ShowLocal {
            self.show_alert(&event).await;
        }

        NotificationDecision {
            event_id: event.id,
            decision,
            update_counters: true,
        }
    }

    /// 카운터 갱신과 버스 발행
    fn propagate(&self, event: &InboundEvent, decision: Decision) {
        let counts_as_unread = !matches!(
            decision,
            Decision::Suppress(SuppressReason::SelfOrigin | SuppressReason::ActiveView)
        );

        if counts_as_unread {
            let key = match event.conversation() {
                Some(conversation) => UnreadKey::Conversation(conversation.clone()),
                None => UnreadKey::Activity,
            };
            let total = self.unread.lock().increment(key);
            self.bus.publish(BusEvent::UnreadCountChanged { total });
        }

        self.bus
            .publish(BusEvent::NotificationEvent(NotificationRecord {
                event: event.clone(),
                decision: NotificationDecision {
                    event_id: event.id.clone(),
                    decision,
                    update_counters: true,
                },
            }));
    }

    async fn show_alert(&self, event: &InboundEvent) {
        let Some(alert) = build_alert(event) else {
            return;
        };
        if let Err(e) = self.notifier.show_alert(&alert).await {
            debug!("로컬 알림 표시 실패: {e}");
        }
    }

    /// 알림 설정 교체
    pub fn update_preferences(&self, preferences: NotificationPreferences) {
        info!("알림 설정 변경: {preferences:?}");
        *self.preferences.write() = preferences;
    }

    pub fn preferences(&self) -> NotificationPreferences {
        self.preferences.read().clone()
    }

    /// 앱 포그라운드 여부 갱신
    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::Relaxed);
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::Relaxed)
    }

    /// OS 푸시로 이미 전달된 이벤트 기록 — 이후 실시간/폴링 사본은 중복 처리
    pub fn record_push_delivered(&self, event_id: &str) {
        self.dedup.lock().mark_seen(event_id);
    }

    /// 대화 읽음 처리. 읽지 않은 메시지가 있었으면 `true`.
    pub fn mark_conversation_read(&self, conversation: &ConversationRef) -> bool {
        let (cleared, total) = {
            let mut unread = self.unread.lock();
            let cleared = unread.clear(&UnreadKey::Conversation(conversation.clone()));
            (cleared, unread.total())
        };
        if cleared > 0 {
            self.bus.publish(BusEvent::UnreadCountChanged { total });
        }
        cleared > 0
    }

    /// 활동 알림 읽음 처리
    pub fn mark_activity_read(&self) {
        let (cleared, total) = {
            let mut unread = self.unread.lock();
            let cleared = unread.clear(&UnreadKey::Activity);
            (cleared, unread.total())
        };
        if cleared > 0 {
            self.bus.publish(BusEvent::UnreadCountChanged { total });
        }
    }

    pub fn unread_total(&self) -> u32 {
        self.unread.lock().total()
    }

    pub fn unread_for(&self, conversation: &ConversationRef) -> u32 {
        self.unread
            .lock()
            .count(&UnreadKey::Conversation(conversation.clone()))
    }
}

fn build_alert(event: &InboundEvent) -> Option<LocalAlert> {
    let category = event.category()?;
    let (title, body) = match &event.payload {
        EventPayload::DirectMessage { body, .. } => ("새 메시지", body.clone()),
        EventPayload::GroupMessage { body, .. } => ("새 그룹 메시지", body.clone()),
        EventPayload::Social { kind, .. } => (
            match kind {
                SocialEventKind::FriendRequest => "친구 요청",
                SocialEventKind::PostLike => "새 좋아요",
                SocialEventKind::Comment => "새 댓글",
                SocialEventKind::System => "공지",
            },
            None,
        ),
        EventPayload::PresenceChanged { .. } => return None,
    };

    let body = body.unwrap_or_else(|| match category {
        NotificationCategory::Messages => "메시지가 도착했습니다".to_string(),
        NotificationCategory::FriendRequests => "새 친구 요청이 있습니다".to_string(),
        NotificationCategory::PostLikes => "게시물에 좋아요가 달렸습니다".to_string(),
        NotificationCategory::Comments => "게시물에 댓글이 달렸습니다".to_string(),
        NotificationCategory::System => "새 공지가 있습니다".to_string(),
    });

    Some(LocalAlert {
        event_id: event.id.clone(),
        category,
        title: title.to_string(),
        body,
        conversation: event.conversation().cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chirp_core::config::RealtimeConfig;
    use chirp_core::error::CoreError;
    use chirp_core::models::event::{ConversationType, DeliveryPath};
    use chirp_core::models::session::SessionCredentials;
    use chirp_core::ports::transport::{RealtimeTransport, TransportLink};
    use chrono::Utc;
    use tokio::sync::mpsc;

    use crate::connection::ConnectionManager;

    struct NeverTransport;

    #[async_trait]
    impl RealtimeTransport for NeverTransport {
        async fn open(&self, _: &SessionCredentials) -> Result<TransportLink, CoreError> {
            Err(CoreError::Transport("offline".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<LocalAlert>>,
        fail: bool,
    }

    #[async_trait]
    impl LocalNotifier for RecordingNotifier {
        async fn show_alert(&self, alert: &LocalAlert) -> Result<(), CoreError> {
            self.alerts.lock().push(alert.clone());
            if self.fail {
                return Err(CoreError::Internal("notifier down".to_string()));
            }
            Ok(())
        }
    }

    struct Fixture {
        arbiter: NotificationArbiter,
        view: Arc<ActiveViewContext>,
        notifier: Arc<RecordingNotifier>,
        bus: Arc<EventBus>,
        registry: Arc<PresenceRegistry>,
    }

    fn fixture_with(notifier: RecordingNotifier) -> Fixture {
        let bus = Arc::new(EventBus::default());
        let (tx, _rx) = mpsc::channel(4);
        let connection = Arc::new(ConnectionManager::new(
            Arc::new(NeverTransport),
            RealtimeConfig::default(),
            bus.clone(),
            tx,
        ));
        let registry = Arc::new(PresenceRegistry::new(connection, bus.clone()));
        let view = Arc::new(ActiveViewContext::new());
        let notifier = Arc::new(notifier);
        let arbiter = NotificationArbiter::new(
            "me",
            view.clone(),
            registry.clone(),
            bus.clone(),
            notifier.clone(),
            &DedupConfig::default(),
            NotificationPreferences::default(),
        );
        Fixture {
            arbiter,
            view,
            notifier,
            bus,
            registry,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingNotifier::default())
    }

    fn dm(id: &str, origin: Option<&str>, peer: &str) -> InboundEvent {
        InboundEvent {
            id: id.to_string(),
            origin_id: origin.map(str::to_string),
            payload: EventPayload::DirectMessage {
                conversation: ConversationRef::personal(peer),
                body: Some("hi".to_string()),
            },
            delivery: DeliveryPath::Live,
            received_at: Utc::now(),
        }
    }

    fn social(id: &str, kind: SocialEventKind) -> InboundEvent {
        InboundEvent {
            id: id.to_string(),
            origin_id: Some("friend".to_string()),
            payload: EventPayload::Social {
                kind,
                reference_id: None,
            },
            delivery: DeliveryPath::Live,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn self_origin_beats_everything() {
        let f = fixture();
        let d = f.arbiter.process(dm("m1", Some("me"), "p")).await;
        assert_eq!(d.decision, Decision::Suppress(SuppressReason::SelfOrigin));
        assert_eq!(f.arbiter.unread_total(), 0);
        assert!(f.notifier.alerts.lock().is_empty());
    }

    #[tokio::test]
    async fn missing_origin_fails_open() {
        let f = fixture();
        let d = f.arbiter.process(dm("m1", None, "p")).await;
        assert_eq!(d.decision, Decision::ShowLocal);
    }

    #[tokio::test]
    async fn active_view_suppresses_without_counting() {
        let f = fixture();
        f.view.set_active_view("p", ConversationType::Personal);

        let d = f.arbiter.process(dm("m1", Some("p"), "p")).await;
        assert_eq!(d.decision, Decision::Suppress(SuppressReason::ActiveView));
        assert!(d.update_counters);
        assert_eq!(f.arbiter.unread_total(), 0);
    }

    #[tokio::test]
    async fn active_group_view_does_not_cover_personal_with_same_id() {
        let f = fixture();
        f.view.set_active_view("p", ConversationType::Group);
        let d = f.arbiter.process(dm("m1", Some("p"), "p")).await;
        assert_eq!(d.decision, Decision::ShowLocal);
    }

    #[tokio::test]
    async fn disabled_category_still_counts() {
        let f = fixture();
        let mut prefs = NotificationPreferences::default();
        prefs.set(NotificationCategory::PostLikes, false);
        f.arbiter.update_preferences(prefs);

        let d = f.arbiter.process(social("l1", SocialEventKind::PostLike)).await;
        assert_eq!(
            d.decision,
            Decision::Suppress(SuppressReason::CategoryDisabled)
        );
        assert_eq!(f.arbiter.unread_total(), 1);
        assert!(f.notifier.alerts.lock().is_empty());
    }

    #[tokio::test]
    async fn background_defers_to_push() {
        let f = fixture();
        f.arbiter.set_foreground(false);
        let d = f.arbiter.process(dm("m1", Some("p"), "p")).await;
        assert_eq!(d.decision, Decision::DeferToPush);
        assert_eq!(f.arbiter.unread_total(), 1);
        assert!(f.notifier.alerts.lock().is_empty());
    }

    #[tokio::test]
    async fn duplicate_is_suppressed_without_side_effects() {
        let f = fixture();
        let events = Arc::new(Mutex::new(0));
        let e = events.clone();
        let _sub = f.bus.subscribe(move |_| *e.lock() += 1);

        f.arbiter.process(dm("m1", Some("p"), "p")).await;
        let published = *events.lock();
        let d = f.arbiter.process(dm("m1", Some("p"), "p")).await;

        assert_eq!(d.decision, Decision::Suppress(SuppressReason::Duplicate));
        assert!(!d.update_counters);
        assert_eq!(*events.lock(), published);
        assert_eq!(f.arbiter.unread_total(), 1);
        assert_eq!(f.notifier.alerts.lock().len(), 1);
    }

    #[tokio::test]
    async fn push_delivered_event_is_not_shown_again() {
        let f = fixture();
        f.arbiter.record_push_delivered("m9");
        let d = f.arbiter.process(dm("m9", Some("p"), "p")).await;
        assert_eq!(d.decision, Decision::Suppress(SuppressReason::Duplicate));
    }

    #[tokio::test]
    async fn notifier_failure_does_not_change_decision() {
        let f = fixture_with(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let d = f.arbiter.process(dm("m1", Some("p"), "p")).await;
        assert_eq!(d.decision, Decision::ShowLocal);
        assert_eq!(f.notifier.alerts.lock().len(), 1);
    }

    #[tokio::test]
    async fn presence_updates_registry_and_is_not_alertable() {
        let f = fixture();
        f.registry.set_friends(vec!["p".to_string()]);
        let event = InboundEvent {
            id: "presence:p".to_string(),
            origin_id: Some("p".to_string()),
            payload: EventPayload::PresenceChanged {
                peer_id: "p".to_string(),
                is_online: true,
            },
            delivery: DeliveryPath::Live,
            received_at: Utc::now(),
        };

        let first = f.arbiter.process(event.clone()).await;
        let second = f.arbiter.process(event).await;

        assert_eq!(
            first.decision,
            Decision::Suppress(SuppressReason::NotAlertable)
        );
        assert_eq!(second.decision, first.decision);
        assert_eq!(f.registry.is_online("p"), Some(true));
        assert_eq!(f.arbiter.unread_total(), 0);
    }

    #[tokio::test]
    async fn mark_read_clears_and_publishes() {
        let f = fixture();
        let totals = Arc::new(Mutex::new(Vec::new()));
        let t = totals.clone();
        let _sub = f.bus.on_unread_count_changed(move |total| t.lock().push(total));

        f.arbiter.process(dm("m1", Some("p"), "p")).await;
        f.arbiter.process(dm("m2", Some("p"), "p")).await;
        f.arbiter.process(social("f1", SocialEventKind::FriendRequest)).await;

        assert!(f.arbiter.mark_conversation_read(&ConversationRef::personal("p")));
        assert!(!f.arbiter.mark_conversation_read(&ConversationRef::personal("p")));
        f.arbiter.mark_activity_read();

        assert_eq!(*totals.lock(), vec![1, 2, 3, 1, 0]);
    }

    #[test]
    fn alert_text_by_kind() {
        let alert = build_alert(&social("c1", SocialEventKind::Comment)).unwrap();
        assert_eq!(alert.title, "새 댓글");
        assert_eq!(alert.category, NotificationCategory::Comments);
        assert!(alert.conversation.is_none());

        let alert = build_alert(&dm("m1", Some("p"), "p")).unwrap();
        assert_eq!(alert.body, "hi");
        assert_eq!(alert.conversation, Some(ConversationRef::personal("p")));
    }
}
