//! 내부 이벤트 버스.
//!
//! UI 구독자에게 프레즌스, 읽지 않은 수, 알림 이벤트, 연결 상태를 전달한다.
//! 동기 구독자는 `publish` 호출 안에서 순서대로 호출되며, 한 구독자의 패닉은
//! 격리되어 나머지 구독자 전달을 막지 않는다. 비동기 소비자는
//! `tokio::broadcast` 수신기를 사용한다.

use chirp_core::models::connection::ConnectionState;
use chirp_core::models::event::InboundEvent;
use chirp_core::models::notification::NotificationDecision;
use chirp_core::models::presence::PresenceUpdate;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// 판정과 함께 전달되는 알림 이벤트
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub event: InboundEvent,
    pub decision: NotificationDecision,
}

/// 버스 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// 피어 온라인 상태 변경
    PresenceChanged(PresenceUpdate),
    /// 전체 읽지 않은 수 변경
    UnreadCountChanged { total: u32 },
    /// 인바운드 이벤트 처리 결과 (알림 억제 여부와 무관하게 발행)
    NotificationEvent(NotificationRecord),
    /// 연결 상태 변경
    ConnectionChanged(ConnectionState),
}

type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerTable {
    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }
}

/// 구독 핸들 — drop 시 구독 해제
#[must_use = "Subscription을 버리면 즉시 구독이 해제됩니다"]
pub struct Subscription {
    id: u64,
    table: Weak<ListenerTable>,
}

impl Subscription {
    /// 명시적 구독 해제
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// 버스가 살아 있는 동안 구독 유지 (핸들 소유권 포기)
    pub fn detach(mut self) {
        self.table = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.remove(self.id);
        }
    }
}

/// 내부 이벤트 버스
pub struct EventBus {
    table: Arc<ListenerTable>,
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// 새 이벤트 버스 생성
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            table: Arc::new(ListenerTable::default()),
            tx,
        }
    }

    /// 동기 구독자 등록
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed);
        self.table.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// 비동기 구독자 생성
    pub fn subscribe_channel(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// 프레즌스 변경 구독
    pub fn on_presence_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let BusEvent::PresenceChanged(update) = event {
                listener(&update.peer_id, update.is_online);
            }
        })
    }

    /// 읽지 않은 수 변경 구독
    pub fn on_unread_count_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let BusEvent::UnreadCountChanged { total } = event {
                listener(*total);
            }
        })
    }

    /// 알림 이벤트 구독
    pub fn on_notification_event<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&NotificationRecord) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let BusEvent::NotificationEvent(record) = event {
                listener(record);
            }
        })
    }

    /// 이벤트 발행
    ///
    /// 현재 구독자 스냅샷을 잠금 밖에서 호출하므로 구독자가 발행 도중
    /// 구독/해제를 해도 교착되지 않는다.
    pub fn publish(&self, event: BusEvent) {
        debug!("이벤트 발행: {:?}", std::mem::discriminant(&event));

        let snapshot: Vec<Listener> = self
            .table
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!("이벤트 구독자 패닉 격리 — 나머지 구독자에게 계속 전달");
            }
        }

        let _ = self.tx.send(event);
    }

    /// 동기 구독자 수
    pub fn listener_count(&self) -> usize {
        self.table.listeners.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_channel();

        bus.publish(BusEvent::ConnectionChanged(ConnectionState::Connected));

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            BusEvent::ConnectionChanged(ConnectionState::Connected)
        ));
    }

    #[test]
    fn multiple_sync_subscribers() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = hits.clone();
        let _s1 = bus.subscribe(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = hits.clone();
        let _s2 = bus.subscribe(move |_| {
            h2.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(BusEvent::UnreadCountChanged { total: 3 });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let sub = bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.listener_count(), 1);

        sub.unsubscribe();
        assert_eq!(bus.listener_count(), 0);

        bus.publish(BusEvent::UnreadCountChanged { total: 1 });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn detached_subscription_stays() {
        let bus = EventBus::default();
        bus.subscribe(|_| {}).detach();
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = bus.subscribe(|_| panic!("구독자 버그"));
        let h = hits.clone();
        let _good = bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(BusEvent::UnreadCountChanged { total: 1 });
        bus.publish(BusEvent::UnreadCountChanged { total: 2 });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_publish() {
        let bus = Arc::new(EventBus::default());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot_inner = slot.clone();
        let sub = bus.subscribe(move |_| {
            slot_inner.lock().take();
        });
        *slot.lock() = Some(sub);

        bus.publish(BusEvent::UnreadCountChanged { total: 1 });
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn typed_helpers_filter_events() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let _presence = bus.on_presence_changed(move |peer, online| {
            s.lock().push(format!("{peer}:{online}"));
        });
        let s = seen.clone();
        let _unread = bus.on_unread_count_changed(move |total| {
            s.lock().push(format!("unread:{total}"));
        });

        bus.publish(BusEvent::PresenceChanged(PresenceUpdate {
            peer_id: "u1".to_string(),
            is_online: true,
        }));
        bus.publish(BusEvent::UnreadCountChanged { total: 4 });
        bus.publish(BusEvent::ConnectionChanged(ConnectionState::Degraded));

        assert_eq!(*seen.lock(), vec!["u1:true", "unread:4"]);
    }
}
