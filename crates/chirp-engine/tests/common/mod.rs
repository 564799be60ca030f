//! 통합 테스트 공용 목(mock)과 세션 하네스.

#![allow(dead_code)]

use async_trait::async_trait;
use chirp_core::config::AppConfig;
use chirp_core::error::CoreError;
use chirp_core::models::checkpoint::{EventPage, PollCheckpoint};
use chirp_core::models::connection::ConnectionState;
use chirp_core::models::notification::LocalAlert;
use chirp_core::models::session::SessionCredentials;
use chirp_core::models::wire::OutboundCommand;
use chirp_core::ports::api_client::SocialApi;
use chirp_core::ports::notifier::LocalNotifier;
use chirp_core::ports::transport::{RealtimeTransport, TransportFrame, TransportLink};
use chirp_engine::event_bus::{BusEvent, NotificationRecord, Subscription};
use chirp_engine::scheduler::TokioScheduledTask;
use chirp_engine::store::MemoryStore;
use chirp_engine::{Session, SessionDeps};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const ME: &str = "me";

// ============================================================
// 실시간 전송
// ============================================================

/// 테스트가 쥐는 링크 반대편
pub struct LinkEnds {
    pub commands: mpsc::Receiver<OutboundCommand>,
    pub frames: mpsc::Sender<TransportFrame>,
}

impl LinkEnds {
    /// 지금까지 전송된 명령 전부
    pub fn drain(&mut self) -> Vec<OutboundCommand> {
        let mut out = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            out.push(command);
        }
        out
    }

    pub async fn push(&self, message: Value) {
        self.frames
            .send(TransportFrame::Text(message.to_string()))
            .await
            .expect("driver gone");
    }

    pub async fn close(&self) {
        let _ = self
            .frames
            .send(TransportFrame::Closed(Some("test".to_string())))
            .await;
    }
}

/// 앞쪽 N번의 연결 시도를 실패시키는 전송
pub struct MockTransport {
    failures_left: Mutex<u32>,
    attempts: Mutex<Vec<Instant>>,
    links: mpsc::UnboundedSender<LinkEnds>,
}

impl MockTransport {
    pub fn new(failures: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<LinkEnds>) {
        let (links, links_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            failures_left: Mutex::new(failures),
            attempts: Mutex::new(Vec::new()),
            links,
        });
        (transport, links_rx)
    }

    pub fn fail_next(&self, n: u32) {
        *self.failures_left.lock() = n;
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn gaps(&self) -> Vec<Duration> {
        self.attempts
            .lock()
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn open(&self, _: &SessionCredentials) -> Result<TransportLink, CoreError> {
        self.attempts.lock().push(Instant::now());
        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(CoreError::Transport("connection refused".to_string()));
            }
        }

        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let _ = self.links.send(LinkEnds {
            commands: out_rx,
            frames: in_tx,
        });
        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

// ============================================================
// REST / 알림
// ============================================================

#[derive(Default)]
pub struct MockApi {
    pub friends: Mutex<Vec<String>>,
    pub pages: Mutex<VecDeque<EventPage>>,
    pub cursors: Mutex<Vec<Option<String>>>,
}

impl MockApi {
    pub fn with_friends(friends: &[&str]) -> Arc<Self> {
        let api = Self::default();
        *api.friends.lock() = friends.iter().map(|s| s.to_string()).collect();
        Arc::new(api)
    }

    pub fn push_page(&self, events: Vec<Value>, next_cursor: &str) {
        self.pages.lock().push_back(EventPage {
            events,
            next_cursor: Some(next_cursor.to_string()),
        });
    }
}

#[async_trait]
impl SocialApi for MockApi {
    async fn fetch_friend_ids(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.friends.lock().clone())
    }

    async fn fetch_events_since(
        &self,
        checkpoint: &PollCheckpoint,
        _limit: u32,
    ) -> Result<EventPage, CoreError> {
        self.cursors.lock().push(checkpoint.cursor.clone());
        Ok(self.pages.lock().pop_front().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<LocalAlert>>,
}

#[async_trait]
impl LocalNotifier for RecordingNotifier {
    async fn show_alert(&self, alert: &LocalAlert) -> Result<(), CoreError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

// ============================================================
// 서버 이벤트 JSON
// ============================================================

pub fn direct_message(id: &str, origin: &str, conversation: &str) -> Value {
    json!({
        "type": "message_new",
        "id": id,
        "origin_id": origin,
        "conversation_id": conversation,
        "body": "hello",
    })
}

pub fn group_message(id: &str, origin: &str, group: &str) -> Value {
    json!({
        "type": "group_message_new",
        "id": id,
        "origin_id": origin,
        "group_id": group,
        "body": "hello all",
    })
}

pub fn post_like(id: &str, origin: &str) -> Value {
    json!({
        "type": "social_event",
        "id": id,
        "origin_id": origin,
        "kind": "post_like",
        "reference_id": "post_1",
    })
}

pub fn presence(peer: &str, online: bool) -> Value {
    json!({"type": "presence_changed", "peer_id": peer, "is_online": online})
}

// ============================================================
// 세션 하네스
// ============================================================

pub struct Harness {
    pub session: Session,
    pub transport: Arc<MockTransport>,
    pub links: mpsc::UnboundedReceiver<LinkEnds>,
    pub api: Arc<MockApi>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<MemoryStore>,
    pub bus_log: Arc<Mutex<Vec<BusEvent>>>,
    _bus_subscription: Subscription,
}

impl Harness {
    /// 연결 시도 `failures`번 실패 후 성공하는 세션
    pub async fn start(failures: u32, api: Arc<MockApi>) -> Self {
        let (transport, links) = MockTransport::new(failures);
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::new());

        let deps = SessionDeps {
            transport: transport.clone(),
            api: api.clone(),
            notifier: notifier.clone(),
            checkpoints: store.clone(),
            preferences: store.clone(),
            scheduler: Arc::new(TokioScheduledTask::new()),
        };
        let session = Session::start(
            SessionCredentials::new(ME, "token"),
            deps,
            &AppConfig::default_config(),
        )
        .await
        .expect("session start");

        let bus_log = Arc::new(Mutex::new(Vec::new()));
        let log = bus_log.clone();
        let subscription = session.subscribe(move |event| log.lock().push(event.clone()));

        Self {
            session,
            transport,
            links,
            api,
            notifier,
            store,
            bus_log,
            _bus_subscription: subscription,
        }
    }

    pub async fn next_link(&mut self) -> LinkEnds {
        self.links.recv().await.expect("transport dropped")
    }

    /// 연결 완료까지 대기하고 링크 반환
    pub async fn connected_link(&mut self) -> LinkEnds {
        let link = self.next_link().await;
        self.wait_for_state(ConnectionState::Connected).await;
        settle().await;
        link
    }

    pub async fn wait_for_state(&self, state: ConnectionState) {
        let mut rx = self.session.watch_connection();
        let _ = rx.wait_for(|s| s.state == state).await;
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.bus_log
            .lock()
            .iter()
            .filter_map(|e| match e {
                BusEvent::NotificationEvent(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn unread_changes(&self) -> Vec<u32> {
        self.bus_log
            .lock()
            .iter()
            .filter_map(|e| match e {
                BusEvent::UnreadCountChanged { total } => Some(*total),
                _ => None,
            })
            .collect()
    }

    pub fn alert_count(&self) -> usize {
        self.notifier.alerts.lock().len()
    }
}

/// 백그라운드 태스크가 할 일을 끝낼 때까지 대기
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn subscribes(commands: &[OutboundCommand]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|c| match c {
            OutboundCommand::SubscribePresence { peer_id } => Some(peer_id.clone()),
            _ => None,
        })
        .collect()
}
