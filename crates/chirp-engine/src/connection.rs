//! 실시간 채널 연결 관리자.
//!
//! 세션당 하나의 실시간 채널을 소유한다. 연결/재연결은 전용 드라이버 태스크 하나가
//! 전담하며, 외부에서는 명령 채널로만 드라이버와 대화한다.
//!
//! - 연속 실패 시 지수 백오프 (1s → 2s → 4s → 5s 상한)
//! - `max_attempts`회 연속 실패 시 Degraded 전환, 이후 `degraded_retry` 간격으로 계속 시도
//! - 핸드셰이크가 타임아웃을 넘기면 실패한 시도로 취급
//! - 연결이 끊긴 동안의 명령은 용량 제한 큐에 보관 후 재연결 시 순서대로 전송
//! - 재연결마다 [`SubscriptionSync`] 스냅샷으로 프레즌스 구독 전체를 한 번 재전송

use chirp_core::config::RealtimeConfig;
use chirp_core::error::CoreError;
use chirp_core::models::connection::{ConnectionSnapshot, ConnectionState};
use chirp_core::models::event::{DeliveryPath, InboundEvent};
use chirp_core::models::session::SessionCredentials;
use chirp_core::models::wire::{OutboundCommand, ServerMessage};
use chirp_core::ports::transport::{RealtimeTransport, TransportFrame, TransportLink};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event_bus::{BusEvent, EventBus};

/// 재연결 시 전송할 프레즌스 구독 원본
///
/// 드라이버 태스크에서 동기 호출된다. 구현은 짧은 잠금만 잡아야 한다.
pub trait SubscriptionSync: Send + Sync {
    /// 현재 원하는 구독 대상 전체
    fn snapshot(&self) -> Vec<String>;

    /// 현재 링크로 명령이 전송됨
    fn mark_delivered(&self, command: &OutboundCommand);

    /// 링크가 끊김 — 이전 링크에서 확인된 구독은 모두 무효
    fn mark_link_lost(&self);
}

enum DriverCommand {
    Outbound(OutboundCommand),
    ReconnectNow,
}

/// 드라이버와 관리자가 공유하는 상태
struct Shared {
    transport: Arc<dyn RealtimeTransport>,
    config: RealtimeConfig,
    bus: Arc<EventBus>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    state_tx: watch::Sender<ConnectionSnapshot>,
    sync: RwLock<Option<Weak<dyn SubscriptionSync>>>,
    /// 드라이버가 없을 때 명령 수신기 보관소
    idle_commands: Mutex<Option<mpsc::UnboundedReceiver<DriverCommand>>>,
}

impl Shared {
    fn update_state(&self, state: ConnectionState, retry_count: u32) {
        let mut changed = false;
        self.state_tx.send_modify(|snapshot| {
            changed = snapshot.state != state;
            snapshot.state = state;
            snapshot.retry_count = retry_count;
            if state == ConnectionState::Connected {
                snapshot.last_connected_at = Some(Utc::now());
            }
        });

        if changed {
            info!("연결 상태 변경: {state} (재시도 {retry_count}회)");
            self.bus.publish(BusEvent::ConnectionChanged(state));
        }
    }

    fn current_state(&self) -> ConnectionState {
        self.state_tx.borrow().state
    }

    fn sync_source(&self) -> Option<Arc<dyn SubscriptionSync>> {
        self.sync.read().as_ref().and_then(Weak::upgrade)
    }

    /// 서버 텍스트 프레임 → 인바운드 이벤트
    async fn handle_text(&self, text: &str) {
        let parsed = ServerMessage::parse(text).and_then(|message| {
            message
                .map(|m| m.into_event(DeliveryPath::Live, Utc::now()))
                .transpose()
        });

        match parsed {
            Ok(Some(event)) => {
                if self.inbound_tx.send(event).await.is_err() {
                    debug!("인바운드 소비자 없음 — 이벤트 폐기");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("잘못된 서버 이벤트 폐기: {e}"),
        }
    }
}

struct DriverHandle {
    join: JoinHandle<mpsc::UnboundedReceiver<DriverCommand>>,
    shutdown: watch::Sender<bool>,
}

/// 실시간 채널 연결 관리자
pub struct ConnectionManager {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<DriverCommand>,
    driver: Mutex<Option<DriverHandle>>,
}

impl ConnectionManager {
    /// 새 연결 관리자 생성
    ///
    /// 파싱된 인바운드 이벤트는 `inbound_tx`로 전달된다.
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        config: RealtimeConfig,
        bus: Arc<EventBus>,
        inbound_tx: mpsc::Sender<InboundEvent>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionSnapshot::default());

        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                bus,
                inbound_tx,
                state_tx,
                sync: RwLock::new(None),
                idle_commands: Mutex::new(Some(command_rx)),
            }),
            commands,
            driver: Mutex::new(None),
        }
    }

    /// 재연결 시 구독 스냅샷을 제공할 원본 등록
    pub fn set_subscription_sync(&self, sync: Weak<dyn SubscriptionSync>) {
        *self.shared.sync.write() = Some(sync);
    }

    /// 연결 시작 (멱등)
    ///
    /// 이미 드라이버가 실행 중이면 새 채널을 열지 않고 현재 상태를 반환한다.
    pub fn connect(
        &self,
        credentials: SessionCredentials,
    ) -> Result<ConnectionSnapshot, CoreError> {
        let mut driver = self.driver.lock();

        if let Some(mut handle) = driver.take() {
            if !handle.join.is_finished() {
                debug!("연결 드라이버 이미 실행 중 — 재사용");
                *driver = Some(handle);
                return Ok(self.snapshot());
            }
            if let Some(Ok(commands)) = (&mut handle.join).now_or_never() {
                *self.shared.idle_commands.lock() = Some(commands);
            }
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::Internal(format!("tokio 런타임 없음: {e}")))?;
        let commands = self.shared.idle_commands.lock().take().ok_or_else(|| {
            CoreError::Internal("명령 채널이 유실되어 연결할 수 없습니다".to_string())
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shared.update_state(ConnectionState::Connecting, 0);

        let task = Driver {
            shared: Arc::clone(&self.shared),
            credentials,
            commands,
            shutdown: shutdown_rx,
            pending: VecDeque::new(),
            failures: 0,
            ever_connected: false,
        };
        *driver = Some(DriverHandle {
            join: runtime.spawn(task.run()),
            shutdown: shutdown_tx,
        });

        Ok(self.snapshot())
    }

    /// 명령 전송 — 연결이 끊긴 동안에는 큐에 보관
    pub fn send(&self, command: OutboundCommand) {
        if self.commands.send(DriverCommand::Outbound(command)).is_err() {
            debug!("연결 드라이버 종료됨 — 명령 폐기");
        }
    }

    /// 백오프 대기를 건너뛰고 즉시 재연결 (연속 실패 횟수 초기화)
    pub fn reconnect_now(&self) {
        let _ = self.commands.send(DriverCommand::ReconnectNow);
    }

    /// 연결 종료 — 드라이버가 끝날 때까지 대기
    pub async fn disconnect(&self) {
        let handle = self.driver.lock().take();
        let Some(handle) = handle else {
            return;
        };

        let _ = handle.shutdown.send(true);
        match handle.join.await {
            Ok(commands) => *self.shared.idle_commands.lock() = Some(commands),
            Err(e) => warn!("연결 드라이버 종료 실패: {e}"),
        }
        self.shared.update_state(ConnectionState::Disconnected, 0);
    }

    /// 드라이버 즉시 중단 (동기)
    pub fn abort(&self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.join.abort();
            self.shared.update_state(ConnectionState::Disconnected, 0);
        }
    }

    pub fn is_running(&self) -> bool {
        self.driver
            .lock()
            .as_ref()
            .is_some_and(|h| !h.join.is_finished())
    }

    /// 현재 연결 상태
    pub fn state(&self) -> ConnectionState {
        self.shared.current_state()
    }

    /// 현재 상태 스냅샷
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.shared.state_tx.borrow().clone()
    }

    /// 상태 변경 수신기
    pub fn watch_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.shared.state_tx.subscribe()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.get_mut().take() {
            handle.join.abort();
        }
    }
}

// ============================================================
// 드라이버 태스크
// ============================================================

enum Handshake {
    Ready(TransportLink),
    Failed(CoreError),
    Shutdown,
}

enum LinkEnd {
    Lost,
    Shutdown,
}

enum Wake {
    Retry,
    Shutdown,
}

pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    // 송신 측이 사라져도 종료로 취급
    let _ = rx.wait_for(|stop| *stop).await;
}

struct Driver {
    shared: Arc<Shared>,
    credentials: SessionCredentials,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    shutdown: watch::Receiver<bool>,
    /// 연결이 끊긴 동안 보관 중인 명령
    pending: VecDeque<OutboundCommand>,
    failures: u32,
    ever_connected: bool,
}

impl Driver {
    async fn run(mut self) -> mpsc::UnboundedReceiver<DriverCommand> {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.enter_attempt_state();

            match self.handshake().await {
                Handshake::Shutdown => break,
                Handshake::Ready(link) => {
                    self.failures = 0;
                    self.ever_connected = true;

                    let end = self.run_link(link).await;
                    if let Some(sync) = self.shared.sync_source() {
                        sync.mark_link_lost();
                    }

                    match end {
                        LinkEnd::Shutdown => break,
                        LinkEnd::Lost => {
                            self.shared.update_state(ConnectionState::Reconnecting, 0);
                            let delay = self.shared.config.backoff_for(1);
                            if let Wake::Shutdown = self.wait(delay).await {
                                break;
                            }
                        }
                    }
                }
                Handshake::Failed(e) => {
                    self.failures = self.failures.saturating_add(1);
                    let delay = if self.failures >= self.shared.config.max_attempts {
                        if self.shared.current_state() != ConnectionState::Degraded {
                            warn!(
                                "연속 {}회 연결 실패 — Degraded 모드 전환 (폴백 폴링)",
                                self.failures
                            );
                        }
                        self.shared
                            .update_state(ConnectionState::Degraded, self.failures);
                        self.shared.config.degraded_retry()
                    } else {
                        self.shared
                            .update_state(ConnectionState::Reconnecting, self.failures);
                        self.shared.config.backoff_for(self.failures)
                    };

                    warn!(
                        "실시간 채널 연결 실패 (연속 {}회): {e}, {delay:?} 후 재시도",
                        self.failures
                    );
                    if let Wake::Shutdown = self.wait(delay).await {
                        break;
                    }
                }
            }
        }

        debug!("연결 드라이버 종료");
        self.shared.update_state(ConnectionState::Disconnected, 0);
        self.commands
    }

    fn enter_attempt_state(&self) {
        let state = if self.failures >= self.shared.config.max_attempts {
            ConnectionState::Degraded
        } else if !self.ever_connected && self.failures == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        };
        self.shared.update_state(state, self.failures);
    }

    async fn handshake(&mut self) -> Handshake {
        let timeout = self.shared.config.handshake_timeout();
        let open = tokio::time::timeout(timeout, self.shared.transport.open(&self.credentials));

        tokio::select! {
            result = open => match result {
                Ok(Ok(link)) => Handshake::Ready(link),
                Ok(Err(e)) => Handshake::Failed(e),
                Err(_) => Handshake::Failed(CoreError::HandshakeTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
            _ = shutdown_requested(&mut self.shutdown) => Handshake::Shutdown,
        }
    }

    /// 백오프 대기 — 그 사이 들어온 명령은 큐에 보관
    async fn wait(&mut self, delay: Duration) -> Wake {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Wake::Retry,
                _ = shutdown_requested(&mut self.shutdown) => return Wake::Shutdown,
                command = self.commands.recv() => match command {
                    Some(DriverCommand::Outbound(command)) => self.enqueue(command),
                    Some(DriverCommand::ReconnectNow) => {
                        info!("즉시 재연결 요청");
                        self.failures = 0;
                        return Wake::Retry;
                    }
                    None => return Wake::Shutdown,
                },
            }
        }
    }

    fn enqueue(&mut self, command: OutboundCommand) {
        let capacity = self.shared.config.command_queue_capacity;
        if self.pending.len() >= capacity {
            if let Some(dropped) = self.pending.pop_front() {
                warn!("명령 큐 가득 참 ({capacity}건) — 가장 오래된 명령 폐기: {dropped:?}");
            }
        }
        self.pending.push_back(command);
    }

    async fn run_link(&mut self, link: TransportLink) -> LinkEnd {
        let TransportLink {
            outbound,
            mut inbound,
        } = link;
        // 이 링크에서 구독이 전송된 피어
        let mut on_wire: HashSet<String> = HashSet::new();

        self.shared.update_state(ConnectionState::Connected, 0);

        // 큐에 남은 프레즌스 명령은 전체 재전송이 대체한다
        let before = self.pending.len();
        self.pending.retain(|c| c.presence_target().is_none());
        if before != self.pending.len() {
            debug!("대기 중 프레즌스 명령 {}건 → 전체 재전송으로 대체", before - self.pending.len());
        }

        let snapshot = self
            .shared
            .sync_source()
            .map(|sync| sync.snapshot())
            .unwrap_or_default();
        info!(
            "실시간 채널 연결됨 — 프레즌스 구독 {}건 재전송, 대기 명령 {}건 전송",
            snapshot.len(),
            self.pending.len()
        );

        for peer in snapshot {
            let command = OutboundCommand::subscribe(peer);
            if !self.deliver(&outbound, &mut on_wire, command).await {
                return LinkEnd::Lost;
            }
        }
        while let Some(command) = self.pending.pop_front() {
            if !self.deliver(&outbound, &mut on_wire, command).await {
                return LinkEnd::Lost;
            }
        }

        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(TransportFrame::Text(text)) => self.shared.handle_text(&text).await,
                    Some(TransportFrame::Closed(reason)) => {
                        info!("실시간 채널 닫힘: {}", reason.as_deref().unwrap_or("사유 없음"));
                        return LinkEnd::Lost;
                    }
                    None => {
                        warn!("실시간 채널 수신 종료");
                        return LinkEnd::Lost;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(DriverCommand::Outbound(command)) => {
                        if !self.deliver(&outbound, &mut on_wire, command).await {
                            return LinkEnd::Lost;
                        }
                    }
                    Some(DriverCommand::ReconnectNow) => debug!("이미 연결됨 — 재연결 요청 무시"),
                    None => return LinkEnd::Shutdown,
                },
                _ = shutdown_requested(&mut self.shutdown) => return LinkEnd::Shutdown,
            }
        }
    }

    /// 링크로 명령 전송. 링크가 끊겼으면 `false`.
    ///
    /// 이미 링크에 반영된 구독/해제는 다시 보내지 않는다.
    async fn deliver(
        &mut self,
        outbound: &mpsc::Sender<OutboundCommand>,
        on_wire: &mut HashSet<String>,
        command: OutboundCommand,
    ) -> bool {
        if let Some((peer, subscribe)) = command.presence_target() {
            if on_wire.contains(peer) == subscribe {
                debug!("중복 프레즌스 명령 생략: {peer}");
                return true;
            }
        }

        if outbound.send(command.clone()).await.is_err() {
            warn!("명령 전송 실패 — 링크 끊김, 재연결 후 재전송");
            if self.pending.len() < self.shared.config.command_queue_capacity {
                self.pending.push_front(command);
            }
            return false;
        }

        if let Some((peer, subscribe)) = command.presence_target() {
            if subscribe {
                on_wire.insert(peer.to_string());
            } else {
                on_wire.remove(peer);
            }
        }
        if let Some(sync) = self.shared.sync_source() {
            sync.mark_delivered(&command);
        }
        true
    }
}
