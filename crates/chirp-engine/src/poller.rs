//! 폴백 폴러.
//!
//! 실시간 채널이 Degraded일 때만 동작한다. 고정 간격(최소 15분)으로 체크포인트 이후의
//! 이벤트를 REST로 가져와 실시간 경로와 같은 판정 엔진에 넣는다.
//! 실패한 폴링은 재시도하지 않는다 — 다음 틱이 곧 재시도이며 체크포인트는 그대로 남는다.
//! Degraded에 다시 들어와도 마지막 시도 후 간격이 지나지 않았으면 즉시 폴링하지 않는다.
//! 실시간 채널이 끊길 때마다 체크포인트를 그 시각으로 옮겨, 실시간으로 받은 이벤트를 다시 가져오지 않는다.

use chirp_core::config::PollerConfig;
use chirp_core::error::CoreError;
use chirp_core::models::checkpoint::PollCheckpoint;
use chirp_core::models::connection::{ConnectionSnapshot, ConnectionState};
use chirp_core::models::event::DeliveryPath;
use chirp_core::models::notification::{Decision, SuppressReason};
use chirp_core::models::wire::ServerMessage;
use chirp_core::ports::api_client::SocialApi;
use chirp_core::ports::scheduler::{ScheduledTask, TaskCallback};
use chirp_core::ports::storage::CheckpointStore;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::arbitration::NotificationArbiter;
use crate::connection::shutdown_requested;

/// 폴링 1회 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// 서버에서 받은 이벤트 수 (체크포인트 전진량)
    pub fetched: usize,
    /// 판정 엔진을 통과한 이벤트 수
    pub processed: usize,
    /// 이미 다른 경로로 처리된 이벤트 수
    pub duplicates: usize,
    /// 필드 누락 등으로 폐기된 이벤트 수
    pub malformed: usize,
}

/// 폴백 폴러
pub struct FallbackPoller {
    api: Arc<dyn SocialApi>,
    store: Arc<dyn CheckpointStore>,
    arbiter: Arc<NotificationArbiter>,
    scheduler: Arc<dyn ScheduledTask>,
    config: PollerConfig,
    /// 폴링 직렬화 겸 메모리 체크포인트
    checkpoint: Mutex<Option<PollCheckpoint>>,
    active: AtomicBool,
    /// 마지막 폴링 시도 (성공/실패 무관)
    last_attempt: parking_lot::Mutex<Option<Instant>>,
}

impl FallbackPoller {
    pub fn new(
        api: Arc<dyn SocialApi>,
        store: Arc<dyn CheckpointStore>,
        arbiter: Arc<NotificationArbiter>,
        scheduler: Arc<dyn ScheduledTask>,
        config: PollerConfig,
    ) -> Self {
        Self {
            api,
            store,
            arbiter,
            scheduler,
            config,
            checkpoint: Mutex::new(None),
            active: AtomicBool::new(false),
            last_attempt: parking_lot::Mutex::new(None),
        }
    }

    /// 주기 폴링 시작 (멱등). 즉시 폴링은 호출자가 결정한다.
    pub fn activate(self: &Arc<Self>) -> Result<(), CoreError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let interval = self.config.effective_interval();
        let weak = Arc::downgrade(self);
        let callback: TaskCallback = Arc::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(poller) = weak.upgrade() {
                    if let Err(e) = poller.poll_once().await {
                        debug!("주기 폴링 실패: {e}");
                    }
                }
            })
        });

        if let Err(e) = self.scheduler.register(interval, callback) {
            self.active.store(false, Ordering::SeqCst);
            return Err(e);
        }
        info!("폴백 폴링 시작: {}초 간격", interval.as_secs());
        Ok(())
    }

    /// 주기 폴링 중단
    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.scheduler.unregister();
            info!("폴백 폴링 중단");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// 마지막 시도 후 폴링 간격이 지났는지
    pub fn poll_due(&self) -> bool {
        let interval = self.config.effective_interval();
        self.last_attempt
            .lock()
            .map_or(true, |at| at.elapsed() >= interval)
    }

    /// 현재 체크포인트
    pub async fn checkpoint(&self) -> Option<PollCheckpoint> {
        self.checkpoint.lock().await.clone()
    }

    /// 폴링 1회
    ///
    /// 실패하면 체크포인트를 건드리지 않고 `CoreError::Poll`을 반환한다.
    pub async fn poll_once(&self) -> Result<PollOutcome, CoreError> {
        let mut slot = self.checkpoint.lock().await;
        *self.last_attempt.lock() = Some(Instant::now());
        let mut checkpoint = match slot.as_ref() {
            Some(checkpoint) => checkpoint.clone(),
            None => self.load_or_create().await,
        };

        let page = self
            .api
            .fetch_events_since(&checkpoint, self.config.page_limit)
            .await
            .map_err(|e| {
                warn!("폴백 폴링 실패 — 다음 틱까지 대기: {e}");
                CoreError::Poll(e.to_string())
            })?;

        let mut outcome = PollOutcome {
            fetched: page.events.len(),
            ..Default::default()
        };

        for raw in page.events {
            let parsed = ServerMessage::from_value(raw).and_then(|message| {
                message
                    .map(|m| m.into_event(DeliveryPath::Poll, Utc::now()))
                    .transpose()
            });
            match parsed {
                Ok(Some(event)) => {
                    let decision = self.arbiter.process(event).await;
                    if decision.decision == Decision::Suppress(SuppressReason::Duplicate) {
                        outcome.duplicates += 1;
                    } else {
                        outcome.processed += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("잘못된 폴링 이벤트 폐기: {e}");
                    outcome.malformed += 1;
                }
            }
        }

        checkpoint.advance(page.next_cursor, outcome.fetched, Utc::now());
        if let Err(e) = self.store.save(&checkpoint).await {
            warn!("체크포인트 저장 실패: {e}");
        }
        *slot = Some(checkpoint);

        debug!("폴백 폴링 완료: {outcome:?}");
        Ok(outcome)
    }

    /// 저장된 체크포인트, 없으면 첫 활성화 시각으로 새로 만든다
    async fn load_or_create(&self) -> PollCheckpoint {
        match self.store.load().await {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => {
                let checkpoint = PollCheckpoint::new(Utc::now());
                info!("폴링 체크포인트 생성");
                if let Err(e) = self.store.save(&checkpoint).await {
                    warn!("체크포인트 저장 실패: {e}");
                }
                checkpoint
            }
            Err(e) => {
                warn!("체크포인트 로드 실패 — 새로 시작: {e}");
                PollCheckpoint::new(Utc::now())
            }
        }
    }

    /// 실시간 채널이 `now`까지 전달했음을 기록 (커서 폐기)
    pub async fn rebase(&self, now: DateTime<Utc>) {
        let mut slot = self.checkpoint.lock().await;
        let mut checkpoint = match slot.take() {
            Some(checkpoint) => checkpoint,
            None => match self.store.load().await {
                Ok(Some(checkpoint)) => checkpoint,
                Ok(None) => PollCheckpoint::new(now),
                Err(e) => {
                    warn!("체크포인트 로드 실패 — 새로 시작: {e}");
                    PollCheckpoint::new(now)
                }
            },
        };
        checkpoint.rebase(now);
        if let Err(e) = self.store.save(&checkpoint).await {
            warn!("체크포인트 저장 실패: {e}");
        }
        debug!("폴링 체크포인트 재설정: {now}");
        *slot = Some(checkpoint);
    }

    /// 연결 상태 감시 루프
    ///
    /// Degraded 진입 시 활성화하고 간격이 지났으면 즉시 한 번 폴링, Connected 복귀 시 중단.
    /// 연결이 끊긴 것을 처음 본 시점에 체크포인트를 재설정한다.
    pub async fn run(
        self: Arc<Self>,
        mut state_rx: watch::Receiver<ConnectionSnapshot>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        // 재설정을 마친 연결 (last_connected_at 기준)
        let mut rebased_for: Option<DateTime<Utc>> = None;

        loop {
            let snapshot = state_rx.borrow_and_update().clone();
            if snapshot.state == ConnectionState::Connected {
                if self.is_active() {
                    self.deactivate();
                }
            } else {
                if snapshot.last_connected_at.is_some()
                    && snapshot.last_connected_at != rebased_for
                {
                    rebased_for = snapshot.last_connected_at;
                    self.rebase(Utc::now()).await;
                }
                if snapshot.state == ConnectionState::Degraded && !self.is_active() {
                    match self.activate() {
                        Ok(()) if self.poll_due() => {
                            if let Err(e) = self.poll_once().await {
                                debug!("첫 폴백 폴링 실패: {e}");
                            }
                        }
                        Ok(()) => debug!("최근 폴링 이후 간격 미달 — 다음 틱까지 대기"),
                        Err(e) => warn!("폴백 폴링 시작 실패: {e}"),
                    }
                }
            }

            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown_requested(&mut shutdown_rx) => break,
            }
        }

        self.deactivate();
        debug!("폴백 폴러 감시 종료");
    }
}
