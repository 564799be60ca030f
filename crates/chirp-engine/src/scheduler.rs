//! tokio 기반 주기 작업.
//!
//! `ScheduledTask` 포트의 기본 구현. 등록 즉시 실행하지 않고 첫 간격이 지난 뒤부터
//! 고정 간격으로 콜백을 호출한다. 콜백이 늦어지면 다음 틱을 몰아서 실행하지 않는다.

use chirp_core::error::CoreError;
use chirp_core::ports::scheduler::{ScheduledTask, TaskCallback};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// tokio 주기 작업
#[derive(Default)]
pub struct TokioScheduledTask {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TokioScheduledTask {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduledTask for TokioScheduledTask {
    fn register(&self, interval: Duration, callback: TaskCallback) -> Result<(), CoreError> {
        if interval.is_zero() {
            return Err(CoreError::Validation {
                field: "interval".to_string(),
                message: "주기 작업 간격은 0일 수 없습니다".to_string(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::Internal(format!("tokio 런타임 없음: {e}")))?;

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback().await;
            }
        });

        if let Some(previous) = self.handle.lock().replace(handle) {
            previous.abort();
        }
        debug!("주기 작업 등록: {interval:?}");
        Ok(())
    }

    fn unregister(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            debug!("주기 작업 해제");
        }
    }

    fn is_registered(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TokioScheduledTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
