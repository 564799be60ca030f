//! 주기 작업 포트.
//!
//! 플랫폼별 백그라운드 작업 등록을 추상화한다.
//! 구현: `chirp-engine::scheduler::TokioScheduledTask`

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;

/// 매 틱마다 호출되는 콜백
pub type TaskCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// 주기 작업 하나를 등록/해제하는 핸들
pub trait ScheduledTask: Send + Sync {
    /// 주기 작업 등록. 이미 등록되어 있으면 교체한다.
    fn register(&self, interval: Duration, callback: TaskCallback) -> Result<(), CoreError>;

    /// 등록 해제. 등록되지 않았으면 no-op.
    fn unregister(&self);

    /// 현재 등록 여부
    fn is_registered(&self) -> bool;
}
