//! 로컬 알림 포트.
//!
//! 구현: 플랫폼 어댑터 (`chirp-app`은 tracing 기반 구현 사용)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::notification::LocalAlert;

/// 로컬 알림 표시 인터페이스
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    /// 로컬 알림 표시
    async fn show_alert(&self, alert: &LocalAlert) -> Result<(), CoreError>;
}
