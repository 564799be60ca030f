//! 로컬 저장소 포트.
//!
//! 구현: `chirp-engine::store` (JSON 파일 / 인메모리)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::checkpoint::PollCheckpoint;
use crate::models::notification::NotificationPreferences;

/// 폴링 체크포인트 저장소
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 저장된 체크포인트 (없으면 `None`)
    async fn load(&self) -> Result<Option<PollCheckpoint>, CoreError>;

    /// 체크포인트 저장
    async fn save(&self, checkpoint: &PollCheckpoint) -> Result<(), CoreError>;
}

/// 알림 설정 저장소
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// 저장된 설정 (없으면 기본값)
    async fn load(&self) -> Result<NotificationPreferences, CoreError>;

    /// 설정 저장
    async fn save(&self, preferences: &NotificationPreferences) -> Result<(), CoreError>;
}
