//! 체크포인트/알림 설정 저장소.
//!
//! 파일 저장소는 데이터 디렉토리 아래 JSON 파일 하나씩을 쓴다.
//! 메모리 저장소는 테스트와 임시 세션용.

use async_trait::async_trait;
use chirp_core::error::CoreError;
use chirp_core::models::checkpoint::PollCheckpoint;
use chirp_core::models::notification::NotificationPreferences;
use chirp_core::ports::storage::{CheckpointStore, PreferenceStore};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 체크포인트 파일 이름
pub const CHECKPOINT_FILE_NAME: &str = "poll_checkpoint.json";
/// 알림 설정 파일 이름
pub const PREFERENCES_FILE_NAME: &str = "notification_preferences.json";

/// 파일이 없으면 `Ok(None)`
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CoreError::Storage(format!(
                "파일 읽기 실패: {}: {e}",
                path.display()
            )))
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| CoreError::Storage(format!("파일 파싱 실패: {}: {e}", path.display())))
}

/// 임시 파일에 쓴 뒤 교체
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await.map_err(|e| {
        CoreError::Storage(format!("파일 저장 실패: {}: {e}", tmp.display()))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        CoreError::Storage(format!("파일 교체 실패: {}: {e}", path.display()))
    })?;

    debug!("저장 완료: {}", path.display());
    Ok(())
}

/// 파일 기반 폴링 체크포인트 저장소
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 데이터 디렉토리 아래 기본 파일 이름 사용
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CHECKPOINT_FILE_NAME))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Option<PollCheckpoint>, CoreError> {
        read_json(&self.path).await
    }

    async fn save(&self, checkpoint: &PollCheckpoint) -> Result<(), CoreError> {
        write_json(&self.path, checkpoint).await
    }
}

/// 파일 기반 알림 설정 저장소
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(PREFERENCES_FILE_NAME))
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn load(&self) -> Result<NotificationPreferences, CoreError> {
        match read_json(&self.path).await {
            Ok(prefs) => Ok(prefs.unwrap_or_default()),
            Err(e) => Err(CoreError::PreferenceStoreUnavailable(e.to_string())),
        }
    }

    async fn save(&self, preferences: &NotificationPreferences) -> Result<(), CoreError> {
        write_json(&self.path, preferences).await
    }
}

/// 메모리 저장소 — 두 포트 모두 구현
#[derive(Default)]
pub struct MemoryStore {
    checkpoint: Mutex<Option<PollCheckpoint>>,
    preferences: Mutex<Option<NotificationPreferences>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preferences(preferences: NotificationPreferences) -> Self {
        Self {
            checkpoint: Mutex::new(None),
            preferences: Mutex::new(Some(preferences)),
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self) -> Result<Option<PollCheckpoint>, CoreError> {
        Ok(self.checkpoint.lock().clone())
    }

    async fn save(&self, checkpoint: &PollCheckpoint) -> Result<(), CoreError> {
        *self.checkpoint.lock() = Some(checkpoint.clone());
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn load(&self) -> Result<NotificationPreferences, CoreError> {
        Ok(self.preferences.lock().clone().unwrap_or_default())
    }

    async fn save(&self, preferences: &NotificationPreferences) -> Result<(), CoreError> {
        *self.preferences.lock() = Some(preferences.clone());
        Ok(())
    }
}
