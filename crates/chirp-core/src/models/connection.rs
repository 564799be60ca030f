//! 실시간 연결 상태 모델.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// 연결 없음 (세션 시작 전/종료 후)
    Disconnected,
    /// 최초 연결 시도 중
    Connecting,
    /// 연결됨
    Connected,
    /// 연결이 끊겨 재연결 시도 중
    Reconnecting,
    /// 재연결 한도 소진 — 폴백 폴러가 이벤트 수신 담당
    Degraded,
}

impl ConnectionState {
    /// 실시간 채널 사용 가능 여부
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Degraded => write!(f, "Degraded"),
        }
    }
}

/// 연결 상태 스냅샷 (watch 채널로 브로드캐스트)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    /// 현재 상태
    pub state: ConnectionState,
    /// 연속 실패 횟수
    pub retry_count: u32,
    /// 마지막 연결 성공 시각
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_count: 0,
            last_connected_at: None,
        }
    }
}
