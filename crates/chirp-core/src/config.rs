//! 엔진 설정 구조체.
//!
//! 서버 URL, 재연결 정책, 폴백 폴링 주기, 중복 제거 캐시 크기 등
//! 런타임 설정을 정의한다. [`crate::config_manager::ConfigManager`]가 JSON 파일로 로드/저장.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// 플랫폼 백그라운드 작업 최소 주기 (15분)
pub const MIN_POLL_INTERVAL_SECS: u64 = 900;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 서버 연결 설정
    pub server: ServerConfig,
    /// 실시간 채널 설정
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// 폴백 폴러 설정
    #[serde(default)]
    pub poller: PollerConfig,
    /// 중복 제거 캐시 설정
    #[serde(default)]
    pub dedup: DedupConfig,
    /// 이벤트 버스 설정
    #[serde(default)]
    pub event_bus: EventBusConfig,
}

// ============================================================
// 서버 설정
// ============================================================

/// 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// REST 기본 URL (WebSocket URL은 스킴을 바꿔 유도)
    pub base_url: String,
    /// WebSocket 경로
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// REST 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    /// REST 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

// ============================================================
// 실시간 채널 설정
// ============================================================

/// 실시간 채널 재연결 정책
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// 핸드셰이크 타임아웃 (밀리초) — 초과 시 실패한 시도로 취급
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// 첫 재시도 대기 (밀리초)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// 재시도 대기 상한 (밀리초)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// degraded 전환 전 연속 실패 허용 횟수
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// degraded 상태에서의 재연결 시도 간격 (초)
    #[serde(default = "default_degraded_retry_secs")]
    pub degraded_retry_secs: u64,
    /// 연결 끊김 중 보관할 명령 수 상한
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_max_attempts(),
            degraded_retry_secs: default_degraded_retry_secs(),
            command_queue_capacity: default_command_queue_capacity(),
        }
    }
}

impl RealtimeConfig {
    /// 핸드셰이크 타임아웃
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// `failures`번째 연속 실패 후 대기 시간.
    ///
    /// 1s → 2s → 4s → 5s(상한) ...
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    /// degraded 상태 재연결 간격
    pub fn degraded_retry(&self) -> Duration {
        Duration::from_secs(self.degraded_retry_secs)
    }
}

fn default_handshake_timeout_ms() -> u64 {
    20_000
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_degraded_retry_secs() -> u64 {
    60
}

fn default_command_queue_capacity() -> usize {
    256
}

// ============================================================
// 폴백 폴러 설정
// ============================================================

/// 폴백 폴러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// 폴링 주기 (초). 플랫폼 최소값보다 짧으면 최소값으로 올린다.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// 한 번에 가져올 이벤트 수
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            page_limit: default_page_limit(),
        }
    }
}

impl PollerConfig {
    /// 실제 적용되는 폴링 주기
    pub fn effective_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}

fn default_poll_interval_secs() -> u64 {
    MIN_POLL_INTERVAL_SECS
}

fn default_page_limit() -> u32 {
    100
}

// ============================================================
// 중복 제거 / 이벤트 버스
// ============================================================

/// 최근 이벤트 ID 캐시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// 보관할 최대 ID 수
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,
    /// ID 보관 기간 (초)
    #[serde(default = "default_dedup_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: default_dedup_capacity(),
            ttl_secs: default_dedup_ttl_secs(),
        }
    }
}

impl DedupConfig {
    /// ID 보관 기간
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_dedup_capacity() -> usize {
    200
}

fn default_dedup_ttl_secs() -> u64 {
    600
}

/// 이벤트 버스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// 비동기 구독자용 broadcast 채널 용량
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

fn default_bus_capacity() -> usize {
    128
}

impl AppConfig {
    /// 기본 설정값 반환
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:8000".to_string(),
                ws_path: default_ws_path(),
                request_timeout_ms: default_request_timeout_ms(),
            },
            realtime: RealtimeConfig::default(),
            poller: PollerConfig::default(),
            dedup: DedupConfig::default(),
            event_bus: EventBusConfig::default(),
        }
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.server.base_url.trim().is_empty() {
            return Err(invalid("server.base_url", "비어 있을 수 없습니다"));
        }
        if self.realtime.max_attempts == 0 {
            return Err(invalid("realtime.max_attempts", "1 이상이어야 합니다"));
        }
        if self.realtime.initial_backoff_ms == 0 {
            return Err(invalid("realtime.initial_backoff_ms", "1 이상이어야 합니다"));
        }
        if self.realtime.max_backoff_ms < self.realtime.initial_backoff_ms {
            return Err(invalid(
                "realtime.max_backoff_ms",
                "initial_backoff_ms보다 작을 수 없습니다",
            ));
        }
        if self.realtime.handshake_timeout_ms == 0 {
            return Err(invalid("realtime.handshake_timeout_ms", "1 이상이어야 합니다"));
        }
        if self.realtime.degraded_retry_secs == 0 {
            return Err(invalid("realtime.degraded_retry_secs", "1 이상이어야 합니다"));
        }
        if self.realtime.command_queue_capacity == 0 {
            return Err(invalid("realtime.command_queue_capacity", "1 이상이어야 합니다"));
        }
        if self.dedup.capacity == 0 {
            return Err(invalid("dedup.capacity", "1 이상이어야 합니다"));
        }
        if self.event_bus.capacity == 0 {
            return Err(invalid("event_bus.capacity", "1 이상이어야 합니다"));
        }
        if self.poller.page_limit == 0 {
            return Err(invalid("poller.page_limit", "1 이상이어야 합니다"));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

fn invalid(field: &str, message: &str) -> CoreError {
    CoreError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}
