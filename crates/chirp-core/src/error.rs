//! Chirp 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 이 에러 타입을 그대로 반환한다.
//! 엔진 내부에서 복구 가능한 에러(전송, 폴링, 잘못된 이벤트)는
//! 상태 전이나 경고 로그로 처리되고 UI까지 전파되지 않는다.

use thiserror::Error;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 — {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 인증 실패 (토큰 만료, 자격증명 오류 등)
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 실시간 채널 전송 에러 (재연결 정책으로 복구)
    #[error("전송 에러: {0}")]
    Transport(String),

    /// 핸드셰이크 타임아웃 (실패한 연결 시도로 취급)
    #[error("핸드셰이크 타임아웃: {timeout_ms}ms 초과")]
    HandshakeTimeout {
        /// 초과된 타임아웃 (밀리초)
        timeout_ms: u64,
    },

    /// 폴백 폴링 실패 (다음 틱에서 재시도)
    #[error("폴링 에러: {0}")]
    Poll(String),

    /// 필수 필드가 빠진 인바운드 이벤트
    #[error("잘못된 이벤트 — 필수 필드 누락: {field}")]
    MalformedEvent {
        /// 누락된 필드명
        field: &'static str,
    },

    /// 알림 설정 저장소 접근 불가 (모든 카테고리 활성으로 fail open)
    #[error("알림 설정 저장소 사용 불가: {0}")]
    PreferenceStoreUnavailable(String),

    /// 로컬 저장소 에러
    #[error("저장소 에러: {0}")]
    Storage(String),

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// Rate Limit 초과 (429)
    #[error("요청 한도 초과, {retry_after_secs}초 후 재시도")]
    RateLimit {
        /// 재시도 대기 시간 (초)
        retry_after_secs: u64,
    },

    /// 서비스 일시 불가 (503)
    #[error("서비스 일시 불가: {0}")]
    ServiceUnavailable(String),

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}
