//! 폴백 폴링 체크포인트.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 폴백 폴러가 마지막으로 확인한 위치. 재시작 후에도 유지된다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollCheckpoint {
    /// 서버가 돌려준 다음 조회 커서
    pub cursor: Option<String>,
    /// 체크포인트 생성 이후 폴링으로 전달된 이벤트 수
    pub delivered_count: u64,
    /// 최초 degraded 모드 진입 시각
    pub created_at: DateTime<Utc>,
    /// 커서가 없을 때 조회 시작 시각. 실시간 채널이 이 시각까지의 이벤트를 전달했다.
    #[serde(default = "Utc::now")]
    pub resume_after: DateTime<Utc>,
    /// 마지막 성공한 폴링 시각
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl PollCheckpoint {
    /// 새 체크포인트 (커서 없음)
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            cursor: None,
            delivered_count: 0,
            created_at: now,
            resume_after: now,
            last_polled_at: None,
        }
    }

    /// 실시간 채널이 `now`까지 이벤트를 전달한 뒤 끊겼다.
    ///
    /// 커서를 버리고 다음 폴링이 `now` 이후만 가져오도록 한다.
    pub fn rebase(&mut self, now: DateTime<Utc>) {
        self.cursor = None;
        self.resume_after = now;
    }

    /// 성공한 폴링 결과만큼 체크포인트 전진.
    ///
    /// 서버가 커서를 주지 않으면 기존 커서를 유지한다.
    pub fn advance(&mut self, next_cursor: Option<String>, delivered: usize, now: DateTime<Utc>) {
        if next_cursor.is_some() {
            self.cursor = next_cursor;
        }
        self.delivered_count += delivered as u64;
        self.last_polled_at = Some(now);
    }
}

/// "체크포인트 이후 이벤트" 조회 결과
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventPage {
    /// 누락된 이벤트 (원본 와이어 포맷, 개별 검증은 호출자가 수행)
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
    /// 다음 조회 커서
    #[serde(default)]
    pub next_cursor: Option<String>,
}
