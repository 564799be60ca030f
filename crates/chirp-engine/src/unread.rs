//! 읽지 않은 수 집계.

use chirp_core::models::event::ConversationRef;
use std::collections::HashMap;

/// 집계 단위
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnreadKey {
    /// 대화별 메시지
    Conversation(ConversationRef),
    /// 친구 요청, 좋아요, 댓글, 공지 등 활동 알림
    Activity,
}

/// 읽지 않은 수 장부
#[derive(Debug, Default)]
pub struct UnreadLedger {
    counts: HashMap<UnreadKey, u32>,
}

impl UnreadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1 증가 후 새 합계 반환
    pub fn increment(&mut self, key: UnreadKey) -> u32 {
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add(1);
        self.total()
    }

    /// 키 초기화 — 지운 수 반환 (없으면 0)
    pub fn clear(&mut self, key: &UnreadKey) -> u32 {
        self.counts.remove(key).unwrap_or(0)
    }

    pub fn count(&self, key: &UnreadKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts
            .values()
            .fold(0u32, |acc, n| acc.saturating_add(*n))
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }
}
