//! 이벤트 ID 중복 제거 캐시.
//!
//! 같은 이벤트가 실시간 채널, 폴백 폴링, 푸시로 여러 번 도착할 수 있다.
//! 최근 이벤트 ID를 용량 제한 LRU에 TTL과 함께 보관한다.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// 최근 이벤트 ID 캐시
pub struct DedupCache {
    entries: LruCache<String, Instant>,
    ttl: Duration,
}

impl DedupCache {
    /// 용량 0은 1로 취급
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    /// 처음 보는 ID면 기록하고 `true`, TTL 안에 본 적 있으면 `false`
    pub fn check_and_record(&mut self, id: &str) -> bool {
        let now = Instant::now();
        if let Some(seen_at) = self.entries.get(id) {
            if now.duration_since(*seen_at) < self.ttl {
                return false;
            }
        }
        self.entries.put(id.to_string(), now);
        true
    }

    /// 다른 경로(푸시 등)로 이미 전달된 ID 기록
    pub fn mark_seen(&mut self, id: &str) {
        self.entries.put(id.to_string(), Instant::now());
    }

    /// 최근 본 ID인지 (LRU 순서는 건드리지 않음)
    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .peek(id)
            .is_some_and(|seen_at| seen_at.elapsed() < self.ttl)
    }

    /// 만료 항목 정리
    pub fn purge_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, seen_at)| seen_at.elapsed() >= self.ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.entries.pop(id);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
