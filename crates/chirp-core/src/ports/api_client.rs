//! REST API 클라이언트 포트.
//!
//! 구현: `chirp-network` crate (reqwest)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::checkpoint::{EventPage, PollCheckpoint};

/// 소셜 REST 협력자
#[async_trait]
pub trait SocialApi: Send + Sync {
    /// 친구(피어) ID 목록 조회
    async fn fetch_friend_ids(&self) -> Result<Vec<String>, CoreError>;

    /// 체크포인트 이후 놓친 이벤트 조회
    async fn fetch_events_since(
        &self,
        checkpoint: &PollCheckpoint,
        limit: u32,
    ) -> Result<EventPage, CoreError>;
}
