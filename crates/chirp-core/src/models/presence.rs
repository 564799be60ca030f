//! 프레즌스 구독 모델.

use serde::{Deserialize, Serialize};

/// 구독 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Subscribed,
    Unsubscribed,
}

/// 피어 하나의 프레즌스 구독
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSubscription {
    /// 피어 사용자 ID
    pub peer_id: String,
    /// 엔진이 원하는 상태
    pub desired: SubscriptionState,
    /// 현재 연결에서 서버로 전달된 상태
    pub acked: SubscriptionState,
}

impl PeerSubscription {
    /// 구독 요청 상태의 새 항목 (아직 전달되지 않음)
    pub fn pending(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            desired: SubscriptionState::Subscribed,
            acked: SubscriptionState::Unsubscribed,
        }
    }

    /// 서버에 전달 완료 여부
    pub fn is_acked(&self) -> bool {
        self.acked == SubscriptionState::Subscribed
    }
}

/// 정규화된 프레즌스 변경
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub peer_id: String,
    pub is_online: bool,
}

/// 원하는 구독 집합의 변경분
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDiff {
    /// 새로 구독할 피어
    pub to_subscribe: Vec<String>,
    /// 구독 해제할 피어
    pub to_unsubscribe: Vec<String>,
}

impl SubscriptionDiff {
    /// 변경 없음
    pub fn is_empty(&self) -> bool {
        self.to_subscribe.is_empty() && self.to_unsubscribe.is_empty()
    }
}
