//! 인바운드 이벤트 모델.
//!
//! 실시간 채널과 폴백 폴러 양쪽에서 들어온 서버 이벤트는
//! 검증을 거쳐 동일한 [`InboundEvent`]로 정규화된다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::notification::NotificationCategory;

/// 대화 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    /// 1:1 대화 (대화 ID = 상대 사용자 ID)
    Personal,
    /// 그룹 대화
    Group,
}

impl std::fmt::Display for ConversationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationType::Personal => write!(f, "personal"),
            ConversationType::Group => write!(f, "group"),
        }
    }
}

/// 대화 참조 (ID + 종류)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationRef {
    /// 대화 ID
    pub id: String,
    /// 대화 종류
    pub conversation_type: ConversationType,
}

impl ConversationRef {
    /// 1:1 대화 참조
    pub fn personal(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            conversation_type: ConversationType::Personal,
        }
    }

    /// 그룹 대화 참조
    pub fn group(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            conversation_type: ConversationType::Group,
        }
    }
}

impl std::fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.conversation_type, self.id)
    }
}

/// 소셜 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialEventKind {
    FriendRequest,
    PostLike,
    Comment,
    System,
}

/// 이벤트 수신 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPath {
    /// 실시간 채널
    Live,
    /// 폴백 폴러
    Poll,
}

/// 이벤트 본문
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// 1:1 메시지
    DirectMessage {
        conversation: ConversationRef,
        body: Option<String>,
    },
    /// 그룹 메시지
    GroupMessage {
        conversation: ConversationRef,
        body: Option<String>,
    },
    /// 피어 온라인 상태 변경
    PresenceChanged { peer_id: String, is_online: bool },
    /// 친구 요청, 좋아요, 댓글, 시스템 공지
    Social {
        kind: SocialEventKind,
        reference_id: Option<String>,
    },
}

/// 정규화된 인바운드 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// 안정적인 이벤트 ID (중복 제거 키)
    pub id: String,
    /// 발신자 ID. 누락/모호하면 `None` (fail open: 알림 대상)
    pub origin_id: Option<String>,
    /// 이벤트 본문
    pub payload: EventPayload,
    /// 수신 경로
    pub delivery: DeliveryPath,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// 이벤트가 속한 대화 (메시지 이벤트만)
    pub fn conversation(&self) -> Option<&ConversationRef> {
        match &self.payload {
            EventPayload::DirectMessage { conversation, .. }
            | EventPayload::GroupMessage { conversation, .. } => Some(conversation),
            _ => None,
        }
    }

    /// 알림 카테고리. 프레즌스는 알림 대상이 아니므로 `None`
    pub fn category(&self) -> Option<NotificationCategory> {
        match &self.payload {
            EventPayload::DirectMessage { .. } | EventPayload::GroupMessage { .. } => {
                Some(NotificationCategory::Messages)
            }
            EventPayload::PresenceChanged { .. } => None,
            EventPayload::Social { kind, .. } => Some(match kind {
                SocialEventKind::FriendRequest => NotificationCategory::FriendRequests,
                SocialEventKind::PostLike => NotificationCategory::PostLikes,
                SocialEventKind::Comment => NotificationCategory::Comments,
                SocialEventKind::System => NotificationCategory::System,
            }),
        }
    }

    /// 발신자가 주어진 사용자인지 (origin 누락 시 false)
    pub fn is_from(&self, user_id: &str) -> bool {
        self.origin_id.as_deref() == Some(user_id)
    }

    /// 프레즌스 이벤트 여부
    pub fn is_presence(&self) -> bool {
        matches!(self.payload, EventPayload::PresenceChanged { .. })
    }
}
