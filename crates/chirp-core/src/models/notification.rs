//! 알림 판정 모델.
//!
//! 사용자 알림 설정, 판정 결과, 로컬 알림 요청을 정의한다.

use serde::{Deserialize, Serialize};

use super::event::ConversationRef;

/// 알림 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Messages,
    FriendRequests,
    PostLikes,
    Comments,
    System,
}

impl NotificationCategory {
    /// 전체 카테고리 목록
    pub const ALL: [NotificationCategory; 5] = [
        NotificationCategory::Messages,
        NotificationCategory::FriendRequests,
        NotificationCategory::PostLikes,
        NotificationCategory::Comments,
        NotificationCategory::System,
    ];
}

/// 사용자 알림 설정 — 카테고리별 on/off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default = "default_true")]
    pub messages: bool,
    #[serde(default = "default_true")]
    pub friend_requests: bool,
    #[serde(default = "default_true")]
    pub post_likes: bool,
    #[serde(default = "default_true")]
    pub comments: bool,
    #[serde(default = "default_true")]
    pub system: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            messages: true,
            friend_requests: true,
            post_likes: true,
            comments: true,
            system: true,
        }
    }
}

impl NotificationPreferences {
    /// 카테고리 활성 여부
    pub fn is_enabled(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::Messages => self.messages,
            NotificationCategory::FriendRequests => self.friend_requests,
            NotificationCategory::PostLikes => self.post_likes,
            NotificationCategory::Comments => self.comments,
            NotificationCategory::System => self.system,
        }
    }

    /// 카테고리 활성 여부 변경
    pub fn set(&mut self, category: NotificationCategory, enabled: bool) {
        let slot = match category {
            NotificationCategory::Messages => &mut self.messages,
            NotificationCategory::FriendRequests => &mut self.friend_requests,
            NotificationCategory::PostLikes => &mut self.post_likes,
            NotificationCategory::Comments => &mut self.comments,
            NotificationCategory::System => &mut self.system,
        };
        *slot = enabled;
    }
}

/// 알림 억제 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// 본인이 발생시킨 이벤트 (self-echo)
    SelfOrigin,
    /// 현재 보고 있는 대화의 이벤트
    ActiveView,
    /// 사용자가 끈 카테고리
    CategoryDisabled,
    /// 이미 처리한 이벤트 ID
    Duplicate,
    /// 알림 대상이 아닌 이벤트 (프레즌스)
    NotAlertable,
}

/// 알림 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum Decision {
    /// 알림 억제
    Suppress(SuppressReason),
    /// 로컬 알림 표시 (앱 포그라운드)
    ShowLocal,
    /// 외부 푸시에 위임 (앱 백그라운드)
    DeferToPush,
}

/// 이벤트 하나에 대한 최종 판정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDecision {
    /// 판정 대상 이벤트 ID
    pub event_id: String,
    /// 판정 결과
    pub decision: Decision,
    /// 알림 여부와 무관하게 카운터/상태 전파를 수행했는지
    pub update_counters: bool,
}

impl NotificationDecision {
    /// 억제 판정 여부
    pub fn is_suppressed(&self) -> bool {
        matches!(self.decision, Decision::Suppress(_))
    }
}

/// 로컬 알림 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAlert {
    /// 원본 이벤트 ID
    pub event_id: String,
    /// 카테고리
    pub category: NotificationCategory,
    /// 제목
    pub title: String,
    /// 본문
    pub body: String,
    /// 관련 대화 (탭 시 이동용)
    pub conversation: Option<ConversationRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_query_category() {
        let mut prefs = NotificationPreferences::default();
        prefs.set(NotificationCategory::Comments, false);
        assert!(!prefs.is_enabled(NotificationCategory::Comments));
        assert!(prefs.is_enabled(NotificationCategory::Messages));
    }

    #[test]
    fn partial_preferences_fill_missing_with_enabled() {
        let prefs: NotificationPreferences =
            serde_json::from_str(r#"{"post_likes": false}"#).unwrap();
        assert!(!prefs.post_likes);
        assert!(prefs.messages);
        assert!(prefs.system);
    }

    #[test]
    fn decision_serializes_with_reason() {
        let json = serde_json::to_string(&Decision::Suppress(SuppressReason::SelfOrigin)).unwrap();
        assert_eq!(json, r#"{"decision":"suppress","reason":"self_origin"}"#);
    }
}
