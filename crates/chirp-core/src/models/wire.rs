//! 서버 와이어 포맷.
//!
//! 실시간 채널의 JSON 텍스트 프레임과 폴링 응답의 이벤트 항목은
//! 모두 `type` 필드로 태깅된 [`ServerMessage`]다. 엔진은 최소 필수 필드
//! (id, origin, 대화 참조, 종류)만 검증하고 나머지 본문 매핑은 관여하지 않는다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::event::{
    ConversationRef, ConversationType, DeliveryPath, EventPayload, InboundEvent, SocialEventKind,
};
use crate::error::CoreError;

/// 엔진이 해석하는 인바운드 메시지 타입
const KNOWN_TYPES: [&str; 4] = [
    "presence_changed",
    "message_new",
    "group_message_new",
    "social_event",
];

/// 서버 → 클라이언트 이벤트 (검증 전)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    PresenceChanged {
        #[serde(default)]
        peer_id: Option<String>,
        #[serde(default)]
        is_online: Option<bool>,
    },
    MessageNew {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        origin_id: Option<String>,
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
    GroupMessageNew {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        origin_id: Option<String>,
        #[serde(default)]
        group_id: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
    SocialEvent {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        origin_id: Option<String>,
        #[serde(default)]
        kind: Option<SocialEventKind>,
        #[serde(default)]
        reference_id: Option<String>,
    },
}

impl ServerMessage {
    /// JSON 텍스트 프레임 파싱.
    ///
    /// 엔진이 모르는 `type`은 `Ok(None)`으로 무시한다.
    pub fn parse(text: &str) -> Result<Option<Self>, CoreError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// 이미 파싱된 JSON 값에서 변환
    pub fn from_value(value: Value) -> Result<Option<Self>, CoreError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CoreError::MalformedEvent { field: "type" })?;

        if !KNOWN_TYPES.contains(&kind) {
            debug!("알 수 없는 서버 이벤트 타입 무시: {kind}");
            return Ok(None);
        }

        Ok(Some(serde_json::from_value(value)?))
    }

    /// 필수 필드를 검증하고 [`InboundEvent`]로 정규화
    pub fn into_event(
        self,
        delivery: DeliveryPath,
        received_at: DateTime<Utc>,
    ) -> Result<InboundEvent, CoreError> {
        let (id, origin_id, payload) = match self {
            ServerMessage::PresenceChanged { peer_id, is_online } => {
                let peer_id = required(peer_id, "peer_id")?;
                let is_online = is_online.ok_or(CoreError::MalformedEvent { field: "is_online" })?;
                // 프레즌스는 안정 ID가 없다 — 최신 상태만 의미가 있으므로 합성 ID 사용
                (
                    format!("presence:{peer_id}"),
                    Some(peer_id.clone()),
                    EventPayload::PresenceChanged { peer_id, is_online },
                )
            }
            ServerMessage::MessageNew {
                id,
                origin_id,
                conversation_id,
                body,
            } => (
                required(id, "id")?,
                origin_id,
                EventPayload::DirectMessage {
                    conversation: ConversationRef::personal(required(
                        conversation_id,
                        "conversation_id",
                    )?),
                    body,
                },
            ),
            ServerMessage::GroupMessageNew {
                id,
                origin_id,
                group_id,
                body,
            } => (
                required(id, "id")?,
                origin_id,
                EventPayload::GroupMessage {
                    conversation: ConversationRef::group(required(group_id, "group_id")?),
                    body,
                },
            ),
            ServerMessage::SocialEvent {
                id,
                origin_id,
                kind,
                reference_id,
            } => (
                required(id, "id")?,
                origin_id,
                EventPayload::Social {
                    kind: kind.ok_or(CoreError::MalformedEvent { field: "kind" })?,
                    reference_id,
                },
            ),
        };

        Ok(InboundEvent {
            id,
            // 빈 문자열 origin은 모호하므로 누락과 동일하게 취급
            origin_id: origin_id.filter(|o| !o.trim().is_empty()),
            payload,
            delivery,
            received_at,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, CoreError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CoreError::MalformedEvent { field }),
    }
}

/// 클라이언트 → 서버 명령
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    SubscribePresence {
        peer_id: String,
    },
    UnsubscribePresence {
        peer_id: String,
    },
    MarkRead {
        conversation_id: String,
        conversation_type: ConversationType,
    },
}

impl OutboundCommand {
    /// 구독 명령
    pub fn subscribe(peer_id: impl Into<String>) -> Self {
        OutboundCommand::SubscribePresence {
            peer_id: peer_id.into(),
        }
    }

    /// 구독 해제 명령
    pub fn unsubscribe(peer_id: impl Into<String>) -> Self {
        OutboundCommand::UnsubscribePresence {
            peer_id: peer_id.into(),
        }
    }

    /// 읽음 처리 명령
    pub fn mark_read(conversation: &ConversationRef) -> Self {
        OutboundCommand::MarkRead {
            conversation_id: conversation.id.clone(),
            conversation_type: conversation.conversation_type,
        }
    }

    /// 프레즌스 명령이면 (피어 ID, 구독 여부)
    pub fn presence_target(&self) -> Option<(&str, bool)> {
        match self {
            OutboundCommand::SubscribePresence { peer_id } => Some((peer_id, true)),
            OutboundCommand::UnsubscribePresence { peer_id } => Some((peer_id, false)),
            OutboundCommand::MarkRead { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn live(text: &str) -> Result<InboundEvent, CoreError> {
        let msg = ServerMessage::parse(text)?.expect("known type");
        msg.into_event(DeliveryPath::Live, Utc::now())
    }

    #[test]
    fn parse_direct_message() {
        let event = live(
            r#"{"type":"message_new","id":"m1","origin_id":"u2","conversation_id":"u2","body":"hi"}"#,
        )
        .unwrap();
        assert_eq!(event.id, "m1");
        assert_eq!(event.origin_id.as_deref(), Some("u2"));
        assert_eq!(event.conversation(), Some(&ConversationRef::personal("u2")));
    }

    #[test]
    fn parse_group_message() {
        let event =
            live(r#"{"type":"group_message_new","id":"g1","origin_id":"u3","group_id":"grp"}"#)
                .unwrap();
        assert_eq!(event.conversation(), Some(&ConversationRef::group("grp")));
    }

    #[test]
    fn parse_presence_uses_synthetic_id() {
        let event = live(r#"{"type":"presence_changed","peer_id":"u9","is_online":true}"#).unwrap();
        assert_eq!(event.id, "presence:u9");
        assert_matches!(
            event.payload,
            EventPayload::PresenceChanged { ref peer_id, is_online: true } if peer_id == "u9"
        );
    }

    #[test]
    fn missing_id_is_malformed() {
        let err = live(r#"{"type":"message_new","origin_id":"u2","conversation_id":"u2"}"#)
            .unwrap_err();
        assert_matches!(err, CoreError::MalformedEvent { field: "id" });
    }

    #[test]
    fn missing_conversation_is_malformed() {
        let err = live(r#"{"type":"group_message_new","id":"g1","origin_id":"u2"}"#).unwrap_err();
        assert_matches!(err, CoreError::MalformedEvent { field: "group_id" });
    }

    #[test]
    fn blank_origin_fails_open() {
        let event = live(r#"{"type":"message_new","id":"m1","origin_id":"  ","conversation_id":"u2"}"#)
            .unwrap();
        assert!(event.origin_id.is_none());
    }

    #[test]
    fn unknown_type_is_ignored() {
        let parsed = ServerMessage::parse(r#"{"type":"typing","peer_id":"u2"}"#).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn missing_type_is_malformed() {
        let err = ServerMessage::parse(r#"{"id":"m1"}"#).unwrap_err();
        assert_matches!(err, CoreError::MalformedEvent { field: "type" });
    }

    #[test]
    fn outbound_wire_shape() {
        let json = serde_json::to_string(&OutboundCommand::subscribe("u5")).unwrap();
        assert_eq!(json, r#"{"type":"subscribe_presence","peer_id":"u5"}"#);

        let json = serde_json::to_string(&OutboundCommand::mark_read(&ConversationRef::group(
            "g1",
        )))
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"mark_read","conversation_id":"g1","conversation_type":"group"}"#
        );
    }
}
