//! 프레즌스 구독 레지스트리.
//!
//! 원하는 구독 집합 = 친구 목록 ∪ 현재 열린 1:1 대화 상대.
//! 입력이 바뀔 때마다 이전 집합과의 차이만 연결 관리자로 보낸다.
//! 재연결 시 전체 재전송은 [`SubscriptionSync`] 구현을 통해 연결 관리자가 수행한다.

use chirp_core::models::presence::{
    PeerSubscription, PresenceUpdate, SubscriptionDiff, SubscriptionState,
};
use chirp_core::models::wire::OutboundCommand;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::connection::{ConnectionManager, SubscriptionSync};
use crate::event_bus::{BusEvent, EventBus};

/// 원하는 구독 집합 계산
///
/// 빈 ID는 무시한다. 열린 대화 상대가 이미 친구여도 한 번만 포함된다.
pub fn compute_desired_set<I, S>(friend_ids: I, open_peer: Option<&str>) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    friend_ids
        .into_iter()
        .map(|id| id.as_ref().trim().to_string())
        .chain(open_peer.map(|p| p.trim().to_string()))
        .filter(|id| !id.is_empty())
        .collect()
}

/// 두 집합의 차이 — 결과는 정렬된 순서
pub fn diff(old: &BTreeSet<String>, new: &BTreeSet<String>) -> SubscriptionDiff {
    SubscriptionDiff {
        to_subscribe: new.difference(old).cloned().collect(),
        to_unsubscribe: old.difference(new).cloned().collect(),
    }
}

#[derive(Default)]
struct RegistryState {
    friends: Vec<String>,
    open_peer: Option<String>,
    subscriptions: BTreeMap<String, PeerSubscription>,
    /// 피어별 최신 온라인 상태 (이력 없음)
    presence: HashMap<String, bool>,
}

impl RegistryState {
    fn desired(&self) -> BTreeSet<String> {
        self.subscriptions.keys().cloned().collect()
    }
}

/// 프레즌스 구독 레지스트리
pub struct PresenceRegistry {
    connection: Arc<ConnectionManager>,
    bus: Arc<EventBus>,
    state: Mutex<RegistryState>,
}

impl PresenceRegistry {
    pub fn new(connection: Arc<ConnectionManager>, bus: Arc<EventBus>) -> Self {
        Self {
            connection,
            bus,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// 친구 목록 교체
    pub fn set_friends<I>(&self, friend_ids: I) -> SubscriptionDiff
    where
        I: IntoIterator<Item = String>,
    {
        let mut state = self.state.lock();
        state.friends = friend_ids.into_iter().collect();
        self.reconcile(&mut state)
    }

    /// 열린 1:1 대화 상대 설정 (`None`이면 해제)
    pub fn set_open_conversation_peer(&self, peer_id: Option<String>) -> SubscriptionDiff {
        let mut state = self.state.lock();
        if state.open_peer == peer_id {
            return SubscriptionDiff::default();
        }
        state.open_peer = peer_id;
        self.reconcile(&mut state)
    }

    /// 하나의 잠금 구간 안에서 차이 계산, 상태 갱신, 명령 전송까지 끝낸다
    fn reconcile(&self, state: &mut RegistryState) -> SubscriptionDiff {
        let old = state.desired();
        let new = compute_desired_set(&state.friends, state.open_peer.as_deref());
        let changes = diff(&old, &new);
        if changes.is_empty() {
            return changes;
        }

        debug!(
            "프레즌스 구독 변경: +{} -{}",
            changes.to_subscribe.len(),
            changes.to_unsubscribe.len()
        );

        for peer in &changes.to_unsubscribe {
            state.subscriptions.remove(peer);
            state.presence.remove(peer);
            self.connection.send(OutboundCommand::unsubscribe(peer.clone()));
        }
        for peer in &changes.to_subscribe {
            state
                .subscriptions
                .insert(peer.clone(), PeerSubscription::pending(peer.clone()));
            self.connection.send(OutboundCommand::subscribe(peer.clone()));
        }

        changes
    }

    /// 서버 프레즌스 반영 — 구독 중인 피어만 보관하고 버스로 재발행
    pub fn apply_presence(&self, peer_id: &str, is_online: bool) -> bool {
        {
            let mut state = self.state.lock();
            if !state.subscriptions.contains_key(peer_id) {
                debug!("구독하지 않은 피어의 프레즌스 무시: {peer_id}");
                return false;
            }
            state.presence.insert(peer_id.to_string(), is_online);
        }

        self.bus.publish(BusEvent::PresenceChanged(PresenceUpdate {
            peer_id: peer_id.to_string(),
            is_online,
        }));
        true
    }

    /// 최신 온라인 상태 (모르면 `None`)
    pub fn is_online(&self, peer_id: &str) -> Option<bool> {
        self.state.lock().presence.get(peer_id).copied()
    }

    pub fn desired_set(&self) -> BTreeSet<String> {
        self.state.lock().desired()
    }

    pub fn subscription(&self, peer_id: &str) -> Option<PeerSubscription> {
        self.state.lock().subscriptions.get(peer_id).cloned()
    }

    pub fn open_conversation_peer(&self) -> Option<String> {
        self.state.lock().open_peer.clone()
    }

    /// 세션 종료 시 상태 초기화 (명령은 보내지 않음)
    pub fn clear(&self) {
        *self.state.lock() = RegistryState::default();
    }
}

impl SubscriptionSync for PresenceRegistry {
    fn snapshot(&self) -> Vec<String> {
        self.state.lock().subscriptions.keys().cloned().collect()
    }

    fn mark_delivered(&self, command: &OutboundCommand) {
        if let OutboundCommand::SubscribePresence { peer_id } = command {
            if let Some(sub) = self.state.lock().subscriptions.get_mut(peer_id) {
                sub.acked = SubscriptionState::Subscribed;
            }
        }
    }

    fn mark_link_lost(&self) {
        for sub in self.state.lock().subscriptions.values_mut() {
            sub.acked = SubscriptionState::Unsubscribed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chirp_core::config::RealtimeConfig;
    use chirp_core::error::CoreError;
    use chirp_core::models::session::SessionCredentials;
    use chirp_core::ports::transport::{RealtimeTransport, TransportLink};
    use tokio::sync::mpsc;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    struct NeverTransport;

    #[async_trait]
    impl RealtimeTransport for NeverTransport {
        async fn open(&self, _: &SessionCredentials) -> Result<TransportLink, CoreError> {
            Err(CoreError::Transport("offline".to_string()))
        }
    }

    fn registry() -> (Arc<PresenceRegistry>, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let (tx, _rx) = mpsc::channel(4);
        let connection = Arc::new(ConnectionManager::new(
            Arc::new(NeverTransport),
            RealtimeConfig::default(),
            bus.clone(),
            tx,
        ));
        (
            Arc::new(PresenceRegistry::new(connection, bus.clone())),
            bus,
        )
    }

    #[test]
    fn desired_set_is_union_of_friends_and_open_peer() {
        assert_eq!(
            compute_desired_set(["a", "b"], Some("c")),
            set(&["a", "b", "c"])
        );
        assert_eq!(compute_desired_set(["a", "b"], Some("a")), set(&["a", "b"]));
        assert_eq!(compute_desired_set(Vec::<String>::new(), None), set(&[]));
    }

    #[test]
    fn desired_set_skips_blank_ids() {
        assert_eq!(compute_desired_set(["a", " ", ""], Some("")), set(&["a"]));
    }

    #[test]
    fn diff_reports_both_directions() {
        let d = diff(&set(&["a", "b"]), &set(&["b", "c"]));
        assert_eq!(d.to_subscribe, vec!["c"]);
        assert_eq!(d.to_unsubscribe, vec!["a"]);
        assert!(diff(&set(&["a"]), &set(&["a"])).is_empty());
    }

    #[test]
    fn opening_non_friend_then_closing() {
        let (registry, _bus) = registry();
        registry.set_friends(vec!["a".to_string()]);

        let opened = registry.set_open_conversation_peer(Some("x".to_string()));
        assert_eq!(opened.to_subscribe, vec!["x"]);
        assert_eq!(registry.desired_set(), set(&["a", "x"]));

        let closed = registry.set_open_conversation_peer(None);
        assert_eq!(closed.to_unsubscribe, vec!["x"]);
        assert_eq!(registry.desired_set(), set(&["a"]));
    }

    #[test]
    fn opening_friend_is_a_no_op() {
        let (registry, _bus) = registry();
        registry.set_friends(vec!["a".to_string()]);
        assert!(registry
            .set_open_conversation_peer(Some("a".to_string()))
            .is_empty());
        assert!(registry.set_open_conversation_peer(None).is_empty());
        assert_eq!(registry.desired_set(), set(&["a"]));
    }

    #[test]
    fn new_subscriptions_start_unacked() {
        let (registry, _bus) = registry();
        registry.set_friends(vec!["a".to_string()]);
        let sub = registry.subscription("a").unwrap();
        assert_eq!(sub.desired, SubscriptionState::Subscribed);
        assert!(!sub.is_acked());

        registry.mark_delivered(&OutboundCommand::subscribe("a"));
        assert!(registry.subscription("a").unwrap().is_acked());

        registry.mark_link_lost();
        assert!(!registry.subscription("a").unwrap().is_acked());
    }

    #[test]
    fn presence_only_kept_for_subscribed_peers() {
        let (registry, bus) = registry();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let h = hits.clone();
        let _sub = bus.on_presence_changed(move |peer, online| {
            h.lock().push((peer.to_string(), online));
        });

        registry.set_friends(vec!["a".to_string()]);
        assert!(registry.apply_presence("a", true));
        assert!(!registry.apply_presence("stranger", true));

        assert_eq!(registry.is_online("a"), Some(true));
        assert_eq!(registry.is_online("stranger"), None);
        assert_eq!(*hits.lock(), vec![("a".to_string(), true)]);

        registry.set_friends(Vec::new());
        assert_eq!(registry.is_online("a"), None);
    }

    #[test]
    fn snapshot_matches_desired_set() {
        let (registry, _bus) = registry();
        registry.set_friends(vec!["b".to_string(), "a".to_string()]);
        registry.set_open_conversation_peer(Some("z".to_string()));
        assert_eq!(registry.snapshot(), vec!["a", "b", "z"]);
    }
}
