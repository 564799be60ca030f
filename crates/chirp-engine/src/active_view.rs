//! 활성 뷰 컨텍스트.
//!
//! 사용자가 지금 보고 있는 대화 하나를 담는 슬롯. 마지막으로 설정한 쪽이 이긴다.
//! 알림 판정은 이 슬롯을 동기적으로 읽어 "이미 보고 있는 대화" 알림을 억제한다.

use chirp_core::models::event::{ConversationRef, ConversationType};
use parking_lot::{ReentrantMutex, RwLock};
use std::sync::Arc;
use tracing::debug;

/// 활성 뷰 변경 관찰자
///
/// 쓰기 잠금을 쥔 채 변경 스레드에서 동기 호출된다. 관찰 순서는 슬롯 변경 순서와 같다.
pub trait ViewObserver: Send + Sync {
    fn view_changed(&self, view: Option<&ConversationRef>);
}

/// 활성 뷰 컨텍스트
#[derive(Default)]
pub struct ActiveViewContext {
    /// 슬롯 변경과 관찰자 통지를 한 단위로 묶는다. 관찰자 안에서의 재진입은 허용.
    writer: ReentrantMutex<()>,
    slot: RwLock<Option<ConversationRef>>,
    observer: RwLock<Option<Arc<dyn ViewObserver>>>,
}

impl ActiveViewContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 관찰자 등록 (기존 관찰자 교체)
    pub fn set_observer(&self, observer: Arc<dyn ViewObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// 활성 뷰 설정
    pub fn set_active_view(&self, conversation_id: &str, conversation_type: ConversationType) {
        self.set(ConversationRef {
            id: conversation_id.to_string(),
            conversation_type,
        });
    }

    /// 활성 뷰 설정 (이미 만든 참조)
    pub fn set(&self, view: ConversationRef) {
        let _writer = self.writer.lock();
        {
            let mut slot = self.slot.write();
            if slot.as_ref() == Some(&view) {
                return;
            }
            debug!("활성 뷰 변경: {view}");
            *slot = Some(view.clone());
        }
        self.notify(Some(&view));
    }

    /// 활성 뷰 해제
    pub fn clear_active_view(&self) {
        let _writer = self.writer.lock();
        let previous = self.slot.write().take();
        if previous.is_some() {
            debug!("활성 뷰 해제");
            self.notify(None);
        }
    }

    /// 슬롯이 여전히 `view`일 때만 해제
    pub fn clear_if(&self, view: &ConversationRef) -> bool {
        let _writer = self.writer.lock();
        let cleared = {
            let mut slot = self.slot.write();
            if slot.as_ref() == Some(view) {
                *slot = None;
                true
            } else {
                false
            }
        };
        if cleared {
            debug!("활성 뷰 해제: {view}");
            self.notify(None);
        }
        cleared
    }

    /// 현재 활성 뷰
    pub fn get_active_view(&self) -> Option<ConversationRef> {
        self.slot.read().clone()
    }

    /// 대화가 현재 활성 뷰인지
    pub fn matches(&self, conversation: &ConversationRef) -> bool {
        self.slot.read().as_ref() == Some(conversation)
    }

    /// 스코프 기반 활성 뷰 — 가드가 drop될 때 자동 해제
    ///
    /// 그 사이 다른 화면이 뷰를 바꿨다면 drop은 아무것도 하지 않는다.
    pub fn focus(self: &Arc<Self>, view: ConversationRef) -> ActiveViewGuard {
        self.set(view.clone());
        ActiveViewGuard {
            context: Arc::clone(self),
            view,
        }
    }

    fn notify(&self, view: Option<&ConversationRef>) {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.view_changed(view);
        }
    }
}

/// 활성 뷰 스코프 가드
#[must_use = "ActiveViewGuard를 버리면 활성 뷰가 즉시 해제됩니다"]
pub struct ActiveViewGuard {
    context: Arc<ActiveViewContext>,
    view: ConversationRef,
}

impl ActiveViewGuard {
    pub fn view(&self) -> &ConversationRef {
        &self.view
    }
}

impl Drop for ActiveViewGuard {
    fn drop(&mut self) {
        self.context.clear_if(&self.view);
    }
}
