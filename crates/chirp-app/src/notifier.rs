//! 콘솔 알림.
//!
//! 데스크톱 알림 대신 tracing 로그로 로컬 알림을 출력한다.

use async_trait::async_trait;
use chirp_core::error::CoreError;
use chirp_core::models::notification::LocalAlert;
use chirp_core::ports::notifier::LocalNotifier;
use tracing::info;

/// tracing 기반 `LocalNotifier`
pub struct ConsoleNotifier;

#[async_trait]
impl LocalNotifier for ConsoleNotifier {
    async fn show_alert(&self, alert: &LocalAlert) -> Result<(), CoreError> {
        match &alert.conversation {
            Some(conversation) => info!(
                target: "chirp::alert",
                event_id = %alert.event_id,
                "[{}] {} — {}",
                conversation,
                alert.title,
                alert.body
            ),
            None => info!(
                target: "chirp::alert",
                event_id = %alert.event_id,
                "{} — {}",
                alert.title,
                alert.body
            ),
        }
        Ok(())
    }
}
