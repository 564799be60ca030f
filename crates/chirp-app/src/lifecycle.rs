//! 라이프사이클 관리.
//!
//! 종료 신호 전파와 OS 시그널 처리.

use tokio::sync::watch;
use tracing::info;

/// 라이프사이클 관리자
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleManager {
    /// 새 라이프사이클 관리자 생성
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// 종료 수신기 복제
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// 종료 신호 발송
    pub fn shutdown(&self) {
        info!("종료 신호 발송");
        let _ = self.shutdown_tx.send(true);
    }

    /// OS 시그널(SIGINT, SIGTERM) 또는 내부 종료 신호 대기
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        let mut internal = self.subscribe();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            tokio::select! {
                _ = sigint.recv() => info!("SIGINT 수신"),
                _ = sigterm.recv() => info!("SIGTERM 수신"),
                _ = internal.wait_for(|stop| *stop) => info!("내부 종료 요청"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Ctrl+C 수신");
                }
                _ = internal.wait_for(|stop| *stop) => info!("내부 종료 요청"),
            }
        }

        self.shutdown();
        Ok(())
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
