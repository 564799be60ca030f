//! 실시간 양방향 채널 포트.
//!
//! 구현: `chirp-network` crate (tokio-tungstenite)

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::models::session::SessionCredentials;
use crate::models::wire::OutboundCommand;

/// 채널에서 수신한 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// 텍스트 메시지 (JSON)
    Text(String),
    /// 연결 종료 (사유가 있으면 포함)
    Closed(Option<String>),
}

/// 수립된 연결 하나
///
/// `outbound`가 닫히거나 `inbound`가 끝나면 링크가 끊긴 것으로 본다.
#[derive(Debug)]
pub struct TransportLink {
    /// 서버로 보낼 명령
    pub outbound: mpsc::Sender<OutboundCommand>,
    /// 서버에서 받은 프레임
    pub inbound: mpsc::Receiver<TransportFrame>,
}

/// 실시간 전송 계층
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// 연결 수립 (핸드셰이크 포함)
    ///
    /// 타임아웃은 호출자(Connection Manager)가 건다.
    async fn open(&self, credentials: &SessionCredentials) -> Result<TransportLink, CoreError>;
}
