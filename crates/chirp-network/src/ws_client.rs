//! WebSocket 실시간 채널.
//!
//! `RealtimeTransport` 포트 구현. `tokio-tungstenite` 기반 양방향 채널.
//! 수신 프레임은 [`TransportFrame`]으로, 송신 명령은 JSON 텍스트로 변환한다.

use async_trait::async_trait;
use chirp_core::error::CoreError;
use chirp_core::models::session::SessionCredentials;
use chirp_core::models::wire::OutboundCommand;
use chirp_core::ports::transport::{RealtimeTransport, TransportFrame, TransportLink};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 링크당 채널 버퍼 크기
const LINK_BUFFER: usize = 64;

/// WebSocket 전송 — `RealtimeTransport` 포트 구현
pub struct WsTransport {
    base_url: String,
    path: String,
}

impl WsTransport {
    /// 새 WebSocket 전송 생성
    pub fn new(base_url: &str, path: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            path: path.to_string(),
        }
    }

    /// HTTP 기본 URL에서 WebSocket URL 유도
    fn ws_url(&self) -> Result<Url, CoreError> {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };

        Url::parse(&format!("{ws_base}{}", self.path))
            .map_err(|e| CoreError::Config(format!("잘못된 WebSocket URL: {e}")))
    }

    /// 핸드셰이크 요청. 토큰은 URL이 아닌 Authorization 헤더로만 보낸다.
    fn handshake_request(&self, token: &str) -> Result<Request, CoreError> {
        let mut request = self
            .ws_url()?
            .as_str()
            .into_client_request()
            .map_err(|e| CoreError::Config(format!("WebSocket 요청 생성 실패: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| CoreError::Auth("토큰에 헤더로 쓸 수 없는 문자가 있습니다".to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        Ok(request)
    }

    /// 수신 루프 — 서버 프레임을 링크 채널로 전달
    async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<TransportFrame>) {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if tx.send(TransportFrame::Text(text.to_string())).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Binary(data)) => {
                    // 서버는 텍스트 JSON만 보낸다 — UTF-8이면 텍스트로 취급
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            if tx.send(TransportFrame::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => debug!("UTF-8이 아닌 바이너리 프레임 무시"),
                    }
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    let _ = tx.send(TransportFrame::Closed(reason)).await;
                    break;
                }
                Ok(_) => {} // Ping/Pong은 자동 처리
                Err(e) => {
                    warn!("WebSocket 수신 에러: {e}");
                    let _ = tx.send(TransportFrame::Closed(Some(e.to_string()))).await;
                    break;
                }
            }
        }
        debug!("WebSocket 수신 루프 종료");
    }

    /// 송신 루프 — 명령을 JSON 텍스트로 직렬화해 전송
    async fn write_loop(
        mut write: SplitSink<WsStream, Message>,
        mut rx: mpsc::Receiver<OutboundCommand>,
    ) {
        while let Some(command) = rx.recv().await {
            let json = match serde_json::to_string(&command) {
                Ok(json) => json,
                Err(e) => {
                    warn!("명령 직렬화 실패: {e}");
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(json.into())).await {
                warn!("WebSocket 전송 실패: {e}");
                break;
            }
        }
        // 송신 채널이 닫히면 연결도 정리
        let _ = write.send(Message::Close(None)).await;
        debug!("WebSocket 송신 루프 종료");
    }
}

#[async_trait]
impl RealtimeTransport for WsTransport {
    async fn open(&self, credentials: &SessionCredentials) -> Result<TransportLink, CoreError> {
        let request = self.handshake_request(&credentials.access_token)?;
        info!("WebSocket 연결: {}", request.uri());

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| CoreError::Transport(format!("WebSocket 연결 실패: {e}")))?;

        let (write, read) = ws_stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(LINK_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(LINK_BUFFER);

        tokio::spawn(Self::read_loop(read, inbound_tx));
        tokio::spawn(Self::write_loop(write, outbound_rx));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
