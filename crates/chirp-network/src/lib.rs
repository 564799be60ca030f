//! # chirp-network
//!
//! HTTP/WebSocket 네트워크 어댑터.
//! 로그인, 친구 목록/누락 이벤트 REST 조회, 실시간 WebSocket 채널을 담당한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use chirp_network::auth::AuthClient;
//! use chirp_network::http_client::HttpSocialApi;
//! use chirp_network::ws_client::WsTransport;
//! ```

pub mod auth;
pub mod http_client;
pub mod ws_client;
