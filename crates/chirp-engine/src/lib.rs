//! # chirp-engine
//!
//! 소셜 메신저 클라이언트의 실시간 프레즌스/알림 조정 엔진.
//!
//! 서버와의 실시간 채널을 유지하고, 온라인 상태를 받아야 할 피어 집합을 관리하며,
//! 인바운드 이벤트마다 로컬 알림/억제/푸시 위임을 판정한다. 실시간 채널이
//! 불가능하면 REST 폴링으로 누락 이벤트를 따라잡는다.
//!
//! ## 구조
//!
//! - [`event_bus`] — 프로세스 내부 pub/sub (동기 구독자 + broadcast)
//! - [`active_view`] — 현재 포그라운드 대화 슬롯
//! - [`connection`] — 실시간 채널 하나의 수명, 재연결/백오프, 명령 큐
//! - [`presence`] — 프레즌스 구독 레지스트리
//! - [`arbitration`] — 알림 판정 파이프라인 (중복 제거 + 카운터 전파)
//! - [`poller`] — degraded 모드 폴백 폴러
//! - [`session`] — 로그인~로그아웃 동안 위 구성요소를 소유하는 세션

pub mod active_view;
pub mod arbitration;
pub mod connection;
pub mod dedup;
pub mod event_bus;
pub mod poller;
pub mod presence;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod unread;

pub use session::{Session, SessionDeps};
