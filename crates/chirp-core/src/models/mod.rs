//! Chirp 도메인 모델.
//!
//! 서버-클라이언트 간 공유하는 이벤트/명령 와이어 포맷과
//! 엔진 내부 상태 구조체를 정의한다.

pub mod checkpoint;
pub mod connection;
pub mod event;
pub mod notification;
pub mod presence;
pub mod session;
pub mod wire;
