//! 세션 자격증명 모델.

use serde::{Deserialize, Serialize};

/// 로그인 후 획득한 세션 자격증명
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    /// 현재 사용자 ID (self-echo 판별 기준)
    pub user_id: String,
    /// 액세스 토큰
    pub access_token: String,
}

impl SessionCredentials {
    /// 새 자격증명 생성
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

// 토큰이 로그에 남지 않도록 Debug 직접 구현
impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("user_id", &self.user_id)
            .field("access_token", &"***")
            .finish()
    }
}
