//! 로그인.
//!
//! 서버 로그인으로 세션 자격증명(사용자 ID + 액세스 토큰)을 획득한다.

use chirp_core::error::CoreError;
use chirp_core::models::session::SessionCredentials;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// 서버 응답 — 로그인
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user_id: String,
}

/// 로그인 클라이언트
#[derive(Clone)]
pub struct AuthClient {
    base_url: String,
    client: reqwest::Client,
}

impl AuthClient {
    /// 새 로그인 클라이언트 생성
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// 식별자/비밀번호 로그인 → 세션 자격증명
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionCredentials, CoreError> {
        let url = format!("{}/api/v1/auth/tokens", self.base_url);
        let body = serde_json::json!({
            "identifier": identifier,
            "password": password,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Auth(format!("로그인 요청 실패: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::Auth(format!("로그인 실패 ({status}): {text}")));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::Auth(format!("토큰 파싱 실패: {e}")))?;

        debug!("로그인 성공: user_id={}", token.user_id);
        Ok(SessionCredentials::new(token.user_id, token.access_token))
    }
}
