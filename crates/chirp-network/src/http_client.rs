//! HTTP REST API 클라이언트.
//!
//! `SocialApi` 포트 구현. Bearer 인증 헤더 자동 주입 + 친구 목록 조회 재시도.
//! 폴백 폴링 조회는 재시도하지 않는다 — 다음 고정 틱이 곧 재시도다.

use async_trait::async_trait;
use chirp_core::error::CoreError;
use chirp_core::models::checkpoint::{EventPage, PollCheckpoint};
use chirp_core::models::session::SessionCredentials;
use chirp_core::ports::api_client::SocialApi;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// 기본 재시도 횟수
const DEFAULT_MAX_RETRIES: u32 = 3;

/// 재시도 가능한 에러인지 판별
fn is_retryable(error: &CoreError) -> bool {
    matches!(
        error,
        CoreError::Network(_) | CoreError::ServiceUnavailable(_) | CoreError::RateLimit { .. }
    )
}

/// 친구 목록 응답
#[derive(Debug, Deserialize)]
struct FriendListResponse {
    #[serde(default)]
    friends: Vec<FriendEntry>,
}

#[derive(Debug, Deserialize)]
struct FriendEntry {
    id: String,
}

/// REST API 클라이언트 — `SocialApi` 포트 구현
pub struct HttpSocialApi {
    client: reqwest::Client,
    base_url: String,
    credentials: SessionCredentials,
    max_retries: u32,
}

impl HttpSocialApi {
    /// 새 HTTP API 클라이언트 생성
    pub fn new(
        base_url: &str,
        credentials: SessionCredentials,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(
        &self,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();

        if status.is_success() {
            return Ok(resp);
        }

        let status_code = status.as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let text = resp.text().await.unwrap_or_else(|e| {
            warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });

        match status_code {
            401 | 403 => Err(CoreError::Auth(format!("인증 실패: {text}"))),
            404 => Err(CoreError::NotFound {
                resource_type: "API".to_string(),
                id: text,
            }),
            429 => Err(CoreError::RateLimit {
                retry_after_secs: retry_after.unwrap_or(60),
            }),
            503 => Err(CoreError::ServiceUnavailable(text)),
            _ => Err(CoreError::Internal(format!("API 에러 ({status}): {text}"))),
        }
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: 1s → 2s → 4s
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable(&e) || attempt >= self.max_retries {
                        return Err(e);
                    }

                    warn!(
                        "요청 실패 (시도 {}/{}): {e}, {delay:?} 후 재시도",
                        attempt + 1,
                        self.max_retries + 1
                    );

                    // RateLimit의 경우 서버 지정 대기 시간 사용
                    if let CoreError::RateLimit { retry_after_secs } = &e {
                        delay = Duration::from_secs(*retry_after_secs);
                    }

                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                    attempt += 1;
                }
            }
        }
    }

    fn events_url(&self, checkpoint: &PollCheckpoint, limit: u32) -> Result<Url, CoreError> {
        let mut url = Url::parse(&format!("{}/api/v1/events", self.base_url))
            .map_err(|e| CoreError::Config(format!("잘못된 서버 URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            // 커서가 없으면 실시간 채널이 끊긴 시각부터
            match &checkpoint.cursor {
                Some(cursor) => query.append_pair("since", cursor),
                None => query.append_pair("after", &checkpoint.resume_after.to_rfc3339()),
            };
            query.append_pair("limit", &limit.to_string());
        }
        Ok(url)
    }
}

#[async_trait]
impl SocialApi for HttpSocialApi {
    async fn fetch_friend_ids(&self) -> Result<Vec<String>, CoreError> {
        self.execute_with_retry(|| async {
            let url = format!("{}/api/v1/friends", self.base_url);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.credentials.access_token)
                .send()
                .await
                .map_err(|e| CoreError::Network(format!("친구 목록 요청 실패: {e}")))?;

            let resp = self.check_response(resp).await?;
            let list: FriendListResponse = resp
                .json()
                .await
                .map_err(|e| CoreError::Internal(format!("친구 목록 파싱 실패: {e}")))?;

            debug!("친구 목록 수신: {}명", list.friends.len());
            Ok(list.friends.into_iter().map(|f| f.id).collect())
        })
        .await
    }

    async fn fetch_events_since(
        &self,
        checkpoint: &PollCheckpoint,
        limit: u32,
    ) -> Result<EventPage, CoreError> {
        let url = self.events_url(checkpoint, limit)?;
        debug!("누락 이벤트 조회: cursor={:?}", checkpoint.cursor);

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.credentials.access_token)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("이벤트 조회 요청 실패: {e}")))?;

        let resp = self.check_response(resp).await?;
        let page: EventPage = resp
            .json()
            .await
            .map_err(|e| CoreError::Internal(format!("이벤트 응답 파싱 실패: {e}")))?;

        debug!(
            "누락 이벤트 {}건 수신, next_cursor={:?}",
            page.events.len(),
            page.next_cursor
        );
        Ok(page)
    }
}
