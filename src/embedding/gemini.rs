//! Google Gemini 쿼리 임베딩 (gemini-embedding-001, MRL 차원 축소 지원)
//!
//! ref: https://ai.google.dev/gemini-api/docs/embeddings

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{get_api_key, EmbeddingProvider};

const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";
const GEMINI_MODEL: &str = "gemini-embedding-001";

/// 출력 차원 (MRL로 잘라낼 수 있는 크기)
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 무료 티어 분당 요청 한도
const REQUESTS_PER_MINUTE: usize = 60;
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// 429/연결 실패 재시도 (쿼리 경로이므로 짧게)
const MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF_MS: u64 = 500;

// ============================================================================
// Rate Limiter
// ============================================================================

/// 슬라이딩 윈도우 요청 제한기
///
/// 락 안에서는 슬롯 예약과 대기 시간 계산만 하고, 대기는 락을 놓은 뒤에 합니다.
#[derive(Debug)]
struct RateLimiter {
    /// 예약된 요청 시각 (오름차순, 미래 시각 포함)
    slots: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
    /// 연속 요청 간 최소 간격 (기본 0)
    min_interval: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            slots: VecDeque::new(),
            max_requests,
            window,
            min_interval: Duration::ZERO,
        }
    }

    /// 다음 요청 슬롯을 예약하고 `now` 기준 대기 시간을 반환
    fn reserve(&mut self, now: Instant) -> Duration {
        while let Some(&oldest) = self.slots.front() {
            if now.saturating_duration_since(oldest) < self.window {
                break;
            }
            self.slots.pop_front();
        }

        let mut at = now;
        if let Some(&last) = self.slots.back() {
            at = at.max(last + self.min_interval);
        }
        // 윈도우 안에 max_requests개를 넘지 않도록
        if self.max_requests > 0 && self.slots.len() >= self.max_requests {
            let blocking = self.slots[self.slots.len() - self.max_requests];
            at = at.max(blocking + self.window);
        }

        self.slots.push_back(at);
        at.saturating_duration_since(now)
    }
}

/// 슬롯 예약 후 (락 밖에서) 대기
async fn throttle(limiter: &Mutex<RateLimiter>) {
    let wait = limiter.lock().await.reserve(Instant::now());
    if !wait.is_zero() {
        tracing::debug!("Gemini rate limit: waiting {:?}", wait);
        tokio::time::sleep(wait).await;
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

fn api_error(status: StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => anyhow::anyhow!(
            "Gemini API error ({} {}): {}",
            status.as_u16(),
            parsed.error.status,
            parsed.error.message
        ),
        Err(_) => anyhow::anyhow!("Gemini API error ({}): {}", status, body),
    }
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

/// Gemini 쿼리 임베딩 (task type `RETRIEVAL_QUERY`)
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Mutex<RateLimiter>,
}

impl GeminiEmbedding {
    /// 기본 차원(768)으로 생성
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `dimension` - 출력 차원 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be one of {:?}",
                dimension,
                SUPPORTED_DIMENSIONS
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            rate_limiter: Mutex::new(RateLimiter::new(REQUESTS_PER_MINUTE, RATE_WINDOW)),
        })
    }

    /// 환경변수의 API 키로 생성 (GEMINI_API_KEY > GOOGLE_AI_API_KEY)
    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        Self::with_dimension(get_api_key()?, dimension)
    }

    /// 연속 요청 간 최소 간격 설정 (기본은 간격 없음)
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.rate_limiter.get_mut().min_interval = interval;
        self
    }

    fn request_body<'a>(&self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: format!("models/{}", GEMINI_MODEL),
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            task_type: "RETRIEVAL_QUERY",
            output_dimensionality: self.dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 쿼리 → 영벡터 (벡터 검색에서 매칭 없음)
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let body = self.request_body(text);
        let mut attempt = 0;

        loop {
            throttle(&self.rate_limiter).await;

            // API 키는 URL이 아닌 헤더로 전송
            let sent = self
                .client
                .post(GEMINI_EMBED_URL)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await;

            let retry_reason = match sent {
                Ok(response) if response.status().is_success() => {
                    let parsed: EmbedResponse = response
                        .json()
                        .await
                        .context("Failed to parse embedding response")?;
                    return Ok(parsed.embedding.values);
                }
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    "rate limited (429)".to_string()
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(api_error(status, &text));
                }
                Err(e) => format!("request failed: {}", e),
            };

            if attempt >= MAX_RETRIES {
                anyhow::bail!("Gemini embedding {} after {} retries", retry_reason, MAX_RETRIES);
            }
            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS << attempt);
            attempt += 1;
            tracing::warn!(
                "Gemini embedding {}, retrying in {:?} ({}/{})",
                retry_reason,
                backoff,
                attempt,
                MAX_RETRIES
            );
            tokio::time::sleep(backoff).await;
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        GEMINI_MODEL
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::corpus::EmbeddingSignature;

    #[test]
    fn test_invalid_dimension() {
        let err = GeminiEmbedding::with_dimension("fake_key".to_string(), 999).unwrap_err();
        assert!(err.to_string().contains("Invalid dimension"));
    }

    #[test]
    fn test_signature_per_dimension() {
        for dim in SUPPORTED_DIMENSIONS {
            let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), dim).unwrap();
            assert_eq!(embedder.signature(), EmbeddingSignature::new("gemini-embedding-001", dim));
        }
    }

    #[test]
    fn test_request_body_is_query_task() {
        let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), 1536).unwrap();
        let json = serde_json::to_value(embedder.request_body("입고 처리 절차")).unwrap();

        assert_eq!(json["model"], "models/gemini-embedding-001");
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["outputDimensionality"], 1536);
        assert_eq!(json["content"]["parts"][0]["text"], "입고 처리 절차");
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid",
            "status":"INVALID_ARGUMENT"}}"#;
        let err = api_error(StatusCode::BAD_REQUEST, body).to_string();
        assert!(err.contains("INVALID_ARGUMENT"));
        assert!(err.contains("API key not valid"));

        let err = api_error(StatusCode::BAD_GATEWAY, "upstream down").to_string();
        assert!(err.contains("upstream down"));
    }

    #[tokio::test]
    async fn test_blank_text_is_zero_vector() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let vector = embedder.embed("   ").await.unwrap();
        assert_eq!(vector, vec![0.0; DEFAULT_DIMENSION]);
    }

    #[test]
    fn test_limiter_allows_burst_within_quota() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(limiter.reserve(now), Duration::ZERO);
        }
        // 4번째는 첫 슬롯이 윈도우를 벗어날 때까지 대기
        assert_eq!(limiter.reserve(now), Duration::from_secs(60));
    }

    #[test]
    fn test_limiter_releases_expired_slots() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert_eq!(limiter.reserve(start), Duration::ZERO);
        assert_eq!(limiter.reserve(start + Duration::from_secs(10)), Duration::ZERO);
        assert_eq!(limiter.slots.len(), 1);
    }

    #[test]
    fn test_limiter_min_interval_spaces_requests() {
        let mut limiter = RateLimiter::new(60, Duration::from_secs(60));
        limiter.min_interval = Duration::from_millis(100);
        let now = Instant::now();

        assert_eq!(limiter.reserve(now), Duration::ZERO);
        assert_eq!(limiter.reserve(now), Duration::from_millis(100));
        assert_eq!(limiter.reserve(now), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_concurrent_queries_are_not_serialized() {
        let limiter = Arc::new(Mutex::new(RateLimiter::new(REQUESTS_PER_MINUTE, RATE_WINDOW)));
        let started = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { throttle(&limiter).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(limiter.lock().await.slots.len(), 4);
    }

    #[tokio::test]
    async fn test_min_interval_builder() {
        let embedder = GeminiEmbedding::new("fake_key".to_string())
            .unwrap()
            .with_min_interval(Duration::from_millis(250));
        assert_eq!(embedder.rate_limiter.lock().await.min_interval, Duration::from_millis(250));
    }
}
