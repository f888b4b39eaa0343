//! HTTP Cross-Encoder 재정렬기 (TEI `/rerank`)
//!
//! ref: https://huggingface.github.io/text-embeddings-inference/#/Text%20Embeddings%20Inference/rerank

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Reranker;

/// 일시적 실패(429, 5xx, 연결 실패) 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 2;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;
/// 요청당 최대 패시지 수 (TEI `--max-client-batch-size` 기본값)
pub const DEFAULT_MAX_BATCH_SIZE: usize = 32;

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [&'a str],
    /// 시그모이드 적용 전 logit 점수
    raw_scores: bool,
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct RerankItem {
    index: usize,
    score: f32,
}

/// TEI 서버에 올라간 Cross-Encoder 모델
#[derive(Debug)]
pub struct HttpReranker {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_batch_size: usize,
    client: reqwest::Client,
}

impl HttpReranker {
    /// # Arguments
    /// * `base_url` - TEI 서버 주소
    /// * `model` - 모델 이름 (로그 및 상태 표시용)
    /// * `api_key` - Bearer 토큰 (선택)
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: format!("{}/rerank", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            client,
        })
    }

    /// 요청당 최대 패시지 수 (서버의 배치 한도에 맞춤)
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    async fn send(&self, request: &RerankRequest<'_>) -> Result<Vec<RerankItem>> {
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                tracing::warn!(
                    "Rerank request failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    MAX_RETRIES
                );
                tokio::time::sleep(backoff).await;
            }

            let mut builder = self.client.post(&self.endpoint).json(request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            let response = match builder.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send rerank request: {}", e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Vec<RerankItem>>()
                    .await
                    .context("Failed to parse rerank response");
            }

            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(anyhow::anyhow!("Rerank API error ({}): {}", status, body));
                continue;
            }
            anyhow::bail!("Rerank API error ({}): {}", status, body);
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Rerank failed after {} retries", MAX_RETRIES)))
    }
}

/// 배치 내 인덱스를 전체 입력 기준으로 이동
fn offset_indices(items: Vec<RerankItem>, offset: usize) -> impl Iterator<Item = RerankItem> {
    items.into_iter().map(move |item| RerankItem {
        index: item.index + offset,
        score: item.score,
    })
}

/// 응답 항목(인덱스, 점수)을 입력 순서의 점수 목록으로 변환
fn scores_in_input_order(items: Vec<RerankItem>, expected: usize) -> Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; expected];
    for item in items {
        let slot = scores
            .get_mut(item.index)
            .ok_or_else(|| anyhow::anyhow!("Rerank response index {} out of range", item.index))?;
        *slot = Some(item.score);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| anyhow::anyhow!("Rerank response is missing passage {}", i)))
        .collect()
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let mut items = Vec::with_capacity(passages.len());
        for (batch, texts) in passages.chunks(self.max_batch_size).enumerate() {
            let request = RerankRequest {
                query,
                texts,
                raw_scores: true,
                truncate: true,
            };
            let response = self.send(&request).await?;
            items.extend(offset_indices(response, batch * self.max_batch_size));
        }

        scores_in_input_order(items, passages.len())
    }

    fn name(&self) -> &str {
        &self.model
    }
}
