//! text-embeddings-inference (TEI) 임베딩 클라이언트
//!
//! ref: https://huggingface.github.io/text-embeddings-inference/

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::EmbeddingProvider;

#[derive(Debug, Serialize)]
struct TeiEmbedRequest<'a> {
    inputs: Vec<&'a str>,
    normalize: bool,
}

/// TEI `/embed` 엔드포인트 임베딩
#[derive(Debug)]
pub struct TeiEmbedding {
    endpoint: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl TeiEmbedding {
    /// # Arguments
    /// * `base_url` - TEI 서버 주소 (예: http://localhost:8080)
    /// * `model` - 서버에 로드된 모델 이름 (시그니처 비교용)
    /// * `dimension` - 모델 출력 차원
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Invalid dimension: 0");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: format!("{}/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for TeiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&TeiEmbedRequest {
                inputs: vec![text],
                normalize: true,
            })
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("TEI embed error ({}): {}", status, body);
        }

        let mut vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        if vectors.len() != 1 {
            anyhow::bail!("TEI returned {} vectors for 1 input", vectors.len());
        }
        Ok(vectors.remove(0))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash() {
        let embedder = TeiEmbedding::new("http://localhost:8080/", "minilm", 384).unwrap();
        assert_eq!(embedder.endpoint, "http://localhost:8080/embed");
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(TeiEmbedding::new("http://localhost:8080", "minilm", 0).is_err());
    }

    #[tokio::test]
    async fn test_blank_query_skips_network() {
        // 연결할 수 없는 주소여도 빈 쿼리는 요청을 보내지 않음
        let embedder = TeiEmbedding::new("http://127.0.0.1:9", "minilm", 4).unwrap();
        assert_eq!(embedder.embed("").await.unwrap(), vec![0.0; 4]);
    }
}
