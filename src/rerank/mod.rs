//! Rerank 모듈 - Cross-Encoder 재정렬
//!
//! (쿼리, 패시지) 쌍을 함께 보고 관련도를 매기는 모델로 RRF 후보를 다시 정렬합니다.
//! 쌍당 비용이 1단계 검색보다 크므로 전체 코퍼스가 아닌 RRF 후보 집합에만 적용합니다.

mod http;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::RerankerBackend;
use crate::error::RetrievalError;
use crate::knowledge::{FusedResult, RerankedResult};

pub use http::{HttpReranker, DEFAULT_MAX_BATCH_SIZE};

// ============================================================================
// Reranker Trait
// ============================================================================

/// 쌍별 관련도 모델
#[async_trait]
pub trait Reranker: Send + Sync {
    /// 각 패시지의 관련도 점수 (입력 순서와 동일, 높을수록 관련)
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Rerank Operation
// ============================================================================

/// RRF 후보 재정렬
///
/// `rerank_score` 내림차순, 동점은 기존 RRF 순서를 유지합니다.
/// 빈 입력은 모델을 호출하지 않습니다.
///
/// # Errors
/// 모델 실패, 타임아웃, 점수 개수 불일치, NaN 점수 → `RerankUnavailable`
pub async fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<FusedResult>,
    timeout: Duration,
) -> std::result::Result<Vec<RerankedResult>, RetrievalError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let passages: Vec<&str> = candidates.iter().map(|c| c.hit.content.as_str()).collect();

    let scores = tokio::time::timeout(timeout, reranker.score(query, &passages))
        .await
        .map_err(|_| {
            RetrievalError::RerankUnavailable(format!(
                "{} did not respond within {:?}",
                reranker.name(),
                timeout
            ))
        })?
        .map_err(|e| RetrievalError::RerankUnavailable(format!("{:#}", e)))?;

    if scores.len() != candidates.len() {
        return Err(RetrievalError::RerankUnavailable(format!(
            "{} returned {} scores for {} passages",
            reranker.name(),
            scores.len(),
            candidates.len()
        )));
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Err(RetrievalError::RerankUnavailable(format!(
            "{} returned NaN scores",
            reranker.name()
        )));
    }

    let mut reranked: Vec<RerankedResult> = candidates
        .into_iter()
        .zip(scores)
        .map(|(fused, score)| RerankedResult {
            fused,
            rerank_score: f64::from(score),
        })
        .collect();

    // 안정 정렬 → 동점 시 RRF 순서 유지
    reranked.sort_by(|a, b| b.rerank_score.total_cmp(&a.rerank_score));

    Ok(reranked)
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정된 백엔드로 재정렬기 생성
pub fn create_reranker(backend: &RerankerBackend) -> Result<Arc<dyn Reranker>> {
    let api_key = backend
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|key| !key.is_empty());

    let reranker = HttpReranker::new(&backend.url, &backend.model, api_key)?
        .with_max_batch_size(backend.max_batch_size);
    tracing::info!(
        "Using reranker {} at {} (batch size {})",
        backend.model,
        backend.url,
        backend.max_batch_size
    );
    Ok(Arc::new(reranker))
}

// ============================================================================
// Tests
// ============================================================================
