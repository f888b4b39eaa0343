//! Vector Index - 코사인 유사도 최근접 이웃 검색
//!
//! 코퍼스 임베딩 전체를 순회하는 정확(brute-force) 검색입니다.
//! 수만 청크 규모까지를 대상으로 하며, 그 이상은 ANN 인덱스가 필요합니다.

use std::sync::Arc;
use std::time::Duration;

use crate::corpus::Corpus;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrievalError};

use super::types::{SearchResult, SearchType};

// ============================================================================
// VectorIndex
// ============================================================================

/// 벡터 인덱스 (빌드 후 읽기 전용)
pub struct VectorIndex {
    corpus: Arc<Corpus>,
    embedder: Arc<dyn EmbeddingProvider>,
    /// 코퍼스 순서의 임베딩 L2 노름 (빌드 시 계산)
    norms: Vec<f32>,
    embed_timeout: Duration,
}

impl VectorIndex {
    /// 벡터 인덱스 빌드
    ///
    /// 쿼리 임베딩 함수가 스냅샷을 만든 함수와 다르면 실패합니다.
    pub fn build(
        corpus: Arc<Corpus>,
        embedder: Arc<dyn EmbeddingProvider>,
        embed_timeout: Duration,
    ) -> Result<Self> {
        let expected = corpus.signature();
        let actual = embedder.signature();
        if *expected != actual {
            return Err(RetrievalError::EmbeddingMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        let norms: Vec<f32> = corpus.embeddings().iter().map(|e| l2_norm(e)).collect();
        let degenerate = norms.iter().filter(|n| **n == 0.0).count();
        if degenerate > 0 {
            tracing::warn!("{} chunks have zero-norm embeddings and will never match", degenerate);
        }

        tracing::info!(
            "Vector index built: {} embeddings ({})",
            corpus.len(),
            actual
        );

        Ok(Self {
            corpus,
            embedder,
            norms,
            embed_timeout,
        })
    }

    /// 쿼리 임베딩 (타임아웃 및 출력 검증 포함)
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedding = tokio::time::timeout(self.embed_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| {
                RetrievalError::EmbeddingUnavailable(format!(
                    "{} did not respond within {:?}",
                    self.embedder.name(),
                    self.embed_timeout
                ))
            })?
            .map_err(|e| RetrievalError::EmbeddingUnavailable(format!("{:#}", e)))?;

        let dimension = self.corpus.signature().dimension;
        if embedding.len() != dimension {
            return Err(RetrievalError::EmbeddingUnavailable(format!(
                "query embedding has dimension {}, expected {}",
                embedding.len(),
                dimension
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(RetrievalError::EmbeddingUnavailable(
                "query embedding contains non-finite values".to_string(),
            ));
        }

        Ok(embedding)
    }

    /// 벡터 검색
    ///
    /// `initial_score`는 코사인 유사도입니다. 임베딩 실패는 빈 결과가 아니라 에러로 전파됩니다.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || self.corpus.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embed_query(query).await?;
        let query_norm = l2_norm(&query_embedding);
        if query_norm == 0.0 {
            tracing::debug!("Degenerate (zero-norm) query embedding, no vector matches");
            return Ok(Vec::new());
        }

        let mut ranked: Vec<(usize, f32)> = self
            .corpus
            .embeddings()
            .iter()
            .zip(&self.norms)
            .enumerate()
            .filter_map(|(idx, (embedding, norm))| {
                cosine_with_norms(&query_embedding, query_norm, embedding, *norm).map(|s| (idx, s))
            })
            .collect();

        // 안정 정렬 → 동점 시 삽입 순서 유지
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .filter_map(|(idx, similarity)| {
                self.corpus.chunk(idx).map(|chunk| {
                    SearchResult::from_chunk(chunk, f64::from(similarity), SearchType::Vector)
                })
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.corpus.signature().dimension
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// 노름을 미리 계산한 코사인 유사도 (어느 한쪽이 영벡터면 None)
fn cosine_with_norms(query: &[f32], query_norm: f32, embedding: &[f32], norm: f32) -> Option<f32> {
    if query_norm == 0.0 || norm == 0.0 {
        return None;
    }
    Some(dot(query, embedding) / (query_norm * norm))
}

// ============================================================================
// Tests
// ============================================================================
