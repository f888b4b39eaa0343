//! 하이브리드 검색 - BM25 + 벡터 검색 RRF 통합 + Cross-Encoder 재정렬
//!
//! 검색 파이프라인:
//! 1. 벡터 검색과 BM25 검색을 topK × 2로 동시에 실행
//! 2. RRF로 통합 (topK × 3)
//! 3. (선택) Cross-Encoder 재정렬 - 실패 시 RRF 순서로 대체
//! 4. topK로 자르기
//!
//! 두 검색 방법이 보는 "매칭"이 다르기 때문에 넓게 가져와 통합한 뒤 자릅니다.

use std::sync::Arc;
use std::time::Instant;

use crate::config::RetrievalConfig;
use crate::corpus::{Corpus, EmbeddingSignature};
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrievalError};
use crate::rerank::{rerank, Reranker};

use super::fusion::ReciprocalRankFusion;
use super::lexical::{LexicalIndex, LexicalStats};
use super::types::{RetrievedChunk, SearchResult};
use super::vector::VectorIndex;

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
///
/// 빌드 후에는 읽기 전용이므로 여러 호출자가 락 없이 동시에 `retrieve`할 수 있습니다.
pub struct HybridRetriever {
    corpus: Arc<Corpus>,
    lexical: Arc<LexicalIndex>,
    vector: VectorIndex,
    fusion: ReciprocalRankFusion,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    /// 코퍼스 스냅샷으로 두 인덱스를 빌드
    ///
    /// # Arguments
    /// * `corpus` - 검증된 코퍼스
    /// * `embedder` - 쿼리 임베딩 함수 (스냅샷과 같은 함수여야 함)
    /// * `reranker` - Cross-Encoder (없으면 재정렬 요청 시 RRF 순서 사용)
    /// * `config` - 파이프라인 설정
    pub fn build(
        corpus: Corpus,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;

        let started = Instant::now();
        let corpus = Arc::new(corpus);
        let vector = VectorIndex::build(corpus.clone(), embedder, config.embed_timeout())?;
        let lexical = Arc::new(LexicalIndex::build(corpus.clone(), config.bm25));

        if lexical.len() != vector.len() {
            return Err(RetrievalError::IndexMismatch {
                lexical: lexical.len(),
                vector: vector.len(),
            });
        }

        if corpus.is_empty() {
            tracing::warn!("Corpus is empty, every query will return no results");
        }

        tracing::info!(
            "Hybrid retriever ready: {} chunks, snapshot {} ({:?})",
            corpus.len(),
            &corpus.fingerprint()[..12],
            started.elapsed()
        );

        Ok(Self {
            corpus,
            lexical,
            vector,
            fusion: ReciprocalRankFusion::new(config.rrf_k),
            reranker,
            config,
        })
    }

    /// 하이브리드 검색 (공개 진입점)
    ///
    /// # Arguments
    /// * `query` - 검색 쿼리
    /// * `top_k` - 최대 결과 수 (0이면 빈 결과)
    /// * `rerank_enabled` - Cross-Encoder 재정렬 여부
    ///
    /// # Errors
    /// 임베딩 백엔드 실패만 에러로 전파됩니다. 재정렬 실패는 RRF 순서로 대체됩니다.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        rerank_enabled: bool,
    ) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let candidate_k = top_k.saturating_mul(self.config.candidate_factor);

        // 1. 벡터 + BM25 동시 실행
        let (vector_results, keyword_results) = tokio::join!(
            self.vector.search(query, candidate_k),
            self.keyword_task(query, candidate_k)
        );
        let vector_results = vector_results?;
        let keyword_results = keyword_results?;

        tracing::debug!(
            "First stage: {} vector, {} keyword hits ({:?})",
            vector_results.len(),
            keyword_results.len(),
            started.elapsed()
        );

        // 2. RRF 통합
        let fused = self.fusion.fuse(
            vector_results,
            keyword_results,
            top_k.saturating_mul(self.config.fusion_factor),
        );
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        // 3. 재정렬 (실패 시 RRF 순서)
        let mut results: Vec<RetrievedChunk> = if rerank_enabled {
            match &self.reranker {
                Some(reranker) => {
                    let fallback = fused.clone();
                    let timeout = self.config.rerank_timeout();
                    match rerank(reranker.as_ref(), query, fused, timeout).await {
                        Ok(reranked) => reranked.into_iter().map(RetrievedChunk::from).collect(),
                        Err(e) if e.is_degradable() => {
                            tracing::warn!("Reranker failed, falling back to fused order: {}", e);
                            fallback.into_iter().map(RetrievedChunk::from).collect()
                        }
                        Err(e) => return Err(e),
                    }
                }
                None => {
                    tracing::warn!(
                        "Rerank requested but no reranker is configured, using fused order"
                    );
                    fused.into_iter().map(RetrievedChunk::from).collect()
                }
            }
        } else {
            fused.into_iter().map(RetrievedChunk::from).collect()
        };

        // 4. topK
        results.truncate(top_k);

        tracing::debug!(
            "Retrieved {} chunks for query ({} chars) in {:?}",
            results.len(),
            query.chars().count(),
            started.elapsed()
        );

        Ok(results)
    }

    /// BM25 검색을 blocking 풀에서 실행
    async fn keyword_task(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let lexical = self.lexical.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || lexical.search(&query, k))
            .await
            .map_err(|e| RetrievalError::Task(e.to_string()))
    }

    /// 벡터 검색만 수행
    pub async fn search_vector(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.vector.search(query, k).await
    }

    /// BM25 키워드 검색만 수행
    pub fn search_keyword(&self, query: &str, k: usize) -> Vec<SearchResult> {
        self.lexical.search(query, k)
    }

    /// 검색기 통계
    pub fn stats(&self) -> RetrieverStats {
        RetrieverStats {
            chunk_count: self.corpus.len(),
            fingerprint: self.corpus.fingerprint().to_string(),
            embedding: self.corpus.signature().clone(),
            lexical: self.lexical.stats(),
            reranker: self.reranker.as_ref().map(|r| r.name().to_string()),
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }
}

/// 하이브리드 검색기 통계
#[derive(Debug, Clone)]
pub struct RetrieverStats {
    pub chunk_count: usize,
    pub fingerprint: String,
    pub embedding: EmbeddingSignature,
    pub lexical: LexicalStats,
    pub reranker: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
