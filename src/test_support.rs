//! 테스트용 결정적 임베딩/재정렬 스텁

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::corpus::{Corpus, CorpusSnapshot, EmbeddingSignature, Metadata, SnapshotChunk};
use crate::embedding::EmbeddingProvider;
use crate::rerank::Reranker;

pub const TEST_MODEL: &str = "test-model";

/// (id, content, embedding) 목록으로 코퍼스 생성
pub fn corpus_of(dimension: usize, chunks: Vec<(String, String, Vec<f32>)>) -> Corpus {
    Corpus::from_snapshot(CorpusSnapshot {
        embedding: EmbeddingSignature::new(TEST_MODEL, dimension),
        chunks: chunks
            .into_iter()
            .map(|(id, content, embedding)| SnapshotChunk {
                id,
                content,
                metadata: Metadata::new(),
                embedding,
            })
            .collect(),
    })
    .expect("valid test corpus")
}

// ============================================================================
// Embedders
// ============================================================================

/// 쿼리 문자열 → 고정 벡터 (테이블에 없으면 영벡터)
pub struct TableEmbedder {
    name: String,
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl TableEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self::named(TEST_MODEL, dimension)
    }

    pub fn named(name: &str, dimension: usize) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            table: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, query: &str, vector: Vec<f32>) -> Self {
        self.table.insert(query.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimension]))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 항상 실패하는 임베딩 백엔드
pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("connection refused")
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        TEST_MODEL
    }
}

/// 응답이 늦는 임베딩 백엔드
pub struct SlowEmbedder {
    dimension: usize,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(dimension: usize, delay: Duration) -> Self {
        Self { dimension, delay }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![1.0; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        TEST_MODEL
    }
}

// ============================================================================
// Rerankers
// ============================================================================

/// 패시지 본문 → 고정 점수 (테이블에 없으면 0)
#[derive(Default)]
pub struct ScriptedReranker {
    scores: HashMap<String, f32>,
    truncate_to: Option<usize>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    /// 호출마다 받은 패시지 수
    batch_sizes: Mutex<Vec<usize>>,
}

impl ScriptedReranker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, passage: &str, score: f32) -> Self {
        self.scores.insert(passage.to_string(), score);
        self
    }

    /// 점수 개수를 n개로 잘라서 반환 (잘못된 응답 시뮬레이션)
    pub fn truncating(mut self, n: usize) -> Self {
        self.truncate_to = Some(n);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reranker for ScriptedReranker {
    async fn score(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(passages.len());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut scores: Vec<f32> = passages
            .iter()
            .map(|p| self.scores.get(*p).copied().unwrap_or(0.0))
            .collect();
        if let Some(n) = self.truncate_to {
            scores.truncate(n);
        }
        Ok(scores)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// 항상 실패하는 재정렬 백엔드
pub struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    async fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
        anyhow::bail!("model not loaded")
    }

    fn name(&self) -> &str {
        "failing"
    }
}
