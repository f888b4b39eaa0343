//! Corpus - 검색 엔진이 소비하는 불변 스냅샷
//!
//! 인덱싱 단계(청킹, 임베딩 계산, 저장)에서 만들어진
//! (청크 텍스트, 메타데이터, 임베딩 벡터) 묶음을 JSON 스냅샷으로 읽어옵니다.
//!
//! ## 스냅샷 형식
//! ```json
//! {
//!   "embedding": { "model": "paraphrase-multilingual-MiniLM-L12-v2", "dimension": 384 },
//!   "chunks": [
//!     { "id": "...", "content": "...", "metadata": { "source": "a.md" }, "embedding": [0.1, ...] }
//!   ]
//! }
//! ```
//!
//! 전체 코퍼스를 메모리에 올리므로 수십만 청크 규모까지를 전제로 합니다.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, RetrievalError};

// ============================================================================
// Metadata
// ============================================================================

/// 잘 알려진 메타데이터 키
pub const META_SOURCE: &str = "source";
pub const META_SECTION: &str = "section";
pub const META_CATEGORY: &str = "category";
pub const META_CREATED_AT: &str = "created_at";

/// 메타데이터 스칼라 값 (중첩 구조 없음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(v) => write!(f, "{}", v),
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

/// 청크 메타데이터 (키 순서 고정)
pub type Metadata = BTreeMap<String, MetadataValue>;

// ============================================================================
// Chunk
// ============================================================================

/// 검색 단위 청크 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// 전역 고유 ID (같은 코퍼스를 다시 빌드해도 유지)
    pub id: String,
    /// 본문
    pub content: String,
    /// 평면 메타데이터
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// 메타데이터 추가 (빌더)
    pub fn with_meta(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetadataValue::as_str)
    }

    /// 원본 파일명
    pub fn source(&self) -> Option<&str> {
        self.meta_str(META_SOURCE)
    }

    /// 헤더 경로
    pub fn section(&self) -> Option<&str> {
        self.meta_str(META_SECTION)
    }

    pub fn category(&self) -> Option<&str> {
        self.meta_str(META_CATEGORY)
    }

    pub fn created_at(&self) -> Option<&str> {
        self.meta_str(META_CREATED_AT)
    }
}

// ============================================================================
// Embedding Signature
// ============================================================================

/// 임베딩 함수 식별자
///
/// 인덱스 빌드 시점과 쿼리 시점의 임베딩 함수가 같은지 확인하는 데 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSignature {
    /// 모델 이름 (버전 포함)
    pub model: String,
    /// 벡터 차원
    pub dimension: usize,
}

impl EmbeddingSignature {
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
        }
    }
}

impl fmt::Display for EmbeddingSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.model, self.dimension)
    }
}

// ============================================================================
// Snapshot (serde)
// ============================================================================

/// 스냅샷 파일의 청크 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotChunk {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// 인덱싱 단계가 넘겨주는 코퍼스 스냅샷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub embedding: EmbeddingSignature,
    #[serde(default)]
    pub chunks: Vec<SnapshotChunk>,
}

impl CorpusSnapshot {
    /// JSON 파일에서 스냅샷 읽기
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&raw)?;
        Ok(snapshot)
    }
}

// ============================================================================
// Corpus
// ============================================================================

/// 검증된 불변 코퍼스
///
/// `chunks[i]`의 임베딩은 `embeddings[i]`입니다.
#[derive(Debug, Clone)]
pub struct Corpus {
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    signature: EmbeddingSignature,
    fingerprint: String,
}

impl Corpus {
    /// 스냅샷 검증 후 코퍼스 생성
    ///
    /// - 청크 ID 중복 금지
    /// - 모든 임베딩 차원 == 시그니처 차원
    /// - 모든 임베딩 값은 유한수
    pub fn from_snapshot(snapshot: CorpusSnapshot) -> Result<Self> {
        let signature = snapshot.embedding;
        if signature.dimension == 0 {
            return Err(RetrievalError::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(snapshot.chunks.len());
        let mut chunks = Vec::with_capacity(snapshot.chunks.len());
        let mut embeddings = Vec::with_capacity(snapshot.chunks.len());

        for record in snapshot.chunks {
            if !seen.insert(record.id.clone()) {
                return Err(RetrievalError::DuplicateChunk(record.id));
            }
            if record.embedding.len() != signature.dimension {
                return Err(RetrievalError::DimensionMismatch {
                    id: record.id,
                    expected: signature.dimension,
                    actual: record.embedding.len(),
                });
            }
            if record.embedding.iter().any(|v| !v.is_finite()) {
                return Err(RetrievalError::InvalidEmbedding(record.id));
            }

            embeddings.push(record.embedding);
            chunks.push(Chunk {
                id: record.id,
                content: record.content,
                metadata: record.metadata,
            });
        }

        let fingerprint = compute_fingerprint(&signature, &chunks);

        Ok(Self {
            chunks,
            embeddings,
            signature,
            fingerprint,
        })
    }

    /// 스냅샷 파일에서 코퍼스 로드
    pub fn load(path: &Path) -> Result<Self> {
        let snapshot = CorpusSnapshot::read(path)?;
        let corpus = Self::from_snapshot(snapshot)?;

        tracing::info!(
            "Loaded corpus snapshot {} ({} chunks, embedding {})",
            path.display(),
            corpus.len(),
            corpus.signature
        );

        Ok(corpus)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn signature(&self) -> &EmbeddingSignature {
        &self.signature
    }

    /// 코퍼스 내용 해시 (SHA-256, hex)
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// 모델 식별자 + 청크 ID/본문으로 스냅샷 지문 계산
fn compute_fingerprint(signature: &EmbeddingSignature, chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.to_string().as_bytes());
    for chunk in chunks {
        hasher.update([0u8]);
        hasher.update(chunk.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.content.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Tests
// ============================================================================
