//! 검색 엔진 에러 타입
//!
//! 하드 실패(임베딩 백엔드, 코퍼스/인덱스 불일치)와
//! 로컬에서 복구되는 실패(재정렬 백엔드)를 구분합니다.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// 쿼리 임베딩 실패 (백엔드 연결 불가, 타임아웃, 잘못된 응답)
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Cross-Encoder 재정렬 실패 - 파이프라인이 RRF 순서로 대체
    #[error("rerank backend unavailable: {0}")]
    RerankUnavailable(String),

    /// 스냅샷을 만든 임베딩 함수와 쿼리 임베딩 함수가 다름
    #[error(
        "embedding function mismatch: corpus built with {expected}, query embedder is {actual}"
    )]
    EmbeddingMismatch { expected: String, actual: String },

    #[error("chunk '{id}' has embedding dimension {actual}, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("chunk '{0}' has a non-finite embedding value")]
    InvalidEmbedding(String),

    #[error("duplicate chunk id: {0}")]
    DuplicateChunk(String),

    /// 두 인덱스가 서로 다른 청크 집합으로 빌드됨
    #[error("index mismatch: lexical index has {lexical} chunks, vector index has {vector}")]
    IndexMismatch { lexical: usize, vector: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read corpus snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid corpus snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("search task failed: {0}")]
    Task(String),
}

impl RetrievalError {
    /// 호출자에게 전파되지 않고 품질 저하로 흡수되는 에러인지 여부
    pub fn is_degradable(&self) -> bool {
        matches!(self, RetrievalError::RerankUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
