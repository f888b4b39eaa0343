//! hybrid-retriever - 하이브리드 검색 엔진
//!
//! BM25 키워드 검색 + 코사인 벡터 검색을 RRF로 통합하고,
//! Cross-Encoder로 재정렬하는 검색 파이프라인입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let corpus = Corpus::load(Path::new("corpus.json"))?;
//! let embedder = create_embedder(&EmbeddingBackend::default())?;
//! let retriever = HybridRetriever::build(corpus, embedder, None, RetrievalConfig::default())?;
//! let results = retriever.retrieve("FEFO 출고 규칙", 5, true).await?;
//! ```

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod knowledge;
pub mod rerank;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::{get_data_dir, AppConfig, Bm25Params, RetrievalConfig};
pub use corpus::{Chunk, Corpus, EmbeddingSignature, Metadata, MetadataValue};
pub use embedding::{
    create_embedder, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding, TeiEmbedding,
};
pub use error::{Result, RetrievalError};
pub use knowledge::{
    FusedResult, HybridRetriever, LexicalIndex, ReciprocalRankFusion, RerankedResult,
    RetrievedChunk, RetrieverStats, SearchResult, SearchType, VectorIndex,
};
pub use rerank::{create_reranker, HttpReranker, Reranker};
