//! Knowledge 모듈 - 하이브리드 검색 엔진
//!
//! - Lexical: 인메모리 BM25 키워드 검색
//! - Vector: 코사인 유사도 최근접 이웃 검색
//! - Fusion: RRF 알고리즘으로 두 검색 결과 통합
//! - Hybrid: 1단계 검색 → RRF → Cross-Encoder 재정렬 파이프라인

mod fusion;
mod hybrid;
mod lexical;
mod types;
mod vector;

// Re-exports
pub use fusion::{ReciprocalRankFusion, DEFAULT_RRF_K};
pub use hybrid::{HybridRetriever, RetrieverStats};
pub use lexical::{tokenize, LexicalIndex, LexicalStats};
pub use types::{FusedResult, RerankedResult, RetrievedChunk, SearchResult, SearchType};
pub use vector::VectorIndex;
