//! 검색 결과 타입
//!
//! 쿼리마다 생성되고 반환 후 버려지는 값들입니다.

use serde::{Deserialize, Serialize};

use crate::corpus::{Chunk, Metadata};

/// 1단계 검색 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// 벡터 (코사인 유사도)
    Vector,
    /// 키워드 (BM25)
    Keyword,
}

/// 1단계 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    /// 본문 (편의를 위한 복사본)
    pub content: String,
    pub metadata: Metadata,
    /// 유사도 또는 BM25 점수 (검색 방법마다 스케일이 다름)
    pub initial_score: f64,
    pub search_type: SearchType,
}

impl SearchResult {
    pub(crate) fn from_chunk(chunk: &Chunk, initial_score: f64, search_type: SearchType) -> Self {
        Self {
            id: chunk.id.clone(),
            content: chunk.content.clone(),
            metadata: chunk.metadata.clone(),
            initial_score,
            search_type,
        }
    }
}

/// RRF 통합 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    #[serde(flatten)]
    pub hit: SearchResult,
    /// RRF 스코어 (원래 점수 스케일과 무관)
    pub rrf_score: f64,
}

/// Cross-Encoder 재정렬 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    #[serde(flatten)]
    pub fused: FusedResult,
    pub rerank_score: f64,
}

/// `retrieve`가 반환하는 레코드
///
/// 어떤 단계가 실행됐는지에 따라 점수 필드가 채워집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub initial_score: f64,
    pub search_type: SearchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

impl From<SearchResult> for RetrievedChunk {
    fn from(hit: SearchResult) -> Self {
        Self {
            id: hit.id,
            content: hit.content,
            metadata: hit.metadata,
            initial_score: hit.initial_score,
            search_type: hit.search_type,
            rrf_score: None,
            rerank_score: None,
        }
    }
}

impl From<FusedResult> for RetrievedChunk {
    fn from(fused: FusedResult) -> Self {
        Self {
            rrf_score: Some(fused.rrf_score),
            ..RetrievedChunk::from(fused.hit)
        }
    }
}

impl From<RerankedResult> for RetrievedChunk {
    fn from(reranked: RerankedResult) -> Self {
        Self {
            rerank_score: Some(reranked.rerank_score),
            ..RetrievedChunk::from(reranked.fused)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit() -> SearchResult {
        SearchResult::from_chunk(
            &Chunk::new("c1", "body").with_meta("source", "a.md"),
            0.42,
            SearchType::Keyword,
        )
    }

    #[test]
    fn test_serialize_omits_missing_scores() {
        let chunk = RetrievedChunk::from(FusedResult {
            hit: hit(),
            rrf_score: 0.016,
        });
        let json = serde_json::to_value(&chunk).unwrap();

        assert_eq!(json["search_type"], "keyword");
        assert_eq!(json["metadata"]["source"], "a.md");
        assert_eq!(json["rrf_score"], 0.016);
        assert!(json.get("rerank_score").is_none());
    }

    #[test]
    fn test_reranked_carries_all_scores() {
        let chunk = RetrievedChunk::from(RerankedResult {
            fused: FusedResult {
                hit: hit(),
                rrf_score: 0.5,
            },
            rerank_score: 3.25,
        });
        assert_eq!(chunk.initial_score, 0.42);
        assert_eq!(chunk.rrf_score, Some(0.5));
        assert_eq!(chunk.rerank_score, Some(3.25));
    }
}
