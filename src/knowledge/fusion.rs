//! RRF (Reciprocal Rank Fusion)
//!
//! 스케일이 다른 두 순위 목록(벡터, 키워드)을 점수가 아닌 순위로 통합합니다.
//! ref: https://www.elastic.co/blog/hybrid-search-rrf
//!
//! RRF Score = Σ 1 / (c + rank + 1), rank는 0부터 시작

use std::collections::HashMap;

use super::types::{FusedResult, SearchResult};

/// 기본 스무딩 상수
pub const DEFAULT_RRF_K: f64 = 60.0;

/// 통합 중인 엔트리
struct Candidate {
    /// 이 청크를 처음 가져온 결과 (first-seen wins)
    hit: SearchResult,
    score: f64,
    best_rank: usize,
}

/// RRF 통합기
#[derive(Debug, Clone, Copy)]
pub struct ReciprocalRankFusion {
    k: f64,
}

impl Default for ReciprocalRankFusion {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

impl ReciprocalRankFusion {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    /// 순위 r(0-based)의 기여도
    pub fn contribution(&self, rank: usize) -> f64 {
        1.0 / (self.k + rank as f64 + 1.0)
    }

    /// 두 목록을 통합
    ///
    /// 정렬 기준: RRF 스코어 내림차순 → 두 목록 중 최고 순위 오름차순 → 처음 등장한 순서.
    /// 내용/메타데이터는 청크 ID를 처음 가져온 결과의 것을 사용합니다.
    pub fn fuse(
        &self,
        vector_results: Vec<SearchResult>,
        keyword_results: Vec<SearchResult>,
        limit: usize,
    ) -> Vec<FusedResult> {
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for list in [vector_results, keyword_results] {
            for (rank, hit) in list.into_iter().enumerate() {
                let contribution = self.contribution(rank);
                match positions.get(&hit.id) {
                    Some(&pos) => {
                        let candidate = &mut candidates[pos];
                        candidate.score += contribution;
                        candidate.best_rank = candidate.best_rank.min(rank);
                    }
                    None => {
                        positions.insert(hit.id.clone(), candidates.len());
                        candidates.push(Candidate {
                            hit,
                            score: contribution,
                            best_rank: rank,
                        });
                    }
                }
            }
        }

        // 안정 정렬 → 마지막 동점은 처음 등장한 순서
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.best_rank.cmp(&b.best_rank))
        });
        candidates.truncate(limit);

        candidates
            .into_iter()
            .map(|c| FusedResult {
                hit: c.hit,
                rrf_score: c.score,
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
