//! Lexical Index - 인메모리 BM25 키워드 검색
//!
//! 코퍼스 스냅샷 전체로 한 번 빌드하고 이후에는 읽기 전용입니다 (증분 삽입 없음).
//!
//! 점수 함수는 BM25 Okapi:
//! - `idf(t) = ln(N - n_t + 0.5) - ln(n_t + 0.5)`
//! - 음수 IDF는 `epsilon × 평균 IDF`로 대체
//! - `score = Σ idf(t) · tf·(k1+1) / (tf + k1·(1 - b + b·|d|/avgdl))`
//!
//! ref: https://en.wikipedia.org/wiki/Okapi_BM25

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Bm25Params;
use crate::corpus::Corpus;

use super::types::{SearchResult, SearchType};

/// 토큰화: 소문자 변환 후 공백 기준 분리
///
/// 언어별 형태소 분석은 하지 않습니다.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// 인덱스 통계
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalStats {
    pub document_count: usize,
    pub vocabulary_size: usize,
    pub avg_doc_len: f64,
}

/// BM25 인덱스
pub struct LexicalIndex {
    corpus: Arc<Corpus>,
    params: Bm25Params,
    /// term -> [(문서 위치, tf)]
    postings: HashMap<String, Vec<(usize, u32)>>,
    idf: HashMap<String, f64>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
}

impl LexicalIndex {
    /// 코퍼스 스냅샷으로 인덱스 빌드
    pub fn build(corpus: Arc<Corpus>, params: Bm25Params) -> Self {
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lens = Vec::with_capacity(corpus.len());

        for (doc_idx, chunk) in corpus.chunks().iter().enumerate() {
            let tokens = tokenize(&chunk.content);
            doc_lens.push(tokens.len());

            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *term_freqs.entry(token).or_insert(0) += 1;
            }
            for (term, tf) in term_freqs {
                postings.entry(term).or_default().push((doc_idx, tf));
            }
        }

        let total_len: usize = doc_lens.iter().sum();
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            total_len as f64 / doc_lens.len() as f64
        };

        let idf = compute_idf(&postings, corpus.len(), params.epsilon);

        tracing::info!(
            "BM25 index built: {} docs, {} terms, avgdl {:.2}",
            corpus.len(),
            idf.len(),
            avg_doc_len
        );

        Self {
            corpus,
            params,
            postings,
            idf,
            doc_lens,
            avg_doc_len,
        }
    }

    /// 문서별 BM25 점수 (코퍼스 순서)
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let mut scores = vec![0.0; self.doc_lens.len()];
        let Bm25Params { k1, b, .. } = self.params;

        // 쿼리 토큰 중복은 중복된 만큼 반영
        for term in tokenize(query) {
            let (Some(idf), Some(postings)) = (self.idf.get(&term), self.postings.get(&term)) else {
                continue;
            };
            for &(doc_idx, tf) in postings {
                let tf = f64::from(tf);
                let len_norm = 1.0 - b + b * self.doc_lens[doc_idx] as f64 / self.avg_doc_len;
                scores[doc_idx] += idf * (tf * (k1 + 1.0)) / (tf + k1 * len_norm);
            }
        }

        scores
    }

    /// 키워드 검색
    ///
    /// 점수가 양수인 문서만 반환하며, 동점은 코퍼스 삽입 순서를 따릅니다.
    pub fn search(&self, query: &str, k: usize) -> Vec<SearchResult> {
        if k == 0 || self.corpus.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f64)> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // sort_by는 안정 정렬 → 동점 시 삽입 순서 유지
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);

        ranked
            .into_iter()
            .filter_map(|(doc_idx, score)| {
                self.corpus
                    .chunk(doc_idx)
                    .map(|chunk| SearchResult::from_chunk(chunk, score, SearchType::Keyword))
            })
            .collect()
    }

    /// term의 IDF (인덱스에 없으면 None)
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    pub fn stats(&self) -> LexicalStats {
        LexicalStats {
            document_count: self.doc_lens.len(),
            vocabulary_size: self.idf.len(),
            avg_doc_len: self.avg_doc_len,
        }
    }
}

/// IDF 계산 (음수 IDF는 epsilon × 평균 IDF로 대체)
fn compute_idf(
    postings: &HashMap<String, Vec<(usize, u32)>>,
    doc_count: usize,
    epsilon: f64,
) -> HashMap<String, f64> {
    let n = doc_count as f64;
    let mut idf = HashMap::with_capacity(postings.len());
    let mut idf_sum = 0.0;
    let mut negative = Vec::new();

    for (term, docs) in postings {
        let df = docs.len() as f64;
        let value = (n - df + 0.5).ln() - (df + 0.5).ln();
        idf_sum += value;
        if value < 0.0 {
            negative.push(term.clone());
        }
        idf.insert(term.clone(), value);
    }

    if !idf.is_empty() {
        let floor = epsilon * idf_sum / idf.len() as f64;
        for term in negative {
            idf.insert(term, floor);
        }
    }

    idf
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::corpus_of;

    fn index(docs: &[&str]) -> LexicalIndex {
        let chunks: Vec<(String, String, Vec<f32>)> = docs
            .iter()
            .enumerate()
            .map(|(i, d)| (format!("d{}", i), d.to_string(), vec![1.0]))
            .collect();
        LexicalIndex::build(Arc::new(corpus_of(1, chunks)), Bm25Params::default())
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    fn animals() -> LexicalIndex {
        index(&[
            "the quick brown fox",
            "the lazy dog",
            "quick quick rabbit",
            "a slow turtle",
        ])
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Hello  WORLD\tfoo\n"), vec!["hello", "world", "foo"]);
        assert_eq!(tokenize("fox, dog"), vec!["fox,", "dog"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_okapi_score_single_term() {
        let index = animals();
        let results = index.search("fox", 10);

        assert_eq!(ids(&results), vec!["d0"]);
        assert_eq!(results[0].search_type, SearchType::Keyword);
        // idf = ln(3.5/1.5), |d| = 4, avgdl = 3.25
        assert!((results[0].initial_score - 0.767_586_9).abs() < 1e-6);
    }

    #[test]
    fn test_query_is_case_insensitive_and_counts_repeats() {
        let index = animals();
        let once = index.search("fox", 10)[0].initial_score;
        let twice = index.search("FOX fox", 10)[0].initial_score;
        assert!((twice - 2.0 * once).abs() < 1e-9);
    }

    #[test]
    fn test_zero_idf_term_excluded() {
        // "quick"은 4개 중 2개 문서에 등장 → idf = 0 → 점수 0 → 제외
        let index = animals();
        assert_eq!(index.idf("quick"), Some(0.0));
        assert!(index.search("quick", 10).is_empty());
    }

    #[test]
    fn test_negative_idf_floor_and_stable_ties() {
        let index = index(&["alpha one common", "beta two common", "gamma three common"]);

        let floor = index.idf("common").unwrap();
        assert!((floor - 0.039_965_84).abs() < 1e-6);

        let results = index.search("common", 10);
        assert_eq!(ids(&results), vec!["d0", "d1", "d2"]);
        for r in &results {
            // |d| == avgdl → 길이 정규화 1 → tf 항 = 1
            assert!((r.initial_score - floor).abs() < 1e-9);
        }

        assert_eq!(ids(&index.search("common", 2)), vec!["d0", "d1"]);
    }

    #[test]
    fn test_more_matching_terms_rank_higher() {
        let index = animals();
        let results = index.search("lazy brown fox", 10);
        assert_eq!(ids(&results), vec!["d0", "d1"]);
        assert!(results[0].initial_score > results[1].initial_score);
    }

    #[test]
    fn test_no_overlap_and_zero_k() {
        let index = animals();
        assert!(index.search("elephant", 5).is_empty());
        assert!(index.search("", 5).is_empty());
        assert!(index.search("fox", 0).is_empty());
    }

    #[test]
    fn test_empty_corpus() {
        let index = index(&[]);
        assert!(index.is_empty());
        assert!(index.search("anything", 5).is_empty());
        assert_eq!(index.stats().avg_doc_len, 0.0);
    }

    #[test]
    fn test_empty_documents_do_not_break_scoring() {
        let index = index(&["", "solar panel wiring", "", "battery storage"]);
        let results = index.search("solar", 5);
        assert_eq!(ids(&results), vec!["d1"]);
        assert!(results[0].initial_score.is_finite());
    }

    #[test]
    fn test_stats() {
        let stats = animals().stats();
        assert_eq!(stats.document_count, 4);
        assert_eq!(stats.vocabulary_size, 10);
        assert!((stats.avg_doc_len - 3.25).abs() < 1e-12);
    }
}
