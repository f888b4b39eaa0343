//! Eval 모듈 - 검색 품질 벤치마크
//!
//! 질문마다 정답 출처(source)가 주어진 테스트셋으로 Hit Rate와 MRR을 측정합니다.
//!
//! - Hit: 상위 topK 결과 중 하나의 `source` 메타데이터가 정답 출처를 포함
//! - MRR: 첫 Hit 위치 i(0부터)에 대해 1/(i+1)의 평균, Hit이 없으면 0

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::corpus::META_SOURCE;
use crate::knowledge::{HybridRetriever, RetrievedChunk};

/// 테스트 케이스
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub question: String,
    /// 정답 청크의 출처 (경로 일부만 있어도 됨)
    pub ground_truth_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth_content_snippet: Option<String>,
}

/// 벤치마크 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub hit_rate: f64,
    pub mrr: f64,
    pub avg_latency_secs: f64,
    pub total_queries: usize,
    pub top_k: usize,
    pub rerank: bool,
    pub timestamp: String,
}

/// 테스트셋 JSON 읽기
pub fn load_testset(path: &Path) -> Result<Vec<TestCase>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("테스트셋을 읽을 수 없습니다: {}", path.display()))?;
    let cases: Vec<TestCase> =
        serde_json::from_str(&content).context("테스트셋 JSON 파싱 실패")?;
    Ok(cases)
}

/// 첫 Hit 위치 (0부터)
fn first_hit(results: &[RetrievedChunk], target_source: &str) -> Option<usize> {
    results.iter().position(|chunk| {
        chunk
            .metadata
            .get(META_SOURCE)
            .and_then(|v| v.as_str())
            .map(|source| source.contains(target_source))
            .unwrap_or(false)
    })
}

/// 벤치마크 실행
///
/// # Arguments
/// * `retriever` - 빌드된 하이브리드 검색기
/// * `cases` - 테스트 케이스 (비어 있으면 에러)
/// * `top_k` - 질문당 결과 수
/// * `rerank` - 재정렬 여부
pub async fn run_benchmark(
    retriever: &HybridRetriever,
    cases: &[TestCase],
    top_k: usize,
    rerank: bool,
) -> Result<BenchmarkReport> {
    if cases.is_empty() {
        bail!("테스트셋이 비어 있습니다");
    }

    tracing::info!(
        "Benchmarking retrieval with {} queries (top_k {}, rerank {})",
        cases.len(),
        top_k,
        rerank
    );

    let mut hits = 0usize;
    let mut reciprocal_rank_sum = 0.0;
    let mut total_secs = 0.0;

    for (i, case) in cases.iter().enumerate() {
        let started = Instant::now();
        let results = retriever
            .retrieve(&case.question, top_k, rerank)
            .await
            .with_context(|| format!("질문 #{} 검색 실패", i + 1))?;
        total_secs += started.elapsed().as_secs_f64();

        match first_hit(&results, &case.ground_truth_source) {
            Some(position) => {
                hits += 1;
                reciprocal_rank_sum += 1.0 / (position as f64 + 1.0);
            }
            None => {
                tracing::debug!(
                    "Miss: {:?} (expected {})",
                    case.question,
                    case.ground_truth_source
                );
            }
        }
    }

    let total = cases.len() as f64;
    Ok(BenchmarkReport {
        hit_rate: hits as f64 / total,
        mrr: reciprocal_rank_sum / total,
        avg_latency_secs: total_secs / total,
        total_queries: cases.len(),
        top_k,
        rerank,
        timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

/// 결과를 JSON 파일로 저장
pub fn write_report(report: &BenchmarkReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("결과 파일을 쓸 수 없습니다: {}", path.display()))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RetrievalConfig;
    use crate::corpus::{
        Corpus, CorpusSnapshot, EmbeddingSignature, Metadata, MetadataValue, SnapshotChunk,
    };
    use crate::test_support::{TableEmbedder, TEST_MODEL};

    fn chunk(id: &str, content: &str, source: &str, embedding: Vec<f32>) -> SnapshotChunk {
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), MetadataValue::from(source));
        SnapshotChunk {
            id: id.to_string(),
            content: content.to_string(),
            metadata,
            embedding,
        }
    }

    fn retriever() -> HybridRetriever {
        let corpus = Corpus::from_snapshot(CorpusSnapshot {
            embedding: EmbeddingSignature::new(TEST_MODEL, 2),
            chunks: vec![
                chunk("c1", "solar panel wiring guide", "docs/energy/solar.md", vec![1.0, 0.0]),
                chunk("c2", "rainwater tank cleaning steps", "docs/water/tank.md", vec![0.0, 1.0]),
                chunk("c3", "composting kitchen scraps", "docs/garden/compost.md", vec![0.7, 0.7]),
            ],
        })
        .unwrap();

        HybridRetriever::build(
            corpus,
            Arc::new(TableEmbedder::new(2)),
            None,
            RetrievalConfig::default(),
        )
        .unwrap()
    }

    fn case(question: &str, source: &str) -> TestCase {
        TestCase {
            question: question.to_string(),
            ground_truth_source: source.to_string(),
            ground_truth_content_snippet: None,
        }
    }

    #[tokio::test]
    async fn test_hit_rate_and_mrr() {
        let cases = vec![
            // 키워드만으로 1위
            case("solar wiring", "solar.md"),
            // 1위 tank, 2위 compost
            case("rainwater tank composting", "compost.md"),
            // 매칭 없음
            case("bicycle repair", "bike.md"),
        ];

        let report = run_benchmark(&retriever(), &cases, 5, false).await.unwrap();

        assert_eq!(report.total_queries, 3);
        assert!((report.hit_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.mrr - (1.0 + 0.5 + 0.0) / 3.0).abs() < 1e-12);
        assert!(report.avg_latency_secs >= 0.0);
        assert_eq!(report.top_k, 5);
        assert!(!report.rerank);
    }

    #[tokio::test]
    async fn test_empty_testset_is_error() {
        assert!(run_benchmark(&retriever(), &[], 5, true).await.is_err());
    }

    #[test]
    fn test_first_hit_uses_substring_match() {
        let results: Vec<RetrievedChunk> = ["docs/a.md", "docs/water/tank.md"]
            .iter()
            .enumerate()
            .map(|(i, source)| {
                let mut metadata = Metadata::new();
                metadata.insert(META_SOURCE.to_string(), MetadataValue::from(*source));
                RetrievedChunk {
                    id: format!("c{}", i),
                    content: String::new(),
                    metadata,
                    initial_score: 1.0,
                    search_type: crate::knowledge::SearchType::Keyword,
                    rrf_score: None,
                    rerank_score: None,
                }
            })
            .collect();

        assert_eq!(first_hit(&results, "tank.md"), Some(1));
        assert_eq!(first_hit(&results, "docs/"), Some(0));
        assert_eq!(first_hit(&results, "missing.md"), None);
    }

    #[test]
    fn test_testset_and_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let testset = dir.path().join("testset.json");
        std::fs::write(
            &testset,
            r#"[
                {"question": "how to clean the tank?", "ground_truth_source": "tank.md"},
                {
                    "question": "solar?",
                    "ground_truth_source": "solar.md",
                    "ground_truth_content_snippet": "wiring"
                }
            ]"#,
        )
        .unwrap();

        let cases = load_testset(&testset).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].ground_truth_content_snippet.as_deref(), Some("wiring"));

        let report = BenchmarkReport {
            hit_rate: 0.5,
            mrr: 0.25,
            avg_latency_secs: 0.01,
            total_queries: 2,
            top_k: 5,
            rerank: true,
            timestamp: "2026-01-01 00:00:00".to_string(),
        };
        let output = dir.path().join("benchmark_retrieval.json");
        write_report(&report, &output).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["hit_rate"], 0.5);
        assert_eq!(written["total_queries"], 2);
        assert_eq!(written["timestamp"], "2026-01-01 00:00:00");
    }

    #[test]
    fn test_missing_testset_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_testset(&dir.path().join("none.json")).is_err());
    }
}
