//! CLI 모듈
//!
//! hybrid-retriever CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{get_data_dir, AppConfig, EmbeddingBackend};
use crate::corpus::Corpus;
use crate::embedding::{create_embedder, has_api_key};
use crate::eval::{load_testset, run_benchmark, write_report};
use crate::knowledge::{HybridRetriever, RetrievedChunk};
use crate::rerank::create_reranker;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "hybrid-retriever")]
#[command(version, about = "하이브리드 검색 엔진 (BM25 + 벡터 + Cross-Encoder)", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: ~/.hybrid-retriever/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 코퍼스 스냅샷 경로 (설정보다 우선)
    #[arg(long, global = true)]
    pub corpus: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 코퍼스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Cross-Encoder 재정렬 끄기
        #[arg(long)]
        no_rerank: bool,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 테스트셋으로 검색 품질 측정 (Hit Rate, MRR)
    Bench {
        /// 테스트셋 JSON 경로
        #[arg(long)]
        testset: PathBuf,

        /// 질문당 결과 수
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Cross-Encoder 재정렬 끄기
        #[arg(long)]
        no_rerank: bool,

        /// 결과 저장 경로
        #[arg(short, long, default_value = "benchmark_retrieval.json")]
        output: PathBuf,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("설정 로드 실패")?;
    if let Some(corpus) = cli.corpus {
        config.backend.corpus_path = Some(corpus);
    }

    match cli.command {
        Commands::Query {
            query,
            limit,
            no_rerank,
            json,
        } => cmd_query(&config, &query, limit, !no_rerank, json).await,
        Commands::Bench {
            testset,
            top_k,
            no_rerank,
            output,
        } => cmd_bench(&config, &testset, top_k, !no_rerank, &output).await,
        Commands::Status => cmd_status(&config).await,
    }
}

/// 설정으로 검색기 생성
fn build_retriever(config: &AppConfig) -> Result<HybridRetriever> {
    if matches!(config.backend.embedding, EmbeddingBackend::Gemini { .. }) && !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export HYBRID_RETRIEVER_TEI_URL=http://localhost:8080\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }

    let corpus_path = config.backend.corpus_path();
    let corpus = Corpus::load(&corpus_path)
        .with_context(|| format!("코퍼스 로드 실패: {}", corpus_path.display()))?;

    let embedder = create_embedder(&config.backend.embedding).context("임베딩 백엔드 생성 실패")?;
    let reranker = match &config.backend.reranker {
        Some(backend) => Some(create_reranker(backend).context("재정렬 백엔드 생성 실패")?),
        None => None,
    };

    HybridRetriever::build(corpus, embedder, reranker, config.retrieval.clone())
        .context("HybridRetriever 초기화 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 검색 명령어 (query)
///
/// 하이브리드 검색 (BM25 + 벡터 → RRF → 재정렬)으로 코퍼스를 검색합니다.
async fn cmd_query(
    config: &AppConfig,
    query: &str,
    limit: usize,
    rerank: bool,
    json: bool,
) -> Result<()> {
    let retriever = build_retriever(config)?;

    if !json {
        println!("[*] 검색 중: \"{}\"", query);
    }

    let results = retriever.retrieve(query, limit, rerank).await.context("검색 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!("{}. {} {}", i + 1, result.id, format_scores(result));

        if let Some(source) = result.metadata.get(crate::corpus::META_SOURCE) {
            println!("   출처: {}", source);
        }
        println!("   내용: {}", truncate_text(&result.content, 200));
        println!();
    }

    Ok(())
}

/// 벤치마크 명령어 (bench)
async fn cmd_bench(
    config: &AppConfig,
    testset: &Path,
    top_k: usize,
    rerank: bool,
    output: &Path,
) -> Result<()> {
    let cases = load_testset(testset)?;
    let retriever = build_retriever(config)?;

    println!("[*] {} 개 질문으로 벤치마크 중...", cases.len());

    let report = run_benchmark(&retriever, &cases, top_k, rerank).await?;

    println!();
    println!("{}", "=".repeat(40));
    println!("검색 벤치마크 결과");
    println!("{}", "=".repeat(40));
    println!("질문 수:     {}", report.total_queries);
    println!("Top-K:       {}", report.top_k);
    println!("재정렬:      {}", if report.rerank { "사용" } else { "미사용" });
    println!("{}", "-".repeat(40));
    println!("Hit Rate:    {:.2}%", report.hit_rate * 100.0);
    println!("MRR:         {:.4}", report.mrr);
    println!("평균 지연:   {:.4}s", report.avg_latency_secs);
    println!("{}", "=".repeat(40));

    write_report(&report, output)?;
    println!("[OK] 결과 저장: {}", output.display());

    Ok(())
}

/// 상태 명령어 (status)
///
/// 시스템 상태를 확인합니다.
async fn cmd_status(config: &AppConfig) -> Result<()> {
    println!("hybrid-retriever v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // 데이터 디렉토리
    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    // 백엔드
    match &config.backend.embedding {
        EmbeddingBackend::Gemini { dimension } => {
            println!("[*] 임베딩: Gemini ({} 차원)", dimension);
            if has_api_key() {
                println!("[OK] API 키: 설정됨");
            } else {
                println!("[!] API 키: 미설정");
                println!("    설정: export GEMINI_API_KEY=your-key");
            }
        }
        EmbeddingBackend::Tei { url, model, dimension } => {
            println!("[*] 임베딩: TEI {} ({}, {} 차원)", url, model, dimension);
        }
    }
    match &config.backend.reranker {
        Some(reranker) => println!("[*] 재정렬: {} ({})", reranker.url, reranker.model),
        None => println!("[*] 재정렬: 미설정 (RRF 순서 사용)"),
    }

    // 코퍼스
    let corpus_path = config.backend.corpus_path();
    match Corpus::load(&corpus_path) {
        Ok(corpus) => {
            println!("[OK] 코퍼스: {} 청크 ({})", corpus.len(), corpus_path.display());
            println!("     임베딩: {}", corpus.signature());
            println!("     지문: {}", corpus.fingerprint());
        }
        Err(e) => {
            println!("[!] 코퍼스 로드 실패: {}", e);
            return Ok(());
        }
    }

    // 인덱스 통계 (백엔드가 준비된 경우만)
    match build_retriever(config) {
        Ok(retriever) => {
            let stats = retriever.stats();
            println!(
                "[OK] BM25 인덱스: {} 문서, {} 어휘, 평균 길이 {:.1}",
                stats.lexical.document_count,
                stats.lexical.vocabulary_size,
                stats.lexical.avg_doc_len
            );
        }
        Err(e) => {
            tracing::debug!("HybridRetriever 초기화 실패: {:#}", e);
            println!("[!] 검색기 초기화 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 점수 표시: [VEC 0.8123 | RRF 0.0325 | CE 4.1200]
fn format_scores(result: &RetrievedChunk) -> String {
    let method = match result.search_type {
        crate::knowledge::SearchType::Vector => "VEC",
        crate::knowledge::SearchType::Keyword => "BM25",
    };

    let mut parts = vec![format!("{} {:.4}", method, result.initial_score)];
    if let Some(rrf) = result.rrf_score {
        parts.push(format!("RRF {:.4}", rrf));
    }
    if let Some(rerank) = result.rerank_score {
        parts.push(format!("CE {:.4}", rerank));
    }
    format!("[{}]", parts.join(" | "))
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
