//! 설정 모듈
//!
//! 기본값 → JSON 설정 파일(`~/.hybrid-retriever/config.json`) → 환경변수 순으로 병합합니다.
//!
//! 환경변수:
//! - `HYBRID_RETRIEVER_CORPUS` - 코퍼스 스냅샷 경로
//! - `HYBRID_RETRIEVER_TEI_URL` - TEI 임베딩 서버 URL (설정 시 TEI 백엔드 사용)
//! - `HYBRID_RETRIEVER_RERANK_URL` - TEI 재정렬 서버 URL
//! - `HYBRID_RETRIEVER_RRF_K` - RRF 스무딩 상수

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.hybrid-retriever/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hybrid-retriever")
}

// ============================================================================
// Retrieval Parameters
// ============================================================================

/// BM25 (Okapi) 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// 단어 빈도 포화 계수
    pub k1: f64,
    /// 문서 길이 정규화 계수
    pub b: f64,
    /// 음수 IDF 하한 (평균 IDF 대비 비율)
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// 검색 파이프라인 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub bm25: Bm25Params,
    /// RRF 스무딩 상수 c
    pub rrf_k: f64,
    /// 1단계 검색 확장 배수 (topK × factor)
    pub candidate_factor: usize,
    /// RRF 출력 확장 배수 (topK × factor)
    pub fusion_factor: usize,
    pub embed_timeout_secs: u64,
    pub rerank_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            rrf_k: 60.0,
            candidate_factor: 2,
            fusion_factor: 3,
            embed_timeout_secs: 30,
            rerank_timeout_secs: 30,
        }
    }
}

impl RetrievalConfig {
    /// 설정값 검증
    pub fn validate(&self) -> std::result::Result<(), RetrievalError> {
        let bm25 = &self.bm25;
        if !(bm25.k1.is_finite() && bm25.k1 >= 0.0) {
            return Err(RetrievalError::InvalidConfig(format!(
                "bm25.k1 must be >= 0, got {}",
                bm25.k1
            )));
        }
        if !(bm25.b.is_finite() && (0.0..=1.0).contains(&bm25.b)) {
            return Err(RetrievalError::InvalidConfig(format!(
                "bm25.b must be in [0, 1], got {}",
                bm25.b
            )));
        }
        if !(bm25.epsilon.is_finite() && bm25.epsilon >= 0.0) {
            return Err(RetrievalError::InvalidConfig(format!(
                "bm25.epsilon must be >= 0, got {}",
                bm25.epsilon
            )));
        }
        if !(self.rrf_k.is_finite() && self.rrf_k > 0.0) {
            return Err(RetrievalError::InvalidConfig(format!(
                "rrf_k must be > 0, got {}",
                self.rrf_k
            )));
        }
        if self.candidate_factor == 0 || self.fusion_factor == 0 {
            return Err(RetrievalError::InvalidConfig(
                "candidate_factor and fusion_factor must be positive".to_string(),
            ));
        }
        if self.embed_timeout_secs == 0 || self.rerank_timeout_secs == 0 {
            return Err(RetrievalError::InvalidConfig("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    pub fn rerank_timeout(&self) -> Duration {
        Duration::from_secs(self.rerank_timeout_secs)
    }
}

// ============================================================================
// Backends
// ============================================================================

/// 쿼리 임베딩 백엔드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Google Gemini API (GEMINI_API_KEY)
    Gemini { dimension: usize },
    /// text-embeddings-inference 서버
    Tei {
        url: String,
        model: String,
        dimension: usize,
    },
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        EmbeddingBackend::Gemini { dimension: 768 }
    }
}

/// Cross-Encoder 재정렬 백엔드 (TEI `/rerank`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankerBackend {
    pub url: String,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    /// Bearer 토큰을 담은 환경변수 이름
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// 요청당 최대 패시지 수 (TEI `--max-client-batch-size`)
    #[serde(default = "default_rerank_batch_size")]
    pub max_batch_size: usize,
}

fn default_rerank_model() -> String {
    "cross-encoder/mmarco-mMiniLMv2-L12-H384-v1".to_string()
}

fn default_rerank_batch_size() -> usize {
    32
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub embedding: EmbeddingBackend,
    pub reranker: Option<RerankerBackend>,
    pub corpus_path: Option<PathBuf>,
}

impl BackendConfig {
    /// 코퍼스 경로 (미지정 시 ~/.hybrid-retriever/corpus.json)
    pub fn corpus_path(&self) -> PathBuf {
        self.corpus_path
            .clone()
            .unwrap_or_else(|| get_data_dir().join("corpus.json"))
    }

    fn validate(&self) -> Result<()> {
        if let EmbeddingBackend::Tei { url, .. } = &self.embedding {
            url::Url::parse(url).with_context(|| format!("Invalid TEI embedding URL: {}", url))?;
        }
        if let Some(reranker) = &self.reranker {
            url::Url::parse(&reranker.url)
                .with_context(|| format!("Invalid reranker URL: {}", reranker.url))?;
            if reranker.max_batch_size == 0 {
                anyhow::bail!("Reranker max_batch_size must be positive");
            }
        }
        Ok(())
    }
}

// ============================================================================
// AppConfig
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub retrieval: RetrievalConfig,
    pub backend: BackendConfig,
}

impl AppConfig {
    /// 설정 로드
    ///
    /// # Arguments
    /// * `path` - 설정 파일 경로 (None이면 기본 위치, 파일이 없으면 기본값)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = get_data_dir().join("config.json");
        let path = path.unwrap_or(&default_path);

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: AppConfig = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            tracing::debug!("Loaded config from {}", path.display());
            config
        } else {
            AppConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 환경변수 덮어쓰기
    ///
    /// 테스트에서 프로세스 환경을 건드리지 않도록 조회 함수를 주입받습니다.
    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(corpus) = get("HYBRID_RETRIEVER_CORPUS") {
            self.backend.corpus_path = Some(PathBuf::from(corpus));
        }

        if let Some(url) = get("HYBRID_RETRIEVER_TEI_URL") {
            self.backend.embedding = match &self.backend.embedding {
                EmbeddingBackend::Tei { model, dimension, .. } => EmbeddingBackend::Tei {
                    url,
                    model: model.clone(),
                    dimension: *dimension,
                },
                EmbeddingBackend::Gemini { .. } => EmbeddingBackend::Tei {
                    url,
                    model: "paraphrase-multilingual-MiniLM-L12-v2".to_string(),
                    dimension: 384,
                },
            };
        }

        if let Some(url) = get("HYBRID_RETRIEVER_RERANK_URL") {
            match &mut self.backend.reranker {
                Some(reranker) => reranker.url = url,
                None => {
                    self.backend.reranker = Some(RerankerBackend {
                        url,
                        model: default_rerank_model(),
                        api_key_env: None,
                        max_batch_size: default_rerank_batch_size(),
                    })
                }
            }
        }

        if let Some(rrf_k) = get("HYBRID_RETRIEVER_RRF_K") {
            self.retrieval.rrf_k = rrf_k
                .parse()
                .with_context(|| format!("Invalid HYBRID_RETRIEVER_RRF_K: {}", rrf_k))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;
        self.backend.validate()
    }
}

// ============================================================================
// Tests
// ============================================================================
