//! 임베딩 모듈 - 쿼리 텍스트 벡터화
//!
//! 코퍼스 임베딩은 인덱싱 단계에서 미리 계산되어 스냅샷으로 들어오므로,
//! 여기서는 검색 시점에 쿼리 한 건씩만 임베딩합니다.
//!
//! - Gemini: Google AI API (gemini-embedding-001)
//! - TEI: text-embeddings-inference 서버 (로컬 sentence-transformers 모델)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&EmbeddingBackend::default())?;
//! let embedding = embedder.embed("입고 처리 절차").await?;
//! ```

mod gemini;
mod tei;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::EmbeddingBackend;
use crate::corpus::EmbeddingSignature;

pub use gemini::{GeminiEmbedding, DEFAULT_DIMENSION};
pub use tei::TeiEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 쿼리 임베딩 함수
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더(모델) 이름
    fn name(&self) -> &str;

    /// 임베딩 함수 식별자 - 스냅샷의 시그니처와 비교됩니다
    fn signature(&self) -> EmbeddingSignature {
        EmbeddingSignature::new(self.name(), self.dimension())
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 환경변수 (앞쪽이 우선)
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

fn api_key_from_env() -> Option<(&'static str, String)> {
    API_KEY_VARS.iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .filter(|key| !key.is_empty())
            .map(|key| (*var, key))
    })
}

/// Gemini API 키 로드 (GEMINI_API_KEY > GOOGLE_AI_API_KEY)
pub fn get_api_key() -> Result<String> {
    match api_key_from_env() {
        Some((var, key)) => {
            tracing::debug!("Using API key from {}", var);
            Ok(key)
        }
        None => anyhow::bail!(
            "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
             Get your API key at: https://aistudio.google.com/app/apikey"
        ),
    }
}

/// API 키 존재 여부
pub fn has_api_key() -> bool {
    api_key_from_env().is_some()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정된 백엔드로 쿼리 임베딩 함수 생성
pub fn create_embedder(backend: &EmbeddingBackend) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match backend {
        EmbeddingBackend::Gemini { dimension } => {
            Arc::new(GeminiEmbedding::from_env_with_dimension(*dimension)?)
        }
        EmbeddingBackend::Tei {
            url,
            model,
            dimension,
        } => Arc::new(TeiEmbedding::new(url, model, *dimension)?),
    };

    tracing::info!("Using query embedder {}", embedder.signature());
    Ok(embedder)
}
