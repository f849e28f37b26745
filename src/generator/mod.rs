use async_trait::async_trait;

use crate::core::CardContent;

pub mod openai;
pub mod prompts;

pub use openai::OpenAiGenerator;

/// Opaque text-pair generator. Implementations never surface business-level
/// failures as errors: an empty (or input-shaped empty) result means "nothing
/// usable came back", which callers treat as a valid outcome.
#[async_trait]
pub trait PairGenerator: Send + Sync {
    /// Extracts candidate card pairs from raw text.
    async fn pairs_from_text(&self, text: &str) -> Vec<CardContent>;

    /// Extracts candidate card pairs from a base64-encoded image, with an
    /// optional caption (usually the filename) for context.
    async fn pairs_from_image(&self, base64_image: &str, caption: &str) -> Vec<CardContent>;

    /// Proposes replacements for existing pairs: one inner list per input
    /// pair, cardinality 0..N. On internal failure returns an input-length
    /// vector of empty lists.
    async fn regenerate(&self, pairs: &[CardContent]) -> Vec<Vec<CardContent>>;
}
