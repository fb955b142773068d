//! Deterministic offline embedding provider.
//!
//! Hashes each lowercase word into one of `dimensions` buckets and
//! L2-normalizes the counts. Texts sharing words get a positive cosine
//! similarity, which is enough for ranking fixtures in tests.

use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use docquery_core::AppResult;

/// Hashed bag-of-words embeddings.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed synchronously; used by fixtures that precompute vectors.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lower = text.to_lowercase();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            vector[bucket(word, self.dimensions)] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

/// FNV-1a over the word bytes.
fn bucket(word: &str, dimensions: usize) -> usize {
    let hash = word.bytes().fold(0xcbf29ce484222325u64, |acc, b| {
        (acc ^ b as u64).wrapping_mul(0x100000001b3)
    });
    (hash % dimensions as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "hashed-bow"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let provider = MockEmbeddingProvider::new(64);
        let a = provider.vector_for("Dinosaurs escape on an island");
        let b = provider.vector_for("Dinosaurs escape on an island");
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_rank_higher() {
        let provider = MockEmbeddingProvider::new(384);
        let query = provider.vector_for("dinosaurs island");
        let related = provider.vector_for("Scientists clone dinosaurs for an island theme park");
        let unrelated = provider.vector_for("A romantic comedy set in Paris");
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_gives_zero_vector() {
        let provider = MockEmbeddingProvider::new(8);
        let embedding = provider.embed("").await.unwrap();
        assert_eq!(embedding, vec![0.0; 8]);
    }
}
