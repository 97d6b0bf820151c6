use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

/// Identity embeddings for symbols, pairs and timeframes.
///
/// A vector is generated the first time a (namespace, value) is seen and kept
/// for the life of the table. Vectors are seeded from a SHA-256 of the
/// identity, so the same identity maps to the same vector across restarts.
pub struct EmbeddingTable {
    dim: usize,
    vectors: RwLock<HashMap<String, Vec<f64>>>,
}

impl EmbeddingTable {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embedding(&self, namespace: &str, value: &str) -> Vec<f64> {
        let identity = format!("{}:{}", namespace, value);

        let cached = match self.vectors.read() {
            Ok(guard) => guard.get(&identity).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&identity).cloned(),
        };
        if let Some(vector) = cached {
            return vector;
        }

        let vector = Self::generate(&identity, self.dim);
        let mut guard = match self.vectors.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.entry(identity).or_insert(vector).clone()
    }

    pub fn len(&self) -> usize {
        match self.vectors.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn generate(identity: &str, dim: usize) -> Vec<f64> {
        let digest = Sha256::digest(identity.as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));
        (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_stable_and_cached() {
        let table = EmbeddingTable::new(4);
        let a = table.embedding("symbol", "BTC");
        let b = table.embedding("symbol", "BTC");
        assert_eq!(a, b);
        assert_ne!(table.embedding("timeframe", "1m"), table.embedding("timeframe", "1M"));
        assert_eq!(a.len(), 4);
        assert_eq!(table.len(), 3);

        // a fresh table (e.g. after restart) produces the same vector
        assert_eq!(EmbeddingTable::new(4).embedding("symbol", "BTC"), a);
    }

    #[test]
    fn test_namespaces_are_distinct() {
        let table = EmbeddingTable::new(4);
        assert_ne!(table.embedding("symbol", "USDT"), table.embedding("pair", "USDT"));
        assert!(table.embedding("timeframe", "1h").iter().all(|v| (-1.0..1.0).contains(v)));
    }
}
