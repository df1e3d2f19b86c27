use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};

/// Text to fixed-length vector. `embed_batch` must return one vector per
/// input, in input order.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

/// Hashed bag-of-words. Deterministic and model-free; questions sharing
/// vocabulary land close together.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EMBEDDING_DIM)
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dim];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 1469598103934665603;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            v[(h as usize) % self.dim] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }

        Ok(v)
    }
}

type Slot = Arc<Mutex<Option<Vec<f32>>>>;

/// Read-through cache in front of another provider. Each text is computed at
/// most once, also across threads: a caller filling a text holds that text's
/// slot, and other callers wait on it. Misses of a batch go to the inner
/// provider as one batch.
pub struct CachedEmbeddingProvider<P> {
    inner: P,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<P: EmbeddingProvider> CachedEmbeddingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Number of texts with a computed embedding.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = match self.slots.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => return 0,
        };
        slots
            .iter()
            .filter(|slot| slot.lock().map(|v| v.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots_for<'a>(&self, texts: &'a [String]) -> Result<BTreeMap<&'a str, Slot>> {
        let mut map = self
            .slots
            .lock()
            .map_err(|_| anyhow!("embedding cache poisoned"))?;
        Ok(texts
            .iter()
            .map(|t| (t.as_str(), map.entry(t.clone()).or_default().clone()))
            .collect())
    }
}

impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbeddingProvider<P> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()])?;
        out.pop().ok_or_else(|| anyhow!("empty embedding batch"))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let slots = self.slots_for(texts)?;

        // Slots are locked in text order so overlapping batches cannot
        // deadlock. The map lock is not held here.
        let mut held = Vec::with_capacity(slots.len());
        for (text, slot) in &slots {
            let guard = slot
                .lock()
                .map_err(|_| anyhow!("embedding cache poisoned"))?;
            held.push((*text, guard));
        }

        let missing: Vec<String> = held
            .iter()
            .filter(|entry| entry.1.is_none())
            .map(|entry| entry.0.to_string())
            .collect();

        if !missing.is_empty() {
            let fresh = self.inner.embed_batch(&missing)?;
            if fresh.len() != missing.len() {
                bail!(
                    "provider returned {} vectors for {} texts",
                    fresh.len(),
                    missing.len()
                );
            }
            let mut fresh = fresh.into_iter();
            for entry in held.iter_mut().filter(|entry| entry.1.is_none()) {
                *entry.1 = fresh.next();
            }
        }

        let ready: HashMap<&str, Vec<f32>> = held
            .iter()
            .filter_map(|entry| entry.1.as_ref().map(|v| (entry.0, v.clone())))
            .collect();
        drop(held);

        texts
            .iter()
            .map(|t| {
                ready
                    .get(t.as_str())
                    .cloned()
                    .ok_or_else(|| anyhow!("embedding missing after cache fill"))
            })
            .collect()
    }
}
