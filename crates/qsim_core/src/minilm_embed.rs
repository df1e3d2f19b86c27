use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Linear, VarBuilder};
use std::path::Path;
use tracing::debug;

use crate::embed::EmbeddingProvider;

/// Sentences per forward pass.
const BATCH_SIZE: usize = 32;
const PAD_TOKEN_ID: u32 = 0;

// ---------------------------------------------------------------------------
// Config (all-MiniLM-L6-v2)
// ---------------------------------------------------------------------------

struct MiniLmConfig {
    hidden_size: usize,
    intermediate_size: usize,
    num_attention_heads: usize,
    num_hidden_layers: usize,
    vocab_size: usize,
    max_position_embeddings: usize,
    type_vocab_size: usize,
    layer_norm_eps: f64,
}

impl MiniLmConfig {
    fn all_minilm_l6_v2() -> Self {
        Self {
            hidden_size: 384,
            intermediate_size: 1536,
            num_attention_heads: 12,
            num_hidden_layers: 6,
            vocab_size: 30522,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
        }
    }

    fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

// ---------------------------------------------------------------------------
// Layer norm (with bias)
// ---------------------------------------------------------------------------

struct LayerNorm {
    weight: Tensor,
    bias: Tensor,
    eps: f64,
}

impl LayerNorm {
    fn load(vb: VarBuilder, hidden_size: usize, eps: f64) -> Result<Self> {
        Ok(Self {
            weight: vb.get(hidden_size, "weight")?,
            bias: vb.get(hidden_size, "bias")?,
            eps,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mean = x.mean_keepdim(D::Minus1)?;
        let centered = x.broadcast_sub(&mean)?;
        let var = centered.sqr()?.mean_keepdim(D::Minus1)?;
        let normed = centered.broadcast_div(&(var + self.eps)?.sqrt()?)?;
        Ok(normed
            .broadcast_mul(&self.weight)?
            .broadcast_add(&self.bias)?)
    }
}

// ---------------------------------------------------------------------------
// Encoder layer: masked self-attention + FFN, both post-norm
// ---------------------------------------------------------------------------

struct EncoderLayer {
    query: Linear,
    key: Linear,
    value: Linear,
    attn_out: Linear,
    attn_norm: LayerNorm,
    up: Linear,
    down: Linear,
    ffn_norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
}

impl EncoderLayer {
    fn load(vb: VarBuilder, config: &MiniLmConfig) -> Result<Self> {
        let h = config.hidden_size;
        let attn = vb.pp("attention");

        Ok(Self {
            query: candle_nn::linear(h, h, attn.pp("self").pp("query"))?,
            key: candle_nn::linear(h, h, attn.pp("self").pp("key"))?,
            value: candle_nn::linear(h, h, attn.pp("self").pp("value"))?,
            attn_out: candle_nn::linear(h, h, attn.pp("output").pp("dense"))?,
            attn_norm: LayerNorm::load(
                attn.pp("output").pp("LayerNorm"),
                h,
                config.layer_norm_eps,
            )?,
            up: candle_nn::linear(
                h,
                config.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            down: candle_nn::linear(config.intermediate_size, h, vb.pp("output").pp("dense"))?,
            ffn_norm: LayerNorm::load(vb.pp("output").pp("LayerNorm"), h, config.layer_norm_eps)?,
            num_heads: config.num_attention_heads,
            head_dim: config.head_dim(),
        })
    }

    /// `x`: (batch, seq, hidden). `mask_bias`: (batch, 1, 1, seq), zero for
    /// real tokens and a large negative value for padding.
    fn forward(&self, x: &Tensor, mask_bias: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = x.dims3()?;
        let heads = |t: Tensor| -> Result<Tensor> {
            Ok(t.reshape((batch, seq_len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?)
        };

        let q = heads(self.query.forward(x)?)?;
        let k = heads(self.key.forward(x)?)?;
        let v = heads(self.value.forward(x)?)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = q
            .matmul(&k.t()?.contiguous()?)?
            .affine(scale, 0.0)?
            .broadcast_add(mask_bias)?;
        let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, self.num_heads * self.head_dim))?;

        let x = self.attn_norm.forward(&(x + self.attn_out.forward(&context)?)?)?;

        let h = self.down.forward(&self.up.forward(&x)?.gelu_erf()?)?;
        self.ffn_norm.forward(&(x + h)?)
    }
}

// ---------------------------------------------------------------------------
// Full model
// ---------------------------------------------------------------------------

struct MiniLmModel {
    word_embeddings: Tensor,
    position_embeddings: Tensor,
    token_type_embeddings: Tensor,
    embedding_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    config: MiniLmConfig,
}

impl MiniLmModel {
    fn load(path: &Path, device: &Device) -> Result<Self> {
        let config = MiniLmConfig::all_minilm_l6_v2();

        // SAFETY: the safetensors file is memory-mapped read-only and must not
        // be modified while the model is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };

        let emb = vb.pp("embeddings");
        let word_embeddings = emb
            .pp("word_embeddings")
            .get((config.vocab_size, config.hidden_size), "weight")?;
        let position_embeddings = emb.pp("position_embeddings").get(
            (config.max_position_embeddings, config.hidden_size),
            "weight",
        )?;
        let token_type_embeddings = emb
            .pp("token_type_embeddings")
            .get((config.type_vocab_size, config.hidden_size), "weight")?;
        let embedding_norm = LayerNorm::load(
            emb.pp("LayerNorm"),
            config.hidden_size,
            config.layer_norm_eps,
        )?;

        let layers = (0..config.num_hidden_layers)
            .map(|i| EncoderLayer::load(vb.pp("encoder").pp("layer").pp(i.to_string()), &config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            word_embeddings,
            position_embeddings,
            token_type_embeddings,
            embedding_norm,
            layers,
            config,
        })
    }

    /// Embed a batch of token sequences. Sequences are right-padded to the
    /// longest one; padding is masked out of attention and pooling.
    fn forward_batch(&self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let device = self.word_embeddings.device();
        let batch = sequences.len();
        let seq_len = sequences.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let hidden = self.config.hidden_size;

        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        for seq in sequences {
            ids.extend_from_slice(seq);
            ids.extend(std::iter::repeat(PAD_TOKEN_ID).take(seq_len - seq.len()));
            mask.extend(std::iter::repeat(1.0f32).take(seq.len()));
            mask.extend(std::iter::repeat(0.0f32).take(seq_len - seq.len()));
        }

        let ids = Tensor::from_vec(ids, batch * seq_len, device)?;
        let mask = Tensor::from_vec(mask, (batch, seq_len), device)?;

        let word = self
            .word_embeddings
            .index_select(&ids, 0)?
            .reshape((batch, seq_len, hidden))?;
        let position = self.position_embeddings.narrow(0, 0, seq_len)?;
        let token_type = self.token_type_embeddings.get(0)?;

        let mut x = word.broadcast_add(&position)?.broadcast_add(&token_type)?;
        x = self.embedding_norm.forward(&x)?;

        let mask_bias = mask
            .affine(10_000.0, -10_000.0)?
            .reshape((batch, 1, 1, seq_len))?;
        for layer in &self.layers {
            x = layer.forward(&x, &mask_bias)?;
        }

        // Masked mean pooling + L2 normalisation
        let summed = x.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
        let counts = mask.sum_keepdim(1)?.clamp(1.0f32, f32::MAX)?;
        let pooled = summed.broadcast_div(&counts)?;
        let norms = pooled
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12f32, f32::MAX)?;

        Ok(pooled.broadcast_div(&norms)?.to_vec2::<f32>()?)
    }
}

// ---------------------------------------------------------------------------
// Public MiniLmEmbeddingProvider
// ---------------------------------------------------------------------------

/// Local `all-MiniLM-L6-v2` sentence embeddings on the CPU.
pub struct MiniLmEmbeddingProvider {
    model: MiniLmModel,
    tokenizer: tokenizers::Tokenizer,
}

impl MiniLmEmbeddingProvider {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let model = MiniLmModel::load(model_path, &Device::Cpu)
            .with_context(|| format!("load model {}", model_path.display()))?;

        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("load tokenizer {}: {e}", tokenizer_path.display()))?;

        Ok(Self { model, tokenizer })
    }

    fn token_ids(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenize: {e}"))?;
        let mut ids = encoding.get_ids().to_vec();

        // Keep [CLS] .. [SEP] framing when truncating.
        let max = self.model.config.max_position_embeddings;
        if ids.len() > max {
            let sep = ids[ids.len() - 1];
            ids.truncate(max - 1);
            ids.push(sep);
        }
        Ok(ids)
    }
}

impl EmbeddingProvider for MiniLmEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let ids = self.token_ids(text)?;
        self.model
            .forward_batch(&[ids])?
            .pop()
            .ok_or_else(|| anyhow!("model returned no embedding"))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let ids = chunk
                .iter()
                .map(|t| self.token_ids(t))
                .collect::<Result<Vec<_>>>()?;
            out.extend(self.model.forward_batch(&ids)?);
            debug!(done = out.len(), total = texts.len(), "embedded batch");
        }
        Ok(out)
    }
}
