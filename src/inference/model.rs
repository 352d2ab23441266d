//! Quantized GGUF causal language model.
//!
//! A decoder-only transformer forward pass that keeps a per-layer KV cache and projects
//! the final position through the LM head. Supports the `qwen2` layout (separate Q/K/V
//! projections with biases, SwiGLU with separate gate/up) and the `phi3` layout (fused
//! QKV, fused gate+up, partial rotary dimension, optional LongRoPE factor tables).

use std::sync::Arc;

use candle_core::quantized::{QMatMul, gguf_file};
use candle_core::{D, Device, Module, Result, Tensor};
use candle_nn::RmsNorm;
use tracing::debug;

/// `general.architecture` values whose tensor layout [`CausalLm`] knows how to run.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["qwen2", "phi3"];

const ROPE_FACTORS_SHORT: &str = "rope_factors_short.weight";
const ROPE_FACTORS_LONG: &str = "rope_factors_long.weight";

/// Transformer hyperparameters read from GGUF metadata.
#[derive(Debug, Clone)]
pub struct CausalLmConfig {
    pub architecture: String,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub num_attention_heads: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
    pub rotary_dim: usize,
    pub intermediate_size: usize,
    pub rms_norm_eps: f64,
    pub rope_theta: f64,
    pub context_length: usize,
    /// Context the rotary base was trained for. Equals `context_length` unless the
    /// model was extended with LongRoPE.
    pub original_context_length: usize,
    /// Explicit cos/sin magnitude correction for scaled rotary tables.
    pub rope_attn_factor: Option<f64>,
}

/// GGUF writers store floats as F32; accept F64 as well.
fn metadata_f64(value: &gguf_file::Value) -> Option<f64> {
    value
        .to_f32()
        .map(f64::from)
        .or_else(|_| value.to_f64())
        .ok()
}

impl CausalLmConfig {
    /// Reads `{arch}.*` keys, where `arch` comes from `general.architecture` and must be
    /// one of [`SUPPORTED_ARCHITECTURES`].
    pub fn from_gguf(content: &gguf_file::Content) -> Result<Self> {
        let architecture = match content.metadata.get("general.architecture") {
            Some(value) => value.to_string()?.clone(),
            None => candle_core::bail!("GGUF metadata has no general.architecture"),
        };
        if !SUPPORTED_ARCHITECTURES.contains(&architecture.as_str()) {
            candle_core::bail!(
                "unsupported architecture {architecture:?}, expected one of {SUPPORTED_ARCHITECTURES:?}"
            );
        }

        let get = |key: &str| content.metadata.get(&format!("{architecture}.{key}"));
        let get_u64 = |key: &str, default: u64| -> u64 {
            get(key).and_then(|v| v.to_u64().ok()).unwrap_or(default)
        };
        let get_f64 = |key: &str, default: f64| -> f64 {
            get(key).and_then(metadata_f64).unwrap_or(default)
        };

        let hidden_size = get_u64("embedding_length", 3072) as usize;
        let num_layers = get_u64("block_count", 32) as usize;
        let num_attention_heads = get_u64("attention.head_count", 24) as usize;
        let num_kv_heads = get_u64("attention.head_count_kv", num_attention_heads as u64) as usize;
        let intermediate_size = get_u64("feed_forward_length", 8192) as usize;
        let rms_norm_eps = get_f64("attention.layer_norm_rms_epsilon", 1e-5);
        let rope_theta = get_f64("rope.freq_base", 10_000.0);
        let context_length = get_u64("context_length", 4096) as usize;
        let original_context_length =
            get_u64("rope.scaling.original_context_length", context_length as u64) as usize;
        let rope_attn_factor = get("rope.scaling.attn_factor").and_then(metadata_f64);

        if num_attention_heads == 0 || num_kv_heads == 0 {
            candle_core::bail!("GGUF metadata declares zero attention heads");
        }
        if num_attention_heads % num_kv_heads != 0 {
            candle_core::bail!(
                "{num_attention_heads} attention heads cannot share {num_kv_heads} KV heads"
            );
        }
        if original_context_length == 0 {
            candle_core::bail!("GGUF metadata declares a zero original context length");
        }
        let head_dim = hidden_size / num_attention_heads;
        let rotary_dim = get_u64("rope.dimension_count", head_dim as u64) as usize;
        if rotary_dim == 0 || rotary_dim > head_dim || rotary_dim % 2 != 0 {
            candle_core::bail!("invalid rotary dimension {rotary_dim} for head_dim {head_dim}");
        }

        Ok(Self {
            architecture,
            hidden_size,
            num_layers,
            num_attention_heads,
            num_kv_heads,
            head_dim,
            rotary_dim,
            intermediate_size,
            rms_norm_eps,
            rope_theta,
            context_length,
            original_context_length,
            rope_attn_factor,
        })
    }

    /// Whether the declared context goes past the trained rotary context.
    pub fn is_context_extended(&self) -> bool {
        self.context_length > self.original_context_length
    }
}

/// LongRoPE rescaling: one divisor per rotary frequency plus a magnitude correction
/// applied to both cos and sin.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RopeScaling {
    pub(crate) factors: Vec<f32>,
    pub(crate) attn_factor: f64,
}

impl RopeScaling {
    /// `sqrt(1 + ln(s) / ln(original))` for `s = context_length / original`, or 1 when
    /// the context is not extended.
    pub(crate) fn default_attn_factor(context_length: usize, original_context_length: usize) -> f64 {
        let scale = context_length as f64 / original_context_length as f64;
        if scale <= 1.0 || original_context_length < 2 {
            return 1.0;
        }
        (1.0 + scale.ln() / (original_context_length as f64).ln()).sqrt()
    }
}

/// Rotary position tables covering `[0, max_positions)`.
pub(crate) struct RotaryEmbedding {
    cos: Tensor,
    sin: Tensor,
    rotary_dim: usize,
}

impl RotaryEmbedding {
    pub(crate) fn new(
        rope_theta: f64,
        rotary_dim: usize,
        max_positions: usize,
        scaling: Option<&RopeScaling>,
        device: &Device,
    ) -> Result<Self> {
        let half_dim = rotary_dim / 2;
        let factor_count = scaling.map_or(half_dim, |s| s.factors.len());
        if factor_count != half_dim {
            candle_core::bail!("expected {half_dim} rope scaling factors, found {factor_count}");
        }

        let inv_freq: Vec<f32> = (0..half_dim)
            .map(|i| {
                let factor = scaling.map_or(1.0, |s| s.factors[i]);
                1.0 / (factor * (rope_theta as f32).powf((2 * i) as f32 / rotary_dim as f32))
            })
            .collect();

        let inv_freq = Tensor::new(inv_freq, device)?;
        let positions: Vec<f32> = (0..max_positions).map(|p| p as f32).collect();
        let positions = Tensor::new(positions, device)?;

        // [max_positions, half_dim]
        let freqs = positions.unsqueeze(1)?.matmul(&inv_freq.unsqueeze(0)?)?;
        // [max_positions, rotary_dim]
        let freqs = Tensor::cat(&[&freqs, &freqs], D::Minus1)?;

        let attn_factor = scaling.map_or(1.0, |s| s.attn_factor);
        Ok(Self {
            cos: (freqs.cos()? * attn_factor)?,
            sin: (freqs.sin()? * attn_factor)?,
            rotary_dim,
        })
    }

    pub(crate) fn max_positions(&self) -> usize {
        self.cos.dims()[0]
    }

    /// Rotates the first `rotary_dim` channels of `x` (`[batch, heads, seq, head_dim]`)
    /// for positions starting at `seq_start`; the remaining channels pass through.
    pub(crate) fn apply(&self, x: &Tensor, seq_start: usize) -> Result<Tensor> {
        let (_batch, _heads, seq_len, head_dim) = x.dims4()?;

        let cos = self.cos.narrow(0, seq_start, seq_len)?;
        let sin = self.sin.narrow(0, seq_start, seq_len)?;
        let cos = cos.unsqueeze(0)?.unsqueeze(0)?;
        let sin = sin.unsqueeze(0)?.unsqueeze(0)?;

        let (rot, pass) = if self.rotary_dim < head_dim {
            (
                x.narrow(D::Minus1, 0, self.rotary_dim)?,
                Some(x.narrow(D::Minus1, self.rotary_dim, head_dim - self.rotary_dim)?),
            )
        } else {
            (x.clone(), None)
        };

        let half = self.rotary_dim / 2;
        let x1 = rot.narrow(D::Minus1, 0, half)?;
        let x2 = rot.narrow(D::Minus1, half, half)?;
        let rotated_half = Tensor::cat(&[&x2.neg()?, &x1], D::Minus1)?;
        let rotated = (rot.broadcast_mul(&cos)? + rotated_half.broadcast_mul(&sin)?)?;

        match pass {
            Some(pass) => Tensor::cat(&[&rotated, &pass], D::Minus1),
            None => Ok(rotated),
        }
    }
}

enum Projection {
    Split {
        q: QMatMul,
        k: QMatMul,
        v: QMatMul,
        q_bias: Option<Tensor>,
        k_bias: Option<Tensor>,
        v_bias: Option<Tensor>,
    },
    Fused(QMatMul),
}

enum FeedForward {
    Split { gate: QMatMul, up: QMatMul },
    Fused(QMatMul),
}

struct DecoderLayer {
    qkv: Projection,
    attn_o: QMatMul,
    attn_norm: RmsNorm,
    ffn_norm: RmsNorm,
    ffn: FeedForward,
    ffn_down: QMatMul,
    num_heads: usize,
    num_kv_heads: usize,
    head_dim: usize,
    intermediate_size: usize,
    kv_cache: Option<(Tensor, Tensor)>,
}

impl DecoderLayer {
    fn load(
        content: &gguf_file::Content,
        file: &mut std::fs::File,
        device: &Device,
        config: &CausalLmConfig,
        layer_idx: usize,
    ) -> Result<Self> {
        let prefix = format!("blk.{layer_idx}");
        let has = |name: &str| content.tensor_infos.contains_key(name);

        let fused_qkv = format!("{prefix}.attn_qkv.weight");
        let qkv = if has(&fused_qkv) {
            Projection::Fused(load_qmatmul(content, file, &fused_qkv, device)?)
        } else {
            Projection::Split {
                q: load_qmatmul(content, file, &format!("{prefix}.attn_q.weight"), device)?,
                k: load_qmatmul(content, file, &format!("{prefix}.attn_k.weight"), device)?,
                v: load_qmatmul(content, file, &format!("{prefix}.attn_v.weight"), device)?,
                q_bias: load_bias(content, file, &format!("{prefix}.attn_q.bias"), device),
                k_bias: load_bias(content, file, &format!("{prefix}.attn_k.bias"), device),
                v_bias: load_bias(content, file, &format!("{prefix}.attn_v.bias"), device),
            }
        };

        let gate_name = format!("{prefix}.ffn_gate.weight");
        let up = load_qmatmul(content, file, &format!("{prefix}.ffn_up.weight"), device)?;
        let ffn = if has(&gate_name) {
            FeedForward::Split {
                gate: load_qmatmul(content, file, &gate_name, device)?,
                up,
            }
        } else {
            FeedForward::Fused(up)
        };

        Ok(Self {
            qkv,
            attn_o: load_qmatmul(content, file, &format!("{prefix}.attn_output.weight"), device)?,
            attn_norm: load_rms_norm(
                content,
                file,
                &format!("{prefix}.attn_norm.weight"),
                device,
                config.rms_norm_eps,
            )?,
            ffn_norm: load_rms_norm(
                content,
                file,
                &format!("{prefix}.ffn_norm.weight"),
                device,
                config.rms_norm_eps,
            )?,
            ffn,
            ffn_down: load_qmatmul(content, file, &format!("{prefix}.ffn_down.weight"), device)?,
            num_heads: config.num_attention_heads,
            num_kv_heads: config.num_kv_heads,
            head_dim: config.head_dim,
            intermediate_size: config.intermediate_size,
            kv_cache: None,
        })
    }

    fn forward(
        &mut self,
        x: &Tensor,
        mask: Option<&Tensor>,
        rope: &RotaryEmbedding,
        seq_start: usize,
    ) -> Result<Tensor> {
        let residual = x;
        let h = self.attn_norm.forward(x)?;
        let h = self.self_attention(&h, mask, rope, seq_start)?;
        let x = (residual + h)?;

        let residual = &x;
        let h = self.ffn_norm.forward(&x)?;
        let h = match &self.ffn {
            FeedForward::Split { gate, up } => {
                (candle_nn::ops::silu(&gate.forward(&h)?)? * up.forward(&h)?)?
            }
            FeedForward::Fused(gate_up) => {
                let gate_up = gate_up.forward(&h)?;
                let gate = gate_up.narrow(D::Minus1, 0, self.intermediate_size)?;
                let up = gate_up.narrow(D::Minus1, self.intermediate_size, self.intermediate_size)?;
                (candle_nn::ops::silu(&gate)? * up)?
            }
        };
        let h = self.ffn_down.forward(&h)?;

        residual + h
    }

    fn project_qkv(&self, x: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        match &self.qkv {
            Projection::Split {
                q,
                k,
                v,
                q_bias,
                k_bias,
                v_bias,
            } => {
                let with_bias = |t: Tensor, bias: &Option<Tensor>| match bias {
                    Some(bias) => t.broadcast_add(bias),
                    None => Ok(t),
                };
                Ok((
                    with_bias(q.forward(x)?, q_bias)?,
                    with_bias(k.forward(x)?, k_bias)?,
                    with_bias(v.forward(x)?, v_bias)?,
                ))
            }
            Projection::Fused(qkv) => {
                let qkv = qkv.forward(x)?;
                let q_size = self.num_heads * self.head_dim;
                let kv_size = self.num_kv_heads * self.head_dim;
                Ok((
                    qkv.narrow(D::Minus1, 0, q_size)?,
                    qkv.narrow(D::Minus1, q_size, kv_size)?,
                    qkv.narrow(D::Minus1, q_size + kv_size, kv_size)?,
                ))
            }
        }
    }

    fn self_attention(
        &mut self,
        x: &Tensor,
        mask: Option<&Tensor>,
        rope: &RotaryEmbedding,
        seq_start: usize,
    ) -> Result<Tensor> {
        let (batch, seq_len, _hidden) = x.dims3()?;
        let (q, k, v) = self.project_qkv(x)?;

        // [batch, seq, heads * head_dim] -> [batch, heads, seq, head_dim]
        let q = q
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let k = k
            .reshape((batch, seq_len, self.num_kv_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let v = v
            .reshape((batch, seq_len, self.num_kv_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;

        let q = rope.apply(&q, seq_start)?;
        let k = rope.apply(&k, seq_start)?;

        let (k, v) = match &self.kv_cache {
            Some((cached_k, cached_v)) if seq_start > 0 => (
                Tensor::cat(&[cached_k, &k], 2)?,
                Tensor::cat(&[cached_v, &v], 2)?,
            ),
            _ => (k, v),
        };
        self.kv_cache = Some((k.clone(), v.clone()));

        let k = self.repeat_kv(k)?;
        let v = self.repeat_kv(v)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let attn = (q.matmul(&k.t()?)? * scale)?;
        let attn = match mask {
            Some(mask) => attn.broadcast_add(mask)?,
            None => attn,
        };
        let attn = candle_nn::ops::softmax_last_dim(&attn)?;
        let out = attn.matmul(&v)?;

        let out = out
            .transpose(1, 2)?
            .reshape((batch, seq_len, self.num_heads * self.head_dim))?;

        self.attn_o.forward(&out)
    }

    fn repeat_kv(&self, x: Tensor) -> Result<Tensor> {
        let n_rep = self.num_heads / self.num_kv_heads;
        if n_rep == 1 {
            return Ok(x);
        }
        let (batch, num_kv_heads, seq_len, head_dim) = x.dims4()?;
        x.unsqueeze(2)?
            .expand((batch, num_kv_heads, n_rep, seq_len, head_dim))?
            .reshape((batch, num_kv_heads * n_rep, seq_len, head_dim))
    }
}

fn load_qmatmul(
    content: &gguf_file::Content,
    file: &mut std::fs::File,
    name: &str,
    device: &Device,
) -> Result<QMatMul> {
    let qtensor = content.tensor(file, name, device)?;
    QMatMul::from_arc(Arc::new(qtensor))
}

fn load_bias(
    content: &gguf_file::Content,
    file: &mut std::fs::File,
    name: &str,
    device: &Device,
) -> Option<Tensor> {
    content
        .tensor(file, name, device)
        .ok()
        .and_then(|qt| qt.dequantize(device).ok())
}

/// Picks the LongRoPE factor table for a context of `max_positions`: the long table past
/// the original context, the short one otherwise. `None` when the model carries neither.
fn load_rope_scaling(
    content: &gguf_file::Content,
    file: &mut std::fs::File,
    device: &Device,
    config: &CausalLmConfig,
    max_positions: usize,
) -> Result<Option<RopeScaling>> {
    let has = |name: &str| content.tensor_infos.contains_key(name);
    if !has(ROPE_FACTORS_SHORT) && !has(ROPE_FACTORS_LONG) {
        if config.is_context_extended() {
            candle_core::bail!(
                "{} context of {} extends the original {} but the file has no rope factors",
                config.architecture,
                config.context_length,
                config.original_context_length
            );
        }
        return Ok(None);
    }

    let name = if max_positions > config.original_context_length {
        ROPE_FACTORS_LONG
    } else {
        ROPE_FACTORS_SHORT
    };
    let factors = content
        .tensor(file, name, device)?
        .dequantize(device)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    let attn_factor = config.rope_attn_factor.unwrap_or_else(|| {
        RopeScaling::default_attn_factor(config.context_length, config.original_context_length)
    });

    debug!(
        table = name,
        factors = factors.len(),
        attn_factor,
        "Applying LongRoPE scaling"
    );

    Ok(Some(RopeScaling {
        factors,
        attn_factor,
    }))
}

fn load_rms_norm(
    content: &gguf_file::Content,
    file: &mut std::fs::File,
    name: &str,
    device: &Device,
    eps: f64,
) -> Result<RmsNorm> {
    let weight = content.tensor(file, name, device)?.dequantize(device)?;
    Ok(RmsNorm::new(weight, eps))
}

/// Causal LM with an incremental KV cache.
pub struct CausalLm {
    tok_embeddings: Tensor,
    layers: Vec<DecoderLayer>,
    final_norm: RmsNorm,
    lm_head: QMatMul,
    rope: RotaryEmbedding,
    config: CausalLmConfig,
    vocab_size: usize,
    device: Device,
}

impl CausalLm {
    /// Loads weights from GGUF. Rotary tables are sized for `max_positions`, capped at
    /// the model's context length.
    pub fn from_gguf(
        content: gguf_file::Content,
        file: &mut std::fs::File,
        device: &Device,
        max_positions: usize,
    ) -> Result<Self> {
        let config = CausalLmConfig::from_gguf(&content)?;

        let tok_embeddings = content
            .tensor(file, "token_embd.weight", device)?
            .dequantize(device)?;
        let (vocab_size, _hidden) = tok_embeddings.dims2()?;

        let mut layers = Vec::with_capacity(config.num_layers);
        for layer_idx in 0..config.num_layers {
            layers.push(DecoderLayer::load(
                &content, file, device, &config, layer_idx,
            )?);
        }

        let final_norm = load_rms_norm(
            &content,
            file,
            "output_norm.weight",
            device,
            config.rms_norm_eps,
        )?;

        // Tied embeddings ship without a separate output projection.
        let lm_head = if content.tensor_infos.contains_key("output.weight") {
            load_qmatmul(&content, file, "output.weight", device)?
        } else {
            load_qmatmul(&content, file, "token_embd.weight", device)?
        };

        let max_positions = max_positions.min(config.context_length);
        let scaling = load_rope_scaling(&content, file, device, &config, max_positions)?;
        let rope = RotaryEmbedding::new(
            config.rope_theta,
            config.rotary_dim,
            max_positions,
            scaling.as_ref(),
            device,
        )?;

        Ok(Self {
            tok_embeddings,
            layers,
            final_norm,
            lm_head,
            rope,
            config,
            vocab_size,
            device: device.clone(),
        })
    }

    /// Feeds `input_ids` (`[batch, seq]`) at positions `seq_start..` and returns the
    /// logits of the final position as `[batch, 1, vocab]`.
    ///
    /// `seq_start == 0` starts a fresh context and overwrites the cache.
    pub fn forward(&mut self, input_ids: &Tensor, seq_start: usize) -> Result<Tensor> {
        let (batch, seq_len) = input_ids.dims2()?;
        if seq_start + seq_len > self.rope.max_positions() {
            candle_core::bail!(
                "position {} exceeds the {} positions this model was loaded for",
                seq_start + seq_len,
                self.rope.max_positions()
            );
        }

        let flat_ids = input_ids.flatten_all()?;
        let mut hidden = self.tok_embeddings.index_select(&flat_ids, 0)?;
        hidden = hidden.reshape((batch, seq_len, self.config.hidden_size))?;

        let mask = if seq_len > 1 {
            Some(self.causal_mask(seq_len, seq_start)?)
        } else {
            None
        };

        for layer in self.layers.iter_mut() {
            hidden = layer.forward(&hidden, mask.as_ref(), &self.rope, seq_start)?;
        }

        let last = hidden.narrow(1, seq_len - 1, 1)?;
        let last = self.final_norm.forward(&last)?;
        self.lm_head.forward(&last)
    }

    pub fn clear_kv_cache(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.kv_cache = None;
        }
    }

    /// `[1, 1, seq_len, seq_start + seq_len]` mask; query `i` sees keys `..= seq_start + i`.
    fn causal_mask(&self, seq_len: usize, seq_start: usize) -> Result<Tensor> {
        create_causal_mask(seq_len, seq_start, &self.device)
    }

    pub fn config(&self) -> &CausalLmConfig {
        &self.config
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn max_positions(&self) -> usize {
        self.rope.max_positions()
    }
}

pub(crate) fn create_causal_mask(
    seq_len: usize,
    seq_start: usize,
    device: &Device,
) -> Result<Tensor> {
    let total = seq_start + seq_len;
    let mask: Vec<f32> = (0..seq_len)
        .flat_map(|i| {
            (0..total).map(move |j| {
                if j <= seq_start + i {
                    0.0
                } else {
                    f32::NEG_INFINITY
                }
            })
        })
        .collect();

    Tensor::from_vec(mask, (1, 1, seq_len, total), device)
}
