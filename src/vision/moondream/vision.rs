// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Moondream2 multi-crop vision encoder
//!
//! A SigLIP vision transformer runs over one global 378×378 view of the
//! image plus every 378×378 crop of the full-resolution canvas. Crop
//! features are stitched back into a grid and pooled to the global token
//! grid. Global and crop features are concatenated per token, then an MLP
//! projects them into the text model's embedding space.
//!
//! Weight names follow the `vision_encoder.*` tensors of the
//! `vikhyatk/moondream2` safetensors.

use candle_core::{bail, IndexOp, Module, Result, Tensor, D};
use candle_nn::{layer_norm, linear_b, Activation, LayerNorm, Linear, VarBuilder};

use super::preprocessing::CROP_SIZE;

/// Side of a ViT patch in pixels
const PATCH_SIZE: usize = 14;

/// Tokens per side of one crop: 378 / 14
pub const TOKEN_GRID: usize = CROP_SIZE as usize / PATCH_SIZE;

/// Vision tower dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct VisionConfig {
    /// Width of ViT tokens
    pub embed_dim: usize,
    /// Tokens per crop, `TOKEN_GRID²`
    pub embed_len: usize,
    pub num_blocks: usize,
    pub num_heads: usize,
    /// Hidden width of the ViT block MLP
    pub hidden_features: usize,
    /// Hidden width of the projection MLP
    pub projection_hidden_dim: usize,
    /// Text model embedding width
    pub model_dim: usize,
}

impl VisionConfig {
    /// SigLIP-so400m tower with the 2×1152 projection of the 2024-08-26 snapshot
    pub fn moondream2() -> Self {
        Self {
            embed_dim: 1152,
            embed_len: TOKEN_GRID * TOKEN_GRID,
            num_blocks: 27,
            num_heads: 16,
            hidden_features: 4304,
            projection_hidden_dim: 2048 * 4,
            model_dim: 2048,
        }
    }
}

struct Mlp {
    fc1: Linear,
    fc2: Linear,
}

impl Mlp {
    fn new(vb: VarBuilder, in_dim: usize, hidden_dim: usize, out_dim: usize) -> Result<Self> {
        Ok(Self {
            fc1: linear_b(in_dim, hidden_dim, true, vb.pp("fc1"))?,
            fc2: linear_b(hidden_dim, out_dim, true, vb.pp("fc2"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        xs.apply(&self.fc1)?
            .apply(&Activation::GeluPytorchTanh)?
            .apply(&self.fc2)
    }
}

struct Attention {
    num_heads: usize,
    head_dim: usize,
    qkv: Linear,
    proj: Linear,
}

impl Attention {
    fn new(vb: VarBuilder, dim: usize, num_heads: usize) -> Result<Self> {
        Ok(Self {
            num_heads,
            head_dim: dim / num_heads,
            qkv: linear_b(dim, dim * 3, true, vb.pp("qkv"))?,
            proj: linear_b(dim, dim, true, vb.pp("proj"))?,
        })
    }
}

impl Module for Attention {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, n, c) = xs.dims3()?;
        let qkv = xs
            .apply(&self.qkv)?
            .reshape((b, n, 3, self.num_heads, self.head_dim))?
            .permute((2, 0, 3, 1, 4))?;
        let q = qkv.i(0)?.contiguous()?;
        let k = qkv.i(1)?.contiguous()?;
        let v = qkv.i(2)?.contiguous()?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let weights = (q.matmul(&k.t()?)? * scale)?;
        candle_nn::ops::softmax_last_dim(&weights)?
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((b, n, c))?
            .apply(&self.proj)
    }
}

struct Block {
    norm1: LayerNorm,
    attn: Attention,
    norm2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn new(vb: VarBuilder, cfg: &VisionConfig) -> Result<Self> {
        Ok(Self {
            norm1: layer_norm(cfg.embed_dim, 1e-5, vb.pp("norm1"))?,
            attn: Attention::new(vb.pp("attn"), cfg.embed_dim, cfg.num_heads)?,
            norm2: layer_norm(cfg.embed_dim, 1e-5, vb.pp("norm2"))?,
            mlp: Mlp::new(vb.pp("mlp"), cfg.embed_dim, cfg.hidden_features, cfg.embed_dim)?,
        })
    }
}

impl Module for Block {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = (xs + xs.apply(&self.norm1)?.apply(&self.attn)?)?;
        &xs + xs.apply(&self.norm2)?.apply(&self.mlp)?
    }
}

/// SigLIP transformer over a batch of `[B, 3, 378, 378]` crops
struct VisionTransformer {
    patch_embed: Linear,
    pos_embed: Tensor,
    blocks: Vec<Block>,
    norm: LayerNorm,
}

impl VisionTransformer {
    fn new(vb: VarBuilder, cfg: &VisionConfig) -> Result<Self> {
        let patch_embed = linear_b(
            3 * PATCH_SIZE * PATCH_SIZE,
            cfg.embed_dim,
            true,
            vb.pp("patch_embed.linear"),
        )?;
        let pos_embed = vb.get((1, cfg.embed_len, cfg.embed_dim), "pos_embed")?;
        let blocks = (0..cfg.num_blocks)
            .map(|i| Block::new(vb.pp("blocks").pp(i), cfg))
            .collect::<Result<Vec<_>>>()?;
        let norm = layer_norm(cfg.embed_dim, 1e-5, vb.pp("norm"))?;

        Ok(Self {
            patch_embed,
            pos_embed,
            blocks,
            norm,
        })
    }
}

impl Module for VisionTransformer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, c, height, width) = xs.dims4()?;
        let (h, w) = (height / PATCH_SIZE, width / PATCH_SIZE);
        let mut xs = xs
            .reshape((b, c, h, PATCH_SIZE, w, PATCH_SIZE))?
            .permute((0, 2, 4, 1, 3, 5))?
            .reshape((b, h * w, c * PATCH_SIZE * PATCH_SIZE))?
            .apply(&self.patch_embed)?
            .broadcast_add(&self.pos_embed)?;
        for block in &self.blocks {
            xs = xs.apply(block)?;
        }
        xs.apply(&self.norm)
    }
}

/// Moondream2 vision encoder with multi-crop feature fusion
pub struct VisionEncoder {
    transformer: VisionTransformer,
    projection: Mlp,
}

impl VisionEncoder {
    pub fn new(cfg: &VisionConfig, vb: VarBuilder) -> Result<Self> {
        let transformer = VisionTransformer::new(vb.pp("encoder.model.visual"), cfg)?;
        let projection = Mlp::new(
            vb.pp("projection.mlp"),
            cfg.embed_dim * 2,
            cfg.projection_hidden_dim,
            cfg.model_dim,
        )?;
        Ok(Self {
            transformer,
            projection,
        })
    }

    /// Global and crop features of a `[3, H, W]` canvas, `[1, tokens, 2 * embed_dim]`
    pub fn features(&self, pixels: &Tensor) -> Result<Tensor> {
        let (_, height, width) = pixels.dims3()?;
        let crop = CROP_SIZE as usize;
        if height % crop != 0 || width % crop != 0 {
            bail!("canvas {height}x{width} is not a multiple of {crop}");
        }
        let (rows, cols) = (height / crop, width / crop);

        // Canvas sides are 1 or 2 crops, so bilinear downscaling is an average pool
        let global = pixels.unsqueeze(0)?;
        let global = if rows * cols > 1 {
            global.avg_pool2d_with_stride((rows, cols), (rows, cols))?
        } else {
            global
        };

        let mut batch = vec![global];
        if rows * cols > 1 {
            for r in 0..rows {
                for c in 0..cols {
                    let tile = pixels.narrow(1, r * crop, crop)?.narrow(2, c * crop, crop)?;
                    batch.push(tile.unsqueeze(0)?);
                }
            }
        }

        let encoded = Tensor::cat(&batch, 0)?.apply(&self.transformer)?;
        let global_features = encoded.i(0..1)?;
        let crop_features = if rows * cols > 1 {
            merge_crop_grid(&encoded.i(1..)?, rows, cols)?
        } else {
            global_features.clone()
        };

        Tensor::cat(&[&global_features, &crop_features], D::Minus1)
    }
}

impl Module for VisionEncoder {
    /// Image embeddings `[1, tokens, model_dim]` for a `[3, H, W]` canvas
    fn forward(&self, pixels: &Tensor) -> Result<Tensor> {
        self.features(pixels)?.apply(&self.projection)
    }
}

/// Stitch `rows × cols` crop features `[n, tokens, C]` (row-major) into one
/// grid and pool it back to `[1, tokens, C]`
pub fn merge_crop_grid(crop_features: &Tensor, rows: usize, cols: usize) -> Result<Tensor> {
    let (n, tokens, channels) = crop_features.dims3()?;
    if n != rows * cols {
        bail!("expected {} crops for a {rows}x{cols} grid, got {n}", rows * cols);
    }
    if tokens != TOKEN_GRID * TOKEN_GRID {
        bail!("expected {} tokens per crop, got {tokens}", TOKEN_GRID * TOKEN_GRID);
    }

    let maps = crop_features
        .transpose(1, 2)?
        .reshape((n, channels, TOKEN_GRID, TOKEN_GRID))?;
    let grid_rows = (0..rows)
        .map(|r| {
            let row = (0..cols)
                .map(|c| maps.get(r * cols + c))
                .collect::<Result<Vec<_>>>()?;
            Tensor::cat(&row, 2)
        })
        .collect::<Result<Vec<_>>>()?;

    Tensor::cat(&grid_rows, 1)?
        .unsqueeze(0)?
        .avg_pool2d_with_stride((rows, cols), (rows, cols))?
        .reshape((1, channels, tokens))?
        .transpose(1, 2)?
        .contiguous()
}
