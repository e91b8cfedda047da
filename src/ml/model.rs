// ============================================================
// Layer 5b — Colorization Network
// ============================================================
// luma [N,1,H,W] + conditioning [N,3,H,W] → chroma [N,2,H,W]
//
//   ConditioningFusion  — input stem; conditioning is added through a
//                         zero-initialised projection
//   UNetColorizer       — conv encoder/decoder, skips, global context
//   AttentionColorizer  — strided stem → transformer encoder over
//                         quarter-resolution tokens → conv decoder
//
// Reference: Ronneberger et al. (2015) U-Net; Vaswani et al. (2017)

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Initializer,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::{
        activation::{gelu, relu},
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};
use serde::{Deserialize, Serialize};

use crate::data::batcher::{chroma_frames, FrameBatcher};
use crate::domain::error::{ColorizeError, ColorizeResult};
use crate::domain::frame::{ChromaFrame, LumaFrame, Resolution};
use crate::temporal::propagator::Conditioning;

/// Luma (1) in, chroma (2) out, conditioning = warped chroma (2) + mask (1).
pub const CONDITIONING_CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    #[serde(rename = "unet")]
    UNet,
    Attention,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct ColorizerConfig {
    pub architecture:  Architecture,
    pub frame_height:  usize,
    pub frame_width:   usize,
    pub base_channels: usize,
    /// Token width of the attention variant (ignored by the U-Net)
    pub d_model:       usize,
    pub num_heads:     usize,
    pub num_layers:    usize,
    pub dropout:       f64,
}

impl ColorizerConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.frame_height, self.frame_width)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ColorizationNetwork<B> {
        match self.architecture {
            Architecture::UNet      => ColorizationNetwork::UNet(self.init_unet(device)),
            Architecture::Attention => ColorizationNetwork::Attention(self.init_attention(device)),
        }
    }

    fn init_fusion<B: Backend>(&self, device: &B::Device) -> ConditioningFusion<B> {
        let c = self.base_channels;
        ConditioningFusion {
            luma_stem: conv3x3(1, c, device),
            // Zero projection: an untrained network ignores conditioning
            // entirely and starts out as a per-frame colorizer.
            cond_proj: Conv2dConfig::new([CONDITIONING_CHANNELS, c], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_initializer(Initializer::Zeros)
                .init(device),
        }
    }

    fn init_unet<B: Backend>(&self, device: &B::Device) -> UNetColorizer<B> {
        let c = self.base_channels;
        UNetColorizer {
            fusion:     self.init_fusion(device),
            enc1:       conv3x3(c, c, device),
            down1:      conv_down(c, 2 * c, device),
            down2:      conv_down(2 * c, 4 * c, device),
            bottleneck: conv3x3(4 * c, 4 * c, device),
            global:     Conv2dConfig::new([4 * c, 4 * c], [1, 1]).init(device),
            up2:        conv3x3(4 * c + 2 * c, 2 * c, device),
            up1:        conv3x3(2 * c + c, c, device),
            head:       Conv2dConfig::new([c, 2], [1, 1]).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
        }
    }

    fn init_attention<B: Backend>(&self, device: &B::Device) -> AttentionColorizer<B> {
        let c = self.base_channels;
        let tokens = downsampled(self.frame_height) * downsampled(self.frame_width);
        let layers = (0..self.num_layers).map(|_| self.build_encoder_block(device)).collect();
        AttentionColorizer {
            fusion:             self.init_fusion(device),
            down1:              conv_down(c, 2 * c, device),
            down2:              conv_down(2 * c, self.d_model, device),
            position_embedding: EmbeddingConfig::new(tokens, self.d_model).init(device),
            layers,
            final_norm:         LayerNormConfig::new(self.d_model).init(device),
            refine:             conv3x3(self.d_model + c, c, device),
            head:               Conv2dConfig::new([c, 2], [1, 1]).init(device),
            dropout:            DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, 4 * self.d_model).init(device);
        let ffn_linear2 = LinearConfig::new(4 * self.d_model, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

/// Spatial size after one stride-2, pad-1, 3×3 convolution, applied twice.
fn downsampled(size: usize) -> usize {
    size.div_ceil(2).div_ceil(2)
}

fn conv3x3<B: Backend>(cin: usize, cout: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([cin, cout], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

fn conv_down<B: Backend>(cin: usize, cout: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([cin, cout], [3, 3])
        .with_stride([2, 2])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

fn upsample<B: Backend>(x: Tensor<B, 4>, height: usize, width: usize) -> Tensor<B, 4> {
    interpolate(x, [height, width], InterpolateOptions::new(InterpolateMode::Nearest))
}

// ─── Conditioning fusion ──────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ConditioningFusion<B: Backend> {
    pub luma_stem: Conv2d<B>,
    pub cond_proj: Conv2d<B>,
}

impl<B: Backend> ConditioningFusion<B> {
    /// luma [N,1,H,W] + conditioning [N,3,H,W] → features [N,C,H,W]
    pub fn forward(&self, luma: Tensor<B, 4>, conditioning: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.luma_stem.forward(luma) + self.cond_proj.forward(conditioning))
    }
}

// ─── U-Net variant ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct UNetColorizer<B: Backend> {
    pub fusion:     ConditioningFusion<B>,
    pub enc1:       Conv2d<B>,
    pub down1:      Conv2d<B>,
    pub down2:      Conv2d<B>,
    pub bottleneck: Conv2d<B>,
    pub global:     Conv2d<B>,
    pub up2:        Conv2d<B>,
    pub up1:        Conv2d<B>,
    pub head:       Conv2d<B>,
    pub dropout:    Dropout,
}

impl<B: Backend> UNetColorizer<B> {
    pub fn forward(&self, luma: Tensor<B, 4>, conditioning: Tensor<B, 4>) -> Tensor<B, 4> {
        let e1 = relu(self.enc1.forward(self.fusion.forward(luma, conditioning))); // [N, c, H, W]
        let e2 = relu(self.down1.forward(e1.clone()));                            // [N, 2c, H/2, W/2]
        let e3 = relu(self.down2.forward(e2.clone()));                            // [N, 4c, H/4, W/4]
        let b  = relu(self.bottleneck.forward(e3));

        // Pooled bottleneck features are broadcast back over the map, so
        // every output pixel sees the whole frame.
        let pooled  = b.clone().mean_dim(3).mean_dim(2);                      // [N, 4c, 1, 1]
        let context = relu(self.global.forward(pooled));
        let b = self.dropout.forward(b + context);

        let [_, _, h2, w2] = e2.dims();
        let u2 = relu(self.up2.forward(Tensor::cat(vec![upsample(b, h2, w2), e2], 1)));
        let [_, _, h1, w1] = e1.dims();
        let u1 = relu(self.up1.forward(Tensor::cat(vec![upsample(u2, h1, w1), e1], 1)));

        self.head.forward(u1).tanh()
    }
}

// ─── Attention variant ────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let attn_output = self.self_attn.forward(MhaInput::self_attn(x.clone())).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(gelu(self.ffn_linear1.forward(x.clone())));
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct AttentionColorizer<B: Backend> {
    pub fusion:             ConditioningFusion<B>,
    pub down1:              Conv2d<B>,
    pub down2:              Conv2d<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub refine:             Conv2d<B>,
    pub head:               Conv2d<B>,
    pub dropout:            Dropout,
}

impl<B: Backend> AttentionColorizer<B> {
    pub fn forward(&self, luma: Tensor<B, 4>, conditioning: Tensor<B, 4>) -> Tensor<B, 4> {
        let features = self.fusion.forward(luma, conditioning);
        let x = relu(self.down1.forward(features.clone()));
        let x = relu(self.down2.forward(x));

        // One token per cell of the quarter-resolution grid.
        let [n, d, h, w] = x.dims();
        let tokens = x.reshape([n, d, h * w]).swap_dims(1, 2); // [N, T, d]
        let positions = Tensor::<B, 1, Int>::arange(0..(h * w) as i64, &tokens.device()).unsqueeze::<2>();
        // [1, T, d] broadcasts over the batch
        let mut x = self.dropout.forward(tokens + self.position_embedding.forward(positions));
        for layer in &self.layers {
            x = layer.forward(x);
        }
        let x = self.final_norm.forward(x).swap_dims(1, 2).reshape([n, d, h, w]);

        let [_, _, fh, fw] = features.dims();
        let x = relu(self.refine.forward(Tensor::cat(vec![upsample(x, fh, fw), features], 1)));
        self.head.forward(x).tanh()
    }
}

// ─── ColorizationNetwork ──────────────────────────────────────────────────────
/// "Luma + conditioning → chroma", whichever architecture backs it.
#[derive(Module, Debug)]
pub enum ColorizationNetwork<B: Backend> {
    UNet(UNetColorizer<B>),
    Attention(AttentionColorizer<B>),
}

impl<B: Backend> ColorizationNetwork<B> {
    /// luma [N,1,H,W], conditioning [N,3,H,W] → chroma [N,2,H,W] in [-1, 1]
    pub fn forward(&self, luma: Tensor<B, 4>, conditioning: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::UNet(net)      => net.forward(luma, conditioning),
            Self::Attention(net) => net.forward(luma, conditioning),
        }
    }

    pub fn architecture(&self) -> Architecture {
        match self {
            Self::UNet(_)      => Architecture::UNet,
            Self::Attention(_) => Architecture::Attention,
        }
    }

    /// Colorize one frame. Malformed luminance never reaches the network
    /// and a non-finite prediction is reported rather than returned.
    pub fn predict_frame(
        &self,
        luma:         &LumaFrame,
        conditioning: &Conditioning,
        resolution:   Resolution,
        batcher:      &FrameBatcher<B>,
    ) -> ColorizeResult<ChromaFrame> {
        luma.validate(resolution)?;

        let output = self.forward(
            batcher.luma(&[luma]),
            batcher.conditioning(std::slice::from_ref(conditioning)),
        );
        let chroma = chroma_frames(output)
            .map_err(|reason| ColorizeError::InferenceFrameFailure { index: luma.index(), reason })?
            .pop()
            .ok_or_else(|| ColorizeError::InferenceFrameFailure {
                index:  luma.index(),
                reason: "network returned an empty batch".into(),
            })?;

        if !chroma.is_finite() {
            return Err(ColorizeError::InferenceFrameFailure {
                index:  luma.index(),
                reason: "network produced non-finite chroma".into(),
            });
        }
        Ok(chroma)
    }
}
