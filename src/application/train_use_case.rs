// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Pick a clip source        (Layer 4 - data)
//           frame directories, or synthetic videos when asked
//           for or when the dataset directory is empty
//   Step 2: Split train/validation    (Layer 4 - data)
//   Step 3: Save config               (Layer 6 - infra)
//   Step 4: Run training loop         (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::data::{
    dataset::ClipDataset,
    loader::VideoCatalog,
    splitter::split_train_val,
    synthetic::SyntheticVideos,
};
use crate::domain::frame::Resolution;
use crate::domain::traits::ClipSource;
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::loss::{ConditioningSource, TemporalWeightSchedule};
use crate::ml::model::{Architecture, ColorizerConfig};
use crate::ml::trainer::{run_training, TrainInputs, TrainingSummary};
use crate::temporal::propagator::PropagatorConfig;

/// Compute backend for the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Wgpu,
    NdArray,
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Saved next to the checkpoints
// so `colorize` can rebuild the same network and propagator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:            String,
    pub out_dir:             String,
    pub model_name:          String,
    pub version:             String,
    /// Train on this many generated videos instead of `data_dir`
    pub synthetic_videos:    Option<usize>,
    pub backend:             BackendKind,

    pub architecture:        Architecture,
    pub frame_height:        usize,
    pub frame_width:         usize,
    pub base_channels:       usize,
    pub d_model:             usize,
    pub num_heads:           usize,
    pub num_layers:          usize,
    pub dropout:             f64,

    pub clip_len:            usize,
    pub clip_stride:         usize,
    pub batch_size:          usize,
    pub epochs:              usize,
    pub lr:                  f64,
    pub seed:                u64,
    pub val_fraction:        f64,
    pub prefetch_depth:      usize,

    pub schedule:            TemporalWeightSchedule,
    pub gradient_weight:     f64,
    pub conditioning_source: ConditioningSource,
    pub propagator:          PropagatorConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:            "data/dataset".to_string(),
            out_dir:             "checkpoints".to_string(),
            model_name:          "colorizer".to_string(),
            version:             "v1".to_string(),
            synthetic_videos:    None,
            backend:             BackendKind::Wgpu,

            architecture:        Architecture::UNet,
            frame_height:        64,
            frame_width:         64,
            base_channels:       16,
            d_model:             64,
            num_heads:           4,
            num_layers:          2,
            dropout:             0.1,

            clip_len:            6,
            clip_stride:         3,
            batch_size:          4,
            epochs:              10,
            lr:                  2e-4,
            seed:                42,
            val_fraction:        0.2,
            prefetch_depth:      8,

            schedule:            TemporalWeightSchedule::default(),
            gradient_weight:     0.0,
            conditioning_source: ConditioningSource::GroundTruth,
            propagator:          PropagatorConfig::default(),
        }
    }
}

impl TrainConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.frame_height, self.frame_width)
    }

    pub fn model_config(&self) -> ColorizerConfig {
        ColorizerConfig::new(
            self.architecture,
            self.frame_height, self.frame_width,
            self.base_channels, self.d_model,
            self.num_heads, self.num_layers, self.dropout,
        )
    }

    /// Small enough to train a few steps on the CPU inside a unit test.
    #[cfg(test)]
    pub fn tiny_for_tests() -> Self {
        Self {
            backend:          BackendKind::NdArray,
            synthetic_videos: Some(2),
            frame_height:     8,
            frame_width:      8,
            base_channels:    4,
            d_model:          8,
            num_heads:        2,
            num_layers:       1,
            dropout:          0.0,
            clip_len:         3,
            batch_size:       2,
            epochs:           2,
            lr:               1e-2,
            prefetch_depth:   2,
            propagator:       PropagatorConfig { block_size: 4, search_radius: 2, ..Default::default() },
            ..Default::default()
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    cancel: CancellationToken,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config, cancel: CancellationToken::new() }
    }

    /// Token that stops training at the next frame boundary.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;
        if cfg.clip_len == 0 || cfg.batch_size == 0 {
            bail!("clip_len and batch_size must both be at least 1");
        }
        if cfg.architecture == Architecture::Attention
            && (cfg.num_heads == 0 || cfg.d_model % cfg.num_heads != 0)
        {
            bail!("d_model ({}) must be divisible by num_heads ({})", cfg.d_model, cfg.num_heads);
        }
        let sigma = cfg.propagator.photometric_sigma;
        if !(sigma.is_finite() && sigma > 0.0) {
            bail!("photometric_sigma must be positive, got {sigma}");
        }

        // ── Step 1: Clip source ───────────────────────────────────────────────
        let source = self.clip_source()?;
        let count = source.clip_count();
        if count == 0 {
            bail!("No training clips of {} frames found in '{}'", cfg.clip_len, cfg.data_dir);
        }

        // ── Step 2: Train / validation split ──────────────────────────────────
        let (train_indices, val_indices) =
            split_train_val((0..count).collect(), 1.0 - cfg.val_fraction, cfg.seed);
        tracing::info!("Split: {} train, {} validation clips", train_indices.len(), val_indices.len());

        // ── Step 3: Save config for inference ─────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.out_dir);
        ckpt_manager.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.out_dir)?;

        // ── Step 4: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, TrainInputs {
            source,
            train_indices,
            val_indices,
            ckpt_manager: &ckpt_manager,
            metrics:      &metrics,
            cancel:       self.cancel.clone(),
        })
    }

    fn clip_source(&self) -> Result<Arc<dyn ClipSource>> {
        let cfg = &self.config;
        let synthetic = |count: usize| -> Arc<dyn ClipSource> {
            Arc::new(SyntheticVideos::new(count, cfg.resolution(), cfg.clip_len, 8, cfg.seed))
        };

        if let Some(count) = cfg.synthetic_videos {
            return Ok(synthetic(count));
        }

        tracing::info!("Scanning frame directories under '{}'", cfg.data_dir);
        let catalog = VideoCatalog::scan(&cfg.data_dir)?;
        if catalog.videos.is_empty() {
            tracing::warn!("No videos under '{}', falling back to 16 synthetic videos", cfg.data_dir);
            return Ok(synthetic(16));
        }
        let dataset = ClipDataset::from_catalog(Arc::new(catalog), cfg.clip_len, cfg.clip_stride, cfg.resolution());
        tracing::info!("Found {} clip windows", dataset.clip_count());
        Ok(Arc::new(dataset))
    }
}
