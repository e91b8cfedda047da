// ============================================================
// Layer 5b — Training Loop
// ============================================================
// TrainingOrchestrator turns one batch of clips into exactly one
// optimizer step; train_loop wraps it in epochs, validation,
// metrics and checkpoints.
//
// Key points:
//   - Training uses Autodiff<Wgpu> (or Autodiff<NdArray>)
//   - model.valid() returns the model on the inner backend, so the
//     validation unroll runs with dropout off and no graph
//   - The loss is checked for finiteness BEFORE backward/step: a
//     diverged step is reported and never applied
//   - Clips are decoded on a prefetch thread with a bounded queue
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::sync::Arc;

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::application::train_use_case::{BackendKind, TrainConfig};
use crate::data::{batcher::FrameBatcher, prefetch::Prefetcher};
use crate::domain::clip::Clip;
use crate::domain::error::{ColorizeError, ColorizeResult};
use crate::domain::frame::Resolution;
use crate::domain::traits::ClipSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::loss::{ConditioningSource, LossAccumulator, LossRecord, TemporalWeightSchedule};
use crate::ml::model::ColorizationNetwork;
use crate::ml::unroll::unroll_clips;
use crate::temporal::propagator::TemporalPropagator;

// ─── TrainingOrchestrator ─────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct StepSettings {
    pub learning_rate:       f64,
    pub clip_len:            usize,
    pub resolution:          Resolution,
    pub schedule:            TemporalWeightSchedule,
    pub gradient_weight:     f64,
    pub conditioning_source: ConditioningSource,
}

impl From<&TrainConfig> for StepSettings {
    fn from(cfg: &TrainConfig) -> Self {
        Self {
            learning_rate:       cfg.lr,
            clip_len:            cfg.clip_len,
            resolution:          Resolution::new(cfg.frame_height, cfg.frame_width),
            schedule:            cfg.schedule,
            gradient_weight:     cfg.gradient_weight,
            conditioning_source: cfg.conditioning_source,
        }
    }
}

/// Owns the parameters during training. Each call to `train_step`
/// makes at most one update; clips in the batch share it.
pub struct TrainingOrchestrator<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ColorizationNetwork<B>, B>,
{
    model:      ColorizationNetwork<B>,
    optim:      O,
    propagator: TemporalPropagator,
    batcher:    FrameBatcher<B>,
    settings:   StepSettings,
    step:       usize,
}

impl<B, O> TrainingOrchestrator<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ColorizationNetwork<B>, B>,
{
    pub fn new(
        model:      ColorizationNetwork<B>,
        optim:      O,
        propagator: TemporalPropagator,
        settings:   StepSettings,
        device:     B::Device,
    ) -> Self {
        Self { model, optim, propagator, batcher: FrameBatcher::new(device), settings, step: 0 }
    }

    pub fn model(&self) -> &ColorizationNetwork<B> {
        &self.model
    }

    /// Swap in weights read back from a checkpoint saved at `step`.
    pub fn restore(&mut self, model: ColorizationNetwork<B>, step: usize) {
        self.model = model;
        self.step  = step;
    }

    /// Number of updates applied so far.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn temporal_weight(&self) -> f64 {
        self.settings.schedule.weight_at(self.step)
    }

    /// One optimization step over `clips`.
    ///
    /// Returns `ClipIntegrity` for a malformed clip and `TrainingDivergence`
    /// when the loss is not finite; in both cases the parameters are left
    /// exactly as they were.
    pub fn train_step(&mut self, clips: &[Clip], cancel: &CancellationToken) -> ColorizeResult<LossRecord> {
        self.check_clips(clips)?;

        let weight = self.temporal_weight();
        let losses = unroll_clips(
            &self.model, clips, &self.propagator,
            self.settings.conditioning_source, &self.batcher, cancel,
        )?;
        let total  = losses.total(weight, self.settings.gradient_weight);
        let record = losses.record(self.step, weight, self.settings.gradient_weight);

        if !record.is_finite() {
            return Err(ColorizeError::TrainingDivergence {
                step:  self.step,
                loss:  record.total,
                clips: clips.iter().map(|c| c.id.clone()).collect(),
            });
        }

        // Backward pass + Adam update
        let grads = total.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.settings.learning_rate, self.model.clone(), grads);
        self.step += 1;

        Ok(record)
    }

    /// Loss on `clips` without touching the parameters.
    pub fn evaluate(&self, clips: &[Clip], cancel: &CancellationToken) -> ColorizeResult<LossRecord> {
        self.check_clips(clips)?;

        let weight  = self.temporal_weight();
        let model   = self.model.valid();
        let batcher = FrameBatcher::<B::InnerBackend>::new(self.batcher.device.clone());
        let losses  = unroll_clips(
            &model, clips, &self.propagator,
            self.settings.conditioning_source, &batcher, cancel,
        )?;
        Ok(losses.record(self.step, weight, self.settings.gradient_weight))
    }

    fn check_clips(&self, clips: &[Clip]) -> ColorizeResult<()> {
        if clips.is_empty() {
            return Err(ColorizeError::clip_integrity("batch", "empty batch"));
        }
        clips
            .iter()
            .try_for_each(|clip| clip.validate(self.settings.clip_len, self.settings.resolution))
    }
}

// ─── Epoch loop ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub epochs:        usize,
    pub steps:         usize,
    pub best_val_loss: f64,
}

pub struct TrainInputs<'a> {
    pub source:        Arc<dyn ClipSource>,
    pub train_indices: Vec<usize>,
    pub val_indices:   Vec<usize>,
    pub ckpt_manager:  &'a CheckpointManager,
    pub metrics:       &'a MetricsLogger,
    pub cancel:        CancellationToken,
}

pub fn run_training(cfg: &TrainConfig, inputs: TrainInputs<'_>) -> Result<TrainingSummary> {
    match cfg.backend {
        BackendKind::Wgpu => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<burn::backend::Autodiff<burn::backend::Wgpu>>(cfg, inputs, device)
        }
        BackendKind::NdArray => {
            let device = burn::backend::ndarray::NdArrayDevice::Cpu;
            tracing::info!("Using NdArray CPU backend");
            train_loop::<burn::backend::Autodiff<burn::backend::NdArray>>(cfg, inputs, device)
        }
    }
}

pub(crate) fn train_loop<B: AutodiffBackend>(
    cfg:    &TrainConfig,
    inputs: TrainInputs<'_>,
    device: B::Device,
) -> Result<TrainingSummary> {
    let TrainInputs { source, train_indices, val_indices, ckpt_manager, metrics, cancel } = inputs;
    let resolution = Resolution::new(cfg.frame_height, cfg.frame_width);

    // ── Build model ───────────────────────────────────────────────────────────
    B::seed(&device, cfg.seed);
    let model: ColorizationNetwork<B> = cfg.model_config().init(&device);
    tracing::info!(
        "Model ready: {:?} at {resolution}, base_channels={}",
        model.architecture(), cfg.base_channels
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let optim = AdamConfig::new().with_epsilon(1e-8).init();
    let mut orchestrator = TrainingOrchestrator::new(
        model, optim,
        TemporalPropagator::new(cfg.propagator.clone()),
        StepSettings::from(cfg),
        device,
    );

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut best_val_loss = f64::INFINITY;

    for epoch in 1..=cfg.epochs {
        // ── Training phase ────────────────────────────────────────────────────
        let mut order = train_indices.clone();
        order.shuffle(&mut rng);

        let loader = Arc::clone(&source);
        let clips  = Prefetcher::spawn(
            order.into_iter().map(move |i| loader.load_clip(i)),
            cfg.prefetch_depth,
            cancel.clone(),
        );

        let mut train   = LossAccumulator::default();
        let mut skipped = 0usize;
        let mut last_skip: Option<ColorizeError> = None;
        let mut batch   = Vec::with_capacity(cfg.batch_size);

        for loaded in clips {
            match loaded.and_then(|clip| clip.validate(cfg.clip_len, resolution).map(|_| clip)) {
                Ok(clip) => batch.push(clip),
                Err(err) => {
                    skipped += 1;
                    tracing::warn!("Skipping clip: {err}");
                    last_skip = Some(err);
                }
            }
            if batch.len() >= cfg.batch_size {
                let full = std::mem::take(&mut batch);
                apply_step(&mut orchestrator, &full, &mut train, ckpt_manager, &cancel)?;
            }
        }
        if !batch.is_empty() {
            apply_step(&mut orchestrator, &batch, &mut train, ckpt_manager, &cancel)?;
        }
        if cancel.is_cancelled() {
            return Err(ColorizeError::Cancelled).context(format!("Training stopped during epoch {epoch}"));
        }
        if train.batches() == 0 {
            if let Some(err) = last_skip {
                tracing::error!("Epoch {epoch}: all {skipped} training clips were rejected");
                return Err(anyhow::Error::new(err))
                    .context(format!("Epoch {epoch} had no usable clips ({skipped} skipped)"));
            }
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let mut val = LossAccumulator::default();
        for chunk in val_indices.chunks(cfg.batch_size.max(1)) {
            let clips: Vec<Clip> = chunk
                .iter()
                .filter_map(|&i| match source.load_clip(i) {
                    Ok(clip) => Some(clip),
                    Err(err) => {
                        tracing::warn!("Skipping validation clip: {err}");
                        None
                    }
                })
                .collect();
            if clips.is_empty() {
                continue;
            }
            match orchestrator.evaluate(&clips, &cancel) {
                Ok(record) => val.add(&record),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => tracing::warn!("Skipping validation batch: {err}"),
            }
        }

        let train_mean = train.mean();
        let val_mean   = val.mean();
        let row = EpochMetrics {
            epoch,
            step:              orchestrator.step(),
            train_loss:        train_mean.total,
            train_recon:       train_mean.reconstruction,
            train_temporal:    train_mean.temporal,
            val_loss:          val_mean.total,
            val_recon:         val_mean.reconstruction,
            val_temporal:      val_mean.temporal,
            temporal_weight:   orchestrator.temporal_weight(),
            scene_cuts:        train_mean.scene_cuts,
            skipped_clips:     skipped,
        };

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} (recon={:.4} temporal={:.4}) | val_loss={:.4} | w_t={:.3} | skipped={}",
            epoch, cfg.epochs, row.train_loss, row.train_recon, row.train_temporal,
            row.val_loss, row.temporal_weight, skipped,
        );
        if row.is_improvement(best_val_loss) {
            best_val_loss = row.val_loss;
        }
        metrics.log(&row)?;

        let path = ckpt_manager.save_model(orchestrator.model(), &cfg.model_name, &cfg.version, orchestrator.step())?;
        tracing::info!("Checkpoint saved for epoch {} → {}", epoch, path.display());
    }

    tracing::info!("Training complete!");
    Ok(TrainingSummary { epochs: cfg.epochs, steps: orchestrator.step(), best_val_loss })
}

/// Run one step; recoverable clip problems skip the batch, fatal ones
/// end training. On divergence the model is rolled back to the last
/// saved checkpoint before the error is returned.
fn apply_step<B, O>(
    orchestrator: &mut TrainingOrchestrator<B, O>,
    clips:        &[Clip],
    acc:          &mut LossAccumulator,
    ckpt_manager: &CheckpointManager,
    cancel:       &CancellationToken,
) -> Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<ColorizationNetwork<B>, B>,
{
    match orchestrator.train_step(clips, cancel) {
        Ok(record) => {
            tracing::debug!(
                "step {} | total={:.4} recon={:.4} temporal={:.4} cuts={}",
                record.step, record.total, record.reconstruction, record.temporal, record.scene_cuts
            );
            acc.add(&record);
            Ok(())
        }
        Err(err @ ColorizeError::TrainingDivergence { .. }) => {
            let rollback = match ckpt_manager.latest()? {
                Some(latest) => {
                    let restored = ckpt_manager.load_artifact(
                        orchestrator.model().clone(),
                        &latest.artifact,
                        &orchestrator.batcher.device,
                    )?;
                    orchestrator.restore(restored, latest.step);
                    format!("rolled back to '{}' (step {})", latest.artifact, latest.step)
                }
                None => "no earlier checkpoint to roll back to".to_string(),
            };
            tracing::error!("{err}; {rollback}");
            Err(anyhow::Error::new(err).context(format!("Training diverged, {rollback}")))
        }
        Err(ColorizeError::Cancelled) => Ok(()),
        Err(err) => {
            tracing::warn!("Skipping batch: {err}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticVideo, SyntheticVideos};
    use crate::domain::frame::{ChromaFrame, Frame};
    use crate::ml::model::{tests::tiny_config, Architecture};
    use crate::temporal::propagator::PropagatorConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::adaptor::OptimizerAdaptor;
    use burn::optim::Adam;
    use ndarray::Array3;

    type TestBackend = Autodiff<NdArray>;
    type TestOrchestrator = TrainingOrchestrator<
        TestBackend,
        OptimizerAdaptor<Adam, ColorizationNetwork<TestBackend>, TestBackend>,
    >;

    const RES: Resolution = Resolution { height: 8, width: 8 };

    fn orchestrator(clip_len: usize, lr: f64) -> TestOrchestrator {
        let device = Default::default();
        let model = tiny_config(Architecture::UNet, 8, 8).init::<TestBackend>(&device);
        let settings = StepSettings {
            learning_rate:       lr,
            clip_len,
            resolution:          RES,
            schedule:            TemporalWeightSchedule::Constant { weight: 0.5 },
            gradient_weight:     0.1,
            conditioning_source: ConditioningSource::GroundTruth,
        };
        let propagator = TemporalPropagator::new(PropagatorConfig { block_size: 4, search_radius: 2, ..Default::default() });
        TrainingOrchestrator::new(model, AdamConfig::new().init(), propagator, settings, device)
    }

    fn probe(orch: &TestOrchestrator) -> Vec<f32> {
        let device = Default::default();
        let model = orch.model().valid();
        let luma = Tensor::<NdArray, 4>::ones([1, 1, 8, 8], &device).mul_scalar(0.4);
        let cond = Tensor::<NdArray, 4>::zeros([1, 3, 8, 8], &device);
        model.forward(luma, cond).into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_non_finite_loss_is_reported_and_not_applied() {
        let mut orch = orchestrator(2, 1e-2);
        let before = probe(&orch);

        let mut clip = SyntheticVideo::still(RES, 4).clip("poisoned", 0, 2);
        clip.frames[1] = Frame::with_chroma(
            clip.frames[1].luma.clone(),
            ChromaFrame::new(Array3::from_elem((2, 8, 8), f32::NAN)),
        );

        let err = orch.train_step(&[clip], &CancellationToken::new()).unwrap_err();
        match err {
            ColorizeError::TrainingDivergence { step, loss, clips } => {
                assert_eq!(step, 0);
                assert!(!loss.is_finite());
                assert_eq!(clips, vec!["poisoned".to_string()]);
            }
            other => panic!("expected divergence, got {other:?}"),
        }
        assert_eq!(orch.step(), 0);
        assert_eq!(probe(&orch), before);
    }

    #[test]
    fn test_divergence_rolls_back_to_last_checkpoint() {
        let dir = std::env::temp_dir().join(format!("vc-rollback-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let ckpt = CheckpointManager::new(dir.display().to_string());
        let cancel = CancellationToken::new();

        let mut orch = orchestrator(2, 1e-2);
        ckpt.save_model(orch.model(), "m", "v1", 0).unwrap();
        let saved = probe(&orch);

        let good = SyntheticVideo::new(RES, (1, 0), 6, 2).clip("good", 0, 2);
        orch.train_step(&[good], &cancel).unwrap();
        assert_eq!(orch.step(), 1);

        let mut poisoned = SyntheticVideo::still(RES, 4).clip("poisoned", 0, 2);
        poisoned.frames[0] = Frame::with_chroma(
            poisoned.frames[0].luma.clone(),
            ChromaFrame::new(Array3::from_elem((2, 8, 8), f32::NAN)),
        );
        let mut acc = LossAccumulator::default();
        assert!(apply_step(&mut orch, &[poisoned], &mut acc, &ckpt, &cancel).is_err());

        assert_eq!(orch.step(), 0);
        for (a, b) in probe(&orch).iter().zip(&saved) {
            assert!((a - b).abs() < 2e-2);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_step_updates_parameters_once() {
        let mut orch = orchestrator(3, 1e-2);
        let before = probe(&orch);
        let clip = SyntheticVideo::new(RES, (1, 1), 6, 9).clip("moving", 0, 3);
        let record = orch.train_step(&[clip], &CancellationToken::new()).unwrap();
        assert!(record.is_finite());
        assert_eq!(record.frames, 3);
        assert_eq!(orch.step(), 1);
        assert_ne!(probe(&orch), before);
    }

    #[test]
    fn test_short_clip_is_rejected_without_update() {
        let mut orch = orchestrator(4, 1e-2);
        let clip = SyntheticVideo::still(RES, 1).clip("short", 0, 2);
        let err = orch.train_step(&[clip], &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, ColorizeError::ClipIntegrity { .. }));
        assert_eq!(orch.step(), 0);
    }

    #[test]
    fn test_repeated_steps_reduce_loss() {
        let mut orch = orchestrator(2, 2e-2);
        let clip = SyntheticVideo::still(RES, 6).clip("still", 0, 2);
        let cancel = CancellationToken::new();
        let first = orch.evaluate(std::slice::from_ref(&clip), &cancel).unwrap();
        for _ in 0..25 {
            orch.train_step(std::slice::from_ref(&clip), &cancel).unwrap();
        }
        let last = orch.evaluate(std::slice::from_ref(&clip), &cancel).unwrap();
        assert!(last.reconstruction < first.reconstruction, "{} !< {}", last.reconstruction, first.reconstruction);
    }

    struct UnreadableClips;

    impl ClipSource for UnreadableClips {
        fn clip_count(&self) -> usize {
            4
        }

        fn load_clip(&self, index: usize) -> ColorizeResult<Clip> {
            Err(ColorizeError::clip_integrity(format!("clip-{index}"), "frame 2 could not be decoded"))
        }
    }

    #[test]
    fn test_train_loop_fails_when_every_clip_is_rejected() {
        let dir = std::env::temp_dir().join(format!("vc-unreadable-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut cfg = TrainConfig::tiny_for_tests();
        cfg.out_dir = dir.display().to_string();

        let ckpt = CheckpointManager::new(&cfg.out_dir);
        let metrics = MetricsLogger::new(&cfg.out_dir).unwrap();
        let err = train_loop::<TestBackend>(
            &cfg,
            TrainInputs {
                source:        Arc::new(UnreadableClips),
                train_indices: vec![0, 1, 2],
                val_indices:   vec![3],
                ckpt_manager:  &ckpt,
                metrics:       &metrics,
                cancel:        CancellationToken::new(),
            },
            Default::default(),
        )
        .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("3 skipped"), "{message}");
        assert!(message.contains("could not be decoded"), "{message}");
        assert_eq!(ckpt.latest().unwrap(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_train_loop_writes_checkpoint_and_metrics() {
        let dir = std::env::temp_dir().join(format!("vc-train-loop-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut cfg = TrainConfig::tiny_for_tests();
        cfg.out_dir = dir.display().to_string();

        let source: Arc<dyn ClipSource> = Arc::new(SyntheticVideos::new(2, RES, cfg.clip_len, 2, 1));
        let ckpt = CheckpointManager::new(&cfg.out_dir);
        let metrics = MetricsLogger::new(&cfg.out_dir).unwrap();
        let summary = train_loop::<TestBackend>(
            &cfg,
            TrainInputs {
                source,
                train_indices: vec![0, 1, 2],
                val_indices:   vec![3],
                ckpt_manager:  &ckpt,
                metrics:       &metrics,
                cancel:        CancellationToken::new(),
            },
            Default::default(),
        )
        .unwrap();

        assert_eq!(summary.epochs, cfg.epochs);
        assert_eq!(summary.steps, cfg.epochs * 2);
        assert!(summary.best_val_loss.is_finite());
        let latest = ckpt.latest().unwrap().unwrap();
        assert_eq!(latest.step, summary.steps);
        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 1 + cfg.epochs);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
