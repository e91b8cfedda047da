// ============================================================
// Layer 2 — Colorize Use Case
// ============================================================
// Colorizes every video found under an input directory:
//
//   Step 1: Load train_config.json + latest weights   (Layer 6)
//   Step 2: Scan input frame directories              (Layer 4)
//   Step 3: One worker thread per video, up to
//           `max_concurrent` at once. Each worker owns a
//           model clone and its own reconstructor state. (Layer 5)
//   Step 4: Frames → PNG sequence, summary → report.json (Layer 6)
//
// Failed frames are listed in the report; every other frame of the
// video is still written. A sink error in one worker cancels the
// others at their next frame boundary.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::application::train_use_case::{BackendKind, TrainConfig};
use crate::data::loader::{FrameDirectorySource, VideoCatalog, VideoEntry};
use crate::domain::error::ColorizeError;
use crate::domain::traits::FrameSink;
use crate::infra::{checkpoint::CheckpointManager, frame_sink::PngSequenceSink};
use crate::ml::model::ColorizationNetwork;
use crate::ml::reconstructor::InferenceReconstructor;
use crate::temporal::propagator::{MotionQuality, TemporalPropagator};

#[derive(Debug, Clone)]
pub struct ColorizeRequest {
    pub input_dir:      String,
    pub output_dir:     String,
    pub checkpoint_dir: String,
    pub backend:        BackendKind,
    pub temporal_blend: f32,
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFailure {
    pub index:  Option<usize>,
    pub reason: String,
}

/// Per-video outcome, written to report.json.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoReport {
    pub video:          String,
    pub frames_written: usize,
    pub scene_cuts:     usize,
    pub failures:       Vec<FrameFailure>,
    pub cancelled:      bool,
}

pub struct ColorizeUseCase {
    request: ColorizeRequest,
    cancel:  CancellationToken,
}

impl ColorizeUseCase {
    pub fn new(request: ColorizeRequest) -> Self {
        Self { request, cancel: CancellationToken::new() }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn execute(&self) -> Result<Vec<VideoReport>> {
        let req = &self.request;

        // ── Step 1: Config + weights ──────────────────────────────────────────
        let ckpt = CheckpointManager::new(&req.checkpoint_dir);
        let cfg  = ckpt.load_config()?;

        // ── Step 2: Input videos ──────────────────────────────────────────────
        let catalog = VideoCatalog::scan(&req.input_dir)?;
        if catalog.videos.is_empty() {
            return Err(anyhow!("No frame files found under '{}'", req.input_dir));
        }

        // ── Step 3: Colorize ──────────────────────────────────────────────────
        let reports = match req.backend {
            BackendKind::Wgpu => {
                let device = burn::backend::wgpu::WgpuDevice::default();
                self.run::<burn::backend::Wgpu>(&cfg, &ckpt, &catalog, device)?
            }
            BackendKind::NdArray => {
                let device = burn::backend::ndarray::NdArrayDevice::Cpu;
                self.run::<burn::backend::NdArray>(&cfg, &ckpt, &catalog, device)?
            }
        };

        // ── Step 4: Report ────────────────────────────────────────────────────
        let report_path = Path::new(&req.output_dir).join("report.json");
        fs::create_dir_all(&req.output_dir)?;
        fs::write(&report_path, serde_json::to_string_pretty(&reports)?)
            .with_context(|| format!("Cannot write '{}'", report_path.display()))?;
        tracing::info!("Report written to '{}'", report_path.display());

        Ok(reports)
    }

    fn run<B: Backend>(
        &self,
        cfg:     &TrainConfig,
        ckpt:    &CheckpointManager,
        catalog: &VideoCatalog,
        device:  B::Device,
    ) -> Result<Vec<VideoReport>> {
        let model: ColorizationNetwork<B> = cfg.model_config().init(&device);
        let model = ckpt.load_model(model, &device)?;
        tracing::info!("Model loaded: {:?} at {}", model.architecture(), cfg.resolution());

        let mut reports = Vec::with_capacity(catalog.videos.len());
        for group in catalog.videos.chunks(self.request.max_concurrent.max(1)) {
            let results: Vec<Result<VideoReport>> = std::thread::scope(|scope| {
                let handles: Vec<_> = group
                    .iter()
                    .map(|video| {
                        let model  = model.clone();
                        let device = device.clone();
                        scope.spawn(move || self.colorize_video(cfg, model, video, device))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|_| Err(anyhow!("colorize worker panicked"))))
                    .collect()
            });
            for result in results {
                reports.push(result?);
            }
        }
        Ok(reports)
    }

    fn colorize_video<B: Backend>(
        &self,
        cfg:    &TrainConfig,
        model:  ColorizationNetwork<B>,
        video:  &VideoEntry,
        device: B::Device,
    ) -> Result<VideoReport> {
        let out_dir: PathBuf = Path::new(&self.request.output_dir).join(&video.id);
        let mut sink = PngSequenceSink::create(out_dir)?;
        let mut report = VideoReport { video: video.id.clone(), ..Default::default() };

        let source = FrameDirectorySource::from_entry(video, cfg.resolution());
        let reconstructor = InferenceReconstructor::new(
            model,
            TemporalPropagator::new(cfg.propagator.clone()),
            cfg.resolution(),
            source,
            device,
        )
        .with_temporal_blend(self.request.temporal_blend)
        .with_cancellation(self.cancel.clone());

        for result in reconstructor {
            match result {
                Ok(out) => {
                    if matches!(out.conditioning, MotionQuality::SceneCut { .. }) {
                        report.scene_cuts += 1;
                    }
                    if let Err(err) = sink.write_frame(&out.frame) {
                        self.cancel.cancel();
                        return Err(err.context(format!("Video '{}'", video.id)));
                    }
                }
                Err(ColorizeError::Cancelled) => {
                    report.cancelled = true;
                }
                Err(err) => {
                    tracing::warn!("Video '{}': {err}", video.id);
                    report.failures.push(FrameFailure { index: err.frame_index(), reason: err.to_string() });
                }
            }
        }
        sink.finish()?;
        report.frames_written = sink.written();

        tracing::info!(
            "Video '{}': {} frames written, {} failed, {} scene cuts",
            video.id, report.frames_written, report.failures.len(), report.scene_cuts
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::color_space::merge_to_rgb;
    use crate::data::synthetic::SyntheticVideo;
    use crate::domain::frame::Resolution;
    use crate::ml::model::tests::TestBackend;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vc-colorize-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_colorizes_each_video_and_reports_corrupt_frames() {
        let root = scratch("e2e");
        let (ckpt_dir, in_dir, out_dir) = (root.join("ckpt"), root.join("in"), root.join("out"));

        let cfg = TrainConfig::tiny_for_tests();
        let ckpt = CheckpointManager::new(ckpt_dir.display().to_string());
        ckpt.save_config(&cfg).unwrap();
        let model = cfg.model_config().init::<TestBackend>(&Default::default());
        ckpt.save_model(&model, &cfg.model_name, &cfg.version, 0).unwrap();

        let res = Resolution::new(8, 8);
        for (name, seed) in [("a", 1), ("b", 2)] {
            let dir = in_dir.join(name);
            fs::create_dir_all(&dir).unwrap();
            let video = SyntheticVideo::new(res, (0, 1), 4, seed);
            for t in 0..4 {
                merge_to_rgb(&video.frame(t)).save(dir.join(format!("{t:04}.png"))).unwrap();
            }
        }
        // frame 2 of video b cannot be decoded
        fs::write(in_dir.join("b").join("0002.png"), b"not a png").unwrap();

        let use_case = ColorizeUseCase::new(ColorizeRequest {
            input_dir:      in_dir.display().to_string(),
            output_dir:     out_dir.display().to_string(),
            checkpoint_dir: ckpt_dir.display().to_string(),
            backend:        BackendKind::NdArray,
            temporal_blend: 0.5,
            max_concurrent: 2,
        });
        let reports = use_case.execute().unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].frames_written, 4);
        assert!(reports[0].failures.is_empty());
        assert_eq!(reports[1].frames_written, 3);
        assert_eq!(reports[1].failures.len(), 1);
        assert_eq!(reports[1].failures[0].index, Some(2));
        assert!(out_dir.join("b").join("frame_000003.png").exists());
        assert!(!out_dir.join("b").join("frame_000002.png").exists());
        assert!(out_dir.join("report.json").exists());
        let _ = fs::remove_dir_all(&root);
    }
}
