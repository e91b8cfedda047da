// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores ColorizationNetwork weights using Burn's
// CompactRecorder, plus the TrainConfig needed to rebuild the
// network before the weights can be loaded into it.
//
// Artifacts are versioned by model name, version string and the
// optimizer step they were taken at:
//
//   checkpoints/
//     colorizer-v1-step120.mpk.gz   ← weights after step 120
//     colorizer-v1-step240.mpk.gz
//     latest.json                   ← {model_name, version, step, artifact}
//     train_config.json             ← architecture + propagator config
//     metrics.csv                   ← written by MetricsLogger
//
// latest.json is only rewritten after the weights file is on disk,
// so it always names the last good checkpoint. After a divergence
// that is the rollback point.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::ColorizationNetwork;

const LATEST_FILE: &str = "latest.json";
const CONFIG_FILE: &str = "train_config.json";

/// Contents of latest.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointPointer {
    pub model_name: String,
    pub version:    String,
    pub step:       usize,
    /// File stem of the weights, without the recorder's extension
    pub artifact:   String,
}

impl CheckpointPointer {
    pub fn new(model_name: &str, version: &str, step: usize) -> Self {
        Self {
            model_name: model_name.to_string(),
            version:    version.to_string(),
            step,
            artifact:   format!("{model_name}-{version}-step{step}"),
        }
    }
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager; the directory is created on demand.
    pub fn new(dir: impl Into<String>) -> Self {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write weights as `{model_name}-{version}-step{step}` and point
    /// latest.json at them. Returns the path handed to the recorder.
    pub fn save_model<B: Backend>(
        &self,
        model:      &ColorizationNetwork<B>,
        model_name: &str,
        version:    &str,
        step:       usize,
    ) -> Result<PathBuf> {
        let pointer = CheckpointPointer::new(model_name, version, step);
        let path = self.dir.join(&pointer.artifact);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join(LATEST_FILE);
        fs::write(&latest_path, serde_json::to_string_pretty(&pointer)?)
            .with_context(|| format!("Failed to write '{}'", latest_path.display()))?;

        tracing::debug!("Saved checkpoint '{}'", pointer.artifact);
        Ok(path)
    }

    /// Load the weights latest.json points at into `model`, which must
    /// have been built from the same config.
    pub fn load_model<B: Backend>(
        &self,
        model:  ColorizationNetwork<B>,
        device: &B::Device,
    ) -> Result<ColorizationNetwork<B>> {
        let pointer = self
            .latest()?
            .context("No checkpoint found. Have you run 'train' first?")?;
        self.load_artifact(model, &pointer.artifact, device)
    }

    /// Load a specific artifact by file stem.
    pub fn load_artifact<B: Backend>(
        &self,
        model:    ColorizationNetwork<B>,
        artifact: &str,
        device:   &B::Device,
    ) -> Result<ColorizationNetwork<B>> {
        let path = self.dir.join(artifact);
        tracing::info!("Loading checkpoint '{}'", artifact);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

        Ok(model.load_record(record))
    }

    /// The last good checkpoint, or `None` before the first save.
    pub fn latest(&self) -> Result<Option<CheckpointPointer>> {
        let path = self.dir.join(LATEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        let pointer = serde_json::from_str(&s)
            .with_context(|| format!("Malformed '{}'", path.display()))?;
        Ok(Some(pointer))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' before 'colorize'.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }
}
