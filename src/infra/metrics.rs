// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - epoch, step:        where training is
//   - train_*:            mean loss breakdown over training batches
//   - val_*:              same on the validation clips
//   - temporal_weight:    schedule value at the end of the epoch
//   - scene_cuts:         transitions masked out by cut detection
//   - skipped_clips:      clips rejected by the integrity check
//
// Output file: checkpoints/metrics.csv
//
//   epoch,step,train_loss,train_recon,train_temporal,val_loss,...
//   1,40,0.231000,0.224000,0.013500,0.219000,...
//
// How to read it:
//   - train_recon should fall first; train_temporal starts to
//     matter once temporal_weight ramps up
//   - val_loss rising while train_loss falls → overfitting
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

const HEADER: &str = "epoch,step,train_loss,train_recon,train_temporal,val_loss,val_recon,val_temporal,temporal_weight,scene_cuts,skipped_clips";

/// One row of metrics for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:           usize,
    /// Optimizer steps applied so far
    pub step:            usize,
    pub train_loss:      f64,
    pub train_recon:     f64,
    pub train_temporal:  f64,
    /// NaN when there were no validation clips
    pub val_loss:        f64,
    pub val_recon:       f64,
    pub val_temporal:    f64,
    pub temporal_weight: f64,
    pub scene_cuts:      usize,
    pub skipped_clips:   usize,
}

impl EpochMetrics {
    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.4},{},{}",
            m.epoch, m.step,
            m.train_loss, m.train_recon, m.train_temporal,
            m.val_loss, m.val_recon, m.val_temporal,
            m.temporal_weight, m.scene_cuts, m.skipped_clips,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch, m.train_loss, m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}
