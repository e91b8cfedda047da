// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Uses `clap` to parse the
// command line; all work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — trains the network on frame directories
//                   (or synthetic videos)
//   2. `colorize` — loads a checkpoint and colorizes every video
//                   under an input directory
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{ColorizeArgs, Commands, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "video-colorizer",
    version = "0.1.0",
    about = "Train a temporally consistent video colorization network, then colorize grayscale frame sequences."
)]
pub struct Cli {
    /// The subcommand to run (train or colorize)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Colorize(args) => run_colorize(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    match args.synthetic {
        Some(n) => tracing::info!("Starting training on {n} synthetic videos"),
        None    => tracing::info!("Starting training on frames in: {}", args.data_dir),
    }

    let summary = TrainUseCase::new(args.into()).execute()?;

    println!(
        "Training complete: {} epochs, {} steps, best val_loss={:.4}. Checkpoint saved.",
        summary.epochs, summary.steps, summary.best_val_loss
    );
    Ok(())
}

fn run_colorize(args: ColorizeArgs) -> Result<()> {
    use crate::application::colorize_use_case::ColorizeUseCase;

    let output_dir = args.output_dir.clone();
    let reports = ColorizeUseCase::new(args.into()).execute()?;

    for r in &reports {
        println!(
            "{:<24} {:>6} frames  {:>3} failed  {:>3} scene cuts{}",
            r.video, r.frames_written, r.failures.len(), r.scene_cuts,
            if r.cancelled { "  (cancelled)" } else { "" },
        );
        for f in &r.failures {
            match f.index {
                Some(i) => println!("    frame {i}: {}", f.reason),
                None    => println!("    {}", f.reason),
            }
        }
    }
    println!("\nOutput written to '{output_dir}'");
    Ok(())
}
