// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `colorize`, and all
// their configurable flags.
//
// clap's derive macros generate the help text, error messages for
// missing args and the string → number conversions. Enum flags use
// CLI-side ValueEnums that are mapped onto the application types,
// so the application layer never sees clap.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::colorize_use_case::ColorizeRequest;
use crate::application::train_use_case::{BackendKind, TrainConfig};
use crate::ml::loss::{ConditioningSource, TemporalWeightSchedule};
use crate::ml::model::Architecture;
use crate::temporal::motion::MotionMethod;
use crate::temporal::propagator::PropagatorConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the colorization network on frame directories
    Train(TrainArgs),

    /// Colorize grayscale frame sequences with a trained checkpoint
    Colorize(ColorizeArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum BackendArg {
    /// GPU through wgpu
    Wgpu,
    /// CPU through ndarray
    Ndarray,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu    => BackendKind::Wgpu,
            BackendArg::Ndarray => BackendKind::NdArray,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ArchitectureArg {
    Unet,
    Attention,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum MotionArg {
    /// Assume no motion between frames
    Static,
    /// Exhaustive block search
    Block,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ScheduleArg {
    /// Same temporal weight from the first step
    Constant,
    /// Ramp from 0 to the target over --temporal-warmup steps
    Ramp,
    /// 0 until --temporal-warmup steps, then the target
    Delayed,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ConditioningArg {
    /// Warp the previous ground-truth colour
    Truth,
    /// Warp the previous prediction, as at inference time
    Prediction,
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Dataset root; each sub-directory holds one video's frames
    #[arg(long, default_value = "data/dataset")]
    pub data_dir: String,

    /// Where checkpoints, train_config.json and metrics.csv go
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Train on N generated videos instead of --data-dir
    #[arg(long)]
    pub synthetic: Option<usize>,

    #[arg(long, default_value = "colorizer")]
    pub model_name: String,

    #[arg(long, default_value = "v1")]
    pub version: String,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    #[arg(long, value_enum, default_value_t = ArchitectureArg::Unet)]
    pub architecture: ArchitectureArg,

    /// Frame height the network works at; frames are resized on load
    #[arg(long, default_value_t = 64)]
    pub height: usize,

    #[arg(long, default_value_t = 64)]
    pub width: usize,

    /// Channels of the first convolution stage
    #[arg(long, default_value_t = 16)]
    pub base_channels: usize,

    /// Token width of the attention variant
    #[arg(long, default_value_t = 64)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 4)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 2)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Frames per training clip
    #[arg(long, default_value_t = 6)]
    pub clip_len: usize,

    /// Frames between the starts of consecutive clip windows
    #[arg(long, default_value_t = 3)]
    pub clip_stride: usize,

    /// Clips per optimizer step
    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 2e-4)]
    pub lr: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fraction of clips held out for validation
    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f64,

    /// Decoded clips allowed to wait for the training loop
    #[arg(long, default_value_t = 8)]
    pub prefetch_depth: usize,

    #[arg(long, value_enum, default_value_t = ScheduleArg::Ramp)]
    pub temporal_schedule: ScheduleArg,

    /// Target weight of the temporal consistency term
    #[arg(long, default_value_t = 0.5)]
    pub temporal_weight: f64,

    /// Ramp length (ramp) or start step (delayed)
    #[arg(long, default_value_t = 500)]
    pub temporal_warmup: usize,

    /// Weight of the gradient structure term; 0 disables it
    #[arg(long, default_value_t = 0.0)]
    pub gradient_weight: f64,

    #[arg(long, value_enum, default_value_t = ConditioningArg::Truth)]
    pub conditioning: ConditioningArg,

    #[arg(long, value_enum, default_value_t = MotionArg::Block)]
    pub motion: MotionArg,

    #[arg(long, default_value_t = 8)]
    pub block_size: usize,

    #[arg(long, default_value_t = 4)]
    pub search_radius: usize,

    /// Mean confidence below which a transition counts as a scene cut
    #[arg(long, default_value_t = 0.2)]
    pub cut_threshold: f32,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let schedule = match a.temporal_schedule {
            ScheduleArg::Constant => TemporalWeightSchedule::Constant { weight: a.temporal_weight },
            ScheduleArg::Ramp     => TemporalWeightSchedule::LinearRamp { target: a.temporal_weight, warmup_steps: a.temporal_warmup },
            ScheduleArg::Delayed  => TemporalWeightSchedule::Delayed { target: a.temporal_weight, start_step: a.temporal_warmup },
        };
        let method = match a.motion {
            MotionArg::Static => MotionMethod::Static,
            MotionArg::Block  => MotionMethod::BlockMatching,
        };

        TrainConfig {
            data_dir:            a.data_dir,
            out_dir:             a.checkpoint_dir,
            model_name:          a.model_name,
            version:             a.version,
            synthetic_videos:    a.synthetic,
            backend:             a.backend.into(),
            architecture:        match a.architecture {
                ArchitectureArg::Unet      => Architecture::UNet,
                ArchitectureArg::Attention => Architecture::Attention,
            },
            frame_height:        a.height,
            frame_width:         a.width,
            base_channels:       a.base_channels,
            d_model:             a.d_model,
            num_heads:           a.num_heads,
            num_layers:          a.num_layers,
            dropout:             a.dropout,
            clip_len:            a.clip_len,
            clip_stride:         a.clip_stride,
            batch_size:          a.batch_size,
            epochs:              a.epochs,
            lr:                  a.lr,
            seed:                a.seed,
            val_fraction:        a.val_fraction,
            prefetch_depth:      a.prefetch_depth,
            schedule,
            gradient_weight:     a.gradient_weight,
            conditioning_source: match a.conditioning {
                ConditioningArg::Truth      => ConditioningSource::GroundTruth,
                ConditioningArg::Prediction => ConditioningSource::Prediction,
            },
            propagator: PropagatorConfig {
                method,
                block_size:    a.block_size,
                search_radius: a.search_radius,
                cut_threshold: a.cut_threshold,
                ..PropagatorConfig::default()
            },
        }
    }
}

/// All arguments for the `colorize` command
#[derive(Args, Debug)]
pub struct ColorizeArgs {
    /// Directory of grayscale frame sequences, one sub-directory per video
    #[arg(long)]
    pub input_dir: String,

    /// Colorized PNG sequences and report.json are written here
    #[arg(long, default_value = "output")]
    pub output_dir: String,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// How strongly confident warped colour overrides the prediction (0..1)
    #[arg(long, default_value_t = 0.5)]
    pub temporal_blend: f32,

    /// Videos colorized at the same time
    #[arg(long, default_value_t = 2)]
    pub max_concurrent: usize,
}

impl From<ColorizeArgs> for ColorizeRequest {
    fn from(a: ColorizeArgs) -> Self {
        ColorizeRequest {
            input_dir:      a.input_dir,
            output_dir:     a.output_dir,
            checkpoint_dir: a.checkpoint_dir,
            backend:        a.backend.into(),
            temporal_blend: a.temporal_blend,
            max_concurrent: a.max_concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "video-colorizer", "train",
            "--synthetic", "4",
            "--backend", "ndarray",
            "--architecture", "attention",
            "--temporal-schedule", "delayed",
            "--temporal-weight", "0.3",
            "--temporal-warmup", "100",
            "--motion", "static",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = TrainConfig::from(args);

        assert_eq!(cfg.synthetic_videos, Some(4));
        assert_eq!(cfg.backend, BackendKind::NdArray);
        assert_eq!(cfg.architecture, Architecture::Attention);
        assert_eq!(cfg.schedule, TemporalWeightSchedule::Delayed { target: 0.3, start_step: 100 });
        assert_eq!(cfg.propagator.method, MotionMethod::Static);
        assert_eq!(cfg.out_dir, "checkpoints");
    }

    #[test]
    fn test_colorize_requires_input_dir() {
        assert!(Cli::try_parse_from(["video-colorizer", "colorize"]).is_err());
        let cli = Cli::try_parse_from(["video-colorizer", "colorize", "--input-dir", "frames"]).unwrap();
        let Commands::Colorize(args) = cli.command else { panic!("expected colorize") };
        let req = ColorizeRequest::from(args);
        assert_eq!(req.input_dir, "frames");
        assert_eq!(req.temporal_blend, 0.5);
    }
}
