// ============================================================
// Layer 3 — Frame Types
// ============================================================
// A frame is split into a read-only luminance plane and an
// optional chrominance pair. Raw grayscale input has no chroma;
// chroma appears once it is either loaded as ground truth or
// predicted by the network.
//
// The luminance plane is never mutated once a LumaFrame exists:
// the only way to get at the pixels is a shared borrow.

use std::fmt;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::domain::error::{ColorizeError, ColorizeResult};

/// Spatial size of every frame a model is trained / deployed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub height: usize,
    pub width: usize,
}

impl Resolution {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn pixels(&self) -> usize {
        self.height * self.width
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Single-channel intensity plane in [0, 1], shape [H, W].
#[derive(Debug, Clone, PartialEq)]
pub struct LumaFrame {
    /// Position of this frame in its source video
    index: usize,
    data: Array2<f32>,
}

impl LumaFrame {
    pub fn new(index: usize, data: Array2<f32>) -> Self {
        Self { index, data }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn resolution(&self) -> Resolution {
        let (height, width) = self.data.dim();
        Resolution { height, width }
    }

    /// Reject frames the network must never see: wrong size or any
    /// NaN / infinite sample.
    pub fn validate(&self, expected: Resolution) -> ColorizeResult<()> {
        let actual = self.resolution();
        if actual != expected {
            return Err(ColorizeError::malformed(
                self.index,
                format!("resolution {actual} does not match model resolution {expected}"),
            ));
        }
        if let Some(bad) = self.data.iter().position(|v| !v.is_finite()) {
            return Err(ColorizeError::malformed(
                self.index,
                format!("non-finite luminance at sample {bad}"),
            ));
        }
        Ok(())
    }
}

/// Chrominance pair in [-1, 1], shape [2, H, W] (a* then b*).
#[derive(Debug, Clone, PartialEq)]
pub struct ChromaFrame {
    data: Array3<f32>,
}

impl ChromaFrame {
    pub fn new(data: Array3<f32>) -> Self {
        assert_eq!(data.dim().0, 2, "chroma must have exactly two channels");
        Self { data }
    }

    /// Zero chroma, i.e. a gray image. Used as neutral conditioning.
    pub fn neutral(resolution: Resolution) -> Self {
        Self { data: Array3::zeros((2, resolution.height, resolution.width)) }
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn into_data(self) -> Array3<f32> {
        self.data
    }

    pub fn resolution(&self) -> Resolution {
        let (_, height, width) = self.data.dim();
        Resolution { height, width }
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// A luminance plane plus chroma once it is known.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub luma: LumaFrame,
    pub chroma: Option<ChromaFrame>,
}

impl Frame {
    pub fn grayscale(luma: LumaFrame) -> Self {
        Self { luma, chroma: None }
    }

    pub fn with_chroma(luma: LumaFrame, chroma: ChromaFrame) -> Self {
        Self { luma, chroma: Some(chroma) }
    }

    /// Attach predicted chroma. The luminance plane moves through untouched.
    pub fn colorize(self, chroma: ChromaFrame) -> Self {
        Self { luma: self.luma, chroma: Some(chroma) }
    }

    /// Drop chroma and hand back the original luminance.
    pub fn into_luma(self) -> LumaFrame {
        self.luma
    }

    pub fn index(&self) -> usize {
        self.luma.index()
    }

    pub fn is_colorized(&self) -> bool {
        self.chroma.is_some()
    }
}
