// ============================================================
// Layer 4 — Frame Batcher
// ============================================================
// Bridges host frames (ndarray) and Burn tensors.
//
// How batching works here:
//   Input:  N frames — one per clip — taken at the same time step
//   Output: FrameBatch with
//             luma   [N, 1, H, W]
//             chroma [N, 2, H, W]   (only when every frame has it)
//
// Because every clip in a batch has the same length, stacking
// frame t of each clip gives one forward pass per time step while
// each clip's own frame loop stays strictly sequential.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};
use ndarray::Array3;

use crate::domain::frame::{ChromaFrame, Frame, LumaFrame};
use crate::temporal::propagator::Conditioning;

/// One time step of a batch of clips.
#[derive(Debug, Clone)]
pub struct FrameBatch<B: Backend> {
    /// [batch, 1, H, W]
    pub luma: Tensor<B, 4>,

    /// [batch, 2, H, W] ground truth, absent for grayscale input
    pub chroma: Option<Tensor<B, 4>>,
}

#[derive(Clone, Debug)]
pub struct FrameBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> FrameBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn luma(&self, frames: &[&LumaFrame]) -> Tensor<B, 4> {
        let (h, w) = frames[0].data().dim();
        let flat: Vec<f32> = frames.iter().flat_map(|f| f.data().iter().copied()).collect();
        Tensor::from_data(TensorData::new(flat, [frames.len(), 1, h, w]), &self.device)
    }

    pub fn chroma(&self, frames: &[&ChromaFrame]) -> Tensor<B, 4> {
        let (_, h, w) = frames[0].data().dim();
        let flat: Vec<f32> = frames.iter().flat_map(|f| f.data().iter().copied()).collect();
        Tensor::from_data(TensorData::new(flat, [frames.len(), 2, h, w]), &self.device)
    }

    /// Conditioning tensor [batch, 3, H, W]: warped a*, warped b*, confidence.
    pub fn conditioning(&self, conditions: &[Conditioning]) -> Tensor<B, 4> {
        let (_, h, w) = conditions[0].warped.dim();
        let flat: Vec<f32> = conditions
            .iter()
            .flat_map(|c| c.warped.iter().chain(c.mask.iter()).copied())
            .collect();
        Tensor::from_data(TensorData::new(flat, [conditions.len(), 3, h, w]), &self.device)
    }
}

impl<'a, B: Backend> Batcher<B, &'a Frame, FrameBatch<B>> for FrameBatcher<B> {
    fn batch(&self, items: Vec<&'a Frame>, _device: &B::Device) -> FrameBatch<B> {
        let lumas: Vec<&LumaFrame> = items.iter().map(|f| &f.luma).collect();
        let chromas: Option<Vec<&ChromaFrame>> = items.iter().map(|f| f.chroma.as_ref()).collect();

        FrameBatch {
            luma: self.luma(&lumas),
            chroma: chromas.map(|c| self.chroma(&c)),
        }
    }
}

/// Split a [N, 2, H, W] prediction back into host chroma frames.
pub fn chroma_frames<B: Backend>(prediction: Tensor<B, 4>) -> Result<Vec<ChromaFrame>, String> {
    let [n, c, h, w] = prediction.dims();
    let flat = prediction
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| format!("cannot read prediction back: {e:?}"))?;

    flat.chunks(c * h * w)
        .take(n)
        .map(|chunk| {
            Array3::from_shape_vec((c, h, w), chunk.to_vec())
                .map(ChromaFrame::new)
                .map_err(|e| e.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use ndarray::Array2;

    type TestBackend = NdArray;

    fn frame(index: usize, v: f32) -> Frame {
        Frame::with_chroma(
            LumaFrame::new(index, Array2::from_elem((3, 5), v)),
            ChromaFrame::new(Array3::from_shape_fn((2, 3, 5), |(c, y, x)| c as f32 - 0.1 * (y + x) as f32)),
        )
    }

    #[test]
    fn test_batch_shapes() {
        let batcher = FrameBatcher::<TestBackend>::new(Default::default());
        let (a, b) = (frame(0, 0.2), frame(0, 0.7));
        let batch = batcher.batch(vec![&a, &b], &batcher.device);
        assert_eq!(batch.luma.dims(), [2, 1, 3, 5]);
        assert_eq!(batch.chroma.unwrap().dims(), [2, 2, 3, 5]);
    }

    #[test]
    fn test_grayscale_frames_have_no_chroma_tensor() {
        let batcher = FrameBatcher::<TestBackend>::new(Default::default());
        let gray = Frame::grayscale(LumaFrame::new(0, Array2::zeros((3, 5))));
        assert!(batcher.batch(vec![&gray], &batcher.device).chroma.is_none());
    }

    #[test]
    fn test_chroma_survives_tensor_round_trip() {
        let batcher = FrameBatcher::<TestBackend>::new(Default::default());
        let (a, b) = (frame(0, 0.2), frame(1, 0.4));
        let tensor = batcher.chroma(&[a.chroma.as_ref().unwrap(), b.chroma.as_ref().unwrap()]);
        let back = chroma_frames(tensor).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(&back[1], b.chroma.as_ref().unwrap());
    }
}
