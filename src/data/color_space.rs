// ============================================================
// Layer 4 — ColorSpace Codec
// ============================================================
// sRGB (8-bit) ↔ CIE L*a*b* (D65) conversion, and the split /
// merge between full-colour images and luminance + chrominance
// frames.
//
// Normalisation used everywhere in the crate:
//   luma   = L* / 100        ∈ [0, 1]
//   chroma = (a*, b*) / 128  ∈ [-1, 1] (clamped)

use image::{Rgb, RgbImage};
use ndarray::{Array2, Array3};

use crate::domain::frame::{ChromaFrame, Frame, LumaFrame};

pub const LUMA_SCALE: f32 = 100.0;
pub const CHROMA_SCALE: f32 = 128.0;

// D65 reference white
const XN: f32 = 0.950_47;
const YN: f32 = 1.0;
const ZN: f32 = 1.088_83;

const DELTA: f32 = 6.0 / 29.0;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

/// 8-bit sRGB → (L*, a*, b*), unnormalised.
pub fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(|c| srgb_to_linear(c as f32 / 255.0));

    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
    let z = 0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b;

    let (fx, fy, fz) = (lab_f(x / XN), lab_f(y / YN), lab_f(z / ZN));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// (L*, a*, b*) → 8-bit sRGB, out-of-gamut values clipped.
pub fn lab_to_rgb(lab: [f32; 3]) -> [u8; 3] {
    let [l, a, b] = lab;
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let x = XN * lab_f_inv(fx);
    let y = YN * lab_f_inv(fy);
    let z = ZN * lab_f_inv(fz);

    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z;
    let b = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;

    [r, g, b].map(|c| (linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// Luminance plane only. Used for grayscale inference input, where
/// whatever colour the source file has is discarded.
pub fn luma_from_rgb(image: &RgbImage, index: usize) -> LumaFrame {
    let (w, h) = image.dimensions();
    let data = Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        rgb_to_lab(image.get_pixel(x as u32, y as u32).0)[0] / LUMA_SCALE
    });
    LumaFrame::new(index, data)
}

/// Split a colour image into luma + ground-truth chroma.
pub fn split_rgb(image: &RgbImage, index: usize) -> Frame {
    let (w, h) = image.dimensions();
    let (h, w) = (h as usize, w as usize);
    let mut luma = Array2::zeros((h, w));
    let mut chroma = Array3::zeros((2, h, w));

    for (x, y, px) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [l, a, b] = rgb_to_lab(px.0);
        luma[[y, x]] = l / LUMA_SCALE;
        chroma[[0, y, x]] = (a / CHROMA_SCALE).clamp(-1.0, 1.0);
        chroma[[1, y, x]] = (b / CHROMA_SCALE).clamp(-1.0, 1.0);
    }

    Frame::with_chroma(LumaFrame::new(index, luma), ChromaFrame::new(chroma))
}

/// Merge luma + chroma back into a displayable image. A frame without
/// chroma renders as gray.
pub fn merge_to_rgb(frame: &Frame) -> RgbImage {
    let luma = frame.luma.data();
    let (h, w) = luma.dim();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let (a, b) = match &frame.chroma {
            Some(c) => (c.data()[[0, y, x]], c.data()[[1, y, x]]),
            None => (0.0, 0.0),
        };
        Rgb(lab_to_rgb([luma[[y, x]] * LUMA_SCALE, a * CHROMA_SCALE, b * CHROMA_SCALE]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_has_no_chroma() {
        for v in [0u8, 17, 128, 200, 255] {
            let [_, a, b] = rgb_to_lab([v, v, v]);
            assert!(a.abs() < 1e-2 && b.abs() < 1e-2, "gray {v} gave a={a} b={b}");
        }
    }

    #[test]
    fn test_white_and_black_luminance() {
        assert!((rgb_to_lab([255, 255, 255])[0] - 100.0).abs() < 0.1);
        assert!(rgb_to_lab([0, 0, 0])[0].abs() < 0.1);
    }

    #[test]
    fn test_rgb_lab_rgb_is_close() {
        for rgb in [[255u8, 0, 0], [12, 200, 40], [30, 60, 220], [250, 240, 10], [90, 90, 91]] {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for c in 0..3 {
                assert!((back[c] as i32 - rgb[c] as i32).abs() <= 1, "{rgb:?} → {back:?}");
            }
        }
    }

    #[test]
    fn test_split_then_merge_preserves_image() {
        let img = RgbImage::from_fn(6, 4, |x, y| Rgb([(x * 40) as u8, (y * 60) as u8, 128]));
        let frame = split_rgb(&img, 0);
        assert_eq!(frame.luma.data().dim(), (4, 6));
        let back = merge_to_rgb(&frame);
        for (p, q) in img.pixels().zip(back.pixels()) {
            for c in 0..3 {
                assert!((p.0[c] as i32 - q.0[c] as i32).abs() <= 2);
            }
        }
    }

    #[test]
    fn test_luma_from_rgb_matches_split() {
        let img = RgbImage::from_fn(3, 3, |x, y| Rgb([(x * 80) as u8, 30, (y * 90) as u8]));
        assert_eq!(luma_from_rgb(&img, 5), split_rgb(&img, 5).luma);
    }
}
