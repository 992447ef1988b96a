/// Tesseract-backed text recognition for the offer-text gate.
use image::{GrayImage, Luma};
use leptess::{LepTess, Variable};

use crate::error::RecognizeError;
use crate::filter::{TextRecognizer, TextToken};
use crate::frame::Frame;

/// OCR adapter that reuses one Tesseract instance across cycles.
///
/// Frames are binarized with an automatic Otsu threshold before
/// recognition; dark-on-light text is normalized by auto-inverting when
/// the binarized image is mostly white. Tokens come back one per text
/// line with the engine's mean confidence and the scanned frame's bounds;
/// line-level geometry is all the gate needs.
pub struct OcrRecognizer {
    tess: LepTess,
}

impl OcrRecognizer {
    pub fn new() -> Result<Self, RecognizeError> {
        let mut tess =
            LepTess::new(None, "eng").map_err(|e| RecognizeError::InitFailed(Box::new(e)))?;

        // PSM 3 = fully automatic page segmentation, searches the whole image.
        tess.set_variable(Variable::TesseditPagesegMode, "3")
            .map_err(|e| RecognizeError::InitFailed(Box::new(e)))?;

        Ok(Self { tess })
    }

    /// Binarize with Otsu's method, inverting when text appears light.
    fn preprocess(frame: &Frame) -> GrayImage {
        let (width, height) = (frame.width(), frame.height());
        let mut gray = GrayImage::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let [r, g, b] = frame.rgb(x, y);
                // Fixed-point luma: (77*R + 150*G + 29*B) / 256
                let value = ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8;
                gray.put_pixel(x, y, Luma([value]));
            }
        }

        let threshold = Self::otsu_threshold(&gray);
        let mut binary = GrayImage::new(width, height);
        for (x, y, pixel) in gray.enumerate_pixels() {
            let value = if pixel[0] >= threshold { 255 } else { 0 };
            binary.put_pixel(x, y, Luma([value]));
        }

        let white_pixels = binary.pixels().filter(|p| p[0] > 127).count();
        if white_pixels > (width * height) as usize / 2 {
            image::imageops::invert(&mut binary);
        }

        binary
    }

    /// Calculate optimal threshold using Otsu's method
    fn otsu_threshold(gray: &GrayImage) -> u8 {
        let mut histogram = [0u32; 256];
        for pixel in gray.pixels() {
            histogram[pixel[0] as usize] += 1;
        }

        let total_pixels = gray.width() * gray.height();

        let mut sum = 0u64;
        for (i, count) in histogram.iter().enumerate() {
            sum += (i as u64) * (*count as u64);
        }

        let mut sum_background = 0u64;
        let mut weight_background = 0u32;
        let mut max_variance = 0.0;
        let mut threshold = 0u8;

        for (i, count) in histogram.iter().enumerate() {
            weight_background += count;
            if weight_background == 0 {
                continue;
            }

            let weight_foreground = total_pixels - weight_background;
            if weight_foreground == 0 {
                break;
            }

            sum_background += (i as u64) * (*count as u64);

            let mean_background = sum_background as f64 / weight_background as f64;
            let mean_foreground = (sum - sum_background) as f64 / weight_foreground as f64;

            let variance = (weight_background as f64)
                * (weight_foreground as f64)
                * (mean_background - mean_foreground).powi(2);

            if variance > max_variance {
                max_variance = variance;
                threshold = i as u8;
            }
        }

        threshold
    }
}

impl TextRecognizer for OcrRecognizer {
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<TextToken>, RecognizeError> {
        let binary = Self::preprocess(frame);

        // leptess wants a file path; round-trip through the temp dir.
        let temp_path = std::env::temp_dir().join("offer-sniper-ocr.png");
        binary
            .save(&temp_path)
            .map_err(|e| RecognizeError::RecognitionFailed(Box::new(e)))?;

        self.tess
            .set_image(&temp_path)
            .map_err(|e| RecognizeError::RecognitionFailed(Box::new(e)))?;
        let text = self
            .tess
            .get_utf8_text()
            .map_err(|e| RecognizeError::RecognitionFailed(Box::new(e)))?;
        let confidence = (self.tess.mean_text_conf().max(0) as f32 / 100.0).min(1.0);

        let _ = std::fs::remove_file(&temp_path);

        let bounds = (0, 0, frame.width(), frame.height());
        let tokens = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| TextToken {
                text: line.to_string(),
                confidence,
                bounds,
            })
            .collect();

        Ok(tokens)
    }
}
