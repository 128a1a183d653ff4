//! Particle-free reference image built by averaging frames.

use image::{GrayImage, Luma};

use super::CalibrationError;

/// Running average of N grayscale frames; frozen once N frames were added.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    target_frames: usize,
    frames: usize,
    size: Option<[u32; 2]>,
    accum: Vec<f64>,
    frozen: Option<GrayImage>,
}

impl BackgroundModel {
    pub fn new(target_frames: usize) -> Self {
        Self {
            target_frames: target_frames.max(1),
            frames: 0,
            size: None,
            accum: Vec::new(),
            frozen: None,
        }
    }

    /// Wrap an already averaged image (e.g. loaded from disk).
    pub fn from_image(image: GrayImage) -> Self {
        let size = image.dimensions();
        Self {
            target_frames: 1,
            frames: 1,
            size: Some([size.0, size.1]),
            accum: Vec::new(),
            frozen: Some(image),
        }
    }

    /// Accumulate one frame. Returns `true` once the model is complete.
    ///
    /// Frames added after completion are ignored.
    pub fn add_frame(&mut self, frame: &GrayImage) -> Result<bool, CalibrationError> {
        if self.frozen.is_some() {
            return Ok(true);
        }
        let got = [frame.width(), frame.height()];
        match self.size {
            Some(expected) if expected != got => {
                return Err(CalibrationError::FrameSizeMismatch { expected, got });
            }
            Some(_) => {}
            None => {
                self.size = Some(got);
                self.accum = vec![0.0; frame.as_raw().len()];
            }
        }

        for (acc, &v) in self.accum.iter_mut().zip(frame.as_raw()) {
            *acc += v as f64;
        }
        self.frames += 1;
        tracing::debug!("background frame {}/{}", self.frames, self.target_frames);

        if self.frames >= self.target_frames {
            let n = self.frames as f64;
            let [w, h] = got;
            let pixels: Vec<u8> = self
                .accum
                .iter()
                .map(|a| (a / n).round().clamp(0.0, 255.0) as u8)
                .collect();
            let image = GrayImage::from_raw(w, h, pixels).unwrap_or_else(|| GrayImage::from_pixel(w, h, Luma([0])));
            self.frozen = Some(image);
            self.accum = Vec::new();
            tracing::info!("background model complete ({} frames)", self.frames);
        }
        Ok(self.is_ready())
    }

    pub fn is_ready(&self) -> bool {
        self.frozen.is_some()
    }

    /// The averaged image, once complete.
    pub fn image(&self) -> Option<&GrayImage> {
        self.frozen.as_ref()
    }

    pub fn frames_collected(&self) -> usize {
        self.frames
    }

    pub fn target_frames(&self) -> usize {
        self.target_frames
    }

    pub fn reset(&mut self) {
        self.frames = 0;
        self.size = None;
        self.accum = Vec::new();
        self.frozen = None;
    }
}
