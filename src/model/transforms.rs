//! Image preprocessing shared by training and inference
//!
//! Resize to 224x224, scale to [0, 1], normalize with the ImageNet channel
//! statistics. These must match the values used during training.

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage};

use crate::utils::error::{ClassifierError, Result};

/// Input resolution expected by the classifier
pub const INPUT_SIZE: u32 = 224;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Deterministic preprocessing pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Transforms {
    pub size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub filter: FilterType,
}

/// The preprocessing pipeline the classifier was trained with
pub fn get_transforms() -> Transforms {
    Transforms {
        size: INPUT_SIZE,
        mean: IMAGENET_MEAN,
        std: IMAGENET_STD,
        // Bilinear, as torchvision's Resize
        filter: FilterType::Triangle,
    }
}

impl Transforms {
    /// Resize and normalize an image into a flat CHW vector
    ///
    /// The aspect ratio is not preserved: every non-empty image becomes
    /// exactly `3 x size x size` values.
    pub fn apply(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClassifierError::ImageDecode("image has no pixels".to_string()));
        }

        let resized = image.resize_exact(self.size, self.size, self.filter);
        let rgb = resized.to_rgb8();
        let num_pixels = (self.size * self.size) as usize;

        // CHW layout: all R values, then all G values, then all B values
        let mut normalized = vec![0.0f32; 3 * num_pixels];
        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                normalized[c * num_pixels + i] =
                    (pixel[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }

        Ok(normalized)
    }

    /// Preprocess a single image into a `[1, 3, size, size]` batch tensor
    pub fn to_batch<B: Backend>(&self, image: &DynamicImage, device: &B::Device) -> Result<Tensor<B, 4>> {
        let size = self.size as usize;
        let data = TensorData::new(self.apply(image)?, [1, 3, size, size]);
        Ok(Tensor::from_data(data, device))
    }
}
