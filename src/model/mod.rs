//! Model module for the strain classifier using the Burn framework
//!
//! This module provides:
//! - The ResNet backbone (torchvision layout)
//! - The classifier with its replacement head
//! - The preprocessing pipeline the network expects
//!
//! ## Architecture
//!
//! A ResNet-50 pretrained on ImageNet provides 2048-dimensional features;
//! the fine-tuned head maps them to one logit per strain.

pub mod classifier;
pub mod resnet;
pub mod transforms;

// Re-export main types for convenience
pub use classifier::{ClassifierHead, StrainClassifier, StrainClassifierConfig};
pub use resnet::{ResNet, ResNetConfig};
pub use transforms::{get_transforms, Transforms};
