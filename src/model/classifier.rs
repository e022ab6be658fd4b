//! Strain classifier: ResNet backbone with a replaced classification head
//!
//! The original ResNet `fc` layer is swapped for a small head:
//!
//! ```text
//! features (2048) -> Dropout(0.5) -> Linear(2048, 512) -> ReLU -> Dropout(0.3) -> Linear(512, N)
//! ```
//!
//! `forward` returns logits. Softmax is applied by the caller.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{backend::Backend, Tensor},
};

use super::resnet::{ResNet, ResNetConfig};

/// Configuration for the StrainClassifier model
#[derive(Config, Debug)]
pub struct StrainClassifierConfig {
    /// Number of output classes
    #[config(default = "crate::NUM_CLASSES")]
    pub num_classes: usize,

    /// Width of the hidden layer in the head
    #[config(default = 512)]
    pub hidden_units: usize,

    /// Dropout applied to the pooled backbone features
    #[config(default = 0.5)]
    pub input_dropout: f64,

    /// Dropout applied after the hidden layer
    #[config(default = 0.3)]
    pub hidden_dropout: f64,

    /// Backbone layout
    #[config(default = "ResNetConfig::resnet50()")]
    pub backbone: ResNetConfig,
}

impl StrainClassifierConfig {
    /// Build the classifier with freshly initialized weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> StrainClassifier<B> {
        StrainClassifier {
            backbone: self.backbone.init(device),
            head: self.init_head(device),
        }
    }

    /// Build the classifier with ImageNet-pretrained backbone weights
    ///
    /// Only the head starts from random initialization, which is the
    /// starting point for fine-tuning.
    pub fn init_with_pretrained_backbone<B: Backend>(
        &self,
        backbone_weights: &Path,
        device: &B::Device,
    ) -> crate::Result<StrainClassifier<B>> {
        let backbone = self
            .backbone
            .init(device)
            .load_torchvision(backbone_weights, device)?;

        Ok(StrainClassifier {
            backbone,
            head: self.init_head(device),
        })
    }

    fn init_head<B: Backend>(&self, device: &B::Device) -> ClassifierHead<B> {
        ClassifierHead {
            input_dropout: DropoutConfig::new(self.input_dropout).init(),
            hidden: LinearConfig::new(self.backbone.feature_dim(), self.hidden_units).init(device),
            activation: Relu::new(),
            hidden_dropout: DropoutConfig::new(self.hidden_dropout).init(),
            output: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
        }
    }
}

/// Task-specific head replacing the backbone's original classifier
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub input_dropout: Dropout,
    pub hidden: Linear<B>,
    pub activation: Relu,
    pub hidden_dropout: Dropout,
    pub output: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    /// Forward pass: [batch, features] -> [batch, num_classes]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.input_dropout.forward(x);
        let x = self.activation.forward(self.hidden.forward(x));
        let x = self.hidden_dropout.forward(x);
        self.output.forward(x)
    }
}

/// Fine-tuned strain classifier
#[derive(Module, Debug)]
pub struct StrainClassifier<B: Backend> {
    pub backbone: ResNet<B>,
    pub head: ClassifierHead<B>,
}

impl<B: Backend> StrainClassifier<B> {
    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Normalized images of shape [batch_size, 3, 224, 224]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        self.head.forward(features)
    }

    /// Number of output classes, read from the weights of the final layer
    pub fn num_classes(&self) -> usize {
        // Linear weights are stored as [d_input, d_output]
        self.head.output.weight.val().dims()[1]
    }
}
