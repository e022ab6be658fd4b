//! ResNet backbone
//!
//! Bottleneck ResNet following the torchvision layout (stride on the 3x3
//! convolution, "v1.5"), without the final fully connected layer. Field
//! names mirror the PyTorch module tree so state dicts map onto it with a
//! handful of key remaps (see `inference::checkpoint`).

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::info;

// No `Result` alias in scope: `derive(Config)` emits two-argument `Result`s
use crate::utils::error::ClassifierError;

/// Configuration for the ResNet backbone
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of bottleneck blocks per stage (ResNet-50: 3, 4, 6, 3)
    #[config(default = "[3, 4, 6, 3]")]
    pub blocks: [usize; 4],

    /// Channel width of the stem and of the first stage
    #[config(default = 64)]
    pub base_channels: usize,

    /// Bottleneck expansion factor
    #[config(default = 4)]
    pub expansion: usize,
}

impl ResNetConfig {
    /// Standard ResNet-50 layout
    pub fn resnet50() -> Self {
        Self::new()
    }

    /// Width of the pooled feature vector (2048 for ResNet-50)
    pub fn feature_dim(&self) -> usize {
        self.base_channels * 8 * self.expansion
    }

    /// Build the backbone with freshly initialized weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let conv1 = Conv2dConfig::new([3, self.base_channels], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(self.base_channels).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        // Stage widths: base, 2x, 4x, 8x; every stage but the first halves H and W
        let mut in_channels = self.base_channels;
        let mut stage = 0;
        let [layer1, layer2, layer3, layer4] = self.blocks.map(|num_blocks| {
            let width = self.base_channels << stage;
            let stride = if stage == 0 { 1 } else { 2 };
            stage += 1;

            (0..num_blocks)
                .map(|i| {
                    let block = Bottleneck::new(
                        in_channels,
                        width,
                        self.expansion,
                        if i == 0 { stride } else { 1 },
                        device,
                    );
                    in_channels = width * self.expansion;
                    block
                })
                .collect::<Vec<Bottleneck<B>>>()
        });

        ResNet {
            conv1,
            bn1,
            relu: Relu::new(),
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }
}

/// 1x1 projection used on the residual path when shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Bottleneck residual block: 1x1 reduce -> 3x3 -> 1x1 expand
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B>,
    pub conv3: Conv2d<B>,
    pub bn3: BatchNorm<B>,
    pub downsample: Option<Downsample<B>>,
    pub relu: Relu,
}

impl<B: Backend> Bottleneck<B> {
    /// Create a bottleneck block
    pub fn new(
        in_channels: usize,
        width: usize,
        expansion: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let out_channels = width * expansion;

        let conv1 = Conv2dConfig::new([in_channels, width], [1, 1])
            .with_bias(false)
            .init(device);
        let conv2 = Conv2dConfig::new([width, width], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let conv3 = Conv2dConfig::new([width, out_channels], [1, 1])
            .with_bias(false)
            .init(device);

        let downsample = (stride != 1 || in_channels != out_channels).then(|| Downsample {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        });

        Self {
            conv1,
            bn1: BatchNormConfig::new(width).init(device),
            conv2,
            bn2: BatchNormConfig::new(width).init(device),
            conv3,
            bn3: BatchNormConfig::new(out_channels).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.relu.forward(self.bn2.forward(self.conv2.forward(out)));
        let out = self.bn3.forward(self.conv3.forward(out));

        self.relu.forward(out + identity)
    }
}

/// ResNet feature extractor (everything up to and including global pooling)
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B>,
    pub relu: Relu,
    pub maxpool: MaxPool2d,
    pub layer1: Vec<Bottleneck<B>>,
    pub layer2: Vec<Bottleneck<B>>,
    pub layer3: Vec<Bottleneck<B>>,
    pub layer4: Vec<Bottleneck<B>>,
    pub avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> ResNet<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Pooled features of shape [batch_size, feature_dim]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.relu.forward(self.bn1.forward(x));
        let x = self.maxpool.forward(x);

        let x = self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
            .fold(x, |x, block| block.forward(x));

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    /// Load torchvision ImageNet weights (e.g. `resnet50-0676ba61.pth`)
    ///
    /// The original `fc.*` entries of the file are ignored.
    pub fn load_torchvision(
        self,
        path: &Path,
        device: &B::Device,
    ) -> crate::Result<Self> {
        if !path.exists() {
            return Err(ClassifierError::MissingModelFile(path.to_path_buf()));
        }

        let args = LoadArgs::new(path.to_path_buf())
            .with_key_remap(r"(.*)downsample\.0\.(.*)", "${1}downsample.conv.${2}")
            .with_key_remap(r"(.*)downsample\.1\.(.*)", "${1}downsample.bn.${2}");

        let record: ResNetRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(args, device)
            .map_err(|e| {
                ClassifierError::CheckpointLoad(format!(
                    "backbone weights {}: {:?}",
                    path.display(),
                    e
                ))
            })?;

        info!("Loaded pretrained backbone weights from {:?}", path);
        Ok(self.load_record(record))
    }
}
