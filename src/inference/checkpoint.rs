//! Checkpoint loading
//!
//! Trained weights arrive either as a PyTorch pickle (`.pt` / `.pth`) or as
//! a native burn record (`.mpk`). PyTorch files come in two layouts: an
//! envelope dict holding `model_state_dict` next to training metadata, or
//! the bare state dict. Both are tried, envelope first.
//!
//! burn's `load_record` does not validate tensor shapes, so every record is
//! checked against the configured architecture before it is applied.

use std::fmt;
use std::path::Path;

use burn::{
    module::{Module, Param},
    nn::{conv::Conv2dRecord, BatchNormRecord, LinearRecord},
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{backend::Backend, Tensor},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::{debug, info};

use crate::model::classifier::StrainClassifierRecord;
use crate::model::resnet::BottleneckRecord;
use crate::model::{StrainClassifier, StrainClassifierConfig};
use crate::utils::error::{ClassifierError, Result};

/// Key under which training scripts store the weights in an envelope
pub const STATE_DICT_KEY: &str = "model_state_dict";

/// PyTorch module paths -> burn module paths
///
/// The head lived in `backbone.fc` as an `nn.Sequential`; indices 1 and 4
/// are its two linear layers (0 and 3 are dropout, 2 is ReLU).
const KEY_REMAPS: [(&str, &str); 4] = [
    (r"(.*)downsample\.0\.(.*)", "${1}downsample.conv.${2}"),
    (r"(.*)downsample\.1\.(.*)", "${1}downsample.bn.${2}"),
    (r"^backbone\.fc\.1\.(.+)", "head.hidden.$1"),
    (r"^backbone\.fc\.4\.(.+)", "head.output.$1"),
];

/// On-disk encoding, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    PyTorch,
    Native,
}

impl CheckpointFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("pt") | Some("pth") => Ok(CheckpointFormat::PyTorch),
            Some("mpk") => Ok(CheckpointFormat::Native),
            _ => Err(ClassifierError::CheckpointLoad(format!(
                "unsupported checkpoint format: {}",
                path.display()
            ))),
        }
    }
}

/// Which layout the weights were found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointLayout {
    /// PyTorch dict with the weights under `model_state_dict`
    Envelope,
    /// PyTorch state dict at the top level
    StateDict,
    /// burn named MessagePack record
    Native,
}

impl fmt::Display for CheckpointLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointLayout::Envelope => write!(f, "pytorch envelope ({})", STATE_DICT_KEY),
            CheckpointLayout::StateDict => write!(f, "pytorch state dict"),
            CheckpointLayout::Native => write!(f, "burn record (mpk)"),
        }
    }
}

fn pytorch_args(path: &Path) -> LoadArgs {
    KEY_REMAPS
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
            args.with_key_remap(pattern, replacement)
        })
}

/// Read a classifier record from disk
///
/// Returns the record together with the layout that decoded it. A PyTorch
/// file that fits neither layout yields one `CheckpointLoad` error naming
/// both failures.
pub fn load_record<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(StrainClassifierRecord<B>, CheckpointLayout)> {
    if !path.exists() {
        return Err(ClassifierError::MissingModelFile(path.to_path_buf()));
    }

    match CheckpointFormat::from_path(path)? {
        CheckpointFormat::PyTorch => {
            let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();

            let envelope_err = match recorder.load(pytorch_args(path).with_top_level_key(STATE_DICT_KEY), device) {
                Ok(record) => return Ok((record, CheckpointLayout::Envelope)),
                Err(e) => e,
            };
            debug!("Not an envelope checkpoint ({:?}), trying bare state dict", envelope_err);

            match recorder.load(pytorch_args(path), device) {
                Ok(record) => Ok((record, CheckpointLayout::StateDict)),
                Err(bare_err) => Err(ClassifierError::CheckpointLoad(format!(
                    "{}: as envelope: {:?}; as state dict: {:?}",
                    path.display(),
                    envelope_err,
                    bare_err
                ))),
            }
        }
        CheckpointFormat::Native => NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.to_path_buf(), device)
            .map(|record| (record, CheckpointLayout::Native))
            .map_err(|e| ClassifierError::CheckpointLoad(format!("{}: {:?}", path.display(), e))),
    }
}

fn expect_dims(what: &str, actual: &[usize], expected: &[usize]) -> Result<()> {
    if actual != expected {
        return Err(ClassifierError::ShapeMismatch(format!(
            "{}: checkpoint has {:?}, model expects {:?}",
            what, actual, expected
        )));
    }
    Ok(())
}

/// Every tensor of a record in module order, keyed by its burn path
#[derive(Default)]
struct ParamShapes(Vec<(String, Vec<usize>)>);

impl ParamShapes {
    fn of<B: Backend>(record: &StrainClassifierRecord<B>) -> Self {
        let mut shapes = Self::default();
        let backbone = &record.backbone;

        shapes.conv("backbone.conv1", &backbone.conv1);
        shapes.batch_norm("backbone.bn1", &backbone.bn1);
        let stages = [&backbone.layer1, &backbone.layer2, &backbone.layer3, &backbone.layer4];
        for (i, stage) in stages.iter().enumerate() {
            for (j, block) in stage.iter().enumerate() {
                shapes.bottleneck(&format!("backbone.layer{}.{}", i + 1, j), block);
            }
        }
        shapes.linear("head.hidden", &record.head.hidden);
        shapes.linear("head.output", &record.head.output);
        shapes
    }

    fn param<B: Backend, const D: usize>(&mut self, name: String, param: &Param<Tensor<B, D>>) {
        self.0.push((name, param.val().dims().to_vec()));
    }

    fn conv<B: Backend>(&mut self, prefix: &str, conv: &Conv2dRecord<B>) {
        self.param(format!("{}.weight", prefix), &conv.weight);
        if let Some(bias) = &conv.bias {
            self.param(format!("{}.bias", prefix), bias);
        }
    }

    fn batch_norm<B: Backend>(&mut self, prefix: &str, bn: &BatchNormRecord<B>) {
        self.param(format!("{}.gamma", prefix), &bn.gamma);
        self.param(format!("{}.beta", prefix), &bn.beta);
        self.param(format!("{}.running_mean", prefix), &bn.running_mean);
        self.param(format!("{}.running_var", prefix), &bn.running_var);
    }

    fn linear<B: Backend>(&mut self, prefix: &str, linear: &LinearRecord<B>) {
        self.param(format!("{}.weight", prefix), &linear.weight);
        if let Some(bias) = &linear.bias {
            self.param(format!("{}.bias", prefix), bias);
        }
    }

    fn bottleneck<B: Backend>(&mut self, prefix: &str, block: &BottleneckRecord<B>) {
        self.conv(&format!("{}.conv1", prefix), &block.conv1);
        self.batch_norm(&format!("{}.bn1", prefix), &block.bn1);
        self.conv(&format!("{}.conv2", prefix), &block.conv2);
        self.batch_norm(&format!("{}.bn2", prefix), &block.bn2);
        self.conv(&format!("{}.conv3", prefix), &block.conv3);
        self.batch_norm(&format!("{}.bn3", prefix), &block.bn3);
        if let Some(downsample) = &block.downsample {
            self.conv(&format!("{}.downsample.conv", prefix), &downsample.conv);
            self.batch_norm(&format!("{}.downsample.bn", prefix), &downsample.bn);
        }
    }

    /// First tensor whose name or shape differs from `expected`
    fn compare(&self, expected: &ParamShapes) -> Result<()> {
        for (i, (name, dims)) in expected.0.iter().enumerate() {
            match self.0.get(i) {
                Some((found, _)) if found != name => {
                    return Err(ClassifierError::ShapeMismatch(format!(
                        "{}: checkpoint has {} in its place",
                        name, found
                    )));
                }
                Some((_, found)) => expect_dims(name, found, dims)?,
                None => {
                    return Err(ClassifierError::ShapeMismatch(format!(
                        "{}: missing from checkpoint",
                        name
                    )));
                }
            }
        }

        match self.0.get(expected.0.len()) {
            Some((extra, _)) => Err(ClassifierError::ShapeMismatch(format!(
                "{}: not part of the model",
                extra
            ))),
            None => Ok(()),
        }
    }
}

/// Validate a record against the architecture and return its output width
///
/// Depth and head widths are checked first. The record is then compared
/// tensor by tensor against a freshly built classifier of the same width,
/// biases and BatchNorm running statistics included.
pub fn check_record<B: Backend>(
    record: &StrainClassifierRecord<B>,
    config: &StrainClassifierConfig,
    device: &B::Device,
) -> Result<usize> {
    let backbone = &config.backbone;

    expect_dims(
        "backbone.conv1.weight",
        &record.backbone.conv1.weight.val().dims(),
        &[backbone.base_channels, 3, 7, 7],
    )?;

    let stages = [
        &record.backbone.layer1,
        &record.backbone.layer2,
        &record.backbone.layer3,
        &record.backbone.layer4,
    ];
    for (i, (stage, &expected)) in stages.iter().zip(backbone.blocks.iter()).enumerate() {
        if stage.len() != expected {
            return Err(ClassifierError::ShapeMismatch(format!(
                "backbone.layer{}: checkpoint has {} blocks, model expects {}",
                i + 1,
                stage.len(),
                expected
            )));
        }
    }

    expect_dims(
        "head.hidden.weight",
        &record.head.hidden.weight.val().dims(),
        &[backbone.feature_dim(), config.hidden_units],
    )?;

    let output = record.head.output.weight.val().dims();
    if output[0] != config.hidden_units {
        return Err(ClassifierError::ShapeMismatch(format!(
            "head.output.weight: checkpoint input width {}, model expects {}",
            output[0], config.hidden_units
        )));
    }
    let num_classes = output[1];

    let reference = config
        .clone()
        .with_num_classes(num_classes)
        .init::<B>(device)
        .into_record();
    ParamShapes::of(record).compare(&ParamShapes::of(&reference))?;

    Ok(num_classes)
}

/// Write a classifier as a native burn record
pub fn save_checkpoint<B: Backend>(model: &StrainClassifier<B>, path: &Path) -> Result<()> {
    model
        .clone()
        .save_file(path.to_path_buf(), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|e| ClassifierError::CheckpointLoad(format!("failed to save {}: {:?}", path.display(), e)))?;

    info!("Saved checkpoint to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResNetConfig;
    use burn::backend::NdArray;
    use burn::nn::conv::Conv2dConfig;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    /// Checkpoints written by `testdata/export_tiny_checkpoints.py`
    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("src/inference/testdata")
            .join(name)
    }

    fn tiny_config(num_classes: usize) -> StrainClassifierConfig {
        StrainClassifierConfig::new()
            .with_num_classes(num_classes)
            .with_hidden_units(16)
            .with_backbone(
                ResNetConfig::new()
                    .with_blocks([1, 1, 1, 1])
                    .with_base_channels(4),
            )
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CheckpointFormat::from_path(Path::new("model.pt")).unwrap(), CheckpointFormat::PyTorch);
        assert_eq!(CheckpointFormat::from_path(Path::new("a/b.pth")).unwrap(), CheckpointFormat::PyTorch);
        assert_eq!(CheckpointFormat::from_path(Path::new("model.mpk")).unwrap(), CheckpointFormat::Native);
        assert!(matches!(
            CheckpointFormat::from_path(Path::new("model.onnx")),
            Err(ClassifierError::CheckpointLoad(_))
        ));
        assert!(CheckpointFormat::from_path(Path::new("model")).is_err());
    }

    #[test]
    fn test_native_roundtrip_and_check() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.mpk");
        let device = Default::default();

        let model = tiny_config(9).init::<TestBackend>(&device);
        save_checkpoint(&model, &path).unwrap();

        let (record, layout) = load_record::<TestBackend>(&path, &device).unwrap();
        assert_eq!(layout, CheckpointLayout::Native);

        // Output width comes from the record, not from the config
        assert_eq!(check_record(&record, &tiny_config(100), &device).unwrap(), 9);
    }

    #[test]
    fn test_architecture_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.mpk");
        let device = Default::default();

        save_checkpoint(&tiny_config(3).init::<TestBackend>(&device), &path).unwrap();
        let (record, _) = load_record::<TestBackend>(&path, &device).unwrap();

        let deeper = tiny_config(3).with_backbone(
            ResNetConfig::new()
                .with_blocks([2, 1, 1, 1])
                .with_base_channels(4),
        );
        assert!(matches!(check_record(&record, &deeper, &device), Err(ClassifierError::ShapeMismatch(_))));

        let wider_head = tiny_config(3).with_hidden_units(32);
        assert!(matches!(check_record(&record, &wider_head, &device), Err(ClassifierError::ShapeMismatch(_))));
    }

    #[test]
    fn test_inner_conv_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.mpk");
        let device = Default::default();

        // Stage 2 of the tiny backbone is 8 channels wide
        let mut model = tiny_config(3).init::<TestBackend>(&device);
        model.backbone.layer2[0].conv2 = Conv2dConfig::new([16, 16], [3, 3])
            .with_bias(false)
            .init(&device);
        save_checkpoint(&model, &path).unwrap();

        let (record, _) = load_record::<TestBackend>(&path, &device).unwrap();
        match check_record(&record, &tiny_config(3), &device) {
            Err(ClassifierError::ShapeMismatch(msg)) => {
                assert!(msg.contains("backbone.layer2.0.conv2.weight"), "{}", msg);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_running_stat_and_bias_mismatch() {
        let device = Default::default();
        let base = tiny_config(3).init::<TestBackend>(&device).into_record();
        assert_eq!(check_record(&base, &tiny_config(3), &device).unwrap(), 3);

        let mut record = tiny_config(3).init::<TestBackend>(&device).into_record();
        record.backbone.layer1[0].bn1.running_var = Param::from_tensor(Tensor::ones([7], &device));
        match check_record(&record, &tiny_config(3), &device) {
            Err(ClassifierError::ShapeMismatch(msg)) => {
                assert!(msg.contains("backbone.layer1.0.bn1.running_var"), "{}", msg);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }

        // torchvision convolutions carry no bias
        let mut record = tiny_config(3).init::<TestBackend>(&device).into_record();
        record.backbone.conv1.bias = Some(Param::from_tensor(Tensor::zeros([4], &device)));
        match check_record(&record, &tiny_config(3), &device) {
            Err(ClassifierError::ShapeMismatch(msg)) => {
                assert!(msg.contains("backbone.conv1.bias"), "{}", msg);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_pytorch_envelope() {
        let device = Default::default();
        let (record, layout) = load_record::<TestBackend>(&fixture("tiny_envelope.pt"), &device).unwrap();

        assert_eq!(layout, CheckpointLayout::Envelope);
        assert_eq!(check_record(&record, &tiny_config(100), &device).unwrap(), 3);

        // backbone.fc.4 is stored [out, in]; burn keeps linear weights as [in, out]
        let output = record.head.output.weight.val();
        assert_eq!(output.dims(), [16, 3]);
        let values = output.into_data().to_vec::<f32>().unwrap();
        assert!((values[5 * 3 + 2] - 0.37).abs() < 1e-6);
        assert!((values[15 * 3] - 0.15).abs() < 1e-6);

        let hidden_bias = record.head.hidden.bias.as_ref().unwrap().val();
        let hidden_bias = hidden_bias.into_data().to_vec::<f32>().unwrap();
        assert_eq!(hidden_bias[3], 1.5);
    }

    #[test]
    fn test_pytorch_bare_state_dict() {
        let device = Default::default();
        let (record, layout) = load_record::<TestBackend>(&fixture("tiny_state_dict.pt"), &device).unwrap();

        assert_eq!(layout, CheckpointLayout::StateDict);
        assert_eq!(check_record(&record, &tiny_config(100), &device).unwrap(), 3);

        // downsample.1 lands on the BatchNorm, running stats included
        let downsample = record.backbone.layer1[0].downsample.as_ref().unwrap();
        assert_eq!(downsample.conv.weight.val().dims(), [16, 4, 1, 1]);
        let running_var = downsample.bn.running_var.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(running_var, vec![1.0; 16]);
    }

    #[test]
    fn test_pytorch_fixture_against_wrong_architecture() {
        let device = Default::default();
        let (record, _) = load_record::<TestBackend>(&fixture("tiny_envelope.pt"), &device).unwrap();

        let wider = tiny_config(3).with_backbone(
            ResNetConfig::new()
                .with_blocks([1, 1, 1, 1])
                .with_base_channels(8),
        );
        assert!(matches!(check_record(&record, &wider, &device), Err(ClassifierError::ShapeMismatch(_))));
    }

    #[test]
    fn test_missing_checkpoint() {
        let result = load_record::<TestBackend>(Path::new("/nonexistent/model.pt"), &Default::default());
        assert!(matches!(result, Err(ClassifierError::MissingModelFile(_))));
    }

    #[test]
    fn test_corrupt_pytorch_file_reports_both_layouts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.pt");
        fs::write(&path, b"not a pickle").unwrap();

        match load_record::<TestBackend>(&path, &Default::default()) {
            Err(ClassifierError::CheckpointLoad(msg)) => {
                assert!(msg.contains("as envelope"));
                assert!(msg.contains("as state dict"));
            }
            other => panic!("expected CheckpointLoad, got {:?}", other.map(|(_, layout)| layout)),
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.safetensors");
        fs::write(&path, b"").unwrap();

        let result = load_record::<TestBackend>(&path, &Default::default());
        assert!(matches!(result, Err(ClassifierError::CheckpointLoad(_))));
    }
}
