//! Prediction Service
//!
//! `PredictionService` owns a loaded classifier together with its class
//! names and is ready to predict as soon as it exists. `Predictor` wraps it
//! for callers that want setup deferred to the first prediction.

use std::time::Instant;

use burn::{
    module::Module,
    tensor::{activation::softmax, backend::Backend},
};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::checkpoint::{check_record, load_record, CheckpointLayout};
use super::config::PredictorConfig;
use super::input::PredictionInput;
use super::labels::ClassNames;
use crate::model::{get_transforms, StrainClassifier, Transforms};
use crate::utils::error::{ClassifierError, Result};
use crate::utils::format_duration;

/// One entry of the ranked list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelConfidence {
    pub label: String,
    pub confidence: f64,
}

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Name of the most probable class
    pub predicted_label: String,

    /// Softmax probability of the predicted class
    pub confidence: f64,

    /// Most probable classes, highest first
    pub top_5: Vec<LabelConfidence>,
}

impl PredictionResult {
    /// Rank a probability vector
    ///
    /// The sort is stable, so equal probabilities keep index order and the
    /// lowest index wins a tie for first place.
    pub fn from_probabilities(probabilities: &[f32], class_names: &ClassNames, top_k: usize) -> Result<Self> {
        if probabilities.len() != class_names.len() {
            return Err(ClassifierError::Inference(format!(
                "{} probabilities for {} class names",
                probabilities.len(),
                class_names.len()
            )));
        }

        let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

        let top = indexed
            .iter()
            .take(top_k.min(probabilities.len()))
            .map(|&(idx, prob)| {
                let label = class_names
                    .get(idx)
                    .ok_or_else(|| ClassifierError::Inference(format!("no class name for index {}", idx)))?;
                Ok(LabelConfidence {
                    label: label.to_string(),
                    confidence: prob as f64,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let best = top
            .first()
            .cloned()
            .ok_or_else(|| ClassifierError::Inference("empty probability vector".to_string()))?;

        Ok(Self {
            predicted_label: best.label,
            confidence: best.confidence,
            top_5: top,
        })
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Prediction: {}\n", self.predicted_label));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));

        output.push_str(&format!("\nTop-{} predictions:\n", self.top_5.len()));
        for (i, entry) in self.top_5.iter().enumerate() {
            output.push_str(&format!(
                "  {}. {} - {:.2}%\n",
                i + 1,
                entry.label,
                entry.confidence * 100.0
            ));
        }

        output
    }
}

/// A loaded, ready-to-use classifier
#[derive(Debug)]
pub struct PredictionService<B: Backend> {
    model: StrainClassifier<B>,
    class_names: ClassNames,
    transforms: Transforms,
    layout: CheckpointLayout,
    top_k: usize,
    device: B::Device,
}

impl<B: Backend> PredictionService<B> {
    /// Load the checkpoint and class names described by `config`
    pub fn load(config: &PredictorConfig, device: &B::Device) -> Result<Self> {
        let start = Instant::now();
        config.validate()?;

        if !config.model_path.exists() {
            return Err(ClassifierError::MissingModelFile(config.model_path.clone()));
        }

        let sidecar = if config.class_names_path.exists() {
            let names = ClassNames::load(&config.class_names_path)?;
            info!("Loaded {} class names from {:?}", names.len(), config.class_names_path);
            Some(names)
        } else {
            None
        };

        let (record, layout) = load_record::<B>(&config.model_path, device)?;
        debug!("Checkpoint decoded as {}", layout);

        let num_classes = check_record(&record, &config.architecture, device)?;

        let class_names = match sidecar {
            Some(names) if names.len() != num_classes => {
                return Err(ClassifierError::ShapeMismatch(format!(
                    "{:?} lists {} classes, checkpoint has {} outputs",
                    config.class_names_path,
                    names.len(),
                    num_classes
                )));
            }
            Some(names) => names,
            None => {
                warn!(
                    "No class names at {:?}, using {}0..{}{}",
                    config.class_names_path,
                    config.fallback_label_prefix,
                    config.fallback_label_prefix,
                    num_classes.saturating_sub(1)
                );
                ClassNames::placeholders(num_classes, &config.fallback_label_prefix)
            }
        };

        let model = config
            .architecture
            .clone()
            .with_num_classes(num_classes)
            .init::<B>(device)
            .load_record(record)
            .no_grad();

        info!(
            "Model ready: {} classes from {:?} in {}",
            num_classes,
            config.model_path,
            format_duration(start.elapsed().as_secs_f64())
        );

        Ok(Self {
            model,
            class_names,
            transforms: get_transforms(),
            layout,
            top_k: config.top_k,
            device: device.clone(),
        })
    }

    /// Softmax probabilities over all classes for one image
    pub fn probabilities(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let batch = self.transforms.to_batch::<B>(image, &self.device)?;
        let logits = self.model.forward(batch);

        softmax(logits, 1)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("{:?}", e)))
    }

    /// Classify one image
    pub fn predict(&self, input: impl Into<PredictionInput>) -> Result<PredictionResult> {
        let input = input.into();
        debug!("Predicting {}", input.describe());

        let image = input.load_image()?;
        let probabilities = self.probabilities(&image)?;
        PredictionResult::from_probabilities(&probabilities, &self.class_names, self.top_k)
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.model.num_classes()
    }

    /// Layout the checkpoint was decoded from
    pub fn layout(&self) -> CheckpointLayout {
        self.layout
    }

    pub fn model(&self) -> &StrainClassifier<B> {
        &self.model
    }
}

/// Lazily initialized prediction service
///
/// The first `setup` (explicit, or implied by `predict`) loads the model;
/// later calls return the already loaded service.
#[derive(Debug)]
pub struct Predictor<B: Backend> {
    config: PredictorConfig,
    device: B::Device,
    service: Option<PredictionService<B>>,
}

impl<B: Backend> Predictor<B> {
    pub fn new(config: PredictorConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            service: None,
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.service.is_some()
    }

    /// Load the model if that has not happened yet
    pub fn setup(&mut self) -> Result<&PredictionService<B>> {
        if self.service.is_none() {
            self.service = Some(PredictionService::load(&self.config, &self.device)?);
        }

        self.service
            .as_ref()
            .ok_or_else(|| ClassifierError::Inference("prediction service not initialized".to_string()))
    }

    /// Classify one image, running setup first if needed
    pub fn predict(&mut self, input: impl Into<PredictionInput>) -> Result<PredictionResult> {
        self.setup()?.predict(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::checkpoint::save_checkpoint;
    use crate::model::{ResNetConfig, StrainClassifierConfig};
    use burn::backend::NdArray;
    use burn::nn::conv::Conv2dConfig;
    use image::{Rgb, RgbImage};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn tiny_architecture() -> StrainClassifierConfig {
        StrainClassifierConfig::new()
            .with_hidden_units(16)
            .with_backbone(
                ResNetConfig::new()
                    .with_blocks([1, 1, 1, 1])
                    .with_base_channels(4),
            )
    }

    /// Write a checkpoint with `num_classes` outputs and return its config
    fn write_model(dir: &Path, num_classes: usize) -> PredictorConfig {
        let device = Default::default();
        let model = tiny_architecture()
            .with_num_classes(num_classes)
            .init::<TestBackend>(&device);

        let mut config = PredictorConfig::from_model_dir(dir);
        config.model_path = dir.join("model.mpk");
        config.architecture = tiny_architecture();
        save_checkpoint(&model, &config.model_path).unwrap();
        config
    }

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(40, 30, |x, y| {
            Rgb([(x * 5) as u8, (y * 7) as u8, 90])
        }))
    }

    fn names(n: usize) -> ClassNames {
        ClassNames::new((0..n).map(|i| format!("class{}", i)).collect())
    }

    #[test]
    fn test_ranking_sorted_and_bounded() {
        let probs = [0.05, 0.4, 0.1, 0.2, 0.05, 0.15, 0.05];
        let result = PredictionResult::from_probabilities(&probs, &names(7), 5).unwrap();

        assert_eq!(result.predicted_label, "class1");
        assert!((result.confidence - 0.4).abs() < 1e-6);
        assert_eq!(result.top_5.len(), 5);
        assert_eq!(result.top_5[0].label, result.predicted_label);
        for pair in result.top_5.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        assert!(result.top_5.iter().all(|e| e.confidence <= result.confidence));
    }

    #[test]
    fn test_ranking_ties_keep_index_order() {
        let probs = [0.25, 0.25, 0.25, 0.25];
        let result = PredictionResult::from_probabilities(&probs, &names(4), 5).unwrap();

        assert_eq!(result.predicted_label, "class0");
        let labels: Vec<_> = result.top_5.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["class0", "class1", "class2", "class3"]);
    }

    #[test]
    fn test_ranking_length_mismatch() {
        let result = PredictionResult::from_probabilities(&[0.5, 0.5], &names(3), 5);
        assert!(matches!(result, Err(ClassifierError::Inference(_))));
    }

    #[test]
    fn test_result_json_shape() {
        let result = PredictionResult::from_probabilities(&[0.9, 0.1], &names(2), 5).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["predicted_label"], "class0");
        assert!(json["confidence"].is_f64());
        assert_eq!(json["top_5"][1]["label"], "class1");
        assert!(result.display().contains("class0"));
    }

    #[test]
    fn test_missing_model_file() {
        let dir = TempDir::new().unwrap();
        let config = PredictorConfig::from_model_dir(dir.path());

        let result = PredictionService::<TestBackend>::load(&config, &Default::default());
        assert!(matches!(result, Err(ClassifierError::MissingModelFile(_))));
    }

    #[test]
    fn test_fallback_labels_follow_checkpoint_width() {
        let dir = TempDir::new().unwrap();
        let config = write_model(dir.path(), 7);

        let service = PredictionService::<TestBackend>::load(&config, &Default::default()).unwrap();
        assert_eq!(service.num_classes(), 7);
        assert_eq!(service.class_names().len(), 7);
        assert_eq!(service.class_names().get(6), Some("Strain_6"));
        assert_eq!(service.layout(), CheckpointLayout::Native);
    }

    #[test]
    fn test_class_names_sidecar() {
        let dir = TempDir::new().unwrap();
        let config = write_model(dir.path(), 3);
        fs::write(&config.class_names_path, "Alpha\nBeta\nGamma\n").unwrap();

        let service = PredictionService::<TestBackend>::load(&config, &Default::default()).unwrap();
        let result = service.predict(test_image()).unwrap();

        assert!(["Alpha", "Beta", "Gamma"].contains(&result.predicted_label.as_str()));
        // k is capped at the number of classes
        assert_eq!(result.top_5.len(), 3);
    }

    #[test]
    fn test_class_names_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let config = write_model(dir.path(), 4);
        fs::write(&config.class_names_path, "Alpha\nBeta\nGamma\n").unwrap();

        let result = PredictionService::<TestBackend>::load(&config, &Default::default());
        assert!(matches!(result, Err(ClassifierError::ShapeMismatch(_))));
    }

    #[test]
    fn test_inner_layer_mismatch_rejected_at_setup() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let mut config = PredictorConfig::from_model_dir(dir.path());
        config.model_path = dir.path().join("model.mpk");
        config.architecture = tiny_architecture();

        let mut model = tiny_architecture().with_num_classes(3).init::<TestBackend>(&device);
        model.backbone.layer2[0].conv2 = Conv2dConfig::new([16, 16], [3, 3])
            .with_bias(false)
            .init(&device);
        save_checkpoint(&model, &config.model_path).unwrap();

        // Fails during setup instead of inside the first forward pass
        let result = PredictionService::<TestBackend>::load(&config, &device);
        assert!(matches!(result, Err(ClassifierError::ShapeMismatch(_))));
    }

    #[test]
    fn test_top_k_above_five_rejected_at_setup() {
        let dir = TempDir::new().unwrap();
        let mut config = write_model(dir.path(), 7);
        config.top_k = 6;

        let result = PredictionService::<TestBackend>::load(&config, &Default::default());
        assert!(matches!(result, Err(ClassifierError::Configuration(_))));
    }

    #[test]
    fn test_predict_with_pytorch_checkpoint() {
        let dir = TempDir::new().unwrap();
        let mut config = PredictorConfig::from_model_dir(dir.path());
        config.model_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("src/inference/testdata/tiny_envelope.pt");
        config.architecture = tiny_architecture();

        let service = PredictionService::<TestBackend>::load(&config, &Default::default()).unwrap();
        assert_eq!(service.layout(), CheckpointLayout::Envelope);
        assert_eq!(service.num_classes(), 3);

        let result = service.predict(test_image()).unwrap();
        assert_eq!(result.top_5.len(), 3);
        assert!(result.predicted_label.starts_with("Strain_"));
        let total: f64 = result.top_5.iter().map(|e| e.confidence).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let dir = TempDir::new().unwrap();
        let config = write_model(dir.path(), 7);
        let service = PredictionService::<TestBackend>::load(&config, &Default::default()).unwrap();

        let probs = service.probabilities(&test_image()).unwrap();
        assert_eq!(probs.len(), 7);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_predictions_are_deterministic() {
        let dir = TempDir::new().unwrap();
        let config = write_model(dir.path(), 7);
        let service = PredictionService::<TestBackend>::load(&config, &Default::default()).unwrap();

        let first = service.predict(test_image()).unwrap();
        let second = service.predict(test_image()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.top_5.len(), 5);
    }

    #[test]
    fn test_bad_input_does_not_poison_service() {
        let dir = TempDir::new().unwrap();
        let config = write_model(dir.path(), 7);
        let service = PredictionService::<TestBackend>::load(&config, &Default::default()).unwrap();

        let err = service.predict("data:image/jpeg;base64,@@not-base64@@").unwrap_err();
        assert!(matches!(err, ClassifierError::ImageDecode(_)));
        assert!(err.is_per_call());

        assert!(service.predict(test_image()).is_ok());
    }

    #[test]
    fn test_setup_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = write_model(dir.path(), 7);
        let model_path = config.model_path.clone();

        let mut predictor = Predictor::<TestBackend>::new(config, Default::default());
        assert!(!predictor.is_ready());

        let first = predictor.setup().unwrap().num_classes();
        assert!(predictor.is_ready());

        // A second setup must not touch the checkpoint again
        fs::remove_file(&model_path).unwrap();
        let second = predictor.setup().unwrap().num_classes();
        assert_eq!(first, second);
    }

    #[test]
    fn test_predict_runs_setup_lazily() {
        let dir = TempDir::new().unwrap();
        let config = write_model(dir.path(), 7);

        let mut predictor = Predictor::<TestBackend>::new(config, Default::default());
        let result = predictor.predict(test_image()).unwrap();

        assert!(predictor.is_ready());
        assert!(result.predicted_label.starts_with("Strain_"));
    }

    #[test]
    fn test_failed_setup_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let mut config = PredictorConfig::from_model_dir(dir.path());
        config.model_path = dir.path().join("model.mpk");
        config.architecture = tiny_architecture();

        let mut predictor = Predictor::<TestBackend>::new(config, Default::default());
        assert!(predictor.setup().is_err());
        assert!(!predictor.is_ready());

        write_model(dir.path(), 5);
        assert_eq!(predictor.setup().unwrap().num_classes(), 5);
    }
}
