//! Prediction inputs
//!
//! The four accepted encodings are resolved once, at the boundary, into a
//! tagged enum. Decoding always yields a three-channel RGB image.

use std::io::Cursor;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageReader};
use serde_json::Value;
use tracing::debug;

use crate::utils::error::{ClassifierError, Result};

/// An image to classify
#[derive(Debug, Clone)]
pub enum PredictionInput {
    /// Remote image, fetched over HTTP(S)
    Url(String),
    /// `data:image/...;base64,<payload>`
    DataUri(String),
    /// Local image file
    FilePath(PathBuf),
    /// Already decoded image
    Image(DynamicImage),
}

impl PredictionInput {
    /// Classify a raw string by its prefix
    ///
    /// `http://` / `https://` is a URL, `data:image` is an inline data URI,
    /// anything else is a filesystem path.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            PredictionInput::Url(raw.to_string())
        } else if raw.starts_with("data:image") {
            PredictionInput::DataUri(raw.to_string())
        } else {
            PredictionInput::FilePath(PathBuf::from(raw))
        }
    }

    /// Short description for logs (never the full payload)
    pub fn describe(&self) -> String {
        match self {
            PredictionInput::Url(url) => format!("url {}", url),
            PredictionInput::DataUri(uri) => format!("data uri ({} bytes)", uri.len()),
            PredictionInput::FilePath(path) => format!("file {:?}", path),
            PredictionInput::Image(img) => format!("image {}x{}", img.width(), img.height()),
        }
    }

    /// Decode the input into an RGB image
    pub fn load_image(self) -> Result<DynamicImage> {
        let image = match self {
            PredictionInput::Url(url) => fetch_image(&url)?,
            PredictionInput::DataUri(uri) => decode_data_uri(&uri)?,
            PredictionInput::FilePath(path) => {
                let bytes = std::fs::read(&path).map_err(|e| {
                    ClassifierError::ImageDecode(format!("{}: {}", path.display(), e))
                })?;
                decode_bytes(&bytes)?
            }
            PredictionInput::Image(image) => image,
        };

        Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
    }
}

impl From<&str> for PredictionInput {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for PredictionInput {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<DynamicImage> for PredictionInput {
    fn from(image: DynamicImage) -> Self {
        PredictionInput::Image(image)
    }
}

/// Request-body style input
///
/// Accepts a bare string, or an object with exactly one of `url`,
/// `data_uri` (alias `base64`) or `path`. Every other JSON value is
/// rejected with `UnsupportedInputFormat`.
impl TryFrom<Value> for PredictionInput {
    type Error = ClassifierError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(raw) => Ok(Self::parse(&raw)),
            Value::Object(map) if map.len() == 1 => {
                let (key, value) = map.into_iter().next().ok_or_else(|| {
                    ClassifierError::UnsupportedInputFormat("empty object".to_string())
                })?;
                let Value::String(raw) = value else {
                    return Err(ClassifierError::UnsupportedInputFormat(format!(
                        "field '{}' must be a string",
                        key
                    )));
                };
                match key.as_str() {
                    "url" => Ok(PredictionInput::Url(raw)),
                    "data_uri" | "base64" => Ok(PredictionInput::DataUri(raw)),
                    "path" => Ok(PredictionInput::FilePath(PathBuf::from(raw))),
                    other => Err(ClassifierError::UnsupportedInputFormat(format!(
                        "unknown field '{}'",
                        other
                    ))),
                }
            }
            other => Err(ClassifierError::UnsupportedInputFormat(format!(
                "expected a string or {{url|data_uri|path}} object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Split `data:image/...;base64,<payload>` on the first comma and decode
fn decode_data_uri(uri: &str) -> Result<DynamicImage> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| ClassifierError::ImageDecode("data URI has no payload".to_string()))?;
    debug!("Decoding inline image ({})", header);

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ClassifierError::ImageDecode(format!("invalid base64 payload: {}", e)))?;

    decode_bytes(&bytes)
}

/// Blocking HTTP GET, then decode the body
fn fetch_image(url: &str) -> Result<DynamicImage> {
    debug!("Fetching image from {}", url);

    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ClassifierError::ImageDecode(format!("failed to fetch {}: {}", url, e)))?;
    let bytes = response
        .bytes()
        .map_err(|e| ClassifierError::ImageDecode(format!("failed to read {}: {}", url, e)))?;

    decode_bytes(&bytes)
}

fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ClassifierError::ImageDecode(e.to_string()))?;
    Ok(reader.decode()?)
}
