use actix_web::web;
use serde::Deserialize;
use serde_json::Value;
use shared::{PredictionResponse, Probabilities};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

use super::error::PredictionError;
use crate::classifier::client::ClassifierClient;
use crate::knowledge::disease_table;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// A file received from the client, alive for one request.
#[derive(Debug, Clone, Default)]
pub struct UploadedImage {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct LabelConfidence {
    label: String,
    confidence: f64,
}

#[derive(Clone)]
pub struct PredictionService {
    classifier: Arc<dyn ClassifierClient>,
    operation: String,
}

impl PredictionService {
    pub fn new(classifier: Arc<dyn ClassifierClient>, operation: impl Into<String>) -> Self {
        Self {
            classifier,
            operation: operation.into(),
        }
    }

    pub fn classifier_endpoint(&self) -> String {
        self.classifier.endpoint()
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub async fn predict(&self, image: UploadedImage) -> Result<PredictionResponse, PredictionError> {
        let extension = validate(&image)?;

        // Removed from disk when dropped, on every return path and on cancellation.
        let temp_file = write_temp_file(image.bytes, extension).await?;
        log::debug!("Wrote upload to {}", temp_file.path().display());

        let output = self
            .classifier
            .submit(temp_file.path(), &self.operation)
            .await?;

        build_response(output)
    }
}

/// Checks filename, extension and size, in that order. Returns the
/// lowercased extension.
pub fn validate(image: &UploadedImage) -> Result<String, PredictionError> {
    let filename = image
        .filename
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or(PredictionError::MissingFile)?;

    let extension = file_extension(filename);
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(PredictionError::UnsupportedExtension);
    }

    if image.bytes.len() > MAX_FILE_SIZE {
        return Err(PredictionError::FileTooLarge);
    }

    Ok(extension)
}

/// Text after the last `.`, lowercased. A name without a dot is returned whole.
fn file_extension(filename: &str) -> String {
    filename.rsplit('.').next().unwrap_or(filename).to_lowercase()
}

async fn write_temp_file(bytes: Vec<u8>, extension: String) -> Result<NamedTempFile, PredictionError> {
    let written = web::block(move || -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("leaf-")
            .suffix(&format!(".{}", extension))
            .tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(|e| PredictionError::Failed(e.to_string()))?;

    Ok(written?)
}

/// Turns the classifier output into the diagnostic report.
pub fn build_response(output: Value) -> Result<PredictionResponse, PredictionError> {
    let object = match output {
        Value::Object(map) if !map.is_empty() => map,
        _ => return Err(PredictionError::InvalidResponse),
    };

    let confidences: Vec<LabelConfidence> = match object.get("confidences") {
        Some(value) if !is_blank(value) => serde_json::from_value(value.clone())
            .map_err(|e| PredictionError::Failed(e.to_string()))?,
        _ => Vec::new(),
    };
    if confidences.is_empty() {
        return Err(PredictionError::NoPredictions);
    }

    let mut probabilities: Probabilities = confidences
        .into_iter()
        .map(|item| (item.label, item.confidence))
        .collect();
    probabilities.sort_descending();

    let (predicted_class, confidence) = probabilities
        .first()
        .map(|(label, confidence)| (label.to_string(), confidence))
        .ok_or(PredictionError::NoPredictions)?;

    let record = disease_table::lookup(&predicted_class);

    Ok(PredictionResponse {
        predicted_class,
        confidence,
        severity: record.severity,
        treatment: record.treatment.to_string(),
        probabilities,
    })
}

/// Null, false, zero and empty strings or collections carry no predictions.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
