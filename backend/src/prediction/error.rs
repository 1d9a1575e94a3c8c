use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;
use thiserror::Error;

use crate::classifier::client::ClassifierError;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("No file provided")]
    MissingFile,
    #[error("Invalid file type. Allowed types: jpg, jpeg, png")]
    UnsupportedExtension,
    #[error("File size exceeds 5MB limit")]
    FileTooLarge,
    #[error("Invalid response from model")]
    InvalidResponse,
    #[error("No predictions returned from model")]
    NoPredictions,
    #[error("Prediction failed: {0}")]
    Failed(String),
}

impl PredictionError {
    /// Caller mistakes, as opposed to failures of the classifier or of the
    /// service itself.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            PredictionError::MissingFile
                | PredictionError::UnsupportedExtension
                | PredictionError::FileTooLarge
        )
    }
}

impl From<ClassifierError> for PredictionError {
    fn from(err: ClassifierError) -> Self {
        PredictionError::Failed(err.to_string())
    }
}

impl From<std::io::Error> for PredictionError {
    fn from(err: std::io::Error) -> Self {
        PredictionError::Failed(err.to_string())
    }
}

impl ResponseError for PredictionError {
    fn status_code(&self) -> StatusCode {
        if self.is_invalid_input() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.to_string(),
        })
    }
}
