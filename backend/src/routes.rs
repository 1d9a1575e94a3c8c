use actix_multipart::{Multipart, MultipartError};
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use log::{error, info, warn};
use shared::{HealthResponse, StatusResponse};
use uuid::Uuid;

use crate::prediction::error::PredictionError;
use crate::prediction::service::{PredictionService, UploadedImage, MAX_FILE_SIZE};

const UPLOAD_FIELD: &str = "file";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/").route(web::get().to(root)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn handle_predict(
    service: web::Data<PredictionService>,
    mut payload: Multipart,
) -> Result<HttpResponse, PredictionError> {
    let request_id = Uuid::new_v4();
    let image = read_upload(&mut payload).await?;
    info!(
        "[{}] Received {:?} ({} bytes)",
        request_id,
        image.filename.as_deref().unwrap_or(""),
        image.bytes.len()
    );

    match service.predict(image).await {
        Ok(response) => {
            info!(
                "[{}] Predicted {} ({:.4}), severity {}",
                request_id, response.predicted_class, response.confidence, response.severity
            );
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) if e.is_invalid_input() => {
            warn!("[{}] Rejected upload: {}", request_id, e);
            Err(e)
        }
        Err(e) => {
            error!("[{}] {}", request_id, e);
            Err(e)
        }
    }
}

/// Reads the `file` field. Buffering stops one byte past the size limit so
/// oversized uploads are still rejected as too large without being held in
/// memory.
async fn read_upload(payload: &mut Multipart) -> Result<UploadedImage, PredictionError> {
    let mut image = UploadedImage::default();
    let mut found = false;

    while let Some(mut field) = payload.try_next().await.map_err(read_failed)? {
        if found || field.name() != Some(UPLOAD_FIELD) {
            while field.try_next().await.map_err(read_failed)?.is_some() {}
            continue;
        }
        found = true;

        image.filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        while let Some(chunk) = field.try_next().await.map_err(read_failed)? {
            let remaining = MAX_FILE_SIZE + 1 - image.bytes.len();
            if chunk.len() >= remaining {
                image.bytes.extend_from_slice(&chunk[..remaining]);
                return Ok(image);
            }
            image.bytes.extend_from_slice(&chunk);
        }
    }

    Ok(image)
}

fn read_failed(e: MultipartError) -> PredictionError {
    PredictionError::Failed(format!("Upload read failed: {}", e))
}

async fn root() -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        message: "Cotton Leaf Disease Detection API".to_string(),
        status: "active".to_string(),
    })
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
    })
}
