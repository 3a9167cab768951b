use std::sync::Arc;

use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use tracing::Instrument;
use uuid::Uuid;

use crate::classifier::{Classifier, Prediction};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::PredictionResponse;
use crate::preprocess::{self, BrightnessRange};

pub const PING_MESSAGE: &str = "Hello, I am alive";
const FILE_FIELD: &str = "file";

/// Read-only state shared by every worker.
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub image_size: u32,
    pub confidence_threshold: f32,
    pub brightness: BrightnessRange,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(classifier: Arc<dyn Classifier>, config: &Config) -> Self {
        Self {
            classifier,
            image_size: config.image_size,
            confidence_threshold: config.confidence_threshold,
            brightness: config.brightness,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ping").route(web::get().to(ping)))
        .service(web::resource("/predict").route(web::post().to(predict)));
}

pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(PING_MESSAGE)
}

pub async fn predict(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("predict", %request_id);

    async move {
        let result = run_prediction(&state, payload).await;
        match &result {
            Ok(response) => tracing::info!(
                class = %response.class,
                confidence = response.confidence,
                "prediction served"
            ),
            Err(ApiError::Internal(cause)) => tracing::error!(%cause, "prediction failed"),
            Err(err) => tracing::warn!(reason = %err, "upload rejected"),
        }
        result.map(|response| HttpResponse::Ok().json(response))
    }
    .instrument(span)
    .await
}

async fn run_prediction(
    state: &web::Data<AppState>,
    payload: Multipart,
) -> Result<PredictionResponse, ApiError> {
    let data = read_upload(payload, state.max_upload_bytes).await?;
    tracing::debug!(bytes = data.len(), "upload received");

    let size = state.image_size;
    let image = web::block(move || preprocess::read_file_as_image(&data, size))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| {
            tracing::debug!(error = %e, "decode failed");
            ApiError::Undecodable
        })?;

    preprocess::validate_leaf_image(&image, &state.brightness)?;

    let classifier = Arc::clone(&state.classifier);
    let scores = web::block(move || classifier.classify(&image))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let prediction =
        Prediction::from_scores(&scores).map_err(|e| ApiError::Internal(e.to_string()))?;
    if !prediction.meets(state.confidence_threshold) {
        tracing::debug!(
            class = %prediction.class,
            confidence = prediction.confidence,
            threshold = state.confidence_threshold,
            "below confidence threshold"
        );
        return Err(ApiError::LowConfidence);
    }

    Ok(PredictionResponse {
        class: prediction.class,
        confidence: prediction.confidence,
    })
}

/// Pulls the bytes of the `file` part out of the multipart stream.
/// Other parts are drained and ignored.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
    while let Some(item) = payload.next().await {
        let field = item?;
        if field.content_disposition().get_name() != Some(FILE_FIELD) {
            drain(field).await?;
            continue;
        }

        let is_image = field
            .content_type()
            .map(|mime| mime.type_().as_str() == "image")
            .unwrap_or(false);
        if !is_image {
            return Err(ApiError::NotAnImage);
        }

        return read_field(field, limit).await;
    }

    Err(ApiError::MissingFile)
}

async fn read_field(mut field: Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if data.len() + chunk.len() > limit {
            return Err(ApiError::TooLarge { limit });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn drain(mut field: Field) -> Result<(), ApiError> {
    while let Some(chunk) = field.next().await {
        chunk?;
    }
    Ok(())
}
