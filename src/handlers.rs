use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, Error, HttpResponse, Result};
use futures_util::StreamExt;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::PredictError;
use crate::inference::{classify, PredictionLog};
use crate::model::Classifier;
use crate::models::{HealthResponse, PredictResponse};

pub const UPLOAD_FIELD: &str = "file";

pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub prediction_log: PredictionLog,
}

impl AppState {
    pub fn new(classifier: Arc<dyn Classifier>, prediction_log: PredictionLog) -> Self {
        Self {
            classifier,
            prediction_log,
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/health").route(web::get().to(health)));
}

pub async fn predict(state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, Error> {
    let request_id = Uuid::new_v4();
    handle_upload(state, payload)
        .instrument(info_span!("predict", %request_id))
        .await
}

async fn handle_upload(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut upload: Option<Vec<u8>> = None;
    while let Some(item) = payload.next().await {
        let mut field = item?;
        let is_upload = field.content_disposition().get_name() == Some(UPLOAD_FIELD);

        // Unrelated fields still have to be drained.
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            data.extend_from_slice(&chunk?);
        }
        if is_upload && upload.is_none() {
            upload = Some(data);
        }
    }

    let Some(image) = upload else {
        warn!("upload has no `{}` field", UPLOAD_FIELD);
        return Ok(HttpResponse::UnprocessableEntity().json(PredictResponse::error(format!(
            "Missing required file field `{UPLOAD_FIELD}`"
        ))));
    };
    info!(bytes = image.len(), "received upload");

    let worker_state = state.clone();
    let outcome = web::block(move || {
        classify(
            worker_state.classifier.as_ref(),
            &worker_state.prediction_log,
            &image,
        )
    })
    .await
    .unwrap_or(Err(PredictError::Blocking));

    let body = match outcome {
        Ok(result) => {
            info!(
                prediction = result.prediction.as_str(),
                confidence = result.confidence,
                "prediction made"
            );
            PredictResponse::Prediction(result)
        }
        Err(e) => {
            warn!(error = %e, "prediction failed");
            PredictResponse::error(e.to_string())
        }
    };

    Ok(HttpResponse::Ok().json(body))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "ok" })
}
