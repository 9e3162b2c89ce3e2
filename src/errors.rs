use std::path::PathBuf;
use thiserror::Error;

pub const EMPTY_PREDICTIONS_MESSAGE: &str =
    "Model returned empty predictions. Check input image and preprocessing.";

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub strategy: &'static str,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model file not found at: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to load model from {}. Errors:\n{}", .path.display(), describe(.failures))]
    Load {
        path: PathBuf,
        failures: Vec<LoadFailure>,
    },

    #[error("Model inference failed: {0:#}")]
    Inference(#[from] anyhow::Error),

    #[error("Model produced no output tensors")]
    EmptyOutput,
}

/// Errors raised while serving a single `/predict` request.
///
/// None of these are fatal; the handler turns every variant into an
/// `{"error": ...}` body.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Cannot decode upload as an image: {0}")]
    Decode(#[from] image::ImageError),

    #[error(transparent)]
    Inference(#[from] ModelError),

    #[error("{}", EMPTY_PREDICTIONS_MESSAGE)]
    EmptyPredictions,

    #[error("Could not write prediction to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not serialize prediction: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Prediction task was cancelled")]
    Blocking,
}

fn describe(failures: &[LoadFailure]) -> String {
    failures
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}) {}: {}", i + 1, f.strategy, f.message))
        .collect::<Vec<_>>()
        .join("\n")
}
