use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::debug;

use crate::errors::PredictError;
use crate::model::Classifier;
use crate::models::{IssueClass, PredictionResult};
use crate::preprocess::preprocess;

/// Maps a raw score vector onto the class set.
///
/// Only the first three scores are considered. Ties go to the lowest index
/// and the first NaN wins outright, like numpy's `argmax`.
pub fn select_class(scores: &[f32]) -> Result<PredictionResult, PredictError> {
    let known = &scores[..scores.len().min(IssueClass::ALL.len())];

    let mut best: Option<(usize, f32)> = None;
    for (i, score) in known.iter().copied().enumerate() {
        if score.is_nan() {
            best = Some((i, score));
            break;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    let (index, confidence) = best.ok_or(PredictError::EmptyPredictions)?;

    let prediction = IssueClass::from_index(index).ok_or(PredictError::EmptyPredictions)?;
    Ok(PredictionResult {
        prediction,
        confidence,
    })
}

/// Overwrites a single file with the latest prediction.
///
/// Writes are not synchronised; concurrent requests race and the last one
/// wins.
#[derive(Debug, Clone)]
pub struct PredictionLog {
    path: PathBuf,
}

impl PredictionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, result: &PredictionResult) -> Result<(), PredictError> {
        // Serialize first so a failure never truncates the previous file.
        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        result.serialize(&mut ser)?;

        fs::write(&self.path, buf).map_err(|source| PredictError::Persist {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn classify(
    classifier: &dyn Classifier,
    log: &PredictionLog,
    image: &[u8],
) -> Result<PredictionResult, PredictError> {
    let input = preprocess(image)?;
    let scores = classifier.scores(input.view())?;
    debug!(?scores, "raw prediction");

    let result = select_class(&scores)?;
    log.record(&result)?;
    Ok(result)
}
