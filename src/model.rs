use std::path::Path;

use ndarray::{ArrayView4, ArrayViewD, Axis};
use tract_core::prelude::{TypedModel, TypedRunnableModel};
use tract_onnx::prelude::*;
use tracing::{info, warn};

use crate::errors::{LoadFailure, ModelError};
use crate::preprocess::INPUT_SIZE;

/// Anything that turns a preprocessed batch into per-class scores.
///
/// Implementations are shared read-only between workers, so `scores` takes
/// `&self` and must be safe to call concurrently.
pub trait Classifier: Send + Sync {
    fn scores(&self, input: ArrayView4<f32>) -> Result<Vec<f32>, ModelError>;
}

pub type Plan = TypedRunnableModel<TypedModel>;

pub struct LoadStrategy<T> {
    pub name: &'static str,
    pub load: fn(&Path) -> anyhow::Result<T>,
}

pub const ONNX_STRATEGIES: [LoadStrategy<Plan>; 3] = [
    LoadStrategy {
        name: "default",
        load: load_optimized,
    },
    LoadStrategy {
        name: "unoptimized",
        load: load_unoptimized,
    },
    LoadStrategy {
        name: "relaxed",
        load: load_relaxed,
    },
];

/// Tries each strategy in order and returns the first handle that loads.
///
/// A missing file fails before any strategy runs. When every strategy fails,
/// the returned error carries all of their messages.
pub fn load_first<T>(path: &Path, strategies: &[LoadStrategy<T>]) -> Result<T, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let mut failures = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        info!(strategy = strategy.name, path = %path.display(), "trying model load");
        match (strategy.load)(path) {
            Ok(handle) => {
                info!(strategy = strategy.name, "model loaded");
                return Ok(handle);
            }
            Err(e) => {
                warn!(strategy = strategy.name, error = %format!("{e:#}"), "model load failed");
                failures.push(LoadFailure {
                    strategy: strategy.name,
                    message: format!("{e:#}"),
                });
            }
        }
    }

    Err(ModelError::Load {
        path: path.to_path_buf(),
        failures,
    })
}

fn input_fact() -> InferenceFact {
    let size = INPUT_SIZE as usize;
    f32::fact([1, size, size, 3]).into()
}

fn load_optimized(path: &Path) -> anyhow::Result<Plan> {
    tract_onnx::onnx()
        .model_for_path(path)?
        .into_optimized()?
        .into_runnable()
}

// Skips the optimisation pass, which is where exotic graphs tend to fail.
fn load_unoptimized(path: &Path) -> anyhow::Result<Plan> {
    tract_onnx::onnx()
        .model_for_path(path)?
        .into_typed()?
        .into_runnable()
}

fn load_relaxed(path: &Path) -> anyhow::Result<Plan> {
    tract_onnx::onnx()
        .with_ignore_output_shapes(true)
        .model_for_path(path)?
        .with_input_fact(0, input_fact())?
        .into_optimized()?
        .into_runnable()
}

pub struct OnnxClassifier {
    plan: Plan,
}

impl OnnxClassifier {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let plan = load_first(path, &ONNX_STRATEGIES)?;
        Ok(Self { plan })
    }
}

impl Classifier for OnnxClassifier {
    fn scores(&self, input: ArrayView4<f32>) -> Result<Vec<f32>, ModelError> {
        let tensor: Tensor = input.to_owned().into();
        let outputs = self.plan.run(tvec!(tensor.into()))?;
        let first = outputs.first().ok_or(ModelError::EmptyOutput)?;
        first_row(first.to_array_view::<f32>()?)
    }
}

// Batched outputs keep only the first item; flat outputs are taken whole.
fn first_row(view: ArrayViewD<f32>) -> Result<Vec<f32>, ModelError> {
    if view.ndim() <= 1 {
        return Ok(view.iter().copied().collect());
    }
    if view.shape()[0] == 0 {
        return Err(ModelError::EmptyOutput);
    }
    let row = view.index_axis_move(Axis(0), 0);
    Ok(row.iter().copied().collect())
}

/// Runs a zero image through the classifier and reports the output width.
///
/// Only the first three scores are mapped to labels, so any other width
/// means the model and the class set may disagree.
pub fn warm_up(classifier: &dyn Classifier) -> Option<usize> {
    let size = INPUT_SIZE as usize;
    let zeros = ndarray::Array4::<f32>::zeros((1, size, size, 3));
    match classifier.scores(zeros.view()) {
        Ok(scores) => {
            if scores.len() == 3 {
                info!(width = scores.len(), "model warm-up finished");
            } else {
                warn!(
                    width = scores.len(),
                    "model output width differs from the 3 known classes; extra positions are ignored"
                );
            }
            Some(scores.len())
        }
        Err(e) => {
            warn!(error = %e, "model warm-up failed");
            None
        }
    }
}
