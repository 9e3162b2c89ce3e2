pub mod config;
pub mod errors;
pub mod handlers;
pub mod inference;
pub mod model;
pub mod models;
pub mod preprocess;

pub use config::Config;
pub use errors::{ModelError, PredictError};
pub use handlers::{configure, AppState};
pub use inference::PredictionLog;
pub use model::{Classifier, OnnxClassifier};
pub use models::{IssueClass, PredictionResult};
