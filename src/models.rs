use serde::{Deserialize, Serialize};

/// The fixed class set, in model output order.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueClass {
    Garbage,
    Pothole,
    Streetlight,
}

impl IssueClass {
    pub const ALL: [IssueClass; 3] = [Self::Garbage, Self::Pothole, Self::Streetlight];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Garbage => "garbage",
            Self::Pothole => "pothole",
            Self::Streetlight => "streetlight",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    pub prediction: IssueClass,
    pub confidence: f32,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Prediction(PredictionResult),
    Error { error: String },
}

impl PredictResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
