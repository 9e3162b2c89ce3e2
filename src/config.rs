use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_MODEL_FILENAME: &str = "garbage_pothole_streetlight.onnx";

pub const DEFAULT_ALLOWED_ORIGINS: [&str; 5] = [
    "http://localhost:5173",
    "http://localhost:3000",
    "http://127.0.0.1:5173",
    "http://localhost:8080",
    "http://192.168.1.174:8080",
];

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Classifies civic issue photos", long_about = None)]
pub struct Config {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Defaults to the bundled model next to the executable.
    #[arg(short, long)]
    pub model_path: Option<PathBuf>,

    #[arg(long, default_value = "prediction.json")]
    pub prediction_path: PathBuf,

    /// Browser origin allowed by CORS. Repeat for several origins.
    #[arg(long = "allowed-origin", default_values_t = DEFAULT_ALLOWED_ORIGINS.map(String::from))]
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    /// The explicit `--model-path`, or the default model file resolved
    /// against the executable's directory.
    pub fn resolved_model_path(&self) -> PathBuf {
        if let Some(path) = &self.model_path {
            return path.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_MODEL_FILENAME)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_FILENAME))
    }
}
