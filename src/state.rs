//! Application state shared by every connection: configuration and the
//! recognition client. Per-drawing state lives in `Session`, owned by each
//! WebSocket task.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::config::{load_config_from_env, AppConfig, EnvSettings};
use crate::error::SubmitError;
use crate::recognizer::{HttpRecognizer, Recognizer};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub env: EnvSettings,
    pub recognizer: Arc<dyn Recognizer>,
}

impl AppState {
    /// Build state from env: load TOML config, then the HTTP recognizer.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Result<Self, SubmitError> {
        let config = load_config_from_env().unwrap_or_default();
        let env = EnvSettings::from_env();

        let timeout = config.submission.request_timeout_secs.map(Duration::from_secs);
        let recognizer = HttpRecognizer::new(env.recognizer_url.clone(), timeout)?;
        info!(
            target: "inkcalc_backend",
            endpoint = %recognizer.endpoint,
            timeout_secs = ?config.submission.request_timeout_secs,
            layout = ?config.layout.policy,
            clear_on_success = config.submission.clear_surface_on_success,
            "Recognizer configured"
        );

        Ok(Self::with_recognizer(config, env, Arc::new(recognizer)))
    }

    pub fn with_recognizer(config: AppConfig, env: EnvSettings, recognizer: Arc<dyn Recognizer>) -> Self {
        Self { config, env, recognizer }
    }
}
