//! Orchestrator configuration
//!
//! `procycla.yaml` plus environment overrides.

mod settings;

pub use settings::{
    OrchestratorConfig, CONFIG_FILE_NAME, ENV_APP_URL, ENV_BMP_API_URL, ENV_CSTR_API_URL, ENV_DATA_DIR,
    ENV_LISTEN, ENV_REQUEST_TIMEOUT_SECS, ENV_SUBSTRATE_CONCURRENCY,
};
