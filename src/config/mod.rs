pub mod schema;

pub use schema::{
    resolve_config_dir, CheckpointConfig, Config, ObservabilityConfig, CONFIG_DIR_ENV,
    DEFAULT_OTEL_ENDPOINT, DEFAULT_OTEL_SERVICE_NAME,
};
