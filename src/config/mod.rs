mod app_config;

pub use app_config::{
    AppConfig, EmbeddingSettings, LogFormat, LoggingConfig, VectorSearchBackend,
    VectorSearchSettings,
};
