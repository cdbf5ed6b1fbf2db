pub mod app_config;
pub mod config;
pub mod relationships;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use relationships::{
    EventType, FlagDelta, NewInteractionEvent, ProfileFlags, ProfileState, RelationshipKind,
    RelationshipMap, SnapshotMaps,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid event type: {0}")]
    InvalidEventType(String),
    #[error("invalid relationship kind: {0}")]
    InvalidRelationshipKind(String),
}
