//! Configuration module

pub mod settings;

pub use settings::{
    BackendsConfig, LoggingConfig, MidjourneyConfig, OrchestratorConfig, PollConfig,
    ReplicateConfig, RoutingConfig, ServerConfig, Settings, StorageConfig, UnsplashConfig,
};
