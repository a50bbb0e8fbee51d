//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config (~/.config/jobwatch/config.toml)
//! 3. Explicit config file (--config)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{
    default_user_config_path, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{
    AwsSettings, BackoffMode, BackoffSettings, Settings, MAX_POLL_INTERVAL_MS,
    MAX_WAIT_AFTER_DONE_MS,
};
