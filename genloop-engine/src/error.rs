//! Composition-time failures. A plain enum with a hand-written `Display`,
//! matching the teacher's dependency set (no `thiserror`/`anyhow`).

use std::fmt;

use genloop_core::ConfigError;

#[derive(Debug)]
pub enum EngineError {
    Config(ConfigError),
    UnknownAmbientProfile(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(e) => write!(f, "engine config error: {e}"),
            EngineError::UnknownAmbientProfile(name) => {
                write!(f, "unknown ambient profile '{name}' referenced by idle config")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::Config(e)
    }
}
