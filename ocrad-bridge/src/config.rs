use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub dispatch: DispatchConfig,
}

/// Settings for the `ocrad` command-line engine backend.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub binary: String,
    /// Parent directory for per-engine staging directories; system temp dir when unset.
    pub staging_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Allow callback and async calls to run on an isolated worker.
    pub isolated_workers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "ocrad".to_string(),
            staging_dir: None,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            isolated_workers: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                binary: env::var("OCRAD_BINARY").unwrap_or_else(|_| "ocrad".to_string()),
                staging_dir: env::var("OCRAD_STAGING_DIR").ok(),
            },
            dispatch: DispatchConfig {
                isolated_workers: parse_env_or("OCRAD_ISOLATED_WORKERS", true),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
