use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

fn default_worker_threads() -> u16 {
    16
}

fn default_max_call_depth() -> u32 {
    8
}

/// Engine configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// number of async worker threads, range [1, 32768), defaults to 16
    #[serde(default = "default_worker_threads")]
    pub async_worker_thread_number: u16,
    /// maximum sub-flow call nesting before a run fails closed
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: u32,
    /// what happens to a run when one of its nodes fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Policy applied when a node execution fails.
///
/// `HaltRun` fails the whole run immediately; `SkipDependents` skips the
/// failed node's downstream subgraph and lets independent branches finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    HaltRun,
    SkipDependents,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_worker_thread_number: default_worker_threads(),
            max_call_depth: default_max_call_depth(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Self {
        let data = fs::read_to_string(path.as_ref()).expect(&format!("failed to load config file {:?}", path.as_ref()));

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Self {
        let config = toml::from_str::<Config>(toml_str).expect("failed to parse the toml str");
        config
    }
}

#[cfg(test)]
mod test {
    use crate::{Config, FailurePolicy};

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        async_worker_thread_number = 10
        max_call_depth = 3
        failure_policy = "skip_dependents"
        "#;
        let config = Config::load_from_str(toml_str);
        assert_eq!(config.async_worker_thread_number, 10);
        assert_eq!(config.max_call_depth, 3);
        assert_eq!(config.failure_policy, FailurePolicy::SkipDependents);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::load_from_str("");
        assert_eq!(config.async_worker_thread_number, 16);
        assert_eq!(config.max_call_depth, 8);
        assert_eq!(config.failure_policy, FailurePolicy::HaltRun);
    }
}
