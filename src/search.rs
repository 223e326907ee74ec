//! Run modes and the ordered layer search path.

use std::fmt;
use std::str::FromStr;

use crate::error::{SettingsError, SettingsResult};
use crate::store::LayerKey;

/// The active operating role of the process.
///
/// The run mode is itself a read-only setting, and its name doubles as
/// a config-file section consulted between the environment layer and
/// `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Central server role
    Master,
    /// Managed node role
    Agent,
    /// Interactive/one-shot role
    #[default]
    User,
}

impl RunMode {
    /// The run mode's section name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Master => "master",
            RunMode::Agent => "agent",
            RunMode::User => "user",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> SettingsResult<Self> {
        match s {
            "master" => Ok(RunMode::Master),
            "agent" => Ok(RunMode::Agent),
            "user" => Ok(RunMode::User),
            other => Err(SettingsError::authoring(format!(
                "invalid run mode `{other}`"
            ))),
        }
    }
}

/// Produces the ordered list of layers consulted for a lookup.
///
/// Earlier layers strictly dominate later ones. The `run_mode` position
/// is substituted with the current run mode's section name at call
/// time, and the environment layer is present only when an environment
/// was given.
pub fn search_path(environment: Option<&str>, run_mode: RunMode) -> Vec<LayerKey> {
    let mut path = vec![LayerKey::Cli, LayerKey::Memory];
    if let Some(environment) = environment {
        path.push(LayerKey::Section(environment.to_string()));
    }
    path.push(LayerKey::Section(run_mode.as_str().to_string()));
    path.push(LayerKey::Main);
    path.push(LayerKey::AppDefaults);
    path
}
