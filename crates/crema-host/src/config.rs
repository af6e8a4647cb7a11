// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime and loader configuration.
//!
//! ```toml
//! [runtime]
//! disable_eval = true
//! loader_threads = 2
//!
//! [loader]
//! base_dir = "scripts"
//! extensions = ["js", "mjs", "json"]
//! timeout_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crema_engine::JsRuntimeAttributes;
use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

/// Settings applied when a runtime is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Run collection on the calling thread only
    pub disable_background_work: bool,

    /// Allow the host to interrupt running script
    pub allow_script_interrupt: bool,

    /// Host drives idle-time work
    pub enable_idle_processing: bool,

    /// Interpret only
    pub disable_native_code_generation: bool,

    /// Reject `eval` and `Function`
    pub disable_eval: bool,

    /// Enable experimental language features
    pub enable_experimental_features: bool,

    /// Report `set_exception` to an attached debugger
    pub dispatch_set_exceptions_to_debugger: bool,

    /// Report out-of-memory as an error instead of aborting
    pub disable_fatal_on_oom: bool,

    /// Worker threads of the executor loaders run on
    pub loader_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            disable_background_work: false,
            allow_script_interrupt: false,
            enable_idle_processing: false,
            disable_native_code_generation: false,
            disable_eval: false,
            enable_experimental_features: false,
            dispatch_set_exceptions_to_debugger: false,
            disable_fatal_on_oom: false,
            loader_threads: 1,
        }
    }
}

impl RuntimeConfig {
    /// Parse a `RuntimeConfig` from TOML.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Engine attribute flags for this configuration.
    pub fn attributes(&self) -> JsRuntimeAttributes {
        let mut attributes = JsRuntimeAttributes::empty();
        let flags = [
            (self.disable_background_work, JsRuntimeAttributes::DISABLE_BACKGROUND_WORK),
            (self.allow_script_interrupt, JsRuntimeAttributes::ALLOW_SCRIPT_INTERRUPT),
            (self.enable_idle_processing, JsRuntimeAttributes::ENABLE_IDLE_PROCESSING),
            (self.disable_native_code_generation, JsRuntimeAttributes::DISABLE_NATIVE_CODE_GENERATION),
            (self.disable_eval, JsRuntimeAttributes::DISABLE_EVAL),
            (self.enable_experimental_features, JsRuntimeAttributes::ENABLE_EXPERIMENTAL_FEATURES),
            (
                self.dispatch_set_exceptions_to_debugger,
                JsRuntimeAttributes::DISPATCH_SET_EXCEPTIONS_TO_DEBUGGER,
            ),
            (self.disable_fatal_on_oom, JsRuntimeAttributes::DISABLE_FATAL_ON_OOM),
        ];
        for (enabled, flag) in flags {
            attributes.set(flag, enabled);
        }
        attributes
    }

    /// Reject settings the runtime cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.loader_threads == 0 {
            return Err(HostError::Config("loader_threads must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Settings for [`FsModuleLoader`](crate::module_system::FsModuleLoader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory module names are resolved against
    pub base_dir: PathBuf,

    /// Extensions tried, in order, for names without one
    pub extensions: Vec<String>,

    /// Per-read timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            extensions: vec!["js".into(), "mjs".into(), "json".into(), "txt".into()],
            timeout_ms: None,
        }
    }
}

impl LoaderConfig {
    /// Loader rooted at `base_dir` with default settings.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Read timeout, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CremaConfig {
    /// Runtime settings
    pub runtime: RuntimeConfig,

    /// File system loader settings
    pub loader: LoaderConfig,
}

impl CremaConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: CremaConfig = toml::from_str(source)?;
        config.runtime.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CremaConfig::from_toml_str("").unwrap();
        assert_eq!(config, CremaConfig::default());
        assert_eq!(config.runtime.attributes(), JsRuntimeAttributes::empty());
        assert_eq!(config.loader.timeout(), None);
    }

    #[test]
    fn test_attributes_from_toml() {
        let config = RuntimeConfig::from_toml_str("disable_eval = true\ndisable_fatal_on_oom = true").unwrap();
        assert_eq!(
            config.attributes(),
            JsRuntimeAttributes::DISABLE_EVAL | JsRuntimeAttributes::DISABLE_FATAL_ON_OOM
        );
    }

    #[test]
    fn test_loader_section() {
        let config = CremaConfig::from_toml_str(
            "[loader]\nbase_dir = \"scripts\"\nextensions = [\"mjs\"]\ntimeout_ms = 250\n",
        )
        .unwrap();
        assert_eq!(config.loader.base_dir, PathBuf::from("scripts"));
        assert_eq!(config.loader.extensions, vec!["mjs".to_string()]);
        assert_eq!(config.loader.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_zero_loader_threads_rejected() {
        let err = CremaConfig::from_toml_str("[runtime]\nloader_threads = 0").unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }

    #[test]
    fn test_unknown_types_are_config_errors() {
        let err = RuntimeConfig::from_toml_str("disable_eval = \"yes\"").unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }
}
