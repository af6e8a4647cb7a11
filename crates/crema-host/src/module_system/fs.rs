// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loads modules from files under a base directory.

use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use async_trait::async_trait;
use tracing::debug;

use super::loader::ModuleLoader;
use super::module::{JsonModule, Module, ScriptModule, TextModule};
use crate::config::LoaderConfig;
use crate::error::{HostError, LoaderError, Result};

/// Resolves specifiers to files under [`LoaderConfig::base_dir`].
///
/// `.js` and `.mjs` files are script modules, `.json` files export their
/// parsed content and `.txt` files export their text. Names without an
/// extension are probed with each configured extension in order.
#[derive(Debug, Clone)]
pub struct FsModuleLoader {
    config: LoaderConfig,
}

impl FsModuleLoader {
    /// Creates a loader from `config`.
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// The loader's configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Candidate paths for `name`, most specific first.
    fn candidates(&self, name: &str) -> Result<Vec<PathBuf>> {
        let relative = Path::new(name.trim_start_matches("./"));
        // Specifiers may not leave the base directory.
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if escapes || name.is_empty() {
            return Err(HostError::loader(name, "module names must be relative paths inside the base directory"));
        }

        let path = self.config.base_dir.join(relative);
        let mut candidates = Vec::new();
        if has_known_extension(&path, &self.config.extensions) {
            candidates.push(path.clone());
        }
        for extension in &self.config.extensions {
            let mut file_name = path.as_os_str().to_os_string();
            file_name.push(".");
            file_name.push(extension.trim_start_matches('.'));
            candidates.push(PathBuf::from(file_name));
        }
        Ok(candidates)
    }

    async fn read(&self, path: &Path) -> Result<Option<String>> {
        let read = tokio::fs::read_to_string(path);
        let result = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, read).await.map_err(|_| HostError::Timeout)?,
            None => read.await,
        };
        match result {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

fn has_known_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extensions.iter().any(|known| known.trim_start_matches('.') == extension))
}

#[async_trait(?Send)]
impl ModuleLoader for FsModuleLoader {
    async fn get_module(&self, name: &str) -> std::result::Result<Option<Rc<dyn Module>>, LoaderError> {
        for path in self.candidates(name)? {
            let Some(content) = self.read(&path).await? else {
                continue;
            };
            debug!(name, path = %path.display(), "module file loaded");
            let module: Rc<dyn Module> = match path.extension().and_then(|extension| extension.to_str()) {
                Some("json") => Rc::new(JsonModule::parse(name, &content)?),
                Some("txt") => Rc::new(TextModule::new(name, content)),
                _ => Rc::new(ScriptModule::new(name, content)),
            };
            return Ok(Some(module));
        }
        debug!(name, base_dir = %self.config.base_dir.display(), "no module file found");
        Ok(None)
    }
}
