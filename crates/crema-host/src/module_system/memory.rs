// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use tracing::trace;

use super::loader::ModuleLoader;
use super::module::Module;
use crate::error::LoaderError;

/// Serves modules registered up front.
#[derive(Default)]
pub struct InMemoryModuleLoader {
    modules: HashMap<String, Rc<dyn Module>>,
}

impl InMemoryModuleLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` under its name, replacing any module of the same name.
    pub fn register_module(&mut self, module: impl Module + 'static) {
        self.modules.insert(module.name().to_string(), Rc::new(module));
    }

    /// Builder form of [`register_module`](Self::register_module).
    pub fn with_module(mut self, module: impl Module + 'static) -> Self {
        self.register_module(module);
        self
    }

    /// Names of the registered modules, sorted.
    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait(?Send)]
impl ModuleLoader for InMemoryModuleLoader {
    async fn get_module(&self, name: &str) -> Result<Option<Rc<dyn Module>>, LoaderError> {
        let module = self.modules.get(name).cloned();
        trace!(name, found = module.is_some(), "in-memory lookup");
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_system::{ScriptModule, TextModule};

    #[test]
    fn test_lookup_by_name() {
        let loader = InMemoryModuleLoader::new()
            .with_module(TextModule::new("greeting", "hello"))
            .with_module(ScriptModule::new("answer", "export default 42;"));
        assert_eq!(loader.module_names(), vec!["answer", "greeting"]);

        let found = futures::executor::block_on(loader.get_module("greeting")).unwrap();
        assert_eq!(found.map(|m| m.name().to_string()).as_deref(), Some("greeting"));
        assert!(futures::executor::block_on(loader.get_module("missing")).unwrap().is_none());
    }
}
