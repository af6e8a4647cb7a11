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

/// Routes `prefix:name` specifiers to the loader registered for `prefix`.
///
/// Specifiers without a registered prefix go to the fallback loader, if
/// any, with the specifier unchanged.
#[derive(Default)]
pub struct AggregateModuleLoader {
    loaders: HashMap<String, Rc<dyn ModuleLoader>>,
    fallback: Option<Rc<dyn ModuleLoader>>,
}

impl AggregateModuleLoader {
    /// Creates a loader with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `prefix:*` to `loader`.
    pub fn add_loader(&mut self, prefix: impl Into<String>, loader: Rc<dyn ModuleLoader>) {
        self.loaders.insert(prefix.into(), loader);
    }

    /// Sets the loader for unprefixed or unrouted specifiers.
    pub fn set_fallback(&mut self, loader: Rc<dyn ModuleLoader>) {
        self.fallback = Some(loader);
    }

    fn route<'a>(&self, name: &'a str) -> Option<(&Rc<dyn ModuleLoader>, &'a str)> {
        if let Some((prefix, rest)) = name.split_once(':') {
            if let Some(loader) = self.loaders.get(prefix) {
                return Some((loader, rest));
            }
        }
        self.fallback.as_ref().map(|loader| (loader, name))
    }
}

#[async_trait(?Send)]
impl ModuleLoader for AggregateModuleLoader {
    async fn get_module(&self, name: &str) -> Result<Option<Rc<dyn Module>>, LoaderError> {
        let Some((loader, rest)) = self.route(name) else {
            trace!(name, "no loader for specifier");
            return Ok(None);
        };
        loader.get_module(rest).await
    }
}
