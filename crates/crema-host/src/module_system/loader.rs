// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The loader seam between the engine's import requests and the host.

use std::rc::Rc;

use async_trait::async_trait;

use super::module::Module;
use crate::error::LoaderError;

/// Resolves import specifiers to modules.
///
/// Called from inside the engine's fetch callback, which waits for the
/// future on the calling thread; the executor of the owning
/// [`Runtime`](crate::Runtime) is entered while it runs.
#[async_trait(?Send)]
pub trait ModuleLoader {
    /// Returns the module named `name`, or `None` if there is no such
    /// module. Errors are reported to script as a load failure.
    async fn get_module(&self, name: &str) -> Result<Option<Rc<dyn Module>>, LoaderError>;
}

