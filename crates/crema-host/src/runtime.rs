// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Engine runtime ownership.

use std::future::Future;
use std::rc::Rc;

use crema_engine::{js_collect_garbage, js_create_runtime, js_dispose_runtime, JsErrorCode, JsRuntimeHandle};
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::error::{HostError, Result};

struct RuntimeInner {
    handle: JsRuntimeHandle,
    config: RuntimeConfig,
    executor: tokio::runtime::Runtime,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        match js_dispose_runtime(self.handle) {
            Ok(()) => debug!("runtime disposed"),
            Err(JsErrorCode::RuntimeInUse) => warn!("runtime dropped while one of its contexts is current"),
            Err(code) => warn!(?code, "failed to dispose runtime"),
        }
    }
}

/// An engine runtime plus the executor module loaders run on.
///
/// Cloning is cheap; the runtime is disposed when the last clone and the
/// last context created from it are dropped.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;

        let executor = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.loader_threads)
            .thread_name("crema-loader")
            .enable_all()
            .build()?;
        let handle = js_create_runtime(config.attributes())?;
        debug!(threads = config.loader_threads, "runtime created");

        Ok(Self {
            inner: Rc::new(RuntimeInner {
                handle,
                config,
                executor,
            }),
        })
    }

    /// The engine runtime handle.
    pub fn handle(&self) -> JsRuntimeHandle {
        self.inner.handle
    }

    /// The configuration the runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Create an execution context.
    pub fn create_context(&self) -> Result<Context> {
        Context::new(self.clone())
    }

    /// Collect every engine handle nobody holds a reference to.
    pub fn collect_garbage(&self) -> Result<()> {
        js_collect_garbage(self.inner.handle).map_err(HostError::from)
    }

    /// Drive `future` to completion on the calling thread.
    ///
    /// Engine callbacks cannot suspend, so loader futures are waited on
    /// here. The executor's context is entered first so loaders can use
    /// tokio I/O and timers.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        let _guard = self.inner.executor.enter();
        futures::executor::block_on(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_threads_rejected() {
        let config = RuntimeConfig {
            loader_threads: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(Runtime::new(config), Err(HostError::Config(_))));
    }

    #[test]
    fn test_block_on_has_a_tokio_context() {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        let slept = runtime.block_on(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            true
        });
        assert!(slept);
    }
}
