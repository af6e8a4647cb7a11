// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error codes returned by the host API.

use thiserror::Error;

/// Result type for host API calls.
pub type JsResult<T> = std::result::Result<T, JsErrorCode>;

/// Error codes reported by the host API.
///
/// The numeric values follow the JSRT layout so that codes can be logged
/// and compared across the boundary.
#[repr(u32)]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsErrorCode {
    /// Success. Only used as a callback return value.
    #[error("no error")]
    NoError = 0,

    /// An argument was invalid, or a handle no longer refers to anything.
    #[error("invalid argument")]
    InvalidArgument = 0x10001,

    /// A required argument was missing.
    #[error("null argument")]
    NullArgument = 0x10002,

    /// The call requires a current context.
    #[error("no current context")]
    NoCurrentContext = 0x10003,

    /// A script exception is pending and must be cleared first.
    #[error("runtime is in an exception state")]
    InExceptionState = 0x10004,

    /// The runtime is active on this thread.
    #[error("runtime is in use")]
    RuntimeInUse = 0x10008,

    /// The module has not finished loading its dependencies.
    #[error("module is not ready")]
    ModuleNotReady = 0x1000C,

    /// A property key was not a string or a symbol.
    #[error("property key is not a string")]
    PropertyNotString = 0x1000E,

    /// The value was not an object where one was required.
    #[error("value is not an object")]
    ObjectNotInspectable = 0x10010,

    /// The script threw an exception, now pending on the context.
    #[error("script threw an exception")]
    ScriptException = 0x30001,

    /// The script failed to compile. A `SyntaxError` is pending.
    #[error("script failed to compile")]
    ScriptCompile = 0x30002,
}

impl JsErrorCode {
    /// Returns true if this code signals success.
    pub fn is_ok(self) -> bool {
        self == JsErrorCode::NoError
    }

    /// Converts a callback return code into a result.
    pub fn into_result(self) -> JsResult<()> {
        if self.is_ok() { Ok(()) } else { Err(self) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_keep_jsrt_values() {
        assert_eq!(JsErrorCode::InvalidArgument as u32, 0x10001);
        assert_eq!(JsErrorCode::ScriptException as u32, 0x30001);
    }

    #[test]
    fn test_into_result() {
        assert!(JsErrorCode::NoError.into_result().is_ok());
        assert_eq!(
            JsErrorCode::ScriptCompile.into_result(),
            Err(JsErrorCode::ScriptCompile)
        );
    }
}
