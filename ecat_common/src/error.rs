//! Result codes and error types for bridge operations.
//!
//! This module defines:
//! - `EcCode` - 32-bit result code returned by the native master stack
//! - `ErrorReporting` - How much context a failed call carries
//! - `Operation` - Call site identifier used to word error messages
//! - `NativeError` / `BridgeError` - Typed errors returned to callers

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result code of a native call.
///
/// Kept as a transparent newtype so codes unknown to this build survive
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EcCode(pub u32);

impl EcCode {
    /// Success.
    pub const NO_ERROR: Self = Self(0);
    /// Unspecified error.
    pub const ERROR: Self = Self(0x9811_0000);
    /// Feature not supported (also answered by evaluation builds).
    pub const NOT_SUPPORTED: Self = Self(0x9811_0001);
    /// Component busy.
    pub const BUSY: Self = Self(0x9811_0008);
    /// Out of memory.
    pub const NO_MEMORY: Self = Self(0x9811_000A);
    /// Invalid parameter.
    pub const INVALID_PARM: Self = Self(0x9811_000B);
    /// Object not found.
    pub const NOT_FOUND: Self = Self(0x9811_000C);
    /// Invalid state for this call.
    pub const INVALID_STATE: Self = Self(0x9811_000E);
    /// Timeout.
    pub const TIMEOUT: Self = Self(0x9811_0010);
    /// Remote API server stopped.
    pub const EMRAS_SERVER_STOPPED: Self = Self(0x9811_0184);

    /// Returns true for `NO_ERROR`.
    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 == Self::NO_ERROR.0
    }

    /// Symbolic name for codes known to this build.
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("EC_E_NOERROR"),
            0x9811_0000 => Some("EC_E_ERROR"),
            0x9811_0001 => Some("EC_E_NOTSUPPORTED"),
            0x9811_0008 => Some("EC_E_BUSY"),
            0x9811_000A => Some("EC_E_NOMEMORY"),
            0x9811_000B => Some("EC_E_INVALIDPARM"),
            0x9811_000C => Some("EC_E_NOTFOUND"),
            0x9811_000E => Some("EC_E_INVALIDSTATE"),
            0x9811_0010 => Some("EC_E_TIMEOUT"),
            0x9811_0184 => Some("EMRAS_E_SERVERSTOPPED"),
            _ => None,
        }
    }

    /// Text used when the native layer has no text for a code.
    pub fn fallback_text(self) -> String {
        format!("Unknown Error 0x{:08X}", self.0)
    }
}

impl fmt::Display for EcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

/// How much context a failed operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorReporting {
    /// Result code and a generic message only.
    #[default]
    Code,
    /// Native error text plus a call-site specific message; failures are logged.
    Detailed,
}

/// Call site of a fallible bridge operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Instance initialization.
    InitInstance,
    /// Instance teardown.
    DeinitInstance,
    /// Client registration.
    RegisterClient,
    /// Master state request (target state name).
    SetMasterState(String),
    /// Master configuration.
    ConfigureMaster,
    /// Simulator network configuration.
    ConfigureNetwork,
    /// Any other operation, by name.
    Named(&'static str),
}

impl Operation {
    /// Operation name used in generic messages.
    pub fn name(&self) -> &str {
        match self {
            Operation::InitInstance => "InitInstance",
            Operation::DeinitInstance => "DeinitInstance",
            Operation::RegisterClient => "RegisterClient",
            Operation::SetMasterState(_) => "SetMasterState",
            Operation::ConfigureMaster => "ConfigureMaster",
            Operation::ConfigureNetwork => "ConfigureNetwork",
            Operation::Named(name) => name,
        }
    }

    /// Word a failure message for this call site.
    pub fn describe(&self, code: EcCode, text: &str) -> String {
        let err_msg = format!("{} (0x{:08X})", text, code.0);
        match self {
            Operation::SetMasterState(state) => {
                format!("Cannot set master state to {}: {}.", state, err_msg)
            }
            Operation::RegisterClient => format!("Cannot register client: {}.", err_msg),
            Operation::ConfigureMaster => {
                format!("Cannot configure EtherCAT-Master: {}.", err_msg)
            }
            Operation::ConfigureNetwork => {
                format!("Cannot configure EtherCAT-Simulator: {}.", err_msg)
            }
            _ => format!("{} failed: {}.", self.name(), err_msg),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A native call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NativeError {
    /// Native result code.
    pub code: EcCode,
    /// Native error text (empty in `ErrorReporting::Code` mode).
    pub text: String,
    /// Formatted message.
    pub message: String,
}

impl NativeError {
    /// Error with a generic message only.
    pub fn bare(op: &Operation, code: EcCode) -> Self {
        Self {
            code,
            text: String::new(),
            message: format!("{} failed: {}", op.name(), code),
        }
    }

    /// Error carrying native text and a call-site specific message.
    pub fn detailed(op: &Operation, code: EcCode, text: impl Into<String>) -> Self {
        let text = text.into();
        let message = op.describe(code, &text);
        Self { code, text, message }
    }
}

/// Error type of bridge operations.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Native call failed.
    #[error(transparent)]
    Native(#[from] NativeError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Native backend not found.
    #[error("Native backend not found: {0}")]
    BackendNotFound(String),
}

impl BridgeError {
    /// Native result code carried by this error, if any.
    pub fn code(&self) -> Option<EcCode> {
        match self {
            BridgeError::Native(e) => Some(e.code),
            _ => None,
        }
    }
}
