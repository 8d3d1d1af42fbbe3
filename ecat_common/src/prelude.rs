//! Prelude module for common re-exports.
//!
//! ```rust
//! use ecat_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    BridgeConfig, ConfigError, ConfigLoader, LogLevel, SharedConfig, ThrottleEntry,
};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{BridgeError, EcCode, ErrorReporting, NativeError, Operation};

// ─── Notifications ──────────────────────────────────────────────────
pub use crate::notify::{Channel, LogSeverity, LogType, NotifyCode, NotifyType, RasNotifyCode};

// ─── Lifecycle ──────────────────────────────────────────────────────
pub use crate::params::{InitParams, RunMode};

// ─── Native boundary ────────────────────────────────────────────────
pub use crate::native::{NativeMaster, NativeResult, NotifyParams};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{EC_NOTIFY_APP, EC_NOTIFY_APP_MAX_CODE, SHIM_RETURN_OK};
