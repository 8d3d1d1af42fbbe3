//! # EtherCAT Notification Bridge
//!
//! Connects the callbacks of a native EtherCAT master library to
//! application handlers.
//!
//! The native library reports master events, remote API (RAS) events,
//! performance measurements, translated strings and debug messages through
//! `extern "C"` callbacks. The bridge decodes them into typed
//! [`Notification`]s and dispatches them to handlers registered on six fixed
//! channels (`onMaster`, `onRas`, `onTranslate`, `onPerf`, `onDbgMsg`,
//! `onApp`).
//!
//! # Module Structure
//!
//! - [`bridge`] - `EcBridge` instance, lifecycle per run mode
//! - [`handlers`] - Per-channel handler registry
//! - [`throttle`] - Per-code notification throttling
//! - [`decode`] - Notification payload decoding
//! - [`instances`] - Live instance registry for RAS fan-out
//! - [`ffi`] - `extern "C"` callbacks installed in the native library
//! - [`native`] - Native backends (simulation)
//! - [`backend_registry`] - Backend factory registration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ecat_bridge                              │
//! │  ┌──────────────┐    ┌──────────────┐    ┌───────────────────┐   │
//! │  │ NativeMaster │───►│  ffi + shim  │───►│  HandlerRegistry  │   │
//! │  │ (callbacks)  │    │ (decode,     │    │  (per channel)    │   │
//! │  └──────▲───────┘    │  throttle)   │    └───────────────────┘   │
//! │         │            └──────┬───────┘                            │
//! │         │                   │ RAS fan-out                        │
//! │  ┌──────┴───────┐    ┌──────▼────────────┐                       │
//! │  │   EcBridge   │◄──►│ InstanceRegistry  │                       │
//! │  │ (lifecycle)  │    │ (weak instances)  │                       │
//! │  └──────────────┘    └───────────────────┘                       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod backend_registry;
pub mod bridge;
pub mod decode;
pub mod ffi;
pub mod handlers;
pub mod instances;
pub mod native;
mod shim;
pub mod throttle;

// Re-export key types for convenience
pub use crate::backend_registry::{Backend, BackendRegistry};
pub use crate::bridge::{BridgeOptions, EcBridge};
pub use crate::decode::{DecodeError, NotificationData, RasNotificationData};
pub use crate::handlers::{HandlerError, HandlerId, HandlerRegistry, Notification};
pub use crate::instances::InstanceRegistry;
pub use crate::native::SimulatedMaster;
pub use crate::shim::ShimError;
pub use crate::throttle::{Clock, ManualClock, SystemClock, ThrottleQueue};
