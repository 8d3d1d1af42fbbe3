//! Native master trait and C callback signatures.
//!
//! This module defines:
//! - The five `extern "C"` callback signatures the native library invokes
//! - `Callback` - A callback function paired with its context pointer
//! - `NotifyParams` / `NativeHandle` - Opaque values owned by the native layer
//! - `NativeMaster` trait - The only boundary to the native EtherCAT library
//!
//! # Evaluation builds
//!
//! Server-side features (RAS server, mailbox gateway server and RAS client
//! connections) default to `EcCode::NOT_SUPPORTED`, which is what evaluation
//! builds of the native library answer. Backends override them when supported.

use crate::error::EcCode;
use crate::notify::{LogSeverity, PayloadKind};
use crate::params::{
    MasterParams, MbxGatewayClientParams, MbxGatewayServerParams, RasClientParams,
    RasServerParams, SimulatorParams,
};
use std::ffi::{c_char, c_void};

/// Result of a native call.
pub type NativeResult<T> = Result<T, EcCode>;

/// Master event callback: `(ctx, code, params) -> 0`.
pub type EventNotifyFn =
    unsafe extern "C" fn(ctx: *mut c_void, code: u32, params: *mut c_void) -> u32;

/// RAS event callback: `(ctx, code, params) -> 0`.
pub type RasNotifyFn =
    unsafe extern "C" fn(ctx: *mut c_void, code: u32, params: *mut c_void) -> u32;

/// Performance measurement callback: `(ctx, function name, time)`.
pub type PerfNotifyFn = unsafe extern "C" fn(ctx: *mut c_void, fn_name: *const c_char, time: u32);

/// Translation callback: `(ctx, code, message)`.
pub type TranslateNotifyFn = unsafe extern "C" fn(ctx: *mut c_void, code: u32, msg: *const c_char);

/// Debug message callback: `(ctx, log type, severity, message)`.
pub type DbgMsgNotifyFn =
    unsafe extern "C" fn(ctx: *mut c_void, log_type: u32, severity: u32, msg: *const c_char);

/// A native callback together with the context pointer it must be called with.
#[derive(Debug, Clone, Copy)]
pub struct Callback<F: Copy> {
    /// Function pointer.
    pub func: F,
    /// Context handed back as the first argument.
    pub ctx: *mut c_void,
}

// SAFETY: the context pointer is only dereferenced by the bridge's own
// callbacks, which treat it as a shared reference to `Sync` data.
unsafe impl<F: Copy> Send for Callback<F> {}
// SAFETY: see above.
unsafe impl<F: Copy> Sync for Callback<F> {}

/// Opaque notification parameter block owned by the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyParams(pub *mut c_void);

// SAFETY: the pointer is never dereferenced on the Rust side; it is only
// passed back to the native layer that created it.
unsafe impl Send for NotifyParams {}
// SAFETY: see above.
unsafe impl Sync for NotifyParams {}

impl NotifyParams {
    /// A null parameter block.
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }
}

/// Opaque native handle (connection, server, event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

/// Flavour of the native instance created by `NativeMaster::init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitKind {
    /// Local master.
    Local,
    /// Remote master reached through the RAS client.
    Remote,
    /// Remote master reached through the mailbox gateway.
    MbxGateway,
}

/// Native RAS client settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasClientInit {
    /// Keep-alive trigger.
    pub keep_alive_trigger: u32,
    /// Native log level.
    pub log_level: LogSeverity,
}

/// Interface to the native EtherCAT master library.
///
/// Every method mirrors one native entry point. Implementations must be
/// callable from the application thread and the native callback thread.
pub trait NativeMaster: Send + Sync {
    /// Backend identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Wrapper API version of the native library.
    fn api_version(&self) -> u32;

    /// Native text for a result code, if the library knows it.
    fn error_text(&self, code: EcCode) -> Option<String>;

    /// Create a native instance; returns the internal instance id.
    fn init(&self, instance_id: u32, kind: InitKind) -> NativeResult<u32>;

    /// Release a native instance created by `init`.
    fn done(&self, instance_id: u32);

    /// Initialize the master stack of a local instance.
    fn init_master(
        &self,
        instance_id: u32,
        params: &MasterParams,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<()>;

    /// Deinitialize the master stack.
    fn deinit_master(&self, instance_id: u32) -> NativeResult<()>;

    /// Create a timing event; `None` when out of memory.
    fn create_event(&self) -> Option<NativeHandle>;

    /// Delete a timing event.
    fn delete_event(&self, event: NativeHandle);

    /// Start the auxiliary clock signalling `event` at `freq_hz`.
    fn aux_clock_init(&self, cpu_index: u32, freq_hz: u32, event: NativeHandle) -> NativeResult<()>;

    /// Stop the auxiliary clock.
    fn aux_clock_deinit(&self);

    /// Initialize the process-wide RAS client.
    fn ras_client_init(
        &self,
        params: &RasClientInit,
        notify: Callback<RasNotifyFn>,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<()>;

    /// Close the process-wide RAS client.
    fn ras_client_close(&self, timeout_ms: u32);

    /// Connect an instance to a remote master.
    fn ras_client_add_connection(
        &self,
        _instance_id: u32,
        _params: &RasClientParams,
    ) -> NativeResult<NativeHandle> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Drop a remote master connection.
    fn ras_client_remove_connection(
        &self,
        _conn: NativeHandle,
        _timeout_ms: u32,
    ) -> NativeResult<()> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Start a RAS server for the master.
    fn ras_server_start(
        &self,
        _params: &RasServerParams,
        _log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<NativeHandle> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Stop a RAS server.
    fn ras_server_stop(&self, _server: NativeHandle, _timeout_ms: u32) -> NativeResult<()> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Start a RAS server for the simulator.
    fn simulator_ras_server_start(
        &self,
        _params: &RasServerParams,
        _log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<NativeHandle> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Stop a simulator RAS server.
    fn simulator_ras_server_stop(
        &self,
        _server: NativeHandle,
        _timeout_ms: u32,
    ) -> NativeResult<()> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Initialize the process-wide mailbox gateway client.
    fn mbx_gateway_client_init(
        &self,
        log_level: LogSeverity,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<()>;

    /// Deinitialize the process-wide mailbox gateway client.
    fn mbx_gateway_client_deinit(&self, timeout_ms: u32);

    /// Connect an instance to a mailbox gateway.
    fn mbx_gateway_client_add_connection(
        &self,
        _instance_id: u32,
        _params: &MbxGatewayClientParams,
    ) -> NativeResult<NativeHandle> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Drop a mailbox gateway connection.
    fn mbx_gateway_client_remove_connection(&self, _conn: NativeHandle) -> NativeResult<()> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Start a mailbox gateway server.
    fn mbx_gateway_server_start(
        &self,
        _instance_id: u32,
        _params: &MbxGatewayServerParams,
    ) -> NativeResult<NativeHandle> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Stop a mailbox gateway server.
    fn mbx_gateway_server_stop(&self, _server: NativeHandle, _timeout_ms: u32) -> NativeResult<()> {
        Err(EcCode::NOT_SUPPORTED)
    }

    /// Create a simulator instance; returns the internal instance id.
    fn simulator_init(&self, instance_id: u32) -> NativeResult<u32>;

    /// Configure a simulator instance for hardware-in-the-loop.
    fn init_simulator(
        &self,
        instance_id: u32,
        params: &SimulatorParams,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<()>;

    /// Undo `init_simulator`.
    fn deinit_simulator(&self, instance_id: u32) -> NativeResult<()>;

    /// Undo `simulator_init`.
    fn simulator_deinit(&self, instance_id: u32) -> NativeResult<()>;

    /// Copy out the payload of a notification currently being delivered.
    fn notification_data(
        &self,
        code: u32,
        kind: PayloadKind,
        params: NotifyParams,
    ) -> NativeResult<Vec<u8>>;

    /// Hand application output back for a notification currently being delivered.
    fn set_notification_data(&self, params: NotifyParams, data: &[u8]) -> NativeResult<()>;

    /// Human-readable error messages attached to a master notification.
    fn notification_err_msgs(
        &self,
        instance_id: u32,
        code: u32,
        params: NotifyParams,
    ) -> NativeResult<Vec<String>>;

    /// Human-readable error messages attached to a RAS notification.
    fn ras_notification_err_msgs(
        &self,
        code: u32,
        params: NotifyParams,
    ) -> NativeResult<Vec<String>>;

    /// Register a notification client; returns the client id.
    fn register_client(
        &self,
        instance_id: u32,
        notify: Callback<EventNotifyFn>,
    ) -> NativeResult<u32>;

    /// Unregister a notification client.
    fn unregister_client(&self, instance_id: u32, client_id: u32) -> NativeResult<()>;

    /// Enable or disable a notification code for a client.
    fn enable_notification(
        &self,
        instance_id: u32,
        client_id: u32,
        code: u32,
        enable: bool,
    ) -> NativeResult<()>;

    /// Install (`Some`) or remove (`None`) the performance callback.
    fn enable_performance_measuring(
        &self,
        instance_id: u32,
        notify: Option<Callback<PerfNotifyFn>>,
    );

    /// Install (`Some`) or remove (`None`) the translation callback.
    fn enable_translation(&self, notify: Option<Callback<TranslateNotifyFn>>);

    /// Raise an application notification; returns the output written by handlers.
    fn notify_app(
        &self,
        instance_id: u32,
        code: u32,
        input: &[u8],
        out_capacity: usize,
    ) -> NativeResult<Vec<u8>>;

    /// Append a message to the native debug output.
    fn dbg_msg(&self, msg: &str);
}

static_assertions::assert_impl_all!(NotifyParams: Send, Sync, Copy);
static_assertions::assert_impl_all!(Callback<EventNotifyFn>: Send, Sync, Copy);
static_assertions::assert_obj_safe!(NativeMaster);
