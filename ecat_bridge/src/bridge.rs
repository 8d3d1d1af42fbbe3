//! Bridge instance: handler channels, throttling and lifecycle.
//!
//! An [`EcBridge`] wraps one native master, simulator, remote client or
//! server. It owns its handler registry and throttle queue, installs the
//! `extern "C"` callbacks of [`crate::ffi`] in the native layer and tracks
//! the coarse [`RunMode`].
//!
//! # Lifecycle
//!
//! ```text
//!                 init_instance(params)
//!  Uninitialized ───────────────────────► <mode of params>
//!        ▲                                      │
//!        └──────────── deinit_instance() ───────┘
//! ```
//!
//! Re-initializing an initialized bridge tears it down first. A failed
//! initialization leaves the bridge `Uninitialized` and out of the instance
//! registry. A failed teardown step returns early and leaves the run mode
//! untouched so that the teardown can be retried.
//!
//! Dropping the last [`EcBridge`] handle runs the teardown. If the native
//! layer still holds callbacks afterwards, the shared state stays allocated.

use crate::decode::{NotificationData, RasNotificationData};
use crate::ffi;
use crate::handlers::{HandlerError, HandlerId, HandlerRegistry, Notification};
use crate::instances::InstanceRegistry;
use crate::throttle::{Clock, SystemClock, ThrottleQueue};
use ecat_common::config::BridgeConfig;
use ecat_common::consts::{
    ECWRAPPER_API_VERSION, MBX_GATEWAY_DEINIT_TIMEOUT_MS, MIN_AUX_CLOCK_CYCLE_US,
    RAS_CLIENT_CLOSE_TIMEOUT_MS, RAS_KEEP_ALIVE_TRIGGER, RAS_REMOVE_CONNECTION_TIMEOUT_MS,
    RAS_SERVER_STOPPED_REMOVE_TIMEOUT_MS, SERVER_STOP_TIMEOUT_MS,
};
use ecat_common::error::{BridgeError, EcCode, ErrorReporting, NativeError, Operation};
use ecat_common::native::{
    Callback, DbgMsgNotifyFn, EventNotifyFn, InitKind, NativeHandle, NativeMaster, NativeResult,
    PerfNotifyFn, RasClientInit, RasNotifyFn, TranslateNotifyFn,
};
use ecat_common::notify::{Channel, NotifyCode, RasNotifyCode};
use ecat_common::params::{InitParams, MbxGatewayClientParams, RasClientParams, RunMode};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Construction options of an [`EcBridge`].
#[derive(Clone)]
pub struct BridgeOptions {
    /// How much context failed operations carry.
    pub error_reporting: ErrorReporting,
    /// Time source of the throttle queue.
    pub clock: Arc<dyn Clock>,
}

impl BridgeOptions {
    /// Options taken from a configuration file.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            error_reporting: config.error_reporting,
            ..Self::default()
        }
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            error_reporting: ErrorReporting::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LifecycleState {
    run_mode: RunMode,
    master_instance_id: u32,
    ras_connection: Option<NativeHandle>,
    mbx_gateway_connection: Option<NativeHandle>,
    server: Option<NativeHandle>,
    timing_event: Option<NativeHandle>,
}

/// State shared between bridge handles and the native callbacks.
///
/// Native callbacks carry a raw pointer to this struct as context. While
/// any such callback is installed the struct pins itself with a strong
/// reference, so a context handed to the native layer never dangles.
pub(crate) struct BridgeShared {
    pub(crate) id: u64,
    pub(crate) native: Arc<dyn NativeMaster>,
    pub(crate) registry: Arc<InstanceRegistry>,
    pub(crate) handlers: HandlerRegistry,
    this: Weak<BridgeShared>,
    clock: Arc<dyn Clock>,
    error_reporting: ErrorReporting,
    throttle: Mutex<ThrottleQueue>,
    state: Mutex<LifecycleState>,
    // Serializes init/deinit; never taken by callbacks.
    lifecycle: Mutex<()>,
    client_id: Mutex<Option<u32>>,
    perf_enabled: AtomicBool,
    ras_cookie: AtomicU32,
    last_scan_bus_result: Mutex<Option<EcCode>>,
    pin: Mutex<Option<Arc<BridgeShared>>>,
}

impl BridgeShared {
    pub(crate) fn is_throttled(&self, code: NotifyCode) -> bool {
        let now = self.clock.now_ms();
        self.throttle.lock().check(code, now)
    }

    pub(crate) fn master_instance_id(&self) -> u32 {
        self.state.lock().master_instance_id
    }

    fn run_mode(&self) -> RunMode {
        self.state.lock().run_mode
    }

    /// Cookie filter of the RAS fan-out.
    ///
    /// An instance without a cookie claims the cookie of the first
    /// `CONNECTION` notification it sees; afterwards it only accepts
    /// notifications carrying that cookie.
    pub(crate) fn accepts_ras_cookie(&self, cookie: u32, code: RasNotifyCode) -> bool {
        let mine = self.ras_cookie.load(Ordering::SeqCst);
        if mine == 0 {
            if code == RasNotifyCode::Connection
                && self
                    .ras_cookie
                    .compare_exchange(0, cookie, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                debug!("Instance {} claimed RAS cookie 0x{:08X}", self.id, cookie);
            }
            return true;
        }
        mine == cookie
    }

    /// Context pointer of instance callbacks; the address of the `Arc` allocation.
    fn ctx(&self) -> *mut c_void {
        (self as *const Self).cast_mut().cast()
    }

    fn registry_ctx(&self) -> *mut c_void {
        Arc::as_ptr(&self.registry).cast_mut().cast()
    }

    // ─── Callback ownership ─────────────────────────────────────────

    fn has_native_callbacks(&self) -> bool {
        self.run_mode() != RunMode::Uninitialized
            || self.client_id.lock().is_some()
            || self.perf_enabled.load(Ordering::SeqCst)
            || *self.registry.translation_owner() == Some(self.id)
    }

    /// Take or drop the self reference after callbacks were installed or removed.
    ///
    /// Callers always hold a strong reference of their own, so releasing the
    /// pin never frees `self`.
    fn update_pin(&self) {
        let pin = if self.has_native_callbacks() {
            self.this.upgrade()
        } else {
            None
        };
        let released = mem::replace(&mut *self.pin.lock(), pin);
        drop(released);
    }

    fn is_pinned(&self) -> bool {
        self.pin.lock().is_some()
    }

    fn set_translation(&self, enable: bool) {
        let mut owner = self.registry.translation_owner();
        let callback = enable.then(|| Callback::<TranslateNotifyFn> {
            func: ffi::translate_notify,
            ctx: self.ctx(),
        });
        self.native.enable_translation(callback);
        *owner = enable.then_some(self.id);
    }

    fn release_translation(&self) {
        let mut owner = self.registry.translation_owner();
        if *owner == Some(self.id) {
            self.native.enable_translation(None);
            *owner = None;
            debug!("Translation callback of instance {} removed", self.id);
        }
    }

    /// Uninstall the client, performance and translation callbacks.
    fn release_callbacks(&self) {
        let instance = self.master_instance_id();
        let client_id = self.client_id.lock().take();
        if let Some(client_id) = client_id {
            if let Err(code) = self.native.unregister_client(instance, client_id) {
                debug!("Client {} not unregistered: {}", client_id, code);
            }
        }
        if self.perf_enabled.swap(false, Ordering::SeqCst) {
            self.native.enable_performance_measuring(instance, None);
        }
        self.release_translation();
    }

    /// Teardown run when the last [`EcBridge`] handle goes away.
    fn teardown(&self) {
        let _lifecycle = self.lifecycle.lock();
        let run_mode = self.run_mode();
        if run_mode != RunMode::Uninitialized {
            debug!("Last handle of instance {} dropped in {} mode", self.id, run_mode);
            if let Err(e) = self.deinit_locked() {
                warn!("Teardown of dropped instance {} failed: {}", self.id, e);
            }
        }
        self.release_callbacks();
        self.update_pin();
        if self.is_pinned() {
            warn!(
                "Instance {} keeps native callbacks installed and stays allocated",
                self.id
            );
        }
    }

    // ─── Built-in handlers ──────────────────────────────────────────

    /// Returns false if there was no connection to remove.
    fn remove_ras_connection(&self, timeout_ms: u32) -> NativeResult<bool> {
        let Some(conn) = self.state.lock().ras_connection.take() else {
            return Ok(false);
        };
        match self.native.ras_client_remove_connection(conn, timeout_ms) {
            Ok(()) => Ok(true),
            Err(code) => {
                self.state.lock().ras_connection = Some(conn);
                Err(code)
            }
        }
    }

    fn on_scan_bus(&self, notification: &Notification) {
        if let Notification::Master {
            code: NotifyCode::SbStatus,
            data: NotificationData::ScanBusStatus { result, .. },
            ..
        } = notification
        {
            debug!("Scan bus finished: {}", result);
            *self.last_scan_bus_result.lock() = Some(*result);
        }
    }

    fn on_ras_connection(&self, notification: &Notification) {
        let Notification::Ras {
            code: RasNotifyCode::Connection,
            data: RasNotificationData::Connection { cause, .. },
            ..
        } = notification
        else {
            return;
        };
        if *cause != EcCode::EMRAS_SERVER_STOPPED {
            return;
        }

        match self.remove_ras_connection(RAS_SERVER_STOPPED_REMOVE_TIMEOUT_MS) {
            Ok(true) => info!(
                "Remote server stopped, RAS connection of instance {} removed",
                self.id
            ),
            Ok(false) => {}
            Err(code) => warn!("Cannot remove RAS connection after server stop: {}", code),
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    fn register(&self) {
        self.registry.insert(self.id, self.this.clone());
    }

    fn init_locked(&self, params: &InitParams) -> Result<(), BridgeError> {
        let native = &self.native;

        let api_version = native.api_version();
        if api_version != ECWRAPPER_API_VERSION {
            return Err(self.incompatible(api_version));
        }

        if self.run_mode() != RunMode::Uninitialized {
            if let Err(e) = self.deinit_locked() {
                warn!("Teardown before re-initialization failed: {}", e);
            }
            self.register();
        }

        let mut state = LifecycleState {
            run_mode: params.run_mode(),
            ..LifecycleState::default()
        };

        match params {
            InitParams::Simulator {
                instance_id,
                simulator,
            } => {
                let internal =
                    self.check(Operation::InitInstance, native.simulator_init(*instance_id))?;
                if let Some(sim) = simulator {
                    if let Err(code) = native.init_simulator(internal, sim, self.dbg_callback()) {
                        if let Err(e) = native.simulator_deinit(internal) {
                            debug!("Simulator cleanup failed: {}", e);
                        }
                        native.done(internal);
                        return Err(self.native_error(Operation::ConfigureNetwork, code));
                    }
                }
                state.master_instance_id = internal;
            }
            InitParams::MasterRasServer { ras } => {
                let server = native.ras_server_start(ras, self.dbg_callback());
                state.server = Some(self.check(Operation::Named("RasSrvStart"), server)?);
            }
            InitParams::SimulatorRasServer { ras } => {
                let server = native.simulator_ras_server_start(ras, self.dbg_callback());
                state.server = Some(self.check(Operation::Named("SimulatorRasSrvStart"), server)?);
            }
            InitParams::MbxGatewayServer {
                instance_id,
                gateway,
            } => {
                let server = native.mbx_gateway_server_start(*instance_id, gateway);
                state.server = Some(self.check(Operation::Named("MbxGatewaySrvStart"), server)?);
            }
            InitParams::Master {
                instance_id,
                master,
                use_aux_clock,
            } => {
                let internal = self.check(
                    Operation::InitInstance,
                    native.init(*instance_id, InitKind::Local),
                )?;
                state.master_instance_id = internal;

                if *use_aux_clock {
                    state.timing_event =
                        Some(self.start_aux_clock(internal, master.bus_cycle_time_us)?);
                }

                if let Err(code) = native.init_master(internal, master, self.dbg_callback()) {
                    if let Some(event) = state.timing_event {
                        native.aux_clock_deinit();
                        native.delete_event(event);
                    }
                    native.done(internal);
                    return Err(self.native_error(Operation::ConfigureMaster, code));
                }
            }
            InitParams::RasClient { instance_id, ras } => {
                let (internal, conn) = self.connect_ras_client(*instance_id, ras)?;
                state.master_instance_id = internal;
                state.ras_connection = Some(conn);
            }
            InitParams::MbxGatewayClient { gateway } => {
                let (internal, conn) = self.connect_mbx_gateway_client(gateway)?;
                state.master_instance_id = internal;
                state.mbx_gateway_connection = Some(conn);
            }
        }

        *self.state.lock() = state;
        Ok(())
    }

    fn start_aux_clock(
        &self,
        internal: u32,
        bus_cycle_time_us: u32,
    ) -> Result<NativeHandle, BridgeError> {
        let native = &self.native;
        let cycle_us = bus_cycle_time_us.max(MIN_AUX_CLOCK_CYCLE_US);
        let freq_hz = 1_000_000 / cycle_us;

        let Some(event) = native.create_event() else {
            native.dbg_msg("ERROR: insufficient memory to create timing event!\n");
            native.done(internal);
            return Err(self.native_error(Operation::InitInstance, EcCode::NO_MEMORY));
        };

        if let Err(code) = native.aux_clock_init(0, freq_hz, event) {
            native.dbg_msg("ERROR at auxiliary clock initialization!\n");
            native.delete_event(event);
            native.done(internal);
            return Err(self.native_error(Operation::InitInstance, code));
        }

        debug!("Aux clock running at {} Hz", freq_hz);
        Ok(event)
    }

    fn connect_ras_client(
        &self,
        instance_id: u32,
        params: &RasClientParams,
    ) -> Result<(u32, NativeHandle), BridgeError> {
        let native = &self.native;
        let registry = &self.registry;

        if registry.acquire_ras_client() == 1 {
            registry.set_ras_native(Some(Arc::clone(native)));
            let init = RasClientInit {
                keep_alive_trigger: RAS_KEEP_ALIVE_TRIGGER,
                log_level: params.log_level,
            };
            if let Err(code) =
                native.ras_client_init(&init, self.ras_callback(), self.registry_dbg_callback())
            {
                registry.release_ras_client();
                registry.set_ras_native(None);
                return Err(self.native_error(Operation::InitInstance, code));
            }
            info!("RAS client initialized");
        }

        let internal = match native.init(instance_id, InitKind::Remote) {
            Ok(internal) => internal,
            Err(code) => {
                self.release_ras_client();
                return Err(self.native_error(Operation::InitInstance, code));
            }
        };

        match native.ras_client_add_connection(internal, params) {
            Ok(conn) => {
                info!("RAS connection to {}:{} established", params.address, params.port);
                Ok((internal, conn))
            }
            Err(code) => {
                native.done(internal);
                self.release_ras_client();
                Err(self.native_error(Operation::Named("RasClntAddConnection"), code))
            }
        }
    }

    fn release_ras_client(&self) {
        if self.registry.release_ras_client() == Some(0) {
            self.native.ras_client_close(RAS_CLIENT_CLOSE_TIMEOUT_MS);
            self.registry.set_ras_native(None);
            info!("RAS client closed");
        }
    }

    fn connect_mbx_gateway_client(
        &self,
        params: &MbxGatewayClientParams,
    ) -> Result<(u32, NativeHandle), BridgeError> {
        let native = &self.native;
        let registry = &self.registry;

        if registry.acquire_mbx_gateway_client() == 1 {
            if let Err(code) =
                native.mbx_gateway_client_init(params.log_level, self.registry_dbg_callback())
            {
                registry.release_mbx_gateway_client();
                return Err(self.native_error(Operation::InitInstance, code));
            }
            info!("Mailbox gateway client initialized");
        }

        let internal = match native.init(0, InitKind::MbxGateway) {
            Ok(internal) => internal,
            Err(code) => {
                self.release_mbx_gateway_client();
                return Err(self.native_error(Operation::InitInstance, code));
            }
        };

        match native.mbx_gateway_client_add_connection(internal, params) {
            Ok(conn) => Ok((internal, conn)),
            Err(code) => {
                native.done(internal);
                self.release_mbx_gateway_client();
                Err(self.native_error(Operation::Named("MbxGatewayClntAddConnection"), code))
            }
        }
    }

    fn release_mbx_gateway_client(&self) {
        if self.registry.release_mbx_gateway_client() == Some(0) {
            self.native.mbx_gateway_client_deinit(MBX_GATEWAY_DEINIT_TIMEOUT_MS);
            info!("Mailbox gateway client deinitialized");
        }
    }

    fn deinit_locked(&self) -> Result<(), BridgeError> {
        let native = &self.native;
        let state = self.state.lock().clone();
        let op = Operation::DeinitInstance;
        let mut result = Ok(());

        match state.run_mode {
            RunMode::Uninitialized => return Ok(()),
            RunMode::RasClient => {
                self.remove_ras_connection(RAS_REMOVE_CONNECTION_TIMEOUT_MS)
                    .map_err(|code| self.native_error(op.clone(), code))?;
                self.release_ras_client();
            }
            RunMode::MbxGateway => {
                let conn = self.state.lock().mbx_gateway_connection.take();
                if let Some(conn) = conn {
                    if let Err(code) = native.mbx_gateway_client_remove_connection(conn) {
                        self.state.lock().mbx_gateway_connection = Some(conn);
                        return Err(self.native_error(op, code));
                    }
                }
                self.release_mbx_gateway_client();
            }
            RunMode::MbxGatewaySrv => {
                if let Some(server) = state.server {
                    self.check(
                        op.clone(),
                        native.mbx_gateway_server_stop(server, SERVER_STOP_TIMEOUT_MS),
                    )?;
                }
            }
            RunMode::Master => {
                result = self.check(op.clone(), native.deinit_master(state.master_instance_id));
                if let Some(event) = state.timing_event {
                    native.aux_clock_deinit();
                    native.delete_event(event);
                }
            }
            RunMode::SimulatorSil | RunMode::SimulatorHil => {
                if state.run_mode == RunMode::SimulatorHil {
                    self.check(op.clone(), native.deinit_simulator(state.master_instance_id))?;
                }
                self.check(op.clone(), native.simulator_deinit(state.master_instance_id))?;
            }
            RunMode::RasServer => {
                if let Some(server) = state.server {
                    self.check(op.clone(), native.ras_server_stop(server, SERVER_STOP_TIMEOUT_MS))?;
                }
            }
            RunMode::SimulatorRasServer => {
                if let Some(server) = state.server {
                    self.check(
                        op.clone(),
                        native.simulator_ras_server_stop(server, SERVER_STOP_TIMEOUT_MS),
                    )?;
                }
            }
        }

        self.release_callbacks();
        if !matches!(
            state.run_mode,
            RunMode::RasServer | RunMode::SimulatorRasServer | RunMode::MbxGatewaySrv
        ) {
            native.done(state.master_instance_id);
        }

        self.registry.remove(self.id);
        *self.state.lock() = LifecycleState::default();
        self.ras_cookie.store(0, Ordering::SeqCst);
        info!("Instance {} deinitialized from {} mode", self.id, state.run_mode);
        result
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn dbg_callback(&self) -> Callback<DbgMsgNotifyFn> {
        Callback {
            func: ffi::dbg_msg_notify,
            ctx: self.ctx(),
        }
    }

    fn registry_dbg_callback(&self) -> Callback<DbgMsgNotifyFn> {
        Callback {
            func: ffi::registry_dbg_msg_notify,
            ctx: self.registry_ctx(),
        }
    }

    fn ras_callback(&self) -> Callback<RasNotifyFn> {
        Callback {
            func: ffi::ras_event_notify,
            ctx: self.registry_ctx(),
        }
    }

    fn error_text(&self, code: EcCode) -> String {
        self.native
            .error_text(code)
            .unwrap_or_else(|| code.fallback_text())
    }

    fn native_error(&self, op: Operation, code: EcCode) -> BridgeError {
        let err = match self.error_reporting {
            ErrorReporting::Code => NativeError::bare(&op, code),
            ErrorReporting::Detailed => {
                let err = NativeError::detailed(&op, code, self.error_text(code));
                error!("{}", err.message);
                err
            }
        };
        err.into()
    }

    fn check<T>(&self, op: Operation, result: NativeResult<T>) -> Result<T, BridgeError> {
        result.map_err(|code| self.native_error(op, code))
    }

    fn incompatible(&self, api_version: u32) -> BridgeError {
        let code = EcCode::INVALID_PARM;
        let text = match self.error_reporting {
            ErrorReporting::Code => String::new(),
            ErrorReporting::Detailed => self.error_text(code),
        };
        let message = format!(
            "wrapper and native library are incompatible ({} != {})",
            ECWRAPPER_API_VERSION, api_version
        );
        error!("{}", message);
        NativeError {
            code,
            text,
            message,
        }
        .into()
    }
}

/// Shared by all clones of one [`EcBridge`]; dropping it tears the instance down.
struct HandleGuard(Arc<BridgeShared>);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.teardown();
    }
}

/// Handle to one bridge instance.
///
/// Cloning is cheap; all clones refer to the same instance. Dropping the
/// last clone deinitializes the instance and uninstalls its native
/// callbacks. A handler that captures a clone of its own bridge keeps the
/// instance alive.
#[derive(Clone)]
pub struct EcBridge {
    shared: Arc<BridgeShared>,
    _guard: Arc<HandleGuard>,
}

static_assertions::assert_impl_all!(EcBridge: Send, Sync, Clone);

impl EcBridge {
    /// Create a bridge with default options.
    pub fn new(native: Arc<dyn NativeMaster>, registry: Arc<InstanceRegistry>) -> Self {
        Self::with_options(native, registry, BridgeOptions::default())
    }

    /// Create a bridge.
    ///
    /// Two built-in handlers are registered (ids 1 and 2): an `onMaster`
    /// handler recording scan bus results and an `onRas` handler dropping the
    /// RAS connection when the remote server stops.
    pub fn with_options(
        native: Arc<dyn NativeMaster>,
        registry: Arc<InstanceRegistry>,
        options: BridgeOptions,
    ) -> Self {
        let id = registry.next_instance_id();
        let shared = Arc::new_cyclic(|weak: &Weak<BridgeShared>| {
            let handlers = HandlerRegistry::new();

            let this = weak.clone();
            handlers.add_channel(Channel::Master, move |n| {
                if let Some(shared) = this.upgrade() {
                    shared.on_scan_bus(n);
                }
                Ok(())
            });

            let this = weak.clone();
            handlers.add_channel(Channel::Ras, move |n| {
                if let Some(shared) = this.upgrade() {
                    shared.on_ras_connection(n);
                }
                Ok(())
            });

            BridgeShared {
                id,
                native,
                registry,
                handlers,
                this: weak.clone(),
                clock: options.clock,
                error_reporting: options.error_reporting,
                throttle: Mutex::new(ThrottleQueue::new()),
                state: Mutex::new(LifecycleState::default()),
                lifecycle: Mutex::new(()),
                client_id: Mutex::new(None),
                perf_enabled: AtomicBool::new(false),
                ras_cookie: AtomicU32::new(0),
                last_scan_bus_result: Mutex::new(None),
                pin: Mutex::new(None),
            }
        });

        debug!(
            "Bridge instance {} created on '{}' backend",
            id,
            shared.native.name()
        );
        Self {
            _guard: Arc::new(HandleGuard(Arc::clone(&shared))),
            shared,
        }
    }

    /// Registry key of this instance.
    pub fn instance_id(&self) -> u64 {
        self.shared.id
    }

    /// Current run mode.
    pub fn run_mode(&self) -> RunMode {
        self.shared.run_mode()
    }

    /// Native instance id in use (internal id once initialized).
    pub fn master_instance_id(&self) -> u32 {
        self.shared.master_instance_id()
    }

    /// Result of the last `SB_STATUS` notification.
    pub fn last_scan_bus_result(&self) -> Option<EcCode> {
        *self.shared.last_scan_bus_result.lock()
    }

    /// RAS cookie claimed by this instance, if any.
    pub fn ras_cookie(&self) -> Option<u32> {
        match self.shared.ras_cookie.load(Ordering::SeqCst) {
            0 => None,
            cookie => Some(cookie),
        }
    }

    /// Error reporting policy.
    pub fn error_reporting(&self) -> ErrorReporting {
        self.shared.error_reporting
    }

    // ─── Handlers ───────────────────────────────────────────────────

    /// Register a handler by channel name (`onMaster`, `onRas`, ...).
    ///
    /// Returns [`HandlerId::INVALID`] for unknown names.
    pub fn add_handler<F>(&self, name: &str, callback: F) -> HandlerId
    where
        F: Fn(&mut Notification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.shared.handlers.add(name, callback)
    }

    /// Register a handler for a channel.
    pub fn add_channel_handler<F>(&self, channel: Channel, callback: F) -> HandlerId
    where
        F: Fn(&mut Notification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.shared.handlers.add_channel(channel, callback)
    }

    /// Remove a handler. Returns false if `id` is unknown.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.shared.handlers.remove(id)
    }

    /// Returns true if at least one handler listens on `channel`.
    pub fn has_handler(&self, channel: Channel) -> bool {
        self.shared.handlers.has_handler(channel)
    }

    /// Deliver `notification` to the handlers of its channel.
    pub fn dispatch(&self, notification: &mut Notification) -> Result<(), HandlerError> {
        self.shared.handlers.dispatch(notification.channel(), notification)
    }

    // ─── Throttling ─────────────────────────────────────────────────

    /// Throttle `code` with a window of `timeout_ms` (0 disables).
    ///
    /// Application notifications share the [`NotifyCode::Undefined`] window.
    pub fn set_throttle(&self, code: NotifyCode, timeout_ms: u64) {
        self.shared.throttle.lock().set(code, timeout_ms);
        debug!("Throttle {} set to {} ms", code, timeout_ms);
    }

    /// Check (and record) a notification of `code` against its throttle window.
    pub fn is_throttled(&self, code: NotifyCode) -> bool {
        self.shared.is_throttled(code)
    }

    /// Configured throttle window of `code`.
    pub fn throttle_timeout(&self, code: NotifyCode) -> Option<u64> {
        self.shared.throttle.lock().timeout(code)
    }

    /// Number of throttled codes.
    pub fn throttled_codes(&self) -> usize {
        self.shared.throttle.lock().len()
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Initialize the instance in the mode selected by `params`.
    ///
    /// # Errors
    /// Returns `BridgeError::Native` if the native library is incompatible or
    /// one of the native steps fails. The bridge is then `Uninitialized`.
    pub fn init_instance(&self, params: &InitParams) -> Result<(), BridgeError> {
        let shared = &self.shared;
        let _lifecycle = shared.lifecycle.lock();
        shared.register();

        let result = shared.init_locked(params);
        match &result {
            Ok(()) => info!(
                "Instance {} initialized in {} mode (native id {})",
                shared.id,
                shared.run_mode(),
                shared.master_instance_id()
            ),
            Err(e) => {
                shared.registry.remove(shared.id);
                shared.state.lock().run_mode = RunMode::Uninitialized;
                warn!("Instance {} initialization failed: {}", shared.id, e);
            }
        }
        shared.update_pin();
        result
    }

    /// Tear the instance down.
    ///
    /// Tearing down an initialized instance also removes its notification
    /// client, its performance callback and a translation callback it installed.
    ///
    /// # Errors
    /// A failing step returns its error early; run mode and registry
    /// membership stay unchanged so the call can be repeated. A failing
    /// master deinitialization is the exception: teardown completes and the
    /// error is returned afterwards.
    pub fn deinit_instance(&self) -> Result<(), BridgeError> {
        let _lifecycle = self.shared.lifecycle.lock();
        let result = self.shared.deinit_locked();
        self.shared.update_pin();
        result
    }

    /// Returns true while the native layer holds callbacks of this instance.
    pub fn has_native_callbacks(&self) -> bool {
        self.shared.is_pinned()
    }

    // ─── Native passthrough ─────────────────────────────────────────

    /// Register this instance as a notification client of the master.
    ///
    /// # Errors
    /// Returns the native error; the previous client id is forgotten.
    pub fn register_client(&self) -> Result<u32, BridgeError> {
        *self.shared.client_id.lock() = None;
        let callback: Callback<EventNotifyFn> = Callback {
            func: ffi::master_event_notify,
            ctx: self.shared.ctx(),
        };
        let result = self.shared.check(
            Operation::RegisterClient,
            self.shared
                .native
                .register_client(self.master_instance_id(), callback),
        );
        if let Ok(client_id) = result {
            *self.shared.client_id.lock() = Some(client_id);
            info!("Registered notification client {}", client_id);
        }
        self.shared.update_pin();
        result
    }

    /// Unregister the client created by [`register_client`](Self::register_client).
    pub fn unregister_client(&self) -> Result<(), BridgeError> {
        let op = Operation::Named("UnregisterClient");
        let Some(client_id) = *self.shared.client_id.lock() else {
            return Err(self.shared.native_error(op, EcCode::INVALID_STATE));
        };
        self.shared.check(
            op,
            self.shared
                .native
                .unregister_client(self.master_instance_id(), client_id),
        )?;
        *self.shared.client_id.lock() = None;
        self.shared.update_pin();
        Ok(())
    }

    /// Client id of the registered client.
    pub fn client_id(&self) -> Option<u32> {
        *self.shared.client_id.lock()
    }

    /// Enable or disable a notification code for `client_id`.
    pub fn enable_notification(
        &self,
        client_id: u32,
        code: u32,
        enable: bool,
    ) -> Result<(), BridgeError> {
        self.shared.check(
            Operation::Named("EnableNotification"),
            self.shared
                .native
                .enable_notification(self.master_instance_id(), client_id, code, enable),
        )
    }

    /// Install or remove the performance measurement callback.
    pub fn enable_performance_measuring(&self, enable: bool) {
        let callback = enable.then(|| Callback::<PerfNotifyFn> {
            func: ffi::perf_notify,
            ctx: self.shared.ctx(),
        });
        self.shared
            .native
            .enable_performance_measuring(self.master_instance_id(), callback);
        self.shared.perf_enabled.store(enable, Ordering::SeqCst);
        self.shared.update_pin();
    }

    /// Install or remove the process-wide translation callback.
    ///
    /// Enabling replaces the callback of any other instance; disabling
    /// removes whichever callback is installed.
    pub fn enable_translation(&self, enable: bool) {
        self.shared.set_translation(enable);
        self.shared.update_pin();
    }

    /// Raise application notification `code` (relative to `EC_NOTIFY_APP`)
    /// and return the output written by the handlers.
    pub fn notify_app(
        &self,
        code: u32,
        input: &[u8],
        out_capacity: usize,
    ) -> Result<Vec<u8>, BridgeError> {
        self.shared.check(
            Operation::Named("NotifyApp"),
            self.shared
                .native
                .notify_app(self.master_instance_id(), code, input, out_capacity),
        )
    }

    /// Append a message to the native debug output.
    pub fn add_dbg_msg(&self, msg: &str) {
        self.shared.native.dbg_msg(msg);
    }

    /// Native text of a result code.
    pub fn error_text(&self, code: EcCode) -> String {
        self.shared.error_text(code)
    }
}

impl fmt::Debug for EcBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcBridge")
            .field("id", &self.shared.id)
            .field("backend", &self.shared.native.name())
            .field("run_mode", &self.run_mode())
            .field("handlers", &self.shared.handlers)
            .finish()
    }
}
