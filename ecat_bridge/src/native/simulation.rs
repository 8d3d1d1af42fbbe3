//! In-process simulation of the native master library.
//!
//! `SimulatedMaster` implements [`NativeMaster`] without hardware. It keeps
//! the installed callbacks and lets the caller raise master, RAS, log,
//! performance and translation events on the native side; events are
//! delivered synchronously on the calling thread.
//!
//! Every native call is recorded, and any call can be made to fail with
//! [`SimulatedMaster::fail`].

use ecat_common::consts::{EC_NOTIFY_APP, ECWRAPPER_API_VERSION};
use ecat_common::error::EcCode;
use ecat_common::native::{
    Callback, DbgMsgNotifyFn, EventNotifyFn, InitKind, NativeHandle, NativeMaster, NativeResult,
    NotifyParams, PerfNotifyFn, RasClientInit, RasNotifyFn, TranslateNotifyFn,
};
use ecat_common::notify::{LogSeverity, LogType, PayloadKind};
use ecat_common::params::{
    MasterParams, MbxGatewayClientParams, MbxGatewayServerParams, RasClientParams,
    RasServerParams, SimulatorParams,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::ffi::{CString, c_void};
use std::ptr;
use tracing::{debug, trace};

/// First internal id handed out for remote (RAS / mailbox gateway) instances.
pub const REMOTE_INSTANCE_BASE: u32 = 0x0001_0000;

/// Origin of a native log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LogSource {
    Master(u32),
    Simulator(u32),
    RasServer(NativeHandle),
    RasClient,
    MbxGatewayClient,
}

impl LogSource {
    fn log_type(self) -> LogType {
        match self {
            LogSource::Master(_) => LogType::Master,
            LogSource::Simulator(_) => LogType::Simulator,
            LogSource::RasServer(_) => LogType::RasServer,
            LogSource::RasClient => LogType::RasClient,
            LogSource::MbxGatewayClient => LogType::MbxGateway,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerKind {
    Ras,
    SimulatorRas,
    MbxGateway,
}

struct Client {
    instance_id: u32,
    notify: Callback<EventNotifyFn>,
    disabled: HashSet<u32>,
}

#[derive(Default)]
struct Pending {
    payload: Vec<u8>,
    err_msgs: Vec<String>,
    output: Option<Vec<u8>>,
}

struct SimState {
    api_version: u32,
    eval_limited: bool,
    failures: HashMap<&'static str, EcCode>,
    calls: Vec<&'static str>,
    dbg_output: Vec<String>,

    instances: HashMap<u32, InitKind>,
    next_remote: u32,
    masters: HashSet<u32>,
    simulators: HashMap<u32, bool>,

    clients: HashMap<u32, Client>,
    next_client: u32,

    events: HashSet<NativeHandle>,
    aux_clock: Option<(u32, NativeHandle)>,
    next_handle: u64,

    ras_client: Option<Callback<RasNotifyFn>>,
    connections: HashMap<NativeHandle, u32>,
    mbx_gateway_client: bool,
    servers: HashMap<NativeHandle, ServerKind>,

    logs: HashMap<LogSource, Callback<DbgMsgNotifyFn>>,
    perf: HashMap<u32, Callback<PerfNotifyFn>>,
    translate: Option<Callback<TranslateNotifyFn>>,

    pending: HashMap<usize, Pending>,
    next_token: usize,
    last_payload_kind: Option<PayloadKind>,
}

impl SimState {
    fn new() -> Self {
        Self {
            api_version: ECWRAPPER_API_VERSION,
            eval_limited: false,
            failures: HashMap::new(),
            calls: Vec::new(),
            dbg_output: Vec::new(),
            instances: HashMap::new(),
            next_remote: REMOTE_INSTANCE_BASE,
            masters: HashSet::new(),
            simulators: HashMap::new(),
            clients: HashMap::new(),
            next_client: 1,
            events: HashSet::new(),
            aux_clock: None,
            next_handle: 1,
            ras_client: None,
            connections: HashMap::new(),
            mbx_gateway_client: false,
            servers: HashMap::new(),
            logs: HashMap::new(),
            perf: HashMap::new(),
            translate: None,
            pending: HashMap::new(),
            next_token: 1,
            last_payload_kind: None,
        }
    }

    /// Record the call and apply an injected failure.
    fn enter(&mut self, op: &'static str) -> NativeResult<()> {
        self.calls.push(op);
        match self.failures.get(op) {
            Some(code) => Err(*code),
            None => Ok(()),
        }
    }

    fn handle(&mut self) -> NativeHandle {
        let handle = NativeHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn require_instance(&self, instance_id: u32) -> NativeResult<()> {
        if self.instances.contains_key(&instance_id) {
            Ok(())
        } else {
            Err(EcCode::INVALID_STATE)
        }
    }

    fn server_feature(&self) -> NativeResult<()> {
        if self.eval_limited {
            Err(EcCode::NOT_SUPPORTED)
        } else {
            Ok(())
        }
    }
}

/// Simulated native master library.
pub struct SimulatedMaster {
    state: Mutex<SimState>,
}

impl SimulatedMaster {
    /// Create a simulated library reporting the current wrapper API version.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::new()),
        }
    }

    /// Report `version` as wrapper API version.
    pub fn with_api_version(self, version: u32) -> Self {
        self.state.lock().api_version = version;
        self
    }

    /// Behave like an evaluation build: servers and RAS connections are not supported.
    pub fn eval_limited(self) -> Self {
        self.state.lock().eval_limited = true;
        self
    }

    // ─── Fault injection and inspection ─────────────────────────────

    /// Make every later call of native operation `op` fail with `code`.
    ///
    /// `op` is the [`NativeMaster`] method name, e.g. `"init_master"`.
    pub fn fail(&self, op: &'static str, code: EcCode) {
        self.state.lock().failures.insert(op, code);
    }

    /// Undo [`fail`](Self::fail).
    pub fn clear_failure(&self, op: &'static str) {
        self.state.lock().failures.remove(op);
    }

    /// Native operations called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of native operation `op`.
    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == op).count()
    }

    /// Messages written to the native debug output.
    pub fn dbg_output(&self) -> Vec<String> {
        self.state.lock().dbg_output.clone()
    }

    /// Payload kind requested by the last payload fetch.
    pub fn last_payload_kind(&self) -> Option<PayloadKind> {
        self.state.lock().last_payload_kind
    }

    /// Number of open native instances.
    pub fn open_instances(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// Number of registered notification clients.
    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Returns true while the process-wide RAS client is open.
    pub fn ras_client_open(&self) -> bool {
        self.state.lock().ras_client.is_some()
    }

    /// Returns true while the process-wide mailbox gateway client is open.
    pub fn mbx_gateway_client_open(&self) -> bool {
        self.state.lock().mbx_gateway_client
    }

    /// Number of open RAS / mailbox gateway connections.
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Number of running servers.
    pub fn server_count(&self) -> usize {
        self.state.lock().servers.len()
    }

    /// Frequency of the running auxiliary clock.
    pub fn aux_clock_hz(&self) -> Option<u32> {
        self.state.lock().aux_clock.map(|(hz, _)| hz)
    }

    /// Number of live timing events.
    pub fn event_count(&self) -> usize {
        self.state.lock().events.len()
    }

    // ─── Event sources ──────────────────────────────────────────────

    /// Deliver master notification `code` to every client of `instance_id`.
    ///
    /// Returns the output the last client handed back, if any.
    pub fn raise_master_event(
        &self,
        instance_id: u32,
        code: u32,
        payload: &[u8],
    ) -> Option<Vec<u8>> {
        self.raise_master_event_with_msgs(instance_id, code, payload, Vec::new())
    }

    /// Like [`raise_master_event`](Self::raise_master_event), with error messages attached.
    pub fn raise_master_event_with_msgs(
        &self,
        instance_id: u32,
        code: u32,
        payload: &[u8],
        err_msgs: Vec<String>,
    ) -> Option<Vec<u8>> {
        let (token, targets) = {
            let mut state = self.state.lock();
            let mut targets: Vec<(u32, Callback<EventNotifyFn>)> = state
                .clients
                .iter()
                .filter(|(_, c)| c.instance_id == instance_id && !c.disabled.contains(&code))
                .map(|(id, c)| (*id, c.notify))
                .collect();
            if targets.is_empty() {
                trace!("Notification 0x{:08X} has no client", code);
                return None;
            }
            targets.sort_by_key(|(id, _)| *id);

            let token = state.next_token;
            state.next_token += 1;
            state.pending.insert(
                token,
                Pending {
                    payload: payload.to_vec(),
                    err_msgs,
                    output: None,
                },
            );
            (token, targets)
        };

        for (_, cb) in targets {
            // SAFETY: `cb` was installed by the bridge together with its context.
            unsafe { (cb.func)(cb.ctx, code, params_ptr(token)) };
        }

        self.state.lock().pending.remove(&token).and_then(|p| p.output)
    }

    /// Deliver remote API notification `code` through the RAS client callback.
    ///
    /// Returns false if no RAS client is open.
    pub fn raise_ras_event(&self, code: u32, payload: &[u8], err_msgs: Vec<String>) -> bool {
        let (token, cb) = {
            let mut state = self.state.lock();
            let Some(cb) = state.ras_client else {
                return false;
            };
            let token = state.next_token;
            state.next_token += 1;
            state.pending.insert(
                token,
                Pending {
                    payload: payload.to_vec(),
                    err_msgs,
                    output: None,
                },
            );
            (token, cb)
        };

        // SAFETY: `cb` was installed by the bridge together with its context.
        unsafe { (cb.func)(cb.ctx, code, params_ptr(token)) };
        self.state.lock().pending.remove(&token);
        true
    }

    /// Emit a log line on every stream of `log_type`. Returns the number of receivers.
    pub fn emit_log(&self, log_type: LogType, severity: LogSeverity, msg: &str) -> usize {
        let targets: Vec<_> = self
            .state
            .lock()
            .logs
            .iter()
            .filter(|(source, _)| source.log_type() == log_type)
            .map(|(_, cb)| *cb)
            .collect();

        let text = c_string(msg);
        for cb in &targets {
            // SAFETY: `cb` was installed by the bridge together with its context.
            unsafe { (cb.func)(cb.ctx, log_type as u32, severity as u32, text.as_ptr()) };
        }
        targets.len()
    }

    /// Report a performance measurement of `function` for `instance_id`.
    pub fn measure(&self, instance_id: u32, function: &str, time: u32) -> bool {
        let Some(cb) = self.state.lock().perf.get(&instance_id).copied() else {
            return false;
        };
        let name = c_string(function);
        // SAFETY: `cb` was installed by the bridge together with its context.
        unsafe { (cb.func)(cb.ctx, name.as_ptr(), time) };
        true
    }

    /// Deliver a translated master string.
    pub fn translate(&self, code: u32, msg: &str) -> bool {
        let Some(cb) = self.state.lock().translate else {
            return false;
        };
        let text = c_string(msg);
        // SAFETY: `cb` was installed by the bridge together with its context.
        unsafe { (cb.func)(cb.ctx, code, text.as_ptr()) };
        true
    }
}

impl Default for SimulatedMaster {
    fn default() -> Self {
        Self::new()
    }
}

fn params_ptr(token: usize) -> *mut c_void {
    ptr::without_provenance_mut(token)
}

fn token(params: NotifyParams) -> usize {
    params.0.addr()
}

fn c_string(msg: &str) -> CString {
    CString::new(msg.replace('\0', " ")).unwrap_or_default()
}

impl NativeMaster for SimulatedMaster {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn api_version(&self) -> u32 {
        self.state.lock().api_version
    }

    fn error_text(&self, code: EcCode) -> Option<String> {
        let text = match code {
            EcCode::NO_ERROR => "No Error",
            EcCode::ERROR => "Unspecific Error",
            EcCode::NOT_SUPPORTED => "Feature not supported",
            EcCode::BUSY => "Device is busy",
            EcCode::NO_MEMORY => "Not enough memory",
            EcCode::INVALID_PARM => "Invalid parameter",
            EcCode::NOT_FOUND => "Not found",
            EcCode::INVALID_STATE => "Invalid state",
            EcCode::TIMEOUT => "Timeout",
            EcCode::EMRAS_SERVER_STOPPED => "Remote server stopped",
            _ => return None,
        };
        Some(text.to_string())
    }

    fn init(&self, instance_id: u32, kind: InitKind) -> NativeResult<u32> {
        let mut state = self.state.lock();
        state.enter("init")?;
        let internal = match kind {
            InitKind::Local => {
                if state.instances.contains_key(&instance_id) {
                    return Err(EcCode::INVALID_STATE);
                }
                instance_id
            }
            InitKind::Remote | InitKind::MbxGateway => {
                let id = state.next_remote;
                state.next_remote += 1;
                id
            }
        };
        state.instances.insert(internal, kind);
        debug!("Simulated instance {} opened ({:?})", internal, kind);
        Ok(internal)
    }

    fn done(&self, instance_id: u32) {
        let mut state = self.state.lock();
        state.calls.push("done");
        state.instances.remove(&instance_id);
        state.masters.remove(&instance_id);
        state.perf.remove(&instance_id);
        state.clients.retain(|_, c| c.instance_id != instance_id);
        state.logs.remove(&LogSource::Master(instance_id));
    }

    fn init_master(
        &self,
        instance_id: u32,
        params: &MasterParams,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("init_master")?;
        state.require_instance(instance_id)?;
        if params.bus_cycle_time_us == 0 {
            return Err(EcCode::INVALID_PARM);
        }
        state.masters.insert(instance_id);
        state.logs.insert(LogSource::Master(instance_id), log);
        Ok(())
    }

    fn deinit_master(&self, instance_id: u32) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("deinit_master")?;
        if !state.masters.remove(&instance_id) {
            return Err(EcCode::INVALID_STATE);
        }
        state.logs.remove(&LogSource::Master(instance_id));
        Ok(())
    }

    fn create_event(&self) -> Option<NativeHandle> {
        let mut state = self.state.lock();
        state.enter("create_event").ok()?;
        let event = state.handle();
        state.events.insert(event);
        Some(event)
    }

    fn delete_event(&self, event: NativeHandle) {
        let mut state = self.state.lock();
        state.calls.push("delete_event");
        state.events.remove(&event);
    }

    fn aux_clock_init(
        &self,
        _cpu_index: u32,
        freq_hz: u32,
        event: NativeHandle,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("aux_clock_init")?;
        if !state.events.contains(&event) || freq_hz == 0 {
            return Err(EcCode::INVALID_PARM);
        }
        state.aux_clock = Some((freq_hz, event));
        Ok(())
    }

    fn aux_clock_deinit(&self) {
        let mut state = self.state.lock();
        state.calls.push("aux_clock_deinit");
        state.aux_clock = None;
    }

    fn ras_client_init(
        &self,
        params: &RasClientInit,
        notify: Callback<RasNotifyFn>,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("ras_client_init")?;
        if state.ras_client.is_some() {
            return Err(EcCode::INVALID_STATE);
        }
        debug!("Simulated RAS client open (keep alive {})", params.keep_alive_trigger);
        state.ras_client = Some(notify);
        state.logs.insert(LogSource::RasClient, log);
        Ok(())
    }

    fn ras_client_close(&self, _timeout_ms: u32) {
        let mut state = self.state.lock();
        state.calls.push("ras_client_close");
        state.ras_client = None;
        state.logs.remove(&LogSource::RasClient);
    }

    fn ras_client_add_connection(
        &self,
        instance_id: u32,
        params: &RasClientParams,
    ) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        state.enter("ras_client_add_connection")?;
        state.server_feature()?;
        state.require_instance(instance_id)?;
        if state.ras_client.is_none() || params.address.is_empty() {
            return Err(EcCode::INVALID_PARM);
        }
        let conn = state.handle();
        state.connections.insert(conn, instance_id);
        Ok(conn)
    }

    fn ras_client_remove_connection(
        &self,
        conn: NativeHandle,
        _timeout_ms: u32,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("ras_client_remove_connection")?;
        state
            .connections
            .remove(&conn)
            .map(|_| ())
            .ok_or(EcCode::NOT_FOUND)
    }

    fn ras_server_start(
        &self,
        _params: &RasServerParams,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        state.enter("ras_server_start")?;
        state.server_feature()?;
        let server = state.handle();
        state.servers.insert(server, ServerKind::Ras);
        state.logs.insert(LogSource::RasServer(server), log);
        Ok(server)
    }

    fn ras_server_stop(&self, server: NativeHandle, _timeout_ms: u32) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("ras_server_stop")?;
        stop_server(&mut state, server, ServerKind::Ras)
    }

    fn simulator_ras_server_start(
        &self,
        _params: &RasServerParams,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        state.enter("simulator_ras_server_start")?;
        state.server_feature()?;
        let server = state.handle();
        state.servers.insert(server, ServerKind::SimulatorRas);
        state.logs.insert(LogSource::RasServer(server), log);
        Ok(server)
    }

    fn simulator_ras_server_stop(
        &self,
        server: NativeHandle,
        _timeout_ms: u32,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("simulator_ras_server_stop")?;
        stop_server(&mut state, server, ServerKind::SimulatorRas)
    }

    fn mbx_gateway_client_init(
        &self,
        _log_level: LogSeverity,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("mbx_gateway_client_init")?;
        if state.mbx_gateway_client {
            return Err(EcCode::INVALID_STATE);
        }
        state.mbx_gateway_client = true;
        state.logs.insert(LogSource::MbxGatewayClient, log);
        Ok(())
    }

    fn mbx_gateway_client_deinit(&self, _timeout_ms: u32) {
        let mut state = self.state.lock();
        state.calls.push("mbx_gateway_client_deinit");
        state.mbx_gateway_client = false;
        state.logs.remove(&LogSource::MbxGatewayClient);
    }

    fn mbx_gateway_client_add_connection(
        &self,
        instance_id: u32,
        params: &MbxGatewayClientParams,
    ) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        state.enter("mbx_gateway_client_add_connection")?;
        state.require_instance(instance_id)?;
        if !state.mbx_gateway_client || params.address.is_empty() {
            return Err(EcCode::INVALID_PARM);
        }
        let conn = state.handle();
        state.connections.insert(conn, instance_id);
        Ok(conn)
    }

    fn mbx_gateway_client_remove_connection(&self, conn: NativeHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("mbx_gateway_client_remove_connection")?;
        state
            .connections
            .remove(&conn)
            .map(|_| ())
            .ok_or(EcCode::NOT_FOUND)
    }

    fn mbx_gateway_server_start(
        &self,
        _instance_id: u32,
        _params: &MbxGatewayServerParams,
    ) -> NativeResult<NativeHandle> {
        let mut state = self.state.lock();
        state.enter("mbx_gateway_server_start")?;
        state.server_feature()?;
        let server = state.handle();
        state.servers.insert(server, ServerKind::MbxGateway);
        Ok(server)
    }

    fn mbx_gateway_server_stop(&self, server: NativeHandle, _timeout_ms: u32) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("mbx_gateway_server_stop")?;
        stop_server(&mut state, server, ServerKind::MbxGateway)
    }

    fn simulator_init(&self, instance_id: u32) -> NativeResult<u32> {
        let mut state = self.state.lock();
        state.enter("simulator_init")?;
        if state.instances.contains_key(&instance_id) {
            return Err(EcCode::INVALID_STATE);
        }
        state.instances.insert(instance_id, InitKind::Local);
        state.simulators.insert(instance_id, false);
        Ok(instance_id)
    }

    fn init_simulator(
        &self,
        instance_id: u32,
        params: &SimulatorParams,
        log: Callback<DbgMsgNotifyFn>,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("init_simulator")?;
        if params.network_file.is_empty() {
            return Err(EcCode::INVALID_PARM);
        }
        let Some(hil) = state.simulators.get_mut(&instance_id) else {
            return Err(EcCode::INVALID_STATE);
        };
        *hil = true;
        state.logs.insert(LogSource::Simulator(instance_id), log);
        Ok(())
    }

    fn deinit_simulator(&self, instance_id: u32) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("deinit_simulator")?;
        match state.simulators.get_mut(&instance_id) {
            Some(hil) if *hil => *hil = false,
            _ => return Err(EcCode::INVALID_STATE),
        }
        state.logs.remove(&LogSource::Simulator(instance_id));
        Ok(())
    }

    fn simulator_deinit(&self, instance_id: u32) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("simulator_deinit")?;
        state
            .simulators
            .remove(&instance_id)
            .map(|_| ())
            .ok_or(EcCode::INVALID_STATE)?;
        state.logs.remove(&LogSource::Simulator(instance_id));
        Ok(())
    }

    fn notification_data(
        &self,
        _code: u32,
        kind: PayloadKind,
        params: NotifyParams,
    ) -> NativeResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.enter("notification_data")?;
        state.last_payload_kind = Some(kind);
        state
            .pending
            .get(&token(params))
            .map(|p| p.payload.clone())
            .ok_or(EcCode::INVALID_PARM)
    }

    fn set_notification_data(&self, params: NotifyParams, data: &[u8]) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("set_notification_data")?;
        let pending = state.pending.get_mut(&token(params)).ok_or(EcCode::INVALID_PARM)?;
        pending.output = Some(data.to_vec());
        Ok(())
    }

    fn notification_err_msgs(
        &self,
        _instance_id: u32,
        _code: u32,
        params: NotifyParams,
    ) -> NativeResult<Vec<String>> {
        let mut state = self.state.lock();
        state.enter("notification_err_msgs")?;
        state
            .pending
            .get(&token(params))
            .map(|p| p.err_msgs.clone())
            .ok_or(EcCode::INVALID_PARM)
    }

    fn ras_notification_err_msgs(
        &self,
        _code: u32,
        params: NotifyParams,
    ) -> NativeResult<Vec<String>> {
        let mut state = self.state.lock();
        state.enter("ras_notification_err_msgs")?;
        state
            .pending
            .get(&token(params))
            .map(|p| p.err_msgs.clone())
            .ok_or(EcCode::INVALID_PARM)
    }

    fn register_client(
        &self,
        instance_id: u32,
        notify: Callback<EventNotifyFn>,
    ) -> NativeResult<u32> {
        let mut state = self.state.lock();
        state.enter("register_client")?;
        state.require_instance(instance_id)?;
        let client_id = state.next_client;
        state.next_client += 1;
        state.clients.insert(
            client_id,
            Client {
                instance_id,
                notify,
                disabled: HashSet::new(),
            },
        );
        Ok(client_id)
    }

    fn unregister_client(&self, _instance_id: u32, client_id: u32) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("unregister_client")?;
        state
            .clients
            .remove(&client_id)
            .map(|_| ())
            .ok_or(EcCode::NOT_FOUND)
    }

    fn enable_notification(
        &self,
        _instance_id: u32,
        client_id: u32,
        code: u32,
        enable: bool,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("enable_notification")?;
        let client = state.clients.get_mut(&client_id).ok_or(EcCode::NOT_FOUND)?;
        if enable {
            client.disabled.remove(&code);
        } else {
            client.disabled.insert(code);
        }
        Ok(())
    }

    fn enable_performance_measuring(
        &self,
        instance_id: u32,
        notify: Option<Callback<PerfNotifyFn>>,
    ) {
        let mut state = self.state.lock();
        state.calls.push("enable_performance_measuring");
        match notify {
            Some(cb) => state.perf.insert(instance_id, cb),
            None => state.perf.remove(&instance_id),
        };
    }

    fn enable_translation(&self, notify: Option<Callback<TranslateNotifyFn>>) {
        let mut state = self.state.lock();
        state.calls.push("enable_translation");
        state.translate = notify;
    }

    fn notify_app(
        &self,
        instance_id: u32,
        code: u32,
        input: &[u8],
        out_capacity: usize,
    ) -> NativeResult<Vec<u8>> {
        {
            let mut state = self.state.lock();
            state.enter("notify_app")?;
            state.require_instance(instance_id)?;
        }
        let raw = EC_NOTIFY_APP.checked_add(code).ok_or(EcCode::INVALID_PARM)?;
        let mut output = self.raise_master_event(instance_id, raw, input).unwrap_or_default();
        output.truncate(out_capacity);
        Ok(output)
    }

    fn dbg_msg(&self, msg: &str) {
        let mut state = self.state.lock();
        state.calls.push("dbg_msg");
        state.dbg_output.push(msg.to_string());
    }
}

fn stop_server(state: &mut SimState, server: NativeHandle, kind: ServerKind) -> NativeResult<()> {
    match state.servers.get(&server) {
        Some(k) if *k == kind => {
            state.servers.remove(&server);
            state.logs.remove(&LogSource::RasServer(server));
            Ok(())
        }
        _ => Err(EcCode::NOT_FOUND),
    }
}
