//! `extern "C"` callbacks installed in the native library.
//!
//! Instance callbacks receive the context pointer of one
//! [`EcBridge`](crate::bridge::EcBridge); the RAS callback and the log
//! callback of process-wide components receive the context pointer of the
//! [`InstanceRegistry`]. A null context is ignored.
//!
//! Each callback holds a strong reference to its context while it runs.
//!
//! Every callback runs inside [`shim::guarded`], so errors and panics never
//! reach the native caller. Event callbacks always return `0`.

use crate::bridge::BridgeShared;
use crate::instances::InstanceRegistry;
use crate::shim::{self, CodeLabel};
use ecat_common::consts::SHIM_RETURN_OK;
use ecat_common::native::NotifyParams;
use ecat_common::notify::LogType;
use std::ffi::{CStr, c_char, c_void};
use std::sync::Arc;

unsafe fn instance(ctx: *mut c_void) -> Option<Arc<BridgeShared>> {
    // SAFETY: the caller passes a context installed by `EcBridge`. It is the
    // address of an `Arc<BridgeShared>` allocation that stays pinned for as
    // long as the callback is installed.
    unsafe { retain(ctx.cast::<BridgeShared>().cast_const()) }
}

unsafe fn registry(ctx: *mut c_void) -> Option<Arc<InstanceRegistry>> {
    // SAFETY: as above; the registry outlives every pinned instance.
    unsafe { retain(ctx.cast::<InstanceRegistry>().cast_const()) }
}

/// Strong reference for the duration of one callback, so a handler dropping
/// the last bridge handle cannot free the context under the caller.
unsafe fn retain<T>(ptr: *const T) -> Option<Arc<T>> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: `ptr` comes from a live `Arc<T>` (see callers).
    unsafe {
        Arc::increment_strong_count(ptr);
        Some(Arc::from_raw(ptr))
    }
}

unsafe fn c_text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: the native layer passes NUL-terminated strings.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Master event notification.
///
/// # Safety
/// `ctx` must be null or an instance context installed by `EcBridge`.
pub unsafe extern "C" fn master_event_notify(
    ctx: *mut c_void,
    code: u32,
    params: *mut c_void,
) -> u32 {
    // SAFETY: forwarded from the caller.
    if let Some(shared) = unsafe { instance(ctx) } {
        shim::guarded(
            "on_master_event",
            CodeLabel::Master(code),
            || shim::on_master_event(&shared, code, NotifyParams(params)),
            |msg| shim::report_failure([&*shared], LogType::Master, msg),
        );
    }
    SHIM_RETURN_OK
}

/// Remote API event notification.
///
/// # Safety
/// `ctx` must be null or the registry context installed by `EcBridge`.
pub unsafe extern "C" fn ras_event_notify(ctx: *mut c_void, code: u32, params: *mut c_void) -> u32 {
    // SAFETY: forwarded from the caller.
    if let Some(registry) = unsafe { registry(ctx) } {
        shim::guarded(
            "on_ras_event",
            CodeLabel::Ras(code),
            || shim::on_ras_event(&registry, code, NotifyParams(params)),
            |msg| {
                let live = registry.live();
                shim::report_failure(live.iter().map(|s| &**s), LogType::RasClient, msg);
            },
        );
    }
    SHIM_RETURN_OK
}

/// Performance measurement of one native function.
///
/// # Safety
/// `ctx` must be null or an instance context installed by `EcBridge`;
/// `fn_name` must be null or a NUL-terminated string.
pub unsafe extern "C" fn perf_notify(ctx: *mut c_void, fn_name: *const c_char, time: u32) {
    // SAFETY: forwarded from the caller.
    let Some(shared) = (unsafe { instance(ctx) }) else {
        return;
    };
    // SAFETY: forwarded from the caller.
    let function = unsafe { c_text(fn_name) };
    shim::guarded(
        "on_perf_event",
        CodeLabel::None,
        || shim::on_perf_event(&shared, function, time),
        |msg| shim::report_failure([&*shared], LogType::Generic, msg),
    );
}

/// Translated master string.
///
/// # Safety
/// `ctx` must be null or an instance context installed by `EcBridge`;
/// `msg` must be null or a NUL-terminated string.
pub unsafe extern "C" fn translate_notify(ctx: *mut c_void, code: u32, msg: *const c_char) {
    // SAFETY: forwarded from the caller.
    let Some(shared) = (unsafe { instance(ctx) }) else {
        return;
    };
    // SAFETY: forwarded from the caller.
    let message = unsafe { c_text(msg) };
    shim::guarded(
        "on_translate_event",
        CodeLabel::Plain(code),
        || shim::on_translate_event(&shared, code, message),
        |report| shim::report_failure([&*shared], LogType::Generic, report),
    );
}

/// Debug message of an instance-owned native component.
///
/// # Safety
/// `ctx` must be null or an instance context installed by `EcBridge`;
/// `msg` must be null or a NUL-terminated string.
pub unsafe extern "C" fn dbg_msg_notify(
    ctx: *mut c_void,
    log_type: u32,
    severity: u32,
    msg: *const c_char,
) {
    // SAFETY: forwarded from the caller.
    let Some(shared) = (unsafe { instance(ctx) }) else {
        return;
    };
    // SAFETY: forwarded from the caller.
    let message = unsafe { c_text(msg) };
    shim::guarded(
        "on_dbg_msg_event",
        CodeLabel::None,
        || shim::on_dbg_msg_event(&shared, log_type, severity, message),
        |report| shim::report_failure([&*shared], LogType::Generic, report),
    );
}

/// Debug message of a process-wide native component (RAS client, mailbox
/// gateway client), delivered to every live instance.
///
/// # Safety
/// `ctx` must be null or the registry context installed by `EcBridge`;
/// `msg` must be null or a NUL-terminated string.
pub unsafe extern "C" fn registry_dbg_msg_notify(
    ctx: *mut c_void,
    log_type: u32,
    severity: u32,
    msg: *const c_char,
) {
    // SAFETY: forwarded from the caller.
    let Some(registry) = (unsafe { registry(ctx) }) else {
        return;
    };
    // SAFETY: forwarded from the caller.
    let message = unsafe { c_text(msg) };
    let live = registry.live();
    shim::guarded(
        "on_dbg_msg_event",
        CodeLabel::None,
        || {
            for shared in &live {
                shim::on_dbg_msg_event(shared, log_type, severity, message.clone())?;
            }
            Ok(())
        },
        |report| shim::report_failure(live.iter().map(|s| &**s), LogType::Generic, report),
    );
}
