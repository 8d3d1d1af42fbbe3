//! Native event shim.
//!
//! Turns raw `(code, params)` events from the native layer into typed
//! [`Notification`]s and dispatches them. Every step returns a
//! [`ShimError`]; [`guarded`] is the single place where failures (and
//! panics) are turned into a critical debug message and a log line.

use crate::bridge::BridgeShared;
use crate::decode::{self, DecodeError};
use crate::handlers::{HandlerError, Notification};
use crate::instances::InstanceRegistry;
use ecat_common::consts::EC_NOTIFY_APP;
use ecat_common::native::NotifyParams;
use ecat_common::notify::{
    Channel, LogSeverity, LogType, NotifyCode, NotifyType, PayloadKind, RasNotifyCode, is_app_code,
};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Failure while handling one native event.
#[derive(Debug, Error)]
pub enum ShimError {
    /// Payload or code could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
}

/// Code argument shown in failure reports.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CodeLabel {
    Master(u32),
    Ras(u32),
    Plain(u32),
    None,
}

impl fmt::Display for CodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CodeLabel::Master(raw) => match NotifyCode::from_raw(raw) {
                Some(code) => write!(f, "code={}", code),
                None => write!(f, "code=0x{:08X}", raw),
            },
            CodeLabel::Ras(raw) => match RasNotifyCode::from_raw(raw) {
                Some(code) => write!(f, "code={}", code),
                None => write!(f, "code=0x{:08X}", raw),
            },
            CodeLabel::Plain(raw) => write!(f, "code={}", raw),
            CodeLabel::None => Ok(()),
        }
    }
}

/// Master event from a registered client.
pub(crate) fn on_master_event(
    shared: &BridgeShared,
    code: u32,
    params: NotifyParams,
) -> Result<(), ShimError> {
    let app = is_app_code(code);
    let key = if app {
        NotifyCode::Undefined
    } else {
        NotifyCode::from_raw(code).ok_or(DecodeError::UnknownCode(code))?
    };

    if shared.is_throttled(key) {
        debug!("Notification {} throttled", key);
        return Ok(());
    }

    let payload = match shared.native.notification_data(code, key.payload_kind(), params) {
        Ok(payload) => payload,
        Err(e) => {
            debug!("No payload for notification 0x{:08X}: {}", code, e);
            return Ok(());
        }
    };

    if app {
        return on_app_event(shared, code - EC_NOTIFY_APP, payload, params);
    }

    let data = decode::decode_master(key, &payload)?;
    let err_msgs = shared
        .native
        .notification_err_msgs(shared.master_instance_id(), code, params)
        .unwrap_or_default();

    if shared.handlers.has_handler(Channel::Master) {
        let mut notification = Notification::Master {
            notify_type: NotifyType::from_code(code),
            code: key,
            data,
            err_msgs,
        };
        shared.handlers.dispatch(Channel::Master, &mut notification)?;
    }
    Ok(())
}

fn on_app_event(
    shared: &BridgeShared,
    code: u32,
    input: Vec<u8>,
    params: NotifyParams,
) -> Result<(), ShimError> {
    if !shared.handlers.has_handler(Channel::App) {
        return Ok(());
    }

    let mut notification = Notification::App {
        code,
        input,
        output: None,
    };
    shared.handlers.dispatch(Channel::App, &mut notification)?;

    if let Notification::App {
        output: Some(output),
        ..
    } = notification
    {
        if let Err(e) = shared.native.set_notification_data(params, &output) {
            warn!("Cannot hand back output of application notification {}: {}", code, e);
        }
    }
    Ok(())
}

/// Remote API event, fanned out to every live instance.
pub(crate) fn on_ras_event(
    registry: &InstanceRegistry,
    code: u32,
    params: NotifyParams,
) -> Result<(), ShimError> {
    let Some(native) = registry.ras_native() else {
        debug!("RAS notification 0x{:08X} without active RAS client", code);
        return Ok(());
    };

    let payload = match native.notification_data(code, PayloadKind::Default, params) {
        Ok(payload) => payload,
        Err(e) => {
            debug!("No payload for RAS notification 0x{:08X}: {}", code, e);
            return Ok(());
        }
    };

    let ras_code = RasNotifyCode::from_raw(code).ok_or(DecodeError::UnknownCode(code))?;
    let data = decode::decode_ras(ras_code, &payload)?;
    let err_msgs = native.ras_notification_err_msgs(code, params).unwrap_or_default();
    let notify_type = NotifyType::from_code(code);
    let cookie = data.cookie();

    for instance in registry.live() {
        if !instance.handlers.has_handler(Channel::Ras) {
            continue;
        }
        if cookie != 0 && !instance.accepts_ras_cookie(cookie, ras_code) {
            debug!(
                "RAS notification {} for cookie 0x{:08X} skipped by instance {}",
                ras_code, cookie, instance.id
            );
            continue;
        }

        let mut notification = Notification::Ras {
            notify_type,
            code: ras_code,
            data: data.clone(),
            err_msgs: err_msgs.clone(),
        };
        instance.handlers.dispatch(Channel::Ras, &mut notification)?;
    }
    Ok(())
}

pub(crate) fn on_perf_event(
    shared: &BridgeShared,
    function: String,
    time: u32,
) -> Result<(), ShimError> {
    dispatch_if_handled(shared, Notification::Perf { function, time })
}

pub(crate) fn on_translate_event(
    shared: &BridgeShared,
    code: u32,
    message: String,
) -> Result<(), ShimError> {
    dispatch_if_handled(shared, Notification::Translate { code, message })
}

pub(crate) fn on_dbg_msg_event(
    shared: &BridgeShared,
    log_type: u32,
    severity: u32,
    message: String,
) -> Result<(), ShimError> {
    dispatch_if_handled(
        shared,
        Notification::DbgMsg {
            log_type: LogType::from_raw(log_type).unwrap_or(LogType::Generic),
            level: LogSeverity::from_raw(severity).unwrap_or(LogSeverity::Verbose),
            message,
        },
    )
}

fn dispatch_if_handled(
    shared: &BridgeShared,
    mut notification: Notification,
) -> Result<(), ShimError> {
    let channel = notification.channel();
    if shared.handlers.has_handler(channel) {
        shared.handlers.dispatch(channel, &mut notification)?;
    }
    Ok(())
}

/// Deliver a critical failure report on the debug channel of `targets`.
pub(crate) fn report_failure<'a>(
    targets: impl IntoIterator<Item = &'a BridgeShared>,
    log_type: LogType,
    message: &str,
) {
    for target in targets {
        if !target.handlers.has_handler(Channel::DbgMsg) {
            continue;
        }
        let mut notification = Notification::DbgMsg {
            log_type,
            level: LogSeverity::Critical,
            message: message.to_string(),
        };
        if let Err(e) = target.handlers.dispatch(Channel::DbgMsg, &mut notification) {
            warn!("Failure report not delivered to instance {}: {}", target.id, e);
        }
    }
}

/// Run one native event handler, turning errors and panics into reports.
///
/// Nothing escapes: the native layer always gets control back normally.
pub(crate) fn guarded<F, R>(function: &'static str, label: CodeLabel, handle: F, report: R)
where
    F: FnOnce() -> Result<(), ShimError>,
    R: FnOnce(&str),
{
    let cause = match panic::catch_unwind(AssertUnwindSafe(handle)) {
        Ok(Ok(())) => return,
        Ok(Err(e)) => {
            warn!("{}({}) failed: {}", function, label, e);
            e.to_string()
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!("Panic in native callback {}({}): {}", function, label, msg);
            format!("panic: {}", msg)
        }
    };

    let message = format!("Exception in '{}({})': {}", function, label, cause);
    if panic::catch_unwind(AssertUnwindSafe(|| report(&message))).is_err() {
        error!("Panic while reporting failure of {}({})", function, label);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
