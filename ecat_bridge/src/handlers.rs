//! Per-instance notification handler registry.
//!
//! Handlers subscribe to one of the fixed [`Channel`]s and receive a mutable
//! [`Notification`]. Dispatch runs synchronously on the calling thread, in
//! registration order, and stops at the first handler error.
//!
//! The registry lock is only held to take a snapshot of the matching
//! callbacks, so handlers may add or remove handlers while being called.

use crate::decode::{NotificationData, RasNotificationData};
use ecat_common::consts::INVALID_HANDLER_ID;
use ecat_common::notify::{Channel, LogSeverity, LogType, NotifyCode, NotifyType, RasNotifyCode};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Error returned by a notification handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Shared handler callback.
pub type HandlerFn = Arc<dyn Fn(&mut Notification) -> Result<(), HandlerError> + Send + Sync>;

/// Identifier of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HandlerId(pub i32);

impl HandlerId {
    /// Returned when a registration is rejected.
    pub const INVALID: HandlerId = HandlerId(INVALID_HANDLER_ID);

    /// Returns false for [`HandlerId::INVALID`].
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed notification handed to handlers, one variant per channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "channel")]
pub enum Notification {
    /// Master notification.
    #[serde(rename = "onMaster")]
    Master {
        /// Coarse class of the raw code.
        notify_type: NotifyType,
        /// Notification code.
        code: NotifyCode,
        /// Decoded payload.
        data: NotificationData,
        /// Error messages attached by the native layer.
        err_msgs: Vec<String>,
    },
    /// Remote API notification.
    #[serde(rename = "onRas")]
    Ras {
        /// Coarse class of the raw code.
        notify_type: NotifyType,
        /// Notification code.
        code: RasNotifyCode,
        /// Decoded payload.
        data: RasNotificationData,
        /// Error messages attached by the native layer.
        err_msgs: Vec<String>,
    },
    /// Translated master string.
    #[serde(rename = "onTranslate")]
    Translate {
        /// Text code.
        code: u32,
        /// Translated text.
        message: String,
    },
    /// Performance measurement of one native function.
    #[serde(rename = "onPerf")]
    Perf {
        /// Native function name.
        function: String,
        /// Measured time.
        time: u32,
    },
    /// Debug message.
    #[serde(rename = "onDbgMsg")]
    DbgMsg {
        /// Origin of the message.
        log_type: LogType,
        /// Severity.
        level: LogSeverity,
        /// Message text.
        message: String,
    },
    /// Application-defined notification.
    #[serde(rename = "onApp")]
    App {
        /// Code relative to `EC_NOTIFY_APP`.
        code: u32,
        /// Input data from the native layer.
        input: Vec<u8>,
        /// Output data; set by a handler to answer the notification.
        output: Option<Vec<u8>>,
    },
}

impl Notification {
    /// Channel this notification is delivered on.
    pub const fn channel(&self) -> Channel {
        match self {
            Notification::Master { .. } => Channel::Master,
            Notification::Ras { .. } => Channel::Ras,
            Notification::Translate { .. } => Channel::Translate,
            Notification::Perf { .. } => Channel::Perf,
            Notification::DbgMsg { .. } => Channel::DbgMsg,
            Notification::App { .. } => Channel::App,
        }
    }
}

struct NotificationHandler {
    id: HandlerId,
    channel: Channel,
    callback: HandlerFn,
}

struct Inner {
    last_id: i32,
    handlers: Vec<NotificationHandler>,
}

/// Ordered list of handlers with per-registry id allocation.
pub struct HandlerRegistry {
    inner: Mutex<Inner>,
}

impl HandlerRegistry {
    /// Create an empty registry. The first id handed out is 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                last_id: 0,
                handlers: Vec::new(),
            }),
        }
    }

    /// Register a handler by channel name.
    ///
    /// Returns [`HandlerId::INVALID`] and stores nothing if `name` is not one
    /// of the known channel names.
    pub fn add<F>(&self, name: &str, callback: F) -> HandlerId
    where
        F: Fn(&mut Notification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        match name.parse::<Channel>() {
            Ok(channel) => self.add_channel(channel, callback),
            Err(e) => {
                warn!("Rejected handler registration: {}", e);
                HandlerId::INVALID
            }
        }
    }

    /// Register a handler for a channel.
    pub fn add_channel<F>(&self, channel: Channel, callback: F) -> HandlerId
    where
        F: Fn(&mut Notification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let callback: HandlerFn = Arc::new(callback);
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = HandlerId(inner.last_id);
        inner.handlers.push(NotificationHandler {
            id,
            channel,
            callback,
        });
        debug!("Registered handler {} on {}", id, channel);
        id
    }

    /// Remove the handler with `id`. Returns false if it is unknown.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.lock();
        match inner.handlers.iter().position(|h| h.id == id) {
            Some(pos) => {
                let handler = inner.handlers.remove(pos);
                debug!("Removed handler {} from {}", id, handler.channel);
                true
            }
            None => false,
        }
    }

    /// Returns true if at least one handler listens on `channel`.
    pub fn has_handler(&self, channel: Channel) -> bool {
        self.inner.lock().handlers.iter().any(|h| h.channel == channel)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    /// Returns true if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every handler of `channel` in registration order.
    ///
    /// # Errors
    /// Returns the first handler error; later handlers are not called.
    pub fn dispatch(
        &self,
        channel: Channel,
        notification: &mut Notification,
    ) -> Result<(), HandlerError> {
        let callbacks: Vec<HandlerFn> = self
            .inner
            .lock()
            .handlers
            .iter()
            .filter(|h| h.channel == channel)
            .map(|h| Arc::clone(&h.callback))
            .collect();

        for callback in callbacks {
            callback(notification)?;
        }
        Ok(())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("HandlerRegistry")
            .field("last_id", &inner.last_id)
            .field("handlers", &inner.handlers.len())
            .finish()
    }
}
