//! Notification codes, channels and log classifications.
//!
//! This module defines:
//! - `NotifyCode` - Master notification codes raised by the native stack
//! - `RasNotifyCode` - Remote API (RAS) notification codes
//! - `NotifyType` - Coarse class of a raw notification code
//! - `PayloadKind` - How the native layer marshals a code's payload
//! - `Channel` - The fixed set of handler channels
//! - `LogType` / `LogSeverity` - Debug message classification

use crate::consts::{EC_NOTIFY_APP, EC_NOTIFY_APP_MAX_CODE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base of generic master notifications.
pub const EC_NOTIFY_GENERIC: u32 = 0x0000_0000;
/// Base of error notifications.
pub const EC_NOTIFY_ERROR: u32 = 0x0001_0000;
/// Base of mailbox receive notifications.
pub const EC_NOTIFY_MBOXRCV: u32 = 0x0002_0000;
/// Base of scan bus notifications.
pub const EC_NOTIFY_SCANBUS: u32 = 0x0003_0000;
/// Base of hot connect notifications.
pub const EC_NOTIFY_HOTCONNECT: u32 = 0x0004_0000;
/// Base of remote API notifications.
pub const EC_NOTIFY_REMOTEAPI: u32 = 0x0010_0000;

macro_rules! notify_codes {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        #[repr(u32)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $value, )*
        }

        impl $name {
            /// Raw 32-bit code as seen by the native layer.
            #[inline]
            pub const fn raw(self) -> u32 {
                self as u32
            }

            /// Look up a known code. Returns `None` for codes this build does not know.
            pub const fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $( v if v == $value => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }

        impl TryFrom<u32> for $name {
            type Error = u32;

            fn try_from(raw: u32) -> Result<Self, Self::Error> {
                Self::from_raw(raw).ok_or(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}(0x{:08X})", self, self.raw())
            }
        }
    };
}

notify_codes! {
    /// Master notification codes.
    ///
    /// `Undefined` is the classification used for application-defined codes
    /// (the `EC_NOTIFY_APP` range) and is the throttle key shared by all of them.
    pub enum NotifyCode {
        /// Master state changed.
        StateChanged = EC_NOTIFY_GENERIC | 0x0001,
        /// Ethernet link connected.
        EthLinkConnected = EC_NOTIFY_GENERIC | 0x0002,
        /// Scan bus finished.
        SbStatus = EC_NOTIFY_GENERIC | 0x0003,
        /// Distributed clocks status.
        DcStatus = EC_NOTIFY_GENERIC | 0x0004,
        /// DC slave synchronization.
        DcSlvSync = EC_NOTIFY_GENERIC | 0x0005,
        /// DC latching status.
        DclStatus = EC_NOTIFY_GENERIC | 0x0008,
        /// DC master sync.
        DcmSync = EC_NOTIFY_GENERIC | 0x0009,
        /// DC external sync.
        DcxSync = EC_NOTIFY_GENERIC | 0x000A,
        /// Single slave state changed.
        SlaveStateChanged = EC_NOTIFY_GENERIC | 0x0015,
        /// Multiple slaves changed state.
        SlavesStateChanged = EC_NOTIFY_GENERIC | 0x0016,
        /// Queued raw command completed.
        RawCmdDone = EC_NOTIFY_GENERIC | 0x0100,
        /// Slave appeared or disappeared.
        SlavePresence = EC_NOTIFY_GENERIC | 0x0101,
        /// Multiple slaves appeared or disappeared.
        SlavesPresence = EC_NOTIFY_GENERIC | 0x0102,
        /// DC reference clock presence.
        RefclockPresence = EC_NOTIFY_GENERIC | 0x0103,
        /// Master redundancy state changed.
        MasterRedStateChanged = EC_NOTIFY_GENERIC | 0x0104,
        /// Foreign source MAC on the redundancy line.
        MasterRedForeignSrcMac = EC_NOTIFY_GENERIC | 0x0105,
        /// Slave register transfer finished.
        SlaveRegisterTransfer = EC_NOTIFY_GENERIC | 0x0106,
        /// Port operation finished.
        PortOperation = EC_NOTIFY_GENERIC | 0x0107,
        /// Slave identification finished.
        SlaveIdentification = EC_NOTIFY_GENERIC | 0x0108,
        /// Cyclic command working counter error.
        CyccmdWkcError = EC_NOTIFY_ERROR | 0x0001,
        /// Master init command working counter error.
        MasterInitcmdWkcError = EC_NOTIFY_ERROR | 0x0002,
        /// Slave init command working counter error.
        SlaveInitcmdWkcError = EC_NOTIFY_ERROR | 0x0003,
        /// EoE mailbox send working counter error.
        EoeMbxsndWkcError = EC_NOTIFY_ERROR | 0x0007,
        /// CoE mailbox send working counter error.
        CoeMbxsndWkcError = EC_NOTIFY_ERROR | 0x0008,
        /// FoE mailbox send working counter error.
        FoeMbxsndWkcError = EC_NOTIFY_ERROR | 0x0009,
        /// Frame response error.
        FrameResponseError = EC_NOTIFY_ERROR | 0x000A,
        /// Slave init command response error.
        SlaveInitcmdResponseError = EC_NOTIFY_ERROR | 0x000B,
        /// Master init command response error.
        MasterInitcmdResponseError = EC_NOTIFY_ERROR | 0x000C,
        /// Mailbox slave init command timeout.
        MbslaveInitcmdTimeout = EC_NOTIFY_ERROR | 0x000E,
        /// Not all devices are operational.
        NotAllDevicesOperational = EC_NOTIFY_ERROR | 0x000F,
        /// Ethernet link lost.
        EthLinkNotConnected = EC_NOTIFY_ERROR | 0x0010,
        /// Redundancy line break.
        RedLinebrk = EC_NOTIFY_ERROR | 0x0012,
        /// Slave error status bit set.
        StatusSlaveError = EC_NOTIFY_ERROR | 0x0013,
        /// Slave AL status code information.
        SlaveErrorStatusInfo = EC_NOTIFY_ERROR | 0x0014,
        /// Slave not addressable.
        SlaveNotAddressable = EC_NOTIFY_ERROR | 0x0015,
        /// Redundancy line fixed.
        RedLinefixed = EC_NOTIFY_ERROR | 0x001C,
        /// PDI watchdog expired.
        PdiWatchdog = EC_NOTIFY_ERROR | 0x001F,
        /// Slave in unexpected state.
        SlaveUnexpectedState = EC_NOTIFY_ERROR | 0x0021,
        /// All devices are operational again.
        AllDevicesOperational = EC_NOTIFY_ERROR | 0x0022,
        /// Frame loss after a slave.
        FramelossAfterSlave = EC_NOTIFY_ERROR | 0x0029,
        /// CoE PDO received through the mailbox.
        CoeTxPdo = EC_NOTIFY_MBOXRCV | 0x0001,
        /// Bus configuration mismatch found by scan.
        SbMismatch = EC_NOTIFY_SCANBUS | 0x0002,
        /// Duplicate hot connect node found by scan.
        SbDuplicateHcNode = EC_NOTIFY_SCANBUS | 0x0003,
        /// Hot connect groups detected.
        HcDetectAddGroups = EC_NOTIFY_HOTCONNECT | 0x0001,
        /// All hot connect groups probed.
        HcProbeAllGroups = EC_NOTIFY_HOTCONNECT | 0x0002,
        /// Topology change done.
        HcTopoChgDone = EC_NOTIFY_HOTCONNECT | 0x0003,
        /// Application-defined code (throttle key for the whole app range).
        Undefined = 0xFFFF_FFFF,
    }
}

notify_codes! {
    /// Remote API notification codes.
    pub enum RasNotifyCode {
        /// Connection established or lost.
        Connection = EC_NOTIFY_REMOTEAPI | 0x0001,
        /// Client registered.
        Register = EC_NOTIFY_REMOTEAPI | 0x0002,
        /// Client unregistered.
        Unregister = EC_NOTIFY_REMOTEAPI | 0x0003,
        /// Marshalling error.
        MarshalError = EC_NOTIFY_REMOTEAPI | 0x0004,
        /// Acknowledge error.
        AckError = EC_NOTIFY_REMOTEAPI | 0x0005,
        /// No memory left for notifications.
        NoNotifyMemory = EC_NOTIFY_REMOTEAPI | 0x0006,
        /// Standard notification memory too small.
        StdNotifyMemorySmall = EC_NOTIFY_REMOTEAPI | 0x0007,
        /// Mailbox notification memory too small.
        MbxNotifyMemorySmall = EC_NOTIFY_REMOTEAPI | 0x0008,
    }
}

/// Returns true if `raw` lies in the application-defined notification range.
#[inline]
pub const fn is_app_code(raw: u32) -> bool {
    raw >= EC_NOTIFY_APP && raw <= EC_NOTIFY_APP + EC_NOTIFY_APP_MAX_CODE
}

/// How the native layer marshals the payload of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    /// Untyped payload.
    Default,
    /// Regular notification descriptor.
    Notify,
    /// Error notification descriptor.
    Error,
}

impl NotifyCode {
    /// Payload marshalling kind for this code.
    pub const fn payload_kind(self) -> PayloadKind {
        use NotifyCode::*;
        match self {
            StateChanged | EthLinkConnected | SbStatus | DcStatus | DcSlvSync | DclStatus
            | DcmSync | DcxSync | SlaveStateChanged | SlavesStateChanged | RawCmdDone
            | CoeTxPdo | SlavePresence | SlavesPresence | RefclockPresence
            | MasterRedStateChanged | MasterRedForeignSrcMac | SlaveRegisterTransfer
            | PortOperation | SlaveIdentification | NotAllDevicesOperational
            | EthLinkNotConnected | RedLinebrk | StatusSlaveError | RedLinefixed
            | AllDevicesOperational | SbMismatch | SbDuplicateHcNode | HcDetectAddGroups
            | HcProbeAllGroups | HcTopoChgDone => PayloadKind::Notify,
            CyccmdWkcError | MasterInitcmdWkcError | SlaveInitcmdWkcError | EoeMbxsndWkcError
            | CoeMbxsndWkcError | FoeMbxsndWkcError | FrameResponseError
            | SlaveInitcmdResponseError | MasterInitcmdResponseError | MbslaveInitcmdTimeout
            | SlaveErrorStatusInfo | SlaveNotAddressable | PdiWatchdog | SlaveUnexpectedState
            | FramelossAfterSlave => PayloadKind::Error,
            Undefined => PayloadKind::Default,
        }
    }
}

/// Coarse class of a raw notification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyType {
    /// Generic master notification.
    Generic,
    /// Error notification.
    Error,
    /// Mailbox receive notification.
    Mailbox,
    /// Scan bus notification.
    ScanBus,
    /// Hot connect notification.
    HotConnect,
    /// Application-defined notification.
    Application,
    /// Remote API notification.
    RemoteApi,
    /// Code outside every known range.
    Unknown,
}

impl NotifyType {
    /// Classify a raw code by its range.
    pub const fn from_code(raw: u32) -> Self {
        if is_app_code(raw) {
            return Self::Application;
        }
        match raw & 0xFFFF_0000 {
            EC_NOTIFY_GENERIC => Self::Generic,
            EC_NOTIFY_ERROR => Self::Error,
            EC_NOTIFY_MBOXRCV => Self::Mailbox,
            EC_NOTIFY_SCANBUS => Self::ScanBus,
            EC_NOTIFY_HOTCONNECT => Self::HotConnect,
            EC_NOTIFY_REMOTEAPI => Self::RemoteApi,
            _ => Self::Unknown,
        }
    }
}

/// The fixed set of notification channels a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Master notifications (`onMaster`).
    #[serde(rename = "onMaster")]
    Master,
    /// Remote API notifications (`onRas`).
    #[serde(rename = "onRas")]
    Ras,
    /// Translated master strings (`onTranslate`).
    #[serde(rename = "onTranslate")]
    Translate,
    /// Performance measurements (`onPerf`).
    #[serde(rename = "onPerf")]
    Perf,
    /// Debug messages (`onDbgMsg`).
    #[serde(rename = "onDbgMsg")]
    DbgMsg,
    /// Application-defined notifications (`onApp`).
    #[serde(rename = "onApp")]
    App,
}

impl Channel {
    /// All channels in declaration order.
    pub const ALL: [Channel; 6] = [
        Channel::Master,
        Channel::Ras,
        Channel::Translate,
        Channel::Perf,
        Channel::DbgMsg,
        Channel::App,
    ];

    /// Wire name of the channel.
    pub const fn as_str(self) -> &'static str {
        match self {
            Channel::Master => "onMaster",
            Channel::Ras => "onRas",
            Channel::Translate => "onTranslate",
            Channel::Perf => "onPerf",
            Channel::DbgMsg => "onDbgMsg",
            Channel::App => "onApp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown channel name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown notification channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// Origin of a debug message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum LogType {
    /// Not attributed to a component.
    Generic = 0,
    /// Master stack.
    Master = 1,
    /// Remote API client.
    RasClient = 2,
    /// Remote API server.
    RasServer = 3,
    /// Simulator.
    Simulator = 4,
    /// Mailbox gateway.
    MbxGateway = 5,
}

impl LogType {
    /// Look up a raw log type.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Generic),
            1 => Some(Self::Master),
            2 => Some(Self::RasClient),
            3 => Some(Self::RasServer),
            4 => Some(Self::Simulator),
            5 => Some(Self::MbxGateway),
            _ => None,
        }
    }
}

/// Severity of a debug message as reported by the native stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum LogSeverity {
    /// Logging disabled.
    Silent = 0,
    /// Critical failure.
    Critical = 1,
    /// Error.
    Error = 2,
    /// Warning.
    Warning = 3,
    /// Informational.
    Info = 4,
    /// Verbose diagnostics.
    Verbose = 5,
}

impl LogSeverity {
    /// Look up a raw severity.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Silent),
            1 => Some(Self::Critical),
            2 => Some(Self::Error),
            3 => Some(Self::Warning),
            4 => Some(Self::Info),
            5 => Some(Self::Verbose),
            _ => None,
        }
    }
}
