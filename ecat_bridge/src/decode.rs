//! Decoding of raw notification payloads.
//!
//! The native layer hands out notification payloads as byte buffers. Fields
//! are little-endian 32-bit words; codes without a known layout are passed on
//! as [`NotificationData::Raw`].

use ecat_common::error::EcCode;
use ecat_common::notify::{NotifyCode, RasNotifyCode};
use serde::Serialize;
use thiserror::Error;

/// Payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Code outside every known range.
    #[error("unknown notification code 0x{0:08X}")]
    UnknownCode(u32),

    /// Payload shorter than the layout of its code.
    #[error("payload of {code} too short: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Code label.
        code: String,
        /// Required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
}

/// Decoded payload of a master notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationData {
    /// No payload.
    None,
    /// Master state transition.
    StateChange {
        /// Previous state.
        old: u32,
        /// New state.
        new: u32,
    },
    /// Scan bus result.
    ScanBusStatus {
        /// Scan result.
        result: EcCode,
        /// Number of slaves found.
        slave_count: u32,
    },
    /// Plain status result (DC, DCL, DCM).
    Status {
        /// Result code.
        result: EcCode,
    },
    /// Single slave state transition.
    SlaveState {
        /// Station address of the slave.
        station_address: u32,
        /// New state.
        state: u32,
    },
    /// Working counter mismatch.
    WkcError {
        /// EtherCAT command.
        cmd: u32,
        /// Logical or physical address.
        address: u32,
        /// Actual working counter.
        wkc_act: u32,
        /// Expected working counter.
        wkc_set: u32,
    },
    /// Payload without a known layout.
    Raw {
        /// Payload bytes.
        bytes: Vec<u8>,
    },
}

/// Decoded payload of a remote API notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RasNotificationData {
    /// Connection established or lost.
    Connection {
        /// Connection cookie.
        cookie: u32,
        /// Cause of the change.
        cause: EcCode,
    },
    /// Client registered or unregistered.
    Registration {
        /// Connection cookie.
        cookie: u32,
        /// Client id.
        client_id: u32,
    },
    /// Marshalling error.
    MarshalError {
        /// Connection cookie.
        cookie: u32,
        /// Failed command.
        cmd: u32,
        /// Cause.
        cause: EcCode,
    },
    /// Notification memory exhausted or too small.
    NoNotifyMemory {
        /// Connection cookie.
        cookie: u32,
        /// Code of the dropped notification.
        code: u32,
    },
    /// Payload without a known layout.
    Raw {
        /// Payload bytes.
        bytes: Vec<u8>,
    },
}

impl RasNotificationData {
    /// Connection cookie, or 0 when the payload carries none.
    pub const fn cookie(&self) -> u32 {
        match self {
            RasNotificationData::Connection { cookie, .. }
            | RasNotificationData::Registration { cookie, .. }
            | RasNotificationData::MarshalError { cookie, .. }
            | RasNotificationData::NoNotifyMemory { cookie, .. } => *cookie,
            RasNotificationData::Raw { .. } => 0,
        }
    }
}

fn words<const N: usize>(
    label: impl std::fmt::Display,
    bytes: &[u8],
) -> Result<[u32; N], DecodeError> {
    let expected = N * 4;
    if bytes.len() < expected {
        return Err(DecodeError::Truncated {
            code: label.to_string(),
            expected,
            actual: bytes.len(),
        });
    }
    let mut out = [0u32; N];
    for (word, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(out)
}

/// Decode a master notification payload.
///
/// # Errors
/// Returns `DecodeError::Truncated` if the payload is shorter than the
/// layout of `code`.
pub fn decode_master(code: NotifyCode, bytes: &[u8]) -> Result<NotificationData, DecodeError> {
    use NotifyCode::*;
    let data = match code {
        StateChanged => {
            let [old, new] = words::<2>(code, bytes)?;
            NotificationData::StateChange { old, new }
        }
        SbStatus => {
            let [result, slave_count] = words::<2>(code, bytes)?;
            NotificationData::ScanBusStatus {
                result: EcCode(result),
                slave_count,
            }
        }
        DcStatus | DclStatus | DcmSync => {
            let [result] = words::<1>(code, bytes)?;
            NotificationData::Status {
                result: EcCode(result),
            }
        }
        SlaveStateChanged => {
            let [station_address, state] = words::<2>(code, bytes)?;
            NotificationData::SlaveState {
                station_address,
                state,
            }
        }
        CyccmdWkcError | MasterInitcmdWkcError | SlaveInitcmdWkcError => {
            let [cmd, address, wkc_act, wkc_set] = words::<4>(code, bytes)?;
            NotificationData::WkcError {
                cmd,
                address,
                wkc_act,
                wkc_set,
            }
        }
        EthLinkConnected | EthLinkNotConnected | AllDevicesOperational
        | NotAllDevicesOperational => NotificationData::None,
        _ if bytes.is_empty() => NotificationData::None,
        _ => NotificationData::Raw {
            bytes: bytes.to_vec(),
        },
    };
    Ok(data)
}

/// Decode a remote API notification payload.
///
/// # Errors
/// Returns `DecodeError::Truncated` if the payload is shorter than the
/// layout of `code`.
pub fn decode_ras(code: RasNotifyCode, bytes: &[u8]) -> Result<RasNotificationData, DecodeError> {
    use RasNotifyCode::*;
    let data = match code {
        Connection => {
            let [cookie, cause] = words::<2>(code, bytes)?;
            RasNotificationData::Connection {
                cookie,
                cause: EcCode(cause),
            }
        }
        Register | Unregister => {
            let [cookie, client_id] = words::<2>(code, bytes)?;
            RasNotificationData::Registration { cookie, client_id }
        }
        MarshalError => {
            let [cookie, cmd, cause] = words::<3>(code, bytes)?;
            RasNotificationData::MarshalError {
                cookie,
                cmd,
                cause: EcCode(cause),
            }
        }
        NoNotifyMemory | StdNotifyMemorySmall | MbxNotifyMemorySmall => {
            let [cookie, code] = words::<2>(code, bytes)?;
            RasNotificationData::NoNotifyMemory { cookie, code }
        }
        AckError => RasNotificationData::Raw {
            bytes: bytes.to_vec(),
        },
    };
    Ok(data)
}

/// Little-endian encoding of a word sequence, the inverse of the decoders.
pub fn encode_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_bus_status() {
        let bytes = encode_words(&[EcCode::TIMEOUT.0, 7]);
        assert_eq!(
            decode_master(NotifyCode::SbStatus, &bytes).unwrap(),
            NotificationData::ScanBusStatus {
                result: EcCode::TIMEOUT,
                slave_count: 7
            }
        );
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let err = decode_master(NotifyCode::CyccmdWkcError, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                expected: 16,
                actual: 3,
                ..
            }
        ));
        assert!(err.to_string().contains("CyccmdWkcError"));
    }

    #[test]
    fn unknown_layout_is_raw() {
        let data = decode_master(NotifyCode::HcTopoChgDone, &[9, 9]).unwrap();
        assert_eq!(data, NotificationData::Raw { bytes: vec![9, 9] });
        assert_eq!(
            decode_master(NotifyCode::HcTopoChgDone, &[]).unwrap(),
            NotificationData::None
        );
    }

    #[test]
    fn extra_bytes_are_ignored() {
        let mut bytes = encode_words(&[3, 8]);
        bytes.extend_from_slice(&[0xAA; 5]);
        assert_eq!(
            decode_master(NotifyCode::StateChanged, &bytes).unwrap(),
            NotificationData::StateChange { old: 3, new: 8 }
        );
    }

    #[test]
    fn ras_cookies() {
        let conn = decode_ras(
            RasNotifyCode::Connection,
            &encode_words(&[0x42, EcCode::EMRAS_SERVER_STOPPED.0]),
        )
        .unwrap();
        assert_eq!(conn.cookie(), 0x42);

        let reg = decode_ras(RasNotifyCode::Register, &encode_words(&[7, 1])).unwrap();
        assert_eq!(reg.cookie(), 7);

        let raw = decode_ras(RasNotifyCode::AckError, &[1, 2]).unwrap();
        assert_eq!(raw.cookie(), 0);
    }
}
