//! Bridge-wide constants.
//!
//! Single source of truth for notification ranges, API version and the
//! timeouts used during instance teardown.

/// First application-defined notification code.
pub const EC_NOTIFY_APP: u32 = 0x0008_0000;

/// Highest offset inside the application notification range.
pub const EC_NOTIFY_APP_MAX_CODE: u32 = 0x0000_FFFF;

/// Native wrapper API version this bridge was built against.
pub const ECWRAPPER_API_VERSION: u32 = 1_612_540_388;

/// Value every native callback returns, regardless of internal failures.
pub const SHIM_RETURN_OK: u32 = 0;

/// Sentinel handler id returned for rejected registrations.
pub const INVALID_HANDLER_ID: i32 = -1;

/// Timeout for removing a RAS client connection during teardown.
pub const RAS_REMOVE_CONNECTION_TIMEOUT_MS: u32 = 2000;

/// Timeout for closing the native RAS client once the last connection is gone.
pub const RAS_CLIENT_CLOSE_TIMEOUT_MS: u32 = 2000;

/// Timeout for deinitializing the mailbox gateway client.
pub const MBX_GATEWAY_DEINIT_TIMEOUT_MS: u32 = 2000;

/// Timeout for stopping RAS / mailbox gateway servers.
pub const SERVER_STOP_TIMEOUT_MS: u32 = 3000;

/// Timeout used by the built-in handler when the remote server stopped.
pub const RAS_SERVER_STOPPED_REMOVE_TIMEOUT_MS: u32 = 1000;

/// Lower bound for the bus cycle time used to derive the aux clock frequency.
pub const MIN_AUX_CLOCK_CYCLE_US: u32 = 10;

/// Keep-alive trigger passed to the native RAS client.
pub const RAS_KEEP_ALIVE_TRIGGER: u32 = 100;

/// Canonical service name (used for logging).
pub const BRIDGE_SERVICE_NAME: &str = "ecat_bridge";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ecat/bridge.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_range_does_not_reach_remote_api() {
        assert!(EC_NOTIFY_APP + EC_NOTIFY_APP_MAX_CODE < crate::notify::EC_NOTIFY_REMOTEAPI);
    }

    #[test]
    fn aux_clock_floor_is_positive() {
        assert!(MIN_AUX_CLOCK_CYCLE_US > 0);
    }
}
