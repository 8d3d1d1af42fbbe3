//! Instance initialization parameters and run modes.
//!
//! `InitParams` has one variant per run mode; the caller picks the mode
//! explicitly and the bridge never inspects parameter shapes.
//!
//! # TOML Example
//!
//! ```toml
//! [init]
//! mode = "ras_client"
//! instance_id = 0
//!
//! [init.ras]
//! address = "192.168.1.10"
//! port = 6000
//! ```

use crate::notify::LogSeverity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse lifecycle state of a bridge instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// Not initialized.
    #[default]
    Uninitialized,
    /// Local master.
    Master,
    /// Remote API client.
    RasClient,
    /// Remote API server.
    RasServer,
    /// Mailbox gateway client.
    MbxGateway,
    /// Mailbox gateway server.
    MbxGatewaySrv,
    /// Software-in-the-loop simulator.
    SimulatorSil,
    /// Hardware-in-the-loop simulator.
    SimulatorHil,
    /// Remote API server of a simulator.
    SimulatorRasServer,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn default_log_level() -> LogSeverity {
    LogSeverity::Error
}

/// Local master parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterParams {
    /// Bus cycle time in microseconds.
    pub bus_cycle_time_us: u32,
    /// Link layer identifier passed through to the native stack.
    #[serde(default)]
    pub link_layer: String,
    /// Native log level.
    #[serde(default = "default_log_level")]
    pub log_level: LogSeverity,
}

/// Remote API client parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasClientParams {
    /// Server address.
    pub address: String,
    /// Server port.
    pub port: u16,
    /// Native log level.
    #[serde(default = "default_log_level")]
    pub log_level: LogSeverity,
}

/// Remote API server parameters (master or simulator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasServerParams {
    /// Listen port.
    pub port: u16,
    /// Maximum number of queued notifications.
    #[serde(default)]
    pub max_queued_notifications: u32,
    /// Native log level.
    #[serde(default = "default_log_level")]
    pub log_level: LogSeverity,
}

/// Mailbox gateway client parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbxGatewayClientParams {
    /// Gateway address.
    pub address: String,
    /// Gateway port.
    pub port: u16,
    /// Native log level.
    #[serde(default = "default_log_level")]
    pub log_level: LogSeverity,
}

/// Mailbox gateway server parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbxGatewayServerParams {
    /// Listen port.
    pub port: u16,
    /// Native log level.
    #[serde(default = "default_log_level")]
    pub log_level: LogSeverity,
}

/// Hardware-in-the-loop simulator parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorParams {
    /// Network description (ENI) path.
    pub network_file: String,
    /// Native log level.
    #[serde(default = "default_log_level")]
    pub log_level: LogSeverity,
}

/// Initialization parameters, one variant per run mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InitParams {
    /// Local master.
    Master {
        /// Master instance id.
        instance_id: u32,
        /// Master parameters.
        master: MasterParams,
        /// Drive the job task from the auxiliary clock.
        #[serde(default)]
        use_aux_clock: bool,
    },
    /// Remote API server for the master.
    MasterRasServer {
        /// Server parameters.
        ras: RasServerParams,
    },
    /// Remote API client.
    RasClient {
        /// Remote master instance id.
        instance_id: u32,
        /// Client parameters.
        ras: RasClientParams,
    },
    /// Mailbox gateway client.
    MbxGatewayClient {
        /// Gateway parameters.
        gateway: MbxGatewayClientParams,
    },
    /// Mailbox gateway server.
    MbxGatewayServer {
        /// Master instance id served by the gateway.
        instance_id: u32,
        /// Gateway parameters.
        gateway: MbxGatewayServerParams,
    },
    /// Simulator: `None` runs software-in-the-loop, `Some` hardware-in-the-loop.
    Simulator {
        /// Simulator instance id.
        instance_id: u32,
        /// HIL parameters.
        #[serde(default)]
        simulator: Option<SimulatorParams>,
    },
    /// Remote API server for a simulator.
    SimulatorRasServer {
        /// Server parameters.
        ras: RasServerParams,
    },
}

impl InitParams {
    /// Run mode these parameters select.
    pub fn run_mode(&self) -> RunMode {
        match self {
            InitParams::Master { .. } => RunMode::Master,
            InitParams::MasterRasServer { .. } => RunMode::RasServer,
            InitParams::RasClient { .. } => RunMode::RasClient,
            InitParams::MbxGatewayClient { .. } => RunMode::MbxGateway,
            InitParams::MbxGatewayServer { .. } => RunMode::MbxGatewaySrv,
            InitParams::Simulator { simulator: None, .. } => RunMode::SimulatorSil,
            InitParams::Simulator { simulator: Some(_), .. } => RunMode::SimulatorHil,
            InitParams::SimulatorRasServer { .. } => RunMode::SimulatorRasServer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        init: InitParams,
    }

    #[test]
    fn run_mode_default_is_uninitialized() {
        assert_eq!(RunMode::default(), RunMode::Uninitialized);
    }

    #[test]
    fn simulator_variant_selects_sil_or_hil() {
        let sil = InitParams::Simulator {
            instance_id: 0,
            simulator: None,
        };
        assert_eq!(sil.run_mode(), RunMode::SimulatorSil);

        let hil = InitParams::Simulator {
            instance_id: 0,
            simulator: Some(SimulatorParams {
                network_file: "eni.xml".to_string(),
                log_level: LogSeverity::Info,
            }),
        };
        assert_eq!(hil.run_mode(), RunMode::SimulatorHil);
    }

    #[test]
    fn parse_master_from_toml() {
        let w: Wrapper = toml::from_str(
            r#"
[init]
mode = "master"
instance_id = 1
use_aux_clock = true

[init.master]
bus_cycle_time_us = 1000
"#,
        )
        .unwrap();
        match w.init {
            InitParams::Master {
                instance_id,
                master,
                use_aux_clock,
            } => {
                assert_eq!(instance_id, 1);
                assert_eq!(master.bus_cycle_time_us, 1000);
                assert_eq!(master.log_level, LogSeverity::Error);
                assert!(use_aux_clock);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parse_ras_client_from_toml() {
        let w: Wrapper = toml::from_str(
            r#"
[init]
mode = "ras_client"
instance_id = 0

[init.ras]
address = "127.0.0.1"
port = 6000
"#,
        )
        .unwrap();
        assert_eq!(w.init.run_mode(), RunMode::RasClient);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result = toml::from_str::<Wrapper>(
            r#"
[init]
mode = "teleport"
"#,
        );
        assert!(result.is_err());
    }
}
