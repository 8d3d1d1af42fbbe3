//! Instance lifecycle tests.
//!
//! Init/deinit for every run mode against the simulated native library,
//! including failure rollback, teardown retry, shared RAS / mailbox gateway
//! client counting and error message wording.

use ecat_bridge::decode::encode_words;
use ecat_bridge::native::simulation::REMOTE_INSTANCE_BASE;
use ecat_bridge::{BridgeOptions, EcBridge, InstanceRegistry, SimulatedMaster};
use ecat_common::consts::ECWRAPPER_API_VERSION;
use ecat_common::error::{BridgeError, EcCode, ErrorReporting};
use ecat_common::notify::{Channel, LogSeverity, LogType, NotifyCode};
use ecat_common::params::{
    InitParams, MasterParams, MbxGatewayClientParams, MbxGatewayServerParams, RasClientParams,
    RasServerParams, RunMode, SimulatorParams,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn bridge_with(
    sim: &Arc<SimulatedMaster>,
    registry: &Arc<InstanceRegistry>,
    reporting: ErrorReporting,
) -> EcBridge {
    EcBridge::with_options(
        sim.clone(),
        registry.clone(),
        BridgeOptions {
            error_reporting: reporting,
            ..BridgeOptions::default()
        },
    )
}

fn setup() -> (Arc<SimulatedMaster>, Arc<InstanceRegistry>, EcBridge) {
    let sim = Arc::new(SimulatedMaster::new());
    let registry = Arc::new(InstanceRegistry::new());
    let bridge = bridge_with(&sim, &registry, ErrorReporting::Detailed);
    (sim, registry, bridge)
}

fn master_params(bus_cycle_time_us: u32, use_aux_clock: bool) -> InitParams {
    InitParams::Master {
        instance_id: 0,
        master: MasterParams {
            bus_cycle_time_us,
            link_layer: "i8254x 1 1".to_string(),
            log_level: LogSeverity::Info,
        },
        use_aux_clock,
    }
}

fn ras_client_params() -> InitParams {
    InitParams::RasClient {
        instance_id: 0,
        ras: RasClientParams {
            address: "10.0.0.2".to_string(),
            port: 6000,
            log_level: LogSeverity::Error,
        },
    }
}

fn mbx_client_params() -> InitParams {
    InitParams::MbxGatewayClient {
        gateway: MbxGatewayClientParams {
            address: "10.0.0.3".to_string(),
            port: 34980,
            log_level: LogSeverity::Error,
        },
    }
}

fn ras_server_params() -> RasServerParams {
    RasServerParams {
        port: 6000,
        max_queued_notifications: 100,
        log_level: LogSeverity::Error,
    }
}

fn native_code(err: &BridgeError) -> EcCode {
    err.code().expect("native error")
}

#[test]
fn master_init_and_deinit() {
    let (sim, registry, bridge) = setup();
    assert_eq!(bridge.run_mode(), RunMode::Uninitialized);

    bridge.init_instance(&master_params(1000, false)).expect("init");
    assert_eq!(bridge.run_mode(), RunMode::Master);
    assert!(registry.contains(bridge.instance_id()));
    assert_eq!(sim.open_instances(), 1);

    bridge.deinit_instance().expect("deinit");
    assert_eq!(bridge.run_mode(), RunMode::Uninitialized);
    assert!(!registry.contains(bridge.instance_id()));
    assert_eq!(sim.open_instances(), 0);
    assert_eq!(sim.call_count("deinit_master"), 1);
    assert_eq!(sim.call_count("done"), 1);
}

#[test]
fn deinit_when_uninitialized_is_noop() {
    let (sim, _registry, bridge) = setup();
    bridge.deinit_instance().expect("deinit");
    assert!(sim.calls().is_empty());
}

#[test]
fn aux_clock_follows_bus_cycle() {
    let (sim, _registry, bridge) = setup();
    bridge.init_instance(&master_params(1000, true)).expect("init");
    assert_eq!(sim.aux_clock_hz(), Some(1000));
    assert_eq!(sim.event_count(), 1);

    bridge.deinit_instance().expect("deinit");
    assert_eq!(sim.aux_clock_hz(), None);
    assert_eq!(sim.event_count(), 0);
}

#[test]
fn aux_clock_cycle_has_lower_bound() {
    let (sim, _registry, bridge) = setup();
    bridge.init_instance(&master_params(4, true)).expect("init");
    assert_eq!(sim.aux_clock_hz(), Some(100_000));
}

#[test]
fn timing_event_out_of_memory() {
    let (sim, registry, bridge) = setup();
    sim.fail("create_event", EcCode::NO_MEMORY);

    let err = bridge.init_instance(&master_params(1000, true)).unwrap_err();
    assert_eq!(native_code(&err), EcCode::NO_MEMORY);
    assert_eq!(bridge.run_mode(), RunMode::Uninitialized);
    assert!(!registry.contains(bridge.instance_id()));
    assert_eq!(sim.open_instances(), 0);
    assert!(sim.dbg_output().iter().any(|m| m.contains("insufficient memory")));
}

#[test]
fn aux_clock_failure_releases_event() {
    let (sim, _registry, bridge) = setup();
    sim.fail("aux_clock_init", EcCode::INVALID_STATE);

    let err = bridge.init_instance(&master_params(1000, true)).unwrap_err();
    assert_eq!(native_code(&err), EcCode::INVALID_STATE);
    assert_eq!(sim.event_count(), 0);
    assert_eq!(sim.open_instances(), 0);
    assert!(sim.dbg_output().iter().any(|m| m.contains("auxiliary clock")));
}

#[test]
fn master_configuration_failure_is_detailed() {
    let (sim, _registry, bridge) = setup();

    let err = bridge.init_instance(&master_params(0, true)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot configure EtherCAT-Master: Invalid parameter (0x9811000B)."
    );
    assert_eq!(sim.aux_clock_hz(), None);
    assert_eq!(sim.event_count(), 0);
    assert_eq!(sim.open_instances(), 0);
}

#[test]
fn code_reporting_keeps_generic_message() {
    let sim = Arc::new(SimulatedMaster::new());
    let registry = Arc::new(InstanceRegistry::new());
    let bridge = bridge_with(&sim, &registry, ErrorReporting::Code);
    sim.fail("init", EcCode::NO_MEMORY);

    let err = bridge.init_instance(&master_params(1000, false)).unwrap_err();
    match err {
        BridgeError::Native(e) => {
            assert_eq!(e.code, EcCode::NO_MEMORY);
            assert!(e.text.is_empty());
            assert_eq!(e.message, "InitInstance failed: EC_E_NOMEMORY (0x9811000A)");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn incompatible_native_library_is_rejected() {
    let sim = Arc::new(SimulatedMaster::new().with_api_version(42));
    let registry = Arc::new(InstanceRegistry::new());
    let bridge = bridge_with(&sim, &registry, ErrorReporting::Detailed);

    let err = bridge.init_instance(&master_params(1000, false)).unwrap_err();
    assert_eq!(native_code(&err), EcCode::INVALID_PARM);
    assert_eq!(
        err.to_string(),
        format!("wrapper and native library are incompatible ({ECWRAPPER_API_VERSION} != 42)")
    );
    assert_eq!(sim.call_count("init"), 0);
    assert!(registry.is_empty());
}

#[test]
fn master_deinit_failure_still_tears_down() {
    let (sim, registry, bridge) = setup();
    bridge.init_instance(&master_params(1000, true)).expect("init");
    sim.fail("deinit_master", EcCode::BUSY);

    let err = bridge.deinit_instance().unwrap_err();
    assert_eq!(native_code(&err), EcCode::BUSY);
    assert_eq!(bridge.run_mode(), RunMode::Uninitialized);
    assert!(!registry.contains(bridge.instance_id()));
    assert_eq!(sim.event_count(), 0);
    assert_eq!(sim.open_instances(), 0);
}

#[test]
fn failed_teardown_can_be_retried() {
    let (sim, registry, bridge) = setup();
    bridge
        .init_instance(&InitParams::Simulator {
            instance_id: 1,
            simulator: None,
        })
        .expect("init");
    assert_eq!(bridge.run_mode(), RunMode::SimulatorSil);

    sim.fail("simulator_deinit", EcCode::BUSY);
    assert!(bridge.deinit_instance().is_err());
    assert_eq!(bridge.run_mode(), RunMode::SimulatorSil);
    assert!(registry.contains(bridge.instance_id()));

    sim.clear_failure("simulator_deinit");
    bridge.deinit_instance().expect("retry");
    assert_eq!(bridge.run_mode(), RunMode::Uninitialized);
    assert_eq!(sim.open_instances(), 0);
}

#[test]
fn reinit_tears_down_first() {
    let (sim, registry, bridge) = setup();
    bridge.init_instance(&master_params(1000, false)).expect("init");
    bridge
        .init_instance(&InitParams::Simulator {
            instance_id: 0,
            simulator: None,
        })
        .expect("reinit");

    assert_eq!(bridge.run_mode(), RunMode::SimulatorSil);
    assert_eq!(sim.call_count("deinit_master"), 1);
    assert_eq!(sim.open_instances(), 1);
    assert!(registry.contains(bridge.instance_id()));
    assert_eq!(registry.len(), 1);
}

#[test]
fn hil_simulator_lifecycle() {
    let (sim, _registry, bridge) = setup();
    bridge
        .init_instance(&InitParams::Simulator {
            instance_id: 2,
            simulator: Some(SimulatorParams {
                network_file: "eni.xml".to_string(),
                log_level: LogSeverity::Info,
            }),
        })
        .expect("init");
    assert_eq!(bridge.run_mode(), RunMode::SimulatorHil);
    assert_eq!(bridge.master_instance_id(), 2);

    bridge.deinit_instance().expect("deinit");
    assert_eq!(sim.call_count("deinit_simulator"), 1);
    assert_eq!(sim.call_count("simulator_deinit"), 1);
    assert_eq!(sim.open_instances(), 0);
}

#[test]
fn hil_network_failure_cleans_up() {
    let (sim, _registry, bridge) = setup();
    let err = bridge
        .init_instance(&InitParams::Simulator {
            instance_id: 0,
            simulator: Some(SimulatorParams {
                network_file: String::new(),
                log_level: LogSeverity::Info,
            }),
        })
        .unwrap_err();

    assert!(err.to_string().starts_with("Cannot configure EtherCAT-Simulator"));
    assert_eq!(bridge.run_mode(), RunMode::Uninitialized);
    assert_eq!(sim.open_instances(), 0);
}

#[test]
fn ras_client_is_shared_between_instances() {
    let (sim, registry, first) = setup();
    let second = bridge_with(&sim, &registry, ErrorReporting::Detailed);

    first.init_instance(&ras_client_params()).expect("first");
    second.init_instance(&ras_client_params()).expect("second");
    assert_eq!(sim.call_count("ras_client_init"), 1);
    assert_eq!(registry.ras_client_count(), 2);
    assert!(first.master_instance_id() >= REMOTE_INSTANCE_BASE);
    assert_ne!(first.master_instance_id(), second.master_instance_id());

    first.deinit_instance().expect("first deinit");
    assert_eq!(registry.ras_client_count(), 1);
    assert!(sim.ras_client_open());

    second.deinit_instance().expect("second deinit");
    assert_eq!(registry.ras_client_count(), 0);
    assert!(!sim.ras_client_open());
    assert_eq!(sim.connection_count(), 0);
    assert_eq!(first.ras_cookie(), None);
}

#[test]
fn ras_client_init_failure_rolls_back_counter() {
    let (sim, registry, bridge) = setup();
    sim.fail("ras_client_init", EcCode::BUSY);
    assert!(bridge.init_instance(&ras_client_params()).is_err());
    assert_eq!(registry.ras_client_count(), 0);

    sim.clear_failure("ras_client_init");
    bridge.init_instance(&ras_client_params()).expect("init");
    assert_eq!(registry.ras_client_count(), 1);
    assert_eq!(bridge.run_mode(), RunMode::RasClient);
}

#[test]
fn evaluation_build_cannot_add_ras_connection() {
    let sim = Arc::new(SimulatedMaster::new().eval_limited());
    let registry = Arc::new(InstanceRegistry::new());
    let bridge = bridge_with(&sim, &registry, ErrorReporting::Code);

    let err = bridge.init_instance(&ras_client_params()).unwrap_err();
    assert_eq!(native_code(&err), EcCode::NOT_SUPPORTED);
    assert_eq!(registry.ras_client_count(), 0);
    assert!(!sim.ras_client_open());
    assert_eq!(sim.open_instances(), 0);
}

#[test]
fn ras_connection_removal_failure_keeps_mode() {
    let (sim, registry, bridge) = setup();
    bridge.init_instance(&ras_client_params()).expect("init");
    sim.fail("ras_client_remove_connection", EcCode::TIMEOUT);

    assert!(bridge.deinit_instance().is_err());
    assert_eq!(bridge.run_mode(), RunMode::RasClient);
    assert_eq!(registry.ras_client_count(), 1);

    sim.clear_failure("ras_client_remove_connection");
    bridge.deinit_instance().expect("retry");
    assert_eq!(registry.ras_client_count(), 0);
}

#[test]
fn mailbox_gateway_client_lifecycle() {
    let (sim, registry, first) = setup();
    let second = bridge_with(&sim, &registry, ErrorReporting::Detailed);

    first.init_instance(&mbx_client_params()).expect("first");
    second.init_instance(&mbx_client_params()).expect("second");
    assert_eq!(first.run_mode(), RunMode::MbxGateway);
    assert_eq!(sim.call_count("mbx_gateway_client_init"), 1);
    assert_eq!(registry.mbx_gateway_client_count(), 2);

    first.deinit_instance().expect("first deinit");
    assert!(sim.mbx_gateway_client_open());
    second.deinit_instance().expect("second deinit");
    assert!(!sim.mbx_gateway_client_open());
    assert_eq!(sim.open_instances(), 0);
}

#[test]
fn server_modes_start_and_stop() {
    let (sim, _registry, bridge) = setup();
    let modes = [
        (
            InitParams::MasterRasServer {
                ras: ras_server_params(),
            },
            RunMode::RasServer,
        ),
        (
            InitParams::SimulatorRasServer {
                ras: ras_server_params(),
            },
            RunMode::SimulatorRasServer,
        ),
        (
            InitParams::MbxGatewayServer {
                instance_id: 0,
                gateway: MbxGatewayServerParams {
                    port: 34980,
                    log_level: LogSeverity::Error,
                },
            },
            RunMode::MbxGatewaySrv,
        ),
    ];

    for (params, mode) in modes {
        bridge.init_instance(&params).expect("init");
        assert_eq!(bridge.run_mode(), mode);
        assert_eq!(sim.server_count(), 1);

        bridge.deinit_instance().expect("deinit");
        assert_eq!(sim.server_count(), 0);
    }
    // Servers never own a native instance.
    assert_eq!(sim.call_count("done"), 0);
}

#[test]
fn server_stop_failure_is_returned() {
    let (sim, _registry, bridge) = setup();
    bridge
        .init_instance(&InitParams::MasterRasServer {
            ras: ras_server_params(),
        })
        .expect("init");
    sim.fail("ras_server_stop", EcCode::TIMEOUT);

    let err = bridge.deinit_instance().unwrap_err();
    assert_eq!(err.to_string(), "DeinitInstance failed: Timeout (0x98110010).");
    assert_eq!(bridge.run_mode(), RunMode::RasServer);
}

#[test]
fn unregister_without_client_is_invalid_state() {
    let (_sim, _registry, bridge) = setup();
    bridge.init_instance(&master_params(1000, false)).expect("init");

    let err = bridge.unregister_client().unwrap_err();
    assert_eq!(native_code(&err), EcCode::INVALID_STATE);

    let client = bridge.register_client().expect("register");
    assert_eq!(bridge.client_id(), Some(client));
    bridge.unregister_client().expect("unregister");
    assert_eq!(bridge.client_id(), None);
}

#[test]
fn register_failure_forgets_client() {
    let (sim, _registry, bridge) = setup();
    bridge.init_instance(&master_params(1000, false)).expect("init");
    bridge.register_client().expect("register");

    sim.fail("register_client", EcCode::BUSY);
    let err = bridge.register_client().unwrap_err();
    assert!(err.to_string().starts_with("Cannot register client"));
    assert_eq!(bridge.client_id(), None);
}

#[test]
fn dropped_bridge_tears_down() {
    let (sim, registry, bridge) = setup();
    bridge.init_instance(&master_params(1000, false)).expect("init");
    bridge.register_client().expect("register");
    bridge.enable_performance_measuring(true);
    bridge.enable_translation(true);
    let instance = bridge.master_instance_id();
    assert!(bridge.has_native_callbacks());

    drop(bridge);
    assert!(registry.is_empty());
    assert_eq!(sim.open_instances(), 0);
    assert_eq!(sim.client_count(), 0);

    // Late native events find no callback of the dropped bridge.
    assert_eq!(sim.emit_log(LogType::Master, LogSeverity::Error, "late"), 0);
    assert!(!sim.translate(1, "late"));
    assert!(!sim.measure(instance, "ecatExecJob", 1));
    let payload = encode_words(&[0, 1]);
    assert_eq!(sim.raise_master_event(instance, NotifyCode::SbStatus.raw(), &payload), None);
}

#[test]
fn clone_keeps_bridge_alive() {
    let (sim, registry, bridge) = setup();
    bridge.init_instance(&master_params(1000, false)).expect("init");
    let clone = bridge.clone();

    drop(bridge);
    assert_eq!(clone.run_mode(), RunMode::Master);
    assert!(registry.contains(clone.instance_id()));
    assert_eq!(sim.emit_log(LogType::Master, LogSeverity::Info, "still here"), 1);

    drop(clone);
    assert!(registry.is_empty());
}

#[test]
fn deinit_removes_callbacks() {
    let (sim, _registry, bridge) = setup();
    bridge.init_instance(&master_params(1000, false)).expect("init");
    bridge.register_client().expect("register");
    bridge.enable_performance_measuring(true);
    bridge.enable_translation(true);
    let instance = bridge.master_instance_id();

    bridge.deinit_instance().expect("deinit");
    assert!(!bridge.has_native_callbacks());
    assert_eq!(bridge.client_id(), None);
    assert_eq!(sim.client_count(), 0);
    assert!(!sim.translate(1, "after deinit"));
    assert!(!sim.measure(instance, "ecatExecJob", 1));

    drop(bridge);
    assert!(!sim.translate(1, "after drop"));
    assert_eq!(sim.emit_log(LogType::Master, LogSeverity::Error, "after drop"), 0);
}

#[test]
fn translation_of_other_bridge_survives_deinit() {
    let sim = Arc::new(SimulatedMaster::new());
    let registry = Arc::new(InstanceRegistry::new());
    let first = bridge_with(&sim, &registry, ErrorReporting::Code);
    let second = bridge_with(&sim, &registry, ErrorReporting::Code);

    first.init_instance(&master_params(1000, false)).expect("init");
    first.enable_translation(true);
    second.enable_translation(true);

    first.deinit_instance().expect("deinit");
    assert!(sim.translate(7, "owned by second"));

    drop(second);
    assert!(!sim.translate(7, "nobody"));
}

#[test]
fn uninitialized_bridge_drop_removes_translation() {
    let (sim, _registry, bridge) = setup();
    bridge.enable_translation(true);
    assert!(bridge.has_native_callbacks());

    drop(bridge);
    assert!(!sim.translate(1, "late"));
}

#[test]
fn failed_teardown_keeps_callbacks_valid() {
    let (sim, _registry, bridge) = setup();
    bridge
        .init_instance(&InitParams::Simulator {
            instance_id: 0,
            simulator: Some(SimulatorParams {
                network_file: "eni.xml".to_string(),
                log_level: LogSeverity::Info,
            }),
        })
        .expect("init");
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    bridge.add_channel_handler(Channel::DbgMsg, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    sim.fail("deinit_simulator", EcCode::BUSY);
    drop(bridge);

    // The simulator log callback is still installed; its context stays valid.
    assert_eq!(sim.emit_log(LogType::Simulator, LogSeverity::Info, "still running"), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn error_text_falls_back() {
    let (_sim, _registry, bridge) = setup();
    assert_eq!(bridge.error_text(EcCode::TIMEOUT), "Timeout");
    assert_eq!(bridge.error_text(EcCode(0x1234)), "Unknown Error 0x00001234");
}
