//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "tests"
//! blinker_type: "test"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment assembly tests."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use std::time::Duration;

use blinker_common::AppConfig;
use blinker_deployment::components::{PingStatus, BLINKING_ON_OFF};
use blinker_deployment::Deployment;
use blinker_topology::LifecyclePhase;

fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.components.prm_db_path = dir.join("PrmDb.dat");
    config.components.gpio_root = dir.join("gpio");
    config.cycle.interval = Duration::from_millis(10);
    config
}

fn prepare_gpio(dir: &Path, pin: u32) -> std::path::PathBuf {
    let pin_dir = dir.join("gpio").join(format!("gpio{pin}"));
    std::fs::create_dir_all(&pin_dir).unwrap();
    let value = pin_dir.join("value");
    std::fs::write(&value, b"0").unwrap();
    value
}

#[test]
fn runs_and_tears_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let value_file = prepare_gpio(dir.path(), config.components.led_pin);
    std::fs::write(&config.components.prm_db_path, [1u8; 32]).unwrap();

    let mut deployment = Deployment::assemble(&config).unwrap();
    let report = deployment.bring_up().unwrap();
    assert_eq!(report.components, 12);
    assert_eq!(report.commands, 3);
    assert!(report.transport_skipped());
    assert!(!report.transport_started());
    assert_eq!(deployment.controller().phase(), Some(LifecyclePhase::Running));

    let components = deployment.components();
    assert_eq!(components.prm_db.loaded_bytes(), 32);
    assert!(components.gpio.is_open());
    assert_eq!(components.cmd_seq.capacity(), 5 * 1024);
    assert_eq!(components.health.monitored(), 7);

    deployment.start_clock().unwrap();
    thread::sleep(Duration::from_millis(500));

    let components = deployment.components();
    assert!(components.block_driver.ticks() > 10);
    assert!(components.led.transitions() > 5);
    assert!(components.rate_groups[0].cycles() > components.rate_groups[2].cycles());
    assert!(components.health.watchdog_strokes() > 0);
    assert_eq!(components.health.fatal_count(), 0);
    for name in ["blockDrv", "cmdSeq", "fileDownlink", "prmDb", "rateGroup1", "rateGroup3"] {
        assert_ne!(components.health.status(name), Some(PingStatus::Fatal), "{name}");
    }
    assert!(components.file_downlink.sched_calls() > 0);
    assert!(components.file_downlink.timing().is_some());

    let teardown = deployment.tear_down();
    assert!(teardown.is_clean(), "{:?}", teardown.failures);
    assert_eq!(teardown.threads_joined, 4);
    assert_eq!(teardown.bytes_released, 3000 * 30 + 5 * 1024);
    assert_eq!(teardown.released, ["fileUplinkBufferManager", "cmdSeq"]);
    assert_eq!(
        deployment.controller().phase(),
        Some(LifecyclePhase::Deallocated)
    );

    let written = std::fs::read(&value_file).unwrap();
    assert!(written == b"0" || written == b"1");
    assert_eq!(
        deployment.components().gpio.level(),
        Some(deployment.components().led.is_on())
    );
}

#[test]
fn missing_gpio_and_parameters_are_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut deployment = Deployment::assemble(&config).unwrap();
    deployment.bring_up().unwrap();
    assert!(!deployment.components().gpio.is_open());
    assert_eq!(deployment.components().prm_db.loaded_bytes(), 0);
    assert!(deployment.tear_down().is_clean());
}

#[test]
fn led_command_stops_blinking() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut deployment = Deployment::assemble(&config).unwrap();
    deployment.bring_up().unwrap();
    let opcode = deployment
        .controller()
        .commands()
        .opcode_of("led", BLINKING_ON_OFF.mnemonic)
        .unwrap();
    let led_id = deployment.controller().component_id("led").unwrap();
    assert_eq!(opcode, led_id + BLINKING_ON_OFF.opcode);

    deployment.controller().dispatch_command(opcode, &[0]).unwrap();
    assert!(!deployment.components().led.is_blinking());
    assert!(deployment.controller().dispatch_command(opcode, &[9]).is_err());

    deployment.start_clock_with(Duration::from_millis(5)).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(deployment.components().led.transitions(), 0);
    assert!(deployment.tear_down().is_clean());
}

#[test]
fn budget_exhaustion_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.memory.budget = Some(50_000);

    let mut deployment = Deployment::assemble(&config).unwrap();
    let err = deployment.bring_up().unwrap_err();
    assert_eq!(err.phase, LifecyclePhase::Configured);
    assert_eq!(err.rollback.bytes_released, 5 * 1024);
    assert_eq!(err.rollback.released, ["cmdSeq"]);
    assert_eq!(
        deployment.controller().phase(),
        Some(LifecyclePhase::Deallocated)
    );
}

#[test]
fn single_rate_group_hosts_every_member() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.components.rate_group_divisors = vec![1];

    let mut deployment = Deployment::assemble(&config).unwrap();
    let report = deployment.bring_up().unwrap();
    assert_eq!(report.components, 10);
    deployment.start_clock().unwrap();
    thread::sleep(Duration::from_millis(200));
    let components = deployment.components();
    assert!(components.file_downlink.sched_calls() > 0);
    assert!(components.health.watchdog_strokes() > 0);
    assert_eq!(components.health.monitored(), 5);
    let teardown = deployment.tear_down();
    assert!(teardown.is_clean(), "{:?}", teardown.failures);
    assert_eq!(teardown.threads_joined, 2);
}

#[test]
fn endpoint_starts_receive_task() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.comm.host = Some("127.0.0.1".to_owned());
    config.comm.port = port;

    let mut deployment = Deployment::assemble(&config).unwrap();
    let report = deployment.bring_up().unwrap();
    assert!(report.transport_started());
    assert!(!report.transport_skipped());

    let teardown = deployment.tear_down();
    assert!(teardown.is_clean(), "{:?}", teardown.failures);
    // Three rate groups plus the receive task.
    assert_eq!(teardown.threads_joined, 4);
    drop(listener);
}
