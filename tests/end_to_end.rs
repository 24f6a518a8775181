//! ---
//! blinker_section: "15-testing"
//! blinker_subsection: "integration-tests"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "End-to-end lifecycle tests for the LedBlinker deployment."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use blinker_common::AppConfig;
use blinker_deployment::components::CS_LOAD;
use blinker_deployment::Deployment;
use blinker_topology::{LifecyclePhase, TopologyError};

fn config_in(dir: &std::path::Path, extra: &str) -> AppConfig {
    let toml = format!(
        r#"
        [cycle]
        interval_ms = 20
        join_timeout_ms = 2000

        [components]
        prm_db_path = "{prm}"
        gpio_root = "{gpio}"
        {extra}
        "#,
        prm = dir.join("PrmDb.dat").display(),
        gpio = dir.join("gpio").display(),
    );
    AppConfig::from_str(&toml).unwrap()
}

#[test]
fn full_lifecycle_from_toml() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), "rate_group_divisors = [1, 10]");

    let mut deployment = Deployment::assemble(&config).unwrap();
    let report = deployment.bring_up().unwrap();
    assert_eq!(
        report.phases,
        [
            LifecyclePhase::Constructed,
            LifecyclePhase::IdsAssigned,
            LifecyclePhase::Wired,
            LifecyclePhase::CommandsRegistered,
            LifecyclePhase::Configured,
            LifecyclePhase::Started,
            LifecyclePhase::Running,
        ]
    );
    assert_eq!(report.components, 11);

    let opcode = deployment
        .controller()
        .commands()
        .opcode_of("cmdSeq", CS_LOAD.mnemonic)
        .unwrap();
    deployment.controller().dispatch_command(opcode, b"seq").unwrap();
    assert_eq!(deployment.components().cmd_seq.loaded_bytes(), 3);

    deployment.start_clock().unwrap();
    assert!(matches!(
        deployment.start_clock(),
        Err(TopologyError::ClockAlreadyStarted)
    ));
    thread::sleep(Duration::from_millis(300));
    assert!(deployment.components().cmd_seq.sched_calls() > 0);

    let started = Instant::now();
    let teardown = deployment.tear_down();
    assert!(teardown.is_clean(), "{:?}", teardown.failures);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(teardown.threads_joined, 3);
    assert_eq!(teardown.components_stopped, 2);

    let again = deployment.tear_down();
    assert_eq!(again.threads_joined, 0);
    assert!(again.released.is_empty());

    let err = deployment.bring_up().unwrap_err();
    assert!(matches!(err.cause, TopologyError::AlreadyTornDown));
}

#[test]
fn second_bring_up_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), "");

    let mut deployment = Deployment::assemble(&config).unwrap();
    deployment.bring_up().unwrap();
    let report = deployment.bring_up().unwrap();
    assert!(report.phases.is_empty());
    assert_eq!(deployment.controller().thread_names().len(), 3);

    let teardown = deployment.tear_down();
    assert!(teardown.is_clean());
    assert_eq!(teardown.bytes_released, 3000 * 30 + 5 * 1024);
}

#[test]
fn unreachable_endpoint_without_reconnect_still_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path(), "");
    config.comm.host = Some("127.0.0.1".to_owned());
    config.comm.port = 1;
    config.comm.reconnect = false;

    let mut deployment = Deployment::assemble(&config).unwrap();
    let report = deployment.bring_up().unwrap();
    assert!(report.transport_started());
    let teardown = deployment.tear_down();
    assert!(teardown.is_clean(), "{:?}", teardown.failures);
    assert_eq!(teardown.threads_joined, 4);
}
