//! Remote dispatch and service lifecycle against misbehaving hosts.

use std::sync::Arc;

use starnet_deployer::service::{push_state, record_hosts, restart_services};
use starnet_deployer::sync::sync_fleet;
use starnet_deployer::{Executor, NodeRole, NodeSet, Record, SessionError};

use crate::constants::{TEST_REMOTE_ARTIFACTS, TEST_USER};
use crate::harness::{FakeTransport, Fixture, node};

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn bad_auth_on_one_host_is_isolated() {
    let transport = Arc::new(FakeTransport::with_unreachable(&["B"]));
    let executor = Executor::new(transport.clone(), TEST_USER);

    let report = executor.execute(&hosts(&["A", "B", "C"]), "echo hello").await;

    assert_eq!(report.len(), 3);
    assert_eq!(report.get("A").unwrap().exit_code, 0);
    assert_eq!(report.get("C").unwrap().exit_code, 0);
    assert_eq!(report.get("A").unwrap().stdout, "ran on A\n");
    assert!(matches!(
        report.get("B").unwrap().error,
        Some(SessionError::Dial(_))
    ));

    let err = report.into_result("remote build").unwrap_err();
    let failures = err.host_failures().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].host, "B");
    assert!(failures[0].reason.contains("Permission denied"));
}

#[tokio::test]
async fn every_host_is_reported_even_when_all_fail() {
    let transport = Arc::new(FakeTransport::with_failing(&["A", "B"]));
    let executor = Executor::new(transport, TEST_USER);

    let report = executor.execute(&hosts(&["A", "B"]), "make install").await;

    let failures = report.failures();
    assert_eq!(
        failures.iter().map(|f| f.host.as_str()).collect::<Vec<_>>(),
        vec!["A", "B"]
    );
    assert!(report.iter().all(|result| result.error.is_none() && result.exit_code == 2));
}

#[tokio::test]
async fn unreachable_host_fails_transfer_and_is_not_built() {
    let fixture = Fixture::new(2, 0);
    let nodes = NodeSet {
        validators: vec![
            node(NodeRole::Validator, 0, "10.0.0.1"),
            node(NodeRole::Validator, 1, "10.0.0.2"),
        ],
        sentries: vec![],
    };
    let transport = Arc::new(FakeTransport::with_unreachable(&["10.0.0.1"]));
    let executor = Executor::new(transport.clone(), TEST_USER);

    let report = sync_fleet(
        &executor,
        &fixture.layout(),
        &nodes,
        TEST_REMOTE_ARTIFACTS,
        &fixture.config.daemon,
    )
    .await;

    assert_eq!(report.transfers.completed, vec!["10.0.0.2"]);
    assert_eq!(transport.commanded_hosts(), vec!["10.0.0.2"]);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].host, "10.0.0.1");
    assert!(failures[0].reason.starts_with("failed to dial"));
}

#[tokio::test]
async fn restart_targets_recorded_validators() {
    let records = vec![
        Record {
            hostname: "starnet-validators-0.injective.network".to_string(),
            ip: "10.0.0.1".to_string(),
            id: "v0".to_string(),
        },
        Record {
            hostname: "starnet-validators-1.injective.network".to_string(),
            ip: "10.0.0.2".to_string(),
            id: "v1".to_string(),
        },
    ];
    let transport = Arc::new(FakeTransport::default());
    let executor = Executor::new(transport.clone(), TEST_USER);

    restart_services(&executor, &record_hosts(&records), "injectived")
        .await
        .unwrap();

    let commands = transport.commands.lock().unwrap();
    assert_eq!(commands.len(), 2);
    assert!(
        commands
            .iter()
            .all(|(_, _, command)| command == "sudo systemctl restart injectived")
    );
}

#[tokio::test]
async fn state_push_continues_past_a_broken_host() {
    let state = tempfile::tempdir().unwrap();
    let transport = Arc::new(FakeTransport::with_full_disk(&["10.0.0.2"]));
    let executor = Executor::new(transport.clone(), TEST_USER);

    let err = push_state(
        &executor,
        &hosts(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]),
        state.path(),
        "/home/injectived/.injectived",
        "injectived",
    )
    .await
    .unwrap_err();

    let failures = err.host_failures().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].host, "10.0.0.2");
    assert!(failures[0].reason.starts_with("copy state:"));

    // The broken host was stopped but never restarted.
    let commands = transport.commands.lock().unwrap();
    let for_host = |host: &str| {
        commands
            .iter()
            .filter(|(h, _, _)| h == host)
            .map(|(_, _, c)| c.as_str())
            .collect::<Vec<_>>()
    };
    assert_eq!(for_host("10.0.0.2"), vec!["sudo systemctl stop injectived"]);
    assert_eq!(
        for_host("10.0.0.3"),
        vec!["sudo systemctl stop injectived", "sudo systemctl start injectived"]
    );
}
