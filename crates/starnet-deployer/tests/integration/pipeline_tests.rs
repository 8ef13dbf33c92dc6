//! End-to-end pipeline runs against the fake engine and transport.

use std::sync::Arc;
use std::time::Duration;

use starnet_deployer::pipeline::configure_roles;
use starnet_deployer::{Error, NodeRole, NodeSet, Record, RecordStore, RunState, Stage};

use crate::constants::{TEST_REMOTE_ARTIFACTS, TEST_USER};
use crate::harness::{FakeProvisioner, FakeTransport, Fixture, node};

#[tokio::test]
async fn out_of_order_validators_get_ids_by_ordinal() {
    let fixture = Fixture::new(2, 0);
    fixture.write_ids(NodeRole::Validator, &["idA", "idB"]);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![
            node(NodeRole::Validator, 1, "ip1"),
            node(NodeRole::Validator, 0, "ip0"),
        ],
        sentries: vec![],
    });
    let transport = Arc::new(FakeTransport::default());
    let mut pipeline = fixture.pipeline(provisioner.clone(), transport.clone());

    let nodes = pipeline.up().await.unwrap();

    assert_eq!(nodes.validators[0].host, "starnet-validators-0.injective.network");
    assert_eq!(nodes.validators[0].network_node_id.as_deref(), Some("idA"));
    assert_eq!(nodes.validators[1].host, "starnet-validators-1.injective.network");
    assert_eq!(nodes.validators[1].network_node_id.as_deref(), Some("idB"));

    for index in 0..2 {
        assert_eq!(
            fixture.peer_line(NodeRole::Validator, index),
            r#"persistent_peers = "idA@ip0:26656,idB@ip1:26656""#
        );
    }

    assert_eq!(
        fixture.store().get_all().unwrap(),
        vec![
            Record {
                hostname: "starnet-validators-0.injective.network".to_string(),
                ip: "ip0".to_string(),
                id: "idA".to_string(),
            },
            Record {
                hostname: "starnet-validators-1.injective.network".to_string(),
                ip: "ip1".to_string(),
                id: "idB".to_string(),
            },
        ]
    );

    assert_eq!(pipeline.state(), RunState::Reached(Stage::Built));
    assert_eq!(provisioner.destroys(), 0);
}

#[tokio::test]
async fn every_stage_is_reached_once_in_order() {
    let fixture = Fixture::new(1, 1);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![node(NodeRole::Validator, 0, "10.0.0.1")],
        sentries: vec![node(NodeRole::Sentry, 0, "10.0.1.1")],
    });
    let mut pipeline = fixture.pipeline(provisioner, Arc::new(FakeTransport::default()));
    pipeline.up().await.unwrap();

    assert_eq!(
        pipeline.history(),
        &[
            RunState::Started,
            RunState::Reached(Stage::Provisioned),
            RunState::Reached(Stage::Indexed),
            RunState::Reached(Stage::IdAssigned),
            RunState::Reached(Stage::PeersBuilt),
            RunState::Reached(Stage::ConfigPatched),
            RunState::Reached(Stage::ArtifactsChecked),
            RunState::Reached(Stage::Synced),
            RunState::Reached(Stage::Built),
        ]
    );
}

#[tokio::test]
async fn sentries_peer_with_validators_through_the_store() {
    let fixture = Fixture::new(2, 2);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![
            node(NodeRole::Validator, 0, "10.0.0.1"),
            node(NodeRole::Validator, 1, "10.0.0.2"),
        ],
        sentries: vec![
            node(NodeRole::Sentry, 1, "10.0.1.2"),
            node(NodeRole::Sentry, 0, "10.0.1.1"),
        ],
    });
    let transport = Arc::new(FakeTransport::default());
    let mut pipeline = fixture.pipeline(provisioner, transport.clone());

    let nodes = pipeline.up().await.unwrap();

    let validator_peers = r#"persistent_peers = "v0@10.0.0.1:26656,v1@10.0.0.2:26656""#;
    for index in 0..2 {
        assert_eq!(fixture.peer_line(NodeRole::Validator, index), validator_peers);
        assert_eq!(fixture.peer_line(NodeRole::Sentry, index), validator_peers);
    }
    assert_eq!(nodes.sentries[0].network_node_id.as_deref(), Some("s0"));
    assert_eq!(nodes.sentries[1].ip, "10.0.1.2");

    // Only validators are recorded.
    assert_eq!(fixture.store().get_all().unwrap().len(), 2);

    let layout = fixture.layout();
    assert_eq!(
        transport.transfers(),
        vec![
            (layout.node_dir(NodeRole::Validator, 0), "10.0.0.1".to_string()),
            (layout.node_dir(NodeRole::Validator, 1), "10.0.0.2".to_string()),
            (layout.node_dir(NodeRole::Sentry, 0), "10.0.1.1".to_string()),
            (layout.node_dir(NodeRole::Sentry, 1), "10.0.1.2".to_string()),
        ]
    );
    assert!(
        transport
            .copies
            .lock()
            .unwrap()
            .iter()
            .all(|(_, _, remote)| remote == TEST_REMOTE_ARTIFACTS)
    );

    let commands = transport.commands.lock().unwrap();
    assert_eq!(commands.len(), 4);
    for (_, user, command) in commands.iter() {
        assert_eq!(user, TEST_USER);
        assert!(command.contains("git clone https://github.com/InjectiveLabs/injective-core"));
        assert!(command.ends_with("git checkout master && make install"));
    }
}

#[test]
fn separate_runs_hand_off_through_the_store() {
    let fixture = Fixture::new(2, 1);
    let config = &fixture.config;
    let layout = fixture.layout();
    let store = fixture.store();

    let mut validators = NodeSet {
        validators: vec![
            node(NodeRole::Validator, 1, "10.0.0.2"),
            node(NodeRole::Validator, 0, "10.0.0.1"),
        ],
        sentries: vec![],
    };
    configure_roles(
        config,
        &layout,
        &store,
        &mut validators,
        &[NodeRole::Validator],
        |_| {},
    )
    .unwrap();

    // The sentry run never sees validator nodes in memory.
    let mut sentries = NodeSet {
        validators: vec![],
        sentries: vec![node(NodeRole::Sentry, 0, "10.0.1.1")],
    };
    let peers = configure_roles(
        config,
        &layout,
        &store,
        &mut sentries,
        &[NodeRole::Sentry],
        |_| {},
    )
    .unwrap();

    assert_eq!(peers[&NodeRole::Sentry].joined(), "v0@10.0.0.1:26656,v1@10.0.0.2:26656");
    assert_eq!(
        fixture.peer_line(NodeRole::Sentry, 0),
        r#"persistent_peers = "v0@10.0.0.1:26656,v1@10.0.0.2:26656""#
    );
}

#[test]
fn sentry_run_without_validator_records_fails() {
    let fixture = Fixture::new(1, 1);
    let mut sentries = NodeSet {
        validators: vec![],
        sentries: vec![node(NodeRole::Sentry, 0, "10.0.1.1")],
    };
    let err = configure_roles(
        &fixture.config,
        &fixture.layout(),
        &fixture.store(),
        &mut sentries,
        &[NodeRole::Sentry],
        |_| {},
    )
    .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::PeersBuilt));
    assert_eq!(fixture.peer_line(NodeRole::Sentry, 0), r#"persistent_peers = """#);
}

#[tokio::test]
async fn index_gap_rolls_back() {
    let fixture = Fixture::new(2, 0);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![
            node(NodeRole::Validator, 0, "10.0.0.1"),
            node(NodeRole::Validator, 2, "10.0.0.3"),
        ],
        sentries: vec![],
    });
    let transport = Arc::new(FakeTransport::default());
    let mut pipeline = fixture.pipeline(provisioner.clone(), transport.clone());

    let err = pipeline.up().await.unwrap_err();

    assert!(matches!(err, Error::RolledBack { .. }));
    assert_eq!(err.stage(), Some(Stage::Indexed));
    assert!(err.to_string().contains("missing validators-1 in sequence"));
    assert_eq!(provisioner.destroys(), 1);
    assert_eq!(pipeline.state(), RunState::RolledBack);
    assert!(pipeline.history().contains(&RunState::Failed(Stage::Indexed)));
    // Nothing was touched remotely.
    assert!(transport.commands.lock().unwrap().is_empty());
    assert!(transport.copies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn id_count_mismatch_rolls_back_before_configs_change() {
    let fixture = Fixture::new(2, 0);
    fixture.write_ids(NodeRole::Validator, &["only-one"]);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![
            node(NodeRole::Validator, 0, "10.0.0.1"),
            node(NodeRole::Validator, 1, "10.0.0.2"),
        ],
        sentries: vec![],
    });
    let mut pipeline = fixture.pipeline(provisioner.clone(), Arc::new(FakeTransport::default()));

    let err = pipeline.up().await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::IdAssigned));
    let message = err.to_string();
    assert!(message.contains("node ids (1)"));
    assert!(message.contains("nodes (2)"));
    assert_eq!(fixture.peer_line(NodeRole::Validator, 0), r#"persistent_peers = """#);
    assert!(!fixture.config.store_path.exists());
    assert_eq!(provisioner.destroys(), 1);
}

#[tokio::test]
async fn failed_destroy_reports_both_errors() {
    let fixture = Fixture::new(1, 0);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![node(NodeRole::Validator, 0, "10.0.0.1")],
        sentries: vec![],
    })
    .failing_destroy();
    let mut pipeline = fixture.pipeline(
        provisioner,
        Arc::new(FakeTransport::with_failing(&["10.0.0.1"])),
    );

    let err = pipeline.up().await.unwrap_err();

    let message = err.to_string();
    assert!(
        message.starts_with("rollback failed: provisioning engine failed: instances still in use")
    );
    assert!(message.contains("(original error: remote build stage failed"));
    assert_eq!(pipeline.state(), RunState::RollbackFailed);
}

#[tokio::test]
async fn missing_artifacts_stop_the_run_before_provisioning() {
    let fixture = Fixture::new(2, 1);
    let layout = fixture.layout();
    fixture.remove_artifact(&layout.binary_path(NodeRole::Validator, 1));
    fixture.remove_artifact(&layout.library_path(NodeRole::Sentry, 0));
    let provisioner = FakeProvisioner::new(NodeSet::default());
    let mut pipeline = fixture.pipeline(provisioner.clone(), Arc::new(FakeTransport::default()));

    let err = pipeline.up().await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::ArtifactsChecked));
    let message = err.to_string();
    assert!(message.contains(&layout.binary_path(NodeRole::Validator, 1).display().to_string()));
    assert!(message.contains(&layout.library_path(NodeRole::Sentry, 0).display().to_string()));
    assert_eq!(provisioner.ups(), 0);
    assert_eq!(provisioner.destroys(), 0);
}

#[tokio::test]
async fn short_provisioning_output_rolls_back() {
    let fixture = Fixture::new(2, 0);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![node(NodeRole::Validator, 0, "10.0.0.1")],
        sentries: vec![],
    });
    let mut pipeline = fixture.pipeline(provisioner.clone(), Arc::new(FakeTransport::default()));

    let err = pipeline.up().await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Provisioned));
    assert_eq!(provisioner.destroys(), 1);
}

#[tokio::test]
async fn build_failure_names_the_failing_host() {
    let fixture = Fixture::new(3, 0);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![
            node(NodeRole::Validator, 0, "10.0.0.1"),
            node(NodeRole::Validator, 1, "10.0.0.2"),
            node(NodeRole::Validator, 2, "10.0.0.3"),
        ],
        sentries: vec![],
    });
    let transport = Arc::new(FakeTransport::with_failing(&["10.0.0.2"]));
    let mut pipeline = fixture.pipeline(provisioner.clone(), transport.clone());

    let err = pipeline.up().await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Built));
    let message = err.to_string();
    assert!(message.contains("10.0.0.2: exited with status 2"));
    assert!(!message.contains("10.0.0.1:"));
    assert!(pipeline.history().contains(&RunState::Reached(Stage::Synced)));
    assert!(pipeline.history().contains(&RunState::Failed(Stage::Built)));
    // Every host was still attempted.
    assert_eq!(transport.commanded_hosts(), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    assert_eq!(provisioner.destroys(), 1);
}

#[tokio::test]
async fn failed_transfer_is_aggregated_with_build_results() {
    let fixture = Fixture::new(2, 1);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![
            node(NodeRole::Validator, 0, "10.0.0.1"),
            node(NodeRole::Validator, 1, "10.0.0.2"),
        ],
        sentries: vec![node(NodeRole::Sentry, 0, "10.0.1.1")],
    });
    let transport = Arc::new(FakeTransport::with_full_disk(&["10.0.1.1"]));
    let mut pipeline = fixture.pipeline(provisioner, transport.clone());

    let err = pipeline.up().await.unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Synced));
    assert!(err.to_string().contains("10.0.1.1: transfer failed with status 11"));
    // The host without artifacts is not built on.
    assert_eq!(transport.commanded_hosts(), vec!["10.0.0.1", "10.0.0.2"]);
    assert!(!pipeline.history().contains(&RunState::Reached(Stage::Synced)));
}

#[tokio::test]
async fn sync_budget_is_enforced() {
    let mut fixture = Fixture::new(1, 0);
    fixture.config.remote.sync_timeout_secs = Some(1);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![node(NodeRole::Validator, 0, "10.0.0.1")],
        sentries: vec![],
    });
    let transport = Arc::new(FakeTransport {
        transfer_delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let mut pipeline = fixture.pipeline(provisioner.clone(), transport);

    let err = pipeline.up().await.unwrap_err();

    match &err {
        Error::RolledBack { original } => {
            assert!(matches!(**original, Error::StageTimeout { stage: Stage::Synced, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(provisioner.destroys(), 1);
}

#[tokio::test]
async fn timed_out_transfers_stop_with_the_rollback() {
    let mut fixture = Fixture::new(1, 0);
    fixture.config.remote.sync_timeout_secs = Some(1);
    let provisioner = FakeProvisioner::new(NodeSet {
        validators: vec![node(NodeRole::Validator, 0, "10.0.0.1")],
        sentries: vec![],
    });
    let transport = Arc::new(FakeTransport {
        transfer_delay: Some(Duration::from_secs(2)),
        ..Default::default()
    });
    let mut pipeline = fixture.pipeline(provisioner.clone(), transport.clone());

    let err = pipeline.up().await.unwrap_err();
    assert!(matches!(err, Error::RolledBack { .. }));
    assert_eq!(provisioner.destroys(), 1);

    // Long past the point the transfer would have landed.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(transport.transfers().is_empty());
    assert!(transport.commanded_hosts().is_empty());
}
