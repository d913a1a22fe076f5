// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! End-to-end read client behavior against the in-memory server.

use std::time::Duration;

use uapoll_core::{FieldValue, MemoryAccumulator};
use uapoll_opcua::client::mock::{MockServer, MockTransportFactory};
use uapoll_opcua::client::{EndpointDescription, OpcUaValue};
use uapoll_opcua::{
    AuthMethod, AuthenticationError, NegotiationError, NodeId, OpcUaError, OpcUaInput, ReadClientConfig,
    SecurityMode, SecurityPolicy, TimeoutError,
};

const PLANT_CONFIG: &str = r#"
name = "localhost"
endpoint = "opc.tcp://localhost:4840"
connect_timeout = "10s"
request_timeout = "5s"

[tags]
tag0 = "val0"

[[nodes]]
name = "name"
namespace = "1"
identifier_type = "s"
identifier = "one"

[[nodes]]
name = "name2"
namespace = "2"
identifier_type = "s"
identifier = "two"
tags = [["tag7", "val7"]]
default_tags = { tag6 = "val6" }

[[group]]
name = "foo"
namespace = "3"
identifier_type = "i"
tags = [["tag1", "val1"], ["tag2", "val2"]]
nodes = [{ name = "name3", identifier = "3000", tags = [["tag3", "val3"]] }]

[[group]]
name = "bar"
namespace = "0"
identifier_type = "i"
tags = [["tag1", "val1"], ["tag2", "val2"]]
nodes = [
  { name = "name4", identifier = "4000", tags = [["tag4", "val4"]], default_tags = { tag1 = "override" } },
  { name = "name5", identifier = "4001" },
]
"#;

fn plant_config() -> ReadClientConfig {
    toml::from_str(PLANT_CONFIG).unwrap()
}

fn plant_server() -> MockServer {
    let server = MockServer::new();
    server.set_value(NodeId::string(1, "one"), OpcUaValue::Double(1.5));
    server.set_value(NodeId::string(2, "two"), OpcUaValue::Int32(2));
    server.set_value(NodeId::numeric(3, 3000), OpcUaValue::String("three".into()));
    server.set_value(NodeId::numeric(0, 4000), OpcUaValue::UInt16(4000));
    server.set_value(NodeId::numeric(0, 4001), OpcUaValue::Boolean(true));
    server
}

fn input(config: ReadClientConfig, server: &MockServer) -> OpcUaInput<MockTransportFactory> {
    let mut input = OpcUaInput::new(config, MockTransportFactory::new(server.clone()));
    input.init().unwrap();
    input
}

#[tokio::test]
async fn test_plant_config_emits_grouped_metrics() {
    let server = plant_server();
    let mut input = input(plant_config(), &server);
    assert_eq!(input.mappings().len(), 5);

    let mut acc = MemoryAccumulator::new();
    assert_eq!(input.gather(&mut acc).await.unwrap(), 3);
    assert!(acc.errors().is_empty());

    let metrics = acc.metrics();
    assert_eq!(metrics[0].name, "localhost");
    assert_eq!(metrics[1].name, "foo");
    assert_eq!(metrics[2].name, "bar");

    let root = &metrics[0];
    assert_eq!(root.field("name"), Some(&FieldValue::Float64(1.5)));
    assert_eq!(root.field("name2"), Some(&FieldValue::Int32(2)));
    assert_eq!(root.tag("tag0"), Some("val0"));
    assert_eq!(root.tag("tag6"), Some("val6"));
    assert_eq!(root.tag("tag7"), None);

    let foo = &metrics[1];
    assert_eq!(foo.field("name3"), Some(&FieldValue::String("three".into())));
    assert_eq!(foo.tag("tag3"), Some("val3"));

    // name5 comes last, so its tag1 wins over name4's override.
    let bar = &metrics[2];
    assert_eq!(bar.fields.len(), 2);
    assert_eq!(bar.tag("tag1"), Some("val1"));
    assert_eq!(bar.tag("tag4"), None);

    assert_eq!(server.register_requests(), 1);
    assert_eq!(server.read_batch_sizes(), vec![5]);
}

#[tokio::test]
async fn test_registration_happens_once_per_session() {
    let server = plant_server();
    let mut input = input(plant_config(), &server);
    let mut acc = MemoryAccumulator::new();

    for _ in 0..3 {
        input.gather(&mut acc).await.unwrap();
    }
    assert_eq!(server.register_requests(), 1);
    assert_eq!(server.read_requests(), 3);
    assert_eq!(server.connect_count(), 1);
}

#[tokio::test]
async fn test_allowlisted_status_code_is_accepted() {
    let server = MockServer::new();
    let node = NodeId::numeric(2, 10);
    server.set_value_with_status(node.clone(), OpcUaValue::Double(7.0), 0xC0u32);

    let mut config = ReadClientConfig::new("opc.tcp://localhost:4840");
    config.root_nodes = vec![uapoll_opcua::NodeSettings::new("level", "10")
        .with_namespace("2")
        .with_identifier_type("i")];

    let mut rejecting = input(config.clone(), &server);
    let mut acc = MemoryAccumulator::new();
    assert_eq!(rejecting.gather(&mut acc).await.unwrap(), 0);
    assert!(acc.is_empty());

    config.workarounds.additional_valid_status_codes = vec!["0xC0".into()];
    let mut accepting = input(config, &server);
    let mut acc = MemoryAccumulator::new();
    assert_eq!(accepting.gather(&mut acc).await.unwrap(), 1);
    assert_eq!(acc.find("opcua").unwrap().field("level"), Some(&FieldValue::Float64(7.0)));
}

#[tokio::test]
async fn test_failed_group_emits_nothing_but_others_do() {
    let server = plant_server();
    server.remove_node(&NodeId::numeric(3, 3000));
    let mut input = input(plant_config(), &server);

    let mut acc = MemoryAccumulator::new();
    assert_eq!(input.gather(&mut acc).await.unwrap(), 2);
    assert!(acc.find("foo").is_none());
    assert!(acc.find("localhost").is_some());
    assert!(acc.errors().is_empty());
    assert!(!input.last_received()[2].is_present());
}

#[tokio::test]
async fn test_total_failure_keeps_values_and_reconnects() {
    let server = plant_server();
    let mut input = input(plant_config(), &server);
    let mut acc = MemoryAccumulator::new();
    input.gather(&mut acc).await.unwrap();
    let before = input.last_received().to_vec();

    server.set_read_failure(Some("socket reset"));
    let mut failed = MemoryAccumulator::new();
    let err = input.gather(&mut failed).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Connection(_)));
    assert!(failed.is_empty());
    assert_eq!(failed.errors().len(), 1);
    assert_eq!(input.last_received(), before.as_slice());
    assert!(!input.is_connected());

    server.set_read_failure(None);
    let mut recovered = MemoryAccumulator::new();
    assert_eq!(input.gather(&mut recovered).await.unwrap(), 3);
    assert_eq!(server.connect_count(), 2);
    assert_eq!(server.register_requests(), 2);

    let stats = input.stats();
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.failed_cycles, 1);
    assert_eq!(stats.reconnects, 1);
}

#[tokio::test]
async fn test_server_dropped_session_is_replaced() {
    let server = plant_server();
    let mut input = input(plant_config(), &server);
    let mut acc = MemoryAccumulator::new();
    input.gather(&mut acc).await.unwrap();

    server.drop_sessions();
    assert!(!input.is_connected());

    input.gather(&mut acc).await.unwrap();
    assert_eq!(server.connect_count(), 2);
    assert!(input.is_connected());
}

#[tokio::test]
async fn test_unregistered_reads_issue_one_request_per_node() {
    let server = plant_server();
    let mut config = plant_config();
    config.read_workarounds.use_unregistered_reads = true;
    let mut input = input(config, &server);

    let mut acc = MemoryAccumulator::new();
    assert_eq!(input.gather(&mut acc).await.unwrap(), 3);
    assert_eq!(server.register_requests(), 0);
    assert_eq!(server.read_batch_sizes(), vec![1, 1, 1, 1, 1]);
}

#[tokio::test]
async fn test_rejected_registration_falls_back_to_node_ids() {
    let server = plant_server();
    server.set_reject_registration(true);
    let mut input = input(plant_config(), &server);

    let mut acc = MemoryAccumulator::new();
    assert_eq!(input.gather(&mut acc).await.unwrap(), 3);
    input.gather(&mut acc).await.unwrap();
    assert_eq!(server.register_requests(), 1);
}

#[tokio::test]
async fn test_rejected_identity_is_authentication_error() {
    let server = plant_server();
    server.set_reject_identity(Some("BadUserAccessDenied"));
    let mut config = plant_config();
    config.auth_method = AuthMethod::UserName;
    config.username = "operator".into();
    config.password = "secret".into();
    let mut input = input(config, &server);

    let mut acc = MemoryAccumulator::new();
    let err = input.gather(&mut acc).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Authentication(AuthenticationError::Rejected { .. })));
    assert_eq!(acc.errors().len(), 1);
    assert!(acc.is_empty());
}

#[tokio::test]
async fn test_unavailable_policy_is_negotiation_error() {
    let server = plant_server();
    let mut config = plant_config();
    config.security_policy = "Basic256Sha256".parse().unwrap();
    let mut input = input(config, &server);

    let err = input.gather(&mut MemoryAccumulator::new()).await.unwrap_err();
    assert!(matches!(
        err,
        OpcUaError::SecurityNegotiation(NegotiationError::PolicyNotAdvertised { .. })
    ));
    assert_eq!(server.connect_count(), 0);
}

#[tokio::test]
async fn test_auto_security_picks_strongest_endpoint() {
    let server = plant_server();
    server.set_endpoints(vec![
        EndpointDescription::new("opc.tcp://mock:4840", SecurityPolicy::None, SecurityMode::None),
        EndpointDescription::new("opc.tcp://mock:4840", SecurityPolicy::Basic256Sha256, SecurityMode::Sign),
        EndpointDescription::new(
            "opc.tcp://mock:4840",
            SecurityPolicy::Basic256Sha256,
            SecurityMode::SignAndEncrypt,
        ),
    ]);
    let mut input = input(plant_config(), &server);

    input.gather(&mut MemoryAccumulator::new()).await.unwrap();
    let chosen = server.last_endpoint().unwrap();
    assert_eq!(chosen.security_policy, SecurityPolicy::Basic256Sha256);
    assert_eq!(chosen.security_mode, SecurityMode::SignAndEncrypt);
}

#[tokio::test(start_paused = true)]
async fn test_slow_read_times_out_and_reconnects() {
    let server = plant_server();
    let mut config = plant_config();
    config.request_timeout = Duration::from_secs(1);
    let mut input = input(config, &server);
    input.gather(&mut MemoryAccumulator::new()).await.unwrap();

    server.set_read_delay(Duration::from_secs(3));
    let err = input.gather(&mut MemoryAccumulator::new()).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Timeout(TimeoutError::Request { .. })));
    assert!(!input.is_connected());

    server.set_read_delay(Duration::ZERO);
    input.gather(&mut MemoryAccumulator::new()).await.unwrap();
    assert_eq!(server.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_connect_times_out() {
    let server = plant_server();
    server.set_connect_delay(Duration::from_secs(30));
    let mut config = plant_config();
    config.connect_timeout = Duration::from_secs(2);
    let mut input = input(config, &server);

    let err = input.gather(&mut MemoryAccumulator::new()).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Timeout(TimeoutError::Connect { .. })));
    assert_eq!(server.open_sessions(), 0);
}
