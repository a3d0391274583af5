//! Calls over the RPC channel against the mock server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use kclient::Bytes;
use kclient::Client;
use kclient::ClientConfig;
use kclient::Error;
use kclient::ExceptionRegistry;
use kclient::RemoteObject;
use kclient::Service;
use kclient::decode;
use kclient::encode;
use kclient::kproto::ConnectionStatus;
use kclient::kproto::Fault;
use kclient::kproto::Status;
use kclient::mock::MockServer;
use kclient::services::krpc::ArgumentException;

use common::LONG;
use common::connect;

kclient::remote_class! {
    pub struct Vessel = "SpaceCenter.Vessel";
}

kclient::define_exception! {
    pub struct NoActiveVesselException;
}

struct SpaceCenter {
    client: Client,
}

impl Service for SpaceCenter {
    const NAME: &'static str = "SpaceCenter";

    fn new(client: Client) -> Self {
        Self { client }
    }

    fn register_exceptions(registry: &ExceptionRegistry) {
        registry.register(Self::NAME, "NoActiveVesselException", NoActiveVesselException::new);
    }
}

impl SpaceCenter {
    async fn active_vessel(&self) -> kclient::Result<Vessel> {
        let call = self.client.build_call(Self::NAME, "get_ActiveVessel", Vec::new());
        self.client.call(&call).await
    }

    async fn target_vessel(&self) -> kclient::Result<Option<Vessel>> {
        let call = self.client.build_call(Self::NAME, "get_TargetVessel", Vec::new());
        self.client.call(&call).await
    }

    async fn vessel_name(&self, vessel: &Vessel) -> kclient::Result<String> {
        let call = self.client.build_call(Self::NAME, "Vessel_get_Name", vec![encode(vessel)?]);
        self.client.call(&call).await
    }
}

fn object_bytes(id: u64) -> Vec<u8> {
    let mut enc = kclient::kpack::Encoder::new();
    enc.object(id).unwrap();
    enc.into_bytes().unwrap()
}

// ============================================================================
//  RESULTS
// ============================================================================

#[tokio::test]
async fn test_invoke_returns_encoded_result() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.returns("SpaceCenter", "get_UT", &1234.5f64)?;
    let client = connect(&server).await;

    let bytes = client.invoke("SpaceCenter", "get_UT", Vec::new()).await?;
    assert_eq!(decode::<f64>(&bytes, &client)?, 1234.5);
    Ok(())
}

#[tokio::test]
async fn test_arguments_arrive_in_position_order() -> anyhow::Result<()> {
    let server = MockServer::new();
    let args = server.clone();
    server.on("Math", "Subtract", move |call| {
        let a: i32 = args.arg(call, 0)?;
        let b: i32 = args.arg(call, 1)?;
        encode(&(a - b)).map_err(|e| Fault::message(e.to_string()))
    });
    let client = connect(&server).await;

    let call = client.build_call("Math", "Subtract", vec![encode(&10i32)?, encode(&3i32)?]);
    assert_eq!(client.call::<i32>(&call).await?, 7);

    let received = server.calls().into_iter().find(|c| c.procedure() == "Subtract").expect("call logged");
    assert_eq!(received, call);
    Ok(())
}

#[tokio::test]
async fn test_prepared_call_can_be_sent_repeatedly() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.returns("KRPC", "get_Paused", &false)?;
    let client = connect(&server).await;

    let call = client.krpc().paused_call();
    for _ in 0..3 {
        assert!(!client.call::<bool>(&call).await?);
    }
    assert_eq!(server.call_count("KRPC", "get_Paused"), 3);
    Ok(())
}

#[tokio::test]
async fn test_typed_messages_and_identity() -> anyhow::Result<()> {
    let server = MockServer::new();
    let status = Status { version: "0.5.4".into(), rpcs_executed: 12, ..Default::default() };
    server.returns("KRPC", "GetStatus", &status)?;
    let client = connect(&server).await;
    let krpc = client.krpc();

    assert_eq!(krpc.get_status().await?, status);
    assert_eq!(krpc.get_client_id().await?, Bytes(client.identifier().to_vec()));
    assert_eq!(krpc.get_client_name().await?, "test-client");
    Ok(())
}

#[tokio::test]
async fn test_objects_bind_to_connection() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.on("SpaceCenter", "get_ActiveVessel", |_| Ok(object_bytes(5)));
    server.on("SpaceCenter", "get_TargetVessel", |_| Ok(object_bytes(0)));
    let args = server.clone();
    server.on("SpaceCenter", "Vessel_get_Name", move |call| {
        let vessel: Vessel = args.arg(call, 0)?;
        encode(&format!("vessel-{}", vessel.id())).map_err(|e| Fault::message(e.to_string()))
    });
    let client = connect(&server).await;
    let space_center = client.service::<SpaceCenter>();

    let vessel = space_center.active_vessel().await?;
    assert_eq!(vessel.id(), 5);
    assert_eq!(vessel.client().connection_id(), client.connection_id());
    assert_eq!(space_center.active_vessel().await?, vessel);
    assert_eq!(space_center.vessel_name(&vessel).await?, "vessel-5");
    assert!(space_center.target_vessel().await?.is_none());

    let other = connect(&server).await;
    let elsewhere = other.service::<SpaceCenter>().active_vessel().await?;
    assert_eq!(elsewhere.id(), vessel.id());
    assert_ne!(elsewhere, vessel);
    Ok(())
}

// ============================================================================
//  FAULTS
// ============================================================================

#[tokio::test]
async fn test_fault_maps_to_registered_exception() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.fails("KRPC", "set_Paused", Fault::typed("KRPC", "ArgumentException", "bad arg"));
    let client = connect(&server).await;

    let err = client.krpc().set_paused(true).await.unwrap_err();
    let typed = err.downcast_ref::<ArgumentException>().expect("typed ArgumentException");
    assert_eq!(typed.message(), "bad arg");
    assert_eq!(err.rpc().map(|e| e.message()), Some("bad arg"));
    Ok(())
}

#[tokio::test]
async fn test_unregistered_fault_stays_generic() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.fails(
        "SpaceCenter",
        "get_ActiveVessel",
        Fault::typed("SpaceCenter", "NoActiveVesselException", "no vessel"),
    );
    let client = connect(&server).await;

    let call = client.build_call("SpaceCenter", "get_ActiveVessel", Vec::new());
    let err = client.invoke_call(&call).await.unwrap_err();
    let rpc = err.rpc().expect("rpc error");
    assert!(!rpc.is_typed());
    assert_eq!(rpc.name(), "NoActiveVesselException");

    // obtaining the service proxy registers its exception types
    let err = client.service::<SpaceCenter>().active_vessel().await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<NoActiveVesselException>().map(|e| e.message()),
        Some("no vessel")
    );
    Ok(())
}

#[tokio::test]
async fn test_registration_is_per_connection() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.fails("Custom", "Fail", Fault::typed("Custom", "Oops", "nope"));
    let first = connect(&server).await;
    let second = connect(&server).await;
    first.register_exception("Custom", "Oops", NoActiveVesselException::new);

    let a = first.invoke("Custom", "Fail", Vec::new()).await.unwrap_err();
    let b = second.invoke("Custom", "Fail", Vec::new()).await.unwrap_err();
    assert!(a.downcast_ref::<NoActiveVesselException>().is_some());
    assert!(b.downcast_ref::<NoActiveVesselException>().is_none());
    Ok(())
}

#[tokio::test]
async fn test_unknown_procedure_is_rpc_error() {
    let server = MockServer::new();
    let client = connect(&server).await;
    let err = client.invoke("Nope", "Missing", Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::Rpc(_)));
    assert!(err.to_string().contains("Nope.Missing"));
}

#[tokio::test]
async fn test_batch_results_are_independent() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.returns("KRPC", "get_Paused", &true)?;
    server.fails("KRPC", "set_Paused", Fault::typed("KRPC", "InvalidOperationException", "not now"));
    let client = connect(&server).await;
    let krpc = client.krpc();

    let calls = vec![
        krpc.paused_call(),
        client.build_call("KRPC", "set_Paused", vec![encode(&false)?]),
        krpc.paused_call(),
    ];
    let results = client.invoke_batch(&calls).await?;
    assert_eq!(results.len(), 3);
    assert!(decode::<bool>(results[0].as_ref().unwrap(), &client)?);
    assert!(matches!(results[1], Err(Error::Rpc(_))));
    assert!(results[2].is_ok());
    Ok(())
}

// ============================================================================
//  CONCURRENCY AND TIMEOUTS
// ============================================================================

#[tokio::test]
async fn test_concurrent_calls_get_their_own_results() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.on("Test", "Echo", |call| Ok(call.argument(0).unwrap_or_default().to_vec()));
    let client = connect(&server).await;

    let mut tasks = Vec::new();
    for i in 0..64u32 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let call = client.build_call("Test", "Echo", vec![encode(&i)?]);
            let echoed: u32 = client.call(&call).await?;
            Ok::<_, kclient::Error>((i, echoed))
        }));
    }
    for task in tasks {
        let (sent, echoed) = task.await??;
        assert_eq!(sent, echoed);
    }
    Ok(())
}

#[tokio::test]
async fn test_random_payloads_echo() -> anyhow::Result<()> {
    use rand::Rng;
    use rand::RngCore;

    let server = MockServer::new();
    server.on("Test", "Echo", |call| Ok(call.argument(0).unwrap_or_default().to_vec()));
    let client = connect(&server).await;

    let mut rng = rand::thread_rng();
    for _ in 0..32 {
        let mut payload = vec![0u8; rng.gen_range(0..4096)];
        rng.fill_bytes(&mut payload);
        let sent = Bytes(payload);
        let call = client.build_call("Test", "Echo", vec![encode(&sent)?]);
        assert_eq!(client.call::<Bytes>(&call).await?, sent);
    }
    Ok(())
}

#[tokio::test]
async fn test_timeout_keeps_later_calls_aligned() -> anyhow::Result<()> {
    let server = MockServer::new();
    let slow = encode(&1u32)?;
    server.on_delayed("Test", "Slow", Duration::from_millis(300), move |_| Ok(slow.clone()));
    server.returns("Test", "Fast", &2u32)?;
    let client = connect(&server).await;

    let call = client.build_call("Test", "Slow", Vec::new());
    let err = client.invoke_with_timeout(&call, Duration::from_millis(30)).await.unwrap_err();
    assert!(matches!(err, Error::Timeout));

    // the late answer to the abandoned call must not be handed to this one
    let fast = client.build_call("Test", "Fast", Vec::new());
    assert_eq!(client.call::<u32>(&fast).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_call_timeout_from_config() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.on_delayed("Test", "Slow", Duration::from_millis(300), |_| Ok(Vec::new()));
    let config = ClientConfig::new("timeouts").call_timeout(Duration::from_millis(30));
    let client = server.connect_with(&config).await?;

    let err = client.invoke("Test", "Slow", Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    Ok(())
}

// ============================================================================
//  CONNECTION LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_server_disconnect_fails_pending_calls() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.on_delayed("Test", "Slow", Duration::from_secs(30), |_| Ok(Vec::new()));
    let client = connect(&server).await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.invoke("Test", "Slow", Vec::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.disconnect().await;

    let err = tokio::time::timeout(LONG, pending).await??.unwrap_err();
    assert!(err.is_disconnect());

    let err = client.invoke("Test", "Slow", Vec::new()).await.unwrap_err();
    assert!(err.is_disconnect());
    assert!(client.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_close_fails_in_flight_and_later_calls() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.on_delayed("Test", "Slow", Duration::from_secs(30), |_| Ok(Vec::new()));
    let client = connect(&server).await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.invoke("Test", "Slow", Vec::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.close().await;
    client.close().await;

    let err = tokio::time::timeout(LONG, pending).await??.unwrap_err();
    assert!(matches!(err, Error::Disconnected));
    assert!(client.invoke("Test", "Slow", Vec::new()).await.unwrap_err().is_disconnect());
    Ok(())
}

#[tokio::test]
async fn test_handshake_rejection() {
    let server = MockServer::new();
    server.reject_connections(ConnectionStatus::WrongType, "no clients today");
    let err = server.connect("refused").await.unwrap_err();
    match err {
        Error::Connection(message) => assert!(message.contains("no clients today")),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_long_client_name_rejected_before_connecting() {
    let server = MockServer::new();
    let err = server.connect(&"n".repeat(40)).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(server.session_count(), 0);
}

#[tokio::test]
async fn test_dropping_last_handle_closes_connection() -> anyhow::Result<()> {
    let server = MockServer::new();
    let client = connect(&server).await;
    client.krpc().get_client_name().await?;
    assert_eq!(server.session_count(), 1);

    drop(client);
    for _ in 0..50 {
        if server.session_count() == 0 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session still open after the client was dropped");
}

#[tokio::test]
async fn test_clients_shared_across_tasks() -> anyhow::Result<()> {
    let server = MockServer::new();
    server.returns("KRPC", "get_Paused", &true)?;
    let client = Arc::new(connect(&server).await);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.krpc().paused().await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await??);
    }
    Ok(())
}
