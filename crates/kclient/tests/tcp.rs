//! The full client over real sockets, served by the mock server.

mod common;

use std::sync::Arc;

use kclient::ClientConfig;
use kclient::Error;
use kclient::mock::MockServer;
use kclient::tcp::TcpTransport;
use kclient::transport::Transport;
use tokio::net::TcpListener;

use common::LONG;
use common::init_tracing;

/// Listens on loopback and serves the first client to connect. Without
/// `streams` only the rpc port is opened.
async fn serve_once(server: &MockServer, streams: bool) -> anyhow::Result<ClientConfig> {
    let rpc = TcpListener::bind("127.0.0.1:0").await?;
    let mut config = ClientConfig::new("tcp-client")
        .address("127.0.0.1")
        .rpc_port(rpc.local_addr()?.port());
    let stream = if streams {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        config = config.stream_port(listener.local_addr()?.port());
        Some(listener)
    } else {
        config = config.without_streams();
        None
    };

    let server = server.clone();
    tokio::spawn(async move {
        let Ok((rpc, _)) = rpc.accept().await else {
            return;
        };
        let Ok(rpc) = TcpTransport::from_stream(rpc) else {
            return;
        };
        let stream: Option<Arc<dyn Transport>> = match stream {
            Some(listener) => match listener.accept().await {
                Ok((socket, _)) => match TcpTransport::from_stream(socket) {
                    Ok(transport) => Some(Arc::new(transport)),
                    Err(_) => return,
                },
                Err(_) => return,
            },
            None => None,
        };
        server.serve(Arc::new(rpc), stream).await;
    });
    Ok(config)
}

#[tokio::test]
async fn test_invoke_and_stream_over_tcp() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::new();
    server.returns("KRPC", "get_Paused", &true)?;
    let config = serve_once(&server, true).await?;

    let client = kclient::connect(&config).await?;
    assert_eq!(client.identifier().len(), 16);
    assert_eq!(client.krpc().get_client_name().await?, "tcp-client");
    assert!(client.krpc().paused().await?);

    let paused = client.krpc().paused_stream().await?;
    assert!(paused.start_and_wait(Some(LONG)).await?);
    assert!(server.push(paused.id(), &false).await?);
    assert!(!paused.wait_for(|v| !*v, Some(LONG)).await?);

    client.close().await;
    assert!(client.krpc().paused().await.unwrap_err().is_disconnect());
    Ok(())
}

#[tokio::test]
async fn test_large_payload_over_tcp() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::new();
    server.on("Test", "Echo", |call| Ok(call.argument(0).unwrap_or_default().to_vec()));
    let config = serve_once(&server, false).await?;
    let client = kclient::connect(&config).await?;

    let blob = kclient::Bytes((0..200_000u32).map(|i| i as u8).collect());
    let call = client.build_call("Test", "Echo", vec![kclient::encode(&blob)?]);
    assert_eq!(client.call::<kclient::Bytes>(&call).await?, blob);
    Ok(())
}

#[tokio::test]
async fn test_connect_refused() {
    init_tracing();
    // bind then drop to find a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = kclient::connect(&ClientConfig::new("nobody").rpc_port(port).without_streams())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}
