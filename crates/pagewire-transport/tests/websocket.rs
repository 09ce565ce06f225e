//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with a `tokio-tungstenite` client (or a raw TCP stream for the status
//! banner).

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;

    use pagewire_transport::{
        Connection, Handshake, Transport, TransportError, WebSocketConnection,
        WebSocketTransport,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_tungstenite::tungstenite::Message;

    async fn connect_client(
        addr: &str,
    ) -> tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    > {
        let url = format!("ws://{addr}");
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("client should connect");
        ws
    }

    /// Accepts one peer and drives its handshake to a connection.
    async fn accept_ws(transport: &mut WebSocketTransport) -> WebSocketConnection {
        transport
            .accept()
            .await
            .expect("should accept")
            .complete()
            .await
            .expect("handshake should succeed")
            .expect("should be a websocket connection")
    }

    async fn bind_local() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind_local().await;

        let server_handle = tokio::spawn(async move { accept_ws(&mut transport).await });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.expect("task should complete");

        assert_eq!(server_conn.id().as_str().len(), 20);

        // UTF-8 payloads go out as text frames.
        server_conn
            .send(br#"{"event":"get-pages","data":[]}"#)
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(
            msg.into_text().unwrap().as_str(),
            r#"{"event":"get-pages","data":[]}"#
        );

        client_ws
            .send(Message::Text("hello from client".to_string().into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind_local().await;

        let server_handle = tokio::spawn(async move { accept_ws(&mut transport).await });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_send_is_not_blocked_by_pending_recv() {
        let (mut transport, addr) = bind_local().await;

        let server_handle = tokio::spawn(async move { accept_ws(&mut transport).await });
        let mut client_ws = connect_client(&addr).await;
        let server_conn =
            std::sync::Arc::new(server_handle.await.unwrap());

        // Park a reader on the connection, then send from another task.
        let reader = std::sync::Arc::clone(&server_conn);
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            server_conn.send(b"ping"),
        )
        .await
        .expect("send must not wait for recv")
        .expect("send should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"ping");
        pending.abort();
    }

    #[tokio::test]
    async fn test_plain_http_request_gets_status_banner() {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind")
            .with_status_banner("pagewire  ---> start at port 8800");
        let addr = transport.local_addr().unwrap().to_string();
        let mut transport = transport;

        // The handshake answers with the banner and yields no connection.
        let accept = tokio::spawn(async move {
            transport.accept().await.unwrap().complete().await
        });

        let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("text/plain"));
        assert!(response.ends_with("pagewire  ---> start at port 8800"));
        assert!(matches!(accept.await.unwrap(), Ok(None)));
    }

    #[tokio::test]
    async fn test_websocket_still_accepted_with_status_banner() {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind")
            .with_status_banner("banner");
        let addr = transport.local_addr().unwrap().to_string();
        let mut transport = transport;

        let server_handle = tokio::spawn(async move { accept_ws(&mut transport).await });
        let _client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();
        assert!(!server_conn.id().as_str().is_empty());
    }

    #[tokio::test]
    async fn test_accept_is_not_held_up_by_silent_peer() {
        let (mut transport, addr) = bind_local().await;

        let _silent = tokio::net::TcpStream::connect(&addr).await.unwrap();
        let stalled = transport.accept().await.expect("should accept");

        let client = tokio::spawn({
            let addr = addr.clone();
            async move { connect_client(&addr).await }
        });
        let conn = tokio::time::timeout(
            Duration::from_secs(2),
            accept_ws(&mut transport),
        )
        .await
        .expect("second peer must not wait on the first");

        assert!(!conn.id().as_str().is_empty());
        let _client_ws = client.await.unwrap();
        drop(stalled);
    }

    #[tokio::test]
    async fn test_silent_peer_handshake_times_out() {
        let (transport, addr) = bind_local().await;
        let mut transport = transport
            .with_status_banner("banner")
            .with_handshake_timeout(Duration::from_millis(100));

        let _silent = tokio::net::TcpStream::connect(&addr).await.unwrap();
        let pending = transport.accept().await.expect("should accept");

        let result = tokio::time::timeout(Duration::from_secs(2), pending.complete())
            .await
            .expect("handshake must give up on its own");
        assert!(matches!(
            result,
            Err(TransportError::HandshakeTimeout(d)) if d == Duration::from_millis(100)
        ));
    }
}
