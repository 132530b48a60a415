//! Transport Module Tests
//!
//! Validates endpoint spec parsing, the heartbeat decoder, and listener
//! lifecycle over real sockets.
//!
//! ## Test Scopes
//! - **Endpoint Parsing**: Scheme dispatch, required parts, the unix `mode` option.
//! - **Decoder**: Required fields, defaults, the deterministic id fallback,
//!   scalar-only metadata.
//! - **Listeners**: Datagram and stream delivery, per-message failure isolation,
//!   stale socket replacement, deterministic resource release on stop.

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::events::bus::EventBus;
    use crate::registry::service::{Command, HeartbeatSender};
    use crate::registry::types::Heartbeat;
    use crate::transport::endpoint::{Endpoint, Scheme};
    use crate::transport::listener::Listener;
    use crate::transport::protocol;

    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    // ============================================================
    // ENDPOINT PARSING TESTS
    // ============================================================

    #[test]
    fn test_parse_udp_endpoint() {
        let endpoint = Endpoint::parse("udp://0.0.0.0:8888").expect("valid spec");

        assert_eq!(endpoint.scheme, Scheme::Udp);
        assert_eq!(endpoint.addr.as_deref(), Some("0.0.0.0:8888"));
        assert!(endpoint.path.is_none());
        assert_eq!(endpoint.spec, "udp://0.0.0.0:8888");
    }

    #[test]
    fn test_parse_tcp_endpoint() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:9999").expect("valid spec");

        assert_eq!(endpoint.scheme, Scheme::Tcp);
        assert_eq!(endpoint.addr.as_deref(), Some("127.0.0.1:9999"));
    }

    #[test]
    fn test_parse_unix_endpoint() {
        let endpoint = Endpoint::parse("unix:///var/run/heartbeat.sock").expect("valid spec");

        assert_eq!(endpoint.scheme, Scheme::Unix);
        assert_eq!(
            endpoint.path.as_deref(),
            Some(std::path::Path::new("/var/run/heartbeat.sock"))
        );
        assert!(endpoint.mode.is_none());
    }

    #[test]
    fn test_parse_unix_mode_option() {
        let endpoint = Endpoint::parse("unix:///tmp/hb.sock?mode=660").expect("valid spec");

        assert_eq!(endpoint.mode, Some(0o660), "mode is octal digits");
    }

    #[test]
    fn test_unknown_scheme_is_rejected() {
        let err = Endpoint::parse("sctp://0.0.0.0:8888").unwrap_err();

        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("sctp"), "error names the scheme");
    }

    #[test]
    fn test_missing_port_is_rejected() {
        let err = Endpoint::parse("udp://0.0.0.0").unwrap_err();

        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_missing_socket_path_is_rejected() {
        assert!(Endpoint::parse("unix://").is_err());
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        assert!(Endpoint::parse("unix:///tmp/hb.sock?mode=rwx").is_err());
        assert!(
            Endpoint::parse("unix:///tmp/hb.sock?mode=7777").is_err(),
            "mode beyond 777 is out of range"
        );
    }

    // ============================================================
    // DECODER TESTS
    // ============================================================

    #[test]
    fn test_decode_full_heartbeat() {
        let raw = br#"{
            "id": "w1",
            "service": "worker",
            "host": "host-1",
            "epoch": 42,
            "fresh": true,
            "metadata": {"pid": 4711, "version": "2.1.0"}
        }"#;

        let hb = protocol::decode(raw, "udp://0.0.0.0:8888").expect("valid heartbeat");

        assert_eq!(hb.id.as_str(), "w1");
        assert_eq!(hb.service, "worker");
        assert_eq!(hb.host, "host-1");
        assert_eq!(hb.epoch, 42);
        assert!(hb.fresh);
        assert_eq!(hb.metadata["pid"], serde_json::json!(4711));
        assert_eq!(hb.received_via, "udp://0.0.0.0:8888");
    }

    #[test]
    fn test_decode_minimal_heartbeat_defaults() {
        let raw = br#"{"service": "worker", "host": "host-1"}"#;

        let hb = protocol::decode(raw, "test").expect("valid heartbeat");

        assert_eq!(
            hb.id.as_str(),
            "worker@host-1",
            "missing id falls back to service@host"
        );
        assert_eq!(hb.epoch, 0);
        assert!(!hb.fresh);
        assert!(hb.metadata.is_empty());
    }

    #[test]
    fn test_decode_empty_id_uses_fallback() {
        let raw = br#"{"id": "", "service": "worker", "host": "host-1"}"#;

        let hb = protocol::decode(raw, "test").unwrap();
        assert_eq!(hb.id.as_str(), "worker@host-1");
    }

    #[test]
    fn test_decode_missing_service_fails() {
        let err = protocol::decode(br#"{"host": "host-1"}"#, "test").unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("service"), "error names the field");
    }

    #[test]
    fn test_decode_empty_host_fails() {
        let err = protocol::decode(br#"{"service": "worker", "host": ""}"#, "test").unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_decode_rejects_nested_metadata() {
        let raw = br#"{"service": "w", "host": "h", "metadata": {"tags": ["a", "b"]}}"#;

        let err = protocol::decode(raw, "test").unwrap_err();
        assert!(err.to_string().contains("tags"), "error names the metadata key");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            protocol::decode(b"not json at all", "test"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_payload() {
        let raw = vec![b'x'; protocol::MAX_PAYLOAD_BYTES + 1];
        assert!(protocol::decode(&raw, "test").is_err());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let raw = br#"{"service": "w", "host": "h", "interval": 10000}"#;
        assert!(protocol::decode(raw, "test").is_ok());
    }

    // ============================================================
    // LISTENER TESTS
    // ============================================================

    fn sink() -> (HeartbeatSender, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HeartbeatSender::new(tx), rx)
    }

    async fn next_heartbeat(rx: &mut mpsc::UnboundedReceiver<Command>) -> Heartbeat {
        let command = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for heartbeat")
            .expect("channel closed");

        match command {
            Command::Heartbeat(hb) => hb,
            _ => panic!("expected a heartbeat command"),
        }
    }

    #[tokio::test]
    async fn test_udp_listener_delivers_datagrams() {
        let (sender, mut rx) = sink();
        let bus = Arc::new(EventBus::new());

        let endpoint = Endpoint::parse("udp://127.0.0.1:0").unwrap();
        let listener = Listener::bind(endpoint, sender, bus).await.expect("bind");
        let addr = listener.local_addr().expect("bound addr");

        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(br#"{"id":"w1","service":"worker","host":"host-1"}"#, addr)
            .await
            .unwrap();

        let hb = next_heartbeat(&mut rx).await;
        assert_eq!(hb.id.as_str(), "w1");
        assert_eq!(hb.received_via, "udp://127.0.0.1:0");

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_udp_listener_survives_malformed_datagram() {
        let (sender, mut rx) = sink();
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe();

        let endpoint = Endpoint::parse("udp://127.0.0.1:0").unwrap();
        let listener = Listener::bind(endpoint, sender, bus).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(b"{broken", addr).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for error event")
            .unwrap();
        assert_eq!(event.name(), "error", "a bad datagram surfaces as an error event");

        // The next valid datagram still gets through.
        socket
            .send_to(br#"{"id":"w2","service":"worker","host":"host-1"}"#, addr)
            .await
            .unwrap();
        assert_eq!(next_heartbeat(&mut rx).await.id.as_str(), "w2");

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_tcp_connection_carries_sequential_heartbeats() {
        let (sender, mut rx) = sink();
        let bus = Arc::new(EventBus::new());

        let endpoint = Endpoint::parse("tcp://127.0.0.1:0").unwrap();
        let listener = Listener::bind(endpoint, sender, bus).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"{\"id\":\"w1\",\"service\":\"worker\",\"host\":\"h1\"}\n\
                  \n\
                  {\"id\":\"w2\",\"service\":\"worker\",\"host\":\"h1\"}\n",
            )
            .await
            .unwrap();
        stream.flush().await.unwrap();

        // Blank lines are skipped; both framed messages arrive in order.
        assert_eq!(next_heartbeat(&mut rx).await.id.as_str(), "w1");
        assert_eq!(next_heartbeat(&mut rx).await.id.as_str(), "w2");

        // Teardown carries no liveness meaning and the listener keeps
        // accepting new connections.
        drop(stream);

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"{\"id\":\"w3\",\"service\":\"worker\",\"host\":\"h1\"}\n")
            .await
            .unwrap();
        stream.flush().await.unwrap();

        assert_eq!(next_heartbeat(&mut rx).await.id.as_str(), "w3");

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_tcp_malformed_line_does_not_close_connection() {
        let (sender, mut rx) = sink();
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe();

        let endpoint = Endpoint::parse("tcp://127.0.0.1:0").unwrap();
        let listener = Listener::bind(endpoint, sender, bus).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"{broken}\n\
                  {\"id\":\"w1\",\"service\":\"worker\",\"host\":\"h1\"}\n",
            )
            .await
            .unwrap();
        stream.flush().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for error event")
            .unwrap();
        assert_eq!(event.name(), "error");

        assert_eq!(
            next_heartbeat(&mut rx).await.id.as_str(),
            "w1",
            "the line after a malformed one still decodes"
        );

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_unix_listener_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.sock");
        let spec = format!("unix://{}", path.display());

        let (sender, mut rx) = sink();
        let bus = Arc::new(EventBus::new());

        let endpoint = Endpoint::parse(&spec).unwrap();
        let listener = Listener::bind(endpoint, sender, bus).await.expect("bind unix");

        let mut stream = tokio::net::UnixStream::connect(&path).await.unwrap();
        stream
            .write_all(b"{\"id\":\"w1\",\"service\":\"worker\",\"host\":\"h1\"}\n")
            .await
            .unwrap();
        stream.flush().await.unwrap();

        assert_eq!(next_heartbeat(&mut rx).await.id.as_str(), "w1");

        listener.stop().await;
        assert!(!path.exists(), "stop must unlink the socket file");
    }

    #[tokio::test]
    async fn test_unix_stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.sock");
        std::fs::write(&path, b"stale").unwrap();

        let (sender, _rx) = sink();
        let bus = Arc::new(EventBus::new());

        let endpoint = Endpoint::parse(&format!("unix://{}", path.display())).unwrap();
        let listener = Listener::bind(endpoint, sender, bus)
            .await
            .expect("stale file must be unlinked before binding");

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_unix_mode_is_applied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.sock");
        let spec = format!("unix://{}?mode=600", path.display());

        let (sender, _rx) = sink();
        let bus = Arc::new(EventBus::new());

        let endpoint = Endpoint::parse(&spec).unwrap();
        let listener = Listener::bind(endpoint, sender, bus).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_configuration_error() {
        let (sender, _rx) = sink();
        let bus = Arc::new(EventBus::new());

        let endpoint = Endpoint::parse("tcp://127.0.0.1:0").unwrap();
        let listener = Listener::bind(endpoint, sender, bus.clone()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (sender2, _rx2) = sink();
        let taken = Endpoint::parse(&format!("tcp://127.0.0.1:{}", addr.port())).unwrap();
        let err = Listener::bind(taken, sender2, bus).await.unwrap_err();

        assert!(matches!(err, Error::Configuration { .. }));

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_udp_stop_releases_the_port() {
        let (sender, _rx) = sink();
        let bus = Arc::new(EventBus::new());

        let endpoint = Endpoint::parse("udp://127.0.0.1:0").unwrap();
        let listener = Listener::bind(endpoint, sender, bus.clone()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        listener.stop().await;

        // The port is free again once stop returns.
        let (sender2, _rx2) = sink();
        let endpoint = Endpoint::parse(&format!("udp://127.0.0.1:{}", addr.port())).unwrap();
        let listener = Listener::bind(endpoint, sender2, bus)
            .await
            .expect("port must be released deterministically");

        listener.stop().await;
    }
}
