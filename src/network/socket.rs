//! TCP connect prober

use super::{PortProber, ProbeOutcome};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Full-handshake connect prober. Needs no privileges.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnectProber;

impl TcpConnectProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PortProber for TcpConnectProber {
    async fn attempt(&self, target: SocketAddr, timeout: Duration) -> ProbeOutcome {
        // The stream, if any, is dropped (and closed) before returning.
        let result = tokio::time::timeout(timeout, TcpStream::connect(target))
            .await
            .ok();
        ProbeOutcome::classify(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{MemorySink, ScanEvent};
    use std::time::Instant;
    use tokio::net::TcpListener;

    /// A loopback port with nothing listening on it
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_listening_port_is_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let outcome = TcpConnectProber::new()
            .attempt(addr, Duration::from_secs(2))
            .await;
        assert_eq!(outcome, ProbeOutcome::Open);
    }

    #[tokio::test]
    async fn test_closed_port_is_not_open_within_timeout() {
        let port = closed_port().await;
        let timeout = Duration::from_millis(500);
        let sink = MemorySink::new();

        let start = Instant::now();
        let open = TcpConnectProber::new()
            .probe("127.0.0.1".parse().unwrap(), port, timeout, &sink)
            .await;

        assert!(!open);
        assert!(start.elapsed() < timeout + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_probe_emits_started_then_finished() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let sink = MemorySink::new();
        let address = "127.0.0.1".parse().unwrap();

        let open = TcpConnectProber::new()
            .probe(address, port, Duration::from_secs(2), &sink)
            .await;
        assert!(open);

        assert_eq!(
            sink.events(),
            vec![
                ScanEvent::ProbeStarted { address, port },
                ScanEvent::ProbeFinished {
                    address,
                    port,
                    outcome: ProbeOutcome::Open,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_socket_is_released_after_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        TcpConnectProber::new()
            .attempt(addr, Duration::from_secs(2))
            .await;

        // The prober's side is already closed, so the accepted peer reads EOF.
        let (mut peer, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1];
        let read = tokio::io::AsyncReadExt::read(&mut peer, &mut buf).await.unwrap();
        assert_eq!(read, 0);
    }
}
