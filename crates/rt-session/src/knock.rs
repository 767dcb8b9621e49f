//! Port knocking before connect

use std::net::SocketAddr;
use std::time::Duration;

use rt_core::config::{KnockProtocol, KnockStep};
use tokio::net::{lookup_host, TcpStream, UdpSocket};

/// How long a single TCP knock waits before moving on
pub const KNOCK_TIMEOUT: Duration = Duration::from_millis(100);

async fn resolve(address: &str, port: u16) -> Option<SocketAddr> {
    lookup_host((address, port)).await.ok()?.next()
}

async fn knock_tcp(target: SocketAddr) {
    let _ = tokio::time::timeout(KNOCK_TIMEOUT, TcpStream::connect(target)).await;
}

async fn knock_udp(target: SocketAddr) {
    let bind: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    if let Ok(socket) = UdpSocket::bind(bind).await {
        let _ = socket.send_to(&[], target).await;
    }
}

/// Hit each port of `steps` on `address` in order.
///
/// Fire-and-forget: failures are ignored and never stop the sequence.
pub async fn knock(address: &str, steps: &[KnockStep]) {
    for step in steps {
        let Some(target) = resolve(address, step.port).await else {
            tracing::debug!("Knock target {}:{} did not resolve", address, step.port);
            continue;
        };
        match step.protocol {
            KnockProtocol::Tcp => knock_tcp(target).await,
            KnockProtocol::Udp => knock_udp(target).await,
        }
    }
    tracing::debug!("Knocked {} ports on {}", steps.len(), address);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_knocks_reach_listeners_in_order() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let steps = [
            KnockStep {
                protocol: KnockProtocol::Tcp,
                port: first.local_addr().unwrap().port(),
            },
            KnockStep {
                protocol: KnockProtocol::Tcp,
                port: second.local_addr().unwrap().port(),
            },
        ];

        knock("127.0.0.1", &steps).await;

        assert!(first.accept().await.is_ok());
        assert!(second.accept().await.is_ok());
    }

    #[tokio::test]
    async fn test_udp_knock_sends_datagram() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let steps = [KnockStep {
            protocol: KnockProtocol::Udp,
            port: socket.local_addr().unwrap().port(),
        }];

        knock("127.0.0.1", &steps).await;

        let mut buf = [0u8; 8];
        let (len, _) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, 0);
    }
}
