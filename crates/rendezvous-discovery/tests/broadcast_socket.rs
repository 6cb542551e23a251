//! Integration test: UDP control channel on loopback.

use std::net::Ipv4Addr;
use std::time::Duration;

use rendezvous_discovery::{BroadcastSocket, ControlChannel};

fn free_udp_port() -> u16 {
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

#[tokio::test]
async fn socket_hears_its_own_frames() {
    let port = free_udp_port();
    let socket = BroadcastSocket::bind(port, Ipv4Addr::LOCALHOST).unwrap();
    assert_eq!(socket.destination().port(), port);
    assert_eq!(socket.local_addr().unwrap().port(), port);

    socket.send(b"discovery").unwrap();

    let mut buf = [0u8; 512];
    let n = tokio::time::timeout(Duration::from_secs(2), socket.recv(&mut buf))
        .await
        .expect("no frame within 2s")
        .unwrap();
    assert_eq!(&buf[..n], b"discovery");
}

#[tokio::test]
async fn two_sockets_can_share_the_port() {
    let port = free_udp_port();
    let _first = BroadcastSocket::bind(port, Ipv4Addr::LOCALHOST).unwrap();
    let second = BroadcastSocket::bind(port, Ipv4Addr::LOCALHOST);
    assert!(second.is_ok());
}
