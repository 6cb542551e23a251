//! Integration tests: data plane over loopback TCP and inproc.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rendezvous_protocol::{DataPlane, Delivery, Inbox, ProtocolError, TransportConfig};
use rendezvous_types::Endpoint;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

async fn bind(name: &str) -> (DataPlane, Inbox) {
    DataPlane::bind(LOOPBACK, name, TransportConfig::default())
        .await
        .unwrap()
}

/// Publish repeatedly until the subscriber sees something, since the link
/// is established in the background.
async fn publish_until_received(
    publisher: &DataPlane,
    inbox: &mut Inbox,
    topic: &str,
    payload: &[u8],
) -> Delivery {
    for _ in 0..100 {
        publisher.send(topic, payload);
        if let Ok(Some(delivery)) =
            tokio::time::timeout(Duration::from_millis(50), inbox.recv()).await
        {
            return delivery;
        }
    }
    panic!("no delivery on {topic} within 5s");
}

#[tokio::test]
async fn tcp_subscriber_receives_published_payload() {
    let (publisher, _publisher_inbox) = bind("pub").await;
    let (subscriber, mut inbox) = bind("sub").await;

    assert!(matches!(publisher.tcp_endpoint(), Endpoint::Tcp(addr) if addr.port() != 0));

    subscriber
        .connect_subscribe(publisher.tcp_endpoint(), "temp")
        .unwrap();

    let delivery = publish_until_received(&publisher, &mut inbox, "temp", b"23.5").await;
    assert_eq!(delivery.topic, "temp");
    assert_eq!(delivery.payload, b"23.5");
}

#[tokio::test]
async fn tcp_link_only_forwards_its_topic() {
    let (publisher, _publisher_inbox) = bind("pub").await;
    let (subscriber, mut inbox) = bind("sub").await;

    subscriber
        .connect_subscribe(publisher.tcp_endpoint(), "temp")
        .unwrap();
    publish_until_received(&publisher, &mut inbox, "temp", b"warmup").await;

    for i in 0..10u8 {
        publisher.send("humidity", &[i]);
        publisher.send("temp", &[i]);
    }

    for i in 0..10u8 {
        let delivery = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        if delivery.payload == b"warmup" {
            continue;
        }
        assert_eq!(delivery.topic, "temp");
        assert!(delivery.payload[0] <= i);
    }
}

#[tokio::test]
async fn inproc_subscription_is_immediate() {
    let (plane, mut inbox) = bind("topics").await;

    plane
        .connect_subscribe(plane.inproc_endpoint(), "temp")
        .unwrap();
    plane.send("temp", b"23.5");
    plane.send("other", b"ignored");

    let delivery = inbox.try_recv().unwrap();
    assert_eq!(delivery.topic, "temp");
    assert_eq!(delivery.payload, b"23.5");
    assert!(inbox.try_recv().is_none());
}

#[tokio::test]
async fn foreign_inproc_endpoint_is_rejected() {
    let (plane, _inbox) = bind("topics").await;

    let err = plane
        .connect_subscribe(&Endpoint::Inproc("elsewhere".to_string()), "temp")
        .unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownInproc(_)));
}

#[tokio::test]
async fn publish_endpoints_list_inproc_first() {
    let (plane, _inbox) = bind("topics").await;

    let endpoints = plane.publish_endpoints();
    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].to_string(), "inproc://topics");
    assert!(endpoints[1].to_string().starts_with("tcp://127.0.0.1:"));
}

#[tokio::test]
async fn unreachable_publisher_link_is_abandoned() {
    let config = TransportConfig {
        reconnect_interval: Duration::from_millis(10),
        max_connect_failures: 3,
        ..TransportConfig::default()
    };
    let (subscriber, _inbox) = DataPlane::bind(LOOPBACK, "sub", config).await.unwrap();

    // A port nothing listens on any more, as after a publisher restart.
    let dead = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let (publisher, _publisher_inbox) = bind("pub").await;
    subscriber
        .connect_subscribe(&Endpoint::Tcp(dead_addr), "temp")
        .unwrap();
    subscriber
        .connect_subscribe(publisher.tcp_endpoint(), "temp")
        .unwrap();
    assert_eq!(subscriber.live_links(), 2);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while subscriber.live_links() > 1 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "dead link still retrying"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The reachable link is unaffected.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(subscriber.live_links(), 1);
}
