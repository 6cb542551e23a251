//! Data-plane transport: one shared publish endpoint, one shared inbox.
//!
//! A [`DataPlane`] binds a TCP listener (cross-process) and a named inproc
//! endpoint (same-process) once, and every advertised topic is published
//! through them. Subscriptions are made per `(endpoint, topic)`; every
//! matching payload lands in the single [`Inbox`].

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rendezvous_types::Endpoint;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::ProtocolError;
use crate::frame::{DataMessage, FrameReader, FrameWriter};

/// A payload received for one of our subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Tuning for the data plane.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Capacity of the inbox and of each publisher fan-out queue.
    pub queue_depth: usize,
    /// Delay between attempts to (re)connect a subscriber link.
    pub reconnect_interval: Duration,
    /// Consecutive failed connects after which a link is abandoned.
    /// Zero retries forever.
    pub max_connect_failures: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_depth: 1024,
            reconnect_interval: Duration::from_millis(100),
            max_connect_failures: 50,
        }
    }
}

/// Receiving half of the data plane.
pub struct Inbox {
    rx: mpsc::Receiver<Delivery>,
}

impl Inbox {
    /// Wait for the next delivery. `None` once the data plane is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Take a delivery if one is already queued.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

/// Publishing and subscribing half of the data plane.
pub struct DataPlane {
    inproc: Endpoint,
    tcp: Endpoint,
    config: TransportConfig,
    local_topics: Arc<Mutex<HashSet<String>>>,
    inbox_tx: mpsc::Sender<Delivery>,
    fanout: broadcast::Sender<DataMessage>,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    live_links: Arc<AtomicUsize>,
}

impl DataPlane {
    /// Bind the shared publish endpoints.
    ///
    /// The TCP listener takes an ephemeral port on `ip`; the inproc endpoint
    /// is `inproc://<inproc_name>`.
    pub async fn bind(
        ip: IpAddr,
        inproc_name: &str,
        config: TransportConfig,
    ) -> Result<(Self, Inbox), ProtocolError> {
        let inproc: Endpoint = format!("inproc://{inproc_name}")
            .parse()
            .map_err(|e| ProtocolError::Connection(format!("invalid inproc name: {e}")))?;

        let listener = TcpListener::bind(SocketAddr::new(ip, 0)).await?;
        let tcp = Endpoint::Tcp(listener.local_addr()?);

        let (inbox_tx, inbox_rx) = mpsc::channel(config.queue_depth);
        let (fanout, _) = broadcast::channel(config.queue_depth);
        let (shutdown, _) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            fanout.clone(),
            shutdown.subscribe(),
        ));

        info!(inproc = %inproc, tcp = %tcp, "data plane bound");
        let plane = Self {
            inproc,
            tcp,
            config,
            local_topics: Arc::new(Mutex::new(HashSet::new())),
            inbox_tx,
            fanout,
            shutdown,
            accept_task,
            live_links: Arc::new(AtomicUsize::new(0)),
        };
        Ok((plane, Inbox { rx: inbox_rx }))
    }

    /// The endpoints every local publisher is reachable at, inproc first.
    pub fn publish_endpoints(&self) -> Vec<Endpoint> {
        vec![self.inproc.clone(), self.tcp.clone()]
    }

    pub fn inproc_endpoint(&self) -> &Endpoint {
        &self.inproc
    }

    pub fn tcp_endpoint(&self) -> &Endpoint {
        &self.tcp
    }

    /// Subscribe to `topic` at a publisher endpoint.
    ///
    /// Inproc subscriptions take effect immediately. TCP links are made in
    /// the background and retried until the data plane closes or
    /// `max_connect_failures` connects in a row fail.
    pub fn connect_subscribe(&self, endpoint: &Endpoint, topic: &str) -> Result<(), ProtocolError> {
        match endpoint {
            Endpoint::Inproc(_) => {
                if endpoint != &self.inproc {
                    return Err(ProtocolError::UnknownInproc(endpoint.to_string()));
                }
                self.local_topics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(topic.to_string());
                debug!(topic, "inproc subscription added");
            }
            Endpoint::Tcp(addr) => {
                let link = Link {
                    addr: *addr,
                    topic: topic.to_string(),
                    inbox: self.inbox_tx.clone(),
                    reconnect_interval: self.config.reconnect_interval,
                    max_connect_failures: self.config.max_connect_failures,
                    _live: LiveLink::new(&self.live_links),
                };
                tokio::spawn(link.run(self.shutdown.subscribe()));
                debug!(topic, address = %addr, "tcp subscriber link started");
            }
        }
        Ok(())
    }

    /// Publish `payload` on `topic` to every subscribed link.
    ///
    /// Never blocks: payloads that cannot be queued are dropped.
    pub fn send(&self, topic: &str, payload: &[u8]) {
        let local = self
            .local_topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(topic);
        if local {
            let delivery = Delivery {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            };
            match self.inbox_tx.try_send(delivery) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(topic, "inbox full, dropping inproc delivery");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(topic, "inbox closed, dropping inproc delivery");
                }
            }
        }

        let msg = DataMessage::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        if self.fanout.send(msg).is_err() {
            trace!(topic, "no tcp subscribers connected");
        }
    }

    /// Number of TCP subscriber links still running.
    pub fn live_links(&self) -> usize {
        self.live_links.load(Ordering::SeqCst)
    }

    /// Stop accepting peers and tear down every link.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
        self.accept_task.abort();
        info!("data plane closed");
    }
}

impl Drop for DataPlane {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    fanout: broadcast::Sender<DataMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            result = listener.accept() => match result {
                Ok((stream, remote)) => {
                    debug!(remote = %remote, "subscriber connected");
                    tokio::spawn(serve_subscriber(
                        stream,
                        remote,
                        fanout.subscribe(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
}

/// Forward published frames to one connected subscriber.
async fn serve_subscriber(
    stream: TcpStream,
    remote: SocketAddr,
    mut published: broadcast::Receiver<DataMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();
    let mut writer = FrameWriter::new(write_half);

    // Reads are not cancel-safe, so filters arrive through their own task.
    let (filter_tx, mut filter_rx) = mpsc::channel::<String>(16);
    let reader_task = tokio::spawn(read_filters(FrameReader::new(read_half), remote, filter_tx));
    let mut topics: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            filter = filter_rx.recv() => match filter {
                Some(topic) => {
                    debug!(remote = %remote, topic = %topic, "subscriber filter added");
                    topics.insert(topic);
                }
                None => {
                    debug!(remote = %remote, "subscriber disconnected");
                    break;
                }
            },
            outgoing = published.recv() => match outgoing {
                Ok(msg) => {
                    let wanted = matches!(&msg, DataMessage::Publish { topic, .. } if topics.contains(topic));
                    if wanted {
                        if let Err(e) = writer.send(&msg).await {
                            debug!(remote = %remote, error = %e, "write to subscriber failed");
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(remote = %remote, skipped, "subscriber too slow, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    reader_task.abort();
}

async fn read_filters(
    mut reader: FrameReader<tokio::net::tcp::OwnedReadHalf>,
    remote: SocketAddr,
    filters: mpsc::Sender<String>,
) {
    loop {
        match reader.recv::<DataMessage>().await {
            Ok(Some(DataMessage::Subscribe { topic })) => {
                if filters.send(topic).await.is_err() {
                    return;
                }
            }
            Ok(Some(DataMessage::Publish { .. })) => {
                trace!(remote = %remote, "ignoring publish from subscriber");
            }
            Ok(None) => return,
            Err(e) => {
                debug!(remote = %remote, error = %e, "subscriber link failed");
                return;
            }
        }
    }
}

/// Counts a running link for [`DataPlane::live_links`].
struct LiveLink(Arc<AtomicUsize>);

impl LiveLink {
    fn new(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for LiveLink {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A subscriber link to one publisher endpoint.
struct Link {
    addr: SocketAddr,
    topic: String,
    inbox: mpsc::Sender<Delivery>,
    reconnect_interval: Duration,
    max_connect_failures: u32,
    _live: LiveLink,
}

impl Link {
    /// Keep the link alive until shutdown, or until the publisher has been
    /// unreachable for `max_connect_failures` attempts in a row.
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut failures = 0u32;
        loop {
            if *shutdown.borrow() || self.inbox.is_closed() {
                return;
            }
            match TcpStream::connect(self.addr).await {
                Ok(stream) => {
                    failures = 0;
                    let linked = link_once(self.addr, stream, &self.topic, &self.inbox, &mut shutdown);
                    match linked.await {
                        Ok(()) => {
                            debug!(address = %self.addr, topic = %self.topic, "publisher link closed");
                        }
                        Err(e) => {
                            debug!(address = %self.addr, topic = %self.topic, error = %e, "publisher link failed");
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    debug!(
                        address = %self.addr,
                        topic = %self.topic,
                        error = %e,
                        failures,
                        "connect failed"
                    );
                    if self.max_connect_failures > 0 && failures >= self.max_connect_failures {
                        warn!(
                            address = %self.addr,
                            topic = %self.topic,
                            failures,
                            "publisher unreachable, giving up on link"
                        );
                        return;
                    }
                }
            }
            tokio::select! {
                _ = shutdown.changed() => return,
                () = tokio::time::sleep(self.reconnect_interval) => {}
            }
        }
    }
}

async fn link_once(
    addr: SocketAddr,
    stream: TcpStream,
    topic: &str,
    inbox: &mpsc::Sender<Delivery>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), ProtocolError> {
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    // The write half stays open for the life of the link; dropping it would
    // look like a disconnect to the publisher.
    let mut writer = FrameWriter::new(write_half);
    writer
        .send(&DataMessage::Subscribe {
            topic: topic.to_string(),
        })
        .await?;
    info!(address = %addr, topic, "linked to publisher");

    let mut reader = FrameReader::new(read_half);
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            msg = reader.recv::<DataMessage>() => match msg? {
                None => return Ok(()),
                Some(DataMessage::Publish { topic: received, payload }) if received == topic => {
                    let delivery = Delivery { topic: received, payload };
                    if inbox.send(delivery).await.is_err() {
                        return Ok(());
                    }
                }
                Some(other) => trace!(?other, "ignoring unexpected frame"),
            },
        }
    }
}
