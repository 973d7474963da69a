//! TCP P2P server.
//!
//! Accepted and dialed sockets go into one bounded work queue. A pool of
//! `max_connections` workers pulls from it, admits each connection into the
//! [`PeerRegistry`] and starts its [`PeerConnection`]. A poller reaps closed
//! peers every `polling_interval`.

use crate::config::P2pConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::peer::{Direction, PeerConnection, PeerEvents, PeerState};
use crate::transport::registry::{Admission, PeerRegistry};
use crate::utils::metrics::Metrics;
use crate::utils::shutdown;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// A socket waiting for a worker
#[derive(Debug)]
struct PendingConnection {
    stream: TcpStream,
    addr: SocketAddr,
    direction: Direction,
    /// Evict the oldest peer if the registry is full
    forced: bool,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    work_tx: mpsc::Sender<PendingConnection>,
    tasks: Vec<JoinHandle<()>>,
}

/// Everything a worker or the poller needs, cheap to clone
#[derive(Clone)]
struct Shared {
    registry: Arc<PeerRegistry>,
    events: Arc<dyn PeerEvents>,
    metrics: Arc<Metrics>,
    max_connections: usize,
    max_payload: usize,
}

/// P2P server: listener, worker pool, disconnect poller and peer registry
pub struct P2pServer {
    config: P2pConfig,
    shared: Shared,
    running: Mutex<Option<Running>>,
}

impl P2pServer {
    pub fn new(
        config: P2pConfig,
        registry: Arc<PeerRegistry>,
        events: Arc<dyn PeerEvents>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let shared = Shared {
            registry,
            events,
            metrics,
            max_connections: config.max_connections,
            max_payload: config.max_payload_size,
        };
        Self {
            config,
            shared,
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the listener and start the accept loop, the workers and the
    /// disconnect poller. Returns the bound address.
    #[instrument(skip(self), fields(address = %self.config.listen_address, port = self.config.port))]
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.running().is_some() {
            return Err(ProtocolError::Custom(constants::ERR_SERVER_RUNNING.into()));
        }

        let ip: std::net::IpAddr = self.config.listen_address.parse().map_err(|_| {
            ProtocolError::ConfigError(format!(
                "Invalid listen address: {}",
                self.config.listen_address
            ))
        })?;
        let listener = TcpListener::bind(SocketAddr::new(ip, self.config.port)).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown, _) = watch::channel(false);
        let (work_tx, work_rx) = mpsc::channel(self.config.max_connections.max(1));
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

        let mut tasks = Vec::with_capacity(self.config.max_connections + 2);
        tasks.push(tokio::spawn(accept_loop(
            listener,
            work_tx.clone(),
            shutdown.subscribe(),
        )));
        for worker_id in 0..self.config.max_connections {
            tasks.push(tokio::spawn(worker_loop(
                worker_id,
                work_rx.clone(),
                self.shared.clone(),
                shutdown.subscribe(),
            )));
        }
        tasks.push(tokio::spawn(poll_disconnects(
            self.shared.clone(),
            self.config.polling_interval,
            shutdown.subscribe(),
        )));

        let mut running = self.running();
        if running.is_some() {
            // Lost a race with a concurrent start
            shutdown.send_replace(true);
            return Err(ProtocolError::Custom(constants::ERR_SERVER_RUNNING.into()));
        }
        *running = Some(Running {
            local_addr,
            shutdown,
            work_tx,
            tasks,
        });

        info!(
            address = %local_addr,
            workers = self.config.max_connections,
            "P2P server listening"
        );
        Ok(local_addr)
    }

    /// Dial `addr` in the background; refused if the registry is full
    pub fn add_peer(&self, addr: SocketAddr) -> Result<()> {
        self.dial(addr, false)
    }

    /// Dial `addr` in the background, evicting the oldest peer if full
    pub fn force_add_peer(&self, addr: SocketAddr) -> Result<()> {
        self.dial(addr, true)
    }

    fn dial(&self, addr: SocketAddr, forced: bool) -> Result<()> {
        let (work_tx, mut shutdown) = {
            let running = self.running();
            let running = running
                .as_ref()
                .ok_or_else(|| ProtocolError::Custom(constants::ERR_SERVER_NOT_RUNNING.into()))?;
            (running.work_tx.clone(), running.shutdown.subscribe())
        };
        let timeout = self.config.connect_timeout;
        let metrics = self.shared.metrics.clone();

        tokio::spawn(async move {
            let connect = tokio::time::timeout(timeout, TcpStream::connect(addr));
            let stream = tokio::select! {
                _ = shutdown::signalled(&mut shutdown) => return,
                result = connect => match result {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        metrics.connection_error();
                        warn!(peer = %addr, error = %e, "Outgoing connection failed");
                        return;
                    }
                    Err(_) => {
                        metrics.connection_error();
                        warn!(peer = %addr, "{}", constants::ERR_CONNECT_TIMEOUT);
                        return;
                    }
                },
            };
            debug!(peer = %addr, forced, "Dialed peer");
            let pending = PendingConnection {
                stream,
                addr,
                direction: Direction::Outgoing,
                forced,
            };
            tokio::select! {
                _ = shutdown::signalled(&mut shutdown) => {}
                _ = work_tx.send(pending) => {}
            }
        });
        Ok(())
    }

    /// Queue `bytes` on every registered peer. Returns how many accepted it.
    pub fn broadcast(&self, bytes: Bytes) -> usize {
        self.shared
            .registry
            .snapshot()
            .iter()
            .filter(|peer| peer.send_raw(bytes.clone()).is_ok())
            .count()
    }

    /// Stop every task, dispose every peer and wait for all of it to finish.
    /// No callbacks fire once this returns.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let Some(running) = self.running().take() else {
            return;
        };
        info!(address = %running.local_addr, "Stopping P2P server");

        running.shutdown.send_replace(true);
        drop(running.work_tx);
        for task in running.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Server task ended abnormally");
            }
        }

        for peer in self.shared.registry.drain() {
            peer.dispose().await;
            self.shared.metrics.connection_closed();
        }
        info!("P2P server stopped");
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running().as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    pub fn peer_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn peers(&self) -> Vec<Arc<PeerConnection>> {
        self.shared.registry.snapshot()
    }
}

async fn accept_loop(
    listener: TcpListener,
    work_tx: mpsc::Sender<PendingConnection>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown::signalled(&mut shutdown) => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, addr)) => {
                debug!(peer = %addr, "Accepted connection");
                let pending = PendingConnection {
                    stream,
                    addr,
                    direction: Direction::Incoming,
                    forced: false,
                };
                tokio::select! {
                    _ = shutdown::signalled(&mut shutdown) => break,
                    sent = work_tx.send(pending) => if sent.is_err() { break },
                }
            }
            Err(e) => {
                error!(error = %e, "Error accepting connection");
            }
        }
    }
    debug!("Accept loop stopped");
}

async fn worker_loop(
    worker_id: usize,
    work_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PendingConnection>>>,
    shared: Shared,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let pending = tokio::select! {
            _ = shutdown::signalled(&mut shutdown) => break,
            next = async { work_rx.lock().await.recv().await } => match next {
                Some(pending) => pending,
                None => break,
            },
        };
        admit(worker_id, &shared, pending).await;
    }
    debug!(worker_id, "Worker stopped");
}

async fn admit(worker_id: usize, shared: &Shared, pending: PendingConnection) {
    let PendingConnection {
        stream,
        addr,
        direction,
        forced,
    } = pending;

    let state = PeerState::new(rand::random(), addr, direction);
    let admission = shared
        .registry
        .admit(shared.max_connections, forced, || {
            PeerConnection::spawn(
                stream,
                state,
                shared.max_payload,
                shared.events.clone(),
                shared.metrics.clone(),
            )
        });

    match admission {
        Admission::Refused => {
            shared.metrics.connection_refused();
            warn!(
                peer = %addr,
                max_connections = shared.max_connections,
                "Max connections reached, refusing peer"
            );
        }
        Admission::Added { peer, evicted } => {
            shared.metrics.connection_established();
            info!(worker_id, peer = %addr, ?direction, "Peer connected");
            if let Some(old) = evicted {
                info!(peer = %old.addr(), "Evicting peer to make room");
                old.dispose().await;
                shared.metrics.connection_closed();
                shared.events.peer_disconnected(&old);
            }
            shared.events.peer_connected(&peer);
        }
    }
}

async fn poll_disconnects(
    shared: Shared,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown::signalled(&mut shutdown) => break,
            _ = ticker.tick() => {
                for peer in shared.registry.take_closed() {
                    peer.dispose().await;
                    shared.metrics.connection_closed();
                    info!(peer = %peer.addr(), "Peer disconnected");
                    shared.events.peer_disconnected(&peer);
                }
            }
        }
    }
    debug!("Disconnect poller stopped");
}
