use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use quay_codec::Value;
use quay_wire::{Packet, WireError, WireStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OnceCell, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{
    CallError, Config, DispatchError, DockError, ProxyRegistry, Signaler, SlotDecl,
    peer::{PeerConn, spawn_heartbeat},
};

/// A worker node: hosts local signalers behind an acceptor and calls
/// remote slots through lazily dialed peer connections.
///
/// Startup registers the hosted slot names with the hub, binds the
/// acceptor on the port the hub assigns, and prefetches addresses for the
/// declared imports. Slot resolution after that is lazy: the first call
/// on a slot queries the hub, dials the hosting dock (single-flight per
/// address), and confirms the import before the request goes out. When a
/// peer connection dies its cached routes die with it, so the next call
/// re-queries the hub rather than retrying itself.
#[derive(Clone)]
pub struct Dock {
    inner: Arc<DockInner>,
}

/// Caller-side binding a generated proxy holds; its two methods are the
/// primitives proxy code targets.
#[derive(Clone)]
pub struct SlotHandle {
    inner: Arc<DockInner>,
}

impl SlotHandle {
    /// Fire-and-forget invocation; returns once the request frame is on
    /// the wire.
    pub async fn call(
        &self,
        slot: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<(), CallError> {
        self.inner.invoke(slot, method, args, false).await.map(|_| ())
    }

    /// Invocation that blocks for the correlated response.
    pub async fn call_with_result(
        &self,
        slot: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, CallError> {
        self.inner.invoke(slot, method, args, true).await
    }
}

struct DockInner {
    tag: String,
    config: Config,
    local_addr: SocketAddr,
    local: HashMap<String, Arc<dyn Signaler>>,
    imports: Vec<String>,
    registry: ProxyRegistry,
    hub: HubLink,
    /// Lookup-or-dial is single-flight per address: concurrent callers
    /// share the cell and at most one dials.
    peers: Mutex<HashMap<String, Arc<OnceCell<Arc<PeerConn>>>>>,
    /// Cached slot → address resolutions; invalidated when the peer dies.
    routes: Mutex<HashMap<String, String>>,
    proxies: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Dock {
    /// Connects to the hub, registers the hosted slots, and brings the
    /// dock up. Any failure here is fatal: a dock that cannot register
    /// must not serve.
    pub async fn startup(
        hub_addr: &str,
        tag: &str,
        slots: Vec<SlotDecl>,
        registry: ProxyRegistry,
        config: Config,
    ) -> Result<Dock, DockError> {
        let mut local: HashMap<String, Arc<dyn Signaler>> = HashMap::new();
        let mut imports = Vec::new();
        for decl in slots {
            let (name, implementation) = decl.into_parts();
            match implementation {
                Some(imp) => {
                    if local.insert(name.clone(), imp).is_some() {
                        return Err(DockError::Registration(format!(
                            "duplicate local slot: {name}"
                        )));
                    }
                }
                None => imports.push(name),
            }
        }

        let stream = TcpStream::connect(hub_addr).await?;
        let wire = WireStream::new(stream);

        let names: Vec<String> = local.keys().cloned().collect();
        wire.send(&Packet::RegisterRequest { slots: names }).await?;
        let port = loop {
            match wire.recv().await? {
                Packet::HubRegisterResponse { port } => break port,
                Packet::Error { message } => return Err(DockError::Registration(message)),
                Packet::Heartbeat => continue,
                other => {
                    return Err(DockError::Registration(format!(
                        "unexpected reply kind {} to registration",
                        other.kind()
                    )));
                }
            }
        };

        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, _) = watch::channel(false);
        let inner = Arc::new(DockInner {
            tag: tag.to_owned(),
            config,
            local_addr,
            local,
            imports,
            registry,
            hub: HubLink::new(wire.clone()),
            peers: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
            proxies: Mutex::new(HashMap::new()),
            shutdown_tx,
        });

        spawn_heartbeat(
            wire.clone(),
            inner.config.heartbeat_interval,
            inner.shutdown_tx.subscribe(),
        );
        tokio::spawn(hub_read_loop(
            inner.clone(),
            wire,
            inner.shutdown_tx.subscribe(),
        ));
        tokio::spawn(accept_loop(
            inner.clone(),
            listener,
            inner.shutdown_tx.subscribe(),
        ));

        // Warm the route cache for declared imports. Misses are fine: the
        // hosting dock may simply not have started yet, and calls resolve
        // lazily anyway.
        if !inner.imports.is_empty() {
            match inner.hub.import(&inner.imports).await {
                Ok(addrs) => {
                    let mut routes = inner.routes.lock();
                    for (name, addr) in inner.imports.iter().zip(addrs) {
                        if !addr.is_empty() {
                            routes.insert(name.clone(), addr);
                        }
                    }
                }
                Err(e) => debug!(error = %e, "import prefetch failed"),
            }
        }

        info!(tag = %inner.tag, addr = %local_addr, slots = inner.local.len(), "dock started");
        Ok(Dock { inner })
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    /// Address of this dock's acceptor, as peers will see it.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// The call binding handed to generated proxies.
    pub fn handle(&self) -> SlotHandle {
        SlotHandle {
            inner: self.inner.clone(),
        }
    }

    /// Resolves a registered proxy for an imported slot, constructing it
    /// on first use. `T` is the concrete proxy type the registry's maker
    /// produces for `name`.
    pub fn visit<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let proxy = {
            let mut proxies = self.inner.proxies.lock();
            match proxies.get(name) {
                Some(existing) => existing.clone(),
                None => {
                    let made = self.inner.registry.make(name, self.handle())?;
                    let arc: Arc<dyn Any + Send + Sync> = Arc::from(made);
                    proxies.insert(name.to_owned(), arc.clone());
                    arc
                }
            }
        };
        proxy.downcast::<T>().ok()
    }

    /// Graceful shutdown: stops the acceptor, drops the hub link, and
    /// tears down peer connections. In-flight inbound dispatches finish;
    /// in-flight outbound calls fail with a connection reset.
    pub fn close(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.hub.shutdown();
        self.inner.peers.lock().clear();
        info!(tag = %self.inner.tag, "dock closed");
    }

    /// Resolves once [`close`](Dock::close) has been called; the blocking
    /// form of running a dock.
    pub async fn closed(&self) {
        let mut rx = self.inner.shutdown_tx.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl DockInner {
    async fn invoke(
        self: &Arc<Self>,
        slot: &str,
        method: &str,
        args: Vec<Value>,
        want_result: bool,
    ) -> Result<Vec<Value>, CallError> {
        let addr = self.route(slot).await?;
        let conn = self.peer_conn(&addr).await?;
        conn.ensure_import(slot).await?;

        if want_result {
            conn.call_with_result(slot, method, args, self.config.call_timeout)
                .await
        } else {
            conn.call(slot, method, args).await.map(|_| Vec::new())
        }
    }

    async fn route(&self, slot: &str) -> Result<String, CallError> {
        if let Some(addr) = self.routes.lock().get(slot) {
            return Ok(addr.clone());
        }
        let addr = self.hub.query(slot).await?;
        debug!(slot = %slot, addr = %addr, "resolved slot");
        self.routes.lock().insert(slot.to_owned(), addr.clone());
        Ok(addr)
    }

    async fn peer_conn(self: &Arc<Self>, addr: &str) -> Result<Arc<PeerConn>, CallError> {
        let cell = {
            let mut peers = self.peers.lock();
            peers
                .entry(addr.to_owned())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let conn = cell
            .get_or_try_init(|| {
                let weak = Arc::downgrade(self);
                let addr = addr.to_owned();
                let shutdown = self.shutdown_tx.subscribe();
                async move {
                    let on_dead = {
                        let addr = addr.clone();
                        move || {
                            if let Some(inner) = Weak::upgrade(&weak) {
                                inner.forget_peer(&addr);
                            }
                        }
                    };
                    PeerConn::connect(addr, &self.config, shutdown, on_dead).await
                }
            })
            .await?
            .clone();

        // The cell can briefly hold a dead connection before its exit
        // handler removes it from the map.
        if conn.is_closed() {
            return Err(CallError::ConnectionReset);
        }
        Ok(conn)
    }

    fn forget_peer(&self, addr: &str) {
        self.peers.lock().remove(addr);
        self.routes.lock().retain(|_, a| a != addr);
        debug!(addr = %addr, "peer connection gone, routes invalidated");
    }
}

/// Control-link reader: routes hub replies to their FIFO waiters.
async fn hub_read_loop(
    inner: Arc<DockInner>,
    wire: WireStream,
    mut shutdown: watch::Receiver<bool>,
) {
    let cutoff = inner.config.idle_cutoff();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            outcome = tokio::time::timeout(cutoff, wire.recv()) => match outcome {
                Err(_) => {
                    debug!(tag = %inner.tag, "hub link idle past cutoff, closing");
                    break;
                }
                Ok(Ok(Packet::Heartbeat)) => {}
                Ok(Ok(
                    pkt @ (Packet::QueryResponse { .. }
                    | Packet::ImportResponse { .. }
                    | Packet::Error { .. }),
                )) => inner.hub.deliver(pkt),
                Ok(Ok(other)) => {
                    debug!(kind = other.kind(), "ignoring unexpected packet from hub");
                }
                Ok(Err(WireError::Closed)) => break,
                Ok(Err(e)) => {
                    warn!(tag = %inner.tag, error = %e, "hub link failed");
                    break;
                }
            },
        }
    }
    inner.hub.shutdown();
    if !*shutdown.borrow() {
        warn!(tag = %inner.tag, "hub link lost; unresolved slots will fail until it returns");
    }
}

async fn accept_loop(
    inner: Arc<DockInner>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_peer(
                        inner.clone(),
                        stream,
                        peer,
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!(tag = %inner.tag, error = %e, "accept failed");
                }
            },
        }
    }
}

/// Serving side of a peer connection: answers imports against the local
/// slot set and dispatches inbound RPC. Dispatch runs on its own task so
/// a slow signaler never stalls this reader.
async fn serve_peer(
    inner: Arc<DockInner>,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let wire = WireStream::new(stream);
    spawn_heartbeat(
        wire.clone(),
        inner.config.heartbeat_interval,
        shutdown.clone(),
    );
    let cutoff = inner.config.idle_cutoff();

    loop {
        let packet = tokio::select! {
            _ = shutdown.changed() => break,
            outcome = tokio::time::timeout(cutoff, wire.recv()) => match outcome {
                Err(_) => {
                    debug!(peer = %peer, "inbound connection idle past cutoff, closing");
                    break;
                }
                Ok(Ok(packet)) => packet,
                Ok(Err(WireError::Closed)) => break,
                Ok(Err(e)) => {
                    warn!(peer = %peer, error = %e, "inbound connection failed");
                    break;
                }
            },
        };

        match packet {
            Packet::RpcRequest {
                index,
                slot,
                method,
                args,
                want_result,
            } => {
                let signaler = inner.local.get(&slot).cloned();
                let wire = wire.clone();
                tokio::spawn(async move {
                    let outcome = match &signaler {
                        // A panicking signaler reports in-band like any
                        // other dispatch failure; the connection survives.
                        Some(s) => std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            s.dispatch(&method, &args)
                        }))
                        .unwrap_or_else(|panic| Err(DispatchError::App(panic_message(&panic)))),
                        None => Err(DispatchError::UnknownSlot(slot.clone())),
                    };
                    if want_result {
                        let (result, err) = match outcome {
                            Ok(result) => (result, String::new()),
                            Err(e) => (Vec::new(), e.to_string()),
                        };
                        let response = Packet::RpcResponse {
                            index,
                            slot,
                            method,
                            result,
                            err,
                        };
                        if let Err(e) = wire.send(&response).await {
                            debug!(error = %e, "failed to deliver rpc response");
                        }
                    } else if let Err(e) = outcome {
                        debug!(slot = %slot, method = %method, error = %e, "fire-and-forget dispatch failed");
                    }
                });
            }
            Packet::ImportRequest { slots } => {
                let docks = slots
                    .iter()
                    .map(|s| {
                        if inner.local.contains_key(s) {
                            s.clone()
                        } else {
                            String::new()
                        }
                    })
                    .collect();
                if wire.send(&Packet::ImportResponse { docks }).await.is_err() {
                    break;
                }
            }
            Packet::Heartbeat => {}
            Packet::Error { message } => {
                warn!(peer = %peer, error = %message, "peer reported error");
            }
            other => {
                debug!(peer = %peer, kind = other.kind(), "ignoring unexpected packet");
            }
        }
    }
    wire.close();
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "signaler panicked".to_owned()
    }
}

/// The dock's half of the hub control connection, after registration:
/// queries and imports go out, replies come back in request order.
struct HubLink {
    wire: Mutex<Option<WireStream>>,
    waiters: Mutex<VecDeque<oneshot::Sender<Result<Packet, CallError>>>>,
    /// Serializes enqueue-then-send so reply order matches waiter order.
    seq: tokio::sync::Mutex<()>,
}

impl HubLink {
    fn new(wire: WireStream) -> Self {
        Self {
            wire: Mutex::new(Some(wire)),
            waiters: Mutex::new(VecDeque::new()),
            seq: tokio::sync::Mutex::new(()),
        }
    }

    fn live_wire(&self) -> Result<WireStream, CallError> {
        self.wire.lock().clone().ok_or(CallError::ConnectionReset)
    }

    fn deliver(&self, packet: Packet) {
        match self.waiters.lock().pop_front() {
            Some(tx) => {
                let _ = tx.send(Ok(packet));
            }
            None => debug!(kind = packet.kind(), "unsolicited hub reply"),
        }
    }

    fn shutdown(&self) {
        if let Some(wire) = self.wire.lock().take() {
            wire.close();
        }
        let waiters: Vec<_> = self.waiters.lock().drain(..).collect();
        for tx in waiters {
            let _ = tx.send(Err(CallError::ConnectionReset));
        }
    }

    async fn request(&self, packet: Packet) -> Result<Packet, CallError> {
        let wire = self.live_wire()?;
        let rx = {
            let _guard = self.seq.lock().await;
            let (tx, rx) = oneshot::channel();
            self.waiters.lock().push_back(tx);
            wire.send(&packet).await?;
            rx
        };
        rx.await.map_err(|_| CallError::ConnectionReset)?
    }

    async fn query(&self, slot: &str) -> Result<String, CallError> {
        let reply = self
            .request(Packet::QueryRequest {
                slot: slot.to_owned(),
            })
            .await?;
        match reply {
            Packet::QueryResponse { dock_addr } if !dock_addr.is_empty() => Ok(dock_addr),
            Packet::QueryResponse { .. } | Packet::Error { .. } => {
                Err(CallError::UnknownSlot(slot.to_owned()))
            }
            other => Err(CallError::Wire(WireError::UnknownKind(other.kind()))),
        }
    }

    async fn import(&self, slots: &[String]) -> Result<Vec<String>, CallError> {
        let reply = self
            .request(Packet::ImportRequest {
                slots: slots.to_vec(),
            })
            .await?;
        match reply {
            Packet::ImportResponse { docks } => Ok(docks),
            Packet::Error { message } => Err(CallError::Remote(message)),
            other => Err(CallError::Wire(WireError::UnknownKind(other.kind()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Signaler for Noop {
        fn dispatch(&self, method: &str, _args: &[Value]) -> Result<Vec<Value>, DispatchError> {
            Err(DispatchError::UnknownMethod(method.to_owned()))
        }
    }

    #[tokio::test]
    async fn duplicate_local_slots_fail_before_dialing() {
        // The hub address is never contacted: the declaration error comes
        // first.
        let result = Dock::startup(
            "127.0.0.1:1",
            "dup",
            vec![SlotDecl::export("A", Noop), SlotDecl::export("A", Noop)],
            ProxyRegistry::new(),
            Config::default(),
        )
        .await;
        match result {
            Err(DockError::Registration(msg)) => {
                assert_eq!(msg, "duplicate local slot: A");
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("startup unexpectedly succeeded"),
        }
    }

    #[tokio::test]
    async fn unreachable_hub_is_fatal() {
        let result = Dock::startup(
            "127.0.0.1:1",
            "lost",
            vec![SlotDecl::export("B", Noop)],
            ProxyRegistry::new(),
            Config::default(),
        )
        .await;
        assert!(matches!(result, Err(DockError::Io(_))));
    }
}
